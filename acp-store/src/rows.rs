// acp-store/src/rows.rs
// ============================================================================
// Module: Row Mapping
// Description: Converts `evt_events` rows back into `EventRecord`s.
// Purpose: Shared by idempotent-replay lookups in the writer and the
//          hash-chain walk in the audit module.
// Dependencies: acp-core, sqlx
// ============================================================================

use acp_core::ActorId;
use acp_core::ActorType;
use acp_core::CorrelationId;
use acp_core::EventId;
use acp_core::EventRecord;
use acp_core::IdempotencyKey;
use acp_core::MissionId;
use acp_core::PrincipalId;
use acp_core::RedactionLevel;
use acp_core::RoomId;
use acp_core::RunId;
use acp_core::StepId;
use acp_core::StreamRef;
use acp_core::ThreadId;
use acp_core::WorkspaceId;
use acp_core::Zone;
use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

use crate::error::StoreError;

/// Converts one `evt_events` row into its domain representation.
///
/// # Errors
///
/// Returns [`StoreError::Database`] when an expected column is missing or
/// of the wrong type, or when a stored enum label is unrecognized.
pub fn event_row_to_record(row: &PgRow) -> Result<EventRecord, StoreError> {
    let actor_type_label: String = row.try_get("actor_type")?;
    let zone_label: String = row.try_get("zone")?;
    let redaction_label: String = row.try_get("redaction_level")?;

    Ok(EventRecord {
        event_id: EventId::from_uuid(row.try_get::<Uuid, _>("event_id")?),
        event_type: row.try_get("event_type")?,
        event_version: u32::try_from(row.try_get::<i32, _>("event_version")?).unwrap_or(0),
        occurred_at: row.try_get("occurred_at")?,
        recorded_at: row.try_get("recorded_at")?,
        workspace_id: WorkspaceId::new(row.try_get::<String, _>("workspace_id")?),
        mission_id: row.try_get::<Option<String>, _>("mission_id")?.map(MissionId::new),
        room_id: parse_uuid_id(row, "room_id")?.map(RoomId::from_uuid),
        thread_id: parse_uuid_id(row, "thread_id")?.map(ThreadId::from_uuid),
        run_id: parse_uuid_id(row, "run_id")?.map(RunId::from_uuid),
        step_id: parse_uuid_id(row, "step_id")?.map(StepId::from_uuid),
        actor_type: parse_actor_type(&actor_type_label),
        actor_id: ActorId::new(row.try_get::<String, _>("actor_id")?),
        actor_principal_id: parse_uuid_id(row, "actor_principal_id")?.map(PrincipalId::from_uuid),
        zone: parse_zone(&zone_label),
        stream: StreamRef::new(
            row.try_get::<String, _>("stream_type")?,
            row.try_get::<String, _>("stream_id")?,
        ),
        stream_seq: row.try_get("stream_seq")?,
        redaction_level: parse_redaction_level(&redaction_label),
        contains_secrets: row.try_get("contains_secrets")?,
        data: row.try_get("data")?,
        policy_context: row.try_get("policy_context")?,
        model_context: row.try_get("model_context")?,
        display: row.try_get("display")?,
        correlation_id: CorrelationId::new(row.try_get::<String, _>("correlation_id")?),
        causation_id: row
            .try_get::<Option<Uuid>, _>("causation_id")?
            .map(EventId::from_uuid),
        idempotency_key: row
            .try_get::<Option<String>, _>("idempotency_key")?
            .map(IdempotencyKey::new),
        prev_event_hash: row.try_get("prev_event_hash")?,
        event_hash: row.try_get("event_hash")?,
    })
}

fn parse_uuid_id(row: &PgRow, column: &str) -> Result<Option<Uuid>, StoreError> {
    let raw: Option<String> = row.try_get(column)?;
    Ok(raw.and_then(|value| Uuid::parse_str(&value).ok()))
}

fn parse_actor_type(label: &str) -> ActorType {
    match label {
        "user" => ActorType::User,
        "agent" => ActorType::Agent,
        _ => ActorType::Service,
    }
}

fn parse_zone(label: &str) -> Zone {
    match label {
        "sandbox" => Zone::Sandbox,
        "high_stakes" => Zone::HighStakes,
        _ => Zone::Supervised,
    }
}

fn parse_redaction_level(label: &str) -> RedactionLevel {
    match label {
        "partial" => RedactionLevel::Partial,
        _ => RedactionLevel::None,
    }
}
