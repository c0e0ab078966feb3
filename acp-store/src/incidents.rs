// acp-store/src/incidents.rs
// ============================================================================
// Module: Incidents
// Description: Event-append primitives and read queries for the incident
//              lifecycle (`incident.opened` / `.updated` / `.closed`), and
//              the close-blocked invariants from §4's incident handling
//              (RCA and at least one learning entry required to close).
// Purpose: The write path `acp-server` goes through for `POST
//          /incidents`, `/incidents/:id/rca`, `/incidents/:id/close`.
// Dependencies: acp-core, crate::writer
// ============================================================================

use acp_core::ActorId;
use acp_core::ActorType;
use acp_core::CorrelationId;
use acp_core::EventEnvelope;
use acp_core::IdempotencyKey;
use acp_core::IncidentId;
use acp_core::RunId;
use acp_core::StreamRef;
use acp_core::WorkspaceId;
use acp_core::Zone;
use chrono::DateTime;
use chrono::Utc;
use serde_json::Value;
use serde_json::json;
use sqlx::PgPool;
use sqlx::Row;

use crate::error::StoreError;
use crate::writer::EventWriter;

/// An incident's lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncidentStatus {
    /// Open and under investigation.
    Open,
    /// Closed with an RCA and at least one learning entry recorded.
    Closed,
}

impl IncidentStatus {
    fn parse(raw: &str) -> Self {
        if raw == "closed" { Self::Closed } else { Self::Open }
    }
}

/// A projected incident row.
#[derive(Debug, Clone)]
pub struct IncidentRow {
    /// The incident's identifier.
    pub incident_id: IncidentId,
    /// Tenancy boundary.
    pub workspace_id: WorkspaceId,
    /// Current lifecycle status.
    pub status: IncidentStatus,
    /// The run this incident is about, if any.
    pub run_id: Option<RunId>,
    /// Root-cause analysis text, once recorded.
    pub rca: Option<String>,
    /// Accumulated learning entries.
    pub learning_entries: Vec<Value>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// Appends `incident.opened`, creating a fresh [`IncidentId`].
///
/// When `idempotency_key` is supplied and a prior `incident.opened` on the
/// same stream already used it, no new incident is created: the id of the
/// existing incident is returned with `deduped = true`.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn open(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    run_id: Option<RunId>,
    actor_type: ActorType,
    actor_id: &ActorId,
    correlation_id: Option<CorrelationId>,
    idempotency_key: Option<IdempotencyKey>,
) -> Result<(IncidentId, bool), StoreError> {
    let incident_id = IncidentId::new();
    let correlation_id = correlation_id.unwrap_or_else(|| CorrelationId::new(format!("incident:{incident_id}")));
    let stream = run_id.map_or_else(|| StreamRef::workspace(workspace_id), StreamRef::run);
    let envelope = EventEnvelope {
        event_type: "incident.opened".to_string(),
        event_version: 1,
        occurred_at: Utc::now(),
        workspace_id: workspace_id.clone(),
        mission_id: None,
        room_id: None,
        thread_id: None,
        run_id,
        step_id: None,
        actor_type,
        actor_id: actor_id.clone(),
        actor_principal_id: None,
        zone: Zone::Supervised,
        stream,
        data: json!({ "incident_id": incident_id }),
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id,
        causation_id: None,
        idempotency_key,
    };
    let record = writer.append_to_stream(pool, envelope).await?;
    let actual_incident_id = record
        .data
        .get("incident_id")
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse::<uuid::Uuid>().ok())
        .map_or(incident_id, IncidentId::from_uuid);
    let deduped = actual_incident_id != incident_id;
    Ok((actual_incident_id, deduped))
}

/// Appends `incident.updated`, recording an RCA and/or a single learning
/// entry. At least one of `rca`/`learning_entry` should be set; the
/// projector treats both as optional and simply leaves unset fields
/// unchanged.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
#[allow(clippy::too_many_arguments)]
pub async fn record_update(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    incident_id: IncidentId,
    actor_type: ActorType,
    actor_id: &ActorId,
    rca: Option<&str>,
    learning_entry: Option<Value>,
) -> Result<(), StoreError> {
    let envelope = EventEnvelope {
        event_type: "incident.updated".to_string(),
        event_version: 1,
        occurred_at: Utc::now(),
        workspace_id: workspace_id.clone(),
        mission_id: None,
        room_id: None,
        thread_id: None,
        run_id: None,
        step_id: None,
        actor_type,
        actor_id: actor_id.clone(),
        actor_principal_id: None,
        zone: Zone::Supervised,
        stream: StreamRef::workspace(workspace_id),
        data: json!({ "incident_id": incident_id, "rca": rca, "learning_entry": learning_entry }),
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("incident:{incident_id}")),
        causation_id: None,
        idempotency_key: None,
    };
    writer.append_to_stream(pool, envelope).await?;
    Ok(())
}

/// Appends `incident.closed` after checking the close-blocked invariants:
/// an incident cannot close without a recorded RCA and at least one
/// learning entry.
///
/// # Errors
///
/// Returns [`StoreError::IncidentCloseBlockedMissingRca`] or
/// [`StoreError::IncidentCloseBlockedMissingLearning`] when the
/// invariant is unmet, or [`StoreError`] on database failure.
pub async fn close(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    incident_id: IncidentId,
    actor_type: ActorType,
    actor_id: &ActorId,
) -> Result<(), StoreError> {
    let row = get(pool, incident_id).await?.ok_or_else(|| StoreError::NotFound(format!("incident {incident_id}")))?;
    if row.rca.is_none() {
        return Err(StoreError::IncidentCloseBlockedMissingRca);
    }
    if row.learning_entries.is_empty() {
        return Err(StoreError::IncidentCloseBlockedMissingLearning);
    }

    let envelope = EventEnvelope {
        event_type: "incident.closed".to_string(),
        event_version: 1,
        occurred_at: Utc::now(),
        workspace_id: workspace_id.clone(),
        mission_id: None,
        room_id: None,
        thread_id: None,
        run_id: None,
        step_id: None,
        actor_type,
        actor_id: actor_id.clone(),
        actor_principal_id: None,
        zone: Zone::Supervised,
        stream: StreamRef::workspace(workspace_id),
        data: json!({ "incident_id": incident_id }),
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("incident:{incident_id}")),
        causation_id: None,
        idempotency_key: None,
    };
    writer.append_to_stream(pool, envelope).await?;
    Ok(())
}

/// Fetches a single incident by id.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn get(pool: &PgPool, incident_id: IncidentId) -> Result<Option<IncidentRow>, StoreError> {
    let row = sqlx::query(
        "SELECT incident_id, workspace_id, status, run_id, rca, learning_entries, updated_at \
         FROM proj_incidents WHERE incident_id = $1",
    )
    .bind(incident_id.to_string())
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(row_to_incident).transpose()
}

/// Lists incidents in a workspace, most recently updated first.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn list(
    pool: &PgPool,
    workspace_id: &WorkspaceId,
    status: Option<IncidentStatus>,
    limit: i64,
) -> Result<Vec<IncidentRow>, StoreError> {
    let status_filter = status.map(|s| match s {
        IncidentStatus::Open => "open",
        IncidentStatus::Closed => "closed",
    });
    let rows = sqlx::query(
        "SELECT incident_id, workspace_id, status, run_id, rca, learning_entries, updated_at \
         FROM proj_incidents WHERE workspace_id = $1 AND ($2::text IS NULL OR status = $2) \
         ORDER BY updated_at DESC LIMIT $3",
    )
    .bind(workspace_id.as_str())
    .bind(status_filter)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_incident).collect()
}

fn row_to_incident(row: &sqlx::postgres::PgRow) -> Result<IncidentRow, StoreError> {
    let incident_id: String = row.try_get("incident_id")?;
    let run_id: Option<String> = row.try_get("run_id")?;
    let status: String = row.try_get("status")?;
    let learning_entries: Option<Value> = row.try_get("learning_entries")?;
    Ok(IncidentRow {
        incident_id: incident_id.parse::<uuid::Uuid>().map(IncidentId::from_uuid).unwrap_or_else(|_| IncidentId::new()),
        workspace_id: WorkspaceId::new(row.try_get::<String, _>("workspace_id")?),
        status: IncidentStatus::parse(&status),
        run_id: run_id.map(|raw| raw.parse::<uuid::Uuid>().map(RunId::from_uuid).unwrap_or_else(|_| RunId::new())),
        rca: row.try_get("rca")?,
        learning_entries: learning_entries.and_then(|v| v.as_array().cloned()).unwrap_or_default(),
        updated_at: row.try_get("updated_at")?,
    })
}
