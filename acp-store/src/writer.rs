// acp-store/src/writer.rs
// ============================================================================
// Module: Event Writer
// Description: Append-only event persistence: principal binding, idempotent
//              short-circuit, stream sequence allocation, DLP scan, hash
//              chaining, insertion, and projection application (§4.1, §4.2).
// Purpose: The single write path every command handler and the Runtime
//          Worker go through; every append lands its projection update in
//          the same transaction as the event row.
// Dependencies: acp-core, sqlx, crate::dlp, crate::projections
// ============================================================================

use acp_core::ActorType;
use acp_core::EventEnvelope;
use acp_core::EventId;
use acp_core::EventRecord;
use acp_core::HashableEvent;
use acp_core::IdempotencyKey;
use acp_core::PrincipalId;
use acp_core::RedactionLevel;
use acp_core::StreamRef;
use acp_core::WorkspaceId;
use acp_core::hashing::compute_event_hash;
use chrono::Utc;
use sqlx::Acquire;
use sqlx::Postgres;
use sqlx::Row;
use sqlx::Transaction;
use uuid::Uuid;

use crate::dlp::RegexSecretScanner;
use crate::error::StoreError;
use crate::rows::event_row_to_record;

/// Well-known idempotency key prefix for auxiliary `event.redacted` events.
const REDACT_IDEMPOTENCY_PREFIX: &str = "redact:";
/// Well-known idempotency key prefix for policy-gate side-effect events.
pub const POLICY_IDEMPOTENCY_PREFIX: &str = "policy:";

/// Persists events to the append-only log, enforcing idempotency, stream
/// sequencing, DLP masking, and hash chaining.
#[derive(Clone)]
pub struct EventWriter {
    scanner: RegexSecretScanner,
}

impl Default for EventWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventWriter {
    /// Builds a writer with the built-in DLP pattern set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scanner: RegexSecretScanner::new(),
        }
    }

    /// Appends one event inside its own transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure or an unresolved
    /// idempotency conflict.
    pub async fn append_to_stream(
        &self,
        pool: &sqlx::PgPool,
        envelope: EventEnvelope,
    ) -> Result<EventRecord, StoreError> {
        let mut tx = pool.begin().await?;
        let record = self.append_in_tx(&mut tx, envelope).await?;
        tx.commit().await?;
        Ok(record)
    }

    /// Appends one event as part of a caller-managed transaction, so a run
    /// claim's lease write and its `run.started` append commit atomically
    /// (§4.7).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure or an unresolved
    /// idempotency conflict.
    pub async fn append_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        mut envelope: EventEnvelope,
    ) -> Result<EventRecord, StoreError> {
        if envelope.actor_principal_id.is_none() {
            let principal_id = self.ensure_principal_for_legacy_actor(
                tx,
                &envelope.workspace_id,
                envelope.actor_type,
                envelope.actor_id.as_str(),
            )
            .await?;
            envelope.actor_principal_id = Some(principal_id);
        }

        if let Some(key) = envelope.idempotency_key.as_ref()
            && let Some(existing) = self
                .find_by_idempotency_key(tx, &envelope.stream, key)
                .await?
        {
            return Ok(existing);
        }

        let stream_seq = self.allocate_stream_seq(tx, &envelope.stream).await?;
        let prev_event_hash = self.prior_event_hash(tx, &envelope.stream, stream_seq).await?;

        let findings = self.scanner.scan_and_mask(&mut envelope.data);
        let (redaction_level, contains_secrets) = if findings.is_empty() {
            (RedactionLevel::None, false)
        } else {
            (RedactionLevel::Partial, true)
        };

        let event_id = EventId::new();
        let occurred_at = envelope.occurred_at;
        let recorded_at = Utc::now();

        let hashable = HashableEvent {
            event_type: &envelope.event_type,
            event_version: envelope.event_version,
            occurred_at,
            workspace_id: envelope.workspace_id.as_str(),
            stream_type: &envelope.stream.stream_type,
            stream_id: &envelope.stream.stream_id,
            stream_seq,
            data: &envelope.data,
        };
        let event_hash = compute_event_hash(&hashable, &prev_event_hash)?;

        let record = EventRecord {
            event_id,
            event_type: envelope.event_type.clone(),
            event_version: envelope.event_version,
            occurred_at,
            recorded_at,
            workspace_id: envelope.workspace_id.clone(),
            mission_id: envelope.mission_id.clone(),
            room_id: envelope.room_id,
            thread_id: envelope.thread_id,
            run_id: envelope.run_id,
            step_id: envelope.step_id,
            actor_type: envelope.actor_type,
            actor_id: envelope.actor_id.clone(),
            actor_principal_id: envelope.actor_principal_id,
            zone: envelope.zone,
            stream: envelope.stream.clone(),
            stream_seq,
            redaction_level,
            contains_secrets,
            data: envelope.data.clone(),
            policy_context: envelope.policy_context.clone(),
            model_context: envelope.model_context.clone(),
            display: envelope.display.clone(),
            correlation_id: envelope.correlation_id.clone(),
            causation_id: envelope.causation_id,
            idempotency_key: envelope.idempotency_key.clone(),
            prev_event_hash,
            event_hash,
        };

        if let Some(existing) = self.insert_record(tx, &record).await? {
            return Ok(existing);
        }
        crate::projections::apply_in_tx(tx, &record).await?;

        if !findings.is_empty() {
            for finding in &findings {
                sqlx::query(
                    "INSERT INTO sec_redaction_log (event_id, rule_id, action, stream_type, \
                     stream_id, detail) VALUES ($1, $2, $3, $4, $5, $6)",
                )
                .bind(record.event_id.as_uuid())
                .bind(finding.rule_id)
                .bind("masked")
                .bind(&record.stream.stream_type)
                .bind(&record.stream.stream_id)
                .bind(&finding.detail)
                .execute(&mut **tx)
                .await?;
            }

            let redact_envelope = EventEnvelope {
                event_type: "event.redacted".to_string(),
                event_version: 1,
                occurred_at: recorded_at,
                workspace_id: record.workspace_id.clone(),
                mission_id: None,
                room_id: None,
                thread_id: None,
                run_id: None,
                step_id: None,
                actor_type: ActorType::Service,
                actor_id: record.actor_id.clone(),
                actor_principal_id: record.actor_principal_id,
                zone: record.zone,
                stream: record.stream.clone(),
                data: serde_json::json!({
                    "target_event_id": record.event_id,
                    "reason": "dlp_scan_match",
                    "redaction_level": redaction_level,
                }),
                policy_context: None,
                model_context: None,
                display: None,
                correlation_id: record.correlation_id.clone(),
                causation_id: Some(record.event_id),
                idempotency_key: Some(IdempotencyKey::new(format!(
                    "{REDACT_IDEMPOTENCY_PREFIX}{}",
                    record.event_id
                ))),
            };
            Box::pin(self.append_in_tx(tx, redact_envelope)).await?;
        }

        Ok(record)
    }

    async fn ensure_principal_for_legacy_actor(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        workspace_id: &WorkspaceId,
        actor_type: ActorType,
        actor_id: &str,
    ) -> Result<PrincipalId, StoreError> {
        let principal_type = actor_type.to_string();
        let row = sqlx::query(
            "INSERT INTO principals (principal_id, workspace_id, principal_type, \
             legacy_actor_type, legacy_actor_id) VALUES ($1, $2, $3, $4, $5) ON CONFLICT \
             (workspace_id, legacy_actor_type, legacy_actor_id) DO UPDATE SET principal_id = \
             principals.principal_id RETURNING principal_id",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(workspace_id.as_str())
        .bind(&principal_type)
        .bind(&principal_type)
        .bind(actor_id)
        .fetch_one(&mut **tx)
        .await?;
        let principal_id: String = row.try_get("principal_id")?;
        Ok(PrincipalId::from_uuid(
            Uuid::parse_str(&principal_id).unwrap_or_else(|_| Uuid::new_v4()),
        ))
    }

    async fn find_by_idempotency_key(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        stream: &StreamRef,
        key: &IdempotencyKey,
    ) -> Result<Option<EventRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM evt_events WHERE stream_type = $1 AND stream_id = $2 AND \
             idempotency_key = $3",
        )
        .bind(&stream.stream_type)
        .bind(&stream.stream_id)
        .bind(key.as_str())
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.map(|row| event_row_to_record(&row)).transpose()?)
    }

    async fn allocate_stream_seq(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        stream: &StreamRef,
    ) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "INSERT INTO evt_stream_heads (stream_type, stream_id, next_seq) VALUES ($1, $2, 2) \
             ON CONFLICT (stream_type, stream_id) DO UPDATE SET next_seq = \
             evt_stream_heads.next_seq + 1 RETURNING next_seq - 1 AS allocated",
        )
        .bind(&stream.stream_type)
        .bind(&stream.stream_id)
        .fetch_one(&mut **tx)
        .await?;
        let allocated: i64 = row.try_get("allocated")?;
        Ok(allocated)
    }

    async fn prior_event_hash(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        stream: &StreamRef,
        stream_seq: i64,
    ) -> Result<String, StoreError> {
        if stream_seq <= 1 {
            return Ok(String::new());
        }
        let row = sqlx::query(
            "SELECT event_hash FROM evt_events WHERE stream_type = $1 AND stream_id = $2 AND \
             stream_seq = $3",
        )
        .bind(&stream.stream_type)
        .bind(&stream.stream_id)
        .bind(stream_seq - 1)
        .fetch_optional(&mut **tx)
        .await?;
        match row {
            Some(row) => Ok(row.try_get("event_hash")?),
            None => Err(StoreError::StreamSeqGapDetected {
                stream_type: stream.stream_type.clone(),
                stream_id: stream.stream_id.clone(),
            }),
        }
    }

    /// Inserts `record`, scoped in its own `SAVEPOINT` so that a concurrent
    /// writer racing on the same `idempotency_key` resolves to the winning
    /// row instead of aborting the caller's outer transaction (§4.1, §9
    /// "Idempotency savepoint").
    ///
    /// Returns `Ok(None)` when this call's row was the one inserted, or
    /// `Ok(Some(existing))` when a unique-violation on the replay meant
    /// another writer already won and `existing` is its record.
    async fn insert_record(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        record: &EventRecord,
    ) -> Result<Option<EventRecord>, StoreError> {
        let mut savepoint = tx.begin().await?;

        let result = sqlx::query(
            "INSERT INTO evt_events (event_id, event_type, event_version, occurred_at, \
             recorded_at, workspace_id, mission_id, room_id, thread_id, run_id, step_id, \
             actor_type, actor_id, actor_principal_id, zone, stream_type, stream_id, \
             stream_seq, redaction_level, contains_secrets, data, policy_context, \
             model_context, display, correlation_id, causation_id, idempotency_key, \
             prev_event_hash, event_hash) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, \
             $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, \
             $27, $28, $29)",
        )
        .bind(record.event_id.as_uuid())
        .bind(&record.event_type)
        .bind(i32::try_from(record.event_version).unwrap_or(i32::MAX))
        .bind(record.occurred_at)
        .bind(record.recorded_at)
        .bind(record.workspace_id.as_str())
        .bind(record.mission_id.as_ref().map(|id| id.as_str().to_string()))
        .bind(record.room_id.map(|id| id.to_string()))
        .bind(record.thread_id.map(|id| id.to_string()))
        .bind(record.run_id.map(|id| id.to_string()))
        .bind(record.step_id.map(|id| id.to_string()))
        .bind(record.actor_type.to_string())
        .bind(record.actor_id.as_str())
        .bind(record.actor_principal_id.map(|id| id.to_string()))
        .bind(record.zone.to_string())
        .bind(&record.stream.stream_type)
        .bind(&record.stream.stream_id)
        .bind(record.stream_seq)
        .bind(redaction_level_label(record.redaction_level))
        .bind(record.contains_secrets)
        .bind(&record.data)
        .bind(&record.policy_context)
        .bind(&record.model_context)
        .bind(&record.display)
        .bind(record.correlation_id.as_str())
        .bind(record.causation_id.map(|id| id.as_uuid()))
        .bind(record.idempotency_key.as_ref().map(IdempotencyKey::as_str))
        .bind(&record.prev_event_hash)
        .bind(&record.event_hash)
        .execute(&mut *savepoint)
        .await;

        match result {
            Ok(_) => {
                savepoint.commit().await?;
                Ok(None)
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                savepoint.rollback().await?;
                match record.idempotency_key.as_ref() {
                    Some(key) => {
                        let existing = self.find_by_idempotency_key(tx, &record.stream, key).await?;
                        existing.ok_or_else(|| StoreError::IdempotencyConflictUnresolved {
                            idempotency_key: key.as_str().to_string(),
                        })
                    }
                    None => Err(StoreError::IdempotencyConflictUnresolved {
                        idempotency_key: String::new(),
                    }),
                }
            }
            Err(err) => {
                savepoint.rollback().await?;
                Err(StoreError::from(err))
            }
        }
    }
}

const fn redaction_level_label(level: RedactionLevel) -> &'static str {
    match level {
        RedactionLevel::None => "none",
        RedactionLevel::Partial => "partial",
    }
}
