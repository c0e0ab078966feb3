// acp-store/src/audit.rs
// ============================================================================
// Module: Audit & Integrity
// Description: Hash-chain verification walk and redaction log queries
//              (§4.10).
// Purpose: Let operators detect tampering or storage corruption
//          independent of the writer that produced the chain.
// Dependencies: acp-core, sqlx
// ============================================================================

use acp_core::EventId;
use acp_core::HashableEvent;
use acp_core::hashing::compute_event_hash;
use serde::Serialize;
use sqlx::PgPool;
use sqlx::Row;
use uuid::Uuid;

use crate::error::StoreError;

/// Result of walking one stream's hash chain.
#[derive(Debug, Clone, Serialize)]
pub struct HashChainReport {
    /// Whether every checked event's hash matched its recomputed value and
    /// the chain links were unbroken.
    pub valid: bool,
    /// Number of events examined before stopping.
    pub checked: u64,
    /// The last event's stored hash, if any were checked.
    pub last_event_hash: Option<String>,
    /// The event id at which the first mismatch was found, if any.
    pub first_mismatch: Option<EventId>,
}

/// Walks `(stream_type, stream_id)` in `stream_seq` order, recomputing each
/// `event_hash` and comparing it to the stored value and to the next row's
/// `prev_event_hash`. Stops at the first mismatch.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure or hashing failure.
pub async fn verify_hash_chain(
    pool: &PgPool,
    stream_type: &str,
    stream_id: &str,
    limit: i64,
) -> Result<HashChainReport, StoreError> {
    let rows = sqlx::query(
        "SELECT event_id, event_type, event_version, occurred_at, workspace_id, stream_seq, \
         data, prev_event_hash, event_hash FROM evt_events WHERE stream_type = $1 AND \
         stream_id = $2 ORDER BY stream_seq ASC LIMIT $3",
    )
    .bind(stream_type)
    .bind(stream_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut checked = 0u64;
    let mut last_event_hash = None;
    let mut expected_prev = String::new();

    for row in &rows {
        let event_id: Uuid = row.try_get("event_id")?;
        let event_type: String = row.try_get("event_type")?;
        let event_version: i32 = row.try_get("event_version")?;
        let occurred_at = row.try_get("occurred_at")?;
        let workspace_id: String = row.try_get("workspace_id")?;
        let stream_seq: i64 = row.try_get("stream_seq")?;
        let data: serde_json::Value = row.try_get("data")?;
        let stored_prev: String = row.try_get("prev_event_hash")?;
        let stored_hash: String = row.try_get("event_hash")?;

        checked += 1;

        if stored_prev != expected_prev {
            return Ok(HashChainReport {
                valid: false,
                checked,
                last_event_hash,
                first_mismatch: Some(EventId::from_uuid(event_id)),
            });
        }

        let hashable = HashableEvent {
            event_type: &event_type,
            event_version: u32::try_from(event_version).unwrap_or(0),
            occurred_at,
            workspace_id: &workspace_id,
            stream_type,
            stream_id,
            stream_seq,
            data: &data,
        };
        let recomputed = compute_event_hash(&hashable, &stored_prev)?;

        if recomputed != stored_hash {
            return Ok(HashChainReport {
                valid: false,
                checked,
                last_event_hash,
                first_mismatch: Some(EventId::from_uuid(event_id)),
            });
        }

        last_event_hash = Some(stored_hash.clone());
        expected_prev = stored_hash;
    }

    Ok(HashChainReport {
        valid: true,
        checked,
        last_event_hash,
        first_mismatch: None,
    })
}

/// One redaction log row, projected for the audit query surface.
#[derive(Debug, Clone, Serialize)]
pub struct RedactionLogEntry {
    /// Row identifier.
    pub id: i64,
    /// The event the redaction applies to.
    pub event_id: EventId,
    /// The DLP rule that matched.
    pub rule_id: String,
    /// The action taken (`masked`).
    pub action: String,
    /// Stream family the event belonged to.
    pub stream_type: String,
    /// Stream instance the event belonged to.
    pub stream_id: String,
    /// Human-readable finding detail.
    pub detail: Option<String>,
}

/// Filters accepted by [`query_redaction_log`]. All fields are optional
/// `AND`-combined filters.
#[derive(Debug, Clone, Default)]
pub struct RedactionLogFilter {
    /// Restrict to a specific event id.
    pub event_id: Option<EventId>,
    /// Restrict to a specific DLP rule id.
    pub rule_id: Option<String>,
    /// Restrict to a specific action label.
    pub action: Option<String>,
    /// Restrict to a specific stream.
    pub stream_type: Option<String>,
    /// Restrict to a specific stream instance (requires `stream_type`).
    pub stream_id: Option<String>,
}

/// Queries the redaction log, most recent first.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn query_redaction_log(
    pool: &PgPool,
    filter: &RedactionLogFilter,
    limit: i64,
) -> Result<Vec<RedactionLogEntry>, StoreError> {
    let rows = sqlx::query(
        "SELECT id, event_id, rule_id, action, stream_type, stream_id, detail FROM \
         sec_redaction_log WHERE ($1::uuid IS NULL OR event_id = $1) AND ($2::text IS NULL OR \
         rule_id = $2) AND ($3::text IS NULL OR action = $3) AND ($4::text IS NULL OR \
         stream_type = $4) AND ($5::text IS NULL OR stream_id = $5) ORDER BY id DESC LIMIT $6",
    )
    .bind(filter.event_id.map(|id| id.as_uuid()))
    .bind(&filter.rule_id)
    .bind(&filter.action)
    .bind(&filter.stream_type)
    .bind(&filter.stream_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(RedactionLogEntry {
                id: row.try_get("id")?,
                event_id: EventId::from_uuid(row.try_get("event_id")?),
                rule_id: row.try_get("rule_id")?,
                action: row.try_get("action")?,
                stream_type: row.try_get("stream_type")?,
                stream_id: row.try_get("stream_id")?,
                detail: row.try_get("detail")?,
            })
        })
        .collect()
}
