// acp-store/src/events.rs
// ============================================================================
// Module: Event Queries
// Description: Read-only filtered listing and single-event lookup over
//              `evt_events` (§6 `GET /events`, `GET /events/:eventId`).
// Purpose: Let `acp-server` answer event queries without hand-rolling SQL
//          in the HTTP layer, sharing `rows::event_row_to_record`.
// Dependencies: acp-core, crate::rows, sqlx
// ============================================================================

use acp_core::EventId;
use acp_core::EventRecord;
use acp_core::WorkspaceId;
use sqlx::PgPool;
use sqlx::QueryBuilder;

use crate::error::StoreError;
use crate::rows::event_row_to_record;

/// Filters accepted by `GET /events`. All fields are optional except
/// `workspace_id`, which always scopes the query to one tenant.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Restrict to one stream (`stream_type`, `stream_id`).
    pub stream: Option<(String, String)>,
    /// Restrict to one run.
    pub run_id: Option<String>,
    /// Restrict to one correlation id.
    pub correlation_id: Option<String>,
    /// Restrict to a CSV set of event types.
    pub event_types: Vec<String>,
    /// Restrict to events whose `actor_id` is this agent.
    pub subject_agent_id: Option<String>,
    /// Restrict to events whose `actor_principal_id` is this principal.
    pub subject_principal_id: Option<String>,
}

/// Lists events for a workspace matching `filter`, most recent first.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn list_events(
    pool: &PgPool,
    workspace_id: &WorkspaceId,
    filter: &EventFilter,
    limit: i64,
) -> Result<Vec<EventRecord>, StoreError> {
    let mut query = QueryBuilder::new(
        "SELECT * FROM evt_events WHERE workspace_id = ",
    );
    query.push_bind(workspace_id.as_str());

    if let Some((stream_type, stream_id)) = &filter.stream {
        query.push(" AND stream_type = ").push_bind(stream_type);
        query.push(" AND stream_id = ").push_bind(stream_id);
    }
    if let Some(run_id) = &filter.run_id {
        query.push(" AND run_id = ").push_bind(run_id);
    }
    if let Some(correlation_id) = &filter.correlation_id {
        query.push(" AND correlation_id = ").push_bind(correlation_id);
    }
    if !filter.event_types.is_empty() {
        query.push(" AND event_type = ANY(").push_bind(filter.event_types.clone()).push(")");
    }
    if let Some(subject_agent_id) = &filter.subject_agent_id {
        query.push(" AND actor_id = ").push_bind(subject_agent_id);
    }
    if let Some(subject_principal_id) = &filter.subject_principal_id {
        query.push(" AND actor_principal_id = ").push_bind(subject_principal_id);
    }

    query.push(" ORDER BY recorded_at DESC LIMIT ").push_bind(limit);

    let rows = query.build().fetch_all(pool).await?;
    rows.iter().map(event_row_to_record).collect()
}

/// Fetches a single event by id.
///
/// # Errors
///
/// Returns [`StoreError::NotFound`] when no such event exists, or a
/// database error.
pub async fn get_event(pool: &PgPool, event_id: EventId) -> Result<EventRecord, StoreError> {
    let row = sqlx::query("SELECT * FROM evt_events WHERE event_id = $1")
        .bind(event_id.as_uuid())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("event {event_id}")))?;
    event_row_to_record(&row)
}
