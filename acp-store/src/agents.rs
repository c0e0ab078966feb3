// acp-store/src/agents.rs
// ============================================================================
// Module: Agent Identity
// Description: Event-append primitives and read queries for agent
//              registration and quarantine (`agent.registered` /
//              `.quarantined` / `.unquarantined`).
// Purpose: The write path `acp-server` goes through for `POST /agents`,
//          `/agents/:id/quarantine`, `/agents/:id/unquarantine`.
// Dependencies: acp-core, crate::writer
// ============================================================================

use acp_core::ActorId;
use acp_core::ActorType;
use acp_core::AgentId;
use acp_core::CorrelationId;
use acp_core::EventEnvelope;
use acp_core::PrincipalId;
use acp_core::StreamRef;
use acp_core::WorkspaceId;
use acp_core::Zone;
use chrono::DateTime;
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use sqlx::Row;

use crate::error::StoreError;
use crate::writer::EventWriter;

/// A projected agent row.
#[derive(Debug, Clone)]
pub struct AgentRow {
    /// The agent's legacy actor identifier.
    pub agent_id: AgentId,
    /// Tenancy boundary.
    pub workspace_id: WorkspaceId,
    /// The principal backing this agent, if bound.
    pub principal_id: Option<PrincipalId>,
    /// Set while quarantined.
    pub quarantined_at: Option<DateTime<Utc>>,
    /// The reason recorded when quarantined, if any.
    pub quarantine_reason: Option<String>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl AgentRow {
    /// Whether this agent is currently quarantined.
    #[must_use]
    pub fn is_quarantined(&self) -> bool {
        self.quarantined_at.is_some()
    }
}

fn stream_for(workspace_id: &WorkspaceId) -> StreamRef {
    StreamRef::workspace(workspace_id)
}

/// Appends `agent.registered`.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn register(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    agent_id: &AgentId,
    principal_id: Option<PrincipalId>,
    actor_type: ActorType,
    actor_id: &ActorId,
) -> Result<(), StoreError> {
    let envelope = EventEnvelope {
        event_type: "agent.registered".to_string(),
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
        stream: stream_for(workspace_id),
        data: json!({ "agent_id": agent_id, "principal_id": principal_id }),
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("agent:{agent_id}")),
        causation_id: None,
        idempotency_key: None,
    };
    writer.append_to_stream(pool, envelope).await?;
    Ok(())
}

/// Appends `agent.quarantined`.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn quarantine(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    agent_id: &AgentId,
    reason: &str,
    actor_type: ActorType,
    actor_id: &ActorId,
) -> Result<(), StoreError> {
    let envelope = EventEnvelope {
        event_type: "agent.quarantined".to_string(),
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
        stream: stream_for(workspace_id),
        data: json!({ "agent_id": agent_id, "reason": reason }),
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("agent:{agent_id}")),
        causation_id: None,
        idempotency_key: None,
    };
    writer.append_to_stream(pool, envelope).await?;
    Ok(())
}

/// Appends `agent.unquarantined`.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn unquarantine(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    agent_id: &AgentId,
    actor_type: ActorType,
    actor_id: &ActorId,
) -> Result<(), StoreError> {
    let envelope = EventEnvelope {
        event_type: "agent.unquarantined".to_string(),
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
        stream: stream_for(workspace_id),
        data: json!({ "agent_id": agent_id }),
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("agent:{agent_id}")),
        causation_id: None,
        idempotency_key: None,
    };
    writer.append_to_stream(pool, envelope).await?;
    Ok(())
}

/// Fetches a single agent by id.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn get(pool: &PgPool, workspace_id: &WorkspaceId, agent_id: &AgentId) -> Result<Option<AgentRow>, StoreError> {
    let row = sqlx::query(
        "SELECT agent_id, workspace_id, principal_id, quarantined_at, quarantine_reason, \
         updated_at FROM proj_agents WHERE workspace_id = $1 AND agent_id = $2",
    )
    .bind(workspace_id.as_str())
    .bind(agent_id.as_str())
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(row_to_agent).transpose()
}

/// Fetches the agent bound to `principal_id`, if any.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn get_by_principal(pool: &PgPool, principal_id: PrincipalId) -> Result<Option<AgentRow>, StoreError> {
    let row = sqlx::query(
        "SELECT agent_id, workspace_id, principal_id, quarantined_at, quarantine_reason, \
         updated_at FROM proj_agents WHERE principal_id = $1",
    )
    .bind(principal_id.to_string())
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(row_to_agent).transpose()
}

/// Lists agents in a workspace, most recently updated first.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn list(pool: &PgPool, workspace_id: &WorkspaceId, limit: i64) -> Result<Vec<AgentRow>, StoreError> {
    let rows = sqlx::query(
        "SELECT agent_id, workspace_id, principal_id, quarantined_at, quarantine_reason, \
         updated_at FROM proj_agents WHERE workspace_id = $1 ORDER BY updated_at DESC LIMIT $2",
    )
    .bind(workspace_id.as_str())
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_agent).collect()
}

fn row_to_agent(row: &sqlx::postgres::PgRow) -> Result<AgentRow, StoreError> {
    let principal_id: Option<String> = row.try_get("principal_id")?;
    Ok(AgentRow {
        agent_id: AgentId::new(row.try_get::<String, _>("agent_id")?),
        workspace_id: WorkspaceId::new(row.try_get::<String, _>("workspace_id")?),
        principal_id: principal_id
            .map(|raw| raw.parse::<uuid::Uuid>().map(PrincipalId::from_uuid).unwrap_or_else(|_| PrincipalId::new())),
        quarantined_at: row.try_get("quarantined_at")?,
        quarantine_reason: row.try_get("quarantine_reason")?,
        updated_at: row.try_get("updated_at")?,
    })
}
