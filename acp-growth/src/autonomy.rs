// acp-growth/src/autonomy.rs
// ============================================================================
// Module: Autonomy Recommendation
// Description: Derives an autonomy recommendation from the current trust
//              score and lifecycle state, and records operator sign-off
//              (§4.9 Trust Score, Lifecycle).
// Purpose: Turn the two existing signals (trust, lifecycle) into the single
//          yes/no an operator reviews at `/agents/:id/autonomy/*`, without
//          introducing a third scoring pass.
// Dependencies: acp-core, acp-store, crate::trust, crate::lifecycle
// ============================================================================

use acp_core::ActorId;
use acp_core::ActorType;
use acp_core::AgentId;
use acp_core::CorrelationId;
use acp_core::EventEnvelope;
use acp_core::StreamRef;
use acp_core::WorkspaceId;
use acp_core::Zone;
use acp_store::EventWriter;
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;

use crate::error::GrowthError;
use crate::lifecycle;
use crate::lifecycle::LifecycleState;
use crate::trust;

/// Trust score at or above this threshold, combined with an
/// [`LifecycleState::Active`] agent, recommends autonomous operation.
const AUTONOMY_TRUST_THRESHOLD: f64 = 0.8;

/// A point-in-time autonomy recommendation, computed fresh from trust and
/// lifecycle signals rather than persisted.
#[derive(Debug, Clone, Serialize)]
pub struct AutonomyRecommendation {
    /// The agent this recommendation is for.
    pub agent_id: AgentId,
    /// Whether the signals currently support autonomous operation.
    pub recommended: bool,
    /// The trust score behind the recommendation, if the agent has one.
    pub trust_score: Option<f64>,
    /// The agent's current lifecycle state.
    pub lifecycle_state: &'static str,
}

/// Computes the current recommendation for `agent_id`, reading the
/// persisted trust row (not recomputing it) and the live lifecycle state.
///
/// # Errors
///
/// Returns [`GrowthError::Store`] on database failure.
pub async fn recommend(pool: &PgPool, agent_id: &AgentId) -> Result<AutonomyRecommendation, GrowthError> {
    let trust_row = trust::get(pool, agent_id).await?;
    let lifecycle_state = lifecycle::get_state(pool, agent_id).await?;
    let trust_score = trust_row.map(|row| row.score);
    let recommended =
        lifecycle_state == LifecycleState::Active && trust_score.is_some_and(|score| score >= AUTONOMY_TRUST_THRESHOLD);
    Ok(AutonomyRecommendation { agent_id: agent_id.clone(), recommended, trust_score, lifecycle_state: state_label(lifecycle_state) })
}

/// Appends `agent.autonomy.approved`, recording an operator's sign-off on
/// autonomous operation for `agent_id`. Carries no state machine of its
/// own; it is an audit-trail entry alongside the trust/lifecycle signals
/// [`recommend`] reads.
///
/// # Errors
///
/// Returns [`GrowthError::Store`] on event-append failure.
pub async fn approve(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    agent_id: &AgentId,
    actor_id: &ActorId,
) -> Result<(), GrowthError> {
    let envelope = EventEnvelope {
        event_type: "agent.autonomy.approved".to_string(),
        event_version: 1,
        occurred_at: chrono::Utc::now(),
        workspace_id: workspace_id.clone(),
        mission_id: None,
        room_id: None,
        thread_id: None,
        run_id: None,
        step_id: None,
        actor_type: ActorType::Service,
        actor_id: actor_id.clone(),
        actor_principal_id: None,
        zone: Zone::Supervised,
        stream: StreamRef::workspace(workspace_id),
        data: json!({ "agent_id": agent_id.as_str() }),
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("autonomy:{agent_id}")),
        causation_id: None,
        idempotency_key: None,
    };
    writer.append_to_stream(pool, envelope).await?;
    Ok(())
}

const fn state_label(state: LifecycleState) -> &'static str {
    match state {
        LifecycleState::Active => "active",
        LifecycleState::Probation => "probation",
        LifecycleState::Sunset => "sunset",
    }
}
