// acp-growth/src/lifecycle.rs
// ============================================================================
// Module: Agent Lifecycle
// Description: Deterministic `ACTIVE -> PROBATION -> SUNSET` state machine
//              driven by the survival ledger (§4.9 Lifecycle).
// Purpose: Convert a day's cost/value outcome into a hysteresis-counter
//          update or a `lifecycle.transition` event, never both in the
//          same tick.
// Dependencies: acp-core, acp-store
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
use serde_json::json;
use sqlx::PgPool;
use sqlx::Row;

use crate::error::GrowthError;

/// Consecutive bad days in `Active` that demote an agent to `Probation`.
const BAD_DAYS_TO_PROBATION: i64 = 3;
/// Consecutive good days in `Probation` that restore an agent to `Active`.
const GOOD_DAYS_TO_RECOVER: i64 = 3;
/// Consecutive bad days in `Probation` that retire an agent to `Sunset`.
const BAD_DAYS_TO_SUNSET: i64 = 5;

/// A node in the lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Normal operating state.
    Active,
    /// Under heightened scrutiny after a losing streak.
    Probation,
    /// Retired; terminal.
    Sunset,
}

impl LifecycleState {
    fn parse(label: &str) -> Self {
        match label {
            "probation" => Self::Probation,
            "sunset" => Self::Sunset,
            _ => Self::Active,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Probation => "probation",
            Self::Sunset => "sunset",
        }
    }
}

struct LifecycleRow {
    state: LifecycleState,
    consecutive_good_days: i64,
    consecutive_bad_days: i64,
}

async fn load(pool: &PgPool, agent_id: &AgentId) -> Result<LifecycleRow, GrowthError> {
    let row = sqlx::query("SELECT state, consecutive_good_days, consecutive_bad_days FROM growth_lifecycle_state WHERE agent_id = $1")
        .bind(agent_id.as_str())
        .fetch_optional(pool)
        .await?;
    match row {
        Some(row) => {
            let state: String = row.try_get("state")?;
            Ok(LifecycleRow {
                state: LifecycleState::parse(&state),
                consecutive_good_days: i64::from(row.try_get::<i32, _>("consecutive_good_days")?),
                consecutive_bad_days: i64::from(row.try_get::<i32, _>("consecutive_bad_days")?),
            })
        }
        None => Ok(LifecycleRow {
            state: LifecycleState::Active,
            consecutive_good_days: 0,
            consecutive_bad_days: 0,
        }),
    }
}

/// Whether a day's survival-ledger outcome counts as good (`value >= cost`).
#[must_use]
pub fn day_is_good(cost: f64, value: f64) -> bool {
    value >= cost
}

/// Applies one day's outcome to `agent_id`'s lifecycle state. `Sunset` is
/// terminal: once reached, further calls are a no-op.
///
/// Emits `lifecycle.transition` when the streak crosses a threshold,
/// otherwise `lifecycle.hysteresis_tick` to persist the updated streak
/// counters without changing `state`.
///
/// # Errors
///
/// Returns [`GrowthError::Store`] on database or event-append failure.
pub async fn apply_day_outcome(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    agent_id: &AgentId,
    good_day: bool,
    actor_id: &ActorId,
) -> Result<LifecycleState, GrowthError> {
    let current = load(pool, agent_id).await?;
    if current.state == LifecycleState::Sunset {
        return Ok(LifecycleState::Sunset);
    }

    let (good_days, bad_days) = if good_day {
        (current.consecutive_good_days + 1, 0)
    } else {
        (0, current.consecutive_bad_days + 1)
    };

    let next_state = decide_transition(current.state, good_days, bad_days);

    if let Some(next_state) = next_state {
        emit_transition(pool, writer, workspace_id, agent_id, next_state, actor_id).await?;
        return Ok(next_state);
    }

    emit_hysteresis_tick(pool, writer, workspace_id, agent_id, good_days, bad_days, actor_id).await?;
    Ok(current.state)
}

/// Pure transition rule, isolated so the thresholds can be tested without
/// a database.
fn decide_transition(state: LifecycleState, good_days: i64, bad_days: i64) -> Option<LifecycleState> {
    match state {
        LifecycleState::Active if bad_days >= BAD_DAYS_TO_PROBATION => Some(LifecycleState::Probation),
        LifecycleState::Probation if good_days >= GOOD_DAYS_TO_RECOVER => Some(LifecycleState::Active),
        LifecycleState::Probation if bad_days >= BAD_DAYS_TO_SUNSET => Some(LifecycleState::Sunset),
        _ => None,
    }
}

async fn emit_transition(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    agent_id: &AgentId,
    to_state: LifecycleState,
    actor_id: &ActorId,
) -> Result<(), GrowthError> {
    let envelope = EventEnvelope {
        event_type: "lifecycle.transition".to_string(),
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
        data: json!({ "agent_id": agent_id.as_str(), "to_state": to_state.as_str() }),
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("lifecycle:{agent_id}")),
        causation_id: None,
        idempotency_key: None,
    };
    writer.append_to_stream(pool, envelope).await?;
    Ok(())
}

async fn emit_hysteresis_tick(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    agent_id: &AgentId,
    good_days: i64,
    bad_days: i64,
    actor_id: &ActorId,
) -> Result<(), GrowthError> {
    let envelope = EventEnvelope {
        event_type: "lifecycle.hysteresis_tick".to_string(),
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
        data: json!({
            "agent_id": agent_id.as_str(),
            "consecutive_good_days": good_days,
            "consecutive_bad_days": bad_days,
        }),
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("lifecycle-tick:{agent_id}")),
        causation_id: None,
        idempotency_key: None,
    };
    writer.append_to_stream(pool, envelope).await?;
    Ok(())
}

/// Reads the current lifecycle state for an agent without mutating it.
///
/// # Errors
///
/// Returns [`GrowthError::Store`] on database failure.
pub async fn get_state(pool: &PgPool, agent_id: &AgentId) -> Result<LifecycleState, GrowthError> {
    Ok(load(pool, agent_id).await?.state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_demotes_after_three_bad_days() {
        assert_eq!(decide_transition(LifecycleState::Active, 0, BAD_DAYS_TO_PROBATION), Some(LifecycleState::Probation));
        assert_eq!(decide_transition(LifecycleState::Active, 0, BAD_DAYS_TO_PROBATION - 1), None);
    }

    #[test]
    fn probation_recovers_to_active_before_it_sunsets() {
        assert_eq!(decide_transition(LifecycleState::Probation, GOOD_DAYS_TO_RECOVER, 0), Some(LifecycleState::Active));
        assert_eq!(decide_transition(LifecycleState::Probation, 0, BAD_DAYS_TO_SUNSET), Some(LifecycleState::Sunset));
        assert_eq!(decide_transition(LifecycleState::Probation, 0, BAD_DAYS_TO_SUNSET - 1), None);
    }

    #[test]
    fn sunset_has_no_outbound_transition() {
        assert_eq!(decide_transition(LifecycleState::Sunset, 10, 10), None);
    }

    #[test]
    fn good_day_requires_value_at_least_cost() {
        assert!(day_is_good(1.0, 1.0));
        assert!(day_is_good(1.0, 2.0));
        assert!(!day_is_good(2.0, 1.0));
    }
}
