// acp-growth/src/trust.rs
// ============================================================================
// Module: Trust Scoring
// Description: Versioned signal mix producing the per-agent trust score in
//              `growth_agent_trust` (§4.9 Trust Score).
// Purpose: Turn pass rate, recent violations, repeated mistakes, and
//          autonomy rate into one comparable number, and emit
//          `trust.increased`/`trust.decreased` only on a meaningful move.
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
use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use sqlx::PgPool;
use sqlx::Row;

use crate::error::GrowthError;

/// Version of the signal mix below. Bump and keep the prior formula
/// available under a new match arm if the weights ever change, so that
/// historical `components` blobs stay interpretable.
pub const TRUST_SCORE_VERSION: i64 = 1;

/// Minimum absolute score delta that is worth announcing (§4.9).
const TRUST_DELTA_EPSILON: f64 = 0.01;

const WEIGHT_PASS_RATE: f64 = 0.4;
const WEIGHT_AUTONOMY: f64 = 0.2;
const WEIGHT_VIOLATIONS: f64 = 0.25;
const WEIGHT_MISTAKES: f64 = 0.15;

/// The persisted `growth_agent_trust` row.
#[derive(Debug, Clone)]
pub struct TrustRow {
    /// Agent this score belongs to.
    pub agent_id: AgentId,
    /// Tenancy boundary.
    pub workspace_id: WorkspaceId,
    /// Current score in `[0.0, 1.0]`.
    pub score: f64,
    /// Signal-mix version the score was last computed under.
    pub score_version: i64,
    /// Raw signal components behind `score`, for audit/debugging.
    pub components: Value,
    /// Last recompute time.
    pub updated_at: DateTime<Utc>,
}

/// Raw signals behind a trust score, versioned by [`TRUST_SCORE_VERSION`].
#[derive(Debug, Clone, Serialize)]
pub struct TrustComponents {
    /// Fraction of `growth_skill_assessments` rows with `status = 'passed'`.
    pub pass_rate: f64,
    /// Open `sec_constraints` rows bound to the agent's principal.
    pub recent_violations: i64,
    /// Sum of `sec_mistake_counters.repeat_count` for the agent's principal.
    pub repeated_mistakes: i64,
    /// Fraction of assessments tagged `detail.autonomous = true`.
    pub autonomy_rate: f64,
}

/// Reads the current trust row, if the agent has ever been scored.
///
/// # Errors
///
/// Returns [`GrowthError::Store`] on database failure.
pub async fn get(pool: &PgPool, agent_id: &AgentId) -> Result<Option<TrustRow>, GrowthError> {
    let row = sqlx::query(
        "SELECT agent_id, workspace_id, score, score_version, components, updated_at FROM \
         growth_agent_trust WHERE agent_id = $1",
    )
    .bind(agent_id.as_str())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    Ok(Some(TrustRow {
        agent_id: AgentId::new(row.try_get::<String, _>("agent_id")?),
        workspace_id: WorkspaceId::new(row.try_get::<String, _>("workspace_id")?),
        score: row.try_get("score")?,
        score_version: i64::from(row.try_get::<i32, _>("score_version")?),
        components: row.try_get("components")?,
        updated_at: row.try_get("updated_at")?,
    }))
}

/// Computes the current signal mix for `agent_id`, reading directly from
/// the tables the skill ledger and constraint tracker maintain.
///
/// # Errors
///
/// Returns [`GrowthError::Store`] on database failure.
pub async fn compute_components(pool: &PgPool, agent_id: &AgentId) -> Result<TrustComponents, GrowthError> {
    let assessment_row = sqlx::query(
        "SELECT COUNT(*) FILTER (WHERE status = 'passed') AS passed, COUNT(*) AS total, COUNT(*) \
         FILTER (WHERE detail->>'autonomous' = 'true') AS autonomous FROM growth_skill_assessments \
         WHERE agent_id = $1",
    )
    .bind(agent_id.as_str())
    .fetch_one(pool)
    .await?;
    let passed: i64 = assessment_row.try_get("passed")?;
    let total: i64 = assessment_row.try_get("total")?;
    let autonomous: i64 = assessment_row.try_get("autonomous")?;
    let pass_rate = if total == 0 { 1.0 } else { passed as f64 / total as f64 };
    let autonomy_rate = if total == 0 { 1.0 } else { autonomous as f64 / total as f64 };

    let principal_row = sqlx::query("SELECT principal_id FROM proj_agents WHERE agent_id = $1")
        .bind(agent_id.as_str())
        .fetch_optional(pool)
        .await?;
    let principal_id: Option<String> = match &principal_row {
        Some(row) => row.try_get("principal_id")?,
        None => None,
    };

    let (recent_violations, repeated_mistakes) = match principal_id {
        Some(principal_id) => {
            let violations_row = sqlx::query("SELECT COUNT(*) AS violation_count FROM sec_constraints WHERE principal_id = $1")
                .bind(&principal_id)
                .fetch_one(pool)
                .await?;
            let mistakes_row =
                sqlx::query("SELECT COALESCE(SUM(repeat_count), 0) AS mistake_total FROM sec_mistake_counters WHERE principal_id = $1")
                    .bind(&principal_id)
                    .fetch_one(pool)
                    .await?;
            (
                violations_row.try_get::<i64, _>("violation_count")?,
                mistakes_row.try_get::<i64, _>("mistake_total")?,
            )
        }
        None => (0, 0),
    };

    Ok(TrustComponents {
        pass_rate,
        recent_violations,
        repeated_mistakes,
        autonomy_rate,
    })
}

/// Saturating penalty: grows toward 1.0 as `count` grows, never reaching it.
fn penalty(count: i64) -> f64 {
    let count = count as f64;
    count / (count + 10.0)
}

/// Combines [`TrustComponents`] into a single score in `[0.0, 1.0]` under
/// [`TRUST_SCORE_VERSION`] 1's weights.
#[must_use]
pub fn score_from_components(components: &TrustComponents) -> f64 {
    let raw = WEIGHT_PASS_RATE * components.pass_rate + WEIGHT_AUTONOMY * components.autonomy_rate
        - WEIGHT_VIOLATIONS * penalty(components.recent_violations)
        - WEIGHT_MISTAKES * penalty(components.repeated_mistakes);
    raw.clamp(0.0, 1.0)
}

/// Recomputes `agent_id`'s trust score and, if it moved by more than
/// [`TRUST_DELTA_EPSILON`], appends `trust.increased` or `trust.decreased`
/// so the projector persists the new row.
///
/// Returns the row as it stands after this call: the freshly projected row
/// when the delta cleared the threshold, otherwise the row unchanged.
///
/// # Errors
///
/// Returns [`GrowthError::Store`] on database or event-append failure.
pub async fn recalculate(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    agent_id: &AgentId,
    actor_id: &ActorId,
) -> Result<TrustRow, GrowthError> {
    let components = compute_components(pool, agent_id).await?;
    let new_score = score_from_components(&components);
    let previous = get(pool, agent_id).await?;
    let previous_score = previous.as_ref().map_or(0.5, |row| row.score);
    let delta = new_score - previous_score;

    if delta.abs() < TRUST_DELTA_EPSILON {
        return Ok(previous.unwrap_or(TrustRow {
            agent_id: agent_id.clone(),
            workspace_id: workspace_id.clone(),
            score: previous_score,
            score_version: TRUST_SCORE_VERSION,
            components: json!({}),
            updated_at: Utc::now(),
        }));
    }

    let event_type = if delta > 0.0 { "trust.increased" } else { "trust.decreased" };
    let envelope = EventEnvelope {
        event_type: event_type.to_string(),
        event_version: 1,
        occurred_at: Utc::now(),
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
            "new_score": new_score,
            "score_version": TRUST_SCORE_VERSION,
            "components": components,
        }),
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("trust:{agent_id}")),
        causation_id: None,
        idempotency_key: None,
    };
    writer.append_to_stream(pool, envelope).await?;

    get(pool, agent_id).await?.ok_or_else(|| GrowthError::AgentNotFound(agent_id.to_string()))
}
