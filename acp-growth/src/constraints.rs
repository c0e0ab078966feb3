// acp-growth/src/constraints.rs
// ============================================================================
// Module: Constraints & Mistakes
// Description: Turns a negative Policy Gate decision into a learned
//              constraint and a deduped mistake count (§4.9 Constraints &
//              Mistakes).
// Purpose: Implements `acp_policy::PolicyFailureSink`, the seam the Policy
//          Gate calls through so it never depends on `acp-growth` directly.
// Dependencies: acp-core, acp-store, acp-policy
// ============================================================================

use acp_core::ActorId;
use acp_core::ActorType;
use acp_core::AgentId;
use acp_core::CorrelationId;
use acp_core::Decision;
use acp_core::EventEnvelope;
use acp_core::PrincipalId;
use acp_core::StreamRef;
use acp_core::WorkspaceId;
use acp_core::Zone;
use acp_core::hashing::sha256_hex;
use acp_policy::PolicyError;
use acp_policy::PolicyFailureSink;
use acp_store::EventWriter;
use serde_json::json;
use sqlx::PgPool;

/// Records the constraint/mistake side effects of every negative Policy
/// Gate decision.
///
/// Constructed once per process and handed to the Policy Gate entrypoints
/// as `&dyn PolicyFailureSink`, mirroring how the teacher wires its own
/// tenant authorizer.
pub struct GrowthPolicyFailureSink {
    workspace_id: WorkspaceId,
    writer: EventWriter,
}

impl GrowthPolicyFailureSink {
    /// Builds a sink scoped to one workspace.
    #[must_use]
    pub fn new(workspace_id: WorkspaceId, writer: EventWriter) -> Self {
        Self { workspace_id, writer }
    }
}

#[async_trait::async_trait]
impl PolicyFailureSink for GrowthPolicyFailureSink {
    async fn record_failure_from_policy(
        &self,
        pool: &PgPool,
        principal_id: Option<PrincipalId>,
        decision: &Decision,
        action: &str,
    ) -> Result<(), PolicyError> {
        let Some(principal_id) = principal_id else {
            return Ok(());
        };
        let category = decision.decision_category();
        let pattern_hash = sha256_hex(format!("{principal_id}:{category}:{action}").as_bytes());
        record_constraint(pool, &self.writer, &self.workspace_id, principal_id, category, &pattern_hash, decision.reason_code.as_str())
            .await
            .map_err(PolicyError::Store)?;
        record_mistake(pool, &self.writer, &self.workspace_id, principal_id, category, &pattern_hash)
            .await
            .map_err(PolicyError::Store)?;

        if decision.blocked {
            let repeat_count = mistake_count(pool, principal_id, category, &pattern_hash).await.map_err(PolicyError::Store)?;
            if repeat_count >= QUARANTINE_THRESHOLD {
                if let Some(agent) = acp_store::agents::get_by_principal(pool, principal_id).await.map_err(PolicyError::Store)? {
                    if !agent.is_quarantined() {
                        quarantine_for_repeated_mistakes(pool, &self.writer, &self.workspace_id, &agent.agent_id, repeat_count)
                            .await
                            .map_err(PolicyError::Store)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Repeat-count threshold past which a blocked agent is auto-quarantined.
const QUARANTINE_THRESHOLD: i64 = 3;

/// Quarantines `agent_id` if it isn't already, atomically: the `UPDATE`
/// only matches a row still unquarantined, and `agent.quarantined` is
/// emitted solely when it did.
async fn quarantine_for_repeated_mistakes(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    agent_id: &AgentId,
    repeat_count: i64,
) -> Result<(), acp_store::StoreError> {
    let reason = format!("auto: {repeat_count} repeated policy failures");
    let newly_quarantined = sqlx::query(
        "UPDATE proj_agents SET quarantined_at = now(), quarantine_reason = $1, updated_at = \
         now() WHERE agent_id = $2 AND quarantined_at IS NULL",
    )
    .bind(&reason)
    .bind(agent_id.as_str())
    .execute(pool)
    .await?
    .rows_affected()
        > 0;

    if newly_quarantined {
        acp_store::agents::quarantine(pool, writer, workspace_id, agent_id, &reason, ActorType::Service, &ActorId::new("acp-growth")).await?;
    }
    Ok(())
}

trait DecisionCategory {
    fn decision_category(&self) -> &'static str;
}

impl DecisionCategory for Decision {
    fn decision_category(&self) -> &'static str {
        match self.decision {
            acp_core::DecisionKind::Deny => "deny",
            acp_core::DecisionKind::RequireApproval => "require_approval",
            acp_core::DecisionKind::Allow => "allow",
        }
    }
}

/// Appends `constraint.learned`; the projector upserts `sec_constraints`
/// keyed by `(principal_id, category, pattern_hash)`.
async fn record_constraint(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    principal_id: PrincipalId,
    category: &str,
    pattern_hash: &str,
    reason_code: &str,
) -> Result<(), acp_store::StoreError> {
    let envelope = EventEnvelope {
        event_type: "constraint.learned".to_string(),
        event_version: 1,
        occurred_at: chrono::Utc::now(),
        workspace_id: workspace_id.clone(),
        mission_id: None,
        room_id: None,
        thread_id: None,
        run_id: None,
        step_id: None,
        actor_type: ActorType::Service,
        actor_id: ActorId::new("acp-growth"),
        actor_principal_id: Some(principal_id),
        zone: Zone::Supervised,
        stream: StreamRef::workspace(workspace_id),
        data: json!({
            "principal_id": principal_id.to_string(),
            "category": category,
            "pattern_hash": pattern_hash,
            "reason_code": reason_code,
        }),
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("constraint:{principal_id}:{pattern_hash}")),
        causation_id: None,
        idempotency_key: None,
    };
    writer.append_to_stream(pool, envelope).await?;
    Ok(())
}

/// Appends `mistake.repeated`; the projector upserts
/// `sec_mistake_counters`, incrementing `repeat_count` on conflict.
async fn record_mistake(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    principal_id: PrincipalId,
    category: &str,
    pattern_hash: &str,
) -> Result<(), acp_store::StoreError> {
    let envelope = EventEnvelope {
        event_type: "mistake.repeated".to_string(),
        event_version: 1,
        occurred_at: chrono::Utc::now(),
        workspace_id: workspace_id.clone(),
        mission_id: None,
        room_id: None,
        thread_id: None,
        run_id: None,
        step_id: None,
        actor_type: ActorType::Service,
        actor_id: ActorId::new("acp-growth"),
        actor_principal_id: Some(principal_id),
        zone: Zone::Supervised,
        stream: StreamRef::workspace(workspace_id),
        data: json!({
            "principal_id": principal_id.to_string(),
            "category": category,
            "pattern_hash": pattern_hash,
        }),
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("mistake:{principal_id}:{pattern_hash}")),
        causation_id: None,
        idempotency_key: None,
    };
    writer.append_to_stream(pool, envelope).await?;
    Ok(())
}

/// Total times `(principal_id, category, pattern_hash)` has repeated, read
/// directly from `sec_mistake_counters`.
///
/// # Errors
///
/// Returns [`acp_store::StoreError`] on database failure.
pub async fn mistake_count(pool: &PgPool, principal_id: PrincipalId, category: &str, pattern_hash: &str) -> Result<i64, acp_store::StoreError> {
    use sqlx::Row;
    let row = sqlx::query(
        "SELECT repeat_count FROM sec_mistake_counters WHERE principal_id = $1 AND category = $2 \
         AND pattern_hash = $3",
    )
    .bind(principal_id.to_string())
    .bind(category)
    .bind(pattern_hash)
    .fetch_optional(pool)
    .await?;
    Ok(row.map_or(0, |row| row.try_get::<i64, _>("repeat_count").unwrap_or(0)))
}
