// acp-growth/src/skills.rs
// ============================================================================
// Module: Skill Ledger
// Description: Catalog, per-agent skill grants, and assessment history
//              (§4.9 Skill Ledger).
// Purpose: Record `skill.assessment.recorded` events so the
//          `project_skill_assessment` projector can seed the catalog, log
//          the assessment, and (on a pass) grant the skill.
// Dependencies: acp-core, acp-store
// ============================================================================

use acp_core::ActorId;
use acp_core::ActorType;
use acp_core::AgentId;
use acp_core::CorrelationId;
use acp_core::EventEnvelope;
use acp_core::SkillId;
use acp_core::StreamRef;
use acp_core::WorkspaceId;
use acp_core::Zone;
use acp_store::EventWriter;
use serde_json::Value;
use serde_json::json;
use sqlx::PgPool;
use sqlx::Row;

use crate::error::GrowthError;

/// Outcome of one skill assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssessmentStatus {
    /// Assessment has begun but not concluded.
    Started,
    /// Agent demonstrated the skill.
    Passed,
    /// Agent failed to demonstrate the skill.
    Failed,
}

impl AssessmentStatus {
    #[must_use]
    fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }
}

/// One row from `growth_skill_assessments`.
#[derive(Debug, Clone)]
pub struct AssessmentRow {
    /// Agent assessed.
    pub agent_id: AgentId,
    /// Skill assessed.
    pub skill_id: SkillId,
    /// Outcome of the assessment.
    pub status: String,
    /// Free-form assessment detail, e.g. `{"autonomous": true}`.
    pub detail: Option<Value>,
}

/// Records one assessment for `agent_id` against `skill_id`.
///
/// Emits `skill.assessment.recorded`; the projector seeds the skill
/// catalog, appends the assessment row, and — on [`AssessmentStatus::Passed`]
/// — grants the skill to the agent.
///
/// # Errors
///
/// Returns [`GrowthError::Store`] on event-append failure.
pub async fn record_assessment(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    agent_id: &AgentId,
    skill_id: &SkillId,
    status: AssessmentStatus,
    detail: Option<Value>,
    actor_id: &ActorId,
) -> Result<(), GrowthError> {
    let envelope = EventEnvelope {
        event_type: "skill.assessment.recorded".to_string(),
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
            "skill_id": skill_id.as_str(),
            "status": status.as_str(),
            "detail": detail,
        }),
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("skill-assessment:{agent_id}:{skill_id}")),
        causation_id: None,
        idempotency_key: None,
    };
    writer.append_to_stream(pool, envelope).await?;
    Ok(())
}

/// Records a batch of assessments, e.g. the package-activation sweep
/// §4.9 describes for imported skill packages. Each assessment is its own
/// event append; a failure partway through leaves the earlier assessments
/// durably recorded.
///
/// # Errors
///
/// Returns [`GrowthError::Store`] on the first event-append failure.
pub async fn record_batch(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    agent_id: &AgentId,
    assessments: &[(SkillId, AssessmentStatus, Option<Value>)],
    actor_id: &ActorId,
) -> Result<(), GrowthError> {
    for (skill_id, status, detail) in assessments {
        record_assessment(pool, writer, workspace_id, agent_id, skill_id, *status, detail.clone(), actor_id).await?;
    }
    Ok(())
}

/// Lists the skills an agent currently holds, from `growth_agent_skills`.
///
/// # Errors
///
/// Returns [`GrowthError::Store`] on database failure.
pub async fn list_agent_skills(pool: &PgPool, agent_id: &AgentId) -> Result<Vec<SkillId>, GrowthError> {
    let rows = sqlx::query("SELECT skill_id FROM growth_agent_skills WHERE agent_id = $1 ORDER BY acquired_at ASC")
        .bind(agent_id.as_str())
        .fetch_all(pool)
        .await?;
    rows.into_iter()
        .map(|row| Ok(SkillId::new(row.try_get::<String, _>("skill_id")?)))
        .collect()
}

/// Lists the assessment history for an agent/skill pair, most recent first.
///
/// # Errors
///
/// Returns [`GrowthError::Store`] on database failure.
pub async fn list_assessments(pool: &PgPool, agent_id: &AgentId, skill_id: &SkillId) -> Result<Vec<AssessmentRow>, GrowthError> {
    let rows = sqlx::query(
        "SELECT agent_id, skill_id, status, detail FROM growth_skill_assessments WHERE agent_id = $1 AND \
         skill_id = $2 ORDER BY created_at DESC",
    )
    .bind(agent_id.as_str())
    .bind(skill_id.as_str())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(AssessmentRow {
                agent_id: AgentId::new(row.try_get::<String, _>("agent_id")?),
                skill_id: SkillId::new(row.try_get::<String, _>("skill_id")?),
                status: row.try_get("status")?,
                detail: row.try_get("detail")?,
            })
        })
        .collect()
}
