// acp-server/src/routes/agents.rs
// ============================================================================
// Module: Agent Routes
// Description: Agent registration/quarantine, the skill-package supply
//              chain, the skill ledger, trust scoring, and the autonomy
//              recommendation (§4.9, §6).
// ============================================================================

use acp_core::AgentId;
use acp_core::PrincipalId;
use acp_core::SkillId;
use acp_core::SkillPackageId;
use acp_growth::AssessmentStatus;
use acp_growth::PackageState;
use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::routing::get;
use axum::routing::post;
use serde::Deserialize;
use serde_json::Value;

use crate::auth::RequestContext;
use crate::error::ApiError;
use crate::error::ApiResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/agents", post(register_agent).get(list_agents))
        .route("/agents/{agent_id}", get(get_agent))
        .route("/agents/{agent_id}/quarantine", post(quarantine_agent))
        .route("/agents/{agent_id}/unquarantine", post(unquarantine_agent))
        .route("/agents/{agent_id}/skills/import", post(import_skill_package))
        .route("/agents/{agent_id}/skills/review-pending", post(review_pending_packages))
        .route("/agents/{agent_id}/skills/assess-imported", post(assess_imported))
        .route("/agents/{agent_id}/skills/certify-imported", post(certify_imported))
        .route("/agents/{agent_id}/skills/import-certify", post(import_certify))
        .route("/agents/{agent_id}/skills/onboarding-status", get(onboarding_status))
        .route("/agents/skills/onboarding-statuses", get(onboarding_statuses))
        .route("/agents/{agent_id}/trust", get(get_trust))
        .route("/agents/{agent_id}/trust/recalculate", post(recalculate_trust))
        .route("/agents/{agent_id}/approval-recommendation", get(approval_recommendation))
        .route("/agents/{agent_id}/autonomy/recommend", post(autonomy_recommend))
        .route("/agents/{agent_id}/autonomy/approve", post(autonomy_approve))
}

#[derive(Debug, Deserialize)]
struct RegisterAgentRequest {
    agent_id: String,
    principal_id: Option<PrincipalId>,
}

async fn register_agent(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(body): Json<RegisterAgentRequest>,
) -> ApiResult<Json<Value>> {
    let agent_id = AgentId::new(body.agent_id);
    acp_store::agents::register(&state.pool, &state.writer, &ctx.workspace_id, &agent_id, body.principal_id, ctx.actor_type, &ctx.actor_id)
        .await?;
    Ok(Json(serde_json::json!({ "agent_id": agent_id })))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<i64>,
}

async fn list_agents(State(state): State<AppState>, ctx: RequestContext, Query(q): Query<ListQuery>) -> ApiResult<Json<Value>> {
    let agents = acp_store::agents::list(&state.pool, &ctx.workspace_id, q.limit.unwrap_or(100).clamp(1, 1000)).await?;
    Ok(Json(serde_json::json!({ "agents": agents.iter().map(agent_dto).collect::<Vec<_>>() })))
}

async fn get_agent(State(state): State<AppState>, ctx: RequestContext, Path(agent_id): Path<AgentId>) -> ApiResult<Json<Value>> {
    let agent = acp_store::agents::get(&state.pool, &ctx.workspace_id, &agent_id)
        .await?
        .ok_or_else(|| ApiError::Store(acp_store::StoreError::NotFound(format!("agent {agent_id}"))))?;
    Ok(Json(agent_dto(&agent)))
}

#[derive(Debug, Deserialize)]
struct QuarantineRequest {
    reason: String,
}

async fn quarantine_agent(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(agent_id): Path<AgentId>,
    Json(body): Json<QuarantineRequest>,
) -> ApiResult<Json<Value>> {
    acp_store::agents::quarantine(&state.pool, &state.writer, &ctx.workspace_id, &agent_id, &body.reason, ctx.actor_type, &ctx.actor_id)
        .await?;
    Ok(Json(serde_json::json!({ "agent_id": agent_id, "quarantined": true })))
}

async fn unquarantine_agent(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(agent_id): Path<AgentId>,
) -> ApiResult<Json<Value>> {
    acp_store::agents::unquarantine(&state.pool, &state.writer, &ctx.workspace_id, &agent_id, ctx.actor_type, &ctx.actor_id).await?;
    Ok(Json(serde_json::json!({ "agent_id": agent_id, "quarantined": false })))
}

#[derive(Debug, Deserialize)]
struct ImportSkillPackageRequest {
    package_id: Option<SkillPackageId>,
    name: String,
    version: String,
    signature: Option<String>,
    content_hash: Option<String>,
}

async fn import_skill_package(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(agent_id): Path<AgentId>,
    Json(body): Json<ImportSkillPackageRequest>,
) -> ApiResult<Json<Value>> {
    let package_id = body.package_id.unwrap_or_else(SkillPackageId::new);
    acp_growth::packages::submit(
        &state.pool,
        &state.writer,
        &ctx.workspace_id,
        package_id,
        Some(&agent_id),
        &body.name,
        &body.version,
        body.signature.as_deref(),
        body.content_hash.as_deref(),
        &ctx.actor_id,
    )
    .await?;
    Ok(Json(serde_json::json!({ "package_id": package_id })))
}

async fn review_pending_packages(
    State(state): State<AppState>,
    Path(agent_id): Path<AgentId>,
) -> ApiResult<Json<Value>> {
    let pending = acp_growth::packages::list_by_agent(&state.pool, &agent_id, Some(PackageState::Pending)).await?;
    Ok(Json(serde_json::json!({ "pending": pending.iter().map(package_dto).collect::<Vec<_>>() })))
}

#[derive(Debug, Deserialize)]
struct AssessmentRequest {
    skill_id: SkillId,
    status: AssessmentLabel,
    detail: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum AssessmentLabel {
    Started,
    Passed,
    Failed,
}

#[derive(Debug, Deserialize)]
struct AssessImportedRequest {
    assessments: Vec<AssessmentRequest>,
}

async fn assess_imported(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(agent_id): Path<AgentId>,
    Json(body): Json<AssessImportedRequest>,
) -> ApiResult<Json<Value>> {
    let batch: Vec<(SkillId, AssessmentStatus, Option<Value>)> =
        body.assessments.into_iter().map(|item| (item.skill_id, assessment_status(item.status), item.detail)).collect();
    acp_growth::skills::record_batch(&state.pool, &state.writer, &ctx.workspace_id, &agent_id, &batch, &ctx.actor_id).await?;
    Ok(Json(serde_json::json!({ "agent_id": agent_id, "recorded": batch.len() })))
}

async fn certify_imported(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(agent_id): Path<AgentId>,
) -> ApiResult<Json<Value>> {
    let verified = acp_growth::packages::list_by_agent(&state.pool, &agent_id, Some(PackageState::Verified)).await?;
    for package in &verified {
        acp_growth::packages::activate(&state.pool, &state.writer, &ctx.workspace_id, package.package_id, &ctx.actor_id).await?;
    }
    Ok(Json(serde_json::json!({ "agent_id": agent_id, "activated": verified.iter().map(|p| p.package_id).collect::<Vec<_>>() })))
}

#[derive(Debug, Deserialize)]
struct ImportCertifyRequest {
    package_id: Option<SkillPackageId>,
    name: String,
    version: String,
    signature: String,
    manifest_bytes: Vec<u8>,
    content_hash: Option<String>,
    assessments: Vec<AssessmentRequest>,
}

async fn import_certify(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(agent_id): Path<AgentId>,
    Json(body): Json<ImportCertifyRequest>,
) -> ApiResult<Json<Value>> {
    let package_id = body.package_id.unwrap_or_else(SkillPackageId::new);
    acp_growth::packages::submit(
        &state.pool,
        &state.writer,
        &ctx.workspace_id,
        package_id,
        Some(&agent_id),
        &body.name,
        &body.version,
        Some(&body.signature),
        body.content_hash.as_deref(),
        &ctx.actor_id,
    )
    .await?;
    let verified_state =
        acp_growth::packages::verify(&state.pool, &state.writer, &ctx.workspace_id, package_id, Some(&body.signature), &body.manifest_bytes, &ctx.actor_id)
            .await?;

    let batch: Vec<(SkillId, AssessmentStatus, Option<Value>)> =
        body.assessments.into_iter().map(|item| (item.skill_id, assessment_status(item.status), item.detail)).collect();
    acp_growth::skills::record_batch(&state.pool, &state.writer, &ctx.workspace_id, &agent_id, &batch, &ctx.actor_id).await?;

    if matches!(verified_state, PackageState::Verified) {
        acp_growth::packages::activate(&state.pool, &state.writer, &ctx.workspace_id, package_id, &ctx.actor_id).await?;
    }

    Ok(Json(serde_json::json!({ "package_id": package_id, "state": package_state_label(verified_state), "assessed": batch.len() })))
}

async fn onboarding_status(State(state): State<AppState>, Path(agent_id): Path<AgentId>) -> ApiResult<Json<Value>> {
    Ok(Json(onboarding_status_dto(&state, &agent_id).await?))
}

async fn onboarding_statuses(State(state): State<AppState>, ctx: RequestContext, Query(q): Query<ListQuery>) -> ApiResult<Json<Value>> {
    let agents = acp_store::agents::list(&state.pool, &ctx.workspace_id, q.limit.unwrap_or(100).clamp(1, 1000)).await?;
    let mut statuses = Vec::with_capacity(agents.len());
    for agent in &agents {
        statuses.push(onboarding_status_dto(&state, &agent.agent_id).await?);
    }
    Ok(Json(serde_json::json!({ "statuses": statuses })))
}

async fn onboarding_status_dto(state: &AppState, agent_id: &AgentId) -> ApiResult<Value> {
    let skills = acp_growth::skills::list_agent_skills(&state.pool, agent_id).await?;
    let pending = acp_growth::packages::list_by_agent(&state.pool, agent_id, Some(PackageState::Pending)).await?;
    let verified = acp_growth::packages::list_by_agent(&state.pool, agent_id, Some(PackageState::Verified)).await?;
    let active = acp_growth::packages::list_by_agent(&state.pool, agent_id, Some(PackageState::Active)).await?;
    Ok(serde_json::json!({
        "agent_id": agent_id,
        "skills": skills,
        "pending_packages": pending.iter().map(package_dto).collect::<Vec<_>>(),
        "verified_packages": verified.iter().map(package_dto).collect::<Vec<_>>(),
        "active_packages": active.iter().map(package_dto).collect::<Vec<_>>(),
    }))
}

async fn get_trust(State(state): State<AppState>, Path(agent_id): Path<AgentId>) -> ApiResult<Json<Value>> {
    let trust = acp_growth::trust::get(&state.pool, &agent_id).await?;
    Ok(Json(serde_json::json!({ "agent_id": agent_id, "trust": trust.map(|row| serde_json::json!({
        "score": row.score,
        "score_version": row.score_version,
        "components": row.components,
        "updated_at": row.updated_at,
    })) })))
}

async fn recalculate_trust(State(state): State<AppState>, ctx: RequestContext, Path(agent_id): Path<AgentId>) -> ApiResult<Json<Value>> {
    let trust = acp_growth::trust::recalculate(&state.pool, &state.writer, &ctx.workspace_id, &agent_id, &ctx.actor_id).await?;
    Ok(Json(serde_json::json!({
        "agent_id": agent_id,
        "score": trust.score,
        "score_version": trust.score_version,
        "components": trust.components,
    })))
}

async fn approval_recommendation(State(state): State<AppState>, Path(agent_id): Path<AgentId>) -> ApiResult<Json<Value>> {
    let recommendation = acp_growth::autonomy::recommend(&state.pool, &agent_id).await?;
    Ok(Json(serde_json::json!(recommendation)))
}

async fn autonomy_recommend(State(state): State<AppState>, Path(agent_id): Path<AgentId>) -> ApiResult<Json<Value>> {
    let recommendation = acp_growth::autonomy::recommend(&state.pool, &agent_id).await?;
    Ok(Json(serde_json::json!(recommendation)))
}

async fn autonomy_approve(State(state): State<AppState>, ctx: RequestContext, Path(agent_id): Path<AgentId>) -> ApiResult<Json<Value>> {
    acp_growth::autonomy::approve(&state.pool, &state.writer, &ctx.workspace_id, &agent_id, &ctx.actor_id).await?;
    Ok(Json(serde_json::json!({ "agent_id": agent_id, "approved": true })))
}

fn assessment_status(label: AssessmentLabel) -> AssessmentStatus {
    match label {
        AssessmentLabel::Started => AssessmentStatus::Started,
        AssessmentLabel::Passed => AssessmentStatus::Passed,
        AssessmentLabel::Failed => AssessmentStatus::Failed,
    }
}

const fn package_state_label(state: PackageState) -> &'static str {
    match state {
        PackageState::Pending => "pending",
        PackageState::Verified => "verified",
        PackageState::Quarantined => "quarantined",
        PackageState::Active => "active",
        PackageState::Retired => "retired",
    }
}

fn package_dto(package: &acp_growth::PackageRow) -> Value {
    serde_json::json!({
        "package_id": package.package_id,
        "agent_id": package.agent_id,
        "name": package.name,
        "version": package.version,
        "state": package_state_label(package.state),
        "content_hash": package.content_hash,
        "quarantine_reason": package.quarantine_reason,
    })
}

fn agent_dto(agent: &acp_store::agents::AgentRow) -> Value {
    serde_json::json!({
        "agent_id": agent.agent_id,
        "workspace_id": agent.workspace_id.as_str(),
        "principal_id": agent.principal_id,
        "quarantined_at": agent.quarantined_at,
        "quarantine_reason": agent.quarantine_reason,
        "updated_at": agent.updated_at,
    })
}
