// acp-server/src/routes/skills.rs
// ============================================================================
// Module: Skill Package Routes
// Description: `GET /skills/packages`, `POST /skills/packages/install`,
//              `POST /skills/packages/:id/{verify,quarantine}` (§4.9, §6).
// ============================================================================

use acp_core::AgentId;
use acp_core::SkillPackageId;
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
use crate::error::ApiResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/skills/packages", get(list_packages))
        .route("/skills/packages/install", post(install_package))
        .route("/skills/packages/{package_id}/verify", post(verify_package))
        .route("/skills/packages/{package_id}/quarantine", post(quarantine_package))
}

#[derive(Debug, Deserialize)]
struct ListPackagesQuery {
    agent_id: AgentId,
    state: Option<String>,
}

async fn list_packages(State(state): State<AppState>, Query(q): Query<ListPackagesQuery>) -> ApiResult<Json<Value>> {
    let filter = q.state.as_deref().map(parse_state);
    let packages = acp_growth::packages::list_by_agent(&state.pool, &q.agent_id, filter).await?;
    Ok(Json(serde_json::json!({ "packages": packages.iter().map(to_dto).collect::<Vec<_>>() })))
}

#[derive(Debug, Deserialize)]
struct InstallPackageRequest {
    package_id: Option<SkillPackageId>,
    agent_id: Option<AgentId>,
    name: String,
    version: String,
    signature: Option<String>,
    content_hash: Option<String>,
}

async fn install_package(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(body): Json<InstallPackageRequest>,
) -> ApiResult<Json<Value>> {
    let package_id = body.package_id.unwrap_or_else(SkillPackageId::new);
    acp_growth::packages::submit(
        &state.pool,
        &state.writer,
        &ctx.workspace_id,
        package_id,
        body.agent_id.as_ref(),
        &body.name,
        &body.version,
        body.signature.as_deref(),
        body.content_hash.as_deref(),
        &ctx.actor_id,
    )
    .await?;
    Ok(Json(serde_json::json!({ "package_id": package_id })))
}

#[derive(Debug, Deserialize)]
struct VerifyPackageRequest {
    signature: Option<String>,
    #[serde(default)]
    manifest_bytes: Vec<u8>,
}

async fn verify_package(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(package_id): Path<SkillPackageId>,
    Json(body): Json<VerifyPackageRequest>,
) -> ApiResult<Json<Value>> {
    let result = acp_growth::packages::verify(
        &state.pool,
        &state.writer,
        &ctx.workspace_id,
        package_id,
        body.signature.as_deref(),
        &body.manifest_bytes,
        &ctx.actor_id,
    )
    .await?;
    Ok(Json(serde_json::json!({ "package_id": package_id, "state": state_label(result) })))
}

#[derive(Debug, Deserialize)]
struct QuarantinePackageRequest {
    reason: String,
}

async fn quarantine_package(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(package_id): Path<SkillPackageId>,
    Json(body): Json<QuarantinePackageRequest>,
) -> ApiResult<Json<Value>> {
    acp_growth::packages::quarantine(&state.pool, &state.writer, &ctx.workspace_id, package_id, &body.reason, &ctx.actor_id).await?;
    Ok(Json(serde_json::json!({ "package_id": package_id, "state": "quarantined" })))
}

fn parse_state(raw: &str) -> PackageState {
    match raw {
        "verified" => PackageState::Verified,
        "quarantined" => PackageState::Quarantined,
        "active" => PackageState::Active,
        "retired" => PackageState::Retired,
        _ => PackageState::Pending,
    }
}

const fn state_label(state: PackageState) -> &'static str {
    match state {
        PackageState::Pending => "pending",
        PackageState::Verified => "verified",
        PackageState::Quarantined => "quarantined",
        PackageState::Active => "active",
        PackageState::Retired => "retired",
    }
}

fn to_dto(package: &acp_growth::PackageRow) -> Value {
    serde_json::json!({
        "package_id": package.package_id,
        "agent_id": package.agent_id,
        "name": package.name,
        "version": package.version,
        "state": state_label(package.state),
        "content_hash": package.content_hash,
        "quarantine_reason": package.quarantine_reason,
    })
}
