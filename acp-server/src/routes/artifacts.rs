// acp-server/src/routes/artifacts.rs
// ============================================================================
// Module: Artifact Routes
// Description: `POST /steps/:stepId/artifacts`, `GET /artifacts`, `GET
//              /artifacts/:artifactId` (§6).
// ============================================================================

use acp_core::ArtifactId;
use acp_core::RunId;
use acp_core::StepId;
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
        .route("/steps/{step_id}/artifacts", post(create))
        .route("/artifacts", get(list))
        .route("/artifacts/{artifact_id}", get(get_one))
}

#[derive(Debug, Deserialize)]
struct CreateArtifactRequest {
    kind: String,
    uri: String,
    #[serde(default)]
    metadata: Value,
}

async fn create(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(step_id): Path<StepId>,
    Json(body): Json<CreateArtifactRequest>,
) -> ApiResult<Json<Value>> {
    let step = acp_store::runs::fetch_step(&state.pool, step_id).await?;
    let mut tx = state.pool.begin().await.map_err(acp_store::StoreError::from)?;
    let artifact_id = acp_store::runs::record_artifact(
        &mut tx,
        &state.writer,
        &step.workspace_id,
        step.run_id,
        Some(step_id),
        &ctx.actor_id,
        &body.kind,
        &body.uri,
        body.metadata,
    )
    .await?;
    tx.commit().await.map_err(acp_store::StoreError::from)?;
    Ok(Json(serde_json::json!({ "artifact_id": artifact_id })))
}

#[derive(Debug, Deserialize)]
struct ListArtifactsQuery {
    run_id: Option<RunId>,
    limit: Option<i64>,
}

async fn list(State(state): State<AppState>, Query(q): Query<ListArtifactsQuery>) -> ApiResult<Json<Value>> {
    let artifacts = acp_store::runs::list_artifacts(&state.pool, q.run_id, q.limit.unwrap_or(100).clamp(1, 1000)).await?;
    Ok(Json(serde_json::json!({ "artifacts": artifacts })))
}

async fn get_one(State(state): State<AppState>, Path(artifact_id): Path<ArtifactId>) -> ApiResult<Json<Value>> {
    let artifact = acp_store::runs::get_artifact(&state.pool, artifact_id).await?;
    Ok(Json(serde_json::json!(artifact)))
}
