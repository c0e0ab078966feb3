// acp-server/src/routes/toolcalls.rs
// ============================================================================
// Module: Tool Call Routes
// Description: `POST /steps/:stepId/toolcalls`, `POST
//              /toolcalls/:toolCallId/{succeed,fail}`, `GET /toolcalls`, `GET
//              /toolcalls/:toolCallId` (§6).
// ============================================================================

use acp_core::RunId;
use acp_core::StepId;
use acp_core::ToolCallId;
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
        .route("/steps/{step_id}/toolcalls", post(invoke))
        .route("/toolcalls", get(list))
        .route("/toolcalls/{tool_call_id}", get(get_one))
        .route("/toolcalls/{tool_call_id}/succeed", post(succeed))
        .route("/toolcalls/{tool_call_id}/fail", post(fail))
}

#[derive(Debug, Deserialize)]
struct InvokeRequest {
    tool_name: String,
    #[serde(default)]
    request: Value,
}

async fn invoke(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(step_id): Path<StepId>,
    Json(body): Json<InvokeRequest>,
) -> ApiResult<Json<Value>> {
    let step = acp_store::runs::fetch_step(&state.pool, step_id).await?;
    let mut tx = state.pool.begin().await.map_err(acp_store::StoreError::from)?;
    let tool_call_id = acp_store::runs::invoke_tool_call(
        &mut tx,
        &state.writer,
        &step.workspace_id,
        step.run_id,
        step_id,
        &ctx.actor_id,
        &body.tool_name,
        body.request,
    )
    .await?;
    tx.commit().await.map_err(acp_store::StoreError::from)?;
    Ok(Json(serde_json::json!({ "tool_call_id": tool_call_id })))
}

#[derive(Debug, Deserialize)]
struct OutcomeRequest {
    #[serde(default)]
    response: Value,
}

async fn succeed(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(tool_call_id): Path<ToolCallId>,
    Json(body): Json<OutcomeRequest>,
) -> ApiResult<Json<Value>> {
    let call = acp_store::runs::get_tool_call(&state.pool, tool_call_id).await?;
    let (run_id, step_id) = require_run_step(call.run_id, call.step_id)?;
    let workspace_id = workspace_for(&state, run_id).await?;
    let mut tx = state.pool.begin().await.map_err(acp_store::StoreError::from)?;
    acp_store::runs::complete_tool_call(&mut tx, &state.writer, &workspace_id, run_id, step_id, tool_call_id, &ctx.actor_id, body.response)
        .await?;
    tx.commit().await.map_err(acp_store::StoreError::from)?;
    Ok(Json(serde_json::json!({ "succeeded": true })))
}

#[derive(Debug, Deserialize)]
struct FailRequest {
    #[serde(default)]
    error: Value,
}

async fn fail(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(tool_call_id): Path<ToolCallId>,
    Json(body): Json<FailRequest>,
) -> ApiResult<Json<Value>> {
    let call = acp_store::runs::get_tool_call(&state.pool, tool_call_id).await?;
    let (run_id, step_id) = require_run_step(call.run_id, call.step_id)?;
    let workspace_id = workspace_for(&state, run_id).await?;
    let mut tx = state.pool.begin().await.map_err(acp_store::StoreError::from)?;
    acp_store::runs::fail_tool_call(&mut tx, &state.writer, &workspace_id, run_id, step_id, tool_call_id, &ctx.actor_id, body.error).await?;
    tx.commit().await.map_err(acp_store::StoreError::from)?;
    Ok(Json(serde_json::json!({ "failed": true })))
}

#[derive(Debug, Deserialize)]
struct ListToolCallsQuery {
    run_id: Option<RunId>,
    limit: Option<i64>,
}

async fn list(State(state): State<AppState>, Query(q): Query<ListToolCallsQuery>) -> ApiResult<Json<Value>> {
    let calls = acp_store::runs::list_tool_calls(&state.pool, q.run_id, q.limit.unwrap_or(100).clamp(1, 1000)).await?;
    Ok(Json(serde_json::json!({ "tool_calls": calls })))
}

async fn get_one(State(state): State<AppState>, Path(tool_call_id): Path<ToolCallId>) -> ApiResult<Json<Value>> {
    let call = acp_store::runs::get_tool_call(&state.pool, tool_call_id).await?;
    Ok(Json(serde_json::json!(call)))
}

fn require_run_step(run_id: Option<RunId>, step_id: Option<StepId>) -> ApiResult<(RunId, StepId)> {
    match (run_id, step_id) {
        (Some(run_id), Some(step_id)) => Ok((run_id, step_id)),
        _ => Err(crate::error::ApiError::InvalidRequest("tool call is missing its run/step scope".to_string())),
    }
}

async fn workspace_for(state: &AppState, run_id: RunId) -> ApiResult<acp_core::WorkspaceId> {
    let run = acp_store::runs::get_run_summary(&state.pool, run_id).await?;
    Ok(run.workspace_id)
}
