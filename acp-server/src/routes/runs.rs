// acp-server/src/routes/runs.rs
// ============================================================================
// Module: Run Lifecycle Routes
// Description: `POST /runs`, `POST /runs/:runId/{start,complete,fail}`,
//              `POST /runs/:runId/steps`, `POST /runs/claim`, `POST
//              /runs/:runId/lease/{heartbeat,release}`, `GET /runs`, `GET
//              /runs/:runId`, `GET /runs/:runId/evidence`, `POST
//              /runs/:runId/evidence/finalize` (§6).
// ============================================================================

use acp_core::RoomId;
use acp_core::RunId;
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
        .route("/runs", post(queue_run).get(list_runs))
        .route("/runs/claim", post(claim_run))
        .route("/runs/{run_id}", get(get_run))
        .route("/runs/{run_id}/start", post(start_run))
        .route("/runs/{run_id}/complete", post(complete_run))
        .route("/runs/{run_id}/fail", post(fail_run))
        .route("/runs/{run_id}/steps", post(start_step))
        .route("/runs/{run_id}/lease/heartbeat", post(heartbeat))
        .route("/runs/{run_id}/lease/release", post(release))
        .route("/runs/{run_id}/evidence", get(get_evidence))
        .route("/runs/{run_id}/evidence/finalize", post(finalize_evidence))
}

#[derive(Debug, Deserialize)]
struct QueueRunRequest {
    room_id: Option<RoomId>,
    experiment_id: Option<String>,
    #[serde(default)]
    input: Value,
}

async fn queue_run(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(body): Json<QueueRunRequest>,
) -> ApiResult<Json<Value>> {
    let run_id = acp_store::runs::queue_run(
        &state.pool,
        &state.writer,
        &ctx.workspace_id,
        body.room_id.or(ctx.room_id),
        ctx.actor_type,
        &ctx.actor_id,
        ctx.principal_id,
        ctx.zone,
        body.experiment_id.as_deref(),
        body.input,
    )
    .await?;
    Ok(Json(serde_json::json!({ "run_id": run_id })))
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    status: Option<String>,
    limit: Option<i64>,
}

async fn list_runs(State(state): State<AppState>, ctx: RequestContext, Query(q): Query<StatusQuery>) -> ApiResult<Json<Value>> {
    let runs = acp_store::runs::list_runs(&state.pool, &ctx.workspace_id, q.status.as_deref(), q.limit.unwrap_or(100).clamp(1, 1000)).await?;
    Ok(Json(serde_json::json!({ "runs": runs })))
}

async fn get_run(State(state): State<AppState>, Path(run_id): Path<RunId>) -> ApiResult<Json<Value>> {
    let run = acp_store::runs::get_run_summary(&state.pool, run_id).await?;
    Ok(Json(serde_json::json!(run)))
}

#[derive(Debug, Deserialize)]
struct ClaimRunRequest {
    room_id: Option<String>,
}

async fn claim_run(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(body): Json<ClaimRunRequest>,
) -> ApiResult<Json<Value>> {
    let claimed = acp_store::runs::claim_and_start_run(
        &state.pool,
        &state.writer,
        &ctx.workspace_id,
        body.room_id.as_deref(),
        state.config.run_lease_ttl,
        &ctx.actor_id,
    )
    .await?;
    Ok(Json(serde_json::json!({
        "run_id": claimed.run_id,
        "claim_token": claimed.claim_token,
        "lease_expires_at": claimed.lease_expires_at,
    })))
}

async fn start_run(State(state): State<AppState>, ctx: RequestContext, Path(run_id): Path<RunId>) -> ApiResult<Json<Value>> {
    let claimed =
        acp_store::runs::start_run(&state.pool, &state.writer, &ctx.workspace_id, run_id, state.config.run_lease_ttl, &ctx.actor_id)
            .await?;
    Ok(Json(serde_json::json!({
        "run_id": claimed.run_id,
        "claim_token": claimed.claim_token,
        "lease_expires_at": claimed.lease_expires_at,
    })))
}

async fn complete_run(State(state): State<AppState>, ctx: RequestContext, Path(run_id): Path<RunId>) -> ApiResult<Json<Value>> {
    let event = acp_store::runs::complete_run(&state.pool, &state.writer, &ctx.workspace_id, run_id, &ctx.actor_id).await?;
    Ok(Json(serde_json::json!({ "event_id": event.event_id })))
}

#[derive(Debug, Deserialize)]
struct FailRunRequest {
    #[serde(default)]
    error: Value,
}

async fn fail_run(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(run_id): Path<RunId>,
    Json(body): Json<FailRunRequest>,
) -> ApiResult<Json<Value>> {
    let event = acp_store::runs::fail_run(&state.pool, &state.writer, &ctx.workspace_id, run_id, &ctx.actor_id, body.error).await?;
    Ok(Json(serde_json::json!({ "event_id": event.event_id })))
}

async fn start_step(State(state): State<AppState>, ctx: RequestContext, Path(run_id): Path<RunId>) -> ApiResult<Json<Value>> {
    let mut tx = state.pool.begin().await.map_err(acp_store::StoreError::from)?;
    let step_id = acp_store::runs::start_step(&mut tx, &state.writer, &ctx.workspace_id, run_id, &ctx.actor_id).await?;
    tx.commit().await.map_err(acp_store::StoreError::from)?;
    Ok(Json(serde_json::json!({ "step_id": step_id })))
}

#[derive(Debug, Deserialize)]
struct LeaseTokenRequest {
    claim_token: String,
}

async fn heartbeat(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
    Json(body): Json<LeaseTokenRequest>,
) -> ApiResult<Json<Value>> {
    let lease_expires_at = acp_store::leases::heartbeat(&state.pool, run_id, &body.claim_token, state.config.run_lease_ttl).await?;
    Ok(Json(serde_json::json!({ "lease_expires_at": lease_expires_at })))
}

async fn release(State(state): State<AppState>, Path(run_id): Path<RunId>, Json(body): Json<LeaseTokenRequest>) -> ApiResult<Json<Value>> {
    acp_store::leases::release(&state.pool, run_id, &body.claim_token).await?;
    Ok(Json(serde_json::json!({ "released": true })))
}

async fn get_evidence(State(state): State<AppState>, Path(run_id): Path<RunId>) -> ApiResult<Json<Value>> {
    let evidence = acp_store::runs::get_run_evidence(&state.pool, run_id).await?;
    Ok(Json(serde_json::json!(evidence)))
}

async fn finalize_evidence(State(state): State<AppState>, ctx: RequestContext, Path(run_id): Path<RunId>) -> ApiResult<Json<Value>> {
    let event =
        acp_store::runs::finalize_evidence(&state.pool, &state.writer, &ctx.workspace_id, run_id, ctx.actor_type, &ctx.actor_id).await?;
    Ok(Json(serde_json::json!({ "event_id": event.event_id })))
}
