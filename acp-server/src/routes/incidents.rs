// acp-server/src/routes/incidents.rs
// ============================================================================
// Module: Incident Routes
// Description: `POST /incidents`, `POST /incidents/:id/{rca,learning,close}`,
//              `GET /incidents`, `GET /incidents/:id` (§6).
// ============================================================================

use acp_core::IdempotencyKey;
use acp_core::IncidentId;
use acp_core::RunId;
use acp_store::incidents::IncidentStatus;
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
        .route("/incidents", post(open_incident).get(list_incidents))
        .route("/incidents/{incident_id}", get(get_incident))
        .route("/incidents/{incident_id}/rca", post(record_rca))
        .route("/incidents/{incident_id}/learning", post(record_learning))
        .route("/incidents/{incident_id}/close", post(close_incident))
}

#[derive(Debug, Deserialize)]
struct OpenIncidentRequest {
    run_id: Option<RunId>,
    idempotency_key: Option<String>,
}

async fn open_incident(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(body): Json<OpenIncidentRequest>,
) -> ApiResult<Json<Value>> {
    let (incident_id, deduped) = acp_store::incidents::open(
        &state.pool,
        &state.writer,
        &ctx.workspace_id,
        body.run_id,
        ctx.actor_type,
        &ctx.actor_id,
        None,
        body.idempotency_key.map(IdempotencyKey::new),
    )
    .await?;
    Ok(Json(serde_json::json!({ "incident_id": incident_id, "deduped": deduped })))
}

#[derive(Debug, Deserialize)]
struct RcaRequest {
    rca: String,
}

async fn record_rca(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(incident_id): Path<IncidentId>,
    Json(body): Json<RcaRequest>,
) -> ApiResult<Json<Value>> {
    acp_store::incidents::record_update(
        &state.pool,
        &state.writer,
        &ctx.workspace_id,
        incident_id,
        ctx.actor_type,
        &ctx.actor_id,
        Some(&body.rca),
        None,
    )
    .await?;
    Ok(Json(serde_json::json!({ "incident_id": incident_id })))
}

#[derive(Debug, Deserialize)]
struct LearningRequest {
    entry: Value,
}

async fn record_learning(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(incident_id): Path<IncidentId>,
    Json(body): Json<LearningRequest>,
) -> ApiResult<Json<Value>> {
    acp_store::incidents::record_update(
        &state.pool,
        &state.writer,
        &ctx.workspace_id,
        incident_id,
        ctx.actor_type,
        &ctx.actor_id,
        None,
        Some(body.entry),
    )
    .await?;
    Ok(Json(serde_json::json!({ "incident_id": incident_id })))
}

async fn close_incident(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(incident_id): Path<IncidentId>,
) -> ApiResult<Json<Value>> {
    acp_store::incidents::close(&state.pool, &state.writer, &ctx.workspace_id, incident_id, ctx.actor_type, &ctx.actor_id).await?;
    Ok(Json(serde_json::json!({ "incident_id": incident_id, "status": "closed" })))
}

async fn get_incident(State(state): State<AppState>, Path(incident_id): Path<IncidentId>) -> ApiResult<Json<Value>> {
    let incident = acp_store::incidents::get(&state.pool, incident_id)
        .await?
        .ok_or_else(|| ApiError::Store(acp_store::StoreError::NotFound(format!("incident {incident_id}"))))?;
    Ok(Json(to_dto(&incident)))
}

#[derive(Debug, Deserialize)]
struct ListIncidentsQuery {
    status: Option<String>,
    limit: Option<i64>,
}

async fn list_incidents(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(q): Query<ListIncidentsQuery>,
) -> ApiResult<Json<Value>> {
    let status = q.status.as_deref().map(|raw| if raw == "closed" { IncidentStatus::Closed } else { IncidentStatus::Open });
    let incidents =
        acp_store::incidents::list(&state.pool, &ctx.workspace_id, status, q.limit.unwrap_or(100).clamp(1, 1000)).await?;
    Ok(Json(serde_json::json!({ "incidents": incidents.iter().map(to_dto).collect::<Vec<_>>() })))
}

fn to_dto(row: &acp_store::incidents::IncidentRow) -> Value {
    serde_json::json!({
        "incident_id": row.incident_id,
        "workspace_id": row.workspace_id.as_str(),
        "status": match row.status { IncidentStatus::Open => "open", IncidentStatus::Closed => "closed" },
        "run_id": row.run_id,
        "rca": row.rca,
        "learning_entries": row.learning_entries,
        "updated_at": row.updated_at,
    })
}
