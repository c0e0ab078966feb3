// acp-server/src/routes/egress.rs
// ============================================================================
// Module: Egress Routes
// Description: `POST /egress/requests`, `GET /egress/requests` (§4.8, §6).
// ============================================================================

use acp_growth::GrowthPolicyFailureSink;
use acp_policy::GateSubject;
use axum::Json;
use axum::Router;
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
    Router::new().route("/egress/requests", post(request_egress).get(list_requests))
}

#[derive(Debug, Deserialize)]
struct RequestEgressBody {
    target: String,
    method: Option<String>,
    justification: Option<String>,
}

async fn request_egress(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(body): Json<RequestEgressBody>,
) -> ApiResult<Json<Value>> {
    let subject = GateSubject {
        workspace_id: ctx.workspace_id.clone(),
        actor_type: ctx.actor_type,
        actor_id: ctx.actor_id.clone(),
        principal_id: ctx.principal_id,
        capability_token_id: ctx.capability_token_id,
        zone: ctx.zone,
        room_id: ctx.room_id,
        causation_event_id: None,
    };
    let sink = GrowthPolicyFailureSink::new(ctx.workspace_id.clone(), state.writer.clone());
    let decision = acp_egress::request_egress(
        &state.pool,
        &state.writer,
        &state.config,
        &sink,
        &subject,
        &body.target,
        body.method.as_deref(),
        body.justification.as_deref(),
    )
    .await?;
    Ok(Json(serde_json::json!({
        "decision": decision.decision,
        "reason_code": decision.reason_code,
        "blocked": decision.blocked,
        "approval_id": decision.approval_id,
    })))
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<i64>,
}

async fn list_requests(State(state): State<AppState>, ctx: RequestContext, Query(q): Query<LimitQuery>) -> ApiResult<Json<Value>> {
    let requests =
        acp_store::registry::list_egress_requests(&state.pool, &ctx.workspace_id, q.limit.unwrap_or(100).clamp(1, 1000)).await?;
    Ok(Json(serde_json::json!({ "requests": requests })))
}
