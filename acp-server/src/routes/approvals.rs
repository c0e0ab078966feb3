// acp-server/src/routes/approvals.rs
// ============================================================================
// Module: Approval Routes
// Description: `POST /approvals`, `POST /approvals/:approvalId/decide`, `GET
//              /approvals`, `GET /approvals/:approvalId` (§6).
// ============================================================================

use acp_core::ApprovalId;
use acp_core::RoomId;
use acp_policy::approvals::ApprovalDecisionKind;
use acp_policy::approvals::ApprovalScope;
use acp_policy::approvals::RequestApproval;
use acp_policy::approvals::ScopeType;
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
        .route("/approvals", post(request_approval).get(list_approvals))
        .route("/approvals/{approval_id}", get(get_approval))
        .route("/approvals/{approval_id}/decide", post(decide_approval))
}

#[derive(Debug, Deserialize)]
struct ScopeRequest {
    scope_type: ScopeType,
    room_id: Option<RoomId>,
}

#[derive(Debug, Deserialize)]
struct RequestApprovalRequest {
    action: String,
    scope: ScopeRequest,
    ttl_seconds: Option<i64>,
    request_payload: Option<Value>,
}

async fn request_approval(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(body): Json<RequestApprovalRequest>,
) -> ApiResult<Json<Value>> {
    let approval = acp_policy::approvals::request(
        &state.pool,
        &state.writer,
        RequestApproval {
            workspace_id: ctx.workspace_id.clone(),
            scope: ApprovalScope { scope_type: body.scope.scope_type, room_id: body.scope.room_id, action: body.action },
            target_action: body.request_payload.clone().unwrap_or(Value::Null),
            ttl_seconds: body.ttl_seconds,
            request_payload: body.request_payload,
            actor_id: ctx.actor_id,
            actor_principal_id: ctx.principal_id,
        },
    )
    .await?;
    Ok(Json(serde_json::json!({ "approval_id": approval.approval_id })))
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    status: Option<String>,
    limit: Option<i64>,
}

async fn list_approvals(State(state): State<AppState>, ctx: RequestContext, Query(q): Query<StatusQuery>) -> ApiResult<Json<Value>> {
    let approvals =
        acp_policy::approvals::list(&state.pool, &ctx.workspace_id, q.status.as_deref(), q.limit.unwrap_or(100).clamp(1, 1000)).await?;
    Ok(Json(serde_json::json!({ "approvals": to_dtos(&approvals) })))
}

async fn get_approval(State(state): State<AppState>, Path(approval_id): Path<ApprovalId>) -> ApiResult<Json<Value>> {
    let approval = acp_policy::approvals::get(&state.pool, approval_id)
        .await?
        .ok_or_else(|| ApiError::Store(acp_store::StoreError::NotFound(format!("approval {approval_id}"))))?;
    Ok(Json(to_dto(&approval)))
}

#[derive(Debug, Deserialize)]
struct DecideRequest {
    decision: DecisionLabel,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum DecisionLabel {
    Approve,
    Deny,
    Hold,
}

async fn decide_approval(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(approval_id): Path<ApprovalId>,
    Json(body): Json<DecideRequest>,
) -> ApiResult<Json<Value>> {
    let decision = match body.decision {
        DecisionLabel::Approve => ApprovalDecisionKind::Approve,
        DecisionLabel::Deny => ApprovalDecisionKind::Deny,
        DecisionLabel::Hold => ApprovalDecisionKind::Hold,
    };
    acp_policy::approvals::decide(&state.pool, &state.writer, approval_id, decision, body.reason, &ctx.actor_id).await?;
    Ok(Json(serde_json::json!({ "decided": true })))
}

fn to_dto(row: &acp_policy::approvals::ApprovalRow) -> Value {
    serde_json::json!({
        "approval_id": row.approval_id,
        "workspace_id": row.workspace_id.as_str(),
        "status": row.status,
        "scope": row.scope,
        "target_action": row.target_action,
        "expires_at": row.expires_at,
    })
}

fn to_dtos(rows: &[acp_policy::approvals::ApprovalRow]) -> Vec<Value> {
    rows.iter().map(to_dto).collect()
}
