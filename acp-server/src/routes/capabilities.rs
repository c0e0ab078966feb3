// acp-server/src/routes/capabilities.rs
// ============================================================================
// Module: Capability Token Routes
// Description: `POST /capabilities/{grant,revoke}`, `GET /capabilities`, `GET
//              /capabilities/delegations` (§6).
// ============================================================================

use acp_core::CapabilityScopes;
use acp_core::PrincipalId;
use acp_core::TokenId;
use acp_policy::capabilities::CapabilityToken;
use acp_policy::capabilities::GrantRequest;
use axum::Json;
use axum::Router;
use axum::extract::Query;
use axum::extract::State;
use axum::routing::get;
use axum::routing::post;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use crate::auth::RequestContext;
use crate::error::ApiResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/capabilities/grant", post(grant))
        .route("/capabilities/revoke", post(revoke))
        .route("/capabilities", get(list))
        .route("/capabilities/delegations", get(delegations))
}

#[derive(Debug, Deserialize)]
struct GrantRequestBody {
    issued_to_principal_id: PrincipalId,
    granted_by_principal_id: PrincipalId,
    parent_token_id: Option<TokenId>,
    #[serde(default)]
    scopes: CapabilityScopes,
    valid_until: Option<DateTime<Utc>>,
}

async fn grant(State(state): State<AppState>, ctx: RequestContext, Json(body): Json<GrantRequestBody>) -> ApiResult<Json<Value>> {
    let token = acp_policy::capabilities::grant(
        &state.pool,
        &state.writer,
        GrantRequest {
            workspace_id: ctx.workspace_id,
            issued_to_principal_id: body.issued_to_principal_id,
            granted_by_principal_id: body.granted_by_principal_id,
            parent_token_id: body.parent_token_id,
            requested_scopes: body.scopes,
            valid_until: body.valid_until,
            actor_id: ctx.actor_id,
        },
    )
    .await?;
    Ok(Json(to_dto(&token)))
}

#[derive(Debug, Deserialize)]
struct RevokeRequestBody {
    token_id: TokenId,
}

async fn revoke(State(state): State<AppState>, ctx: RequestContext, Json(body): Json<RevokeRequestBody>) -> ApiResult<Json<Value>> {
    acp_policy::capabilities::revoke(&state.pool, &state.writer, body.token_id, &ctx.actor_id).await?;
    Ok(Json(serde_json::json!({ "revoked": true })))
}

#[derive(Debug, Deserialize)]
struct PrincipalQuery {
    principal_id: PrincipalId,
}

async fn list(State(state): State<AppState>, Query(q): Query<PrincipalQuery>) -> ApiResult<Json<Value>> {
    let tokens = acp_policy::capabilities::list_by_principal(&state.pool, q.principal_id).await?;
    Ok(Json(serde_json::json!({ "capabilities": tokens.iter().map(to_dto).collect::<Vec<_>>() })))
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token_id: TokenId,
}

async fn delegations(State(state): State<AppState>, Query(q): Query<TokenQuery>) -> ApiResult<Json<Value>> {
    let children = acp_policy::capabilities::list_delegations(&state.pool, q.token_id).await?;
    Ok(Json(serde_json::json!({ "delegations": children })))
}

fn to_dto(token: &CapabilityToken) -> Value {
    serde_json::json!({
        "token_id": token.token_id,
        "workspace_id": token.workspace_id.as_str(),
        "issued_to_principal_id": token.issued_to_principal_id,
        "granted_by_principal_id": token.granted_by_principal_id,
        "parent_token_id": token.parent_token_id,
        "scopes": token.scopes,
        "valid_until": token.valid_until,
        "revoked_at": token.revoked_at,
    })
}

