// acp-server/src/routes/principals.rs
// ============================================================================
// Module: Principal Routes
// Description: `POST /principals/legacy/ensure` (§4.3, §6).
// ============================================================================

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::post;
use serde_json::Value;

use crate::auth::RequestContext;
use crate::error::ApiResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/principals/legacy/ensure", post(ensure))
}

async fn ensure(State(state): State<AppState>, ctx: RequestContext) -> ApiResult<Json<Value>> {
    let principal_id = acp_store::ensure_principal(&state.pool, &ctx.workspace_id, ctx.actor_type, ctx.actor_id.as_str()).await?;
    Ok(Json(serde_json::json!({ "principal_id": principal_id })))
}
