// acp-server/src/routes/pipeline.rs
// ============================================================================
// Module: Pipeline Projection Route
// Description: `GET /pipeline/projection?limit=` (§4.12, §6).
// ============================================================================

use axum::Json;
use axum::Router;
use axum::extract::Query;
use axum::extract::State;
use axum::routing::get;
use serde::Deserialize;
use serde_json::Value;

use crate::auth::RequestContext;
use crate::error::ApiResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/pipeline/projection", get(projection))
}

#[derive(Debug, Deserialize)]
struct ProjectionQuery {
    limit: Option<i64>,
}

async fn projection(State(state): State<AppState>, ctx: RequestContext, Query(q): Query<ProjectionQuery>) -> ApiResult<Json<Value>> {
    let snapshot = acp_store::project_pipeline(&state.pool, &ctx.workspace_id, q.limit.unwrap_or(50).clamp(1, 500)).await?;
    Ok(Json(serde_json::json!(snapshot)))
}
