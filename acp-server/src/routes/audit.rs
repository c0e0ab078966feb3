// acp-server/src/routes/audit.rs
// ============================================================================
// Module: Audit Routes
// Description: `GET /audit/hash-chain/verify`, `GET /audit/redactions`
//              (§4.10, §6).
// ============================================================================

use acp_core::EventId;
use acp_store::audit::RedactionLogFilter;
use axum::Json;
use axum::Router;
use axum::extract::Query;
use axum::extract::State;
use axum::routing::get;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/audit/hash-chain/verify", get(verify_hash_chain))
        .route("/audit/redactions", get(list_redactions))
}

#[derive(Debug, Deserialize)]
struct VerifyQuery {
    stream_type: String,
    stream_id: String,
    limit: Option<i64>,
}

async fn verify_hash_chain(State(state): State<AppState>, Query(q): Query<VerifyQuery>) -> ApiResult<Json<Value>> {
    let report = acp_store::verify_hash_chain(&state.pool, &q.stream_type, &q.stream_id, q.limit.unwrap_or(10_000).clamp(1, 100_000))
        .await?;
    Ok(Json(serde_json::json!(report)))
}

#[derive(Debug, Deserialize)]
struct RedactionQuery {
    event_id: Option<EventId>,
    rule_id: Option<String>,
    action: Option<String>,
    stream_type: Option<String>,
    stream_id: Option<String>,
    limit: Option<i64>,
}

async fn list_redactions(State(state): State<AppState>, Query(q): Query<RedactionQuery>) -> ApiResult<Json<Value>> {
    let filter = RedactionLogFilter {
        event_id: q.event_id,
        rule_id: q.rule_id,
        action: q.action,
        stream_type: q.stream_type,
        stream_id: q.stream_id,
    };
    let entries = acp_store::query_redaction_log(&state.pool, &filter, q.limit.unwrap_or(100).clamp(1, 1000)).await?;
    Ok(Json(serde_json::json!({ "redactions": entries })))
}
