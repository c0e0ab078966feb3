// acp-server/src/routes/events.rs
// ============================================================================
// Module: Event Query Routes
// Description: `GET /events`, `GET /events/:eventId` (§6).
// ============================================================================

use acp_core::EventId;
use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::routing::get;
use serde::Deserialize;

use crate::auth::RequestContext;
use crate::error::ApiResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/events", get(list_events)).route("/events/{event_id}", get(get_event))
}

#[derive(Debug, Deserialize)]
struct ListEventsQuery {
    stream_type: Option<String>,
    stream_id: Option<String>,
    run_id: Option<String>,
    correlation_id: Option<String>,
    event_type: Option<String>,
    subject_agent_id: Option<String>,
    subject_principal_id: Option<String>,
    limit: Option<i64>,
}

async fn list_events(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(params): Query<ListEventsQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let filter = acp_store::events::EventFilter {
        stream: params.stream_type.zip(params.stream_id),
        run_id: params.run_id,
        correlation_id: params.correlation_id,
        event_types: params.event_type.map(|csv| csv.split(',').map(str::trim).map(str::to_string).collect()).unwrap_or_default(),
        subject_agent_id: params.subject_agent_id,
        subject_principal_id: params.subject_principal_id,
    };
    let limit = params.limit.unwrap_or(100).clamp(1, 1000);
    let events = acp_store::events::list_events(&state.pool, &ctx.workspace_id, &filter, limit).await?;
    Ok(Json(serde_json::json!({ "events": events })))
}

async fn get_event(State(state): State<AppState>, Path(event_id): Path<EventId>) -> ApiResult<Json<serde_json::Value>> {
    let event = acp_store::events::get_event(&state.pool, event_id).await?;
    Ok(Json(serde_json::json!(event)))
}
