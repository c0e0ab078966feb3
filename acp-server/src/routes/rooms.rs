// acp-server/src/routes/rooms.rs
// ============================================================================
// Module: Room/Thread/Message Routes
// Description: `POST/GET /rooms`, `POST/GET /rooms/:roomId/threads`, `POST/GET
//              /threads/:threadId/messages` (§6).
// ============================================================================

use acp_core::RoomId;
use acp_core::ThreadId;
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
        .route("/rooms", post(create_room).get(list_rooms))
        .route("/rooms/{room_id}/threads", post(create_thread).get(list_threads))
        .route("/threads/{thread_id}/messages", post(post_message).get(list_messages))
}

#[derive(Debug, Deserialize)]
struct CreateRoomRequest {
    name: Option<String>,
}

async fn create_room(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(body): Json<CreateRoomRequest>,
) -> ApiResult<Json<Value>> {
    let room_id = acp_store::rooms::create_room(
        &state.pool,
        &state.writer,
        &ctx.workspace_id,
        ctx.actor_type,
        &ctx.actor_id,
        body.name.as_deref(),
    )
    .await?;
    Ok(Json(serde_json::json!({ "room_id": room_id })))
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<i64>,
}

async fn list_rooms(State(state): State<AppState>, ctx: RequestContext, Query(q): Query<LimitQuery>) -> ApiResult<Json<Value>> {
    let rooms = acp_store::rooms::list_rooms(&state.pool, &ctx.workspace_id, q.limit.unwrap_or(100).clamp(1, 1000)).await?;
    Ok(Json(serde_json::json!({ "rooms": to_room_dtos(&rooms) })))
}

#[derive(Debug, Deserialize)]
struct CreateThreadRequest {
    title: Option<String>,
}

async fn create_thread(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(room_id): Path<RoomId>,
    Json(body): Json<CreateThreadRequest>,
) -> ApiResult<Json<Value>> {
    let thread_id = acp_store::rooms::create_thread(
        &state.pool,
        &state.writer,
        &ctx.workspace_id,
        room_id,
        ctx.actor_type,
        &ctx.actor_id,
        body.title.as_deref(),
    )
    .await?;
    Ok(Json(serde_json::json!({ "thread_id": thread_id })))
}

async fn list_threads(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Query(q): Query<LimitQuery>,
) -> ApiResult<Json<Value>> {
    let threads = acp_store::rooms::list_threads(&state.pool, room_id, q.limit.unwrap_or(100).clamp(1, 1000)).await?;
    Ok(Json(serde_json::json!({ "threads": to_thread_dtos(&threads) })))
}

#[derive(Debug, Deserialize)]
struct PostMessageRequest {
    room_id: Option<RoomId>,
    body: Value,
}

async fn post_message(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(thread_id): Path<ThreadId>,
    Json(req): Json<PostMessageRequest>,
) -> ApiResult<Json<Value>> {
    let message_id = acp_store::rooms::post_message(
        &state.pool,
        &state.writer,
        &ctx.workspace_id,
        thread_id,
        req.room_id.or(ctx.room_id),
        ctx.actor_type,
        &ctx.actor_id,
        req.body,
    )
    .await?;
    Ok(Json(serde_json::json!({ "message_id": message_id })))
}

async fn list_messages(
    State(state): State<AppState>,
    Path(thread_id): Path<ThreadId>,
    Query(q): Query<LimitQuery>,
) -> ApiResult<Json<Value>> {
    let messages = acp_store::rooms::list_messages(&state.pool, thread_id, q.limit.unwrap_or(100).clamp(1, 1000)).await?;
    Ok(Json(serde_json::json!({ "messages": to_message_dtos(&messages) })))
}

fn to_room_dtos(rows: &[acp_store::RoomRow]) -> Vec<Value> {
    rows.iter()
        .map(|row| serde_json::json!({ "room_id": row.room_id, "workspace_id": row.workspace_id.as_str(), "name": row.name, "updated_at": row.updated_at }))
        .collect()
}

fn to_thread_dtos(rows: &[acp_store::ThreadRow]) -> Vec<Value> {
    rows.iter()
        .map(|row| {
            serde_json::json!({ "thread_id": row.thread_id, "room_id": row.room_id, "title": row.title, "updated_at": row.updated_at })
        })
        .collect()
}

fn to_message_dtos(rows: &[acp_store::MessageRow]) -> Vec<Value> {
    rows.iter()
        .map(|row| {
            serde_json::json!({
                "message_id": row.message_id,
                "thread_id": row.thread_id,
                "room_id": row.room_id,
                "author_actor_id": row.author_actor_id,
                "body": row.body,
                "created_at": row.created_at,
            })
        })
        .collect()
}
