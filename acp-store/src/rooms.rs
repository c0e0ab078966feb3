// acp-store/src/rooms.rs
// ============================================================================
// Module: Rooms, Threads & Messages
// Description: Event-append primitives and read queries for the
//              room/thread/message family (§4.2's room/thread/message
//              projector).
// Purpose: The write path `acp-server` goes through for `POST /rooms`,
//          `/rooms/:id/threads`, and `/threads/:id/messages`.
// Dependencies: acp-core, crate::writer
// ============================================================================

use acp_core::ActorId;
use acp_core::ActorType;
use acp_core::CorrelationId;
use acp_core::EventEnvelope;
use acp_core::MessageId;
use acp_core::RoomId;
use acp_core::StreamRef;
use acp_core::ThreadId;
use acp_core::WorkspaceId;
use acp_core::Zone;
use chrono::DateTime;
use chrono::Utc;
use serde_json::Value;
use serde_json::json;
use sqlx::PgPool;
use sqlx::Row;

use crate::error::StoreError;
use crate::writer::EventWriter;

/// A projected room row.
#[derive(Debug, Clone)]
pub struct RoomRow {
    /// The room's identifier.
    pub room_id: RoomId,
    /// Tenancy boundary.
    pub workspace_id: WorkspaceId,
    /// Display name, if set.
    pub name: Option<String>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// A projected thread row.
#[derive(Debug, Clone)]
pub struct ThreadRow {
    /// The thread's identifier.
    pub thread_id: ThreadId,
    /// Tenancy boundary.
    pub workspace_id: WorkspaceId,
    /// The room this thread belongs to, if any.
    pub room_id: Option<RoomId>,
    /// Display title, if set.
    pub title: Option<String>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// A projected message row.
#[derive(Debug, Clone)]
pub struct MessageRow {
    /// The message's identifier.
    pub message_id: MessageId,
    /// The thread this message belongs to, if any.
    pub thread_id: Option<ThreadId>,
    /// The room this message belongs to, if any.
    pub room_id: Option<RoomId>,
    /// The actor who posted it.
    pub author_actor_id: String,
    /// Message payload.
    pub body: Value,
    /// Post time.
    pub created_at: DateTime<Utc>,
}

/// Appends `room.created`, creating a fresh [`RoomId`].
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn create_room(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    actor_type: ActorType,
    actor_id: &ActorId,
    name: Option<&str>,
) -> Result<RoomId, StoreError> {
    let room_id = RoomId::new();
    let envelope = EventEnvelope {
        event_type: "room.created".to_string(),
        event_version: 1,
        occurred_at: Utc::now(),
        workspace_id: workspace_id.clone(),
        mission_id: None,
        room_id: Some(room_id),
        thread_id: None,
        run_id: None,
        step_id: None,
        actor_type,
        actor_id: actor_id.clone(),
        actor_principal_id: None,
        zone: Zone::Supervised,
        stream: StreamRef::room(room_id),
        data: json!({ "name": name }),
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("room:{room_id}")),
        causation_id: None,
        idempotency_key: None,
    };
    writer.append_to_stream(pool, envelope).await?;
    Ok(room_id)
}

/// Appends `thread.created`, creating a fresh [`ThreadId`].
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn create_thread(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    room_id: RoomId,
    actor_type: ActorType,
    actor_id: &ActorId,
    title: Option<&str>,
) -> Result<ThreadId, StoreError> {
    let thread_id = ThreadId::new();
    let envelope = EventEnvelope {
        event_type: "thread.created".to_string(),
        event_version: 1,
        occurred_at: Utc::now(),
        workspace_id: workspace_id.clone(),
        mission_id: None,
        room_id: Some(room_id),
        thread_id: Some(thread_id),
        run_id: None,
        step_id: None,
        actor_type,
        actor_id: actor_id.clone(),
        actor_principal_id: None,
        zone: Zone::Supervised,
        stream: StreamRef::room(room_id),
        data: json!({ "title": title }),
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("thread:{thread_id}")),
        causation_id: None,
        idempotency_key: None,
    };
    writer.append_to_stream(pool, envelope).await?;
    Ok(thread_id)
}

/// Appends `message.posted`, creating a fresh [`MessageId`].
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
#[allow(clippy::too_many_arguments)]
pub async fn post_message(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    thread_id: ThreadId,
    room_id: Option<RoomId>,
    actor_type: ActorType,
    actor_id: &ActorId,
    body: Value,
) -> Result<MessageId, StoreError> {
    let message_id = MessageId::new();
    let stream = room_id.map_or_else(|| StreamRef::workspace(workspace_id), StreamRef::room);
    let envelope = EventEnvelope {
        event_type: "message.posted".to_string(),
        event_version: 1,
        occurred_at: Utc::now(),
        workspace_id: workspace_id.clone(),
        mission_id: None,
        room_id,
        thread_id: Some(thread_id),
        run_id: None,
        step_id: None,
        actor_type,
        actor_id: actor_id.clone(),
        actor_principal_id: None,
        zone: Zone::Supervised,
        stream,
        data: json!({ "message_id": message_id, "body": body }),
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("message:{message_id}")),
        causation_id: None,
        idempotency_key: None,
    };
    writer.append_to_stream(pool, envelope).await?;
    Ok(message_id)
}

/// Lists rooms in a workspace, most recently updated first.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn list_rooms(pool: &PgPool, workspace_id: &WorkspaceId, limit: i64) -> Result<Vec<RoomRow>, StoreError> {
    let rows = sqlx::query(
        "SELECT room_id, workspace_id, name, updated_at FROM proj_rooms WHERE workspace_id = \
         $1 ORDER BY updated_at DESC LIMIT $2",
    )
    .bind(workspace_id.as_str())
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_room).collect()
}

/// Lists threads in a room, most recently updated first.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn list_threads(pool: &PgPool, room_id: RoomId, limit: i64) -> Result<Vec<ThreadRow>, StoreError> {
    let rows = sqlx::query(
        "SELECT thread_id, workspace_id, room_id, title, updated_at FROM proj_threads WHERE \
         room_id = $1 ORDER BY updated_at DESC LIMIT $2",
    )
    .bind(room_id.to_string())
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_thread).collect()
}

/// Lists messages in a thread, oldest first.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn list_messages(pool: &PgPool, thread_id: ThreadId, limit: i64) -> Result<Vec<MessageRow>, StoreError> {
    let rows = sqlx::query(
        "SELECT message_id, thread_id, room_id, author_actor_id, body, created_at FROM \
         proj_messages WHERE thread_id = $1 ORDER BY created_at ASC LIMIT $2",
    )
    .bind(thread_id.to_string())
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_message).collect()
}

fn row_to_room(row: &sqlx::postgres::PgRow) -> Result<RoomRow, StoreError> {
    Ok(RoomRow {
        room_id: parse_room_id(row.try_get("room_id")?),
        workspace_id: WorkspaceId::new(row.try_get::<String, _>("workspace_id")?),
        name: row.try_get("name")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_thread(row: &sqlx::postgres::PgRow) -> Result<ThreadRow, StoreError> {
    let room_id: Option<String> = row.try_get("room_id")?;
    Ok(ThreadRow {
        thread_id: parse_thread_id(row.try_get("thread_id")?),
        workspace_id: WorkspaceId::new(row.try_get::<String, _>("workspace_id")?),
        room_id: room_id.map(parse_room_id),
        title: row.try_get("title")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_message(row: &sqlx::postgres::PgRow) -> Result<MessageRow, StoreError> {
    let thread_id: Option<String> = row.try_get("thread_id")?;
    let room_id: Option<String> = row.try_get("room_id")?;
    Ok(MessageRow {
        message_id: parse_message_id(row.try_get("message_id")?),
        thread_id: thread_id.map(parse_thread_id),
        room_id: room_id.map(parse_room_id),
        author_actor_id: row.try_get("author_actor_id")?,
        body: row.try_get::<Option<Value>, _>("body")?.unwrap_or(Value::Null),
        created_at: row.try_get("created_at")?,
    })
}

fn parse_room_id(raw: String) -> RoomId {
    raw.parse::<uuid::Uuid>().map(RoomId::from_uuid).unwrap_or_else(|_| RoomId::new())
}

fn parse_thread_id(raw: String) -> ThreadId {
    raw.parse::<uuid::Uuid>().map(ThreadId::from_uuid).unwrap_or_else(|_| ThreadId::new())
}

fn parse_message_id(raw: String) -> MessageId {
    raw.parse::<uuid::Uuid>().map(MessageId::from_uuid).unwrap_or_else(|_| MessageId::new())
}
