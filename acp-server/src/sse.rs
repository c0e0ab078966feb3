// acp-server/src/sse.rs
// ============================================================================
// Module: Room Event Stream
// Description: `GET /v1/streams/rooms/:roomId?from_seq=` resumable SSE
//              stream over the room's event stream (§6).
// Purpose: Let a UI or agent tail a room live without polling `GET /events`
//          itself; resumable by `from_seq` so a dropped connection can
//          reattach without re-reading history it already has.
// Dependencies: acp-core, acp-store, axum, tokio, tokio-stream
// ============================================================================

use std::convert::Infallible;
use std::time::Duration;

use acp_store::events::EventFilter;
use axum::Router;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::response::Sse;
use axum::response::sse::Event;
use axum::response::sse::KeepAlive;
use axum::routing::get;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::auth::RequestContext;
use crate::state::AppState;

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const PAGE_SIZE: i64 = 200;
const CHANNEL_CAPACITY: usize = 64;

pub fn router() -> Router<AppState> {
    Router::new().route("/streams/rooms/{room_id}", get(room_stream))
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    from_seq: Option<i64>,
}

/// Streams `room.*` events as they are appended, starting just after
/// `from_seq` (or from the beginning of the stream when absent). The
/// underlying poll loop runs on its own task and exits once the client
/// drops the connection and the channel fills with no receiver left.
async fn room_stream(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(room_id): Path<String>,
    Query(q): Query<StreamQuery>,
) -> Sse<ReceiverStream<Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let workspace_id = ctx.workspace_id.clone();
    let mut cursor = q.from_seq.unwrap_or(0);

    tokio::spawn(async move {
        loop {
            let filter = EventFilter { stream: Some(("room".to_string(), room_id.clone())), ..EventFilter::default() };
            let batch = acp_store::events::list_events(&state.pool, &workspace_id, &filter, PAGE_SIZE).await;
            let mut batch = match batch {
                Ok(records) => records,
                Err(err) => {
                    tracing::error!(error = %err, "room stream poll failed");
                    tokio::time::sleep(POLL_INTERVAL).await;
                    continue;
                }
            };
            batch.sort_by_key(|record| record.stream_seq);

            let mut sent_any = false;
            for record in batch.into_iter().filter(|record| record.stream_seq > cursor) {
                cursor = record.stream_seq;
                let Ok(json) = serde_json::to_string(&record) else { continue };
                if tx.send(Ok(Event::default().data(json))).await.is_err() {
                    return;
                }
                sent_any = true;
            }
            if !sent_any {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    });

    Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default())
}
