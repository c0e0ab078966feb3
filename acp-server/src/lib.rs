// acp-server/src/lib.rs
// ============================================================================
// Module: Control Plane HTTP Server
// Description: Assembles the `/v1` REST surface and the resumable room
//              event stream into one `axum::Router` (§6).
// Purpose: Keep router construction importable by both `main.rs` and
//          integration tests, independent of process startup concerns.
// Dependencies: axum, tower, tower-http
// ============================================================================

pub mod auth;
pub mod error;
pub mod routes;
pub mod sse;
pub mod state;

use axum::Router;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Builds the full server router: every resource route under `/v1`, the
/// room event stream under `/v1/streams`, and request tracing.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .nest("/v1", routes::router().merge(sse::router()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
