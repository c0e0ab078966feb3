// acp-server/src/state.rs
// ============================================================================
// Module: Server State
// Description: The shared, cloneable handle every axum extractor pulls
//              from: the connection pool, the event writer, process config,
//              and the growth-layer's Policy Gate failure sink.
// Purpose: One construction point for the dependencies every route module
//          needs, built once in `main` and threaded through the router.
// Dependencies: acp-config, acp-store, sqlx
// ============================================================================

use std::sync::Arc;

use acp_config::Config;
use acp_store::EventWriter;
use sqlx::PgPool;

/// Shared application state, cloned (cheaply, via `Arc`) into every
/// handler by axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// The connection pool shared by every handler.
    pub pool: PgPool,
    /// The single append path every mutating endpoint goes through.
    pub writer: EventWriter,
    /// Process-wide configuration, loaded once at startup.
    pub config: Arc<Config>,
}

impl AppState {
    /// Builds server state over an already-migrated pool.
    #[must_use]
    pub fn new(pool: PgPool, config: Config) -> Self {
        Self { pool, writer: EventWriter::new(), config: Arc::new(config) }
    }
}
