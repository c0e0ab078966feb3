// acp-store/src/lib.rs
// ============================================================================
// Module: Agent Control Plane Store
// Description: Postgres-backed event log, projection engine, lease
//              persistence, and audit queries.
// Purpose: Single data-access layer shared by acp-policy, acp-growth,
//          acp-egress, acp-worker, acp-server, and acp-cli.
// Dependencies: crate::{migrations, error, dlp, writer, rows, leases,
//               projections, audit}, sqlx
// ============================================================================

//! ## Overview
//! `acp-store` owns every table the control plane reads or writes:
//! `evt_events` (the append-only log), the `proj_*` read models, and the
//! `growth_*`/`sec_*` tables backing the learning and security layers. It
//! depends only on `acp-core` — policy, growth, egress, worker, server, and
//! CLI all build on top of it rather than on raw SQL of their own.

pub mod agents;
pub mod audit;
pub mod dlp;
pub mod error;
pub mod events;
pub mod incidents;
pub mod leases;
pub mod migrations;
pub mod pipeline;
pub mod principals;
pub mod projections;
pub mod registry;
pub mod rooms;
pub mod rows;
pub mod runs;
pub mod writer;

pub use agents::AgentRow;
pub use audit::HashChainReport;
pub use audit::RedactionLogEntry;
pub use audit::RedactionLogFilter;
pub use audit::query_redaction_log;
pub use audit::verify_hash_chain;
pub use dlp::Finding;
pub use dlp::RegexSecretScanner;
pub use dlp::SecretPattern;
pub use error::StoreError;
pub use incidents::IncidentRow;
pub use incidents::IncidentStatus;
pub use leases::ClaimedRun;
pub use migrations::migrate;
pub use pipeline::PipelineProjection;
pub use pipeline::project as project_pipeline;
pub use principals::PrincipalRow;
pub use principals::ensure_principal;
pub use principals::find_principal;
pub use registry::count_egress_requests_since;
pub use registry::get_action_registry_entry;
pub use registry::is_principal_quarantined;
pub use rooms::MessageRow;
pub use rooms::RoomRow;
pub use rooms::ThreadRow;
pub use runs::RunRow;
pub use runs::claim_and_start_run;
pub use runs::fetch_run;
pub use writer::EventWriter;
pub use writer::POLICY_IDEMPOTENCY_PREFIX;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Opens a connection pool against `database_url` and runs migrations.
///
/// This is the entry point every binary (`acp-server`, `acp-worker`,
/// `acp-cli`) uses to stand up storage before serving traffic.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if the pool cannot be established or a
/// migration statement fails.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    migrations::migrate(&pool).await?;
    Ok(pool)
}
