// acp-server/src/routes/mod.rs
// ============================================================================
// Module: Route Aggregation
// Description: Merges every resource router into one `/v1`-scoped
//              `Router<AppState>` (§6).
// ============================================================================

pub mod agents;
pub mod approvals;
pub mod artifacts;
pub mod audit;
pub mod capabilities;
pub mod egress;
pub mod events;
pub mod incidents;
pub mod pipeline;
pub mod policy;
pub mod principals;
pub mod rooms;
pub mod runs;
pub mod skills;
pub mod toolcalls;

use axum::Router;

use crate::state::AppState;

/// Builds the merged `/v1` router over every resource's sub-router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(agents::router())
        .merge(approvals::router())
        .merge(artifacts::router())
        .merge(audit::router())
        .merge(capabilities::router())
        .merge(egress::router())
        .merge(events::router())
        .merge(incidents::router())
        .merge(pipeline::router())
        .merge(policy::router())
        .merge(principals::router())
        .merge(rooms::router())
        .merge(runs::router())
        .merge(skills::router())
        .merge(toolcalls::router())
}
