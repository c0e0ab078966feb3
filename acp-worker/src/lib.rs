// acp-worker/src/lib.rs
// ============================================================================
// Module: Agent Control Plane Runtime Worker
// Description: Optional embedded loop that claims queued runs and drives
//              them through the lifecycle using the Policy Gate and
//              Egress Broker (§4.11).
// Purpose: Give `acp-server` (embedded mode) and a standalone worker
//          binary one `RunWorker` start/stop object.
// Dependencies: acp-core, acp-config, acp-store, acp-policy, acp-egress
// ============================================================================

//! ## Overview
//! Mirrors AgentKern's Arbiter package shape: a kill-switch-checked,
//! single-in-flight-guarded loop over claimed work, except the "lock" here
//! is a per-workspace PostgreSQL advisory lock rather than an in-memory
//! set, because claims must be correct across processes.

pub mod cycle;
pub mod error;
pub mod input;
pub mod run_loop;

pub use cycle::drive_claimed_run;
pub use error::WorkerError;
pub use input::RuntimeDirectives;
pub use input::RuntimePolicy;
pub use run_loop::RunWorker;
pub use run_loop::service_actor_id;
