// acp-growth/src/lib.rs
// ============================================================================
// Module: Agent Control Plane Growth & Learning
// Description: Trust scoring, the skill ledger and its package supply
//              chain, constraint/mistake tracking, daily snapshots, the
//              survival ledger, and agent lifecycle (§4.9).
// Purpose: Turn the event log's denial and assessment history into the
//          scores and state transitions the rest of the control plane
//          reads back.
// Dependencies: acp-core, acp-store, acp-policy
// ============================================================================

//! ## Overview
//! Like `acp-policy`, `acp-growth` never writes a `growth_*`/`sec_*` table
//! directly — every update is an event appended through
//! `acp_store::EventWriter`, with `acp-store`'s projection dispatch the
//! sole writer of record. `acp-growth` depends on `acp-policy` (not the
//! other way around) to implement [`acp_policy::PolicyFailureSink`],
//! closing the loop from a denied decision back to a learned constraint.

pub mod autonomy;
pub mod constraints;
pub mod error;
pub mod lifecycle;
pub mod packages;
pub mod skills;
pub mod snapshots;
pub mod trust;

pub use autonomy::AutonomyRecommendation;
pub use constraints::GrowthPolicyFailureSink;
pub use constraints::mistake_count;
pub use error::GrowthError;
pub use lifecycle::LifecycleState;
pub use lifecycle::apply_day_outcome;
pub use lifecycle::day_is_good;
pub use lifecycle::get_state as get_lifecycle_state;
pub use packages::PackageRow;
pub use packages::PackageState;
pub use skills::AssessmentRow;
pub use skills::AssessmentStatus;
pub use snapshots::TargetType;
pub use trust::TRUST_SCORE_VERSION;
pub use trust::TrustComponents;
pub use trust::TrustRow;
