// acp-growth/src/error.rs
// ============================================================================
// Module: Growth Error Taxonomy
// Description: Failure cases surfaced by trust scoring, the skill ledger,
//              and the lifecycle state machine.
// Purpose: Give callers a typed error distinct from the lower storage and
//          policy error types, while still bridging to `ReasonCode` where
//          an HTTP handler needs one.
// Dependencies: acp-core, acp-store, acp-policy, thiserror
// ============================================================================

use acp_core::ReasonCode;
use thiserror::Error;

/// Errors raised by the growth and learning layer (§4.9).
#[derive(Debug, Error)]
pub enum GrowthError {
    /// Underlying storage failure, surfaced by `acp-store` helper calls.
    #[error(transparent)]
    Store(#[from] acp_store::StoreError),
    /// A raw database driver error from a query this crate issued directly.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Underlying policy-layer failure, surfaced while recording a denial.
    #[error(transparent)]
    Policy(#[from] acp_policy::PolicyError),
    /// Referenced agent has no `proj_agents` row.
    #[error("agent not found: {0}")]
    AgentNotFound(String),
    /// Referenced skill package has no `growth_skill_packages` row.
    #[error("skill package not found: {0}")]
    PackageNotFound(String),
    /// A skill package was submitted without a signature.
    #[error("skill package {0} has no signature")]
    SignatureRequired(String),
    /// A skill package's content hash did not match its signed manifest.
    #[error("skill package {0} failed hash verification")]
    HashMismatch(String),
}

impl GrowthError {
    /// Maps this error to the stable reason code a Policy Gate caller or
    /// HTTP handler surfaces to clients.
    #[must_use]
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            Self::Store(_) | Self::Policy(_) | Self::Database(_) => ReasonCode::InternalError,
            Self::AgentNotFound(_) | Self::PackageNotFound(_) => ReasonCode::NotFound,
            Self::SignatureRequired(_) => ReasonCode::SignatureRequired,
            Self::HashMismatch(_) => ReasonCode::VerifyHashMismatch,
        }
    }
}
