// acp-egress/src/error.rs
// ============================================================================
// Module: Egress Broker Errors
// Description: Failure cases surfaced while normalizing, authorizing, and
//              recording an outbound request (§4.8).
// Purpose: Bridge `acp-policy`'s error taxonomy to one type callers of
//          `request_egress` handle without reaching into the gate.
// Dependencies: acp-core, acp-policy
// ============================================================================

use acp_core::ReasonCode;
use thiserror::Error;

/// Errors raised by the egress broker.
#[derive(Debug, Error)]
pub enum EgressError {
    /// Underlying policy-gate failure.
    #[error(transparent)]
    Policy(#[from] acp_policy::PolicyError),
    /// `url` or `domain` was empty, or the URL carried no host.
    #[error("invalid egress target: {0}")]
    InvalidTarget(String),
}

impl EgressError {
    /// Maps this error onto the stable reason-code taxonomy.
    #[must_use]
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            Self::Policy(err) => err.reason_code(),
            Self::InvalidTarget(_) => ReasonCode::PermissionDenied,
        }
    }
}
