// acp-policy/src/error.rs
// ============================================================================
// Module: Policy Errors
// Description: Typed errors for principal resolution, capability tokens,
//              the policy gate, and the approval substrate.
// Purpose: Map every failure onto the shared reason-code taxonomy so the
//          HTTP layer never has to special-case this crate.
// Dependencies: acp-core, acp-store, thiserror
// ============================================================================

use acp_core::ReasonCode;
use thiserror::Error;

/// Errors raised by `acp-policy`.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Underlying storage failure.
    #[error("store error: {0}")]
    Store(#[from] acp_store::StoreError),
    /// A referenced capability token does not exist.
    #[error("capability token not found: {0}")]
    TokenNotFound(String),
    /// A referenced principal does not exist.
    #[error("principal not found: {0}")]
    PrincipalNotFound(String),
    /// A parent token referenced by a delegation grant does not exist or is
    /// no longer valid.
    #[error("parent token invalid: {0}")]
    ParentTokenInvalid(String),
    /// Delegation depth would exceed the maximum chain length.
    #[error("delegation depth exceeded: {0}")]
    DelegationDepthExceeded(usize),
    /// The `granted_by_principal_id` does not match the parent token's
    /// `issued_to_principal_id`.
    #[error("delegation grantor mismatch")]
    DelegationGrantorMismatch,
    /// A referenced approval does not exist.
    #[error("approval not found: {0}")]
    ApprovalNotFound(String),
    /// The approval is not in a state that allows this transition.
    #[error("approval not pending: {0}")]
    ApprovalNotPending(String),
    /// A room-scoped approval was requested without a `room_id`.
    #[error("approval scope invalid: {0}")]
    ApprovalScopeInvalid(String),
}

impl PolicyError {
    /// Maps this error onto the stable reason-code taxonomy.
    #[must_use]
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            Self::Store(err) => err.reason_code(),
            Self::TokenNotFound(_)
            | Self::PrincipalNotFound(_)
            | Self::ApprovalNotFound(_) => ReasonCode::NotFound,
            Self::ParentTokenInvalid(_) => ReasonCode::CapabilityTokenInvalid,
            Self::DelegationDepthExceeded(_) => ReasonCode::PolicyDenied,
            Self::DelegationGrantorMismatch => ReasonCode::PolicyDenied,
            Self::ApprovalNotPending(_) => ReasonCode::PolicyDenied,
            Self::ApprovalScopeInvalid(_) => ReasonCode::EngineRoomScopeRequired,
        }
    }
}
