// acp-worker/src/error.rs
// ============================================================================
// Module: Runtime Worker Errors
// Description: Failure cases surfaced while claiming and driving a run
//              through its lifecycle (§4.11).
// Purpose: Bridge `acp-store`/`acp-policy`/`acp-egress` errors to one type
//          the poll loop logs and recovers from without a panic.
// Dependencies: acp-core, acp-store, acp-policy, acp-egress
// ============================================================================

use acp_core::ReasonCode;
use thiserror::Error;

/// Errors raised while the Runtime Worker drives one claimed run.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Underlying storage failure.
    #[error("store error: {0}")]
    Store(#[from] acp_store::StoreError),
    /// Underlying policy-gate failure.
    #[error("policy error: {0}")]
    Policy(#[from] acp_policy::PolicyError),
    /// Underlying egress-broker failure.
    #[error("egress error: {0}")]
    Egress(#[from] acp_egress::EgressError),
    /// `RUN_WORKER_WORKSPACE_ID` was not configured; the worker has no
    /// workspace to poll.
    #[error("run worker has no configured workspace")]
    NoWorkspaceConfigured,
    /// A `runtime.policy.*` field in the run's input was present but not a
    /// well-formed identifier.
    #[error("malformed runtime policy field {field}: {value}")]
    MalformedPolicyField {
        /// The offending field name.
        field: &'static str,
        /// The raw value that failed to parse.
        value: String,
    },
}

impl WorkerError {
    /// Maps this error onto the stable reason-code taxonomy.
    #[must_use]
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            Self::Store(err) => err.reason_code(),
            Self::Policy(err) => err.reason_code(),
            Self::Egress(err) => err.reason_code(),
            Self::NoWorkspaceConfigured | Self::MalformedPolicyField { .. } => {
                ReasonCode::InternalError
            }
        }
    }
}
