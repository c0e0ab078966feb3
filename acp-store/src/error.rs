// acp-store/src/error.rs
// ============================================================================
// Module: Store Errors
// Description: Typed errors for the event writer, projection engine, lease
//              manager, and audit queries.
// Purpose: Map storage-layer failures onto the reason-code taxonomy the
//          Policy Gate and HTTP layer already speak.
// Dependencies: acp-core, sqlx, thiserror
// ============================================================================

use acp_core::ReasonCode;
use thiserror::Error;

/// Errors raised by `acp-store`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database driver error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// A unique-constraint violation was detected but the conflicting row
    /// could not be retrieved for idempotent replay.
    #[error("idempotency conflict unresolved for key {idempotency_key}")]
    IdempotencyConflictUnresolved {
        /// The idempotency key whose conflicting row could not be found.
        idempotency_key: String,
    },
    /// The append-only trigger rejected an `UPDATE`/`DELETE` on `evt_events`.
    #[error("append-only violation: {0}")]
    AppendOnlyViolation(String),
    /// A stream's `stream_seq` allocation skipped a value. Never expected;
    /// surfaces as a fatal storage invariant violation.
    #[error("stream_seq gap detected on {stream_type}/{stream_id}")]
    StreamSeqGapDetected {
        /// The stream's type component.
        stream_type: String,
        /// The stream's id component.
        stream_id: String,
    },
    /// The requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A lease operation was attempted with a claim token that does not
    /// match the run's current lease.
    #[error("lease token mismatch")]
    LeaseTokenMismatch,
    /// No queued run was available to claim.
    #[error("no run available to claim")]
    NoRunAvailable,
    /// A specific run was targeted for claim/start but is not in a
    /// claimable state (not `queued`, or already locked by a racing claim).
    #[error("run is not claimable")]
    RunNotClaimable,
    /// Canonicalization or hashing failed while appending an event.
    #[error("hashing error: {0}")]
    Hashing(#[from] acp_core::HashError),
    /// An incident was closed without a recorded RCA.
    #[error("incident cannot close without a recorded RCA")]
    IncidentCloseBlockedMissingRca,
    /// An incident was closed without at least one learning entry.
    #[error("incident cannot close without at least one learning entry")]
    IncidentCloseBlockedMissingLearning,
}

impl StoreError {
    /// Maps this error onto the stable reason-code taxonomy for HTTP
    /// responses.
    #[must_use]
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            Self::IdempotencyConflictUnresolved {
                ..
            } => ReasonCode::IdempotencyConflictUnresolved,
            Self::AppendOnlyViolation(_) => ReasonCode::AppendOnlyViolation,
            Self::StreamSeqGapDetected {
                ..
            } => ReasonCode::StreamSeqGapDetected,
            Self::NotFound(_) => ReasonCode::NotFound,
            Self::LeaseTokenMismatch => ReasonCode::LeaseTokenMismatch,
            Self::NoRunAvailable => ReasonCode::NoRunAvailable,
            Self::RunNotClaimable => ReasonCode::RunNotClaimable,
            Self::Database(_) | Self::Hashing(_) => ReasonCode::InternalError,
            Self::IncidentCloseBlockedMissingRca => ReasonCode::IncidentCloseBlockedMissingRca,
            Self::IncidentCloseBlockedMissingLearning => ReasonCode::IncidentCloseBlockedMissingLearning,
        }
    }
}
