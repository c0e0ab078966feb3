// acp-server/src/error.rs
// ============================================================================
// Module: HTTP Error Taxonomy
// Description: Maps every upstream crate's reason code onto an HTTP status
//              and a stable JSON error body (§7).
// Purpose: One `IntoResponse` impl so every handler can `?`-propagate a
//          typed error and get the same wire shape back.
// Dependencies: acp-core, acp-store, acp-policy, acp-egress, acp-growth, axum
// ============================================================================

use acp_core::ReasonCode;
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

/// The uniform error surfaced by every handler in this crate.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A storage-layer failure.
    #[error(transparent)]
    Store(#[from] acp_store::StoreError),
    /// A policy-layer failure.
    #[error(transparent)]
    Policy(#[from] acp_policy::PolicyError),
    /// A growth-layer failure.
    #[error(transparent)]
    Growth(#[from] acp_growth::error::GrowthError),
    /// An egress-broker failure.
    #[error(transparent)]
    Egress(#[from] acp_egress::EgressError),
    /// The request body failed basic shape validation before reaching any
    /// lower-layer crate.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The `x-workspace-id` header was missing and no session supplied one.
    #[error("missing workspace context")]
    MissingWorkspace,
}

impl ApiError {
    fn reason_code(&self) -> ReasonCode {
        match self {
            Self::Store(err) => err.reason_code(),
            Self::Policy(err) => err.reason_code(),
            Self::Growth(err) => err.reason_code(),
            Self::Egress(err) => err.reason_code(),
            Self::InvalidRequest(_) | Self::MissingWorkspace => ReasonCode::PermissionDenied,
        }
    }

    fn status(&self) -> StatusCode {
        match self.reason_code() {
            ReasonCode::NotFound => StatusCode::NOT_FOUND,
            ReasonCode::LeaseTokenMismatch | ReasonCode::RunLocked | ReasonCode::IdempotencyConflictUnresolved => {
                StatusCode::CONFLICT
            }
            ReasonCode::AgentPrincipalRequired
            | ReasonCode::AgentPrincipalNotFound
            | ReasonCode::AgentActorIdMismatch
            | ReasonCode::CapabilityTokenInvalid
            | ReasonCode::CapabilityTokenRevoked
            | ReasonCode::CapabilityTokenExpired
            | ReasonCode::CapabilityPrincipalMismatch
            | ReasonCode::EngineActionNotAllowed
            | ReasonCode::EngineRoomNotAllowed
            | ReasonCode::EngineRoomScopeRequired
            | ReasonCode::EngineInactive
            | ReasonCode::EngineTokenExpired
            | ReasonCode::ExternalWriteKillSwitch
            | ReasonCode::AgentQuarantined
            | ReasonCode::PolicyDenied
            | ReasonCode::PermissionDenied
            | ReasonCode::DataAccessDenied
            | ReasonCode::DataAccessPurposeHintMismatch => StatusCode::FORBIDDEN,
            ReasonCode::ApprovalRequired => StatusCode::ACCEPTED,
            ReasonCode::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
            ReasonCode::ZoneMismatch
            | ReasonCode::RunNotClaimable
            | ReasonCode::LeaseExpired
            | ReasonCode::AppendOnlyViolation
            | ReasonCode::SignatureRequired
            | ReasonCode::VerifyHashMismatch
            | ReasonCode::ManifestMissingRequiredFields
            | ReasonCode::IncidentCloseBlockedMissingRca
            | ReasonCode::IncidentCloseBlockedMissingLearning => StatusCode::UNPROCESSABLE_ENTITY,
            ReasonCode::NoRunAvailable => StatusCode::NOT_FOUND,
            ReasonCode::StreamSeqGapDetected | ReasonCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            ReasonCode::Allowed | ReasonCode::ApprovalMatched => StatusCode::OK,
        }
    }

    fn context(&self) -> Value {
        match self {
            Self::InvalidRequest(detail) => json!({ "detail": detail }),
            _ => Value::Null,
        }
    }
}

/// Stable wire shape for every error response (§7 "User-visible failure").
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Value::is_null")]
    context: Value,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status().is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody { error: self.reason_code().as_str(), context: self.context() };
        (self.status(), Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
