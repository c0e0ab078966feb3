// acp-core/src/error.rs
// ============================================================================
// Module: API Error Envelope
// Description: The stable `{ error, ...context }` JSON shape every HTTP
//              endpoint returns on failure (§6, §7).
// Purpose: One conversion target for every crate's typed errors so the HTTP
//          layer never has to special-case error sources.
// Dependencies: crate::reason_code, serde
// ============================================================================

use serde::Serialize;
use serde_json::Value;

use crate::reason_code::ReasonCode;

/// Broad class of failure, used by the HTTP layer to pick a status code.
/// Distinct from [`ReasonCode`], which is the fine-grained machine-readable
/// reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller input failed validation (`400`).
    Validation,
    /// The request conflicts with current state (`409`).
    Conflict,
    /// The request is well-formed but semantically invalid (`422`).
    Unprocessable,
    /// A policy or authorization decision rejected the request (`403`).
    Forbidden,
    /// The referenced entity does not exist (`404`).
    NotFound,
    /// An invariant was violated in a way that should never happen in
    /// correct operation (`500`).
    Internal,
}

/// The stable error envelope returned by every command endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    /// Stable machine-readable reason code.
    pub error: ReasonCode,
    /// Human-readable detail for logs and operator UIs.
    pub message: String,
    /// Broad failure class used to choose the HTTP status code.
    #[serde(skip)]
    pub class: ErrorClass,
    /// Additional structured context (e.g. the offending field).
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl ApiError {
    /// Builds a new error envelope.
    #[must_use]
    pub fn new(error: ReasonCode, class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            error,
            message: message.into(),
            class,
            context: None,
        }
    }

    /// Attaches structured context to the envelope.
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.error)
    }
}

impl std::error::Error for ApiError {}
