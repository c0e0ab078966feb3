// acp-core/src/reason_code.rs
// ============================================================================
// Module: Reason Code Taxonomy
// Description: The stable reason codes attached to policy decisions and
//              error responses (§7).
// Purpose: Give every crate in the workspace one shared, exhaustive enum so
//          reason codes cannot drift between the policy gate and the HTTP
//          error envelope.
// Dependencies: serde
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Stable reason code taxonomy (§7). Serializes as the exact snake_case
/// string documented in the specification so external consumers can match
/// on it without going through this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// The pipeline reached its default step with no matching rule: allow.
    Allowed,
    /// An existing approval covered the request.
    ApprovalMatched,

    // Identity
    /// An agent actor presented no principal id.
    AgentPrincipalRequired,
    /// The presented principal id does not resolve to a known principal.
    AgentPrincipalNotFound,
    /// The principal's bound actor id does not match the request's actor id.
    AgentActorIdMismatch,

    // Capability
    /// The capability token does not exist.
    CapabilityTokenInvalid,
    /// The capability token has been revoked.
    CapabilityTokenRevoked,
    /// The capability token's validity window has passed.
    CapabilityTokenExpired,
    /// The token's `issued_to_principal_id` does not match the caller.
    CapabilityPrincipalMismatch,
    /// The requested scope is missing from the token's granted scopes.
    CapabilityScopeMissing,
    /// The token does not authorize the requested action type.
    EngineActionNotAllowed,
    /// The token does not authorize the requested room.
    EngineRoomNotAllowed,
    /// The request needs a room scope but did not supply one.
    EngineRoomScopeRequired,
    /// The engine/token is inactive.
    EngineInactive,
    /// The engine's token has expired.
    EngineTokenExpired,

    // Policy
    /// The global kill switch is blocking `external.write` actions.
    ExternalWriteKillSwitch,
    /// The acting agent is quarantined.
    AgentQuarantined,
    /// Generic policy denial not covered by a more specific code.
    PolicyDenied,
    /// The action requires an approval that does not yet exist.
    ApprovalRequired,
    /// The caller lacks permission for the requested action.
    PermissionDenied,
    /// A configured quota has been exceeded.
    QuotaExceeded,
    /// The action's required zone does not match the envelope's zone.
    ZoneMismatch,

    // Data access
    /// Data access was denied outright.
    DataAccessDenied,
    /// The request's purpose tag does not match the resource's requirement.
    DataAccessPurposeHintMismatch,

    // Runs
    /// The run is locked by a concurrent operation.
    RunLocked,
    /// The supplied claim token does not match the run's current lease.
    LeaseTokenMismatch,
    /// The run's lease has expired.
    LeaseExpired,
    /// The run is not in a claimable state.
    RunNotClaimable,

    // Storage
    /// An idempotent append's unique-key collision could not be resolved by
    /// replay.
    IdempotencyConflictUnresolved,
    /// A write attempted to mutate or delete an append-only row.
    AppendOnlyViolation,
    /// A stream's sequence allocation skipped a value; treated as fatal.
    StreamSeqGapDetected,
    /// No run was available to satisfy a claim request.
    NoRunAvailable,
    /// The referenced entity does not exist.
    NotFound,
    /// An invariant was violated in a way that should never happen in
    /// correct operation.
    InternalError,

    // Supply chain
    /// A skill package signature was required but missing.
    SignatureRequired,
    /// A skill package's declared hash did not match its content.
    VerifyHashMismatch,
    /// A skill package manifest is missing required fields.
    ManifestMissingRequiredFields,

    // Incidents
    /// Incident close was rejected because no RCA is attached.
    IncidentCloseBlockedMissingRca,
    /// Incident close was rejected because no learning entry is attached.
    IncidentCloseBlockedMissingLearning,
}

impl ReasonCode {
    /// Returns the canonical snake_case string for this reason code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::ApprovalMatched => "approval_matched",
            Self::AgentPrincipalRequired => "agent_principal_required",
            Self::AgentPrincipalNotFound => "agent_principal_not_found",
            Self::AgentActorIdMismatch => "agent_actor_id_mismatch",
            Self::CapabilityTokenInvalid => "capability_token_invalid",
            Self::CapabilityTokenRevoked => "capability_token_revoked",
            Self::CapabilityTokenExpired => "capability_token_expired",
            Self::CapabilityPrincipalMismatch => "capability_principal_mismatch",
            Self::CapabilityScopeMissing => "capability_scope_missing",
            Self::EngineActionNotAllowed => "engine_action_not_allowed",
            Self::EngineRoomNotAllowed => "engine_room_not_allowed",
            Self::EngineRoomScopeRequired => "engine_room_scope_required",
            Self::EngineInactive => "engine_inactive",
            Self::EngineTokenExpired => "engine_token_expired",
            Self::ExternalWriteKillSwitch => "external_write_kill_switch",
            Self::AgentQuarantined => "agent_quarantined",
            Self::PolicyDenied => "policy_denied",
            Self::ApprovalRequired => "approval_required",
            Self::PermissionDenied => "permission_denied",
            Self::QuotaExceeded => "quota_exceeded",
            Self::ZoneMismatch => "zone_mismatch",
            Self::DataAccessDenied => "data_access_denied",
            Self::DataAccessPurposeHintMismatch => "data_access_purpose_hint_mismatch",
            Self::RunLocked => "run_locked",
            Self::LeaseTokenMismatch => "lease_token_mismatch",
            Self::LeaseExpired => "lease_expired",
            Self::RunNotClaimable => "run_not_claimable",
            Self::IdempotencyConflictUnresolved => "idempotency_conflict_unresolved",
            Self::AppendOnlyViolation => "append_only_violation",
            Self::StreamSeqGapDetected => "stream_seq_gap_detected",
            Self::NoRunAvailable => "no_run_available",
            Self::NotFound => "not_found",
            Self::InternalError => "internal_error",
            Self::SignatureRequired => "signature_required",
            Self::VerifyHashMismatch => "verify_hash_mismatch",
            Self::ManifestMissingRequiredFields => "manifest_missing_required_fields",
            Self::IncidentCloseBlockedMissingRca => "incident_close_blocked_missing_rca",
            Self::IncidentCloseBlockedMissingLearning => "incident_close_blocked_missing_learning",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_to_documented_snake_case() {
        let json = serde_json::to_string(&ReasonCode::ExternalWriteKillSwitch).expect("serialize");
        assert_eq!(json, "\"external_write_kill_switch\"");
    }

    #[test]
    fn display_matches_serde_form() {
        for code in [
            ReasonCode::AgentQuarantined,
            ReasonCode::LeaseTokenMismatch,
            ReasonCode::IncidentCloseBlockedMissingRca,
        ] {
            let json = serde_json::to_string(&code).expect("serialize");
            assert_eq!(format!("\"{code}\""), json);
        }
    }
}
