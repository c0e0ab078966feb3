// acp-core/src/decision.rs
// ============================================================================
// Module: Policy Decision Shape
// Description: The uniform decision taxonomy returned by every Policy Gate
//              entrypoint (§4.5).
// Purpose: Give `authorize_tool_call`, `authorize_data_access`,
//          `authorize_action`, and `authorize_egress` one shared result type.
// Dependencies: crate::identifiers, crate::reason_code, serde
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::identifiers::ApprovalId;
use crate::reason_code::ReasonCode;

/// The three-way outcome of a policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// The action may proceed.
    Allow,
    /// The action is rejected.
    Deny,
    /// The action needs a human approval before it can proceed.
    RequireApproval,
}

/// Process-wide policy enforcement mode (§4.5 "Enforcement mode").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMode {
    /// Negative decisions are recorded but never set `blocked = true`.
    Shadow,
    /// `blocked` mirrors the decision kind.
    Enforce,
}

impl Default for EnforcementMode {
    fn default() -> Self {
        Self::Enforce
    }
}

/// The shape returned by every Policy Gate entrypoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// The evaluation outcome.
    pub decision: DecisionKind,
    /// Stable machine-readable reason for the outcome.
    pub reason_code: ReasonCode,
    /// Execution-cutoff signal; always accompanies `deny` in enforce mode.
    pub blocked: bool,
    /// The approval that satisfied this decision, if any.
    pub approval_id: Option<ApprovalId>,
    /// Additional decision context (e.g. matched scope, quota counters).
    pub context: Option<Value>,
}

impl Decision {
    /// Builds the default `allow` decision reached at the end of the
    /// pipeline with no matching rule.
    #[must_use]
    pub fn allow(reason_code: ReasonCode) -> Self {
        Self {
            decision: DecisionKind::Allow,
            reason_code,
            blocked: false,
            approval_id: None,
            context: None,
        }
    }

    /// Builds an `allow` decision that was satisfied by an existing
    /// approval.
    #[must_use]
    pub fn allow_with_approval(approval_id: ApprovalId) -> Self {
        Self {
            decision: DecisionKind::Allow,
            reason_code: ReasonCode::ApprovalMatched,
            blocked: false,
            approval_id: Some(approval_id),
            context: None,
        }
    }

    /// Builds a `deny` decision, honoring the process enforcement mode for
    /// the `blocked` flag.
    #[must_use]
    pub fn deny(reason_code: ReasonCode, mode: EnforcementMode) -> Self {
        Self {
            decision: DecisionKind::Deny,
            reason_code,
            blocked: matches!(mode, EnforcementMode::Enforce),
            approval_id: None,
            context: None,
        }
    }

    /// Builds a `require_approval` decision. Always non-blocking, per §4.5.
    #[must_use]
    pub fn require_approval(reason_code: ReasonCode) -> Self {
        Self {
            decision: DecisionKind::RequireApproval,
            reason_code,
            blocked: false,
            approval_id: None,
            context: None,
        }
    }

    /// Attaches additional context to the decision.
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    /// True when this decision is a negative outcome that the growth layer
    /// and audit trail must record (§4.5 "Side effects on negative
    /// decisions").
    #[must_use]
    pub fn is_negative(&self) -> bool {
        !matches!(self.decision, DecisionKind::Allow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadow_mode_never_blocks_a_deny() {
        let decision = Decision::deny(ReasonCode::PolicyDenied, EnforcementMode::Shadow);
        assert_eq!(decision.decision, DecisionKind::Deny);
        assert!(!decision.blocked);
    }

    #[test]
    fn enforce_mode_blocks_a_deny() {
        let decision = Decision::deny(ReasonCode::PolicyDenied, EnforcementMode::Enforce);
        assert!(decision.blocked);
    }

    #[test]
    fn require_approval_is_never_blocking() {
        let decision = Decision::require_approval(ReasonCode::ApprovalRequired);
        assert!(!decision.blocked);
        assert!(decision.is_negative());
    }

    #[test]
    fn allow_is_not_negative() {
        let decision = Decision::allow(ReasonCode::Allowed);
        assert!(!decision.is_negative());
    }
}
