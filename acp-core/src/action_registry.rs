// acp-core/src/action_registry.rs
// ============================================================================
// Module: Action Registry Types
// Description: The catalog entry shape consulted by the Policy Gate's
//              action-registry step (§4.5 step 5).
// Purpose: Shared type so acp-store can persist the catalog and acp-policy
//          can evaluate against it without a cyclic dependency.
// Dependencies: crate::identifiers, serde
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::Zone;

/// How costly and how hard to recover from an action is, for operator
/// triage and trust-score inputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionMetadata {
    /// Rough relative cost impact, e.g. `"low"`, `"medium"`, `"high"`.
    pub cost_impact: Option<String>,
    /// How hard the action is to recover from if it turns out to be wrong.
    pub recovery_difficulty: Option<String>,
}

/// A catalog entry describing one action type's pre-conditions (§3 Action
/// Registry entity).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRegistryEntry {
    /// The action type this entry governs, e.g. `"external.write"`.
    pub action_type: String,
    /// Whether the action can be undone.
    pub reversible: bool,
    /// The minimum zone required to perform this action, if any.
    pub zone_required: Option<Zone>,
    /// Whether an approved approval must exist before the action runs.
    pub requires_pre_approval: bool,
    /// Whether the action is tagged for mandatory post-hoc review.
    pub post_review_required: bool,
    /// Operator-facing metadata.
    pub metadata: ActionMetadata,
}

impl ActionRegistryEntry {
    /// Builds a minimal, permissive entry for an action type that has no
    /// catalog row — used so unknown actions still flow through the
    /// pipeline instead of panicking.
    #[must_use]
    pub fn unregistered(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            reversible: true,
            zone_required: None,
            requires_pre_approval: false,
            post_review_required: false,
            metadata: ActionMetadata::default(),
        }
    }
}
