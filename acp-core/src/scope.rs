// acp-core/src/scope.rs
// ============================================================================
// Module: Capability Scope Lattice
// Description: The per-axis scope structure carried by capability tokens and
//              the intersection rule used when delegating (§4.4).
// Purpose: Shared between acp-store (persistence) and acp-policy
//          (evaluation) so the lattice rule lives in exactly one place.
// Dependencies: serde
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

/// A single scope axis: either the universal wildcard `*` or an explicit
/// allow-set. `*` is the top of the lattice — intersecting it with any
/// value yields that value unchanged (§4.4 "Grant").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScopeAxis {
    /// Every value on this axis is permitted.
    Wildcard(WildcardMarker),
    /// Only the listed values are permitted.
    Values(BTreeSet<String>),
}

/// Serializes/deserializes as the literal string `"*"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WildcardMarker;

impl Serialize for WildcardMarker {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str("*")
    }
}

impl<'de> Deserialize<'de> for WildcardMarker {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if raw == "*" {
            Ok(Self)
        } else {
            Err(serde::de::Error::custom("expected wildcard marker \"*\""))
        }
    }
}

impl ScopeAxis {
    /// Builds an explicit allow-set axis.
    #[must_use]
    pub fn values<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Values(items.into_iter().map(Into::into).collect())
    }

    /// Builds the wildcard (allow-all) axis.
    #[must_use]
    pub fn wildcard() -> Self {
        Self::Wildcard(WildcardMarker)
    }

    /// Builds the empty (allow-nothing) axis.
    #[must_use]
    pub fn none() -> Self {
        Self::Values(BTreeSet::new())
    }

    /// True when `value` is permitted on this axis.
    #[must_use]
    pub fn permits(&self, value: &str) -> bool {
        match self {
            Self::Wildcard(_) => true,
            Self::Values(values) => values.contains(value),
        }
    }

    /// Per-axis set intersection used when delegating a child token: `*`
    /// intersected with anything yields that thing unchanged; two explicit
    /// sets intersect normally.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Wildcard(_), rhs) => rhs.clone(),
            (lhs, Self::Wildcard(_)) => lhs.clone(),
            (Self::Values(lhs), Self::Values(rhs)) => {
                Self::Values(lhs.intersection(rhs).cloned().collect())
            }
        }
    }
}

impl Default for ScopeAxis {
    fn default() -> Self {
        Self::none()
    }
}

/// Data-access axis pair: independent read/write allow-sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataAccessScope {
    /// Resource labels this token may read.
    pub read: ScopeAxis,
    /// Resource labels this token may write.
    pub write: ScopeAxis,
}

impl DataAccessScope {
    /// Per-field intersection, matching [`ScopeAxis::intersect`].
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        Self {
            read: self.read.intersect(&other.read),
            write: self.write.intersect(&other.write),
        }
    }
}

/// The full structured scope carried by a capability token (§3 Capability
/// Token entity).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityScopes {
    /// Rooms this token may act within.
    pub rooms: ScopeAxis,
    /// Tools this token may invoke.
    pub tools: ScopeAxis,
    /// Domains this token may egress to.
    pub egress_domains: ScopeAxis,
    /// Action types this token may perform.
    pub action_types: ScopeAxis,
    /// Data access allow-sets.
    pub data_access: DataAccessScope,
}

impl CapabilityScopes {
    /// The unrestricted scope set: every axis is wildcard. Used for tokens
    /// issued directly (not delegated).
    #[must_use]
    pub fn unrestricted() -> Self {
        Self {
            rooms: ScopeAxis::wildcard(),
            tools: ScopeAxis::wildcard(),
            egress_domains: ScopeAxis::wildcard(),
            action_types: ScopeAxis::wildcard(),
            data_access: DataAccessScope {
                read: ScopeAxis::wildcard(),
                write: ScopeAxis::wildcard(),
            },
        }
    }

    /// Computes the effective scope of a delegated child token: the
    /// per-axis intersection with the parent's scopes (§4.4, §8 "Capability
    /// scope" invariant).
    #[must_use]
    pub fn intersect(&self, parent: &Self) -> Self {
        Self {
            rooms: self.rooms.intersect(&parent.rooms),
            tools: self.tools.intersect(&parent.tools),
            egress_domains: self.egress_domains.intersect(&parent.egress_domains),
            action_types: self.action_types.intersect(&parent.action_types),
            data_access: self.data_access.intersect(&parent.data_access),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_intersects_to_peer_value() {
        let wildcard = ScopeAxis::wildcard();
        let explicit = ScopeAxis::values(["room-1"]);
        assert_eq!(wildcard.intersect(&explicit), explicit);
        assert_eq!(explicit.intersect(&wildcard), explicit);
    }

    #[test]
    fn explicit_sets_intersect_normally() {
        let a = ScopeAxis::values(["a", "b"]);
        let b = ScopeAxis::values(["b", "c"]);
        assert_eq!(a.intersect(&b), ScopeAxis::values(["b"]));
    }

    #[test]
    fn delegated_scope_is_subset_of_parent() {
        let parent = CapabilityScopes {
            tools: ScopeAxis::values(["search", "write_file"]),
            ..CapabilityScopes::unrestricted()
        };
        let requested = CapabilityScopes {
            tools: ScopeAxis::values(["search", "delete_file"]),
            ..CapabilityScopes::unrestricted()
        };
        let effective = requested.intersect(&parent);
        assert_eq!(effective.tools, ScopeAxis::values(["search"]));
        assert!(effective.tools.permits("search"));
        assert!(!effective.tools.permits("delete_file"));
    }

    #[test]
    fn wildcard_serializes_as_star() {
        let json = serde_json::to_string(&ScopeAxis::wildcard()).expect("serialize");
        assert_eq!(json, "\"*\"");
    }
}
