// acp-core/src/identifiers.rs
// ============================================================================
// Module: Core Identifiers
// Description: Strongly typed identifiers for every workspace-scoped entity.
// Purpose: Prevent cross-entity id confusion at compile time; stable string
//          and UUID wire forms.
// Dependencies: serde, uuid
// ============================================================================

//! ## Overview
//! Every entity in the control plane is workspace-scoped and addressed by an
//! opaque identifier. UUID-backed identifiers (events, tokens, runs, ...)
//! use [`uuid::Uuid`] directly; identifiers that originate from caller input
//! (workspace, room, thread, legacy actor ids) are opaque strings. Validation
//! of the underlying value happens at the HTTP/storage boundary, not here.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

/// Declares a UUID-backed newtype identifier with the standard trait set.
macro_rules! uuid_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID value.
            #[must_use]
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }
    };
}

/// Declares a string-backed newtype identifier with the standard trait set.
macro_rules! string_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

uuid_id!(EventId, "Immutable event identifier.");
uuid_id!(PrincipalId, "Durable identity row identifier.");
uuid_id!(TokenId, "Capability token identifier.");
uuid_id!(ApprovalId, "Approval request identifier.");
uuid_id!(IncidentId, "Incident identifier.");
uuid_id!(RunId, "Run identifier.");
uuid_id!(StepId, "Step identifier.");
uuid_id!(ToolCallId, "Tool call identifier.");
uuid_id!(ArtifactId, "Artifact identifier.");
uuid_id!(RoomId, "Room identifier.");
uuid_id!(ThreadId, "Thread identifier.");
uuid_id!(MessageId, "Message identifier.");
uuid_id!(SkillPackageId, "Skill package identifier.");

string_id!(WorkspaceId, "Top-level tenancy boundary identifier.");
string_id!(MissionId, "Mission grouping identifier.");
string_id!(ActorId, "Legacy actor identifier, scoped by `ActorType`.");
string_id!(CorrelationId, "Cross-stream correlation identifier.");
string_id!(IdempotencyKey, "Caller-supplied idempotency key.");
string_id!(AgentId, "Agent principal's legacy actor identifier.");
string_id!(SkillId, "Catalog skill identifier.");

/// Actor kind recorded on every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    /// An internal service acting without a human or agent principal.
    Service,
    /// A human operator.
    User,
    /// An autonomous or semi-autonomous agent.
    Agent,
}

impl fmt::Display for ActorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Service => "service",
            Self::User => "user",
            Self::Agent => "agent",
        };
        f.write_str(label)
    }
}

/// Action-risk tier attached to every event and evaluated by the policy
/// gate's action-registry step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    /// Fully reversible, low-stakes actions.
    Sandbox,
    /// Default zone: reviewed but not gated by extra approval.
    Supervised,
    /// Irreversible or high-impact actions.
    HighStakes,
}

impl Default for Zone {
    fn default() -> Self {
        Self::Supervised
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Sandbox => "sandbox",
            Self::Supervised => "supervised",
            Self::HighStakes => "high_stakes",
        };
        f.write_str(label)
    }
}

/// Redaction level recorded on an event after a DLP scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionLevel {
    /// No redaction was necessary.
    None,
    /// One or more fields were masked in place.
    Partial,
}

impl Default for RedactionLevel {
    fn default() -> Self {
        Self::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_ids_round_trip_through_json() {
        let id = RunId::new();
        let json = serde_json::to_string(&id).expect("serialize");
        let back: RunId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(id, back);
    }

    #[test]
    fn string_ids_display_their_raw_value() {
        let id = WorkspaceId::new("ws_1");
        assert_eq!(id.to_string(), "ws_1");
        assert_eq!(id.as_str(), "ws_1");
    }

    #[test]
    fn zone_defaults_to_supervised() {
        assert_eq!(Zone::default(), Zone::Supervised);
    }
}
