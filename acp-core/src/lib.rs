// acp-core/src/lib.rs
// ============================================================================
// Module: Agent Control Plane Core
// Description: Public API surface shared by every crate in the workspace.
// Purpose: Expose domain identifiers, the event envelope, canonical
//          hashing, the policy decision shape, and the reason-code/error
//          taxonomy as one dependency-free foundation layer.
// Dependencies: crate::{identifiers, event, hashing, decision, scope,
//               action_registry, reason_code, error}
// ============================================================================

//! ## Overview
//! `acp-core` has no dependency on any other workspace crate. It defines the
//! vocabulary — identifiers, the event envelope, the capability scope
//! lattice, the policy decision shape, and the stable reason-code/error
//! taxonomy — that `acp-store`, `acp-policy`, `acp-growth`, `acp-egress`,
//! `acp-worker`, `acp-server`, and `acp-cli` all build on.

pub mod action_registry;
pub mod decision;
pub mod error;
pub mod event;
pub mod hashing;
pub mod identifiers;
pub mod reason_code;
pub mod scope;

pub use action_registry::ActionMetadata;
pub use action_registry::ActionRegistryEntry;
pub use decision::Decision;
pub use decision::DecisionKind;
pub use decision::EnforcementMode;
pub use error::ApiError;
pub use error::ErrorClass;
pub use event::EventEnvelope;
pub use event::EventRecord;
pub use event::HashableEvent;
pub use event::StreamRef;
pub use hashing::HashError;
pub use hashing::canonical_json_bytes;
pub use hashing::compute_event_hash;
pub use hashing::sha256_hex;
pub use identifiers::ActorId;
pub use identifiers::ActorType;
pub use identifiers::AgentId;
pub use identifiers::ApprovalId;
pub use identifiers::ArtifactId;
pub use identifiers::CorrelationId;
pub use identifiers::EventId;
pub use identifiers::IdempotencyKey;
pub use identifiers::IncidentId;
pub use identifiers::MessageId;
pub use identifiers::MissionId;
pub use identifiers::PrincipalId;
pub use identifiers::RedactionLevel;
pub use identifiers::RoomId;
pub use identifiers::RunId;
pub use identifiers::SkillId;
pub use identifiers::SkillPackageId;
pub use identifiers::StepId;
pub use identifiers::ThreadId;
pub use identifiers::ToolCallId;
pub use identifiers::TokenId;
pub use identifiers::WorkspaceId;
pub use identifiers::Zone;
pub use reason_code::ReasonCode;
pub use scope::CapabilityScopes;
pub use scope::DataAccessScope;
pub use scope::ScopeAxis;
