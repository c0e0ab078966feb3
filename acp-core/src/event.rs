// acp-core/src/event.rs
// ============================================================================
// Module: Event Envelope
// Description: The immutable event entity and the envelope callers submit
//              to the Event Writer before stream sequencing and hashing.
// Purpose: Single shared representation of §3's Event entity across the
//          store, policy, server, and CLI crates.
// Dependencies: crate::identifiers, crate::hashing, chrono, serde
// ============================================================================

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::identifiers::ActorId;
use crate::identifiers::ActorType;
use crate::identifiers::CorrelationId;
use crate::identifiers::EventId;
use crate::identifiers::IdempotencyKey;
use crate::identifiers::MissionId;
use crate::identifiers::PrincipalId;
use crate::identifiers::RedactionLevel;
use crate::identifiers::RoomId;
use crate::identifiers::RunId;
use crate::identifiers::StepId;
use crate::identifiers::ThreadId;
use crate::identifiers::WorkspaceId;
use crate::identifiers::Zone;

/// Identifies the append-only stream an event belongs to.
///
/// `(stream_type, stream_id)` is the unit of sequencing: `stream_seq` is
/// monotonic within one [`StreamRef`] and otherwise independent across
/// streams (§5, Ordering guarantees).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamRef {
    /// Stream family, e.g. `"room"`, `"run"`, `"workspace"`.
    pub stream_type: String,
    /// Stream instance identifier within the family.
    pub stream_id: String,
}

impl StreamRef {
    /// Builds a stream reference from a type/id pair.
    #[must_use]
    pub fn new(stream_type: impl Into<String>, stream_id: impl Into<String>) -> Self {
        Self {
            stream_type: stream_type.into(),
            stream_id: stream_id.into(),
        }
    }

    /// The workspace-wide stream used for workspace-scoped approvals and
    /// lifecycle events that are not tied to any single room or run.
    #[must_use]
    pub fn workspace(workspace_id: &WorkspaceId) -> Self {
        Self::new("workspace", workspace_id.as_str())
    }

    /// The stream for a room's chat/event history.
    #[must_use]
    pub fn room(room_id: RoomId) -> Self {
        Self::new("room", room_id.to_string())
    }

    /// The stream for a single run's lifecycle events.
    #[must_use]
    pub fn run(run_id: RunId) -> Self {
        Self::new("run", run_id.to_string())
    }
}

/// Everything an append caller supplies; the writer fills in `recorded_at`,
/// `stream_seq`, `prev_event_hash`, and `event_hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Event type discriminator, e.g. `"run.started"`.
    pub event_type: String,
    /// Schema version of `data` for this `event_type`.
    pub event_version: u32,
    /// Wall-clock time the action actually happened, as reported by the
    /// caller (may lag `recorded_at`).
    pub occurred_at: DateTime<Utc>,
    /// Tenancy boundary.
    pub workspace_id: WorkspaceId,
    /// Optional mission grouping.
    pub mission_id: Option<MissionId>,
    /// Optional room scope.
    pub room_id: Option<RoomId>,
    /// Optional thread scope.
    pub thread_id: Option<ThreadId>,
    /// Optional run scope.
    pub run_id: Option<RunId>,
    /// Optional step scope.
    pub step_id: Option<StepId>,
    /// Kind of actor that caused this event.
    pub actor_type: ActorType,
    /// Legacy actor identifier.
    pub actor_id: ActorId,
    /// Resolved durable principal, when known.
    pub actor_principal_id: Option<PrincipalId>,
    /// Action-risk tier.
    pub zone: Zone,
    /// Stream this event is appended to.
    pub stream: StreamRef,
    /// Opaque event payload.
    pub data: Value,
    /// Policy evaluation context captured at append time, if any.
    pub policy_context: Option<Value>,
    /// Model/agent context captured at append time, if any.
    pub model_context: Option<Value>,
    /// Precomputed UI display hints, if any.
    pub display: Option<Value>,
    /// Cross-stream correlation identifier.
    pub correlation_id: CorrelationId,
    /// Identifier of the event that caused this one, if any.
    pub causation_id: Option<EventId>,
    /// Caller-supplied idempotency key, scoped to the target stream.
    pub idempotency_key: Option<IdempotencyKey>,
}

/// The immutable, persisted event row (§3 Event entity).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Immutable event identifier.
    pub event_id: EventId,
    /// Event type discriminator.
    pub event_type: String,
    /// Schema version of `data`.
    pub event_version: u32,
    /// Caller-reported occurrence time.
    pub occurred_at: DateTime<Utc>,
    /// Server-assigned persistence time.
    pub recorded_at: DateTime<Utc>,
    /// Tenancy boundary.
    pub workspace_id: WorkspaceId,
    /// Optional mission grouping.
    pub mission_id: Option<MissionId>,
    /// Optional room scope.
    pub room_id: Option<RoomId>,
    /// Optional thread scope.
    pub thread_id: Option<ThreadId>,
    /// Optional run scope.
    pub run_id: Option<RunId>,
    /// Optional step scope.
    pub step_id: Option<StepId>,
    /// Kind of actor that caused this event.
    pub actor_type: ActorType,
    /// Legacy actor identifier.
    pub actor_id: ActorId,
    /// Resolved durable principal, when known.
    pub actor_principal_id: Option<PrincipalId>,
    /// Action-risk tier.
    pub zone: Zone,
    /// Stream this event belongs to.
    pub stream: StreamRef,
    /// Position within the stream; strictly monotonic (§3 invariant 2).
    pub stream_seq: i64,
    /// Redaction state after the DLP scan.
    pub redaction_level: RedactionLevel,
    /// Whether the DLP scan found and masked a secret.
    pub contains_secrets: bool,
    /// Opaque, possibly-redacted event payload.
    pub data: Value,
    /// Policy evaluation context captured at append time, if any.
    pub policy_context: Option<Value>,
    /// Model/agent context captured at append time, if any.
    pub model_context: Option<Value>,
    /// Precomputed UI display hints, if any.
    pub display: Option<Value>,
    /// Cross-stream correlation identifier.
    pub correlation_id: CorrelationId,
    /// Identifier of the event that caused this one, if any.
    pub causation_id: Option<EventId>,
    /// Caller-supplied idempotency key, scoped to the target stream.
    pub idempotency_key: Option<IdempotencyKey>,
    /// Hash of the predecessor event in the same stream, or empty for the
    /// first event.
    pub prev_event_hash: String,
    /// This event's own content hash (§3 invariant 4).
    pub event_hash: String,
}

/// The subset of an [`EventRecord`] that feeds the hash chain computation.
/// Recomputing this struct's canonical JSON must reproduce `event_hash`
/// given `prev_event_hash` (§9 "Canonical JSON for hashing").
#[derive(Debug, Clone, Serialize)]
pub struct HashableEvent<'a> {
    /// Event type discriminator.
    pub event_type: &'a str,
    /// Schema version of `data`.
    pub event_version: u32,
    /// Caller-reported occurrence time.
    pub occurred_at: DateTime<Utc>,
    /// Tenancy boundary.
    pub workspace_id: &'a str,
    /// Stream family.
    pub stream_type: &'a str,
    /// Stream instance.
    pub stream_id: &'a str,
    /// Position within the stream.
    pub stream_seq: i64,
    /// Opaque, possibly-redacted event payload.
    pub data: &'a Value,
}

impl EventRecord {
    /// Projects this record onto the fields that participate in the hash
    /// chain.
    #[must_use]
    pub fn as_hashable(&self) -> HashableEvent<'_> {
        HashableEvent {
            event_type: &self.event_type,
            event_version: self.event_version,
            occurred_at: self.occurred_at,
            workspace_id: self.workspace_id.as_str(),
            stream_type: &self.stream.stream_type,
            stream_id: &self.stream.stream_id,
            stream_seq: self.stream_seq,
            data: &self.data,
        }
    }
}
