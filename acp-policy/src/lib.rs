// acp-policy/src/lib.rs
// ============================================================================
// Module: Agent Control Plane Policy
// Description: Principal resolution, capability tokens, the Policy Gate,
//              and the human-in-the-loop approval substrate.
// Purpose: Everything that decides whether an action, tool call, data
//          access, or egress request may proceed (§4.3-§4.6).
// Dependencies: acp-core, acp-store, acp-config
// ============================================================================

//! ## Overview
//! `acp-policy` sits between the HTTP/worker layer and `acp-store`. It
//! never mutates a `proj_*` table directly — every state change is an
//! event appended through `acp_store::EventWriter`, and the projection
//! dispatch in `acp-store` is solely responsible for keeping read models in
//! sync.

pub mod approvals;
pub mod capabilities;
pub mod error;
pub mod gate;
pub mod principal;

pub use approvals::ApprovalDecisionKind;
pub use approvals::ApprovalRow;
pub use approvals::ApprovalScope;
pub use approvals::RequestApproval;
pub use approvals::ScopeType;
pub use capabilities::CapabilityToken;
pub use capabilities::GrantRequest;
pub use capabilities::MAX_DELEGATION_DEPTH;
pub use error::PolicyError;
pub use gate::Category;
pub use gate::DataMode;
pub use gate::GateSubject;
pub use gate::NoopPolicyFailureSink;
pub use gate::PolicyFailureSink;
