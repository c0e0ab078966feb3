// acp-egress/src/lib.rs
// ============================================================================
// Module: Agent Control Plane Egress Broker
// Description: Single outbound-decision substrate (§4.8): normalize a
//              target, run it through the Policy Gate, record the
//              decision, and emit the event trail.
// Purpose: Give HTTP handlers and the Runtime Worker one call that cannot
//          be used without recording a `sec_egress_requests` row.
// Dependencies: acp-core, acp-config, acp-policy, acp-store
// ============================================================================

//! ## Overview
//! Mirrors the teacher's `CompositeBroker`: a source-side step resolves
//! the outbound target (here, [`request::normalize_domain`]) and a
//! sink-side step records the outcome. There is no delivery leg in this
//! system, so the only "sink" is the event/projection writer — recording
//! the decision *is* the delivery.

pub mod error;
pub mod request;

pub use error::EgressError;
pub use request::normalize_domain;
pub use request::request_egress;
pub use request::service_actor_id;
