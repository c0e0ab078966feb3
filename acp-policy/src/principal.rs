// acp-policy/src/principal.rs
// ============================================================================
// Module: Principal & Identity Resolver
// Description: Agent-binding validation on top of `acp-store`'s principal
//              table (§4.3).
// Purpose: The one place the Policy Gate asks "does this actor really own
//          this principal?" before evaluating anything else.
// Dependencies: acp-core, acp-store
// ============================================================================

use acp_core::ActorId;
use acp_core::ActorType;
use acp_core::PrincipalId;
use acp_core::ReasonCode;
use sqlx::PgPool;

use crate::error::PolicyError;

/// Validates that `actor_type=agent` callers present a principal whose
/// bound legacy actor id matches the request's `actor_id` (§4.3).
///
/// Returns `Ok(None)` when the binding holds (or the actor is not an
/// agent, which has no binding requirement). Returns `Ok(Some(reason))`
/// with the specific denial reason otherwise; never returns `Err` for a
/// binding mismatch, only for storage failures.
///
/// # Errors
///
/// Returns [`PolicyError::Store`] on database failure.
pub async fn validate_agent_binding(
    pool: &PgPool,
    actor_type: ActorType,
    actor_id: &ActorId,
    principal_id: Option<PrincipalId>,
) -> Result<Option<ReasonCode>, PolicyError> {
    if !matches!(actor_type, ActorType::Agent) {
        return Ok(None);
    }

    let Some(principal_id) = principal_id else {
        return Ok(Some(ReasonCode::AgentPrincipalRequired));
    };

    let Some(principal) = acp_store::find_principal(pool, principal_id).await? else {
        return Ok(Some(ReasonCode::AgentPrincipalNotFound));
    };

    let bound_actor_id = principal.legacy_actor_id.as_deref();
    if bound_actor_id != Some(actor_id.as_str()) {
        return Ok(Some(ReasonCode::AgentActorIdMismatch));
    }

    Ok(None)
}
