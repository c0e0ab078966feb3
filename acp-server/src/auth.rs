// acp-server/src/auth.rs
// ============================================================================
// Module: Request Context Extraction
// Description: Pulls the workspace, actor, and (optional) capability token
//              identifiers every handler needs out of request headers (§6
//              "All commands require header x-workspace-id").
// Purpose: One extractor so route handlers never hand-parse headers.
// Dependencies: acp-core, axum
// ============================================================================

use acp_core::ActorId;
use acp_core::ActorType;
use acp_core::PrincipalId;
use acp_core::RoomId;
use acp_core::TokenId;
use acp_core::WorkspaceId;
use acp_core::Zone;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;

/// Request-scoped identity resolved from headers: which workspace this
/// call targets, and who is making it.
///
/// `x-workspace-id` is required. `x-actor-type` (`service`|`user`|`agent`,
/// default `user`), `x-actor-id` (default `"anonymous"`), `x-principal-id`,
/// `x-capability-token-id`, and `x-zone` are optional; the Policy Gate
/// treats their absence as the least-privileged case.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The tenant this request operates within.
    pub workspace_id: WorkspaceId,
    /// The kind of caller.
    pub actor_type: ActorType,
    /// The caller's actor id.
    pub actor_id: ActorId,
    /// The caller's resolved principal, if presented.
    pub principal_id: Option<PrincipalId>,
    /// The capability token presented with this request, if any.
    pub capability_token_id: Option<TokenId>,
    /// The zone this request executes in.
    pub zone: Zone,
    /// A room scope hint, if the caller supplied one.
    pub room_id: Option<RoomId>,
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let workspace_id = header_str(parts, "x-workspace-id").ok_or(ApiError::MissingWorkspace)?;
        let actor_type = header_str(parts, "x-actor-type").as_deref().map(parse_actor_type).unwrap_or(ActorType::User);
        let actor_id = header_str(parts, "x-actor-id").unwrap_or_else(|| "anonymous".to_string());
        let principal_id = header_str(parts, "x-principal-id").and_then(|raw| raw.parse().ok()).map(PrincipalId::from_uuid);
        let capability_token_id =
            header_str(parts, "x-capability-token-id").and_then(|raw| raw.parse().ok()).map(TokenId::from_uuid);
        let zone = header_str(parts, "x-zone").as_deref().map(parse_zone).unwrap_or(Zone::Supervised);
        let room_id = header_str(parts, "x-room-id").and_then(|raw| raw.parse().ok()).map(RoomId::from_uuid);

        Ok(Self {
            workspace_id: WorkspaceId::new(workspace_id),
            actor_type,
            actor_id: ActorId::new(actor_id),
            principal_id,
            capability_token_id,
            zone,
            room_id,
        })
    }
}

fn header_str(parts: &Parts, name: &str) -> Option<String> {
    parts.headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_string)
}

fn parse_actor_type(label: &str) -> ActorType {
    match label {
        "service" => ActorType::Service,
        "agent" => ActorType::Agent,
        _ => ActorType::User,
    }
}

fn parse_zone(label: &str) -> Zone {
    match label {
        "sandbox" => Zone::Sandbox,
        "high_stakes" => Zone::HighStakes,
        _ => Zone::Supervised,
    }
}
