// acp-policy/src/capabilities.rs
// ============================================================================
// Module: Capability Token Service
// Description: Grant, revoke, and lookup operations over capability tokens
//              and their delegation edges (§4.4).
// Purpose: Enforce the per-axis scope intersection and delegation-depth
//          bound before a token is ever persisted.
// Dependencies: acp-core, acp-store
// ============================================================================

use acp_core::ActorId;
use acp_core::ActorType;
use acp_core::CapabilityScopes;
use acp_core::CorrelationId;
use acp_core::EventEnvelope;
use acp_core::IdempotencyKey;
use acp_core::PrincipalId;
use acp_core::StreamRef;
use acp_core::TokenId;
use acp_core::WorkspaceId;
use acp_core::Zone;
use acp_store::EventWriter;
use chrono::DateTime;
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use sqlx::Row;
use uuid::Uuid;

use crate::error::PolicyError;

/// Delegation chains longer than this are rejected outright (§4.4).
pub const MAX_DELEGATION_DEPTH: usize = 3;

/// A capability token row, as read back from `proj_capability_tokens`.
#[derive(Debug, Clone)]
pub struct CapabilityToken {
    /// The token's identifier.
    pub token_id: TokenId,
    /// Tenancy boundary.
    pub workspace_id: WorkspaceId,
    /// The principal this token authorizes.
    pub issued_to_principal_id: PrincipalId,
    /// The principal that issued (or delegated) this token.
    pub granted_by_principal_id: PrincipalId,
    /// The token this one was delegated from, if any.
    pub parent_token_id: Option<TokenId>,
    /// Effective scopes.
    pub scopes: CapabilityScopes,
    /// Optional expiry.
    pub valid_until: Option<DateTime<Utc>>,
    /// Revocation timestamp, if revoked.
    pub revoked_at: Option<DateTime<Utc>>,
}

impl CapabilityToken {
    /// True when neither expired nor revoked at `now`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.valid_until.is_none_or(|expiry| expiry > now)
    }
}

/// Parameters for [`grant`].
#[derive(Debug, Clone)]
pub struct GrantRequest {
    /// Tenancy boundary.
    pub workspace_id: WorkspaceId,
    /// The principal the new token authorizes.
    pub issued_to_principal_id: PrincipalId,
    /// The principal issuing (or delegating) the token.
    pub granted_by_principal_id: PrincipalId,
    /// The token to delegate from, if this is a delegation grant.
    pub parent_token_id: Option<TokenId>,
    /// Requested scopes; intersected with the parent's scopes when
    /// delegating.
    pub requested_scopes: CapabilityScopes,
    /// Optional expiry.
    pub valid_until: Option<DateTime<Utc>>,
    /// Actor recorded on the emitted events.
    pub actor_id: ActorId,
}

/// Reads one token by id.
///
/// # Errors
///
/// Returns [`PolicyError::Store`] on database failure.
pub async fn get_token(
    pool: &PgPool,
    token_id: TokenId,
) -> Result<Option<CapabilityToken>, PolicyError> {
    let row = sqlx::query(
        "SELECT token_id, workspace_id, issued_to_principal_id, granted_by_principal_id, \
         parent_token_id, scopes, valid_until, revoked_at FROM proj_capability_tokens WHERE \
         token_id = $1",
    )
    .bind(token_id.to_string())
    .fetch_optional(pool)
    .await
    .map_err(acp_store::StoreError::from)?;
    row.map(row_to_token).transpose()
}

/// Lists every token issued to `principal_id`.
///
/// # Errors
///
/// Returns [`PolicyError::Store`] on database failure.
pub async fn list_by_principal(
    pool: &PgPool,
    principal_id: PrincipalId,
) -> Result<Vec<CapabilityToken>, PolicyError> {
    let rows = sqlx::query(
        "SELECT token_id, workspace_id, issued_to_principal_id, granted_by_principal_id, \
         parent_token_id, scopes, valid_until, revoked_at FROM proj_capability_tokens WHERE \
         issued_to_principal_id = $1 ORDER BY created_at DESC",
    )
    .bind(principal_id.to_string())
    .fetch_all(pool)
    .await
    .map_err(acp_store::StoreError::from)?;
    rows.into_iter().map(row_to_token).collect()
}

/// Lists the direct children delegated from `token_id`.
///
/// # Errors
///
/// Returns [`PolicyError::Store`] on database failure.
pub async fn list_delegations(
    pool: &PgPool,
    token_id: TokenId,
) -> Result<Vec<TokenId>, PolicyError> {
    let rows = sqlx::query(
        "SELECT child_token_id FROM proj_delegation_edges WHERE parent_token_id = $1 ORDER BY \
         created_at ASC",
    )
    .bind(token_id.to_string())
    .fetch_all(pool)
    .await
    .map_err(acp_store::StoreError::from)?;
    rows.iter()
        .map(|row| {
            let raw: String = row.try_get("child_token_id").map_err(acp_store::StoreError::from)?;
            Ok(TokenId::from_uuid(Uuid::parse_str(&raw).unwrap_or_else(|_| Uuid::new_v4())))
        })
        .collect()
}

/// Grants a new token, delegating from `parent_token_id` when present.
///
/// On a delegation failure (grantor mismatch, inactive/expired parent, or
/// depth overflow), emits `agent.delegation.attempted` carrying the
/// `denied_reason` and returns the corresponding [`PolicyError`] without
/// inserting a token.
///
/// # Errors
///
/// Returns [`PolicyError`] on validation failure or storage error.
pub async fn grant(
    pool: &PgPool,
    writer: &EventWriter,
    request: GrantRequest,
) -> Result<CapabilityToken, PolicyError> {
    let effective_scopes = if let Some(parent_token_id) = request.parent_token_id {
        let Some(parent) = get_token(pool, parent_token_id).await? else {
            emit_denied_delegation(pool, writer, &request, "parent_token_missing").await?;
            return Err(PolicyError::ParentTokenInvalid(parent_token_id.to_string()));
        };
        if parent.issued_to_principal_id != request.granted_by_principal_id {
            emit_denied_delegation(pool, writer, &request, "grantor_not_parent_owner").await?;
            return Err(PolicyError::DelegationGrantorMismatch);
        }
        if !parent.is_active(Utc::now()) {
            emit_denied_delegation(pool, writer, &request, "parent_token_inactive").await?;
            return Err(PolicyError::ParentTokenInvalid(parent_token_id.to_string()));
        }
        let depth = delegation_depth(pool, parent_token_id).await?;
        if depth + 1 > MAX_DELEGATION_DEPTH {
            emit_denied_delegation(pool, writer, &request, "depth_exceeded").await?;
            return Err(PolicyError::DelegationDepthExceeded(depth + 1));
        }
        request.requested_scopes.intersect(&parent.scopes)
    } else {
        request.requested_scopes.clone()
    };

    let token_id = TokenId::new();
    let mut tx = pool.begin().await.map_err(acp_store::StoreError::from)?;

    let envelope = EventEnvelope {
        event_type: "capability.granted".to_string(),
        event_version: 1,
        occurred_at: Utc::now(),
        workspace_id: request.workspace_id.clone(),
        mission_id: None,
        room_id: None,
        thread_id: None,
        run_id: None,
        step_id: None,
        actor_type: ActorType::Service,
        actor_id: request.actor_id.clone(),
        actor_principal_id: Some(request.granted_by_principal_id),
        zone: Zone::Supervised,
        stream: StreamRef::workspace(&request.workspace_id),
        data: json!({
            "token_id": token_id,
            "issued_to_principal_id": request.issued_to_principal_id,
            "granted_by_principal_id": request.granted_by_principal_id,
            "parent_token_id": request.parent_token_id,
            "scopes": effective_scopes,
            "valid_until": request.valid_until,
        }),
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("capability:{token_id}")),
        causation_id: None,
        idempotency_key: Some(IdempotencyKey::new(format!("capability-grant:{token_id}"))),
    };
    writer.append_in_tx(&mut tx, envelope).await?;
    if let Some(parent_token_id) = request.parent_token_id {
        let delegation_envelope =
            delegation_attempt_envelope(&request, parent_token_id, Some(token_id), None);
        writer.append_in_tx(&mut tx, delegation_envelope).await?;
    }
    tx.commit().await.map_err(acp_store::StoreError::from)?;

    Ok(CapabilityToken {
        token_id,
        workspace_id: request.workspace_id,
        issued_to_principal_id: request.issued_to_principal_id,
        granted_by_principal_id: request.granted_by_principal_id,
        parent_token_id: request.parent_token_id,
        scopes: effective_scopes,
        valid_until: request.valid_until,
        revoked_at: None,
    })
}

/// Revokes a token, emitting `agent.capability.revoked`.
///
/// # Errors
///
/// Returns [`PolicyError::TokenNotFound`] if the token does not exist, or
/// a storage error.
pub async fn revoke(
    pool: &PgPool,
    writer: &EventWriter,
    token_id: TokenId,
    actor_id: &ActorId,
) -> Result<(), PolicyError> {
    let token =
        get_token(pool, token_id).await?.ok_or_else(|| PolicyError::TokenNotFound(token_id.to_string()))?;

    let envelope = EventEnvelope {
        event_type: "capability.revoked".to_string(),
        event_version: 1,
        occurred_at: Utc::now(),
        workspace_id: token.workspace_id.clone(),
        mission_id: None,
        room_id: None,
        thread_id: None,
        run_id: None,
        step_id: None,
        actor_type: ActorType::Service,
        actor_id: actor_id.clone(),
        actor_principal_id: Some(token.granted_by_principal_id),
        zone: Zone::Supervised,
        stream: StreamRef::workspace(&token.workspace_id),
        data: json!({
            "token_id": token_id,
            "issued_to_principal_id": token.issued_to_principal_id,
        }),
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("capability:{token_id}")),
        causation_id: None,
        idempotency_key: Some(IdempotencyKey::new(format!("capability-revoke:{token_id}"))),
    };
    writer.append_to_stream(pool, envelope).await?;
    Ok(())
}

/// Validates that `token_id` is active and issued to `principal_id`
/// (§4.4 "Validate").
///
/// # Errors
///
/// Returns [`PolicyError::TokenNotFound`] if the token does not exist.
pub async fn validate(
    pool: &PgPool,
    token_id: TokenId,
    principal_id: PrincipalId,
) -> Result<Option<acp_core::ReasonCode>, PolicyError> {
    use acp_core::ReasonCode;

    let token =
        get_token(pool, token_id).await?.ok_or_else(|| PolicyError::TokenNotFound(token_id.to_string()))?;
    if token.revoked_at.is_some() {
        return Ok(Some(ReasonCode::CapabilityTokenRevoked));
    }
    if token.valid_until.is_some_and(|expiry| expiry <= Utc::now()) {
        return Ok(Some(ReasonCode::CapabilityTokenExpired));
    }
    if token.issued_to_principal_id != principal_id {
        return Ok(Some(ReasonCode::CapabilityPrincipalMismatch));
    }
    Ok(None)
}

async fn delegation_depth(pool: &PgPool, mut token_id: TokenId) -> Result<usize, PolicyError> {
    let mut depth = 0;
    loop {
        let Some(token) = get_token(pool, token_id).await? else {
            break;
        };
        match token.parent_token_id {
            Some(parent) => {
                depth += 1;
                token_id = parent;
            }
            None => break,
        }
    }
    Ok(depth)
}

/// Builds a `delegation.attempted` envelope. `child_token_id` is present
/// only for a successful grant; a denied attempt carries no child and
/// `denied_reason` explains why.
fn delegation_attempt_envelope(
    request: &GrantRequest,
    parent_token_id: TokenId,
    child_token_id: Option<TokenId>,
    denied_reason: Option<&str>,
) -> EventEnvelope {
    EventEnvelope {
        event_type: "delegation.attempted".to_string(),
        event_version: 1,
        occurred_at: Utc::now(),
        workspace_id: request.workspace_id.clone(),
        mission_id: None,
        room_id: None,
        thread_id: None,
        run_id: None,
        step_id: None,
        actor_type: ActorType::Service,
        actor_id: request.actor_id.clone(),
        actor_principal_id: Some(request.granted_by_principal_id),
        zone: Zone::Supervised,
        stream: StreamRef::workspace(&request.workspace_id),
        data: json!({
            "parent_token_id": parent_token_id,
            "child_token_id": child_token_id,
            "issued_to_principal_id": request.issued_to_principal_id,
            "granted_by_principal_id": request.granted_by_principal_id,
            "allowed": child_token_id.is_some(),
            "denied_reason": denied_reason,
        }),
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("capability:{parent_token_id}")),
        causation_id: None,
        idempotency_key: None,
    }
}

async fn emit_denied_delegation(
    pool: &PgPool,
    writer: &EventWriter,
    request: &GrantRequest,
    denied_reason: &str,
) -> Result<(), PolicyError> {
    let Some(parent_token_id) = request.parent_token_id else {
        return Ok(());
    };
    let envelope = delegation_attempt_envelope(request, parent_token_id, None, Some(denied_reason));
    writer.append_to_stream(pool, envelope).await?;
    Ok(())
}

fn row_to_token(row: sqlx::postgres::PgRow) -> Result<CapabilityToken, PolicyError> {
    let token_id_raw: String = row.try_get("token_id").map_err(acp_store::StoreError::from)?;
    let issued_to_raw: String =
        row.try_get("issued_to_principal_id").map_err(acp_store::StoreError::from)?;
    let granted_by_raw: String =
        row.try_get("granted_by_principal_id").map_err(acp_store::StoreError::from)?;
    let parent_raw: Option<String> =
        row.try_get("parent_token_id").map_err(acp_store::StoreError::from)?;
    let scopes: serde_json::Value = row.try_get("scopes").map_err(acp_store::StoreError::from)?;

    Ok(CapabilityToken {
        token_id: TokenId::from_uuid(Uuid::parse_str(&token_id_raw).unwrap_or_else(|_| Uuid::new_v4())),
        workspace_id: WorkspaceId::new(
            row.try_get::<String, _>("workspace_id").map_err(acp_store::StoreError::from)?,
        ),
        issued_to_principal_id: PrincipalId::from_uuid(
            Uuid::parse_str(&issued_to_raw).unwrap_or_else(|_| Uuid::new_v4()),
        ),
        granted_by_principal_id: PrincipalId::from_uuid(
            Uuid::parse_str(&granted_by_raw).unwrap_or_else(|_| Uuid::new_v4()),
        ),
        parent_token_id: parent_raw
            .and_then(|raw| Uuid::parse_str(&raw).ok())
            .map(TokenId::from_uuid),
        scopes: serde_json::from_value(scopes).unwrap_or_default(),
        valid_until: row.try_get("valid_until").map_err(acp_store::StoreError::from)?,
        revoked_at: row.try_get("revoked_at").map_err(acp_store::StoreError::from)?,
    })
}
