// acp-store/src/principals.rs
// ============================================================================
// Module: Principal Lookups
// Description: Read accessors over the `principals` table written by the
//              event writer's `ensure_principal_for_legacy_actor` step
//              (§4.3).
// Purpose: Let `acp-policy`'s Principal Resolver validate agent bindings
//          without duplicating the table's shape.
// Dependencies: acp-core, sqlx
// ============================================================================

use acp_core::ActorType;
use acp_core::PrincipalId;
use acp_core::WorkspaceId;
use sqlx::PgPool;
use sqlx::Row;
use uuid::Uuid;

use crate::error::StoreError;

/// One resolved principal row.
#[derive(Debug, Clone)]
pub struct PrincipalRow {
    /// The principal's identifier.
    pub principal_id: PrincipalId,
    /// Tenancy boundary the principal was created in.
    pub workspace_id: WorkspaceId,
    /// The legacy actor type bound to this principal, if any.
    pub legacy_actor_type: Option<ActorType>,
    /// The legacy actor id bound to this principal, if any.
    pub legacy_actor_id: Option<String>,
}

/// Resolves (creating if necessary) the principal bound to a legacy
/// `(workspace_id, actor_type, actor_id)` triple — the same upsert the
/// event writer runs inline on every append, exposed standalone for
/// `POST /principals/legacy/ensure`.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn ensure_principal(
    pool: &PgPool,
    workspace_id: &WorkspaceId,
    actor_type: ActorType,
    actor_id: &str,
) -> Result<PrincipalId, StoreError> {
    let principal_type = actor_type.to_string();
    let row = sqlx::query(
        "INSERT INTO principals (principal_id, workspace_id, principal_type, \
         legacy_actor_type, legacy_actor_id) VALUES ($1, $2, $3, $4, $5) ON CONFLICT \
         (workspace_id, legacy_actor_type, legacy_actor_id) DO UPDATE SET principal_id = \
         principals.principal_id RETURNING principal_id",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(workspace_id.as_str())
    .bind(&principal_type)
    .bind(&principal_type)
    .bind(actor_id)
    .fetch_one(pool)
    .await?;
    let principal_id: String = row.try_get("principal_id")?;
    Ok(PrincipalId::from_uuid(Uuid::parse_str(&principal_id).unwrap_or_else(|_| Uuid::new_v4())))
}

/// Looks up a principal by id.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn find_principal(
    pool: &PgPool,
    principal_id: PrincipalId,
) -> Result<Option<PrincipalRow>, StoreError> {
    let row = sqlx::query(
        "SELECT principal_id, workspace_id, legacy_actor_type, legacy_actor_id FROM principals \
         WHERE principal_id = $1",
    )
    .bind(principal_id.to_string())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let principal_id_raw: String = row.try_get("principal_id")?;
    let legacy_actor_type: Option<String> = row.try_get("legacy_actor_type")?;

    Ok(Some(PrincipalRow {
        principal_id: PrincipalId::from_uuid(
            Uuid::parse_str(&principal_id_raw).unwrap_or_else(|_| Uuid::new_v4()),
        ),
        workspace_id: WorkspaceId::new(row.try_get::<String, _>("workspace_id")?),
        legacy_actor_type: legacy_actor_type.as_deref().map(parse_actor_type),
        legacy_actor_id: row.try_get("legacy_actor_id")?,
    }))
}

fn parse_actor_type(label: &str) -> ActorType {
    match label {
        "user" => ActorType::User,
        "agent" => ActorType::Agent,
        _ => ActorType::Service,
    }
}
