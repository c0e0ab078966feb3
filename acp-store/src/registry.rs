// acp-store/src/registry.rs
// ============================================================================
// Module: Action Registry & Agent Quarantine Lookups
// Description: Read accessors over `action_registry` and `proj_agents`
//              consulted by the Policy Gate's steps 3 and 5 (§4.5).
// Purpose: Let `acp-policy` evaluate zone/pre-approval/post-review rules
//          and quarantine status without duplicating table shape.
// Dependencies: acp-core, sqlx
// ============================================================================

use acp_core::ActionMetadata;
use acp_core::ActionRegistryEntry;
use acp_core::PrincipalId;
use acp_core::WorkspaceId;
use acp_core::Zone;
use chrono::DateTime;
use chrono::Utc;
use sqlx::PgPool;
use sqlx::Row;

use crate::error::StoreError;

/// Looks up the catalog entry for `action_type`.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn get_action_registry_entry(
    pool: &PgPool,
    action_type: &str,
) -> Result<Option<ActionRegistryEntry>, StoreError> {
    let row = sqlx::query(
        "SELECT action_type, reversible, zone_required, requires_pre_approval, \
         post_review_required, metadata FROM action_registry WHERE action_type = $1",
    )
    .bind(action_type)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let zone_required: Option<String> = row.try_get("zone_required")?;
    let metadata: serde_json::Value = row.try_get("metadata")?;

    Ok(Some(ActionRegistryEntry {
        action_type: row.try_get("action_type")?,
        reversible: row.try_get("reversible")?,
        zone_required: zone_required.as_deref().map(parse_zone),
        requires_pre_approval: row.try_get("requires_pre_approval")?,
        post_review_required: row.try_get("post_review_required")?,
        metadata: serde_json::from_value(metadata).unwrap_or_else(|_| ActionMetadata::default()),
    }))
}

fn parse_zone(label: &str) -> Zone {
    match label {
        "sandbox" => Zone::Sandbox,
        "high_stakes" => Zone::HighStakes,
        _ => Zone::Supervised,
    }
}

/// True when `principal_id` is bound to an agent currently under
/// quarantine.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn is_principal_quarantined(pool: &PgPool, principal_id: PrincipalId) -> Result<bool, StoreError> {
    let row = sqlx::query(
        "SELECT quarantined_at FROM proj_agents WHERE principal_id = $1 AND quarantined_at IS \
         NOT NULL LIMIT 1",
    )
    .bind(principal_id.to_string())
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

/// Counts `sec_egress_requests` rows for `principal_id` recorded at or
/// after `since`, for the quota check in §4.5 step 6.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn count_egress_requests_since(
    pool: &PgPool,
    principal_id: PrincipalId,
    since: DateTime<Utc>,
) -> Result<i64, StoreError> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS request_count FROM sec_egress_requests WHERE principal_id = $1 AND \
         created_at >= $2",
    )
    .bind(principal_id.to_string())
    .bind(since)
    .fetch_one(pool)
    .await?;
    Ok(row.try_get("request_count")?)
}

/// One recorded egress decision, for `GET /egress/requests`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EgressRequestRow {
    /// Tenancy boundary.
    pub workspace_id: String,
    /// The requesting principal, when resolved.
    pub principal_id: Option<String>,
    /// Risk tier in effect at request time.
    pub zone: String,
    /// Normalized target domain.
    pub domain: String,
    /// Full request url, when supplied.
    pub url: Option<String>,
    /// HTTP method, when supplied.
    pub method: Option<String>,
    /// `allow` or `block`.
    pub decision: String,
    /// Whether the request was blocked.
    pub blocked: bool,
    /// The reason code behind the decision.
    pub reason_code: String,
    /// Linked approval, if one covers this request.
    pub approval_id: Option<String>,
    /// Caller-supplied justification.
    pub justification: Option<String>,
    /// When this request was recorded.
    pub created_at: DateTime<Utc>,
}

/// Lists recorded egress decisions in a workspace, most recent first.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn list_egress_requests(
    pool: &PgPool,
    workspace_id: &WorkspaceId,
    limit: i64,
) -> Result<Vec<EgressRequestRow>, StoreError> {
    let rows = sqlx::query(
        "SELECT workspace_id, principal_id, zone, domain, url, method, decision, blocked, \
         reason_code, approval_id, justification, created_at FROM sec_egress_requests WHERE \
         workspace_id = $1 ORDER BY created_at DESC LIMIT $2",
    )
    .bind(workspace_id.as_str())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(EgressRequestRow {
                workspace_id: row.try_get("workspace_id")?,
                principal_id: row.try_get("principal_id")?,
                zone: row.try_get("zone")?,
                domain: row.try_get("domain")?,
                url: row.try_get("url")?,
                method: row.try_get("method")?,
                decision: row.try_get("decision")?,
                blocked: row.try_get("blocked")?,
                reason_code: row.try_get("reason_code")?,
                approval_id: row.try_get("approval_id")?,
                justification: row.try_get("justification")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}
