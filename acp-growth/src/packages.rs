// acp-growth/src/packages.rs
// ============================================================================
// Module: Skill Package Supply Chain
// Description: `pending -> verified|quarantined -> active|retired` state
//              machine for imported skill packages (§4.9 Skill Packages).
// Purpose: Auto-quarantine unsigned or hash-mismatched packages instead of
//          trusting caller-asserted verification.
// Dependencies: acp-core, acp-store
// ============================================================================

use acp_core::ActorId;
use acp_core::ActorType;
use acp_core::AgentId;
use acp_core::CorrelationId;
use acp_core::EventEnvelope;
use acp_core::SkillPackageId;
use acp_core::StreamRef;
use acp_core::WorkspaceId;
use acp_core::Zone;
use acp_core::hashing::sha256_hex;
use acp_store::EventWriter;
use serde_json::json;
use sqlx::PgPool;
use sqlx::Row;

use crate::error::GrowthError;

/// Reason recorded when a package is quarantined for lacking a signature.
pub const REASON_VERIFY_SIGNATURE_REQUIRED: &str = "verify_signature_required";
/// Reason recorded when a package's content hash does not match its
/// manifest-asserted hash.
pub const REASON_VERIFY_HASH_MISMATCH: &str = "verify_hash_mismatch";

/// Current lifecycle state of a skill package, as stored in
/// `growth_skill_packages.state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageState {
    /// Submitted, not yet verified.
    Pending,
    /// Signature and hash checked out.
    Verified,
    /// Failed verification or was quarantined after activation.
    Quarantined,
    /// Verified and in active use.
    Active,
    /// No longer in use.
    Retired,
}

impl PackageState {
    fn parse(label: &str) -> Self {
        match label {
            "verified" => Self::Verified,
            "quarantined" => Self::Quarantined,
            "active" => Self::Active,
            "retired" => Self::Retired,
            _ => Self::Pending,
        }
    }
}

/// A `growth_skill_packages` row.
#[derive(Debug, Clone)]
pub struct PackageRow {
    /// Package identifier.
    pub package_id: SkillPackageId,
    /// Agent that submitted the package, if known.
    pub agent_id: Option<AgentId>,
    /// Declared package name.
    pub name: String,
    /// Declared package version.
    pub version: String,
    /// Current lifecycle state.
    pub state: PackageState,
    /// Content hash recorded at submission time, if any.
    pub content_hash: Option<String>,
    /// Quarantine reason, set only in [`PackageState::Quarantined`].
    pub quarantine_reason: Option<String>,
}

async fn load(pool: &PgPool, package_id: SkillPackageId) -> Result<PackageRow, GrowthError> {
    let row = sqlx::query(
        "SELECT package_id, agent_id, name, version, state, content_hash, quarantine_reason FROM \
         growth_skill_packages WHERE package_id = $1",
    )
    .bind(package_id.to_string())
    .fetch_optional(pool)
    .await?;
    let Some(row) = row else {
        return Err(GrowthError::PackageNotFound(package_id.to_string()));
    };
    let agent_id: Option<String> = row.try_get("agent_id")?;
    let state: String = row.try_get("state")?;
    Ok(PackageRow {
        package_id,
        agent_id: agent_id.map(AgentId::new),
        name: row.try_get("name")?,
        version: row.try_get("version")?,
        state: PackageState::parse(&state),
        content_hash: row.try_get("content_hash")?,
        quarantine_reason: row.try_get("quarantine_reason")?,
    })
}

fn envelope(
    workspace_id: &WorkspaceId,
    actor_id: &ActorId,
    event_type: &str,
    package_id: SkillPackageId,
    data: serde_json::Value,
) -> EventEnvelope {
    EventEnvelope {
        event_type: event_type.to_string(),
        event_version: 1,
        occurred_at: chrono::Utc::now(),
        workspace_id: workspace_id.clone(),
        mission_id: None,
        room_id: None,
        thread_id: None,
        run_id: None,
        step_id: None,
        actor_type: ActorType::Service,
        actor_id: actor_id.clone(),
        actor_principal_id: None,
        zone: Zone::Supervised,
        stream: StreamRef::workspace(workspace_id),
        data,
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("skill-package:{package_id}")),
        causation_id: None,
        idempotency_key: None,
    }
}

/// Submits a new skill package for an agent, in `pending` state.
///
/// # Errors
///
/// Returns [`GrowthError::Store`] on event-append failure.
#[allow(clippy::too_many_arguments)]
pub async fn submit(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    package_id: SkillPackageId,
    agent_id: Option<&AgentId>,
    name: &str,
    version: &str,
    signature: Option<&str>,
    content_hash: Option<&str>,
    actor_id: &ActorId,
) -> Result<(), GrowthError> {
    let data = json!({
        "package_id": package_id.to_string(),
        "agent_id": agent_id.map(AgentId::as_str),
        "name": name,
        "version": version,
        "signature": signature,
        "content_hash": content_hash,
    });
    writer
        .append_to_stream(pool, envelope(workspace_id, actor_id, "skill.package.submitted", package_id, data))
        .await?;
    Ok(())
}

/// Verifies a pending package: a missing signature or a content hash that
/// does not match `manifest_bytes` auto-quarantines it instead of letting
/// it reach `active`.
///
/// # Errors
///
/// Returns [`GrowthError::PackageNotFound`] if the package is unknown, or
/// [`GrowthError::Store`] on event-append failure.
pub async fn verify(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    package_id: SkillPackageId,
    signature: Option<&str>,
    manifest_bytes: &[u8],
    actor_id: &ActorId,
) -> Result<PackageState, GrowthError> {
    let current = load(pool, package_id).await?;

    let Some(signature) = signature else {
        quarantine(pool, writer, workspace_id, package_id, REASON_VERIFY_SIGNATURE_REQUIRED, actor_id).await?;
        return Ok(PackageState::Quarantined);
    };

    let computed_hash = sha256_hex(manifest_bytes);
    let expected_hash = current.content_hash.as_deref();
    let hash_matches = expected_hash.is_none_or(|expected| expected == computed_hash);
    if !hash_matches {
        quarantine(pool, writer, workspace_id, package_id, REASON_VERIFY_HASH_MISMATCH, actor_id).await?;
        return Ok(PackageState::Quarantined);
    }

    let data = json!({
        "package_id": package_id.to_string(),
        "signature": signature,
        "content_hash": computed_hash,
    });
    writer
        .append_to_stream(pool, envelope(workspace_id, actor_id, "skill.package.verified", package_id, data))
        .await?;
    Ok(PackageState::Verified)
}

/// Quarantines a package with `reason`, terminal until retired.
///
/// # Errors
///
/// Returns [`GrowthError::Store`] on event-append failure.
pub async fn quarantine(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    package_id: SkillPackageId,
    reason: &str,
    actor_id: &ActorId,
) -> Result<(), GrowthError> {
    let data = json!({ "package_id": package_id.to_string(), "reason": reason });
    writer
        .append_to_stream(pool, envelope(workspace_id, actor_id, "skill.package.quarantined", package_id, data))
        .await?;
    Ok(())
}

/// Activates a package. Mirrors the projector's own unconditional upsert:
/// it does not itself reject activation of a non-verified package, so
/// callers that need that guard should check [`get`]'s state first.
///
/// # Errors
///
/// Returns [`GrowthError::Store`] on event-append failure.
pub async fn activate(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    package_id: SkillPackageId,
    actor_id: &ActorId,
) -> Result<(), GrowthError> {
    let data = json!({ "package_id": package_id.to_string() });
    writer
        .append_to_stream(pool, envelope(workspace_id, actor_id, "skill.package.activated", package_id, data))
        .await?;
    Ok(())
}

/// Retires a package, terminal.
///
/// # Errors
///
/// Returns [`GrowthError::Store`] on event-append failure.
pub async fn retire(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    package_id: SkillPackageId,
    actor_id: &ActorId,
) -> Result<(), GrowthError> {
    let data = json!({ "package_id": package_id.to_string() });
    writer
        .append_to_stream(pool, envelope(workspace_id, actor_id, "skill.package.retired", package_id, data))
        .await?;
    Ok(())
}

/// Reads the current state of a package.
///
/// # Errors
///
/// Returns [`GrowthError::PackageNotFound`] if unknown, or
/// [`GrowthError::Store`] on database failure.
pub async fn get(pool: &PgPool, package_id: SkillPackageId) -> Result<PackageRow, GrowthError> {
    load(pool, package_id).await
}

/// Lists packages submitted by `agent_id`, optionally filtered to one
/// lifecycle state, most recently submitted first.
///
/// # Errors
///
/// Returns [`GrowthError::Store`] on database failure.
pub async fn list_by_agent(
    pool: &PgPool,
    agent_id: &AgentId,
    state: Option<PackageState>,
) -> Result<Vec<PackageRow>, GrowthError> {
    let state_filter = state.map(state_label);
    let rows = sqlx::query(
        "SELECT package_id, agent_id, name, version, state, content_hash, quarantine_reason FROM \
         growth_skill_packages WHERE agent_id = $1 AND ($2::text IS NULL OR state = $2) ORDER BY \
         created_at DESC",
    )
    .bind(agent_id.as_str())
    .bind(state_filter)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let agent_id: Option<String> = row.try_get("agent_id")?;
            let package_id: String = row.try_get("package_id")?;
            let state: String = row.try_get("state")?;
            Ok(PackageRow {
                package_id: package_id
                    .parse::<uuid::Uuid>()
                    .map(SkillPackageId::from_uuid)
                    .unwrap_or_else(|_| SkillPackageId::new()),
                agent_id: agent_id.map(AgentId::new),
                name: row.try_get("name")?,
                version: row.try_get("version")?,
                state: PackageState::parse(&state),
                content_hash: row.try_get("content_hash")?,
                quarantine_reason: row.try_get("quarantine_reason")?,
            })
        })
        .collect()
}

fn state_label(state: PackageState) -> &'static str {
    match state {
        PackageState::Pending => "pending",
        PackageState::Verified => "verified",
        PackageState::Quarantined => "quarantined",
        PackageState::Active => "active",
        PackageState::Retired => "retired",
    }
}
