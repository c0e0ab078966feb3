// acp-store/src/leases.rs
// ============================================================================
// Module: Run Lease Persistence
// Description: Atomic claim (advisory lock + `FOR UPDATE SKIP LOCKED`),
//              heartbeat, release, and reclaim-eligibility queries backing
//              the Run Lifecycle & Lease Manager (§4.7).
// Purpose: Guarantee at-most-one non-expired lease holds a run at a time.
// Dependencies: acp-core, sqlx
// ============================================================================

use acp_core::RunId;
use acp_core::WorkspaceId;
use chrono::DateTime;
use chrono::Utc;
use sqlx::Postgres;
use sqlx::Row;
use sqlx::Transaction;
use uuid::Uuid;

use crate::error::StoreError;

/// Well-known advisory lock namespace for per-workspace run claims (§5).
/// Combined with a hash of the workspace id to form the lock key.
const RUN_CLAIM_ADVISORY_NAMESPACE: i64 = 0x4143_5052_554e; // "ACPRUN" in hex-ish form

/// Outcome of a successful claim.
#[derive(Debug, Clone)]
pub struct ClaimedRun {
    /// The claimed run's identifier.
    pub run_id: RunId,
    /// Freshly generated claim token the claimer must present on
    /// heartbeat/release.
    pub claim_token: String,
    /// The lease's expiry, `now() + lease_ttl`.
    pub lease_expires_at: DateTime<Utc>,
}

/// Claims one queued run in `workspace_id`, optionally filtered to
/// `room_id`, under a per-workspace advisory lock.
///
/// # Errors
///
/// Returns [`StoreError::NoRunAvailable`] when no claimable run exists, or
/// a database error.
pub async fn claim_run(
    tx: &mut Transaction<'_, Postgres>,
    workspace_id: &WorkspaceId,
    room_id: Option<&str>,
    lease_ttl: std::time::Duration,
) -> Result<ClaimedRun, StoreError> {
    acquire_advisory_lock(tx, workspace_id).await?;

    let row = if let Some(room_id) = room_id {
        sqlx::query(
            "SELECT run_id FROM proj_runs WHERE workspace_id = $1 AND status = 'queued' AND \
             room_id = $2 ORDER BY created_at ASC FOR UPDATE SKIP LOCKED LIMIT 1",
        )
        .bind(workspace_id.as_str())
        .bind(room_id)
        .fetch_optional(&mut **tx)
        .await?
    } else {
        sqlx::query(
            "SELECT run_id FROM proj_runs WHERE workspace_id = $1 AND status = 'queued' ORDER \
             BY created_at ASC FOR UPDATE SKIP LOCKED LIMIT 1",
        )
        .bind(workspace_id.as_str())
        .fetch_optional(&mut **tx)
        .await?
    };

    let Some(row) = row else {
        return Err(StoreError::NoRunAvailable);
    };
    let run_id_raw: String = row.try_get("run_id")?;
    let run_id = RunId::from_uuid(Uuid::parse_str(&run_id_raw).unwrap_or_else(|_| Uuid::new_v4()));

    let claim_token = generate_claim_token();
    let lease_expires_at = Utc::now() + lease_ttl;

    sqlx::query(
        "UPDATE proj_runs SET status = 'running', claim_token = $1, lease_expires_at = $2, \
         lease_heartbeat_at = now(), updated_at = now() WHERE run_id = $3",
    )
    .bind(&claim_token)
    .bind(lease_expires_at)
    .bind(run_id_raw)
    .execute(&mut **tx)
    .await?;

    Ok(ClaimedRun {
        run_id,
        claim_token,
        lease_expires_at,
    })
}

/// Claims one specific run by id, under the same advisory lock namespace
/// as [`claim_run`], so a targeted `POST /runs/:id/start` can never race a
/// concurrent pool-wide claim for the same run.
///
/// # Errors
///
/// Returns [`StoreError::RunNotClaimable`] if the run is not currently
/// `queued`, or [`StoreError::NotFound`] if it does not exist.
pub async fn claim_specific_run(
    tx: &mut Transaction<'_, Postgres>,
    workspace_id: &WorkspaceId,
    run_id: RunId,
    lease_ttl: std::time::Duration,
) -> Result<ClaimedRun, StoreError> {
    acquire_advisory_lock(tx, workspace_id).await?;

    let row = sqlx::query(
        "SELECT run_id FROM proj_runs WHERE run_id = $1 AND workspace_id = $2 AND status = \
         'queued' FOR UPDATE SKIP LOCKED",
    )
    .bind(run_id.to_string())
    .bind(workspace_id.as_str())
    .fetch_optional(&mut **tx)
    .await?;

    let Some(row) = row else {
        let exists = sqlx::query("SELECT 1 FROM proj_runs WHERE run_id = $1 AND workspace_id = $2")
            .bind(run_id.to_string())
            .bind(workspace_id.as_str())
            .fetch_optional(&mut **tx)
            .await?
            .is_some();
        return Err(if exists { StoreError::RunNotClaimable } else { StoreError::NotFound(format!("run {run_id}")) });
    };
    let run_id_raw: String = row.try_get("run_id")?;

    let claim_token = generate_claim_token();
    let lease_expires_at = Utc::now() + lease_ttl;

    sqlx::query(
        "UPDATE proj_runs SET status = 'running', claim_token = $1, lease_expires_at = $2, \
         lease_heartbeat_at = now(), updated_at = now() WHERE run_id = $3",
    )
    .bind(&claim_token)
    .bind(lease_expires_at)
    .bind(run_id_raw)
    .execute(&mut **tx)
    .await?;

    Ok(ClaimedRun { run_id, claim_token, lease_expires_at })
}

/// Extends a run's lease, verifying the presented claim token still
/// matches the row.
///
/// # Errors
///
/// Returns [`StoreError::LeaseTokenMismatch`] if the token is stale, or
/// [`StoreError::NotFound`] if the run does not exist.
pub async fn heartbeat(
    pool: &sqlx::PgPool,
    run_id: RunId,
    claim_token: &str,
    lease_ttl: std::time::Duration,
) -> Result<DateTime<Utc>, StoreError> {
    let new_expiry = Utc::now() + lease_ttl;
    let result = sqlx::query(
        "UPDATE proj_runs SET lease_heartbeat_at = now(), lease_expires_at = $1, updated_at = \
         now() WHERE run_id = $2 AND claim_token = $3 AND status = 'running'",
    )
    .bind(new_expiry)
    .bind(run_id.to_string())
    .bind(claim_token)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::LeaseTokenMismatch);
    }
    Ok(new_expiry)
}

/// Clears lease fields on a still-running run, verifying the claim token.
///
/// # Errors
///
/// Returns [`StoreError::LeaseTokenMismatch`] if the token is stale.
pub async fn release(
    pool: &sqlx::PgPool,
    run_id: RunId,
    claim_token: &str,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE proj_runs SET status = 'queued', claim_token = NULL, claimed_by_actor_id = \
         NULL, lease_expires_at = NULL, lease_heartbeat_at = NULL, updated_at = now() WHERE \
         run_id = $1 AND claim_token = $2 AND status = 'running'",
    )
    .bind(run_id.to_string())
    .bind(claim_token)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::LeaseTokenMismatch);
    }
    Ok(())
}

/// Returns true when a run's lease has expired and it is eligible for
/// reclaim even though `status='running'` (§4.7 Reclaim).
pub async fn is_lease_expired(pool: &sqlx::PgPool, run_id: RunId) -> Result<bool, StoreError> {
    let row = sqlx::query(
        "SELECT lease_expires_at < now() AS expired FROM proj_runs WHERE run_id = $1",
    )
    .bind(run_id.to_string())
    .fetch_optional(pool)
    .await?;
    match row {
        Some(row) => Ok(row.try_get::<Option<bool>, _>("expired")?.unwrap_or(false)),
        None => Err(StoreError::NotFound(format!("run {run_id}"))),
    }
}

async fn acquire_advisory_lock(
    tx: &mut Transaction<'_, Postgres>,
    workspace_id: &WorkspaceId,
) -> Result<(), StoreError> {
    let key = workspace_lock_key(workspace_id);
    sqlx::query("SELECT pg_advisory_xact_lock($1, $2)")
        .bind(RUN_CLAIM_ADVISORY_NAMESPACE)
        .bind(key)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Derives a stable 32-bit lock sub-key from the workspace id so distinct
/// workspaces rarely contend on the same advisory lock pair.
fn workspace_lock_key(workspace_id: &WorkspaceId) -> i32 {
    let mut hash: u32 = 2_166_136_261;
    for byte in workspace_id.as_str().bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(16_777_619);
    }
    i32::from_ne_bytes(hash.to_ne_bytes())
}

fn generate_claim_token() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: [u8; 16] = rng.r#gen();
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_lock_key_is_deterministic() {
        let workspace = WorkspaceId::new("ws_1");
        assert_eq!(workspace_lock_key(&workspace), workspace_lock_key(&workspace));
    }

    #[test]
    fn claim_tokens_are_32_hex_chars() {
        let token = generate_claim_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
