// acp-store/src/pipeline.rs
// ============================================================================
// Module: Pipeline Projection (C12)
// Description: A read-only, stage-bucketed snapshot over runs and
//              approvals for `GET /pipeline/projection` (§4.12).
// Purpose: Give operators a single call that answers "where is
//          everything right now" without exposing lease/claim
//          internals.
// Dependencies: acp-core, sqlx
// ============================================================================

use acp_core::WorkspaceId;
use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::Row;
use uuid::Uuid;

use crate::error::StoreError;

/// The fixed stage names of `pipeline_projection.v0.1`, in display order.
pub const STAGES: [&str; 6] =
    ["1_inbox", "2_pending_approval", "3_execute_workspace", "4_review_evidence", "5_promoted", "6_demoted"];

/// Reason codes on a failed run's `error` payload that make it
/// review-worthy rather than simply demoted.
const REVIEW_WORTHY_REASON_CODES: [&str; 4] =
    ["policy_denied", "approval_required", "permission_denied", "external_write_kill_switch"];

/// One entity surfaced in a pipeline stage. Deliberately excludes
/// lease/heartbeat/claim fields.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineItem {
    /// `"run"` or `"approval"`.
    pub entity_type: &'static str,
    /// The run or approval id, as a string.
    pub entity_id: String,
    /// The entity's current status label.
    pub status: String,
    /// Last update time, used for sort and staleness display.
    pub updated_at: DateTime<Utc>,
    /// The most recent event applied to this entity's projection.
    pub last_event_id: Option<Uuid>,
    /// A small, stage-specific summary (e.g. `target_action`, `error`).
    pub summary: Value,
}

/// Per-stage counters for the response envelope.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StageStats {
    /// Number of items returned for this stage (after truncation).
    pub count: usize,
    /// Set when more rows existed than `limit` and were dropped.
    pub truncated: bool,
}

/// Response metadata.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineMeta {
    /// Fixed at `"pipeline_projection.v0.1"`.
    pub schema_version: &'static str,
    /// Wall-clock time the snapshot was assembled.
    pub generated_at: DateTime<Utc>,
    /// The most recent `last_event_id` across all returned items, if any.
    pub watermark_event_id: Option<Uuid>,
}

/// The full `GET /pipeline/projection` response body.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineProjection {
    /// Items bucketed by stage name.
    pub stages: std::collections::BTreeMap<&'static str, Vec<PipelineItem>>,
    /// Per-stage truncation/count stats.
    pub stage_stats: std::collections::BTreeMap<&'static str, StageStats>,
    /// Response metadata.
    pub meta: PipelineMeta,
}

/// Assembles the six-stage pipeline snapshot for a workspace.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn project(pool: &PgPool, workspace_id: &WorkspaceId, limit: i64) -> Result<PipelineProjection, StoreError> {
    let fetch_limit = limit.saturating_add(1);

    let mut stages: std::collections::BTreeMap<&'static str, Vec<PipelineItem>> =
        STAGES.iter().map(|&s| (s, Vec::new())).collect();
    let mut stage_stats: std::collections::BTreeMap<&'static str, StageStats> =
        STAGES.iter().map(|&s| (s, StageStats { count: 0, truncated: false })).collect();

    let pending_approvals = fetch_pending_approvals(pool, workspace_id, fetch_limit).await?;
    fill_stage(&mut stages, &mut stage_stats, "2_pending_approval", pending_approvals, limit);

    let executing_runs = fetch_runs_by_status(pool, workspace_id, &["queued", "running"], fetch_limit).await?;
    fill_stage(&mut stages, &mut stage_stats, "3_execute_workspace", executing_runs, limit);

    let succeeded = fetch_runs_by_status(pool, workspace_id, &["succeeded"], fetch_limit).await?;
    let review_worthy_failed = fetch_review_worthy_failed_runs(pool, workspace_id, fetch_limit).await?;
    let mut review_evidence = succeeded;
    review_evidence.extend(review_worthy_failed);
    review_evidence.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.entity_id.cmp(&b.entity_id)));
    fill_stage(&mut stages, &mut stage_stats, "4_review_evidence", review_evidence, limit);

    let review_ids: std::collections::HashSet<String> =
        stages["4_review_evidence"].iter().map(|item| item.entity_id.clone()).collect();
    let failed = fetch_runs_by_status(pool, workspace_id, &["failed"], fetch_limit.saturating_add(review_ids.len() as i64))
        .await?
        .into_iter()
        .filter(|item| !review_ids.contains(&item.entity_id))
        .collect::<Vec<_>>();
    fill_stage(&mut stages, &mut stage_stats, "6_demoted", failed, limit);

    let watermark_event_id = stages.values().flatten().filter_map(|item| item.last_event_id).max();

    Ok(PipelineProjection {
        stages,
        stage_stats,
        meta: PipelineMeta { schema_version: "pipeline_projection.v0.1", generated_at: Utc::now(), watermark_event_id },
    })
}

fn fill_stage(
    stages: &mut std::collections::BTreeMap<&'static str, Vec<PipelineItem>>,
    stage_stats: &mut std::collections::BTreeMap<&'static str, StageStats>,
    stage: &'static str,
    mut items: Vec<PipelineItem>,
    limit: i64,
) {
    let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
    let truncated = items.len() > limit;
    items.truncate(limit);
    stage_stats.insert(stage, StageStats { count: items.len(), truncated });
    stages.insert(stage, items);
}

async fn fetch_pending_approvals(
    pool: &PgPool,
    workspace_id: &WorkspaceId,
    fetch_limit: i64,
) -> Result<Vec<PipelineItem>, StoreError> {
    let rows = sqlx::query(
        "SELECT approval_id, status, target_action, updated_at, last_event_id FROM \
         proj_approvals WHERE workspace_id = $1 AND status IN ('pending', 'held') ORDER BY \
         updated_at DESC, approval_id ASC LIMIT $2",
    )
    .bind(workspace_id.as_str())
    .bind(fetch_limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(PipelineItem {
                entity_type: "approval",
                entity_id: row.try_get("approval_id")?,
                status: row.try_get("status")?,
                updated_at: row.try_get("updated_at")?,
                last_event_id: row.try_get("last_event_id")?,
                summary: row.try_get::<Option<Value>, _>("target_action")?.unwrap_or(Value::Null),
            })
        })
        .collect()
}

async fn fetch_runs_by_status(
    pool: &PgPool,
    workspace_id: &WorkspaceId,
    statuses: &[&str],
    fetch_limit: i64,
) -> Result<Vec<PipelineItem>, StoreError> {
    let statuses: Vec<String> = statuses.iter().map(|s| (*s).to_string()).collect();
    let rows = sqlx::query(
        "SELECT run_id, status, error, updated_at, last_event_id FROM proj_runs WHERE \
         workspace_id = $1 AND status = ANY($2) ORDER BY updated_at DESC, run_id ASC LIMIT $3",
    )
    .bind(workspace_id.as_str())
    .bind(statuses)
    .bind(fetch_limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(PipelineItem {
                entity_type: "run",
                entity_id: row.try_get("run_id")?,
                status: row.try_get("status")?,
                updated_at: row.try_get("updated_at")?,
                last_event_id: row.try_get("last_event_id")?,
                summary: row.try_get::<Option<Value>, _>("error")?.unwrap_or(Value::Null),
            })
        })
        .collect()
}

async fn fetch_review_worthy_failed_runs(
    pool: &PgPool,
    workspace_id: &WorkspaceId,
    fetch_limit: i64,
) -> Result<Vec<PipelineItem>, StoreError> {
    let rows = sqlx::query(
        "SELECT DISTINCT r.run_id, r.status, r.error, r.updated_at, r.last_event_id FROM \
         proj_runs r WHERE r.workspace_id = $1 AND r.status = 'failed' AND ( \
         EXISTS (SELECT 1 FROM proj_incidents i WHERE i.workspace_id = r.workspace_id AND \
         i.status = 'open' AND (i.run_id = r.run_id OR i.correlation_id = r.correlation_id)) \
         OR r.error->>'reason_code' = ANY($2)) ORDER BY r.updated_at DESC, r.run_id ASC LIMIT $3",
    )
    .bind(workspace_id.as_str())
    .bind(REVIEW_WORTHY_REASON_CODES.to_vec())
    .bind(fetch_limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(PipelineItem {
                entity_type: "run",
                entity_id: row.try_get("run_id")?,
                status: row.try_get("status")?,
                updated_at: row.try_get("updated_at")?,
                last_event_id: row.try_get("last_event_id")?,
                summary: row.try_get::<Option<Value>, _>("error")?.unwrap_or(Value::Null),
            })
        })
        .collect()
}
