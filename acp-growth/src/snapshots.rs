// acp-growth/src/snapshots.rs
// ============================================================================
// Module: Daily Snapshots & Survival Ledger
// Description: Per-agent daily metric rollups and the cost/value survival
//              ledger (§4.9 Daily Snapshots, Survival Ledger).
// Purpose: Compute idempotent, UTC-explicit daily aggregates and emit
//          `daily.agent.snapshot` / `survival.rollup` only when the
//          computed row actually changed.
// Dependencies: acp-core, acp-store, chrono
// ============================================================================

use acp_core::ActorId;
use acp_core::ActorType;
use acp_core::AgentId;
use acp_core::CorrelationId;
use acp_core::EventEnvelope;
use acp_core::StreamRef;
use acp_core::WorkspaceId;
use acp_core::Zone;
use acp_store::EventWriter;
use chrono::DateTime;
use chrono::NaiveDate;
use chrono::TimeZone;
use chrono::Utc;
use serde_json::Value;
use serde_json::json;
use sqlx::PgPool;
use sqlx::Row;

use crate::error::GrowthError;

/// `[start_of(date), start_of(date) + 1 day)` in UTC. Callers must never
/// substitute session-local date arithmetic for this (§4.9 Daily Snapshots).
fn day_range(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN));
    (start, start + chrono::Duration::days(1))
}

/// `[start_of(date - 6 days), start_of(date) + 1 day)` in UTC — the
/// trailing 7-day window ending on `date` inclusive.
fn trailing_week_range(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let (_, today_end) = day_range(date);
    let week_start = Utc.from_utc_datetime(&(date - chrono::Duration::days(6)).and_time(chrono::NaiveTime::MIN));
    (week_start, today_end)
}

/// Computes the metrics blob for one agent on `snapshot_date`, reading the
/// tables the skill ledger, constraint tracker, and trust scorer maintain.
///
/// # Errors
///
/// Returns [`GrowthError::Store`] on database failure.
pub async fn compute_metrics(pool: &PgPool, agent_id: &AgentId, snapshot_date: NaiveDate) -> Result<Value, GrowthError> {
    let (today_start, today_end) = day_range(snapshot_date);
    let (week_start, week_end) = trailing_week_range(snapshot_date);

    let assessments_today = sqlx::query(
        "SELECT COUNT(*) FILTER (WHERE status = 'passed') AS passed, COUNT(*) AS total FROM \
         growth_skill_assessments WHERE agent_id = $1 AND created_at >= $2 AND created_at < $3",
    )
    .bind(agent_id.as_str())
    .bind(today_start)
    .bind(today_end)
    .fetch_one(pool)
    .await?;

    let principal_row = sqlx::query("SELECT principal_id FROM proj_agents WHERE agent_id = $1")
        .bind(agent_id.as_str())
        .fetch_optional(pool)
        .await?;
    let principal_id: Option<String> = match &principal_row {
        Some(row) => row.try_get("principal_id")?,
        None => None,
    };

    let (violations_7d, mistakes_7d, egress_today) = match &principal_id {
        Some(principal_id) => {
            let violations = sqlx::query("SELECT COUNT(*) AS violation_count FROM sec_constraints WHERE principal_id = $1 AND updated_at >= $2 AND updated_at < $3")
                .bind(principal_id)
                .bind(week_start)
                .bind(week_end)
                .fetch_one(pool)
                .await?
                .try_get::<i64, _>("violation_count")?;
            let mistakes = sqlx::query("SELECT COUNT(*) AS mistake_count FROM sec_mistake_counters WHERE principal_id = $1 AND last_seen_at >= $2 AND last_seen_at < $3")
                .bind(principal_id)
                .bind(week_start)
                .bind(week_end)
                .fetch_one(pool)
                .await?
                .try_get::<i64, _>("mistake_count")?;
            let egress = sqlx::query("SELECT COUNT(*) AS egress_count FROM sec_egress_requests WHERE principal_id = $1 AND created_at >= $2 AND created_at < $3")
                .bind(principal_id)
                .bind(today_start)
                .bind(today_end)
                .fetch_one(pool)
                .await?
                .try_get::<i64, _>("egress_count")?;
            (violations, mistakes, egress)
        }
        None => (0, 0, 0),
    };

    let trust_score = sqlx::query("SELECT score FROM growth_agent_trust WHERE agent_id = $1")
        .bind(agent_id.as_str())
        .fetch_optional(pool)
        .await?
        .map(|row| row.try_get::<f64, _>("score"))
        .transpose()?;

    Ok(json!({
        "assessments_passed_today": assessments_today.try_get::<i64, _>("passed")?,
        "assessments_total_today": assessments_today.try_get::<i64, _>("total")?,
        "violations_7d": violations_7d,
        "mistakes_7d": mistakes_7d,
        "egress_requests_today": egress_today,
        "trust_score": trust_score,
    }))
}

/// Reads the currently persisted metrics for `(agent_id, snapshot_date)`,
/// if one has already been computed.
///
/// # Errors
///
/// Returns [`GrowthError::Store`] on database failure.
pub async fn get_snapshot(pool: &PgPool, agent_id: &AgentId, snapshot_date: NaiveDate) -> Result<Option<Value>, GrowthError> {
    let row = sqlx::query("SELECT metrics FROM growth_daily_snapshots WHERE agent_id = $1 AND snapshot_date = $2")
        .bind(agent_id.as_str())
        .bind(snapshot_date)
        .fetch_optional(pool)
        .await?;
    match row {
        Some(row) => Ok(Some(row.try_get("metrics")?)),
        None => Ok(None),
    }
}

/// Computes and, only if the metrics changed from what is already
/// persisted, appends `daily.agent.snapshot` for `(agent_id, snapshot_date)`.
///
/// # Errors
///
/// Returns [`GrowthError::Store`] on database or event-append failure.
pub async fn snapshot_agent(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    agent_id: &AgentId,
    snapshot_date: NaiveDate,
    actor_id: &ActorId,
) -> Result<bool, GrowthError> {
    let metrics = compute_metrics(pool, agent_id, snapshot_date).await?;
    let existing = get_snapshot(pool, agent_id, snapshot_date).await?;
    if existing.as_ref() == Some(&metrics) {
        return Ok(false);
    }

    let envelope = EventEnvelope {
        event_type: "daily.agent.snapshot".to_string(),
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
        data: json!({
            "agent_id": agent_id.as_str(),
            "snapshot_date": snapshot_date.format("%Y-%m-%d").to_string(),
            "metrics": metrics,
        }),
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("daily-snapshot:{agent_id}:{snapshot_date}")),
        causation_id: None,
        idempotency_key: None,
    };
    writer.append_to_stream(pool, envelope).await?;
    Ok(true)
}

/// Target kind a survival-ledger row rolls up cost/value for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    /// A single agent.
    Agent,
    /// The workspace as a whole.
    Workspace,
}

impl TargetType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Workspace => "workspace",
        }
    }
}

/// Reads the currently persisted cost/value for one survival-ledger row.
///
/// # Errors
///
/// Returns [`GrowthError::Store`] on database failure.
pub async fn get_ledger_row(pool: &PgPool, target_id: &str, target_type: TargetType, ledger_date: NaiveDate) -> Result<Option<(f64, f64)>, GrowthError> {
    let row = sqlx::query("SELECT cost, value FROM growth_survival_ledger WHERE target_id = $1 AND target_type = $2 AND ledger_date = $3")
        .bind(target_id)
        .bind(target_type.as_str())
        .bind(ledger_date)
        .fetch_optional(pool)
        .await?;
    match row {
        Some(row) => Ok(Some((row.try_get("cost")?, row.try_get("value")?))),
        None => Ok(None),
    }
}

/// Appends `survival.rollup` for `(target_id, target_type, ledger_date)`
/// only if `cost`/`value` differ from what is already persisted.
///
/// # Errors
///
/// Returns [`GrowthError::Store`] on database or event-append failure.
pub async fn rollup(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    target_id: &str,
    target_type: TargetType,
    ledger_date: NaiveDate,
    cost: f64,
    value: f64,
    actor_id: &ActorId,
) -> Result<bool, GrowthError> {
    if let Some((existing_cost, existing_value)) = get_ledger_row(pool, target_id, target_type, ledger_date).await? {
        if (existing_cost - cost).abs() < f64::EPSILON && (existing_value - value).abs() < f64::EPSILON {
            return Ok(false);
        }
    }

    let envelope = EventEnvelope {
        event_type: "survival.rollup".to_string(),
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
        data: json!({
            "target_id": target_id,
            "target_type": target_type.as_str(),
            "ledger_date": ledger_date.format("%Y-%m-%d").to_string(),
            "cost": cost,
            "value": value,
        }),
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("survival-rollup:{target_id}:{ledger_date}")),
        causation_id: None,
        idempotency_key: None,
    };
    writer.append_to_stream(pool, envelope).await?;
    Ok(true)
}
