// acp-store/src/runs.rs
// ============================================================================
// Module: Run/Step/Tool-Call/Artifact Lifecycle
// Description: Event-append primitives for the run lifecycle state machine
//              (§4.7): queue, claim+start, complete, fail, cancel a run;
//              start/complete/fail a step; invoke/complete/fail a tool
//              call; record an artifact.
// Purpose: The one write path `acp-worker` and `acp-server` both go
//          through so a run never transitions state without the matching
//          event landing in the log first.
// Dependencies: acp-core, crate::{leases, writer}
// ============================================================================

use acp_core::ActorId;
use acp_core::ActorType;
use acp_core::ArtifactId;
use acp_core::CorrelationId;
use acp_core::EventEnvelope;
use acp_core::EventRecord;
use acp_core::PrincipalId;
use acp_core::RoomId;
use acp_core::RunId;
use acp_core::StepId;
use acp_core::StreamRef;
use acp_core::ToolCallId;
use acp_core::WorkspaceId;
use acp_core::Zone;
use chrono::Utc;
use serde_json::Value;
use serde_json::json;
use sqlx::PgPool;
use sqlx::Postgres;
use sqlx::Row;
use sqlx::Transaction;

use crate::error::StoreError;
use crate::leases::ClaimedRun;
use crate::leases::claim_run;
use crate::leases::claim_specific_run;
use crate::writer::EventWriter;

/// Read-model snapshot of `proj_runs`, used by the Runtime Worker to
/// recover a claimed run's `input` and by operator-facing queries.
#[derive(Debug, Clone)]
pub struct RunRow {
    /// The run's identifier.
    pub run_id: RunId,
    /// Tenancy boundary.
    pub workspace_id: WorkspaceId,
    /// Current lifecycle status (`queued`, `running`, `completed`, `failed`,
    /// `cancelled`).
    pub status: String,
    /// The payload supplied at `run.queued` time.
    pub input: Value,
}

/// Fetches the current projected state of one run.
///
/// # Errors
///
/// Returns [`StoreError::NotFound`] when no such run is projected, or a
/// database error.
pub async fn fetch_run(pool: &PgPool, run_id: RunId) -> Result<RunRow, StoreError> {
    let row = sqlx::query("SELECT workspace_id, status, input FROM proj_runs WHERE run_id = $1")
        .bind(run_id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("run {run_id}")))?;
    Ok(RunRow {
        run_id,
        workspace_id: WorkspaceId::new(row.try_get::<String, _>("workspace_id")?),
        status: row.try_get("status")?,
        input: row.try_get::<Option<Value>, _>("input")?.unwrap_or(Value::Null),
    })
}

/// The full projected row returned by `GET /runs` and `GET /runs/:runId`,
/// including operator-facing lease/error fields (unlike [`RunRow`], which
/// only carries what the worker needs to resume).
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunSummary {
    /// The run's identifier.
    pub run_id: RunId,
    /// Tenancy boundary.
    pub workspace_id: WorkspaceId,
    /// The room this run belongs to, if any.
    pub room_id: Option<RoomId>,
    /// Current lifecycle status.
    pub status: String,
    /// The correlation id shared by this run's events.
    pub correlation_id: String,
    /// The payload supplied at `run.queued` time.
    pub input: Value,
    /// The failure payload, once failed.
    pub error: Option<Value>,
    /// Lease expiry, while claimed.
    pub lease_expires_at: Option<chrono::DateTime<Utc>>,
    /// Last update time.
    pub updated_at: chrono::DateTime<Utc>,
}

fn row_to_run_summary(row: &sqlx::postgres::PgRow) -> Result<RunSummary, StoreError> {
    let run_id: String = row.try_get("run_id")?;
    let room_id: Option<String> = row.try_get("room_id")?;
    Ok(RunSummary {
        run_id: run_id.parse::<uuid::Uuid>().map(RunId::from_uuid).unwrap_or_else(|_| RunId::new()),
        workspace_id: WorkspaceId::new(row.try_get::<String, _>("workspace_id")?),
        room_id: room_id.map(|raw| raw.parse::<uuid::Uuid>().map(RoomId::from_uuid).unwrap_or_else(|_| RoomId::new())),
        status: row.try_get("status")?,
        correlation_id: row.try_get("correlation_id")?,
        input: row.try_get::<Option<Value>, _>("input")?.unwrap_or(Value::Null),
        error: row.try_get("error")?,
        lease_expires_at: row.try_get("lease_expires_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Fetches the full operator-facing row for one run.
///
/// # Errors
///
/// Returns [`StoreError::NotFound`] when no such run is projected, or a
/// database error.
pub async fn get_run_summary(pool: &PgPool, run_id: RunId) -> Result<RunSummary, StoreError> {
    let row = sqlx::query(
        "SELECT run_id, workspace_id, room_id, status, correlation_id, input, error, \
         lease_expires_at, updated_at FROM proj_runs WHERE run_id = $1",
    )
    .bind(run_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StoreError::NotFound(format!("run {run_id}")))?;
    row_to_run_summary(&row)
}

/// Lists runs in a workspace, optionally filtered by status, most recently
/// updated first.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn list_runs(
    pool: &PgPool,
    workspace_id: &WorkspaceId,
    status: Option<&str>,
    limit: i64,
) -> Result<Vec<RunSummary>, StoreError> {
    let rows = sqlx::query(
        "SELECT run_id, workspace_id, room_id, status, correlation_id, input, error, \
         lease_expires_at, updated_at FROM proj_runs WHERE workspace_id = $1 AND \
         ($2::text IS NULL OR status = $2) ORDER BY updated_at DESC LIMIT $3",
    )
    .bind(workspace_id.as_str())
    .bind(status)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_run_summary).collect()
}

/// One tool call as projected from `tool_call.invoked`/`.completed`/`.failed`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolCallRow {
    /// The tool call's identifier.
    pub tool_call_id: ToolCallId,
    /// The run it belongs to, if any.
    pub run_id: Option<RunId>,
    /// The step it belongs to, if any.
    pub step_id: Option<StepId>,
    /// The invoked tool's name.
    pub tool_name: String,
    /// Current status (`invoked`, `completed`, `failed`).
    pub status: String,
    /// The request payload.
    pub request: Value,
    /// The response payload, once completed.
    pub response: Option<Value>,
    /// Last update time.
    pub updated_at: chrono::DateTime<Utc>,
}

fn row_to_tool_call(row: &sqlx::postgres::PgRow) -> Result<ToolCallRow, StoreError> {
    let tool_call_id: String = row.try_get("tool_call_id")?;
    let run_id: Option<String> = row.try_get("run_id")?;
    let step_id: Option<String> = row.try_get("step_id")?;
    Ok(ToolCallRow {
        tool_call_id: tool_call_id
            .parse::<uuid::Uuid>()
            .map(ToolCallId::from_uuid)
            .unwrap_or_else(|_| ToolCallId::new()),
        run_id: run_id.map(|raw| raw.parse::<uuid::Uuid>().map(RunId::from_uuid).unwrap_or_else(|_| RunId::new())),
        step_id: step_id.map(|raw| raw.parse::<uuid::Uuid>().map(StepId::from_uuid).unwrap_or_else(|_| StepId::new())),
        tool_name: row.try_get("tool_name")?,
        status: row.try_get("status")?,
        request: row.try_get::<Option<Value>, _>("request")?.unwrap_or(Value::Null),
        response: row.try_get("response")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Fetches a single tool call by id.
///
/// # Errors
///
/// Returns [`StoreError::NotFound`] when no such tool call is projected, or
/// a database error.
pub async fn get_tool_call(pool: &PgPool, tool_call_id: ToolCallId) -> Result<ToolCallRow, StoreError> {
    let row = sqlx::query(
        "SELECT tool_call_id, run_id, step_id, tool_name, status, request, response, \
         updated_at FROM proj_tool_calls WHERE tool_call_id = $1",
    )
    .bind(tool_call_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StoreError::NotFound(format!("tool call {tool_call_id}")))?;
    row_to_tool_call(&row)
}

/// Lists tool calls, optionally filtered by run, most recently updated
/// first.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn list_tool_calls(pool: &PgPool, run_id: Option<RunId>, limit: i64) -> Result<Vec<ToolCallRow>, StoreError> {
    let rows = sqlx::query(
        "SELECT tool_call_id, run_id, step_id, tool_name, status, request, response, \
         updated_at FROM proj_tool_calls WHERE ($1::text IS NULL OR run_id = $1) ORDER BY \
         updated_at DESC LIMIT $2",
    )
    .bind(run_id.map(|id| id.to_string()))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_tool_call).collect()
}

/// One artifact as projected from `artifact.created`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ArtifactRow {
    /// The artifact's identifier.
    pub artifact_id: ArtifactId,
    /// The run it belongs to, if any.
    pub run_id: Option<RunId>,
    /// The step it belongs to, if any.
    pub step_id: Option<StepId>,
    /// The artifact's kind label.
    pub kind: Option<String>,
    /// The artifact's storage uri.
    pub uri: Option<String>,
    /// Arbitrary metadata.
    pub metadata: Value,
    /// Creation time.
    pub created_at: chrono::DateTime<Utc>,
}

fn row_to_artifact(row: &sqlx::postgres::PgRow) -> Result<ArtifactRow, StoreError> {
    let artifact_id: String = row.try_get("artifact_id")?;
    let run_id: Option<String> = row.try_get("run_id")?;
    let step_id: Option<String> = row.try_get("step_id")?;
    Ok(ArtifactRow {
        artifact_id: artifact_id
            .parse::<uuid::Uuid>()
            .map(ArtifactId::from_uuid)
            .unwrap_or_else(|_| ArtifactId::new()),
        run_id: run_id.map(|raw| raw.parse::<uuid::Uuid>().map(RunId::from_uuid).unwrap_or_else(|_| RunId::new())),
        step_id: step_id.map(|raw| raw.parse::<uuid::Uuid>().map(StepId::from_uuid).unwrap_or_else(|_| StepId::new())),
        kind: row.try_get("kind")?,
        uri: row.try_get("uri")?,
        metadata: row.try_get::<Option<Value>, _>("metadata")?.unwrap_or(Value::Null),
        created_at: row.try_get("created_at")?,
    })
}

/// Fetches a single artifact by id.
///
/// # Errors
///
/// Returns [`StoreError::NotFound`] when no such artifact is projected, or
/// a database error.
pub async fn get_artifact(pool: &PgPool, artifact_id: ArtifactId) -> Result<ArtifactRow, StoreError> {
    let row = sqlx::query(
        "SELECT artifact_id, run_id, step_id, kind, uri, metadata, created_at FROM \
         proj_artifacts WHERE artifact_id = $1",
    )
    .bind(artifact_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StoreError::NotFound(format!("artifact {artifact_id}")))?;
    row_to_artifact(&row)
}

/// Lists artifacts, optionally filtered by run, most recently created
/// first.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn list_artifacts(pool: &PgPool, run_id: Option<RunId>, limit: i64) -> Result<Vec<ArtifactRow>, StoreError> {
    let rows = sqlx::query(
        "SELECT artifact_id, run_id, step_id, kind, uri, metadata, created_at FROM \
         proj_artifacts WHERE ($1::text IS NULL OR run_id = $1) ORDER BY created_at DESC \
         LIMIT $2",
    )
    .bind(run_id.map(|id| id.to_string()))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_artifact).collect()
}

/// Evidence for one run: its steps, tool calls, and artifacts, for `GET
/// /runs/:runId/evidence`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunEvidence {
    /// Tool calls made during the run.
    pub tool_calls: Vec<ToolCallRow>,
    /// Artifacts produced during the run.
    pub artifacts: Vec<ArtifactRow>,
}

/// Assembles the evidence bundle for a run.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn get_run_evidence(pool: &PgPool, run_id: RunId) -> Result<RunEvidence, StoreError> {
    let tool_calls = list_tool_calls(pool, Some(run_id), 1000).await?;
    let artifacts = list_artifacts(pool, Some(run_id), 1000).await?;
    Ok(RunEvidence { tool_calls, artifacts })
}

/// Appends `run.evidence_finalized`, an attestation marker closing off
/// further evidence collection for a run. No dedicated projector backs
/// this event; it is a log-only seal, read back via the hash-chain walk.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn finalize_evidence(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    run_id: RunId,
    actor_type: ActorType,
    actor_id: &ActorId,
) -> Result<EventRecord, StoreError> {
    let envelope = EventEnvelope {
        event_type: "run.evidence_finalized".to_string(),
        event_version: 1,
        occurred_at: Utc::now(),
        workspace_id: workspace_id.clone(),
        mission_id: None,
        room_id: None,
        thread_id: None,
        run_id: Some(run_id),
        step_id: None,
        actor_type,
        actor_id: actor_id.clone(),
        actor_principal_id: None,
        zone: Zone::Supervised,
        stream: StreamRef::run(run_id),
        data: Value::Null,
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("run:{run_id}")),
        causation_id: None,
        idempotency_key: None,
    };
    writer.append_to_stream(pool, envelope).await
}

/// Appends `run.queued`, creating a fresh [`RunId`].
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
#[allow(clippy::too_many_arguments)]
pub async fn queue_run(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    room_id: Option<RoomId>,
    actor_type: ActorType,
    actor_id: &ActorId,
    actor_principal_id: Option<PrincipalId>,
    zone: Zone,
    experiment_id: Option<&str>,
    input: Value,
) -> Result<RunId, StoreError> {
    let run_id = RunId::new();
    let envelope = EventEnvelope {
        event_type: "run.queued".to_string(),
        event_version: 1,
        occurred_at: Utc::now(),
        workspace_id: workspace_id.clone(),
        mission_id: None,
        room_id,
        thread_id: None,
        run_id: Some(run_id),
        step_id: None,
        actor_type,
        actor_id: actor_id.clone(),
        actor_principal_id,
        zone,
        stream: StreamRef::run(run_id),
        data: json!({
            "experiment_id": experiment_id,
            "input": input,
        }),
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("run:{run_id}")),
        causation_id: None,
        idempotency_key: None,
    };
    writer.append_to_stream(pool, envelope).await?;
    Ok(run_id)
}

/// Claims one queued run under the advisory lock in [`claim_run`] and
/// appends its `run.started` event in the same transaction, so a claim is
/// never observable without the event that explains it.
///
/// # Errors
///
/// Returns [`StoreError::NoRunAvailable`] when nothing is claimable, or a
/// database error.
pub async fn claim_and_start_run(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    room_id: Option<&str>,
    lease_ttl: std::time::Duration,
    worker_actor_id: &ActorId,
) -> Result<ClaimedRun, StoreError> {
    let mut tx = pool.begin().await?;
    let claimed = claim_run(&mut tx, workspace_id, room_id, lease_ttl).await?;

    let envelope = EventEnvelope {
        event_type: "run.started".to_string(),
        event_version: 1,
        occurred_at: Utc::now(),
        workspace_id: workspace_id.clone(),
        mission_id: None,
        room_id: None,
        thread_id: None,
        run_id: Some(claimed.run_id),
        step_id: None,
        actor_type: ActorType::Service,
        actor_id: worker_actor_id.clone(),
        actor_principal_id: None,
        zone: Zone::Supervised,
        stream: StreamRef::run(claimed.run_id),
        data: json!({ "claim_token": claimed.claim_token }),
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("run:{}", claimed.run_id)),
        causation_id: None,
        idempotency_key: None,
    };
    writer.append_in_tx(&mut tx, envelope).await?;
    tx.commit().await?;
    Ok(claimed)
}

/// Starts one specific queued run (`POST /runs/:id/start`), under the same
/// advisory lock namespace `claim_and_start_run` uses, so a targeted start
/// cannot race a concurrent pool-wide claim for the same run.
///
/// # Errors
///
/// Returns [`StoreError::RunNotClaimable`] if the run is not `queued`.
pub async fn start_run(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    run_id: RunId,
    lease_ttl: std::time::Duration,
    worker_actor_id: &ActorId,
) -> Result<ClaimedRun, StoreError> {
    let mut tx = pool.begin().await?;
    let claimed = claim_specific_run(&mut tx, workspace_id, run_id, lease_ttl).await?;

    let envelope = EventEnvelope {
        event_type: "run.started".to_string(),
        event_version: 1,
        occurred_at: Utc::now(),
        workspace_id: workspace_id.clone(),
        mission_id: None,
        room_id: None,
        thread_id: None,
        run_id: Some(run_id),
        step_id: None,
        actor_type: ActorType::Service,
        actor_id: worker_actor_id.clone(),
        actor_principal_id: None,
        zone: Zone::Supervised,
        stream: StreamRef::run(run_id),
        data: json!({ "claim_token": claimed.claim_token }),
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("run:{run_id}")),
        causation_id: None,
        idempotency_key: None,
    };
    writer.append_in_tx(&mut tx, envelope).await?;
    tx.commit().await?;
    Ok(claimed)
}

/// Appends `run.completed`.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn complete_run(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    run_id: RunId,
    worker_actor_id: &ActorId,
) -> Result<EventRecord, StoreError> {
    let envelope = terminal_run_envelope(workspace_id, run_id, worker_actor_id, "run.completed", Value::Null);
    writer.append_to_stream(pool, envelope).await
}

/// Appends `run.failed` carrying `error`.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn fail_run(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    run_id: RunId,
    worker_actor_id: &ActorId,
    error: Value,
) -> Result<EventRecord, StoreError> {
    let envelope = terminal_run_envelope(workspace_id, run_id, worker_actor_id, "run.failed", error);
    writer.append_to_stream(pool, envelope).await
}

/// Appends `run.cancelled`.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn cancel_run(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    run_id: RunId,
    actor_type: ActorType,
    actor_id: &ActorId,
) -> Result<EventRecord, StoreError> {
    let envelope = EventEnvelope {
        event_type: "run.cancelled".to_string(),
        event_version: 1,
        occurred_at: Utc::now(),
        workspace_id: workspace_id.clone(),
        mission_id: None,
        room_id: None,
        thread_id: None,
        run_id: Some(run_id),
        step_id: None,
        actor_type,
        actor_id: actor_id.clone(),
        actor_principal_id: None,
        zone: Zone::Supervised,
        stream: StreamRef::run(run_id),
        data: Value::Null,
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("run:{run_id}")),
        causation_id: None,
        idempotency_key: None,
    };
    writer.append_to_stream(pool, envelope).await
}

fn terminal_run_envelope(
    workspace_id: &WorkspaceId,
    run_id: RunId,
    worker_actor_id: &ActorId,
    event_type: &str,
    error: Value,
) -> EventEnvelope {
    EventEnvelope {
        event_type: event_type.to_string(),
        event_version: 1,
        occurred_at: Utc::now(),
        workspace_id: workspace_id.clone(),
        mission_id: None,
        room_id: None,
        thread_id: None,
        run_id: Some(run_id),
        step_id: None,
        actor_type: ActorType::Service,
        actor_id: worker_actor_id.clone(),
        actor_principal_id: None,
        zone: Zone::Supervised,
        stream: StreamRef::run(run_id),
        data: json!({ "error": error }),
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("run:{run_id}")),
        causation_id: None,
        idempotency_key: None,
    }
}

/// Minimal projected row for resolving a step's run, used by the HTTP
/// layer to build tool-call/artifact envelopes from a `stepId` path param
/// alone.
#[derive(Debug, Clone)]
pub struct StepRow {
    /// The step's identifier.
    pub step_id: StepId,
    /// Tenancy boundary.
    pub workspace_id: WorkspaceId,
    /// The run this step belongs to.
    pub run_id: RunId,
}

/// Fetches the run a step belongs to.
///
/// # Errors
///
/// Returns [`StoreError::NotFound`] when no such step is projected, or a
/// database error.
pub async fn fetch_step(pool: &PgPool, step_id: StepId) -> Result<StepRow, StoreError> {
    let row = sqlx::query("SELECT workspace_id, run_id FROM proj_steps WHERE step_id = $1")
        .bind(step_id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("step {step_id}")))?;
    Ok(StepRow {
        step_id,
        workspace_id: WorkspaceId::new(row.try_get::<String, _>("workspace_id")?),
        run_id: row
            .try_get::<String, _>("run_id")?
            .parse::<uuid::Uuid>()
            .map(RunId::from_uuid)
            .unwrap_or_else(|_| RunId::new()),
    })
}

/// Appends `step.started`, creating a fresh [`StepId`].
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn start_step(
    tx: &mut Transaction<'_, Postgres>,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    run_id: RunId,
    worker_actor_id: &ActorId,
) -> Result<StepId, StoreError> {
    let step_id = StepId::new();
    let envelope = EventEnvelope {
        event_type: "step.started".to_string(),
        event_version: 1,
        occurred_at: Utc::now(),
        workspace_id: workspace_id.clone(),
        mission_id: None,
        room_id: None,
        thread_id: None,
        run_id: Some(run_id),
        step_id: Some(step_id),
        actor_type: ActorType::Service,
        actor_id: worker_actor_id.clone(),
        actor_principal_id: None,
        zone: Zone::Supervised,
        stream: StreamRef::run(run_id),
        data: Value::Null,
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("run:{run_id}")),
        causation_id: None,
        idempotency_key: None,
    };
    writer.append_in_tx(tx, envelope).await?;
    Ok(step_id)
}

/// Appends `step.completed` carrying `output`.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn complete_step(
    tx: &mut Transaction<'_, Postgres>,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    run_id: RunId,
    step_id: StepId,
    worker_actor_id: &ActorId,
    output: Value,
) -> Result<(), StoreError> {
    let envelope = terminal_step_envelope(workspace_id, run_id, step_id, worker_actor_id, "step.completed", json!({ "output": output }));
    writer.append_in_tx(tx, envelope).await?;
    Ok(())
}

/// Appends `step.failed` carrying `error`.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn fail_step(
    tx: &mut Transaction<'_, Postgres>,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    run_id: RunId,
    step_id: StepId,
    worker_actor_id: &ActorId,
    error: Value,
) -> Result<(), StoreError> {
    let envelope = terminal_step_envelope(workspace_id, run_id, step_id, worker_actor_id, "step.failed", json!({ "error": error }));
    writer.append_in_tx(tx, envelope).await?;
    Ok(())
}

fn terminal_step_envelope(
    workspace_id: &WorkspaceId,
    run_id: RunId,
    step_id: StepId,
    worker_actor_id: &ActorId,
    event_type: &str,
    data: Value,
) -> EventEnvelope {
    EventEnvelope {
        event_type: event_type.to_string(),
        event_version: 1,
        occurred_at: Utc::now(),
        workspace_id: workspace_id.clone(),
        mission_id: None,
        room_id: None,
        thread_id: None,
        run_id: Some(run_id),
        step_id: Some(step_id),
        actor_type: ActorType::Service,
        actor_id: worker_actor_id.clone(),
        actor_principal_id: None,
        zone: Zone::Supervised,
        stream: StreamRef::run(run_id),
        data,
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("run:{run_id}")),
        causation_id: None,
        idempotency_key: None,
    }
}

/// Appends `tool_call.invoked`, creating a fresh [`ToolCallId`]. The id
/// travels in `data.tool_call_id` rather than a dedicated envelope field,
/// matching `project_tool_call`'s read contract.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn invoke_tool_call(
    tx: &mut Transaction<'_, Postgres>,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    run_id: RunId,
    step_id: StepId,
    worker_actor_id: &ActorId,
    tool_name: &str,
    request: Value,
) -> Result<ToolCallId, StoreError> {
    let tool_call_id = ToolCallId::new();
    let envelope = EventEnvelope {
        event_type: "tool_call.invoked".to_string(),
        event_version: 1,
        occurred_at: Utc::now(),
        workspace_id: workspace_id.clone(),
        mission_id: None,
        room_id: None,
        thread_id: None,
        run_id: Some(run_id),
        step_id: Some(step_id),
        actor_type: ActorType::Service,
        actor_id: worker_actor_id.clone(),
        actor_principal_id: None,
        zone: Zone::Supervised,
        stream: StreamRef::run(run_id),
        data: json!({
            "tool_call_id": tool_call_id,
            "tool_name": tool_name,
            "request": request,
        }),
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("run:{run_id}")),
        causation_id: None,
        idempotency_key: None,
    };
    writer.append_in_tx(tx, envelope).await?;
    Ok(tool_call_id)
}

/// Appends `tool_call.completed` carrying `response`.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn complete_tool_call(
    tx: &mut Transaction<'_, Postgres>,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    run_id: RunId,
    step_id: StepId,
    tool_call_id: ToolCallId,
    worker_actor_id: &ActorId,
    response: Value,
) -> Result<(), StoreError> {
    let envelope = terminal_tool_call_envelope(
        workspace_id,
        run_id,
        step_id,
        tool_call_id,
        worker_actor_id,
        "tool_call.completed",
        json!({ "tool_call_id": tool_call_id, "response": response }),
    );
    writer.append_in_tx(tx, envelope).await?;
    Ok(())
}

/// Appends `tool_call.failed` carrying `error`.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn fail_tool_call(
    tx: &mut Transaction<'_, Postgres>,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    run_id: RunId,
    step_id: StepId,
    tool_call_id: ToolCallId,
    worker_actor_id: &ActorId,
    error: Value,
) -> Result<(), StoreError> {
    let envelope = terminal_tool_call_envelope(
        workspace_id,
        run_id,
        step_id,
        tool_call_id,
        worker_actor_id,
        "tool_call.failed",
        json!({ "tool_call_id": tool_call_id, "error": error }),
    );
    writer.append_in_tx(tx, envelope).await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn terminal_tool_call_envelope(
    workspace_id: &WorkspaceId,
    run_id: RunId,
    step_id: StepId,
    _tool_call_id: ToolCallId,
    worker_actor_id: &ActorId,
    event_type: &str,
    data: Value,
) -> EventEnvelope {
    EventEnvelope {
        event_type: event_type.to_string(),
        event_version: 1,
        occurred_at: Utc::now(),
        workspace_id: workspace_id.clone(),
        mission_id: None,
        room_id: None,
        thread_id: None,
        run_id: Some(run_id),
        step_id: Some(step_id),
        actor_type: ActorType::Service,
        actor_id: worker_actor_id.clone(),
        actor_principal_id: None,
        zone: Zone::Supervised,
        stream: StreamRef::run(run_id),
        data,
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("run:{run_id}")),
        causation_id: None,
        idempotency_key: None,
    }
}

/// Appends `artifact.created`, creating a fresh [`ArtifactId`].
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn record_artifact(
    tx: &mut Transaction<'_, Postgres>,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    run_id: RunId,
    step_id: Option<StepId>,
    worker_actor_id: &ActorId,
    kind: &str,
    uri: &str,
    metadata: Value,
) -> Result<ArtifactId, StoreError> {
    let artifact_id = ArtifactId::new();
    let envelope = EventEnvelope {
        event_type: "artifact.created".to_string(),
        event_version: 1,
        occurred_at: Utc::now(),
        workspace_id: workspace_id.clone(),
        mission_id: None,
        room_id: None,
        thread_id: None,
        run_id: Some(run_id),
        step_id,
        actor_type: ActorType::Service,
        actor_id: worker_actor_id.clone(),
        actor_principal_id: None,
        zone: Zone::Supervised,
        stream: StreamRef::run(run_id),
        data: json!({
            "artifact_id": artifact_id,
            "kind": kind,
            "uri": uri,
            "metadata": metadata,
        }),
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("run:{run_id}")),
        causation_id: None,
        idempotency_key: None,
    };
    writer.append_in_tx(tx, envelope).await?;
    Ok(artifact_id)
}
