// acp-worker/src/cycle.rs
// ============================================================================
// Module: Run Drive Cycle
// Description: Claims one queued run and drives it end-to-end: a step, a
//              tool call, an `authorize_tool_call` gate check, an optional
//              egress broker call, and the terminal run transition
//              (§4.11).
// Purpose: The unit of work the poll loop repeats up to
//          `run_worker_batch_limit` times per tick.
// Dependencies: acp-core, acp-config, acp-store, acp-policy, acp-egress
// ============================================================================

use acp_core::ActorId;
use acp_core::ActorType;
use acp_core::RunId;
use acp_core::StepId;
use acp_core::ToolCallId;
use acp_core::WorkspaceId;
use acp_config::Config;
use acp_policy::GateSubject;
use acp_policy::PolicyFailureSink;
use acp_store::ClaimedRun;
use acp_store::EventWriter;
use serde_json::Value;
use serde_json::json;
use sqlx::PgPool;

use crate::error::WorkerError;
use crate::input;

/// A tool name for a run that carries no `runtime.egress.target_url` — the
/// worker still runs it through the gate so quarantine, kill-switch, and
/// capability checks apply uniformly.
const TOOL_RUNTIME_EXECUTE: &str = "runtime.execute";
/// The tool name an egress-carrying run is evaluated and logged under.
const TOOL_EGRESS_REQUEST: &str = "egress.request";

/// Drives one claimed run from `running` to a terminal status.
///
/// # Errors
///
/// Returns [`WorkerError`] on storage, policy, or egress failure. The run
/// is left `running` (to be reclaimed once its lease expires) if this
/// returns an error before a terminal event was appended.
pub async fn drive_claimed_run(
    pool: &PgPool,
    writer: &EventWriter,
    config: &Config,
    sink: &dyn PolicyFailureSink,
    actor_id: &ActorId,
    claimed: &ClaimedRun,
) -> Result<(), WorkerError> {
    let run = acp_store::fetch_run(pool, claimed.run_id).await?;
    let directives = input::parse(&run.input)?;

    let subject = GateSubject {
        workspace_id: run.workspace_id.clone(),
        actor_type: ActorType::Service,
        actor_id: actor_id.clone(),
        principal_id: directives.policy.principal_id,
        capability_token_id: directives.policy.capability_token_id,
        zone: directives.policy.zone,
        room_id: None,
        causation_event_id: None,
    };
    let tool_name = if directives.egress_target_url.is_some() { TOOL_EGRESS_REQUEST } else { TOOL_RUNTIME_EXECUTE };

    let mut tx = pool.begin().await.map_err(acp_store::StoreError::from)?;
    let step_id = acp_store::runs::start_step(&mut tx, writer, &run.workspace_id, claimed.run_id, actor_id).await?;
    let tool_call_id = acp_store::runs::invoke_tool_call(
        &mut tx,
        writer,
        &run.workspace_id,
        claimed.run_id,
        step_id,
        actor_id,
        tool_name,
        run.input.clone(),
    )
    .await?;
    tx.commit().await.map_err(acp_store::StoreError::from)?;

    let gate_decision = acp_policy::gate::authorize_tool_call(pool, writer, config, sink, &subject, tool_name).await?;
    if gate_decision.blocked {
        return fail(
            pool,
            writer,
            &run.workspace_id,
            claimed.run_id,
            step_id,
            tool_call_id,
            actor_id,
            json!({ "reason_code": gate_decision.reason_code, "stage": "authorize_tool_call" }),
        )
        .await;
    }

    let Some(target_url) = directives.egress_target_url.as_deref() else {
        return complete(pool, writer, &run.workspace_id, claimed.run_id, step_id, tool_call_id, actor_id, Value::Null).await;
    };

    let egress_decision = acp_egress::request_egress(pool, writer, config, sink, &subject, target_url, None, None).await?;
    if egress_decision.blocked {
        return fail(
            pool,
            writer,
            &run.workspace_id,
            claimed.run_id,
            step_id,
            tool_call_id,
            actor_id,
            json!({ "reason_code": egress_decision.reason_code, "stage": "request_egress" }),
        )
        .await;
    }

    complete(
        pool,
        writer,
        &run.workspace_id,
        claimed.run_id,
        step_id,
        tool_call_id,
        actor_id,
        json!({ "egress": { "target_url": target_url, "reason_code": egress_decision.reason_code } }),
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn complete(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    run_id: RunId,
    step_id: StepId,
    tool_call_id: ToolCallId,
    actor_id: &ActorId,
    response: Value,
) -> Result<(), WorkerError> {
    let mut tx = pool.begin().await.map_err(acp_store::StoreError::from)?;
    acp_store::runs::complete_tool_call(&mut tx, writer, workspace_id, run_id, step_id, tool_call_id, actor_id, response.clone())
        .await?;
    acp_store::runs::complete_step(&mut tx, writer, workspace_id, run_id, step_id, actor_id, response).await?;
    tx.commit().await.map_err(acp_store::StoreError::from)?;
    acp_store::runs::complete_run(pool, writer, workspace_id, run_id, actor_id).await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn fail(
    pool: &PgPool,
    writer: &EventWriter,
    workspace_id: &WorkspaceId,
    run_id: RunId,
    step_id: StepId,
    tool_call_id: ToolCallId,
    actor_id: &ActorId,
    error: Value,
) -> Result<(), WorkerError> {
    let mut tx = pool.begin().await.map_err(acp_store::StoreError::from)?;
    acp_store::runs::fail_tool_call(&mut tx, writer, workspace_id, run_id, step_id, tool_call_id, actor_id, error.clone()).await?;
    acp_store::runs::fail_step(&mut tx, writer, workspace_id, run_id, step_id, actor_id, error.clone()).await?;
    tx.commit().await.map_err(acp_store::StoreError::from)?;
    acp_store::runs::fail_run(pool, writer, workspace_id, run_id, actor_id, error).await?;
    Ok(())
}
