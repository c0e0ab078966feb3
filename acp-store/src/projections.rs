// acp-store/src/projections.rs
// ============================================================================
// Module: Projection Engine
// Description: Idempotent, event-type-dispatched updates to the `proj_*` and
//              `growth_*`/`sec_*` read-model tables (§4.2).
// Purpose: Give the HTTP API and CLI a queryable current-state view without
//          replaying the event log on every read.
// Dependencies: acp-core, serde_json, sqlx
// ============================================================================

use acp_core::EventRecord;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::Postgres;
use sqlx::Transaction;

use crate::error::StoreError;

/// Projector name recorded in `proj_dedupe` for the built-in dispatch
/// table. A deployment running more than one projector over the same log
/// would use distinct names.
const PROJECTOR_NAME: &str = "acp_store_builtin";

/// Applies one event to every read model it affects, inside `tx`.
///
/// Idempotent: re-applying the same `event_id` is a no-op, recorded via
/// `proj_dedupe`. Callers may invoke this once per append (in the same
/// transaction as the write) or replay the whole log from a snapshot;
/// either way each event updates its projections at most once.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn apply_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    record: &EventRecord,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        "INSERT INTO proj_dedupe (projector_name, event_id) VALUES ($1, $2) ON CONFLICT DO \
         NOTHING",
    )
    .bind(PROJECTOR_NAME)
    .bind(record.event_id.as_uuid())
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(());
    }

    dispatch(tx, record).await
}

/// Convenience wrapper that opens its own transaction. Used by replay
/// tooling; the hot append path uses [`apply_in_tx`] inside the writer's
/// transaction instead.
///
/// # Errors
///
/// Returns [`StoreError`] on database failure.
pub async fn apply(pool: &PgPool, record: &EventRecord) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;
    apply_in_tx(&mut tx, record).await?;
    tx.commit().await?;
    Ok(())
}

async fn dispatch(tx: &mut Transaction<'_, Postgres>, record: &EventRecord) -> Result<(), StoreError> {
    let data = &record.data;
    let event_id = record.event_id.as_uuid();

    match record.event_type.as_str() {
        "room.created" => project_room(tx, record, data).await,
        "thread.created" => project_thread(tx, record, data).await,
        "message.posted" => project_message(tx, record, data).await,

        "run.queued" | "run.started" | "run.completed" | "run.failed" | "run.cancelled" => {
            project_run(tx, record, data).await
        }
        "step.started" | "step.completed" | "step.failed" => project_step(tx, record, data).await,
        "tool_call.invoked" | "tool_call.completed" | "tool_call.failed" => {
            project_tool_call(tx, record, data).await
        }
        "artifact.created" => project_artifact(tx, record, data).await,

        "approval.requested"
        | "approval.granted"
        | "approval.denied"
        | "approval.held"
        | "approval.expired" => project_approval(tx, record, data).await,
        "incident.opened" | "incident.updated" | "incident.closed" => {
            project_incident(tx, record, data).await
        }

        "capability.granted" | "capability.revoked" => project_capability(tx, record, data).await,
        "delegation.attempted" => project_delegation(tx, record, data).await,

        "agent.registered" => project_agent_registered(tx, record, data).await,
        "agent.quarantined" | "agent.unquarantined" => project_agent_quarantine(tx, record, data).await,

        "skill.package.submitted"
        | "skill.package.verified"
        | "skill.package.quarantined"
        | "skill.package.activated"
        | "skill.package.retired" => project_skill_package(tx, record, data).await,
        "skill.assessment.recorded" => project_skill_assessment(tx, record, data).await,

        "trust.increased" | "trust.decreased" => project_trust(tx, record, data).await,
        "constraint.learned" => project_constraint(tx, record, data).await,
        "mistake.repeated" => project_mistake(tx, record, data).await,

        "secret.detected" | "event.redacted" => {
            // Recorded synchronously by the writer into `sec_redaction_log`;
            // no additional projection needed here.
            Ok(())
        }

        "policy.denied" | "policy.requires_approval" => Ok(()),

        "egress.authorized" | "egress.blocked" => project_egress(tx, record, data).await,

        "evidence.manifest.created" => Ok(()),

        "lifecycle.transition" => project_lifecycle(tx, record, data).await,
        "lifecycle.hysteresis_tick" => project_lifecycle_hysteresis_tick(tx, record, data).await,

        "daily.agent.snapshot" => project_daily_snapshot(tx, record, data).await,
        "survival.rollup" => project_survival_rollup(tx, record, data).await,

        _ => {
            tracing::debug!(event_type = %record.event_type, %event_id, "no projector registered for event type");
            Ok(())
        }
    }
}

fn text<'a>(data: &'a Value, field: &str) -> Option<&'a str> {
    data.get(field).and_then(Value::as_str)
}

async fn project_room(tx: &mut Transaction<'_, Postgres>, record: &EventRecord, data: &Value) -> Result<(), StoreError> {
    let Some(room_id) = record.room_id else {
        return Err(StoreError::NotFound("room.created missing room_id".to_string()));
    };
    sqlx::query(
        "INSERT INTO proj_rooms (room_id, workspace_id, name, last_event_id) VALUES ($1, $2, \
         $3, $4) ON CONFLICT (room_id) DO UPDATE SET name = EXCLUDED.name, updated_at = now(), \
         last_event_id = EXCLUDED.last_event_id",
    )
    .bind(room_id.to_string())
    .bind(record.workspace_id.as_str())
    .bind(text(data, "name"))
    .bind(record.event_id.as_uuid())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn project_thread(tx: &mut Transaction<'_, Postgres>, record: &EventRecord, data: &Value) -> Result<(), StoreError> {
    let Some(thread_id) = record.thread_id else {
        return Err(StoreError::NotFound("thread.created missing thread_id".to_string()));
    };
    sqlx::query(
        "INSERT INTO proj_threads (thread_id, workspace_id, room_id, title, last_event_id) \
         VALUES ($1, $2, $3, $4, $5) ON CONFLICT (thread_id) DO UPDATE SET title = \
         EXCLUDED.title, updated_at = now(), last_event_id = EXCLUDED.last_event_id",
    )
    .bind(thread_id.to_string())
    .bind(record.workspace_id.as_str())
    .bind(record.room_id.map(|id| id.to_string()))
    .bind(text(data, "title"))
    .bind(record.event_id.as_uuid())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn project_message(tx: &mut Transaction<'_, Postgres>, record: &EventRecord, data: &Value) -> Result<(), StoreError> {
    let Some(message_id) = text(data, "message_id") else {
        return Err(StoreError::NotFound("message.posted missing message_id".to_string()));
    };
    sqlx::query(
        "INSERT INTO proj_messages (message_id, workspace_id, thread_id, room_id, \
         author_actor_id, body, last_event_id) VALUES ($1, $2, $3, $4, $5, $6, $7) ON CONFLICT \
         (message_id) DO UPDATE SET body = EXCLUDED.body, updated_at = now(), last_event_id = \
         EXCLUDED.last_event_id",
    )
    .bind(message_id)
    .bind(record.workspace_id.as_str())
    .bind(record.thread_id.map(|id| id.to_string()))
    .bind(record.room_id.map(|id| id.to_string()))
    .bind(record.actor_id.as_str())
    .bind(data.get("body"))
    .bind(record.event_id.as_uuid())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn project_run(tx: &mut Transaction<'_, Postgres>, record: &EventRecord, data: &Value) -> Result<(), StoreError> {
    let Some(run_id) = record.run_id else {
        return Err(StoreError::NotFound(format!("{} missing run_id", record.event_type)));
    };
    let status = match record.event_type.as_str() {
        "run.queued" => "queued",
        "run.started" => "running",
        "run.completed" => "completed",
        "run.failed" => "failed",
        "run.cancelled" => "cancelled",
        other => return Err(StoreError::NotFound(format!("unhandled run event {other}"))),
    };
    sqlx::query(
        "INSERT INTO proj_runs (run_id, workspace_id, room_id, status, correlation_id, \
         experiment_id, error, input, last_event_id) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, \
         $9) ON CONFLICT (run_id) DO UPDATE SET status = EXCLUDED.status, error = \
         COALESCE(EXCLUDED.error, proj_runs.error), updated_at = now(), last_event_id = \
         EXCLUDED.last_event_id",
    )
    .bind(run_id.to_string())
    .bind(record.workspace_id.as_str())
    .bind(record.room_id.map(|id| id.to_string()))
    .bind(status)
    .bind(record.correlation_id.as_str())
    .bind(text(data, "experiment_id"))
    .bind(if record.event_type == "run.failed" { data.get("error") } else { None })
    .bind(if record.event_type == "run.queued" { data.get("input") } else { None })
    .bind(record.event_id.as_uuid())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn project_step(tx: &mut Transaction<'_, Postgres>, record: &EventRecord, data: &Value) -> Result<(), StoreError> {
    let (Some(step_id), Some(run_id)) = (record.step_id, record.run_id) else {
        return Err(StoreError::NotFound(format!("{} missing step_id/run_id", record.event_type)));
    };
    let status = match record.event_type.as_str() {
        "step.started" => "running",
        "step.completed" => "completed",
        "step.failed" => "failed",
        other => return Err(StoreError::NotFound(format!("unhandled step event {other}"))),
    };
    sqlx::query(
        "INSERT INTO proj_steps (step_id, workspace_id, run_id, status, output, last_event_id) \
         VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (step_id) DO UPDATE SET status = \
         EXCLUDED.status, output = COALESCE(EXCLUDED.output, proj_steps.output), updated_at = \
         now(), last_event_id = EXCLUDED.last_event_id",
    )
    .bind(step_id.to_string())
    .bind(record.workspace_id.as_str())
    .bind(run_id.to_string())
    .bind(status)
    .bind(data.get("output"))
    .bind(record.event_id.as_uuid())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn project_tool_call(tx: &mut Transaction<'_, Postgres>, record: &EventRecord, data: &Value) -> Result<(), StoreError> {
    let Some(tool_call_id) = text(data, "tool_call_id") else {
        return Err(StoreError::NotFound(format!("{} missing tool_call_id", record.event_type)));
    };
    let (status, tool_name) = match record.event_type.as_str() {
        "tool_call.invoked" => ("invoked", text(data, "tool_name").unwrap_or("unknown")),
        "tool_call.completed" => ("completed", ""),
        "tool_call.failed" => ("failed", ""),
        other => return Err(StoreError::NotFound(format!("unhandled tool_call event {other}"))),
    };
    sqlx::query(
        "INSERT INTO proj_tool_calls (tool_call_id, workspace_id, run_id, step_id, tool_name, \
         status, request, response, last_event_id) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT (tool_call_id) DO UPDATE SET status = EXCLUDED.status, response = \
         COALESCE(EXCLUDED.response, proj_tool_calls.response), updated_at = now(), \
         last_event_id = EXCLUDED.last_event_id",
    )
    .bind(tool_call_id)
    .bind(record.workspace_id.as_str())
    .bind(record.run_id.map(|id| id.to_string()))
    .bind(record.step_id.map(|id| id.to_string()))
    .bind(tool_name)
    .bind(status)
    .bind(if record.event_type == "tool_call.invoked" { data.get("request") } else { None })
    .bind(if record.event_type == "tool_call.completed" { data.get("response") } else { None })
    .bind(record.event_id.as_uuid())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn project_artifact(tx: &mut Transaction<'_, Postgres>, record: &EventRecord, data: &Value) -> Result<(), StoreError> {
    let Some(artifact_id) = text(data, "artifact_id") else {
        return Err(StoreError::NotFound("artifact.created missing artifact_id".to_string()));
    };
    sqlx::query(
        "INSERT INTO proj_artifacts (artifact_id, workspace_id, run_id, step_id, kind, uri, \
         metadata, last_event_id) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) ON CONFLICT \
         (artifact_id) DO UPDATE SET metadata = EXCLUDED.metadata, updated_at = now(), \
         last_event_id = EXCLUDED.last_event_id",
    )
    .bind(artifact_id)
    .bind(record.workspace_id.as_str())
    .bind(record.run_id.map(|id| id.to_string()))
    .bind(record.step_id.map(|id| id.to_string()))
    .bind(text(data, "kind"))
    .bind(text(data, "uri"))
    .bind(data.get("metadata"))
    .bind(record.event_id.as_uuid())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn project_approval(tx: &mut Transaction<'_, Postgres>, record: &EventRecord, data: &Value) -> Result<(), StoreError> {
    let Some(approval_id) = text(data, "approval_id") else {
        return Err(StoreError::NotFound(format!("{} missing approval_id", record.event_type)));
    };
    match record.event_type.as_str() {
        "approval.requested" => {
            sqlx::query(
                "INSERT INTO proj_approvals (approval_id, workspace_id, status, scope, \
                 ttl_seconds, target_action, request_payload, correlation_id, expires_at, \
                 last_event_id) VALUES ($1, $2, 'pending', $3, $4, $5, $6, $7, $8, $9) ON \
                 CONFLICT (approval_id) DO NOTHING",
            )
            .bind(approval_id)
            .bind(record.workspace_id.as_str())
            .bind(data.get("scope").cloned().unwrap_or(Value::Null))
            .bind(data.get("ttl_seconds").and_then(Value::as_i64))
            .bind(data.get("target_action").cloned().unwrap_or(Value::Null))
            .bind(data.get("request_payload"))
            .bind(record.correlation_id.as_str())
            .bind(data.get("expires_at").and_then(Value::as_str).and_then(|value| value.parse().ok()))
            .bind(record.event_id.as_uuid())
            .execute(&mut **tx)
            .await?;
        }
        "approval.granted" | "approval.denied" | "approval.held" | "approval.expired" => {
            let status = match record.event_type.as_str() {
                "approval.granted" => "granted",
                "approval.denied" => "denied",
                "approval.held" => "held",
                _ => "expired",
            };
            sqlx::query(
                "UPDATE proj_approvals SET status = $1, decision_payload = $2, updated_at = \
                 now(), last_event_id = $3 WHERE approval_id = $4",
            )
            .bind(status)
            .bind(data.get("decision_payload"))
            .bind(record.event_id.as_uuid())
            .bind(approval_id)
            .execute(&mut **tx)
            .await?;
        }
        other => return Err(StoreError::NotFound(format!("unhandled approval event {other}"))),
    }
    Ok(())
}

async fn project_incident(tx: &mut Transaction<'_, Postgres>, record: &EventRecord, data: &Value) -> Result<(), StoreError> {
    let Some(incident_id) = text(data, "incident_id") else {
        return Err(StoreError::NotFound(format!("{} missing incident_id", record.event_type)));
    };
    match record.event_type.as_str() {
        "incident.opened" => {
            sqlx::query(
                "INSERT INTO proj_incidents (incident_id, workspace_id, status, run_id, \
                 correlation_id, last_event_id) VALUES ($1, $2, 'open', $3, $4, $5) ON \
                 CONFLICT (incident_id) DO NOTHING",
            )
            .bind(incident_id)
            .bind(record.workspace_id.as_str())
            .bind(record.run_id.map(|id| id.to_string()))
            .bind(record.correlation_id.as_str())
            .bind(record.event_id.as_uuid())
            .execute(&mut **tx)
            .await?;
        }
        "incident.updated" => {
            sqlx::query(
                "UPDATE proj_incidents SET rca = COALESCE($1, rca), learning_entries = \
                 learning_entries || COALESCE($2, '[]'::jsonb), updated_at = now(), \
                 last_event_id = $3 WHERE incident_id = $4",
            )
            .bind(text(data, "rca"))
            .bind(data.get("learning_entry").map(|entry| Value::Array(vec![entry.clone()])))
            .bind(record.event_id.as_uuid())
            .bind(incident_id)
            .execute(&mut **tx)
            .await?;
        }
        "incident.closed" => {
            sqlx::query(
                "UPDATE proj_incidents SET status = 'closed', updated_at = now(), \
                 last_event_id = $1 WHERE incident_id = $2",
            )
            .bind(record.event_id.as_uuid())
            .bind(incident_id)
            .execute(&mut **tx)
            .await?;
        }
        other => return Err(StoreError::NotFound(format!("unhandled incident event {other}"))),
    }
    Ok(())
}

async fn project_capability(tx: &mut Transaction<'_, Postgres>, record: &EventRecord, data: &Value) -> Result<(), StoreError> {
    let Some(token_id) = text(data, "token_id") else {
        return Err(StoreError::NotFound(format!("{} missing token_id", record.event_type)));
    };
    if record.event_type == "capability.granted" {
        let Some(issued_to) = text(data, "issued_to_principal_id") else {
            return Err(StoreError::NotFound("capability.granted missing issued_to_principal_id".to_string()));
        };
        let Some(granted_by) = text(data, "granted_by_principal_id") else {
            return Err(StoreError::NotFound("capability.granted missing granted_by_principal_id".to_string()));
        };
        sqlx::query(
            "INSERT INTO proj_capability_tokens (token_id, workspace_id, \
             issued_to_principal_id, granted_by_principal_id, parent_token_id, scopes, \
             valid_until, last_event_id) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) ON CONFLICT \
             (token_id) DO NOTHING",
        )
        .bind(token_id)
        .bind(record.workspace_id.as_str())
        .bind(issued_to)
        .bind(granted_by)
        .bind(text(data, "parent_token_id"))
        .bind(data.get("scopes").cloned().unwrap_or_else(|| Value::Array(vec![])))
        .bind(data.get("valid_until").and_then(Value::as_str).and_then(|value| value.parse().ok()))
        .bind(record.event_id.as_uuid())
        .execute(&mut **tx)
        .await?;
    } else {
        sqlx::query(
            "UPDATE proj_capability_tokens SET revoked_at = now(), last_event_id = $1 WHERE \
             token_id = $2",
        )
        .bind(record.event_id.as_uuid())
        .bind(token_id)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn project_delegation(tx: &mut Transaction<'_, Postgres>, record: &EventRecord, data: &Value) -> Result<(), StoreError> {
    if !data.get("allowed").and_then(Value::as_bool).unwrap_or(false) {
        // Denied attempts carry no child token; the audit trail is the event itself.
        return Ok(());
    }
    let (Some(parent), Some(child)) = (text(data, "parent_token_id"), text(data, "child_token_id")) else {
        return Err(StoreError::NotFound("delegation.attempted missing token ids".to_string()));
    };
    sqlx::query(
        "INSERT INTO proj_delegation_edges (parent_token_id, child_token_id, \
         workspace_id) VALUES ($1, $2, $3) ON CONFLICT (parent_token_id, child_token_id) \
         DO NOTHING",
    )
    .bind(parent)
    .bind(child)
    .bind(record.workspace_id.as_str())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn project_agent_registered(tx: &mut Transaction<'_, Postgres>, record: &EventRecord, data: &Value) -> Result<(), StoreError> {
    let Some(agent_id) = text(data, "agent_id") else {
        return Err(StoreError::NotFound("agent.registered missing agent_id".to_string()));
    };
    sqlx::query(
        "INSERT INTO proj_agents (agent_id, workspace_id, principal_id, last_event_id) VALUES \
         ($1, $2, $3, $4) ON CONFLICT (agent_id) DO UPDATE SET principal_id = \
         EXCLUDED.principal_id, updated_at = now(), last_event_id = EXCLUDED.last_event_id",
    )
    .bind(agent_id)
    .bind(record.workspace_id.as_str())
    .bind(text(data, "principal_id"))
    .bind(record.event_id.as_uuid())
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "INSERT INTO growth_agent_trust (agent_id, workspace_id, score_version) VALUES ($1, \
         $2, 1) ON CONFLICT (agent_id) DO NOTHING",
    )
    .bind(agent_id)
    .bind(record.workspace_id.as_str())
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "INSERT INTO growth_lifecycle_state (agent_id, workspace_id) VALUES ($1, $2) ON \
         CONFLICT (agent_id) DO NOTHING",
    )
    .bind(agent_id)
    .bind(record.workspace_id.as_str())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn project_agent_quarantine(tx: &mut Transaction<'_, Postgres>, record: &EventRecord, data: &Value) -> Result<(), StoreError> {
    let Some(agent_id) = text(data, "agent_id") else {
        return Err(StoreError::NotFound(format!("{} missing agent_id", record.event_type)));
    };
    if record.event_type == "agent.quarantined" {
        sqlx::query(
            "UPDATE proj_agents SET quarantined_at = now(), quarantine_reason = $1, \
             updated_at = now(), last_event_id = $2 WHERE agent_id = $3",
        )
        .bind(text(data, "reason"))
        .bind(record.event_id.as_uuid())
        .bind(agent_id)
        .execute(&mut **tx)
        .await?;
    } else {
        sqlx::query(
            "UPDATE proj_agents SET quarantined_at = NULL, quarantine_reason = NULL, \
             updated_at = now(), last_event_id = $1 WHERE agent_id = $2",
        )
        .bind(record.event_id.as_uuid())
        .bind(agent_id)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn project_skill_package(tx: &mut Transaction<'_, Postgres>, record: &EventRecord, data: &Value) -> Result<(), StoreError> {
    let Some(package_id) = text(data, "package_id") else {
        return Err(StoreError::NotFound(format!("{} missing package_id", record.event_type)));
    };
    let state = match record.event_type.as_str() {
        "skill.package.submitted" => "pending",
        "skill.package.verified" => "verified",
        "skill.package.quarantined" => "quarantined",
        "skill.package.activated" => "active",
        "skill.package.retired" => "retired",
        other => return Err(StoreError::NotFound(format!("unhandled skill package event {other}"))),
    };
    sqlx::query(
        "INSERT INTO growth_skill_packages (package_id, workspace_id, agent_id, name, \
         version, state, signature, content_hash, quarantine_reason) VALUES ($1, $2, $3, $4, \
         $5, $6, $7, $8, $9) ON CONFLICT (package_id) DO UPDATE SET state = EXCLUDED.state, \
         quarantine_reason = EXCLUDED.quarantine_reason, updated_at = now()",
    )
    .bind(package_id)
    .bind(record.workspace_id.as_str())
    .bind(text(data, "agent_id"))
    .bind(text(data, "name").unwrap_or(package_id))
    .bind(text(data, "version").unwrap_or("0.0.0"))
    .bind(state)
    .bind(text(data, "signature"))
    .bind(text(data, "content_hash"))
    .bind(text(data, "reason"))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn project_skill_assessment(tx: &mut Transaction<'_, Postgres>, record: &EventRecord, data: &Value) -> Result<(), StoreError> {
    let (Some(agent_id), Some(skill_id)) = (text(data, "agent_id"), text(data, "skill_id")) else {
        return Err(StoreError::NotFound("skill.assessment.recorded missing agent_id/skill_id".to_string()));
    };
    sqlx::query(
        "INSERT INTO growth_skill_catalog (skill_id, workspace_id, name) VALUES ($1, $2, $1) \
         ON CONFLICT (skill_id) DO NOTHING",
    )
    .bind(skill_id)
    .bind(record.workspace_id.as_str())
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "INSERT INTO growth_skill_assessments (agent_id, skill_id, workspace_id, status, \
         detail) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(agent_id)
    .bind(skill_id)
    .bind(record.workspace_id.as_str())
    .bind(text(data, "status").unwrap_or("recorded"))
    .bind(data.get("detail"))
    .execute(&mut **tx)
    .await?;

    if text(data, "status") == Some("passed") {
        sqlx::query(
            "INSERT INTO growth_agent_skills (agent_id, skill_id, workspace_id) VALUES ($1, \
             $2, $3) ON CONFLICT (agent_id, skill_id) DO NOTHING",
        )
        .bind(agent_id)
        .bind(skill_id)
        .bind(record.workspace_id.as_str())
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn project_trust(tx: &mut Transaction<'_, Postgres>, record: &EventRecord, data: &Value) -> Result<(), StoreError> {
    let Some(agent_id) = text(data, "agent_id") else {
        return Err(StoreError::NotFound(format!("{} missing agent_id", record.event_type)));
    };
    let Some(new_score) = data.get("new_score").and_then(Value::as_f64) else {
        return Err(StoreError::NotFound(format!("{} missing new_score", record.event_type)));
    };
    let score_version = data.get("score_version").and_then(Value::as_i64).unwrap_or(1);
    sqlx::query(
        "INSERT INTO growth_agent_trust (agent_id, workspace_id, score, score_version, \
         components) VALUES ($1, $2, $3, $4, $5) ON CONFLICT (agent_id) DO UPDATE SET score = \
         EXCLUDED.score, score_version = EXCLUDED.score_version, components = \
         EXCLUDED.components, updated_at = now()",
    )
    .bind(agent_id)
    .bind(record.workspace_id.as_str())
    .bind(new_score)
    .bind(i32::try_from(score_version).unwrap_or(1))
    .bind(data.get("components").cloned().unwrap_or_else(|| Value::Object(serde_json::Map::new())))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn project_constraint(tx: &mut Transaction<'_, Postgres>, record: &EventRecord, data: &Value) -> Result<(), StoreError> {
    let (Some(principal_id), Some(category), Some(pattern_hash)) =
        (text(data, "principal_id"), text(data, "category"), text(data, "pattern_hash"))
    else {
        return Err(StoreError::NotFound("constraint.learned missing required fields".to_string()));
    };
    sqlx::query(
        "INSERT INTO sec_constraints (principal_id, category, pattern_hash, reason_code) \
         VALUES ($1, $2, $3, $4) ON CONFLICT (principal_id, category, pattern_hash) DO UPDATE \
         SET reason_code = EXCLUDED.reason_code, updated_at = now()",
    )
    .bind(principal_id)
    .bind(category)
    .bind(pattern_hash)
    .bind(text(data, "reason_code").unwrap_or("unspecified"))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn project_mistake(tx: &mut Transaction<'_, Postgres>, record: &EventRecord, data: &Value) -> Result<(), StoreError> {
    let (Some(principal_id), Some(category), Some(pattern_hash)) =
        (text(data, "principal_id"), text(data, "category"), text(data, "pattern_hash"))
    else {
        return Err(StoreError::NotFound("mistake.repeated missing required fields".to_string()));
    };
    sqlx::query(
        "INSERT INTO sec_mistake_counters (principal_id, category, pattern_hash, repeat_count) \
         VALUES ($1, $2, $3, 1) ON CONFLICT (principal_id, category, pattern_hash) DO UPDATE \
         SET repeat_count = sec_mistake_counters.repeat_count + 1, last_seen_at = now()",
    )
    .bind(principal_id)
    .bind(category)
    .bind(pattern_hash)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn project_egress(tx: &mut Transaction<'_, Postgres>, record: &EventRecord, data: &Value) -> Result<(), StoreError> {
    let Some(domain) = text(data, "domain") else {
        return Err(StoreError::NotFound(format!("{} missing domain", record.event_type)));
    };
    sqlx::query(
        "INSERT INTO sec_egress_requests (workspace_id, principal_id, zone, domain, url, \
         method, decision, blocked, reason_code, approval_id, justification) VALUES ($1, $2, \
         $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(record.workspace_id.as_str())
    .bind(record.actor_principal_id.map(|id| id.to_string()))
    .bind(format!("{:?}", record.zone).to_lowercase())
    .bind(domain)
    .bind(text(data, "url"))
    .bind(text(data, "method"))
    .bind(if record.event_type == "egress.authorized" { "allow" } else { "block" })
    .bind(record.event_type == "egress.blocked")
    .bind(text(data, "reason_code").unwrap_or("unspecified"))
    .bind(text(data, "approval_id"))
    .bind(text(data, "justification"))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn project_lifecycle(tx: &mut Transaction<'_, Postgres>, record: &EventRecord, data: &Value) -> Result<(), StoreError> {
    let Some(agent_id) = text(data, "agent_id") else {
        return Err(StoreError::NotFound("lifecycle.transition missing agent_id".to_string()));
    };
    let Some(to_state) = text(data, "to_state") else {
        return Err(StoreError::NotFound("lifecycle.transition missing to_state".to_string()));
    };
    sqlx::query(
        "INSERT INTO growth_lifecycle_state (agent_id, workspace_id, state) VALUES ($1, $2, \
         $3) ON CONFLICT (agent_id) DO UPDATE SET state = EXCLUDED.state, \
         consecutive_good_days = 0, consecutive_bad_days = 0, updated_at = now()",
    )
    .bind(agent_id)
    .bind(record.workspace_id.as_str())
    .bind(to_state)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Sets the good/bad hysteresis counters to the values the caller already
/// computed, for a day that did not cross a lifecycle state boundary.
/// Kept distinct from `lifecycle.transition`, whose projector unconditionally
/// resets both counters to zero; the caller (`acp-growth`) is the only
/// place that knows whether a streak continues or just broke.
async fn project_lifecycle_hysteresis_tick(
    tx: &mut Transaction<'_, Postgres>,
    record: &EventRecord,
    data: &Value,
) -> Result<(), StoreError> {
    let Some(agent_id) = text(data, "agent_id") else {
        return Err(StoreError::NotFound("lifecycle.hysteresis_tick missing agent_id".to_string()));
    };
    let Some(consecutive_good_days) = data.get("consecutive_good_days").and_then(Value::as_i64) else {
        return Err(StoreError::NotFound("lifecycle.hysteresis_tick missing consecutive_good_days".to_string()));
    };
    let Some(consecutive_bad_days) = data.get("consecutive_bad_days").and_then(Value::as_i64) else {
        return Err(StoreError::NotFound("lifecycle.hysteresis_tick missing consecutive_bad_days".to_string()));
    };
    sqlx::query(
        "INSERT INTO growth_lifecycle_state (agent_id, workspace_id, consecutive_good_days, \
         consecutive_bad_days) VALUES ($1, $2, $3, $4) ON CONFLICT (agent_id) DO UPDATE SET \
         consecutive_good_days = EXCLUDED.consecutive_good_days, consecutive_bad_days = \
         EXCLUDED.consecutive_bad_days, updated_at = now()",
    )
    .bind(agent_id)
    .bind(record.workspace_id.as_str())
    .bind(i32::try_from(consecutive_good_days).unwrap_or(0))
    .bind(i32::try_from(consecutive_bad_days).unwrap_or(0))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn project_daily_snapshot(tx: &mut Transaction<'_, Postgres>, record: &EventRecord, data: &Value) -> Result<(), StoreError> {
    let Some(agent_id) = text(data, "agent_id") else {
        return Err(StoreError::NotFound("daily.agent.snapshot missing agent_id".to_string()));
    };
    let Some(snapshot_date) = text(data, "snapshot_date") else {
        return Err(StoreError::NotFound("daily.agent.snapshot missing snapshot_date".to_string()));
    };
    let snapshot_date = chrono::NaiveDate::parse_from_str(snapshot_date, "%Y-%m-%d")
        .map_err(|err| StoreError::NotFound(format!("daily.agent.snapshot bad snapshot_date: {err}")))?;
    let metrics = data.get("metrics").cloned().unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    sqlx::query(
        "INSERT INTO growth_daily_snapshots (agent_id, workspace_id, snapshot_date, metrics) \
         VALUES ($1, $2, $3, $4) ON CONFLICT (agent_id, snapshot_date) DO UPDATE SET metrics = \
         EXCLUDED.metrics",
    )
    .bind(agent_id)
    .bind(record.workspace_id.as_str())
    .bind(snapshot_date)
    .bind(metrics)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn project_survival_rollup(tx: &mut Transaction<'_, Postgres>, record: &EventRecord, data: &Value) -> Result<(), StoreError> {
    let Some(target_id) = text(data, "target_id") else {
        return Err(StoreError::NotFound("survival.rollup missing target_id".to_string()));
    };
    let Some(target_type) = text(data, "target_type") else {
        return Err(StoreError::NotFound("survival.rollup missing target_type".to_string()));
    };
    let Some(ledger_date) = text(data, "ledger_date") else {
        return Err(StoreError::NotFound("survival.rollup missing ledger_date".to_string()));
    };
    let ledger_date = chrono::NaiveDate::parse_from_str(ledger_date, "%Y-%m-%d")
        .map_err(|err| StoreError::NotFound(format!("survival.rollup bad ledger_date: {err}")))?;
    let cost = data.get("cost").and_then(Value::as_f64).unwrap_or(0.0);
    let value = data.get("value").and_then(Value::as_f64).unwrap_or(0.0);
    sqlx::query(
        "INSERT INTO growth_survival_ledger (target_id, target_type, workspace_id, ledger_date, \
         cost, value) VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (target_id, target_type, \
         ledger_date) DO UPDATE SET cost = EXCLUDED.cost, value = EXCLUDED.value",
    )
    .bind(target_id)
    .bind(target_type)
    .bind(record.workspace_id.as_str())
    .bind(ledger_date)
    .bind(cost)
    .bind(value)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
