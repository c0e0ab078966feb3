// acp-egress/src/request.rs
// ============================================================================
// Module: Egress Request Broker
// Description: Normalize → authorize → record → emit for one outbound
//              network request (§4.8).
// Purpose: The single entry point HTTP handlers and the Runtime Worker
//          both call so an egress decision is recorded exactly once,
//          regardless of caller.
// Dependencies: acp-core, acp-config, acp-policy, acp-store
// ============================================================================

use acp_config::Config;
use acp_core::ActorId;
use acp_core::CorrelationId;
use acp_core::Decision;
use acp_core::EventEnvelope;
use acp_core::StreamRef;
use acp_policy::GateSubject;
use acp_policy::PolicyFailureSink;
use acp_store::EventWriter;
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use url::Url;

use crate::error::EgressError;

/// Normalizes a domain or URL into a bare lowercase host, stripping any
/// port, path, query, or scheme.
///
/// # Errors
///
/// Returns [`EgressError::InvalidTarget`] when `input` is empty or a
/// parseable URL with no host.
pub fn normalize_domain(input: &str) -> Result<String, EgressError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(EgressError::InvalidTarget("empty target".to_string()));
    }
    // A bare domain has no scheme; `Url::parse` would reject it, so give it
    // one purely to borrow the library's host/port parsing.
    let candidate = if trimmed.contains("://") { trimmed.to_string() } else { format!("scheme://{trimmed}") };
    let parsed = Url::parse(&candidate).map_err(|err| EgressError::InvalidTarget(err.to_string()))?;
    let host = parsed.host_str().ok_or_else(|| EgressError::InvalidTarget("no host in target".to_string()))?;
    Ok(host.to_ascii_lowercase())
}

/// Evaluates and records one outbound network request.
///
/// # Errors
///
/// Returns [`EgressError::InvalidTarget`] if `target` does not normalize
/// to a host, or [`EgressError::Policy`] on storage or gate failure.
#[allow(clippy::too_many_arguments)]
pub async fn request_egress(
    pool: &PgPool,
    writer: &EventWriter,
    config: &Config,
    sink: &dyn PolicyFailureSink,
    subject: &GateSubject,
    target: &str,
    method: Option<&str>,
    justification: Option<&str>,
) -> Result<Decision, EgressError> {
    let domain = normalize_domain(target)?;

    emit_requested(pool, writer, subject, &domain, target, method, justification).await?;

    let decision = acp_policy::gate::authorize_egress(pool, writer, config, sink, subject, &domain).await?;

    emit_outcome(pool, writer, subject, &domain, target, method, justification, &decision).await?;

    Ok(decision)
}

#[allow(clippy::too_many_arguments)]
async fn emit_requested(
    pool: &PgPool,
    writer: &EventWriter,
    subject: &GateSubject,
    domain: &str,
    url: &str,
    method: Option<&str>,
    justification: Option<&str>,
) -> Result<(), EgressError> {
    let envelope = envelope(
        subject,
        "egress.requested",
        json!({
            "domain": domain,
            "url": url,
            "method": method,
            "justification": justification,
        }),
    );
    writer.append_to_stream(pool, envelope).await.map_err(acp_policy::PolicyError::from)?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn emit_outcome(
    pool: &PgPool,
    writer: &EventWriter,
    subject: &GateSubject,
    domain: &str,
    url: &str,
    method: Option<&str>,
    justification: Option<&str>,
    decision: &Decision,
) -> Result<(), EgressError> {
    let event_type = if decision.blocked { "egress.blocked" } else { "egress.authorized" };
    let envelope = envelope(
        subject,
        event_type,
        json!({
            "domain": domain,
            "url": url,
            "method": method,
            "justification": justification,
            "reason_code": decision.reason_code,
            "approval_id": decision.approval_id,
        }),
    );
    writer.append_to_stream(pool, envelope).await.map_err(acp_policy::PolicyError::from)?;
    Ok(())
}

fn envelope(subject: &GateSubject, event_type: &str, data: serde_json::Value) -> EventEnvelope {
    EventEnvelope {
        event_type: event_type.to_string(),
        event_version: 1,
        occurred_at: Utc::now(),
        workspace_id: subject.workspace_id.clone(),
        mission_id: None,
        room_id: subject.room_id,
        thread_id: None,
        run_id: None,
        step_id: None,
        actor_type: subject.actor_type,
        actor_id: subject.actor_id.clone(),
        actor_principal_id: subject.principal_id,
        zone: subject.zone,
        stream: subject
            .room_id
            .map_or_else(|| StreamRef::workspace(&subject.workspace_id), StreamRef::room),
        data,
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("egress:{}:{event_type}", subject.workspace_id)),
        causation_id: subject.causation_event_id,
        idempotency_key: None,
    }
}

/// The `actor_id` used by callers (e.g. the Runtime Worker) that invoke
/// egress on an agent's behalf without an HTTP-resolved actor identity of
/// their own.
#[must_use]
pub fn service_actor_id() -> ActorId {
    ActorId::new("acp-egress")
}

#[cfg(test)]
mod tests {
    use super::normalize_domain;

    #[test]
    fn strips_scheme_port_and_path() {
        assert_eq!(normalize_domain("https://Example.com:8443/a/b?x=1").unwrap(), "example.com");
    }

    #[test]
    fn accepts_a_bare_domain() {
        assert_eq!(normalize_domain("Api.Example.COM").unwrap(), "api.example.com");
    }

    #[test]
    fn rejects_an_empty_target() {
        assert!(normalize_domain("   ").is_err());
    }
}
