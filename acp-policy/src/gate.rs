// acp-policy/src/gate.rs
// ============================================================================
// Module: Policy Gate
// Description: The nine-step evaluation pipeline shared by
//              `authorize_action`, `authorize_tool_call`,
//              `authorize_data_access`, and `authorize_egress` (§4.5).
// Purpose: One decision shape, one enforcement-mode rule, one place the
//          side effects of a negative decision are emitted.
// Dependencies: acp-core, acp-store, acp-config, async-trait
// ============================================================================

use acp_config::Config;
use acp_core::ActorId;
use acp_core::ActorType;
use acp_core::Decision;
use acp_core::EnforcementMode;
use acp_core::EventEnvelope;
use acp_core::EventId;
use acp_core::PrincipalId;
use acp_core::ReasonCode;
use acp_core::RoomId;
use acp_core::TokenId;
use acp_core::WorkspaceId;
use acp_core::Zone;
use acp_store::EventWriter;
use chrono::Duration;
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;

use crate::approvals;
use crate::capabilities;
use crate::error::PolicyError;
use crate::principal;

/// The dimension a request is checked against (§4.5 step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// A generic registered action.
    Action,
    /// A tool invocation.
    ToolCall,
    /// A data read or write.
    DataAccess,
    /// An outbound network request.
    Egress,
}

/// Read or write, for [`Category::DataAccess`] requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataMode {
    /// A read of the labeled resource.
    Read,
    /// A write to the labeled resource.
    Write,
}

/// Resource labels that require a bound room before a read/write is
/// permitted (§4.5 step 7).
const RESTRICTED_LABEL: &str = "restricted";
/// Resource labels that require a matching purpose tag or fall back to
/// `require_approval` (§4.5 step 7).
const SENSITIVE_LABELS: [&str; 2] = ["confidential", "sensitive_pii"];

/// The calling identity and request-scoped context shared by every
/// entrypoint.
#[derive(Debug, Clone)]
pub struct GateSubject {
    /// Tenancy boundary.
    pub workspace_id: WorkspaceId,
    /// Kind of actor making the request.
    pub actor_type: ActorType,
    /// Legacy actor id.
    pub actor_id: ActorId,
    /// Resolved principal, when known.
    pub principal_id: Option<PrincipalId>,
    /// Capability token presented with the request, if any.
    pub capability_token_id: Option<TokenId>,
    /// Risk tier the envelope was tagged with.
    pub zone: Zone,
    /// Room the request is scoped to, if any.
    pub room_id: Option<RoomId>,
    /// The event that caused this decision to be evaluated, used to derive
    /// the idempotency key on any `policy.denied` / `policy.requires_approval`
    /// side effect (§4.5 "Side effects on negative decisions").
    pub causation_event_id: Option<EventId>,
}

struct Evaluation<'a> {
    subject: &'a GateSubject,
    category: Category,
    action_type: String,
    tool_name: Option<&'a str>,
    resource_label: Option<&'a str>,
    data_mode: Option<DataMode>,
    purpose_tag: Option<&'a str>,
    domain: Option<&'a str>,
}

/// Evaluates a generic registered action (§4.5 `authorize_action`).
///
/// # Errors
///
/// Returns [`PolicyError`] on storage failure.
pub async fn authorize_action(
    pool: &PgPool,
    writer: &EventWriter,
    config: &Config,
    sink: &dyn PolicyFailureSink,
    subject: &GateSubject,
    action_type: &str,
) -> Result<Decision, PolicyError> {
    evaluate(
        pool,
        writer,
        config,
        sink,
        Evaluation {
            subject,
            category: Category::Action,
            action_type: action_type.to_string(),
            tool_name: None,
            resource_label: None,
            data_mode: None,
            purpose_tag: None,
            domain: None,
        },
    )
    .await
}

/// Evaluates a tool invocation (§4.5 `authorize_tool_call`).
///
/// # Errors
///
/// Returns [`PolicyError`] on storage failure.
pub async fn authorize_tool_call(
    pool: &PgPool,
    writer: &EventWriter,
    config: &Config,
    sink: &dyn PolicyFailureSink,
    subject: &GateSubject,
    tool_name: &str,
) -> Result<Decision, PolicyError> {
    evaluate(
        pool,
        writer,
        config,
        sink,
        Evaluation {
            subject,
            category: Category::ToolCall,
            action_type: tool_name.to_string(),
            tool_name: Some(tool_name),
            resource_label: None,
            data_mode: None,
            purpose_tag: None,
            domain: None,
        },
    )
    .await
}

/// Evaluates a data read or write (§4.5 `authorize_data_access`).
///
/// # Errors
///
/// Returns [`PolicyError`] on storage failure.
pub async fn authorize_data_access(
    pool: &PgPool,
    writer: &EventWriter,
    config: &Config,
    sink: &dyn PolicyFailureSink,
    subject: &GateSubject,
    resource_label: &str,
    mode: DataMode,
    purpose_tag: Option<&str>,
) -> Result<Decision, PolicyError> {
    let action_type = match mode {
        DataMode::Read => "data.read",
        DataMode::Write => "data.write",
    };
    evaluate(
        pool,
        writer,
        config,
        sink,
        Evaluation {
            subject,
            category: Category::DataAccess,
            action_type: action_type.to_string(),
            tool_name: None,
            resource_label: Some(resource_label),
            data_mode: Some(mode),
            purpose_tag,
            domain: None,
        },
    )
    .await
}

/// Evaluates an outbound network request (§4.5 `authorize_egress`).
///
/// # Errors
///
/// Returns [`PolicyError`] on storage failure.
pub async fn authorize_egress(
    pool: &PgPool,
    writer: &EventWriter,
    config: &Config,
    sink: &dyn PolicyFailureSink,
    subject: &GateSubject,
    domain: &str,
) -> Result<Decision, PolicyError> {
    evaluate(
        pool,
        writer,
        config,
        sink,
        Evaluation {
            subject,
            category: Category::Egress,
            action_type: "external.write".to_string(),
            tool_name: None,
            resource_label: None,
            data_mode: None,
            purpose_tag: None,
            domain: Some(domain),
        },
    )
    .await
}

async fn evaluate(
    pool: &PgPool,
    writer: &EventWriter,
    config: &Config,
    sink: &dyn PolicyFailureSink,
    eval: Evaluation<'_>,
) -> Result<Decision, PolicyError> {
    let mode = map_enforcement_mode(config.policy_enforcement_mode);
    let decision = evaluate_steps(pool, config, mode, &eval).await?;
    if decision.is_negative() {
        emit_negative_decision_side_effects(pool, writer, sink, &eval, &decision).await?;
    }
    Ok(decision)
}

async fn evaluate_steps(
    pool: &PgPool,
    config: &Config,
    mode: EnforcementMode,
    eval: &Evaluation<'_>,
) -> Result<Decision, PolicyError> {
    let subject = eval.subject;
    let is_external_write = eval.action_type == "external.write";

    // 1. Kill switch.
    if config.external_write_kill_switch && is_external_write {
        return Ok(Decision::deny(ReasonCode::ExternalWriteKillSwitch, mode));
    }

    // 2. Agent principal binding.
    if let Some(reason) =
        principal::validate_agent_binding(pool, subject.actor_type, &subject.actor_id, subject.principal_id)
            .await?
    {
        return Ok(Decision::deny(reason, mode));
    }

    // 3. Agent quarantine (egress only).
    if eval.category == Category::Egress {
        if let Some(principal_id) = subject.principal_id {
            if acp_store::is_principal_quarantined(pool, principal_id).await? {
                return Ok(Decision::deny(ReasonCode::AgentQuarantined, mode));
            }
        }
    }

    // 4. Capability token scope check.
    if let Some(token_id) = subject.capability_token_id {
        let principal_id = subject.principal_id.unwrap_or_else(PrincipalId::new);
        if let Some(reason) = capabilities::validate(pool, token_id, principal_id).await? {
            return Ok(Decision::deny(reason, mode));
        }
        let token = capabilities::get_token(pool, token_id)
            .await?
            .ok_or_else(|| PolicyError::TokenNotFound(token_id.to_string()))?;
        if let Some(reason) = check_capability_scope(eval, &token.scopes) {
            return Ok(Decision::deny(reason, mode));
        }
    }

    // 5. Action registry: zone enforcement and post-review tagging.
    let registry_entry = acp_store::get_action_registry_entry(pool, &eval.action_type).await?;
    if let Some(entry) = &registry_entry {
        if let Some(zone_required) = entry.zone_required {
            if zone_required != subject.zone {
                return Ok(Decision::deny(ReasonCode::ZoneMismatch, mode));
            }
        }
    }
    let post_review_required = registry_entry.as_ref().is_some_and(|entry| entry.post_review_required);

    // 6. Quota (egress only).
    if eval.category == Category::Egress {
        if let Some(principal_id) = subject.principal_id {
            let since = Utc::now() - Duration::hours(1);
            let count = acp_store::count_egress_requests_since(pool, principal_id, since).await?;
            if count >= i64::from(config.egress_max_requests_per_hour) {
                return Ok(Decision::deny(ReasonCode::QuotaExceeded, mode));
            }
        }
    }

    // 7. Data-access rules.
    if eval.category == Category::DataAccess {
        if let Some(decision) = evaluate_data_access_rules(eval, mode) {
            return Ok(decision);
        }
    }

    // 8. Approval check.
    let requires_pre_approval = is_external_write || registry_entry.is_some_and(|entry| entry.requires_pre_approval);
    if requires_pre_approval {
        let matching =
            approvals::find_matching(pool, &subject.workspace_id, &eval.action_type, subject.room_id).await?;
        let decision = match matching {
            Some(approval) => Decision::allow_with_approval(approval.approval_id),
            None => Decision::require_approval(ReasonCode::ApprovalRequired),
        };
        return Ok(attach_post_review_context(decision, post_review_required));
    }

    // 9. Default allow.
    Ok(attach_post_review_context(Decision::allow(ReasonCode::Allowed), post_review_required))
}

/// Flags `post_review_required` on the decision context so downstream
/// consumers (audit trail, growth layer) can schedule the review without
/// a second registry lookup.
fn attach_post_review_context(decision: Decision, post_review_required: bool) -> Decision {
    if post_review_required {
        decision.with_context(json!({ "post_review_required": true }))
    } else {
        decision
    }
}

fn check_capability_scope(eval: &Evaluation<'_>, scopes: &acp_core::CapabilityScopes) -> Option<ReasonCode> {
    match eval.category {
        Category::Action => (!scopes.action_types.permits(&eval.action_type)).then_some(ReasonCode::EngineActionNotAllowed),
        Category::ToolCall => {
            let tool_name = eval.tool_name.unwrap_or_default();
            (!scopes.tools.permits(tool_name)).then_some(ReasonCode::CapabilityScopeMissing)
        }
        Category::DataAccess => {
            let label = eval.resource_label.unwrap_or_default();
            let axis = match eval.data_mode {
                Some(DataMode::Write) => &scopes.data_access.write,
                _ => &scopes.data_access.read,
            };
            (!axis.permits(label)).then_some(ReasonCode::DataAccessDenied)
        }
        Category::Egress => {
            if !scopes.action_types.permits("external.write") {
                return Some(ReasonCode::EngineActionNotAllowed);
            }
            let domain = eval.domain.unwrap_or_default();
            if !scopes.egress_domains.permits(domain) {
                return Some(ReasonCode::CapabilityScopeMissing);
            }
            if let Some(room_id) = eval.subject.room_id {
                if !scopes.rooms.permits(&room_id.to_string()) {
                    return Some(ReasonCode::EngineRoomNotAllowed);
                }
            }
            None
        }
    }
}

fn evaluate_data_access_rules(eval: &Evaluation<'_>, mode: EnforcementMode) -> Option<Decision> {
    let label = eval.resource_label.unwrap_or_default();
    if label == RESTRICTED_LABEL && eval.subject.room_id.is_none() {
        return Some(Decision::deny(ReasonCode::EngineRoomScopeRequired, mode));
    }
    if SENSITIVE_LABELS.contains(&label) && eval.purpose_tag.is_none() {
        return Some(Decision::require_approval(ReasonCode::DataAccessPurposeHintMismatch));
    }
    None
}

fn map_enforcement_mode(mode: acp_config::EnforcementMode) -> EnforcementMode {
    match mode {
        acp_config::EnforcementMode::Shadow => EnforcementMode::Shadow,
        acp_config::EnforcementMode::Enforce => EnforcementMode::Enforce,
    }
}

async fn emit_negative_decision_side_effects(
    pool: &PgPool,
    writer: &EventWriter,
    sink: &dyn PolicyFailureSink,
    eval: &Evaluation<'_>,
    decision: &Decision,
) -> Result<(), PolicyError> {
    let subject = eval.subject;
    let event_type = match decision.decision {
        acp_core::DecisionKind::Deny => "policy.denied",
        acp_core::DecisionKind::RequireApproval => "policy.requires_approval",
        acp_core::DecisionKind::Allow => return Ok(()),
    };

    let idempotency_key = subject
        .causation_event_id
        .map(|event_id| acp_core::IdempotencyKey::new(format!("{}{event_id}", acp_store::POLICY_IDEMPOTENCY_PREFIX)));

    let envelope = EventEnvelope {
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
        stream: subject.room_id.map_or_else(
            || acp_core::StreamRef::workspace(&subject.workspace_id),
            acp_core::StreamRef::room,
        ),
        data: json!({
            "actor_principal_id": subject.principal_id,
            "reason_code": decision.reason_code,
            "action": eval.action_type,
            "blocked": decision.blocked,
        }),
        policy_context: decision.context.clone(),
        model_context: None,
        display: None,
        correlation_id: acp_core::CorrelationId::new(format!("policy:{}:{}", subject.workspace_id, eval.action_type)),
        causation_id: subject.causation_event_id,
        idempotency_key,
    };
    writer.append_to_stream(pool, envelope).await?;

    sink.record_failure_from_policy(pool, subject.principal_id, decision, &eval.action_type).await?;
    Ok(())
}

/// Decouples the gate from the Growth layer's failure-accounting logic
/// (constraints, mistake counters, auto-quarantine), which lives in a
/// crate built after `acp-policy`.
#[async_trait::async_trait]
pub trait PolicyFailureSink: Send + Sync {
    /// Records the side effects of a negative decision (§4.5 "Side
    /// effects on negative decisions").
    async fn record_failure_from_policy(
        &self,
        pool: &PgPool,
        principal_id: Option<PrincipalId>,
        decision: &Decision,
        action: &str,
    ) -> Result<(), PolicyError>;
}

/// A sink that records nothing, for tests and for binaries that have not
/// wired in the Growth layer yet.
pub struct NoopPolicyFailureSink;

#[async_trait::async_trait]
impl PolicyFailureSink for NoopPolicyFailureSink {
    async fn record_failure_from_policy(
        &self,
        _pool: &PgPool,
        _principal_id: Option<PrincipalId>,
        _decision: &Decision,
        _action: &str,
    ) -> Result<(), PolicyError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use acp_core::CapabilityScopes;
    use acp_core::DataAccessScope;
    use acp_core::ScopeAxis;

    use super::*;

    fn subject() -> GateSubject {
        GateSubject {
            workspace_id: WorkspaceId::new("ws-1"),
            actor_type: ActorType::Agent,
            actor_id: ActorId::new("agent-1"),
            principal_id: Some(PrincipalId::new()),
            capability_token_id: None,
            zone: Zone::Supervised,
            room_id: None,
            causation_event_id: None,
        }
    }

    fn eval_with<'a>(category: Category, action_type: &str, subject: &'a GateSubject) -> Evaluation<'a> {
        Evaluation {
            subject,
            category,
            action_type: action_type.to_string(),
            tool_name: None,
            resource_label: None,
            data_mode: None,
            purpose_tag: None,
            domain: None,
        }
    }

    #[test]
    fn shadow_mode_maps_to_core_shadow() {
        assert_eq!(map_enforcement_mode(acp_config::EnforcementMode::Shadow), EnforcementMode::Shadow);
        assert_eq!(map_enforcement_mode(acp_config::EnforcementMode::Enforce), EnforcementMode::Enforce);
    }

    #[test]
    fn tool_call_scope_denies_unlisted_tool() {
        let subject = subject();
        let eval = Evaluation {
            tool_name: Some("delete_file"),
            ..eval_with(Category::ToolCall, "delete_file", &subject)
        };
        let scopes = CapabilityScopes {
            tools: ScopeAxis::values(["search"]),
            ..CapabilityScopes::unrestricted()
        };
        assert_eq!(check_capability_scope(&eval, &scopes), Some(ReasonCode::CapabilityScopeMissing));
    }

    #[test]
    fn tool_call_scope_allows_listed_tool() {
        let subject = subject();
        let eval = Evaluation {
            tool_name: Some("search"),
            ..eval_with(Category::ToolCall, "search", &subject)
        };
        let scopes = CapabilityScopes {
            tools: ScopeAxis::values(["search"]),
            ..CapabilityScopes::unrestricted()
        };
        assert_eq!(check_capability_scope(&eval, &scopes), None);
    }

    #[test]
    fn egress_scope_requires_domain_and_room() {
        let mut subject = subject();
        subject.room_id = Some(RoomId::new());
        let eval = Evaluation {
            domain: Some("evil.example"),
            ..eval_with(Category::Egress, "external.write", &subject)
        };
        let scopes = CapabilityScopes {
            egress_domains: ScopeAxis::values(["good.example"]),
            rooms: ScopeAxis::none(),
            ..CapabilityScopes::unrestricted()
        };
        assert_eq!(check_capability_scope(&eval, &scopes), Some(ReasonCode::CapabilityScopeMissing));
    }

    #[test]
    fn data_access_scope_checks_read_vs_write_axis() {
        let subject = subject();
        let eval = Evaluation {
            resource_label: Some("billing"),
            data_mode: Some(DataMode::Write),
            ..eval_with(Category::DataAccess, "data.write", &subject)
        };
        let scopes = CapabilityScopes {
            data_access: DataAccessScope {
                read: ScopeAxis::wildcard(),
                write: ScopeAxis::none(),
            },
            ..CapabilityScopes::unrestricted()
        };
        assert_eq!(check_capability_scope(&eval, &scopes), Some(ReasonCode::DataAccessDenied));
    }

    #[test]
    fn restricted_label_without_room_requires_room_scope() {
        let subject = subject();
        let eval = Evaluation {
            resource_label: Some(RESTRICTED_LABEL),
            ..eval_with(Category::DataAccess, "data.read", &subject)
        };
        let decision = evaluate_data_access_rules(&eval, EnforcementMode::Enforce).expect("denial");
        assert_eq!(decision.reason_code, ReasonCode::EngineRoomScopeRequired);
        assert!(decision.blocked);
    }

    #[test]
    fn sensitive_label_without_purpose_tag_requires_approval() {
        let subject = subject();
        let eval = Evaluation {
            resource_label: Some("confidential"),
            ..eval_with(Category::DataAccess, "data.read", &subject)
        };
        let decision = evaluate_data_access_rules(&eval, EnforcementMode::Enforce).expect("requires approval");
        assert_eq!(decision.decision, acp_core::DecisionKind::RequireApproval);
        assert!(!decision.blocked);
    }

    #[test]
    fn sensitive_label_with_purpose_tag_passes() {
        let subject = subject();
        let eval = Evaluation {
            resource_label: Some("confidential"),
            purpose_tag: Some("incident-review"),
            ..eval_with(Category::DataAccess, "data.read", &subject)
        };
        assert!(evaluate_data_access_rules(&eval, EnforcementMode::Enforce).is_none());
    }
}
