// acp-worker/src/input.rs
// ============================================================================
// Module: Run Input Directives
// Description: Parses the `runtime.egress.target_url` and
//              `runtime.policy.{principal_id,capability_token_id,zone}`
//              directives a run's queued input may carry (§4.11 step 2).
// Purpose: Give the worker loop one place that knows the run-input shape,
//          rather than scattering `input["runtime"]["..."]` lookups.
// Dependencies: acp-core, serde_json, crate::error
// ============================================================================

use acp_core::PrincipalId;
use acp_core::TokenId;
use acp_core::Zone;
use serde_json::Value;
use uuid::Uuid;

use crate::error::WorkerError;

/// The `runtime.policy.*` identity a run asks the worker to act under.
/// Absent fields fall back to the worker's own service identity.
#[derive(Debug, Clone, Default)]
pub struct RuntimePolicy {
    /// `runtime.policy.principal_id`, when present.
    pub principal_id: Option<PrincipalId>,
    /// `runtime.policy.capability_token_id`, when present.
    pub capability_token_id: Option<TokenId>,
    /// `runtime.policy.zone`, defaulting to [`Zone::Supervised`].
    pub zone: Zone,
}

/// The directives extracted from one run's `input` payload.
#[derive(Debug, Clone, Default)]
pub struct RuntimeDirectives {
    /// `runtime.egress.target_url`, when the run wants the worker to
    /// broker an outbound request as part of driving it.
    pub egress_target_url: Option<String>,
    /// `runtime.policy.*`.
    pub policy: RuntimePolicy,
}

/// Extracts worker-relevant directives from a run's `input` JSON.
///
/// # Errors
///
/// Returns [`WorkerError::MalformedPolicyField`] when
/// `runtime.policy.principal_id` or `runtime.policy.capability_token_id`
/// is present but not a valid UUID.
pub fn parse(input: &Value) -> Result<RuntimeDirectives, WorkerError> {
    let Some(runtime) = input.get("runtime") else {
        return Ok(RuntimeDirectives::default());
    };

    let egress_target_url = runtime
        .get("egress")
        .and_then(|egress| egress.get("target_url"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let policy = match runtime.get("policy") {
        Some(policy) => RuntimePolicy {
            principal_id: parse_uuid_field(policy, "principal_id")?.map(PrincipalId::from_uuid),
            capability_token_id: parse_uuid_field(policy, "capability_token_id")?.map(TokenId::from_uuid),
            zone: policy
                .get("zone")
                .cloned()
                .map(serde_json::from_value)
                .transpose()
                .map_err(|_| WorkerError::MalformedPolicyField {
                    field: "zone",
                    value: policy.get("zone").map_or_else(String::new, Value::to_string),
                })?
                .unwrap_or_default(),
        },
        None => RuntimePolicy::default(),
    };

    Ok(RuntimeDirectives { egress_target_url, policy })
}

fn parse_uuid_field(object: &Value, field: &'static str) -> Result<Option<Uuid>, WorkerError> {
    let Some(raw) = object.get(field).and_then(Value::as_str) else {
        return Ok(None);
    };
    Uuid::parse_str(raw)
        .map(Some)
        .map_err(|_| WorkerError::MalformedPolicyField { field, value: raw.to_string() })
}

#[cfg(test)]
mod tests {
    use super::parse;
    use serde_json::json;

    #[test]
    fn empty_input_yields_defaults() {
        let directives = parse(&json!({})).unwrap();
        assert!(directives.egress_target_url.is_none());
        assert!(directives.policy.principal_id.is_none());
    }

    #[test]
    fn extracts_egress_and_policy_fields() {
        let principal_id = uuid::Uuid::new_v4();
        let input = json!({
            "runtime": {
                "egress": { "target_url": "https://example.com/webhook" },
                "policy": { "principal_id": principal_id, "zone": "high_stakes" },
            }
        });
        let directives = parse(&input).unwrap();
        assert_eq!(directives.egress_target_url.as_deref(), Some("https://example.com/webhook"));
        assert_eq!(directives.policy.principal_id.unwrap().as_uuid(), principal_id);
        assert_eq!(directives.policy.zone, acp_core::Zone::HighStakes);
    }

    #[test]
    fn rejects_a_malformed_principal_id() {
        let input = json!({ "runtime": { "policy": { "principal_id": "not-a-uuid" } } });
        assert!(parse(&input).is_err());
    }
}
