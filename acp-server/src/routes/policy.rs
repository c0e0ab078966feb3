// acp-server/src/routes/policy.rs
// ============================================================================
// Module: Policy Evaluation Route
// Description: `POST /policy/evaluate`, dispatching to
//              `authorize_{action,tool_call,data_access,egress}` by
//              request `category` (§4.5, §6).
// ============================================================================

use acp_growth::GrowthPolicyFailureSink;
use acp_policy::GateSubject;
use acp_policy::gate::DataMode;
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::post;
use serde::Deserialize;
use serde_json::Value;

use crate::auth::RequestContext;
use crate::error::ApiError;
use crate::error::ApiResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/policy/evaluate", post(evaluate))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Category {
    Action,
    ToolCall,
    DataAccess,
    Egress,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Mode {
    Read,
    Write,
}

#[derive(Debug, Deserialize)]
struct EvaluateRequest {
    category: Category,
    action: String,
    mode: Option<Mode>,
    purpose_tag: Option<String>,
    domain: Option<String>,
}

async fn evaluate(State(state): State<AppState>, ctx: RequestContext, Json(body): Json<EvaluateRequest>) -> ApiResult<Json<Value>> {
    let subject = GateSubject {
        workspace_id: ctx.workspace_id.clone(),
        actor_type: ctx.actor_type,
        actor_id: ctx.actor_id.clone(),
        principal_id: ctx.principal_id,
        capability_token_id: ctx.capability_token_id,
        zone: ctx.zone,
        room_id: ctx.room_id,
        causation_event_id: None,
    };
    let sink = GrowthPolicyFailureSink::new(ctx.workspace_id.clone(), state.writer.clone());

    let decision = match body.category {
        Category::Action => {
            acp_policy::gate::authorize_action(&state.pool, &state.writer, &state.config, &sink, &subject, &body.action).await?
        }
        Category::ToolCall => {
            acp_policy::gate::authorize_tool_call(&state.pool, &state.writer, &state.config, &sink, &subject, &body.action).await?
        }
        Category::DataAccess => {
            let mode = match body.mode {
                Some(Mode::Read) => DataMode::Read,
                Some(Mode::Write) => DataMode::Write,
                None => return Err(ApiError::InvalidRequest("data_access evaluation requires mode".to_string())),
            };
            acp_policy::gate::authorize_data_access(
                &state.pool,
                &state.writer,
                &state.config,
                &sink,
                &subject,
                &body.action,
                mode,
                body.purpose_tag.as_deref(),
            )
            .await?
        }
        Category::Egress => {
            let domain = body
                .domain
                .as_deref()
                .ok_or_else(|| ApiError::InvalidRequest("egress evaluation requires domain".to_string()))?;
            acp_policy::gate::authorize_egress(&state.pool, &state.writer, &state.config, &sink, &subject, domain).await?
        }
    };

    Ok(Json(serde_json::json!({
        "decision": decision.decision,
        "reason_code": decision.reason_code,
        "blocked": decision.blocked,
        "approval_id": decision.approval_id,
        "context": decision.context,
    })))
}
