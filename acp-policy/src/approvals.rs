// acp-policy/src/approvals.rs
// ============================================================================
// Module: Approval Substrate
// Description: Request/decide operations over human-in-the-loop approvals,
//              and the scope-containment match the Policy Gate uses (§4.6).
// Purpose: The gate's "is there an approved approval covering this action"
//          check and the HTTP approval-decision endpoints share this code.
// Dependencies: acp-core, acp-store
// ============================================================================

use acp_core::ActorId;
use acp_core::ActorType;
use acp_core::ApprovalId;
use acp_core::CorrelationId;
use acp_core::EventEnvelope;
use acp_core::PrincipalId;
use acp_core::RoomId;
use acp_core::StreamRef;
use acp_core::WorkspaceId;
use acp_core::Zone;
use acp_store::EventWriter;
use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use sqlx::PgPool;
use sqlx::Row;
use uuid::Uuid;

use crate::error::PolicyError;

/// Which boundary an approval covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeType {
    /// Covers a single room.
    Room,
    /// Covers the whole workspace.
    Workspace,
}

/// The matching criteria an approval is granted against (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalScope {
    /// Room or workspace boundary.
    pub scope_type: ScopeType,
    /// Required when `scope_type=room`.
    pub room_id: Option<RoomId>,
    /// The action this approval covers, e.g. `"external.write"`.
    pub action: String,
}

impl ApprovalScope {
    /// Whether this scope covers a request for `action` scoped to
    /// `room_id` (§4.6 "scope containment").
    #[must_use]
    pub fn covers(&self, action: &str, room_id: Option<RoomId>) -> bool {
        if self.action != action {
            return false;
        }
        match self.scope_type {
            ScopeType::Workspace => true,
            ScopeType::Room => self.room_id.is_some() && self.room_id == room_id,
        }
    }
}

/// Outcome of a [`decide`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecisionKind {
    /// Approval granted.
    Approve,
    /// Approval denied.
    Deny,
    /// Decision deferred; stays visible as pending work.
    Hold,
}

impl ApprovalDecisionKind {
    const fn event_type(self) -> &'static str {
        match self {
            Self::Approve => "approval.granted",
            Self::Deny => "approval.denied",
            Self::Hold => "approval.held",
        }
    }

    const fn status(self) -> &'static str {
        match self {
            Self::Approve => "granted",
            Self::Deny => "denied",
            Self::Hold => "held",
        }
    }
}

/// An approval row, as read back from `proj_approvals`.
#[derive(Debug, Clone)]
pub struct ApprovalRow {
    /// The approval's identifier.
    pub approval_id: ApprovalId,
    /// Tenancy boundary.
    pub workspace_id: WorkspaceId,
    /// `pending | granted | denied | held | expired`.
    pub status: String,
    /// Matching criteria.
    pub scope: ApprovalScope,
    /// The action payload under review.
    pub target_action: Value,
    /// Expiry, if any.
    pub expires_at: Option<DateTime<Utc>>,
    /// Correlation id shared with the requesting event.
    pub correlation_id: String,
    /// Id of the `approval.requested` event, used as `causation_id` on the
    /// decision event.
    pub last_event_id: Option<Uuid>,
}

impl ApprovalRow {
    /// True when granted and not past `expires_at`.
    #[must_use]
    pub fn is_active_grant(&self, now: DateTime<Utc>) -> bool {
        self.status == "granted" && self.expires_at.is_none_or(|expiry| expiry > now)
    }
}

/// Parameters for [`request`].
#[derive(Debug, Clone)]
pub struct RequestApproval {
    /// Tenancy boundary.
    pub workspace_id: WorkspaceId,
    /// Matching criteria for the gate's approval check.
    pub scope: ApprovalScope,
    /// Free-form description of the action under review.
    pub target_action: Value,
    /// Optional time-to-live; sets `expires_at = now() + ttl`.
    pub ttl_seconds: Option<i64>,
    /// Optional caller-supplied context.
    pub request_payload: Option<Value>,
    /// Actor recorded on the emitted event.
    pub actor_id: ActorId,
    /// Resolved principal, when known.
    pub actor_principal_id: Option<PrincipalId>,
}

/// Requests a new approval, appending `approval.requested` (§4.6).
///
/// # Errors
///
/// Returns [`PolicyError::ApprovalScopeInvalid`] when `scope_type=room`
/// without a `room_id`, or a storage error.
pub async fn request(
    pool: &PgPool,
    writer: &EventWriter,
    req: RequestApproval,
) -> Result<ApprovalRow, PolicyError> {
    if req.scope.scope_type == ScopeType::Room && req.scope.room_id.is_none() {
        return Err(PolicyError::ApprovalScopeInvalid(
            "room-scoped approval requires room_id".to_string(),
        ));
    }

    let approval_id = ApprovalId::new();
    let expires_at = req.ttl_seconds.map(|ttl| Utc::now() + Duration::seconds(ttl));
    let stream = match (req.scope.scope_type, req.scope.room_id) {
        (ScopeType::Room, Some(room_id)) => StreamRef::room(room_id),
        _ => StreamRef::workspace(&req.workspace_id),
    };

    let envelope = EventEnvelope {
        event_type: "approval.requested".to_string(),
        event_version: 1,
        occurred_at: Utc::now(),
        workspace_id: req.workspace_id.clone(),
        mission_id: None,
        room_id: req.scope.room_id,
        thread_id: None,
        run_id: None,
        step_id: None,
        actor_type: ActorType::Service,
        actor_id: req.actor_id.clone(),
        actor_principal_id: req.actor_principal_id,
        zone: Zone::Supervised,
        stream,
        data: json!({
            "approval_id": approval_id,
            "scope": req.scope,
            "ttl_seconds": req.ttl_seconds,
            "target_action": req.target_action,
            "request_payload": req.request_payload,
            "expires_at": expires_at,
        }),
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(format!("approval:{}:{approval_id}", req.workspace_id)),
        causation_id: None,
        idempotency_key: None,
    };
    writer.append_to_stream(pool, envelope).await?;

    Ok(ApprovalRow {
        approval_id,
        workspace_id: req.workspace_id,
        status: "pending".to_string(),
        scope: req.scope,
        target_action: req.target_action,
        expires_at,
        correlation_id: String::new(),
        last_event_id: None,
    })
}

/// Decides a pending approval, appending `approval.granted` /
/// `approval.denied` / `approval.held` with `causation_id` pointing back
/// at the request event (§4.6).
///
/// # Errors
///
/// Returns [`PolicyError::ApprovalNotFound`] if the approval does not
/// exist, [`PolicyError::ApprovalNotPending`] if it was already decided,
/// or a storage error.
pub async fn decide(
    pool: &PgPool,
    writer: &EventWriter,
    approval_id: ApprovalId,
    decision: ApprovalDecisionKind,
    reason: Option<String>,
    actor_id: &ActorId,
) -> Result<(), PolicyError> {
    let approval = get(pool, approval_id)
        .await?
        .ok_or_else(|| PolicyError::ApprovalNotFound(approval_id.to_string()))?;
    if approval.status != "pending" && approval.status != "held" {
        return Err(PolicyError::ApprovalNotPending(approval_id.to_string()));
    }

    let stream = match (approval.scope.scope_type, approval.scope.room_id) {
        (ScopeType::Room, Some(room_id)) => StreamRef::room(room_id),
        _ => StreamRef::workspace(&approval.workspace_id),
    };

    let envelope = EventEnvelope {
        event_type: decision.event_type().to_string(),
        event_version: 1,
        occurred_at: Utc::now(),
        workspace_id: approval.workspace_id.clone(),
        mission_id: None,
        room_id: approval.scope.room_id,
        thread_id: None,
        run_id: None,
        step_id: None,
        actor_type: ActorType::Service,
        actor_id: actor_id.clone(),
        actor_principal_id: None,
        zone: Zone::Supervised,
        stream,
        data: json!({
            "approval_id": approval_id,
            "decision_payload": { "status": decision.status(), "reason": reason },
        }),
        policy_context: None,
        model_context: None,
        display: None,
        correlation_id: CorrelationId::new(approval.correlation_id.clone()),
        causation_id: approval.last_event_id.map(acp_core::EventId::from_uuid),
        idempotency_key: None,
    };
    writer.append_to_stream(pool, envelope).await?;
    Ok(())
}

/// Reads one approval by id.
///
/// # Errors
///
/// Returns [`PolicyError::Store`] on database failure.
pub async fn get(pool: &PgPool, approval_id: ApprovalId) -> Result<Option<ApprovalRow>, PolicyError> {
    let row = sqlx::query(
        "SELECT approval_id, workspace_id, status, scope, target_action, expires_at, \
         correlation_id, last_event_id FROM proj_approvals WHERE approval_id = $1",
    )
    .bind(approval_id.to_string())
    .fetch_optional(pool)
    .await
    .map_err(acp_store::StoreError::from)?;
    row.map(row_to_approval).transpose()
}

/// Lists approvals in a workspace, optionally filtered by status, most
/// recently updated first.
///
/// # Errors
///
/// Returns [`PolicyError::Store`] on database failure.
pub async fn list(
    pool: &PgPool,
    workspace_id: &WorkspaceId,
    status: Option<&str>,
    limit: i64,
) -> Result<Vec<ApprovalRow>, PolicyError> {
    let rows = sqlx::query(
        "SELECT approval_id, workspace_id, status, scope, target_action, expires_at, \
         correlation_id, last_event_id FROM proj_approvals WHERE workspace_id = $1 AND \
         ($2::text IS NULL OR status = $2) ORDER BY updated_at DESC LIMIT $3",
    )
    .bind(workspace_id.as_str())
    .bind(status)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(acp_store::StoreError::from)?;
    rows.into_iter().map(row_to_approval).collect()
}

/// Finds a granted, unexpired approval covering `action` (and `room_id`
/// when the scope is room-bound) in `workspace_id` (§4.5, step 8).
///
/// # Errors
///
/// Returns [`PolicyError::Store`] on database failure.
pub async fn find_matching(
    pool: &PgPool,
    workspace_id: &WorkspaceId,
    action: &str,
    room_id: Option<RoomId>,
) -> Result<Option<ApprovalRow>, PolicyError> {
    let rows = sqlx::query(
        "SELECT approval_id, workspace_id, status, scope, target_action, expires_at, \
         correlation_id, last_event_id FROM proj_approvals WHERE workspace_id = $1 AND status = \
         'granted' ORDER BY updated_at DESC",
    )
    .bind(workspace_id.as_str())
    .fetch_all(pool)
    .await
    .map_err(acp_store::StoreError::from)?;

    let now = Utc::now();
    for row in rows {
        let approval = row_to_approval(row)?;
        if approval.is_active_grant(now) && approval.scope.covers(action, room_id) {
            return Ok(Some(approval));
        }
    }
    Ok(None)
}

fn row_to_approval(row: sqlx::postgres::PgRow) -> Result<ApprovalRow, PolicyError> {
    let approval_id_raw: String = row.try_get("approval_id").map_err(acp_store::StoreError::from)?;
    let scope: Value = row.try_get("scope").map_err(acp_store::StoreError::from)?;

    Ok(ApprovalRow {
        approval_id: ApprovalId::from_uuid(
            Uuid::parse_str(&approval_id_raw).unwrap_or_else(|_| Uuid::new_v4()),
        ),
        workspace_id: WorkspaceId::new(
            row.try_get::<String, _>("workspace_id").map_err(acp_store::StoreError::from)?,
        ),
        status: row.try_get("status").map_err(acp_store::StoreError::from)?,
        scope: serde_json::from_value(scope)
            .map_err(|err| acp_store::StoreError::NotFound(format!("malformed approval scope: {err}")))?,
        target_action: row.try_get("target_action").map_err(acp_store::StoreError::from)?,
        expires_at: row.try_get("expires_at").map_err(acp_store::StoreError::from)?,
        correlation_id: row.try_get("correlation_id").map_err(acp_store::StoreError::from)?,
        last_event_id: row.try_get("last_event_id").map_err(acp_store::StoreError::from)?,
    })
}
