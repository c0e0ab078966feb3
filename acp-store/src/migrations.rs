// acp-store/src/migrations.rs
// ============================================================================
// Module: Schema Migrations
// Description: Idempotent `CREATE TABLE IF NOT EXISTS` schema for the event
//              log, stream heads, projections, and growth-layer tables.
// Purpose: One place to stand up (or verify) the full schema before the
//          server or worker accepts traffic.
// Dependencies: sqlx
// ============================================================================

use sqlx::PgPool;

use crate::error::StoreError;

/// Runs every migration statement. Safe to call on every process start;
/// every statement is `IF NOT EXISTS`.
///
/// # Errors
///
/// Returns [`StoreError`] if any DDL statement fails.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await.map_err(StoreError::from)?;
    }
    Ok(())
}

/// Ordered DDL statements. Later statements may reference earlier tables.
const STATEMENTS: &[&str] = &[
    // -- Event log -----------------------------------------------------
    r"
    CREATE TABLE IF NOT EXISTS evt_stream_heads (
        stream_type TEXT NOT NULL,
        stream_id TEXT NOT NULL,
        next_seq BIGINT NOT NULL DEFAULT 1,
        PRIMARY KEY (stream_type, stream_id)
    )",
    r"
    CREATE TABLE IF NOT EXISTS evt_events (
        event_id UUID PRIMARY KEY,
        event_type TEXT NOT NULL,
        event_version INT NOT NULL DEFAULT 1,
        occurred_at TIMESTAMPTZ NOT NULL,
        recorded_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        workspace_id TEXT NOT NULL,
        mission_id TEXT,
        room_id TEXT,
        thread_id TEXT,
        run_id TEXT,
        step_id TEXT,
        actor_type TEXT NOT NULL,
        actor_id TEXT NOT NULL,
        actor_principal_id TEXT,
        zone TEXT NOT NULL DEFAULT 'supervised',
        stream_type TEXT NOT NULL,
        stream_id TEXT NOT NULL,
        stream_seq BIGINT NOT NULL,
        redaction_level TEXT NOT NULL DEFAULT 'none',
        contains_secrets BOOLEAN NOT NULL DEFAULT false,
        data JSONB NOT NULL,
        policy_context JSONB,
        model_context JSONB,
        display JSONB,
        correlation_id TEXT NOT NULL,
        causation_id UUID,
        idempotency_key TEXT,
        prev_event_hash TEXT,
        event_hash TEXT NOT NULL,
        UNIQUE (stream_type, stream_id, stream_seq),
        UNIQUE (stream_type, stream_id, idempotency_key)
    )",
    "CREATE INDEX IF NOT EXISTS idx_evt_events_workspace ON evt_events (workspace_id, recorded_at)",
    "CREATE INDEX IF NOT EXISTS idx_evt_events_correlation ON evt_events (correlation_id)",
    "CREATE INDEX IF NOT EXISTS idx_evt_events_run ON evt_events (run_id) WHERE run_id IS NOT NULL",
    r"
    CREATE OR REPLACE FUNCTION evt_events_append_only() RETURNS trigger AS $$
    BEGIN
        RAISE EXCEPTION 'evt_events is append-only: % not permitted', TG_OP;
    END;
    $$ LANGUAGE plpgsql",
    r"
    DO $$
    BEGIN
        IF NOT EXISTS (
            SELECT 1 FROM pg_trigger WHERE tgname = 'evt_events_no_update_delete'
        ) THEN
            CREATE TRIGGER evt_events_no_update_delete
                BEFORE UPDATE OR DELETE ON evt_events
                FOR EACH ROW EXECUTE FUNCTION evt_events_append_only();
        END IF;
    END;
    $$",
    r"
    CREATE TABLE IF NOT EXISTS sec_redaction_log (
        id BIGSERIAL PRIMARY KEY,
        event_id UUID NOT NULL,
        rule_id TEXT NOT NULL,
        action TEXT NOT NULL,
        stream_type TEXT NOT NULL,
        stream_id TEXT NOT NULL,
        detail TEXT,
        recorded_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS idx_sec_redaction_log_event ON sec_redaction_log (event_id)",
    // -- Principals & capability tokens --------------------------------
    r"
    CREATE TABLE IF NOT EXISTS principals (
        principal_id TEXT PRIMARY KEY,
        workspace_id TEXT NOT NULL,
        principal_type TEXT NOT NULL,
        legacy_actor_type TEXT,
        legacy_actor_id TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (workspace_id, legacy_actor_type, legacy_actor_id)
    )",
    r"
    CREATE TABLE IF NOT EXISTS proj_capability_tokens (
        token_id TEXT PRIMARY KEY,
        workspace_id TEXT NOT NULL,
        issued_to_principal_id TEXT NOT NULL,
        granted_by_principal_id TEXT NOT NULL,
        parent_token_id TEXT,
        scopes JSONB NOT NULL,
        valid_until TIMESTAMPTZ,
        revoked_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        last_event_id UUID
    )",
    "CREATE INDEX IF NOT EXISTS idx_proj_capability_tokens_principal ON proj_capability_tokens (issued_to_principal_id)",
    r"
    CREATE TABLE IF NOT EXISTS proj_delegation_edges (
        id BIGSERIAL PRIMARY KEY,
        parent_token_id TEXT NOT NULL,
        child_token_id TEXT NOT NULL,
        workspace_id TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (parent_token_id, child_token_id)
    )",
    r"
    CREATE TABLE IF NOT EXISTS action_registry (
        action_type TEXT PRIMARY KEY,
        reversible BOOLEAN NOT NULL DEFAULT true,
        zone_required TEXT,
        requires_pre_approval BOOLEAN NOT NULL DEFAULT false,
        post_review_required BOOLEAN NOT NULL DEFAULT false,
        metadata JSONB NOT NULL DEFAULT '{}'::jsonb
    )",
    // -- Room / thread / message projections ---------------------------
    r"
    CREATE TABLE IF NOT EXISTS proj_rooms (
        room_id TEXT PRIMARY KEY,
        workspace_id TEXT NOT NULL,
        name TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        last_event_id UUID
    )",
    r"
    CREATE TABLE IF NOT EXISTS proj_threads (
        thread_id TEXT PRIMARY KEY,
        workspace_id TEXT NOT NULL,
        room_id TEXT,
        title TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        last_event_id UUID
    )",
    r"
    CREATE TABLE IF NOT EXISTS proj_messages (
        message_id TEXT PRIMARY KEY,
        workspace_id TEXT NOT NULL,
        thread_id TEXT,
        room_id TEXT,
        author_actor_id TEXT,
        body JSONB,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        last_event_id UUID
    )",
    // -- Run / step / tool call / artifact projections ------------------
    r"
    CREATE TABLE IF NOT EXISTS proj_runs (
        run_id TEXT PRIMARY KEY,
        workspace_id TEXT NOT NULL,
        room_id TEXT,
        status TEXT NOT NULL DEFAULT 'queued',
        correlation_id TEXT NOT NULL,
        experiment_id TEXT,
        claim_token TEXT,
        claimed_by_actor_id TEXT,
        lease_expires_at TIMESTAMPTZ,
        lease_heartbeat_at TIMESTAMPTZ,
        error JSONB,
        input JSONB,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        last_event_id UUID
    )",
    "CREATE INDEX IF NOT EXISTS idx_proj_runs_status ON proj_runs (workspace_id, status, created_at)",
    r"
    CREATE TABLE IF NOT EXISTS proj_steps (
        step_id TEXT PRIMARY KEY,
        workspace_id TEXT NOT NULL,
        run_id TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        output JSONB,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        last_event_id UUID
    )",
    "CREATE INDEX IF NOT EXISTS idx_proj_steps_run ON proj_steps (run_id)",
    r"
    CREATE TABLE IF NOT EXISTS proj_tool_calls (
        tool_call_id TEXT PRIMARY KEY,
        workspace_id TEXT NOT NULL,
        run_id TEXT,
        step_id TEXT,
        tool_name TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'invoked',
        request JSONB,
        response JSONB,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        last_event_id UUID
    )",
    "CREATE INDEX IF NOT EXISTS idx_proj_tool_calls_run ON proj_tool_calls (run_id)",
    r"
    CREATE TABLE IF NOT EXISTS proj_artifacts (
        artifact_id TEXT PRIMARY KEY,
        workspace_id TEXT NOT NULL,
        run_id TEXT,
        step_id TEXT,
        kind TEXT,
        uri TEXT,
        metadata JSONB,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        last_event_id UUID
    )",
    // -- Approvals & incidents ------------------------------------------
    r"
    CREATE TABLE IF NOT EXISTS proj_approvals (
        approval_id TEXT PRIMARY KEY,
        workspace_id TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        scope JSONB NOT NULL,
        ttl_seconds BIGINT,
        target_action JSONB NOT NULL,
        request_payload JSONB,
        decision_payload JSONB,
        correlation_id TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        expires_at TIMESTAMPTZ,
        last_event_id UUID
    )",
    "CREATE INDEX IF NOT EXISTS idx_proj_approvals_status ON proj_approvals (workspace_id, status)",
    r"
    CREATE TABLE IF NOT EXISTS proj_incidents (
        incident_id TEXT PRIMARY KEY,
        workspace_id TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'open',
        run_id TEXT,
        correlation_id TEXT,
        rca TEXT,
        learning_entries JSONB NOT NULL DEFAULT '[]'::jsonb,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        last_event_id UUID
    )",
    "CREATE INDEX IF NOT EXISTS idx_proj_incidents_run ON proj_incidents (run_id)",
    // -- Agents (lifecycle & quarantine) ---------------------------------
    r"
    CREATE TABLE IF NOT EXISTS proj_agents (
        agent_id TEXT PRIMARY KEY,
        workspace_id TEXT NOT NULL,
        principal_id TEXT,
        quarantined_at TIMESTAMPTZ,
        quarantine_reason TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        last_event_id UUID
    )",
    // -- Security: constraints, mistakes, egress -------------------------
    r"
    CREATE TABLE IF NOT EXISTS sec_constraints (
        id BIGSERIAL PRIMARY KEY,
        principal_id TEXT NOT NULL,
        category TEXT NOT NULL,
        pattern_hash TEXT NOT NULL,
        reason_code TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (principal_id, category, pattern_hash)
    )",
    r"
    CREATE TABLE IF NOT EXISTS sec_mistake_counters (
        id BIGSERIAL PRIMARY KEY,
        principal_id TEXT NOT NULL,
        category TEXT NOT NULL,
        pattern_hash TEXT NOT NULL,
        repeat_count BIGINT NOT NULL DEFAULT 1,
        first_seen_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        last_seen_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (principal_id, category, pattern_hash)
    )",
    r"
    CREATE TABLE IF NOT EXISTS sec_egress_requests (
        id BIGSERIAL PRIMARY KEY,
        workspace_id TEXT NOT NULL,
        principal_id TEXT,
        zone TEXT NOT NULL,
        domain TEXT NOT NULL,
        url TEXT,
        method TEXT,
        decision TEXT NOT NULL,
        blocked BOOLEAN NOT NULL,
        reason_code TEXT NOT NULL,
        approval_id TEXT,
        justification TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS idx_sec_egress_requests_principal ON sec_egress_requests (principal_id, created_at)",
    // -- Growth layer ----------------------------------------------------
    r"
    CREATE TABLE IF NOT EXISTS growth_agent_trust (
        agent_id TEXT PRIMARY KEY,
        workspace_id TEXT NOT NULL,
        score DOUBLE PRECISION NOT NULL DEFAULT 0.5,
        score_version INT NOT NULL,
        components JSONB NOT NULL DEFAULT '{}'::jsonb,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    r"
    CREATE TABLE IF NOT EXISTS growth_skill_catalog (
        skill_id TEXT PRIMARY KEY,
        workspace_id TEXT NOT NULL,
        name TEXT NOT NULL,
        description TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    r"
    CREATE TABLE IF NOT EXISTS growth_agent_skills (
        agent_id TEXT NOT NULL,
        skill_id TEXT NOT NULL,
        workspace_id TEXT NOT NULL,
        acquired_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (agent_id, skill_id)
    )",
    r"
    CREATE TABLE IF NOT EXISTS growth_skill_assessments (
        id BIGSERIAL PRIMARY KEY,
        agent_id TEXT NOT NULL,
        skill_id TEXT NOT NULL,
        workspace_id TEXT NOT NULL,
        status TEXT NOT NULL,
        detail JSONB,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    r"
    CREATE TABLE IF NOT EXISTS growth_skill_packages (
        package_id TEXT PRIMARY KEY,
        workspace_id TEXT NOT NULL,
        agent_id TEXT,
        name TEXT NOT NULL,
        version TEXT NOT NULL,
        state TEXT NOT NULL DEFAULT 'pending',
        signature TEXT,
        content_hash TEXT,
        quarantine_reason TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    r"
    CREATE TABLE IF NOT EXISTS growth_daily_snapshots (
        agent_id TEXT NOT NULL,
        workspace_id TEXT NOT NULL,
        snapshot_date DATE NOT NULL,
        metrics JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (agent_id, snapshot_date)
    )",
    r"
    CREATE TABLE IF NOT EXISTS growth_survival_ledger (
        target_id TEXT NOT NULL,
        target_type TEXT NOT NULL,
        workspace_id TEXT NOT NULL,
        ledger_date DATE NOT NULL,
        cost DOUBLE PRECISION NOT NULL DEFAULT 0,
        value DOUBLE PRECISION NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (target_id, target_type, ledger_date)
    )",
    r"
    CREATE TABLE IF NOT EXISTS growth_lifecycle_state (
        agent_id TEXT PRIMARY KEY,
        workspace_id TEXT NOT NULL,
        state TEXT NOT NULL DEFAULT 'active',
        consecutive_good_days INT NOT NULL DEFAULT 0,
        consecutive_bad_days INT NOT NULL DEFAULT 0,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    // -- Projector dedupe -------------------------------------------------
    r"
    CREATE TABLE IF NOT EXISTS proj_dedupe (
        projector_name TEXT NOT NULL,
        event_id UUID NOT NULL,
        applied_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (projector_name, event_id)
    )",
];
