// acp-cli/src/main.rs
// ============================================================================
// Module: Control Plane Operator CLI
// Description: `migrate`, `migrate_status`, `run_worker`, `snapshot_daily`,
//              `survival_rollup`, `lifecycle_automation` (§6 "CLI surface").
// Purpose: The operational surface around the control plane that doesn't
//          belong behind HTTP: schema setup, the standalone worker, and the
//          growth layer's daily batch jobs.
// Dependencies: acp-config, acp-core, acp-growth, acp-store, acp-worker,
//               clap, tokio
// ============================================================================

use std::process::ExitCode;
use std::sync::Arc;

use acp_config::Config;
use acp_core::ActorId;
use acp_core::AgentId;
use acp_core::WorkspaceId;
use acp_growth::GrowthPolicyFailureSink;
use acp_growth::TargetType;
use acp_worker::RunWorker;
use chrono::NaiveDate;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use sqlx::PgPool;
use sqlx::Row;

/// Control plane operator CLI.
#[derive(Parser, Debug)]
#[command(name = "acp-cli", disable_help_subcommand = true, arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Applies every `CREATE TABLE IF NOT EXISTS` schema statement.
    Migrate,
    /// Reports which expected tables are present without changing anything.
    MigrateStatus,
    /// Runs the embedded Runtime Worker.
    RunWorker {
        /// Workspace the worker claims runs within.
        #[arg(long, env = "RUN_WORKER_WORKSPACE_ID")]
        workspace_id: String,
        /// Claim and drive one batch, then exit, instead of polling forever.
        #[arg(long)]
        once: bool,
    },
    /// Computes and, if changed, records one agent's (or every agent's)
    /// daily snapshot.
    SnapshotDaily {
        /// Workspace the agent(s) belong to.
        #[arg(long)]
        workspace_id: String,
        /// Restrict to one agent; omit to snapshot every registered agent.
        #[arg(long)]
        agent_id: Option<String>,
        /// Snapshot date (`YYYY-MM-DD`); defaults to today in UTC.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Records a day's cost/value rollup for one survival-ledger target.
    SurvivalRollup {
        /// Workspace the target belongs to.
        #[arg(long)]
        workspace_id: String,
        /// The agent id or workspace id this rollup targets.
        #[arg(long)]
        target_id: String,
        /// Whether `target_id` names an agent or the workspace itself.
        #[arg(long, value_enum)]
        target_type: CliTargetType,
        /// Ledger date (`YYYY-MM-DD`); defaults to today in UTC.
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Total cost incurred by the target on this day.
        #[arg(long)]
        cost: f64,
        /// Total value produced by the target on this day.
        #[arg(long)]
        value: f64,
    },
    /// Applies each agent's latest survival-ledger outcome to its
    /// lifecycle state.
    LifecycleAutomation {
        /// Workspace whose agents are processed.
        #[arg(long)]
        workspace_id: String,
        /// Ledger date to consume (`YYYY-MM-DD`); defaults to today in UTC.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliTargetType {
    Agent,
    Workspace,
}

impl From<CliTargetType> for TargetType {
    fn from(value: CliTargetType) -> Self {
        match value {
            CliTargetType::Agent => Self::Agent,
            CliTargetType::Workspace => Self::Workspace,
        }
    }
}

/// The `actor_id` recorded on every event this CLI appends.
fn cli_actor_id() -> ActorId {
    ActorId::new("acp-cli")
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "acp-cli command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Migrate => migrate(&config).await,
        Command::MigrateStatus => migrate_status(&config).await,
        Command::RunWorker { workspace_id, once } => run_worker(config, workspace_id, once).await,
        Command::SnapshotDaily { workspace_id, agent_id, date } => snapshot_daily(&config, workspace_id, agent_id, date).await,
        Command::SurvivalRollup { workspace_id, target_id, target_type, date, cost, value } => {
            survival_rollup(&config, workspace_id, target_id, target_type.into(), date, cost, value).await
        }
        Command::LifecycleAutomation { workspace_id, date } => lifecycle_automation(&config, workspace_id, date).await,
    }
}

async fn migrate(config: &Config) -> Result<(), anyhow::Error> {
    let pool = acp_store::connect(&config.database_url, 5).await?;
    drop(pool);
    println!("migrations applied");
    Ok(())
}

const EXPECTED_TABLES: &[&str] = &[
    "evt_stream_heads",
    "evt_events",
    "proj_rooms",
    "proj_threads",
    "proj_messages",
    "proj_runs",
    "proj_steps",
    "proj_tool_calls",
    "proj_artifacts",
    "proj_approvals",
    "proj_incidents",
    "proj_agents",
    "proj_capability_tokens",
    "sec_egress_requests",
    "sec_constraints",
    "sec_mistake_counters",
    "growth_skill_packages",
    "growth_skill_assessments",
    "growth_agent_trust",
    "growth_daily_snapshots",
    "growth_survival_ledger",
    "growth_lifecycle_state",
];

async fn migrate_status(config: &Config) -> Result<(), anyhow::Error> {
    let pool = bare_connect(&config.database_url).await?;
    let mut missing = Vec::new();
    for table in EXPECTED_TABLES {
        let exists: bool = sqlx::query("SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_name = $1)")
            .bind(table)
            .fetch_one(&pool)
            .await?
            .try_get(0)?;
        if !exists {
            missing.push(*table);
        }
    }
    if missing.is_empty() {
        println!("schema up to date ({} tables present)", EXPECTED_TABLES.len());
    } else {
        println!("missing tables: {}", missing.join(", "));
        return Err(anyhow::anyhow!("schema incomplete, run `acp-cli migrate`"));
    }
    Ok(())
}

/// Opens a pool without running migrations, so `migrate_status` can report
/// an incomplete schema rather than silently completing it.
async fn bare_connect(database_url: &str) -> Result<PgPool, anyhow::Error> {
    Ok(sqlx::postgres::PgPoolOptions::new().max_connections(5).connect(database_url).await?)
}

async fn run_worker(config: Config, workspace_id: String, once: bool) -> Result<(), anyhow::Error> {
    let pool = acp_store::connect(&config.database_url, 10).await?;
    let mut worker_config = config;
    worker_config.run_worker_workspace_id = Some(workspace_id.clone());

    let sink = Arc::new(GrowthPolicyFailureSink::new(WorkspaceId::new(workspace_id), acp_store::EventWriter::new()));
    let worker = RunWorker::with_sink(pool, worker_config, sink);

    if once {
        let claimed = worker.run_cycle().await?;
        println!("claimed {claimed} run(s)");
    } else {
        worker.run_forever().await;
    }
    Ok(())
}

async fn snapshot_daily(config: &Config, workspace_id: String, agent_id: Option<String>, date: Option<NaiveDate>) -> Result<(), anyhow::Error> {
    let pool = acp_store::connect(&config.database_url, 5).await?;
    let writer = acp_store::EventWriter::new();
    let workspace_id = WorkspaceId::new(workspace_id);
    let snapshot_date = date.unwrap_or_else(|| chrono::Utc::now().date_naive());
    let actor_id = cli_actor_id();

    let agent_ids = match agent_id {
        Some(agent_id) => vec![AgentId::new(agent_id)],
        None => acp_store::agents::list(&pool, &workspace_id, 10_000).await?.into_iter().map(|row| row.agent_id).collect(),
    };

    let mut changed = 0usize;
    for agent_id in &agent_ids {
        if acp_growth::snapshots::snapshot_agent(&pool, &writer, &workspace_id, agent_id, snapshot_date, &actor_id).await? {
            changed += 1;
        }
    }
    println!("snapshotted {} agent(s), {changed} changed", agent_ids.len());
    Ok(())
}

async fn survival_rollup(
    config: &Config,
    workspace_id: String,
    target_id: String,
    target_type: TargetType,
    date: Option<NaiveDate>,
    cost: f64,
    value: f64,
) -> Result<(), anyhow::Error> {
    let pool = acp_store::connect(&config.database_url, 5).await?;
    let writer = acp_store::EventWriter::new();
    let workspace_id = WorkspaceId::new(workspace_id);
    let ledger_date = date.unwrap_or_else(|| chrono::Utc::now().date_naive());
    let actor_id = cli_actor_id();

    let changed = acp_growth::snapshots::rollup(&pool, &writer, &workspace_id, &target_id, target_type, ledger_date, cost, value, &actor_id).await?;
    println!("rollup recorded for {target_id} on {ledger_date}: {}", if changed { "changed" } else { "unchanged" });
    Ok(())
}

async fn lifecycle_automation(config: &Config, workspace_id: String, date: Option<NaiveDate>) -> Result<(), anyhow::Error> {
    let pool = acp_store::connect(&config.database_url, 5).await?;
    let writer = acp_store::EventWriter::new();
    let workspace_id = WorkspaceId::new(workspace_id);
    let ledger_date = date.unwrap_or_else(|| chrono::Utc::now().date_naive());
    let actor_id = cli_actor_id();

    let agents = acp_store::agents::list(&pool, &workspace_id, 10_000).await?;
    let mut processed = 0usize;
    for agent in agents {
        let Some((cost, value)) = acp_growth::snapshots::get_ledger_row(&pool, agent.agent_id.as_str(), TargetType::Agent, ledger_date).await? else {
            tracing::debug!(agent_id = %agent.agent_id, "no survival-ledger row for this date, skipping");
            continue;
        };
        let good_day = acp_growth::lifecycle::day_is_good(cost, value);
        acp_growth::lifecycle::apply_day_outcome(&pool, &writer, &workspace_id, &agent.agent_id, good_day, &actor_id).await?;
        processed += 1;
    }
    println!("lifecycle automation applied to {processed} agent(s) for {ledger_date}");
    Ok(())
}
