// acp-server/src/main.rs
// ============================================================================
// Module: Control Plane Server Entry Point
// Description: Loads configuration, connects and migrates the store, starts
//              the HTTP/SSE server, and optionally embeds the Runtime Worker
//              loop in-process (§6, §9 "Deployment Topologies").
// Purpose: The one binary an operator runs to stand up the control plane.
// Dependencies: acp-config, acp-growth, acp-server, acp-store, acp-worker,
//               tokio, tracing-subscriber
// ============================================================================

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use acp_config::Config;
use acp_growth::GrowthPolicyFailureSink;
use acp_server::AppState;
use acp_worker::RunWorker;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "acp-server exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;
    let pool = acp_store::connect(&config.database_url, 10).await?;

    let state = AppState::new(pool.clone(), config.clone());

    let worker = config.run_worker_embedded.then(|| {
        let workspace_id = acp_core::WorkspaceId::new(config.run_worker_workspace_id.clone().unwrap_or_default());
        let sink = Arc::new(GrowthPolicyFailureSink::new(workspace_id, state.writer.clone()));
        Arc::new(RunWorker::with_sink(pool.clone(), config.clone(), sink))
    });
    if let Some(worker) = worker.clone() {
        tokio::spawn(async move { worker.run_forever().await });
    }

    let app = acp_server::build_router(state);
    let addr: SocketAddr = std::env::var("ACP_SERVER_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string()).parse()?;
    tracing::info!(%addr, "acp-server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    if let Some(worker) = worker {
        worker.request_stop();
    }
    Ok(())
}
