// acp-worker/src/run_loop.rs
// ============================================================================
// Module: Run Worker Poll Loop
// Description: The embedded loop that ticks on `run_worker_poll_interval`,
//              claims up to `run_worker_batch_limit` queued runs per tick,
//              and drives each through `cycle::drive_claimed_run` (§4.11).
// Purpose: Give `acp-server`'s embedded mode and a standalone worker
//          binary the same start/stop lifecycle object.
// Dependencies: acp-core, acp-config, acp-store, tokio
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use acp_config::Config;
use acp_core::ActorId;
use acp_policy::NoopPolicyFailureSink;
use acp_policy::PolicyFailureSink;
use acp_store::EventWriter;
use sqlx::PgPool;
use tokio::sync::Notify;

use crate::cycle::drive_claimed_run;
use crate::error::WorkerError;

/// The `actor_id` recorded on every event the worker appends.
#[must_use]
pub fn service_actor_id() -> ActorId {
    ActorId::new("acp-worker")
}

/// The embedded Runtime Worker: claims and drives queued runs on a timer
/// until asked to stop.
///
/// A single in-process in-flight guard prevents two overlapping ticks in
/// this process (the per-workspace advisory lock in [`acp_store::leases`]
/// already guarantees correctness across processes, but a slow tick
/// outliving its own interval should not pile up concurrent batches here).
pub struct RunWorker {
    pool: PgPool,
    writer: EventWriter,
    config: Config,
    sink: Arc<dyn PolicyFailureSink>,
    actor_id: ActorId,
    in_flight: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
    stop_notify: Arc<Notify>,
}

impl RunWorker {
    /// Builds a worker over `pool`, using `config`'s `run_worker_*`
    /// fields. Negative-decision side effects are dropped; use
    /// [`RunWorker::with_sink`] to route them into the Growth layer.
    #[must_use]
    pub fn new(pool: PgPool, config: Config) -> Self {
        Self::with_sink(pool, config, Arc::new(NoopPolicyFailureSink))
    }

    /// Builds a worker with an explicit [`PolicyFailureSink`].
    #[must_use]
    pub fn with_sink(pool: PgPool, config: Config, sink: Arc<dyn PolicyFailureSink>) -> Self {
        Self {
            pool,
            writer: EventWriter::new(),
            config,
            sink,
            actor_id: service_actor_id(),
            in_flight: Arc::new(AtomicBool::new(false)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            stop_notify: Arc::new(Notify::new()),
        }
    }

    /// Runs the poll loop until [`RunWorker::request_stop`] is called.
    /// In-flight work from the current tick is always allowed to finish
    /// before this returns.
    pub async fn run_forever(&self) {
        let mut interval = tokio::time::interval(self.config.run_worker_poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = self.run_cycle().await {
                        tracing::error!(error = %err, "run worker tick failed");
                    }
                }
                () = self.stop_notify.notified() => {}
            }
            if self.stop_requested.load(Ordering::Acquire) {
                break;
            }
        }
    }

    /// Signals the loop to exit after its current tick finishes.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.stop_notify.notify_waiters();
    }

    /// Claims and drives up to `run_worker_batch_limit` runs once. Returns
    /// the number of runs claimed. A concurrent call (or a call made while
    /// a tick is still draining) returns `Ok(0)` immediately rather than
    /// running a second batch in parallel.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::NoWorkspaceConfigured`] when
    /// `RUN_WORKER_WORKSPACE_ID` is unset, or a storage/policy/egress
    /// failure from driving a claimed run.
    pub async fn run_cycle(&self) -> Result<u32, WorkerError> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Ok(0);
        }
        let result = self.drain_batch().await;
        self.in_flight.store(false, Ordering::Release);
        result
    }

    async fn drain_batch(&self) -> Result<u32, WorkerError> {
        let workspace_id = self
            .config
            .run_worker_workspace_id
            .as_deref()
            .ok_or(WorkerError::NoWorkspaceConfigured)?;
        let workspace_id = acp_core::WorkspaceId::new(workspace_id);

        let mut claimed_count = 0u32;
        for _ in 0..self.config.run_worker_batch_limit {
            match acp_store::claim_and_start_run(
                &self.pool,
                &self.writer,
                &workspace_id,
                None,
                self.config.run_lease_ttl,
                &self.actor_id,
            )
            .await
            {
                Ok(claimed) => {
                    claimed_count += 1;
                    if let Err(err) =
                        drive_claimed_run(&self.pool, &self.writer, &self.config, self.sink.as_ref(), &self.actor_id, &claimed)
                            .await
                    {
                        tracing::error!(run_id = %claimed.run_id, error = %err, "run drive failed, leaving lease to expire");
                    }
                }
                Err(acp_store::StoreError::NoRunAvailable) => break,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(claimed_count)
    }
}

#[cfg(test)]
mod tests {
    use super::service_actor_id;

    #[test]
    fn service_actor_id_is_stable() {
        assert_eq!(service_actor_id().as_str(), "acp-worker");
    }
}
