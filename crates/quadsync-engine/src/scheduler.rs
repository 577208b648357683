//! Run admission and scheduling.
//!
//! At most one sync run is in flight per process. Admission is a single
//! atomic flag: manual triggers and the interval loop go through the same
//! gate, and whoever loses gets `RunInProgress` instead of a queued run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use quadsync_core::{EngineError, Result, RunId, RunMode};

use crate::orchestrator::SyncOrchestrator;

/// Gates and schedules sync runs.
pub struct Scheduler {
    orchestrator: Arc<SyncOrchestrator>,
    busy: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<SyncOrchestrator>) -> Self {
        Self {
            orchestrator,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a run is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Admit a run and execute it in the background.
    ///
    /// Returns the allocated run id as soon as the run row exists; the
    /// fetch-diff-persist work continues on a spawned task. Exactly one of
    /// any set of concurrent triggers wins; the rest get `RunInProgress`.
    pub async fn trigger(&self, mode: RunMode) -> Result<RunId> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::RunInProgress);
        }

        let run_id = match self.orchestrator.begin(mode).await {
            Ok(id) => id,
            Err(e) => {
                self.busy.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let orchestrator = Arc::clone(&self.orchestrator);
        let busy = Arc::clone(&self.busy);
        tokio::spawn(async move {
            if let Err(e) = orchestrator.run_to_completion(run_id).await {
                error!(run_id = %run_id, error = %e, "sync run aborted");
            }
            busy.store(false, Ordering::SeqCst);
        });

        Ok(run_id)
    }

    /// The periodic trigger loop. Ticks forever; a tick that finds a run
    /// still in flight is skipped, never queued.
    pub async fn run_interval_loop(self: Arc<Self>, interval: Duration) {
        info!(interval = ?interval, "scheduled sync loop started");
        loop {
            tokio::time::sleep(interval).await;
            match self.trigger(RunMode::Scheduled).await {
                Ok(run_id) => info!(run_id = %run_id, "scheduled run admitted"),
                Err(EngineError::RunInProgress) => {
                    warn!("previous run still in flight; skipping tick");
                }
                Err(e) => error!(error = %e, "scheduled run failed to start"),
            }
        }
    }
}
