//! Background auto-reclaim scheduler.
//!
//! A single spawned loop calls [`crate::pool::ModelPool::reclaim_tick`] on a
//! fixed interval. The tick itself carries the policy (threshold check, one
//! victim at most); this module owns only the loop's lifecycle: start,
//! per-tick error recovery, and a deterministic stop with no ticks after it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::pool::ModelPool;

/// Handle to a running reclaim loop.
pub struct ReclaimScheduler {
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
    ticks: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl ReclaimScheduler {
    /// Spawn the reclaim loop for `pool` at the configured interval.
    pub fn spawn(pool: Arc<ModelPool>) -> Self {
        let interval = pool.config().reclaim_interval;
        Self::spawn_with_interval(pool, interval)
    }

    /// Spawn with an explicit interval (tests use short ones).
    pub fn spawn_with_interval(pool: Arc<ModelPool>, interval: Duration) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        let ticks = Arc::new(AtomicU64::new(0));

        let task = {
            let shutdown = shutdown.clone();
            let wake = wake.clone();
            let ticks = ticks.clone();
            tokio::spawn(async move {
                info!(interval_ms = interval.as_millis() as u64, "auto-reclaim scheduler started");
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {}
                        _ = wake.notified() => {}
                    }
                    if shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    ticks.fetch_add(1, Ordering::SeqCst);
                    // One bad tick must not stop future reclamation.
                    match pool.reclaim_tick().await {
                        Ok(Some(victim)) => {
                            debug!(model = %victim, "reclaim tick evicted a model");
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!(error = %e, "reclaim tick failed");
                        }
                    }
                }
                info!("auto-reclaim scheduler stopped");
            })
        };

        Self { shutdown, wake, ticks, task: Some(task) }
    }

    /// Number of ticks executed so far.
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Whether a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Stop the loop and wait for it to finish. No tick runs after this
    /// returns.
    pub async fn stop(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ReclaimScheduler {
    fn drop(&mut self) {
        // Best-effort stop if the handle is dropped without `stop()`.
        self.shutdown.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
