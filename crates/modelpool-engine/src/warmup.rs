//! Batch warmup.
//!
//! Loads a set of models in parallel and primes each with one lightweight
//! inference so the first real request doesn't pay cold-start latency.
//! Failures are isolated per model: the result map always has one entry per
//! requested name.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::error::WarmupOutcome;
use crate::pool::ModelPool;

impl ModelPool {
    /// Warm up `names` concurrently: ensure each is loaded (at the
    /// configured warmup level when not already resident), then run one
    /// priming inference. One name's failure does not cancel the others.
    pub async fn pre_warm(
        self: &Arc<Self>,
        names: &[String],
        cancel: &CancelToken,
    ) -> HashMap<String, WarmupOutcome> {
        let mut tasks = JoinSet::new();
        for name in names {
            let pool = self.clone();
            let name = name.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let outcome = pool.warm_one(&name, &cancel).await;
                (name, outcome)
            });
        }

        let mut results = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, outcome)) => {
                    results.insert(name, outcome);
                }
                Err(e) => {
                    // A panicking warmup task is a bug, but it must not eat
                    // the rest of the batch.
                    warn!(error = %e, "warmup task aborted");
                }
            }
        }
        info!(
            requested = names.len(),
            succeeded = results.values().filter(|o| o.success).count(),
            "warmup batch finished"
        );
        results
    }

    async fn warm_one(&self, name: &str, cancel: &CancelToken) -> WarmupOutcome {
        let already_resident = self.is_resident(name);
        let level = self.config().warmup_level;
        let load = self.ensure_loaded(name, level, cancel).await;
        if !load.success {
            return WarmupOutcome {
                model_name: name.to_string(),
                success: false,
                already_resident,
                load_time: Duration::ZERO,
                first_inference_time: Duration::ZERO,
                error: Some(load.error_message()),
            };
        }

        let prompt = self.config().warmup_prompt.clone();
        let started = Instant::now();
        match self.backend().infer(name, &prompt, cancel).await {
            Ok(_) => {
                let first_inference_time = started.elapsed();
                self.stats().record_inference(name, first_inference_time);
                WarmupOutcome {
                    model_name: name.to_string(),
                    success: true,
                    already_resident,
                    load_time: load.load_time,
                    first_inference_time,
                    error: None,
                }
            }
            Err(e) => WarmupOutcome {
                model_name: name.to_string(),
                success: false,
                already_resident,
                load_time: load.load_time,
                first_inference_time: Duration::ZERO,
                error: Some(e.to_string()),
            },
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
