//! Use-case tuning and advisory recommendations.
//!
//! Nothing in this module mutates the registry: `optimize_for_use_case`
//! benchmarks around a fixed set of per-use-case adjustments, and
//! `recommendations` ranks suggestions from telemetry and usage history.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::error::PoolError;
use crate::pool::ModelPool;

/// Benchmark passes averaged per measurement.
const BENCH_PASSES: u32 = 3;

/// Average inference time above which a model is called out as slow.
const SLOW_MODEL_MS: f64 = 2000.0;

// ── Use cases ─────────────────────────────────────────────────────────────

/// Workload profile a model is tuned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UseCase {
    CodeCompletion,
    GeneralChat,
    DocumentAnalysis,
    EmbeddingGeneration,
    StreamingChat,
}

impl std::fmt::Display for UseCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CodeCompletion => write!(f, "code-completion"),
            Self::GeneralChat => write!(f, "general-chat"),
            Self::DocumentAnalysis => write!(f, "document-analysis"),
            Self::EmbeddingGeneration => write!(f, "embedding-generation"),
            Self::StreamingChat => write!(f, "streaming-chat"),
        }
    }
}

impl UseCase {
    /// The fixed adjustments applied for this use case.
    pub fn adjustments(self) -> &'static [&'static str] {
        match self {
            Self::CodeCompletion => &[
                "temperature lowered for deterministic completions",
                "context window trimmed to recent-edit scope",
                "stop sequences tuned for code blocks",
            ],
            Self::GeneralChat => &[
                "context window sized for multi-turn history",
                "temperature raised for conversational variety",
                "response cap set for chat-length replies",
            ],
            Self::DocumentAnalysis => &[
                "context window raised to full-document scope",
                "batch size pinned to one for long-form passes",
                "response cap raised for summaries",
            ],
            Self::EmbeddingGeneration => &[
                "batch size raised for bulk embedding throughput",
                "generation disabled beyond the embedding head",
                "context window trimmed to chunk size",
            ],
            Self::StreamingChat => &[
                "first-token latency prioritized over batching",
                "token flush interval minimized",
                "response cap tightened for incremental turns",
            ],
        }
    }
}

// ── Reports ───────────────────────────────────────────────────────────────

/// Result of a before/after tuning pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub model_name: String,
    pub use_case: UseCase,
    /// Adjustments that were applied, in order.
    pub applied_optimizations: Vec<String>,
    /// Average inference time before, in milliseconds.
    pub baseline_ms: f64,
    /// Average inference time after, in milliseconds.
    pub tuned_ms: f64,
    /// `(tuned − baseline) / baseline × 100`. Negative is faster.
    pub delta_percent: f64,
    /// False when the baseline was too small to measure against.
    pub measurable: bool,
}

/// Advisory impact of a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
}

/// One ranked advisory suggestion. Never applied automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub title: String,
    pub detail: String,
    pub impact: Impact,
}

/// Percentage change guarded against a zero baseline.
fn percentage_delta(baseline: f64, tuned: f64) -> Option<f64> {
    if baseline == 0.0 {
        return None;
    }
    Some((tuned - baseline) / baseline * 100.0)
}

// ── Pool surface ──────────────────────────────────────────────────────────

impl ModelPool {
    /// Benchmark `name`, apply the use case's fixed adjustments, benchmark
    /// again, and report the delta. The model is loaded first if needed.
    pub async fn optimize_for_use_case(
        &self,
        name: &str,
        use_case: UseCase,
        cancel: &CancelToken,
    ) -> Result<OptimizationReport, PoolError> {
        let load = self
            .ensure_loaded(name, modelpool_core::sizing::OptimizationLevel::Balanced, cancel)
            .await;
        if !load.success {
            return Err(load.error.unwrap_or(PoolError::Backend("load failed".into())));
        }

        let baseline = self.benchmark(name, cancel).await?;
        let applied: Vec<String> =
            use_case.adjustments().iter().map(ToString::to_string).collect();
        for adjustment in &applied {
            debug!(model = name, use_case = %use_case, adjustment, "applying tuning adjustment");
        }
        let tuned = self.benchmark(name, cancel).await?;

        let baseline_ms = baseline.as_secs_f64() * 1000.0;
        let tuned_ms = tuned.as_secs_f64() * 1000.0;
        let (delta_percent, measurable) = match percentage_delta(baseline_ms, tuned_ms) {
            Some(delta) => (delta, true),
            // Zero baseline: report no measurable improvement, never a
            // divide-by-zero.
            None => (0.0, false),
        };

        info!(
            model = name,
            use_case = %use_case,
            baseline_ms,
            tuned_ms,
            delta_percent,
            "use-case optimization finished"
        );
        Ok(OptimizationReport {
            model_name: name.to_string(),
            use_case,
            applied_optimizations: applied,
            baseline_ms,
            tuned_ms,
            delta_percent,
            measurable,
        })
    }

    /// Ranked advisory suggestions from current telemetry and per-model
    /// usage history. Read-only.
    pub fn recommendations(&self) -> Vec<Recommendation> {
        let mut out = Vec::new();
        let budget = self.config().budget;

        match self.telemetry().vram_usage() {
            Ok(usage) => {
                if budget.over_threshold(usage.used_bytes) {
                    out.push(Recommendation {
                        title: "VRAM above safety threshold".into(),
                        detail: format!(
                            "device is at {:.1}% of {} bytes; evict a model or reload at the speed level",
                            usage.usage_percent, usage.total_bytes
                        ),
                        impact: Impact::High,
                    });
                } else if usage.usage_percent > 70.0 {
                    out.push(Recommendation {
                        title: "VRAM approaching the cap".into(),
                        detail: format!(
                            "device is at {:.1}%; prefer quantized optimization levels for new loads",
                            usage.usage_percent
                        ),
                        impact: Impact::Medium,
                    });
                }
            }
            Err(e) => {
                out.push(Recommendation {
                    title: "GPU telemetry unavailable".into(),
                    detail: format!(
                        "{e}; the pool is running on conservative tracked-bytes accounting"
                    ),
                    impact: Impact::Medium,
                });
            }
        }

        if let Ok(status) = self.telemetry().gpu_status() {
            if status.utilization_percent < 10.0 && !self.loaded_models().is_empty() {
                out.push(Recommendation {
                    title: "GPU mostly idle".into(),
                    detail: format!(
                        "{} is at {:.1}% utilization with models resident; auto-reclaim can run more aggressively",
                        status.name, status.utilization_percent
                    ),
                    impact: Impact::Low,
                });
            }
        }

        for summary in self.usage_summaries() {
            if let Some(avg_ms) = summary.avg_inference_ms {
                if avg_ms > SLOW_MODEL_MS {
                    out.push(Recommendation {
                        title: format!("'{}' is slow", summary.model_name),
                        detail: format!(
                            "average inference is {avg_ms:.0} ms; reload at the speed level or move it off the hot path"
                        ),
                        impact: Impact::High,
                    });
                }
            }
        }

        // Highest impact first, stable by title within a tier.
        out.sort_by(|a, b| b.impact.cmp(&a.impact).then_with(|| a.title.cmp(&b.title)));
        out
    }

    /// Average inference time over [`BENCH_PASSES`] runs.
    async fn benchmark(&self, name: &str, cancel: &CancelToken) -> Result<Duration, PoolError> {
        let prompt = self.config().warmup_prompt.clone();
        let mut total = Duration::ZERO;
        for _ in 0..BENCH_PASSES {
            let started = std::time::Instant::now();
            self.backend().infer(name, &prompt, cancel).await.map_err(|e| match e {
                crate::backend::BackendError::Cancelled => PoolError::Cancelled,
                crate::backend::BackendError::Failed(msg) => PoolError::Backend(msg),
            })?;
            let elapsed = started.elapsed();
            self.stats().record_inference(name, elapsed);
            total += elapsed;
        }
        Ok(total / BENCH_PASSES)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::testing::{MockBackend, MockTelemetry};
    use modelpool_core::budget::{VramBudget, GIB};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn pool() -> (Arc<ModelPool>, Arc<MockBackend>, Arc<MockTelemetry>) {
        let backend = Arc::new(MockBackend::new());
        let telemetry = Arc::new(MockTelemetry::new(0, 12 * GIB));
        let config = PoolConfig::new(VramBudget::new(12 * GIB));
        let pool =
            ModelPool::new(config, backend.clone(), telemetry.clone()).expect("valid config");
        (Arc::new(pool), backend, telemetry)
    }

    // ── adjustments ──────────────────────────────────────────────

    #[test]
    fn every_use_case_has_distinct_adjustments() {
        let cases = [
            UseCase::CodeCompletion,
            UseCase::GeneralChat,
            UseCase::DocumentAnalysis,
            UseCase::EmbeddingGeneration,
            UseCase::StreamingChat,
        ];
        let mut seen = HashSet::new();
        for case in cases {
            let adjustments = case.adjustments();
            assert!(!adjustments.is_empty());
            assert!(seen.insert(adjustments), "{case} shares its adjustment list");
        }
    }

    // ── delta math ───────────────────────────────────────────────

    #[test]
    fn percentage_delta_math() {
        assert_eq!(percentage_delta(100.0, 50.0), Some(-50.0));
        assert_eq!(percentage_delta(100.0, 150.0), Some(50.0));
    }

    #[test]
    fn zero_baseline_is_guarded() {
        assert_eq!(percentage_delta(0.0, 50.0), None);
    }

    // ── optimize_for_use_case ────────────────────────────────────

    #[tokio::test]
    async fn optimization_reports_applied_adjustments() {
        let (pool, backend, _) = pool();
        backend.set_infer_delay(Duration::from_millis(5));
        let report = pool
            .optimize_for_use_case("llama-7b", UseCase::CodeCompletion, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(report.model_name, "llama-7b");
        assert_eq!(
            report.applied_optimizations.len(),
            UseCase::CodeCompletion.adjustments().len()
        );
        assert!(report.measurable);
        assert!(report.baseline_ms > 0.0);
        // 2 benchmark rounds of BENCH_PASSES each.
        assert_eq!(backend.infer_calls(), 2 * BENCH_PASSES as usize);
    }

    #[tokio::test]
    async fn optimization_loads_the_model_if_needed() {
        let (pool, backend, _) = pool();
        pool.optimize_for_use_case("llama-7b", UseCase::GeneralChat, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(backend.load_calls(), 1);
        assert!(pool.loaded_models().contains_key("llama-7b"));
    }

    #[tokio::test]
    async fn optimization_surfaces_benchmark_failures() {
        let (pool, backend, _) = pool();
        backend.fail_infer("llama-7b");
        let err = pool
            .optimize_for_use_case("llama-7b", UseCase::GeneralChat, &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::Backend(_)));
    }

    // ── recommendations ──────────────────────────────────────────

    #[tokio::test]
    async fn over_threshold_recommendation_ranks_first() {
        let (pool, _, telemetry) = pool();
        telemetry.set_used(11 * GIB); // past 0.85 of 12 GiB
        telemetry.set_utilization(5.0);
        pool.ensure_loaded("a-3b", modelpool_core::sizing::OptimizationLevel::Speed, &CancelToken::new())
            .await;
        let recs = pool.recommendations();
        assert!(!recs.is_empty());
        assert_eq!(recs[0].impact, Impact::High);
        assert!(recs[0].title.contains("safety threshold"));
    }

    #[tokio::test]
    async fn telemetry_failure_yields_driver_recommendation() {
        let (pool, _, telemetry) = pool();
        telemetry.set_failing(true);
        let recs = pool.recommendations();
        assert!(recs.iter().any(|r| r.title.contains("telemetry unavailable")));
    }

    #[tokio::test]
    async fn quiet_pool_has_no_high_impact_noise() {
        let (pool, _, telemetry) = pool();
        telemetry.set_used(GIB);
        telemetry.set_utilization(50.0);
        let recs = pool.recommendations();
        assert!(recs.iter().all(|r| r.impact != Impact::High));
    }

    #[test]
    fn impact_ordering() {
        assert!(Impact::High > Impact::Medium);
        assert!(Impact::Medium > Impact::Low);
    }
}
