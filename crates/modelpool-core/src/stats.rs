//! Per-model usage statistics.
//!
//! Kept separate from the registry so a model's history survives eviction:
//! the recommendation engine wants to know how a model behaved even after
//! it has been unloaded.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::registry::now_ms;

/// How many recent inference durations are kept per model.
const RECENT_WINDOW: usize = 32;

// ── Per-model stats ───────────────────────────────────────────────────────

/// Rolling usage record for one model.
#[derive(Debug, Clone)]
pub struct UsageStats {
    /// Last time the model served a request (ms since epoch).
    pub last_used_at_ms: u64,
    /// Requests served since tracking began.
    pub usage_count: u64,
    /// Most recent inference durations, newest last.
    recent_durations: VecDeque<Duration>,
}

impl UsageStats {
    fn new() -> Self {
        Self { last_used_at_ms: now_ms(), usage_count: 0, recent_durations: VecDeque::new() }
    }

    fn touch(&mut self) {
        self.usage_count += 1;
        self.last_used_at_ms = now_ms();
    }

    fn record_inference(&mut self, duration: Duration) {
        if self.recent_durations.len() >= RECENT_WINDOW {
            self.recent_durations.pop_front();
        }
        self.recent_durations.push_back(duration);
    }

    /// Average over the rolling window, `None` before any inference.
    pub fn average_inference_time(&self) -> Option<Duration> {
        if self.recent_durations.is_empty() {
            return None;
        }
        let total: Duration = self.recent_durations.iter().sum();
        Some(total / self.recent_durations.len() as u32)
    }

    /// Number of durations currently in the window.
    pub fn sample_count(&self) -> usize {
        self.recent_durations.len()
    }
}

/// Serializable summary of one model's usage, for advisory surfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub model_name: String,
    pub usage_count: u64,
    pub last_used_at_ms: u64,
    /// Average inference time in milliseconds over the rolling window.
    pub avg_inference_ms: Option<f64>,
}

// ── Tracker ───────────────────────────────────────────────────────────────

/// Concurrent collection of [`UsageStats`] keyed by model name. Entries are
/// created on first touch and never removed by eviction.
#[derive(Debug, Default)]
pub struct UsageTracker {
    inner: RwLock<HashMap<String, UsageStats>>,
}

impl UsageTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request hit for `name`, creating the entry if needed.
    pub fn touch(&self, name: &str) {
        let mut map = self.inner.write().unwrap();
        map.entry(name.to_string()).or_insert_with(UsageStats::new).touch();
    }

    /// Record an inference duration for `name`, creating the entry if
    /// needed.
    pub fn record_inference(&self, name: &str, duration: Duration) {
        let mut map = self.inner.write().unwrap();
        map.entry(name.to_string()).or_insert_with(UsageStats::new).record_inference(duration);
    }

    /// Clone of the stats for `name`.
    pub fn get(&self, name: &str) -> Option<UsageStats> {
        self.inner.read().unwrap().get(name).cloned()
    }

    /// Summaries for every tracked model, unordered.
    pub fn summaries(&self) -> Vec<UsageSummary> {
        self.inner
            .read()
            .unwrap()
            .iter()
            .map(|(name, stats)| UsageSummary {
                model_name: name.clone(),
                usage_count: stats.usage_count,
                last_used_at_ms: stats.last_used_at_ms,
                avg_inference_ms: stats
                    .average_inference_time()
                    .map(|d| d.as_secs_f64() * 1000.0),
            })
            .collect()
    }

    /// Number of models ever tracked.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    /// Whether anything has been tracked yet.
    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
