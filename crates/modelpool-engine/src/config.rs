//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use modelpool_core::budget::{VramBudget, GIB};
use modelpool_core::eviction::UnloadStrategy;
use modelpool_core::sizing::OptimizationLevel;

/// Configuration for a [`crate::pool::ModelPool`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// VRAM budget the pool operates under.
    pub budget: VramBudget,
    /// How often the auto-reclaim scheduler ticks.
    pub reclaim_interval: Duration,
    /// Default strategy for admission eviction and auto-reclaim.
    pub unload_strategy: UnloadStrategy,
    /// Level used when warmup has to load a model itself.
    pub warmup_level: OptimizationLevel,
    /// Prompt sent for warmup priming and benchmark passes.
    pub warmup_prompt: String,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            budget: VramBudget::new(8 * GIB),
            reclaim_interval: Duration::from_secs(30),
            unload_strategy: UnloadStrategy::LeastRecentlyUsed,
            warmup_level: OptimizationLevel::Speed,
            warmup_prompt: "Hello".to_string(),
            event_capacity: 64,
        }
    }
}

impl PoolConfig {
    /// Create a config for the given device size with defaults elsewhere.
    pub fn new(budget: VramBudget) -> Self {
        Self { budget, ..Default::default() }
    }

    /// Builder: set the reclaim interval.
    pub fn with_reclaim_interval(mut self, interval: Duration) -> Self {
        self.reclaim_interval = interval;
        self
    }

    /// Builder: set the unload strategy.
    pub fn with_unload_strategy(mut self, strategy: UnloadStrategy) -> Self {
        self.unload_strategy = strategy;
        self
    }

    /// Builder: set the warmup prompt.
    pub fn with_warmup_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.warmup_prompt = prompt.into();
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        self.budget.validate()?;
        if self.reclaim_interval.is_zero() {
            return Err("reclaim_interval must be > 0".into());
        }
        if self.warmup_prompt.is_empty() {
            return Err("warmup_prompt must not be empty".into());
        }
        if self.event_capacity == 0 {
            return Err("event_capacity must be > 0".into());
        }
        Ok(())
    }
}
