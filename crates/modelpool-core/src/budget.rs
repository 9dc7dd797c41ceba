//! VRAM budget arithmetic.
//!
//! A [`VramBudget`] is the process-wide description of how much GPU memory
//! the pool may claim: the device total and the safety threshold fraction
//! the pool tries to stay under. The derived cap is what admission checks
//! against.

use serde::{Deserialize, Serialize};

/// Default fraction of total VRAM the pool will try not to exceed.
pub const DEFAULT_SAFETY_THRESHOLD: f64 = 0.85;

/// One gibibyte, the unit model sizes are quoted in.
pub const GIB: u64 = 1024 * 1024 * 1024;

/// Total VRAM and the safety threshold the pool operates under.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VramBudget {
    /// Total device VRAM in bytes.
    pub total_bytes: u64,
    /// Fraction of `total_bytes` usable before eviction kicks in.
    pub safety_threshold: f64,
}

impl VramBudget {
    /// Create a budget with the default safety threshold.
    pub fn new(total_bytes: u64) -> Self {
        Self { total_bytes, safety_threshold: DEFAULT_SAFETY_THRESHOLD }
    }

    /// Builder: override the safety threshold.
    pub fn with_safety_threshold(mut self, threshold: f64) -> Self {
        self.safety_threshold = threshold;
        self
    }

    /// Validate budget values.
    pub fn validate(&self) -> Result<(), String> {
        if self.total_bytes == 0 {
            return Err("total_bytes must be > 0".into());
        }
        if !(0.0..=1.0).contains(&self.safety_threshold) || self.safety_threshold == 0.0 {
            return Err("safety_threshold must be in (0.0, 1.0]".into());
        }
        Ok(())
    }

    /// Derived cap in bytes: `total_bytes × safety_threshold`.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn cap_bytes(&self) -> u64 {
        (self.total_bytes as f64 * self.safety_threshold) as u64
    }

    /// Whether admitting `incoming_bytes` on top of `used_bytes` would
    /// exceed the cap.
    pub fn would_exceed(&self, used_bytes: u64, incoming_bytes: u64) -> bool {
        used_bytes.saturating_add(incoming_bytes) > self.cap_bytes()
    }

    /// Bytes that must be freed before `incoming_bytes` fits under the cap.
    /// Zero when the admission already fits.
    pub fn shortfall(&self, used_bytes: u64, incoming_bytes: u64) -> u64 {
        used_bytes.saturating_add(incoming_bytes).saturating_sub(self.cap_bytes())
    }

    /// Usage fraction of the *total* device memory (0.0–1.0 and beyond if
    /// the device is oversubscribed).
    #[allow(clippy::cast_precision_loss)]
    pub fn usage_fraction(&self, used_bytes: u64) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        used_bytes as f64 / self.total_bytes as f64
    }

    /// Whether `used_bytes` is past the safety threshold.
    pub fn over_threshold(&self, used_bytes: u64) -> bool {
        self.usage_fraction(used_bytes) > self.safety_threshold
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
