//! GPU telemetry contract.
//!
//! The pool never talks to a driver directly; it consumes a
//! [`GpuTelemetry`] implementation supplied by the embedding application.
//! Providers are expected to be cheap to query: the engine polls them on
//! every admission decision and every reclaim tick.

use serde::{Deserialize, Serialize};

// ── Readings ──────────────────────────────────────────────────────────────

/// Point-in-time VRAM occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VramUsage {
    /// Bytes currently in use on the device.
    pub used_bytes: u64,
    /// Total device memory in bytes.
    pub total_bytes: u64,
    /// `used_bytes / total_bytes × 100`.
    pub usage_percent: f64,
}

impl VramUsage {
    /// Build a reading from raw byte counts.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_bytes(used_bytes: u64, total_bytes: u64) -> Self {
        let usage_percent = if total_bytes == 0 {
            0.0
        } else {
            used_bytes as f64 / total_bytes as f64 * 100.0
        };
        Self { used_bytes, total_bytes, usage_percent }
    }

    /// Usage as a fraction in `[0.0, 1.0]` (or beyond when oversubscribed).
    pub fn fraction(&self) -> f64 {
        self.usage_percent / 100.0
    }
}

/// Point-in-time GPU status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuStatus {
    /// Compute utilization percentage.
    pub utilization_percent: f64,
    /// Device name as reported by the driver.
    pub name: String,
    /// Die temperature in °C.
    pub temperature_c: f64,
}

// ── Errors ────────────────────────────────────────────────────────────────

/// Failure to obtain a telemetry reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    /// No provider is available (e.g. driver tooling missing).
    Unavailable(String),
    /// The provider was queried but the query failed.
    Query(String),
}

impl std::fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(msg) => write!(f, "gpu telemetry unavailable: {msg}"),
            Self::Query(msg) => write!(f, "gpu telemetry query failed: {msg}"),
        }
    }
}

impl std::error::Error for TelemetryError {}

// ── Provider contract ─────────────────────────────────────────────────────

/// Source of live GPU readings.
///
/// Implementations must be callable from multiple tasks at once. Failures
/// are expected and recoverable: the engine degrades to conservative
/// registry-based accounting instead of failing its caller.
pub trait GpuTelemetry: Send + Sync {
    /// Current VRAM occupancy.
    fn vram_usage(&self) -> Result<VramUsage, TelemetryError>;

    /// Current device status.
    fn gpu_status(&self) -> Result<GpuStatus, TelemetryError>;
}

// ── Tests ─────────────────────────────────────────────────────────────────
