//! Core building blocks for the modelpool VRAM manager.
//!
//! Everything here is synchronous and dependency-light; the async
//! orchestration lives in `modelpool-engine`. Key components:
//!
//! - [`budget::VramBudget`] — total VRAM, safety threshold, derived cap.
//! - [`registry::ModelRegistry`] — concurrent map of resident models.
//! - [`eviction::select_victims`] — pure victim selection per strategy.
//! - [`sizing::derive_settings`] — level presets and footprint estimation.
//! - [`stats::UsageTracker`] — per-model usage history that outlives
//!   eviction.
//! - [`telemetry::GpuTelemetry`] — contract for live GPU readings.

pub mod budget;
pub mod eviction;
pub mod registry;
pub mod sizing;
pub mod stats;
pub mod telemetry;

pub use budget::{VramBudget, DEFAULT_SAFETY_THRESHOLD, GIB};
pub use eviction::{select_victims, UnloadStrategy};
pub use registry::{ModelRegistry, ResidentModel};
pub use sizing::{derive_settings, size_info, OptimizationLevel, OptimizationSettings, Quantization, SizeInfo};
pub use stats::{UsageStats, UsageSummary, UsageTracker};
pub use telemetry::{GpuStatus, GpuTelemetry, TelemetryError, VramUsage};
