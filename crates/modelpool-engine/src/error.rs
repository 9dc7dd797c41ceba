//! Error taxonomy and typed operation outcomes.
//!
//! Public pool operations never panic and never bubble raw backend errors:
//! every operation returns an outcome object carrying a success flag and,
//! on failure, a [`PoolError`] describing which class of failure occurred.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Taxonomy ──────────────────────────────────────────────────────────────

/// Why a pool operation failed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PoolError {
    /// Malformed input; rejected before any state mutation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The model runtime backend reported a failure.
    #[error("backend failure: {0}")]
    Backend(String),

    /// The caller's cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// The GPU telemetry provider could not be queried.
    #[error("gpu telemetry unavailable: {0}")]
    TelemetryUnavailable(String),
}

impl PoolError {
    /// Whether this failure is a caller-side cancellation rather than a
    /// runtime fault.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

// ── Load outcome ──────────────────────────────────────────────────────────

/// Result of `ensure_loaded`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadOutcome {
    /// Model the request was for.
    pub model_name: String,
    /// Whether the model is resident after the call.
    pub success: bool,
    /// Whether the model was already resident (idempotent fast path).
    pub already_loaded: bool,
    /// Wall-clock time spent in the backend load. Zero on the fast path.
    pub load_time: Duration,
    /// VRAM the model occupies (measured, or the sizing estimate).
    pub vram_bytes: u64,
    /// Failure description when `success` is false.
    pub error: Option<PoolError>,
}

impl LoadOutcome {
    /// Fast-path outcome for an already-resident model.
    pub fn already_loaded(name: impl Into<String>, vram_bytes: u64) -> Self {
        Self {
            model_name: name.into(),
            success: true,
            already_loaded: true,
            load_time: Duration::ZERO,
            vram_bytes,
            error: None,
        }
    }

    /// Outcome for a completed backend load.
    pub fn loaded(name: impl Into<String>, load_time: Duration, vram_bytes: u64) -> Self {
        Self {
            model_name: name.into(),
            success: true,
            already_loaded: false,
            load_time,
            vram_bytes,
            error: None,
        }
    }

    /// Failure outcome.
    pub fn failed(name: impl Into<String>, error: PoolError) -> Self {
        Self {
            model_name: name.into(),
            success: false,
            already_loaded: false,
            load_time: Duration::ZERO,
            vram_bytes: 0,
            error: Some(error),
        }
    }

    /// Failure message, empty string on success.
    pub fn error_message(&self) -> String {
        self.error.as_ref().map(ToString::to_string).unwrap_or_default()
    }
}

// ── Unload outcome ────────────────────────────────────────────────────────

/// Result of `unload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnloadOutcome {
    /// Model the request was for.
    pub model_name: String,
    /// Whether the model is absent after the call.
    pub success: bool,
    /// Whether anything was actually unloaded (false for the idempotent
    /// not-resident case).
    pub was_resident: bool,
    /// Failure description when `success` is false.
    pub error: Option<PoolError>,
}

impl UnloadOutcome {
    /// Idempotent success for a model that was not resident.
    pub fn not_resident(name: impl Into<String>) -> Self {
        Self { model_name: name.into(), success: true, was_resident: false, error: None }
    }

    /// Success after a real backend unload.
    pub fn unloaded(name: impl Into<String>) -> Self {
        Self { model_name: name.into(), success: true, was_resident: true, error: None }
    }

    /// Failure; the model stays resident.
    pub fn failed(name: impl Into<String>, error: PoolError) -> Self {
        Self { model_name: name.into(), success: false, was_resident: true, error: Some(error) }
    }
}

// ── Warmup outcome ────────────────────────────────────────────────────────

/// Result of warming one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmupOutcome {
    /// Model the warmup was for.
    pub model_name: String,
    /// Whether load and priming both succeeded.
    pub success: bool,
    /// Whether the model was already resident before warmup.
    pub already_resident: bool,
    /// Time spent loading (zero when already resident).
    pub load_time: Duration,
    /// Time the priming inference took.
    pub first_inference_time: Duration,
    /// Failure message when `success` is false.
    pub error: Option<String>,
}

// ── Tests ─────────────────────────────────────────────────────────────────
