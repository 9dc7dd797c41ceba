//! In-memory fakes for tests and examples.
//!
//! [`MockBackend`] records every call and can be told to fail or stall per
//! model; [`MockTelemetry`] serves programmable readings. Both are plain
//! library types so integration tests (and embedding applications' own
//! tests) can use them.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use modelpool_core::sizing::OptimizationSettings;
use modelpool_core::telemetry::{GpuStatus, GpuTelemetry, TelemetryError, VramUsage};

use crate::backend::{BackendError, ModelBackend};
use crate::cancel::CancelToken;

// ── MockBackend ───────────────────────────────────────────────────────────

/// Scriptable [`ModelBackend`] with atomic call counters.
#[derive(Debug, Default)]
pub struct MockBackend {
    load_calls: AtomicUsize,
    unload_calls: AtomicUsize,
    infer_calls: AtomicUsize,
    fail_loads: Mutex<HashSet<String>>,
    fail_unloads: Mutex<HashSet<String>>,
    fail_infers: Mutex<HashSet<String>>,
    load_delay: Mutex<Duration>,
    infer_delay: Mutex<Duration>,
    loaded: Mutex<HashSet<String>>,
}

impl MockBackend {
    /// Create a backend that succeeds instantly at everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `load(name)` fail with a fixed message.
    pub fn fail_load(&self, name: &str) {
        self.fail_loads.lock().unwrap().insert(name.to_string());
    }

    /// Make `unload(name)` fail with a fixed message.
    pub fn fail_unload(&self, name: &str) {
        self.fail_unloads.lock().unwrap().insert(name.to_string());
    }

    /// Make `infer(name, ..)` fail with a fixed message.
    pub fn fail_infer(&self, name: &str) {
        self.fail_infers.lock().unwrap().insert(name.to_string());
    }

    /// Stall every load by `delay` (lets tests overlap concurrent loads).
    pub fn set_load_delay(&self, delay: Duration) {
        *self.load_delay.lock().unwrap() = delay;
    }

    /// Stall every inference by `delay`.
    pub fn set_infer_delay(&self, delay: Duration) {
        *self.infer_delay.lock().unwrap() = delay;
    }

    /// Number of `load` calls observed.
    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    /// Number of `unload` calls observed.
    pub fn unload_calls(&self) -> usize {
        self.unload_calls.load(Ordering::SeqCst)
    }

    /// Number of `infer` calls observed.
    pub fn infer_calls(&self) -> usize {
        self.infer_calls.load(Ordering::SeqCst)
    }

    /// Whether the backend currently considers `name` loaded.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.lock().unwrap().contains(name)
    }
}

#[async_trait]
impl ModelBackend for MockBackend {
    async fn load(
        &self,
        name: &str,
        _settings: &OptimizationSettings,
        cancel: &CancelToken,
    ) -> Result<(), BackendError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.load_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        if self.fail_loads.lock().unwrap().contains(name) {
            return Err(BackendError::Failed(format!("mock load failure for '{name}'")));
        }
        self.loaded.lock().unwrap().insert(name.to_string());
        Ok(())
    }

    async fn unload(&self, name: &str, cancel: &CancelToken) -> Result<(), BackendError> {
        self.unload_calls.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        if self.fail_unloads.lock().unwrap().contains(name) {
            return Err(BackendError::Failed(format!("mock unload failure for '{name}'")));
        }
        self.loaded.lock().unwrap().remove(name);
        Ok(())
    }

    async fn infer(
        &self,
        name: &str,
        _prompt: &str,
        cancel: &CancelToken,
    ) -> Result<String, BackendError> {
        self.infer_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.infer_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        if self.fail_infers.lock().unwrap().contains(name) {
            return Err(BackendError::Failed(format!("mock inference failure for '{name}'")));
        }
        Ok(format!("{name}: ok"))
    }
}

// ── MockTelemetry ─────────────────────────────────────────────────────────

/// Programmable [`GpuTelemetry`] provider.
#[derive(Debug)]
pub struct MockTelemetry {
    usage: Mutex<VramUsage>,
    status: Mutex<GpuStatus>,
    failing: AtomicBool,
}

impl MockTelemetry {
    /// Provider reporting `used`/`total` bytes until told otherwise.
    pub fn new(used_bytes: u64, total_bytes: u64) -> Self {
        Self {
            usage: Mutex::new(VramUsage::from_bytes(used_bytes, total_bytes)),
            status: Mutex::new(GpuStatus {
                utilization_percent: 40.0,
                name: "Mock GPU".to_string(),
                temperature_c: 55.0,
            }),
            failing: AtomicBool::new(false),
        }
    }

    /// Update the reported VRAM reading.
    pub fn set_used(&self, used_bytes: u64) {
        let mut usage = self.usage.lock().unwrap();
        *usage = VramUsage::from_bytes(used_bytes, usage.total_bytes);
    }

    /// Update the reported GPU utilization.
    pub fn set_utilization(&self, percent: f64) {
        self.status.lock().unwrap().utilization_percent = percent;
    }

    /// Make every query fail (simulates missing driver tooling).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl GpuTelemetry for MockTelemetry {
    fn vram_usage(&self) -> Result<VramUsage, TelemetryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TelemetryError::Query("mock telemetry failure".into()));
        }
        Ok(*self.usage.lock().unwrap())
    }

    fn gpu_status(&self) -> Result<GpuStatus, TelemetryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TelemetryError::Query("mock telemetry failure".into()));
        }
        Ok(self.status.lock().unwrap().clone())
    }
}
