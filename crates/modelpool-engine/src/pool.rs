//! Load/unload orchestration.
//!
//! [`ModelPool`] is the entry point the embedding application talks to. It
//! owns the registry, drives the backend, and keeps the budget invariant:
//!
//! - admission is serialized behind a critical section, with a reservation
//!   counter keeping in-flight loads visible to later checks;
//! - concurrent requests for the same model share one backend load;
//! - every public operation returns a typed outcome instead of panicking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tracing::{debug, error, info, warn};

use modelpool_core::eviction::{select_victims, UnloadStrategy};
use modelpool_core::registry::{ModelRegistry, ResidentModel};
use modelpool_core::sizing::{derive_settings, size_info, OptimizationLevel};
use modelpool_core::stats::{UsageSummary, UsageTracker};
use modelpool_core::telemetry::{GpuTelemetry, VramUsage};

use crate::backend::{BackendError, ModelBackend};
use crate::cancel::CancelToken;
use crate::config::PoolConfig;
use crate::error::{LoadOutcome, PoolError, UnloadOutcome};
use crate::events::{EventBus, PoolEvent};

// ── Load phases ───────────────────────────────────────────────────────────

/// Where an in-flight load currently is. Purely observational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadPhase {
    /// Admission check against the budget.
    CheckingBudget,
    /// Unloading victims to make room.
    Evicting,
    /// Backend load in progress.
    Loading,
    /// Constructing and publishing the registry entry.
    Registering,
}

// ── Memory stats ──────────────────────────────────────────────────────────

/// Point-in-time pool memory accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolMemoryStats {
    /// Number of resident models.
    pub resident_models: usize,
    /// Sum of registry-tracked VRAM bytes.
    pub tracked_vram_bytes: u64,
    /// Estimated bytes of loads currently in flight.
    pub reserved_bytes: u64,
    /// Derived admission cap.
    pub cap_bytes: u64,
    /// Total device memory per the budget.
    pub total_bytes: u64,
    /// `tracked_vram_bytes / total_bytes`.
    pub utilization: f64,
}

// ── ModelPool ─────────────────────────────────────────────────────────────

/// Orchestrates model residency against a fixed VRAM budget.
pub struct ModelPool {
    config: PoolConfig,
    backend: Arc<dyn ModelBackend>,
    telemetry: Arc<dyn GpuTelemetry>,
    registry: ModelRegistry,
    stats: UsageTracker,
    events: EventBus,
    /// Serializes "check budget → pick victims → commit unload" so two
    /// admissions can never both pass the same pre-eviction check.
    admission: AsyncMutex<()>,
    /// Estimated bytes of loads between reservation and registration.
    reserved_bytes: AtomicU64,
    /// Per-name gates de-duplicating concurrent loads of the same model.
    inflight: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    /// Observable phase per in-flight load.
    phases: StdMutex<HashMap<String, LoadPhase>>,
    /// Strategy used for admission eviction and auto-reclaim.
    strategy: StdRwLock<UnloadStrategy>,
}

impl ModelPool {
    /// Create a pool from validated configuration.
    pub fn new(
        config: PoolConfig,
        backend: Arc<dyn ModelBackend>,
        telemetry: Arc<dyn GpuTelemetry>,
    ) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::Validation)?;
        let strategy = config.unload_strategy;
        let events = EventBus::new(config.event_capacity);
        Ok(Self {
            config,
            backend,
            telemetry,
            registry: ModelRegistry::new(),
            stats: UsageTracker::new(),
            events,
            admission: AsyncMutex::new(()),
            reserved_bytes: AtomicU64::new(0),
            inflight: StdMutex::new(HashMap::new()),
            phases: StdMutex::new(HashMap::new()),
            strategy: StdRwLock::new(strategy),
        })
    }

    // ── public surface ───────────────────────────────────────────────

    /// Ensure `name` is resident, loading (and evicting) as needed.
    pub async fn ensure_loaded(
        &self,
        name: &str,
        level: OptimizationLevel,
        cancel: &CancelToken,
    ) -> LoadOutcome {
        if name.trim().is_empty() {
            warn!("rejected load request with empty model name");
            return LoadOutcome::failed(
                name,
                PoolError::Validation("model name must not be empty".into()),
            );
        }

        if let Some(hit) = self.fast_path(name) {
            return hit;
        }

        let gate = self.inflight_gate(name);
        let _inflight = gate.lock().await;

        // A concurrent load may have completed while we waited on the gate.
        if let Some(hit) = self.fast_path(name) {
            return hit;
        }
        if cancel.is_cancelled() {
            return LoadOutcome::failed(name, PoolError::Cancelled);
        }

        let (settings, estimated_bytes) = derive_settings(name, level);
        self.set_phase(name, LoadPhase::CheckingBudget);

        // Admission critical section: budget check, eviction, reservation.
        let used_before;
        {
            let _admission = self.admission.lock().await;
            let (usage, degraded) = self.vram_reading();
            used_before = usage.used_bytes;
            let reserved = self.reserved_bytes.load(Ordering::SeqCst);
            let used = usage.used_bytes.saturating_add(reserved);

            if self.config.budget.would_exceed(used, estimated_bytes) {
                let required = self.config.budget.shortfall(used, estimated_bytes);
                self.set_phase(name, LoadPhase::Evicting);
                info!(
                    model = name,
                    required_bytes = required,
                    degraded_telemetry = degraded,
                    "admission over cap, selecting victims"
                );
                let freed = self.evict_for_admission(required).await;
                if freed < required {
                    warn!(
                        model = name,
                        freed_bytes = freed,
                        required_bytes = required,
                        "eviction fell short of target, proceeding over cap"
                    );
                }
            }
            self.reserved_bytes.fetch_add(estimated_bytes, Ordering::SeqCst);
        }

        self.set_phase(name, LoadPhase::Loading);
        let load_started = Instant::now();
        let result = self.backend.load(name, &settings, cancel).await;
        let load_time = load_started.elapsed();
        self.reserved_bytes.fetch_sub(estimated_bytes, Ordering::SeqCst);

        match result {
            Ok(()) => {
                if cancel.is_cancelled() {
                    // The backend finished but the caller is gone; roll the
                    // backend back rather than register an orphan.
                    let _ = self.backend.unload(name, &CancelToken::new()).await;
                    self.clear_phase(name);
                    debug!(model = name, "load completed after cancellation, rolled back");
                    return LoadOutcome::failed(name, PoolError::Cancelled);
                }
                self.set_phase(name, LoadPhase::Registering);
                let vram_bytes = self.measure_loaded_bytes(used_before, estimated_bytes);
                let model = ResidentModel::new(name, vram_bytes, size_info(name, &settings));
                self.registry.upsert(model);
                self.stats.touch(name);
                self.clear_phase(name);
                self.events.publish(PoolEvent::Loaded {
                    model_name: name.to_string(),
                    vram_bytes,
                    load_ms: load_time.as_millis() as u64,
                });
                info!(
                    model = name,
                    level = %level,
                    vram_bytes,
                    load_ms = load_time.as_millis() as u64,
                    "model loaded"
                );
                LoadOutcome::loaded(name, load_time, vram_bytes)
            }
            Err(BackendError::Cancelled) => {
                self.clear_phase(name);
                debug!(model = name, "load cancelled");
                LoadOutcome::failed(name, PoolError::Cancelled)
            }
            Err(BackendError::Failed(msg)) => {
                self.clear_phase(name);
                error!(model = name, error = %msg, "backend load failed");
                self.events.publish(PoolEvent::LoadFailed {
                    model_name: name.to_string(),
                    reason: msg.clone(),
                });
                LoadOutcome::failed(name, PoolError::Backend(msg))
            }
        }
    }

    /// Unload `name`. Succeeds idempotently when the model is not resident;
    /// on backend failure the entry stays resident.
    pub async fn unload(&self, name: &str, cancel: &CancelToken) -> UnloadOutcome {
        if !self.registry.contains(name) {
            debug!(model = name, "unload requested for non-resident model");
            return UnloadOutcome::not_resident(name);
        }
        match self.backend.unload(name, cancel).await {
            Ok(()) => {
                self.registry.remove(name);
                self.events.publish(PoolEvent::Unloaded { model_name: name.to_string() });
                info!(model = name, "model unloaded");
                UnloadOutcome::unloaded(name)
            }
            Err(BackendError::Cancelled) => {
                warn!(model = name, "unload cancelled, model stays resident");
                UnloadOutcome::failed(name, PoolError::Cancelled)
            }
            Err(BackendError::Failed(msg)) => {
                warn!(model = name, error = %msg, "backend unload failed, model stays resident");
                UnloadOutcome::failed(name, PoolError::Backend(msg))
            }
        }
    }

    /// Snapshot of all resident models.
    pub fn loaded_models(&self) -> HashMap<String, ResidentModel> {
        self.registry.snapshot()
    }

    /// Pin or unpin a model against eviction. Returns `false` when the
    /// model is not resident.
    pub fn set_pinned(&self, name: &str, pinned: bool) -> bool {
        let found = self.registry.set_pinned(name, pinned);
        if found {
            info!(model = name, pinned, "pin state changed");
        }
        found
    }

    /// Change the strategy used by admission eviction and auto-reclaim.
    pub fn configure_auto_reclaim(&self, strategy: UnloadStrategy) {
        *self.strategy.write().unwrap() = strategy;
        info!(strategy = %strategy, "auto-reclaim strategy changed");
    }

    /// Strategy currently in effect.
    pub fn unload_strategy(&self) -> UnloadStrategy {
        *self.strategy.read().unwrap()
    }

    /// Subscribe to pool state-change events.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }

    /// Phase of an in-flight load for `name`, if any.
    pub fn loading_status(&self, name: &str) -> Option<LoadPhase> {
        self.phases.lock().unwrap().get(name).copied()
    }

    /// Usage summaries for every model ever tracked (including evicted).
    pub fn usage_summaries(&self) -> Vec<UsageSummary> {
        self.stats.summaries()
    }

    /// Point-in-time memory accounting.
    pub fn memory_stats(&self) -> PoolMemoryStats {
        let tracked = self.registry.total_vram_bytes();
        PoolMemoryStats {
            resident_models: self.registry.len(),
            tracked_vram_bytes: tracked,
            reserved_bytes: self.reserved_bytes.load(Ordering::SeqCst),
            cap_bytes: self.config.budget.cap_bytes(),
            total_bytes: self.config.budget.total_bytes,
            utilization: self.config.budget.usage_fraction(tracked),
        }
    }

    /// One auto-reclaim pass: if usage is past the safety threshold, evict
    /// at most one victim sized against ~20% of current usage. Returns the
    /// evicted name, if any.
    pub async fn reclaim_tick(&self) -> Result<Option<String>, PoolError> {
        let (usage, degraded) = self.vram_reading();
        if !self.config.budget.over_threshold(usage.used_bytes) {
            return Ok(None);
        }
        let target = usage.used_bytes / 5;
        let strategy = self.unload_strategy();
        let victims = select_victims(&self.registry.snapshot(), target, strategy);
        let Some(victim) = victims.into_iter().next() else {
            debug!(used_bytes = usage.used_bytes, "over threshold but nothing evictable");
            return Ok(None);
        };
        match self.backend.unload(&victim, &CancelToken::new()).await {
            Ok(()) => {
                self.registry.remove(&victim);
                self.events.publish(PoolEvent::Reclaimed {
                    model_name: victim.clone(),
                    used_bytes_before: usage.used_bytes,
                });
                info!(
                    model = %victim,
                    used_bytes = usage.used_bytes,
                    degraded_telemetry = degraded,
                    "auto-reclaim evicted model"
                );
                Ok(Some(victim))
            }
            Err(e) => Err(PoolError::Backend(e.to_string())),
        }
    }

    // ── crate-internal accessors ─────────────────────────────────────

    pub(crate) fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub(crate) fn backend(&self) -> &Arc<dyn ModelBackend> {
        &self.backend
    }

    pub(crate) fn telemetry(&self) -> &Arc<dyn GpuTelemetry> {
        &self.telemetry
    }

    pub(crate) fn stats(&self) -> &UsageTracker {
        &self.stats
    }

    pub(crate) fn is_resident(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    // ── internals ────────────────────────────────────────────────────

    fn fast_path(&self, name: &str) -> Option<LoadOutcome> {
        let entry = self.registry.get(name)?;
        self.registry.touch_usage(name);
        self.stats.touch(name);
        debug!(model = name, "already resident, usage bumped");
        Some(LoadOutcome::already_loaded(name, entry.vram_bytes))
    }

    fn inflight_gate(&self, name: &str) -> Arc<AsyncMutex<()>> {
        let mut map = self.inflight.lock().unwrap();
        map.entry(name.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    fn set_phase(&self, name: &str, phase: LoadPhase) {
        self.phases.lock().unwrap().insert(name.to_string(), phase);
    }

    fn clear_phase(&self, name: &str) {
        self.phases.lock().unwrap().remove(name);
    }

    /// Live telemetry, or registry-based conservative accounting when the
    /// provider fails. The second element reports the degraded case.
    fn vram_reading(&self) -> (VramUsage, bool) {
        match self.telemetry.vram_usage() {
            Ok(usage) => (usage, false),
            Err(e) => {
                warn!(error = %e, "telemetry unavailable, using tracked bytes");
                let tracked = self.registry.total_vram_bytes();
                (VramUsage::from_bytes(tracked, self.config.budget.total_bytes), true)
            }
        }
    }

    /// VRAM delta across the load when telemetry can see it, otherwise the
    /// sizing estimate.
    fn measure_loaded_bytes(&self, used_before: u64, estimated: u64) -> u64 {
        match self.telemetry.vram_usage() {
            Ok(after) if after.used_bytes > used_before => after.used_bytes - used_before,
            _ => estimated,
        }
    }

    /// Unload victims until `required` bytes are freed or candidates run
    /// out. A victim that fails to unload is logged and skipped, never
    /// fatal. Returns the bytes actually freed.
    async fn evict_for_admission(&self, required: u64) -> u64 {
        let strategy = self.unload_strategy();
        let snapshot = self.registry.snapshot();
        let victims = select_victims(&snapshot, required, strategy);
        let mut freed = 0u64;
        for victim in victims {
            let Some(entry) = snapshot.get(&victim) else { continue };
            match self.backend.unload(&victim, &CancelToken::new()).await {
                Ok(()) => {
                    self.registry.remove(&victim);
                    freed = freed.saturating_add(entry.vram_bytes);
                    self.events.publish(PoolEvent::Evicted {
                        model_name: victim.clone(),
                        strategy,
                    });
                    info!(model = %victim, strategy = %strategy, freed_bytes = entry.vram_bytes, "evicted for admission");
                }
                Err(e) => {
                    warn!(model = %victim, error = %e, "victim unload failed, skipping");
                }
            }
        }
        freed
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockBackend, MockTelemetry};
    use modelpool_core::budget::{VramBudget, GIB};

    fn pool_with(total: u64, used: u64) -> (Arc<ModelPool>, Arc<MockBackend>, Arc<MockTelemetry>) {
        let backend = Arc::new(MockBackend::new());
        let telemetry = Arc::new(MockTelemetry::new(used, total));
        let config = PoolConfig::new(VramBudget::new(total));
        let pool =
            ModelPool::new(config, backend.clone(), telemetry.clone()).expect("valid config");
        (Arc::new(pool), backend, telemetry)
    }

    // ── validation ───────────────────────────────────────────────

    #[tokio::test]
    async fn empty_name_is_a_validation_failure() {
        let (pool, backend, _) = pool_with(12 * GIB, 0);
        let outcome = pool.ensure_loaded("  ", OptimizationLevel::Balanced, &CancelToken::new()).await;
        assert!(!outcome.success);
        assert!(matches!(outcome.error, Some(PoolError::Validation(_))));
        assert_eq!(backend.load_calls(), 0);
        assert!(pool.loaded_models().is_empty());
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let backend = Arc::new(MockBackend::new());
        let telemetry = Arc::new(MockTelemetry::new(0, GIB));
        let config = PoolConfig::new(VramBudget::new(0));
        assert!(matches!(
            ModelPool::new(config, backend, telemetry),
            Err(PoolError::Validation(_))
        ));
    }

    // ── fast path ────────────────────────────────────────────────

    #[tokio::test]
    async fn second_load_is_a_zero_time_hit() {
        let (pool, backend, _) = pool_with(12 * GIB, 0);
        let cancel = CancelToken::new();
        let first = pool.ensure_loaded("llama-7b", OptimizationLevel::Balanced, &cancel).await;
        assert!(first.success);
        assert!(!first.already_loaded);

        let second = pool.ensure_loaded("llama-7b", OptimizationLevel::Balanced, &cancel).await;
        assert!(second.success);
        assert!(second.already_loaded);
        assert_eq!(second.load_time, std::time::Duration::ZERO);
        assert_eq!(backend.load_calls(), 1);

        let entry = pool.loaded_models().remove("llama-7b").unwrap();
        assert_eq!(entry.usage_count, 2);
    }

    // ── failure semantics ────────────────────────────────────────

    #[tokio::test]
    async fn backend_failure_leaves_no_entry() {
        let (pool, backend, _) = pool_with(12 * GIB, 0);
        backend.fail_load("broken-7b");
        let outcome =
            pool.ensure_loaded("broken-7b", OptimizationLevel::Speed, &CancelToken::new()).await;
        assert!(!outcome.success);
        assert!(matches!(outcome.error, Some(PoolError::Backend(_))));
        assert!(pool.loaded_models().is_empty());
        assert_eq!(pool.memory_stats().reserved_bytes, 0);
    }

    #[tokio::test]
    async fn cancelled_load_registers_nothing() {
        let (pool, _, _) = pool_with(12 * GIB, 0);
        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome = pool.ensure_loaded("llama-7b", OptimizationLevel::Speed, &cancel).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error, Some(PoolError::Cancelled));
        assert!(pool.loaded_models().is_empty());
    }

    #[tokio::test]
    async fn unload_not_resident_is_idempotent() {
        let (pool, backend, _) = pool_with(12 * GIB, 0);
        let outcome = pool.unload("ghost", &CancelToken::new()).await;
        assert!(outcome.success);
        assert!(!outcome.was_resident);
        assert_eq!(backend.unload_calls(), 0);
    }

    #[tokio::test]
    async fn failed_unload_keeps_model_resident() {
        let (pool, backend, _) = pool_with(12 * GIB, 0);
        let cancel = CancelToken::new();
        pool.ensure_loaded("llama-7b", OptimizationLevel::Speed, &cancel).await;
        backend.fail_unload("llama-7b");
        let outcome = pool.unload("llama-7b", &cancel).await;
        assert!(!outcome.success);
        assert!(pool.loaded_models().contains_key("llama-7b"));
    }

    // ── telemetry fallback ───────────────────────────────────────

    #[tokio::test]
    async fn telemetry_failure_does_not_fail_the_load() {
        let (pool, _, telemetry) = pool_with(12 * GIB, 0);
        telemetry.set_failing(true);
        let outcome =
            pool.ensure_loaded("llama-7b", OptimizationLevel::Balanced, &CancelToken::new()).await;
        assert!(outcome.success);
        // Fallback accounting uses the sizing estimate.
        assert_eq!(outcome.vram_bytes, 7 * GIB / 2);
    }

    // ── pinning / strategy plumbing ──────────────────────────────

    #[tokio::test]
    async fn set_pinned_requires_residency() {
        let (pool, _, _) = pool_with(12 * GIB, 0);
        assert!(!pool.set_pinned("ghost", true));
        pool.ensure_loaded("llama-7b", OptimizationLevel::Speed, &CancelToken::new()).await;
        assert!(pool.set_pinned("llama-7b", true));
        assert!(pool.loaded_models()["llama-7b"].pinned);
    }

    #[tokio::test]
    async fn configure_auto_reclaim_swaps_strategy() {
        let (pool, _, _) = pool_with(12 * GIB, 0);
        assert_eq!(pool.unload_strategy(), UnloadStrategy::LeastRecentlyUsed);
        pool.configure_auto_reclaim(UnloadStrategy::LargestFirst);
        assert_eq!(pool.unload_strategy(), UnloadStrategy::LargestFirst);
    }

    // ── stats surface ────────────────────────────────────────────

    #[tokio::test]
    async fn memory_stats_track_residents() {
        let (pool, _, _) = pool_with(12 * GIB, 0);
        pool.ensure_loaded("llama-7b", OptimizationLevel::Balanced, &CancelToken::new()).await;
        let stats = pool.memory_stats();
        assert_eq!(stats.resident_models, 1);
        assert_eq!(stats.tracked_vram_bytes, 7 * GIB / 2);
        assert_eq!(stats.reserved_bytes, 0);
        assert!(stats.utilization > 0.0);
    }

    #[tokio::test]
    async fn usage_summaries_survive_eviction() {
        let (pool, _, _) = pool_with(12 * GIB, 0);
        let cancel = CancelToken::new();
        pool.ensure_loaded("llama-7b", OptimizationLevel::Speed, &cancel).await;
        pool.unload("llama-7b", &cancel).await;
        let summaries = pool.usage_summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].model_name, "llama-7b");
    }

    // ── loading status ───────────────────────────────────────────

    #[tokio::test]
    async fn loading_status_clears_after_completion() {
        let (pool, _, _) = pool_with(12 * GIB, 0);
        pool.ensure_loaded("llama-7b", OptimizationLevel::Speed, &CancelToken::new()).await;
        assert!(pool.loading_status("llama-7b").is_none());
    }
}
