//! Shared helpers for the integration suites.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use modelpool_core::budget::VramBudget;
use modelpool_engine::config::PoolConfig;
use modelpool_engine::pool::ModelPool;
use modelpool_engine::testing::{MockBackend, MockTelemetry};

static TRACING: Once = Once::new();

/// Install a test subscriber once per binary. `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A pool over mocks with `total` device bytes and nothing used.
pub fn build_pool(total: u64) -> (Arc<ModelPool>, Arc<MockBackend>, Arc<MockTelemetry>) {
    init_tracing();
    let backend = Arc::new(MockBackend::new());
    let telemetry = Arc::new(MockTelemetry::new(0, total));
    let config = PoolConfig::new(VramBudget::new(total));
    let pool = ModelPool::new(config, backend.clone(), telemetry.clone()).expect("valid config");
    (Arc::new(pool), backend, telemetry)
}

/// Keep the mock telemetry's "used" reading in sync with what the registry
/// tracks, the way a real device counter would move after loads/unloads.
pub fn sync_telemetry(pool: &ModelPool, telemetry: &MockTelemetry) {
    let tracked: u64 = pool.loaded_models().values().map(|m| m.vram_bytes).sum();
    telemetry.set_used(tracked);
}
