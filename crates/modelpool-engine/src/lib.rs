//! Async engine for the modelpool VRAM manager.
//!
//! Orchestrates model residency against a fixed GPU memory budget. Key
//! components:
//!
//! - [`pool::ModelPool`] — admission, eviction, load/unload orchestration.
//! - [`reclaim::ReclaimScheduler`] — periodic background reclamation.
//! - [`backend::ModelBackend`] — contract for the model runtime.
//! - [`events::PoolEvent`] — broadcast stream of state changes.
//! - [`testing`] — scriptable backend/telemetry fakes.
//!
//! ```no_run
//! use std::sync::Arc;
//! use modelpool_core::budget::{VramBudget, GIB};
//! use modelpool_core::sizing::OptimizationLevel;
//! use modelpool_engine::cancel::CancelToken;
//! use modelpool_engine::config::PoolConfig;
//! use modelpool_engine::pool::ModelPool;
//! use modelpool_engine::reclaim::ReclaimScheduler;
//! use modelpool_engine::testing::{MockBackend, MockTelemetry};
//!
//! # #[tokio::main] async fn main() {
//! let config = PoolConfig::new(VramBudget::new(12 * GIB));
//! let pool = Arc::new(
//!     ModelPool::new(
//!         config,
//!         Arc::new(MockBackend::new()),
//!         Arc::new(MockTelemetry::new(0, 12 * GIB)),
//!     )
//!     .unwrap(),
//! );
//! let scheduler = ReclaimScheduler::spawn(pool.clone());
//!
//! let outcome = pool
//!     .ensure_loaded("llama-7b", OptimizationLevel::Balanced, &CancelToken::new())
//!     .await;
//! assert!(outcome.success);
//!
//! scheduler.stop().await;
//! # }
//! ```

pub mod backend;
pub mod cancel;
pub mod config;
pub mod error;
pub mod events;
pub mod optimizer;
pub mod pool;
pub mod reclaim;
pub mod testing;
pub mod warmup;

pub use backend::{BackendError, ModelBackend};
pub use cancel::CancelToken;
pub use config::PoolConfig;
pub use error::{LoadOutcome, PoolError, UnloadOutcome, WarmupOutcome};
pub use events::{EventBus, PoolEvent};
pub use optimizer::{Impact, OptimizationReport, Recommendation, UseCase};
pub use pool::{LoadPhase, ModelPool, PoolMemoryStats};
pub use reclaim::ReclaimScheduler;
