//! Model runtime backend contract.
//!
//! The pool orchestrates *when* models are loaded; the backend owns *how*.
//! Load and unload are the only operations assumed to block for non-trivial
//! time, so both take the caller's cancellation token. `infer` exists for
//! warmup priming and benchmarks only; request serving goes through the
//! embedding application, not this crate.

use async_trait::async_trait;
use thiserror::Error;

use modelpool_core::sizing::OptimizationSettings;

use crate::cancel::CancelToken;

/// Failure reported by the model runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The operation observed the cancellation token.
    #[error("backend operation cancelled")]
    Cancelled,

    /// The runtime failed (load error, OOM, device fault, …).
    #[error("{0}")]
    Failed(String),
}

/// Asynchronous model runtime the pool drives.
///
/// Implementations must be safe to call from multiple tasks concurrently;
/// the pool serializes per-name loads itself but may unload one model while
/// loading another.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Load `name` with the given settings. Must not leave partial state on
    /// error or cancellation.
    async fn load(
        &self,
        name: &str,
        settings: &OptimizationSettings,
        cancel: &CancelToken,
    ) -> Result<(), BackendError>;

    /// Unload `name`, releasing its device memory.
    async fn unload(&self, name: &str, cancel: &CancelToken) -> Result<(), BackendError>;

    /// Run one inference against `name`. Used for warmup priming and
    /// benchmarking.
    async fn infer(
        &self,
        name: &str,
        prompt: &str,
        cancel: &CancelToken,
    ) -> Result<String, BackendError>;
}
