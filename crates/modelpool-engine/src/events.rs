//! Pool event notifications.
//!
//! State changes are published on a bounded broadcast channel instead of
//! callback handlers, so observers (dashboards, metrics bridges) subscribe
//! without coupling to pool internals. Publishing never blocks and never
//! fails the publishing operation; slow subscribers lag and miss events.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use modelpool_core::eviction::UnloadStrategy;

/// A state change inside the pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PoolEvent {
    /// A model finished loading and was registered.
    Loaded {
        model_name: String,
        vram_bytes: u64,
        load_ms: u64,
    },
    /// A model was unloaded on caller request.
    Unloaded { model_name: String },
    /// A model was evicted to make room for an admission.
    Evicted {
        model_name: String,
        strategy: UnloadStrategy,
    },
    /// A model was evicted by the auto-reclaim scheduler.
    Reclaimed {
        model_name: String,
        used_bytes_before: u64,
    },
    /// A load attempt failed.
    LoadFailed {
        model_name: String,
        reason: String,
    },
}

/// Broadcast fan-out for [`PoolEvent`]s.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<PoolEvent>,
}

impl EventBus {
    /// Create a bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. A send with no live subscribers is not an error.
    pub fn publish(&self, event: PoolEvent) {
        let _ = self.sender.send(event);
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
