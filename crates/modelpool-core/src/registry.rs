//! Concurrent registry of resident models.
//!
//! One [`ResidentModel`] per loaded model, keyed by name. All operations
//! are individually atomic behind an interior read-write lock; iteration is
//! only available through [`ModelRegistry::snapshot`] so concurrent eviction
//! can never produce a torn read.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::sizing::SizeInfo;

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

// ── Resident model ────────────────────────────────────────────────────────

/// A model currently occupying GPU memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidentModel {
    /// Unique model name, immutable.
    pub name: String,
    /// Host-memory footprint in bytes (measured or estimated).
    pub system_memory_bytes: u64,
    /// VRAM footprint in bytes (measured or estimated).
    pub vram_bytes: u64,
    /// When the model finished loading (ms since epoch).
    pub loaded_at_ms: u64,
    /// Last time a request hit this model (ms since epoch).
    pub last_used_at_ms: u64,
    /// Monotonic count of requests served since load.
    pub usage_count: u64,
    /// Pinned models are exempt from eviction.
    pub pinned: bool,
    /// Size metadata from the load-time derivation.
    pub size_info: SizeInfo,
}

impl ResidentModel {
    /// Create an entry for a model that just finished loading. The load
    /// itself counts as the first use.
    pub fn new(name: impl Into<String>, vram_bytes: u64, size_info: SizeInfo) -> Self {
        let now = now_ms();
        Self {
            name: name.into(),
            system_memory_bytes: 0,
            vram_bytes,
            loaded_at_ms: now,
            last_used_at_ms: now,
            usage_count: 1,
            pinned: false,
            size_info,
        }
    }

    /// Builder: set the host-memory footprint.
    pub fn with_system_memory(mut self, bytes: u64) -> Self {
        self.system_memory_bytes = bytes;
        self
    }
}

// ── Registry ──────────────────────────────────────────────────────────────

/// Concurrency-safe map of resident models.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    inner: RwLock<HashMap<String, ResidentModel>>,
}

impl ModelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `model.name`.
    pub fn upsert(&self, model: ResidentModel) {
        let mut map = self.inner.write().unwrap();
        map.insert(model.name.clone(), model);
    }

    /// Remove an entry. Returns `true` if it was present.
    pub fn remove(&self, name: &str) -> bool {
        self.inner.write().unwrap().remove(name).is_some()
    }

    /// Clone of the entry for `name`, if resident.
    pub fn get(&self, name: &str) -> Option<ResidentModel> {
        self.inner.read().unwrap().get(name).cloned()
    }

    /// Whether `name` is resident.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().unwrap().contains_key(name)
    }

    /// Point-in-time copy of the whole registry for safe iteration.
    pub fn snapshot(&self) -> HashMap<String, ResidentModel> {
        self.inner.read().unwrap().clone()
    }

    /// Atomically bump `usage_count` and refresh `last_used_at_ms`.
    /// Returns `false` if the model is not resident.
    pub fn touch_usage(&self, name: &str) -> bool {
        let mut map = self.inner.write().unwrap();
        match map.get_mut(name) {
            Some(entry) => {
                entry.usage_count += 1;
                entry.last_used_at_ms = now_ms();
                true
            }
            None => false,
        }
    }

    /// Pin or unpin a model. Returns `false` if the model is not resident.
    pub fn set_pinned(&self, name: &str, pinned: bool) -> bool {
        let mut map = self.inner.write().unwrap();
        match map.get_mut(name) {
            Some(entry) => {
                entry.pinned = pinned;
                true
            }
            None => false,
        }
    }

    /// Number of resident models.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().is_empty()
    }

    /// Names of all resident models, unordered.
    pub fn names(&self) -> Vec<String> {
        self.inner.read().unwrap().keys().cloned().collect()
    }

    /// Sum of `vram_bytes` across all resident models.
    pub fn total_vram_bytes(&self) -> u64 {
        self.inner.read().unwrap().values().map(|m| m.vram_bytes).sum()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
