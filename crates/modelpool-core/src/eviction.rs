//! Victim selection for freeing VRAM.
//!
//! [`select_victims`] is a pure function over a registry snapshot: it never
//! touches the live registry, so callers decide when (and whether) the
//! selected models are actually unloaded.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::registry::ResidentModel;

/// Which resident models go first when memory must be freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnloadStrategy {
    /// Oldest `last_used_at` first.
    LeastRecentlyUsed,
    /// Smallest `usage_count` first.
    LowestUsageFrequency,
    /// Largest `vram_bytes` first.
    LargestFirst,
}

impl Default for UnloadStrategy {
    fn default() -> Self {
        Self::LeastRecentlyUsed
    }
}

impl std::fmt::Display for UnloadStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LeastRecentlyUsed => write!(f, "least-recently-used"),
            Self::LowestUsageFrequency => write!(f, "lowest-usage-frequency"),
            Self::LargestFirst => write!(f, "largest-first"),
        }
    }
}

/// Select models to unload until at least `required_bytes` of VRAM would be
/// freed.
///
/// Pinned entries are never candidates. Candidates are ordered by the
/// strategy key with the model name as tie-break, then accumulated greedily.
/// If every candidate together still falls short of `required_bytes` the
/// full ordered list is returned; the caller may still be short, which is
/// a known shortfall rather than an error.
pub fn select_victims(
    snapshot: &HashMap<String, ResidentModel>,
    required_bytes: u64,
    strategy: UnloadStrategy,
) -> Vec<String> {
    if required_bytes == 0 {
        return Vec::new();
    }

    let mut candidates: Vec<&ResidentModel> =
        snapshot.values().filter(|m| !m.pinned).collect();

    match strategy {
        UnloadStrategy::LeastRecentlyUsed => {
            candidates.sort_by(|a, b| {
                a.last_used_at_ms.cmp(&b.last_used_at_ms).then_with(|| a.name.cmp(&b.name))
            });
        }
        UnloadStrategy::LowestUsageFrequency => {
            candidates.sort_by(|a, b| {
                a.usage_count.cmp(&b.usage_count).then_with(|| a.name.cmp(&b.name))
            });
        }
        UnloadStrategy::LargestFirst => {
            candidates.sort_by(|a, b| {
                b.vram_bytes.cmp(&a.vram_bytes).then_with(|| a.name.cmp(&b.name))
            });
        }
    }

    let mut victims = Vec::new();
    let mut freed = 0u64;
    for model in candidates {
        victims.push(model.name.clone());
        freed = freed.saturating_add(model.vram_bytes);
        if freed >= required_bytes {
            break;
        }
    }
    victims
}

// ── Tests ─────────────────────────────────────────────────────────────────
