//! Settings derivation and memory sizing.
//!
//! [`derive_settings`] is the pure mapping from a model name and an
//! [`OptimizationLevel`] to the [`OptimizationSettings`] the backend is
//! loaded with, plus the estimated VRAM footprint the admission check uses.
//! Deterministic by construction: same inputs, same outputs.

use serde::{Deserialize, Serialize};

use crate::budget::GIB;

// ── Optimization level ────────────────────────────────────────────────────

/// How aggressively the pool trades quality for memory and speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationLevel {
    /// Full precision, largest context.
    Quality,
    /// 8-bit quantization, mid-size context.
    Balanced,
    /// 4-bit quantization, smallest context, largest batches.
    Speed,
    /// Caller-tuned starting point; same preset as `Balanced`.
    Custom,
}

impl std::fmt::Display for OptimizationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Quality => write!(f, "quality"),
            Self::Balanced => write!(f, "balanced"),
            Self::Speed => write!(f, "speed"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

// ── Quantization ──────────────────────────────────────────────────────────

/// Weight quantization applied at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quantization {
    /// No quantization (16-bit weights).
    None,
    /// 8-bit weights, halves the footprint.
    Int8,
    /// 4-bit weights, quarters the footprint.
    Int4,
}

impl Quantization {
    /// Effective bits per weight.
    pub fn bits(self) -> u8 {
        match self {
            Self::None => 16,
            Self::Int8 => 8,
            Self::Int4 => 4,
        }
    }

    /// Divisor applied to the full-precision footprint.
    pub fn footprint_divisor(self) -> u64 {
        match self {
            Self::None => 1,
            Self::Int8 => 2,
            Self::Int4 => 4,
        }
    }
}

// ── Settings ──────────────────────────────────────────────────────────────

/// Runtime settings derived for one load request. Immutable once computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationSettings {
    /// Quantization applied to the weights.
    pub quantization: Quantization,
    /// Context window size in tokens.
    pub context_window: u32,
    /// Maximum tokens generated per response.
    pub max_tokens_per_response: u32,
    /// Decode batch size.
    pub batch_size: u32,
    /// Whether layers are placed on the GPU.
    pub gpu_layers: bool,
}

/// Size metadata recorded alongside a resident model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeInfo {
    /// Estimated on-disk size of the weights in bytes.
    pub file_size_bytes_estimate: u64,
    /// Bits per weight after quantization (4, 8, or 16).
    pub quantization_bits: u8,
    /// Coarse architecture family parsed from the model name.
    pub architecture_tag: String,
}

// ── Preset table ──────────────────────────────────────────────────────────

struct LevelPreset {
    level: OptimizationLevel,
    quantization: Quantization,
    context_window: u32,
    max_tokens_per_response: u32,
    batch_size: u32,
}

/// Lookup table keyed by level. Adding a level means adding a row, not a
/// branch.
const LEVEL_PRESETS: &[LevelPreset] = &[
    LevelPreset {
        level: OptimizationLevel::Quality,
        quantization: Quantization::None,
        context_window: 8192,
        max_tokens_per_response: 2048,
        batch_size: 1,
    },
    LevelPreset {
        level: OptimizationLevel::Balanced,
        quantization: Quantization::Int8,
        context_window: 4096,
        max_tokens_per_response: 1024,
        batch_size: 2,
    },
    LevelPreset {
        level: OptimizationLevel::Speed,
        quantization: Quantization::Int4,
        context_window: 2048,
        max_tokens_per_response: 512,
        batch_size: 4,
    },
    LevelPreset {
        level: OptimizationLevel::Custom,
        quantization: Quantization::Int8,
        context_window: 4096,
        max_tokens_per_response: 1024,
        batch_size: 2,
    },
];

/// Base size table: (name substring, full-precision footprint).
const BASE_SIZES: &[(&str, u64)] = &[("13b", 13 * GIB), ("7b", 7 * GIB), ("3b", 3 * GIB)];

/// Footprint assumed when the name carries no recognized size marker.
const DEFAULT_BASE_BYTES: u64 = 7 * GIB;

fn preset_for(level: OptimizationLevel) -> &'static LevelPreset {
    LEVEL_PRESETS
        .iter()
        .find(|p| p.level == level)
        .expect("every OptimizationLevel has a preset row")
}

/// Full-precision footprint estimate from the model name.
fn base_size_bytes(model_name: &str) -> u64 {
    let lowered = model_name.to_ascii_lowercase();
    BASE_SIZES
        .iter()
        .find(|(marker, _)| lowered.contains(marker))
        .map_or(DEFAULT_BASE_BYTES, |&(_, bytes)| bytes)
}

/// Coarse architecture family from the model name.
fn architecture_tag(model_name: &str) -> String {
    let lowered = model_name.to_ascii_lowercase();
    for family in ["mixtral", "mistral", "llama", "qwen", "phi", "gemma"] {
        if lowered.contains(family) {
            return family.to_string();
        }
    }
    "transformer".to_string()
}

// ── Derivation ────────────────────────────────────────────────────────────

/// Derive the runtime settings and estimated VRAM footprint for loading
/// `model_name` at `level`.
pub fn derive_settings(
    model_name: &str,
    level: OptimizationLevel,
) -> (OptimizationSettings, u64) {
    let preset = preset_for(level);
    let base = base_size_bytes(model_name);
    let estimated = base / preset.quantization.footprint_divisor();

    let settings = OptimizationSettings {
        quantization: preset.quantization,
        context_window: preset.context_window,
        max_tokens_per_response: preset.max_tokens_per_response,
        batch_size: preset.batch_size,
        gpu_layers: true,
    };
    (settings, estimated)
}

/// Build the [`SizeInfo`] recorded on a registry entry for this derivation.
pub fn size_info(model_name: &str, settings: &OptimizationSettings) -> SizeInfo {
    SizeInfo {
        file_size_bytes_estimate: base_size_bytes(model_name),
        quantization_bits: settings.quantization.bits(),
        architecture_tag: architecture_tag(model_name),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── presets ──────────────────────────────────────────────────

    #[test]
    fn quality_preset() {
        let (s, _) = derive_settings("llama-7b", OptimizationLevel::Quality);
        assert_eq!(s.quantization, Quantization::None);
        assert_eq!(s.context_window, 8192);
        assert_eq!(s.batch_size, 1);
        assert!(s.gpu_layers);
    }

    #[test]
    fn balanced_preset() {
        let (s, _) = derive_settings("llama-7b", OptimizationLevel::Balanced);
        assert_eq!(s.quantization, Quantization::Int8);
        assert_eq!(s.context_window, 4096);
        assert_eq!(s.batch_size, 2);
    }

    #[test]
    fn speed_preset() {
        let (s, _) = derive_settings("llama-7b", OptimizationLevel::Speed);
        assert_eq!(s.quantization, Quantization::Int4);
        assert_eq!(s.context_window, 2048);
        assert_eq!(s.batch_size, 4);
    }

    #[test]
    fn custom_matches_balanced_preset() {
        let (custom, _) = derive_settings("m", OptimizationLevel::Custom);
        let (balanced, _) = derive_settings("m", OptimizationLevel::Balanced);
        assert_eq!(custom, balanced);
    }

    // ── base size and quantization math ──────────────────────────

    #[test]
    fn seven_b_at_balanced_is_three_and_a_half_gib() {
        let (_, bytes) = derive_settings("llama-7b", OptimizationLevel::Balanced);
        assert_eq!(bytes, 7 * GIB / 2);
    }

    #[test]
    fn thirteen_b_at_speed_is_three_and_a_quarter_gib() {
        let (_, bytes) = derive_settings("mixtral-13b", OptimizationLevel::Speed);
        assert_eq!(bytes, 13 * GIB / 4);
    }

    #[test]
    fn thirteen_b_at_quality_is_unquantized() {
        let (_, bytes) = derive_settings("some-13b-chat", OptimizationLevel::Quality);
        assert_eq!(bytes, 13 * GIB);
    }

    #[test]
    fn three_b_marker() {
        let (_, bytes) = derive_settings("phi-3b", OptimizationLevel::Quality);
        assert_eq!(bytes, 3 * GIB);
    }

    #[test]
    fn unknown_name_defaults_to_seven_gib() {
        let (_, bytes) = derive_settings("mystery-model", OptimizationLevel::Quality);
        assert_eq!(bytes, 7 * GIB);
    }

    #[test]
    fn marker_match_is_case_insensitive() {
        let (_, upper) = derive_settings("LLAMA-13B", OptimizationLevel::Quality);
        let (_, lower) = derive_settings("llama-13b", OptimizationLevel::Quality);
        assert_eq!(upper, lower);
    }

    #[test]
    fn thirteen_b_wins_over_embedded_three_b() {
        // "13b" contains "3b"; the 13b row is consulted first.
        let (_, bytes) = derive_settings("big-13b", OptimizationLevel::Quality);
        assert_eq!(bytes, 13 * GIB);
    }

    // ── determinism ──────────────────────────────────────────────

    #[test]
    fn derivation_is_deterministic() {
        let a = derive_settings("llama-7b", OptimizationLevel::Balanced);
        let b = derive_settings("llama-7b", OptimizationLevel::Balanced);
        assert_eq!(a, b);
    }

    // ── size info ────────────────────────────────────────────────

    #[test]
    fn size_info_records_quant_bits() {
        let (settings, _) = derive_settings("llama-7b", OptimizationLevel::Speed);
        let info = size_info("llama-7b", &settings);
        assert_eq!(info.quantization_bits, 4);
        assert_eq!(info.file_size_bytes_estimate, 7 * GIB);
        assert_eq!(info.architecture_tag, "llama");
    }

    #[test]
    fn architecture_tag_families() {
        assert_eq!(architecture_tag("Mixtral-13b-instruct"), "mixtral");
        assert_eq!(architecture_tag("qwen-7b"), "qwen");
        assert_eq!(architecture_tag("totally-new-arch"), "transformer");
    }

    #[test]
    fn quantization_bits_and_divisors() {
        assert_eq!(Quantization::None.bits(), 16);
        assert_eq!(Quantization::Int8.bits(), 8);
        assert_eq!(Quantization::Int4.bits(), 4);
        assert_eq!(Quantization::None.footprint_divisor(), 1);
        assert_eq!(Quantization::Int8.footprint_divisor(), 2);
        assert_eq!(Quantization::Int4.footprint_divisor(), 4);
    }

    #[test]
    fn level_serde_roundtrip() {
        for level in [
            OptimizationLevel::Quality,
            OptimizationLevel::Balanced,
            OptimizationLevel::Speed,
            OptimizationLevel::Custom,
        ] {
            let json = serde_json::to_string(&level).unwrap();
            let back: OptimizationLevel = serde_json::from_str(&json).unwrap();
            assert_eq!(back, level);
        }
    }
}
