//! Compile-time registry of matcher presets.
//!
//! Each preset is a complete [`MatcherConfig`] defined in a TOML file under
//! `presets/`. The registry embeds these at compile time and exposes them
//! via [`all_presets`] and [`preset`].

use geomatch_matcher_models::MatcherConfig;

use crate::ConfigError;

/// Preset used when neither `--preset` nor `--config` is given.
pub const DEFAULT_PRESET: &str = "tiered";

// ── Compile-time embedded TOML files ────────────────────────────────

const PRESET_TOMLS: &[(&str, &str)] = &[
    ("tiered", include_str!("../presets/tiered.toml")),
    ("nodes_reference", include_str!("../presets/nodes_reference.toml")),
    ("corpus_recent", include_str!("../presets/corpus_recent.toml")),
    ("dictionary", include_str!("../presets/dictionary.toml")),
    ("char_bigram", include_str!("../presets/char_bigram.toml")),
];

#[cfg(test)]
const EXPECTED_PRESET_COUNT: usize = 5;

/// Returns every embedded preset.
///
/// # Panics
///
/// Panics if any TOML preset is malformed (this is a compile-time guarantee
/// since the presets are embedded).
#[must_use]
pub fn all_presets() -> Vec<MatcherConfig> {
    PRESET_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse matcher preset '{name}': {e}"))
        })
        .collect()
}

/// Looks up a preset by id.
///
/// # Errors
///
/// Returns [`ConfigError::UnknownPreset`] if no preset has that id.
pub fn preset(id: &str) -> Result<MatcherConfig, ConfigError> {
    all_presets()
        .into_iter()
        .find(|p| p.id == id)
        .ok_or_else(|| ConfigError::UnknownPreset(id.to_string()))
}

/// Returns the ids of all presets, in registry order.
#[must_use]
pub fn preset_ids() -> Vec<&'static str> {
    PRESET_TOMLS.iter().map(|(id, _)| *id).collect()
}
