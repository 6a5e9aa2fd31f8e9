#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared types for the geomatch address matcher.
//!
//! This crate contains only data types, configuration structs, and simple
//! conversions. It has no heavyweight dependencies (no `DuckDB`, no I/O,
//! no async runtime), so both the matching engine and the storage layer
//! can depend on it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A free-text address to be resolved, one per input row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    /// The full, noisy address text as supplied by the dataset.
    pub full_address: String,
    /// Postal code used to scope the candidate lookup (e.g. `"47300"`).
    pub postal_code: String,
}

impl AddressRecord {
    /// Creates a new address record.
    #[must_use]
    pub fn new(full_address: impl Into<String>, postal_code: impl Into<String>) -> Self {
        Self {
            full_address: full_address.into(),
            postal_code: postal_code.into(),
        }
    }

    /// Returns `true` if either the address or the postal code is blank.
    ///
    /// Malformed rows resolve to [`MatchResult::empty`] without any
    /// candidate lookup.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        self.full_address.trim().is_empty() || self.postal_code.trim().is_empty()
    }
}

/// An opaque geocode attached to a reference record.
///
/// Usually a `"lat,lng"` pair, but any identifier is carried through
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Geocode(pub String);

impl Geocode {
    /// Wraps a raw geocode value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw geocode string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Geocode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A canonical reference record that input rows are matched against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    /// Canonical address text (the key reported on a match).
    pub canonical_text: String,
    /// Postal code of the record.
    pub postal_code: String,
    /// Geocode reported on a match.
    pub geocode: Geocode,
}

impl ReferenceRecord {
    /// Creates a new reference record.
    #[must_use]
    pub fn new(
        canonical_text: impl Into<String>,
        postal_code: impl Into<String>,
        geocode: impl Into<String>,
    ) -> Self {
        Self {
            canonical_text: canonical_text.into(),
            postal_code: postal_code.into(),
            geocode: Geocode::new(geocode),
        }
    }
}

/// The outcome for a single input row.
///
/// Absence of a match is represented by [`MatchResult::empty`] (no
/// geocode, no key, score 0), never by a missing row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Geocode of the accepted candidate.
    pub geocode: Option<Geocode>,
    /// Display form of the accepted candidate's canonical text.
    pub matched_key: Option<String>,
    /// Score in `0..=100`.
    pub score: u8,
    /// Name of the tier that accepted the match.
    pub tier: Option<String>,
}

impl MatchResult {
    /// The zero result: no geocode, no key, score 0.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            geocode: None,
            matched_key: None,
            score: 0,
            tier: None,
        }
    }

    /// Returns `true` if this result carries a geocode.
    #[must_use]
    pub const fn is_match(&self) -> bool {
        self.geocode.is_some()
    }
}

/// Advisory summary of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Number of input rows.
    pub total: u64,
    /// Rows that resolved to a geocode.
    pub matched: u64,
    /// Rows that did not.
    pub unmatched: u64,
    /// Matched rows per accepting tier.
    pub per_tier: BTreeMap<String, u64>,
    /// Wall-clock duration of the batch in seconds.
    pub elapsed_secs: f64,
}

impl BatchSummary {
    /// Fraction of rows matched, as a percentage.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn match_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.matched as f64 * 100.0 / self.total as f64
    }
}

// ── Configuration ───────────────────────────────────────────────────

/// Full configuration for a matching run.
///
/// Loaded from an embedded preset or a user TOML file. Validation lives in
/// the matcher crate and runs once before any row is processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Unique identifier (e.g. `"tiered"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Free-text description shown by `geomatch presets`.
    #[serde(default)]
    pub description: String,
    /// Number of parallel workers.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Maximum candidates retrieved per postal code.
    #[serde(default = "default_row_budget")]
    pub candidate_row_budget: usize,
    /// Corpus partitions in priority order (most recent first).
    #[serde(default)]
    pub partitions: Vec<String>,
    /// How often the progress reporter polls the shared counter.
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
    /// Maximum postal codes held in each worker's candidate cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Append the row's postal code to the matched key.
    #[serde(default)]
    pub append_postal_code: bool,
    /// Keyword sets; `None` fields fall back to the built-in tables.
    #[serde(default)]
    pub keywords: KeywordConfig,
    /// Abbreviation dictionary; `None` uses the built-in table.
    #[serde(default)]
    pub abbreviations: Option<Vec<Abbreviation>>,
    /// Matching passes, tried in order.
    #[serde(default)]
    pub tiers: Vec<TierConfig>,
    /// Postal codes that require a stricter acceptance threshold.
    #[serde(default)]
    pub postal_overrides: Vec<PostalOverride>,
}

const fn default_worker_count() -> usize {
    4
}

const fn default_row_budget() -> usize {
    12_000
}

const fn default_progress_interval_ms() -> u64 {
    500
}

const fn default_cache_capacity() -> usize {
    4_096
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            description: String::new(),
            worker_count: default_worker_count(),
            candidate_row_budget: default_row_budget(),
            partitions: Vec::new(),
            progress_interval_ms: default_progress_interval_ms(),
            cache_capacity: default_cache_capacity(),
            append_postal_code: false,
            keywords: KeywordConfig::default(),
            abbreviations: None,
            tiers: Vec::new(),
            postal_overrides: Vec::new(),
        }
    }
}

/// Keyword vocabularies used by the scorer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeywordConfig {
    /// Vocabulary naming a structure (residential, commercial, public).
    pub building: Option<Vec<String>>,
    /// Named localities used to detect conflicting neighbourhoods.
    pub areas: Option<Vec<String>>,
    /// Stop tokens ignored by the significant-token overlap.
    pub common: Option<Vec<String>>,
}

/// A single dictionary entry folding a phrase into its abbreviation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Abbreviation {
    /// Phrase to replace (one or more words).
    pub from: String,
    /// Replacement token.
    pub to: String,
}

impl Abbreviation {
    /// Creates a dictionary entry.
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// A postal code with a stricter-than-global acceptance threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalOverride {
    /// Postal code the override applies to.
    pub postal_code: String,
    /// Minimum score required for rows with this postal code.
    pub accept_threshold: u8,
}

/// How a tier decides between candidates.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TierKind {
    /// Pre-filters, composite similarity score, threshold.
    #[default]
    Fuzzy,
    /// Every candidate token must appear in the input.
    Coverage,
    /// The candidate's cleaned text must occur inside the cleaned input.
    Substring,
    /// Cosine similarity of character-bigram TF-IDF vectors fitted on the
    /// candidate pool, scaled to `0..=100`, then threshold.
    CharNgram,
}

/// Which candidates a tier draws from its collection.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReferenceScope {
    /// Only candidates sharing the row's postal code.
    #[default]
    PostalCode,
    /// The whole collection, capped by the row budget.
    All,
}

/// A single matching pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    /// Unique tier name, reported in [`MatchResult::tier`].
    pub name: String,
    /// Reference collection the tier draws candidates from.
    pub collection: String,
    /// Candidate scoping.
    #[serde(default)]
    pub scope: ReferenceScope,
    /// Whether the configured partitions are scanned in priority order.
    #[serde(default)]
    pub partitioned: bool,
    /// Decision strategy.
    #[serde(default)]
    pub kind: TierKind,
    /// Minimum score for acceptance (fuzzy tiers).
    #[serde(default = "default_accept_threshold")]
    pub accept_threshold: u8,
    /// Pre-filters applied before scoring (fuzzy tiers).
    #[serde(default)]
    pub filters: FilterConfig,
    /// Boosts and penalties (fuzzy tiers).
    #[serde(default)]
    pub scoring: ScoringConfig,
}

const fn default_accept_threshold() -> u8 {
    85
}

/// Candidate pre-filters. A candidate failing any of these is discarded
/// without being scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Minimum raw token overlap between input and candidate.
    #[serde(default = "default_min_token_overlap")]
    pub min_token_overlap: usize,
    /// Stricter overlap demanded of long inputs.
    #[serde(default)]
    pub strict_overlap: Option<StrictOverlap>,
    /// Minimum fuzzy token-set ratio in `0.0..=1.0`.
    #[serde(default = "default_min_fuzzy_ratio")]
    pub min_fuzzy_ratio: f64,
    /// Minimum Jaccard similarity in `0.0..=1.0`.
    #[serde(default = "default_min_jaccard")]
    pub min_jaccard: f64,
    /// Significant-token overlap that waives the Jaccard minimum.
    #[serde(default = "default_significant_overlap_rescue")]
    pub significant_overlap_rescue: Option<usize>,
    /// Inputs with fewer tokens than this must name a building.
    #[serde(default)]
    pub require_building_keyword_below: Option<usize>,
    /// Require a shared non-common token longer than two characters.
    #[serde(default)]
    pub require_primary_overlap: bool,
    /// Candidates with at most this many tokens and no digit are generic
    /// boilerplate (state or region names) and are never scored. `None`
    /// scores every candidate.
    #[serde(default)]
    pub generic_max_tokens: Option<usize>,
}

const fn default_min_token_overlap() -> usize {
    5
}

const fn default_min_fuzzy_ratio() -> f64 {
    0.75
}

const fn default_min_jaccard() -> f64 {
    0.6
}

#[allow(clippy::unnecessary_wraps)]
const fn default_significant_overlap_rescue() -> Option<usize> {
    Some(3)
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_token_overlap: default_min_token_overlap(),
            strict_overlap: None,
            min_fuzzy_ratio: default_min_fuzzy_ratio(),
            min_jaccard: default_min_jaccard(),
            significant_overlap_rescue: default_significant_overlap_rescue(),
            require_building_keyword_below: None,
            require_primary_overlap: false,
            generic_max_tokens: None,
        }
    }
}

/// Minimum overlap for inputs with at least `min_input_tokens` tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrictOverlap {
    /// Input token count at which the stricter rule kicks in.
    pub min_input_tokens: usize,
    /// Overlap required once it does.
    pub min_overlap: usize,
}

/// Keyword boosts and penalties, on the `0.0..=1.0` scale unless noted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Added when both texts name a building.
    #[serde(default = "default_building_boost")]
    pub building_boost: f64,
    /// Subtracted when exactly one text names a building.
    #[serde(default = "default_penalty")]
    pub building_mismatch_penalty: f64,
    /// Subtracted when both texts name different localities.
    #[serde(default = "default_penalty")]
    pub area_conflict_penalty: f64,
    /// Added on the `0..=100` scale when the candidate text occurs
    /// verbatim in the input.
    #[serde(default)]
    pub substring_bonus: Option<f64>,
}

const fn default_building_boost() -> f64 {
    0.10
}

const fn default_penalty() -> f64 {
    0.05
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            building_boost: default_building_boost(),
            building_mismatch_penalty: default_penalty(),
            area_conflict_penalty: default_penalty(),
            substring_bonus: None,
        }
    }
}
