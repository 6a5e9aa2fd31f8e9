#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Address resolution engine.
//!
//! Resolves free-text Malaysian addresses to geocodes by comparing each
//! input against reference records that share its postal code:
//!
//! - [`normalize`] canonicalizes text into tokens
//! - [`index`] retrieves and caches postal-code scoped candidate pools
//! - [`scorer`] filters and scores candidates
//! - [`policy`] picks the winner and applies acceptance thresholds
//! - [`engine`] runs the configured tiers for one row
//! - [`batch`] fans rows out to parallel workers and merges the results

pub mod abbreviations;
pub mod batch;
pub mod config;
pub mod engine;
pub mod index;
pub mod keywords;
pub mod normalize;
pub mod policy;
pub mod presets;
pub mod progress;
pub mod scorer;
pub mod similarity;

pub use batch::{BatchOutcome, CancelFlag, run_batch};
pub use engine::Matcher;
pub use index::{FetchRequest, MemorySource, ReferenceIndex, ReferenceSource, ReferenceStore};

/// Errors raised while loading or validating a matcher configuration.
///
/// All of these are fatal before any row is processed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `worker_count` is zero.
    #[error("worker_count must be at least 1")]
    ZeroWorkers,

    /// `candidate_row_budget` is zero.
    #[error("candidate_row_budget must be at least 1")]
    ZeroBudget,

    /// `cache_capacity` is zero.
    #[error("cache_capacity must be at least 1")]
    ZeroCacheCapacity,

    /// `progress_interval_ms` is zero.
    #[error("progress_interval_ms must be at least 1")]
    ZeroProgressInterval,

    /// A keyword vocabulary is empty after normalization.
    #[error("{name} keyword set is empty")]
    EmptyKeywordSet {
        /// Which vocabulary.
        name: &'static str,
    },

    /// No tiers configured.
    #[error("at least one tier must be configured")]
    NoTiers,

    /// Two tiers share a name.
    #[error("duplicate tier name: {0}")]
    DuplicateTier(String),

    /// A tier setting is out of range.
    #[error("tier {tier}: {message}")]
    InvalidTier {
        /// Tier name.
        tier: String,
        /// What is wrong.
        message: String,
    },

    /// An abbreviation entry is unusable.
    #[error("abbreviation {from:?} -> {to:?}: {message}")]
    InvalidAbbreviation {
        /// Phrase as configured.
        from: String,
        /// Replacement as configured.
        to: String,
        /// What is wrong.
        message: String,
    },

    /// A postal override is out of range.
    #[error("postal override {postal_code}: {message}")]
    InvalidOverride {
        /// Postal code of the override.
        postal_code: String,
        /// What is wrong.
        message: String,
    },

    /// No embedded preset has the requested id.
    #[error("unknown preset: {0}")]
    UnknownPreset(String),

    /// Config file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for [`geomatch_matcher_models::MatcherConfig`].
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors raised by a reference store.
///
/// Opening failures are fatal at startup; query failures degrade the
/// affected lookup to zero candidates.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    /// The store could not be opened.
    #[error("failed to open reference store: {0}")]
    Open(String),

    /// A read failed.
    #[error("reference query failed: {0}")]
    Query(String),
}

/// Errors that abort a batch.
#[derive(Debug, thiserror::Error)]
pub enum MatcherError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A worker could not open its reference store.
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    /// A worker task panicked or was aborted.
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
