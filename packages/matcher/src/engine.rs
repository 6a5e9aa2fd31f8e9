//! Single-row resolution across the configured tiers.

use std::num::NonZeroUsize;

use geomatch_matcher_models::{
    AddressRecord, MatchResult, MatcherConfig, ReferenceRecord, ReferenceScope, TierConfig,
    TierKind,
};

use crate::ConfigError;
use crate::abbreviations::{self, AbbreviationTable};
use crate::config;
use crate::index::{Candidate, ReferenceIndex, ReferenceStore};
use crate::keywords::Keywords;
use crate::normalize::{Normalizer, display_key};
use crate::policy::{self, PostalOverrides};
use crate::scorer::PreparedText;

/// A validated configuration compiled for matching.
///
/// Immutable after construction and shared by every worker.
#[derive(Debug, Clone)]
pub struct Matcher {
    config: MatcherConfig,
    normalizer: Normalizer,
    keywords: Keywords,
    overrides: PostalOverrides,
}

impl Matcher {
    /// Validates and compiles a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any setting, keyword vocabulary, or
    /// abbreviation entry is invalid.
    pub fn new(config: MatcherConfig) -> Result<Self, ConfigError> {
        config::check_settings(&config)?;

        let abbreviations = match &config.abbreviations {
            Some(entries) => AbbreviationTable::compile(entries)?,
            None => AbbreviationTable::compile(&abbreviations::builtin())?,
        };
        if abbreviations.is_empty() {
            log::debug!("Abbreviation folding disabled for preset '{}'", config.id);
        } else {
            log::debug!("Compiled {} abbreviations", abbreviations.len());
        }
        let normalizer = Normalizer::new(abbreviations);
        let keywords = Keywords::from_config(&config.keywords, &normalizer)?;
        let overrides = PostalOverrides::new(&config.postal_overrides);

        Ok(Self {
            config,
            normalizer,
            keywords,
            overrides,
        })
    }

    /// The configuration this matcher was built from.
    #[must_use]
    pub const fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// The normalizer, with the configured abbreviation dictionary.
    #[must_use]
    pub const fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// The resolved keyword vocabularies.
    #[must_use]
    pub const fn keywords(&self) -> &Keywords {
        &self.keywords
    }

    /// Normalizes text and derives its keyword facts.
    #[must_use]
    pub fn prepare(&self, text: &str) -> PreparedText {
        PreparedText::new(self.normalizer.normalize(text), &self.keywords)
    }

    /// Prepares a reference record for scoring.
    #[must_use]
    pub fn prepare_candidate(&self, record: ReferenceRecord) -> Candidate {
        let text = self.prepare(&record.canonical_text);
        Candidate { record, text }
    }

    /// Wraps a worker's store in an index sized by this configuration.
    #[must_use]
    pub fn index(&self, store: Box<dyn ReferenceStore>) -> ReferenceIndex {
        ReferenceIndex::new(
            store,
            self.config.partitions.clone(),
            self.config.candidate_row_budget,
            NonZeroUsize::new(self.config.cache_capacity).unwrap_or(NonZeroUsize::MIN),
        )
    }

    /// Display key reported for an accepted candidate.
    #[must_use]
    pub fn matched_key(&self, candidate: &Candidate, postal_code: &str) -> String {
        if self.config.append_postal_code {
            display_key(&format!("{} {postal_code}", candidate.record.canonical_text))
        } else {
            display_key(&candidate.record.canonical_text)
        }
    }

    /// Resolves one row, trying each tier in order until one accepts.
    ///
    /// Malformed rows and rows no tier accepts yield
    /// [`MatchResult::empty`].
    pub fn resolve(&self, record: &AddressRecord, index: &mut ReferenceIndex) -> MatchResult {
        if record.is_malformed() {
            return MatchResult::empty();
        }

        let postal_code = record.postal_code.trim();
        let input = self.prepare(&record.full_address);
        if input.form.is_empty() {
            return MatchResult::empty();
        }

        for tier in &self.config.tiers {
            let result = self.resolve_tier(tier, &input, postal_code, index);
            if result.is_match() {
                log::trace!(
                    "Row {:?} matched {:?} in tier {} with score {}",
                    record.full_address,
                    result.matched_key,
                    tier.name,
                    result.score
                );
                return result;
            }
        }

        MatchResult::empty()
    }

    fn resolve_tier(
        &self,
        tier: &TierConfig,
        input: &PreparedText,
        postal_code: &str,
        index: &mut ReferenceIndex,
    ) -> MatchResult {
        let scope = match tier.scope {
            ReferenceScope::PostalCode => Some(postal_code),
            ReferenceScope::All => None,
        };
        let pool = index.candidates_for(&tier.collection, scope, tier.partitioned, &|record| {
            self.prepare_candidate(record)
        });
        let key = |candidate: &Candidate| self.matched_key(candidate, postal_code);

        match tier.kind {
            TierKind::Fuzzy => {
                let scores = policy::score_pool(input, &pool, tier, &self.keywords);
                let threshold = self.overrides.threshold(tier, postal_code);
                policy::decide(&pool, &scores, threshold, &tier.name, key)
            }
            TierKind::CharNgram => {
                let scores = policy::char_ngram_scores(input, &pool, tier);
                let threshold = self.overrides.threshold(tier, postal_code);
                policy::decide(&pool, &scores, threshold, &tier.name, key)
            }
            TierKind::Coverage => policy::accept_selection(
                &pool,
                policy::first_covered(input, &pool),
                &tier.name,
                key,
            ),
            TierKind::Substring => policy::accept_selection(
                &pool,
                policy::first_contained(input, &pool),
                &tier.name,
                key,
            ),
        }
    }
}
