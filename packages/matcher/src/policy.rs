//! Candidate selection and acceptance.
//!
//! Every strategy here is stable: candidates are visited in pool order and
//! a later candidate only displaces an earlier one with a strictly higher
//! score, so results never depend on scheduling.

use std::collections::BTreeMap;

use geomatch_matcher_models::{MatchResult, PostalOverride, TierConfig};

use crate::index::Candidate;
use crate::keywords::Keywords;
use crate::scorer::{self, PreparedText};
use crate::similarity::CharNgramTfIdf;

/// Score awarded by the coverage and substring strategies.
pub const EXACT_SCORE: u8 = 100;

/// Character n-gram length of the TF-IDF strategy.
pub const CHAR_NGRAM_SIZE: usize = 2;

/// The winning candidate of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    /// Position of the candidate in the pool.
    pub position: usize,
    /// Its score.
    pub score: u8,
}

/// Returns the highest-scoring position; ties keep the earliest.
#[must_use]
pub fn best(scores: &[Option<u8>]) -> Option<Selection> {
    let mut best: Option<Selection> = None;
    for (position, score) in scores.iter().enumerate() {
        let Some(score) = *score else {
            continue;
        };
        if best.is_none_or(|b| score > b.score) {
            best = Some(Selection { position, score });
        }
    }
    best
}

/// Selects the best-scoring candidate and accepts it if it reaches
/// `accept_threshold`; otherwise returns the empty result.
///
/// `scores[i]` belongs to `candidates[i]`; `None` marks a candidate
/// discarded by the pre-filters.
#[must_use]
pub fn decide(
    candidates: &[Candidate],
    scores: &[Option<u8>],
    accept_threshold: u8,
    tier: &str,
    matched_key: impl Fn(&Candidate) -> String,
) -> MatchResult {
    let Some(selection) = best(scores) else {
        return MatchResult::empty();
    };

    if selection.score < accept_threshold {
        log::trace!(
            "Tier {tier}: best score {} below threshold {accept_threshold}",
            selection.score
        );
        return MatchResult::empty();
    }

    let Some(candidate) = candidates.get(selection.position) else {
        return MatchResult::empty();
    };

    accepted(candidate, selection.score, tier, &matched_key)
}

fn accepted(
    candidate: &Candidate,
    score: u8,
    tier: &str,
    matched_key: &impl Fn(&Candidate) -> String,
) -> MatchResult {
    MatchResult {
        geocode: Some(candidate.record.geocode.clone()),
        matched_key: Some(matched_key(candidate)),
        score,
        tier: Some(tier.to_string()),
    }
}

/// Filters and scores every candidate of a fuzzy tier.
#[must_use]
pub fn score_pool(
    input: &PreparedText,
    pool: &[Candidate],
    tier: &TierConfig,
    keywords: &Keywords,
) -> Vec<Option<u8>> {
    let mut rejections: BTreeMap<&'static str, usize> = BTreeMap::new();

    let scores = pool
        .iter()
        .map(|candidate| {
            match scorer::prefilter(input, &candidate.text, &tier.filters, keywords) {
                Ok(similarity) => Some(scorer::score_with(
                    input,
                    &candidate.text,
                    &similarity,
                    &tier.scoring,
                )),
                Err(rejection) => {
                    *rejections.entry(rejection.name()).or_default() += 1;
                    None
                }
            }
        })
        .collect();

    if !rejections.is_empty() {
        log::trace!("Tier {}: rejected {rejections:?} of {}", tier.name, pool.len());
    }

    scores
}

/// Character-bigram TF-IDF cosine of the input against every candidate,
/// fitted on the pool's cleaned texts. Generic candidates are skipped when
/// the tier's filters say so.
#[must_use]
pub fn char_ngram_scores(input: &PreparedText, pool: &[Candidate], tier: &TierConfig) -> Vec<Option<u8>> {
    let model = CharNgramTfIdf::fit(
        pool.iter().map(|candidate| candidate.text.form.cleaned_text.as_str()),
        CHAR_NGRAM_SIZE,
    );

    model
        .cosine_all(&input.form.cleaned_text)
        .into_iter()
        .zip(pool)
        .map(|(cosine, candidate)| {
            let generic = tier
                .filters
                .generic_max_tokens
                .is_some_and(|max_tokens| candidate.text.is_generic(max_tokens));
            (!generic).then(|| to_score(cosine))
        })
        .collect()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_score(cosine: f64) -> u8 {
    (cosine * 100.0).round().clamp(0.0, 100.0) as u8
}

/// First candidate every token of which appears in the input.
#[must_use]
pub fn first_covered(input: &PreparedText, pool: &[Candidate]) -> Option<Selection> {
    pool.iter()
        .position(|candidate| {
            !candidate.text.form.is_empty()
                && candidate
                    .text
                    .form
                    .tokens
                    .iter()
                    .all(|token| input.form.contains(token))
        })
        .map(|position| Selection {
            position,
            score: EXACT_SCORE,
        })
}

/// First candidate whose cleaned text occurs in the cleaned input as a
/// whole run of tokens.
#[must_use]
pub fn first_contained(input: &PreparedText, pool: &[Candidate]) -> Option<Selection> {
    pool.iter()
        .position(|candidate| input.form.contains_phrase(&candidate.text.form.sequence))
        .map(|position| Selection {
            position,
            score: EXACT_SCORE,
        })
}

/// Accepts the candidate chosen by an exact strategy.
#[must_use]
pub fn accept_selection(
    pool: &[Candidate],
    selection: Option<Selection>,
    tier: &str,
    matched_key: impl Fn(&Candidate) -> String,
) -> MatchResult {
    selection
        .and_then(|s| pool.get(s.position).map(|c| accepted(c, s.score, tier, &matched_key)))
        .unwrap_or_else(MatchResult::empty)
}

/// Postal-code specific thresholds, indexed for lookup.
#[derive(Debug, Clone, Default)]
pub struct PostalOverrides(BTreeMap<String, u8>);

impl PostalOverrides {
    /// Indexes the configured overrides. A later entry for the same postal
    /// code replaces an earlier one.
    #[must_use]
    pub fn new(overrides: &[PostalOverride]) -> Self {
        Self(
            overrides
                .iter()
                .map(|o| (o.postal_code.trim().to_string(), o.accept_threshold))
                .collect(),
        )
    }

    /// Effective threshold: the tier's own, raised by any override for
    /// `postal_code`. An override never loosens a tier.
    #[must_use]
    pub fn threshold(&self, tier: &TierConfig, postal_code: &str) -> u8 {
        self.0
            .get(postal_code.trim())
            .map_or(tier.accept_threshold, |&o| o.max(tier.accept_threshold))
    }
}

#[cfg(test)]
mod tests {
    use geomatch_matcher_models::{
        FilterConfig, KeywordConfig, ReferenceRecord, ReferenceScope, ScoringConfig, TierKind,
    };

    use super::*;
    use crate::normalize::Normalizer;

    fn tier(scope: ReferenceScope, accept_threshold: u8, filters: FilterConfig) -> TierConfig {
        TierConfig {
            name: "t".to_string(),
            collection: "c".to_string(),
            scope,
            partitioned: false,
            kind: TierKind::Fuzzy,
            accept_threshold,
            filters,
            scoring: ScoringConfig::default(),
        }
    }

    fn candidate(text: &str, geocode: &str) -> Candidate {
        let normalizer = Normalizer::default();
        let keywords = Keywords::from_config(&KeywordConfig::default(), &normalizer).unwrap();
        Candidate {
            record: ReferenceRecord::new(text, "47300", geocode),
            text: PreparedText::new(normalizer.normalize(text), &keywords),
        }
    }

    fn prepared(text: &str) -> PreparedText {
        candidate(text, "").text
    }

    fn key(candidate: &Candidate) -> String {
        candidate.record.canonical_text.clone()
    }

    #[test]
    fn ties_keep_first_candidate() {
        let pool = [candidate("first", "g1"), candidate("second", "g2")];
        let result = decide(&pool, &[Some(88), Some(88)], 85, "nodes", key);
        assert_eq!(result.geocode.unwrap().as_str(), "g1");
        assert_eq!(result.score, 88);
        assert_eq!(result.tier.as_deref(), Some("nodes"));
    }

    #[test]
    fn higher_later_score_wins() {
        let pool = [candidate("first", "g1"), candidate("second", "g2")];
        let result = decide(&pool, &[Some(86), Some(87)], 85, "nodes", key);
        assert_eq!(result.geocode.unwrap().as_str(), "g2");
    }

    #[test]
    fn below_threshold_is_empty() {
        let pool = [candidate("first", "g1")];
        assert_eq!(
            decide(&pool, &[Some(84)], 85, "nodes", key),
            MatchResult::empty()
        );
    }

    #[test]
    fn no_surviving_candidates_is_empty() {
        let pool = [candidate("first", "g1")];
        assert_eq!(decide(&pool, &[None], 0, "nodes", key), MatchResult::empty());
        assert_eq!(decide(&[], &[], 0, "nodes", key), MatchResult::empty());
    }

    #[test]
    fn raising_threshold_never_accepts_more() {
        let pool = [candidate("a", "g1"), candidate("b", "g2"), candidate("c", "g3")];
        let scores = [Some(70), None, Some(91)];
        let mut previously_accepted = true;
        for threshold in 0..=100 {
            let accepted = decide(&pool, &scores, threshold, "t", key).is_match();
            assert!(previously_accepted || !accepted, "re-accepted at {threshold}");
            previously_accepted = accepted;
        }
    }

    #[test]
    fn coverage_requires_every_candidate_token() {
        let input = prepared("Lot 3, Shah Alam, Selangor");
        let pool = [
            candidate("Wilayah Persekutuan", "wp"),
            candidate("Selangor", "sel"),
            candidate("Shah Alam", "sa"),
        ];
        let selection = first_covered(&input, &pool).unwrap();
        assert_eq!(selection.position, 1);
        assert_eq!(selection.score, EXACT_SCORE);
    }

    #[test]
    fn coverage_skips_empty_candidates() {
        let input = prepared("selangor");
        let pool = [candidate(" , ", "none"), candidate("selangor", "sel")];
        assert_eq!(first_covered(&input, &pool).unwrap().position, 1);
    }

    #[test]
    fn substring_matches_whole_tokens_only() {
        let input = prepared("no 7 jalan kenanga kepong baru");
        let pool = [
            candidate("kepong bar", "partial"),
            candidate("kenanga kepong", "whole"),
        ];
        let selection = first_contained(&input, &pool).unwrap();
        assert_eq!(selection.position, 1);
    }

    #[test]
    fn fuzzy_pool_skips_generic_entries_when_configured() {
        let input = prepared("Selangor");
        let pool = [candidate("Selangor", "sel")];
        let lenient = FilterConfig {
            min_token_overlap: 0,
            min_fuzzy_ratio: 0.0,
            min_jaccard: 0.0,
            ..FilterConfig::default()
        };
        let keywords = Keywords::default();

        let scored = tier(ReferenceScope::All, 0, lenient.clone());
        assert_eq!(score_pool(&input, &pool, &scored, &keywords), vec![Some(100)]);

        let skipping = tier(
            ReferenceScope::All,
            0,
            FilterConfig {
                generic_max_tokens: Some(3),
                ..lenient
            },
        );
        assert_eq!(score_pool(&input, &pool, &skipping, &keywords), vec![None]);
    }

    #[test]
    fn char_ngram_prefers_closest_spelling() {
        let input = prepared("Jalan Ampang Hilir");
        let pool = [
            candidate("Jalan Ampang Hilir", "exact"),
            candidate("Jalan Ampang", "shorter"),
            candidate("Jalan Ipoh", "other"),
        ];
        let tier = tier(ReferenceScope::PostalCode, 80, FilterConfig::default());
        let scores = char_ngram_scores(&input, &pool, &tier);

        assert_eq!(scores[0], Some(100));
        assert!(scores[1] > scores[2]);
        let result = decide(&pool, &scores, 80, "nodes", key);
        assert_eq!(result.geocode.unwrap().as_str(), "exact");
    }

    #[test]
    fn char_ngram_respects_generic_rule() {
        let input = prepared("Selangor");
        let pool = [candidate("Selangor", "sel")];
        let tier = tier(
            ReferenceScope::All,
            0,
            FilterConfig {
                generic_max_tokens: Some(3),
                ..FilterConfig::default()
            },
        );
        assert_eq!(char_ngram_scores(&input, &pool, &tier), vec![None]);
    }

    #[test]
    fn postal_override_only_tightens() {
        let overrides = PostalOverrides::new(&[
            PostalOverride {
                postal_code: "43000".to_string(),
                accept_threshold: 90,
            },
            PostalOverride {
                postal_code: "50000".to_string(),
                accept_threshold: 50,
            },
        ]);
        let tier = tier(ReferenceScope::PostalCode, 85, FilterConfig::default());
        assert_eq!(overrides.threshold(&tier, "43000"), 90);
        assert_eq!(overrides.threshold(&tier, " 43000 "), 90);
        assert_eq!(overrides.threshold(&tier, "50000"), 85);
        assert_eq!(overrides.threshold(&tier, "47300"), 85);
    }
}
