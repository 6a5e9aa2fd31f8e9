//! Candidate pre-filters and the composite similarity score.
//!
//! Both operate on [`PreparedText`], which carries the normalized form plus
//! the keyword facts derived from it, so a reference candidate is analysed
//! once per pool rather than once per input row.

use std::collections::BTreeSet;

use geomatch_matcher_models::{FilterConfig, ScoringConfig};

use crate::keywords::Keywords;
use crate::normalize::NormalizedForm;
use crate::similarity::{jaccard, token_set_ratio};

/// A normalized text annotated with keyword facts.
#[derive(Debug, Clone, Default)]
pub struct PreparedText {
    /// The normalized form.
    pub form: NormalizedForm,
    /// Tokens that are not in the common-token vocabulary.
    pub significant: BTreeSet<String>,
    /// Whether any building keyword is present.
    pub has_building: bool,
    /// Locality phrases mentioned contiguously.
    pub areas: BTreeSet<String>,
}

impl PreparedText {
    /// Derives keyword facts for an already normalized form.
    #[must_use]
    pub fn new(form: NormalizedForm, keywords: &Keywords) -> Self {
        let significant = form
            .tokens
            .iter()
            .filter(|token| !keywords.common.contains(*token))
            .cloned()
            .collect();
        let has_building = keywords.building.any_in(&form);
        let areas = keywords.areas.mentioned_in(&form);

        Self {
            form,
            significant,
            has_building,
            areas,
        }
    }

    /// Short administrative boilerplate (state or region names): at most
    /// `max_tokens` tokens and no digits.
    #[must_use]
    pub fn is_generic(&self, max_tokens: usize) -> bool {
        !self.form.is_empty()
            && self.form.len() <= max_tokens
            && !self.form.cleaned_text.chars().any(|c| c.is_ascii_digit())
    }
}

/// Why a candidate was discarded before scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Candidate is generic boilerplate.
    Generic,
    /// Too few shared tokens.
    TokenOverlap,
    /// Long input without the stricter overlap.
    StrictOverlap,
    /// No shared distinctive token.
    PrimaryOverlap,
    /// Short input without a building keyword.
    MissingBuilding,
    /// Token-set ratio below the minimum.
    FuzzyRatio,
    /// Jaccard below the minimum and not rescued.
    Jaccard,
}

impl Rejection {
    /// Short label used in logs and inspection output.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::TokenOverlap => "token_overlap",
            Self::StrictOverlap => "strict_overlap",
            Self::PrimaryOverlap => "primary_overlap",
            Self::MissingBuilding => "missing_building",
            Self::FuzzyRatio => "fuzzy_ratio",
            Self::Jaccard => "jaccard",
        }
    }
}

/// Similarity measures shared by the filters and the score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    /// `|∩|` of the token sets.
    pub overlap: usize,
    /// Jaccard similarity in `0.0..=1.0`.
    pub jaccard: f64,
    /// Token-set ratio in `0.0..=1.0`.
    pub fuzzy: f64,
}

impl Similarity {
    /// Measures `input` against `candidate`.
    #[must_use]
    pub fn measure(input: &PreparedText, candidate: &PreparedText) -> Self {
        Self {
            overlap: input.form.tokens.intersection(&candidate.form.tokens).count(),
            jaccard: jaccard(&input.form.tokens, &candidate.form.tokens),
            fuzzy: token_set_ratio(&input.form.cleaned_text, &candidate.form.cleaned_text) / 100.0,
        }
    }
}

/// Applies the pre-filters, returning the measures on success so the caller
/// can score without recomputing them.
///
/// # Errors
///
/// Returns the first [`Rejection`] that applies.
pub fn prefilter(
    input: &PreparedText,
    candidate: &PreparedText,
    filters: &FilterConfig,
    keywords: &Keywords,
) -> Result<Similarity, Rejection> {
    if filters
        .generic_max_tokens
        .is_some_and(|max_tokens| candidate.is_generic(max_tokens))
    {
        return Err(Rejection::Generic);
    }

    let overlap = input.form.tokens.intersection(&candidate.form.tokens).count();

    if overlap < filters.min_token_overlap {
        return Err(Rejection::TokenOverlap);
    }

    if let Some(strict) = filters.strict_overlap
        && input.form.len() >= strict.min_input_tokens
        && overlap < strict.min_overlap
    {
        return Err(Rejection::StrictOverlap);
    }

    if filters.require_primary_overlap {
        let shared_primary = candidate.form.tokens.iter().any(|token| {
            token.chars().count() > 2
                && !keywords.common.contains(token)
                && input.form.contains(token)
        });
        if !shared_primary {
            return Err(Rejection::PrimaryOverlap);
        }
    }

    if let Some(below) = filters.require_building_keyword_below
        && input.form.len() < below
        && !input.has_building
    {
        return Err(Rejection::MissingBuilding);
    }

    let similarity = Similarity::measure(input, candidate);

    if similarity.fuzzy < filters.min_fuzzy_ratio {
        return Err(Rejection::FuzzyRatio);
    }

    if similarity.jaccard < filters.min_jaccard {
        let significant_overlap = input.significant.intersection(&candidate.significant).count();
        let rescued = filters
            .significant_overlap_rescue
            .is_some_and(|rescue| significant_overlap >= rescue);
        if !rescued {
            return Err(Rejection::Jaccard);
        }
    }

    Ok(similarity)
}

/// Composite score in `0..=100`.
#[must_use]
pub fn score(input: &PreparedText, candidate: &PreparedText, scoring: &ScoringConfig) -> u8 {
    score_with(input, candidate, &Similarity::measure(input, candidate), scoring)
}

/// Composite score from precomputed measures.
///
/// The blend leans on the fuzzy ratio when token overlap is sparse
/// (`jaccard < 0.6`) and on Jaccard otherwise; keyword boosts and penalties
/// are added on the same `0.0..=1.0` scale, the substring bonus on the
/// `0..=100` scale.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn score_with(
    input: &PreparedText,
    candidate: &PreparedText,
    similarity: &Similarity,
    scoring: &ScoringConfig,
) -> u8 {
    let base = if similarity.jaccard < 0.6 {
        0.3f64.mul_add(similarity.jaccard, 0.7 * similarity.fuzzy)
    } else {
        0.6f64.mul_add(similarity.jaccard, 0.4 * similarity.fuzzy)
    };

    let mut adjustment = 0.0;
    match (input.has_building, candidate.has_building) {
        (true, true) => adjustment += scoring.building_boost,
        (true, false) | (false, true) => adjustment -= scoring.building_mismatch_penalty,
        (false, false) => {}
    }

    if !input.areas.is_empty() && !candidate.areas.is_empty() && input.areas != candidate.areas {
        adjustment -= scoring.area_conflict_penalty;
    }

    let mut total = 100.0 * (base + adjustment);

    if let Some(bonus) = scoring.substring_bonus
        && !candidate.form.cleaned_text.is_empty()
        && input.form.cleaned_text.contains(&candidate.form.cleaned_text)
    {
        total += bonus;
    }

    total.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use geomatch_matcher_models::{KeywordConfig, StrictOverlap};

    use super::*;
    use crate::normalize::Normalizer;

    struct Fixture {
        normalizer: Normalizer,
        keywords: Keywords,
    }

    impl Fixture {
        fn new() -> Self {
            let normalizer = Normalizer::default();
            let keywords = Keywords::from_config(&KeywordConfig::default(), &normalizer).unwrap();
            Self {
                normalizer,
                keywords,
            }
        }

        fn prepare(&self, text: &str) -> PreparedText {
            PreparedText::new(self.normalizer.normalize(text), &self.keywords)
        }
    }

    fn lenient() -> FilterConfig {
        FilterConfig {
            min_token_overlap: 1,
            min_fuzzy_ratio: 0.0,
            min_jaccard: 0.0,
            ..FilterConfig::default()
        }
    }

    #[test]
    fn scores_subset_candidate() {
        let fx = Fixture::new();
        let input = fx.prepare("123 Jalan SS2/10, Petaling Jaya");
        let candidate = fx.prepare("Jalan SS2/10 Petaling Jaya");
        assert_eq!(score(&input, &candidate, &ScoringConfig::default()), 90);
    }

    #[test]
    fn identical_text_scores_full() {
        let fx = Fixture::new();
        let text = fx.prepare("no 5 jalan ampang hilir kuala lumpur");
        assert_eq!(score(&text, &text, &ScoringConfig::default()), 100);
    }

    #[test]
    fn score_is_deterministic() {
        let fx = Fixture::new();
        let input = fx.prepare("Blok A Pangsapuri Seri Ria Jalan Kenari Puchong");
        let candidate = fx.prepare("Pangsapuri Seri Ria Blok B Puchong");
        let first = score(&input, &candidate, &ScoringConfig::default());
        for _ in 0..10 {
            assert_eq!(score(&input, &candidate, &ScoringConfig::default()), first);
        }
    }

    #[test]
    fn building_keyword_on_both_sides_boosts() {
        let fx = Fixture::new();
        let input = fx.prepare("menara axis jalan 51a 223 petaling jaya");
        let candidate = fx.prepare("menara axis jalan 51a 223 petaling jaya");
        let plain = fx.prepare("wisma kenanga jalan 51a 223 petaling jaya");
        let scoring = ScoringConfig::default();
        assert!(input.has_building);
        assert!(!plain.has_building);

        let both = score_with(
            &input,
            &candidate,
            &Similarity {
                overlap: 0,
                jaccard: 0.8,
                fuzzy: 0.8,
            },
            &scoring,
        );
        let one = score_with(
            &input,
            &plain,
            &Similarity {
                overlap: 0,
                jaccard: 0.8,
                fuzzy: 0.8,
            },
            &scoring,
        );
        assert_eq!(both, 90);
        assert_eq!(one, 75);
    }

    #[test]
    fn area_conflict_is_penalized() {
        let fx = Fixture::new();
        let input = fx.prepare("jalan 3 taman melati setapak");
        let same = fx.prepare("jalan 3 taman melati setapak");
        let other = fx.prepare("jalan 3 taman melati cheras");
        let measures = Similarity {
            overlap: 0,
            jaccard: 0.7,
            fuzzy: 0.7,
        };
        let scoring = ScoringConfig::default();
        assert_eq!(score_with(&input, &same, &measures, &scoring), 70);
        assert_eq!(score_with(&input, &other, &measures, &scoring), 65);
    }

    #[test]
    fn sparse_overlap_leans_on_fuzzy_ratio() {
        let fx = Fixture::new();
        let a = fx.prepare("x");
        let measures = Similarity {
            overlap: 0,
            jaccard: 0.5,
            fuzzy: 1.0,
        };
        assert_eq!(score_with(&a, &a, &measures, &ScoringConfig::default()), 85);
    }

    #[test]
    fn substring_bonus_applies_on_percent_scale() {
        let fx = Fixture::new();
        let input = fx.prepare("lot 7 jalan ampang hilir");
        let candidate = fx.prepare("jalan ampang hilir");
        let measures = Similarity {
            overlap: 0,
            jaccard: 0.6,
            fuzzy: 0.6,
        };
        let scoring = ScoringConfig {
            substring_bonus: Some(10.0),
            ..ScoringConfig::default()
        };
        assert_eq!(score_with(&input, &candidate, &measures, &scoring), 70);
    }

    #[test]
    fn score_is_clamped() {
        let fx = Fixture::new();
        let text = fx.prepare("pangsapuri mawar blok 3 setapak");
        let scoring = ScoringConfig {
            substring_bonus: Some(10.0),
            ..ScoringConfig::default()
        };
        assert_eq!(score(&text, &text, &scoring), 100);

        let scoring = ScoringConfig {
            building_mismatch_penalty: 5.0,
            ..ScoringConfig::default()
        };
        let other = fx.prepare("jalan 9 kepong");
        assert_eq!(score(&text, &other, &scoring), 0);
    }

    #[test]
    fn rejects_low_token_overlap() {
        let fx = Fixture::new();
        let input = fx.prepare("jalan ampang hilir");
        let candidate = fx.prepare("jalan ampang");
        let filters = FilterConfig {
            min_token_overlap: 3,
            ..lenient()
        };
        assert_eq!(
            prefilter(&input, &candidate, &filters, &fx.keywords),
            Err(Rejection::TokenOverlap)
        );
    }

    #[test]
    fn strict_overlap_applies_to_long_inputs() {
        let fx = Fixture::new();
        let input = fx.prepare("no 12 jalan 5 taman bukit indah ampang selangor");
        let candidate = fx.prepare("jalan 5 taman bukit");
        let filters = FilterConfig {
            strict_overlap: Some(StrictOverlap {
                min_input_tokens: 7,
                min_overlap: 6,
            }),
            ..lenient()
        };
        assert_eq!(
            prefilter(&input, &candidate, &filters, &fx.keywords),
            Err(Rejection::StrictOverlap)
        );

        let short = fx.prepare("jalan 5 taman bukit indah");
        assert!(prefilter(&short, &candidate, &filters, &fx.keywords).is_ok());
    }

    #[test]
    fn rejects_low_fuzzy_ratio() {
        let fx = Fixture::new();
        let input = fx.prepare("menara axis petaling jaya");
        let candidate = fx.prepare("pangsapuri mawar kepong");
        let filters = FilterConfig {
            min_token_overlap: 0,
            min_fuzzy_ratio: 0.75,
            ..lenient()
        };
        assert_eq!(
            prefilter(&input, &candidate, &filters, &fx.keywords),
            Err(Rejection::FuzzyRatio)
        );
    }

    #[test]
    fn significant_overlap_rescues_low_jaccard() {
        let fx = Fixture::new();
        let input = fx.prepare("kondominium vista damai jalan tun razak kuala lumpur wilayah persekutuan");
        let candidate = fx.prepare("kondominium vista damai");
        let mut filters = FilterConfig {
            min_jaccard: 0.9,
            ..lenient()
        };
        assert!(prefilter(&input, &candidate, &filters, &fx.keywords).is_ok());

        filters.significant_overlap_rescue = None;
        assert_eq!(
            prefilter(&input, &candidate, &filters, &fx.keywords),
            Err(Rejection::Jaccard)
        );
    }

    #[test]
    fn common_tokens_do_not_rescue() {
        let fx = Fixture::new();
        let input = fx.prepare("kuala lumpur wilayah persekutuan jalan 1");
        let candidate = fx.prepare("kuala lumpur wilayah persekutuan");
        let filters = FilterConfig {
            min_jaccard: 0.9,
            ..lenient()
        };
        assert_eq!(
            prefilter(&input, &candidate, &filters, &fx.keywords),
            Err(Rejection::Jaccard)
        );
    }

    #[test]
    fn short_input_needs_building_keyword() {
        let fx = Fixture::new();
        let filters = FilterConfig {
            require_building_keyword_below: Some(6),
            ..lenient()
        };
        let plain = fx.prepare("jalan ampang hilir");
        assert_eq!(
            prefilter(&plain, &plain, &filters, &fx.keywords),
            Err(Rejection::MissingBuilding)
        );
        let building = fx.prepare("pangsapuri ampang hilir");
        assert!(prefilter(&building, &building, &filters, &fx.keywords).is_ok());
    }

    #[test]
    fn primary_overlap_ignores_short_and_common_tokens() {
        let fx = Fixture::new();
        let filters = FilterConfig {
            require_primary_overlap: true,
            ..lenient()
        };
        let input = fx.prepare("no 1 kuala lumpur");
        let candidate = fx.prepare("no 1 kuala lumpur");
        assert_eq!(
            prefilter(&input, &candidate, &filters, &fx.keywords),
            Err(Rejection::PrimaryOverlap)
        );

        let input = fx.prepare("no 1 ampang kuala lumpur");
        let candidate = fx.prepare("ampang kuala lumpur");
        assert!(prefilter(&input, &candidate, &filters, &fx.keywords).is_ok());
    }

    #[test]
    fn generic_entries_are_short_and_digit_free() {
        let fx = Fixture::new();
        assert!(fx.prepare("Selangor").is_generic(3));
        assert!(fx.prepare("Wilayah Persekutuan Kuala").is_generic(3));
        assert!(!fx.prepare("Wilayah Persekutuan Kuala Lumpur").is_generic(3));
        assert!(!fx.prepare("Blok 3").is_generic(3));
        assert!(!fx.prepare("Wilayah Persekutuan Kuala").is_generic(2));
    }

    #[test]
    fn generic_rule_is_opt_in() {
        let fx = Fixture::new();
        let input = fx.prepare("Sunway Pyramid Shopping Mall, Bandar Sunway");
        let candidate = fx.prepare("Sunway Pyramid Mall");
        assert!(candidate.is_generic(3));

        assert!(prefilter(&input, &candidate, &lenient(), &fx.keywords).is_ok());

        let filters = FilterConfig {
            generic_max_tokens: Some(3),
            ..lenient()
        };
        assert_eq!(
            prefilter(&input, &candidate, &filters, &fx.keywords),
            Err(Rejection::Generic)
        );
    }
}
