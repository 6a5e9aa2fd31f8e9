//! Loading, overriding, and validating [`MatcherConfig`].
//!
//! Validation runs once, before any worker starts, so a bad setting is
//! reported immediately instead of surfacing mid-batch.

use std::collections::BTreeSet;
use std::path::Path;

use geomatch_matcher_models::{MatcherConfig, TierConfig};

use crate::ConfigError;
use crate::engine::Matcher;

/// Parses a configuration from TOML text. Does not validate.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the text is not a valid configuration.
pub fn parse(text: &str) -> Result<MatcherConfig, ConfigError> {
    Ok(toml::de::from_str(text)?)
}

/// Reads and parses a configuration file. Does not validate.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read, or
/// [`ConfigError::Parse`] if it is not a valid configuration.
pub fn load_file(path: &Path) -> Result<MatcherConfig, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let config = parse(&text)?;
    log::info!("Loaded matcher config '{}' from {}", config.id, path.display());
    Ok(config)
}

/// Command-line overrides layered on top of a preset or file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Replaces `worker_count`.
    pub worker_count: Option<usize>,
    /// Replaces `candidate_row_budget`.
    pub candidate_row_budget: Option<usize>,
    /// Replaces `partitions`.
    pub partitions: Option<Vec<String>>,
}

impl Overrides {
    /// Applies every set override to `config`.
    pub fn apply(self, config: &mut MatcherConfig) {
        if let Some(workers) = self.worker_count {
            config.worker_count = workers;
        }
        if let Some(budget) = self.candidate_row_budget {
            config.candidate_row_budget = budget;
        }
        if let Some(partitions) = self.partitions {
            config.partitions = partitions;
        }
    }
}

/// Fully validates a configuration, including its keyword vocabularies
/// and abbreviation dictionary.
///
/// # Errors
///
/// Returns the first [`ConfigError`] found.
pub fn validate(config: &MatcherConfig) -> Result<(), ConfigError> {
    Matcher::new(config.clone()).map(|_| ())
}

/// Checks the numeric settings, tiers, and postal overrides.
///
/// # Errors
///
/// Returns the first [`ConfigError`] found.
pub fn check_settings(config: &MatcherConfig) -> Result<(), ConfigError> {
    if config.worker_count == 0 {
        return Err(ConfigError::ZeroWorkers);
    }
    if config.candidate_row_budget == 0 {
        return Err(ConfigError::ZeroBudget);
    }
    if config.cache_capacity == 0 {
        return Err(ConfigError::ZeroCacheCapacity);
    }
    if config.progress_interval_ms == 0 {
        return Err(ConfigError::ZeroProgressInterval);
    }
    if config.tiers.is_empty() {
        return Err(ConfigError::NoTiers);
    }

    let mut names = BTreeSet::new();
    for tier in &config.tiers {
        if !names.insert(tier.name.as_str()) {
            return Err(ConfigError::DuplicateTier(tier.name.clone()));
        }
        check_tier(tier)?;
    }

    for item in &config.postal_overrides {
        if item.postal_code.trim().is_empty() {
            return Err(ConfigError::InvalidOverride {
                postal_code: item.postal_code.clone(),
                message: "postal code is empty".to_string(),
            });
        }
        if item.accept_threshold > 100 {
            return Err(ConfigError::InvalidOverride {
                postal_code: item.postal_code.clone(),
                message: format!("threshold {} exceeds 100", item.accept_threshold),
            });
        }
    }

    Ok(())
}

fn check_tier(tier: &TierConfig) -> Result<(), ConfigError> {
    let invalid = |message: String| ConfigError::InvalidTier {
        tier: tier.name.clone(),
        message,
    };

    if tier.name.trim().is_empty() {
        return Err(invalid("name is empty".to_string()));
    }
    if tier.collection.trim().is_empty() {
        return Err(invalid("collection is empty".to_string()));
    }
    if tier.accept_threshold > 100 {
        return Err(invalid(format!(
            "accept_threshold {} exceeds 100",
            tier.accept_threshold
        )));
    }

    let ratios = [
        ("min_fuzzy_ratio", tier.filters.min_fuzzy_ratio),
        ("min_jaccard", tier.filters.min_jaccard),
    ];
    for (name, value) in ratios {
        if !(0.0..=1.0).contains(&value) {
            return Err(invalid(format!("{name} {value} is outside 0..=1")));
        }
    }

    if tier.filters.generic_max_tokens == Some(0) {
        return Err(invalid(
            "generic_max_tokens must be at least 1; omit it to score every candidate".to_string(),
        ));
    }

    let adjustments = [
        ("building_boost", tier.scoring.building_boost),
        ("building_mismatch_penalty", tier.scoring.building_mismatch_penalty),
        ("area_conflict_penalty", tier.scoring.area_conflict_penalty),
        ("substring_bonus", tier.scoring.substring_bonus.unwrap_or(0.0)),
    ];
    for (name, value) in adjustments {
        if !value.is_finite() || value < 0.0 {
            return Err(invalid(format!("{name} {value} must be a non-negative number")));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use geomatch_matcher_models::{
        Abbreviation, FilterConfig, KeywordConfig, PostalOverride, ReferenceScope, ScoringConfig,
        TierKind,
    };

    use super::*;

    fn base() -> MatcherConfig {
        MatcherConfig {
            id: "test".to_string(),
            name: "Test".to_string(),
            tiers: vec![TierConfig {
                name: "nodes".to_string(),
                collection: "nodes".to_string(),
                scope: ReferenceScope::PostalCode,
                partitioned: false,
                kind: TierKind::Fuzzy,
                accept_threshold: 85,
                filters: FilterConfig::default(),
                scoring: ScoringConfig::default(),
            }],
            ..MatcherConfig::default()
        }
    }

    #[test]
    fn accepts_minimal_config() {
        assert!(validate(&base()).is_ok());
    }

    #[test]
    fn rejects_zero_workers() {
        let config = MatcherConfig {
            worker_count: 0,
            ..base()
        };
        assert!(matches!(validate(&config), Err(ConfigError::ZeroWorkers)));
    }

    #[test]
    fn rejects_zero_budget() {
        let config = MatcherConfig {
            candidate_row_budget: 0,
            ..base()
        };
        assert!(matches!(validate(&config), Err(ConfigError::ZeroBudget)));
    }

    #[test]
    fn rejects_missing_tiers() {
        let config = MatcherConfig {
            tiers: Vec::new(),
            ..base()
        };
        assert!(matches!(validate(&config), Err(ConfigError::NoTiers)));
    }

    #[test]
    fn rejects_duplicate_tier_names() {
        let mut config = base();
        config.tiers.push(config.tiers[0].clone());
        assert!(matches!(
            validate(&config),
            Err(ConfigError::DuplicateTier(name)) if name == "nodes"
        ));
    }

    #[test]
    fn rejects_out_of_range_tier_settings() {
        let mut config = base();
        config.tiers[0].accept_threshold = 101;
        assert!(matches!(validate(&config), Err(ConfigError::InvalidTier { .. })));

        let mut config = base();
        config.tiers[0].filters.min_jaccard = 1.5;
        assert!(matches!(validate(&config), Err(ConfigError::InvalidTier { .. })));

        let mut config = base();
        config.tiers[0].scoring.building_boost = f64::NAN;
        assert!(matches!(validate(&config), Err(ConfigError::InvalidTier { .. })));

        let mut config = base();
        config.tiers[0].filters.generic_max_tokens = Some(0);
        assert!(matches!(validate(&config), Err(ConfigError::InvalidTier { .. })));
    }

    #[test]
    fn rejects_empty_keyword_set() {
        let config = MatcherConfig {
            keywords: KeywordConfig {
                building: Some(Vec::new()),
                ..KeywordConfig::default()
            },
            ..base()
        };
        assert!(matches!(
            validate(&config),
            Err(ConfigError::EmptyKeywordSet { .. })
        ));
    }

    #[test]
    fn rejects_bad_abbreviations() {
        let config = MatcherConfig {
            abbreviations: Some(vec![Abbreviation::new("", "x")]),
            ..base()
        };
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidAbbreviation { .. })
        ));
    }

    #[test]
    fn rejects_bad_postal_override() {
        let config = MatcherConfig {
            postal_overrides: vec![PostalOverride {
                postal_code: "43000".to_string(),
                accept_threshold: 120,
            }],
            ..base()
        };
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidOverride { .. })
        ));
    }

    #[test]
    fn overrides_replace_settings() {
        let mut config = base();
        Overrides {
            worker_count: Some(8),
            candidate_row_budget: None,
            partitions: Some(vec!["202507".to_string()]),
        }
        .apply(&mut config);
        assert_eq!(config.worker_count, 8);
        assert_eq!(config.candidate_row_budget, 12_000);
        assert_eq!(config.partitions, vec!["202507".to_string()]);
    }

    #[test]
    fn parses_toml_with_defaults() {
        let config = parse(
            r#"
            id = "custom"
            name = "Custom"

            [[tiers]]
            name = "corpus"
            collection = "corpus"
            partitioned = true
            accept_threshold = 87

            [tiers.filters]
            min_token_overlap = 6
            "#,
        )
        .unwrap();
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.tiers.len(), 1);
        assert!(config.tiers[0].partitioned);
        assert_eq!(config.tiers[0].filters.min_token_overlap, 6);
        assert!((config.tiers[0].filters.min_jaccard - 0.6).abs() < f64::EPSILON);
        assert_eq!(config.tiers[0].filters.generic_max_tokens, None);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn reports_malformed_toml() {
        assert!(matches!(parse("id = "), Err(ConfigError::Parse(_))));
    }
}
