//! Building, locality, and common-token vocabularies.
//!
//! Keyword phrases are normalized with the same [`Normalizer`] as the text
//! they are matched against, so "Jalan" in a keyword list and "jln" in an
//! address agree.

use std::collections::BTreeSet;

use geomatch_matcher_models::KeywordConfig;

use crate::ConfigError;
use crate::normalize::{NormalizedForm, Normalizer};

/// Words and phrases naming a structure: residential, commercial,
/// institutional, or hospitality.
pub const BUILTIN_BUILDING_KEYWORDS: &[&str] = &[
    // Residential
    "pangsapuri",
    "apartment",
    "kondominium",
    "flat",
    "rumah pangsa",
    "perumahan",
    "residensi",
    "residence",
    "soho",
    "suite",
    "rumah",
    "rumah teres",
    "rumah kos rendah",
    "rumah mampu milik",
    "ppr",
    "kuarters",
    "projek perumahan",
    "kondo",
    // Towers and named developments
    "menara",
    "tower",
    "blok",
    "parklane",
    "vista",
    "platinum",
    "axis",
    "empire",
    "citadines",
    "sky",
    "heights",
    "mont",
    "pinnacle",
    "galleria",
    "one",
    "two",
    "three",
    "quattro",
    "klcc",
    "i-city",
    // Public
    "balai",
    "kompleks",
    "jabatan",
    "mahkamah",
    "pejabat",
    "masjid",
    "hospital",
    "klinik",
    "dewan",
    "institut",
    "pusat",
    // Commercial
    "mall",
    "plaza",
    "avenue",
    "square",
    "pavilion",
    "gateway",
    "court",
    "city",
    "sentral",
    "utama",
    "metro",
    "arcade",
    "galeri",
    "retail",
    "hub",
    "walk",
    "the",
    "dataran",
    "putra",
    // Hospitality
    "hotel",
    "servis",
    "serviced",
    "inn",
    "lodge",
    "homestay",
    "guesthouse",
    "resort",
    "villa",
    "chalets",
    "bnb",
];

/// Named localities whose disagreement signals a wrong candidate.
pub const BUILTIN_AREA_KEYWORDS: &[&str] = &[
    "setapak",
    "wangsa maju",
    "keramat",
    "ampang",
    "melawati",
    "damansara",
    "kajang",
    "bangsar",
    "cheras",
    "kepong",
    "puchong",
    "subang",
    "putrajaya",
    "cyberjaya",
];

/// Tokens too common to count towards the significant-token overlap.
pub const BUILTIN_COMMON_TOKENS: &[&str] = &[
    "kuala",
    "lumpur",
    "selangor",
    "malaysia",
    "wp",
    "wilayah",
    "persekutuan",
    "jalanraya",
    "lebuhraya",
    "highway",
    "tingkatan",
    "blkg",
    "hadapan",
    "atas",
    "bawah",
    "hujung",
    "tepi",
    "berhampiran",
    "berdekatan",
    "bersebelahan",
    "pobox",
    "kuching",
    "sarawak",
];

/// A list of keyword phrases, each held as its normalized token run.
#[derive(Debug, Clone, Default)]
pub struct KeywordSet {
    phrases: Vec<Vec<String>>,
}

impl KeywordSet {
    /// Normalizes each keyword; keywords that normalize to nothing are
    /// dropped.
    #[must_use]
    pub fn new<S: AsRef<str>>(keywords: &[S], normalizer: &Normalizer) -> Self {
        let mut phrases: Vec<Vec<String>> = Vec::with_capacity(keywords.len());
        for keyword in keywords {
            let form = normalizer.normalize(keyword.as_ref());
            if !form.is_empty() && !phrases.contains(&form.sequence) {
                phrases.push(form.sequence);
            }
        }
        Self { phrases }
    }

    /// Number of distinct phrases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    /// Returns `true` if the set holds no phrases.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    /// Returns `true` if every word of some phrase is a token of `form`.
    #[must_use]
    pub fn any_in(&self, form: &NormalizedForm) -> bool {
        self.phrases
            .iter()
            .any(|phrase| phrase.iter().all(|word| form.contains(word)))
    }

    /// Returns every phrase that occurs contiguously in `form`.
    #[must_use]
    pub fn mentioned_in(&self, form: &NormalizedForm) -> BTreeSet<String> {
        self.phrases
            .iter()
            .filter(|phrase| form.contains_phrase(phrase))
            .map(|phrase| phrase.join(" "))
            .collect()
    }
}

/// All vocabularies the scorer consults.
#[derive(Debug, Clone, Default)]
pub struct Keywords {
    /// Building vocabulary.
    pub building: KeywordSet,
    /// Locality vocabulary.
    pub areas: KeywordSet,
    /// Tokens excluded from the significant-token overlap.
    pub common: BTreeSet<String>,
}

impl Keywords {
    /// Resolves configured vocabularies, falling back to the built-in
    /// tables for any list left unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyKeywordSet`] if the building or area
    /// vocabulary is empty after normalization.
    pub fn from_config(config: &KeywordConfig, normalizer: &Normalizer) -> Result<Self, ConfigError> {
        let building = config.building.as_ref().map_or_else(
            || KeywordSet::new(BUILTIN_BUILDING_KEYWORDS, normalizer),
            |list| KeywordSet::new(list, normalizer),
        );
        if building.is_empty() {
            return Err(ConfigError::EmptyKeywordSet { name: "building" });
        }

        let areas = config.areas.as_ref().map_or_else(
            || KeywordSet::new(BUILTIN_AREA_KEYWORDS, normalizer),
            |list| KeywordSet::new(list, normalizer),
        );
        if areas.is_empty() {
            return Err(ConfigError::EmptyKeywordSet { name: "area" });
        }

        let common = match &config.common {
            Some(list) => common_tokens(list, normalizer),
            None => common_tokens(BUILTIN_COMMON_TOKENS, normalizer),
        };

        Ok(Self {
            building,
            areas,
            common,
        })
    }
}

fn common_tokens<S: AsRef<str>>(list: &[S], normalizer: &Normalizer) -> BTreeSet<String> {
    list.iter()
        .flat_map(|token| normalizer.normalize(token.as_ref()).sequence)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin() -> (Keywords, Normalizer) {
        let normalizer = Normalizer::default();
        let keywords = Keywords::from_config(&KeywordConfig::default(), &normalizer).unwrap();
        (keywords, normalizer)
    }

    #[test]
    fn detects_building_words() {
        let (keywords, normalizer) = builtin();
        assert!(keywords.building.any_in(&normalizer.normalize("Pangsapuri Sri Ria Blok A")));
        assert!(!keywords.building.any_in(&normalizer.normalize("Jalan SS2/10 Petaling Jaya")));
    }

    #[test]
    fn multi_word_building_phrase_needs_every_word() {
        let normalizer = Normalizer::default();
        let set = KeywordSet::new(&["rumah kos rendah"], &normalizer);
        assert!(set.any_in(&normalizer.normalize("rendah kos rumah")));
        assert!(!set.any_in(&normalizer.normalize("rumah rendah")));
    }

    #[test]
    fn finds_contiguous_area_mentions() {
        let (keywords, normalizer) = builtin();
        let found = keywords.areas.mentioned_in(&normalizer.normalize("Taman Melati Wangsa Maju"));
        assert_eq!(found.into_iter().collect::<Vec<_>>(), vec!["wangsa maju"]);
        assert!(keywords
            .areas
            .mentioned_in(&normalizer.normalize("Wangsa Melati Maju"))
            .is_empty());
    }

    #[test]
    fn empty_custom_vocabulary_is_rejected() {
        let normalizer = Normalizer::default();
        let config = KeywordConfig {
            building: Some(vec![]),
            ..KeywordConfig::default()
        };
        assert!(matches!(
            Keywords::from_config(&config, &normalizer),
            Err(ConfigError::EmptyKeywordSet { name: "building" })
        ));

        let config = KeywordConfig {
            areas: Some(vec![" , ".to_string()]),
            ..KeywordConfig::default()
        };
        assert!(matches!(
            Keywords::from_config(&config, &normalizer),
            Err(ConfigError::EmptyKeywordSet { name: "area" })
        ));
    }

    #[test]
    fn common_tokens_are_normalized() {
        let normalizer = Normalizer::default();
        let config = KeywordConfig {
            common: Some(vec!["Jalan".to_string(), "Kuala Lumpur".to_string()]),
            ..KeywordConfig::default()
        };
        let keywords = Keywords::from_config(&config, &normalizer).unwrap();
        assert!(keywords.common.contains("jln"));
        assert!(keywords.common.contains("kuala"));
        assert!(keywords.common.contains("lumpur"));
    }
}
