//! Malay address abbreviation dictionary.
//!
//! Institutional names and common street-type words are folded into their
//! short forms so that "Sekolah Menengah Kebangsaan Seri Ampang" and
//! "SMK Seri Ampang" produce the same tokens. The table is applied
//! symmetrically to inputs, reference records, and keyword phrases.

use geomatch_matcher_models::Abbreviation;

use crate::ConfigError;

/// Built-in phrase → abbreviation pairs.
///
/// Longer phrases win over their prefixes regardless of order here; the
/// compiled table sorts by phrase length.
pub const BUILTIN_ABBREVIATIONS: &[(&str, &str)] = &[
    ("sekolah menengah kebangsaan", "smk"),
    ("sekolah menengah", "smk"),
    ("sekolah rendah kebangsaan", "srk"),
    ("sekolah kebangsaan", "sk"),
    ("sekolah rendah", "sk"),
    ("sekolah jenis kebangsaan", "sjk"),
    ("sekolah agama", "sra"),
    ("kolej vokasional", "kv"),
    ("kolej komuniti", "kk"),
    ("kolej matrikulasi", "km"),
    ("maktab rendah sains mara", "mrsm"),
    ("universiti teknologi mara", "uitm"),
    ("universiti kebangsaan malaysia", "ukm"),
    ("universiti teknologi malaysia", "utm"),
    ("universiti sains malaysia", "usm"),
    ("universiti putra malaysia", "upm"),
    ("universiti malaysia sabah", "ums"),
    ("universiti malaya", "um"),
    ("jalan", "jln"),
    ("lorong", "lrg"),
    ("kampung", "kg"),
    ("taman", "tmn"),
];

/// Returns the built-in dictionary as config entries.
#[must_use]
pub fn builtin() -> Vec<Abbreviation> {
    BUILTIN_ABBREVIATIONS
        .iter()
        .map(|(from, to)| Abbreviation::new(*from, *to))
        .collect()
}

/// A compiled dictionary that folds token runs into abbreviations.
#[derive(Debug, Clone, Default)]
pub struct AbbreviationTable {
    /// `(phrase tokens, replacement)`, longest phrase first.
    entries: Vec<(Vec<String>, String)>,
}

impl AbbreviationTable {
    /// Compiles dictionary entries.
    ///
    /// Phrases are lowercased and split on whitespace. Among phrases with
    /// the same word count the one listed first wins.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAbbreviation`] if a phrase or
    /// replacement is blank, a replacement is more than one word, or a
    /// replacement is itself a single-word phrase in the table (which would
    /// make folding order dependent).
    pub fn compile(entries: &[Abbreviation]) -> Result<Self, ConfigError> {
        let mut compiled: Vec<(Vec<String>, String)> = Vec::with_capacity(entries.len());

        for entry in entries {
            let phrase: Vec<String> = entry
                .from
                .to_lowercase()
                .split_whitespace()
                .map(str::to_string)
                .collect();
            let target = entry.to.trim().to_lowercase();

            let invalid = |message: &str| ConfigError::InvalidAbbreviation {
                from: entry.from.clone(),
                to: entry.to.clone(),
                message: message.to_string(),
            };

            if phrase.is_empty() {
                return Err(invalid("phrase is empty"));
            }
            if target.is_empty() {
                return Err(invalid("replacement is empty"));
            }
            if target.split_whitespace().count() > 1 {
                return Err(invalid("replacement must be a single token"));
            }

            compiled.push((phrase, target));
        }

        for (entry, (_, target)) in entries.iter().zip(&compiled) {
            let chained = compiled
                .iter()
                .any(|(phrase, other)| phrase.len() == 1 && phrase[0] == *target && other != target);
            if chained {
                return Err(ConfigError::InvalidAbbreviation {
                    from: entry.from.clone(),
                    to: entry.to.clone(),
                    message: "replacement is itself abbreviated".to_string(),
                });
            }
        }

        // Stable sort keeps first-listed priority among equal lengths.
        compiled.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Ok(Self { entries: compiled })
    }

    /// Compiles the built-in dictionary.
    #[must_use]
    pub fn builtin() -> Self {
        Self::compile(&builtin()).unwrap_or_else(|e| panic!("built-in abbreviations: {e}"))
    }

    /// Number of dictionary entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the dictionary folds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replaces every dictionary phrase in `tokens` with its abbreviation,
    /// scanning left to right and preferring the longest phrase at each
    /// position.
    #[must_use]
    pub fn fold(&self, tokens: &[String]) -> Vec<String> {
        let mut folded = Vec::with_capacity(tokens.len());
        let mut i = 0;

        'scan: while i < tokens.len() {
            for (phrase, target) in &self.entries {
                if tokens[i..].starts_with(phrase) {
                    folded.push(target.clone());
                    i += phrase.len();
                    continue 'scan;
                }
            }
            folded.push(tokens[i].clone());
            i += 1;
        }

        folded
    }
}
