//! Address normalization.
//!
//! Provides a deterministic normalization pipeline applied symmetrically to
//! input addresses, reference records, and keyword phrases, so that
//! "123 Jalan SS2/10, Petaling Jaya" and "jln ss2 10 petaling jaya" share
//! the same tokens.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::abbreviations::AbbreviationTable;

/// Filler punctuation and control characters replaced by a single space.
///
/// Hyphens are kept so names like "i-city" survive as one token.
static PUNCTUATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[,._;'{}\[\]\\?!*:\n\r\t/()#"]+"#).expect("valid regex"));

/// Upper bound on pipeline passes. Every pass after the first either
/// shortens the sequence or leaves it unchanged, so this is never reached
/// for real input.
const MAX_PASSES: usize = 16;

/// The normalized form of a piece of address text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedForm {
    /// Surviving tokens in first-occurrence order, without duplicates.
    pub sequence: Vec<String>,
    /// The same tokens as a set, for overlap arithmetic.
    pub tokens: BTreeSet<String>,
    /// Space-joined `sequence`.
    pub cleaned_text: String,
}

impl NormalizedForm {
    fn from_sequence(sequence: Vec<String>) -> Self {
        let tokens = sequence.iter().cloned().collect();
        let cleaned_text = sequence.join(" ");
        Self {
            sequence,
            tokens,
            cleaned_text,
        }
    }

    /// Number of distinct tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns `true` if nothing survived normalization.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Returns `true` if `token` is one of the normalized tokens.
    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }

    /// Returns `true` if `phrase` occurs as a contiguous run of tokens.
    #[must_use]
    pub fn contains_phrase(&self, phrase: &[String]) -> bool {
        !phrase.is_empty()
            && phrase.len() <= self.sequence.len()
            && self.sequence.windows(phrase.len()).any(|w| w == phrase)
    }
}

/// Turns raw address text into a [`NormalizedForm`].
#[derive(Debug, Clone)]
pub struct Normalizer {
    abbreviations: AbbreviationTable,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(AbbreviationTable::builtin())
    }
}

impl Normalizer {
    /// Creates a normalizer with the given abbreviation dictionary.
    #[must_use]
    pub const fn new(abbreviations: AbbreviationTable) -> Self {
        Self { abbreviations }
    }

    /// Normalizes address text.
    ///
    /// The pipeline:
    /// 1. Lowercase, strip filler punctuation, collapse whitespace
    /// 2. Fold dictionary phrases into abbreviations (longest first)
    /// 3. Collapse immediately repeated 5-digit postal codes
    /// 4. Drop a trailing number that repeats the previous token's unit
    /// 5. Deduplicate tokens, keeping the first occurrence
    ///
    /// Steps 2-5 repeat until the sequence stops changing, which makes
    /// `normalize(cleaned_text)` equal to `normalize(text)`.
    #[must_use]
    pub fn normalize(&self, text: &str) -> NormalizedForm {
        let mut sequence = self.pass(&tokenize(text));

        for _ in 0..MAX_PASSES {
            let next = self.pass(&sequence);
            if next == sequence {
                break;
            }
            sequence = next;
        }

        NormalizedForm::from_sequence(sequence)
    }

    fn pass(&self, tokens: &[String]) -> Vec<String> {
        let folded = self.abbreviations.fold(tokens);
        let collapsed = collapse_repeated_postal_codes(folded);
        let trimmed = collapse_trailing_unit(collapsed);
        dedupe_tokens(trimmed)
    }
}

/// Lowercases, strips filler punctuation, and splits on whitespace.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    PUNCTUATION_RE
        .replace_all(&lower, " ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Display form of reference text: lowercase, punctuation stripped,
/// whitespace collapsed, repeated postal codes collapsed. Unlike
/// [`Normalizer::normalize`], words are neither abbreviated nor
/// deduplicated.
#[must_use]
pub fn display_key(text: &str) -> String {
    collapse_repeated_postal_codes(tokenize(text)).join(" ")
}

fn is_postal_code(token: &str) -> bool {
    token.len() == 5 && token.bytes().all(|b| b.is_ascii_digit())
}

/// Collapses runs of the same 5-digit token (`"53100 53100"` → `"53100"`).
#[must_use]
pub fn collapse_repeated_postal_codes(tokens: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tokens.len());
    for token in tokens {
        if is_postal_code(&token) && out.last() == Some(&token) {
            continue;
        }
        out.push(token);
    }
    out
}

/// Drops a trailing number that repeats the numeric suffix of the token
/// before it (`"blok12 12"` → `"blok12"`).
#[must_use]
pub fn collapse_trailing_unit(mut tokens: Vec<String>) -> Vec<String> {
    let [.., word, number] = tokens.as_slice() else {
        return tokens;
    };

    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return tokens;
    }

    let prefix = word.trim_end_matches(|c: char| c.is_ascii_digit());
    let suffix = &word[prefix.len()..];

    if !prefix.is_empty() && suffix == number {
        tokens.pop();
    }
    tokens
}

/// Removes repeated tokens, keeping the first occurrence of each.
#[must_use]
pub fn dedupe_tokens(tokens: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    tokens
        .into_iter()
        .filter(|token| seen.insert(token.clone()))
        .collect()
}
