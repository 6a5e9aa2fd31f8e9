//! Token-set and character n-gram similarity primitives.

use std::collections::{BTreeMap, BTreeSet};

use rapidfuzz::distance::indel;

/// Jaccard similarity `|a ∩ b| / |a ∪ b|` in `0.0..=1.0`.
///
/// Two empty sets have similarity 0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Normalized Indel similarity of two strings on the `0.0..=100.0` scale.
#[must_use]
pub fn ratio(a: &str, b: &str) -> f64 {
    100.0 * indel::normalized_similarity(a.chars(), b.chars())
}

/// Token-set ratio on the `0.0..=100.0` scale.
///
/// Splits both strings into token sets and compares the sorted shared
/// tokens against each side's shared-plus-leftover tokens, so word order
/// and repeated words do not matter and a subset scores 100.
#[must_use]
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();

    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let shared: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let only_a: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let only_b: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    if !shared.is_empty() && (only_a.is_empty() || only_b.is_empty()) {
        return 100.0;
    }

    let shared = shared.join(" ");
    let with_a = join_nonempty(&shared, &only_a.join(" "));
    let with_b = join_nonempty(&shared, &only_b.join(" "));

    let mut best = ratio(&with_a, &with_b);
    if !shared.is_empty() {
        best = best.max(ratio(&shared, &with_a)).max(ratio(&shared, &with_b));
    }
    best
}

fn join_nonempty(head: &str, tail: &str) -> String {
    match (head.is_empty(), tail.is_empty()) {
        (true, _) => tail.to_string(),
        (_, true) => head.to_string(),
        _ => format!("{head} {tail}"),
    }
}

type SparseVector = BTreeMap<String, f64>;

/// Character n-gram TF-IDF vectors fitted on a set of documents.
///
/// Raw n-gram counts weighted by the smoothed inverse document frequency
/// `ln((1 + n) / (1 + df)) + 1`, then L2-normalized. N-grams never seen
/// during fitting carry no weight.
#[derive(Debug, Clone, Default)]
pub struct CharNgramTfIdf {
    n: usize,
    idf: BTreeMap<String, f64>,
    vectors: Vec<SparseVector>,
}

impl CharNgramTfIdf {
    /// Fits the vocabulary and weights on `documents`, keeping one vector
    /// per document in order.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fit<'a>(documents: impl IntoIterator<Item = &'a str>, n: usize) -> Self {
        let counts: Vec<SparseVector> = documents
            .into_iter()
            .map(|doc| char_ngrams(doc, n))
            .collect();

        let mut document_frequency: BTreeMap<&str, usize> = BTreeMap::new();
        for doc in &counts {
            for gram in doc.keys() {
                *document_frequency.entry(gram.as_str()).or_default() += 1;
            }
        }

        let total = counts.len() as f64;
        let idf: BTreeMap<String, f64> = document_frequency
            .into_iter()
            .map(|(gram, df)| (gram.to_string(), ((1.0 + total) / (1.0 + df as f64)).ln() + 1.0))
            .collect();

        let vectors = counts.into_iter().map(|doc| weigh(doc, &idf)).collect();

        Self { n, idf, vectors }
    }

    /// Number of fitted documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Returns `true` if nothing was fitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Cosine similarity of `text` against every fitted document, in
    /// `0.0..=1.0`.
    #[must_use]
    pub fn cosine_all(&self, text: &str) -> Vec<f64> {
        let query = weigh(char_ngrams(text, self.n), &self.idf);
        self.vectors.iter().map(|doc| dot(&query, doc)).collect()
    }
}

fn char_ngrams(text: &str, n: usize) -> SparseVector {
    let chars: Vec<char> = text.chars().collect();
    let mut counts = SparseVector::new();
    if n == 0 {
        return counts;
    }
    for window in chars.windows(n) {
        *counts.entry(window.iter().collect()).or_default() += 1.0;
    }
    counts
}

fn weigh(counts: SparseVector, idf: &BTreeMap<String, f64>) -> SparseVector {
    let mut weighted: SparseVector = counts
        .into_iter()
        .filter_map(|(gram, count)| idf.get(&gram).map(|w| (gram, count * w)))
        .collect();
    let norm = weighted.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm > 0.0 {
        for w in weighted.values_mut() {
            *w /= norm;
        }
    }
    weighted
}

fn dot(a: &SparseVector, b: &SparseVector) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(gram, w)| large.get(gram).map(|v| w * v))
        .sum::<f64>()
        .min(1.0)
}
