//! Relevance scoring: Jaccard similarity with an entropy tie-break.
//!
//! The primary signal is the Jaccard similarity between the query tokens
//! and an element's token set. Shannon entropy of the description's token
//! distribution only separates elements whose Jaccard values are equal, so
//! distinctively-worded elements outrank generic ones without ever flipping
//! a clear similarity ordering.
//!
//! The reported score is `J * (1 + band * w/(1+w) * H)`. The entropy factor
//! stays inside a band narrower than the step between any two Jaccard
//! values over fewer than a thousand tokens, so sorting by score and
//! sorting by [`Relevance::cmp_rank`] agree whatever the weight.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::core::IndexEntry;

use super::tokens::{description_tokens, entry_tokens};

/// Default weight of normalized entropy in the reported score.
pub const DEFAULT_ENTROPY_WEIGHT: f64 = 0.01;

/// Upper bound of the relative entropy bonus. Two Jaccard values with
/// unions below 1000 tokens differ by more than this.
pub const ENTROPY_BAND: f64 = 1e-6;

/// Default Jaccard threshold for relationship edges.
pub const DEFAULT_RELATIONSHIP_THRESHOLD: f64 = 0.3;

/// Entropy (bits) that maps to a normalized value of 1.0.
const ENTROPY_CEILING_BITS: f64 = 8.0;

/// Jaccard values closer than this are treated as equal.
const JACCARD_EPSILON: f64 = 1e-12;

/// `|A ∩ B| / |A ∪ B|`; two empty sets score 0.
#[must_use]
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    intersection as f64 / union as f64
}

/// `H = -Σ p(t)·log2 p(t)` over the token frequency distribution.
#[must_use]
pub fn shannon_entropy(tokens: &[String]) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for token in tokens {
        *counts.entry(token.as_str()).or_default() += 1;
    }
    let total = tokens.len() as f64;
    counts
        .values()
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// Tunable scoring constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Share of [`ENTROPY_BAND`] used by entropy, as `w / (1 + w)`
    pub entropy_weight: f64,
    /// Minimum Jaccard similarity for two elements to be related
    pub relationship_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            entropy_weight: DEFAULT_ENTROPY_WEIGHT,
            relationship_threshold: DEFAULT_RELATIONSHIP_THRESHOLD,
        }
    }
}

/// Score of one element against one query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Relevance {
    pub jaccard: f64,
    /// Normalized to `[0, 1]`
    pub entropy: f64,
    /// `jaccard * (1 + band * w/(1+w) * entropy)`
    pub score: f64,
}

impl Relevance {
    /// Order by Jaccard, then entropy. Descending sorts use `b.cmp_rank(a)`.
    #[must_use]
    pub fn cmp_rank(&self, other: &Self) -> Ordering {
        if (self.jaccard - other.jaccard).abs() > JACCARD_EPSILON {
            return self.jaccard.total_cmp(&other.jaccard);
        }
        self.entropy.total_cmp(&other.entropy)
    }
}

/// Stateless scorer.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelevanceScorer {
    config: ScoringConfig,
}

impl RelevanceScorer {
    #[must_use]
    pub const fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score `entry` against pre-tokenized query terms.
    #[must_use]
    pub fn score(&self, query: &BTreeSet<String>, entry: &IndexEntry) -> Relevance {
        let jaccard = jaccard(query, &entry_tokens(entry));
        let entropy =
            (shannon_entropy(&description_tokens(entry)) / ENTROPY_CEILING_BITS).clamp(0.0, 1.0);
        Relevance {
            jaccard,
            entropy,
            score: jaccard * (self.entropy_factor() * entropy).mul_add(ENTROPY_BAND, 1.0),
        }
    }

    /// `w / (1 + w)`: grows with the weight but never leaves `[0, 1)`.
    fn entropy_factor(&self) -> f64 {
        let weight = self.config.entropy_weight.max(0.0);
        if weight.is_finite() {
            weight / (1.0 + weight)
        } else {
            1.0
        }
    }
}

/// Whether `entry` matches the query at all.
///
/// An empty query matches everything. Otherwise the entry must share a
/// token with the query, or its name must contain the raw query.
#[must_use]
pub fn matches(query: &BTreeSet<String>, raw_query: &str, entry: &IndexEntry) -> bool {
    if query.is_empty() {
        return true;
    }
    let needle = raw_query.trim().to_lowercase();
    if !needle.is_empty() && entry.name.to_lowercase().contains(&needle) {
        return true;
    }
    let tokens = entry_tokens(entry);
    query.iter().any(|q| tokens.contains(q))
}
