//! Element-to-element relationship edges.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::core::{ElementKey, IndexEntry};

use super::relevance::jaccard;
use super::tokens::entry_tokens;

/// One neighbor of an element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedElement {
    pub key: ElementKey,
    pub similarity: f64,
}

/// Undirected similarity graph over a set of elements.
#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    threshold: f64,
    edges: BTreeMap<ElementKey, Vec<RelatedElement>>,
}

impl RelationshipGraph {
    /// Connect every pair whose token-set Jaccard exceeds `threshold`.
    ///
    /// Duplicate keys keep their first occurrence.
    #[must_use]
    pub fn build(entries: &[IndexEntry], threshold: f64) -> Self {
        let mut nodes: Vec<(ElementKey, BTreeSet<String>)> = Vec::with_capacity(entries.len());
        let mut seen = BTreeSet::new();
        for entry in entries {
            let key = entry.key();
            if seen.insert(key.clone()) {
                nodes.push((key, entry_tokens(entry)));
            }
        }

        let mut edges: BTreeMap<ElementKey, Vec<RelatedElement>> = BTreeMap::new();
        for (i, (a_key, a_tokens)) in nodes.iter().enumerate() {
            for (b_key, b_tokens) in &nodes[i + 1..] {
                let similarity = jaccard(a_tokens, b_tokens);
                if similarity > threshold {
                    edges.entry(a_key.clone()).or_default().push(RelatedElement {
                        key: b_key.clone(),
                        similarity,
                    });
                    edges.entry(b_key.clone()).or_default().push(RelatedElement {
                        key: a_key.clone(),
                        similarity,
                    });
                }
            }
        }

        for neighbors in edges.values_mut() {
            neighbors.sort_by(|x, y| {
                y.similarity
                    .total_cmp(&x.similarity)
                    .then_with(|| x.key.cmp(&y.key))
            });
        }

        Self { threshold, edges }
    }

    /// Neighbors of `key`, most similar first.
    #[must_use]
    pub fn related(&self, key: &ElementKey) -> &[RelatedElement] {
        self.edges.get(key).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Number of undirected edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum::<usize>() / 2
    }
}
