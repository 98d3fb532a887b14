//! Verb trigger index.
//!
//! Maps single action verbs to the elements that declare them as triggers.
//! Entries are re-indexed only when their content fingerprint changes, and
//! whole snapshots are skipped when their generation has not moved.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::core::{ElementKey, ElementType, IndexEntry, SourceKind};

use super::tokens::stem;

#[derive(Debug, Clone)]
struct Indexed {
    fingerprint: String,
    verbs: BTreeSet<String>,
}

/// Precomputed verb → element map across sources.
#[derive(Debug, Default)]
pub struct VerbTriggerIndex {
    by_verb: BTreeMap<String, BTreeMap<ElementKey, BTreeSet<SourceKind>>>,
    entries: HashMap<(SourceKind, ElementKey), Indexed>,
    generations: HashMap<(SourceKind, ElementType), u64>,
}

impl VerbTriggerIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sync one `(source, type)` snapshot into the index.
    ///
    /// Returns `false` without touching anything when `generation` matches
    /// the last sync for that pair.
    pub fn sync_snapshot(
        &mut self,
        source: SourceKind,
        element_type: ElementType,
        generation: u64,
        entries: &[IndexEntry],
    ) -> bool {
        if self.generations.get(&(source, element_type)) == Some(&generation) {
            return false;
        }

        let present: BTreeSet<ElementKey> = entries.iter().map(IndexEntry::key).collect();
        let stale: Vec<(SourceKind, ElementKey)> = self
            .entries
            .keys()
            .filter(|(s, k)| {
                *s == source && k.element_type == element_type && !present.contains(k)
            })
            .cloned()
            .collect();
        for id in stale {
            self.remove(&id);
        }

        for entry in entries {
            self.upsert(source, entry);
        }

        self.generations.insert((source, element_type), generation);
        true
    }

    /// Index or re-index one entry if its fingerprint changed.
    pub fn upsert(&mut self, source: SourceKind, entry: &IndexEntry) {
        let id = (source, entry.key());
        if self
            .entries
            .get(&id)
            .is_some_and(|e| e.fingerprint == entry.content_fingerprint)
        {
            return;
        }
        self.remove(&id);

        let verbs: BTreeSet<String> = entry
            .triggers
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty() && !t.contains(char::is_whitespace))
            .map(stem)
            .collect();
        for verb in &verbs {
            self.by_verb
                .entry(verb.clone())
                .or_default()
                .entry(id.1.clone())
                .or_default()
                .insert(source);
        }
        self.entries.insert(
            id,
            Indexed {
                fingerprint: entry.content_fingerprint.clone(),
                verbs,
            },
        );
    }

    fn remove(&mut self, id: &(SourceKind, ElementKey)) {
        let Some(old) = self.entries.remove(id) else {
            return;
        };
        for verb in old.verbs {
            if let Some(elements) = self.by_verb.get_mut(&verb) {
                if let Some(sources) = elements.get_mut(&id.1) {
                    sources.remove(&id.0);
                    if sources.is_empty() {
                        elements.remove(&id.1);
                    }
                }
                if elements.is_empty() {
                    self.by_verb.remove(&verb);
                }
            }
        }
    }

    /// Query tokens that are known trigger verbs.
    #[must_use]
    pub fn verbs_in(&self, query_tokens: &[String]) -> Vec<String> {
        let mut found: Vec<String> = query_tokens
            .iter()
            .map(|t| stem(t))
            .filter(|v| self.by_verb.contains_key(v))
            .collect();
        found.sort();
        found.dedup();
        found
    }

    /// Elements declaring any verb in the query, limited to `sources`.
    ///
    /// Empty when the query names no known verb.
    #[must_use]
    pub fn candidates(&self, query_tokens: &[String], sources: &[SourceKind]) -> BTreeSet<ElementKey> {
        let mut out = BTreeSet::new();
        for verb in self.verbs_in(query_tokens) {
            if let Some(elements) = self.by_verb.get(&verb) {
                for (key, declared_in) in elements {
                    if declared_in.iter().any(|s| sources.contains(s)) {
                        out.insert(key.clone());
                    }
                }
            }
        }
        out
    }

    #[must_use]
    pub fn verb_count(&self) -> usize {
        self.by_verb.len()
    }

    #[must_use]
    pub fn element_count(&self) -> usize {
        self.entries.len()
    }
}
