//! Merge, rank and paginate per-source hits.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::core::{
    ElementType, IndexEntry, SourceKind, SourcePriorityConfig, UnifiedEntry, compare_versions,
    is_newer,
};
use crate::search::Relevance;

/// Group hits by `(name, element_type)` into priority-ordered candidates.
///
/// Names compare case-insensitively so `Debug-Helper` in one source and
/// `debug-helper` in another are the same element. Within one source the
/// first hit for a key wins.
#[must_use]
pub fn merge_candidates(hits: Vec<IndexEntry>, priority: &SourcePriorityConfig) -> Vec<UnifiedEntry> {
    let mut groups: BTreeMap<(ElementType, String), Vec<IndexEntry>> = BTreeMap::new();
    for hit in hits {
        let group = groups
            .entry((hit.element_type, hit.name.to_lowercase()))
            .or_default();
        if group.iter().any(|c| c.source == hit.source) {
            continue;
        }
        group.push(hit);
    }

    groups
        .into_values()
        .filter_map(|mut candidates| {
            candidates.sort_by_key(|c| priority.rank(c.source));
            UnifiedEntry::from_candidates(candidates)
        })
        .collect()
}

/// Full ranking order: relevance descending, then source priority, then
/// most recent modification, then name.
#[must_use]
pub fn compare_ranked(
    a: &(UnifiedEntry, Relevance),
    b: &(UnifiedEntry, Relevance),
    priority: &SourcePriorityConfig,
) -> Ordering {
    let (a_entry, a_rel) = a;
    let (b_entry, b_rel) = b;
    b_rel
        .cmp_rank(a_rel)
        .then_with(|| {
            priority
                .rank(a_entry.primary().source)
                .cmp(&priority.rank(b_entry.primary().source))
        })
        .then_with(|| {
            b_entry
                .primary()
                .last_modified
                .cmp(&a_entry.primary().last_modified)
        })
        .then_with(|| a_entry.name.cmp(&b_entry.name))
        .then_with(|| a_entry.element_type.cmp(&b_entry.element_type))
}

/// Slice out one 1-based page.
#[must_use]
pub fn paginate<T>(items: Vec<T>, page: usize, page_size: usize) -> Vec<T> {
    let start = page.saturating_sub(1).saturating_mul(page_size);
    items.into_iter().skip(start).take(page_size).collect()
}

/// Newest non-primary candidate that beats the primary's version.
#[must_use]
pub fn newer_candidate(entry: &UnifiedEntry) -> Option<(SourceKind, String)> {
    let current = &entry.primary().version;
    entry
        .candidates
        .iter()
        .skip(1)
        .filter(|c| is_newer(&c.version, current))
        // max_by keeps the last maximum; reversed, that is the highest priority.
        .rev()
        .max_by(|a, b| compare_versions(&a.version, &b.version))
        .map(|c| (c.source, c.version.clone()))
}
