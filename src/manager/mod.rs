//! Unified index manager.
//!
//! Consults the registered source indexes strictly in priority order,
//! merges their hits by `(name, element_type)`, ranks them and answers
//! name resolution with early termination. Remote trouble never escapes
//! as an error: failing sources are skipped (or, with `fallback_on_error`
//! off, reported as one aggregate [`IndexError::SourceFailed`]) and slow
//! sources are cut off by the call-level deadline with partial results.

pub mod merge;
pub mod options;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::core::{ElementKey, ElementType, IndexEntry, SourceKind, SourcePriorityConfig};
use crate::error::{IndexError, Result};
use crate::index::{IndexRegistry, Snapshot, SnapshotStore, SourceIndex, SourceStats};
use crate::search::tokens::{token_set, tokenize};
use crate::search::{RelatedElement, RelationshipGraph, RelevanceScorer, VerbTriggerIndex};

pub use merge::{compare_ranked, merge_candidates, newer_candidate, paginate};
pub use options::{ResolveOptions, Resolved, SearchOptions, SearchPage};

/// Page size and deadline defaults for search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub timeout: Option<Duration>,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
            timeout: None,
        }
    }
}

/// Side-effect-free diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStats {
    pub sources: Vec<SourceStats>,
    pub priority: SourcePriorityConfig,
    pub trigger_verbs: usize,
    pub trigger_elements: usize,
}

enum LoadFailure {
    TimedOut,
    Failed(IndexError),
}

type GraphSignature = Vec<(SourceKind, ElementType, u64)>;

/// Orchestrates search and resolve across every registered source.
pub struct UnifiedIndexManager {
    registry: IndexRegistry,
    priority: SourcePriorityConfig,
    scorer: RelevanceScorer,
    limits: SearchLimits,
    verbs: RwLock<VerbTriggerIndex>,
    graph: Mutex<Option<(GraphSignature, Arc<RelationshipGraph>)>>,
}

impl UnifiedIndexManager {
    #[must_use]
    pub fn new(
        registry: IndexRegistry,
        priority: SourcePriorityConfig,
        scorer: RelevanceScorer,
    ) -> Self {
        Self {
            registry,
            priority,
            scorer,
            limits: SearchLimits::default(),
            verbs: RwLock::new(VerbTriggerIndex::new()),
            graph: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn with_limits(mut self, limits: SearchLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub const fn registry(&self) -> &IndexRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn priority(&self) -> &SourcePriorityConfig {
        &self.priority
    }

    // =========================================================================
    // SEARCH
    // =========================================================================

    /// Free-text search across sources.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Configuration`] for an invalid per-call
    /// priority override, and [`IndexError::SourceFailed`] when a source
    /// faults with `fallback_on_error` disabled.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<SearchPage> {
        let priority = match &options.priority {
            Some(order) => self.priority.with_priority(order.clone())?,
            None => self.priority.clone(),
        };
        let sources = self.registered(priority.enabled(options.sources.as_deref()));
        let types = options.element_types();
        let page = options.page.max(1);
        let page_size = options
            .page_size
            .unwrap_or(self.limits.default_page_size)
            .clamp(1, self.limits.max_page_size.max(1));
        let deadline = options.timeout.or(self.limits.timeout).map(|t| Instant::now() + t);

        let mut hits: Vec<IndexEntry> = Vec::new();
        let mut consulted = Vec::new();
        let mut skipped = Vec::new();
        let mut partial = false;

        for (position, source) in sources.iter().copied().enumerate() {
            let Some(index) = self.registry.get(source) else {
                continue;
            };
            match self.load_types(index.as_ref(), &types, None, deadline).await {
                Ok(()) => {}
                Err(LoadFailure::TimedOut) => {
                    partial = true;
                    skipped.extend_from_slice(&sources[position..]);
                    warn!(
                        source = %source,
                        skipped = ?&sources[position..],
                        "Search deadline expired; returning partial results"
                    );
                    break;
                }
                Err(LoadFailure::Failed(err)) => {
                    self.absorb_failure(&priority, source, err)?;
                    skipped.push(source);
                    continue;
                }
            }

            consulted.push(source);
            let found: Vec<IndexEntry> = types
                .iter()
                .flat_map(|t| index.search(query, Some(*t)))
                .collect();
            debug!(source = %source, hits = found.len(), "Source searched");
            let had_hits = !found.is_empty();
            hits.extend(found);
            if had_hits && priority.stop_on_first && !options.include_all {
                break;
            }
        }

        let mut merged = merge_candidates(hits, &priority);

        let query_tokens = tokenize(query);
        let verb_hits = self.verbs.read().candidates(&query_tokens, &consulted);
        if !verb_hits.is_empty() {
            let declares = |entry: &crate::core::UnifiedEntry| {
                entry.candidates.iter().any(|c| verb_hits.contains(&c.key()))
            };
            if merged.iter().any(declares) {
                merged.retain(declares);
                debug!(candidates = merged.len(), "Scoring restricted to verb trigger candidates");
            }
        }

        let query_set = token_set(query);
        let mut ranked: Vec<_> = merged
            .into_iter()
            .map(|mut entry| {
                let relevance = self.scorer.score(&query_set, entry.primary());
                entry.score = Some(relevance.score);
                (entry, relevance)
            })
            .collect();
        ranked.sort_by(|a, b| compare_ranked(a, b, &priority));
        // Jaccard steps over very long token sets can fall inside the entropy band.
        let mut ceiling = f64::INFINITY;
        for (entry, _) in &mut ranked {
            if let Some(score) = entry.score.as_mut() {
                *score = score.min(ceiling);
                ceiling = *score;
            }
        }

        let total = ranked.len();
        let items = paginate(ranked, page, page_size)
            .into_iter()
            .map(|(entry, _)| entry)
            .collect();

        Ok(SearchPage {
            items,
            total,
            page,
            page_size,
            partial,
            skipped_sources: skipped,
        })
    }

    // =========================================================================
    // RESOLVE
    // =========================================================================

    /// Find the authoritative copy of one element.
    ///
    /// Returns `Ok(None)` when no consulted source holds it.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::SourceFailed`] when a source faults with
    /// `fallback_on_error` disabled.
    pub async fn resolve(
        &self,
        name: &str,
        element_type: ElementType,
        options: &ResolveOptions,
    ) -> Result<Option<Resolved>> {
        let mut order = self.registered(self.priority.priority().to_vec());
        if let Some(preferred) = options.preferred_source {
            if self.registry.get(preferred).is_some() {
                order.retain(|s| *s != preferred);
                order.insert(0, preferred);
            }
        }
        if order.is_empty() {
            return Ok(None);
        }
        let priority = self.priority.with_priority(order.clone())?;

        let check_all = options
            .check_all_for_updates
            .unwrap_or(priority.check_all_for_updates);
        let stop_on_first = options.stop_on_first.unwrap_or(priority.stop_on_first);
        let collect_all = check_all || options.include_all || !stop_on_first;
        let deadline = options.timeout.or(self.limits.timeout).map(|t| Instant::now() + t);
        let key = ElementKey::new(name, element_type);

        let mut candidates = Vec::new();
        let mut partial = false;
        for source in order {
            let Some(index) = self.registry.get(source) else {
                continue;
            };
            let force = index.is_distrusted(&key);
            if force {
                debug!(source = %source, element = %key, "Recently modified; forcing rebuild");
            }
            match self
                .load_types(index.as_ref(), &[element_type], Some(force), deadline)
                .await
            {
                Ok(()) => {}
                Err(LoadFailure::TimedOut) => {
                    partial = true;
                    warn!(source = %source, element = %key, "Resolve deadline expired");
                    break;
                }
                Err(LoadFailure::Failed(err)) => {
                    self.absorb_failure(&priority, source, err)?;
                    continue;
                }
            }

            if let Some(entry) = index.find(name, element_type) {
                debug!(source = %source, element = %key, version = %entry.version, "Resolved candidate");
                candidates.push(entry);
                if !collect_all {
                    break;
                }
            }
        }

        let Some(entry) = merge_candidates(candidates, &priority).into_iter().next() else {
            return Ok(None);
        };
        let update = newer_candidate(&entry);
        if let Some((source, version)) = &update {
            info!(
                element = %key,
                current = %entry.primary().version,
                update_source = %source,
                update_version = %version,
                "Newer version available"
            );
        }

        Ok(Some(Resolved {
            entry,
            update_available: update.is_some(),
            update_source: update.as_ref().map(|(s, _)| *s),
            update_version: update.map(|(_, v)| v),
            partial,
        }))
    }

    // =========================================================================
    // WRITE PATH, DIAGNOSTICS, RELATIONSHIPS
    // =========================================================================

    /// Invalidate one source after a write. Returns `false` for an
    /// unregistered source.
    pub fn invalidate(&self, source: SourceKind, reason: &str, element: Option<&ElementKey>) -> bool {
        let Some(index) = self.registry.get(source) else {
            debug!(source = %source, reason, "Invalidate for unregistered source ignored");
            return false;
        };
        index.invalidate(reason, element);
        *self.graph.lock() = None;
        true
    }

    #[must_use]
    pub fn stats(&self) -> ManagerStats {
        let sources = self
            .priority
            .priority()
            .iter()
            .filter_map(|s| self.registry.get(*s))
            .map(|index| index.stats())
            .collect();
        let verbs = self.verbs.read();
        ManagerStats {
            sources,
            priority: self.priority.clone(),
            trigger_verbs: verbs.verb_count(),
            trigger_elements: verbs.element_count(),
        }
    }

    /// Elements related to `name` by token overlap, most similar first.
    ///
    /// # Errors
    ///
    /// Same as [`Self::search`].
    pub async fn related(&self, name: &str, element_type: ElementType) -> Result<Vec<RelatedElement>> {
        let sources = self.registered(self.priority.priority().to_vec());
        let mut snapshots: Vec<Arc<Snapshot>> = Vec::new();
        for source in sources {
            let Some(index) = self.registry.get(source) else {
                continue;
            };
            for element_type in ElementType::ALL {
                match index.get_index(element_type, false).await {
                    Ok(snapshot) => {
                        self.sync_verbs(&snapshot);
                        snapshots.push(snapshot);
                    }
                    Err(err) => self.absorb_failure(&self.priority, source, err)?,
                }
            }
        }

        let graph = self.graph_for(&snapshots);
        let key = graph_key(&snapshots, name, element_type);
        Ok(graph.related(&key).to_vec())
    }

    /// Persist every registered source.
    ///
    /// # Errors
    ///
    /// Returns the first I/O or serialization error.
    pub fn save_snapshots(&self, store: &SnapshotStore) -> Result<usize> {
        self.registry.save_all(store)
    }

    /// Seed empty caches from disk.
    pub fn load_snapshots(&self, store: &SnapshotStore) -> usize {
        let restored = self.registry.restore_all(store);
        if restored > 0 {
            info!(snapshots = restored, dir = %store.dir().display(), "Restored persisted snapshots");
        }
        restored
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn registered(&self, order: Vec<SourceKind>) -> Vec<SourceKind> {
        order
            .into_iter()
            .filter(|s| self.registry.get(*s).is_some())
            .collect()
    }

    /// `force` of `None` means a plain read.
    async fn load_types(
        &self,
        index: &dyn SourceIndex,
        types: &[ElementType],
        force: Option<bool>,
        deadline: Option<Instant>,
    ) -> std::result::Result<(), LoadFailure> {
        let force = force.unwrap_or(false);
        for element_type in types {
            let load = index.get_index(*element_type, force);
            let outcome = match deadline {
                Some(deadline) => match timeout_at(deadline, load).await {
                    Ok(outcome) => outcome,
                    Err(_) => return Err(LoadFailure::TimedOut),
                },
                None => load.await,
            };
            let snapshot = outcome.map_err(LoadFailure::Failed)?;
            self.sync_verbs(&snapshot);
        }
        Ok(())
    }

    fn sync_verbs(&self, snapshot: &Snapshot) {
        let changed = self.verbs.write().sync_snapshot(
            snapshot.source,
            snapshot.element_type,
            snapshot.generation,
            &snapshot.entries,
        );
        if changed {
            debug!(
                source = %snapshot.source,
                element_type = %snapshot.element_type,
                generation = snapshot.generation,
                "Verb trigger index synced"
            );
        }
    }

    fn absorb_failure(
        &self,
        priority: &SourcePriorityConfig,
        source: SourceKind,
        err: IndexError,
    ) -> Result<()> {
        if priority.fallback_on_error {
            warn!(source = %source, reason = %err, "Source failed; continuing with next source");
            return Ok(());
        }
        Err(IndexError::SourceFailed {
            source_kind: source,
            reason: err.to_string(),
        })
    }

    fn graph_for(&self, snapshots: &[Arc<Snapshot>]) -> Arc<RelationshipGraph> {
        let signature: GraphSignature = snapshots
            .iter()
            .map(|s| (s.source, s.element_type, s.generation))
            .collect();

        let mut cached = self.graph.lock();
        if let Some((seen, graph)) = cached.as_ref() {
            if *seen == signature {
                return Arc::clone(graph);
            }
        }

        let hits: Vec<IndexEntry> = snapshots
            .iter()
            .flat_map(|s| s.entries.iter().cloned())
            .collect();
        let primaries: Vec<IndexEntry> = merge_candidates(hits, &self.priority)
            .into_iter()
            .map(|e| e.primary().clone())
            .collect();
        let graph = Arc::new(RelationshipGraph::build(
            &primaries,
            self.scorer.config().relationship_threshold,
        ));
        debug!(elements = primaries.len(), edges = graph.edge_count(), "Relationship graph built");
        *cached = Some((signature, Arc::clone(&graph)));
        graph
    }
}

/// Graph key for `name`, matching the primary's spelling when the name
/// differs only in case.
fn graph_key(snapshots: &[Arc<Snapshot>], name: &str, element_type: ElementType) -> ElementKey {
    let mut spellings: BTreeSet<&str> = BTreeSet::new();
    for snapshot in snapshots.iter().filter(|s| s.element_type == element_type) {
        if let Some(entry) = snapshot.find(name) {
            spellings.insert(entry.name.as_str());
        }
    }
    let spelled = if spellings.contains(name) {
        name
    } else {
        spellings.iter().next().copied().unwrap_or(name)
    };
    ElementKey::new(spelled, element_type)
}

impl std::fmt::Debug for UnifiedIndexManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnifiedIndexManager")
            .field("registry", &self.registry)
            .field("priority", &self.priority)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}
