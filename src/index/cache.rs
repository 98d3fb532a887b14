//! Snapshot cache engine shared by every source.
//!
//! [`SourceCache`] owns one slot per element type. A slot holds the current
//! `Arc<Snapshot>` behind a `parking_lot::RwLock`; rebuilds are produced by
//! an [`IndexBuilder`] off to the side and swapped in whole, so readers
//! never see a partially built index.
//!
//! Rebuilds of one slot are serialized by an async mutex. A caller that
//! waited on that mutex and finds the slot generation moved reuses the
//! result instead of building again.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::core::{ElementKey, ElementType, IndexEntry, SourceKind};
use crate::error::{IndexError, Result};

use super::github::RateLimitStatus;
use super::{CacheState, Snapshot, SourceIndex, SourceStats, TypeStats};

/// Default deadline for one rebuild.
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(60);

/// Pause before another background refresh after a failure.
pub const DEFAULT_FAILURE_COOLDOWN: Duration = Duration::from_secs(30);

/// How long a just-written element is distrusted in a fresh cache.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(120);

// =============================================================================
// BUILDER CONTRACT
// =============================================================================

/// Produces the entries of one element type for one source.
#[async_trait]
pub trait IndexBuilder: Send + Sync + 'static {
    fn source(&self) -> SourceKind;

    /// Time-to-live of a successful build. `None` never expires.
    fn ttl(&self) -> Option<Duration>;

    /// Build entries for `element_type`. `previous` is the last good
    /// snapshot of that type, if any; builders may reuse unchanged entries.
    ///
    /// # Errors
    ///
    /// Any error is absorbed by the cache and triggers its fallback path.
    async fn build(
        &self,
        element_type: ElementType,
        previous: Option<Arc<Snapshot>>,
    ) -> Result<BuildOutput>;

    /// Called when `element_type` is invalidated, before any rebuild.
    fn on_invalidate(&self, _element_type: ElementType) {}

    /// Remote quota, for sources that have one.
    fn rate_limit(&self) -> Option<RateLimitStatus> {
        None
    }
}

/// Entries plus diagnostics from one build.
///
/// Inserting a name already present replaces the earlier entry and
/// records a warning.
#[derive(Debug, Default)]
pub struct BuildOutput {
    entries: Vec<IndexEntry>,
    positions: HashMap<String, usize>,
    pub warnings: Vec<String>,
}

impl BuildOutput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: IndexEntry) {
        if let Some(&pos) = self.positions.get(&entry.name) {
            let previous = &self.entries[pos];
            warn!(
                source = %entry.source,
                element_type = %entry.element_type,
                name = %entry.name,
                replaced = %previous.source_ref,
                winner = %entry.source_ref,
                "Duplicate element name in source; later entry wins"
            );
            self.warnings.push(format!(
                "duplicate {} '{}': {} replaced by {}",
                entry.element_type, entry.name, previous.source_ref, entry.source_ref
            ));
            self.entries[pos] = entry;
        } else {
            self.positions.insert(entry.name.clone(), self.entries.len());
            self.entries.push(entry);
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by name.
    #[must_use]
    pub fn into_parts(self) -> (Vec<IndexEntry>, Vec<String>) {
        let mut entries = self.entries;
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        (entries, self.warnings)
    }
}

// =============================================================================
// SETTINGS
// =============================================================================

/// Timing knobs of a [`SourceCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub build_timeout: Duration,
    pub failure_cooldown: Duration,
    pub grace_period: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            build_timeout: DEFAULT_BUILD_TIMEOUT,
            failure_cooldown: DEFAULT_FAILURE_COOLDOWN,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

// =============================================================================
// SLOTS
// =============================================================================

struct SlotState {
    state: CacheState,
    snapshot: Arc<Snapshot>,
    /// Snapshot came from a successful build or a restore
    has_good: bool,
    built_at: Option<Instant>,
    last_built: Option<DateTime<Utc>>,
    last_error: Option<String>,
    last_failure: Option<Instant>,
    degraded: bool,
}

struct TypeSlot {
    element_type: ElementType,
    state: RwLock<SlotState>,
    build_lock: Arc<tokio::sync::Mutex<()>>,
    generation: AtomicU64,
    invalidations: AtomicU64,
    refreshing: AtomicBool,
}

impl TypeSlot {
    fn new(source: SourceKind, element_type: ElementType) -> Self {
        Self {
            element_type,
            state: RwLock::new(SlotState {
                state: CacheState::Empty,
                snapshot: Arc::new(Snapshot::empty(source, element_type)),
                has_good: false,
                built_at: None,
                last_built: None,
                last_error: None,
                last_failure: None,
                degraded: false,
            }),
            build_lock: Arc::new(tokio::sync::Mutex::new(())),
            generation: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            refreshing: AtomicBool::new(false),
        }
    }
}

struct CacheInner<B> {
    builder: B,
    settings: CacheSettings,
    slots: Vec<TypeSlot>,
    recently_modified: Mutex<HashMap<ElementKey, Instant>>,
}

// =============================================================================
// SOURCE CACHE
// =============================================================================

/// [`SourceIndex`] implementation over an [`IndexBuilder`].
pub struct SourceCache<B: IndexBuilder> {
    inner: Arc<CacheInner<B>>,
}

impl<B: IndexBuilder> Clone for SourceCache<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: IndexBuilder> SourceCache<B> {
    #[must_use]
    pub fn new(builder: B, settings: CacheSettings) -> Self {
        let source = builder.source();
        let slots = ElementType::ALL
            .iter()
            .map(|t| TypeSlot::new(source, *t))
            .collect();
        Self {
            inner: Arc::new(CacheInner {
                builder,
                settings,
                slots,
                recently_modified: Mutex::new(HashMap::new()),
            }),
        }
    }

    #[must_use]
    pub fn builder(&self) -> &B {
        &self.inner.builder
    }

    #[must_use]
    pub fn settings(&self) -> CacheSettings {
        self.inner.settings
    }

    /// Whether the last rebuild of `element_type` failed.
    #[must_use]
    pub fn is_degraded(&self, element_type: ElementType) -> bool {
        self.inner.slot(element_type).state.read().degraded
    }

    /// Current snapshot without any state transition.
    #[must_use]
    pub fn current(&self, element_type: ElementType) -> Arc<Snapshot> {
        Arc::clone(&self.inner.slot(element_type).state.read().snapshot)
    }

    /// Wait for an in-flight background refresh of `element_type`.
    pub async fn settle(&self, element_type: ElementType) {
        let slot = self.inner.slot(element_type);
        while slot.refreshing.load(Ordering::Acquire) {
            let _guard = slot.build_lock.lock().await;
            tokio::task::yield_now().await;
        }
    }

    fn spawn_refresh(&self, element_type: ElementType) {
        let slot = self.inner.slot(element_type);
        {
            let state = slot.state.read();
            if let Some(failed) = state.last_failure {
                if failed.elapsed() < self.inner.settings.failure_cooldown {
                    debug!(
                        source = %self.inner.builder.source(),
                        element_type = %element_type,
                        "Background refresh skipped during failure cooldown"
                    );
                    return;
                }
            }
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        if slot
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let inner = Arc::clone(&self.inner);
        let observed = slot.generation.load(Ordering::Acquire);
        handle.spawn(async move {
            let slot = inner.slot(element_type);
            {
                let _guard = slot.build_lock.lock().await;
                if slot.generation.load(Ordering::Acquire) == observed {
                    inner.run_build(element_type).await;
                }
            }
            slot.refreshing.store(false, Ordering::Release);
        });
    }
}

impl<B: IndexBuilder> CacheInner<B> {
    fn slot(&self, element_type: ElementType) -> &TypeSlot {
        let idx = ElementType::ALL
            .iter()
            .position(|t| *t == element_type)
            .unwrap_or_default();
        &self.slots[idx]
    }

    /// Effective state, demoting an expired `Fresh` to `Stale`.
    fn effective_state(&self, state: &SlotState) -> CacheState {
        match (state.state, self.builder.ttl(), state.built_at) {
            (CacheState::Fresh, Some(ttl), Some(built)) if built.elapsed() >= ttl => {
                CacheState::Stale
            }
            (s, _, _) => s,
        }
    }

    /// Run one build and swap the outcome in. Caller holds the build lock.
    async fn run_build(&self, element_type: ElementType) -> Arc<Snapshot> {
        let source = self.builder.source();
        let slot = self.slot(element_type);
        let invalidations_at_start = slot.invalidations.load(Ordering::Acquire);
        let generation = slot.generation.load(Ordering::Acquire) + 1;

        let previous = {
            let mut state = slot.state.write();
            if matches!(state.state, CacheState::Empty | CacheState::Invalidated) {
                state.state = CacheState::Building;
            }
            state.has_good.then(|| Arc::clone(&state.snapshot))
        };

        let started = Instant::now();
        let build = self.builder.build(element_type, previous);
        let outcome =
            match tokio::time::timeout(self.settings.build_timeout, build).await {
                Ok(result) => result,
                Err(_) => Err(IndexError::Timeout(format!(
                    "{source} {element_type} rebuild exceeded {:?}",
                    self.settings.build_timeout
                ))),
            };

        let snapshot = {
            let mut state = slot.state.write();
            match outcome {
                Ok(output) => {
                    let (entries, warnings) = output.into_parts();
                    let snapshot = Arc::new(Snapshot {
                        source,
                        element_type,
                        entries,
                        built_at: Some(Utc::now()),
                        generation,
                        warnings,
                    });
                    let invalidated_meanwhile =
                        slot.invalidations.load(Ordering::Acquire) != invalidations_at_start;
                    state.state = if invalidated_meanwhile {
                        CacheState::Invalidated
                    } else {
                        CacheState::Fresh
                    };
                    state.snapshot = Arc::clone(&snapshot);
                    state.has_good = true;
                    state.built_at = Some(Instant::now());
                    state.last_built = snapshot.built_at;
                    state.last_error = None;
                    state.last_failure = None;
                    state.degraded = false;
                    info!(
                        source = %source,
                        element_type = %element_type,
                        entries = snapshot.len(),
                        warnings = snapshot.warnings.len(),
                        elapsed_ms = started.elapsed().as_millis(),
                        "Index rebuilt"
                    );
                    snapshot
                }
                Err(err) => {
                    state.last_error = Some(err.to_string());
                    state.last_failure = Some(Instant::now());
                    state.degraded = true;
                    if state.has_good {
                        state.state = CacheState::Stale;
                        warn!(
                            source = %source,
                            element_type = %element_type,
                            reason = %err,
                            entries = state.snapshot.len(),
                            "Rebuild failed; serving last good snapshot"
                        );
                    } else {
                        state.state = CacheState::Empty;
                        state.snapshot = Arc::new(Snapshot {
                            generation,
                            ..Snapshot::empty(source, element_type)
                        });
                        warn!(
                            source = %source,
                            element_type = %element_type,
                            reason = %err,
                            "Rebuild failed with no prior snapshot; serving empty index"
                        );
                    }
                    Arc::clone(&state.snapshot)
                }
            }
        };

        slot.generation.store(generation, Ordering::Release);
        snapshot
    }

    fn type_stats(&self, slot: &TypeSlot) -> TypeStats {
        let state = slot.state.read();
        let effective = self.effective_state(&state);
        TypeStats {
            element_type: slot.element_type,
            state: effective,
            entry_count: state.snapshot.len(),
            last_built: state.last_built,
            last_error: state.last_error.clone(),
            degraded: state.degraded,
            refreshing: slot.refreshing.load(Ordering::Acquire),
            warnings: state.snapshot.warnings.len(),
        }
    }
}

#[async_trait]
impl<B: IndexBuilder> SourceIndex for SourceCache<B> {
    fn source(&self) -> SourceKind {
        self.inner.builder.source()
    }

    async fn get_index(
        &self,
        element_type: ElementType,
        force_refresh: bool,
    ) -> Result<Arc<Snapshot>> {
        let slot = self.inner.slot(element_type);
        let observed = slot.generation.load(Ordering::Acquire);

        if !force_refresh {
            let (effective, snapshot, cooling_down) = {
                let state = slot.state.read();
                let cooling_down = state
                    .last_failure
                    .is_some_and(|at| at.elapsed() < self.inner.settings.failure_cooldown);
                (
                    self.inner.effective_state(&state),
                    Arc::clone(&state.snapshot),
                    cooling_down,
                )
            };
            match effective {
                CacheState::Fresh => return Ok(snapshot),
                CacheState::Stale => {
                    self.spawn_refresh(element_type);
                    return Ok(snapshot);
                }
                // A cold source that just failed is not hammered on every call.
                CacheState::Empty if cooling_down => return Ok(snapshot),
                CacheState::Empty | CacheState::Building | CacheState::Invalidated => {}
            }
        }

        let guard = Arc::clone(&slot.build_lock).lock_owned().await;
        if slot.generation.load(Ordering::Acquire) != observed {
            debug!(
                source = %self.source(),
                element_type = %element_type,
                "Reusing rebuild completed while waiting"
            );
            return Ok(Arc::clone(&slot.state.read().snapshot));
        }

        // The build owns the lock and outlives a caller that stops waiting.
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let _guard = guard;
            inner.run_build(element_type).await
        })
        .await
        .map_err(|err| IndexError::SourceFailed {
            source_kind: self.source(),
            reason: format!("{element_type} rebuild task failed: {err}"),
        })
    }

    fn search(&self, query: &str, element_type: Option<ElementType>) -> Vec<IndexEntry> {
        ElementType::ALL
            .iter()
            .filter(|t| element_type.is_none_or(|want| want == **t))
            .flat_map(|t| self.current(*t).search(query))
            .collect()
    }

    fn find(&self, name: &str, element_type: ElementType) -> Option<IndexEntry> {
        self.current(element_type).find(name).cloned()
    }

    fn invalidate(&self, reason: &str, element: Option<&ElementKey>) {
        let source = self.source();
        let types: Vec<ElementType> = match element {
            Some(key) => {
                self.inner
                    .recently_modified
                    .lock()
                    .insert(key.clone(), Instant::now());
                vec![key.element_type]
            }
            None => ElementType::ALL.to_vec(),
        };

        for element_type in types {
            let slot = self.inner.slot(element_type);
            slot.invalidations.fetch_add(1, Ordering::AcqRel);
            self.inner.builder.on_invalidate(element_type);
            let mut state = slot.state.write();
            if state.state != CacheState::Empty {
                state.state = CacheState::Invalidated;
            }
        }

        info!(
            source = %source,
            reason = %reason,
            element = ?element.map(ToString::to_string),
            "Index invalidated"
        );
    }

    fn is_distrusted(&self, key: &ElementKey) -> bool {
        let grace = self.inner.settings.grace_period;
        let mut recent = self.inner.recently_modified.lock();
        recent.retain(|_, at| at.elapsed() < grace);
        recent.contains_key(key)
    }

    fn state(&self, element_type: ElementType) -> CacheState {
        let slot = self.inner.slot(element_type);
        let state = slot.state.read();
        self.inner.effective_state(&state)
    }

    fn stats(&self) -> SourceStats {
        let types = self
            .inner
            .slots
            .iter()
            .map(|slot| self.inner.type_stats(slot))
            .collect();
        SourceStats::aggregate(self.source(), types, self.inner.builder.rate_limit())
    }

    fn snapshots(&self) -> Vec<Arc<Snapshot>> {
        self.inner
            .slots
            .iter()
            .filter_map(|slot| {
                let state = slot.state.read();
                state.has_good.then(|| Arc::clone(&state.snapshot))
            })
            .collect()
    }

    fn restore(&self, snapshot: Snapshot) {
        let source = self.source();
        if snapshot.source != source {
            warn!(
                source = %source,
                found = %snapshot.source,
                "Ignoring persisted snapshot from another source"
            );
            return;
        }

        let element_type = snapshot.element_type;
        let slot = self.inner.slot(element_type);
        let mut state = slot.state.write();
        if state.state != CacheState::Empty || state.has_good {
            return;
        }

        let age = snapshot
            .built_at
            .and_then(|at| (Utc::now() - at).to_std().ok());
        let fresh = match (self.inner.builder.ttl(), age) {
            (Some(ttl), Some(age)) => age < ttl,
            _ => false,
        };

        let generation = slot.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let entries = snapshot.entries.len();
        state.state = if fresh {
            CacheState::Fresh
        } else {
            CacheState::Stale
        };
        state.built_at = age.and_then(|age| Instant::now().checked_sub(age));
        state.last_built = snapshot.built_at;
        state.snapshot = Arc::new(Snapshot {
            generation,
            ..snapshot
        });
        state.has_good = true;

        debug!(
            source = %source,
            element_type = %element_type,
            entries,
            fresh,
            "Restored persisted snapshot"
        );
    }
}
