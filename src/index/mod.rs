//! Per-source element indexes.
//!
//! Every source (local portfolio, GitHub portfolio, community collection)
//! exposes the same [`SourceIndex`] contract: a per-element-type cache of
//! immutable [`Snapshot`]s with an explicit freshness state machine.
//!
//! ```text
//! Empty -> Building -> Fresh -> Stale -> Invalidated -> Building
//! ```
//!
//! `get_index` never fails for reasons originating in the source itself.
//! A failed rebuild serves the last good snapshot, or an empty one.

pub mod cache;
pub mod collection;
pub mod github;
pub mod local;
pub mod metadata;
pub mod persist;
pub mod registry;
pub mod retry;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{ElementKey, ElementType, IndexEntry, SourceKind};
use crate::error::Result;
use crate::search::relevance::matches;
use crate::search::tokens::token_set;

pub use cache::{BuildOutput, CacheSettings, IndexBuilder, SourceCache};
pub use collection::{CollectionApi, CollectionIndex, HttpCollectionClient};
pub use github::{GitHubClient, GitHubPortfolioIndexer, PortfolioApi, RateLimitStatus};
pub use local::LocalIndex;
pub use metadata::{ElementHeader, FrontMatterReader, MetadataReader};
pub use persist::SnapshotStore;
pub use registry::IndexRegistry;
pub use retry::RetryConfig;

// =============================================================================
// CACHE STATE
// =============================================================================

/// Freshness of one `(source, element_type)` cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheState {
    /// Never built
    Empty,
    /// Blocking rebuild in flight
    Building,
    /// Within TTL
    Fresh,
    /// Past TTL, or restored from disk; still servable
    Stale,
    /// Explicitly invalidated; next access rebuilds
    Invalidated,
}

impl std::fmt::Display for CacheState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Empty => "empty",
            Self::Building => "building",
            Self::Fresh => "fresh",
            Self::Stale => "stale",
            Self::Invalidated => "invalidated",
        };
        f.write_str(label)
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Immutable result of one rebuild of one `(source, element_type)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub source: SourceKind,
    pub element_type: ElementType,
    /// Sorted by name
    pub entries: Vec<IndexEntry>,
    /// `None` for a placeholder that no build produced
    pub built_at: Option<DateTime<Utc>>,
    /// Build counter of the owning cache; changes whenever contents may
    #[serde(default)]
    pub generation: u64,
    /// Collisions and degraded entries recorded during the build
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Snapshot {
    #[must_use]
    pub const fn empty(source: SourceKind, element_type: ElementType) -> Self {
        Self {
            source,
            element_type,
            entries: Vec::new(),
            built_at: None,
            generation: 0,
            warnings: Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact name match, falling back to a case-insensitive one.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&IndexEntry> {
        self.entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.entries[i])
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|e| e.name.eq_ignore_ascii_case(name))
            })
    }

    /// Entries matching a free-text query, in name order.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<IndexEntry> {
        let tokens = token_set(query);
        self.entries
            .iter()
            .filter(|e| matches(&tokens, query, e))
            .cloned()
            .collect()
    }
}

// =============================================================================
// STATS
// =============================================================================

/// Diagnostics for one element type of one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeStats {
    pub element_type: ElementType,
    pub state: CacheState,
    pub entry_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_built: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Serving an older snapshot, or empty, after a failed rebuild
    pub degraded: bool,
    pub refreshing: bool,
    pub warnings: usize,
}

/// Diagnostics for one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceStats {
    pub source: SourceKind,
    /// Aggregate state: the least healthy type state
    pub state: CacheState,
    pub entry_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_built: Option<DateTime<Utc>>,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitStatus>,
    pub types: Vec<TypeStats>,
}

impl SourceStats {
    /// Roll per-type stats up into a source summary.
    #[must_use]
    pub fn aggregate(
        source: SourceKind,
        types: Vec<TypeStats>,
        rate_limit: Option<RateLimitStatus>,
    ) -> Self {
        let state = types
            .iter()
            .map(|t| t.state)
            .max_by_key(|s| state_severity(*s))
            .unwrap_or(CacheState::Empty);
        Self {
            source,
            state,
            entry_count: types.iter().map(|t| t.entry_count).sum(),
            last_built: types.iter().filter_map(|t| t.last_built).max(),
            degraded: types.iter().any(|t| t.degraded),
            rate_limit,
            types,
        }
    }
}

const fn state_severity(state: CacheState) -> u8 {
    match state {
        CacheState::Fresh => 0,
        CacheState::Stale => 1,
        CacheState::Building => 2,
        CacheState::Invalidated => 3,
        CacheState::Empty => 4,
    }
}

// =============================================================================
// SOURCE INDEX CONTRACT
// =============================================================================

/// Shared contract of the three source indexes.
#[async_trait]
pub trait SourceIndex: Send + Sync {
    fn source(&self) -> SourceKind;

    /// Current snapshot, rebuilding as the cache state requires.
    ///
    /// `Fresh` returns immediately. `Stale` returns the stale snapshot and
    /// schedules a background refresh. `Empty`, `Invalidated` or forced
    /// rebuild blocking; on failure the last good snapshot or an empty one
    /// comes back. Implementations only return `Err` for internal faults.
    async fn get_index(&self, element_type: ElementType, force_refresh: bool)
    -> Result<Arc<Snapshot>>;

    /// Filter the current snapshots. Never rebuilds.
    fn search(&self, query: &str, element_type: Option<ElementType>) -> Vec<IndexEntry>;

    /// Exact-name lookup in the current snapshot. Never rebuilds.
    fn find(&self, name: &str, element_type: ElementType) -> Option<IndexEntry>;

    /// Mark caches invalid after a write. With `element`, only that type is
    /// invalidated and the element is distrusted for the grace period.
    fn invalidate(&self, reason: &str, element: Option<&ElementKey>);

    /// Whether `key` was modified recently enough that even a fresh cache
    /// should be rebuilt before answering for it.
    fn is_distrusted(&self, key: &ElementKey) -> bool;

    fn state(&self, element_type: ElementType) -> CacheState;

    /// Side-effect-free diagnostics.
    fn stats(&self) -> SourceStats;

    /// Snapshots produced by successful builds, for persistence.
    fn snapshots(&self) -> Vec<Arc<Snapshot>>;

    /// Seed an empty cache from a persisted snapshot.
    fn restore(&self, snapshot: Snapshot);
}
