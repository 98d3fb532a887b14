//! Per-call options and result shapes for the manager.

use std::time::Duration;

use serde::Serialize;

use crate::core::{ElementType, SourceKind, UnifiedEntry};

/// Options for [`super::UnifiedIndexManager::search`].
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Restrict to these element types; all types when `None`
    pub types: Option<Vec<ElementType>>,
    /// Restrict to these sources; intersected with the configured order
    pub sources: Option<Vec<SourceKind>>,
    /// Consult every enabled source even after one has hits
    pub include_all: bool,
    /// 1-based; `0` is treated as `1`
    pub page: usize,
    /// Manager default when `None`; capped at the manager maximum
    pub page_size: Option<usize>,
    /// Call-level deadline; overrides the manager default
    pub timeout: Option<Duration>,
    /// Replace the configured source order for this call only
    pub priority: Option<Vec<SourceKind>>,
}

impl SearchOptions {
    #[must_use]
    pub fn new() -> Self {
        Self {
            page: 1,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn types(mut self, types: Vec<ElementType>) -> Self {
        self.types = Some(types);
        self
    }

    #[must_use]
    pub fn sources(mut self, sources: Vec<SourceKind>) -> Self {
        self.sources = Some(sources);
        self
    }

    #[must_use]
    pub const fn include_all(mut self, include_all: bool) -> Self {
        self.include_all = include_all;
        self
    }

    #[must_use]
    pub const fn page(mut self, page: usize, page_size: usize) -> Self {
        self.page = page;
        self.page_size = Some(page_size);
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: Vec<SourceKind>) -> Self {
        self.priority = Some(priority);
        self
    }

    pub(crate) fn element_types(&self) -> Vec<ElementType> {
        self.types
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| ElementType::ALL.to_vec())
    }
}

/// Options for [`super::UnifiedIndexManager::resolve`].
///
/// Unset flags fall back to the configured priority policy.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Consulted first regardless of the configured order
    pub preferred_source: Option<SourceKind>,
    pub check_all_for_updates: Option<bool>,
    pub stop_on_first: Option<bool>,
    /// Collect a candidate from every source
    pub include_all: bool,
    pub timeout: Option<Duration>,
}

impl ResolveOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn preferred_source(mut self, source: SourceKind) -> Self {
        self.preferred_source = Some(source);
        self
    }

    #[must_use]
    pub const fn check_all_for_updates(mut self, check: bool) -> Self {
        self.check_all_for_updates = Some(check);
        self
    }

    #[must_use]
    pub const fn include_all(mut self, include_all: bool) -> Self {
        self.include_all = include_all;
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// One page of search results.
#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub items: Vec<UnifiedEntry>,
    /// Matches before pagination
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    /// The call-level deadline expired before every source answered
    pub partial: bool,
    /// Sources that failed or were cut off by the deadline
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_sources: Vec<SourceKind>,
}

impl SearchPage {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        self.page.saturating_mul(self.page_size) < self.total
    }
}

/// Outcome of a successful resolve.
#[derive(Debug, Clone, Serialize)]
pub struct Resolved {
    pub entry: UnifiedEntry,
    /// A lower-priority source holds a newer version
    pub update_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_source: Option<SourceKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_version: Option<String>,
    /// The call-level deadline expired before every source answered
    pub partial: bool,
}
