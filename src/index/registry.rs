//! Explicitly constructed set of source indexes.
//!
//! The manager receives a registry instead of reaching for process-wide
//! caches, so each test can build an isolated set of sources.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::auth::CredentialProvider;
use crate::config::Config;
use crate::core::SourceKind;
use crate::error::Result;

use super::collection::{CollectionIndex, CollectionIndexSettings, HttpCollectionClient};
use super::github::{GitHubClient, GitHubIndexSettings, GitHubPortfolioIndexer, GitHubRepo};
use super::local::LocalIndex;
use super::persist::SnapshotStore;
use super::SourceIndex;

/// Source indexes keyed by source.
#[derive(Clone, Default)]
pub struct IndexRegistry {
    indexes: BTreeMap<SourceKind, Arc<dyn SourceIndex>>,
}

impl IndexRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the index for its source.
    pub fn register(&mut self, index: Arc<dyn SourceIndex>) {
        let source = index.source();
        if self.indexes.insert(source, index).is_some() {
            debug!(source = %source, "Replaced registered index");
        }
    }

    #[must_use]
    pub fn with(mut self, index: Arc<dyn SourceIndex>) -> Self {
        self.register(index);
        self
    }

    #[must_use]
    pub fn get(&self, source: SourceKind) -> Option<&Arc<dyn SourceIndex>> {
        self.indexes.get(&source)
    }

    /// Registered sources in enum order.
    #[must_use]
    pub fn sources(&self) -> Vec<SourceKind> {
        self.indexes.keys().copied().collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SourceKind, &Arc<dyn SourceIndex>)> {
        self.indexes.iter().map(|(k, v)| (*k, v))
    }

    /// Build the real indexes enabled by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be constructed.
    pub fn from_config(config: &Config, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        let cache = config.cache_settings();
        let retry = config.retry_config();
        let mut registry = Self::new();

        if config.local.enabled {
            registry.register(Arc::new(LocalIndex::open(&config.local.root, cache)));
        }

        if config.github.enabled {
            if let Some(owner) = config.github.owner.as_deref() {
                let repo = GitHubRepo {
                    owner: owner.to_string(),
                    repo: config.github.repo.clone(),
                    branch: config.github.branch.clone(),
                    api_url: config.github.api_url.clone(),
                };
                let client = GitHubClient::new(repo, credentials, config.github.request_timeout)?;
                let settings = GitHubIndexSettings {
                    ttl: config.github.ttl,
                    size_threshold: config.github.size_threshold,
                    concurrency: config.github.concurrency,
                    retry: retry.clone(),
                    ..GitHubIndexSettings::default()
                };
                registry.register(Arc::new(GitHubPortfolioIndexer::with_api(
                    Arc::new(client),
                    settings,
                    cache,
                )));
            } else {
                info!("GitHub portfolio enabled but no owner configured; skipping");
            }
        }

        if config.collection.enabled {
            let client = HttpCollectionClient::new(
                config.collection.url.clone(),
                config.collection.request_timeout,
            )?;
            let settings = CollectionIndexSettings {
                ttl: config.collection.ttl,
                manifest_reuse: config.collection.manifest_reuse,
                retry,
            };
            registry.register(Arc::new(CollectionIndex::with_api(
                Arc::new(client),
                settings,
                cache,
            )));
        }

        debug!(sources = ?registry.sources(), "Index registry built");
        Ok(registry)
    }

    /// Seed every registered index from `store`.
    pub fn restore_all(&self, store: &SnapshotStore) -> usize {
        self.indexes
            .values()
            .map(|index| store.restore_index(index.as_ref()))
            .sum()
    }

    /// Persist every registered index to `store`.
    ///
    /// # Errors
    ///
    /// Returns the first I/O or serialization error.
    pub fn save_all(&self, store: &SnapshotStore) -> Result<usize> {
        let mut total = 0;
        for index in self.indexes.values() {
            total += store.save_index(index.as_ref())?;
        }
        Ok(total)
    }
}

impl std::fmt::Debug for IndexRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexRegistry")
            .field("sources", &self.sources())
            .finish()
    }
}
