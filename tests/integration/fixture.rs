//! Three-source test world: a real local portfolio on disk plus fake
//! GitHub and collection remotes.

use std::sync::Arc;
use std::time::Duration;

use element_index::core::{ElementType, SourcePriorityConfig};
use element_index::index::collection::CollectionIndexSettings;
use element_index::index::github::GitHubIndexSettings;
use element_index::index::{
    CacheSettings, CollectionIndex, GitHubPortfolioIndexer, IndexRegistry, LocalIndex, RetryConfig,
};
use element_index::manager::UnifiedIndexManager;
use element_index::search::RelevanceScorer;
use element_index::test_utils::{
    FakeCollectionApi, FakePortfolioApi, PortfolioFixture, element_markdown, init_test_tracing,
};

/// One quick retry so backoff paths run without slowing the suite.
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 1,
        base_delay_ms: 1,
        max_delay_ms: 5,
        jitter_factor: 0.0,
    }
}

pub struct World {
    pub portfolio: PortfolioFixture,
    pub github: FakePortfolioApi,
    pub collection: FakeCollectionApi,
    pub local_index: Arc<LocalIndex>,
    pub github_index: Arc<GitHubPortfolioIndexer>,
    pub collection_index: Arc<CollectionIndex>,
}

impl World {
    pub fn new() -> Self {
        Self::with_cache(CacheSettings::default())
    }

    pub fn with_cache(cache: CacheSettings) -> Self {
        init_test_tracing();
        let portfolio = PortfolioFixture::new();
        let github = FakePortfolioApi::new();
        let collection = FakeCollectionApi::new();

        let local_index = Arc::new(LocalIndex::open(portfolio.root(), cache));
        let github_index = Arc::new(GitHubPortfolioIndexer::with_api(
            Arc::new(github.clone()),
            GitHubIndexSettings {
                retry: fast_retry(),
                ..GitHubIndexSettings::default()
            },
            cache,
        ));
        let collection_index = Arc::new(CollectionIndex::with_api(
            Arc::new(collection.clone()),
            CollectionIndexSettings {
                retry: fast_retry(),
                manifest_reuse: Duration::from_millis(0),
                ..CollectionIndexSettings::default()
            },
            cache,
        ));

        Self {
            portfolio,
            github,
            collection,
            local_index,
            github_index,
            collection_index,
        }
    }

    pub fn local_skill(&self, name: &str, version: &str, description: &str, triggers: &[&str]) {
        self.portfolio
            .create_element(ElementType::Skill, name, version, description, triggers);
    }

    pub fn github_skill(&self, name: &str, version: &str, description: &str) {
        self.github.add_file(
            ElementType::Skill,
            &format!("{name}.md"),
            &element_markdown(name, version, description, &[]),
        );
    }

    pub fn registry(&self) -> IndexRegistry {
        IndexRegistry::new()
            .with(self.local_index.clone())
            .with(self.github_index.clone())
            .with(self.collection_index.clone())
    }

    pub fn manager(&self) -> UnifiedIndexManager {
        self.manager_with(SourcePriorityConfig::default())
    }

    pub fn manager_with(&self, priority: SourcePriorityConfig) -> UnifiedIndexManager {
        UnifiedIndexManager::new(self.registry(), priority, RelevanceScorer::default())
    }
}
