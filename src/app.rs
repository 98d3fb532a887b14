//! Application context shared by CLI commands.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::auth::{CredentialProvider, EnvCredentialProvider};
use crate::cli::Cli;
use crate::config::Config;
use crate::error::Result;
use crate::index::{IndexRegistry, SnapshotStore};
use crate::manager::{SearchLimits, UnifiedIndexManager};
use crate::search::RelevanceScorer;

pub struct AppContext {
    pub config: Config,
    pub manager: UnifiedIndexManager,
    /// Present when snapshot persistence is enabled
    pub store: Option<SnapshotStore>,
    pub machine: bool,
}

impl AppContext {
    /// Load configuration and wire the manager for one CLI invocation.
    ///
    /// # Errors
    ///
    /// Returns configuration errors and HTTP client construction errors.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let project_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let mut config = Config::load(cli.config.as_deref(), &project_root)?;
        if cli.no_cache {
            config.cache.persist = false;
        }
        Self::from_config(config, Arc::new(EnvCredentialProvider), cli.machine)
    }

    /// Wire the manager from an already loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns configuration errors and HTTP client construction errors.
    pub fn from_config(
        config: Config,
        credentials: Arc<dyn CredentialProvider>,
        machine: bool,
    ) -> Result<Self> {
        let priority = config.priority_config()?;
        let registry = IndexRegistry::from_config(&config, credentials)?;
        let limits = SearchLimits {
            default_page_size: config.search.default_page_size,
            max_page_size: config.search.max_page_size,
            timeout: config.search.timeout,
        };
        let manager = UnifiedIndexManager::new(
            registry,
            priority,
            RelevanceScorer::new(config.scoring_config()),
        )
        .with_limits(limits);

        let store = config.snapshot_dir().map(SnapshotStore::new);
        if let Some(store) = &store {
            manager.load_snapshots(store);
        }

        Ok(Self {
            config,
            manager,
            store,
            machine,
        })
    }

    /// Write snapshots back if persistence is enabled. Failures are logged.
    pub fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        match self.manager.save_snapshots(store) {
            Ok(count) => debug!(snapshots = count, dir = %store.dir().display(), "Snapshots saved"),
            Err(err) => warn!(error = %err, dir = %store.dir().display(), "Failed to save snapshots"),
        }
    }
}
