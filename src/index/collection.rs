//! Community collection index.
//!
//! The collection publishes one JSON manifest covering every element type:
//!
//! ```json
//! { "version": "1", "generated_at": "...",
//!   "index": { "skills": [ { "name": "...", "path": "...", ... } ] } }
//! ```
//!
//! One fetch (with one retry) serves all four element types while it is
//! younger than the reuse window.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::{ElementType, IndexEntry, SourceKind, SourceRef};
use crate::error::{IndexError, Result};

use super::Snapshot;
use super::cache::{BuildOutput, CacheSettings, IndexBuilder, SourceCache};
use super::metadata::{DEFAULT_VERSION, name_from_file};
use super::retry::{RetryConfig, with_retry};

pub const DEFAULT_COLLECTION_URL: &str =
    "https://raw.githubusercontent.com/DollhouseMCP/collection/main/public/collection-index.json";

/// Default snapshot lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// How long one manifest fetch is shared across element types.
pub const DEFAULT_MANIFEST_REUSE: Duration = Duration::from_secs(60);

/// Per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const USER_AGENT: &str = concat!("eix/", env!("CARGO_PKG_VERSION"));

// =============================================================================
// MANIFEST
// =============================================================================

/// Bulk catalog manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionManifest {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
    /// Keyed by type directory name (`skills`, `personas`, ...)
    #[serde(default)]
    pub index: HashMap<String, Vec<ManifestEntry>>,
}

/// One catalog element.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(default)]
    pub name: Option<String>,
    pub path: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "trigger_verbs")]
    pub triggers: Vec<String>,
    #[serde(default, alias = "keywords")]
    pub tags: Vec<String>,
    #[serde(default, alias = "created")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default, alias = "sha")]
    pub fingerprint: Option<String>,
}

impl CollectionManifest {
    /// Entries for one element type; unknown type keys are ignored.
    #[must_use]
    pub fn entries_for(&self, element_type: ElementType) -> &[ManifestEntry] {
        self.index
            .get(element_type.dir_name())
            .map_or(&[], Vec::as_slice)
    }
}

// =============================================================================
// API CONTRACT
// =============================================================================

/// Fetches the collection manifest.
#[async_trait]
pub trait CollectionApi: Send + Sync {
    async fn fetch_manifest(&self) -> Result<CollectionManifest>;
}

/// HTTP manifest client.
pub struct HttpCollectionClient {
    client: reqwest::Client,
    url: String,
}

impl HttpCollectionClient {
    /// # Errors
    ///
    /// Returns [`IndexError::Http`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl CollectionApi for HttpCollectionClient {
    async fn fetch_manifest(&self) -> Result<CollectionManifest> {
        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(IndexError::RateLimited {
                source_kind: SourceKind::Collection,
                reset_at: None,
            });
        }
        if !status.is_success() {
            return Err(IndexError::SourceUnavailable {
                source_kind: SourceKind::Collection,
                reason: format!("HTTP {} for collection manifest", status.as_u16()),
            });
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Tuning for [`CollectionBuilder`].
#[derive(Debug, Clone)]
pub struct CollectionIndexSettings {
    pub ttl: Duration,
    pub manifest_reuse: Duration,
    pub retry: RetryConfig,
}

impl Default for CollectionIndexSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            manifest_reuse: DEFAULT_MANIFEST_REUSE,
            retry: RetryConfig::default(),
        }
    }
}

/// Builds snapshots from a shared manifest fetch.
pub struct CollectionBuilder {
    api: Arc<dyn CollectionApi>,
    settings: CollectionIndexSettings,
    manifest: Mutex<Option<(Instant, Arc<CollectionManifest>)>>,
    fetch_lock: tokio::sync::Mutex<()>,
}

impl CollectionBuilder {
    #[must_use]
    pub fn new(api: Arc<dyn CollectionApi>, settings: CollectionIndexSettings) -> Self {
        Self {
            api,
            settings,
            manifest: Mutex::new(None),
            fetch_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn reusable(&self) -> Option<Arc<CollectionManifest>> {
        self.manifest
            .lock()
            .as_ref()
            .filter(|(at, _)| at.elapsed() < self.settings.manifest_reuse)
            .map(|(_, m)| Arc::clone(m))
    }

    async fn manifest(&self) -> Result<Arc<CollectionManifest>> {
        if let Some(manifest) = self.reusable() {
            return Ok(manifest);
        }
        let _guard = self.fetch_lock.lock().await;
        if let Some(manifest) = self.reusable() {
            return Ok(manifest);
        }

        let manifest = with_retry(&self.settings.retry, SourceKind::Collection, "manifest", || {
            self.api.fetch_manifest()
        })
        .await?;
        let manifest = Arc::new(manifest);
        info!(
            source = "collection",
            version = %manifest.version,
            types = manifest.index.len(),
            "Collection manifest fetched"
        );
        *self.manifest.lock() = Some((Instant::now(), Arc::clone(&manifest)));
        Ok(manifest)
    }
}

fn to_entry(
    item: &ManifestEntry,
    element_type: ElementType,
    fallback_time: DateTime<Utc>,
) -> (IndexEntry, bool) {
    let explicit_name = item
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());
    let degraded = explicit_name.is_none();
    let name = explicit_name.map_or_else(|| name_from_file(&item.path), str::to_string);
    let fingerprint = item.fingerprint.clone().unwrap_or_else(|| {
        format!(
            "{}@{}",
            item.path,
            item.version.as_deref().unwrap_or(DEFAULT_VERSION)
        )
    });

    (
        IndexEntry {
            name,
            element_type,
            version: item
                .version
                .clone()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            author: item.author.clone(),
            description: item.description.clone(),
            last_modified: item.last_modified.unwrap_or(fallback_time),
            source: SourceKind::Collection,
            source_ref: SourceRef::Catalog {
                path: item.path.clone(),
            },
            content_fingerprint: fingerprint,
            triggers: item.triggers.iter().map(|t| t.trim().to_lowercase()).collect(),
            tags: item.tags.iter().map(|t| t.trim().to_lowercase()).collect(),
        },
        degraded,
    )
}

#[async_trait]
impl IndexBuilder for CollectionBuilder {
    fn source(&self) -> SourceKind {
        SourceKind::Collection
    }

    fn ttl(&self) -> Option<Duration> {
        Some(self.settings.ttl)
    }

    fn on_invalidate(&self, element_type: ElementType) {
        if self.manifest.lock().take().is_some() {
            debug!(
                source = "collection",
                element_type = %element_type,
                "Dropped shared manifest after invalidation"
            );
        }
    }

    async fn build(
        &self,
        element_type: ElementType,
        _previous: Option<Arc<Snapshot>>,
    ) -> Result<BuildOutput> {
        let manifest = self.manifest().await?;
        let fallback_time = manifest.generated_at.unwrap_or_else(Utc::now);

        let mut output = BuildOutput::new();
        for item in manifest.entries_for(element_type) {
            let (entry, degraded) = to_entry(item, element_type, fallback_time);
            if degraded {
                output.warn(format!("{}: no name in manifest; derived from path", item.path));
            }
            output.insert(entry);
        }
        debug!(
            source = "collection",
            element_type = %element_type,
            entries = output.len(),
            "Collection entries extracted"
        );
        Ok(output)
    }
}

/// Community collection index.
pub type CollectionIndex = SourceCache<CollectionBuilder>;

impl CollectionIndex {
    #[must_use]
    pub fn with_api(
        api: Arc<dyn CollectionApi>,
        settings: CollectionIndexSettings,
        cache: CacheSettings,
    ) -> Self {
        SourceCache::new(CollectionBuilder::new(api, settings), cache)
    }
}
