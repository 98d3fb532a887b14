//! In-memory stand-ins for the remote sources and for index builders.
//!
//! Every fake is `Clone` over shared state so a test can keep a handle
//! after moving one copy into a cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::core::{ElementType, IndexEntry, SourceKind, SourceRef};
use crate::error::{IndexError, Result};
use crate::index::collection::{CollectionManifest, ManifestEntry};
use crate::index::github::{ListingPage, RemoteFile};
use crate::index::{
    BuildOutput, CollectionApi, IndexBuilder, PortfolioApi, RateLimitStatus, Snapshot,
};

/// How a fake remote should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeFailure {
    RateLimited,
    Unavailable,
    /// Never answers; only a timeout gets the caller out
    Hang,
}

impl FakeFailure {
    fn to_error(self, source: SourceKind) -> IndexError {
        match self {
            Self::RateLimited => IndexError::RateLimited {
                source_kind: source,
                reset_at: None,
            },
            Self::Unavailable | Self::Hang => IndexError::SourceUnavailable {
                source_kind: source,
                reason: "simulated outage".to_string(),
            },
        }
    }
}

async fn fail_with(failure: FakeFailure, source: SourceKind) -> IndexError {
    if failure == FakeFailure::Hang {
        std::future::pending::<()>().await;
    }
    failure.to_error(source)
}

/// Build an entry with sensible defaults for tests.
#[must_use]
pub fn entry(name: &str, element_type: ElementType, source: SourceKind, version: &str) -> IndexEntry {
    IndexEntry {
        name: name.to_string(),
        element_type,
        version: version.to_string(),
        author: None,
        description: None,
        last_modified: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default(),
        source,
        source_ref: SourceRef::Path {
            path: format!("{}/{name}.md", element_type.dir_name()),
        },
        content_fingerprint: format!("{source}:{name}:{version}"),
        triggers: Vec::new(),
        tags: Vec::new(),
    }
}

// =============================================================================
// STATIC BUILDER
// =============================================================================

struct StaticState {
    source: SourceKind,
    ttl: Option<Duration>,
    delay: Mutex<Duration>,
    entries: Mutex<Vec<IndexEntry>>,
    failure: Mutex<Option<FakeFailure>>,
    builds: AtomicUsize,
}

/// [`IndexBuilder`] serving a fixed list of entries.
#[derive(Clone)]
pub struct StaticBuilder {
    state: Arc<StaticState>,
}

impl StaticBuilder {
    #[must_use]
    pub fn new(source: SourceKind, entries: Vec<IndexEntry>) -> Self {
        Self {
            state: Arc::new(StaticState {
                source,
                ttl: None,
                delay: Mutex::new(Duration::ZERO),
                entries: Mutex::new(entries),
                failure: Mutex::new(None),
                builds: AtomicUsize::new(0),
            }),
        }
    }

    /// Same entries, with a TTL. Must be called before cloning.
    #[must_use]
    pub fn with_ttl(self, ttl: Duration) -> Self {
        let entries = self.state.entries.lock().clone();
        let delay = *self.state.delay.lock();
        Self {
            state: Arc::new(StaticState {
                source: self.state.source,
                ttl: Some(ttl),
                delay: Mutex::new(delay),
                entries: Mutex::new(entries),
                failure: Mutex::new(None),
                builds: AtomicUsize::new(0),
            }),
        }
    }

    pub fn set_entries(&self, entries: Vec<IndexEntry>) {
        *self.state.entries.lock() = entries;
    }

    pub fn set_failure(&self, failure: Option<FakeFailure>) {
        *self.state.failure.lock() = failure;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock() = delay;
    }

    /// Builds started so far.
    #[must_use]
    pub fn builds(&self) -> usize {
        self.state.builds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexBuilder for StaticBuilder {
    fn source(&self) -> SourceKind {
        self.state.source
    }

    fn ttl(&self) -> Option<Duration> {
        self.state.ttl
    }

    async fn build(
        &self,
        element_type: ElementType,
        _previous: Option<Arc<Snapshot>>,
    ) -> Result<BuildOutput> {
        self.state.builds.fetch_add(1, Ordering::SeqCst);
        let delay = *self.state.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let failure = *self.state.failure.lock();
        if let Some(failure) = failure {
            return Err(fail_with(failure, self.state.source).await);
        }

        let entries = self.state.entries.lock().clone();
        let mut output = BuildOutput::new();
        for entry in entries.into_iter().filter(|e| e.element_type == element_type) {
            output.insert(entry);
        }
        Ok(output)
    }
}

// =============================================================================
// FAKE GITHUB PORTFOLIO
// =============================================================================

#[derive(Default)]
struct PortfolioState {
    files: HashMap<String, Vec<(RemoteFile, Vec<u8>)>>,
    failure: Option<FakeFailure>,
    rate_limit: Option<RateLimitStatus>,
    page_size: usize,
}

/// In-memory [`PortfolioApi`].
#[derive(Clone)]
pub struct FakePortfolioApi {
    state: Arc<Mutex<PortfolioState>>,
    listings: Arc<AtomicUsize>,
    fetches: Arc<AtomicUsize>,
}

impl Default for FakePortfolioApi {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePortfolioApi {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(PortfolioState {
                page_size: 100,
                ..PortfolioState::default()
            })),
            listings: Arc::new(AtomicUsize::new(0)),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Add or replace `<type_dir>/<file_name>` with `contents`.
    pub fn add_file(&self, element_type: ElementType, file_name: &str, contents: &str) {
        let dir = element_type.dir_name().to_string();
        let path = format!("{dir}/{file_name}");
        let sha = hex::encode(Sha256::digest(contents.as_bytes()));
        let file = RemoteFile {
            name: file_name.to_string(),
            path: path.clone(),
            sha,
            size: contents.len() as u64,
            kind: "file".to_string(),
            html_url: Some(format!("https://github.com/fake/portfolio/blob/main/{path}")),
            download_url: None,
        };
        let mut state = self.state.lock();
        let files = state.files.entry(dir).or_default();
        files.retain(|(f, _)| f.path != path);
        files.push((file, contents.as_bytes().to_vec()));
    }

    pub fn set_failure(&self, failure: Option<FakeFailure>) {
        self.state.lock().failure = failure;
    }

    pub fn set_rate_limit(&self, status: Option<RateLimitStatus>) {
        self.state.lock().rate_limit = status;
    }

    pub fn set_page_size(&self, page_size: usize) {
        self.state.lock().page_size = page_size.max(1);
    }

    #[must_use]
    pub fn listing_calls(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn fetch_calls(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PortfolioApi for FakePortfolioApi {
    async fn list_directory(&self, path: &str, page: u32) -> Result<ListingPage> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        let (failure, items, page_size) = {
            let state = self.state.lock();
            let items: Vec<RemoteFile> = state
                .files
                .get(path)
                .map(|files| files.iter().map(|(f, _)| f.clone()).collect())
                .unwrap_or_default();
            (state.failure, items, state.page_size)
        };
        if let Some(failure) = failure {
            return Err(fail_with(failure, SourceKind::GitHub).await);
        }

        let start = (page.saturating_sub(1) as usize).saturating_mul(page_size);
        let has_more = start + page_size < items.len();
        Ok(ListingPage {
            items: items.into_iter().skip(start).take(page_size).collect(),
            has_more,
        })
    }

    async fn fetch_prefix(&self, file: &RemoteFile, max_bytes: usize) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let (failure, bytes) = {
            let state = self.state.lock();
            let dir = file.path.split('/').next().unwrap_or_default();
            let bytes = state.files.get(dir).and_then(|files| {
                files
                    .iter()
                    .find(|(f, _)| f.path == file.path)
                    .map(|(_, b)| b.clone())
            });
            (state.failure, bytes)
        };
        if let Some(failure) = failure {
            return Err(fail_with(failure, SourceKind::GitHub).await);
        }
        let mut bytes = bytes.ok_or_else(|| IndexError::NotFound(file.path.clone()))?;
        bytes.truncate(max_bytes);
        Ok(bytes)
    }

    fn rate_limit(&self) -> Option<RateLimitStatus> {
        self.state.lock().rate_limit
    }
}

// =============================================================================
// FAKE COLLECTION
// =============================================================================

/// In-memory [`CollectionApi`].
#[derive(Clone, Default)]
pub struct FakeCollectionApi {
    manifest: Arc<Mutex<CollectionManifest>>,
    failure: Arc<Mutex<Option<FakeFailure>>>,
    fetches: Arc<AtomicUsize>,
    slow: Arc<AtomicBool>,
}

impl FakeCollectionApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&self, element_type: ElementType, entry: ManifestEntry) {
        self.manifest
            .lock()
            .index
            .entry(element_type.dir_name().to_string())
            .or_default()
            .push(entry);
    }

    /// Manifest entry with the given name and version.
    pub fn add(&self, element_type: ElementType, name: &str, version: &str) {
        self.add_entry(
            element_type,
            ManifestEntry {
                name: Some(name.to_string()),
                path: format!("library/{}/{name}.md", element_type.dir_name()),
                version: Some(version.to_string()),
                ..ManifestEntry::default()
            },
        );
    }

    pub fn set_failure(&self, failure: Option<FakeFailure>) {
        *self.failure.lock() = failure;
    }

    /// Delay each fetch by 50 ms.
    pub fn set_slow(&self, slow: bool) {
        self.slow.store(slow, Ordering::SeqCst);
    }

    #[must_use]
    pub fn fetch_calls(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CollectionApi for FakeCollectionApi {
    async fn fetch_manifest(&self) -> Result<CollectionManifest> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.slow.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let failure = *self.failure.lock();
        if let Some(failure) = failure {
            return Err(fail_with(failure, SourceKind::Collection).await);
        }
        Ok(self.manifest.lock().clone())
    }
}
