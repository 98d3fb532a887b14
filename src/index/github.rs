//! GitHub portfolio indexer.
//!
//! Lists `<type_dir>/` in the user's portfolio repository through the
//! contents API, then fetches a bounded header prefix of each small file
//! with a fixed number of requests in flight. Files whose blob sha is
//! unchanged since the last good snapshot reuse that entry without a fetch.
//! Large files, and files whose header cannot be read, fall back to
//! filename-derived metadata.
//!
//! Listing failures go through one backoff retry. An exhausted quota or a
//! transient fetch failure fails the whole rebuild, so the cache keeps
//! serving the last good snapshot rather than filename guesses.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use parking_lot::Mutex;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::CredentialProvider;
use crate::core::{ElementType, IndexEntry, SourceKind, SourceRef};
use crate::error::{IndexError, Result};

use super::Snapshot;
use super::cache::{BuildOutput, CacheSettings, IndexBuilder, SourceCache};
use super::metadata::{
    ElementHeader, FrontMatterReader, MAX_HEADER_BYTES, MetadataReader, is_element_file,
    read_or_degrade,
};
use super::retry::{RetryConfig, with_retry};

pub const GH_API: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("eix/", env!("CARGO_PKG_VERSION"));

/// Page size requested from the contents API.
pub const PER_PAGE: usize = 100;

/// Default snapshot lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

/// Files larger than this are indexed from their name only.
pub const DEFAULT_SIZE_THRESHOLD: u64 = 100 * 1024;

/// Metadata fetches in flight per rebuild.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Per-request timeout; always well below the TTL.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// RATE LIMIT
// =============================================================================

/// Remote quota as last reported by the API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateLimitStatus {
    /// Parse `x-ratelimit-*` headers; `None` when none are present.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let number = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<i64>().ok())
        };
        let limit = number("x-ratelimit-limit").and_then(|v| u32::try_from(v).ok());
        let remaining = number("x-ratelimit-remaining").and_then(|v| u32::try_from(v).ok());
        let reset_at = number("x-ratelimit-reset").and_then(|v| Utc.timestamp_opt(v, 0).single());
        if limit.is_none() && remaining.is_none() && reset_at.is_none() {
            return None;
        }
        Some(Self {
            limit,
            remaining,
            reset_at,
        })
    }

    /// Quota known to be spent and not yet reset.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0) && self.reset_at.is_none_or(|reset| reset > Utc::now())
    }
}

// =============================================================================
// API CONTRACT
// =============================================================================

/// One file in a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub name: String,
    pub path: String,
    pub sha: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
}

impl RemoteFile {
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.kind == "file"
    }
}

/// One page of a directory listing.
///
/// The contents API answers with the whole directory and no `Link`
/// header, so `has_more` is only set when the server names a next page.
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub items: Vec<RemoteFile>,
    pub has_more: bool,
}

/// Remote portfolio operations used by the indexer.
#[async_trait]
pub trait PortfolioApi: Send + Sync {
    /// List `path` (1-based `page`). A missing directory is an empty page.
    async fn list_directory(&self, path: &str, page: u32) -> Result<ListingPage>;

    /// First `max_bytes` of a file.
    async fn fetch_prefix(&self, file: &RemoteFile, max_bytes: usize) -> Result<Vec<u8>>;

    /// Last observed quota.
    fn rate_limit(&self) -> Option<RateLimitStatus>;
}

// =============================================================================
// HTTP CLIENT
// =============================================================================

/// Connection settings for [`GitHubClient`].
#[derive(Debug, Clone)]
pub struct GitHubRepo {
    pub owner: String,
    pub repo: String,
    pub branch: Option<String>,
    pub api_url: String,
}

impl GitHubRepo {
    #[must_use]
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            branch: None,
            api_url: GH_API.to_string(),
        }
    }
}

/// Contents-API client.
pub struct GitHubClient {
    client: reqwest::Client,
    repo: GitHubRepo,
    credentials: Arc<dyn CredentialProvider>,
    rate_limit: Mutex<Option<RateLimitStatus>>,
}

impl GitHubClient {
    /// # Errors
    ///
    /// Returns [`IndexError::Http`] if the HTTP client cannot be built.
    pub fn new(
        repo: GitHubRepo,
        credentials: Arc<dyn CredentialProvider>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            repo,
            credentials,
            rate_limit: Mutex::new(None),
        })
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.repo.api_url.trim_end_matches('/'),
            self.repo.owner,
            self.repo.repo,
            path.trim_start_matches('/')
        )
    }

    /// Append query parameters, plus `ref` when a branch is pinned.
    fn with_query(&self, url: String, params: &[(&str, String)]) -> String {
        let mut pairs: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect();
        if let Some(branch) = &self.repo.branch {
            pairs.push(format!("ref={}", urlencoding::encode(branch)));
        }
        if pairs.is_empty() {
            url
        } else {
            format!("{url}?{}", pairs.join("&"))
        }
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .get(url)
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = self.credentials.bearer_token() {
            request = request.bearer_auth(token);
        }
        request
    }

    fn record_rate_limit(&self, headers: &HeaderMap) -> Option<RateLimitStatus> {
        let status = RateLimitStatus::from_headers(headers);
        if status.is_some() {
            *self.rate_limit.lock() = status;
        }
        status
    }

    /// Map a non-success status to the error taxonomy.
    fn classify(status: StatusCode, rate: Option<RateLimitStatus>, what: &str) -> IndexError {
        let exhausted = rate.is_some_and(|r| r.remaining == Some(0));
        if status == StatusCode::TOO_MANY_REQUESTS
            || (status == StatusCode::FORBIDDEN && exhausted)
        {
            return IndexError::RateLimited {
                source_kind: SourceKind::GitHub,
                reset_at: rate.and_then(|r| r.reset_at),
            };
        }
        IndexError::SourceUnavailable {
            source_kind: SourceKind::GitHub,
            reason: format!("HTTP {} for {what}", status.as_u16()),
        }
    }
}

/// Whether a `Link` header carries `rel="next"`.
fn has_next_link(headers: &HeaderMap) -> bool {
    headers
        .get_all(reqwest::header::LINK)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|link| {
            link.split(';').skip(1).any(|param| {
                let rel = param.trim().trim_start_matches("rel=").trim_matches('"');
                param.trim().starts_with("rel=") && rel.split_whitespace().any(|r| r == "next")
            })
        })
}

#[async_trait]
impl PortfolioApi for GitHubClient {
    async fn list_directory(&self, path: &str, page: u32) -> Result<ListingPage> {
        let url = self.with_query(
            self.contents_url(path),
            &[("per_page", PER_PAGE.to_string()), ("page", page.to_string())],
        );
        let response = self
            .request(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;
        let rate = self.record_rate_limit(response.headers());
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            debug!(path, "Portfolio directory not found");
            return Ok(ListingPage::default());
        }
        if !status.is_success() {
            return Err(Self::classify(status, rate, path));
        }

        let has_more = has_next_link(response.headers());
        let items: Vec<RemoteFile> = response.json().await?;
        Ok(ListingPage { items, has_more })
    }

    async fn fetch_prefix(&self, file: &RemoteFile, max_bytes: usize) -> Result<Vec<u8>> {
        let url = self.with_query(self.contents_url(&file.path), &[]);
        let response = self
            .request(&url)
            .header("Accept", "application/vnd.github.raw")
            .header("Range", format!("bytes=0-{}", max_bytes.saturating_sub(1)))
            .send()
            .await?;
        let rate = self.record_rate_limit(response.headers());
        let status = response.status();
        if !status.is_success() {
            return Err(Self::classify(status, rate, &file.path));
        }

        let mut bytes = response.bytes().await?.to_vec();
        bytes.truncate(max_bytes);
        Ok(bytes)
    }

    fn rate_limit(&self) -> Option<RateLimitStatus> {
        *self.rate_limit.lock()
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Tuning for [`GitHubBuilder`].
#[derive(Debug, Clone)]
pub struct GitHubIndexSettings {
    pub ttl: Duration,
    pub size_threshold: u64,
    pub concurrency: usize,
    pub retry: RetryConfig,
    /// Safety cap on listing pages per type
    pub max_pages: u32,
}

impl Default for GitHubIndexSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            size_threshold: DEFAULT_SIZE_THRESHOLD,
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryConfig::default(),
            max_pages: 50,
        }
    }
}

/// Builds snapshots from a [`PortfolioApi`].
pub struct GitHubBuilder {
    api: Arc<dyn PortfolioApi>,
    reader: Arc<dyn MetadataReader>,
    settings: GitHubIndexSettings,
}

enum FileOutcome {
    Parsed(IndexEntry),
    Reused(IndexEntry),
    Degraded(IndexEntry, String),
}

/// Entries of the last good snapshot keyed by `(path, blob sha)`.
fn reusable_entries(previous: Option<&Snapshot>) -> HashMap<(&str, &str), &IndexEntry> {
    previous
        .map(|snapshot| {
            snapshot
                .entries
                .iter()
                .filter_map(|entry| match &entry.source_ref {
                    SourceRef::Remote { path, sha, .. } => {
                        Some(((path.as_str(), sha.as_str()), entry))
                    }
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

impl GitHubBuilder {
    #[must_use]
    pub fn new(api: Arc<dyn PortfolioApi>, settings: GitHubIndexSettings) -> Self {
        Self {
            api,
            reader: Arc::new(FrontMatterReader),
            settings,
        }
    }

    #[must_use]
    pub fn with_reader(mut self, reader: Arc<dyn MetadataReader>) -> Self {
        self.reader = reader;
        self
    }

    async fn list_all(&self, element_type: ElementType) -> Result<Vec<RemoteFile>> {
        let dir = element_type.dir_name();
        let mut files = Vec::new();
        let mut seen = HashSet::new();
        for page in 1..=self.settings.max_pages {
            let listing = with_retry(&self.settings.retry, SourceKind::GitHub, "listing", || {
                self.api.list_directory(dir, page)
            })
            .await?;
            let before = files.len();
            files.extend(listing.items.into_iter().filter(|f| {
                f.is_file() && is_element_file(&f.name) && seen.insert(f.path.clone())
            }));
            if !listing.has_more {
                break;
            }
            // A server that ignores `page` repeats the first page forever.
            if files.len() == before {
                debug!(
                    source = "github",
                    element_type = %element_type,
                    page,
                    "Listing page repeated earlier files; stopping"
                );
                break;
            }
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    async fn index_file(
        &self,
        element_type: ElementType,
        file: RemoteFile,
        listed_at: DateTime<Utc>,
        known: Option<IndexEntry>,
    ) -> Result<FileOutcome> {
        if let Some(entry) = known {
            return Ok(FileOutcome::Reused(entry));
        }

        let (header, problem) = if file.size > self.settings.size_threshold {
            (
                ElementHeader::from_file_name(&file.name),
                Some(format!(
                    "{} is {} bytes, over the {} byte threshold; indexed by name",
                    file.path, file.size, self.settings.size_threshold
                )),
            )
        } else if let Some(status) = self.api.rate_limit().filter(RateLimitStatus::is_exhausted) {
            return Err(IndexError::RateLimited {
                source_kind: SourceKind::GitHub,
                reset_at: status.reset_at,
            });
        } else {
            let fetched = with_retry(&self.settings.retry, SourceKind::GitHub, "metadata", || {
                self.api.fetch_prefix(&file, MAX_HEADER_BYTES)
            })
            .await;
            match fetched {
                Ok(bytes) => {
                    let (header, err) = read_or_degrade(self.reader.as_ref(), &bytes, &file.name);
                    (header, err.map(|e| e.to_string()))
                }
                Err(err) if err.is_transient() => return Err(err),
                Err(err) => (
                    ElementHeader::from_file_name(&file.name),
                    Some(format!("{}: metadata fetch failed: {err}", file.path)),
                ),
            }
        };

        let url = file.html_url.clone().unwrap_or_else(|| file.path.clone());
        let entry = IndexEntry {
            name: header.name,
            element_type,
            version: header.version,
            author: header.author,
            description: header.description,
            last_modified: header.updated.unwrap_or(listed_at),
            source: SourceKind::GitHub,
            content_fingerprint: file.sha.clone(),
            source_ref: SourceRef::Remote {
                path: file.path,
                sha: file.sha,
                url,
            },
            triggers: header.triggers,
            tags: header.tags,
        };
        Ok(match problem {
            Some(reason) => FileOutcome::Degraded(entry, reason),
            None => FileOutcome::Parsed(entry),
        })
    }
}

#[async_trait]
impl IndexBuilder for GitHubBuilder {
    fn source(&self) -> SourceKind {
        SourceKind::GitHub
    }

    fn ttl(&self) -> Option<Duration> {
        Some(self.settings.ttl)
    }

    async fn build(
        &self,
        element_type: ElementType,
        previous: Option<Arc<Snapshot>>,
    ) -> Result<BuildOutput> {
        let listed_at = Utc::now();
        let files = self.list_all(element_type).await?;
        let known = reusable_entries(previous.as_deref());
        let jobs: Vec<(RemoteFile, Option<IndexEntry>)> = files
            .into_iter()
            .map(|file| {
                let entry = known
                    .get(&(file.path.as_str(), file.sha.as_str()))
                    .map(|e| (*e).clone());
                (file, entry)
            })
            .collect();
        debug!(
            source = "github",
            element_type = %element_type,
            files = jobs.len(),
            unchanged = jobs.iter().filter(|(_, e)| e.is_some()).count(),
            "Portfolio listing complete"
        );

        let concurrency = self.settings.concurrency.max(1);
        let outcomes: Vec<FileOutcome> = stream::iter(jobs)
            .map(|(file, entry)| self.index_file(element_type, file, listed_at, entry))
            .buffered(concurrency)
            .try_collect()
            .await?;

        let mut output = BuildOutput::new();
        for outcome in outcomes {
            match outcome {
                FileOutcome::Parsed(entry) | FileOutcome::Reused(entry) => output.insert(entry),
                FileOutcome::Degraded(entry, reason) => {
                    warn!(
                        source = "github",
                        element_type = %element_type,
                        name = %entry.name,
                        reason = %reason,
                        "Using filename metadata"
                    );
                    output.warn(reason);
                    output.insert(entry);
                }
            }
        }
        Ok(output)
    }

    fn rate_limit(&self) -> Option<RateLimitStatus> {
        self.api.rate_limit()
    }
}

/// GitHub portfolio index.
pub type GitHubPortfolioIndexer = SourceCache<GitHubBuilder>;

impl GitHubPortfolioIndexer {
    #[must_use]
    pub fn with_api(
        api: Arc<dyn PortfolioApi>,
        settings: GitHubIndexSettings,
        cache: CacheSettings,
    ) -> Self {
        SourceCache::new(GitHubBuilder::new(api, settings), cache)
    }

    /// Last observed quota, for callers that throttle further.
    #[must_use]
    pub fn rate_limit_status(&self) -> Option<RateLimitStatus> {
        self.builder().rate_limit()
    }
}
