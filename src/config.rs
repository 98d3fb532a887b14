use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::SourcePriorityConfig;
use crate::error::{IndexError, Result};
use crate::index::cache::{
    CacheSettings, DEFAULT_BUILD_TIMEOUT, DEFAULT_FAILURE_COOLDOWN, DEFAULT_GRACE_PERIOD,
};
use crate::index::collection::{
    DEFAULT_COLLECTION_URL, DEFAULT_MANIFEST_REUSE, DEFAULT_REQUEST_TIMEOUT as COLLECTION_TIMEOUT,
    DEFAULT_TTL as COLLECTION_TTL,
};
use crate::index::github::{
    DEFAULT_CONCURRENCY, DEFAULT_REQUEST_TIMEOUT as GITHUB_TIMEOUT, DEFAULT_SIZE_THRESHOLD,
    DEFAULT_TTL as GITHUB_TTL, GH_API,
};
use crate::index::retry::RetryConfig;
use crate::search::ScoringConfig;
use crate::search::relevance::{DEFAULT_ENTROPY_WEIGHT, DEFAULT_RELATIONSHIP_THRESHOLD};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub collection: CollectionConfig,
    #[serde(default)]
    pub priority: PriorityConfig,
    #[serde(default)]
    pub scoring: ScoringSection,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Config {
    /// Load defaults, then the global and project files (or one explicit
    /// file), then `EIX_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Configuration`] for unreadable or invalid
    /// files and malformed environment values.
    pub fn load(explicit_path: Option<&Path>, project_root: &Path) -> Result<Self> {
        let mut config = Self::default();

        let explicit = explicit_path
            .map(PathBuf::from)
            .or_else(|| std::env::var("EIX_CONFIG").ok().map(PathBuf::from));

        if let Some(path) = explicit {
            if let Some(patch) = Self::load_patch(&path)? {
                config.merge_patch(patch);
            }
        } else {
            if let Some(global) = Self::load_global()? {
                config.merge_patch(global);
            }
            if let Some(project) = Self::load_project(project_root)? {
                config.merge_patch(project);
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    fn load_global() -> Result<Option<ConfigPatch>> {
        let Some(dir) = dirs::config_dir() else {
            return Ok(None);
        };
        Self::load_patch(&dir.join("eix/config.toml"))
    }

    fn load_project(project_root: &Path) -> Result<Option<ConfigPatch>> {
        Self::load_patch(&project_root.join(".eix/config.toml"))
    }

    fn load_patch(path: &Path) -> Result<Option<ConfigPatch>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path).map_err(|err| {
            IndexError::Configuration(format!("read config {}: {err}", path.display()))
        })?;
        let patch = toml::from_str(&raw).map_err(|err| {
            IndexError::Configuration(format!("parse config {}: {err}", path.display()))
        })?;
        Ok(Some(patch))
    }

    /// Parse a TOML document as a patch over the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Configuration`] on syntax or validation errors.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let patch: ConfigPatch = toml::from_str(raw)
            .map_err(|err| IndexError::Configuration(format!("parse config: {err}")))?;
        let mut config = Self::default();
        config.merge_patch(patch);
        config.validate()?;
        Ok(config)
    }

    fn merge_patch(&mut self, patch: ConfigPatch) {
        if let Some(patch) = patch.local {
            self.local.merge(patch);
        }
        if let Some(patch) = patch.github {
            self.github.merge(patch);
        }
        if let Some(patch) = patch.collection {
            self.collection.merge(patch);
        }
        if let Some(patch) = patch.priority {
            self.priority.merge(patch);
        }
        if let Some(patch) = patch.scoring {
            self.scoring.merge(patch);
        }
        if let Some(patch) = patch.search {
            self.search.merge(patch);
        }
        if let Some(patch) = patch.cache {
            self.cache.merge(patch);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(value) = env_string("EIX_LOCAL_ROOT") {
            self.local.root = PathBuf::from(value);
        }
        if let Some(value) = env_bool("EIX_LOCAL_ENABLED") {
            self.local.enabled = value;
        }

        if let Some(value) = env_bool("EIX_GITHUB_ENABLED") {
            self.github.enabled = value;
        }
        if let Some(value) = env_string("EIX_GITHUB_OWNER") {
            self.github.owner = Some(value);
        }
        if let Some(value) = env_string("EIX_GITHUB_REPO") {
            self.github.repo = value;
        }
        if let Some(value) = env_string("EIX_GITHUB_BRANCH") {
            self.github.branch = Some(value);
        }
        if let Some(value) = env_string("EIX_GITHUB_API_URL") {
            self.github.api_url = value;
        }
        if let Some(value) = env_duration("EIX_GITHUB_TTL")? {
            self.github.ttl = value;
        }

        if let Some(value) = env_bool("EIX_COLLECTION_ENABLED") {
            self.collection.enabled = value;
        }
        if let Some(value) = env_string("EIX_COLLECTION_URL") {
            self.collection.url = value;
        }
        if let Some(value) = env_duration("EIX_COLLECTION_TTL")? {
            self.collection.ttl = value;
        }

        if let Some(values) = env_list("EIX_PRIORITY") {
            self.priority.order = values;
        }
        if let Some(value) = env_bool("EIX_STOP_ON_FIRST") {
            self.priority.stop_on_first = value;
        }
        if let Some(value) = env_bool("EIX_CHECK_ALL_FOR_UPDATES") {
            self.priority.check_all_for_updates = value;
        }
        if let Some(value) = env_bool("EIX_FALLBACK_ON_ERROR") {
            self.priority.fallback_on_error = value;
        }

        if let Some(value) = env_f64("EIX_ENTROPY_WEIGHT")? {
            self.scoring.entropy_weight = value;
        }
        if let Some(value) = env_f64("EIX_RELATIONSHIP_THRESHOLD")? {
            self.scoring.relationship_threshold = value;
        }

        if let Some(value) = env_u64("EIX_SEARCH_PAGE_SIZE")? {
            self.search.default_page_size = usize::try_from(value).unwrap_or(usize::MAX);
        }
        if let Some(value) = env_duration("EIX_SEARCH_TIMEOUT")? {
            self.search.timeout = Some(value);
        }

        if let Some(value) = env_duration("EIX_BUILD_TIMEOUT")? {
            self.cache.build_timeout = value;
        }
        if let Some(value) = env_u64("EIX_MAX_RETRIES")? {
            self.cache.max_retries = u32::try_from(value).unwrap_or(u32::MAX);
        }
        if let Some(value) = env_bool("EIX_PERSIST_SNAPSHOTS") {
            self.cache.persist = value;
        }
        if let Some(value) = env_string("EIX_SNAPSHOT_DIR") {
            self.cache.snapshot_dir = Some(PathBuf::from(value));
        }

        Ok(())
    }

    /// Reject settings that would break the index at runtime.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Configuration`] naming the offending key.
    pub fn validate(&self) -> Result<()> {
        self.priority_config()?;
        if self.github.concurrency == 0 {
            return Err(IndexError::Configuration(
                "github.concurrency must be at least 1".to_string(),
            ));
        }
        if self.github.request_timeout >= self.github.ttl {
            return Err(IndexError::Configuration(
                "github.request_timeout must be shorter than github.ttl".to_string(),
            ));
        }
        if self.collection.request_timeout >= self.collection.ttl {
            return Err(IndexError::Configuration(
                "collection.request_timeout must be shorter than collection.ttl".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.scoring.relationship_threshold) {
            return Err(IndexError::Configuration(format!(
                "scoring.relationship_threshold must be within 0..=1 (got {})",
                self.scoring.relationship_threshold
            )));
        }
        if self.scoring.entropy_weight < 0.0 {
            return Err(IndexError::Configuration(
                "scoring.entropy_weight must not be negative".to_string(),
            ));
        }
        if self.search.default_page_size == 0 || self.search.max_page_size == 0 {
            return Err(IndexError::Configuration(
                "search page sizes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The validated priority policy.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Configuration`] for an empty order, a
    /// duplicate or an unknown source.
    pub fn priority_config(&self) -> Result<SourcePriorityConfig> {
        let order = SourcePriorityConfig::order_from_names(&self.priority.order)?;
        SourcePriorityConfig::new(
            order,
            self.priority.stop_on_first,
            self.priority.check_all_for_updates,
            self.priority.fallback_on_error,
        )
    }

    #[must_use]
    pub const fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            build_timeout: self.cache.build_timeout,
            failure_cooldown: self.cache.failure_cooldown,
            grace_period: self.cache.grace_period,
        }
    }

    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.cache.max_retries,
            base_delay_ms: u64::try_from(self.cache.retry_base_delay.as_millis()).unwrap_or(u64::MAX),
            max_delay_ms: u64::try_from(self.cache.retry_max_delay.as_millis()).unwrap_or(u64::MAX),
            ..RetryConfig::default()
        }
    }

    #[must_use]
    pub const fn scoring_config(&self) -> ScoringConfig {
        ScoringConfig {
            entropy_weight: self.scoring.entropy_weight,
            relationship_threshold: self.scoring.relationship_threshold,
        }
    }

    /// Snapshot directory when persistence is enabled.
    #[must_use]
    pub fn snapshot_dir(&self) -> Option<PathBuf> {
        if !self.cache.persist {
            return None;
        }
        self.cache
            .snapshot_dir
            .clone()
            .or_else(|| dirs::cache_dir().map(|d| d.join("eix/snapshots")))
    }
}

// =============================================================================
// SECTIONS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    pub enabled: bool,
    pub root: PathBuf,
}

impl Default for LocalConfig {
    fn default() -> Self {
        let root = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".eix/portfolio");
        Self {
            enabled: true,
            root,
        }
    }
}

impl LocalConfig {
    fn merge(&mut self, patch: LocalPatch) {
        if let Some(value) = patch.enabled {
            self.enabled = value;
        }
        if let Some(value) = patch.root {
            self.root = value;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    pub enabled: bool,
    /// Portfolio owner; the source is skipped while unset
    pub owner: Option<String>,
    pub repo: String,
    pub branch: Option<String>,
    pub api_url: String,
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Bytes; larger files are indexed by name only
    pub size_threshold: u64,
    pub concurrency: usize,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            owner: None,
            repo: "dollhouse-portfolio".to_string(),
            branch: None,
            api_url: GH_API.to_string(),
            ttl: GITHUB_TTL,
            request_timeout: GITHUB_TIMEOUT,
            size_threshold: DEFAULT_SIZE_THRESHOLD,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl GitHubConfig {
    fn merge(&mut self, patch: GitHubPatch) {
        if let Some(value) = patch.enabled {
            self.enabled = value;
        }
        if let Some(value) = patch.owner {
            self.owner = Some(value);
        }
        if let Some(value) = patch.repo {
            self.repo = value;
        }
        if let Some(value) = patch.branch {
            self.branch = Some(value);
        }
        if let Some(value) = patch.api_url {
            self.api_url = value;
        }
        if let Some(value) = patch.ttl {
            self.ttl = value;
        }
        if let Some(value) = patch.request_timeout {
            self.request_timeout = value;
        }
        if let Some(value) = patch.size_threshold {
            self.size_threshold = value;
        }
        if let Some(value) = patch.concurrency {
            self.concurrency = value;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub enabled: bool,
    pub url: String,
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub manifest_reuse: Duration,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: DEFAULT_COLLECTION_URL.to_string(),
            ttl: COLLECTION_TTL,
            request_timeout: COLLECTION_TIMEOUT,
            manifest_reuse: DEFAULT_MANIFEST_REUSE,
        }
    }
}

impl CollectionConfig {
    fn merge(&mut self, patch: CollectionPatch) {
        if let Some(value) = patch.enabled {
            self.enabled = value;
        }
        if let Some(value) = patch.url {
            self.url = value;
        }
        if let Some(value) = patch.ttl {
            self.ttl = value;
        }
        if let Some(value) = patch.request_timeout {
            self.request_timeout = value;
        }
        if let Some(value) = patch.manifest_reuse {
            self.manifest_reuse = value;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityConfig {
    /// Source names, highest priority first
    pub order: Vec<String>,
    pub stop_on_first: bool,
    pub check_all_for_updates: bool,
    pub fallback_on_error: bool,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            order: vec![
                "local".to_string(),
                "github".to_string(),
                "collection".to_string(),
            ],
            stop_on_first: true,
            check_all_for_updates: false,
            fallback_on_error: true,
        }
    }
}

impl PriorityConfig {
    fn merge(&mut self, patch: PriorityPatch) {
        if let Some(value) = patch.order {
            self.order = value;
        }
        if let Some(value) = patch.stop_on_first {
            self.stop_on_first = value;
        }
        if let Some(value) = patch.check_all_for_updates {
            self.check_all_for_updates = value;
        }
        if let Some(value) = patch.fallback_on_error {
            self.fallback_on_error = value;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringSection {
    pub entropy_weight: f64,
    pub relationship_threshold: f64,
}

impl Default for ScoringSection {
    fn default() -> Self {
        Self {
            entropy_weight: DEFAULT_ENTROPY_WEIGHT,
            relationship_threshold: DEFAULT_RELATIONSHIP_THRESHOLD,
        }
    }
}

impl ScoringSection {
    fn merge(&mut self, patch: ScoringPatch) {
        if let Some(value) = patch.entropy_weight {
            self.entropy_weight = value;
        }
        if let Some(value) = patch.relationship_threshold {
            self.relationship_threshold = value;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Call-level deadline; partial results are returned on expiry
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
            timeout: None,
        }
    }
}

impl SearchConfig {
    fn merge(&mut self, patch: SearchPatch) {
        if let Some(value) = patch.default_page_size {
            self.default_page_size = value;
        }
        if let Some(value) = patch.max_page_size {
            self.max_page_size = value;
        }
        if let Some(value) = patch.timeout {
            self.timeout = Some(value);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(with = "humantime_serde")]
    pub build_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub failure_cooldown: Duration,
    #[serde(with = "humantime_serde")]
    pub grace_period: Duration,
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub retry_max_delay: Duration,
    /// Save snapshots after each command and restore them on startup
    pub persist: bool,
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            build_timeout: DEFAULT_BUILD_TIMEOUT,
            failure_cooldown: DEFAULT_FAILURE_COOLDOWN,
            grace_period: DEFAULT_GRACE_PERIOD,
            max_retries: retry.max_retries,
            retry_base_delay: Duration::from_millis(retry.base_delay_ms),
            retry_max_delay: Duration::from_millis(retry.max_delay_ms),
            persist: true,
            snapshot_dir: None,
        }
    }
}

impl CacheConfig {
    fn merge(&mut self, patch: CachePatch) {
        if let Some(value) = patch.build_timeout {
            self.build_timeout = value;
        }
        if let Some(value) = patch.failure_cooldown {
            self.failure_cooldown = value;
        }
        if let Some(value) = patch.grace_period {
            self.grace_period = value;
        }
        if let Some(value) = patch.max_retries {
            self.max_retries = value;
        }
        if let Some(value) = patch.retry_base_delay {
            self.retry_base_delay = value;
        }
        if let Some(value) = patch.retry_max_delay {
            self.retry_max_delay = value;
        }
        if let Some(value) = patch.persist {
            self.persist = value;
        }
        if let Some(value) = patch.snapshot_dir {
            self.snapshot_dir = Some(value);
        }
    }
}

// =============================================================================
// PATCHES
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigPatch {
    pub local: Option<LocalPatch>,
    pub github: Option<GitHubPatch>,
    pub collection: Option<CollectionPatch>,
    pub priority: Option<PriorityPatch>,
    pub scoring: Option<ScoringPatch>,
    pub search: Option<SearchPatch>,
    pub cache: Option<CachePatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LocalPatch {
    pub enabled: Option<bool>,
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GitHubPatch {
    pub enabled: Option<bool>,
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub branch: Option<String>,
    pub api_url: Option<String>,
    #[serde(default, with = "humantime_serde")]
    pub ttl: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub request_timeout: Option<Duration>,
    pub size_threshold: Option<u64>,
    pub concurrency: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CollectionPatch {
    pub enabled: Option<bool>,
    pub url: Option<String>,
    #[serde(default, with = "humantime_serde")]
    pub ttl: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub request_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub manifest_reuse: Option<Duration>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PriorityPatch {
    pub order: Option<Vec<String>>,
    pub stop_on_first: Option<bool>,
    pub check_all_for_updates: Option<bool>,
    pub fallback_on_error: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ScoringPatch {
    pub entropy_weight: Option<f64>,
    pub relationship_threshold: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SearchPatch {
    pub default_page_size: Option<usize>,
    pub max_page_size: Option<usize>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CachePatch {
    #[serde(default, with = "humantime_serde")]
    pub build_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub failure_cooldown: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub grace_period: Option<Duration>,
    pub max_retries: Option<u32>,
    #[serde(default, with = "humantime_serde")]
    pub retry_base_delay: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub retry_max_delay: Option<Duration>,
    pub persist: Option<bool>,
    pub snapshot_dir: Option<PathBuf>,
}

// =============================================================================
// ENV HELPERS
// =============================================================================

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|value| {
        matches!(
            value.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Result<Option<u64>> {
    match std::env::var(key) {
        Ok(value) => value.trim().parse::<u64>().map(Some).map_err(|err| {
            IndexError::Configuration(format!("invalid {key} value {value}: {err}"))
        }),
        Err(_) => Ok(None),
    }
}

fn env_f64(key: &str) -> Result<Option<f64>> {
    match std::env::var(key) {
        Ok(value) => value.trim().parse::<f64>().map(Some).map_err(|err| {
            IndexError::Configuration(format!("invalid {key} value {value}: {err}"))
        }),
        Err(_) => Ok(None),
    }
}

fn env_duration(key: &str) -> Result<Option<Duration>> {
    match std::env::var(key) {
        Ok(value) => humantime_serde::re::humantime::parse_duration(value.trim())
            .map(Some)
            .map_err(|err| {
                IndexError::Configuration(format!("invalid {key} value {value}: {err}"))
            }),
        Err(_) => Ok(None),
    }
}

fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect()
    })
}
