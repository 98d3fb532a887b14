//! Behavior of each source index on its own.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use element_index::core::{ElementType, SourceKind};
use element_index::index::collection::{CollectionIndexSettings, ManifestEntry};
use element_index::index::github::GitHubIndexSettings;
use element_index::index::{
    CacheSettings, CacheState, CollectionIndex, GitHubPortfolioIndexer, RateLimitStatus,
    SourceIndex,
};
use element_index::test_utils::{
    FakeCollectionApi, FakePortfolioApi, PortfolioFixture, TestLogger, element_markdown,
};

use crate::fixture::{World, fast_retry};

// =============================================================================
// LOCAL
// =============================================================================

#[tokio::test]
async fn test_local_scan_reads_front_matter_and_skips_other_files() {
    let world = World::new();
    world.local_skill("formatter", "1.3.0", "formats code", &["format"]);
    world.portfolio.create_file("skills/notes.txt", "not an element");
    world
        .portfolio
        .create_file("skills/.hidden/secret.md", &element_markdown("secret", "1.0", "x", &[]));

    let snapshot = world
        .local_index
        .get_index(ElementType::Skill, false)
        .await
        .unwrap();

    let names: Vec<&str> = snapshot.entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["formatter"]);
    let formatter = &snapshot.entries[0];
    assert_eq!(formatter.version, "1.3.0");
    assert_eq!(formatter.description.as_deref(), Some("formats code"));
    assert_eq!(formatter.triggers, vec!["format".to_string()]);
    assert_eq!(formatter.source, SourceKind::Local);
}

#[tokio::test]
async fn test_local_missing_type_directory_is_empty() {
    let portfolio = PortfolioFixture::new();
    let index = element_index::index::LocalIndex::open(portfolio.root(), CacheSettings::default());

    let snapshot = index.get_index(ElementType::Agent, false).await.unwrap();

    assert!(snapshot.is_empty());
    assert!(!index.stats().degraded);
}

#[tokio::test]
async fn test_local_file_without_front_matter_uses_file_name() {
    let world = World::new();
    world.portfolio.create_file("skills/Code_Review.md", "# Just a heading\n");

    let snapshot = world
        .local_index
        .get_index(ElementType::Skill, false)
        .await
        .unwrap();

    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.entries[0].name, "code-review");
    assert!(!snapshot.warnings.is_empty());
}

#[tokio::test]
async fn test_local_duplicate_names_keep_one_entry_and_warn() {
    let world = World::new();
    world
        .portfolio
        .create_file("skills/a/helper.md", &element_markdown("helper", "1.0", "first", &[]));
    world
        .portfolio
        .create_file("skills/b/helper.md", &element_markdown("helper", "2.0", "second", &[]));

    let snapshot = world
        .local_index
        .get_index(ElementType::Skill, false)
        .await
        .unwrap();

    assert_eq!(snapshot.len(), 1);
    assert!(snapshot.warnings.iter().any(|w| w.contains("duplicate")));
}

// =============================================================================
// GITHUB
// =============================================================================

fn github_index(api: &FakePortfolioApi, settings: GitHubIndexSettings) -> GitHubPortfolioIndexer {
    GitHubPortfolioIndexer::with_api(Arc::new(api.clone()), settings, CacheSettings::default())
}

#[tokio::test]
async fn test_github_listing_follows_pages() {
    let api = FakePortfolioApi::new();
    api.set_page_size(2);
    for i in 0..5 {
        let name = format!("skill-{i}");
        api.add_file(
            ElementType::Skill,
            &format!("{name}.md"),
            &element_markdown(&name, "1.0.0", "paged", &[]),
        );
    }
    let index = github_index(
        &api,
        GitHubIndexSettings {
            retry: fast_retry(),
            ..GitHubIndexSettings::default()
        },
    );

    let snapshot = index.get_index(ElementType::Skill, false).await.unwrap();

    assert_eq!(snapshot.len(), 5);
    assert_eq!(api.listing_calls(), 3);
    assert_eq!(api.fetch_calls(), 5);
}

#[tokio::test]
async fn test_github_entries_carry_blob_sha_fingerprint() {
    let api = FakePortfolioApi::new();
    api.add_file(
        ElementType::Persona,
        "mentor.md",
        &element_markdown("mentor", "0.4.0", "a patient mentor", &[]),
    );
    let index = github_index(&api, GitHubIndexSettings::default());

    let snapshot = index.get_index(ElementType::Persona, false).await.unwrap();

    let mentor = &snapshot.entries[0];
    assert_eq!(mentor.source, SourceKind::GitHub);
    assert_eq!(mentor.version, "0.4.0");
    assert_eq!(mentor.content_fingerprint.len(), 64);
}

#[tokio::test]
async fn test_github_oversized_file_is_indexed_by_name() {
    let api = FakePortfolioApi::new();
    let body = format!(
        "{}\n{}",
        element_markdown("huge-skill", "1.0.0", "large", &[]),
        "x".repeat(4096)
    );
    api.add_file(ElementType::Skill, "huge-skill.md", &body);
    let index = github_index(
        &api,
        GitHubIndexSettings {
            size_threshold: 1024,
            ..GitHubIndexSettings::default()
        },
    );

    let snapshot = index.get_index(ElementType::Skill, false).await.unwrap();

    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.entries[0].name, "huge-skill");
    assert!(snapshot.entries[0].description.is_none());
    assert_eq!(api.fetch_calls(), 0);
    assert_eq!(snapshot.warnings.len(), 1);
}

fn exhausted_quota() -> Option<RateLimitStatus> {
    Some(RateLimitStatus {
        limit: Some(60),
        remaining: Some(0),
        reset_at: Some(Utc::now() + chrono::Duration::minutes(30)),
    })
}

#[tokio::test]
async fn test_github_exhausted_quota_without_snapshot_serves_empty() {
    let api = FakePortfolioApi::new();
    api.add_file(
        ElementType::Skill,
        "formatter.md",
        &element_markdown("formatter", "1.0.0", "formats code", &[]),
    );
    api.set_rate_limit(exhausted_quota());
    let index = github_index(&api, GitHubIndexSettings::default());

    let snapshot = index.get_index(ElementType::Skill, false).await.unwrap();

    assert!(snapshot.is_empty());
    assert_eq!(api.fetch_calls(), 0);
    let status = index.rate_limit_status().unwrap();
    assert!(status.is_exhausted());
    let stats = index.stats();
    assert!(stats.degraded);
    assert_eq!(stats.rate_limit.and_then(|r| r.remaining), Some(0));
}

#[tokio::test]
async fn test_github_unchanged_files_reuse_entries_under_exhausted_quota() {
    let log = TestLogger::new("test_github_unchanged_files_reuse_entries_under_exhausted_quota");
    let api = FakePortfolioApi::new();
    api.add_file(
        ElementType::Skill,
        "code-reviewer.md",
        &element_markdown("code-reviewer", "1.2.0", "reviews pull requests", &["review"]),
    );
    let index = github_index(&api, GitHubIndexSettings::default());
    index.get_index(ElementType::Skill, false).await.unwrap();
    assert_eq!(api.fetch_calls(), 1);

    api.set_rate_limit(exhausted_quota());
    let snapshot = index.get_index(ElementType::Skill, true).await.unwrap();
    log.log_actual(&snapshot.entries);

    let reviewer = snapshot.find("code-reviewer").unwrap();
    assert_eq!(reviewer.version, "1.2.0");
    assert_eq!(reviewer.triggers, vec!["review".to_string()]);
    assert_eq!(reviewer.description.as_deref(), Some("reviews pull requests"));
    assert_eq!(api.fetch_calls(), 1);
    assert_eq!(index.state(ElementType::Skill), CacheState::Fresh);
    log.pass();
}

#[tokio::test]
async fn test_github_changed_file_under_exhausted_quota_keeps_last_good() {
    let api = FakePortfolioApi::new();
    api.add_file(
        ElementType::Skill,
        "code-reviewer.md",
        &element_markdown("code-reviewer", "1.2.0", "reviews pull requests", &["review"]),
    );
    let index = github_index(&api, GitHubIndexSettings::default());
    index.get_index(ElementType::Skill, false).await.unwrap();

    api.add_file(
        ElementType::Skill,
        "code-reviewer.md",
        &element_markdown("code-reviewer", "1.3.0", "reviews pull requests", &["review"]),
    );
    api.set_rate_limit(exhausted_quota());
    let snapshot = index.get_index(ElementType::Skill, true).await.unwrap();

    let reviewer = snapshot.find("code-reviewer").unwrap();
    assert_eq!(reviewer.version, "1.2.0");
    assert_eq!(reviewer.triggers, vec!["review".to_string()]);
    assert_eq!(api.fetch_calls(), 1);
    assert_eq!(index.state(ElementType::Skill), CacheState::Stale);
    let stats = index.stats();
    assert!(stats.degraded);
    assert!(stats.types.iter().any(|t| t
        .last_error
        .as_deref()
        .is_some_and(|e| e.to_lowercase().contains("rate"))));
}

// =============================================================================
// COLLECTION
// =============================================================================

#[tokio::test]
async fn test_collection_types_share_one_manifest_fetch() {
    let api = FakeCollectionApi::new();
    api.add(ElementType::Skill, "formatter", "1.0.0");
    api.add(ElementType::Persona, "mentor", "2.0.0");
    api.set_slow(true);
    let index = CollectionIndex::with_api(
        Arc::new(api.clone()),
        CollectionIndexSettings {
            retry: fast_retry(),
            manifest_reuse: Duration::from_secs(60),
            ..CollectionIndexSettings::default()
        },
        CacheSettings::default(),
    );

    let (skills, personas) = tokio::join!(
        index.get_index(ElementType::Skill, false),
        index.get_index(ElementType::Persona, false)
    );

    assert_eq!(skills.unwrap().len(), 1);
    assert_eq!(personas.unwrap().len(), 1);
    assert_eq!(api.fetch_calls(), 1);
}

#[tokio::test]
async fn test_collection_entry_without_name_is_derived_from_path() {
    let api = FakeCollectionApi::new();
    api.add_entry(
        ElementType::Template,
        ManifestEntry {
            path: "library/templates/Meeting_Notes.md".to_string(),
            description: Some("notes template".to_string()),
            ..ManifestEntry::default()
        },
    );
    let index = CollectionIndex::with_api(
        Arc::new(api),
        CollectionIndexSettings::default(),
        CacheSettings::default(),
    );

    let snapshot = index.get_index(ElementType::Template, false).await.unwrap();

    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.entries[0].name, "meeting-notes");
    assert_eq!(snapshot.warnings.len(), 1);
}
