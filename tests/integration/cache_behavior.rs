//! Snapshot cache lifecycle: coalescing, stale serving and fallback.

use std::time::Duration;

use element_index::core::{ElementType, SourceKind};
use element_index::index::{CacheSettings, CacheState, SourceCache, SourceIndex};
use element_index::test_utils::{FakeFailure, StaticBuilder, TestLogger, entry};

use crate::fixture::World;

fn skill(name: &str, version: &str) -> element_index::core::IndexEntry {
    entry(name, ElementType::Skill, SourceKind::Local, version)
}

#[tokio::test]
async fn test_concurrent_cold_reads_share_one_build() {
    let log = TestLogger::new("test_concurrent_cold_reads_share_one_build");
    let builder = StaticBuilder::new(SourceKind::Local, vec![skill("alpha", "1.0.0")]);
    builder.set_delay(Duration::from_millis(100));
    let cache = SourceCache::new(builder.clone(), CacheSettings::default());

    let (a, b) = tokio::join!(
        cache.get_index(ElementType::Skill, false),
        cache.get_index(ElementType::Skill, false)
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    log.log_actual(&builder.builds());

    assert_eq!(builder.builds(), 1);
    assert_eq!(a.generation, b.generation);
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);
    log.pass();
}

#[tokio::test]
async fn test_fresh_snapshot_is_served_without_rebuilding() {
    let builder = StaticBuilder::new(SourceKind::Local, vec![skill("alpha", "1.0.0")]);
    let cache = SourceCache::new(builder.clone(), CacheSettings::default());

    cache.get_index(ElementType::Skill, false).await.unwrap();
    cache.get_index(ElementType::Skill, false).await.unwrap();

    assert_eq!(builder.builds(), 1);
    assert_eq!(cache.state(ElementType::Skill), CacheState::Fresh);
}

#[tokio::test]
async fn test_expired_snapshot_is_served_while_refreshing() {
    let builder = StaticBuilder::new(SourceKind::GitHub, Vec::new())
        .with_ttl(Duration::from_millis(200));
    builder.set_entries(vec![entry("alpha", ElementType::Skill, SourceKind::GitHub, "1.0.0")]);
    let cache = SourceCache::new(builder.clone(), CacheSettings::default());

    let first = cache.get_index(ElementType::Skill, false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(260)).await;
    assert_eq!(cache.state(ElementType::Skill), CacheState::Stale);

    builder.set_entries(vec![
        entry("alpha", ElementType::Skill, SourceKind::GitHub, "1.0.0"),
        entry("beta", ElementType::Skill, SourceKind::GitHub, "1.0.0"),
    ]);
    let stale = cache.get_index(ElementType::Skill, false).await.unwrap();
    assert_eq!(stale.generation, first.generation);
    assert_eq!(stale.len(), 1);

    cache.settle(ElementType::Skill).await;
    assert_eq!(builder.builds(), 2);
    assert_eq!(cache.current(ElementType::Skill).len(), 2);
    assert_eq!(cache.state(ElementType::Skill), CacheState::Fresh);
}

#[tokio::test]
async fn test_failed_rebuild_keeps_last_good_snapshot() {
    let builder = StaticBuilder::new(SourceKind::Local, vec![skill("alpha", "1.0.0")]);
    let cache = SourceCache::new(builder.clone(), CacheSettings::default());
    cache.get_index(ElementType::Skill, false).await.unwrap();

    builder.set_failure(Some(FakeFailure::Unavailable));
    let snapshot = cache.get_index(ElementType::Skill, true).await.unwrap();

    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.entries[0].name, "alpha");
    assert!(cache.is_degraded(ElementType::Skill));
    let stats = cache.stats();
    assert!(stats.degraded);
    let skill_stats = stats
        .types
        .iter()
        .find(|t| t.element_type == ElementType::Skill)
        .unwrap();
    assert!(skill_stats.last_error.is_some());
    assert_eq!(skill_stats.state, CacheState::Stale);
}

#[tokio::test]
async fn test_failed_first_build_serves_empty_index() {
    let builder = StaticBuilder::new(SourceKind::Collection, vec![skill("alpha", "1.0.0")]);
    builder.set_failure(Some(FakeFailure::Unavailable));
    let cache = SourceCache::new(builder.clone(), CacheSettings::default());

    let snapshot = cache.get_index(ElementType::Skill, false).await.unwrap();

    assert!(snapshot.is_empty());
    assert_eq!(cache.state(ElementType::Skill), CacheState::Empty);
    assert!(cache.is_degraded(ElementType::Skill));

    // Within the cooldown a cold, failed slot is not rebuilt on every read.
    cache.get_index(ElementType::Skill, false).await.unwrap();
    assert_eq!(builder.builds(), 1);
}

#[tokio::test]
async fn test_recovered_source_clears_degraded_flag() {
    let builder = StaticBuilder::new(SourceKind::Local, vec![skill("alpha", "1.0.0")]);
    builder.set_failure(Some(FakeFailure::Unavailable));
    let cache = SourceCache::new(builder.clone(), CacheSettings::default());
    cache.get_index(ElementType::Skill, false).await.unwrap();
    assert!(cache.is_degraded(ElementType::Skill));

    builder.set_failure(None);
    let snapshot = cache.get_index(ElementType::Skill, true).await.unwrap();

    assert_eq!(snapshot.len(), 1);
    assert!(!cache.is_degraded(ElementType::Skill));
}

#[tokio::test]
async fn test_build_deadline_counts_as_failure() {
    let builder = StaticBuilder::new(SourceKind::GitHub, Vec::new());
    builder.set_failure(Some(FakeFailure::Hang));
    let settings = CacheSettings {
        build_timeout: Duration::from_millis(50),
        ..CacheSettings::default()
    };
    let cache = SourceCache::new(builder, settings);

    let snapshot = cache.get_index(ElementType::Agent, false).await.unwrap();

    assert!(snapshot.is_empty());
    let stats = cache.stats();
    let agent = stats
        .types
        .iter()
        .find(|t| t.element_type == ElementType::Agent)
        .unwrap();
    assert!(agent.degraded);
    assert!(agent.last_error.as_deref().unwrap_or_default().contains("exceeded"));
}

#[tokio::test]
async fn test_rate_limited_github_serves_previous_snapshot() {
    let log = TestLogger::new("test_rate_limited_github_serves_previous_snapshot");
    let world = World::new();
    world.github_skill("debug-helper", "1.2", "helps debug");

    let first = world
        .github_index
        .get_index(ElementType::Skill, false)
        .await
        .unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(world.github.listing_calls(), 1);

    world.github.set_failure(Some(FakeFailure::RateLimited));
    let after = world
        .github_index
        .get_index(ElementType::Skill, true)
        .await
        .unwrap();
    log.log_actual(&world.github_index.stats());

    assert_eq!(after.len(), 1);
    assert_eq!(after.entries[0].name, "debug-helper");
    assert!(world.github_index.stats().degraded);
    // Rate limiting is transient: one initial attempt plus one retry.
    assert_eq!(world.github.listing_calls(), 3);
    log.pass();
}

#[tokio::test]
async fn test_invalidation_during_build_leaves_slot_invalidated() {
    let builder = StaticBuilder::new(SourceKind::Local, vec![skill("alpha", "1.0.0")]);
    builder.set_delay(Duration::from_millis(100));
    let cache = SourceCache::new(builder.clone(), CacheSettings::default());

    let reader = cache.clone();
    let build = tokio::spawn(async move { reader.get_index(ElementType::Skill, false).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    cache.invalidate("external write", None);
    build.await.unwrap().unwrap();

    assert_eq!(cache.state(ElementType::Skill), CacheState::Invalidated);
    cache.get_index(ElementType::Skill, false).await.unwrap();
    assert_eq!(builder.builds(), 2);
    assert_eq!(cache.state(ElementType::Skill), CacheState::Fresh);
}
