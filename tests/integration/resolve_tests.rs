//! Resolving one element to its authoritative copy.

use element_index::ResolveOptions;
use element_index::core::{ElementKey, ElementType, SourceKind};
use element_index::index::{CacheState, SourceIndex};
use element_index::test_utils::{FakeFailure, TestLogger};

use crate::fixture::World;

#[tokio::test]
async fn test_local_copy_wins_by_default() {
    let log = TestLogger::new("test_local_copy_wins_by_default");
    let world = World::new();
    world.local_skill("debug-helper", "1.0", "helps debug", &[]);
    world.github_skill("debug-helper", "1.2", "helps debug");
    let manager = world.manager();

    let resolved = manager
        .resolve("debug-helper", ElementType::Skill, &ResolveOptions::new())
        .await
        .unwrap()
        .expect("debug-helper should resolve");
    log.log_actual(&resolved.entry.sources());

    assert_eq!(resolved.entry.primary().source, SourceKind::Local);
    assert_eq!(resolved.entry.primary().version, "1.0");
    assert_eq!(resolved.entry.candidates.len(), 1);
    assert!(!resolved.update_available);
    assert_eq!(world.github.listing_calls(), 0);
    log.pass();
}

#[tokio::test]
async fn test_check_all_reports_newer_remote_version() {
    let log = TestLogger::new("test_check_all_reports_newer_remote_version");
    let world = World::new();
    world.local_skill("debug-helper", "1.0", "helps debug", &[]);
    world.github_skill("debug-helper", "1.2", "helps debug");
    let manager = world.manager();

    let resolved = manager
        .resolve(
            "debug-helper",
            ElementType::Skill,
            &ResolveOptions::new().check_all_for_updates(true),
        )
        .await
        .unwrap()
        .expect("debug-helper should resolve");
    log.log_actual(&resolved);

    assert_eq!(resolved.entry.primary().source, SourceKind::Local);
    assert!(resolved.update_available);
    assert_eq!(resolved.update_source, Some(SourceKind::GitHub));
    assert_eq!(resolved.update_version.as_deref(), Some("1.2"));
    assert_eq!(resolved.entry.best_version, "1.2");
    log.pass();
}

#[tokio::test]
async fn test_older_remote_copy_is_not_an_update() {
    let world = World::new();
    world.local_skill("debug-helper", "2.0.0", "helps debug", &[]);
    world.collection.add(ElementType::Skill, "debug-helper", "1.5.0");
    let manager = world.manager();

    let resolved = manager
        .resolve(
            "debug-helper",
            ElementType::Skill,
            &ResolveOptions::new().check_all_for_updates(true),
        )
        .await
        .unwrap()
        .expect("debug-helper should resolve");

    assert_eq!(resolved.entry.candidates.len(), 2);
    assert!(!resolved.update_available);
    assert!(resolved.update_source.is_none());
}

#[tokio::test]
async fn test_include_all_collects_every_candidate_in_priority_order() {
    let world = World::new();
    world.local_skill("formatter", "1.0.0", "formats code", &[]);
    world.collection.add(ElementType::Skill, "formatter", "1.0.0");
    let manager = world.manager();

    let first_only = manager
        .resolve("formatter", ElementType::Skill, &ResolveOptions::new())
        .await
        .unwrap()
        .expect("formatter should resolve");
    assert_eq!(first_only.entry.sources(), vec![SourceKind::Local]);

    let all = manager
        .resolve(
            "formatter",
            ElementType::Skill,
            &ResolveOptions::new().include_all(true),
        )
        .await
        .unwrap()
        .expect("formatter should resolve");
    assert_eq!(
        all.entry.sources(),
        vec![SourceKind::Local, SourceKind::Collection]
    );
}

#[tokio::test]
async fn test_preferred_source_is_consulted_first() {
    let world = World::new();
    world.local_skill("formatter", "1.0.0", "formats code", &[]);
    world.collection.add(ElementType::Skill, "formatter", "3.0.0");
    let manager = world.manager();

    let resolved = manager
        .resolve(
            "formatter",
            ElementType::Skill,
            &ResolveOptions::new().preferred_source(SourceKind::Collection),
        )
        .await
        .unwrap()
        .expect("formatter should resolve");

    assert_eq!(resolved.entry.primary().source, SourceKind::Collection);
    assert_eq!(resolved.entry.primary().version, "3.0.0");
}

#[tokio::test]
async fn test_falls_through_to_lower_priority_source() {
    let world = World::new();
    world.collection.add(ElementType::Skill, "only-upstream", "1.0.0");
    let manager = world.manager();

    let resolved = manager
        .resolve("only-upstream", ElementType::Skill, &ResolveOptions::new())
        .await
        .unwrap()
        .expect("only-upstream should resolve");

    assert_eq!(resolved.entry.primary().source, SourceKind::Collection);
}

#[tokio::test]
async fn test_unknown_element_resolves_to_none() {
    let world = World::new();
    world.local_skill("formatter", "1.0.0", "formats code", &[]);
    let manager = world.manager();

    let resolved = manager
        .resolve("missing", ElementType::Skill, &ResolveOptions::new())
        .await
        .unwrap();

    assert!(resolved.is_none());
}

#[tokio::test]
async fn test_element_type_is_part_of_identity() {
    let world = World::new();
    world.local_skill("helper", "1.0.0", "a skill", &[]);
    let manager = world.manager();

    let as_persona = manager
        .resolve("helper", ElementType::Persona, &ResolveOptions::new())
        .await
        .unwrap();

    assert!(as_persona.is_none());
}

#[tokio::test]
async fn test_rate_limited_remote_is_skipped() {
    let world = World::new();
    world.github.set_failure(Some(FakeFailure::RateLimited));
    world.collection.add(ElementType::Skill, "formatter", "1.0.0");
    let manager = world.manager();

    let resolved = manager
        .resolve("formatter", ElementType::Skill, &ResolveOptions::new())
        .await
        .unwrap()
        .expect("formatter should resolve from the collection");

    assert_eq!(resolved.entry.primary().source, SourceKind::Collection);
    assert!(manager.stats().sources[1].degraded);
}

#[tokio::test]
async fn test_invalidated_element_is_rebuilt_before_resolving() {
    let log = TestLogger::new("test_invalidated_element_is_rebuilt_before_resolving");
    let world = World::new();
    world.local_skill("formatter", "1.0.0", "formats code", &[]);
    let manager = world.manager();

    let before = manager
        .resolve("formatter", ElementType::Skill, &ResolveOptions::new())
        .await
        .unwrap()
        .expect("formatter should resolve");
    assert_eq!(before.entry.primary().version, "1.0.0");

    // Write a new version, then report the write.
    world.local_skill("formatter", "1.1.0", "formats code", &[]);
    let key = ElementKey::new("formatter", ElementType::Skill);
    assert!(manager.invalidate(SourceKind::Local, "element saved", Some(&key)));
    assert_eq!(world.local_index.state(ElementType::Skill), CacheState::Invalidated);
    assert_eq!(world.local_index.state(ElementType::Persona), CacheState::Empty);
    assert!(world.local_index.is_distrusted(&key));

    let after = manager
        .resolve("formatter", ElementType::Skill, &ResolveOptions::new())
        .await
        .unwrap()
        .expect("formatter should resolve");
    log.log_actual(&after.entry.primary().version);

    assert_eq!(after.entry.primary().version, "1.1.0");
    log.pass();
}

#[tokio::test]
async fn test_invalidate_unregistered_source_is_ignored() {
    let world = World::new();
    let registry = element_index::index::IndexRegistry::new().with(world.local_index.clone());
    let manager = element_index::UnifiedIndexManager::new(
        registry,
        element_index::core::SourcePriorityConfig::default(),
        element_index::search::RelevanceScorer::default(),
    );

    assert!(!manager.invalidate(SourceKind::GitHub, "push", None));
    assert!(manager.invalidate(SourceKind::Local, "save", None));
}
