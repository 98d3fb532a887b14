//! Snapshots saved to disk and restored into a new process.

use element_index::core::{ElementType, SourceKind};
use element_index::index::{CacheState, SnapshotStore, SourceIndex};
use element_index::test_utils::TestLogger;
use element_index::{ResolveOptions, SearchOptions};
use tempfile::TempDir;

use crate::fixture::World;

#[tokio::test]
async fn test_saved_snapshots_seed_a_new_manager() {
    let log = TestLogger::new("test_saved_snapshots_seed_a_new_manager");
    let store_dir = TempDir::new().unwrap();
    let store = SnapshotStore::new(store_dir.path());

    let first = World::new();
    first.github_skill("debug-helper", "1.2", "helps debug");
    first.collection.add(ElementType::Skill, "formatter", "1.0.0");
    let manager = first.manager();
    manager
        .search("", &SearchOptions::new().include_all(true))
        .await
        .unwrap();
    let saved = manager.save_snapshots(&store).unwrap();
    log.log_actual(&saved);
    assert!(saved > 0);

    // A fresh world whose remotes are down: the restored snapshots still answer.
    let second = World::new();
    second
        .github
        .set_failure(Some(element_index::test_utils::FakeFailure::Unavailable));
    second
        .collection
        .set_failure(Some(element_index::test_utils::FakeFailure::Unavailable));
    let restored_manager = second.manager();
    let restored = restored_manager.load_snapshots(&store);
    assert!(restored > 0);
    assert_eq!(second.github_index.state(ElementType::Skill), CacheState::Fresh);

    let resolved = restored_manager
        .resolve("formatter", ElementType::Skill, &ResolveOptions::new())
        .await
        .unwrap()
        .expect("formatter should come from the restored collection snapshot");
    assert_eq!(resolved.entry.primary().source, SourceKind::Collection);

    let resolved = restored_manager
        .resolve("debug-helper", ElementType::Skill, &ResolveOptions::new())
        .await
        .unwrap()
        .expect("debug-helper should come from the restored github snapshot");
    assert_eq!(resolved.entry.primary().version, "1.2");
    log.pass();
}

#[tokio::test]
async fn test_local_snapshot_restores_as_stale() {
    let store_dir = TempDir::new().unwrap();
    let store = SnapshotStore::new(store_dir.path());

    let world = World::new();
    world.local_skill("formatter", "1.0.0", "formats code", &[]);
    world
        .local_index
        .get_index(ElementType::Skill, false)
        .await
        .unwrap();
    store.save_index(&*world.local_index).unwrap();

    let reopened = World::new();
    let restored = store.restore_index(&*reopened.local_index);

    assert_eq!(restored, 1);
    assert_eq!(reopened.local_index.state(ElementType::Skill), CacheState::Stale);
    assert_eq!(
        reopened
            .local_index
            .find("formatter", ElementType::Skill)
            .map(|e| e.version),
        Some("1.0.0".to_string())
    );
}

#[tokio::test]
async fn test_missing_store_restores_nothing() {
    let store_dir = TempDir::new().unwrap();
    let store = SnapshotStore::new(store_dir.path().join("never-written"));
    let world = World::new();

    assert_eq!(world.manager().load_snapshots(&store), 0);
    assert_eq!(world.local_index.state(ElementType::Skill), CacheState::Empty);
}

#[tokio::test]
async fn test_failed_builds_are_not_persisted() {
    let store_dir = TempDir::new().unwrap();
    let store = SnapshotStore::new(store_dir.path());
    let world = World::new();
    world
        .collection
        .set_failure(Some(element_index::test_utils::FakeFailure::Unavailable));
    world
        .collection_index
        .get_index(ElementType::Skill, false)
        .await
        .unwrap();

    assert!(world.collection_index.snapshots().is_empty());
    assert_eq!(store.save_index(&*world.collection_index).unwrap(), 0);
}
