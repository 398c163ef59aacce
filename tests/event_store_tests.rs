mod common;

use common::pending;
use kinfold::{
    EntityKind, Error, EventStore, ExpectedVersion, FileEventStore, LockMode, MemoryEventStore,
};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::tempdir;
use uuid::Uuid;

fn stores() -> Vec<(&'static str, Box<dyn Fn() -> Arc<dyn EventStore>>)> {
    vec![
        (
            "memory",
            Box::new(|| -> Arc<dyn EventStore> { Arc::new(MemoryEventStore::new()) }),
        ),
        (
            "file",
            Box::new(|| -> Arc<dyn EventStore> {
                let dir = tempdir().unwrap().keep();
                Arc::new(FileEventStore::open_with_lock(dir, LockMode::None).unwrap())
            }),
        ),
    ]
}

#[test]
fn test_append_new_stream_starts_at_version_one() {
    for (name, open) in stores() {
        let store = open();
        let id = Uuid::new_v4();
        let version = store
            .append(id, EntityKind::Person, vec![pending("PersonCreated")], ExpectedVersion::NoStream)
            .unwrap();
        assert_eq!(version, 1, "{name}");

        let stream = store.load(id).unwrap();
        assert_eq!(stream.len(), 1, "{name}");
        assert_eq!(stream[0].version, 1);
        assert_eq!(stream[0].aggregate_type, EntityKind::Person);
    }
}

#[test]
fn test_batch_gets_consecutive_versions_and_positions() {
    for (name, open) in stores() {
        let store = open();
        let id = Uuid::new_v4();
        store
            .append(id, EntityKind::Family, vec![pending("FamilyCreated")], ExpectedVersion::NoStream)
            .unwrap();
        let version = store
            .append(
                id,
                EntityKind::Family,
                vec![pending("ChildLinked"), pending("ChildLinked")],
                ExpectedVersion::Exact(1),
            )
            .unwrap();
        assert_eq!(version, 3, "{name}");

        let stream = store.load(id).unwrap();
        let versions: Vec<u64> = stream.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![1, 2, 3], "{name}");
        assert!(stream.windows(2).all(|w| w[0].position < w[1].position));
    }
}

#[test]
fn test_stale_expected_version_conflicts() {
    for (name, open) in stores() {
        let store = open();
        let id = Uuid::new_v4();
        store
            .append(id, EntityKind::Person, vec![pending("PersonCreated")], ExpectedVersion::NoStream)
            .unwrap();

        let err = store
            .append(id, EntityKind::Person, vec![pending("PersonUpdated")], ExpectedVersion::NoStream)
            .unwrap_err();
        assert!(
            matches!(err, Error::ConcurrencyConflict { expected: ExpectedVersion::NoStream, actual: 1 }),
            "{name}: {err}"
        );

        let err = store
            .append(id, EntityKind::Person, vec![pending("PersonUpdated")], ExpectedVersion::Exact(5))
            .unwrap_err();
        assert!(err.is_conflict(), "{name}: {err}");

        // A rejected append leaves no trace.
        assert_eq!(store.version(id).unwrap(), 1, "{name}");
    }
}

#[test]
fn test_empty_batch_is_rejected() {
    for (name, open) in stores() {
        let store = open();
        let err = store
            .append(Uuid::new_v4(), EntityKind::Person, vec![], ExpectedVersion::NoStream)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "{name}: {err}");
    }
}

#[test]
fn test_stream_kind_cannot_change() {
    for (name, open) in stores() {
        let store = open();
        let id = Uuid::new_v4();
        store
            .append(id, EntityKind::Person, vec![pending("PersonCreated")], ExpectedVersion::NoStream)
            .unwrap();
        let err = store
            .append(id, EntityKind::Source, vec![pending("SourceUpdated")], ExpectedVersion::Exact(1))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "{name}: {err}");
    }
}

#[test]
fn test_load_missing_stream() {
    for (name, open) in stores() {
        let store = open();
        let id = Uuid::new_v4();
        assert!(matches!(store.load(id), Err(Error::NoEvents(missing)) if missing == id), "{name}");
        assert_eq!(store.version(id).unwrap(), 0, "{name}");
    }
}

#[test]
fn test_load_all_is_in_position_order() {
    for (name, open) in stores() {
        let store = open();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        store
            .append(a, EntityKind::Person, vec![pending("PersonCreated")], ExpectedVersion::NoStream)
            .unwrap();
        store
            .append(b, EntityKind::Source, vec![pending("SourceCreated")], ExpectedVersion::NoStream)
            .unwrap();
        store
            .append(a, EntityKind::Person, vec![pending("PersonUpdated")], ExpectedVersion::Exact(1))
            .unwrap();

        let all = store.load_all().unwrap();
        let order: Vec<(Uuid, u64)> = all.iter().map(|e| (e.aggregate_id, e.version)).collect();
        assert_eq!(order, vec![(a, 1), (b, 1), (a, 2)], "{name}");
        assert!(all.windows(2).all(|w| w[0].position < w[1].position));
    }
}

#[test]
fn test_actor_and_meta_are_stored() {
    for (name, open) in stores() {
        let store = open();
        let id = Uuid::new_v4();
        let event = pending("PersonCreated")
            .with_actor("user-7")
            .with_meta(serde_json::json!({"correlation_id": "req-1"}));
        store
            .append(id, EntityKind::Person, vec![event], ExpectedVersion::NoStream)
            .unwrap();

        let stored = &store.load(id).unwrap()[0];
        assert_eq!(stored.actor.as_deref(), Some("user-7"), "{name}");
        assert_eq!(stored.meta.as_ref().unwrap()["correlation_id"], "req-1");
    }
}

// Two writers race on the same expected version: exactly one wins.
#[test]
fn test_concurrent_appends_one_winner() {
    for (name, open) in stores() {
        let store = open();
        let id = Uuid::new_v4();
        store
            .append(id, EntityKind::Person, vec![pending("PersonCreated")], ExpectedVersion::NoStream)
            .unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    store.append(
                        id,
                        EntityKind::Person,
                        vec![pending("PersonUpdated")],
                        ExpectedVersion::Exact(1),
                    )
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let wins = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(Error::ConcurrencyConflict { actual: 2, .. })))
            .count();
        assert_eq!((wins, conflicts), (1, 1), "{name}");
        assert_eq!(store.version(id).unwrap(), 2, "{name}");
    }
}

#[test]
fn test_different_aggregates_append_concurrently() {
    let store = Arc::new(MemoryEventStore::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let id = Uuid::new_v4();
                for v in 0..10u64 {
                    let expected = if v == 0 {
                        ExpectedVersion::NoStream
                    } else {
                        ExpectedVersion::Exact(v)
                    };
                    store
                        .append(id, EntityKind::Person, vec![pending("PersonUpdated")], expected)
                        .unwrap();
                }
                id
            })
        })
        .collect();
    for handle in handles {
        let id = handle.join().unwrap();
        assert_eq!(store.version(id).unwrap(), 10);
    }

    let all = store.load_all().unwrap();
    assert_eq!(all.len(), 80);
    let mut positions: Vec<u64> = all.iter().map(|e| e.position).collect();
    positions.dedup();
    assert_eq!(positions.len(), 80);
}

#[test]
fn test_file_store_survives_reopen() {
    let dir = tempdir().unwrap();
    let id = Uuid::new_v4();
    {
        let store = FileEventStore::open(dir.path()).unwrap();
        store
            .append(id, EntityKind::Person, vec![pending("PersonCreated")], ExpectedVersion::NoStream)
            .unwrap();
        store
            .append(id, EntityKind::Person, vec![pending("PersonUpdated")], ExpectedVersion::Exact(1))
            .unwrap();
    }

    let store = FileEventStore::open(dir.path()).unwrap();
    assert_eq!(store.version(id).unwrap(), 2);
    let tail = store.tail();
    assert_eq!(tail.position, 2);
    assert!(!tail.hash.is_empty());

    // Positions continue after the last stored event.
    let other = Uuid::new_v4();
    store
        .append(other, EntityKind::Source, vec![pending("SourceCreated")], ExpectedVersion::NoStream)
        .unwrap();
    assert_eq!(store.load(other).unwrap()[0].position, 3);
}
