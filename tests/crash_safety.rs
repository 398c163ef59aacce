mod common;

use common::{ctx, person};
use kinfold::{EntityKind, Error, EventStore, FileEventStore, Genealogy, Person};
use std::fs;
use std::io::Write;
use tempfile::tempdir;

/// Crash during append leaves a partial line at EOF.
/// Complete events before it must be intact, and the partial line is dropped.
#[test]
fn test_crash_during_append() {
    let dir = tempdir().unwrap();

    let john = {
        let tree = Genealogy::builder(dir.path()).open().unwrap();
        person(&tree, "John", "Smith")
    };

    // Partial line without trailing newline, as left by a crash mid-write.
    {
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join("events.jsonl"))
            .unwrap();
        write!(file, r#"{{"aggregate_id":"{}","type":"PersonUpd"#, john.id).unwrap();
    }

    let tree = Genealogy::builder(dir.path()).open().unwrap();
    let restored: Person = tree.get(john.id).unwrap();
    assert_eq!(restored.version, 1);

    // The torn bytes are gone, so new appends produce valid lines.
    let len_after_open = fs::metadata(dir.path().join("events.jsonl")).unwrap().len();
    assert_eq!(len_after_open, tree.events().tail().offset);

    person(&tree, "Mary", "Jones");
    drop(tree);
    let tree = Genealogy::builder(dir.path()).open().unwrap();
    assert_eq!(tree.events().load_all().unwrap().len(), 2);
}

/// A torn line can end inside a multibyte character; it is still torn.
#[test]
fn test_crash_mid_codepoint_is_truncated() {
    let dir = tempdir().unwrap();

    let jose = {
        let tree = Genealogy::builder(dir.path()).open().unwrap();
        person(&tree, "José", "Núñez")
    };

    {
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join("events.jsonl"))
            .unwrap();
        // First byte of the two-byte encoding of 'é'.
        file.write_all(b"{\"aggregate_id\":\"x\",\"data\":\"Jos\xC3").unwrap();
    }

    let tree = Genealogy::builder(dir.path()).open().unwrap();
    let restored: Person = tree.get(jose.id).unwrap();
    assert_eq!(restored.full_name(), "José Núñez");

    let len_after_open = fs::metadata(dir.path().join("events.jsonl")).unwrap().len();
    assert_eq!(len_after_open, tree.events().tail().offset);
}

/// Crash during snapshot write leaves a .tmp file, which is ignored.
#[test]
fn test_crash_during_snapshot_write() {
    let dir = tempdir().unwrap();
    let john = {
        let tree = Genealogy::builder(dir.path()).open().unwrap();
        person(&tree, "John", "Smith")
    };

    fs::write(
        dir.path().join("read_model.snapshot.json.tmp"),
        r#"{"tables": {}, "position": 99, "offset": 999, "hash": "bad"}"#,
    )
    .unwrap();

    let tree = Genealogy::builder(dir.path()).open().unwrap();
    let restored: Person = tree.get(john.id).unwrap();
    assert_eq!(restored.full_name(), "John Smith");
}

/// A complete line that fails to parse is corruption, not a torn write.
#[test]
fn test_corrupt_complete_line_fails_open() {
    let dir = tempdir().unwrap();
    {
        let tree = Genealogy::builder(dir.path()).open().unwrap();
        person(&tree, "John", "Smith");
    }
    {
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join("events.jsonl"))
            .unwrap();
        writeln!(file, "not json").unwrap();
    }

    let err = FileEventStore::open(dir.path()).unwrap_err();
    assert!(matches!(err, Error::Io(_) | Error::Serialization(_)), "{err}");
}

/// Committed events survive a restart and the read model is rebuilt.
#[test]
fn test_reopen_rebuilds_read_model() {
    let dir = tempdir().unwrap();
    let (john, mary) = {
        let tree = Genealogy::builder(dir.path()).snapshots(false).open().unwrap();
        let john = person(&tree, "John", "Smith");
        let mary = person(&tree, "Mary", "Jones");
        tree.delete_person(&ctx(), mary.id, mary.version).unwrap();
        (john, mary)
    };

    let tree = Genealogy::builder(dir.path()).snapshots(false).open().unwrap();
    assert!(tree.get::<Person>(john.id).is_ok());
    assert!(tree.get::<Person>(mary.id).is_err());
    assert_eq!(tree.version(mary.id).unwrap(), 2);

    let history = tree
        .entity_history(EntityKind::Person, mary.id, 10, 0)
        .unwrap();
    assert_eq!(history.total, 2);
}
