mod common;
use common::*;

use std::fs;

use quill_db::{Datastore, DatastoreOptions, DbError, SerializationHook};
use quill_model::doc;

// ── Load / fold tests ───────────────────────────────────────────

#[test]
fn load_folds_later_records_over_earlier_ones() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.db");
    fs::write(
        &path,
        "{\"_id\":\"1\",\"n\":1}\n\
         {\"_id\":\"2\",\"n\":2}\n\
         {\"_id\":\"1\",\"n\":10}\n\
         {\"$$deleted\":true,\"_id\":\"2\"}\n",
    )
    .unwrap();

    let store = open(&path);
    assert_eq!(store.count(doc! {}).unwrap(), 1);
    let found = store.find_one(doc! { "_id": "1" }).unwrap().unwrap();
    assert_eq!(found.get("n").unwrap().as_number(), Some(10.0));
}

#[test]
fn corruption_over_the_default_threshold_fails_the_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.db");
    fs::write(&path, "{\"_id\":\"1\"}\nthis line is garbage\n").unwrap();

    let err = Datastore::create(DatastoreOptions {
        filename: Some(path),
        autoload: true,
        ..Default::default()
    })
    .unwrap_err();
    assert!(matches!(err, DbError::Corruption { corrupt: 1, total: 2 }));
}

#[test]
fn raised_threshold_tolerates_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.db");
    fs::write(&path, "{\"_id\":\"1\"}\ngarbage\n{\"_id\":\"2\"}\n").unwrap();

    let store = Datastore::create(DatastoreOptions {
        filename: Some(path),
        autoload: true,
        corrupt_alert_threshold: Some(0.5),
        ..Default::default()
    })
    .unwrap();
    assert_eq!(store.count(doc! {}).unwrap(), 2);
}

#[test]
fn state_after_load_equals_the_logical_fold_of_operations() {
    let (store, _dir, path) = file_store();
    store.insert(doc! { "_id": "a", "n": 1 }).unwrap();
    store.insert(doc! { "_id": "b", "n": 2 }).unwrap();
    store
        .update(
            doc! { "_id": "a" },
            doc! { "$set": { "n": 5 } },
            Default::default(),
        )
        .unwrap();
    store
        .remove(doc! { "_id": "b" }, Default::default())
        .unwrap();
    store.insert(doc! { "_id": "c", "n": 3 }).unwrap();
    let before: Vec<_> = store
        .find(doc! {})
        .sort(doc! { "_id": 1 })
        .exec()
        .unwrap();
    drop(store);

    let reopened = open(&path);
    let after: Vec<_> = reopened
        .find(doc! {})
        .sort(doc! { "_id": 1 })
        .exec()
        .unwrap();
    assert_eq!(before, after);
}

// ── Crash recovery ──────────────────────────────────────────────

#[test]
fn a_companion_file_left_by_a_crash_is_promoted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.db");
    // crash happened after the companion was fully written but before the
    // rename: only data.db~ exists
    fs::write(dir.path().join("data.db~"), "{\"_id\":\"1\",\"n\":1}\n").unwrap();

    let store = open(&path);
    assert_eq!(store.count(doc! {}).unwrap(), 1);
    assert!(!dir.path().join("data.db~").exists());
}

#[test]
fn an_existing_datafile_wins_over_a_stale_companion() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.db");
    fs::write(&path, "{\"_id\":\"current\"}\n").unwrap();
    fs::write(dir.path().join("data.db~"), "{\"_id\":\"stale\"}\n").unwrap();

    let store = open(&path);
    assert!(store.find_one(doc! { "_id": "current" }).unwrap().is_some());
    assert!(store.find_one(doc! { "_id": "stale" }).unwrap().is_none());
}

// ── Serialization hooks ─────────────────────────────────────────

fn obfuscating_hooks() -> (SerializationHook, SerializationHook) {
    let after: SerializationHook = Box::new(|line| format!("sealed:{line}"));
    let before: SerializationHook =
        Box::new(|line| line.strip_prefix("sealed:").unwrap_or(line).to_string());
    (after, before)
}

#[test]
fn hooked_lines_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.db");
    {
        let (after, before) = obfuscating_hooks();
        let store = Datastore::create(DatastoreOptions {
            filename: Some(path.clone()),
            autoload: true,
            after_serialization: Some(after),
            before_deserialization: Some(before),
            ..Default::default()
        })
        .unwrap();
        store.insert(doc! { "_id": "a", "n": 1 }).unwrap();
    }

    // raw file lines carry the transform
    let raw = fs::read_to_string(&path).unwrap();
    assert!(raw.lines().all(|line| line.starts_with("sealed:")), "{raw}");

    // reopening with the hooks restores the documents
    let (after, before) = obfuscating_hooks();
    let store = Datastore::create(DatastoreOptions {
        filename: Some(path.clone()),
        autoload: true,
        after_serialization: Some(after),
        before_deserialization: Some(before),
        ..Default::default()
    })
    .unwrap();
    assert_eq!(store.count(doc! {}).unwrap(), 1);

    // reopening without them trips the corruption alarm
    let err = Datastore::create(DatastoreOptions {
        filename: Some(path),
        autoload: true,
        ..Default::default()
    })
    .unwrap_err();
    assert!(matches!(err, DbError::Corruption { .. }));
}

#[test]
fn one_sided_hooks_are_refused_at_construction() {
    let (after, _) = obfuscating_hooks();
    let err = Datastore::create(DatastoreOptions {
        filename: Some("unused.db".into()),
        after_serialization: Some(after),
        ..Default::default()
    })
    .unwrap_err();
    assert!(matches!(err, DbError::BadConfiguration(_)));
}

#[test]
fn non_inverse_hooks_are_refused_at_construction() {
    let after: SerializationHook = Box::new(|line| format!("a{line}"));
    let before: SerializationHook = Box::new(|line| format!("b{line}"));
    let err = Datastore::create(DatastoreOptions {
        filename: Some("unused.db".into()),
        after_serialization: Some(after),
        before_deserialization: Some(before),
        ..Default::default()
    })
    .unwrap_err();
    assert!(matches!(err, DbError::BadConfiguration(_)));
}

#[test]
fn tilde_filenames_are_refused() {
    let err = Datastore::create(DatastoreOptions {
        filename: Some("data.db~".into()),
        ..Default::default()
    })
    .unwrap_err();
    assert!(matches!(err, DbError::BadConfiguration(_)));
}

#[test]
fn in_memory_stores_never_touch_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ignored.db");
    let store = Datastore::create(DatastoreOptions {
        filename: Some(path.clone()),
        in_memory_only: true,
        ..Default::default()
    })
    .unwrap();
    store.insert(doc! { "_id": "a" }).unwrap();
    assert!(!path.exists());
}
