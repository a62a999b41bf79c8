mod common;
use common::*;

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use quill_db::{Datastore, DatastoreOptions};
use quill_model::doc;

// ── Operation ordering tests ────────────────────────────────────

#[test]
fn operations_submitted_before_load_run_after_it() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.db");
    fs::write(&path, "{\"_id\":\"seed\",\"n\":1}\n").unwrap();

    let store = Arc::new(
        Datastore::create(DatastoreOptions {
            filename: Some(path.clone()),
            ..Default::default()
        })
        .unwrap(),
    );

    let background = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            store.insert(doc! { "_id": "later", "n": 2 }).unwrap();
        })
    };

    // the insert is parked: the file still holds only the seed record
    thread::sleep(Duration::from_millis(100));
    assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 1);

    store.load().unwrap();
    background.join().unwrap();

    assert_eq!(store.count(doc! {}).unwrap(), 2);
    assert!(store.find_one(doc! { "_id": "seed" }).unwrap().is_some());
    assert!(store.find_one(doc! { "_id": "later" }).unwrap().is_some());
}

#[test]
fn a_failed_operation_does_not_poison_the_queue() {
    let store = memory_store();
    store.insert(doc! { "_id": "a" }).unwrap();
    assert!(store.insert(doc! { "_id": "a" }).is_err());
    store.insert(doc! { "_id": "b" }).unwrap();
    assert_eq!(store.count(doc! {}).unwrap(), 2);
}

#[test]
fn effects_are_observed_in_submission_order() {
    let store = Arc::new(memory_store());
    let mut handles = Vec::new();
    for i in 0..16 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            store.insert(doc! { "n": (i as f64) }).unwrap();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(store.count(doc! {}).unwrap(), 16);
}

#[test]
fn durable_before_callback() {
    // a successful insert implies the record is on disk
    let (store, _dir, path) = file_store();
    store.insert(doc! { "_id": "a", "n": 1 }).unwrap();
    let raw = fs::read_to_string(&path).unwrap();
    assert!(raw.contains("\"_id\":\"a\""));
}

#[test]
fn autocompaction_compacts_in_the_background() {
    let (store, _dir, path) = file_store();
    store.insert(doc! { "_id": "a", "n": 1 }).unwrap();
    store.insert(doc! { "_id": "a2", "n": 1 }).unwrap();
    store
        .remove(doc! { "_id": "a2" }, Default::default())
        .unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 3);

    // the requested interval is clamped up to 5s, so wait past that
    store.set_autocompaction_interval(Duration::from_millis(10));
    thread::sleep(Duration::from_millis(5700));
    store.stop_autocompaction();

    assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 1);
}
