mod common;
use common::*;

use quill_db::{DatastoreOptions, Datastore, IndexOptions};
use quill_model::{Value, doc};

// ── Insert tests ────────────────────────────────────────────────

#[test]
fn insert_and_find_one() {
    let store = memory_store();
    store
        .insert(doc! { "_id": "acct-1", "name": "Acme", "revenue": 50000.0 })
        .unwrap();

    let found = store.find_one(doc! { "_id": "acct-1" }).unwrap().unwrap();
    assert_eq!(found.get("name").unwrap().as_str(), Some("Acme"));
    assert_eq!(found.get("revenue").unwrap().as_number(), Some(50000.0));
}

#[test]
fn insert_generates_a_16_char_id() {
    let store = memory_store();
    let inserted = store.insert(doc! { "name": "No ID" }).unwrap();
    let id = id_of(&inserted);
    assert_eq!(id.len(), 16);
    assert!(id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));

    let found = store.find_one(doc! { "_id": (id.as_str()) }).unwrap();
    assert!(found.is_some());
}

#[test]
fn duplicate_id_is_rejected() {
    let store = memory_store();
    store.insert(doc! { "_id": "a", "n": 1 }).unwrap();
    let err = store.insert(doc! { "_id": "a", "n": 2 }).unwrap_err();
    assert!(err.to_string().contains("unique constraint"));

    // the first version is untouched
    let found = store.find_one(doc! { "_id": "a" }).unwrap().unwrap();
    assert_eq!(found.get("n").unwrap().as_number(), Some(1.0));
}

#[test]
fn insert_many_is_atomic_across_indexes() {
    let store = memory_store();
    store
        .ensure_index(IndexOptions {
            field_name: "x".to_string(),
            unique: true,
            ..Default::default()
        })
        .unwrap();

    let err = store
        .insert_many(vec![
            doc! { "_id": "1", "x": 1 },
            doc! { "_id": "2", "x": 1 },
        ])
        .unwrap_err();
    assert!(err.to_string().contains("unique constraint"));

    // nothing from the batch survived
    assert_eq!(store.count(doc! {}).unwrap(), 0);
}

#[test]
fn reserved_and_dotted_field_names_are_rejected() {
    let store = memory_store();
    assert!(store.insert(doc! { "$bad": 1 }).is_err());
    assert!(store.insert(doc! { "a.b": 1 }).is_err());
    assert!(store.insert(doc! { "nested": { "$set": 1 } }).is_err());
    assert_eq!(store.count(doc! {}).unwrap(), 0);
}

#[test]
fn non_object_documents_are_rejected() {
    let store = memory_store();
    assert!(store.insert(Value::Number(5.0)).is_err());
    assert!(store.insert(Value::Array(vec![])).is_err());
}

#[test]
fn array_fields_match_any_element() {
    let store = memory_store();
    store.insert(doc! { "a": [1, 2, 3] }).unwrap();
    let found = store.find(doc! { "a": 2 }).exec().unwrap();
    assert_eq!(found.len(), 1);
    let found = store.find(doc! { "a": 4 }).exec().unwrap();
    assert_eq!(found.len(), 0);
}

#[test]
fn timestamp_data_sets_created_and_updated_at() {
    let store = Datastore::create(DatastoreOptions {
        timestamp_data: true,
        ..Default::default()
    })
    .unwrap();
    let inserted = store.insert(doc! { "a": 1 }).unwrap();
    let created = inserted.get("createdAt").unwrap().as_date().unwrap();
    let updated = inserted.get("updatedAt").unwrap().as_date().unwrap();
    assert_eq!(created, updated);

    // user-provided timestamps win
    let inserted = store
        .insert(doc! { "a": 2, "createdAt": (Value::Date(42)) })
        .unwrap();
    assert_eq!(inserted.get("createdAt").unwrap().as_date(), Some(42));
}

#[test]
fn returned_documents_are_copies() {
    let store = memory_store();
    store.insert(doc! { "_id": "a", "nested": { "n": 1 } }).unwrap();
    let mut fetched = store.find_one(doc! { "_id": "a" }).unwrap().unwrap();
    if let Some(fields) = fetched.as_object_mut() {
        fields.insert("mutated".to_string(), Value::Bool(true));
    }
    let fresh = store.find_one(doc! { "_id": "a" }).unwrap().unwrap();
    assert!(fresh.get("mutated").is_none());
}
