#![allow(dead_code)]

use std::path::{Path, PathBuf};

use quill_db::{Datastore, DatastoreOptions};

/// A ready in-memory store.
pub fn memory_store() -> Datastore {
    Datastore::create(DatastoreOptions::default()).unwrap()
}

/// A loaded file-backed store in a fresh temp dir. Keep the `TempDir` alive
/// for the duration of the test.
pub fn file_store() -> (Datastore, tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.db");
    let store = open(&path);
    (store, dir, path)
}

/// Open (or reopen) a datastore on an existing path, loading it.
pub fn open(path: &Path) -> Datastore {
    Datastore::create(DatastoreOptions {
        filename: Some(path.to_path_buf()),
        autoload: true,
        ..Default::default()
    })
    .unwrap()
}

/// Pull the `_id` of a result document.
pub fn id_of(doc: &quill_model::Value) -> String {
    doc.get("_id").unwrap().as_str().unwrap().to_string()
}
