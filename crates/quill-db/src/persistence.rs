use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use quill_model::{Value, deserialize, doc, serialize};
use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::error::DbError;
use crate::storage;

/// A line transform applied after serialization / before deserialization,
/// e.g. for encryption. The two hooks must be inverses of one another.
pub type SerializationHook = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Options for [`Datastore::ensure_index`](crate::Datastore::ensure_index),
/// also the parsed form of a `$$indexCreated` record.
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    pub field_name: String,
    pub unique: bool,
    pub sparse: bool,
    /// Declares a TTL index: documents whose field holds a date expire this
    /// many seconds past it.
    pub expire_after_seconds: Option<f64>,
}

impl IndexOptions {
    pub fn field(field_name: impl Into<String>) -> IndexOptions {
        IndexOptions {
            field_name: field_name.into(),
            ..IndexOptions::default()
        }
    }
}

/// The state of a datafile after folding it: live documents in first-insert
/// order and the surviving index definitions.
pub(crate) struct LoadedDatabase {
    pub docs: Vec<Value>,
    pub indexes: Vec<IndexOptions>,
}

/// Owns the datafile: the append path, the load-time fold and the crash-safe
/// full rewrite.
pub(crate) struct Persistence {
    filename: Option<PathBuf>,
    corrupt_alert_threshold: f64,
    after_serialization: Option<SerializationHook>,
    before_deserialization: Option<SerializationHook>,
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence").finish_non_exhaustive()
    }
}

impl Persistence {
    /// Validate the configuration and build the persistence layer.
    ///
    /// Refuses filenames ending in `~` (reserved for the crash-safe
    /// companion), a one-sided hook pair, and hook pairs that fail any of
    /// 300 random round-trips.
    pub fn new(
        filename: Option<PathBuf>,
        corrupt_alert_threshold: Option<f64>,
        after_serialization: Option<SerializationHook>,
        before_deserialization: Option<SerializationHook>,
    ) -> Result<Persistence, DbError> {
        if let Some(filename) = &filename {
            if filename.as_os_str().to_string_lossy().ends_with('~') {
                return Err(DbError::BadConfiguration(
                    "the datafile name can't end with a ~, which is reserved for crash safe backup files"
                        .to_string(),
                ));
            }
        }
        match (&after_serialization, &before_deserialization) {
            (Some(_), None) => {
                return Err(DbError::BadConfiguration(
                    "serialization hook defined but deserialization hook undefined, cautiously refusing to start to prevent data loss"
                        .to_string(),
                ));
            }
            (None, Some(_)) => {
                return Err(DbError::BadConfiguration(
                    "deserialization hook defined but serialization hook undefined, cautiously refusing to start to prevent data loss"
                        .to_string(),
                ));
            }
            (Some(after), Some(before)) => {
                // A probabilistic guard, not a proof: 10 samples of every
                // length from 1 to 30.
                let mut rng = rand::thread_rng();
                for length in 1..=30 {
                    for _ in 0..10 {
                        let sample: String = (&mut rng)
                            .sample_iter(&Alphanumeric)
                            .take(length)
                            .map(char::from)
                            .collect();
                        if before(&after(&sample)) != sample {
                            return Err(DbError::BadConfiguration(
                                "serialization hook is not the inverse of the deserialization hook, cautiously refusing to start to prevent data loss"
                                    .to_string(),
                            ));
                        }
                    }
                }
            }
            (None, None) => {}
        }
        Ok(Persistence {
            filename,
            corrupt_alert_threshold: corrupt_alert_threshold.unwrap_or(0.1),
            after_serialization,
            before_deserialization,
        })
    }

    pub fn is_persistent(&self) -> bool {
        self.filename.is_some()
    }

    fn encode_line(&self, record: &Value) -> Result<String, DbError> {
        let line = serialize(record)?;
        Ok(match &self.after_serialization {
            Some(hook) => hook(&line),
            None => line,
        })
    }

    fn decode_line(&self, line: &str) -> Result<Value, DbError> {
        let line = match &self.before_deserialization {
            Some(hook) => hook(line),
            None => line.to_string(),
        };
        Ok(deserialize(&line)?)
    }

    /// Append one serialized line per record, in a single write. No-op for
    /// in-memory datastores.
    pub fn persist_new_state(&self, records: &[Value]) -> Result<(), DbError> {
        let Some(filename) = &self.filename else {
            return Ok(());
        };
        let mut to_persist = String::new();
        for record in records {
            to_persist.push_str(&self.encode_line(record)?);
            to_persist.push('\n');
        }
        if to_persist.is_empty() {
            return Ok(());
        }
        storage::append_to_file(filename, &to_persist)?;
        Ok(())
    }

    /// Read the datafile (after integrity recovery) and fold it into the
    /// current document set and index definitions.
    pub fn load_database(&self) -> Result<LoadedDatabase, DbError> {
        let Some(filename) = &self.filename else {
            return Ok(LoadedDatabase {
                docs: Vec::new(),
                indexes: Vec::new(),
            });
        };
        if let Some(parent) = filename.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        storage::ensure_datafile_integrity(filename)?;
        let raw = fs::read_to_string(filename)?;
        self.treat_raw_data(&raw)
    }

    /// Fold datafile lines: later document versions override earlier ones by
    /// `_id`, tombstones delete, index records add and remove definitions.
    /// Unparseable lines count toward the corruption ratio; the conventional
    /// trailing empty line does not.
    fn treat_raw_data(&self, raw: &str) -> Result<LoadedDatabase, DbError> {
        let mut lines: Vec<&str> = raw.split('\n').collect();
        if lines.last().is_some_and(|line| line.is_empty()) {
            lines.pop();
        }

        let mut docs: indexmap::IndexMap<String, Value> = indexmap::IndexMap::new();
        let mut indexes: indexmap::IndexMap<String, IndexOptions> = indexmap::IndexMap::new();
        let mut corrupt = 0usize;

        for line in &lines {
            let record = match self.decode_line(line) {
                Ok(record) => record,
                Err(_) => {
                    corrupt += 1;
                    continue;
                }
            };
            if let Some(id) = record.get("_id").and_then(Value::as_str) {
                if record.get("$$deleted").and_then(Value::as_bool) == Some(true) {
                    docs.shift_remove(id);
                } else {
                    docs.insert(id.to_string(), record);
                }
            } else if let Some(created) = record.get("$$indexCreated") {
                if let Some(field_name) = created.get("fieldName").and_then(Value::as_str) {
                    indexes.insert(
                        field_name.to_string(),
                        IndexOptions {
                            field_name: field_name.to_string(),
                            unique: created.get("unique").and_then(Value::as_bool).unwrap_or(false),
                            sparse: created.get("sparse").and_then(Value::as_bool).unwrap_or(false),
                            expire_after_seconds: created
                                .get("expireAfterSeconds")
                                .and_then(Value::as_number),
                        },
                    );
                }
            } else if let Some(Value::String(removed)) = record.get("$$indexRemoved") {
                indexes.shift_remove(removed);
            }
        }

        let total = lines.len();
        if total > 0 && corrupt as f64 / total as f64 > self.corrupt_alert_threshold {
            return Err(DbError::Corruption { corrupt, total });
        }

        Ok(LoadedDatabase {
            docs: docs.into_values().collect(),
            indexes: indexes.into_values().collect(),
        })
    }

    /// Crash-safe full rewrite: every live document plus every non-`_id`
    /// index definition, collapsing the append history.
    pub fn persist_cached_database(
        &self,
        docs: &[Arc<Value>],
        index_defs: &[IndexOptions],
    ) -> Result<(), DbError> {
        let Some(filename) = &self.filename else {
            return Ok(());
        };
        let mut to_persist = String::new();
        for document in docs {
            to_persist.push_str(&self.encode_line(document)?);
            to_persist.push('\n');
        }
        for def in index_defs {
            let record = doc! { "$$indexCreated": {
                "fieldName": (def.field_name.clone()),
                "unique": (def.unique),
                "sparse": (def.sparse)
            } };
            to_persist.push_str(&self.encode_line(&record)?);
            to_persist.push('\n');
        }
        storage::crash_safe_write_file(filename, &to_persist)?;
        Ok(())
    }
}
