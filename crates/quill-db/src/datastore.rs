use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use quill_model::{Object, StringComparator, Value, check_document, deep_copy_strict, doc};
use quill_query::{QueryError, match_query, modify};
use rand::Rng;

use crate::autocompact::{self, AutocompactionHandle};
use crate::cursor::{Cursor, CursorSpec, exec_spec};
use crate::error::DbError;
use crate::executor::Executor;
use crate::index::Index;
use crate::persistence::{IndexOptions, Persistence, SerializationHook};

/// Configuration for [`Datastore::create`].
///
/// Without a `filename` (or with `in_memory_only`) nothing touches disk and
/// the store starts ready; otherwise operations queue up until
/// [`Datastore::load`] has replayed the datafile (`autoload` runs the load
/// during `create` and surfaces its error there).
#[derive(Default)]
pub struct DatastoreOptions {
    pub filename: Option<PathBuf>,
    pub in_memory_only: bool,
    /// Maintain `createdAt` / `updatedAt` on documents.
    pub timestamp_data: bool,
    pub autoload: bool,
    pub after_serialization: Option<SerializationHook>,
    pub before_deserialization: Option<SerializationHook>,
    /// Fraction in [0, 1] of unparseable datafile lines above which a load
    /// refuses to proceed. Default 0.1.
    pub corrupt_alert_threshold: Option<f64>,
    /// Custom string comparator, used only when sorting.
    pub compare_strings: Option<Arc<StringComparator>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    pub multi: bool,
    pub upsert: bool,
    pub return_updated_docs: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOptions {
    pub multi: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateResult {
    pub num_replaced: usize,
    /// The new document versions, when `return_updated_docs` was set or an
    /// upsert inserted.
    pub updated_docs: Option<Vec<Value>>,
    pub upserted: bool,
}

/// An embedded document datastore: documents live in the in-memory indexes,
/// every mutation appends to a single log file, and all operations run in
/// strict submission order.
///
/// A word on failure ordering: the in-memory mutation happens before the
/// append. If the append itself fails, the operation reports the I/O error
/// but the in-memory change stands — the indexes are not rolled back.
pub struct Datastore {
    core: Arc<Core>,
    autocompaction: Mutex<Option<AutocompactionHandle>>,
}

impl std::fmt::Debug for Datastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Datastore").finish_non_exhaustive()
    }
}

impl Datastore {
    pub(crate) fn core(&self) -> &Arc<Core> {
        &self.core
    }
}

pub(crate) struct Core {
    pub(crate) executor: Executor,
    pub(crate) state: Mutex<State>,
    pub(crate) timestamp_data: bool,
    pub(crate) compare_strings: Option<Arc<StringComparator>>,
    compaction_listeners: Mutex<Vec<Box<dyn Fn() + Send + Sync>>>,
}

pub(crate) struct State {
    pub(crate) indexes: IndexMap<String, Index>,
    /// TTL schedule: field name to `expireAfterSeconds`.
    pub(crate) ttl_indexes: IndexMap<String, f64>,
    pub(crate) persistence: Persistence,
}

impl Datastore {
    /// Build a datastore; synchronous configuration refusals (bad filename,
    /// one-sided or non-inverse hooks) surface here.
    pub fn create(options: DatastoreOptions) -> Result<Datastore, DbError> {
        let DatastoreOptions {
            filename,
            in_memory_only,
            timestamp_data,
            autoload,
            after_serialization,
            before_deserialization,
            corrupt_alert_threshold,
            compare_strings,
        } = options;
        let filename = filename.filter(|f| !f.as_os_str().is_empty() && !in_memory_only);
        let in_memory = filename.is_none();

        let persistence = Persistence::new(
            filename,
            corrupt_alert_threshold,
            after_serialization,
            before_deserialization,
        )?;

        let mut indexes = IndexMap::new();
        indexes.insert("_id".to_string(), Index::new("_id", true, false));

        let store = Datastore {
            core: Arc::new(Core {
                executor: Executor::new(in_memory),
                state: Mutex::new(State {
                    indexes,
                    ttl_indexes: IndexMap::new(),
                    persistence,
                }),
                timestamp_data,
                compare_strings,
                compaction_listeners: Mutex::new(Vec::new()),
            }),
            autocompaction: Mutex::new(None),
        };
        if autoload {
            store.load()?;
        }
        Ok(store)
    }

    /// Replay the datafile into the indexes, compact it, and open the
    /// operation queue. Queued operations stay parked if the load fails;
    /// a retry that succeeds releases them.
    pub fn load(&self) -> Result<(), DbError> {
        let core = Arc::clone(&self.core);
        self.core.executor.submit(true, move || {
            let mut state = core.state.lock().unwrap();
            let result = load_inner(&core, &mut state);
            if result.is_ok() {
                core.executor.set_ready();
            }
            result
        })
    }

    // ── Mutations ───────────────────────────────────────────────

    /// Insert one document; returns the stored version (with `_id` and
    /// timestamps filled in).
    pub fn insert(&self, doc: Value) -> Result<Value, DbError> {
        let core = Arc::clone(&self.core);
        self.core.executor.submit(false, move || {
            let mut state = core.state.lock().unwrap();
            let mut docs = insert_inner(&core, &mut state, vec![doc])?;
            Ok(docs.remove(0))
        })
    }

    /// Insert a batch atomically: one unique-constraint violation and none
    /// of the batch is indexed.
    pub fn insert_many(&self, docs: Vec<Value>) -> Result<Vec<Value>, DbError> {
        let core = Arc::clone(&self.core);
        self.core.executor.submit(false, move || {
            let mut state = core.state.lock().unwrap();
            insert_inner(&core, &mut state, docs)
        })
    }

    /// Update documents matching `query` — at most one unless
    /// `options.multi`. With `options.upsert`, a query with no match inserts
    /// a document materialized from the update (or from the query plus its
    /// modifiers).
    pub fn update(
        &self,
        query: Value,
        update: Value,
        options: UpdateOptions,
    ) -> Result<UpdateResult, DbError> {
        let core = Arc::clone(&self.core);
        self.core.executor.submit(false, move || {
            let mut state = core.state.lock().unwrap();
            update_inner(&core, &mut state, &query, &update, options)
        })
    }

    /// Remove documents matching `query` — at most one unless
    /// `options.multi`. Returns how many were removed.
    pub fn remove(&self, query: Value, options: RemoveOptions) -> Result<usize, DbError> {
        let core = Arc::clone(&self.core);
        self.core.executor.submit(false, move || {
            let mut state = core.state.lock().unwrap();
            remove_inner(&mut state, &query, options.multi)
        })
    }

    // ── Queries ─────────────────────────────────────────────────

    /// Start a query; chain `limit` / `skip` / `sort` / `projection` and
    /// finish with `exec`.
    pub fn find(&self, query: Value) -> Cursor<'_> {
        Cursor::new(self, query)
    }

    pub fn find_one(&self, query: Value) -> Result<Option<Value>, DbError> {
        let docs = self.find(query).limit(1).exec()?;
        Ok(docs.into_iter().next())
    }

    pub fn count(&self, query: Value) -> Result<usize, DbError> {
        let core = Arc::clone(&self.core);
        self.core.executor.submit(false, move || {
            let mut state = core.state.lock().unwrap();
            let spec = CursorSpec::new(query);
            Ok(exec_spec(&core, &mut state, &spec)?.len())
        })
    }

    /// Every live document, as deep copies.
    pub fn get_all_data(&self) -> Vec<Value> {
        let state = self.core.state.lock().unwrap();
        all_docs(&state)
            .iter()
            .map(|doc| (**doc).clone())
            .collect()
    }

    // ── Index management ────────────────────────────────────────

    /// Create an index, backfill it from the current documents, and record
    /// it in the datafile. A no-op if the field is already indexed.
    ///
    /// Like the original, index management does not go through the
    /// operation queue; it locks the store directly.
    pub fn ensure_index(&self, options: IndexOptions) -> Result<(), DbError> {
        if options.field_name.is_empty() {
            return Err(DbError::MissingFieldName);
        }
        let mut state = self.core.state.lock().unwrap();
        if state.indexes.contains_key(&options.field_name) {
            return Ok(());
        }

        let mut index = Index::new(options.field_name.clone(), options.unique, options.sparse);
        for doc in all_docs(&state) {
            index.insert(&doc)?;
        }
        if let Some(ttl) = options.expire_after_seconds {
            state.ttl_indexes.insert(options.field_name.clone(), ttl);
        }
        state.indexes.insert(options.field_name.clone(), index);

        let mut created = Object::new();
        created.insert(
            "fieldName".to_string(),
            Value::String(options.field_name.clone()),
        );
        created.insert("unique".to_string(), Value::Bool(options.unique));
        created.insert("sparse".to_string(), Value::Bool(options.sparse));
        if let Some(ttl) = options.expire_after_seconds {
            created.insert("expireAfterSeconds".to_string(), Value::Number(ttl));
        }
        let record = doc! { "$$indexCreated": (Value::Object(created)) };
        state.persistence.persist_new_state(&[record])
    }

    /// Drop an index and record the removal in the datafile.
    pub fn remove_index(&self, field_name: &str) -> Result<(), DbError> {
        let mut state = self.core.state.lock().unwrap();
        state.indexes.shift_remove(field_name);
        state.ttl_indexes.shift_remove(field_name);
        let record = doc! { "$$indexRemoved": (field_name) };
        state.persistence.persist_new_state(&[record])
    }

    // ── Compaction ──────────────────────────────────────────────

    /// Queue a full rewrite of the datafile.
    pub fn compact_datafile(&self) -> Result<(), DbError> {
        let core = Arc::clone(&self.core);
        self.core.executor.submit(false, move || {
            let mut state = core.state.lock().unwrap();
            compact_locked(&core, &mut state)
        })
    }

    /// Register a listener for `compaction.done`. Listeners run inline at
    /// the end of a compaction and must not call back into the datastore.
    pub fn on_compaction(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.core
            .compaction_listeners
            .lock()
            .unwrap()
            .push(Box::new(listener));
    }

    /// Compact periodically. Intervals under 5 seconds are clamped up.
    pub fn set_autocompaction_interval(&self, interval: Duration) {
        let interval = interval.max(Duration::from_secs(5));
        let mut slot = self.autocompaction.lock().unwrap();
        *slot = Some(autocompact::spawn(Arc::clone(&self.core), interval));
    }

    pub fn stop_autocompaction(&self) {
        self.autocompaction.lock().unwrap().take();
    }
}

// ── Internals ───────────────────────────────────────────────────

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

const ID_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// 16-character URL-safe random identifier.
fn uid(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

fn create_new_id(state: &State) -> String {
    loop {
        let id = uid(16);
        let taken = state
            .indexes
            .get("_id")
            .is_some_and(|index| !index.get_matching(&Value::String(id.clone())).is_empty());
        if !taken {
            return id;
        }
    }
}

fn all_docs(state: &State) -> Vec<Arc<Value>> {
    state
        .indexes
        .get("_id")
        .map(|index| index.get_all())
        .unwrap_or_default()
}

fn load_inner(core: &Core, state: &mut State) -> Result<(), DbError> {
    // Contents go, definitions stay: an index ensured before the load keeps
    // existing, refilled from the file below.
    for index in state.indexes.values_mut() {
        index.reset();
    }
    if !state.persistence.is_persistent() {
        return Ok(());
    }

    let loaded = state.persistence.load_database()?;
    for def in loaded.indexes {
        if def.field_name == "_id" {
            continue;
        }
        if let Some(ttl) = def.expire_after_seconds {
            state.ttl_indexes.insert(def.field_name.clone(), ttl);
        }
        state.indexes.insert(
            def.field_name.clone(),
            Index::new(def.field_name, def.unique, def.sparse),
        );
    }
    for doc in loaded.docs {
        add_to_indexes(state, &Arc::new(doc))?;
    }

    // Collapse the append history right away.
    compact_locked(core, state)
}

pub(crate) fn compact_locked(core: &Core, state: &mut State) -> Result<(), DbError> {
    if !state.persistence.is_persistent() {
        return Ok(());
    }
    let docs = all_docs(state);
    let defs: Vec<IndexOptions> = state
        .indexes
        .values()
        .filter(|index| index.field_name() != "_id")
        .map(|index| IndexOptions {
            field_name: index.field_name().to_string(),
            unique: index.unique(),
            sparse: index.sparse(),
            expire_after_seconds: None,
        })
        .collect();
    state.persistence.persist_cached_database(&docs, &defs)?;
    for listener in core.compaction_listeners.lock().unwrap().iter() {
        listener();
    }
    Ok(())
}

// ── Multi-index mutation with rollback ──────────────────────────

fn add_to_indexes(state: &mut State, doc: &Arc<Value>) -> Result<(), DbError> {
    let mut added = 0;
    let mut failure = None;
    for i in 0..state.indexes.len() {
        let index = match state.indexes.get_index_mut(i) {
            Some((_, index)) => index,
            None => break,
        };
        match index.insert(doc) {
            Ok(()) => added += 1,
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    if let Some(e) = failure {
        for i in 0..added {
            if let Some((_, index)) = state.indexes.get_index_mut(i) {
                index.remove(doc);
            }
        }
        return Err(e);
    }
    Ok(())
}

fn remove_from_indexes(state: &mut State, doc: &Arc<Value>) {
    for index in state.indexes.values_mut() {
        index.remove(doc);
    }
}

fn update_indexes(state: &mut State, pairs: &[(Arc<Value>, Arc<Value>)]) -> Result<(), DbError> {
    let mut updated = 0;
    let mut failure = None;
    for i in 0..state.indexes.len() {
        let index = match state.indexes.get_index_mut(i) {
            Some((_, index)) => index,
            None => break,
        };
        match index.update_multiple(pairs) {
            Ok(()) => updated += 1,
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    if let Some(e) = failure {
        for i in 0..updated {
            if let Some((_, index)) = state.indexes.get_index_mut(i) {
                index.revert_update_multiple(pairs);
            }
        }
        return Err(e);
    }
    Ok(())
}

// ── Candidate selection ─────────────────────────────────────────

fn is_point_value(value: &Value) -> bool {
    matches!(
        value,
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Date(_)
    )
}

const RANGE_OPERATORS: [&str; 4] = ["$lt", "$lte", "$gt", "$gte"];

fn raw_candidates(state: &State, query: &Value) -> Vec<Arc<Value>> {
    if let Some(clauses) = query.as_object() {
        // a primitive value on an indexed field: point lookup
        for (key, value) in clauses {
            if !is_point_value(value) {
                continue;
            }
            if let Some(index) = state.indexes.get(key) {
                return index.get_matching(value);
            }
        }
        // $in on an indexed field: disjunctive lookup
        for (key, value) in clauses {
            let Some(candidates) = value.get("$in") else {
                continue;
            };
            if let Some(index) = state.indexes.get(key) {
                return index.get_matching(candidates);
            }
        }
        // a comparison object on an indexed field: range lookup
        for (key, value) in clauses {
            let Some(ops) = value.as_object() else {
                continue;
            };
            if !RANGE_OPERATORS.iter().any(|op| ops.contains_key(*op)) {
                continue;
            }
            if let Some(index) = state.indexes.get(key) {
                return index.get_between_bounds(ops);
            }
        }
    }
    all_docs(state)
}

/// Index-assisted pre-filtering, then TTL eviction: expired documents are
/// removed through the standard internal remove path (tombstone and all)
/// before the survivors are handed to `match`.
pub(crate) fn get_candidates(
    state: &mut State,
    query: &Value,
    dont_expire_stale_docs: bool,
) -> Result<Vec<Arc<Value>>, DbError> {
    let candidates = raw_candidates(state, query);
    if dont_expire_stale_docs || state.ttl_indexes.is_empty() {
        return Ok(candidates);
    }

    let now = now_millis();
    let mut valid = Vec::with_capacity(candidates.len());
    let mut expired_ids = Vec::new();
    for doc in candidates {
        let mut expired = false;
        for (field, seconds) in &state.ttl_indexes {
            if let Some(Value::Date(ms)) = doc.get(field) {
                if now > ms + (seconds * 1000.0) as i64 {
                    expired = true;
                    break;
                }
            }
        }
        if expired {
            if let Some(id) = doc.get("_id") {
                expired_ids.push(id.clone());
            }
        } else {
            valid.push(doc);
        }
    }
    for id in expired_ids {
        remove_inner(state, &doc! { "_id": (id) }, false)?;
    }
    Ok(valid)
}

// ── Operation bodies ────────────────────────────────────────────

fn prepare_document(core: &Core, state: &State, mut doc: Value) -> Result<Value, DbError> {
    {
        let fields = doc.as_object_mut().ok_or_else(|| {
            DbError::Query(QueryError::InvalidQuery("document must be an object".into()))
        })?;
        match fields.get("_id") {
            None => {
                fields.insert("_id".to_string(), Value::String(create_new_id(state)));
            }
            Some(Value::String(_)) => {}
            Some(_) => {
                return Err(DbError::Query(QueryError::InvalidQuery(
                    "_id must be a string".into(),
                )));
            }
        }
        if core.timestamp_data {
            let now = Value::Date(now_millis());
            if !fields.contains_key("createdAt") {
                fields.insert("createdAt".to_string(), now.clone());
            }
            if !fields.contains_key("updatedAt") {
                fields.insert("updatedAt".to_string(), now);
            }
        }
    }
    check_document(&doc)?;
    Ok(doc)
}

pub(crate) fn insert_inner(
    core: &Core,
    state: &mut State,
    docs: Vec<Value>,
) -> Result<Vec<Value>, DbError> {
    let mut prepared = Vec::with_capacity(docs.len());
    for doc in docs {
        prepared.push(Arc::new(prepare_document(core, state, doc)?));
    }

    let mut added = 0;
    let mut failure = None;
    for doc in &prepared {
        match add_to_indexes(state, doc) {
            Ok(()) => added += 1,
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    if let Some(e) = failure {
        for doc in &prepared[..added] {
            remove_from_indexes(state, doc);
        }
        return Err(e);
    }

    let records: Vec<Value> = prepared.iter().map(|doc| (**doc).clone()).collect();
    state.persistence.persist_new_state(&records)?;
    Ok(records)
}

fn update_inner(
    core: &Core,
    state: &mut State,
    query: &Value,
    update: &Value,
    options: UpdateOptions,
) -> Result<UpdateResult, DbError> {
    if options.upsert {
        let probe = CursorSpec::new(query.clone()).with_limit(1);
        if exec_spec(core, state, &probe)?.is_empty() {
            // No match: materialize the document to insert. An update that
            // passes key validation has no modifiers and inserts as-is;
            // otherwise it is a modifier set applied to a strict copy of
            // the query.
            let to_insert = if check_document(update).is_ok() {
                update.clone()
            } else {
                modify(&deep_copy_strict(query), update)?
            };
            let inserted = insert_inner(core, state, vec![to_insert])?;
            return Ok(UpdateResult {
                num_replaced: 1,
                updated_docs: Some(inserted),
                upserted: true,
            });
        }
    }

    let candidates = get_candidates(state, query, false)?;
    let now = now_millis();
    let mut pairs: Vec<(Arc<Value>, Arc<Value>)> = Vec::new();
    for candidate in candidates {
        if !match_query(&candidate, query)? || (!options.multi && !pairs.is_empty()) {
            continue;
        }
        let mut modified = modify(&candidate, update)?;
        if core.timestamp_data {
            if let Some(fields) = modified.as_object_mut() {
                match candidate.get("createdAt") {
                    Some(created_at) => {
                        fields.insert("createdAt".to_string(), created_at.clone());
                    }
                    None => {
                        fields.shift_remove("createdAt");
                    }
                }
                fields.insert("updatedAt".to_string(), Value::Date(now));
            }
        }
        pairs.push((candidate, Arc::new(modified)));
    }

    update_indexes(state, &pairs)?;

    let updated: Vec<Value> = pairs.iter().map(|(_, new)| (**new).clone()).collect();
    state.persistence.persist_new_state(&updated)?;
    Ok(UpdateResult {
        num_replaced: pairs.len(),
        updated_docs: options.return_updated_docs.then_some(updated),
        upserted: false,
    })
}

pub(crate) fn remove_inner(
    state: &mut State,
    query: &Value,
    multi: bool,
) -> Result<usize, DbError> {
    // Candidates come back un-evicted: removal is the same operation TTL
    // eviction would perform.
    let candidates = get_candidates(state, query, true)?;
    let mut removed = 0usize;
    let mut tombstones = Vec::new();
    for doc in candidates {
        if match_query(&doc, query)? && (multi || removed == 0) {
            removed += 1;
            if let Some(id) = doc.get("_id") {
                tombstones.push(doc! { "$$deleted": true, "_id": (id.clone()) });
            }
            remove_from_indexes(state, &doc);
        }
    }
    state.persistence.persist_new_state(&tombstones)?;
    Ok(removed)
}

/// Composite sort comparator over dot-values, honoring `compare_strings`.
pub(crate) fn sort_comparator(
    core: &Core,
    criteria: &[quill_query::Sort],
    a: &Value,
    b: &Value,
) -> Ordering {
    for criterion in criteria {
        let av = quill_model::get_dot_value(a, &criterion.field);
        let bv = quill_model::get_dot_value(b, &criterion.field);
        let ord = quill_model::compare_values_with(
            av.as_ref(),
            bv.as_ref(),
            core.compare_strings.as_deref(),
        );
        let ord = match criterion.direction {
            quill_query::SortDirection::Asc => ord,
            quill_query::SortDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
