use std::sync::Arc;

use quill_model::Value;
use quill_query::{match_query, parse_sort, project};

use crate::datastore::{Core, Datastore, State, get_candidates, sort_comparator};
use crate::error::DbError;

/// A prepared query: fluent `limit` / `skip` / `sort` / `projection`
/// builders, executed with [`exec`](Cursor::exec) through the operation
/// queue. Results are deep copies — mutating them cannot touch indexed
/// state.
pub struct Cursor<'db> {
    store: &'db Datastore,
    spec: CursorSpec,
}

impl<'db> Cursor<'db> {
    pub(crate) fn new(store: &'db Datastore, query: Value) -> Cursor<'db> {
        Cursor {
            store,
            spec: CursorSpec::new(query),
        }
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.spec.limit = Some(n);
        self
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.spec.skip = n;
        self
    }

    /// Sort spec: `{ field: 1 | -1, .. }`, applied in key order.
    pub fn sort(mut self, spec: Value) -> Self {
        self.spec.sort = Some(spec);
        self
    }

    /// Projection: all-1 picks or all-0 omits, `_id` independently
    /// controllable.
    pub fn projection(mut self, projection: Value) -> Self {
        self.spec.projection = Some(projection);
        self
    }

    pub fn exec(self) -> Result<Vec<Value>, DbError> {
        let core = Arc::clone(self.store.core());
        let spec = self.spec;
        core.executor.submit(false, || {
            let mut state = core.state.lock().unwrap();
            exec_spec(&core, &mut state, &spec)
        })
    }
}

pub(crate) struct CursorSpec {
    pub query: Value,
    pub limit: Option<usize>,
    pub skip: usize,
    pub sort: Option<Value>,
    pub projection: Option<Value>,
}

impl CursorSpec {
    pub fn new(query: Value) -> CursorSpec {
        CursorSpec {
            query,
            limit: None,
            skip: 0,
            sort: None,
            projection: None,
        }
    }

    pub fn with_limit(mut self, n: usize) -> CursorSpec {
        self.limit = Some(n);
        self
    }
}

/// Run a query: candidates, `match`, then — without a sort — skip and limit
/// during accumulation, or — with one — a full sort before slicing. The
/// projection runs last.
pub(crate) fn exec_spec(
    core: &Core,
    state: &mut State,
    spec: &CursorSpec,
) -> Result<Vec<Value>, DbError> {
    let candidates = get_candidates(state, &spec.query, false)?;

    let mut selected: Vec<Arc<Value>> = Vec::new();
    if spec.sort.is_none() {
        let mut skipped = 0;
        for candidate in candidates {
            if !match_query(&candidate, &spec.query)? {
                continue;
            }
            if skipped < spec.skip {
                skipped += 1;
                continue;
            }
            if spec.limit.is_some_and(|limit| selected.len() >= limit) {
                break;
            }
            selected.push(candidate);
        }
    } else {
        for candidate in candidates {
            if match_query(&candidate, &spec.query)? {
                selected.push(candidate);
            }
        }
    }

    if let Some(sort_spec) = &spec.sort {
        let criteria = parse_sort(sort_spec)?;
        selected.sort_by(|a, b| sort_comparator(core, &criteria, a, b));
        let end = spec
            .limit
            .map(|limit| (spec.skip + limit).min(selected.len()))
            .unwrap_or(selected.len());
        let start = spec.skip.min(end);
        selected = selected[start..end].to_vec();
    }

    let mut results = Vec::with_capacity(selected.len());
    for doc in selected {
        let projected = match &spec.projection {
            Some(projection) => project(&doc, projection)?,
            None => (*doc).clone(),
        };
        results.push(projected);
    }
    Ok(results)
}
