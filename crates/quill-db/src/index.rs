use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::Arc;

use quill_model::{Object, Value, compare_values, get_dot_value, serialize};

use crate::error::DbError;

/// Ordered tree key: the projected value of the indexed field, `None` when
/// the document doesn't carry the field (the shared "undefined" slot of a
/// non-sparse index).
#[derive(Debug, Clone)]
pub(crate) struct IndexKey(pub(crate) Option<Value>);

impl PartialEq for IndexKey {
    fn eq(&self, other: &IndexKey) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &IndexKey) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &IndexKey) -> Ordering {
        compare_values(self.0.as_ref(), other.0.as_ref())
    }
}

/// One secondary (or primary) index: an ordered tree from projected field
/// value to the set of documents holding that value.
///
/// Documents are shared with every other index through `Arc`; node membership
/// is by pointer identity. When the projected value is an array the document
/// is inserted once per distinct element and unique constraints apply per
/// element.
pub(crate) struct Index {
    field_name: String,
    unique: bool,
    sparse: bool,
    tree: BTreeMap<IndexKey, Vec<Arc<Value>>>,
}

impl Index {
    pub fn new(field_name: impl Into<String>, unique: bool, sparse: bool) -> Index {
        Index {
            field_name: field_name.into(),
            unique,
            sparse,
            tree: BTreeMap::new(),
        }
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn unique(&self) -> bool {
        self.unique
    }

    pub fn sparse(&self) -> bool {
        self.sparse
    }

    /// Drop all entries, keeping the definition.
    pub fn reset(&mut self) {
        self.tree.clear();
    }

    /// Index a document. All-or-nothing: an array-valued key that fails a
    /// unique constraint mid-way removes the elements inserted before it.
    pub fn insert(&mut self, doc: &Arc<Value>) -> Result<(), DbError> {
        let key = get_dot_value(doc, &self.field_name);
        if key.is_none() && self.sparse {
            return Ok(());
        }
        match key {
            Some(Value::Array(elements)) => self.insert_array(doc, &elements),
            key => self.insert_at(IndexKey(key), doc),
        }
    }

    fn insert_array(&mut self, doc: &Arc<Value>, elements: &[Value]) -> Result<(), DbError> {
        let distinct = distinct_elements(elements);
        let mut inserted = 0;
        let mut failure = None;
        for element in &distinct {
            match self.insert_at(IndexKey(Some((*element).clone())), doc) {
                Ok(()) => inserted += 1,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        if let Some(e) = failure {
            for element in &distinct[..inserted] {
                self.remove_at(&IndexKey(Some((*element).clone())), doc);
            }
            return Err(e);
        }
        Ok(())
    }

    fn insert_at(&mut self, key: IndexKey, doc: &Arc<Value>) -> Result<(), DbError> {
        if self.unique {
            if let Some(node) = self.tree.get(&key) {
                if !node.is_empty() {
                    return Err(DbError::UniqueViolation {
                        field: self.field_name.clone(),
                        key: display_key(key.0.as_ref()),
                    });
                }
            }
        }
        self.tree.entry(key).or_default().push(Arc::clone(doc));
        Ok(())
    }

    /// Un-index a document. Removal cannot fail; unknown documents are
    /// ignored.
    pub fn remove(&mut self, doc: &Arc<Value>) {
        let key = get_dot_value(doc, &self.field_name);
        if key.is_none() && self.sparse {
            return;
        }
        match key {
            Some(Value::Array(elements)) => {
                for element in distinct_elements(&elements) {
                    self.remove_at(&IndexKey(Some(element.clone())), doc);
                }
            }
            key => self.remove_at(&IndexKey(key), doc),
        }
    }

    fn remove_at(&mut self, key: &IndexKey, doc: &Arc<Value>) {
        let emptied = match self.tree.get_mut(key) {
            Some(node) => {
                node.retain(|member| !Arc::ptr_eq(member, doc));
                node.is_empty()
            }
            None => return,
        };
        if emptied {
            self.tree.remove(key);
        }
    }

    /// Replace `old` with `new`, restoring `old` if the new key conflicts.
    pub fn update(&mut self, old: &Arc<Value>, new: &Arc<Value>) -> Result<(), DbError> {
        self.remove(old);
        if let Err(e) = self.insert(new) {
            // old was valid before, reinsertion cannot conflict
            let _ = self.insert(old);
            return Err(e);
        }
        Ok(())
    }

    /// Bulk update with full rollback: either every pair is swapped or the
    /// index is byte-for-byte what it was.
    pub fn update_multiple(&mut self, pairs: &[(Arc<Value>, Arc<Value>)]) -> Result<(), DbError> {
        for (old, _) in pairs {
            self.remove(old);
        }
        let mut inserted = 0;
        let mut failure = None;
        for (_, new) in pairs {
            match self.insert(new) {
                Ok(()) => inserted += 1,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        if let Some(e) = failure {
            for (_, new) in &pairs[..inserted] {
                self.remove(new);
            }
            for (old, _) in pairs {
                let _ = self.insert(old);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Undo a successful [`update_multiple`](Index::update_multiple).
    pub fn revert_update_multiple(&mut self, pairs: &[(Arc<Value>, Arc<Value>)]) {
        for (_, new) in pairs {
            self.remove(new);
        }
        for (old, _) in pairs {
            let _ = self.insert(old);
        }
    }

    /// Point lookup; an array key is a disjunction, deduplicated by `_id`.
    pub fn get_matching(&self, key: &Value) -> Vec<Arc<Value>> {
        match key {
            Value::Array(values) => {
                let mut seen: HashSet<String> = HashSet::new();
                let mut result = Vec::new();
                for value in values {
                    for doc in self.get_matching(value) {
                        let id = doc.get("_id").and_then(Value::as_str);
                        if let Some(id) = id {
                            if !seen.insert(id.to_string()) {
                                continue;
                            }
                        }
                        result.push(doc);
                    }
                }
                result
            }
            _ => self
                .tree
                .get(&IndexKey(Some(key.clone())))
                .cloned()
                .unwrap_or_default(),
        }
    }

    /// Range lookup driven by `$lt` / `$lte` / `$gt` / `$gte` keys; other
    /// keys in the bounds object are ignored. Documents come back in key
    /// order.
    pub fn get_between_bounds(&self, bounds: &Object) -> Vec<Arc<Value>> {
        let mut lower: Bound<IndexKey> = Bound::Unbounded;
        let mut upper: Bound<IndexKey> = Bound::Unbounded;
        for (op, value) in bounds {
            match op.as_str() {
                "$gt" => lower = Bound::Excluded(IndexKey(Some(value.clone()))),
                "$gte" => lower = Bound::Included(IndexKey(Some(value.clone()))),
                "$lt" => upper = Bound::Excluded(IndexKey(Some(value.clone()))),
                "$lte" => upper = Bound::Included(IndexKey(Some(value.clone()))),
                _ => {}
            }
        }
        // an inverted or empty range must not reach BTreeMap::range
        if let (Bound::Included(a) | Bound::Excluded(a), Bound::Included(b) | Bound::Excluded(b)) =
            (&lower, &upper)
        {
            match a.cmp(b) {
                Ordering::Greater => return Vec::new(),
                Ordering::Equal
                    if matches!(lower, Bound::Excluded(_))
                        || matches!(upper, Bound::Excluded(_)) =>
                {
                    return Vec::new();
                }
                _ => {}
            }
        }
        self.tree
            .range((lower, upper))
            .flat_map(|(_, docs)| docs.iter().cloned())
            .collect()
    }

    /// Every indexed document, in key order.
    pub fn get_all(&self) -> Vec<Arc<Value>> {
        self.tree
            .values()
            .flat_map(|docs| docs.iter().cloned())
            .collect()
    }
}

/// Distinct elements of an array key. Values of different types never
/// compare equal, so comparison-based dedup keeps `0`, `false` and `"0"`
/// apart.
fn distinct_elements(elements: &[Value]) -> Vec<&Value> {
    let mut distinct: Vec<&Value> = Vec::new();
    for element in elements {
        let dup = distinct
            .iter()
            .any(|seen| compare_values(Some(seen), Some(element)) == Ordering::Equal);
        if !dup {
            distinct.push(element);
        }
    }
    distinct
}

fn display_key(key: Option<&Value>) -> String {
    match key {
        None => "undefined".to_string(),
        Some(value) => serialize(value).unwrap_or_else(|_| "<unserializable>".to_string()),
    }
}
