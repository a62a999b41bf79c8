use quill_model::{Object, Value, get_dot_value};

use crate::error::QueryError;
use crate::modifier::modify;

/// Apply a projection to a document.
///
/// `{}` keeps the whole document. Otherwise the projection is all-1 (pick the
/// named fields) or all-0 (omit them); `_id` is controllable independently
/// and kept by default. Picks materialize through the `$set` machinery so
/// dot-paths rebuild their nested shape; omits go through `$unset`.
pub fn project(doc: &Value, projection: &Value) -> Result<Value, QueryError> {
    let spec = projection
        .as_object()
        .ok_or_else(|| QueryError::Projection("projection must be an object".into()))?;
    if spec.is_empty() {
        return Ok(doc.clone());
    }

    let keep_id = match spec.get("_id") {
        Some(flag) => projection_flag("_id", flag)? == 1,
        None => true,
    };

    let mut action: Option<u8> = None;
    let mut keys: Vec<&String> = Vec::new();
    for (key, flag) in spec {
        if key == "_id" {
            continue;
        }
        let flag = projection_flag(key, flag)?;
        match action {
            None => action = Some(flag),
            Some(current) if current != flag => {
                return Err(QueryError::Projection(
                    "cannot both keep and omit fields except for _id".into(),
                ));
            }
            Some(_) => {}
        }
        keys.push(key);
    }

    let mut projected = match action {
        // Only _id was specified.
        None => doc.clone(),
        Some(1) => {
            let mut picks = Object::new();
            for key in keys {
                if let Some(value) = get_dot_value(doc, key) {
                    picks.insert(key.clone(), value);
                }
            }
            let mut update = Object::new();
            update.insert("$set".to_string(), Value::Object(picks));
            modify(&Value::object(), &Value::Object(update))?
        }
        _ => {
            let mut omits = Object::new();
            for key in keys {
                omits.insert(key.clone(), Value::Bool(true));
            }
            let mut update = Object::new();
            update.insert("$unset".to_string(), Value::Object(omits));
            modify(doc, &Value::Object(update))?
        }
    };

    if let Some(fields) = projected.as_object_mut() {
        if keep_id {
            if let Some(id) = doc.get("_id") {
                fields.insert("_id".to_string(), id.clone());
            }
        } else {
            fields.shift_remove("_id");
        }
    }
    Ok(projected)
}

fn projection_flag(key: &str, value: &Value) -> Result<u8, QueryError> {
    match value.as_number() {
        Some(n) if n == 1.0 => Ok(1),
        Some(n) if n == 0.0 => Ok(0),
        _ => Err(QueryError::Projection(format!(
            "projection value for {key} must be 0 or 1"
        ))),
    }
}
