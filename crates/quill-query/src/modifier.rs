use std::cmp::Ordering;

use quill_model::{Object, Value, check_document, compare_values, values_equal};

use crate::error::QueryError;
use crate::matcher::match_query;

const MODIFIERS: [&str; 9] = [
    "$set",
    "$unset",
    "$inc",
    "$min",
    "$max",
    "$push",
    "$addToSet",
    "$pop",
    "$pull",
];

/// Apply an update query to a document, returning the new version.
///
/// An update with no `$`-prefixed keys replaces the whole document (keeping
/// `_id`); otherwise every key must be a modifier whose argument maps
/// dot-paths to operands. Intermediate objects on a dot-path are created on
/// the fly, except for `$unset` which no-ops on missing paths. The result is
/// re-validated and `_id` must be unchanged.
pub fn modify(doc: &Value, update: &Value) -> Result<Value, QueryError> {
    let update_obj = update
        .as_object()
        .ok_or_else(|| QueryError::InvalidQuery("update must be an object".into()))?;
    let old_id = doc.get("_id");

    if let Some(new_id) = update_obj.get("_id") {
        let unchanged = old_id.is_some_and(|id| values_equal(id, new_id));
        if !unchanged {
            return Err(QueryError::IdMutation);
        }
    }

    let modifier_keys = update_obj.keys().filter(|k| k.starts_with('$')).count();
    if modifier_keys != 0 && modifier_keys != update_obj.len() {
        return Err(QueryError::MixedModifiersAndFields);
    }

    let new_doc = if modifier_keys == 0 {
        // Whole-document replacement; the old _id carries over.
        let mut replacement = update.clone();
        if let (Value::Object(fields), Some(id)) = (&mut replacement, old_id) {
            fields.insert("_id".to_string(), id.clone());
        }
        replacement
    } else {
        let mut new_doc = doc.clone();
        for (modifier, argument) in update_obj {
            if !MODIFIERS.contains(&modifier.as_str()) {
                return Err(QueryError::UnknownModifier(modifier.clone()));
            }
            let fields = argument.as_object().ok_or_else(|| {
                QueryError::InvalidOperand(format!(
                    "modifier {modifier}'s argument must be an object"
                ))
            })?;
            for (path, operand) in fields {
                let parts: Vec<&str> = path.split('.').collect();
                apply_at_path(&mut new_doc, modifier, &parts, path, operand)?;
            }
        }
        new_doc
    };

    check_document(&new_doc)?;
    let id_unchanged = match (old_id, new_doc.get("_id")) {
        (None, None) => true,
        (Some(a), Some(b)) => values_equal(a, b),
        _ => false,
    };
    if !id_unchanged {
        return Err(QueryError::IdMutation);
    }
    Ok(new_doc)
}

/// Walk the dot-path down to the leaf, creating intermediate objects for
/// every modifier except `$unset`.
fn apply_at_path(
    current: &mut Value,
    modifier: &str,
    parts: &[&str],
    full_path: &str,
    operand: &Value,
) -> Result<(), QueryError> {
    if parts.len() == 1 {
        return apply_leaf(current, modifier, parts[0], full_path, operand);
    }
    match current {
        Value::Object(fields) => {
            if modifier == "$unset" && !fields.contains_key(parts[0]) {
                return Ok(());
            }
            let inner = fields
                .entry(parts[0].to_string())
                .or_insert_with(Value::object);
            apply_at_path(inner, modifier, &parts[1..], full_path, operand)
        }
        Value::Array(items) => match parts[0].parse::<usize>() {
            Ok(i) if i < items.len() => {
                apply_at_path(&mut items[i], modifier, &parts[1..], full_path, operand)
            }
            _ if modifier == "$unset" => Ok(()),
            _ => Err(QueryError::InvalidOperand(format!(
                "cannot walk {full_path}: array index out of bounds"
            ))),
        },
        _ if modifier == "$unset" => Ok(()),
        _ => Err(QueryError::InvalidOperand(format!(
            "cannot walk {full_path} through a non-object value"
        ))),
    }
}

fn apply_leaf(
    parent: &mut Value,
    modifier: &str,
    field: &str,
    full_path: &str,
    operand: &Value,
) -> Result<(), QueryError> {
    let fields = match parent {
        Value::Object(fields) => fields,
        Value::Array(items) => return apply_array_leaf(items, modifier, field, full_path, operand),
        _ if modifier == "$unset" => return Ok(()),
        _ => {
            return Err(QueryError::InvalidOperand(format!(
                "cannot modify {full_path} on a non-object value"
            )));
        }
    };

    match modifier {
        "$set" => {
            fields.insert(field.to_string(), operand.clone());
        }
        "$unset" => {
            fields.shift_remove(field);
        }
        "$min" => match fields.get(field) {
            Some(current) if compare_values(Some(operand), Some(current)) != Ordering::Less => {}
            _ => {
                fields.insert(field.to_string(), operand.clone());
            }
        },
        "$max" => match fields.get(field) {
            Some(current) if compare_values(Some(operand), Some(current)) != Ordering::Greater => {}
            _ => {
                fields.insert(field.to_string(), operand.clone());
            }
        },
        "$inc" => {
            let amount = operand.as_number().ok_or_else(|| {
                QueryError::InvalidOperand("$inc modifier used with non-number value".into())
            })?;
            match fields.get(field) {
                Some(Value::Number(n)) => {
                    let sum = n + amount;
                    fields.insert(field.to_string(), Value::Number(sum));
                }
                Some(_) => {
                    return Err(QueryError::InvalidOperand(
                        "cannot use the $inc modifier on non-number fields".into(),
                    ));
                }
                None => {
                    fields.insert(field.to_string(), operand.clone());
                }
            }
        }
        "$push" => {
            let items = array_field(fields, field, "$push")?;
            push_operand(items, operand)?;
        }
        "$addToSet" => {
            let items = array_field(fields, field, "$addToSet")?;
            add_to_set_operand(items, operand)?;
        }
        "$pop" => {
            let items = match fields.get_mut(field) {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(QueryError::InvalidOperand(
                        "cannot $pop an element from non-array values".into(),
                    ));
                }
            };
            let n = operand.as_number().ok_or_else(|| {
                QueryError::InvalidOperand("$pop operand must be an integer".into())
            })?;
            if n > 0.0 {
                items.pop();
            } else if n < 0.0 && !items.is_empty() {
                items.remove(0);
            }
        }
        "$pull" => {
            let items = match fields.get_mut(field) {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(QueryError::InvalidOperand(
                        "cannot $pull an element from non-array values".into(),
                    ));
                }
            };
            let mut kept = Vec::with_capacity(items.len());
            for item in items.drain(..) {
                if !match_query(&item, operand)? {
                    kept.push(item);
                }
            }
            *items = kept;
        }
        // modify() filters to known modifiers before walking
        other => return Err(QueryError::UnknownModifier(other.to_string())),
    }
    Ok(())
}

/// Minimal leaf support when the parent is an array and the leaf segment is
/// an index: `$set` replaces the element, `$unset` nulls it out.
fn apply_array_leaf(
    items: &mut [Value],
    modifier: &str,
    field: &str,
    full_path: &str,
    operand: &Value,
) -> Result<(), QueryError> {
    let index = match field.parse::<usize>() {
        Ok(i) if i < items.len() => i,
        _ if modifier == "$unset" => return Ok(()),
        _ => {
            return Err(QueryError::InvalidOperand(format!(
                "cannot modify {full_path}: array index out of bounds"
            )));
        }
    };
    match modifier {
        "$set" => {
            items[index] = operand.clone();
            Ok(())
        }
        "$unset" => {
            items[index] = Value::Null;
            Ok(())
        }
        _ => Err(QueryError::InvalidOperand(format!(
            "modifier {modifier} cannot target array element {full_path}"
        ))),
    }
}

/// Fetch `fields[field]` as an array, creating an empty one when missing.
fn array_field<'a>(
    fields: &'a mut Object,
    field: &str,
    modifier: &str,
) -> Result<&'a mut Vec<Value>, QueryError> {
    let value = fields
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    value.as_array_mut().ok_or_else(|| {
        QueryError::InvalidOperand(format!("cannot {modifier} an element on non-array values"))
    })
}

fn push_operand(items: &mut Vec<Value>, operand: &Value) -> Result<(), QueryError> {
    let Some(sub) = operand.as_object() else {
        items.push(operand.clone());
        return Ok(());
    };
    let has_each = sub.contains_key("$each");
    let has_slice = sub.contains_key("$slice");
    if !has_each && !has_slice {
        items.push(operand.clone());
        return Ok(());
    }

    if sub.keys().any(|k| k != "$each" && k != "$slice") {
        return Err(QueryError::InvalidOperand(
            "$push can only take $each and $slice as sub-modifiers".into(),
        ));
    }
    if has_each {
        let each = sub
            .get("$each")
            .and_then(Value::as_array)
            .ok_or_else(|| QueryError::InvalidOperand("$each requires an array value".into()))?;
        items.extend(each.iter().cloned());
    }
    if let Some(slice) = sub.get("$slice") {
        let n = slice.as_number().ok_or_else(|| {
            QueryError::InvalidOperand("$slice requires a number value".into())
        })?;
        let len = items.len();
        if n == 0.0 {
            items.clear();
        } else if n > 0.0 {
            items.truncate(n as usize);
        } else {
            let keep = (-n) as usize;
            if keep < len {
                items.drain(..len - keep);
            }
        }
    }
    Ok(())
}

fn add_to_set_operand(items: &mut Vec<Value>, operand: &Value) -> Result<(), QueryError> {
    if let Some(sub) = operand.as_object() {
        if sub.contains_key("$each") {
            if sub.len() > 1 {
                return Err(QueryError::InvalidOperand(
                    "cannot use another field in conjunction with $each".into(),
                ));
            }
            let each = sub
                .get("$each")
                .and_then(Value::as_array)
                .ok_or_else(|| QueryError::InvalidOperand("$each requires an array value".into()))?;
            for item in each {
                add_to_set_operand(items, item)?;
            }
            return Ok(());
        }
    }
    let already_there = items
        .iter()
        .any(|item| compare_values(Some(item), Some(operand)) == Ordering::Equal);
    if !already_there {
        items.push(operand.clone());
    }
    Ok(())
}
