use std::cmp::Ordering;

use quill_model::{Value, compare_values, get_dot_value, values_equal};
use regex::Regex;

use crate::error::QueryError;

/// Operators that apply to an array field as a whole rather than to its
/// elements.
const ARRAY_OPERATORS: [&str; 2] = ["$size", "$elemMatch"];

/// Check whether a document matches a query.
///
/// The query is an object whose top-level entries are ANDed together. Keys
/// beginning with `$` are the logical operators `$and`, `$or`, `$not` and
/// `$where`; every other key names a field matched against the query value —
/// by equality, by an operator sub-object, or element-wise when the field
/// holds an array (implicit any-of).
pub fn match_query(doc: &Value, query: &Value) -> Result<bool, QueryError> {
    // A primitive on either side means there is nothing to walk into.
    if doc.is_primitive() || query.is_primitive() {
        return match_value(Some(doc), query, false);
    }

    let clauses = query
        .as_object()
        .ok_or_else(|| QueryError::InvalidQuery("query must be an object".into()))?;

    for (key, query_value) in clauses {
        if let Some(op) = key.strip_prefix('$') {
            if !apply_logical(doc, op, query_value)? {
                return Ok(false);
            }
        } else if !match_value(get_dot_value(doc, key).as_ref(), query_value, false)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn apply_logical(doc: &Value, op: &str, operand: &Value) -> Result<bool, QueryError> {
    match op {
        "and" => {
            let subqueries = logical_array("$and", operand)?;
            for sub in subqueries {
                if !match_query(doc, sub)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        "or" => {
            let subqueries = logical_array("$or", operand)?;
            for sub in subqueries {
                if match_query(doc, sub)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        "not" => Ok(!match_query(doc, operand)?),
        "where" => match operand {
            Value::Where(predicate) => Ok((predicate.0)(doc)),
            _ => Err(QueryError::InvalidOperand(
                "$where operator used without a predicate".into(),
            )),
        },
        other => Err(QueryError::UnknownLogicalOperator(format!("${other}"))),
    }
}

fn logical_array<'a>(op: &str, operand: &'a Value) -> Result<&'a Vec<Value>, QueryError> {
    operand
        .as_array()
        .ok_or_else(|| QueryError::InvalidOperand(format!("{op} operator used without an array")))
}

/// Match one field value (`None` = undefined) against one query value.
///
/// `treat_array_as_value` suppresses the implicit any-of so that an array can
/// be compared as a whole — for an exact array match, or for `$size` /
/// `$elemMatch`.
fn match_value(
    field: Option<&Value>,
    query_value: &Value,
    treat_array_as_value: bool,
) -> Result<bool, QueryError> {
    if let Some(Value::Array(elements)) = field {
        if !treat_array_as_value {
            if matches!(query_value, Value::Array(_)) {
                return match_value(field, query_value, true);
            }
            if let Some(ops) = query_value.as_object() {
                if ops.keys().any(|k| ARRAY_OPERATORS.contains(&k.as_str())) {
                    return match_value(field, query_value, true);
                }
            }
            // Implicit any-of: one matching element is enough.
            for element in elements {
                if match_value(Some(element), query_value, false)? {
                    return Ok(true);
                }
            }
            return Ok(false);
        }
    }

    if let Some(ops) = query_value.as_object() {
        let dollar_keys = ops.keys().filter(|k| k.starts_with('$')).count();
        if dollar_keys != 0 && dollar_keys != ops.len() {
            return Err(QueryError::MixedOperatorsAndFields);
        }
        if dollar_keys > 0 {
            for (op, operand) in ops {
                if !apply_comparison(op, field, operand)? {
                    return Ok(false);
                }
            }
            return Ok(true);
        }
    }

    Ok(match field {
        Some(value) => values_equal(value, query_value),
        None => false,
    })
}

fn apply_comparison(
    op: &str,
    field: Option<&Value>,
    operand: &Value,
) -> Result<bool, QueryError> {
    match op {
        "$lt" => Ok(compare_ordered(field, operand, |o| o == Ordering::Less)),
        "$lte" => Ok(compare_ordered(field, operand, |o| o != Ordering::Greater)),
        "$gt" => Ok(compare_ordered(field, operand, |o| o == Ordering::Greater)),
        "$gte" => Ok(compare_ordered(field, operand, |o| o != Ordering::Less)),
        "$ne" => Ok(match field {
            Some(value) => !values_equal(value, operand),
            None => true,
        }),
        "$in" => {
            let candidates = operand.as_array().ok_or_else(|| {
                QueryError::InvalidOperand("$in operator called with a non-array".into())
            })?;
            Ok(field.is_some_and(|value| candidates.iter().any(|c| values_equal(value, c))))
        }
        "$nin" => {
            let candidates = operand.as_array().ok_or_else(|| {
                QueryError::InvalidOperand("$nin operator called with a non-array".into())
            })?;
            Ok(!field.is_some_and(|value| candidates.iter().any(|c| values_equal(value, c))))
        }
        "$regex" => {
            let pattern = operand.as_str().ok_or_else(|| {
                QueryError::InvalidOperand("$regex operator called with a non-string".into())
            })?;
            let re = Regex::new(pattern)
                .map_err(|e| QueryError::InvalidOperand(format!("invalid regex pattern: {e}")))?;
            Ok(field.and_then(Value::as_str).is_some_and(|s| re.is_match(s)))
        }
        "$exists" => Ok(field.is_some() == truthy(operand)),
        "$size" => {
            let Some(Value::Array(items)) = field else {
                return Ok(false);
            };
            match operand {
                Value::Number(n) if n.fract() == 0.0 => Ok(items.len() as f64 == *n),
                _ => Err(QueryError::InvalidOperand(
                    "$size operator called without an integer".into(),
                )),
            }
        }
        "$elemMatch" => {
            let Some(Value::Array(items)) = field else {
                return Ok(false);
            };
            for item in items {
                if match_query(item, operand)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => Err(QueryError::UnknownComparisonOperator(other.to_string())),
    }
}

/// Ordered comparison: defined only between two numbers, two strings or two
/// dates; everything else (including NaN on either side) fails the predicate.
fn compare_ordered(
    field: Option<&Value>,
    operand: &Value,
    predicate: fn(Ordering) -> bool,
) -> bool {
    match (field, operand) {
        (Some(Value::Number(a)), Value::Number(b)) => {
            a.partial_cmp(b).map(predicate).unwrap_or(false)
        }
        (Some(Value::String(_)), Value::String(_))
        | (Some(Value::Date(_)), Value::Date(_)) => {
            predicate(compare_values(field, Some(operand)))
        }
        _ => false,
    }
}

/// Truthiness for `$exists` operands: `false`, `0`, `NaN` and `null` mean
/// "must not exist"; everything else — including the empty string — means
/// "must exist".
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => *n != 0.0 && !n.is_nan(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_model::{Predicate, doc};

    fn matches(doc: &Value, query: &Value) -> bool {
        match_query(doc, query).unwrap()
    }

    #[test]
    fn empty_query_matches_everything() {
        assert!(matches(&doc! { "a": 1 }, &doc! {}));
    }

    #[test]
    fn primitive_equality() {
        let d = doc! { "a": 1, "s": "hello", "b": true, "n": null };
        assert!(matches(&d, &doc! { "a": 1 }));
        assert!(matches(&d, &doc! { "s": "hello" }));
        assert!(matches(&d, &doc! { "b": true }));
        assert!(matches(&d, &doc! { "n": null }));
        assert!(!matches(&d, &doc! { "a": 2 }));
        assert!(!matches(&d, &doc! { "missing": 1 }));
    }

    #[test]
    fn date_equality() {
        let d = doc! { "at": (Value::Date(5000)) };
        assert!(matches(&d, &doc! { "at": (Value::Date(5000)) }));
        assert!(!matches(&d, &doc! { "at": (Value::Date(5001)) }));
        assert!(!matches(&d, &doc! { "at": 5000 }));
    }

    #[test]
    fn dot_path_matching() {
        let d = doc! { "a": { "b": { "c": 3 } } };
        assert!(matches(&d, &doc! { "a.b.c": 3 }));
        assert!(!matches(&d, &doc! { "a.b.c": 4 }));
    }

    #[test]
    fn deep_object_equality() {
        let d = doc! { "addr": { "city": "Austin", "zip": "78701" } };
        assert!(matches(&d, &doc! { "addr": { "city": "Austin", "zip": "78701" } }));
        assert!(!matches(&d, &doc! { "addr": { "city": "Austin" } }));
    }

    #[test]
    fn comparison_operators() {
        let d = doc! { "n": 5, "s": "m", "at": (Value::Date(100)) };
        assert!(matches(&d, &doc! { "n": { "$lt": 6 } }));
        assert!(matches(&d, &doc! { "n": { "$lte": 5 } }));
        assert!(matches(&d, &doc! { "n": { "$gt": 4 } }));
        assert!(matches(&d, &doc! { "n": { "$gte": 5 } }));
        assert!(!matches(&d, &doc! { "n": { "$gt": 5 } }));
        assert!(matches(&d, &doc! { "n": { "$gt": 4, "$lt": 6 } }));
        assert!(!matches(&d, &doc! { "n": { "$gt": 4, "$lt": 5 } }));
        assert!(matches(&d, &doc! { "s": { "$gt": "a" } }));
        assert!(matches(&d, &doc! { "at": { "$lt": (Value::Date(200)) } }));
        // cross-type comparisons never succeed
        assert!(!matches(&d, &doc! { "s": { "$gt": 1 } }));
        assert!(!matches(&d, &doc! { "n": { "$gt": (Value::Date(0)) } }));
    }

    #[test]
    fn ne_on_a_missing_field_matches() {
        let d = doc! { "a": 1 };
        assert!(matches(&d, &doc! { "missing": { "$ne": 3 } }));
        assert!(matches(&d, &doc! { "a": { "$ne": 3 } }));
        assert!(!matches(&d, &doc! { "a": { "$ne": 1 } }));
    }

    #[test]
    fn in_and_nin() {
        let d = doc! { "a": 2 };
        assert!(matches(&d, &doc! { "a": { "$in": [1, 2, 3] } }));
        assert!(!matches(&d, &doc! { "a": { "$in": [4, 5] } }));
        assert!(matches(&d, &doc! { "a": { "$nin": [4, 5] } }));
        assert!(matches(&d, &doc! { "missing": { "$nin": [1] } }));
        assert!(match_query(&d, &doc! { "a": { "$in": 5 } }).is_err());
    }

    #[test]
    fn regex_matches_strings_only() {
        let d = doc! { "name": "quill", "n": 7 };
        assert!(matches(&d, &doc! { "name": { "$regex": "^qu" } }));
        assert!(!matches(&d, &doc! { "name": { "$regex": "^z" } }));
        assert!(!matches(&d, &doc! { "n": { "$regex": "7" } }));
        assert!(match_query(&d, &doc! { "name": { "$regex": 1 } }).is_err());
        assert!(match_query(&d, &doc! { "name": { "$regex": "[unclosed" } }).is_err());
    }

    #[test]
    fn exists() {
        let d = doc! { "a": 1, "n": null };
        assert!(matches(&d, &doc! { "a": { "$exists": true } }));
        assert!(matches(&d, &doc! { "n": { "$exists": true } }));
        assert!(matches(&d, &doc! { "missing": { "$exists": false } }));
        assert!(!matches(&d, &doc! { "a": { "$exists": false } }));
        // truthiness quirk: the empty string means "must exist"
        assert!(matches(&d, &doc! { "a": { "$exists": "" } }));
        assert!(matches(&d, &doc! { "missing": { "$exists": 0 } }));
    }

    #[test]
    fn implicit_any_of_on_arrays() {
        let d = doc! { "a": [1, 2, 3] };
        assert!(matches(&d, &doc! { "a": 2 }));
        assert!(!matches(&d, &doc! { "a": 4 }));
        assert!(matches(&d, &doc! { "a": { "$gt": 2 } }));
        assert!(!matches(&d, &doc! { "a": { "$gt": 3 } }));
    }

    #[test]
    fn array_queried_with_array_is_exact_match() {
        let d = doc! { "a": [1, 2, 3] };
        assert!(matches(&d, &doc! { "a": [1, 2, 3] }));
        assert!(!matches(&d, &doc! { "a": [1, 2] }));
        assert!(!matches(&d, &doc! { "a": [3, 2, 1] }));
    }

    #[test]
    fn any_of_reaches_into_object_elements() {
        let d = doc! { "planets": [{ "name": "Earth" }, { "name": "Mars" }] };
        assert!(matches(&d, &doc! { "planets.name": "Mars" }));
        assert!(!matches(&d, &doc! { "planets.name": "Pluto" }));
    }

    #[test]
    fn size_and_elem_match_apply_to_the_array_itself() {
        let d = doc! { "a": [1, 2, 3], "docs": [{ "x": 1, "y": 2 }, { "x": 3, "y": 4 }] };
        assert!(matches(&d, &doc! { "a": { "$size": 3 } }));
        assert!(!matches(&d, &doc! { "a": { "$size": 2 } }));
        assert!(match_query(&d, &doc! { "a": { "$size": 2.5 } }).is_err());
        assert!(matches(&d, &doc! { "docs": { "$elemMatch": { "x": 1, "y": 2 } } }));
        assert!(!matches(&d, &doc! { "docs": { "$elemMatch": { "x": 1, "y": 4 } } }));
        // non-arrays never satisfy array operators
        assert!(!matches(&doc! { "a": 1 }, &doc! { "a": { "$size": 1 } }));
    }

    #[test]
    fn logical_operators() {
        let d = doc! { "a": 5, "b": "x" };
        assert!(matches(&d, &doc! { "$and": [{ "a": 5 }, { "b": "x" }] }));
        assert!(!matches(&d, &doc! { "$and": [{ "a": 5 }, { "b": "y" }] }));
        assert!(matches(&d, &doc! { "$or": [{ "a": 4 }, { "b": "x" }] }));
        assert!(!matches(&d, &doc! { "$or": [{ "a": 4 }, { "b": "y" }] }));
        assert!(matches(&d, &doc! { "$not": { "a": 4 } }));
        assert!(!matches(&d, &doc! { "$not": { "a": 5 } }));
        assert!(match_query(&d, &doc! { "$and": { "a": 5 } }).is_err());
        assert!(match_query(&d, &doc! { "$unknown": [] }).is_err());
    }

    #[test]
    fn where_predicate() {
        let d = doc! { "a": 5 };
        let q = doc! { "$where": (Predicate::new(|doc| {
            doc.get("a").and_then(Value::as_number) == Some(5.0)
        })) };
        assert!(matches(&d, &q));
        let q = doc! { "$where": (Predicate::new(|_| false)) };
        assert!(!matches(&d, &q));
        assert!(match_query(&d, &doc! { "$where": 1 }).is_err());
    }

    #[test]
    fn mixing_operators_and_fields_is_rejected() {
        let d = doc! { "a": { "b": 1 } };
        assert!(match_query(&d, &doc! { "a": { "$gt": 0, "b": 1 } }).is_err());
    }

    #[test]
    fn unknown_comparison_operator_is_rejected() {
        assert!(match_query(&doc! { "a": 1 }, &doc! { "a": { "$between": 1 } }).is_err());
    }

    #[test]
    fn nan_is_incomparable() {
        let d = doc! { "n": (f64::NAN) };
        assert!(!matches(&d, &doc! { "n": { "$lt": 1 } }));
        assert!(!matches(&d, &doc! { "n": { "$gte": 1 } }));
        assert!(!matches(&d, &doc! { "n": (f64::NAN) }));
    }
}
