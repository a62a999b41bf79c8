use std::cmp::Ordering;

use crate::value::Value;

/// A caller-supplied string comparator, used by sort.
pub type StringComparator = dyn Fn(&str, &str) -> Ordering + Send + Sync;

/// Rank of a value in the cross-type precedence order.
///
/// `None` (an undefined field) sorts below everything; predicates are
/// unreachable in stored data and rank last.
fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Bool(_)) => 4,
        Some(Value::Date(_)) => 5,
        Some(Value::Array(_)) => 6,
        Some(Value::Object(_)) => 7,
        Some(Value::Where(_)) => 8,
    }
}

/// Total ordering across heterogeneous values, used by index trees and sort.
///
/// Precedence lowest to highest: undefined, null, numbers, strings, booleans,
/// dates, arrays, objects. See [`compare_values_with`] for the details within
/// each type.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    compare_values_with(a, b, None)
}

/// [`compare_values`] with a custom string comparator.
///
/// Strings compare lexicographically on code units by default; arrays compare
/// element-wise with the shorter array smaller on ties; objects compare the
/// values at their sorted key lists positionally, then by key count. `NaN`
/// falls back to `Equal`.
pub fn compare_values_with(
    a: Option<&Value>,
    b: Option<&Value>,
    compare_strings: Option<&StringComparator>,
) -> Ordering {
    let (rank_a, rank_b) = (type_rank(a), type_rank(b));
    if rank_a != rank_b {
        return rank_a.cmp(&rank_b);
    }
    match (a, b) {
        (None, None) => Ordering::Equal,
        (Some(Value::Null), Some(Value::Null)) => Ordering::Equal,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            x.partial_cmp(y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => match compare_strings {
            Some(cmp) => cmp(x, y),
            None => x.cmp(y),
        },
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Date(x)), Some(Value::Date(y))) => x.cmp(y),
        (Some(Value::Array(x)), Some(Value::Array(y))) => {
            for (v, w) in x.iter().zip(y) {
                let ord = compare_values_with(Some(v), Some(w), compare_strings);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Some(Value::Object(x)), Some(Value::Object(y))) => {
            let mut x_keys: Vec<&String> = x.keys().collect();
            let mut y_keys: Vec<&String> = y.keys().collect();
            x_keys.sort();
            y_keys.sort();
            for (xk, yk) in x_keys.iter().zip(&y_keys) {
                let ord = compare_values_with(x.get(*xk), y.get(*yk), compare_strings);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x_keys.len().cmp(&y_keys.len())
        }
        _ => Ordering::Equal,
    }
}
