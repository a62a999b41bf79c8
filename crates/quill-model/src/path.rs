use crate::value::Value;

/// Fetch the value at a dot-separated path, `None` meaning undefined.
///
/// At each step, if the current value is an array and the next segment parses
/// as a non-negative integer, index into the array; otherwise the remaining
/// path is mapped across all elements and the results come back as an array.
/// Elements where the path is undefined are dropped from the mapped array.
pub fn get_dot_value(value: &Value, path: &str) -> Option<Value> {
    let parts: Vec<&str> = path.split('.').collect();
    get_parts(value, &parts)
}

fn get_parts(value: &Value, parts: &[&str]) -> Option<Value> {
    if parts.is_empty() {
        return Some(value.clone());
    }
    match value {
        Value::Array(items) => match parts[0].parse::<usize>() {
            Ok(i) => items.get(i).and_then(|item| get_parts(item, &parts[1..])),
            Err(_) => Some(Value::Array(
                items
                    .iter()
                    .filter_map(|item| get_parts(item, parts))
                    .collect(),
            )),
        },
        Value::Object(map) => map
            .get(parts[0])
            .and_then(|inner| get_parts(inner, &parts[1..])),
        _ => None,
    }
}
