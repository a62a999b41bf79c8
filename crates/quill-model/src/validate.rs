use crate::error::ModelError;
use crate::value::Value;

/// Validate every field name in a document.
///
/// Walks nested objects and arrays. Keys must not contain `.` and must not
/// begin with `$`, except for the serialization sentinels: `$$date` carrying
/// a number, `$$deleted` carrying `true`, `$$indexCreated` and
/// `$$indexRemoved`.
pub fn check_document(value: &Value) -> Result<(), ModelError> {
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                check_key(key, inner)?;
                check_document(inner)?;
            }
            Ok(())
        }
        Value::Array(items) => {
            for item in items {
                check_document(item)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn check_key(key: &str, value: &Value) -> Result<(), ModelError> {
    if key.starts_with('$') {
        let sentinel = (key == "$$date" && matches!(value, Value::Number(_)))
            || (key == "$$deleted" && matches!(value, Value::Bool(true)))
            || key == "$$indexCreated"
            || key == "$$indexRemoved";
        if !sentinel {
            return Err(ModelError::ReservedFieldName(key.to_string()));
        }
    }
    if key.contains('.') {
        return Err(ModelError::DottedFieldName(key.to_string()));
    }
    Ok(())
}
