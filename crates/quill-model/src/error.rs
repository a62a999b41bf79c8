use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// A field name begins with `$` and is not a serialization sentinel.
    ReservedFieldName(String),
    /// A field name contains `.`.
    DottedFieldName(String),
    Serialize(String),
    Parse(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::ReservedFieldName(key) => {
                write!(f, "field names cannot begin with the $ character: {key}")
            }
            ModelError::DottedFieldName(key) => {
                write!(f, "field names cannot contain a .: {key}")
            }
            ModelError::Serialize(msg) => write!(f, "serialization error: {msg}"),
            ModelError::Parse(msg) => write!(f, "parse error: {msg}"),
        }
    }
}

impl std::error::Error for ModelError {}
