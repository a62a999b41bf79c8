use std::fmt;

use quill_model::ModelError;

#[derive(Debug)]
pub enum QueryError {
    UnknownLogicalOperator(String),
    UnknownComparisonOperator(String),
    UnknownModifier(String),
    /// Operator keys and literal keys mixed in one field-value object.
    MixedOperatorsAndFields,
    /// Modifier keys and literal keys mixed in one update.
    MixedModifiersAndFields,
    /// An operator or modifier received an operand it cannot work with.
    InvalidOperand(String),
    InvalidQuery(String),
    /// An update tried to change a document's `_id`.
    IdMutation,
    Projection(String),
    Model(ModelError),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::UnknownLogicalOperator(op) => {
                write!(f, "unknown logical operator {op}")
            }
            QueryError::UnknownComparisonOperator(op) => {
                write!(f, "unknown comparison function {op}")
            }
            QueryError::UnknownModifier(op) => write!(f, "unknown modifier {op}"),
            QueryError::MixedOperatorsAndFields => {
                write!(f, "you cannot mix operators and normal fields")
            }
            QueryError::MixedModifiersAndFields => {
                write!(f, "you cannot mix modifiers and normal fields")
            }
            QueryError::InvalidOperand(msg) => write!(f, "{msg}"),
            QueryError::InvalidQuery(msg) => write!(f, "invalid query: {msg}"),
            QueryError::IdMutation => write!(f, "you cannot change a document's _id"),
            QueryError::Projection(msg) => write!(f, "invalid projection: {msg}"),
            QueryError::Model(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for QueryError {}

impl From<ModelError> for QueryError {
    fn from(e: ModelError) -> Self {
        QueryError::Model(e)
    }
}
