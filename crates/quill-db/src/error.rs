use std::fmt;
use std::io;

use quill_model::ModelError;
use quill_query::QueryError;

#[derive(Debug)]
pub enum DbError {
    Model(ModelError),
    Query(QueryError),
    /// A unique index already holds a document under this key.
    UniqueViolation { field: String, key: String },
    /// `ensure_index` called without a field name.
    MissingFieldName,
    /// Too large a fraction of the datafile failed to parse.
    Corruption { corrupt: usize, total: usize },
    /// Rejected at construction: bad filename or serialization hooks.
    BadConfiguration(String),
    Io(io::Error),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::Model(e) => write!(f, "{e}"),
            DbError::Query(e) => write!(f, "{e}"),
            DbError::UniqueViolation { field, key } => write!(
                f,
                "can't insert key {key}, it violates the unique constraint on index {field}"
            ),
            DbError::MissingFieldName => {
                write!(f, "cannot create an index without a fieldName")
            }
            DbError::Corruption { corrupt, total } => write!(
                f,
                "{corrupt} of {total} data file lines are corrupt, the wrong \
                 beforeDeserialization hook may be used; refusing to start to prevent data loss"
            ),
            DbError::BadConfiguration(msg) => write!(f, "{msg}"),
            DbError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for DbError {}

impl From<ModelError> for DbError {
    fn from(e: ModelError) -> Self {
        DbError::Model(e)
    }
}

impl From<QueryError> for DbError {
    fn from(e: QueryError) -> Self {
        DbError::Query(e)
    }
}

impl From<io::Error> for DbError {
    fn from(e: io::Error) -> Self {
        DbError::Io(e)
    }
}
