mod compare;
mod encoding;
mod error;
mod path;
mod validate;
mod value;

pub use compare::{StringComparator, compare_values, compare_values_with};
pub use encoding::{deserialize, serialize};
pub use error::ModelError;
pub use path::get_dot_value;
pub use validate::check_document;
pub use value::{Object, Predicate, Value, deep_copy_strict, values_equal};
