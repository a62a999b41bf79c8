mod error;
mod matcher;
mod modifier;
mod projection;
mod sort;

pub use error::QueryError;
pub use matcher::match_query;
pub use modifier::modify;
pub use projection::project;
pub use sort::{Sort, SortDirection, parse_sort};
