use quill_model::Value;

use crate::error::QueryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

/// Parse a `{ field: 1 | -1, .. }` sort spec into ordered criteria.
pub fn parse_sort(spec: &Value) -> Result<Vec<Sort>, QueryError> {
    let fields = spec
        .as_object()
        .ok_or_else(|| QueryError::InvalidQuery("sort spec must be an object".into()))?;
    fields
        .iter()
        .map(|(field, direction)| {
            let direction = match direction.as_number() {
                Some(n) if n == 1.0 => SortDirection::Asc,
                Some(n) if n == -1.0 => SortDirection::Desc,
                _ => {
                    return Err(QueryError::InvalidQuery(format!(
                        "sort direction for {field} must be 1 or -1"
                    )));
                }
            };
            Ok(Sort {
                field: field.clone(),
                direction,
            })
        })
        .collect()
}
