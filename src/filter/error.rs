use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid query: {0}")]
    InvalidWhereClause(String),

    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("Invalid operator data: {0}")]
    InvalidOperatorData(String),

    #[error("Query nesting depth {depth} exceeds maximum {max_depth}")]
    TooDeep { depth: u32, max_depth: u32 },

    #[error("Invalid sort: {0}")]
    InvalidSort(String),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}
