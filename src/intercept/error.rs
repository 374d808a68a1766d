use thiserror::Error;

/// Failures raised by data filters and document mutators
#[derive(Debug, Error)]
pub enum InterceptError {
    #[error("This operation requires an authenticated user")]
    MissingIdentity,

    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Document does not fit shape {type_name}: {source}")]
    Shape {
        type_name: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl InterceptError {
    pub fn rejected(message: impl Into<String>) -> Self {
        InterceptError::Rejected(message.into())
    }
}
