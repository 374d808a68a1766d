use thiserror::Error;

use crate::document::DocumentError;
use crate::filter::FilterError;
use crate::intercept::InterceptError;
use crate::policy::AuthorizationDenied;
use crate::storage::BackendError;
use crate::types::Operation;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    AuthorizationDenied(#[from] AuthorizationDenied),

    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Intercept for {operation} failed: {source}")]
    InterceptFailure {
        operation: Operation,
        #[source]
        source: InterceptError,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Backend failure: {0}")]
    BackendFailure(#[from] BackendError),
}

impl GatewayError {
    pub fn intercept(operation: Operation) -> impl FnOnce(InterceptError) -> GatewayError {
        move |source| GatewayError::InterceptFailure { operation, source }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        GatewayError::MalformedInput(message.into())
    }
}

impl From<FilterError> for GatewayError {
    fn from(err: FilterError) -> Self {
        GatewayError::MalformedInput(err.to_string())
    }
}

impl From<DocumentError> for GatewayError {
    fn from(err: DocumentError) -> Self {
        GatewayError::MalformedInput(err.to_string())
    }
}
