//! Error types for the Notebook controller

use thiserror::Error;

use crate::unstructured::UnstructuredError;

/// Main error type for Notebook reconciliation
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Validation error for Notebook specs
    #[error("validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A nested field of a dynamic child object could not be read or written
    #[error("unstructured object error: {0}")]
    Unstructured(#[from] UnstructuredError),

    /// The reconciled object has no namespace
    #[error("{kind} {name} has no namespace")]
    MissingNamespace {
        /// Kind of the offending object
        kind: String,
        /// Name of the offending object
        name: String,
    },

    /// Invariant violation inside the controller
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a missing-namespace error for the given object
    pub fn missing_namespace(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::MissingNamespace {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Whether the controller should retry after this error.
    ///
    /// Validation failures need a spec change, everything else may succeed
    /// on a later attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Error::Validation(_) | Error::MissingNamespace { .. })
    }

    /// Whether the API server rejected a write because the object changed
    /// since it was read (HTTP 409).
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(ae)) if ae.code == 409)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[cfg(test)]
pub(crate) fn api_error(code: u16, reason: &str) -> Error {
    Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{reason} ({code})"),
        reason: reason.to_string(),
        code,
    }))
}
