use hotplate_core::CoreError;
use hotplate_policy::{DenyReason, PolicyError};
use thiserror::Error;

use crate::types::ExternalService;

/// Error type for the hotplate-notify crate.
///
/// Messages never include the shared secret or the endpoint URL, which
/// carries the secret as a query parameter for calendar reads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("permission denied: {0}")]
    PermissionDenied(DenyReason),

    #[error("no endpoint configured for {0}")]
    EndpointNotConfigured(ExternalService),

    #[error("external service failed: {0}")]
    ExternalFailure(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("invalid response")]
    InvalidResponse,

    #[error("configuration error: {0}")]
    ConfigurationError(String),
}

impl From<PolicyError> for NotifyError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::Denied(reason) => NotifyError::PermissionDenied(reason),
            other => NotifyError::Store(other.to_string()),
        }
    }
}

impl From<CoreError> for NotifyError {
    fn from(err: CoreError) -> Self {
        NotifyError::Store(err.to_string())
    }
}

/// Result type alias for hotplate-notify operations.
pub type NotifyResult<T> = Result<T, NotifyError>;
