use thiserror::Error;

use crate::types::DenyReason;

/// Error type for policy evaluation and enforcement.
///
/// Expected denials are `Decision::Deny` values inside the engine. They only
/// become `PolicyError::Denied` at the enforcement boundary, where the caller
/// needs a permission error distinct from technical failures.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("permission denied: {0}")]
    Denied(DenyReason),

    #[error("invalid document path: {0}")]
    InvalidPath(String),

    #[error("malformed actor context: {0}")]
    MalformedActor(String),

    #[error("store error: {0}")]
    Store(#[from] hotplate_core::CoreError),

    #[error("audit sink error: {0}")]
    AuditSinkError(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl PolicyError {
    /// The deny reason if this is a policy rejection.
    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            PolicyError::Denied(reason) => Some(*reason),
            _ => None,
        }
    }

    /// Whether this error is a schema violation rather than a permission problem.
    pub fn is_validation_error(&self) -> bool {
        matches!(self, PolicyError::Denied(DenyReason::BadShape))
    }
}

pub type PolicyResult<T> = Result<T, PolicyError>;
