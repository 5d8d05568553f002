use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid document path: {0}")]
    InvalidPath(String),

    #[error("write conflict at {0}: document changed since it was read")]
    Conflict(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
