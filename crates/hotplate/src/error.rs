use thiserror::Error;

/// Error type for the Hotplate root binary, aggregating errors from the
/// library crates.
#[derive(Debug, Error)]
pub enum RootError {
    #[error("core error: {0}")]
    Core(#[from] hotplate_core::CoreError),

    #[error("policy error: {0}")]
    Policy(#[from] hotplate_policy::PolicyError),

    #[error("webhook error: {0}")]
    Notify(#[from] hotplate_notify::NotifyError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RootError {
    fn from(e: serde_json::Error) -> Self {
        RootError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for RootError {
    fn from(e: toml::de::Error) -> Self {
        RootError::Config(format!("TOML parse error: {}", e))
    }
}

pub type RootResult<T> = Result<T, RootError>;
