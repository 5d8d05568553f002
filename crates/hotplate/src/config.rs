use hotplate_notify::{
    RotationPolicy, DEFAULT_ROTATION_PROBABILITY, DEFAULT_SECRET_LENGTH, MIN_SECRET_LENGTH,
};
use hotplate_policy::{allowed_fields, NodeKind, PolicyConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RootError, RootResult};

/// Secret rotation after successful webhook calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationConfig {
    /// Chance of rotating after each successful call (0.0 to 1.0).
    #[serde(default = "default_probability")]
    pub probability: f64,

    #[serde(default = "default_secret_length")]
    pub secret_length: usize,
}

fn default_probability() -> f64 {
    DEFAULT_ROTATION_PROBABILITY
}

fn default_secret_length() -> usize {
    DEFAULT_SECRET_LENGTH
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            probability: default_probability(),
            secret_length: default_secret_length(),
        }
    }
}

impl RotationConfig {
    pub fn to_policy(&self) -> RootResult<RotationPolicy> {
        Ok(RotationPolicy::new(self.probability, self.secret_length)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Per-request timeout for calendar and mail endpoints.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl WebhookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

/// Top-level configuration for the Hotplate binary.
///
/// Loaded from a TOML file (typically `~/.hotplate/config.toml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotplateConfig {
    /// JSON snapshot backing the document store.
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub rotation: RotationConfig,

    #[serde(default)]
    pub webhook: WebhookConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

fn default_data_file() -> PathBuf {
    dirs_or_default(".hotplate/documents.json")
}

/// Returns `$HOME/<suffix>` if HOME is available, otherwise `./<suffix>`.
fn dirs_or_default(suffix: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(suffix))
        .unwrap_or_else(|_| PathBuf::from(suffix))
}

/// Expand a leading `~/` against HOME.
fn expand_home(path: &Path) -> PathBuf {
    match path.to_str().and_then(|s| s.strip_prefix("~/")) {
        Some(rest) => dirs_or_default(rest),
        None => path.to_path_buf(),
    }
}

impl Default for HotplateConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            policy: PolicyConfig::default(),
            rotation: RotationConfig::default(),
            webhook: WebhookConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl HotplateConfig {
    /// Load configuration from a TOML file. If the file does not exist,
    /// returns a default configuration.
    pub fn load(path: &Path) -> RootResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(RootError::Io)?;
        let mut config: HotplateConfig = toml::from_str(&contents)?;
        config.data_file = expand_home(&config.data_file);
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> RootResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| RootError::Config(format!("TOML serialize error: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(RootError::Io)?;
        }
        std::fs::write(path, contents).map_err(RootError::Io)?;
        Ok(())
    }

    pub fn validate(&self) -> RootResult<()> {
        if !(0.0..=1.0).contains(&self.rotation.probability) {
            return Err(RootError::Config(format!(
                "rotation.probability must be between 0.0 and 1.0, got {}",
                self.rotation.probability
            )));
        }
        if self.rotation.secret_length < MIN_SECRET_LENGTH {
            return Err(RootError::Config(format!(
                "rotation.secret_length must be at least {}, got {}",
                MIN_SECRET_LENGTH, self.rotation.secret_length
            )));
        }
        if self.webhook.timeout_secs == 0 {
            return Err(RootError::Config("webhook.timeout_secs must be > 0".into()));
        }
        let settings_fields = allowed_fields(NodeKind::Settings);
        if let Some(unknown) = self
            .policy
            .webmaster_settings_fields
            .iter()
            .find(|f| !settings_fields.contains(&f.as_str()))
        {
            return Err(RootError::Config(format!(
                "policy.webmaster_settings_fields: '{}' is not a settings field",
                unknown
            )));
        }
        Ok(())
    }

    pub fn default_config_path() -> PathBuf {
        dirs_or_default(".hotplate/config.toml")
    }
}
