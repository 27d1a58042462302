//! Errors raised while loading memory configuration.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file exists but could not be read.
    #[error("failed to read config: {0}")]
    ReadFailed(#[from] std::io::Error),
    /// A config file is not valid JSON5.
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] json5::Error),
    /// The merged document does not match the config model.
    #[error("failed to decode config: {0}")]
    DecodeFailed(#[from] serde_json::Error),
    /// A field in a layer or in the merged config is invalid.
    #[error("invalid config at {path}: {message}")]
    InvalidField { path: String, message: String },
    /// An environment override could not be interpreted.
    #[error("invalid environment variable {var}={value:?}: {message}")]
    InvalidEnv {
        var: String,
        value: String,
        message: String,
    },
    /// Cross-field validation failed.
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub(crate) fn invalid_env(var: &str, value: &str, message: &str) -> Self {
        ConfigError::InvalidEnv {
            var: var.to_string(),
            value: value.to_string(),
            message: message.to_string(),
        }
    }
}
