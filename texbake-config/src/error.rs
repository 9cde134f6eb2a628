//! Configuration error types

use std::fmt::Display;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A domain rejected its values during validation
    #[error("Invalid {domain} configuration: {message}")]
    Invalid { domain: String, message: String },

    /// A `TEXBAKE_*` override could not be parsed
    #[error("Invalid environment override {var}: {message}")]
    Env { var: String, message: String },
}

impl ConfigError {
    pub fn invalid(domain: &str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            domain: domain.to_string(),
            message: message.into(),
        }
    }

    pub fn env(var: &str, message: impl Display) -> Self {
        ConfigError::Env {
            var: var.to_string(),
            message: message.to_string(),
        }
    }

    /// Whether the file was readable and well-formed but its values were not
    pub fn is_invalid(&self) -> bool {
        matches!(self, ConfigError::Invalid { .. } | ConfigError::Env { .. })
    }
}
