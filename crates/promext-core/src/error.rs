//! Configuration error types.

use thiserror::Error;

/// Result type alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading configuration at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("additional request parameters must be key-value pairs, got {0} entries")]
    OddRequestParams(usize),

    #[error("instance #{index} has an empty name")]
    EmptyName { index: usize },

    #[error("duplicate instance name: {0}")]
    DuplicateInstance(String),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Returned by [`crate::InstanceRegistry::find_by_name`] for unknown names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no Prometheus instance named '{0}'")]
pub struct InstanceNotFound(pub String);
