//! Process-wide extension settings.
//!
//! Settings come from `PROMEXT_*` environment variables or, when the daemon
//! is started with `--config`, from a TOML file of the same shape:
//!
//! ```toml
//! insecure_skip_verify = false
//! enable_request_logging = true
//! query_retries = 3
//! discovery_attributes_excludes_instance = ["instance.url"]
//! additional_request_params = ["dedup", "true"]
//!
//! [[instances]]
//! name = "prom-a"
//! base_url = "https://prometheus.example.com"
//! header_key = "Authorization"
//! header_value = "Bearer ..."
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::instance::{Instance, InstanceRegistry};

/// Prefix shared by every environment variable the extension reads.
pub const ENV_PREFIX: &str = "PROMEXT_";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionConfig {
    /// Skip TLS certificate verification towards backends.
    pub insecure_skip_verify: bool,
    /// Log every backend request and response body at debug level.
    pub enable_request_logging: bool,
    /// Retries after the first failed query attempt. 0 disables retry.
    #[serde(alias = "retries")]
    pub query_retries: u32,
    /// Attribute keys dropped from discovered targets.
    pub discovery_attributes_excludes_instance: Vec<String>,
    /// Flat key/value list appended to every backend query.
    pub additional_request_params: Vec<String>,
}

impl ExtensionConfig {
    /// Read settings from the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(ENV_PREFIX, |key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`, a stand-in for `std::env::var`.
    pub fn from_lookup<F>(prefix: &str, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            let key = format!("{prefix}{name}");
            lookup(&key)
                .filter(|v| !v.trim().is_empty())
                .map(|v| (key, v))
        };

        let mut config = Self::default();
        if let Some((key, value)) = var("INSECURE_SKIP_VERIFY") {
            config.insecure_skip_verify = parse_bool(&key, &value)?;
        }
        if let Some((key, value)) = var("ENABLE_REQUEST_LOGGING") {
            config.enable_request_logging = parse_bool(&key, &value)?;
        }
        if let Some((key, value)) = var("QUERY_RETRIES").or_else(|| var("RETRIES")) {
            config.query_retries = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue { key, value })?;
        }
        if let Some((_, value)) = var("DISCOVERY_ATTRIBUTES_EXCLUDES_INSTANCE") {
            config.discovery_attributes_excludes_instance = split_list(&value);
        }
        if let Some((_, value)) = var("ADDITIONAL_REQUEST_PARAMS") {
            config.additional_request_params = split_list(&value);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.additional_request_params.len() % 2 != 0 {
            return Err(ConfigError::OddRequestParams(
                self.additional_request_params.len(),
            ));
        }
        Ok(())
    }

    /// Additional request params as `(key, value)` pairs.
    pub fn additional_params(&self) -> Vec<(String, String)> {
        self.additional_request_params
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect()
    }
}

/// Everything loaded at startup: settings plus the instance registry.
#[derive(Debug, Clone)]
pub struct Settings {
    pub extension: ExtensionConfig,
    pub registry: InstanceRegistry,
}

/// On-disk shape of a settings file.
#[derive(Debug, Deserialize)]
struct SettingsFile {
    #[serde(flatten)]
    extension: ExtensionConfig,
    #[serde(default)]
    instances: Vec<Instance>,
}

impl Settings {
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            extension: ExtensionConfig::from_env()?,
            registry: InstanceRegistry::from_env()?,
        })
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let file: SettingsFile = toml::from_str(content)?;
        file.extension.validate()?;
        Ok(Self {
            extension: file.extension,
            registry: InstanceRegistry::new(file.instances)?,
        })
    }
}

/// Go-style boolean parsing: 1/t/true and 0/f/false, case-insensitive.
fn parse_bool(key: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Ok(true),
        "0" | "f" | "false" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
