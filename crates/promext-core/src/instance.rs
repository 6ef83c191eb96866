//! Backend instances and the registry built from indexed definitions.
//!
//! Instances are read once at startup, either from the environment
//! (`PROMEXT_INSTANCE_<N>_NAME`, `_ORIGIN`, `_HEADER_KEY`, `_HEADER_VALUE`)
//! or from the `[[instances]]` table of a config file. The resulting
//! [`InstanceRegistry`] is immutable and shared by reference.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ConfigError, ConfigResult, InstanceNotFound};

/// A configured Prometheus endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_key: Option<String>,
    #[serde(default, skip_serializing)]
    pub header_value: Option<String>,
}

impl Instance {
    /// Unauthenticated instance.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            header_key: None,
            header_value: None,
        }
    }

    /// Attach an auth header sent with every backend request.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.header_key = Some(key.into());
        self.header_value = Some(value.into());
        self
    }

    /// True iff both header key and value are non-empty.
    pub fn is_authenticated(&self) -> bool {
        self.auth_header().is_some()
    }

    /// The auth header pair, if the instance is authenticated.
    pub fn auth_header(&self) -> Option<(&str, &str)> {
        match (self.header_key.as_deref(), self.header_value.as_deref()) {
            (Some(key), Some(value)) if !key.is_empty() && !value.is_empty() => Some((key, value)),
            _ => None,
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("header_key", &self.header_key)
            .field("header_value", &self.header_value.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Immutable, name-indexed set of configured instances.
///
/// Lookups are a linear scan; deployments configure a handful of instances.
#[derive(Debug, Clone, Default)]
pub struct InstanceRegistry {
    instances: Vec<Instance>,
}

impl InstanceRegistry {
    /// Build a registry, rejecting empty and duplicate names.
    ///
    /// An instance without an origin is kept; querying it fails with a
    /// connection error while the other instances stay usable.
    pub fn new(instances: Vec<Instance>) -> ConfigResult<Self> {
        let mut seen = HashSet::new();
        for (index, instance) in instances.iter().enumerate() {
            if instance.name.trim().is_empty() {
                return Err(ConfigError::EmptyName { index });
            }
            if instance.base_url.trim().is_empty() {
                warn!(instance = %instance.name, "instance has no origin, queries against it will fail");
            }
            if !seen.insert(instance.name.as_str()) {
                return Err(ConfigError::DuplicateInstance(instance.name.clone()));
            }
        }
        Ok(Self { instances })
    }

    /// Scan `{prefix}INSTANCE_<N>_*` keys from index 0 up to the first missing name.
    pub fn from_lookup<F>(prefix: &str, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |index: usize, field: &str| {
            lookup(&format!("{prefix}INSTANCE_{index}_{field}")).filter(|v| !v.is_empty())
        };

        let mut instances = Vec::new();
        while let Some(name) = var(instances.len(), "NAME") {
            let index = instances.len();
            let header_key = var(index, "HEADER_KEY");
            let header_value = var(index, "HEADER_VALUE");
            if header_key.is_some() != header_value.is_some() {
                warn!(
                    instance = %name,
                    "only one of HEADER_KEY / HEADER_VALUE is set, requests will be unauthenticated"
                );
            }
            instances.push(Instance {
                base_url: var(index, "ORIGIN").unwrap_or_default(),
                name,
                header_key,
                header_value,
            });
        }

        debug!(count = instances.len(), "loaded instance definitions");
        Self::new(instances)
    }

    /// Read instance definitions from the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(crate::ENV_PREFIX, |key| std::env::var(key).ok())
    }

    /// Find the instance with the given name.
    pub fn find_by_name(&self, name: &str) -> Result<&Instance, InstanceNotFound> {
        self.instances
            .iter()
            .find(|i| i.name == name)
            .ok_or_else(|| InstanceNotFound(name.to_string()))
    }

    /// All instances in definition order.
    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
