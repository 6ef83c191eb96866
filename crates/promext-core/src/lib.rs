//! promext-core: shared model for the Prometheus check extension.
//!
//! Holds the configured backend instances, the process-wide extension
//! settings, and the plain data types that flow between the query,
//! discovery, and API crates.

pub mod config;
pub mod error;
pub mod instance;
pub mod types;

pub use config::{ENV_PREFIX, ExtensionConfig, Settings};
pub use error::{ConfigError, ConfigResult, InstanceNotFound};
pub use instance::{Instance, InstanceRegistry};
pub use types::*;
