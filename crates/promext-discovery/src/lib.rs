//! promext-discovery: configured Prometheus instances as targets.
//!
//! The target list is derived from the in-memory instance registry, so
//! discovery never touches the network and never needs retries.
//!
//! # Architecture
//!
//! ```text
//! CachedDiscovery (refresh at startup, then every 30s)
//!   └── InstanceDiscovery::discover_targets()
//!         ├── one Target per registry instance, in registry order
//!         └── AttributeExcludes::apply()
//! ```

pub mod cache;
pub mod descriptor;
pub mod excludes;
pub mod instance;

pub use cache::{CachedDiscovery, DEFAULT_REFRESH_INTERVAL};
pub use descriptor::{
    AttributeDescription, Column, DiscoverEndpoint, DiscoveryDescription, OrderBy, PluralLabel,
    Table, TargetDescription,
};
pub use excludes::AttributeExcludes;
pub use instance::{DISCOVERED_TARGETS_PATH, InstanceDiscovery};
