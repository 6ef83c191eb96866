//! Prometheus instance discovery.

use std::collections::BTreeMap;
use std::sync::Arc;

use promext_core::{
    ATTR_INSTANCE_NAME, ATTR_INSTANCE_URL, ExtensionConfig, INSTANCE_TARGET_TYPE,
    InstanceRegistry, Target,
};

use crate::descriptor::{
    AttributeDescription, Column, DiscoverEndpoint, DiscoveryDescription, OrderBy, PluralLabel,
    Table, TargetDescription,
};
use crate::excludes::AttributeExcludes;

/// Path the host calls to fetch discovered targets.
pub const DISCOVERED_TARGETS_PATH: &str = "/prometheus/instance/discovery/discovered-targets";

/// Lists every configured instance as a target.
#[derive(Debug, Clone)]
pub struct InstanceDiscovery {
    registry: Arc<InstanceRegistry>,
    excludes: AttributeExcludes,
}

impl InstanceDiscovery {
    pub fn new(registry: Arc<InstanceRegistry>, excludes: AttributeExcludes) -> Self {
        Self { registry, excludes }
    }

    pub fn from_config(registry: Arc<InstanceRegistry>, config: &ExtensionConfig) -> Self {
        Self::new(
            registry,
            AttributeExcludes::new(config.discovery_attributes_excludes_instance.iter().cloned()),
        )
    }

    /// One target per instance, in registry order, excludes applied.
    ///
    /// Recomputed from scratch on every call.
    pub fn discover_targets(&self) -> Vec<Target> {
        let mut targets: Vec<Target> = self
            .registry
            .instances()
            .iter()
            .map(|instance| Target {
                id: instance.name.clone(),
                label: instance.name.clone(),
                target_type: INSTANCE_TARGET_TYPE.to_string(),
                attributes: BTreeMap::from([
                    (ATTR_INSTANCE_NAME.to_string(), vec![instance.name.clone()]),
                    (ATTR_INSTANCE_URL.to_string(), vec![instance.base_url.clone()]),
                ]),
            })
            .collect();

        self.excludes.apply(&mut targets);
        targets
    }

    pub fn describe(&self, call_interval_secs: u64) -> DiscoveryDescription {
        DiscoveryDescription {
            id: INSTANCE_TARGET_TYPE.to_string(),
            restrict_to: "LEADER".to_string(),
            discover: DiscoverEndpoint {
                method: "GET".to_string(),
                path: DISCOVERED_TARGETS_PATH.to_string(),
                call_interval: format!("{call_interval_secs}s"),
            },
        }
    }

    pub fn describe_target(&self) -> TargetDescription {
        TargetDescription {
            id: INSTANCE_TARGET_TYPE.to_string(),
            label: PluralLabel::new("Prometheus instance", "Prometheus instances"),
            category: "monitoring".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            table: Table {
                columns: vec![
                    Column {
                        attribute: ATTR_INSTANCE_NAME.to_string(),
                    },
                    Column {
                        attribute: ATTR_INSTANCE_URL.to_string(),
                    },
                ],
                order_by: vec![OrderBy {
                    attribute: ATTR_INSTANCE_NAME.to_string(),
                    direction: "ASC".to_string(),
                }],
            },
        }
    }

    pub fn describe_attributes(&self) -> Vec<AttributeDescription> {
        vec![
            AttributeDescription {
                attribute: ATTR_INSTANCE_NAME.to_string(),
                label: PluralLabel::new("Prometheus instance name", "Prometheus instance names"),
            },
            AttributeDescription {
                attribute: ATTR_INSTANCE_URL.to_string(),
                label: PluralLabel::new("Prometheus instance URL", "Prometheus instance URLs"),
            },
        ]
    }
}
