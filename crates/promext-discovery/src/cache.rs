//! Periodically refreshed snapshot of discovered targets.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, watch};
use tracing::{debug, info};

use promext_core::Target;

use crate::instance::InstanceDiscovery;

/// How often the target list is recomputed.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Serves the last computed target list and refreshes it in the background.
#[derive(Debug, Clone)]
pub struct CachedDiscovery {
    discovery: InstanceDiscovery,
    targets: Arc<RwLock<Vec<Target>>>,
    interval: Duration,
}

impl CachedDiscovery {
    pub fn new(discovery: InstanceDiscovery) -> Self {
        Self::with_interval(discovery, DEFAULT_REFRESH_INTERVAL)
    }

    pub fn with_interval(discovery: InstanceDiscovery, interval: Duration) -> Self {
        Self {
            discovery,
            targets: Arc::new(RwLock::new(Vec::new())),
            interval,
        }
    }

    pub fn discovery(&self) -> &InstanceDiscovery {
        &self.discovery
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Recompute the target list and replace the snapshot.
    pub async fn refresh(&self) -> usize {
        let targets = self.discovery.discover_targets();
        let count = targets.len();
        *self.targets.write().await = targets;
        debug!(targets = count, "discovery refreshed");
        count
    }

    /// Latest snapshot. Empty until the first refresh.
    pub async fn targets(&self) -> Vec<Target> {
        self.targets.read().await.clone()
    }

    /// Refresh now, then every `interval` until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "instance discovery started");
        self.refresh().await;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    self.refresh().await;
                }
                _ = shutdown.changed() => {
                    info!("instance discovery shutting down");
                    break;
                }
            }
        }
    }
}
