//! Query entry point: instance lookup, client construction, execution,
//! normalization.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Instrument};

use promext_core::{ExtensionConfig, InstanceRegistry, QueryRequest, Sample};

use crate::client::{ClientFactory, ClientSettings};
use crate::error::QueryError;
use crate::executor::RangeQueryExecutor;
use crate::normalize::normalize;
use crate::retry::RetryPolicy;

/// Answers metric queries against the configured instances.
#[derive(Debug, Clone)]
pub struct MetricQueryService {
    registry: Arc<InstanceRegistry>,
    factory: ClientFactory,
    policy: RetryPolicy,
}

impl MetricQueryService {
    pub fn new(registry: Arc<InstanceRegistry>, factory: ClientFactory, policy: RetryPolicy) -> Self {
        Self {
            registry,
            factory,
            policy,
        }
    }

    /// Wire the service from loaded configuration.
    pub fn from_config(registry: Arc<InstanceRegistry>, config: &ExtensionConfig) -> Self {
        Self::new(
            registry,
            ClientFactory::new(ClientSettings::from_config(config)),
            RetryPolicy::from_config(config),
        )
    }

    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `request` and return its samples.
    ///
    /// Lookup and validation happen before any network I/O. Only the range
    /// query itself is retried.
    pub async fn query_metrics(
        &self,
        request: &QueryRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<Sample>, QueryError> {
        let instance = self
            .registry
            .find_by_name(&request.instance)
            .map_err(|e| QueryError::InstanceNotFound(e.0))?;

        let query = match request.query.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => q,
            _ => return Err(QueryError::MissingQuery),
        };

        let client = self
            .factory
            .build(instance)
            .map_err(|source| QueryError::Connection {
                instance: instance.name.clone(),
                source,
            })?;

        let span = info_span!("query_metrics", instance = %instance.name, query);
        async {
            let matrix = RangeQueryExecutor::new(self.policy)
                .with_step(request.step)
                .execute(&client, &instance.name, query, request.timestamp, cancel)
                .await?;

            let samples = normalize(&matrix);
            debug!(series = matrix.len(), samples = samples.len(), "query complete");
            Ok::<_, QueryError>(samples)
        }
        .instrument(span)
        .await
    }
}
