//! Backend client factory and the range-query client abstraction.
//!
//! [`QueryClient`] is the seam the executor runs against; the
//! reqwest-backed [`PrometheusClient`] is the production implementation and
//! tests substitute fakes.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};

use promext_core::{ExtensionConfig, Instance};

use crate::error::{ConnectionError, TransportError};
use crate::wire::{QueryValue, decode_response};

/// User agent sent with every backend request.
pub const USER_AGENT: &str = concat!("promext/", env!("CARGO_PKG_VERSION"));

/// Path of the range-query endpoint, relative to an instance base URL.
const QUERY_RANGE_PATH: &str = "api/v1/query_range";

/// A closed time window `[start, end]` sampled every `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub step: Duration,
}

impl RangeWindow {
    /// The window `[at - step, at]` with resolution `step`.
    pub fn ending_at(at: DateTime<Utc>, step: Duration) -> Self {
        let width = chrono::Duration::from_std(step).unwrap_or(chrono::Duration::seconds(1));
        Self {
            start: at - width,
            end: at,
            step,
        }
    }
}

impl fmt::Display for RangeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}] step {}s",
            format_time(self.start),
            format_time(self.end),
            self.step.as_secs_f64()
        )
    }
}

/// A successfully decoded query response.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    pub value: QueryValue,
    /// Non-fatal warnings reported by the backend.
    pub warnings: Vec<String>,
}

/// Boxed future returned by [`QueryClient::query_range`].
pub type QueryFuture<'a> =
    Pin<Box<dyn Future<Output = Result<QueryResponse, TransportError>> + Send + 'a>>;

/// Executes range queries against one backend instance.
pub trait QueryClient: Send + Sync {
    fn query_range<'a>(&'a self, query: &'a str, window: RangeWindow) -> QueryFuture<'a>;
}

/// Transport settings shared by every client the factory builds.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub connect_timeout: Duration,
    /// Upper bound on a whole request, headers and body.
    pub request_timeout: Duration,
    pub tcp_keepalive: Duration,
    pub insecure_skip_verify: bool,
    pub enable_request_logging: bool,
    /// Extra form parameters appended to every query.
    pub additional_params: Vec<(String, String)>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
            tcp_keepalive: Duration::from_secs(30),
            insecure_skip_verify: false,
            enable_request_logging: false,
            additional_params: Vec::new(),
        }
    }
}

impl ClientSettings {
    pub fn from_config(config: &ExtensionConfig) -> Self {
        Self {
            insecure_skip_verify: config.insecure_skip_verify,
            enable_request_logging: config.enable_request_logging,
            additional_params: config.additional_params(),
            ..Self::default()
        }
    }
}

/// Builds a [`PrometheusClient`] per instance. Performs no network I/O.
#[derive(Debug, Clone, Default)]
pub struct ClientFactory {
    settings: ClientSettings,
}

impl ClientFactory {
    pub fn new(settings: ClientSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Build a client for `instance`, injecting its auth header if configured.
    pub fn build(&self, instance: &Instance) -> Result<PrometheusClient, ConnectionError> {
        let endpoint = query_range_url(&instance.base_url)?;

        let mut headers = HeaderMap::new();
        if let Some((key, value)) = instance.auth_header() {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| ConnectionError::InvalidHeader(key.to_string()))?;
            let mut value = HeaderValue::from_str(value)
                .map_err(|_| ConnectionError::InvalidHeader(key.to_string()))?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.request_timeout)
            .tcp_keepalive(self.settings.tcp_keepalive)
            .danger_accept_invalid_certs(self.settings.insecure_skip_verify)
            .build()
            .map_err(|e| ConnectionError::Build(e.to_string()))?;

        debug!(
            instance = %instance.name,
            %endpoint,
            authenticated = instance.is_authenticated(),
            "built Prometheus client"
        );

        Ok(PrometheusClient {
            http,
            endpoint,
            additional_params: self.settings.additional_params.clone(),
            log_requests: self.settings.enable_request_logging,
        })
    }
}

/// Resolve `<base>/api/v1/query_range`, keeping any path prefix on the base.
fn query_range_url(base_url: &str) -> Result<Url, ConnectionError> {
    let invalid = |reason: String| ConnectionError::InvalidUrl {
        url: base_url.to_string(),
        reason,
    };

    let mut url = Url::parse(base_url.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }

    let path = format!("{}/{QUERY_RANGE_PATH}", url.path().trim_end_matches('/'));
    url.set_path(&path);
    Ok(url)
}

/// reqwest-backed client for one Prometheus instance.
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    http: reqwest::Client,
    endpoint: Url,
    additional_params: Vec<(String, String)>,
    log_requests: bool,
}

impl PrometheusClient {
    /// The resolved query_range URL.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn send(&self, query: &str, window: RangeWindow) -> Result<QueryResponse, TransportError> {
        let mut form: Vec<(&str, String)> = vec![
            ("query", query.to_string()),
            ("start", format_time(window.start)),
            ("end", format_time(window.end)),
            ("step", window.step.as_secs_f64().to_string()),
        ];
        form.extend(
            self.additional_params
                .iter()
                .map(|(k, v)| (k.as_str(), v.clone())),
        );

        let request = self.http.post(self.endpoint.clone()).form(&form).build()?;
        let method = request.method().clone();
        let url = request.url().clone();

        if self.log_requests {
            let request_body = request
                .body()
                .and_then(|b| b.as_bytes())
                .map(String::from_utf8_lossy)
                .unwrap_or_default();
            debug!(%method, %url, %request_body, "sending Prometheus request");
        }

        let response = match self.http.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                if self.log_requests {
                    warn!(%method, %url, error = %e, "error during HTTP request");
                }
                return Err(e.into());
            }
        };

        let status = response.status();
        // Buffered once: logged and then decoded from the same bytes.
        let body = response.bytes().await?;

        if self.log_requests {
            debug!(
                %method,
                %url,
                status = status.as_u16(),
                response_body = %String::from_utf8_lossy(&body),
                "received Prometheus response"
            );
        }

        decode_response(status, &body)
    }
}

impl QueryClient for PrometheusClient {
    fn query_range<'a>(&'a self, query: &'a str, window: RangeWindow) -> QueryFuture<'a> {
        Box::pin(self.send(query, window))
    }
}

fn format_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}
