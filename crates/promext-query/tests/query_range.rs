//! End-to-end query path against a mocked Prometheus HTTP API.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{TimeZone, Utc};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use promext_core::{Instance, InstanceRegistry, QueryRequest};
use promext_query::client::USER_AGENT;
use promext_query::{
    ClientFactory, ClientSettings, ErrorKind, MetricQueryService, QueryClient, QueryError,
    QueryValue, RangeWindow, RetryPolicy, TransportError,
};

const MATRIX_BODY: &str = r#"{
    "status": "success",
    "data": {
        "resultType": "matrix",
        "result": [
            {"metric": {"__name__": "up", "job": "prometheus"}, "values": [[1699999999, "1"], [1700000000, "1"]]},
            {"metric": {"__name__": "up", "job": "node"}, "values": [[1700000000, "0"]]}
        ]
    }
}"#;

fn window() -> RangeWindow {
    RangeWindow::ending_at(
        Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        std::time::Duration::from_secs(1),
    )
}

fn matrix_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(MATRIX_BODY)
}

fn service(instance: Instance, settings: ClientSettings, retries: u32) -> MetricQueryService {
    let registry = InstanceRegistry::new(vec![instance]).unwrap();
    MetricQueryService::new(
        Arc::new(registry),
        ClientFactory::new(settings),
        RetryPolicy::new(retries),
    )
}

#[tokio::test]
async fn posts_form_to_query_range() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/query_range"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(header("user-agent", USER_AGENT))
        .and(body_string_contains("query=up"))
        .and(body_string_contains("start=2023-11-14T22%3A13%3A19.000Z"))
        .and(body_string_contains("end=2023-11-14T22%3A13%3A20.000Z"))
        .and(body_string_contains("step=1"))
        .respond_with(matrix_response())
        .expect(1)
        .mount(&server)
        .await;

    let client = ClientFactory::default()
        .build(&Instance::new("prom", server.uri()))
        .unwrap();
    let response = client.query_range("up", window()).await.unwrap();

    let QueryValue::Matrix(series) = response.value else {
        panic!("expected matrix");
    };
    assert_eq!(series.len(), 2);
}

#[tokio::test]
async fn keeps_base_path_prefix() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prometheus/api/v1/query_range"))
        .respond_with(matrix_response())
        .expect(1)
        .mount(&server)
        .await;

    let client = ClientFactory::default()
        .build(&Instance::new("prom", format!("{}/prometheus/", server.uri())))
        .unwrap();
    client.query_range("up", window()).await.unwrap();
}

#[tokio::test]
async fn sends_auth_header_and_additional_params() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/query_range"))
        .and(header("authorization", "Bearer secret-token"))
        .and(body_string_contains("dedup=true"))
        .and(body_string_contains("partial_response=false"))
        .respond_with(matrix_response())
        .expect(1)
        .mount(&server)
        .await;

    let settings = ClientSettings {
        additional_params: vec![
            ("dedup".to_string(), "true".to_string()),
            ("partial_response".to_string(), "false".to_string()),
        ],
        enable_request_logging: true,
        ..ClientSettings::default()
    };
    let instance = Instance::new("prom", server.uri()).with_header("Authorization", "Bearer secret-token");
    let client = ClientFactory::new(settings).build(&instance).unwrap();

    client.query_range("up", window()).await.unwrap();
}

#[tokio::test]
async fn backend_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string(
            r#"{"status":"error","errorType":"bad_data","error":"1:3: parse error: unexpected end of input"}"#,
        ))
        .mount(&server)
        .await;

    let client = ClientFactory::default()
        .build(&Instance::new("prom", server.uri()))
        .unwrap();
    let err = client.query_range("up{", window()).await.unwrap_err();

    assert_eq!(
        err,
        TransportError::Backend {
            error_type: "bad_data".to_string(),
            message: "1:3: parse error: unexpected end of input".to_string(),
        }
    );
}

#[tokio::test]
async fn service_returns_normalized_samples() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/query_range"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(matrix_response())
        .expect(1)
        .mount(&server)
        .await;

    let instance = Instance::new("prom", server.uri()).with_header("Authorization", "Bearer secret-token");
    let svc = service(instance, ClientSettings::default(), 0);

    let request = QueryRequest::new(
        "prom",
        Some("up".to_string()),
        Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
    );
    let samples = svc
        .query_metrics(&request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(samples.len(), 3);
    assert_eq!(samples[0].labels["job"], "prometheus");
    assert_eq!(samples[0].timestamp.timestamp(), 1_699_999_999);
    assert_eq!(samples[1].labels["job"], "prometheus");
    assert_eq!(samples[2].labels["job"], "node");
    assert_eq!(samples[2].value, 0.0);
}

#[tokio::test]
async fn service_retries_transient_failures() {
    let server = MockServer::start().await;
    let calls = Arc::new(AtomicU32::new(0));
    let seen = calls.clone();
    Mock::given(method("POST"))
        .respond_with(move |_req: &Request| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                ResponseTemplate::new(503).set_body_string("service unavailable")
            } else {
                matrix_response()
            }
        })
        .expect(2)
        .mount(&server)
        .await;

    let svc = service(Instance::new("prom", server.uri()), ClientSettings::default(), 1);
    let request = QueryRequest::new("prom", Some("up".into()), Utc::now());
    let samples = svc
        .query_metrics(&request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(samples.len(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn service_exhausts_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("service unavailable"))
        .expect(3)
        .mount(&server)
        .await;

    let svc = service(Instance::new("prom-a", server.uri()), ClientSettings::default(), 2);
    let request = QueryRequest::new("prom-a", Some("up".into()), Utc::now());
    let err = svc
        .query_metrics(&request, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TransientQuery);
    assert_eq!(err.attempts(), Some(3));
    let msg = err.to_string();
    assert!(msg.contains("prom-a"));
    assert!(msg.contains("'up'"));
    assert!(msg.contains("503"));
}

#[tokio::test]
async fn service_rejects_vector_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"status":"success","data":{"resultType":"vector","result":[]}}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let svc = service(Instance::new("prom", server.uri()), ClientSettings::default(), 3);
    let request = QueryRequest::new("prom", Some("up".into()), Utc::now());
    let err = svc
        .query_metrics(&request, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, QueryError::ResultShape { found: "vector", .. }));
}

#[tokio::test]
async fn unreachable_instance_is_transient() {
    // Port 9 (discard) is not expected to accept connections.
    let svc = service(Instance::new("prom", "http://127.0.0.1:9"), ClientSettings::default(), 0);
    let request = QueryRequest::new("prom", Some("up".into()), Utc::now());
    let err = svc
        .query_metrics(&request, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TransientQuery);
}
