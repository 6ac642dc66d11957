//! API integration tests
//!
//! These tests drive the assembled router, interceptor pipeline included, with
//! an injected transport peer and an in-memory SQLite counter.

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use ipsight::api::{self, AppState};
use ipsight::config::DatabaseBackend;
use ipsight::pipeline::default_pipeline;
use ipsight::storage::{AccessCounter, CounterStore, SqliteStorage};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::{Layer, ServiceExt};

const PROXY: &str = "127.0.0.1";
const POLICY: &str = "https://example.com/privacy";
const CLIENT: &str = "203.0.113.9:5555";
const VIA_PROXY: &str = "127.0.0.1:40000";

/// Helper to create a counter over fresh test storage
async fn create_test_counter() -> Arc<AccessCounter> {
    let storage = SqliteStorage::new("sqlite::memory:", 5).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(AccessCounter::load(Arc::new(storage)).await.unwrap())
}

/// Helper to build the full application as seen from `peer`
fn create_app(counter: Arc<AccessCounter>, peer: &str) -> Router {
    let state = Arc::new(AppState {
        counter,
        trusted_proxy: PROXY.to_string(),
        database_backend: DatabaseBackend::Sqlite,
    });
    let pipeline = default_pipeline(POLICY).unwrap();

    api::create_router(state, pipeline).layer(TestConnectInfoLayer {
        addr: peer.parse().unwrap(),
    })
}

/// Helper layer to inject ConnectInfo for tests
#[derive(Clone)]
struct TestConnectInfoLayer {
    addr: SocketAddr,
}

impl<S> Layer<S> for TestConnectInfoLayer {
    type Service = TestConnectInfoMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TestConnectInfoMiddleware {
            inner,
            addr: self.addr,
        }
    }
}

#[derive(Clone)]
struct TestConnectInfoMiddleware<S> {
    inner: S,
    addr: SocketAddr,
}

impl<S, B> tower::Service<Request<B>> for TestConnectInfoMiddleware<S>
where
    S: tower::Service<Request<B>> + Clone,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        req.extensions_mut()
            .insert(axum::extract::connect_info::ConnectInfo(self.addr));
        self.inner.call(req)
    }
}

fn get(uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header("user-agent", "ipsight-tests/1.0")
}

async fn body_string(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Wait for detached increments to land
async fn wait_for_count(counter: &AccessCounter, expected: u64) -> u64 {
    for _ in 0..100 {
        let count = counter.count().await;
        if count >= expected {
            return count;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    counter.count().await
}

#[tokio::test]
async fn test_plain_text_ip_from_untrusted_peer() {
    let counter = create_test_counter().await;
    let app = create_app(counter.clone(), CLIENT);

    let request = get("/v1/ip")
        .header("x-forwarded-for", "9.9.9.9")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/plain");
    assert_eq!(body_string(response).await, "203.0.113.9");
}

#[tokio::test]
async fn test_json_ip_via_trusted_proxy() {
    let counter = create_test_counter().await;
    let app = create_app(counter, VIA_PROXY);

    let request = get("/v1/ip")
        .header("content-type", "application/json")
        .header("x-forwarded-for", "9.9.9.9, 10.0.0.1")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/json");
    assert_eq!(body_json(response).await, serde_json::json!({ "ipv4": "9.9.9.9" }));
}

#[tokio::test]
async fn test_trusted_proxy_without_headers_returns_proxy() {
    let counter = create_test_counter().await;
    let app = create_app(counter, VIA_PROXY);

    let response = app
        .oneshot(get("/v1/ip").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(body_string(response).await, "127.0.0.1");
}

#[tokio::test]
async fn test_mapped_proxy_peer_is_trusted() {
    let counter = create_test_counter().await;
    let app = create_app(counter, "[::ffff:127.0.0.1]:40000");

    let request = get("/v1/ip")
        .header("x-forwarded-for", "9.9.9.9")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "9.9.9.9");
}

#[tokio::test]
async fn test_mapped_client_peer_is_reported_as_ipv4() {
    let counter = create_test_counter().await;
    let app = create_app(counter, "[::ffff:203.0.113.9]:5555");

    let request = get("/v1/ip")
        .header("content-type", "application/json")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({ "ipv4": "203.0.113.9" })
    );
}

#[tokio::test]
async fn test_anonymized_ipv6_json() {
    let counter = create_test_counter().await;
    let app = create_app(counter, VIA_PROXY);

    let request = get("/v1/ip/anonymized")
        .header("content-type", "application/json")
        .header("cf-connecting-ip", "2001:db8:85a3::8a2e:370:7334")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({ "ipv6": "2001:db8:85a3::" })
    );
}

#[tokio::test]
async fn test_anonymized_ipv4_plain_text() {
    let counter = create_test_counter().await;
    let app = create_app(counter, CLIENT);

    let response = app
        .oneshot(get("/v1/ip/anonymized").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "203.0.0.0");
}

#[tokio::test]
async fn test_anonymizing_invalid_forwarded_value_fails() {
    let counter = create_test_counter().await;
    let app = create_app(counter.clone(), VIA_PROXY);

    let request = get("/v1/ip/anonymized")
        .header("x-real-ip", "not-an-ip")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["code"], 500);
    assert_eq!(
        json["message"],
        "Failed to anonymize IP address. Please try again later."
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(counter.count().await, 0, "failed requests must not be counted");
}

#[tokio::test]
async fn test_hashed_ip_accepts_unvalidated_value() {
    let counter = create_test_counter().await;
    let app = create_app(counter, VIA_PROXY);

    let request = get("/v1/ip/hashed")
        .header("x-real-ip", "not-an-ip")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert_eq!(body, ipsight::client_ip::hash_ip("not-an-ip"));
}

#[tokio::test]
async fn test_hashed_ip_json_is_keyed_by_family() {
    let counter = create_test_counter().await;
    let app = create_app(counter, CLIENT);

    let request = get("/v1/ip/hashed")
        .header("content-type", "application/json")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let digest = json["ipv4"].as_str().unwrap();
    assert_eq!(digest.len(), 64);
    assert_eq!(digest, ipsight::client_ip::hash_ip("203.0.113.9"));
}

#[tokio::test]
async fn test_successful_requests_are_counted() {
    let counter = create_test_counter().await;
    let app = create_app(counter.clone(), CLIENT);

    for uri in ["/v1/ip", "/v1/ip/anonymized", "/v1/ip/hashed"] {
        let response = app
            .clone()
            .oneshot(get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(wait_for_count(&counter, 3).await, 3);

    let response = app
        .oneshot(get("/v1/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(response).await, serde_json::json!({ "count": 3 }));
}

#[tokio::test]
async fn test_missing_user_agent_is_rejected_before_handler() {
    let counter = create_test_counter().await;
    let app = create_app(counter.clone(), CLIENT);

    let request = Request::builder()
        .uri("/v1/ip")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()["privacy-policy"], POLICY);
    let json = body_json(response).await;
    assert_eq!(json, serde_json::json!({ "message": "User agent is missing.", "code": 400 }));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(counter.count().await, 0);
}

#[tokio::test]
async fn test_post_is_rejected() {
    let counter = create_test_counter().await;
    let app = create_app(counter, CLIENT);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/ip")
        .header("user-agent", "ipsight-tests/1.0")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body_json(response).await["code"], 405);
}

#[tokio::test]
async fn test_head_passes_method_gate() {
    let counter = create_test_counter().await;
    let app = create_app(counter, CLIENT);

    let request = Request::builder()
        .method(Method::HEAD)
        .uri("/v1/ip")
        .header("user-agent", "ipsight-tests/1.0")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_options_preflight_short_circuits() {
    let counter = create_test_counter().await;
    let app = create_app(counter.clone(), CLIENT);

    // No user agent: the preflight never reaches that check
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/v1/ip")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers["access-control-allow-methods"], "GET, HEAD, OPTIONS");
    assert!(headers.get("strict-transport-security").is_none());
    assert!(headers.get("privacy-policy").is_none());
    assert!(body_string(response).await.is_empty());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(counter.count().await, 0);
}

#[tokio::test]
async fn test_response_headers_on_success() {
    let counter = create_test_counter().await;
    let app = create_app(counter, CLIENT);

    let response = app
        .oneshot(get("/v1/ip").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(
        headers["strict-transport-security"],
        "max-age=63072000; includeSubDomains"
    );
    assert_eq!(headers["content-security-policy"], "default-src 'none'");
    assert_eq!(headers["x-frame-options"], "deny");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["privacy-policy"], POLICY);
}

#[tokio::test]
async fn test_unmatched_route_is_json_404() {
    let counter = create_test_counter().await;
    let app = create_app(counter, CLIENT);

    let response = app
        .oneshot(get("/v1/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().get("privacy-policy").is_none());
    assert_eq!(body_json(response).await["code"], 404);
}

#[tokio::test]
async fn test_status_health_and_ping() {
    let counter = create_test_counter().await;
    let app = create_app(counter.clone(), CLIENT);

    let response = app
        .clone()
        .oneshot(get("/v1/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(
        body_json(response).await,
        serde_json::json!({ "server": "Online", "database": "Online" })
    );

    let response = app
        .clone()
        .oneshot(get("/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["name"], "ipsight");
    assert_eq!(json["dependencies"][0]["service"], "sqlite");
    assert_eq!(json["dependencies"][0]["status"], "Online");

    let response = app
        .clone()
        .oneshot(get("/v1/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_string(response).await, "pong");

    // None of these are counted
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(counter.count().await, 0);
}

#[tokio::test]
async fn test_status_reports_offline_database() {
    let counter = create_test_counter().await;
    counter.close().await.unwrap();
    let app = create_app(counter, CLIENT);

    let response = app
        .oneshot(get("/v1/status").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["database"], "Offline");
}
