use axum::{error_handling::HandleErrorLayer, middleware, routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower::{timeout::TimeoutLayer, ServiceBuilder};

use crate::pipeline::{apply, Pipeline};

use super::error::{not_found, timed_out};
use super::handlers::{anonymized_ip, client_ip, hashed_ip, health, metrics, ping, status, AppState};

pub const IP: &str = "/v1/ip";
pub const IP_ANONYMIZED: &str = "/v1/ip/anonymized";
pub const IP_HASHED: &str = "/v1/ip/hashed";
pub const METRICS: &str = "/v1/metrics";
pub const STATUS: &str = "/v1/status";
pub const HEALTH: &str = "/v1/health";
pub const PING: &str = "/v1/ping";

/// Every route runs behind `pipeline`; the 404 fallback does not.
///
/// Serve with `into_make_service_with_connect_info::<SocketAddr>()`, the address
/// handlers need the transport peer.
pub fn create_router(state: Arc<AppState>, pipeline: Pipeline) -> Router {
    Router::new()
        .route(IP, get(client_ip))
        .route(IP_ANONYMIZED, get(anonymized_ip))
        .route(IP_HASHED, get(hashed_ip))
        .route(METRICS, get(metrics))
        .route(STATUS, get(status))
        .route(HEALTH, get(health))
        .route(PING, get(ping))
        .route_layer(middleware::from_fn_with_state(pipeline, apply))
        .fallback(not_found)
        .with_state(state)
}

/// Bounds the time between receiving a request and producing its response.
pub fn with_write_timeout(router: Router, timeout: Duration) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(timed_out))
            .layer(TimeoutLayer::new(timeout)),
    )
}
