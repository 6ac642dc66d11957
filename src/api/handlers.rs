use axum::{
    extract::{ConnectInfo, State},
    http::{header::CONTENT_TYPE, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, warn};

use super::error::ApiError;
use crate::client_ip::{anonymize_ip, hash_ip, resolve_client_ip};
use crate::config::DatabaseBackend;
use crate::models::{AddressBody, CounterBody, Dependency, Health, ServiceStatus, Status};
use crate::storage::AccessCounter;

const APPLICATION_JSON: &str = "application/json";
const TEXT_PLAIN: &str = "text/plain";

pub struct AppState {
    pub counter: Arc<AccessCounter>,
    pub trusted_proxy: String,
    pub database_backend: DatabaseBackend,
}

/// Which form of the client address an endpoint exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressView {
    Raw,
    Anonymized,
    Hashed,
}

/// Client address as seen by the service
pub async fn client_ip(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    serve_address(&state, peer, &headers, AddressView::Raw)
}

/// Client address truncated to its network prefix
pub async fn anonymized_ip(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    serve_address(&state, peer, &headers, AddressView::Anonymized)
}

/// SHA-256 of the client address
pub async fn hashed_ip(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    serve_address(&state, peer, &headers, AddressView::Hashed)
}

/// Resolves, transforms and renders the client address.
///
/// A successful response schedules one detached counter increment before it is
/// returned to axum, so the count does not wait for the body to reach the
/// client. Rejected or failed requests never schedule one.
fn serve_address(
    state: &AppState,
    peer: SocketAddr,
    headers: &HeaderMap,
    view: AddressView,
) -> Result<Response, ApiError> {
    let peer = canonical_peer(peer);
    let resolved = resolve_client_ip(&peer.to_string(), headers, &state.trusted_proxy)
        .map_err(|err| {
            error!(error = %err, "Failed to get client IP address");
            ApiError::internal("Failed to get IP address. Please try again later.")
        })?;

    let address = match view {
        AddressView::Raw => resolved.clone(),
        AddressView::Anonymized => anonymize_ip(&resolved).ok_or_else(|| {
            error!(address = %resolved, "Failed to anonymize client IP address");
            ApiError::internal("Failed to anonymize IP address. Please try again later.")
        })?,
        AddressView::Hashed => hash_ip(&resolved),
    };

    let response = if wants_json(headers) {
        let body = AddressBody::new(&resolved, address).ok_or_else(|| {
            error!(address = %resolved, "Client IP address has no address family");
            ApiError::internal("Failed to marshal IP address to JSON. Please try again later.")
        })?;

        let json = serde_json::to_vec(&body).map_err(|err| {
            error!(error = %err, "Failed to marshal IP address to JSON");
            ApiError::internal("Failed to marshal IP address to JSON. Please try again later.")
        })?;

        ([(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON))], json).into_response()
    } else {
        ([(CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN))], address).into_response()
    };

    state.counter.spawn_increment();

    Ok(response)
}

/// Dual-stack listeners report IPv4 clients as `::ffff:a.b.c.d`.
fn canonical_peer(peer: SocketAddr) -> SocketAddr {
    SocketAddr::new(peer.ip().to_canonical(), peer.port())
}

/// Only an exact `application/json` request content type selects JSON.
fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .map(|value| value == APPLICATION_JSON)
        .unwrap_or(false)
}

/// Confirmed access count
pub async fn metrics(State(state): State<Arc<AppState>>) -> Json<CounterBody> {
    Json(CounterBody {
        count: state.counter.count().await,
    })
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<Status> {
    Json(Status {
        server: ServiceStatus::Online,
        database: database_status(&state).await,
    })
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Health> {
    Json(Health {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        dependencies: vec![Dependency {
            service: state.database_backend.as_str().to_string(),
            status: database_status(&state).await,
        }],
    })
}

pub async fn ping() -> impl IntoResponse {
    ([(CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN))], "pong")
}

async fn database_status(state: &AppState) -> ServiceStatus {
    match state.counter.ping().await {
        Ok(()) => ServiceStatus::Online,
        Err(err) => {
            warn!(error = %err, "Database is offline");
            ServiceStatus::Offline
        }
    }
}
