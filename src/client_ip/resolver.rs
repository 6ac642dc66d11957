//! Client IP resolution behind a single trusted reverse proxy
//!
//! Forwarded headers are only honored when the direct transport peer *is* the
//! trusted proxy. Any other peer is the client as far as we can tell, whatever
//! headers it sends.
//!
//! Header-derived values are returned as-is; syntax is checked later, if at all,
//! by the privacy transforms.

use axum::http::HeaderMap;
use thiserror::Error;

/// Forwarding headers in priority order. The first non-empty one wins.
pub const FORWARDED_HEADERS: [&str; 4] = [
    "cf-connecting-ip",
    "true-client-ip",
    "x-real-ip",
    "x-forwarded-for",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("malformed peer address '{0}'")]
    MalformedPeerAddress(String),
}

/// Resolve the client address for a request.
///
/// # Arguments
/// * `peer` - transport peer in `host:port` form (`[v6]:port` for IPv6)
/// * `headers` - request headers
/// * `trusted_proxy` - the only peer allowed to supply forwarded headers
pub fn resolve_client_ip(
    peer: &str,
    headers: &HeaderMap,
    trusted_proxy: &str,
) -> Result<String, ResolveError> {
    let peer_host = split_host(peer)?;

    if peer_host != trusted_proxy {
        return Ok(peer_host.to_string());
    }

    for name in FORWARDED_HEADERS {
        if let Some(client) = forwarded_client(headers, name) {
            return Ok(client);
        }
    }

    Ok(peer_host.to_string())
}

/// Leftmost entry of a forwarding header, the hop closest to the client.
fn forwarded_client(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?.to_str().ok()?;
    if value.is_empty() {
        return None;
    }

    let leftmost = value
        .split(',')
        .next()
        .unwrap_or(value)
        .trim();

    Some(leftmost.to_string())
}

/// Host part of a `host:port` pair with IPv6 brackets stripped.
fn split_host(peer: &str) -> Result<&str, ResolveError> {
    let malformed = || ResolveError::MalformedPeerAddress(peer.to_string());

    if let Some(rest) = peer.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(malformed)?;
        if !tail.starts_with(':') || host.contains('[') {
            return Err(malformed());
        }
        return Ok(host);
    }

    let (host, _port) = peer.rsplit_once(':').ok_or_else(malformed)?;

    // Bare IPv6 literals must be bracketed to carry a port
    if host.contains(':') || host.contains('[') || host.contains(']') {
        return Err(malformed());
    }

    Ok(host)
}
