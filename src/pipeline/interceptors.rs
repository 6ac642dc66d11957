//! The fixed interceptors mounted in front of every endpoint

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::Request,
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_SECURITY_POLICY, STRICT_TRANSPORT_SECURITY,
            USER_AGENT, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
        },
        HeaderName, HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::error;

use super::{Interceptor, Next, Pipeline};
use crate::api::error::ApiError;

pub const PRIVACY_POLICY: HeaderName = HeaderName::from_static("privacy-policy");

const HSTS: &str = "max-age=63072000; includeSubDomains";
const CSP: &str = "default-src 'none'";
const CORS_ALLOW_METHODS: &str = "GET, HEAD, OPTIONS";
const CORS_ALLOW_HEADERS: &str = "Accept, Content-Type, Content-Length, Accept-Encoding";

/// The service's interceptor stack, in composition order.
///
/// Panic recovery is listed first and so runs innermost: it covers the handler
/// only, not the interceptors listed after it.
pub fn default_pipeline(privacy_policy: &str) -> Result<Pipeline, axum::http::header::InvalidHeaderValue> {
    Ok(Pipeline::chain(vec![
        Arc::new(PanicRecovery),
        Arc::new(RequireUserAgent),
        Arc::new(AcceptMethods),
        Arc::new(PrivacyPolicy::new(privacy_policy)?),
        Arc::new(SecurityHeaders),
        Arc::new(Cors),
    ]))
}

/// Turns a panic inside the wrapped scope into a 500 JSON error.
pub struct PanicRecovery;

#[async_trait]
impl Interceptor for PanicRecovery {
    fn name(&self) -> &'static str {
        "panic_recovery"
    }

    async fn intercept(&self, request: Request, next: Next<'_>) -> Response {
        match AssertUnwindSafe(next.run(request)).catch_unwind().await {
            Ok(response) => response,
            Err(payload) => {
                error!(panic = %panic_message(payload.as_ref()), "panic recovered");

                ApiError::internal("Internal server error. Please try again later.")
                    .into_response()
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Rejects requests without a user agent with 400.
pub struct RequireUserAgent;

#[async_trait]
impl Interceptor for RequireUserAgent {
    fn name(&self) -> &'static str {
        "require_user_agent"
    }

    async fn intercept(&self, request: Request, next: Next<'_>) -> Response {
        let missing = request
            .headers()
            .get(USER_AGENT)
            .map(|value| value.as_bytes().is_empty())
            .unwrap_or(true);

        if missing {
            return ApiError::new(StatusCode::BAD_REQUEST, "User agent is missing.")
                .into_response();
        }

        next.run(request).await
    }
}

/// Allows GET, HEAD and OPTIONS; everything else gets 405.
pub struct AcceptMethods;

#[async_trait]
impl Interceptor for AcceptMethods {
    fn name(&self) -> &'static str {
        "accept_methods"
    }

    async fn intercept(&self, request: Request, next: Next<'_>) -> Response {
        let method = request.method();
        if method != Method::GET && method != Method::HEAD && method != Method::OPTIONS {
            return ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed.")
                .into_response();
        }

        next.run(request).await
    }
}

/// Sets `Privacy-Policy: <uri>` on every response.
pub struct PrivacyPolicy {
    uri: HeaderValue,
}

impl PrivacyPolicy {
    pub fn new(uri: &str) -> Result<Self, axum::http::header::InvalidHeaderValue> {
        Ok(Self {
            uri: HeaderValue::from_str(uri)?,
        })
    }
}

#[async_trait]
impl Interceptor for PrivacyPolicy {
    fn name(&self) -> &'static str {
        "privacy_policy"
    }

    async fn intercept(&self, request: Request, next: Next<'_>) -> Response {
        let mut response = next.run(request).await;
        response
            .headers_mut()
            .insert(PRIVACY_POLICY, self.uri.clone());
        response
    }
}

/// HSTS, CSP, frame and content-type hardening headers.
pub struct SecurityHeaders;

#[async_trait]
impl Interceptor for SecurityHeaders {
    fn name(&self) -> &'static str {
        "security_headers"
    }

    async fn intercept(&self, request: Request, next: Next<'_>) -> Response {
        let mut response = next.run(request).await;
        let headers = response.headers_mut();

        headers.insert(STRICT_TRANSPORT_SECURITY, HeaderValue::from_static(HSTS));
        headers.insert(CONTENT_SECURITY_POLICY, HeaderValue::from_static(CSP));
        headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("deny"));
        headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));

        response
    }
}

/// Permissive CORS. Preflight (OPTIONS) requests are answered here with an
/// empty body and never reach later stages.
pub struct Cors;

impl Cors {
    fn decorate(response: &mut Response) {
        let headers = response.headers_mut();

        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(CORS_ALLOW_METHODS),
        );
        headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(CORS_ALLOW_HEADERS),
        );
    }
}

#[async_trait]
impl Interceptor for Cors {
    fn name(&self) -> &'static str {
        "cors"
    }

    async fn intercept(&self, request: Request, next: Next<'_>) -> Response {
        let mut response = if request.method() == Method::OPTIONS {
            Response::new(Body::empty())
        } else {
            next.run(request).await
        };

        Cors::decorate(&mut response);
        response
    }
}
