//! Ordered request interceptors
//!
//! A [`Pipeline`] is built from a list of interceptors with [`Pipeline::chain`].
//! Chaining wraps in listed order: the first entry wraps the terminal handler,
//! the second wraps the first, and so on. At request time the *last* listed
//! interceptor therefore runs first (outermost) and the first listed runs last,
//! right before the handler. An interceptor only ever sees what happens inside
//! the scope it wraps.
//!
//! The pipeline is mounted on a router as a single axum middleware via
//! [`apply`], so the terminal stage is whatever route axum dispatched to.

pub mod interceptors;

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    middleware,
    response::Response,
};
use std::sync::Arc;

pub use interceptors::{
    default_pipeline, AcceptMethods, Cors, PanicRecovery, PrivacyPolicy, RequireUserAgent,
    SecurityHeaders,
};

#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Stable name, used to inspect execution order
    fn name(&self) -> &'static str;

    /// Handle `request`, either answering it directly or passing it on with
    /// `next.run(request)`.
    async fn intercept(&self, request: Request, next: Next<'_>) -> Response;
}

/// The remainder of the pipeline below the interceptor currently running.
pub struct Next<'a> {
    remaining: &'a [Arc<dyn Interceptor>],
    terminal: middleware::Next,
}

impl Next<'_> {
    pub async fn run(self, request: Request) -> Response {
        match self.remaining.split_first() {
            Some((current, rest)) => {
                let next = Next {
                    remaining: rest,
                    terminal: self.terminal,
                };
                current.intercept(request, next).await
            }
            None => self.terminal.run(request).await,
        }
    }
}

#[derive(Clone)]
pub struct Pipeline {
    /// Interceptors in execution order, outermost first
    stack: Arc<[Arc<dyn Interceptor>]>,
}

impl Pipeline {
    /// Compose `interceptors` so that each entry wraps the ones listed before it.
    pub fn chain(interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        let mut stack = interceptors;
        stack.reverse();

        Self {
            stack: stack.into(),
        }
    }

    /// Interceptor names in the order they run for a request.
    pub fn execution_order(&self) -> Vec<&'static str> {
        self.stack.iter().map(|interceptor| interceptor.name()).collect()
    }

    pub async fn run(&self, request: Request, terminal: middleware::Next) -> Response {
        let next = Next {
            remaining: &self.stack[..],
            terminal,
        };
        next.run(request).await
    }
}

/// axum middleware entry point; mount with
/// `middleware::from_fn_with_state(pipeline, pipeline::apply)`.
pub async fn apply(
    State(pipeline): State<Pipeline>,
    request: Request,
    next: middleware::Next,
) -> Response {
    pipeline.run(request, next).await
}
