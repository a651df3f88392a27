//! Shared-token authentication
//!
//! When a token is configured every request must carry it in the
//! `x-auth-token` header. Without a token the layer lets everything through.

use axum::{
    extract::Request,
    response::{IntoResponse, Response},
};
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::info;

use crate::error::AppError;

/// Header carrying the client token
pub const AUTH_HEADER: &str = "x-auth-token";

#[derive(Clone, Default)]
pub struct TokenAuthLayer {
    token: Option<Arc<str>>,
}

impl TokenAuthLayer {
    /// `None` disables the check.
    pub fn new(token: Option<&str>) -> Self {
        Self {
            token: token.map(Arc::from),
        }
    }
}

impl<S> Layer<S> for TokenAuthLayer {
    type Service = TokenAuth<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TokenAuth {
            inner,
            token: self.token.clone(),
        }
    }
}

#[derive(Clone)]
pub struct TokenAuth<S> {
    inner: S,
    token: Option<Arc<str>>,
}

impl<S> TokenAuth<S> {
    fn authorized(&self, request: &Request) -> bool {
        let Some(expected) = self.token.as_deref() else {
            return true;
        };

        request
            .headers()
            .get(AUTH_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|presented| presented == expected)
    }
}

impl<S> Service<Request> for TokenAuth<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        if !self.authorized(&request) {
            info!(
                method = %request.method(),
                uri = %request.uri(),
                status = 401,
                "Rejected request without a valid token"
            );
            return Box::pin(async { Ok(AppError::Unauthorized.into_response()) });
        }

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(request).await })
    }
}
