//! Middleware for the TransientDB server
//!
//! - Request logging with tracing
//! - Token authentication
//! - Security response headers
//! - Concurrency limit and request timeout

use axum::{
    http::{header, HeaderName, HeaderValue},
    Router,
};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::config::Config;

pub mod auth;

pub use auth::{TokenAuthLayer, AUTH_HEADER};

/// Value of the `server` response header
pub const SERVER_NAME: &str = "TransientDB";

/// Create tracing/logging layer
pub fn tracing_layer(
) -> TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>>
{
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(tower_http::LatencyUnit::Micros),
        )
}

/// Headers added to every response
pub fn security_headers() -> [(HeaderName, HeaderValue); 4] {
    [
        (
            HeaderName::from_static("x-xss-protection"),
            HeaderValue::from_static("1; mode=block"),
        ),
        (header::SERVER, HeaderValue::from_static(SERVER_NAME)),
        (header::X_FRAME_OPTIONS, HeaderValue::from_static("deny")),
        (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
    ]
}

/// Wrap `router` in the full middleware stack.
///
/// Outermost first: tracing, security headers, token check, concurrency
/// limit, timeout.
pub fn apply(router: Router, config: &Config) -> Router {
    let router = router
        .layer(TimeoutLayer::new(config.server.request_timeout()))
        .layer(GlobalConcurrencyLimitLayer::new(
            config.server.max_concurrent_requests,
        ))
        .layer(TokenAuthLayer::new(config.auth.required_token()));

    security_headers()
        .into_iter()
        .fold(router, |router, (name, value)| {
            router.layer(SetResponseHeaderLayer::overriding(name, value))
        })
        .layer(tracing_layer())
}
