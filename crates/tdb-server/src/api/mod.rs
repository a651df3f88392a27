//! HTTP API
//!
//! Every data endpoint hands the gateway's `ResultEnvelope` back with a 200
//! status, whether or not the statement succeeded. Only requests with no SQL
//! to run or an unusable insert payload are rejected with a 400.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::config::Config;
use crate::db::SqlGateway;

pub mod routes;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<SqlGateway>,
}

impl AppState {
    pub fn new(gateway: Arc<SqlGateway>) -> Self {
        Self { gateway }
    }
}

/// Routes without middleware
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::root))
        .route("/tables", get(routes::tables))
        .route("/count/:table", get(routes::count))
        .route("/vacuum", get(routes::vacuum))
        .route("/table/:table", get(routes::table_records))
        .route("/table/:table/:field/:value", get(routes::records_by_field))
        .route("/execute", post(routes::execute))
        .route("/query", post(routes::query))
        .route("/insert/:table", post(routes::insert))
        .route("/index/:table/:name/:field", post(routes::create_index))
        .with_state(state)
}

/// The full application: routes plus the middleware stack
pub fn app(gateway: Arc<SqlGateway>, config: &Config) -> Router {
    crate::middleware::apply(router(AppState::new(gateway)), config)
}
