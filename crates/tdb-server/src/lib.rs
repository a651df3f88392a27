//! TransientDB Server Library
//!
//! A SQLite database served over HTTP.
//!
//! # Overview
//!
//! - **Gateway**: one SQLite connection behind an async mutex ([`db::SqlGateway`])
//! - **Bootstrap**: schema files executed at startup, CSV files bulk-loaded
//!   in batches of 500 rows, one task per file ([`ingest`])
//! - **Maintenance**: tables periodically dumped back to CSV ([`maintenance`])
//! - **API**: raw SQL and table browsing endpoints over Axum ([`api`])
//!
//! Every data operation answers with a [`tdb_common::ResultEnvelope`]:
//! `{"success": bool, "result": ...}`.
//!
//! # Example
//!
//! ```no_run
//! use std::{path::Path, sync::Arc};
//! use tdb_server::{api, config::Config, db::SqlGateway};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(Path::new("./config.ini"))?;
//!     let gateway = Arc::new(SqlGateway::open(&config.server.dsn).await?);
//!     let app = api::app(gateway, &config);
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod maintenance;
pub mod middleware;

// Re-export commonly used types
pub use db::{GatewayError, SqlGateway};
pub use error::AppError;
