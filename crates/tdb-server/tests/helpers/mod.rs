//! Test helpers for TransientDB integration tests
//!
//! - In-memory gateways with a few canned tables
//! - CSV fixture writers
//! - Response body decoding

#![allow(dead_code)]

use axum::{body::Body, http::Request, response::Response};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tdb_common::{ResultEnvelope, RowMapping, StatementRequest};
use tdb_server::db::SqlGateway;

/// A private in-memory database
pub async fn memory_gateway() -> Arc<SqlGateway> {
    Arc::new(
        SqlGateway::open(":memory:")
            .await
            .expect("Failed to open in-memory database"),
    )
}

/// Run `sql` and panic unless it succeeds
pub async fn exec(gateway: &SqlGateway, sql: &str) -> ResultEnvelope {
    let result = gateway.execute_one(&StatementRequest::new(sql)).await;
    assert!(result.success, "{sql} failed: {:?}", result.error_message());
    result
}

/// Rows of `sql`, panicking if the query fails
pub async fn rows(gateway: &SqlGateway, sql: &str) -> Vec<RowMapping> {
    let result = gateway.query(sql).await;
    let message = result.error_message().map(str::to_string);
    result
        .into_rows()
        .unwrap_or_else(|| panic!("{sql} failed: {message:?}"))
}

/// `people (id INTEGER PRIMARY KEY, name TEXT NOT NULL, active BOOLEAN)`
pub async fn people_gateway() -> Arc<SqlGateway> {
    let gateway = memory_gateway().await;
    exec(
        &gateway,
        "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT NOT NULL, active BOOLEAN)",
    )
    .await;
    gateway
}

/// Write a CSV file with `header` and `records`, one line each
pub fn write_csv(dir: &Path, file_name: &str, header: &str, records: &[String]) -> PathBuf {
    let mut content = String::from(header);
    content.push('\n');
    for record in records {
        content.push_str(record);
        content.push('\n');
    }

    let path = dir.join(file_name);
    std::fs::write(&path, content).expect("Failed to write CSV fixture");
    path
}

/// Header matching [`numbered_records`]
pub const NUMBERED_HEADER: &str = "id,label,even";

/// `n` three-field records `"<i>,item-<i>,<i is even>"` for i in 1..=n
pub fn numbered_records(n: usize) -> Vec<String> {
    (1..=n)
        .map(|i| format!("{i},item-{i},{}", i % 2 == 0))
        .collect()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("Failed to build request")
}

pub fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(body.into())
        .expect("Failed to build request")
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body")
        .to_vec()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).expect("Body is not JSON")
}
