//! Request handlers
//!
//! Table, field and index names from the path are spliced into the SQL
//! as-is. Callers are trusted.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use serde_json::Value;
use std::collections::HashMap;
use tdb_common::{BatchRequest, ResultEnvelope, SqlScalar, StatementRequest};
use tracing::{debug, info};

use super::AppState;
use crate::db::LIST_TABLES_SQL;
use crate::error::AppError;
use crate::middleware::SERVER_NAME;

/// Rows returned by the table endpoints when `limit` is absent
pub const DEFAULT_LIMIT: i64 = 100;

type Envelope = Json<ResultEnvelope>;

pub async fn root() -> &'static str {
    SERVER_NAME
}

pub async fn tables(State(state): State<AppState>) -> Envelope {
    Json(state.gateway.query(LIST_TABLES_SQL).await)
}

pub async fn count(State(state): State<AppState>, Path(table): Path<String>) -> Envelope {
    let sql = format!("SELECT COUNT(*) as records FROM {table}");
    Json(state.gateway.query(&sql).await)
}

pub async fn vacuum(State(state): State<AppState>) -> Envelope {
    Json(state.gateway.execute_one(&StatementRequest::new("VACUUM")).await)
}

pub async fn table_records(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Envelope {
    let (offset, limit) = paging(&params);
    let sql = format!("SELECT * FROM {table} LIMIT {offset}, {limit}");
    Json(state.gateway.query(&sql).await)
}

pub async fn records_by_field(
    State(state): State<AppState>,
    Path((table, field, value)): Path<(String, String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Envelope {
    let (offset, limit) = paging(&params);
    let sql = format!("SELECT * FROM {table} WHERE {field} = '{value}' LIMIT {offset}, {limit}");
    Json(state.gateway.query(&sql).await)
}

pub async fn execute(State(state): State<AppState>, body: Bytes) -> Result<Envelope, AppError> {
    let sql = sql_body(&body)?;
    debug!(sql = %sql, "Execute");
    Ok(Json(state.gateway.execute_one(&StatementRequest::new(sql)).await))
}

pub async fn query(State(state): State<AppState>, body: Bytes) -> Result<Envelope, AppError> {
    let sql = sql_body(&body)?;
    debug!(sql = %sql, "Query");
    Ok(Json(state.gateway.query(&sql).await))
}

/// Insert or replace one JSON object, or an array of them
pub async fn insert(
    State(state): State<AppState>,
    Path(table): Path<String>,
    body: Bytes,
) -> Result<Envelope, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::no_body());
    }

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid JSON: {e}")))?;
    let batch = insert_batch(&table, &payload)?;

    Ok(Json(state.gateway.execute_batch(&batch).await))
}

pub async fn create_index(
    State(state): State<AppState>,
    Path((table, name, field)): Path<(String, String, String)>,
) -> Envelope {
    let sql = format!("CREATE INDEX IF NOT EXISTS {name} ON {table} ({field})");
    let result = state.gateway.execute_one(&StatementRequest::new(sql)).await;
    if result.success {
        info!(index = %name, table = %table, field = %field, "Created index");
    }
    Json(result)
}

/// `(offset, limit)`; unparseable values fall back to `(0, 100)`.
pub fn paging(params: &HashMap<String, String>) -> (i64, i64) {
    let parse = |key: &str, default: i64| {
        params
            .get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    };
    (parse("offset", 0), parse("limit", DEFAULT_LIMIT))
}

fn sql_body(body: &[u8]) -> Result<String, AppError> {
    let sql = String::from_utf8_lossy(body).trim().to_string();
    if sql.is_empty() {
        return Err(AppError::no_body());
    }
    Ok(sql)
}

/// Build the `INSERT OR REPLACE` batch for a JSON payload.
///
/// Columns are the keys of the first object. Keys missing from later
/// objects bind as NULL; extra keys are ignored.
pub fn insert_batch(table: &str, payload: &Value) -> Result<BatchRequest, AppError> {
    let objects: Vec<&serde_json::Map<String, Value>> = match payload {
        Value::Object(object) => vec![object],
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_object().ok_or_else(|| {
                    AppError::BadRequest("Expected an array of JSON objects".to_string())
                })
            })
            .collect::<Result<_, _>>()?,
        _ => {
            return Err(AppError::BadRequest(
                "Expected a JSON object or an array of objects".to_string(),
            ))
        },
    };

    let columns: Vec<&str> = objects
        .first()
        .map(|first| first.keys().map(String::as_str).collect())
        .unwrap_or_default();
    if columns.is_empty() {
        return Err(AppError::BadRequest("Nothing to insert".to_string()));
    }

    let rows: Vec<Vec<SqlScalar>> = objects
        .iter()
        .map(|object| {
            columns
                .iter()
                .map(|column| object.get(*column).map(SqlScalar::from).unwrap_or(SqlScalar::Null))
                .collect()
        })
        .collect();

    let sql = format!(
        "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
        table,
        columns.join(","),
        vec!["?"; columns.len()].join(",")
    );

    Ok(BatchRequest::from_rows(sql, rows))
}
