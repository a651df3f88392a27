//! Database access
//!
//! [`SqlGateway`] owns the single SQLite connection and is the only code that
//! touches it. Every operation takes the gateway's lock for its whole
//! duration, so at most one statement runs against the connection at a time.
//! Failures are logged and reported through [`ResultEnvelope`]; nothing here
//! returns a raw database error to the caller.

use futures::StreamExt;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqliteConnection};
use sqlx::{Connection, Executor, Statement};
use std::str::FromStr;
use tdb_common::{BatchRequest, ResultEnvelope, SqlScalar, StatementRequest};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

pub mod decode;
pub mod schema;

pub use decode::{decode_value, read_raw, ColumnSpec, RawValues, TypedRowDecoder};
pub use schema::load_schemas;

/// Query listing user tables
pub const LIST_TABLES_SQL: &str =
    "SELECT name FROM sqlite_schema WHERE type = 'table' AND name NOT LIKE 'sqlite_%'";

const CLOSED_MESSAGE: &str = "database connection is closed";

/// Errors opening the database
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid data source '{dsn}': {source}")]
    InvalidDsn {
        dsn: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Failed to open database '{dsn}': {source}")]
    Open {
        dsn: String,
        #[source]
        source: sqlx::Error,
    },
}

/// An undecoded result set: column names in select order and every value as
/// the text SQLite stores for it, `None` for null
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

struct Scan {
    columns: Vec<ColumnSpec>,
    rows: Vec<RawValues>,
}

/// Serialized access to the one database connection
pub struct SqlGateway {
    dsn: String,
    conn: Mutex<Option<SqliteConnection>>,
}

impl std::fmt::Debug for SqlGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlGateway").field("dsn", &self.dsn).finish()
    }
}

impl SqlGateway {
    /// Open the connection. `dsn` is a file path, `:memory:` or a
    /// `sqlite:` URL; missing database files are created.
    pub async fn open(dsn: &str) -> Result<Self, GatewayError> {
        let options = SqliteConnectOptions::from_str(dsn)
            .map_err(|source| GatewayError::InvalidDsn {
                dsn: dsn.to_string(),
                source,
            })?
            .create_if_missing(true);

        let conn = SqliteConnection::connect_with(&options)
            .await
            .map_err(|source| GatewayError::Open {
                dsn: dsn.to_string(),
                source,
            })?;

        info!(dsn = %dsn, "Database opened");

        Ok(Self {
            dsn: dsn.to_string(),
            conn: Mutex::new(Some(conn)),
        })
    }

    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    /// Prepare, bind and execute one statement.
    ///
    /// On success the result is the affected-row count.
    pub async fn execute_one(&self, request: &StatementRequest) -> ResultEnvelope {
        let mut guard = self.conn.lock().await;
        let Some(conn) = guard.as_mut() else {
            return closed("execute_one");
        };

        let statement = match (&mut *conn).prepare(request.sql.as_str()).await {
            Ok(statement) => statement,
            Err(e) => return failed("prepare", &request.sql, e),
        };

        match bind_params(statement.query(), &request.params)
            .execute(&mut *conn)
            .await
        {
            Ok(done) => ResultEnvelope::affected(done.rows_affected()),
            Err(e) => failed("execute", &request.sql, e),
        }
    }

    /// Execute the batch's statement once per active row under one lock
    /// acquisition.
    ///
    /// A failing row is logged and not counted; the remaining rows still
    /// run. The result is the total affected count when at least one row
    /// succeeded, otherwise the last row error.
    pub async fn execute_batch(&self, batch: &BatchRequest) -> ResultEnvelope {
        let mut guard = self.conn.lock().await;
        let Some(conn) = guard.as_mut() else {
            return closed("execute_batch");
        };

        let statement = match (&mut *conn).prepare(batch.sql()).await {
            Ok(statement) => statement,
            Err(e) => return failed("prepare", batch.sql(), e),
        };

        let mut total = 0u64;
        let mut succeeded = 0usize;
        let mut last_error = None;

        for (idx, params) in batch.active_rows().iter().enumerate() {
            match bind_params(statement.query(), params)
                .execute(&mut *conn)
                .await
            {
                Ok(done) => {
                    total += done.rows_affected();
                    succeeded += 1;
                },
                Err(e) => {
                    error!(
                        operation = "execute_batch",
                        row = idx + 1,
                        error = %e,
                        sql = %batch.sql(),
                        "Batch row failed"
                    );
                    last_error = Some(e.to_string());
                },
            }
        }

        match last_error {
            Some(message) if succeeded == 0 => ResultEnvelope::failure(message),
            _ => {
                debug!(
                    rows = batch.active_count(),
                    succeeded,
                    affected = total,
                    "Batch executed"
                );
                ResultEnvelope::affected(total)
            },
        }
    }

    /// Run a read and decode every row.
    ///
    /// A row that cannot be scanned is logged and left out. An error while
    /// stepping stops the scan: before the first row it fails the query,
    /// after it the rows read so far are returned.
    pub async fn query(&self, sql: &str) -> ResultEnvelope {
        match self.scan("query", sql).await {
            Ok(scan) => {
                let decoder = TypedRowDecoder::new(scan.columns);
                ResultEnvelope::rows(scan.rows.iter().map(|row| decoder.decode(row)).collect())
            },
            Err(message) => ResultEnvelope::failure(message),
        }
    }

    /// Run a read without decoding. Values keep the text SQLite stores, so
    /// nothing the decoder would discard is lost. Failures are logged and
    /// returned as the error message.
    pub async fn query_raw(&self, sql: &str) -> Result<RawRows, String> {
        let scan = self.scan("query_raw", sql).await?;

        Ok(RawRows {
            columns: scan.columns.into_iter().map(|column| column.name).collect(),
            rows: scan
                .rows
                .into_iter()
                .map(|row| {
                    row.into_iter()
                        .map(|raw| raw.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
                        .collect()
                })
                .collect(),
        })
    }

    async fn scan(&self, operation: &'static str, sql: &str) -> Result<Scan, String> {
        let mut guard = self.conn.lock().await;
        let Some(conn) = guard.as_mut() else {
            return Err(rejected(operation));
        };

        let statement = match (&mut *conn).prepare(sql).await {
            Ok(statement) => statement,
            Err(e) => return Err(report(operation, sql, e)),
        };

        let columns = TypedRowDecoder::from_columns(statement.columns())
            .columns()
            .to_vec();
        let mut results = Vec::new();
        let mut stepped = false;
        let mut rows = statement.query().fetch(&mut *conn);

        while let Some(next) = rows.next().await {
            let row = match next {
                Ok(row) => row,
                Err(e) if !stepped => return Err(report(operation, sql, e)),
                Err(e) => {
                    error!(operation = "rows", error = %e, sql = %sql, "Row iteration failed");
                    break;
                },
            };
            stepped = true;

            match read_raw(&row) {
                Ok(values) => results.push(values),
                Err(e) => {
                    error!(operation = "scan", error = %e, sql = %sql, "Skipping unreadable row");
                },
            }
        }

        Ok(Scan {
            columns,
            rows: results,
        })
    }

    /// Names of the user tables, empty on failure.
    pub async fn list_tables(&self) -> Vec<String> {
        let Some(rows) = self.query(LIST_TABLES_SQL).await.into_rows() else {
            return Vec::new();
        };

        rows.into_iter()
            .filter_map(|mut row| match row.remove("name") {
                Some(tdb_common::SqlValue::Text(name)) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Release the connection. Later operations fail with a closed error.
    pub async fn close(&self) {
        let conn = self.conn.lock().await.take();
        match conn {
            Some(conn) => match conn.close().await {
                Ok(()) => info!(dsn = %self.dsn, "Database closed"),
                Err(e) => error!(operation = "close", error = %e, "Failed to close database"),
            },
            None => warn!(dsn = %self.dsn, "Database already closed"),
        }
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &'q [SqlScalar],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            SqlScalar::Null => query.bind(None::<String>),
            SqlScalar::Integer(value) => query.bind(*value),
            SqlScalar::Real(value) => query.bind(*value),
            SqlScalar::Boolean(value) => query.bind(*value),
            SqlScalar::Text(value) => query.bind(value.as_str()),
        };
    }
    query
}

fn failed(operation: &'static str, sql: &str, e: sqlx::Error) -> ResultEnvelope {
    ResultEnvelope::failure(report(operation, sql, e))
}

fn report(operation: &'static str, sql: &str, e: sqlx::Error) -> String {
    error!(operation, error = %e, sql = %sql, "Statement failed");
    describe(&e)
}

fn closed(operation: &'static str) -> ResultEnvelope {
    ResultEnvelope::failure(rejected(operation))
}

fn rejected(operation: &'static str) -> String {
    error!(operation, error = CLOSED_MESSAGE, "Statement rejected");
    CLOSED_MESSAGE.to_string()
}

/// Database errors carry the driver message; anything else its display form.
fn describe(e: &sqlx::Error) -> String {
    match e {
        sqlx::Error::Database(db) => db.message().to_string(),
        other => other.to_string(),
    }
}
