//! Data model shared by the gateway, the ingestor and the HTTP layer

use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

/// A positional bind parameter
#[derive(Debug, Clone, PartialEq)]
pub enum SqlScalar {
    Null,
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Text(String),
}

impl From<&str> for SqlScalar {
    fn from(value: &str) -> Self {
        SqlScalar::Text(value.to_string())
    }
}

impl From<String> for SqlScalar {
    fn from(value: String) -> Self {
        SqlScalar::Text(value)
    }
}

impl From<i64> for SqlScalar {
    fn from(value: i64) -> Self {
        SqlScalar::Integer(value)
    }
}

impl From<bool> for SqlScalar {
    fn from(value: bool) -> Self {
        SqlScalar::Boolean(value)
    }
}

impl<T: Into<SqlScalar>> From<Option<T>> for SqlScalar {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlScalar::Null)
    }
}

impl From<&serde_json::Value> for SqlScalar {
    /// Nested arrays and objects are stored as their JSON text.
    fn from(value: &serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => SqlScalar::Null,
            Value::Bool(b) => SqlScalar::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlScalar::Integer(i),
                None => n.as_f64().map(SqlScalar::Real).unwrap_or(SqlScalar::Null),
            },
            Value::String(s) => SqlScalar::Text(s.clone()),
            other => SqlScalar::Text(other.to_string()),
        }
    }
}

/// A decoded column value, serialized as the bare JSON value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Boolean(bool),
    Text(String),
}

/// One decoded row: column name to value.
///
/// Source column order is not kept; keys come back sorted.
pub type RowMapping = BTreeMap<String, SqlValue>;

/// A single statement with its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct StatementRequest {
    pub sql: String,
    pub params: Vec<SqlScalar>,
}

impl StatementRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<SqlScalar>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Parameter rows for one prepared statement.
///
/// Rows are allocated once and reused between flushes. Only the first
/// `active` rows belong to the current flush; anything after them is left
/// over from an earlier flush and is never handed out.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    sql: String,
    rows: Vec<Vec<SqlScalar>>,
    active: usize,
}

impl BatchRequest {
    /// Preallocate `capacity` rows of `width` parameters each.
    pub fn with_capacity(sql: impl Into<String>, capacity: usize, width: usize) -> Self {
        Self {
            sql: sql.into(),
            rows: (0..capacity).map(|_| Vec::with_capacity(width)).collect(),
            active: 0,
        }
    }

    /// Build an already-populated batch (every row active).
    pub fn from_rows(sql: impl Into<String>, rows: Vec<Vec<SqlScalar>>) -> Self {
        let active = rows.len();
        Self {
            sql: sql.into(),
            rows,
            active,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn capacity(&self) -> usize {
        self.rows.len()
    }

    pub fn active_count(&self) -> usize {
        self.active
    }

    pub fn is_empty(&self) -> bool {
        self.active == 0
    }

    pub fn is_full(&self) -> bool {
        self.active >= self.rows.len()
    }

    /// The rows populated for the current flush.
    pub fn active_rows(&self) -> &[Vec<SqlScalar>] {
        &self.rows[..self.active]
    }

    /// Copy `fields` positionally into the next free row.
    pub fn push_row<I, T>(&mut self, fields: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<SqlScalar>,
    {
        if self.active == self.rows.len() {
            self.rows.push(Vec::new());
        }
        let row = &mut self.rows[self.active];
        row.clear();
        row.extend(fields.into_iter().map(Into::into));
        self.active += 1;
    }

    /// Mark every row free again; allocations are kept.
    pub fn reset(&mut self) {
        self.active = 0;
    }
}

/// Payload of a [`ResultEnvelope`]
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    ErrorMessage(String),
    AffectedCount(u64),
    Rows(Vec<RowMapping>),
}

impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Outcome::ErrorMessage(message) => serializer.serialize_str(message),
            // Affected counts go over the wire as a one-element array
            Outcome::AffectedCount(count) => [*count].serialize(serializer),
            Outcome::Rows(rows) => rows.serialize(serializer),
        }
    }
}

/// The only thing data-access operations hand back to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultEnvelope {
    pub success: bool,
    pub result: Outcome,
}

impl ResultEnvelope {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            result: Outcome::ErrorMessage(message.into()),
        }
    }

    pub fn affected(count: u64) -> Self {
        Self {
            success: true,
            result: Outcome::AffectedCount(count),
        }
    }

    pub fn rows(rows: Vec<RowMapping>) -> Self {
        Self {
            success: true,
            result: Outcome::Rows(rows),
        }
    }

    /// Affected-row count, if this is a successful execution.
    pub fn affected_count(&self) -> Option<u64> {
        match (&self.result, self.success) {
            (Outcome::AffectedCount(count), true) => Some(*count),
            _ => None,
        }
    }

    pub fn into_rows(self) -> Option<Vec<RowMapping>> {
        match self.result {
            Outcome::Rows(rows) if self.success => Some(rows),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.result {
            Outcome::ErrorMessage(message) => Some(message),
            _ => None,
        }
    }
}
