//! Typed row decoding
//!
//! Turns the raw bytes SQLite reports for a column into a JSON-native
//! [`SqlValue`], driven by the column's declared type name. Decoding never
//! fails: values that do not parse fall back to a fixed substitute.

use sqlx::sqlite::{SqliteColumn, SqliteRow};
use sqlx::{Column, Row, TypeInfo};
use tdb_common::{RowMapping, SqlValue};

/// One row as SQLite hands it over, `None` for null
pub type RawValues = Vec<Option<Vec<u8>>>;

/// Name and declared type of one result column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub type_name: String,
}

/// Column layout of one result set
#[derive(Debug, Clone, Default)]
pub struct TypedRowDecoder {
    columns: Vec<ColumnSpec>,
}

impl TypedRowDecoder {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self { columns }
    }

    pub fn from_columns(columns: &[SqliteColumn]) -> Self {
        Self::new(
            columns
                .iter()
                .map(|column| ColumnSpec {
                    name: column.name().to_string(),
                    type_name: column.type_info().name().to_string(),
                })
                .collect(),
        )
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Build the mapping for one row read by [`read_raw`]
    pub fn decode(&self, values: &[Option<Vec<u8>>]) -> RowMapping {
        self.columns
            .iter()
            .zip(values)
            .map(|(column, raw)| {
                (
                    column.name.clone(),
                    decode_value(&column.type_name, raw.as_deref()),
                )
            })
            .collect()
    }
}

/// Copy out every column of `row` as its stored bytes.
///
/// The error is a scan failure on a column of this row.
pub fn read_raw(row: &SqliteRow) -> Result<RawValues, sqlx::Error> {
    (0..row.len())
        .map(|idx| {
            row.try_get_unchecked::<Option<&[u8]>, _>(idx)
                .map(|raw| raw.map(<[u8]>::to_vec))
        })
        .collect()
}

/// Convert one raw column value.
///
/// - absent → null
/// - `INTEGER` → base-10 i64, or null when it does not parse
/// - `BOOLEAN` → bool, or `false` when it does not parse
/// - anything else → the bytes as text
pub fn decode_value(type_name: &str, raw: Option<&[u8]>) -> SqlValue {
    let Some(bytes) = raw else {
        return SqlValue::Null;
    };
    let text = String::from_utf8_lossy(bytes);

    match type_name.to_ascii_uppercase().as_str() {
        "INTEGER" => text
            .parse::<i64>()
            .map(SqlValue::Integer)
            .unwrap_or(SqlValue::Null),
        "BOOLEAN" => SqlValue::Boolean(parse_bool(&text).unwrap_or(false)),
        _ => SqlValue::Text(text.into_owned()),
    }
}

/// Boolean literals accepted for `BOOLEAN` columns
fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
