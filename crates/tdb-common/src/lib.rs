//! TransientDB Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types and logging for the TransientDB workspace.
//!
//! # Overview
//!
//! - **Types**: statement/batch requests, bind parameters, decoded row values
//!   and the uniform [`ResultEnvelope`] every data-access operation returns
//! - **Logging**: tracing subscriber setup shared by all binaries
//!
//! # Example
//!
//! ```
//! use tdb_common::{ResultEnvelope, SqlValue};
//!
//! let envelope = ResultEnvelope::affected(3);
//! assert!(envelope.success);
//! assert_eq!(serde_json::to_string(&envelope).unwrap(), r#"{"success":true,"result":[3]}"#);
//! assert_eq!(serde_json::to_string(&SqlValue::Null).unwrap(), "null");
//! ```

pub mod logging;
pub mod types;

// Re-export commonly used types
pub use types::{
    BatchRequest, Outcome, ResultEnvelope, RowMapping, SqlScalar, SqlValue, StatementRequest,
};
