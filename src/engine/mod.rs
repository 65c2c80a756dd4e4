//! Data engine boundary
//!
//! The planner only produces SQL text plus positional `?` parameters; running
//! it is delegated to a [`QueryExecutor`]. A connection handle is owned by the
//! caller's session and injected, so expensive engine setup (remote file
//! access, spatial functions) happens once per handle rather than per call.
//!
//! A handle runs at most one query at a time. Callers that need parallel
//! queries open separate handles.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "duckdb")]
pub mod duckdb_engine;
pub mod log_render;
pub mod scripted;

#[cfg(feature = "duckdb")]
pub use duckdb_engine::DuckDbConnection;
pub use log_render::render_query_for_log;
pub use scripted::{result_of, ScriptedExecutor};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("Failed to open engine connection: {0}")]
    Connection(String),

    #[error("Failed to load engine extension '{extension}': {message}")]
    Extension { extension: String, message: String },

    #[error("Query failed while {operation}: {message}")]
    Query { operation: String, message: String },

    #[error("Could not decode column {column} of a result row: {message}")]
    Decode { column: usize, message: String },
}

impl EngineError {
    pub fn query(operation: impl Into<String>, message: impl fmt::Display) -> Self {
        EngineError::Query {
            operation: operation.into(),
            message: message.to_string(),
        }
    }
}

/// A scalar bound to a placeholder or read back from a result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Text content, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of the value. `None` for NULL and non-numeric values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Int(i) => Some(*i as f64),
            SqlValue::Float(f) => Some(*f),
            SqlValue::Text(s) => s.trim().parse().ok(),
            SqlValue::Bool(_) | SqlValue::Null => None,
        }
    }

    /// Render as the string form used for opaque codes and labels.
    pub fn to_code_string(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Bool(b) => Some(b.to_string()),
            SqlValue::Int(i) => Some(i.to_string()),
            SqlValue::Float(f) => Some(f.to_string()),
            SqlValue::Text(s) => Some(s.clone()),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

pub type Row = Vec<SqlValue>;

/// Column names plus rows, in engine order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Read-only analytical SQL execution against the census tables.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Perform one-time setup (extensions, settings). Idempotent.
    async fn prepare(&self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Run `sql`, binding `params` to its `?` placeholders in order.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult, EngineError>;

    /// Run statements that return no rows (view definitions, settings).
    async fn execute_batch(&self, sql: &str) -> Result<(), EngineError> {
        self.execute(sql, &[]).await.map(|_| ())
    }
}
