//! Embedded DuckDB connection handle.
//!
//! One handle owns one DuckDB connection. Extension setup (`httpfs` for the
//! remote Parquet files, `spatial` for geometry functions) runs once per
//! handle on first use. Queries on a handle are serialized by its mutex.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use duckdb::types::{ToSqlOutput, Value, ValueRef};
use duckdb::{Connection, ToSql};

use super::{EngineError, QueryExecutor, QueryResult, SqlValue};

const EXTENSIONS: [&str; 2] = ["httpfs", "spatial"];

pub struct DuckDbConnection {
    inner: Arc<Mutex<Connection>>,
    load_extensions: bool,
    extensions_loaded: AtomicBool,
}

impl DuckDbConnection {
    /// Open an in-memory database. Extensions load lazily on [`QueryExecutor::prepare`].
    pub fn open_in_memory(load_extensions: bool) -> Result<Self, EngineError> {
        let conn =
            Connection::open_in_memory().map_err(|e| EngineError::Connection(e.to_string()))?;
        log::debug!("Opened in-memory DuckDB connection");
        Ok(Self {
            inner: Arc::new(Mutex::new(conn)),
            load_extensions,
            extensions_loaded: AtomicBool::new(false),
        })
    }

    /// Close the underlying connection.
    ///
    /// Fails if a query is still running on a worker thread.
    pub fn close(self) -> Result<(), EngineError> {
        let mutex = Arc::try_unwrap(self.inner)
            .map_err(|_| EngineError::Connection("connection is still in use".to_string()))?;
        let conn = mutex
            .into_inner()
            .map_err(|_| EngineError::Connection("connection mutex poisoned".to_string()))?;
        conn.close()
            .map_err(|(_, e)| EngineError::Connection(e.to_string()))
    }

    async fn run_blocking<T, F>(&self, operation: &'static str, f: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, EngineError> + Send + 'static,
    {
        let conn = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| EngineError::Connection("connection mutex poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| EngineError::query(operation, e))?
    }
}

#[async_trait]
impl QueryExecutor for DuckDbConnection {
    async fn prepare(&self) -> Result<(), EngineError> {
        if !self.load_extensions || self.extensions_loaded.load(Ordering::Acquire) {
            return Ok(());
        }

        for extension in EXTENSIONS {
            self.run_blocking("loading extensions", move |conn| {
                conn.execute_batch(&format!("INSTALL {0}; LOAD {0};", extension))
                    .map_err(|e| EngineError::Extension {
                        extension: extension.to_string(),
                        message: e.to_string(),
                    })
            })
            .await?;
            log::info!("Loaded DuckDB extension: {}", extension);
        }

        self.extensions_loaded.store(true, Ordering::Release);
        Ok(())
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult, EngineError> {
        let sql = sql.to_string();
        let params = params.to_vec();
        self.run_blocking("executing query", move |conn| run_query(conn, &sql, &params))
            .await
    }

    async fn execute_batch(&self, sql: &str) -> Result<(), EngineError> {
        let sql = sql.to_string();
        self.run_blocking("executing statements", move |conn| {
            conn.execute_batch(&sql)
                .map_err(|e| EngineError::query("executing statements", e))
        })
        .await
    }
}

fn run_query(conn: &Connection, sql: &str, params: &[SqlValue]) -> Result<QueryResult, EngineError> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| EngineError::query("preparing statement", e))?;
    let mut rows = stmt
        .query(duckdb::params_from_iter(params.iter()))
        .map_err(|e| EngineError::query("executing statement", e))?;

    let columns: Vec<String> = rows.as_ref().map(|s| s.column_names()).unwrap_or_default();
    let mut out = Vec::new();

    while let Some(row) = rows
        .next()
        .map_err(|e| EngineError::query("fetching rows", e))?
    {
        let mut values = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            let value: Value = row.get(idx).map_err(|e| EngineError::Decode {
                column: idx,
                message: e.to_string(),
            })?;
            values.push(from_duckdb(value));
        }
        out.push(values);
    }

    Ok(QueryResult { columns, rows: out })
}

fn from_duckdb(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Boolean(b) => SqlValue::Bool(b),
        Value::TinyInt(i) => SqlValue::Int(i.into()),
        Value::SmallInt(i) => SqlValue::Int(i.into()),
        Value::Int(i) => SqlValue::Int(i.into()),
        Value::BigInt(i) => SqlValue::Int(i),
        // SUM over integer columns widens to HUGEINT
        Value::HugeInt(i) => i64::try_from(i)
            .map(SqlValue::Int)
            .unwrap_or(SqlValue::Float(i as f64)),
        Value::UTinyInt(u) => SqlValue::Int(u.into()),
        Value::USmallInt(u) => SqlValue::Int(u.into()),
        Value::UInt(u) => SqlValue::Int(u.into()),
        Value::UBigInt(u) => i64::try_from(u)
            .map(SqlValue::Int)
            .unwrap_or(SqlValue::Float(u as f64)),
        Value::Float(f) => SqlValue::Float(f.into()),
        Value::Double(f) => SqlValue::Float(f),
        Value::Decimal(d) => {
            let text = d.to_string();
            text.parse()
                .map(SqlValue::Float)
                .unwrap_or(SqlValue::Text(text))
        }
        Value::Text(s) => SqlValue::Text(s),
        Value::Enum(s) => SqlValue::Text(s),
        other => SqlValue::Text(format!("{:?}", other)),
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Bool(b) => ToSqlOutput::Owned(Value::Boolean(*b)),
            SqlValue::Int(i) => ToSqlOutput::Owned(Value::BigInt(*i)),
            SqlValue::Float(f) => ToSqlOutput::Owned(Value::Double(*f)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}
