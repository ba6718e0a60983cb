//! DuckDB backend for the `Session` trait.
//!
//! `duckdb::Connection` is not safely shareable across threads without
//! external synchronization, so every operation is dispatched through
//! `spawn_blocking` against a connection guarded by a `tokio::sync::Mutex` —
//! the serialization a session's operations must have falls out of the
//! mutex rather than needing separate bookkeeping.

use super::{RowSet, Session};
use crate::plan::{self, Dialect, PlanTree};
use crate::utils::error::OptimizerError;
use async_trait::async_trait;
use duckdb::Connection;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct DuckDbSession {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbSession {
    pub fn connect(dsn: &str) -> Result<Self, OptimizerError> {
        let conn = if dsn.is_empty() || dsn == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(dsn)
        }
        .map_err(|e| OptimizerError::connect_failed(format!("duckdb open failed: {e}")))?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    async fn run_blocking<F, T>(&self, f: F) -> Result<T, OptimizerError>
    where
        F: FnOnce(&Connection) -> Result<T, duckdb::Error> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.blocking_lock();
            f(&guard)
        })
        .await
        .map_err(|e| OptimizerError::Other(anyhow::anyhow!("duckdb task panicked: {e}")))?
        .map_err(|e| OptimizerError::Other(anyhow::anyhow!("duckdb error: {e}")))
    }
}

#[async_trait]
impl Session for DuckDbSession {
    async fn execute(&self, sql: &str, limit: Option<u64>) -> Result<RowSet, OptimizerError> {
        let wrapped = wrap_with_limit(sql, limit);
        self.run_blocking(move |conn| {
            let mut stmt = conn.prepare(&wrapped)?;
            let columns: Vec<String> = stmt.column_names();
            let ncols = columns.len();
            let mut rows_out = Vec::new();
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let mut out_row = Vec::with_capacity(ncols);
                for i in 0..ncols {
                    let value: Option<String> = match row.get_ref(i)? {
                        duckdb::types::ValueRef::Null => None,
                        other => Some(duckdb_value_to_string(&other)),
                    };
                    out_row.push(value);
                }
                rows_out.push(out_row);
            }
            Ok(RowSet { columns, rows: rows_out })
        })
        .await
    }

    async fn explain(&self, sql: &str, analyze: bool) -> Result<PlanTree, OptimizerError> {
        let pragma = if analyze { "EXPLAIN ANALYZE" } else { "EXPLAIN" };
        let explain_sql = format!("{pragma} {}", sql.trim().trim_end_matches(';'));
        let raw = self
            .run_blocking(move |conn| {
                let mut stmt = conn.prepare(&explain_sql)?;
                let mut rows = stmt.query([])?;
                let mut lines = Vec::new();
                while let Some(row) = rows.next()? {
                    // DuckDB's EXPLAIN result has columns (explain_key, explain_value);
                    // the tree text lives in the last column.
                    let ncols = row.as_ref().column_count();
                    if let Ok(duckdb::types::ValueRef::Text(t)) = row.get_ref(ncols - 1) {
                        lines.push(String::from_utf8_lossy(t).into_owned());
                    }
                }
                Ok(lines.join("\n"))
            })
            .await?;
        plan::parse_explain(Dialect::DuckDb, &raw)
    }

    fn dialect(&self) -> Dialect {
        Dialect::DuckDb
    }
}

fn wrap_with_limit(sql: &str, limit: Option<u64>) -> String {
    match limit {
        Some(n) => format!("SELECT * FROM ({}) AS __limited__ LIMIT {n}", sql.trim().trim_end_matches(';')),
        None => sql.to_string(),
    }
}

fn duckdb_value_to_string(value: &duckdb::types::ValueRef<'_>) -> String {
    use duckdb::types::ValueRef;
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Boolean(b) => b.to_string(),
        ValueRef::TinyInt(v) => v.to_string(),
        ValueRef::SmallInt(v) => v.to_string(),
        ValueRef::Int(v) => v.to_string(),
        ValueRef::BigInt(v) => v.to_string(),
        ValueRef::HugeInt(v) => v.to_string(),
        ValueRef::Float(v) => v.to_string(),
        ValueRef::Double(v) => v.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        other => format!("{other:?}"),
    }
}
