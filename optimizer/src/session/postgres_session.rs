//! Postgres backend for the `Session` trait.
//!
//! Owns a `tokio_postgres::Client` plus the connection task spawned once at
//! `connect` (the standard `tokio-postgres` split-client idiom). Operations
//! go through a `tokio::sync::Mutex` around the client handle even though
//! `tokio_postgres::Client` is internally pipelined, so that the session's
//! serialization invariant holds the same way for both backends rather than
//! depending on driver internals.

use super::{RowSet, Session};
use crate::plan::{self, Dialect, PlanTree};
use crate::utils::error::OptimizerError;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls};

pub struct PgSession {
    client: Mutex<Client>,
}

impl PgSession {
    pub async fn connect(dsn: &str) -> Result<Self, OptimizerError> {
        let (client, connection) = tokio_postgres::connect(dsn, NoTls)
            .await
            .map_err(|e| OptimizerError::connect_failed(format!("postgres connect failed: {e}")))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!("postgres connection task ended: {e}");
            }
        });

        Ok(Self { client: Mutex::new(client) })
    }
}

#[async_trait]
impl Session for PgSession {
    async fn execute(&self, sql: &str, limit: Option<u64>) -> Result<RowSet, OptimizerError> {
        let wrapped = wrap_with_limit(sql, limit);
        let client = self.client.lock().await;
        let rows = client
            .query(&wrapped, &[])
            .await
            .map_err(|e| OptimizerError::Other(anyhow::anyhow!("postgres query failed: {e}")))?;

        let columns: Vec<String> =
            rows.first().map(|r| r.columns().iter().map(|c| c.name().to_string()).collect()).unwrap_or_default();

        let mut out_rows = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut out_row = Vec::with_capacity(row.len());
            for i in 0..row.len() {
                out_row.push(pg_value_to_string(row, i));
            }
            out_rows.push(out_row);
        }

        Ok(RowSet { columns, rows: out_rows })
    }

    async fn explain(&self, sql: &str, analyze: bool) -> Result<PlanTree, OptimizerError> {
        let verb = if analyze { "EXPLAIN (ANALYZE, FORMAT JSON)" } else { "EXPLAIN (FORMAT JSON)" };
        let explain_sql = format!("{verb} {}", sql.trim().trim_end_matches(';'));
        let client = self.client.lock().await;
        let rows = client
            .query(&explain_sql, &[])
            .await
            .map_err(|e| OptimizerError::Other(anyhow::anyhow!("postgres explain failed: {e}")))?;

        let raw: String = rows
            .first()
            .map(|row| {
                let value: serde_json::Value = row.get(0);
                value.to_string()
            })
            .ok_or_else(|| OptimizerError::plan_parse_failed("empty EXPLAIN result"))?;

        plan::parse_explain(Dialect::Postgres, &raw)
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }
}

fn wrap_with_limit(sql: &str, limit: Option<u64>) -> String {
    match limit {
        Some(n) => format!("SELECT * FROM ({}) AS __limited__ LIMIT {n}", sql.trim().trim_end_matches(';')),
        None => sql.to_string(),
    }
}

/// Best-effort text rendering of a Postgres column value. The correctness
/// gate only needs a canonical string, so every scalar type
/// round-trips through its text representation rather than a typed decode.
fn pg_value_to_string(row: &tokio_postgres::Row, idx: usize) -> Option<String> {
    use tokio_postgres::types::Type;
    let col = &row.columns()[idx];
    match *col.type_() {
        Type::BOOL => row.get::<_, Option<bool>>(idx).map(|v| v.to_string()),
        Type::INT2 => row.get::<_, Option<i16>>(idx).map(|v| v.to_string()),
        Type::INT4 => row.get::<_, Option<i32>>(idx).map(|v| v.to_string()),
        Type::INT8 => row.get::<_, Option<i64>>(idx).map(|v| v.to_string()),
        Type::FLOAT4 => row.get::<_, Option<f32>>(idx).map(|v| v.to_string()),
        Type::FLOAT8 => row.get::<_, Option<f64>>(idx).map(|v| v.to_string()),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR => row.get::<_, Option<String>>(idx),
        Type::TIMESTAMP => row.get::<_, Option<chrono::NaiveDateTime>>(idx).map(|v| v.to_string()),
        Type::TIMESTAMPTZ => {
            row.get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx).map(|v| v.to_rfc3339())
        }
        Type::DATE => row.get::<_, Option<chrono::NaiveDate>>(idx).map(|v| v.to_string()),
        _ => row.get::<_, Option<String>>(idx),
    }
}
