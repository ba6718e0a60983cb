//! Session & Resource Manager.
//!
//! A `Session` is a live, exclusively-owned connection to one database.
//! Shaped like a `MySQLClient`/connection-pool (`create_session()`,
//! `execute() -> (columns, rows, ms)`), generalized to the two backends
//! this pipeline targets and to the explain/checksum operations the
//! optimization pipeline needs beyond plain query execution.

pub mod duckdb_session;
pub mod pool;
pub mod postgres_session;

pub use pool::{PooledSession, SessionPool};

use crate::plan::PlanTree;
use crate::utils::error::OptimizerError;
use async_trait::async_trait;

/// One column's values as text; kept untyped because the correctness gate
/// re-hashes every value as a canonicalized string regardless of source
/// type.
#[derive(Debug, Clone)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RowSet {
    pub fn row_count(&self) -> u64 {
        self.rows.len() as u64
    }
}

/// A live, exclusively-owned connection to one database.
///
/// Invariant: a session must serialize operations — queries on the same
/// session never overlap. Implementations enforce this with an internal
/// mutex around the native connection handle rather than relying on callers
/// to coordinate.
#[async_trait]
pub trait Session: Send + Sync {
    async fn execute(&self, sql: &str, limit: Option<u64>) -> Result<RowSet, OptimizerError>;

    async fn explain(&self, sql: &str, analyze: bool) -> Result<PlanTree, OptimizerError>;

    fn dialect(&self) -> crate::plan::Dialect;

    /// Row count plus a commutative (order-independent) checksum digest
    ///. Default implementation executes the query once and
    /// folds rows through `gate::rowhash` — every backend shares the same
    /// canonicalization, only `execute` differs.
    async fn checksum(&self, sql: &str, limit: u64, tolerance: f64) -> Result<(u64, u64), OptimizerError> {
        let rows = self.execute(sql, Some(limit)).await?;
        let digest = crate::gate::rowhash::xor_fold(&rows, tolerance);
        Ok((rows.row_count(), digest))
    }

    /// Best-effort cancellation of any in-flight operation. Sessions that
    /// cannot cancel mid-flight report `false`; the benchmark racer then
    /// waits for natural completion and discards the result.
    fn supports_cancel(&self) -> bool {
        false
    }
}
