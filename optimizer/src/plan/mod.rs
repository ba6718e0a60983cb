//! Plan Parser & Cost Model.
//!
//! Converts backend-specific `EXPLAIN ANALYZE` output into the uniform
//! `PlanTree`, then derives the cost spine, scan multiplicity and Q-error
//! observations every downstream pathology detector consumes. Grounded in
//! an indentation/box-character topology walk, generalized from a
//! tabular profile text format to DuckDB's tree-drawing `EXPLAIN ANALYZE` text and
//! Postgres's `EXPLAIN (ANALYZE, FORMAT JSON)`.

pub mod cost;
pub mod duckdb_parser;
pub mod model;
pub mod postgres_parser;

pub use cost::PlanObservations;
pub use model::{Dialect, PlanNode, PlanTree};

use crate::utils::error::OptimizerError;

/// Parse raw EXPLAIN output for the given dialect into a `PlanTree`.
///
/// Absent per-operator timings degrade the tree rather than fail the parse
/// : callers get a tree with `ms_exclusive: None` nodes instead of
/// an error when only cardinality estimates are present (e.g. `EXPLAIN`
/// without `ANALYZE`).
pub fn parse_explain(dialect: Dialect, raw: &str) -> Result<PlanTree, OptimizerError> {
    match dialect {
        Dialect::DuckDb => duckdb_parser::parse(raw),
        Dialect::Postgres => postgres_parser::parse(raw),
    }
}
