//! Correctness Gate : row-count plus commutative checksum
//! equivalence check, executed against the real database session.
//!
//! Follows a metamorphic-oracle pattern: invariant-checked row-count
//! comparisons with a structured violation report, generalized from
//! count-only to a full row-count + commutative + ordered digest design.

pub mod rowhash;

use crate::session::{RowSet, Session};
use crate::utils::error::OptimizerError;

/// Equivalence verdict for one candidate against the baseline.
#[derive(Debug, Clone)]
pub enum GateVerdict {
    Pass,
    RowCountMismatch { baseline: u64, candidate: u64 },
    ChecksumMismatch { sample: Vec<(u64, u64)> },
    OrderMismatch,
}

impl GateVerdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, GateVerdict::Pass)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GateConfig {
    pub max_rows: u64,
    pub tolerance: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self { max_rows: 10_000, tolerance: 1e-9 }
    }
}

/// Runs both baseline and candidate SQL through `session` and compares
/// results per the three-step row-count/checksum/order protocol. `requires_ordered` should be
/// true when the query has an outer `ORDER BY`/`LIMIT` —
/// callers derive this from the parsed AST, not string matching.
pub async fn check_equivalence(
    session: &dyn Session,
    baseline_sql: &str,
    candidate_sql: &str,
    requires_ordered: bool,
    config: GateConfig,
) -> Result<GateVerdict, OptimizerError> {
    let baseline_rows = session.execute(baseline_sql, Some(config.max_rows)).await?;
    let candidate_rows = session.execute(candidate_sql, Some(config.max_rows)).await?;

    if baseline_rows.row_count() != candidate_rows.row_count() {
        return Ok(GateVerdict::RowCountMismatch {
            baseline: baseline_rows.row_count(),
            candidate: candidate_rows.row_count(),
        });
    }

    let baseline_digest = rowhash::xor_fold(&baseline_rows, config.tolerance);
    let candidate_digest = rowhash::xor_fold(&candidate_rows, config.tolerance);

    if baseline_digest != candidate_digest {
        return Ok(GateVerdict::ChecksumMismatch { sample: mismatch_sample(&baseline_rows, &candidate_rows, config.tolerance) });
    }

    if requires_ordered {
        let baseline_ordered = rowhash::ordered_digest(&baseline_rows, config.tolerance);
        let candidate_ordered = rowhash::ordered_digest(&candidate_rows, config.tolerance);
        if baseline_ordered != candidate_ordered {
            return Ok(GateVerdict::OrderMismatch);
        }
    }

    Ok(GateVerdict::Pass)
}

/// Samples 3-5 mismatching row hashes for diagnostics, by
/// indexing both row sets by hash and diffing the symmetric difference.
fn mismatch_sample(baseline: &RowSet, candidate: &RowSet, tolerance: f64) -> Vec<(u64, u64)> {
    let baseline_index = rowhash::index_by_hash(baseline, tolerance);
    let candidate_index = rowhash::index_by_hash(candidate, tolerance);

    let mut sample = Vec::new();
    for (hash, &b_idx) in &baseline_index {
        if !candidate_index.contains_key(hash) {
            sample.push((*hash, b_idx as u64));
            if sample.len() >= 5 {
                break;
            }
        }
    }
    if sample.len() < 3 {
        for (hash, &c_idx) in &candidate_index {
            if !baseline_index.contains_key(hash) {
                sample.push((*hash, c_idx as u64));
                if sample.len() >= 5 {
                    break;
                }
            }
        }
    }
    sample
}

impl OptimizerError {
    pub fn from_gate_verdict(verdict: &GateVerdict) -> Option<OptimizerError> {
        match verdict {
            GateVerdict::Pass => None,
            GateVerdict::RowCountMismatch { baseline, candidate } => {
                Some(OptimizerError::EquivRowCount { baseline: *baseline, candidate: *candidate })
            }
            GateVerdict::ChecksumMismatch { .. } => Some(OptimizerError::EquivChecksum),
            GateVerdict::OrderMismatch => Some(OptimizerError::EquivOrder),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[&str]) -> Vec<Option<String>> {
        values.iter().map(|v| Some(v.to_string())).collect()
    }

    #[test]
    fn identical_row_sets_match_order_independently() {
        let a = RowSet { columns: vec!["x".into()], rows: vec![row(&["1"]), row(&["2"])] };
        let b = RowSet { columns: vec!["x".into()], rows: vec![row(&["2"]), row(&["1"])] };
        assert_eq!(rowhash::xor_fold(&a, 1e-9), rowhash::xor_fold(&b, 1e-9));
    }

    #[test]
    fn ordered_digest_is_sensitive_to_order() {
        let a = RowSet { columns: vec!["x".into()], rows: vec![row(&["1"]), row(&["2"])] };
        let b = RowSet { columns: vec!["x".into()], rows: vec![row(&["2"]), row(&["1"])] };
        assert_ne!(rowhash::ordered_digest(&a, 1e-9), rowhash::ordered_digest(&b, 1e-9));
    }
}
