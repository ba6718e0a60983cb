//! `WorkerResult`: the immutable, terminal outcome of one probe.
//! Once written into the BDA it is never mutated again (property
//! 7) — every field here is set exactly once, at construction.

use crate::patchplan::PatchPlan;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerStatus {
    Pass,
    Win,
    Regression,
    FailTier1,
    FailEquiv,
    Timeout,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResult {
    pub probe_id: String,
    pub transform_id: String,
    pub status: WorkerStatus,
    pub patch_plan: Option<PatchPlan>,
    pub candidate_sql: Option<String>,
    pub baseline_ms: f64,
    pub candidate_ms: Option<f64>,
    pub speedup: Option<f64>,
    pub explain_delta_summary: Option<String>,
    pub error: Option<String>,
}

impl WorkerResult {
    pub fn fail_tier1(probe_id: impl Into<String>, transform_id: impl Into<String>, baseline_ms: f64, reason: impl Into<String>) -> Self {
        Self {
            probe_id: probe_id.into(),
            transform_id: transform_id.into(),
            status: WorkerStatus::FailTier1,
            patch_plan: None,
            candidate_sql: None,
            baseline_ms,
            candidate_ms: None,
            speedup: None,
            explain_delta_summary: None,
            error: Some(reason.into()),
        }
    }

    pub fn fail_equiv(
        probe_id: impl Into<String>,
        transform_id: impl Into<String>,
        baseline_ms: f64,
        candidate_sql: String,
        patch_plan: PatchPlan,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            probe_id: probe_id.into(),
            transform_id: transform_id.into(),
            status: WorkerStatus::FailEquiv,
            patch_plan: Some(patch_plan),
            candidate_sql: Some(candidate_sql),
            baseline_ms,
            candidate_ms: None,
            speedup: None,
            explain_delta_summary: None,
            error: Some(reason.into()),
        }
    }

    pub fn timeout(probe_id: impl Into<String>, transform_id: impl Into<String>, baseline_ms: f64) -> Self {
        Self {
            probe_id: probe_id.into(),
            transform_id: transform_id.into(),
            status: WorkerStatus::Timeout,
            patch_plan: None,
            candidate_sql: None,
            baseline_ms,
            candidate_ms: None,
            speedup: None,
            explain_delta_summary: None,
            error: None,
        }
    }

    pub fn error(probe_id: impl Into<String>, transform_id: impl Into<String>, baseline_ms: f64, reason: impl Into<String>) -> Self {
        Self {
            probe_id: probe_id.into(),
            transform_id: transform_id.into(),
            status: WorkerStatus::Error,
            patch_plan: None,
            candidate_sql: None,
            baseline_ms,
            candidate_ms: None,
            speedup: None,
            explain_delta_summary: None,
            error: Some(reason.into()),
        }
    }

    /// `WIN` when the benchmarked candidate beats the baseline by more than
    /// the noise floor, `REGRESSION` when it passed but came out slower,
    /// `PASS` for anything in between (WorkerResult status set).
    pub fn from_bench(
        probe_id: impl Into<String>,
        transform_id: impl Into<String>,
        baseline_ms: f64,
        candidate_sql: String,
        patch_plan: PatchPlan,
        candidate_ms: f64,
        explain_delta_summary: String,
    ) -> Self {
        let speedup = if candidate_ms > 0.0 { baseline_ms / candidate_ms } else { f64::INFINITY };
        let status = if speedup >= 1.1 {
            WorkerStatus::Win
        } else if speedup < 0.95 {
            WorkerStatus::Regression
        } else {
            WorkerStatus::Pass
        };
        Self {
            probe_id: probe_id.into(),
            transform_id: transform_id.into(),
            status,
            patch_plan: Some(patch_plan),
            candidate_sql: Some(candidate_sql),
            baseline_ms,
            candidate_ms: Some(candidate_ms),
            speedup: Some(speedup),
            explain_delta_summary: Some(explain_delta_summary),
            error: None,
        }
    }
}
