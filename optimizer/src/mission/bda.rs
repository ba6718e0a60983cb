//! BDA table (`BDA Table`, glossary): append-only collection of
//! `WorkerResult`s for one mission, keyed by probe id. Consumed read-only by
//! the sniper.
//!
//! A `Vec` holds insertion order, a `HashMap` index gives O(1) lookup by
//! key — the same grouping idiom an aggregation pass over diagnostics uses.

use crate::worker::{WorkerResult, WorkerStatus};
use std::collections::HashMap;

/// Append-only; `push` is the only mutator (property 7 — once
/// written, a WorkerResult's fields do not change, and nothing here ever
/// removes or replaces an entry).
#[derive(Debug, Clone, Default)]
pub struct BdaTable {
    results: Vec<WorkerResult>,
    index: HashMap<String, usize>,
}

impl BdaTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: WorkerResult) {
        self.index.insert(result.probe_id.clone(), self.results.len());
        self.results.push(result);
    }

    /// Insertion order = completion order: callers MUST NOT
    /// depend on it and should sort by speedup, which is what every reader
    /// below does.
    pub fn all(&self) -> &[WorkerResult] {
        &self.results
    }

    pub fn get(&self, probe_id: &str) -> Option<&WorkerResult> {
        self.index.get(probe_id).map(|&i| &self.results[i])
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn has_win(&self) -> bool {
        self.results.iter().any(|r| r.status == WorkerStatus::Win)
    }

    /// Highest-speedup `WIN` if any, else highest-speedup `PASS`.
    pub fn best_foundation(&self) -> Option<&WorkerResult> {
        let best_win = self
            .results
            .iter()
            .filter(|r| r.status == WorkerStatus::Win)
            .max_by(|a, b| a.speedup.unwrap_or(0.0).partial_cmp(&b.speedup.unwrap_or(0.0)).unwrap_or(std::cmp::Ordering::Equal));
        if best_win.is_some() {
            return best_win;
        }
        self.results
            .iter()
            .filter(|r| r.status == WorkerStatus::Pass)
            .max_by(|a, b| a.speedup.unwrap_or(0.0).partial_cmp(&b.speedup.unwrap_or(0.0)).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Up to `n` source candidates ranked by speedup, including the
    /// foundation, for the sniper's compose step.
    pub fn top_candidates(&self, n: usize) -> Vec<&WorkerResult> {
        let mut candidates: Vec<&WorkerResult> = self
            .results
            .iter()
            .filter(|r| matches!(r.status, WorkerStatus::Win | WorkerStatus::Pass) && r.patch_plan.is_some())
            .collect();
        candidates.sort_by(|a, b| b.speedup.unwrap_or(0.0).partial_cmp(&a.speedup.unwrap_or(0.0)).unwrap_or(std::cmp::Ordering::Equal));
        candidates.truncate(n);
        candidates
    }

    pub fn timeouts(&self) -> usize {
        self.results.iter().filter(|r| r.status == WorkerStatus::Timeout).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patchplan::{PatchPlan, Risk};

    fn win(probe_id: &str, speedup: f64) -> WorkerResult {
        WorkerResult::from_bench(
            probe_id,
            "single_pass_aggregation",
            1000.0,
            "SELECT 1".to_string(),
            PatchPlan { ops: vec![], transforms: vec![], expected_explain_delta: String::new(), risk: Risk::Low },
            1000.0 / speedup,
            String::new(),
        )
    }

    #[test]
    fn best_foundation_prefers_highest_speedup_win() {
        let mut bda = BdaTable::new();
        bda.push(win("a", 2.0));
        bda.push(win("b", 4.0));
        let best = bda.best_foundation().unwrap();
        assert_eq!(best.probe_id, "b");
    }

    #[test]
    fn append_only_preserves_prior_entries() {
        let mut bda = BdaTable::new();
        bda.push(win("a", 2.0));
        assert_eq!(bda.len(), 1);
        bda.push(win("b", 3.0));
        assert_eq!(bda.len(), 2);
        assert_eq!(bda.get("a").unwrap().probe_id, "a");
    }
}
