//! Sniper / Synthesizer : reads the BDA, selects the best
//! foundation, and composes a new `PatchPlan` from up to three source
//! PatchPlans' operations.
//!
//! Uses the same `aggregate_diagnostics`/`HashMap`-grouping idiom: candidates
//! are indexed once, then folded into one combined result
//! while tracking which anchors each included op has already claimed.

use crate::mission::bda::BdaTable;
use crate::pathology::hard_stops;
use crate::pathology::model::{DiagnosisSummary, PathologyId};
use crate::patchplan::{AnchorHash, Op, PatchPlan, Risk};
use std::collections::{HashMap, HashSet};

/// Bound on re-validation rounds per mission. Not a config knob, since
/// unbounded re-validation loops would defeat the mission deadline.
pub const SNIPER_MAX_ROUNDS: usize = 2;

#[derive(Debug, Clone)]
pub struct RetryDigest {
    pub addressed: Vec<PathologyId>,
    pub open: Vec<PathologyId>,
}

#[derive(Debug, Clone)]
pub struct SniperOutput {
    pub patch_plan: PatchPlan,
    pub source_probe_ids: Vec<String>,
    pub retry_digest: RetryDigest,
}

/// Compose a compound `PatchPlan` from the BDA's best-speedup candidates.
/// Returns `None` when there is nothing to synthesize from (empty BDA or no
/// PASS/WIN candidates) — the mission then returns its best benchmarked
/// candidate as final.
pub fn synthesize(bda: &BdaTable, diagnosis: &DiagnosisSummary) -> Option<SniperOutput> {
    let candidates = bda.top_candidates(3);
    if candidates.is_empty() {
        return None;
    }

    let mut claimed_anchors: HashSet<AnchorHash> = HashSet::new();
    let mut ops: Vec<Op> = Vec::new();
    let mut transforms: Vec<String> = Vec::new();
    let mut source_probe_ids: Vec<String> = Vec::new();
    let mut worst_risk = Risk::Low;
    let mut deltas: Vec<String> = Vec::new();

    for candidate in candidates {
        let Some(plan) = &candidate.patch_plan else { continue };

        // Reject the whole candidate's ops if any anchor was already
        // claimed by a different included op, or if
        // any op in it would violate a hard-stop the way the applier itself
        // enforces (properties 4 and 5 — one source of truth,
        // consulted again here).
        let candidate_anchors: Vec<AnchorHash> = plan.ops.iter().filter_map(Op::anchor).collect();
        if candidate_anchors.iter().any(|a| claimed_anchors.contains(a)) {
            continue;
        }
        if violates_hard_stop(plan) {
            continue;
        }

        for anchor in candidate_anchors {
            claimed_anchors.insert(anchor);
        }
        ops.extend(plan.ops.iter().cloned());
        transforms.extend(plan.transforms.iter().cloned());
        source_probe_ids.push(candidate.probe_id.clone());
        worst_risk = worse_risk(worst_risk, plan.risk);
        if let Some(delta) = &candidate.explain_delta_summary {
            deltas.push(delta.clone());
        }

        if source_probe_ids.len() >= 3 {
            break;
        }
    }

    if ops.is_empty() {
        return None;
    }

    let retry_digest = build_retry_digest(diagnosis, &transforms);

    Some(SniperOutput {
        patch_plan: PatchPlan { ops, transforms, expected_explain_delta: deltas.join("; "), risk: worst_risk },
        source_probe_ids,
        retry_digest,
    })
}

fn violates_hard_stop(plan: &PatchPlan) -> bool {
    for op in &plan.ops {
        match op {
            Op::ReplaceSubquery { new_subquery, .. } if hard_stops::forbids_materialize_exists_text(new_subquery) => {
                return true
            }
            Op::InsertCte { body_sql, .. } => {
                // Every produced CTE must have a WHERE, and must never
                // materialize an EXISTS/IN-subquery body; a quick text
                // check here, the applier/structural validator re-confirms
                // against the parsed AST.
                if !body_sql.to_ascii_uppercase().contains("WHERE") {
                    return true;
                }
                if hard_stops::forbids_materialize_exists_text(body_sql) {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

fn worse_risk(a: Risk, b: Risk) -> Risk {
    fn rank(r: Risk) -> u8 {
        match r {
            Risk::Low => 0,
            Risk::Medium => 1,
            Risk::High => 2,
        }
    }
    if rank(b) > rank(a) {
        b
    } else {
        a
    }
}

/// Declares which pathologies the combined plan addresses and which remain
/// open.
fn build_retry_digest(diagnosis: &DiagnosisSummary, transforms: &[String]) -> RetryDigest {
    let mut transform_to_pathology: HashMap<&str, PathologyId> = HashMap::new();
    for m in &diagnosis.matches {
        for option in &m.transform_options {
            transform_to_pathology.entry(option.transform_id.as_str()).or_insert(m.pathology_id);
        }
    }

    let addressed: Vec<PathologyId> = transforms
        .iter()
        .filter_map(|t| transform_to_pathology.get(t.as_str()).copied())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let open: Vec<PathologyId> =
        diagnosis.matches.iter().map(|m| m.pathology_id).filter(|id| !addressed.contains(id)).collect::<HashSet<_>>().into_iter().collect();

    RetryDigest { addressed, open }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathology::model::DiagnosisSummary;
    use crate::patchplan::anchor::hash_fragment;
    use crate::worker::WorkerResult;

    fn plan_with(anchor_text: &str, transform: &str) -> PatchPlan {
        PatchPlan {
            ops: vec![Op::ReplaceWherePredicate { anchor: hash_fragment(anchor_text), new_predicate: "1=1".to_string() }],
            transforms: vec![transform.to_string()],
            expected_explain_delta: String::new(),
            risk: Risk::Low,
        }
    }

    #[test]
    fn skips_candidates_whose_anchors_collide() {
        let mut bda = BdaTable::new();
        bda.push(WorkerResult::from_bench("a", "t1", 1000.0, "SELECT 1".to_string(), plan_with("x = 1", "t1"), 200.0, String::new()));
        bda.push(WorkerResult::from_bench("b", "t2", 1000.0, "SELECT 1".to_string(), plan_with("x = 1", "t2"), 100.0, String::new()));

        let diagnosis = DiagnosisSummary { matches: vec![], families_covered: 0, conclusion: String::new() };
        let output = synthesize(&bda, &diagnosis).unwrap();
        assert_eq!(output.source_probe_ids.len(), 1);
    }

    #[test]
    fn returns_none_when_bda_has_no_candidates() {
        let bda = BdaTable::new();
        let diagnosis = DiagnosisSummary { matches: vec![], families_covered: 0, conclusion: String::new() };
        assert!(synthesize(&bda, &diagnosis).is_none());
    }
}
