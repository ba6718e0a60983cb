//! Dispatcher : turns pathology matches into N single-transform
//! probe assignments, sized by importance and diversified across pathology
//! families.
//!
//! Shaped the way a diagnostic request assembles a worker request
//! (`cache_key()`/`sql_hash()`/`profile_hash()`) from shared context plus a
//! per-request payload — `Probe` plays the same
//! role here, carrying a rendered briefing instead of raw fields the worker
//! would have to re-derive.

use crate::pathology::model::{DiagnosisSummary, Importance, Match};
use crate::patchplan::AnchorHash;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// One single-transform worker assignment (`Probe`).
#[derive(Debug, Clone)]
pub struct Probe {
    pub probe_id: String,
    pub pathology_id: crate::pathology::model::PathologyId,
    pub transform_id: String,
    pub anchors: Vec<AnchorHash>,
    pub briefing: String,
    pub deadline: Instant,
}

/// Probe count per importance tier : ★=1->4, ★★=2->8, ★★★=3->12..16.
fn probe_budget(importance: Importance) -> usize {
    match importance {
        Importance::One => 4,
        Importance::Two => 8,
        Importance::Three => 14,
    }
}

/// Builds probes from a `DiagnosisSummary`, sized per match's importance and
/// enforcing the >=3-pathology-family diversity requirement by
/// round-robining probe slots across pathology groups before filling
/// remainder slots in priority order.
pub fn dispatch(summary: &DiagnosisSummary, sql: &str, plan_summary: &str, deadline: Duration) -> Vec<Probe> {
    if summary.matches.is_empty() {
        return Vec::new();
    }

    let mut groups: Vec<&Match> = summary.matches.iter().collect();
    groups.sort_by(|a, b| b.importance.cmp(&a.importance));

    let diversity_required = summary.families_covered >= 3;
    let deadline_instant = Instant::now() + deadline;

    let mut probes = Vec::new();
    let mut round = 0usize;
    loop {
        let mut progressed = false;
        for m in &groups {
            let budget = probe_budget(m.importance);
            let already_for_match = probes.iter().filter(|p: &&Probe| p.pathology_id == m.pathology_id).count();
            if already_for_match >= budget {
                continue;
            }
            if round > 0 && !diversity_required {
                // Without >=3 families, later rounds just fill by priority
                // order rather than strict round-robin.
            }
            for option in &m.transform_options {
                if already_for_match >= budget {
                    break;
                }
                probes.push(build_probe(m, option, sql, plan_summary, deadline_instant));
                progressed = true;
                break;
            }
        }
        round += 1;
        if !progressed || round > 16 {
            break;
        }
    }

    probes
}

fn build_probe(
    m: &Match,
    option: &crate::pathology::model::TransformOption,
    sql: &str,
    plan_summary: &str,
    deadline: Instant,
) -> Probe {
    let probe_id = Uuid::new_v4().to_string();
    let gates: Vec<String> = option.gates.iter().map(|g| g.description.clone()).collect();
    let exemplars: Vec<String> = option
        .evidence
        .mean_speedup
        .is_finite()
        .then(|| format!("historical mean speedup {:.2}x over {} wins", option.evidence.mean_speedup, option.evidence.win_count))
        .into_iter()
        .collect();

    let briefing = format!(
        "HYPOTHESIS: {detail}\nTRANSFORM: {transform_id}\nGATES: {gates}\nEXEMPLARS: {exemplars}\n\nSQL:\n{sql}\n\nPLAN SUMMARY:\n{plan_summary}\n",
        detail = m.detail,
        transform_id = option.transform_id,
        gates = gates.join("; "),
        exemplars = exemplars.join("; "),
    );

    Probe { probe_id, pathology_id: m.pathology_id, transform_id: option.transform_id.clone(), anchors: m.anchor.into_iter().collect(), briefing, deadline }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathology::model::{Evidence, Gate, Phase, TransformOption};

    fn one_match(pathology_id: crate::pathology::model::PathologyId, importance: Importance, transform_id: &str) -> Match {
        Match {
            pathology_id,
            anchor: None,
            importance,
            phase: Phase::ScanReduction,
            detail: "test detail".to_string(),
            transform_options: vec![TransformOption {
                transform_id: transform_id.to_string(),
                evidence: Evidence::default(),
                gates: vec![Gate { description: "none".to_string() }],
            }],
        }
    }

    #[test]
    fn empty_diagnosis_dispatches_nothing() {
        let summary = DiagnosisSummary { matches: vec![], families_covered: 0, conclusion: String::new() };
        assert!(dispatch(&summary, "SELECT 1", "", Duration::from_secs(30)).is_empty());
    }

    #[test]
    fn single_match_never_exceeds_its_importance_budget() {
        use crate::pathology::model::PathologyId;
        let summary = DiagnosisSummary {
            matches: vec![one_match(PathologyId::P1, Importance::One, "single_pass_aggregation")],
            families_covered: 1,
            conclusion: String::new(),
        };
        let probes = dispatch(&summary, "SELECT 1", "", Duration::from_secs(30));
        assert!(probes.len() <= probe_budget(Importance::One));
        assert!(!probes.is_empty());
    }

    /// Three or more families covered triggers the diversity requirement
    /// : every family with a match gets at least one probe
    /// rather than the highest-importance match consuming the whole budget.
    #[test]
    fn three_families_each_get_at_least_one_probe() {
        use crate::pathology::model::PathologyId;
        let summary = DiagnosisSummary {
            matches: vec![
                one_match(PathologyId::P0, Importance::Three, "date_cte_isolate"),
                one_match(PathologyId::P4, Importance::Two, "or_to_union"),
                one_match(PathologyId::P7, Importance::One, "self_join_decomposition"),
            ],
            families_covered: 3,
            conclusion: String::new(),
        };
        let probes = dispatch(&summary, "SELECT 1", "", Duration::from_secs(30));
        let families: std::collections::HashSet<_> = probes.iter().map(|p| p.pathology_id).collect();
        assert_eq!(families.len(), 3);
    }
}
