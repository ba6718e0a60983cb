//! Cost-spine and derived-observations computation over a parsed `PlanTree`.
//!
//! Mirrors how `profile_analyzer::mod.rs` computes `IoStatistics` once per
//! profile and hangs the result off the response; here `PlanObservations` is
//! computed once per `PlanTree` and consumed read-only by the pathology
//! engine and dispatcher.

use super::model::{PlanNode, PlanTree};
use std::collections::HashMap;

/// Derived observations published to downstream components.
#[derive(Debug, Clone)]
pub struct PlanObservations {
    /// Path from root through the highest-ms child, recursively, to a leaf.
    pub cost_spine: Vec<String>,
    pub dominant_operator: String,
    /// Base table name (case-insensitive) -> number of SEQ_SCAN nodes.
    pub repeated_tables: HashMap<String, usize>,
    pub deepest_qerror_node: Option<String>,
    pub has_nested_loop: bool,
    pub has_correlated_scan: bool,
    pub has_merge_join_on_large: bool,
    pub join_count: usize,
    pub cte_count: usize,
    pub non_equi_join: bool,
    pub total_ms: f64,
}

/// Subtract children's cumulative ms from a node's own cumulative ms to get
/// its exclusive time, recursively. Engines that already report exclusive
/// time per-node leave `ms_cumulative` at the same value as their children's
/// sum plus self, so this is safe to run unconditionally.
pub fn compute_exclusive_ms(node: &mut PlanNode) {
    for child in &mut node.children {
        compute_exclusive_ms(child);
    }
    if let Some(cumulative) = node.ms_cumulative {
        let children_total: f64 = node.children.iter().filter_map(|c| c.ms_cumulative).sum();
        node.ms_exclusive = Some((cumulative - children_total).max(0.0));
    }
}

/// Descend repeatedly to the highest-ms child; ties broken by higher
/// cardinality, then by operator order.
pub fn cost_spine(root: &PlanNode) -> Vec<String> {
    let mut spine = vec![root.operator.clone()];
    let mut current = root;
    loop {
        if current.children.is_empty() {
            break;
        }
        let next = current
            .children
            .iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| {
                let ms_a = a.ms_exclusive.unwrap_or(0.0);
                let ms_b = b.ms_exclusive.unwrap_or(0.0);
                ms_a.partial_cmp(&ms_b)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.cardinality_act.unwrap_or(0).cmp(&b.cardinality_act.unwrap_or(0)))
                    .then_with(|| ia.cmp(ib))
            })
            .map(|(_, n)| n);
        match next {
            Some(n) => {
                spine.push(n.operator.clone());
                current = n;
            }
            None => break,
        }
    }
    spine
}

fn scan_multiplicity(root: &PlanNode) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    fn visit(node: &PlanNode, counts: &mut HashMap<String, usize>) {
        if node.is_seq_scan() {
            if let Some(table) = node.scanned_table() {
                *counts.entry(table.to_ascii_lowercase()).or_insert(0) += 1;
            }
        }
        for child in &node.children {
            visit(child, counts);
        }
    }
    visit(root, &mut counts);
    counts
}

fn deepest_qerror(root: &PlanNode) -> Option<String> {
    let mut best: Option<(f64, String)> = None;
    fn visit(node: &PlanNode, best: &mut Option<(f64, String)>) {
        if let Some(q) = node.q_error() {
            if best.as_ref().map(|(b, _)| q > *b).unwrap_or(true) {
                *best = Some((q, node.operator.clone()));
            }
        }
        for child in &node.children {
            visit(child, best);
        }
    }
    visit(root, &mut best);
    best.map(|(_, op)| op)
}

fn contains_operator(root: &PlanNode, needle: &str) -> bool {
    root.operator.to_ascii_uppercase().contains(needle)
        || root.children.iter().any(|c| contains_operator(c, needle))
}

fn count_operator(root: &PlanNode, needle: &str) -> usize {
    let here = usize::from(root.operator.to_ascii_uppercase().contains(needle));
    here + root.children.iter().map(|c| count_operator(c, needle)).sum::<usize>()
}

fn has_correlated_scan(root: &PlanNode) -> bool {
    // A nested loop whose inner child is itself a scan gated by a
    // correlation marker the parser records in `extra["correlated"]`.
    fn visit(node: &PlanNode) -> bool {
        let is_nl = node.operator.to_ascii_uppercase().contains("NESTED_LOOP")
            || node.operator.to_ascii_uppercase().contains("NESTED LOOP");
        if is_nl && node.children.iter().any(|c| c.extra.get("correlated").map(|v| v == "true").unwrap_or(false)) {
            return true;
        }
        node.children.iter().any(visit)
    }
    visit(root)
}

fn has_non_equi_join(root: &PlanNode) -> bool {
    fn visit(node: &PlanNode) -> bool {
        let is_join = node.operator.to_ascii_uppercase().contains("JOIN");
        if is_join {
            if let Some(cond) = node.extra.get("condition") {
                let has_equi = cond.contains('=') && !cond.contains("<>") && !cond.contains("!=");
                let has_range = cond.contains('<') || cond.contains('>');
                if has_range && !has_equi {
                    return true;
                }
            }
        }
        node.children.iter().any(visit)
    }
    visit(root)
}

pub fn observe(tree: &PlanTree) -> PlanObservations {
    let root = &tree.root;
    let spine = cost_spine(root);
    let dominant = spine.last().cloned().unwrap_or_else(|| root.operator.clone());

    PlanObservations {
        cost_spine: spine,
        dominant_operator: dominant,
        repeated_tables: scan_multiplicity(root),
        deepest_qerror_node: deepest_qerror(root),
        has_nested_loop: contains_operator(root, "NESTED_LOOP") || contains_operator(root, "NESTED LOOP"),
        has_correlated_scan: has_correlated_scan(root),
        has_merge_join_on_large: contains_operator(root, "MERGE_JOIN") || contains_operator(root, "MERGE JOIN"),
        join_count: count_operator(root, "JOIN"),
        cte_count: count_operator(root, "CTE"),
        non_equi_join: has_non_equi_join(root),
        total_ms: root.ms_cumulative.unwrap_or(0.0),
    }
}
