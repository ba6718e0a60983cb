//! Postgres-only pathologies (`C1..C6`, alongside the shared `P1..P7`
//! family on Postgres). The shared pathology matrix only details the shared
//! `P` family; these six are resolved from Postgres's own
//! `EXPLAIN (ANALYZE, FORMAT JSON)` vocabulary the way the `P` family is
//! resolved from DuckDB's, each gated to `Dialect::Postgres` since the
//! signals (bitmap recheck, external sort method, hash batch overflow) don't
//! exist on DuckDB's plan output.

use crate::pathology::catalog::Catalog;
use crate::pathology::model::{Importance, Match, PathologyId, Phase};
use crate::pathology::query_flags::QueryObservations;
use crate::pathology::Pathology;
use crate::plan::cost::PlanObservations;
use crate::plan::model::{Dialect, PlanTree};

fn is_postgres(tree: &PlanTree) -> bool {
    tree.dialect == Dialect::Postgres
}

/// C1: a `Seq Scan` carrying a `Filter` whose Q-error is large — the planner
/// expected the filter to be selective and chose a sequential scan, but
/// actual selectivity was far off, so an index would have paid off.
pub struct C1SeqScanDespiteIndex;

impl Pathology for C1SeqScanDespiteIndex {
    fn id(&self) -> PathologyId {
        PathologyId::C1
    }

    fn prune(&self, obs: &PlanObservations, _baseline_ms: f64) -> bool {
        obs.repeated_tables.is_empty()
    }

    fn detect(&self, tree: &PlanTree, _obs: &PlanObservations, _qobs: &QueryObservations, catalog: &Catalog) -> Option<Match> {
        if !is_postgres(tree) {
            return None;
        }
        let node = tree.walk_preorder().into_iter().find(|n| {
            n.is_seq_scan() && n.extra.contains_key("filter") && n.q_error().map(|q| q > 10.0).unwrap_or(false)
        })?;
        Some(Match {
            pathology_id: self.id(),
            anchor: None,
            importance: Importance::Two,
            phase: Phase::ScanReduction,
            detail: format!("sequential scan on `{}` with a badly misestimated filter", node.scanned_table().unwrap_or("?")),
            transform_options: catalog.transform_options_for(self.id()),
        })
    }
}

/// C2: a `Bitmap Heap Scan` re-checking a large fraction of candidate rows
/// against the original condition (lossy bitmap, work_mem too small).
pub struct C2BitmapHeapThrash;

impl Pathology for C2BitmapHeapThrash {
    fn id(&self) -> PathologyId {
        PathologyId::C2
    }

    fn prune(&self, _obs: &PlanObservations, _baseline_ms: f64) -> bool {
        false
    }

    fn detect(&self, tree: &PlanTree, _obs: &PlanObservations, _qobs: &QueryObservations, catalog: &Catalog) -> Option<Match> {
        if !is_postgres(tree) {
            return None;
        }
        let node = tree.walk_preorder().into_iter().find(|n| {
            n.operator.eq_ignore_ascii_case("Bitmap Heap Scan") && n.extra.contains_key("rows_removed_by_recheck")
        })?;
        Some(Match {
            pathology_id: self.id(),
            anchor: None,
            importance: Importance::One,
            phase: Phase::ScanReduction,
            detail: "bitmap heap scan rechecking a large fraction of candidate rows".to_string(),
            transform_options: catalog.transform_options_for(self.id()),
        })
    }
}

/// C3: a correlated `SubPlan` re-executed per outer row outside of a nested
/// loop shape (the pattern P2 targets) — e.g. a correlated subquery in the
/// target list rather than a WHERE clause.
pub struct C3CorrelatedSubplanReexec;

impl Pathology for C3CorrelatedSubplanReexec {
    fn id(&self) -> PathologyId {
        PathologyId::C3
    }

    fn prune(&self, obs: &PlanObservations, _baseline_ms: f64) -> bool {
        !obs.has_correlated_scan
    }

    fn detect(&self, tree: &PlanTree, obs: &PlanObservations, qobs: &QueryObservations, catalog: &Catalog) -> Option<Match> {
        if !is_postgres(tree) || qobs.has_exists || obs.has_nested_loop {
            return None;
        }
        Some(Match {
            pathology_id: self.id(),
            anchor: None,
            importance: Importance::Two,
            phase: Phase::Structural,
            detail: "correlated subplan re-executed per outer row outside a join".to_string(),
            transform_options: catalog.transform_options_for(self.id()),
        })
    }
}

/// C4: a `Sort` node whose `Sort Method` spilled to disk (`external merge`).
pub struct C4SortSpill;

impl Pathology for C4SortSpill {
    fn id(&self) -> PathologyId {
        PathologyId::C4
    }

    fn prune(&self, _obs: &PlanObservations, _baseline_ms: f64) -> bool {
        false
    }

    fn detect(&self, tree: &PlanTree, _obs: &PlanObservations, _qobs: &QueryObservations, catalog: &Catalog) -> Option<Match> {
        if !is_postgres(tree) {
            return None;
        }
        let node = tree
            .walk_preorder()
            .into_iter()
            .find(|n| n.extra.get("sort_method").map(|m| m.to_ascii_lowercase().contains("external")).unwrap_or(false))?;
        let _ = node;
        Some(Match {
            pathology_id: self.id(),
            anchor: None,
            importance: Importance::Two,
            phase: Phase::ScanReduction,
            detail: "sort spilled to disk (external merge)".to_string(),
            transform_options: catalog.transform_options_for(self.id()),
        })
    }
}

/// C5: a `Hash Join` whose build side overflowed `work_mem` into multiple
/// batches.
pub struct C5HashJoinOverflow;

impl Pathology for C5HashJoinOverflow {
    fn id(&self) -> PathologyId {
        PathologyId::C5
    }

    fn prune(&self, obs: &PlanObservations, _baseline_ms: f64) -> bool {
        obs.join_count == 0
    }

    fn detect(&self, tree: &PlanTree, _obs: &PlanObservations, _qobs: &QueryObservations, catalog: &Catalog) -> Option<Match> {
        if !is_postgres(tree) {
            return None;
        }
        let node = tree.walk_preorder().into_iter().find(|n| {
            n.extra.get("hash_batches").and_then(|b| b.parse::<u64>().ok()).map(|b| b > 1).unwrap_or(false)
        })?;
        let _ = node;
        Some(Match {
            pathology_id: self.id(),
            anchor: None,
            importance: Importance::Two,
            phase: Phase::RedundancyElimination,
            detail: "hash join build side overflowed into multiple batches".to_string(),
            transform_options: catalog.transform_options_for(self.id()),
        })
    }
}

/// C6: a CTE materialized and scanned more than once — redundant with the
/// self-join decomposition P7 targets on DuckDB, but tracked separately here
/// since Postgres exposes it via a distinct `CTE Scan` operator count rather
/// than a FROM-list repetition.
pub struct C6RedundantCteMaterialization;

impl Pathology for C6RedundantCteMaterialization {
    fn id(&self) -> PathologyId {
        PathologyId::C6
    }

    fn prune(&self, obs: &PlanObservations, _baseline_ms: f64) -> bool {
        obs.cte_count == 0
    }

    fn detect(&self, tree: &PlanTree, _obs: &PlanObservations, qobs: &QueryObservations, catalog: &Catalog) -> Option<Match> {
        if !is_postgres(tree) {
            return None;
        }
        let cte_scans = tree.walk_preorder().into_iter().filter(|n| n.operator.eq_ignore_ascii_case("CTE Scan")).count();
        if cte_scans < 2 || qobs.self_joined_ctes.is_empty() {
            return None;
        }
        Some(Match {
            pathology_id: self.id(),
            anchor: None,
            importance: Importance::One,
            phase: Phase::RedundancyElimination,
            detail: format!("CTE materialized and scanned {cte_scans} times"),
            transform_options: catalog.transform_options_for(self.id()),
        })
    }
}
