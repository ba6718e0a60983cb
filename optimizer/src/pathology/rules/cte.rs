//! CTE-shaped pathologies: P0 (staged CTE chain + late selective predicate),
//! P7 (CTE self-joined by a handful of discriminator values), P9 (identical
//! expensive subtrees duplicated across branches).

use crate::pathology::catalog::Catalog;
use crate::pathology::model::{Importance, Match, PathologyId, Phase};
use crate::pathology::query_flags::QueryObservations;
use crate::pathology::Pathology;
use crate::plan::cost::PlanObservations;
use crate::plan::model::PlanTree;

pub struct P0DateCteIsolate;

impl Pathology for P0DateCteIsolate {
    fn id(&self) -> PathologyId {
        PathologyId::P0
    }

    fn prune(&self, obs: &PlanObservations, baseline_ms: f64) -> bool {
        // "baseline < 100 ms -> skip all CTE-based".
        obs.cte_count == 0 || baseline_ms < 100.0
    }

    fn detect(&self, _tree: &PlanTree, obs: &PlanObservations, qobs: &QueryObservations, catalog: &Catalog) -> Option<Match> {
        // 2+ stage CTE chain + late selective predicate; gate: filter ratio
        // >5:1 and <=2 fact tables (approximated here by repeated_tables
        // count, since the plan tree doesn't label fact vs. dimension).
        if obs.cte_count < 2 {
            return None;
        }
        let has_late_predicate = qobs.cte_names.iter().any(|n| qobs.cte_has_where.contains(n));
        if !has_late_predicate {
            return None;
        }
        if obs.repeated_tables.len() > 2 {
            return None;
        }
        Some(Match {
            pathology_id: self.id(),
            anchor: None,
            importance: Importance::Three,
            phase: Phase::ScanReduction,
            detail: format!("{}-stage CTE chain with a late selective predicate", obs.cte_count),
            transform_options: catalog.transform_options_for(self.id()),
        })
    }
}

pub struct P7SelfJoinDecomposition;

impl Pathology for P7SelfJoinDecomposition {
    fn id(&self) -> PathologyId {
        PathologyId::P7
    }

    fn prune(&self, obs: &PlanObservations, _baseline_ms: f64) -> bool {
        obs.cte_count == 0
    }

    fn detect(&self, _tree: &PlanTree, _obs: &PlanObservations, qobs: &QueryObservations, catalog: &Catalog) -> Option<Match> {
        if qobs.self_joined_ctes.is_empty() {
            return None;
        }
        // Gate: "no orphaned CTE after split" is re-checked by the applier's
        // own structural validation; here we only require the
        // self-joined CTE isn't already an EXISTS/IN target.
        Some(Match {
            pathology_id: self.id(),
            anchor: None,
            importance: Importance::Two,
            phase: Phase::Structural,
            detail: format!("CTE(s) self-joined: {}", qobs.self_joined_ctes.join(", ")),
            transform_options: catalog.transform_options_for(self.id()),
        })
    }
}

pub struct P9MaterializeCte;

impl Pathology for P9MaterializeCte {
    fn id(&self) -> PathologyId {
        PathologyId::P9
    }

    fn prune(&self, obs: &PlanObservations, _baseline_ms: f64) -> bool {
        !obs.has_nested_loop && obs.join_count == 0
    }

    fn detect(&self, tree: &PlanTree, _obs: &PlanObservations, qobs: &QueryObservations, catalog: &Catalog) -> Option<Match> {
        // "identical expensive subtrees in branches": count scan targets
        // repeated with non-trivial cost; never on EXISTS (hard-stop,
        // enforced again by the applier against the same subquery text).
        if qobs.has_exists {
            return None;
        }
        let repeated_expensive: Vec<&str> = tree.root.children.iter().filter_map(|c| c.scanned_table()).collect();
        let duplicated = repeated_expensive.len() >= 2
            && repeated_expensive.iter().any(|t| repeated_expensive.iter().filter(|u| u == t).count() >= 2);
        if !duplicated {
            return None;
        }
        Some(Match {
            pathology_id: self.id(),
            anchor: None,
            importance: Importance::Two,
            phase: Phase::Structural,
            detail: "duplicated expensive subtree across branches".to_string(),
            transform_options: catalog.transform_options_for(self.id()),
        })
    }
}
