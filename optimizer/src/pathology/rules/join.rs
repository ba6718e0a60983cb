//! Join-shaped pathologies: P2 (correlated nested loop re-executing an
//! aggregate), P5 (LEFT JOIN effectively inner via a WHERE on the
//! right-table), P6 (large-sided INTERSECT).

use crate::pathology::catalog::Catalog;
use crate::pathology::model::{Importance, Match, PathologyId, Phase};
use crate::pathology::query_flags::QueryObservations;
use crate::pathology::Pathology;
use crate::plan::cost::PlanObservations;
use crate::plan::model::PlanTree;

pub struct P2Decorrelate;

impl Pathology for P2Decorrelate {
    fn id(&self) -> PathologyId {
        PathologyId::P2
    }

    fn prune(&self, obs: &PlanObservations, _baseline_ms: f64) -> bool {
        !obs.has_nested_loop
    }

    fn detect(&self, _tree: &PlanTree, obs: &PlanObservations, qobs: &QueryObservations, catalog: &Catalog) -> Option<Match> {
        // Never on EXISTS/NOT EXISTS (hard-stop).
        if qobs.has_exists || !obs.has_correlated_scan {
            return None;
        }
        Some(Match {
            pathology_id: self.id(),
            anchor: None,
            importance: Importance::Three,
            phase: Phase::Structural,
            detail: "nested loop re-executes a correlated aggregate per outer row".to_string(),
            transform_options: catalog.transform_options_for(self.id()),
        })
    }
}

pub struct P5LeftToInnerJoin;

impl Pathology for P5LeftToInnerJoin {
    fn id(&self) -> PathologyId {
        PathologyId::P5
    }

    fn prune(&self, _obs: &PlanObservations, _baseline_ms: f64) -> bool {
        // "no LEFT JOIN -> skip P5" is checked against the query flags in
        // `detect` since `PlanObservations` doesn't distinguish join kinds.
        false
    }

    fn detect(&self, _tree: &PlanTree, _obs: &PlanObservations, qobs: &QueryObservations, catalog: &Catalog) -> Option<Match> {
        if !qobs.has_left_join || !qobs.left_join_where_strips_nulls {
            return None;
        }
        Some(Match {
            pathology_id: self.id(),
            anchor: None,
            importance: Importance::Two,
            phase: Phase::Structural,
            detail: "LEFT JOIN followed by a WHERE that strips unmatched rows".to_string(),
            transform_options: catalog.transform_options_for(self.id()),
        })
    }
}

pub struct P6IntersectToExists;

impl Pathology for P6IntersectToExists {
    fn id(&self) -> PathologyId {
        PathologyId::P6
    }

    fn prune(&self, _obs: &PlanObservations, _baseline_ms: f64) -> bool {
        false
    }

    fn detect(&self, tree: &PlanTree, _obs: &PlanObservations, qobs: &QueryObservations, catalog: &Catalog) -> Option<Match> {
        if !qobs.has_intersect {
            return None;
        }
        // Gate: both sides >1k rows.
        let sides: Vec<u64> = tree.root.children.iter().filter_map(|c| c.cardinality_act).collect();
        if sides.len() < 2 || sides.iter().any(|&r| r <= 1000) {
            return None;
        }
        Some(Match {
            pathology_id: self.id(),
            anchor: None,
            importance: Importance::One,
            phase: Phase::Structural,
            detail: "INTERSECT with both sides over 1,000 rows".to_string(),
            transform_options: catalog.transform_options_for(self.id()),
        })
    }
}
