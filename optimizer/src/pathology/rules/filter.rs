//! P4: full scan with an OR predicate spanning different columns.

use crate::pathology::catalog::Catalog;
use crate::pathology::model::{Importance, Match, PathologyId, Phase};
use crate::pathology::query_flags::QueryObservations;
use crate::pathology::Pathology;
use crate::plan::cost::PlanObservations;
use crate::plan::model::PlanTree;

pub struct P4OrToUnion;

impl Pathology for P4OrToUnion {
    fn id(&self) -> PathologyId {
        PathologyId::P4
    }

    fn prune(&self, _obs: &PlanObservations, _baseline_ms: f64) -> bool {
        false
    }

    fn detect(&self, _tree: &PlanTree, _obs: &PlanObservations, qobs: &QueryObservations, catalog: &Catalog) -> Option<Match> {
        // Hard-stop: same-column OR chains never split; max 3
        // branches (gate).
        if qobs.same_column_or.is_some() {
            return None;
        }
        if qobs.or_distinct_columns < 2 || qobs.or_distinct_columns > 3 {
            return None;
        }
        Some(Match {
            pathology_id: self.id(),
            anchor: None,
            importance: Importance::Two,
            phase: Phase::Structural,
            detail: format!("full scan with OR across {} distinct columns", qobs.or_distinct_columns),
            transform_options: catalog.transform_options_for(self.id()),
        })
    }
}
