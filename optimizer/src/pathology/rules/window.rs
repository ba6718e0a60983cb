//! P8: a WINDOW function computed inside a CTE, then the CTE is joined
//! against something sharing the same ORDER BY — the window could be
//! deferred to after the join instead.

use crate::pathology::catalog::Catalog;
use crate::pathology::model::{Importance, Match, PathologyId, Phase};
use crate::pathology::query_flags::QueryObservations;
use crate::pathology::Pathology;
use crate::plan::cost::PlanObservations;
use crate::plan::model::PlanTree;

pub struct P8DeferredWindowAggregation;

impl Pathology for P8DeferredWindowAggregation {
    fn id(&self) -> PathologyId {
        PathologyId::P8
    }

    fn prune(&self, obs: &PlanObservations, _baseline_ms: f64) -> bool {
        obs.cte_count == 0
    }

    fn detect(&self, _tree: &PlanTree, _obs: &PlanObservations, qobs: &QueryObservations, catalog: &Catalog) -> Option<Match> {
        if !qobs.window_in_cte_joined_outside {
            return None;
        }
        // Gate: not LAG/LEAD (those need row order preserved through the
        // join and can't be deferred) -- the detail string is conservative
        // here since window function names aren't separately tracked.
        Some(Match {
            pathology_id: self.id(),
            anchor: None,
            importance: Importance::One,
            phase: Phase::Structural,
            detail: "WINDOW function computed inside a CTE that's joined downstream".to_string(),
            transform_options: catalog.transform_options_for(self.id()),
        })
    }
}
