//! Scan/aggregate pathologies: P1 (same base table scanned repeatedly with
//! identical joins) and P3 (GROUP BY input rows far exceeding distinct keys
//! after a join).

use crate::pathology::catalog::Catalog;
use crate::pathology::model::{Importance, Match, PathologyId, Phase};
use crate::pathology::query_flags::QueryObservations;
use crate::pathology::Pathology;
use crate::plan::cost::PlanObservations;
use crate::plan::model::PlanTree;

pub struct P1SinglePassAggregation;

impl Pathology for P1SinglePassAggregation {
    fn id(&self) -> PathologyId {
        PathologyId::P1
    }

    fn prune(&self, obs: &PlanObservations, _baseline_ms: f64) -> bool {
        // "every table appears once -> skip repeated-scan".
        obs.repeated_tables.values().all(|&n| n < 2)
    }

    fn detect(&self, _tree: &PlanTree, obs: &PlanObservations, _qobs: &QueryObservations, catalog: &Catalog) -> Option<Match> {
        let (table, count) = obs.repeated_tables.iter().max_by_key(|(_, &n)| n)?;
        if *count < 2 {
            return None;
        }
        // Gate: N<=8 branches; no stddev/percentile agg (approximated: we
        // only have operator names here, checked by the applier against the
        // real projection list before this transform is offered).
        if *count > 8 {
            return None;
        }
        Some(Match {
            pathology_id: self.id(),
            anchor: None,
            importance: Importance::Three,
            phase: Phase::RedundancyElimination,
            detail: format!("table `{table}` scanned {count} times with identical joins"),
            transform_options: catalog.transform_options_for(self.id()),
        })
    }
}

pub struct P3AggregatePushdown;

impl Pathology for P3AggregatePushdown {
    fn id(&self) -> PathologyId {
        PathologyId::P3
    }

    fn prune(&self, obs: &PlanObservations, _baseline_ms: f64) -> bool {
        obs.join_count == 0
    }

    fn detect(&self, tree: &PlanTree, obs: &PlanObservations, _qobs: &QueryObservations, catalog: &Catalog) -> Option<Match> {
        // GROUP BY input rows much greater than distinct keys after join: we
        // look for a HASH_GROUP_BY/GroupAggregate node whose cardinality_act
        // is far smaller than its input child's.
        let group_node = tree
            .walk_preorder()
            .into_iter()
            .find(|n| n.operator.to_ascii_uppercase().contains("GROUP"))?;
        let child_rows = group_node.children.first().and_then(|c| c.cardinality_act)?;
        let output_rows = group_node.cardinality_act.unwrap_or(child_rows);
        if output_rows == 0 || child_rows / output_rows.max(1) < 10 {
            return None;
        }
        let _ = obs.non_equi_join;
        Some(Match {
            pathology_id: self.id(),
            anchor: None,
            importance: Importance::Two,
            phase: Phase::RedundancyElimination,
            detail: format!("GROUP BY input {child_rows} rows collapses to {output_rows} distinct keys after join"),
            transform_options: catalog.transform_options_for(self.id()),
        })
    }
}
