//! Pathology Engine : names the bottleneck from a `PlanTree` plus
//! structural flags and produces transform candidates with gates.
//!
//! `Pathology` generalizes a `DiagnosticRule` trait (`id`,
//! `name`, `applicable_to`, `evaluate`) the same way a flattened-hierarchy design asks:
//! "flatten to tagged variants + a Detector capability". `PathologyEngine`
//! plays the role of `RuleEngine`: a pruning pass first, then per-pathology
//! detection, then a dedup + summarize pass mirroring
//! `RuleEngine::analyze_with_cluster_variables`'s sort/dedup/conclusion
//! pipeline.

pub mod catalog;
pub mod hard_stops;
pub mod model;
pub mod query_flags;
pub mod rules;

use crate::plan::cost::PlanObservations;
use crate::plan::model::PlanTree;
use catalog::Catalog;
use model::{DiagnosisSummary, Match, PathologyId};
use query_flags::QueryObservations;
use std::collections::HashSet;

/// One pathology detector (`Pathology`, one matrix row).
pub trait Pathology: Send + Sync {
    fn id(&self) -> PathologyId;

    /// True = skip this pathology entirely.
    fn prune(&self, obs: &PlanObservations, baseline_ms: f64) -> bool;

    /// Positive detection against the plan tree and the query's structural
    /// flags; `catalog` resolves this pathology's transform options.
    fn detect(
        &self,
        tree: &PlanTree,
        obs: &PlanObservations,
        qobs: &QueryObservations,
        catalog: &Catalog,
    ) -> Option<Match>;
}

/// Mirrors a `RuleEngineConfig` shape.
#[derive(Debug, Clone)]
pub struct PathologyEngineConfig {
    pub max_matches: usize,
}

impl Default for PathologyEngineConfig {
    fn default() -> Self {
        Self { max_matches: 16 }
    }
}

pub struct PathologyEngine {
    config: PathologyEngineConfig,
    pathologies: Vec<Box<dyn Pathology>>,
}

impl PathologyEngine {
    pub fn new() -> Self {
        Self { config: PathologyEngineConfig::default(), pathologies: rules::all_pathologies() }
    }

    pub fn with_config(config: PathologyEngineConfig) -> Self {
        Self { config, pathologies: rules::all_pathologies() }
    }

    /// Pruning pass then per-survivor detection, dedup by
    /// `(pathology_id, anchor)`, and summary — the structural twin of
    /// `RuleEngine::analyze_with_cluster_variables`.
    pub fn diagnose(
        &self,
        tree: &PlanTree,
        obs: &PlanObservations,
        qobs: &QueryObservations,
        baseline_ms: f64,
        catalog: &Catalog,
    ) -> DiagnosisSummary {
        let mut matches = Vec::new();

        for pathology in &self.pathologies {
            if pathology.prune(obs, baseline_ms) {
                continue;
            }
            if let Some(m) = pathology.detect(tree, obs, qobs, catalog) {
                matches.push(m);
            }
        }

        let matches = dedupe(matches);
        let matches = if matches.len() > self.config.max_matches {
            let mut m = matches;
            m.truncate(self.config.max_matches);
            m
        } else {
            matches
        };

        let families_covered: HashSet<PathologyId> = matches.iter().map(|m| m.pathology_id).collect();
        let conclusion = summarize_conclusion(&matches);

        DiagnosisSummary { matches, families_covered: families_covered.len(), conclusion }
    }
}

impl Default for PathologyEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn dedupe(matches: Vec<Match>) -> Vec<Match> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for m in matches {
        let key = (m.pathology_id, m.anchor);
        if seen.insert(key) {
            out.push(m);
        }
    }
    out
}

fn summarize_conclusion(matches: &[Match]) -> String {
    if matches.is_empty() {
        return "no pathology detected; query appears well-optimized for this plan shape".to_string();
    }
    let names: Vec<String> = matches.iter().map(|m| format!("{}", m.pathology_id)).collect();
    format!("{} pathology match(es): {}", matches.len(), names.join(", "))
}
