//! Pathology data model : the tagged-variant shape the
//! `DiagnosticRule` hierarchy is flattened into (design note).

use crate::patchplan::AnchorHash;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// `P0..P9` on DuckDB, `P1..P7` + `C1..C6` on Postgres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum PathologyId {
    P0,
    P1,
    P2,
    P3,
    P4,
    P5,
    P6,
    P7,
    P8,
    P9,
    C1,
    C2,
    C3,
    C4,
    C5,
    C6,
}

impl fmt::Display for PathologyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Ordering phase (`Pathology.ordering`): scan reduction first,
/// redundancy elimination next, structural last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub enum Phase {
    ScanReduction = 1,
    RedundancyElimination = 2,
    Structural = 3,
}

/// Importance rating driving dispatcher probe counts : ★=1,
/// ★★=2, ★★★=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub enum Importance {
    One,
    Two,
    Three,
}

/// Historical win evidence for one transform option.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema)]
pub struct Evidence {
    pub win_count: u32,
    pub mean_speedup: f64,
    pub worst_speedup: f64,
}

/// A structural prerequisite a transform must satisfy before being offered
/// (`gates`). Gates are catalog data, not code —
/// `description` is surfaced in worker briefings; the pathology's own
/// `detect`/hard-stop checks are what actually enforce them.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Gate {
    pub description: String,
}

/// Named rewrite family (`Transform`): a specification, not code.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransformOption {
    pub transform_id: String,
    pub evidence: Evidence,
    pub gates: Vec<Gate>,
}

/// One positive pathology detection : the pathology id, the
/// anchor it centers on (if the detector found a specific subtree), and the
/// transform options still standing after hard-stops pruned any the match
/// can't use.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Match {
    pub pathology_id: PathologyId,
    pub anchor: Option<AnchorHash>,
    pub importance: Importance,
    pub phase: Phase,
    pub detail: String,
    pub transform_options: Vec<TransformOption>,
}

/// `PathologyEngine::summarize` output (generalizes a
/// `generate_conclusion`/`calculate_performance_score` pair).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DiagnosisSummary {
    pub matches: Vec<Match>,
    pub families_covered: usize,
    pub conclusion: String,
}
