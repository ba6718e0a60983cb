use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Backend the connected Session talks to. Carried on `Query` and
/// threaded through plan parsing, anchor canonicalization and the applier's
/// dialect-specific lowering (e.g. `FILTER` -> `CASE WHEN`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    DuckDb,
    Postgres,
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::DuckDb => write!(f, "duckdb"),
            Dialect::Postgres => write!(f, "postgres"),
        }
    }
}

impl std::str::FromStr for Dialect {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "duckdb" => Ok(Dialect::DuckDb),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            other => Err(format!("unknown dialect: {other}")),
        }
    }
}

/// One node in the operator tree (`PlanNode`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanNode {
    pub operator: String,
    pub cardinality_est: Option<u64>,
    pub cardinality_act: Option<u64>,
    /// Exclusive ms: children's cumulative time subtracted out. Computed by
    /// `cost::compute_exclusive_ms`, never set directly by a parser.
    pub ms_exclusive: Option<f64>,
    /// As reported by the engine (cumulative for the subtree rooted here).
    pub ms_cumulative: Option<f64>,
    pub extra: HashMap<String, String>,
    pub children: Vec<PlanNode>,
}

impl PlanNode {
    pub fn leaf(operator: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            cardinality_est: None,
            cardinality_act: None,
            ms_exclusive: None,
            ms_cumulative: None,
            extra: HashMap::new(),
            children: Vec::new(),
        }
    }

    /// Q-error = max(est/act, act/est) when both are present.
    pub fn q_error(&self) -> Option<f64> {
        match (self.cardinality_est, self.cardinality_act) {
            (Some(est), Some(act)) if est > 0 && act > 0 => {
                let est = est as f64;
                let act = act as f64;
                Some((est / act).max(act / est))
            }
            _ => None,
        }
    }

    /// True for DuckDB `SEQ_SCAN` or Postgres `Seq Scan` nodes.
    pub fn is_seq_scan(&self) -> bool {
        let op = self.operator.to_ascii_uppercase();
        op.contains("SEQ_SCAN") || op == "SEQ SCAN"
    }

    /// Base table name this scan reads, if the parser recorded one.
    pub fn scanned_table(&self) -> Option<&str> {
        self.extra.get("table").map(|s| s.as_str())
    }
}

/// Rooted ordered operator tree (`PlanTree`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanTree {
    pub dialect: Dialect,
    pub root: PlanNode,
    /// Raw EXPLAIN text/JSON this tree was parsed from, kept for
    /// `explain_delta_summary` and diagnostics.
    pub raw: String,
}

impl PlanTree {
    pub fn walk_preorder<'a>(&'a self) -> Vec<&'a PlanNode> {
        let mut out = Vec::new();
        fn visit<'a>(node: &'a PlanNode, out: &mut Vec<&'a PlanNode>) {
            out.push(node);
            for child in &node.children {
                visit(child, out);
            }
        }
        visit(&self.root, &mut out);
        out
    }
}
