//! PatchPlan IR: an ordered, anchor-addressed edit script against
//! the query AST, plus the JSON wire format the HTTP/CLI surfaces exchange.

use super::anchor::AnchorHash;
use serde::{Deserialize, Serialize};

/// One edit operation, addressed by an anchor hash rather than a text range
///. `anchor` identifies the *existing* subtree the op targets;
/// `insert_cte` has none, since it introduces a new node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    InsertCte { name: String, body_sql: String },
    ReplaceFrom { anchor: AnchorHash, new_from_clause: String },
    ReplaceWherePredicate { anchor: AnchorHash, new_predicate: String },
    RewriteSelect { anchor: AnchorHash, new_select_list: String },
    ReplaceSubquery { anchor: AnchorHash, new_subquery: String },
    DeleteNode { anchor: AnchorHash },
}

impl Op {
    /// The anchor this op re-resolves against the current AST before
    /// applying, if any.
    pub fn anchor(&self) -> Option<AnchorHash> {
        match self {
            Op::InsertCte { .. } => None,
            Op::ReplaceFrom { anchor, .. }
            | Op::ReplaceWherePredicate { anchor, .. }
            | Op::RewriteSelect { anchor, .. }
            | Op::ReplaceSubquery { anchor, .. }
            | Op::DeleteNode { anchor } => Some(*anchor),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    Low,
    Medium,
    High,
}

/// The full PatchPlan wire format: ops plus attribution
/// metadata the sniper and final-result reporting both read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchPlan {
    pub ops: Vec<Op>,
    pub transforms: Vec<String>,
    pub expected_explain_delta: String,
    pub risk: Risk,
}

impl PatchPlan {
    pub fn anchors(&self) -> Vec<AnchorHash> {
        self.ops.iter().filter_map(Op::anchor).collect()
    }
}
