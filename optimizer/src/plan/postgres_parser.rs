//! Parses Postgres `EXPLAIN (ANALYZE, FORMAT JSON)` output into a `PlanTree`.
//!
//! Structured JSON means this parser is a direct tree walk rather than the
//! indentation inference DuckDB's text format needs — reducing several
//! pathology detectors (P2/P5/P6) to plain JSON field reads.

use super::cost::compute_exclusive_ms;
use super::model::{Dialect, PlanNode, PlanTree};
use crate::utils::error::OptimizerError;
use serde_json::Value;
use std::collections::HashMap;

pub fn parse(raw: &str) -> Result<PlanTree, OptimizerError> {
    let parsed: Value = serde_json::from_str(raw)
        .map_err(|e| OptimizerError::plan_parse_failed(format!("invalid EXPLAIN JSON: {e}")))?;

    // `EXPLAIN (FORMAT JSON)` returns a top-level array of one plan object;
    // `psql`'s `\timing`-wrapped output sometimes unwraps it already.
    let plan_obj = match &parsed {
        Value::Array(items) => items
            .first()
            .and_then(|v| v.get("Plan"))
            .ok_or_else(|| OptimizerError::plan_parse_failed("missing top-level Plan node"))?,
        Value::Object(_) => parsed
            .get("Plan")
            .ok_or_else(|| OptimizerError::plan_parse_failed("missing top-level Plan node"))?,
        _ => return Err(OptimizerError::plan_parse_failed("unexpected EXPLAIN JSON shape")),
    };

    let mut root = build_node(plan_obj)?;
    compute_exclusive_ms(&mut root);

    Ok(PlanTree { dialect: Dialect::Postgres, root, raw: raw.to_string() })
}

fn build_node(value: &Value) -> Result<PlanNode, OptimizerError> {
    let operator = value
        .get("Node Type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| OptimizerError::plan_parse_failed("Plan node missing Node Type"))?
        .to_string();

    let mut node = PlanNode::leaf(operator);

    node.cardinality_est = value.get("Plan Rows").and_then(|v| v.as_u64());
    node.cardinality_act =
        value.get("Actual Rows").and_then(|v| v.as_f64()).map(|r| (r.max(0.0)).round() as u64);
    node.ms_cumulative = value.get("Actual Total Time").and_then(|v| v.as_f64());

    let mut extra = HashMap::new();
    if let Some(rel) = value.get("Relation Name").and_then(|v| v.as_str()) {
        extra.insert("table".to_string(), rel.to_string());
    }
    if let Some(cond) = value
        .get("Join Filter")
        .or_else(|| value.get("Hash Cond"))
        .or_else(|| value.get("Merge Cond"))
        .and_then(|v| v.as_str())
    {
        extra.insert("condition".to_string(), cond.to_string());
    }
    if let Some(filter) = value.get("Filter").and_then(|v| v.as_str()) {
        extra.insert("filter".to_string(), filter.to_string());
    }
    if let Some(method) = value.get("Sort Method").and_then(|v| v.as_str()) {
        extra.insert("sort_method".to_string(), method.to_string());
    }
    if let Some(batches) = value.get("Hash Batches").and_then(|v| v.as_u64()) {
        extra.insert("hash_batches".to_string(), batches.to_string());
    }
    if let Some(recheck) = value.get("Rows Removed by Index Recheck").and_then(|v| v.as_u64()) {
        extra.insert("rows_removed_by_recheck".to_string(), recheck.to_string());
    }
    if value.get("Parent Relationship").and_then(|v| v.as_str()) == Some("SubPlan")
        && value.get("Node Type").and_then(|v| v.as_str()).map(|t| t.contains("Scan")).unwrap_or(false)
    {
        extra.insert("correlated".to_string(), "true".to_string());
    }
    node.extra = extra;

    if let Some(children) = value.get("Plans").and_then(|v| v.as_array()) {
        for child in children {
            node.children.push(build_node(child)?);
        }
    }

    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_json() {
        let result = parse("not json");
        assert!(matches!(result, Err(OptimizerError::PlanParseFailed(_))));
    }

    #[test]
    fn parses_top_level_array_with_nested_plan() {
        let raw = r#"[{"Plan": {
            "Node Type": "Hash Join",
            "Actual Total Time": 12.5,
            "Plan Rows": 100,
            "Actual Rows": 95.0,
            "Hash Cond": "(a.id = b.id)",
            "Plans": [
                {"Node Type": "Seq Scan", "Relation Name": "orders", "Actual Total Time": 5.0, "Actual Rows": 95.0}
            ]
        }}]"#;
        let tree = parse(raw).expect("parses");
        assert_eq!(tree.root.operator, "Hash Join");
        assert_eq!(tree.root.cardinality_act, Some(95));
        assert_eq!(tree.root.extra.get("condition").map(String::as_str), Some("(a.id = b.id)"));
        assert_eq!(tree.root.children.len(), 1);
        assert_eq!(tree.root.children[0].extra.get("table").map(String::as_str), Some("orders"));
    }

    #[test]
    fn missing_node_type_is_rejected() {
        let raw = r#"{"Plan": {"Actual Total Time": 1.0}}"#;
        assert!(parse(raw).is_err());
    }
}
