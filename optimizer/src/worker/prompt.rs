//! Prompt assembly. `CATALOG_HEADER` is the static system
//! prompt, loaded once as a `const` the same way a static system-prompt
//! header loaded via `include_str!` would be; the dynamic tail is the
//! dispatcher's per-probe briefing plus the
//! PatchPlan JSON schema the worker must respond in.

use crate::dispatch::Probe;

pub const CATALOG_HEADER: &str = r#"You are a senior query optimization engineer working against a live
DuckDB or Postgres session. You are given one hypothesis about why a query
runs slower than it should, and one named transform to try. Produce a single
PatchPlan: an ordered, anchor-addressed edit script against the query's AST.

Rules:
- Every op you emit must target an anchor hash that exists in the SQL given
  to you, or introduce a brand-new CTE via insert_cte.
- Never drop or change a literal value from the original query.
- Never materialize an EXISTS/NOT EXISTS subquery into a CTE.
- Never split a same-column OR chain into a UNION.
- Every CTE you introduce must have a WHERE clause and must be referenced
  downstream.
- Prefer COUNT(*) FILTER (WHERE cond) over CASE WHEN for conditional counts.

Respond with exactly one JSON object matching this schema and nothing else:
{
  "ops": [
    {"op": "insert_cte", "name": "...", "body_sql": "..."},
    {"op": "replace_from", "anchor": "<hex>", "new_from_clause": "..."},
    {"op": "replace_where_predicate", "anchor": "<hex>", "new_predicate": "..."},
    {"op": "rewrite_select", "anchor": "<hex>", "new_select_list": "..."},
    {"op": "replace_subquery", "anchor": "<hex>", "new_subquery": "..."},
    {"op": "delete_node", "anchor": "<hex>"}
  ],
  "transforms": ["<transform_id>"],
  "expected_explain_delta": "one sentence describing the expected plan change",
  "risk": "low" | "medium" | "high"
}
"#;

/// Dynamic tail: the dispatcher already rendered the shared hypothesis,
/// transform id, gates and exemplars into `probe.briefing`; we
/// only need to attach the anchor hashes in a form the model can copy back
/// verbatim.
pub fn build_probe_prompt(probe: &Probe, sql: &str) -> String {
    let anchors: Vec<String> = probe.anchors.iter().map(|a| a.to_string()).collect();
    format!(
        "PROBE ID: {probe_id}\nANCHORS AVAILABLE: {anchors}\n\n{briefing}\n\nFULL SQL:\n{sql}\n",
        probe_id = probe.probe_id,
        anchors = anchors.join(", "),
        briefing = probe.briefing,
    )
}
