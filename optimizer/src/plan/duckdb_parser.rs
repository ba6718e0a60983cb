//! Parses DuckDB's `EXPLAIN ANALYZE` tree-drawing text into a `PlanTree`.
//!
//! DuckDB draws its physical plan as boxes: each operator is a bordered
//! block, children hang below connected by `│`/`└─`/`┌─` box-drawing
//! characters, most-expensive-first is not guaranteed so we rely on the
//! `(co)` / `ms` annotations DuckDB emits under `ANALYZE`. Box nesting
//! depth is the tree structure; walked the same way a topology parser
//! would walk indentation depth over a bracketed format.

use super::cost::compute_exclusive_ms;
use super::model::{Dialect, PlanNode, PlanTree};
use crate::utils::error::OptimizerError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static ROWS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)rows?:\s*([\d,]+)").unwrap());
static EST_CARD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:estimated|cardinality)\s*(?:rows)?:\s*~?([\d,]+)").unwrap());
static TIME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)([\d.]+)\s*(ms|s)\b").unwrap());
static TABLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(?:table|scan)\s*[:=]?\s*([A-Za-z_][\w.]*)").unwrap());

/// One parsed block: operator name plus its raw annotation lines, at a given
/// nesting depth inferred from leading box-drawing indentation.
struct Block {
    depth: usize,
    operator: String,
    lines: Vec<String>,
}

pub fn parse(raw: &str) -> Result<PlanTree, OptimizerError> {
    if raw.trim().is_empty() {
        return Err(OptimizerError::plan_parse_failed("empty EXPLAIN output"));
    }

    let blocks = split_blocks(raw);
    if blocks.is_empty() {
        return Err(OptimizerError::plan_parse_failed(
            "no operator blocks recognized in DuckDB EXPLAIN output",
        ));
    }

    let mut cursor = 0usize;
    let base_depth = blocks[0].depth;
    let mut root = build_subtree(&blocks, &mut cursor, base_depth);
    compute_exclusive_ms(&mut root);

    Ok(PlanTree { dialect: Dialect::DuckDb, root, raw: raw.to_string() })
}

/// Recursive descent over the flat, depth-tagged block list: a block at
/// `depth` owns every following block whose depth is strictly greater, until
/// one at `depth` or shallower ends its subtree.
fn build_subtree(blocks: &[Block], cursor: &mut usize, depth: usize) -> PlanNode {
    let mut node = build_node(&blocks[*cursor]);
    *cursor += 1;
    while *cursor < blocks.len() && blocks[*cursor].depth > depth {
        let child_depth = blocks[*cursor].depth;
        node.children.push(build_subtree(blocks, cursor, child_depth));
    }
    node
}

fn split_blocks(raw: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut current: Option<Block> = None;

    for line in raw.lines() {
        let trimmed_start = line.trim_start_matches(['│', '┌', '└', '├', '─', ' ', '┐', '┘', '┬', '┴']);
        let depth = (line.len() - trimmed_start.len()) / 2;
        let content = trimmed_start.trim();
        if content.is_empty() {
            continue;
        }

        // A line that looks like an UPPER_SNAKE_CASE operator name (or has
        // no ':' annotation marker) starts a new block; everything else is
        // an annotation line belonging to the current block.
        let looks_like_operator = content.chars().next().map(|c| c.is_uppercase()).unwrap_or(false)
            && !content.contains(':')
            && content.len() < 40;

        if looks_like_operator || current.is_none() {
            if let Some(b) = current.take() {
                blocks.push(b);
            }
            current = Some(Block { depth, operator: content.to_string(), lines: Vec::new() });
        } else if let Some(b) = current.as_mut() {
            b.lines.push(content.to_string());
        }
    }
    if let Some(b) = current.take() {
        blocks.push(b);
    }
    blocks
}

fn parse_count(s: &str) -> Option<u64> {
    s.replace(',', "").parse().ok()
}

fn parse_ms(raw_num: &str, unit: &str) -> f64 {
    let n: f64 = raw_num.parse().unwrap_or(0.0);
    if unit.eq_ignore_ascii_case("s") { n * 1000.0 } else { n }
}

fn build_node(block: &Block) -> PlanNode {
    let mut node = PlanNode::leaf(block.operator.clone());
    let joined = block.lines.join("\n");

    if let Some(caps) = ROWS_RE.captures(&joined) {
        node.cardinality_act = parse_count(&caps[1]);
    }
    if let Some(caps) = EST_CARD_RE.captures(&joined) {
        node.cardinality_est = parse_count(&caps[1]);
    }
    if let Some(caps) = TIME_RE.captures(&joined) {
        node.ms_cumulative = Some(parse_ms(&caps[1], &caps[2]));
    }
    if let Some(caps) = TABLE_RE.captures(&joined) {
        node.extra.insert("table".to_string(), caps[1].to_string());
    }

    let mut extra: HashMap<String, String> = HashMap::new();
    for line in &block.lines {
        if let Some((k, v)) = line.split_once(':') {
            extra.insert(k.trim().to_ascii_lowercase(), v.trim().to_string());
        }
    }
    node.extra.extend(extra);
    if node.extra.contains_key("correlated subquery") {
        node.extra.insert("correlated".to_string(), "true".to_string());
    }

    node
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_explain_output_is_rejected() {
        let result = parse("   \n  ");
        assert!(matches!(result, Err(OptimizerError::PlanParseFailed(_))));
    }

    #[test]
    fn builds_a_parent_child_tree_from_indentation_depth() {
        let raw = "HASH_JOIN\n  rows: 100\n  SEQ_SCAN\n    rows: 50\n";
        let tree = parse(raw).expect("parses");
        assert_eq!(tree.root.operator, "HASH_JOIN");
        assert_eq!(tree.root.cardinality_act, Some(100));
        assert_eq!(tree.root.children.len(), 1);
        assert_eq!(tree.root.children[0].operator, "SEQ_SCAN");
        assert_eq!(tree.root.children[0].cardinality_act, Some(50));
    }

    #[test]
    fn extracts_table_name_from_annotation() {
        let raw = "SEQ_SCAN\n  Table: orders\n  rows: 200\n";
        let tree = parse(raw).expect("parses");
        assert_eq!(tree.root.extra.get("table").map(String::as_str), Some("orders"));
    }
}
