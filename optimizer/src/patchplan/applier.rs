//! PatchPlan Applier : applies a `PatchPlan`'s ops, in order, to
//! the original AST, re-resolving each anchor against the *current*
//! (already-mutated) AST — never the original — then runs structural
//! validation on the result.
//!
//! Parses with `sqlparser::Parser` under `GenericDialect` and hand-rolls the
//! AST walk, since `sqlparser`'s plain struct/enum AST has no built-in
//! mutating visitor.
//!
//! Scope note: anchors are resolved against the top-level `SELECT` body
//! (`SetExpr::Select`) — its `FROM`, `WHERE`, projection list, and CTEs —
//! plus one level of subquery nesting inside those. Set operations
//! (`UNION`/`INTERSECT` at the outermost level) and subqueries nested more
//! than one level deep are out of scope for anchor resolution; transforms
//! that need to reach deeper address the relevant CTE instead, which is
//! itself a top-level anchor.

use super::anchor::{hash_fragment, AnchorHash};
use super::ir::{Op, PatchPlan};
use crate::pathology::hard_stops;
use crate::utils::error::OptimizerError;
use sqlparser::ast::{Cte, Expr, Query, Select, SetExpr, Statement, TableFactor, TableWithJoins, With};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::collections::HashSet;

/// Categorized structural-validation failure reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralReason {
    ReparseFailed(String),
    ColumnCountChanged { baseline: usize, candidate: usize },
    LiteralDropped(String),
    OrphanedCte(String),
    CteMissingWhere(String),
    HardStopViolated(String),
}

impl std::fmt::Display for StructuralReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReparseFailed(e) => write!(f, "reparse_failed:{e}"),
            Self::ColumnCountChanged { baseline, candidate } => {
                write!(f, "column_count_changed:{baseline}->{candidate}")
            }
            Self::LiteralDropped(lit) => write!(f, "literal_drop:{lit}"),
            Self::OrphanedCte(name) => write!(f, "orphaned_cte:{name}"),
            Self::CteMissingWhere(name) => write!(f, "cte_missing_where:{name}"),
            Self::HardStopViolated(reason) => write!(f, "hard_stop:{reason}"),
        }
    }
}

pub struct ApplyResult {
    pub candidate_sql: String,
    pub statement: Statement,
}

/// Parse `sql` under the shared `GenericDialect`, applying both dialects the
/// way this pipeline needs: one AST shape for anchor hashing
/// across DuckDB and Postgres, dialect quirks normalized post-parse.
pub fn parse(sql: &str) -> Result<Statement, OptimizerError> {
    let dialect = GenericDialect {};
    let mut statements = Parser::parse_sql(&dialect, sql)
        .map_err(|e| OptimizerError::structural_invalid(format!("parse_failed:{e}")))?;
    if statements.len() != 1 {
        return Err(OptimizerError::structural_invalid("expected exactly one statement"));
    }
    Ok(statements.remove(0))
}

/// Apply every op in `plan` to `original_sql`, in order, rejecting the whole
/// plan if any anchor fails to resolve.
pub fn apply(original_sql: &str, plan: &PatchPlan) -> Result<ApplyResult, OptimizerError> {
    let mut statement = parse(original_sql)?;

    for op in &plan.ops {
        apply_op(&mut statement, op)?;
    }

    let candidate_sql = statement.to_string();
    Ok(ApplyResult { candidate_sql, statement })
}

fn apply_op(statement: &mut Statement, op: &Op) -> Result<(), OptimizerError> {
    let query = top_level_query_mut(statement)?;

    match op {
        Op::InsertCte { name, body_sql } => insert_cte(query, name, body_sql),
        Op::ReplaceFrom { anchor, new_from_clause } => replace_from(query, *anchor, new_from_clause),
        Op::ReplaceWherePredicate { anchor, new_predicate } => {
            replace_where(query, *anchor, new_predicate)
        }
        Op::RewriteSelect { anchor, new_select_list } => {
            rewrite_select(query, *anchor, new_select_list)
        }
        Op::ReplaceSubquery { anchor, new_subquery } => replace_subquery(query, *anchor, new_subquery),
        Op::DeleteNode { anchor } => delete_node(query, *anchor),
    }
}

fn top_level_query_mut(statement: &mut Statement) -> Result<&mut Query, OptimizerError> {
    match statement {
        Statement::Query(q) => Ok(q.as_mut()),
        other => Err(OptimizerError::structural_invalid(format!(
            "unsupported top-level statement for patching: {other}"
        ))),
    }
}

fn top_level_select_mut(query: &mut Query) -> Result<&mut Select, OptimizerError> {
    match query.body.as_mut() {
        SetExpr::Select(select) => Ok(select.as_mut()),
        _ => Err(OptimizerError::structural_invalid("top-level body is not a plain SELECT")),
    }
}

fn insert_cte(query: &mut Query, name: &str, body_sql: &str) -> Result<(), OptimizerError> {
    if hard_stops::forbids_materialize_exists_text(body_sql) {
        return Err(OptimizerError::structural_invalid("hard_stop:materialize_exists"));
    }

    let body_statement = parse(body_sql)?;
    let body_query = match body_statement {
        Statement::Query(q) => *q,
        _ => return Err(OptimizerError::structural_invalid("insert_cte body is not a query")),
    };

    let cte = Cte {
        alias: sqlparser::ast::TableAlias { name: sqlparser::ast::Ident::new(name), columns: vec![] },
        query: Box::new(body_query),
        from: None,
        materialized: None,
    };

    match &mut query.with {
        Some(with) => with.cte_tables.push(cte),
        None => query.with = Some(With { recursive: false, cte_tables: vec![cte] }),
    }
    Ok(())
}

/// Anchor-match the top-level `FROM` clause against `anchor`. Returns
/// `Err(structural_invalid)` rather than panicking when the top-level body
/// isn't a plain `SELECT` (e.g. a `UNION`/`INTERSECT` query), matching every
/// other anchor op.
fn find_from_anchor(query: &Query, anchor: AnchorHash) -> Result<bool, OptimizerError> {
    let select = top_level_select_ref(query)?;
    Ok(hash_fragment(&from_clause_text(select)) == anchor)
}

fn top_level_select_ref(query: &Query) -> Result<&Select, OptimizerError> {
    match query.body.as_ref() {
        SetExpr::Select(select) => Ok(select.as_ref()),
        _ => Err(OptimizerError::structural_invalid("top-level body is not a plain SELECT")),
    }
}

fn from_clause_text(select: &Select) -> String {
    select.from.iter().map(|f| f.to_string()).collect::<Vec<_>>().join(", ")
}

fn replace_from(query: &mut Query, anchor: AnchorHash, new_from_clause: &str) -> Result<(), OptimizerError> {
    if !find_from_anchor(query, anchor)? {
        return Err(OptimizerError::anchor_missing(anchor));
    }
    let select_ref = top_level_select_ref(query)?;
    if hard_stops::forbids_same_column_or_split(select_ref.selection.as_ref(), new_from_clause) {
        return Err(OptimizerError::structural_invalid("hard_stop:same_column_or_split"));
    }
    let wrapped = parse(&format!("SELECT 1 FROM {new_from_clause}"))?;
    let new_from: Vec<TableWithJoins> = match wrapped {
        Statement::Query(q) => match *q.body {
            SetExpr::Select(s) => s.from,
            _ => return Err(OptimizerError::structural_invalid("new_from_clause did not parse as a FROM list")),
        },
        _ => return Err(OptimizerError::structural_invalid("new_from_clause did not parse as a query")),
    };
    let select = top_level_select_mut(query)?;
    select.from = new_from;
    Ok(())
}

fn replace_where(query: &mut Query, anchor: AnchorHash, new_predicate: &str) -> Result<(), OptimizerError> {
    let select = top_level_select_mut(query)?;
    let current = select.selection.as_ref().map(|e| e.to_string()).unwrap_or_default();
    if hash_fragment(&current) != anchor {
        return Err(OptimizerError::anchor_missing(anchor));
    }
    if hard_stops::forbids_same_column_or_split(select.selection.as_ref(), new_predicate) {
        return Err(OptimizerError::structural_invalid("hard_stop:same_column_or_split"));
    }
    let new_expr = parse_expr(new_predicate)?;
    select.selection = Some(new_expr);
    Ok(())
}

fn rewrite_select(query: &mut Query, anchor: AnchorHash, new_select_list: &str) -> Result<(), OptimizerError> {
    let select = top_level_select_mut(query)?;
    let current = select.projection.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(", ");
    if hash_fragment(&current) != anchor {
        return Err(OptimizerError::anchor_missing(anchor));
    }
    let wrapped = parse(&format!("SELECT {new_select_list} FROM __anchor_placeholder__"))?;
    let new_projection = match wrapped {
        Statement::Query(q) => match *q.body {
            SetExpr::Select(s) => s.projection,
            _ => return Err(OptimizerError::structural_invalid("new_select_list did not parse")),
        },
        _ => return Err(OptimizerError::structural_invalid("new_select_list did not parse")),
    };
    select.projection = new_projection;
    Ok(())
}

fn replace_subquery(query: &mut Query, anchor: AnchorHash, new_subquery: &str) -> Result<(), OptimizerError> {
    let new_inner = match parse(new_subquery)? {
        Statement::Query(q) => *q,
        _ => return Err(OptimizerError::structural_invalid("new_subquery is not a query")),
    };

    if hard_stops::forbids_materialize_exists_text(new_subquery) {
        return Err(OptimizerError::structural_invalid("hard_stop:materialize_exists"));
    }

    let select = top_level_select_mut(query)?;

    for table in &mut select.from {
        if replace_subquery_in_table_factor(&mut table.relation, anchor, &new_inner) {
            return Ok(());
        }
        for join in &mut table.joins {
            if replace_subquery_in_table_factor(&mut join.relation, anchor, &new_inner) {
                return Ok(());
            }
        }
    }

    if let Some(expr) = select.selection.as_mut() {
        if replace_subquery_in_expr(expr, anchor, &new_inner) {
            return Ok(());
        }
    }

    Err(OptimizerError::anchor_missing(anchor))
}

fn replace_subquery_in_table_factor(factor: &mut TableFactor, anchor: AnchorHash, new_inner: &Query) -> bool {
    if let TableFactor::Derived { subquery, .. } = factor {
        if hash_fragment(&subquery.to_string()) == anchor {
            *subquery = Box::new(new_inner.clone());
            return true;
        }
    }
    false
}

fn replace_subquery_in_expr(expr: &mut Expr, anchor: AnchorHash, new_inner: &Query) -> bool {
    match expr {
        Expr::Subquery(q) | Expr::Exists { subquery: q, .. } | Expr::InSubquery { subquery: q, .. } => {
            if hash_fragment(&q.to_string()) == anchor {
                *q.as_mut() = new_inner.clone();
                true
            } else {
                false
            }
        }
        Expr::BinaryOp { left, right, .. } => {
            replace_subquery_in_expr(left, anchor, new_inner) || replace_subquery_in_expr(right, anchor, new_inner)
        }
        Expr::Nested(inner) | Expr::UnaryOp { expr: inner, .. } => {
            replace_subquery_in_expr(inner, anchor, new_inner)
        }
        _ => false,
    }
}

fn delete_node(query: &mut Query, anchor: AnchorHash) -> Result<(), OptimizerError> {
    if let Some(with) = query.with.as_mut() {
        if let Some(idx) = with.cte_tables.iter().position(|cte| hash_fragment(&cte.to_string()) == anchor) {
            let name = with.cte_tables[idx].alias.name.to_string();
            if hard_stops::forbids_orphan_on_delete(&name, query) {
                return Err(OptimizerError::structural_invalid(format!("cte_still_referenced:{name}")));
            }
            with.cte_tables.remove(idx);
            if with.cte_tables.is_empty() {
                query.with = None;
            }
            return Ok(());
        }
    }

    let select = top_level_select_mut(query)?;

    if let Some(sel) = &select.selection {
        if hash_fragment(&sel.to_string()) == anchor {
            select.selection = None;
            return Ok(());
        }
    }

    if let Some(idx) = select.from.iter().position(|f| hash_fragment(&f.to_string()) == anchor) {
        select.from.remove(idx);
        return Ok(());
    }

    Err(OptimizerError::anchor_missing(anchor))
}

fn parse_expr(fragment: &str) -> Result<Expr, OptimizerError> {
    let wrapped = parse(&format!("SELECT 1 WHERE {fragment}"))?;
    match wrapped {
        Statement::Query(q) => match *q.body {
            SetExpr::Select(s) => {
                s.selection.ok_or_else(|| OptimizerError::structural_invalid("predicate did not parse"))
            }
            _ => Err(OptimizerError::structural_invalid("predicate did not parse")),
        },
        _ => Err(OptimizerError::structural_invalid("predicate did not parse")),
    }
}

// ===========================================================================
// Structural validation
// ===========================================================================

/// Runs the structural validation checklist against the
/// original and candidate ASTs. All five checks must pass or the candidate
/// is rejected `FAIL_TIER1` with the first failing reason.
pub fn validate_structural(original_sql: &str, candidate: &ApplyResult) -> Result<(), StructuralReason> {
    // 1. Parses as a valid statement — `apply` already required this, but a
    // round-trip re-parse catches any serialization the applier produced
    // that the parser itself rejects.
    if let Err(e) = Parser::parse_sql(&GenericDialect {}, &candidate.candidate_sql) {
        return Err(StructuralReason::ReparseFailed(e.to_string()));
    }

    let original_statement = Parser::parse_sql(&GenericDialect {}, original_sql)
        .map_err(|e| StructuralReason::ReparseFailed(e.to_string()))?
        .remove(0);

    // 2. Output column count unchanged.
    let baseline_cols = projection_len(&original_statement);
    let candidate_cols = projection_len(&candidate.statement);
    if baseline_cols != candidate_cols {
        return Err(StructuralReason::ColumnCountChanged { baseline: baseline_cols, candidate: candidate_cols });
    }

    // 3. Literal preservation: every literal in the original must still
    // appear in the candidate (property 2, superset not equality).
    let baseline_literals = collect_literals(&original_statement);
    let candidate_literals = collect_literals(&candidate.statement);
    for lit in &baseline_literals {
        if !candidate_literals.contains(lit) {
            return Err(StructuralReason::LiteralDropped(lit.clone()));
        }
    }

    // 4/5. No orphaned CTEs; every CTE has a WHERE.
    if let Statement::Query(query) = &candidate.statement {
        if let Some(with) = &query.with {
            let body_text = query.body.to_string();
            let mut filtered_cte_names = Vec::new();
            for cte in &with.cte_tables {
                let name = cte.alias.name.to_string();
                if !references_table(&body_text, &name) && !ctes_reference_each_other(with, &name) {
                    return Err(StructuralReason::OrphanedCte(name));
                }
                if !hard_stops::cte_has_where(&cte.query) {
                    return Err(StructuralReason::CteMissingWhere(name));
                }
                filtered_cte_names.push(name);
            }

            // 6. Never cross-join 3+ filtered dimension CTEs in the outer FROM.
            if let SetExpr::Select(select) = query.body.as_ref() {
                let from_text = from_clause_text(select);
                if hard_stops::forbids_cross_join_dimension_ctes(&from_text, &filtered_cte_names) {
                    return Err(StructuralReason::HardStopViolated("cross_join_dimension_ctes".to_string()));
                }
            }
        }
    }

    Ok(())
}

fn projection_len(statement: &Statement) -> usize {
    match statement {
        Statement::Query(q) => match q.body.as_ref() {
            SetExpr::Select(s) => s.projection.len(),
            _ => 0,
        },
        _ => 0,
    }
}

fn collect_literals(statement: &Statement) -> HashSet<String> {
    let mut out = HashSet::new();
    if let Statement::Query(q) = statement {
        collect_literals_query(q, &mut out);
    }
    out
}

fn collect_literals_query(query: &Query, out: &mut HashSet<String>) {
    if let SetExpr::Select(select) = query.body.as_ref() {
        if let Some(expr) = &select.selection {
            collect_literals_expr(expr, out);
        }
        for item in &select.projection {
            out.extend(literal_strings_in_text(&item.to_string()));
        }
    }
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            collect_literals_query(&cte.query, out);
        }
    }
}

fn collect_literals_expr(expr: &Expr, out: &mut HashSet<String>) {
    match expr {
        Expr::Value(v) => {
            out.insert(v.to_string());
        }
        Expr::BinaryOp { left, right, .. } => {
            collect_literals_expr(left, out);
            collect_literals_expr(right, out);
        }
        Expr::Nested(inner) | Expr::UnaryOp { expr: inner, .. } => collect_literals_expr(inner, out),
        other => out.extend(literal_strings_in_text(&other.to_string())),
    }
}

/// Fallback literal scrape over an expression's rendered text: catches
/// numeric/string literals inside constructs (IN lists, function args) the
/// targeted `Expr` match above does not descend into individually.
fn literal_strings_in_text(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_ascii_alphanumeric() && c != '.' && c != '\'' && c != '_')
        .filter(|t| !t.is_empty())
        .filter(|t| t.parse::<f64>().is_ok() || t.starts_with('\''))
        .map(|t| t.to_string())
        .collect()
}

fn references_table(haystack: &str, name: &str) -> bool {
    let lower = haystack.to_ascii_lowercase();
    lower.contains(&name.to_ascii_lowercase())
}

fn ctes_reference_each_other(with: &With, name: &str) -> bool {
    with.cte_tables.iter().any(|cte| references_table(&cte.query.to_string(), name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patchplan::ir::Risk;

    #[test]
    fn rejects_plan_whose_anchor_does_not_exist() {
        let plan = PatchPlan {
            ops: vec![Op::ReplaceWherePredicate {
                anchor: AnchorHash(0xdead_beef),
                new_predicate: "1 = 1".to_string(),
            }],
            transforms: vec![],
            expected_explain_delta: String::new(),
            risk: Risk::Low,
        };
        let result = apply("SELECT a FROM t WHERE x = 1", &plan);
        assert!(matches!(result, Err(OptimizerError::AnchorMissing(_))));
    }

    #[test]
    fn replaces_where_predicate_when_anchor_matches() {
        let anchor = hash_fragment("x = 1");
        let plan = PatchPlan {
            ops: vec![Op::ReplaceWherePredicate { anchor, new_predicate: "x = 2".to_string() }],
            transforms: vec!["test".to_string()],
            expected_explain_delta: String::new(),
            risk: Risk::Low,
        };
        let result = apply("SELECT a FROM t WHERE x = 1", &plan).unwrap();
        assert!(result.candidate_sql.to_ascii_lowercase().contains("x = 2"));
    }

    #[test]
    fn literal_drop_is_caught_by_structural_validation() {
        let original = "SELECT a FROM t WHERE year = 2000";
        let anchor = hash_fragment("year = 2000");
        let plan = PatchPlan {
            ops: vec![Op::ReplaceWherePredicate { anchor, new_predicate: "year = 1999".to_string() }],
            transforms: vec![],
            expected_explain_delta: String::new(),
            risk: Risk::Low,
        };
        let applied = apply(original, &plan).unwrap();
        let verdict = validate_structural(original, &applied);
        assert!(matches!(verdict, Err(StructuralReason::LiteralDropped(_))));
    }

    #[test]
    fn replace_from_on_a_set_operation_errors_instead_of_panicking() {
        let plan = PatchPlan {
            ops: vec![Op::ReplaceFrom { anchor: hash_fragment("t"), new_from_clause: "u".to_string() }],
            transforms: vec![],
            expected_explain_delta: String::new(),
            risk: Risk::Low,
        };
        let result = apply("SELECT a FROM t UNION SELECT a FROM u", &plan);
        assert!(matches!(result, Err(OptimizerError::StructuralInvalid(_))));
    }

    #[test]
    fn insert_cte_rejects_a_body_that_materializes_exists() {
        let plan = PatchPlan {
            ops: vec![Op::InsertCte {
                name: "filtered".to_string(),
                body_sql: "SELECT k FROM big WHERE EXISTS (SELECT 1 FROM other WHERE other.k = big.k)".to_string(),
            }],
            transforms: vec![],
            expected_explain_delta: String::new(),
            risk: Risk::Low,
        };
        let result = apply("SELECT a FROM t WHERE x = 1", &plan);
        assert!(matches!(result, Err(OptimizerError::StructuralInvalid(_))));
    }

    #[test]
    fn cross_joining_three_filtered_dimension_ctes_fails_structural_validation() {
        let original = "SELECT a FROM t WHERE x = 1";
        let candidate_sql = "WITH d1 AS (SELECT k FROM t1 WHERE x = 1), \
             d2 AS (SELECT k FROM t2 WHERE y = 1), \
             d3 AS (SELECT k FROM t3 WHERE z = 1) \
             SELECT a FROM d1, d2, d3"
            .to_string();
        let statement = parse(&candidate_sql).unwrap();
        let applied = ApplyResult { candidate_sql, statement };
        let verdict = validate_structural(original, &applied);
        assert!(matches!(verdict, Err(StructuralReason::HardStopViolated(_))));
    }
}
