//! Hard-stop rules : checks that cause outright rejection of a
//! transform regardless of a pathology match. One source of truth, called
//! both by pathology detection (to suppress a `transform_option` up front)
//! and by the applier/sniper (to reject a `PatchPlan` outright) — the
//! EXISTS-preservation and same-column-OR-preservation invariants require
//! both call sites to agree.

use sqlparser::ast::{Expr, Query, SetExpr};

/// True if `expr` is an `EXISTS`/`NOT EXISTS` (or `IN`/`NOT IN` against a
/// subquery) — never materialize these into a CTE.
pub fn is_exists_or_in_subquery(expr: &Expr) -> bool {
    matches!(expr, Expr::Exists { .. } | Expr::InSubquery { .. })
        || matches!(expr, Expr::UnaryOp { expr: inner, .. } if is_exists_or_in_subquery(inner))
}

/// Text-level fallback for call sites that only have the candidate subquery
/// SQL, not its parsed `Expr` (the applier's `replace_subquery`, which
/// receives raw replacement text): a materialized CTE that itself contains
/// an `EXISTS`/`NOT EXISTS` body is the shape the hard-stop forbids.
pub fn forbids_materialize_exists_text(new_subquery_sql: &str) -> bool {
    let upper = new_subquery_sql.to_ascii_uppercase();
    upper.contains("EXISTS")
}

/// Returns `Some(column_name)` if `expr` is a chain of `col = v1 OR col = v2
/// OR ...` (or an equivalent `col IN (...)`) all against the same column —
/// the shape that must never be split into `or_to_union` branches (the
/// same-column OR preservation invariant).
pub fn same_column_or_chain(expr: &Expr) -> Option<String> {
    let mut columns = Vec::new();
    collect_or_columns(expr, &mut columns);
    if columns.is_empty() {
        return None;
    }
    let first = &columns[0];
    if columns.iter().all(|c| c == first) {
        Some(first.clone())
    } else {
        None
    }
}

fn collect_or_columns(expr: &Expr, out: &mut Vec<String>) {
    match expr {
        Expr::BinaryOp { left, op: sqlparser::ast::BinaryOperator::Or, right } => {
            collect_or_columns(left, out);
            collect_or_columns(right, out);
        }
        Expr::BinaryOp { left, op: sqlparser::ast::BinaryOperator::Eq, right: _ } => {
            if let Expr::Identifier(ident) = left.as_ref() {
                out.push(ident.value.to_ascii_lowercase());
            } else if let Expr::CompoundIdentifier(parts) = left.as_ref() {
                if let Some(last) = parts.last() {
                    out.push(last.value.to_ascii_lowercase());
                }
            }
        }
        Expr::InList { expr, negated: false, .. } => {
            if let Expr::Identifier(ident) = expr.as_ref() {
                out.push(ident.value.to_ascii_lowercase());
            }
        }
        Expr::Nested(inner) => collect_or_columns(inner, out),
        _ => {}
    }
}

/// Applier-facing hard-stop: forbid any op that eliminates a same-column OR
/// chain by introducing a `UNION` in its place.
pub fn forbids_same_column_or_split(original_predicate: Option<&Expr>, replacement_text: &str) -> bool {
    let Some(expr) = original_predicate else { return false };
    same_column_or_chain(expr).is_some() && replacement_text.to_ascii_uppercase().contains("UNION")
}

/// Forbid deleting a CTE whose name is still referenced elsewhere in the
/// query (the orphan rule cuts both ways: never leave an unreferenced CTE
/// behind, and never delete one still in use).
pub fn forbids_orphan_on_delete(name: &str, query: &Query) -> bool {
    let body_text = query.body.to_string().to_ascii_lowercase();
    if body_text.contains(&name.to_ascii_lowercase()) {
        return true;
    }
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            if cte.alias.name.value.eq_ignore_ascii_case(name) {
                continue;
            }
            if cte.query.to_string().to_ascii_lowercase().contains(&name.to_ascii_lowercase()) {
                return true;
            }
        }
    }
    false
}

/// Never cross-join 3+ filtered dimension CTEs : counts CTEs
/// whose body has a `WHERE` and that appear together, unjoined by predicate,
/// in the outer `FROM` list.
pub fn forbids_cross_join_dimension_ctes(select_from_text: &str, filtered_cte_names: &[String]) -> bool {
    let lower = select_from_text.to_ascii_lowercase();
    let present = filtered_cte_names.iter().filter(|n| lower.contains(&n.to_ascii_lowercase())).count();
    present >= 3 && !lower.contains("on ") && !lower.contains("where")
}

/// Every produced CTE must have a `WHERE`; used both as a
/// hard-stop on CTE-producing transforms and as structural-validation check
/// 5 in the applier.
pub fn cte_has_where(query: &Query) -> bool {
    match query.body.as_ref() {
        SetExpr::Select(select) => select.selection.is_some(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::GenericDialect;
    use sqlparser::parser::Parser;

    fn parse_select(sql: &str) -> SelectionFixture {
        let dialect = GenericDialect {};
        let mut statements = Parser::parse_sql(&dialect, sql).expect("parses");
        match statements.remove(0) {
            sqlparser::ast::Statement::Query(q) => match *q.body {
                SetExpr::Select(s) => SelectionFixture { selection: s.selection },
                _ => panic!("expected a plain SELECT"),
            },
            _ => panic!("expected a query"),
        }
    }

    struct SelectionFixture {
        selection: Option<Expr>,
    }

    #[test]
    fn same_column_or_chain_detects_single_column() {
        let fixture = parse_select("SELECT 1 FROM t WHERE col = 1 OR col = 2 OR col = 3");
        let column = same_column_or_chain(fixture.selection.as_ref().unwrap());
        assert_eq!(column.as_deref(), Some("col"));
    }

    /// S3: `WHERE col IN (1,2,...,9)` is all-one-column, so `or_to_union`
    /// must never be offered for it.
    #[test]
    fn same_column_or_chain_detects_in_list() {
        let fixture = parse_select("SELECT 1 FROM t WHERE col IN (1,2,3,4,5,6,7,8,9)");
        let column = same_column_or_chain(fixture.selection.as_ref().unwrap());
        assert_eq!(column.as_deref(), Some("col"));
    }

    #[test]
    fn or_chain_across_different_columns_is_not_flagged() {
        let fixture = parse_select("SELECT 1 FROM t WHERE zip = '1' OR state = 'x' OR price > 100");
        assert!(same_column_or_chain(fixture.selection.as_ref().unwrap()).is_none());
    }

    /// S3: the hard-stop forbids an `or_to_union` rewrite on a same-column
    /// chain even when the replacement text is a well-formed UNION.
    #[test]
    fn forbids_same_column_or_split_blocks_union_rewrite() {
        let fixture = parse_select("SELECT 1 FROM t WHERE col IN (1,2,3,4,5,6,7,8,9)");
        let replacement = "(SELECT 1 FROM t WHERE col = 1) UNION ALL (SELECT 1 FROM t WHERE col = 2)";
        assert!(forbids_same_column_or_split(fixture.selection.as_ref(), replacement));
    }

    #[test]
    fn allows_union_rewrite_on_distinct_columns() {
        let fixture = parse_select("SELECT 1 FROM t WHERE zip = '1' OR state = 'x'");
        let replacement = "(SELECT 1 FROM t WHERE zip = '1') UNION ALL (SELECT 1 FROM t WHERE state = 'x')";
        assert!(!forbids_same_column_or_split(fixture.selection.as_ref(), replacement));
    }

    /// S4: never materialize a subquery body containing EXISTS into a CTE.
    #[test]
    fn forbids_materialize_exists_text_flags_exists_body() {
        let candidate_cte_body = "SELECT k FROM big WHERE EXISTS (SELECT 1 FROM other WHERE other.k = big.k)";
        assert!(forbids_materialize_exists_text(candidate_cte_body));
    }

    #[test]
    fn allows_materialize_of_plain_body() {
        let candidate_cte_body = "SELECT k FROM big WHERE big.k > 10";
        assert!(!forbids_materialize_exists_text(candidate_cte_body));
    }
}
