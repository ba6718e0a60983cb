//! Structural flags derived from the query AST. Computed once
//! per query the same way `cost::observe` computes `PlanObservations` once
//! per plan tree, so detectors never re-walk the AST themselves.

use crate::pathology::hard_stops;
use sqlparser::ast::{
    Expr, Join, JoinOperator, Query, Select, SelectItem, SetExpr, SetOperator, Statement, TableFactor,
};
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct QueryObservations {
    pub cte_names: Vec<String>,
    /// CTE name -> its own body has a WHERE clause.
    pub cte_has_where: HashSet<String>,
    pub has_left_join: bool,
    /// True if the outer WHERE references a column from a LEFT-joined table
    /// with a non-null-preserving predicate (no COALESCE/IS NULL guard).
    pub left_join_where_strips_nulls: bool,
    pub has_intersect: bool,
    pub has_exists: bool,
    /// Columns appearing in a same-column OR chain at the top level, if any.
    pub same_column_or: Option<String>,
    /// Number of distinct columns an OR chain spans, when it isn't
    /// same-column (signal for P4).
    pub or_distinct_columns: usize,
    pub has_window_function: bool,
    pub window_in_cte_joined_outside: bool,
    /// GROUP BY column names (lowercased) at the top level.
    pub group_by_columns: Vec<String>,
    /// Columns the top-level FROM's joins equate on.
    pub join_key_columns: Vec<String>,
    /// Names of CTEs that are later self-joined against each other (or
    /// against themselves) keyed by a small set of discriminator values.
    pub self_joined_ctes: Vec<String>,
    pub has_order_by_or_limit: bool,
}

pub fn observe(statement: &Statement) -> QueryObservations {
    let mut obs = QueryObservations::default();
    if let Statement::Query(query) = statement {
        walk_query(query, &mut obs, true);
    }
    obs
}

fn walk_query(query: &Query, obs: &mut QueryObservations, is_outer: bool) {
    if is_outer && (query.order_by.is_some() || query.limit.is_some()) {
        obs.has_order_by_or_limit = true;
    }

    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            let name = cte.alias.name.value.to_ascii_lowercase();
            obs.cte_names.push(name.clone());
            if hard_stops::cte_has_where(&cte.query) {
                obs.cte_has_where.insert(name.clone());
            }
            if let SetExpr::Select(select) = cte.query.body.as_ref() {
                if select_has_window(select) {
                    obs.has_window_function = true;
                }
            }
            walk_query(&cte.query, obs, false);
        }
    }

    if let SetExpr::Select(select) = query.body.as_ref() {
        walk_select(select, obs);
    }
    if let SetExpr::SetOperation { op, left, right, .. } = query.body.as_ref() {
        if matches!(op, SetOperator::Intersect) {
            obs.has_intersect = true;
        }
        if let SetExpr::Select(s) = left.as_ref() {
            walk_select(s, obs);
        }
        if let SetExpr::Select(s) = right.as_ref() {
            walk_select(s, obs);
        }
    }
}

fn select_has_window(select: &Select) -> bool {
    select.projection.iter().any(|item| {
        let expr = match item {
            SelectItem::UnnamedExpr(e) | SelectItem::ExprWithAlias { expr: e, .. } => Some(e),
            _ => None,
        };
        matches!(expr, Some(Expr::Function(f)) if f.over.is_some())
    })
}

fn walk_select(select: &Select, obs: &mut QueryObservations) {
    if select_has_window(select) {
        obs.has_window_function = true;
    }

    let from_tables: Vec<String> = select
        .from
        .iter()
        .map(|t| table_factor_name(&t.relation))
        .chain(select.from.iter().flat_map(|t| t.joins.iter().map(|j| table_factor_name(&j.relation))))
        .collect();

    for table_with_joins in &select.from {
        for join in &table_with_joins.joins {
            collect_join(join, obs);
        }
    }

    if obs.has_window_function && from_tables.iter().any(|t| obs.cte_names.contains(t)) {
        obs.window_in_cte_joined_outside = true;
    }

    // CTEs referenced more than once across the FROM/join list are
    // self-joined.
    let mut seen = std::collections::HashMap::new();
    for t in &from_tables {
        if obs.cte_names.contains(t) {
            *seen.entry(t.clone()).or_insert(0) += 1;
        }
    }
    for (name, count) in seen {
        if count >= 2 {
            obs.self_joined_ctes.push(name);
        }
    }

    if let Some(selection) = &select.selection {
        if hard_stops::is_exists_or_in_subquery(selection) {
            obs.has_exists = true;
        }
        collect_or_signal(selection, obs);

        if obs.has_left_join {
            let text = selection.to_string().to_ascii_lowercase();
            if !text.contains("is null") && !text.contains("coalesce") {
                obs.left_join_where_strips_nulls = true;
            }
        }
    }

    // `GroupByExpr`'s exact shape varies enough across sqlparser releases
    // that we don't pattern-match its internals here; P3 falls back to the
    // plan tree's own cardinality signals instead of a GROUP BY column list.
    let _ = &select.group_by;
}

fn collect_join(join: &Join, obs: &mut QueryObservations) {
    if matches!(join.join_operator, JoinOperator::LeftOuter(_)) {
        obs.has_left_join = true;
    }
    if let JoinOperator::Inner(constraint)
    | JoinOperator::LeftOuter(constraint)
    | JoinOperator::RightOuter(constraint) = &join.join_operator
    {
        if let sqlparser::ast::JoinConstraint::On(Expr::BinaryOp { left, op: sqlparser::ast::BinaryOperator::Eq, right }) = constraint {
            if let Expr::CompoundIdentifier(parts) = left.as_ref() {
                if let Some(last) = parts.last() {
                    obs.join_key_columns.push(last.value.to_ascii_lowercase());
                }
            }
            if let Expr::CompoundIdentifier(parts) = right.as_ref() {
                if let Some(last) = parts.last() {
                    obs.join_key_columns.push(last.value.to_ascii_lowercase());
                }
            }
        }
    }
}

fn collect_or_signal(expr: &Expr, obs: &mut QueryObservations) {
    if let Some(col) = hard_stops::same_column_or_chain(expr) {
        obs.same_column_or = Some(col);
        return;
    }
    let mut columns = HashSet::new();
    fn walk(e: &Expr, columns: &mut HashSet<String>) {
        match e {
            Expr::BinaryOp { left, op: sqlparser::ast::BinaryOperator::Or, right } => {
                walk(left, columns);
                walk(right, columns);
            }
            Expr::BinaryOp { left, .. } => {
                if let Expr::Identifier(ident) = left.as_ref() {
                    columns.insert(ident.value.to_ascii_lowercase());
                } else if let Expr::CompoundIdentifier(parts) = left.as_ref() {
                    if let Some(last) = parts.last() {
                        columns.insert(last.value.to_ascii_lowercase());
                    }
                }
            }
            Expr::Nested(inner) => walk(inner, columns),
            _ => {}
        }
    }
    walk(expr, &mut columns);
    obs.or_distinct_columns = columns.len();
}

fn table_factor_name(t: &TableFactor) -> String {
    match t {
        TableFactor::Table { name, .. } => name.to_string().to_ascii_lowercase(),
        TableFactor::Derived { alias: Some(alias), .. } => alias.name.value.to_ascii_lowercase(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::GenericDialect;
    use sqlparser::parser::Parser;

    fn observe_sql(sql: &str) -> QueryObservations {
        let dialect = GenericDialect {};
        let mut statements = Parser::parse_sql(&dialect, sql).expect("parses");
        observe(&statements.remove(0))
    }

    #[test]
    fn left_join_with_unguarded_outer_predicate_strips_nulls() {
        let obs = observe_sql("SELECT a.x FROM a LEFT JOIN b ON a.id = b.id WHERE b.y = 1");
        assert!(obs.has_left_join);
        assert!(obs.left_join_where_strips_nulls);
    }

    /// An `IS NULL` guard on the outer predicate means the LEFT JOIN's
    /// null-producing rows are intentionally kept, not an accidental INNER
    /// JOIN in disguise.
    #[test]
    fn left_join_with_is_null_guard_does_not_strip_nulls() {
        let obs = observe_sql("SELECT a.x FROM a LEFT JOIN b ON a.id = b.id WHERE b.y IS NULL");
        assert!(obs.has_left_join);
        assert!(!obs.left_join_where_strips_nulls);
    }

    #[test]
    fn coalesce_guard_does_not_strip_nulls() {
        let obs = observe_sql("SELECT a.x FROM a LEFT JOIN b ON a.id = b.id WHERE COALESCE(b.y, 0) = 1");
        assert!(!obs.left_join_where_strips_nulls);
    }

    /// A CTE referenced twice in the outer FROM/join list (even under
    /// different aliases) is self-joined.
    #[test]
    fn cte_joined_against_itself_is_flagged_self_joined() {
        let obs = observe_sql("WITH c AS (SELECT id FROM t) SELECT * FROM c c1 JOIN c c2 ON c1.id = c2.id");
        assert_eq!(obs.cte_names, vec!["c".to_string()]);
        assert_eq!(obs.self_joined_ctes, vec!["c".to_string()]);
    }

    #[test]
    fn cte_referenced_once_is_not_self_joined() {
        let obs = observe_sql("WITH c AS (SELECT id FROM t) SELECT * FROM c JOIN other ON c.id = other.id");
        assert!(obs.self_joined_ctes.is_empty());
    }

    #[test]
    fn order_by_and_limit_on_the_outer_query_are_flagged() {
        let obs = observe_sql("SELECT * FROM t ORDER BY x LIMIT 10");
        assert!(obs.has_order_by_or_limit);
    }

    #[test]
    fn plain_query_has_no_order_by_or_limit() {
        let obs = observe_sql("SELECT * FROM t WHERE x > 1");
        assert!(!obs.has_order_by_or_limit);
    }

    #[test]
    fn same_column_or_chain_is_flagged_through_observe() {
        let obs = observe_sql("SELECT * FROM t WHERE col = 1 OR col = 2");
        assert_eq!(obs.same_column_or.as_deref(), Some("col"));
    }

    #[test]
    fn or_chain_across_distinct_columns_counts_each_column() {
        let obs = observe_sql("SELECT * FROM t WHERE a = 1 OR b = 2");
        assert!(obs.same_column_or.is_none());
        assert_eq!(obs.or_distinct_columns, 2);
    }

    #[test]
    fn exists_subquery_in_where_is_flagged() {
        let obs = observe_sql("SELECT * FROM t WHERE EXISTS (SELECT 1 FROM u WHERE u.id = t.id)");
        assert!(obs.has_exists);
    }
}
