//! Statement parsing, catalog validation and conversion to a logical plan
//!
//! Conversion is a straight translation: FROM items fold into a left-deep join
//! tree (comma-separated items become condition-less cross joins), WHERE
//! becomes a single filter above it, then aggregate, projection, sort and
//! limit. The optimizer does every rewrite.

use std::collections::{BTreeMap, BTreeSet};

use sqlparser::ast::{
    BinaryOperator, Expr, FunctionArg, FunctionArgExpr, FunctionArguments, GroupByExpr, Join,
    JoinConstraint, JoinOperator, ObjectName, ObjectNamePart, Query, Select, SelectItem, SetExpr,
    Statement, TableFactor, TableWithJoins,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use super::catalog::SchemaCatalog;
use super::error::PlanError;
use super::plan::{Conjunct, JoinKind, LogicalPlan};

/// Parse exactly one SQL statement
pub fn parse(sql: &str) -> Result<Statement, PlanError> {
    if sql.trim().is_empty() {
        return Err(PlanError::Parse("empty statement".to_string()));
    }

    let mut statements = Parser::parse_sql(&GenericDialect {}, sql)?;
    match statements.len() {
        0 => Err(PlanError::Parse("empty statement".to_string())),
        1 => Ok(statements.remove(0)),
        n => Err(PlanError::Conversion(format!(
            "expected exactly one statement, found {}",
            n
        ))),
    }
}

/// Validate `statement` against `catalog` and build its logical plan
pub fn validate_and_convert(
    statement: &Statement,
    catalog: &SchemaCatalog,
) -> Result<LogicalPlan, PlanError> {
    match statement {
        Statement::Query(query) => {
            let converter = Converter { catalog };
            converter.query(query, None)
        }
        other => Err(PlanError::Conversion(format!(
            "unsupported statement {}",
            statement_keyword(other)
        ))),
    }
}

fn statement_keyword(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_uppercase()
}

/// A relation visible to column references
#[derive(Debug, Clone)]
struct Relation {
    binding: String,
    /// `None` when the relation's columns are unknown
    columns: Option<Vec<String>>,
}

impl Relation {
    fn has_column(&self, column: &str) -> Option<bool> {
        self.columns
            .as_ref()
            .map(|columns| columns.iter().any(|c| c == column))
    }
}

#[derive(Default)]
struct Scope<'a> {
    parent: Option<&'a Scope<'a>>,
    relations: Vec<Relation>,
    ctes: BTreeMap<String, LogicalPlan>,
}

enum Resolution {
    /// Bound to a relation of this SELECT
    Local(String),
    /// Correlated reference into an enclosing SELECT
    Outer,
    Unresolved,
}

impl<'a> Scope<'a> {
    fn child(parent: &'a Scope<'a>) -> Self {
        Self {
            parent: Some(parent),
            relations: Vec::new(),
            ctes: BTreeMap::new(),
        }
    }

    fn cte(&self, name: &str) -> Option<&LogicalPlan> {
        self.ctes
            .get(name)
            .or_else(|| self.parent.and_then(|p| p.cte(name)))
    }

    fn resolve(
        &self,
        qualifier: Option<&str>,
        column: &str,
        strict: bool,
    ) -> Result<Resolution, PlanError> {
        match qualifier {
            Some(q) => self.resolve_qualified(q, column, strict),
            None => self.resolve_unqualified(column, strict),
        }
    }

    fn resolve_qualified(
        &self,
        qualifier: &str,
        column: &str,
        strict: bool,
    ) -> Result<Resolution, PlanError> {
        if let Some(relation) = self.relations.iter().find(|r| r.binding == qualifier) {
            if strict && relation.has_column(column) == Some(false) {
                return Err(PlanError::Validation(format!(
                    "unknown column {}.{}",
                    qualifier, column
                )));
            }
            return Ok(Resolution::Local(relation.binding.clone()));
        }

        if let Some(parent) = self.parent {
            return match parent.resolve_qualified(qualifier, column, strict)? {
                Resolution::Unresolved => Ok(Resolution::Unresolved),
                _ => Ok(Resolution::Outer),
            };
        }

        if strict {
            return Err(PlanError::Validation(format!(
                "unknown table or alias {}",
                qualifier
            )));
        }
        Ok(Resolution::Unresolved)
    }

    fn resolve_unqualified(&self, column: &str, strict: bool) -> Result<Resolution, PlanError> {
        let known: Vec<&Relation> = self
            .relations
            .iter()
            .filter(|r| r.has_column(column) == Some(true))
            .collect();
        let has_unknown = self.relations.iter().any(|r| r.columns.is_none());

        match known.as_slice() {
            [only] if !has_unknown => return Ok(Resolution::Local(only.binding.clone())),
            [_, _, ..] if strict => {
                return Err(PlanError::Validation(format!(
                    "ambiguous column {}",
                    column
                )));
            }
            [_, ..] => return Ok(Resolution::Unresolved),
            [] => {}
        }

        if has_unknown {
            if let [only] = self.relations.as_slice() {
                return Ok(Resolution::Local(only.binding.clone()));
            }
            return Ok(Resolution::Unresolved);
        }

        if let Some(parent) = self.parent {
            if let Resolution::Local(_) | Resolution::Outer =
                parent.resolve_unqualified(column, false)?
            {
                return Ok(Resolution::Outer);
            }
        }

        if strict {
            return Err(PlanError::Validation(format!("unknown column {}", column)));
        }
        Ok(Resolution::Unresolved)
    }
}

struct Converter<'c> {
    catalog: &'c SchemaCatalog,
}

impl Converter<'_> {
    fn strict(&self) -> bool {
        self.catalog.is_strict()
    }

    fn query(&self, query: &Query, parent: Option<&Scope<'_>>) -> Result<LogicalPlan, PlanError> {
        let mut scope = match parent {
            Some(parent) => Scope::child(parent),
            None => Scope::default(),
        };

        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                let plan = self.query(&cte.query, Some(&scope))?;
                scope
                    .ctes
                    .insert(cte.alias.name.value.to_lowercase(), plan);
            }
        }

        let mut plan = self.set_expr(&query.body, &scope)?;

        if let Some(order_by) = &query.order_by {
            let keys = order_by.to_string();
            let keys = keys.strip_prefix("ORDER BY ").unwrap_or(&keys).to_string();
            plan = LogicalPlan::Sort {
                keys,
                input: Box::new(plan),
            };
        }

        if let Some(limit) = &query.limit_clause {
            plan = LogicalPlan::Limit {
                clause: limit.to_string().trim().to_string(),
                input: Box::new(plan),
            };
        }

        Ok(plan)
    }

    fn set_expr(&self, body: &SetExpr, scope: &Scope<'_>) -> Result<LogicalPlan, PlanError> {
        match body {
            SetExpr::Select(select) => self.select(select, scope),
            SetExpr::Query(query) => self.query(query, Some(scope)),
            SetExpr::SetOperation {
                op,
                set_quantifier,
                left,
                right,
            } => {
                let quantifier = set_quantifier.to_string();
                let op = if quantifier.is_empty() {
                    op.to_string()
                } else {
                    format!("{} {}", op, quantifier)
                };
                Ok(LogicalPlan::SetOp {
                    op,
                    left: Box::new(self.set_expr(left, scope)?),
                    right: Box::new(self.set_expr(right, scope)?),
                })
            }
            SetExpr::Values(values) => Ok(LogicalPlan::Values {
                rows: values.rows.len(),
            }),
            other => Err(PlanError::Conversion(format!(
                "unsupported query body: {}",
                other
            ))),
        }
    }

    fn select(&self, select: &Select, parent: &Scope<'_>) -> Result<LogicalPlan, PlanError> {
        let mut scope = Scope::child(parent);

        let mut plan: Option<LogicalPlan> = None;
        for item in &select.from {
            let next = self.table_with_joins(item, &mut scope)?;
            plan = Some(match plan {
                None => next,
                Some(left) => LogicalPlan::Join {
                    kind: JoinKind::Cross,
                    condition: None,
                    left: Box::new(left),
                    right: Box::new(next),
                },
            });
        }
        let mut plan = plan.unwrap_or(LogicalPlan::Values { rows: 1 });

        if let Some(selection) = &select.selection {
            let predicate = self.conjuncts(selection, &scope, true)?;
            plan = LogicalPlan::Filter {
                predicate,
                input: Box::new(plan),
            };
        }

        let group_by = match &select.group_by {
            GroupByExpr::All(_) => Some(vec!["ALL".to_string()]),
            GroupByExpr::Expressions(exprs, _) if !exprs.is_empty() => {
                Some(exprs.iter().map(|e| e.to_string()).collect())
            }
            GroupByExpr::Expressions(..) => None,
        };
        if group_by.is_some() || select.having.is_some() {
            plan = LogicalPlan::Aggregate {
                group_by: group_by.unwrap_or_default(),
                input: Box::new(plan),
            };
        }
        if let Some(having) = &select.having {
            let predicate = self.conjuncts(having, &scope, false)?;
            plan = LogicalPlan::Filter {
                predicate,
                input: Box::new(plan),
            };
        }

        let mut items = Vec::with_capacity(select.projection.len());
        let mut wildcard = false;
        let mut subqueries = Vec::new();
        for item in &select.projection {
            match item {
                SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => {
                    let analysis = self.analyze(expr, &scope, true)?;
                    subqueries.extend(analysis.subqueries);
                }
                SelectItem::QualifiedWildcard(_, _) | SelectItem::Wildcard(_) => wildcard = true,
            }
            items.push(item.to_string());
        }

        Ok(LogicalPlan::Project {
            items,
            wildcard,
            subqueries,
            input: Box::new(plan),
        })
    }

    fn table_with_joins(
        &self,
        item: &TableWithJoins,
        scope: &mut Scope<'_>,
    ) -> Result<LogicalPlan, PlanError> {
        let mut plan = self.table_factor(&item.relation, scope)?;
        for join in &item.joins {
            plan = self.join(plan, join, scope)?;
        }
        Ok(plan)
    }

    fn join(
        &self,
        left: LogicalPlan,
        join: &Join,
        scope: &mut Scope<'_>,
    ) -> Result<LogicalPlan, PlanError> {
        let right = self.table_factor(&join.relation, scope)?;

        let (kind, constraint) = match &join.join_operator {
            JoinOperator::Join(c) | JoinOperator::Inner(c) => (JoinKind::Inner, Some(c)),
            JoinOperator::Left(c) | JoinOperator::LeftOuter(c) => (JoinKind::Left, Some(c)),
            JoinOperator::Right(c) | JoinOperator::RightOuter(c) => (JoinKind::Right, Some(c)),
            JoinOperator::FullOuter(c) => (JoinKind::Full, Some(c)),
            JoinOperator::CrossJoin => (JoinKind::Cross, None),
            _ => (JoinKind::Other, None),
        };

        let condition = match constraint {
            Some(JoinConstraint::On(expr)) => {
                // Validates the column references, the text is what the plan keeps
                self.analyze(expr, scope, true)?;
                Some(expr.to_string())
            }
            Some(JoinConstraint::Using(columns)) => Some(format!(
                "USING ({})",
                columns
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
            Some(JoinConstraint::Natural) => Some("NATURAL".to_string()),
            Some(JoinConstraint::None) | None => None,
        };

        let kind = match (kind, &condition) {
            (JoinKind::Cross, Some(_)) => JoinKind::Inner,
            (kind, _) => kind,
        };

        Ok(LogicalPlan::Join {
            kind,
            condition,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn table_factor(
        &self,
        factor: &TableFactor,
        scope: &mut Scope<'_>,
    ) -> Result<LogicalPlan, PlanError> {
        match factor {
            TableFactor::Table { name, alias, .. } => {
                let table = table_name(name);
                let binding = alias
                    .as_ref()
                    .map(|a| a.name.value.to_lowercase())
                    .unwrap_or_else(|| table.clone());

                if let Some(cte) = scope.cte(&table) {
                    let input = Box::new(cte.clone());
                    scope.relations.push(Relation {
                        binding: binding.clone(),
                        columns: None,
                    });
                    return Ok(LogicalPlan::SubqueryAlias {
                        alias: binding,
                        input,
                    });
                }

                let (columns, indexes) = match self.catalog.table(&table) {
                    Some(def) => (
                        (!def.columns.is_empty()).then(|| def.columns.clone()),
                        def.indexes.clone(),
                    ),
                    None if self.strict() => {
                        return Err(PlanError::Validation(format!("unknown table {}", table)));
                    }
                    None => (None, Vec::new()),
                };

                scope.relations.push(Relation {
                    binding: binding.clone(),
                    columns,
                });
                Ok(LogicalPlan::TableScan {
                    table,
                    binding,
                    indexes,
                })
            }
            TableFactor::Derived {
                subquery, alias, ..
            } => {
                let input = self.query(subquery, Some(&*scope))?;
                let binding = alias
                    .as_ref()
                    .map(|a| a.name.value.to_lowercase())
                    .unwrap_or_else(|| "subquery".to_string());
                scope.relations.push(Relation {
                    binding: binding.clone(),
                    columns: None,
                });
                Ok(LogicalPlan::SubqueryAlias {
                    alias: binding,
                    input: Box::new(input),
                })
            }
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.table_with_joins(table_with_joins, scope),
            other => Err(PlanError::Conversion(format!(
                "unsupported relation: {}",
                other
            ))),
        }
    }

    fn conjuncts(
        &self,
        expr: &Expr,
        scope: &Scope<'_>,
        validate: bool,
    ) -> Result<Vec<Conjunct>, PlanError> {
        let mut terms = Vec::new();
        split_conjunction(expr, &mut terms);

        terms
            .into_iter()
            .map(|term| {
                let analysis = self.analyze(term, scope, validate)?;
                Ok(Conjunct {
                    text: term.to_string(),
                    bindings: analysis.bindings,
                    resolved: analysis.resolved,
                    equality: analysis.equality,
                    subqueries: analysis.subqueries,
                })
            })
            .collect()
    }

    fn analyze(
        &self,
        expr: &Expr,
        scope: &Scope<'_>,
        validate: bool,
    ) -> Result<Analysis, PlanError> {
        let mut analysis = Analysis {
            resolved: true,
            ..Default::default()
        };
        self.walk(expr, scope, validate && self.strict(), &mut analysis)?;

        if let Some((qualifier, column)) = equality_column(expr) {
            if let Resolution::Local(binding) = scope.resolve(qualifier.as_deref(), &column, false)? {
                analysis.equality = Some((binding, column));
            }
        }
        Ok(analysis)
    }

    fn walk(
        &self,
        expr: &Expr,
        scope: &Scope<'_>,
        strict: bool,
        out: &mut Analysis,
    ) -> Result<(), PlanError> {
        if let Some((qualifier, column)) = column_ref(expr) {
            match scope.resolve(qualifier.as_deref(), &column, strict)? {
                Resolution::Local(binding) => {
                    out.bindings.insert(binding);
                }
                Resolution::Outer | Resolution::Unresolved => out.resolved = false,
            }
            return Ok(());
        }

        match expr {
            Expr::BinaryOp { left, right, .. } => {
                self.walk(left, scope, strict, out)?;
                self.walk(right, scope, strict, out)?;
            }
            Expr::UnaryOp { expr, .. }
            | Expr::Nested(expr)
            | Expr::Cast { expr, .. }
            | Expr::IsNull(expr)
            | Expr::IsNotNull(expr)
            | Expr::IsTrue(expr)
            | Expr::IsNotTrue(expr)
            | Expr::IsFalse(expr)
            | Expr::IsNotFalse(expr) => self.walk(expr, scope, strict, out)?,
            Expr::Between {
                expr, low, high, ..
            } => {
                self.walk(expr, scope, strict, out)?;
                self.walk(low, scope, strict, out)?;
                self.walk(high, scope, strict, out)?;
            }
            Expr::InList { expr, list, .. } => {
                self.walk(expr, scope, strict, out)?;
                for item in list {
                    self.walk(item, scope, strict, out)?;
                }
            }
            Expr::Like { expr, pattern, .. } | Expr::ILike { expr, pattern, .. } => {
                self.walk(expr, scope, strict, out)?;
                self.walk(pattern, scope, strict, out)?;
            }
            Expr::InSubquery { expr, subquery, .. } => {
                self.walk(expr, scope, strict, out)?;
                out.subqueries.push(self.query(subquery, Some(scope))?);
            }
            Expr::Exists { subquery, .. } | Expr::Subquery(subquery) => {
                out.subqueries.push(self.query(subquery, Some(scope))?);
            }
            Expr::Case {
                operand,
                conditions,
                else_result,
                ..
            } => {
                if let Some(operand) = operand.as_ref() {
                    self.walk(operand, scope, strict, out)?;
                }
                for when in conditions {
                    self.walk(&when.condition, scope, strict, out)?;
                    self.walk(&when.result, scope, strict, out)?;
                }
                if let Some(else_result) = else_result.as_ref() {
                    self.walk(else_result, scope, strict, out)?;
                }
            }
            Expr::Tuple(items) => {
                for item in items {
                    self.walk(item, scope, strict, out)?;
                }
            }
            Expr::Function(func) => match &func.args {
                FunctionArguments::List(list) => {
                    for arg in &list.args {
                        let arg = match arg {
                            FunctionArg::Unnamed(arg)
                            | FunctionArg::Named { arg, .. }
                            | FunctionArg::ExprNamed { arg, .. } => arg,
                        };
                        if let FunctionArgExpr::Expr(expr) = arg {
                            self.walk(expr, scope, strict, out)?;
                        }
                    }
                }
                FunctionArguments::Subquery(query) => {
                    out.subqueries.push(self.query(query, Some(scope))?);
                }
                FunctionArguments::None => {}
            },
            _ => {}
        }
        Ok(())
    }
}

#[derive(Default)]
struct Analysis {
    bindings: BTreeSet<String>,
    resolved: bool,
    equality: Option<(String, String)>,
    subqueries: Vec<LogicalPlan>,
}

fn split_conjunction<'e>(expr: &'e Expr, out: &mut Vec<&'e Expr>) {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            split_conjunction(left, out);
            split_conjunction(right, out);
        }
        Expr::Nested(inner)
            if matches!(
                inner.as_ref(),
                Expr::BinaryOp {
                    op: BinaryOperator::And,
                    ..
                }
            ) =>
        {
            split_conjunction(inner, out)
        }
        _ => out.push(expr),
    }
}

/// `(qualifier, column)` of a column reference, lowercased
fn column_ref(expr: &Expr) -> Option<(Option<String>, String)> {
    match expr {
        Expr::Identifier(ident) => Some((None, ident.value.to_lowercase())),
        Expr::CompoundIdentifier(idents) if idents.len() >= 2 => Some((
            Some(idents[idents.len() - 2].value.to_lowercase()),
            idents.last()?.value.to_lowercase(),
        )),
        _ => None,
    }
}

/// Column side of `column = literal` or `literal = column`
fn equality_column(expr: &Expr) -> Option<(Option<String>, String)> {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        } => match (left.as_ref(), right.as_ref()) {
            (column, Expr::Value(_)) | (Expr::Value(_), column) => column_ref(column),
            _ => None,
        },
        Expr::Nested(inner) => equality_column(inner),
        _ => None,
    }
}

/// Last name segment, unquoted and lowercased
fn table_name(name: &ObjectName) -> String {
    name.0
        .last()
        .and_then(ObjectNamePart::as_ident)
        .map(|ident| ident.value.to_lowercase())
        .unwrap_or_else(|| name.to_string().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::planner::catalog::CatalogMode;
    use crate::domain::planner::catalog::test_support::tpcds;

    fn convert(sql: &str, mode: CatalogMode) -> Result<LogicalPlan, PlanError> {
        validate_and_convert(&parse(sql)?, &tpcds(mode))
    }

    #[test]
    fn test_plan_select_scan() {
        let plan = convert("select d_date_id from date_dim", CatalogMode::Strict).unwrap();
        assert_eq!(
            plan.explain(),
            "Project(columns=[d_date_id])\n  TableScan(table=[date_dim])\n"
        );
    }

    #[test]
    fn test_plan_select_filter_scan() {
        let plan = convert(
            "select d_date_id from date_dim where d_year=2018",
            CatalogMode::Strict,
        )
        .unwrap();
        assert_eq!(
            plan.explain(),
            "Project(columns=[d_date_id])\n  Filter(condition=[d_year = 2018])\n    TableScan(table=[date_dim])\n"
        );
    }

    #[test]
    fn test_comma_join_is_cross() {
        let plan = convert(
            "select i.i_color from item i, store_sales ss where i.i_item_sk = ss.ss_item_sk",
            CatalogMode::Strict,
        )
        .unwrap();
        assert_eq!(
            plan.explain(),
            "Project(columns=[i.i_color])\n  Filter(condition=[i.i_item_sk = ss.ss_item_sk])\n    Join(kind=[cross])\n      TableScan(table=[item], alias=[i])\n      TableScan(table=[store_sales], alias=[ss])\n"
        );
    }

    #[test]
    fn test_explicit_cross_join() {
        let plan = convert(
            "select i_color from item cross join store",
            CatalogMode::Strict,
        )
        .unwrap();
        assert_eq!(
            plan.explain(),
            "Project(columns=[i_color])\n  Join(kind=[cross])\n    TableScan(table=[item])\n    TableScan(table=[store])\n"
        );
    }

    #[test]
    fn test_equality_resolved_to_binding() {
        let plan = convert(
            "select i_color from item where 'abc' = i_item_id and i_color like 'r%'",
            CatalogMode::Strict,
        )
        .unwrap();
        let LogicalPlan::Project { input, .. } = plan else {
            panic!("expected project");
        };
        let LogicalPlan::Filter { predicate, .. } = *input else {
            panic!("expected filter");
        };
        assert_eq!(predicate.len(), 2);
        assert_eq!(
            predicate[0].equality,
            Some(("item".to_string(), "i_item_id".to_string()))
        );
        assert!(predicate[1].equality.is_none());
        assert!(predicate.iter().all(|c| c.resolved));
    }

    #[test]
    fn test_strict_rejects_unknown_table_and_column() {
        assert!(matches!(
            convert("select a from nope", CatalogMode::Strict),
            Err(PlanError::Validation(_))
        ));
        assert!(matches!(
            convert("select i_nope from item", CatalogMode::Strict),
            Err(PlanError::Validation(_))
        ));
        assert!(matches!(
            convert("select x.i_color from item i", CatalogMode::Strict),
            Err(PlanError::Validation(_))
        ));
    }

    #[test]
    fn test_lenient_accepts_unknown_table() {
        let plan = convert("select a from nope where b = 1", CatalogMode::Lenient).unwrap();
        assert_eq!(
            plan.explain(),
            "Project(columns=[a])\n  Filter(condition=[b = 1])\n    TableScan(table=[nope])\n"
        );
    }

    #[test]
    fn test_correlated_subquery_is_planned() {
        let plan = convert(
            "select c_first_name from customer c where exists (select 1 from store_sales ss where ss.ss_customer_sk = c.c_customer_sk)",
            CatalogMode::Strict,
        )
        .unwrap();
        let LogicalPlan::Project { input, .. } = plan else {
            panic!("expected project");
        };
        let LogicalPlan::Filter { predicate, .. } = *input else {
            panic!("expected filter");
        };
        assert_eq!(predicate[0].subqueries.len(), 1);
        assert!(!predicate[0].fits(&BTreeSet::from(["c".to_string()])));
    }

    #[test]
    fn test_cte_reference_becomes_subquery_alias() {
        let plan = convert(
            "with top_items as (select i_item_sk from item) select * from top_items",
            CatalogMode::Strict,
        )
        .unwrap();
        assert!(plan.explain().contains("SubqueryAlias(alias=[top_items])"));
    }

    #[test]
    fn test_set_operation_and_values() {
        let plan = convert(
            "select i_color from item union all select s_store_name from store",
            CatalogMode::Strict,
        )
        .unwrap();
        assert!(plan.explain().starts_with("SetOp(op=[UNION ALL])"));

        let plan = convert("values (1), (2)", CatalogMode::Strict).unwrap();
        assert_eq!(plan, LogicalPlan::Values { rows: 2 });
    }

    #[test]
    fn test_sort_and_limit_wrap_projection() {
        let plan = convert(
            "select i_color from item order by i_color limit 10",
            CatalogMode::Strict,
        )
        .unwrap();
        let explain = plan.explain();
        assert!(explain.starts_with("Limit("));
        assert!(explain.contains("Sort(keys=[i_color])"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse(""), Err(PlanError::Parse(_))));
        assert!(matches!(parse("   "), Err(PlanError::Parse(_))));
        assert!(matches!(parse("selec from"), Err(PlanError::Parse(_))));
        assert!(matches!(
            parse("select 1; select 2"),
            Err(PlanError::Conversion(_))
        ));
    }

    #[test]
    fn test_non_query_statement_is_conversion_error() {
        let err = convert("update item set i_color = 'red'", CatalogMode::Lenient).unwrap_err();
        assert_eq!(
            err,
            PlanError::Conversion("unsupported statement UPDATE".to_string())
        );
    }

    #[test]
    fn test_backtick_identifiers_and_placeholders() {
        let plan = convert("SELECT `A`, `B`\nFROM `D`\nWHERE `C` = ?", CatalogMode::Lenient).unwrap();
        assert!(plan.explain().contains("TableScan(table=[d])"));
    }
}
