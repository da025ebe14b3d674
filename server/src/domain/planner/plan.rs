//! Logical plan
//!
//! Relational operator tree produced by conversion and rewritten by the
//! optimizer. Expressions are kept as rendered SQL text; only the facts the
//! rewrite rules need (referenced relations, column equalities) are extracted.

use std::collections::BTreeSet;

/// Join flavor as written in the statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
    Other,
}

impl JoinKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inner => "inner",
            Self::Left => "left",
            Self::Right => "right",
            Self::Full => "full",
            Self::Cross => "cross",
            Self::Other => "other",
        }
    }
}

/// One AND-ed term of a predicate
#[derive(Debug, Clone, PartialEq)]
pub struct Conjunct {
    pub text: String,
    /// Relations (by binding name) whose columns the term reads
    pub bindings: BTreeSet<String>,
    /// Every column reference resolved to a relation of the enclosing SELECT
    pub resolved: bool,
    /// `(binding, column)` when the term is `column = literal`
    pub equality: Option<(String, String)>,
    pub subqueries: Vec<LogicalPlan>,
}

impl Conjunct {
    /// Safe to evaluate against a subtree exposing `available`
    pub fn fits(&self, available: &BTreeSet<String>) -> bool {
        self.resolved && self.subqueries.is_empty() && self.bindings.is_subset(available)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogicalPlan {
    TableScan {
        table: String,
        binding: String,
        /// Indexed columns of the table, empty when unknown
        indexes: Vec<String>,
    },
    IndexScan {
        table: String,
        binding: String,
        column: String,
        conditions: Vec<Conjunct>,
    },
    Filter {
        predicate: Vec<Conjunct>,
        input: Box<LogicalPlan>,
    },
    Project {
        items: Vec<String>,
        wildcard: bool,
        subqueries: Vec<LogicalPlan>,
        input: Box<LogicalPlan>,
    },
    Join {
        kind: JoinKind,
        condition: Option<String>,
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
    },
    Aggregate {
        group_by: Vec<String>,
        input: Box<LogicalPlan>,
    },
    Sort {
        keys: String,
        input: Box<LogicalPlan>,
    },
    Limit {
        clause: String,
        input: Box<LogicalPlan>,
    },
    SetOp {
        op: String,
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
    },
    Values {
        rows: usize,
    },
    /// Derived table or CTE reference
    SubqueryAlias {
        alias: String,
        input: Box<LogicalPlan>,
    },
}

impl LogicalPlan {
    /// Relation names visible to predicates above this node
    pub fn bindings(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_bindings(&mut out);
        out
    }

    fn collect_bindings(&self, out: &mut BTreeSet<String>) {
        match self {
            Self::TableScan { binding, .. } | Self::IndexScan { binding, .. } => {
                out.insert(binding.clone());
            }
            Self::SubqueryAlias { alias, .. } => {
                out.insert(alias.clone());
            }
            Self::Join { left, right, .. } => {
                left.collect_bindings(out);
                right.collect_bindings(out);
            }
            Self::Filter { input, .. }
            | Self::Project { input, .. }
            | Self::Aggregate { input, .. }
            | Self::Sort { input, .. }
            | Self::Limit { input, .. } => input.collect_bindings(out),
            Self::SetOp { .. } | Self::Values { .. } => {}
        }
    }

    /// Indented operator tree, one node per line
    pub fn explain(&self) -> String {
        let mut out = String::new();
        self.explain_into(&mut out, 0);
        out
    }

    /// One-line description of this node without its inputs
    fn label(&self) -> String {
        match self {
            Self::TableScan { table, binding, .. } if binding != table => {
                format!("TableScan(table=[{table}], alias=[{binding}])")
            }
            Self::TableScan { table, .. } => format!("TableScan(table=[{table}])"),
            Self::IndexScan {
                table,
                column,
                conditions,
                ..
            } => format!(
                "IndexScan(table=[{table}], index=[{column}], conditions=[{}])",
                join_texts(conditions)
            ),
            Self::Filter { predicate, .. } => {
                format!("Filter(condition=[{}])", join_texts(predicate))
            }
            Self::Project {
                items, wildcard, ..
            } => {
                let mut columns = items.clone();
                if *wildcard && columns.is_empty() {
                    columns.push("*".to_string());
                }
                format!("Project(columns=[{}])", columns.join(", "))
            }
            Self::Join {
                kind,
                condition: Some(condition),
                ..
            } => format!(
                "Join(kind=[{}], condition=[{condition}])",
                kind.as_str()
            ),
            Self::Join { kind, .. } => format!("Join(kind=[{}])", kind.as_str()),
            Self::Aggregate { group_by, .. } => {
                format!("Aggregate(group=[{}])", group_by.join(", "))
            }
            Self::Sort { keys, .. } => format!("Sort(keys=[{keys}])"),
            Self::Limit { clause, .. } => format!("Limit({clause})"),
            Self::SetOp { op, .. } => format!("SetOp(op=[{op}])"),
            Self::Values { rows } => format!("Values(rows=[{rows}])"),
            Self::SubqueryAlias { alias, .. } => {
                format!("SubqueryAlias(alias=[{alias}])")
            }
        }
    }

    fn explain_into(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        out.push_str(&indent);
        out.push_str(&self.label());
        out.push('\n');

        for child in self.children() {
            child.explain_into(out, depth + 1);
        }
        for subquery in self.subqueries() {
            out.push_str(&indent);
            out.push_str("  Subquery\n");
            subquery.explain_into(out, depth + 2);
        }
    }

    /// Direct relational inputs
    pub fn children(&self) -> Vec<&LogicalPlan> {
        match self {
            Self::Join { left, right, .. } | Self::SetOp { left, right, .. } => {
                vec![left.as_ref(), right.as_ref()]
            }
            Self::Filter { input, .. }
            | Self::Project { input, .. }
            | Self::Aggregate { input, .. }
            | Self::Sort { input, .. }
            | Self::Limit { input, .. }
            | Self::SubqueryAlias { input, .. } => vec![input.as_ref()],
            Self::TableScan { .. } | Self::IndexScan { .. } | Self::Values { .. } => Vec::new(),
        }
    }

    /// Plans of subqueries nested in this node's expressions
    pub fn subqueries(&self) -> Vec<&LogicalPlan> {
        match self {
            Self::Filter { predicate, .. } => predicate
                .iter()
                .flat_map(|c| c.subqueries.iter())
                .collect(),
            Self::IndexScan { conditions, .. } => conditions
                .iter()
                .flat_map(|c| c.subqueries.iter())
                .collect(),
            Self::Project { subqueries, .. } => subqueries.iter().collect(),
            _ => Vec::new(),
        }
    }
}

fn join_texts(conjuncts: &[Conjunct]) -> String {
    conjuncts
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(" AND ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(table: &str) -> LogicalPlan {
        LogicalPlan::TableScan {
            table: table.to_string(),
            binding: table.to_string(),
            indexes: Vec::new(),
        }
    }

    #[test]
    fn test_bindings_of_join() {
        let plan = LogicalPlan::Join {
            kind: JoinKind::Cross,
            condition: None,
            left: Box::new(scan("a")),
            right: Box::new(LogicalPlan::SubqueryAlias {
                alias: "s".to_string(),
                input: Box::new(scan("b")),
            }),
        };
        let bindings: Vec<String> = plan.bindings().into_iter().collect();
        assert_eq!(bindings, vec!["a".to_string(), "s".to_string()]);
    }

    #[test]
    fn test_explain_indents_children() {
        let plan = LogicalPlan::Project {
            items: vec!["x".to_string()],
            wildcard: false,
            subqueries: Vec::new(),
            input: Box::new(LogicalPlan::Join {
                kind: JoinKind::Inner,
                condition: Some("a.id = b.id".to_string()),
                left: Box::new(scan("a")),
                right: Box::new(scan("b")),
            }),
        };
        assert_eq!(
            plan.explain(),
            "Project(columns=[x])\n  Join(kind=[inner], condition=[a.id = b.id])\n    TableScan(table=[a])\n    TableScan(table=[b])\n"
        );
    }

    #[test]
    fn test_explain_nests_subqueries_under_marker() {
        let plan = LogicalPlan::Project {
            items: vec!["x".to_string()],
            wildcard: false,
            subqueries: vec![scan("b")],
            input: Box::new(scan("a")),
        };
        assert_eq!(
            plan.explain(),
            "Project(columns=[x])\n  TableScan(table=[a])\n  Subquery\n    TableScan(table=[b])\n"
        );
    }

    #[test]
    fn test_conjunct_fits() {
        let conjunct = Conjunct {
            text: "a.x = 1".to_string(),
            bindings: BTreeSet::from(["a".to_string()]),
            resolved: true,
            equality: Some(("a".to_string(), "x".to_string())),
            subqueries: Vec::new(),
        };
        assert!(conjunct.fits(&BTreeSet::from(["a".to_string(), "b".to_string()])));
        assert!(!conjunct.fits(&BTreeSet::from(["b".to_string()])));

        let unresolved = Conjunct {
            resolved: false,
            ..conjunct
        };
        assert!(!unresolved.fits(&BTreeSet::from(["a".to_string()])));
    }
}
