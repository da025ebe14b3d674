//! Rule-based plan rewrites
//!
//! Rules run bottom-up and repeat until the plan stops changing:
//! - adjacent filters merge into one
//! - filter terms that read one side of a join move below it
//! - terms that link both sides of a condition-less join become its condition
//! - an equality on an indexed column directly above a table scan becomes an
//!   index scan
//!
//! Term order is preserved everywhere, so the result is deterministic and
//! optimizing an optimized plan returns it unchanged.

use std::collections::BTreeSet;

use super::plan::{Conjunct, JoinKind, LogicalPlan};

/// Bound on rewrite passes. Every rule strictly sinks or removes a filter, so
/// real plans reach the fixpoint in a handful of passes.
const MAX_PASSES: usize = 64;

pub fn optimize(plan: LogicalPlan) -> LogicalPlan {
    let mut current = plan;
    for _ in 0..MAX_PASSES {
        let next = rewrite(current.clone());
        if next == current {
            return current;
        }
        current = next;
    }
    tracing::debug!("Optimizer pass limit reached");
    current
}

fn rewrite(plan: LogicalPlan) -> LogicalPlan {
    let plan = rewrite_children(plan);
    match plan {
        LogicalPlan::Filter { predicate, input } => rewrite_filter(predicate, *input),
        other => other,
    }
}

fn rewrite_children(plan: LogicalPlan) -> LogicalPlan {
    let bx = |p: Box<LogicalPlan>| Box::new(rewrite(*p));
    match plan {
        LogicalPlan::Filter { predicate, input } => LogicalPlan::Filter {
            predicate: predicate.into_iter().map(rewrite_conjunct).collect(),
            input: bx(input),
        },
        LogicalPlan::IndexScan {
            table,
            binding,
            column,
            conditions,
        } => LogicalPlan::IndexScan {
            table,
            binding,
            column,
            conditions: conditions.into_iter().map(rewrite_conjunct).collect(),
        },
        LogicalPlan::Project {
            items,
            wildcard,
            subqueries,
            input,
        } => LogicalPlan::Project {
            items,
            wildcard,
            subqueries: subqueries.into_iter().map(rewrite).collect(),
            input: bx(input),
        },
        LogicalPlan::Join {
            kind,
            condition,
            left,
            right,
        } => LogicalPlan::Join {
            kind,
            condition,
            left: bx(left),
            right: bx(right),
        },
        LogicalPlan::Aggregate { group_by, input } => LogicalPlan::Aggregate {
            group_by,
            input: bx(input),
        },
        LogicalPlan::Sort { keys, input } => LogicalPlan::Sort {
            keys,
            input: bx(input),
        },
        LogicalPlan::Limit { clause, input } => LogicalPlan::Limit {
            clause,
            input: bx(input),
        },
        LogicalPlan::SetOp { op, left, right } => LogicalPlan::SetOp {
            op,
            left: bx(left),
            right: bx(right),
        },
        LogicalPlan::SubqueryAlias { alias, input } => LogicalPlan::SubqueryAlias {
            alias,
            input: bx(input),
        },
        leaf @ (LogicalPlan::TableScan { .. } | LogicalPlan::Values { .. }) => leaf,
    }
}

fn rewrite_conjunct(conjunct: Conjunct) -> Conjunct {
    Conjunct {
        subqueries: conjunct.subqueries.into_iter().map(rewrite).collect(),
        ..conjunct
    }
}

fn filter(predicate: Vec<Conjunct>, input: LogicalPlan) -> LogicalPlan {
    if predicate.is_empty() {
        input
    } else {
        LogicalPlan::Filter {
            predicate,
            input: Box::new(input),
        }
    }
}

fn rewrite_filter(predicate: Vec<Conjunct>, input: LogicalPlan) -> LogicalPlan {
    if predicate.is_empty() {
        return input;
    }

    match input {
        LogicalPlan::Filter {
            predicate: inner,
            input,
        } => {
            let mut merged = inner;
            merged.extend(predicate);
            filter(merged, *input)
        }
        LogicalPlan::Join {
            kind,
            condition,
            left,
            right,
        } => push_into_join(predicate, kind, condition, *left, *right),
        LogicalPlan::TableScan {
            table,
            binding,
            indexes,
        } => use_index(predicate, table, binding, indexes),
        other => filter(predicate, other),
    }
}

fn push_into_join(
    predicate: Vec<Conjunct>,
    kind: JoinKind,
    condition: Option<String>,
    left: LogicalPlan,
    right: LogicalPlan,
) -> LogicalPlan {
    let left_bindings = left.bindings();
    let right_bindings = right.bindings();
    let all: BTreeSet<String> = left_bindings.union(&right_bindings).cloned().collect();

    // Outer joins only accept terms on their preserved side
    let (push_left, push_right) = match kind {
        JoinKind::Inner | JoinKind::Cross => (true, true),
        JoinKind::Left => (true, false),
        JoinKind::Right => (false, true),
        JoinKind::Full | JoinKind::Other => (false, false),
    };
    let absorb = matches!(kind, JoinKind::Cross) || (kind == JoinKind::Inner && condition.is_none());

    let mut to_left = Vec::new();
    let mut to_right = Vec::new();
    let mut to_join = Vec::new();
    let mut remaining = Vec::new();

    for conjunct in predicate {
        if push_left && conjunct.fits(&left_bindings) {
            to_left.push(conjunct);
        } else if push_right && conjunct.fits(&right_bindings) {
            to_right.push(conjunct);
        } else if absorb && conjunct.fits(&all) {
            to_join.push(conjunct);
        } else {
            remaining.push(conjunct);
        }
    }

    let (kind, condition) = if to_join.is_empty() {
        (kind, condition)
    } else {
        let text = to_join
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" AND ");
        (JoinKind::Inner, Some(text))
    };

    let join = LogicalPlan::Join {
        kind,
        condition,
        left: Box::new(filter(to_left, left)),
        right: Box::new(filter(to_right, right)),
    };
    filter(remaining, join)
}

fn use_index(
    predicate: Vec<Conjunct>,
    table: String,
    binding: String,
    indexes: Vec<String>,
) -> LogicalPlan {
    let position = predicate.iter().position(|c| match &c.equality {
        Some((b, column)) => *b == binding && indexes.iter().any(|i| i == column),
        None => false,
    });

    let Some(position) = position else {
        return filter(
            predicate,
            LogicalPlan::TableScan {
                table,
                binding,
                indexes,
            },
        );
    };

    let mut remaining = predicate;
    let lookup = remaining.remove(position);
    let column = lookup
        .equality
        .as_ref()
        .map(|(_, column)| column.clone())
        .unwrap_or_default();

    filter(
        remaining,
        LogicalPlan::IndexScan {
            table,
            binding,
            column,
            conditions: vec![lookup],
        },
    )
}
