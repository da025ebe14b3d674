//! Anti-pattern classification
//!
//! Walks an optimized plan once to collect `PlanFeatures`, then evaluates each
//! rule of the closed `AntiPattern` set against them.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::catalog::SchemaCatalog;
use super::convert::{parse, validate_and_convert};
use super::error::PlanError;
use super::optimize::optimize;
use super::plan::LogicalPlan;

/// Structural facts about a plan, subqueries included
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanFeatures {
    pub joins: usize,
    /// Joins with no condition at all
    pub cartesian_joins: usize,
    /// Filters evaluated over a full scan of a table that has indexes
    pub filtered_full_scans: usize,
    pub index_scans: usize,
    pub subqueries: usize,
    pub wildcard: bool,
}

impl PlanFeatures {
    pub fn collect(plan: &LogicalPlan) -> Self {
        let mut features = Self::default();
        features.visit(plan);
        features
    }

    fn visit(&mut self, plan: &LogicalPlan) {
        match plan {
            LogicalPlan::Join { condition, .. } => {
                self.joins += 1;
                if condition.is_none() {
                    self.cartesian_joins += 1;
                }
            }
            LogicalPlan::Filter { input, .. } => {
                if let LogicalPlan::TableScan { indexes, .. } = input.as_ref() {
                    if !indexes.is_empty() {
                        self.filtered_full_scans += 1;
                    }
                }
            }
            LogicalPlan::IndexScan { .. } => self.index_scans += 1,
            LogicalPlan::Project { wildcard: true, .. } => self.wildcard = true,
            _ => {}
        }

        for subquery in plan.subqueries() {
            self.subqueries += 1;
            self.visit(subquery);
        }
        for child in plan.children() {
            self.visit(child);
        }
    }
}

/// Known query anti-patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AntiPattern {
    TooManyJoins,
    CartesianJoin,
    FullTableScan,
    SelectStar,
}

impl AntiPattern {
    pub const ALL: [AntiPattern; 4] = [
        Self::TooManyJoins,
        Self::CartesianJoin,
        Self::FullTableScan,
        Self::SelectStar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TooManyJoins => "TOO_MANY_JOINS",
            Self::CartesianJoin => "CARTESIAN_JOIN",
            Self::FullTableScan => "FULL_TABLE_SCAN",
            Self::SelectStar => "SELECT_STAR",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(value.trim()))
    }

    pub fn applies(&self, features: &PlanFeatures, join_threshold: usize) -> bool {
        match self {
            Self::TooManyJoins => features.joins > join_threshold,
            Self::CartesianJoin => features.cartesian_joins > 0,
            Self::FullTableScan => features.filtered_full_scans > 0,
            Self::SelectStar => features.wildcard,
        }
    }
}

impl std::fmt::Display for AntiPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plans statements against a catalog and labels them
///
/// Cheap to clone; the catalog is shared.
#[derive(Debug, Clone)]
pub struct Classifier {
    catalog: Arc<SchemaCatalog>,
    join_threshold: usize,
}

impl Classifier {
    pub fn new(catalog: Arc<SchemaCatalog>, join_threshold: usize) -> Self {
        Self {
            catalog,
            join_threshold,
        }
    }

    pub fn join_threshold(&self) -> usize {
        self.join_threshold
    }

    /// Parse, validate, convert and optimize `sql`
    pub fn plan(&self, sql: &str) -> Result<LogicalPlan, PlanError> {
        let statement = parse(sql)?;
        let plan = validate_and_convert(&statement, &self.catalog)?;
        Ok(optimize(plan))
    }

    pub fn classify(&self, sql: &str) -> Result<BTreeSet<AntiPattern>, PlanError> {
        let plan = self.plan(sql)?;
        Ok(self.classify_plan(&plan))
    }

    pub fn classify_plan(&self, plan: &LogicalPlan) -> BTreeSet<AntiPattern> {
        let features = PlanFeatures::collect(plan);
        AntiPattern::ALL
            .into_iter()
            .filter(|rule| rule.applies(&features, self.join_threshold))
            .collect()
    }
}
