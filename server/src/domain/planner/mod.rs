//! SQL plan classifier
//!
//! `parse` -> `validate_and_convert` -> `optimize` -> feature walk -> labels.
//!
//! - `catalog` - table, column and index metadata
//! - `convert` - parsing, validation and logical plan construction
//! - `plan` - logical plan operators
//! - `optimize` - fixpoint rule rewriter
//! - `classify` - plan features and anti-pattern rules

pub mod catalog;
pub mod classify;
pub mod convert;
pub mod error;
pub mod optimize;
pub mod plan;

pub use catalog::{CatalogMode, SchemaCatalog, TableDef};
pub use classify::{AntiPattern, Classifier, PlanFeatures};
pub use convert::{parse, validate_and_convert};
pub use error::PlanError;
pub use optimize::optimize;
pub use plan::{Conjunct, JoinKind, LogicalPlan};
