//! Planner error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conversion error: {0}")]
    Conversion(String),
}

impl From<sqlparser::parser::ParserError> for PlanError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        Self::Parse(err.to_string())
    }
}
