//! Sink error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration {version} ({name}) failed: {error}")]
    MigrationFailed {
        version: i32,
        name: String,
        error: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} references missing parent row {reference}")]
    ReferentialIntegrity {
        entity: &'static str,
        reference: String,
    },

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

impl SinkError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Classify a sqlx error raised by an insert into `entity`
    pub fn from_insert(entity: &'static str, reference: &str, err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                Self::ReferentialIntegrity {
                    entity,
                    reference: reference.to_string(),
                }
            }
            sqlx::Error::Database(db)
                if db.is_unique_violation() || db.is_check_violation() =>
            {
                Self::Constraint(format!("{}: {}", entity, db.message()))
            }
            _ => Self::Database(err),
        }
    }
}
