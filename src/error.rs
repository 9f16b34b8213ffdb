//! Error types shared by the generation pipeline.
//!
//! Only schema analysis, cycle and configuration errors abort a run. Row and
//! batch failures are isolated and end up in the [`GenerationReport`].
//!
//! [`GenerationReport`]: crate::report::GenerationReport

use thiserror::Error;

/// Fatal errors that stop a run before any batch is dispatched.
#[derive(Debug, Error)]
pub enum SeedError {
    /// A foreign key points at a missing table or column, or a constraint
    /// has a shape the generator cannot honor.
    #[error("schema analysis failed: {0}")]
    SchemaAnalysis(String),

    /// Two or more distinct tables reference each other.
    #[error("cyclic foreign key dependency between tables: {}", tables.join(", "))]
    CyclicDependency { tables: Vec<String> },

    /// Invalid configuration values or overrides naming unknown objects.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Database(#[from] DbError),
}

/// Per-row failures. The row is skipped and counted as a shortfall.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("no unique value for {table}({columns}) after {attempts} attempts")]
    Exhausted {
        table: String,
        columns: String,
        attempts: u32,
    },

    #[error("{table}.{column} is NOT NULL but {parent} has no keys to reference")]
    NoParentKeys {
        table: String,
        column: String,
        parent: String,
    },
}

/// Errors surfaced by a [`DatabaseAccess`](crate::db::DatabaseAccess) backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DbError {
    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("column not found: {table}.{column}")]
    ColumnNotFound { table: String, column: String },

    #[error("constraint violation on {table}: {message}")]
    ConstraintViolation { table: String, message: String },

    #[error("database error: {0}")]
    Backend(String),
}

/// A batch that could not be written after every retry was spent.
#[derive(Debug, Error, Clone)]
#[error("batch {batch} of {table} failed after {attempts} attempts: {source}")]
pub struct InsertionError {
    pub table: String,
    pub batch: u64,
    pub attempts: u32,
    #[source]
    pub source: DbError,
}

pub type Result<T, E = SeedError> = std::result::Result<T, E>;
