//! Database access layer.
//!
//! The pipeline talks to the target database only through
//! [`DatabaseAccess`]. Two backends ship with the crate:
//!
//! - [`DuckDbDatabase`]: embedded DuckDB, file-backed or in memory
//! - [`MemoryDatabase`]: in-process tables enforcing every constraint the
//!   generator honors, used for dry runs and tests

mod duckdb;
mod memory;
pub mod sql;

pub use self::duckdb::DuckDbDatabase;
pub use memory::MemoryDatabase;

use crate::error::{DbError, SeedError};
use crate::generator::{KeyTuple, Row};
use crate::schema::Schema;

/// Result of writing one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    pub inserted: u64,
    /// Rows the database refused (constraint violations)
    pub rejected: u64,
}

/// Operations the generation pipeline needs from a database.
///
/// Implementations are shared by every worker of a run.
pub trait DatabaseAccess: Send + Sync {
    /// Short backend name for logs and reports
    fn name(&self) -> &str;

    /// Read the schema of every table
    fn introspect(&self) -> Result<Schema, SeedError>;

    /// Insert rows whose values follow `columns`.
    ///
    /// Constraint violations on single rows are reported as rejected rows;
    /// an `Err` means the batch as a whole failed and may be retried.
    fn insert_batch(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Row],
    ) -> Result<InsertOutcome, DbError>;

    fn count_rows(&self, table: &str) -> Result<u64, DbError>;

    /// Up to `limit` existing rows, values in `columns` order
    fn sample_rows(&self, table: &str, columns: &[String], limit: usize)
        -> Result<Vec<Row>, DbError>;

    /// Distinct non-NULL tuples of `columns`
    fn column_values(
        &self,
        table: &str,
        columns: &[String],
        limit: Option<usize>,
    ) -> Result<Vec<KeyTuple>, DbError>;

    /// Up to `limit` distinct non-NULL tuples of `columns` ordered ascending,
    /// starting after `after`. Pages through a table a bounded chunk at a time.
    fn key_page(
        &self,
        table: &str,
        columns: &[String],
        after: Option<&KeyTuple>,
        limit: usize,
    ) -> Result<Vec<KeyTuple>, DbError>;

    fn max_integer(&self, table: &str, column: &str) -> Result<Option<i64>, DbError>;

    /// Set `set_columns` of the row identified by each key tuple.
    /// Returns the number of rows changed.
    fn update_rows(
        &self,
        table: &str,
        key_columns: &[String],
        set_columns: &[String],
        updates: &[(KeyTuple, KeyTuple)],
    ) -> Result<u64, DbError>;

    /// Whether a row with this tuple exists
    fn contains_key(&self, table: &str, columns: &[String], tuple: &KeyTuple)
        -> Result<bool, DbError>;

    /// Delete every row of a table
    fn truncate(&self, table: &str) -> Result<(), DbError>;
}
