//! Run reports.
//!
//! Every run that gets past schema analysis yields a [`GenerationReport`],
//! whether tables finished, failed or were interrupted. Each table report
//! separates requested from inserted rows and explains the difference with
//! [`Shortfall`] entries.

use crate::duplicate::Downgrade;
use crate::insert::TableState;
use schemars::JsonSchema;
use serde::Serialize;
use std::fmt;

/// Why requested rows were not inserted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ShortfallReason {
    /// No unique tuple found within the attempt budget
    GenerationExhausted,
    /// NOT NULL foreign key with an empty parent table
    NoParentKeys,
    /// Rows the database refused individually
    RejectedByDatabase,
    /// Rows of batches that failed every retry, or never dispatched after
    /// the table failed
    BatchFailed,
    Interrupted,
    /// A table this one depends on did not finish
    ParentNotDone,
}

impl fmt::Display for ShortfallReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShortfallReason::GenerationExhausted => "generation_exhausted",
            ShortfallReason::NoParentKeys => "no_parent_keys",
            ShortfallReason::RejectedByDatabase => "rejected_by_database",
            ShortfallReason::BatchFailed => "batch_failed",
            ShortfallReason::Interrupted => "interrupted",
            ShortfallReason::ParentNotDone => "parent_not_done",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct Shortfall {
    pub reason: ShortfallReason,
    pub rows: u64,
}

/// A post-insert check that did not hold. Never rolls anything back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct VerificationMismatch {
    pub table: String,
    /// `row_count` or `foreign_key:<columns>`
    pub check: String,
    pub expected: u64,
    pub actual: u64,
    pub detail: String,
}

impl fmt::Display for VerificationMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: expected {}, found {} ({})",
            self.table, self.check, self.expected, self.actual, self.detail
        )
    }
}

/// Outcome of one table
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct TableReport {
    pub table: String,
    pub state: TableState,
    pub stage: Option<usize>,
    pub rows_requested: u64,
    pub rows_generated: u64,
    pub rows_inserted: u64,
    /// Rows present before the run started
    pub rows_before: u64,
    pub elapsed_secs: f64,
    pub rows_per_second: f64,
    pub batches: u64,
    pub batch_retries: u64,
    pub shortfall: Vec<Shortfall>,
    pub downgrades: Vec<Downgrade>,
    pub verification: Vec<VerificationMismatch>,
    pub errors: Vec<String>,
    pub self_reference_passes: u32,
    pub self_reference_updates: u64,
}

impl TableReport {
    pub fn new(table: impl Into<String>, rows_requested: u64) -> Self {
        Self {
            table: table.into(),
            state: TableState::Pending,
            stage: None,
            rows_requested,
            rows_generated: 0,
            rows_inserted: 0,
            rows_before: 0,
            elapsed_secs: 0.0,
            rows_per_second: 0.0,
            batches: 0,
            batch_retries: 0,
            shortfall: Vec::new(),
            downgrades: Vec::new(),
            verification: Vec::new(),
            errors: Vec::new(),
            self_reference_passes: 0,
            self_reference_updates: 0,
        }
    }

    /// Add rows to a shortfall reason, merging with an existing entry
    pub fn add_shortfall(&mut self, reason: ShortfallReason, rows: u64) {
        if rows == 0 {
            return;
        }
        match self.shortfall.iter_mut().find(|s| s.reason == reason) {
            Some(entry) => entry.rows += rows,
            None => self.shortfall.push(Shortfall { reason, rows }),
        }
    }

    pub fn shortfall_rows(&self) -> u64 {
        self.shortfall.iter().map(|s| s.rows).sum()
    }

    pub fn shortfall_for(&self, reason: ShortfallReason) -> u64 {
        self.shortfall
            .iter()
            .filter(|s| s.reason == reason)
            .map(|s| s.rows)
            .sum()
    }

    pub fn is_done(&self) -> bool {
        self.state == TableState::Done
    }
}

/// Aggregate of a full-schema run
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct GenerationReport {
    pub backend: String,
    pub seed: u64,
    pub executor: String,
    pub workers: usize,
    pub dry_run: bool,
    pub interrupted: bool,
    pub stages: Vec<Vec<String>>,
    pub tables: Vec<TableReport>,
    pub elapsed_secs: f64,
}

impl GenerationReport {
    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables
            .iter()
            .find(|t| t.table.eq_ignore_ascii_case(name))
    }

    pub fn rows_requested(&self) -> u64 {
        self.tables.iter().map(|t| t.rows_requested).sum()
    }

    pub fn rows_inserted(&self) -> u64 {
        self.tables.iter().map(|t| t.rows_inserted).sum()
    }

    pub fn rows_per_second(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.rows_inserted() as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }

    pub fn downgrades(&self) -> impl Iterator<Item = &Downgrade> {
        self.tables.iter().flat_map(|t| t.downgrades.iter())
    }

    pub fn mismatches(&self) -> impl Iterator<Item = &VerificationMismatch> {
        self.tables.iter().flat_map(|t| t.verification.iter())
    }

    /// Every table reached DONE with no shortfall
    pub fn is_complete(&self) -> bool {
        self.tables
            .iter()
            .all(|t| t.is_done() && t.shortfall.is_empty())
    }

    pub fn failed_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| t.state == TableState::Failed)
            .map(|t| t.table.as_str())
            .collect()
    }
}

/// A run's stages and resolved settings, before anything is generated
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct PlanReport {
    pub executor: String,
    pub workers: usize,
    pub batch_size: usize,
    /// Pass to `generate --seed` to reproduce the run
    pub seed: u64,
    pub total_rows: u64,
    pub stages: Vec<PlanStage>,
    /// Tables linked by the self-reference pass after insertion
    pub self_referential: Vec<String>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct PlanStage {
    pub index: usize,
    pub tables: Vec<PlannedTable>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct PlannedTable {
    pub name: String,
    pub rows: u64,
}
