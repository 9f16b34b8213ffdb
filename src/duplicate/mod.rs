//! Duplicate/reuse strategy engine.
//!
//! Resolves the requested [`DuplicateStrategy`] of each column against its
//! constraints and turns the result into a [`ColumnDuplicator`], the per-row
//! decision between a fresh value and a repeated one.

use crate::config::DuplicateStrategy;
use crate::generator::{Value, ValuePool};
use crate::schema::ColumnClass;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::Rng;
use schemars::JsonSchema;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Why a requested strategy was replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DowngradeReason {
    PrimaryKey,
    Unique,
    AutoIncrement,
    ForeignKey,
    /// `fast_data_reuse` found no existing values to reuse
    EmptySample,
    /// `use_default` would repeat one value in a distinct column
    ConstantDefault,
}

impl fmt::Display for DowngradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DowngradeReason::PrimaryKey => "primary key",
            DowngradeReason::Unique => "unique constraint",
            DowngradeReason::AutoIncrement => "auto-increment",
            DowngradeReason::ForeignKey => "foreign key",
            DowngradeReason::EmptySample => "no existing values",
            DowngradeReason::ConstantDefault => "constant default on a distinct column",
        };
        f.write_str(s)
    }
}

/// A constraint-driven strategy replacement, recorded in the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct Downgrade {
    pub table: String,
    pub column: String,
    pub requested: DuplicateStrategy,
    pub applied: DuplicateStrategy,
    pub reason: DowngradeReason,
}

impl fmt::Display for Downgrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}: {} -> {} ({})",
            self.table, self.column, self.requested, self.applied, self.reason
        )
    }
}

/// Strategy a column may actually use, given its classification.
///
/// Anything other than `generate_new` on a key, auto-increment or foreign key
/// column would repeat values it must not repeat (or bypass parent keys), so
/// it is replaced.
pub fn resolve_strategy(
    requested: DuplicateStrategy,
    class: &ColumnClass,
) -> (DuplicateStrategy, Option<DowngradeReason>) {
    if requested == DuplicateStrategy::GenerateNew {
        return (requested, None);
    }
    let reason = if class.is_primary_key {
        Some(DowngradeReason::PrimaryKey)
    } else if class.is_auto_increment {
        Some(DowngradeReason::AutoIncrement)
    } else if class.is_unique {
        Some(DowngradeReason::Unique)
    } else if class.is_foreign_key {
        Some(DowngradeReason::ForeignKey)
    } else {
        None
    };
    match reason {
        Some(reason) => (DuplicateStrategy::GenerateNew, Some(reason)),
        None => (requested, None),
    }
}

/// Per-column repeat policy used while generating rows.
#[derive(Debug, Clone)]
pub enum ColumnDuplicator {
    GenerateNew,
    /// `allow_duplicates`: one value for every row
    Fixed(Value),
    /// `smart_duplicates`: grow a small pool, reuse with a probability
    Smart {
        pool: Arc<Mutex<ValuePool>>,
        reuse_probability: f64,
    },
    /// `cached_pool`: pre-fabricated values, every row draws from them
    Cached(Arc<Vec<Value>>),
    /// `fast_data_reuse`: values sampled from existing rows
    Reuse {
        values: Arc<Vec<Value>>,
        reuse_probability: f64,
    },
}

impl ColumnDuplicator {
    pub fn smart(pool_size: usize, reuse_probability: f64) -> Self {
        ColumnDuplicator::Smart {
            pool: Arc::new(Mutex::new(ValuePool::new(pool_size))),
            reuse_probability,
        }
    }

    /// Next value for a row. `fresh` fabricates a new value when the policy
    /// asks for one.
    pub fn next<F>(&self, rng: &mut StdRng, fresh: F) -> Value
    where
        F: FnOnce(&mut StdRng) -> Value,
    {
        match self {
            ColumnDuplicator::GenerateNew => fresh(rng),
            ColumnDuplicator::Fixed(value) => value.clone(),
            ColumnDuplicator::Smart {
                pool,
                reuse_probability,
            } => {
                if rng.random_bool(*reuse_probability) {
                    if let Some(value) = pool.lock().least_used() {
                        return value;
                    }
                }
                let value = fresh(rng);
                pool.lock().offer(value.clone());
                value
            }
            ColumnDuplicator::Cached(values) => {
                if values.is_empty() {
                    return fresh(rng);
                }
                values[rng.random_range(0..values.len())].clone()
            }
            ColumnDuplicator::Reuse {
                values,
                reuse_probability,
            } => {
                if !values.is_empty() && rng.random_bool(*reuse_probability) {
                    values[rng.random_range(0..values.len())].clone()
                } else {
                    fresh(rng)
                }
            }
        }
    }

    /// Copy for an isolated worker: pools are snapshotted, not shared.
    pub fn isolated(&self) -> Self {
        match self {
            ColumnDuplicator::Smart {
                pool,
                reuse_probability,
            } => {
                let pool = pool.lock();
                ColumnDuplicator::Smart {
                    pool: Arc::new(Mutex::new(ValuePool::filled(
                        pool.capacity(),
                        pool.values().to_vec(),
                    ))),
                    reuse_probability: *reuse_probability,
                }
            }
            other => other.clone(),
        }
    }

    /// Release spare pool capacity.
    pub fn relieve(&self) {
        if let ColumnDuplicator::Smart { pool, .. } = self {
            pool.lock().relieve();
        }
    }

    /// Whether this column can repeat values
    pub fn repeats(&self) -> bool {
        !matches!(self, ColumnDuplicator::GenerateNew)
    }
}
