//! Per-table generation plans.
//!
//! Everything that can be decided once per table is decided here: the value
//! source of each column, its producer, null probability and repeat policy,
//! the foreign key draws and the self-reference columns. Row generation then
//! only executes the plan.

use super::fabricate::{
    CapabilityRegistry, ChoiceProducer, FieldSpec, PatternProducer, Producer, WeightedProducer,
};
use super::value::{KeyTuple, Row, Value};
use crate::analyze::ColumnProfile;
use crate::config::{
    ColumnConfig, DuplicateStrategy, SeedConfig, DEFAULT_FAST_REUSE_PROBABILITY, DEFAULT_POOL_SIZE,
    DEFAULT_SMART_REUSE_PROBABILITY,
};
use crate::duplicate::{resolve_strategy, ColumnDuplicator, Downgrade, DowngradeReason};
use crate::error::SeedError;
use crate::schema::{Column, ColumnClass, ColumnType, Schema, TableId, TableSchema};
use ahash::AHashMap;
use chrono::{Local, Timelike};
use rand::rngs::StdRng;
use std::sync::Arc;
use tracing::warn;

/// Where a column's values come from
#[derive(Clone)]
pub enum ValueSource {
    /// `base + 1 + row offset`, distinct by construction
    Sequence { base: i64 },
    /// Filled from the table's foreign key draws
    ForeignKey,
    /// Filled after the rest of the row, see [`SelfRefPlan`]
    SelfReference,
    /// The column's declared DEFAULT
    Default(Value),
    Fabricate(Arc<dyn Producer>),
}

impl std::fmt::Debug for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::Sequence { base } => write!(f, "Sequence({base})"),
            ValueSource::ForeignKey => write!(f, "ForeignKey"),
            ValueSource::SelfReference => write!(f, "SelfReference"),
            ValueSource::Default(v) => write!(f, "Default({v:?})"),
            ValueSource::Fabricate(_) => write!(f, "Fabricate"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnPlan {
    pub name: String,
    pub index: usize,
    pub source: ValueSource,
    /// Producer or category name, for plan output
    pub category: String,
    pub null_probability: f64,
    pub strategy: DuplicateStrategy,
    pub duplicator: ColumnDuplicator,
    pub field: FieldSpec,
}

/// One foreign key whose tuple is drawn from the parent's keys
#[derive(Debug, Clone)]
pub struct FkDraw {
    pub fk: usize,
    pub parent: String,
    /// Local column positions in FK order
    pub slots: Vec<usize>,
    pub keys: Arc<Vec<KeyTuple>>,
    /// Every local column accepts NULL
    pub nullable: bool,
    pub null_probability: f64,
}

/// One self-referencing foreign key
#[derive(Debug, Clone)]
pub struct SelfRefPlan {
    pub fk: usize,
    pub slots: Vec<usize>,
    /// Positions of the referenced columns in the same table
    pub key_slots: Vec<usize>,
    pub nullable: bool,
}

/// Data read from the database before a table is planned
#[derive(Debug, Clone, Default)]
pub struct TableInputs {
    /// Referenced key tuples per FK index
    pub parent_keys: AHashMap<usize, Arc<Vec<KeyTuple>>>,
    /// Largest existing value per integer column
    pub sequence_base: AHashMap<usize, i64>,
    /// Existing rows for `fast_data_reuse`
    pub sample: Option<Arc<Vec<Row>>>,
    /// Value profiles of existing rows per column, when analyzing existing data
    pub patterns: AHashMap<usize, ColumnProfile>,
}

/// Resolved plan of one table
#[derive(Debug, Clone)]
pub struct TablePlan {
    pub table: String,
    pub table_id: TableId,
    pub columns: Vec<ColumnPlan>,
    pub foreign_keys: Vec<FkDraw>,
    pub self_refs: Vec<SelfRefPlan>,
    /// Column positions generated from a sequence
    pub sequence_columns: Vec<usize>,
    pub rows_requested: u64,
    pub unique_attempts: u32,
}

impl TablePlan {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }
}

/// Columns that get a reserved sequential range: a single-column integer
/// primary key or an integer auto-increment column, unless the
/// configuration asks for specific values.
pub fn sequence_columns(table: &TableSchema, config: &SeedConfig) -> Vec<usize> {
    table
        .columns
        .iter()
        .enumerate()
        .filter(|(_, col)| {
            let class = table.class(col.ordinal);
            let single_pk = table.primary_key.len() == 1 && class.is_primary_key;
            matches!(col.col_type, ColumnType::Integer(_))
                && (single_pk || class.is_auto_increment)
                && !class.is_foreign_key
                && !config
                    .get_column_config(&table.name, &col.name)
                    .map(requests_values)
                    .unwrap_or(false)
        })
        .map(|(idx, _)| idx)
        .collect()
}

fn requests_values(config: &ColumnConfig) -> bool {
    config.generator_function.is_some()
        || !config.possible_values.is_empty()
        || !config.weighted_values.is_empty()
        || config.min_value.is_some()
        || config.max_value.is_some()
}

/// Resolve the plan of one table.
///
/// Returns the plan and the strategy downgrades applied to its columns.
pub fn build_table_plan(
    schema: &Schema,
    table_id: TableId,
    config: &SeedConfig,
    registry: &CapabilityRegistry,
    inputs: &TableInputs,
    rng: &mut StdRng,
) -> Result<(TablePlan, Vec<Downgrade>), SeedError> {
    let table = schema
        .table(table_id)
        .ok_or_else(|| SeedError::SchemaAnalysis(format!("unknown table id {}", table_id)))?;
    let sequences = sequence_columns(table, config);
    let mut downgrades = Vec::new();

    let mut columns = Vec::with_capacity(table.columns.len());
    for (index, column) in table.columns.iter().enumerate() {
        let class = table.class(column.ordinal);
        let col_config = config.get_column_config(&table.name, &column.name);
        let field = FieldSpec::new(&table.name, column, class, col_config);

        let requested = config.requested_strategy(&table.name, &column.name);
        let (mut strategy, reason) = resolve_strategy(requested, class);
        if let Some(reason) = reason {
            downgrades.push(record_downgrade(&table.name, &column.name, requested, reason));
        }

        let null_probability = if class.is_not_null || class.is_primary_key {
            0.0
        } else {
            col_config.and_then(|c| c.null_probability).unwrap_or(0.0)
        };

        // A constant fills only one row of a distinct column; NULL never collides
        let mut default = configured_default(column, col_config);
        if class.must_be_distinct() && default.as_ref().is_some_and(|v| !v.is_null()) {
            downgrades.push(record_downgrade(
                &table.name,
                &column.name,
                requested,
                DowngradeReason::ConstantDefault,
            ));
            default = None;
        }

        let (source, category) = if sequences.contains(&index) {
            let base = inputs.sequence_base.get(&index).copied().unwrap_or(0);
            (ValueSource::Sequence { base }, "sequence".to_string())
        } else if class.is_self_reference {
            (ValueSource::SelfReference, "self_reference".to_string())
        } else if class.is_foreign_key {
            (ValueSource::ForeignKey, "foreign_key".to_string())
        } else if let Some(default) = default {
            (ValueSource::Default(default), "default".to_string())
        } else {
            let (name, producer) = column_producer(&table.name, column, col_config, registry)?;
            let (name, producer) =
                with_existing_pattern(name, producer, inputs.patterns.get(&index), class, col_config);
            (ValueSource::Fabricate(producer), name)
        };

        let duplicator = match (&source, strategy) {
            (ValueSource::Fabricate(producer), _) => {
                match build_duplicator(strategy, index, col_config, producer.as_ref(), &field, inputs, rng) {
                    Some(dup) => dup,
                    None => {
                        downgrades.push(record_downgrade(
                            &table.name,
                            &column.name,
                            requested,
                            DowngradeReason::EmptySample,
                        ));
                        strategy = DuplicateStrategy::GenerateNew;
                        ColumnDuplicator::GenerateNew
                    }
                }
            }
            _ => {
                strategy = DuplicateStrategy::GenerateNew;
                ColumnDuplicator::GenerateNew
            }
        };

        columns.push(ColumnPlan {
            name: column.name.clone(),
            index,
            source,
            category,
            null_probability,
            strategy,
            duplicator,
            field,
        });
    }

    let mut foreign_keys = Vec::new();
    let mut self_refs = Vec::new();
    for (fk_idx, fk) in table.foreign_keys.iter().enumerate() {
        let slots: Vec<usize> = fk.columns.iter().map(|c| c.0 as usize).collect();
        let nullable = slots.iter().all(|&s| !table.class(table.columns[s].ordinal).is_not_null);

        if fk.referenced_table_id == Some(table.id) {
            let key_slots = fk
                .referenced_columns
                .iter()
                .filter_map(|name| table.get_column_id(name).map(|c| c.0 as usize))
                .collect();
            self_refs.push(SelfRefPlan {
                fk: fk_idx,
                slots,
                key_slots,
                nullable,
            });
            continue;
        }

        let null_probability = if nullable {
            slots
                .first()
                .and_then(|&s| config.get_column_config(&table.name, &table.columns[s].name))
                .and_then(|c| c.null_probability)
                .unwrap_or(0.0)
        } else {
            0.0
        };
        foreign_keys.push(FkDraw {
            fk: fk_idx,
            parent: fk.referenced_table.clone(),
            slots,
            keys: inputs.parent_keys.get(&fk_idx).cloned().unwrap_or_default(),
            nullable,
            null_probability,
        });
    }

    let plan = TablePlan {
        table: table.name.clone(),
        table_id,
        columns,
        foreign_keys,
        self_refs,
        sequence_columns: sequences,
        rows_requested: config.rows_for(&table.name),
        unique_attempts: config.unique_attempts,
    };
    Ok((plan, downgrades))
}

fn record_downgrade(
    table: &str,
    column: &str,
    requested: DuplicateStrategy,
    reason: DowngradeReason,
) -> Downgrade {
    let downgrade = Downgrade {
        table: table.to_string(),
        column: column.to_string(),
        requested,
        applied: DuplicateStrategy::GenerateNew,
        reason,
    };
    warn!(table = %table, column = %column, %reason, "strategy downgraded: {}", downgrade);
    downgrade
}

/// Mix values that repeat in existing rows into a column free to repeat them
fn with_existing_pattern(
    name: String,
    producer: Arc<dyn Producer>,
    profile: Option<&ColumnProfile>,
    class: &ColumnClass,
    config: Option<&ColumnConfig>,
) -> (String, Arc<dyn Producer>) {
    if class.must_be_distinct() || config.is_some_and(requests_values) {
        return (name, producer);
    }
    let Some(profile) = profile.filter(|p| p.repeats()) else {
        return (name, producer);
    };
    match PatternProducer::new(&profile.common, profile.common_share(), Arc::clone(&producer)) {
        Some(pattern) => (format!("{}+existing", name), Arc::new(pattern)),
        None => (name, producer),
    }
}

fn column_producer(
    table: &str,
    column: &Column,
    config: Option<&ColumnConfig>,
    registry: &CapabilityRegistry,
) -> Result<(String, Arc<dyn Producer>), SeedError> {
    let Some(config) = config else {
        return registry.resolve(table, column, None);
    };
    let scale = column.scale;

    if !config.weighted_values.is_empty() {
        let mut weighted = Vec::with_capacity(config.weighted_values.len());
        for (raw, weight) in &config.weighted_values {
            let value = Value::parse_typed(raw, &column.col_type, scale)
                .ok_or_else(|| invalid_literal(table, &column.name, raw))?;
            weighted.push((value, *weight));
        }
        let producer = WeightedProducer::new(weighted).ok_or_else(|| {
            SeedError::Config(format!("{}.{}: weights sum to zero", table, column.name))
        })?;
        return Ok(("weighted_values".to_string(), Arc::new(producer)));
    }

    if !config.possible_values.is_empty() {
        let mut values = Vec::with_capacity(config.possible_values.len());
        for literal in &config.possible_values {
            let value = Value::from_config(literal, &column.col_type, scale)
                .ok_or_else(|| invalid_literal(table, &column.name, &literal.to_string()))?;
            values.push(value);
        }
        if let Some(producer) = ChoiceProducer::new(values) {
            return Ok(("possible_values".to_string(), Arc::new(producer)));
        }
    }

    registry.resolve(table, column, config.generator_function.as_deref())
}

fn invalid_literal(table: &str, column: &str, raw: &str) -> SeedError {
    SeedError::Config(format!(
        "{}.{}: value {} does not fit the column type",
        table, column, raw
    ))
}

/// DEFAULT value for a column configured `use_default`, when the default is
/// a literal or a current-time function.
fn configured_default(column: &Column, config: Option<&ColumnConfig>) -> Option<Value> {
    if !config.map(|c| c.use_default).unwrap_or(false) {
        return None;
    }
    let raw = column.default.as_deref()?.trim();
    if raw.eq_ignore_ascii_case("null") {
        return column.is_nullable.then_some(Value::Null);
    }
    let lower = raw.to_lowercase();
    if lower.starts_with("current_timestamp") || lower.starts_with("now(") {
        let now = Local::now().naive_local();
        return match column.col_type {
            ColumnType::Date => Some(Value::Date(now.date())),
            _ => Some(Value::DateTime(now.with_nanosecond(0).unwrap_or(now))),
        };
    }
    if lower.starts_with("current_date") {
        return Some(Value::Date(Local::now().date_naive()));
    }
    let literal = raw
        .split("::")
        .next()
        .unwrap_or(raw)
        .trim()
        .trim_matches('\'');
    Value::parse_typed(literal, &column.col_type, column.scale)
}

/// Build the repeat policy for a fabricated column, or `None` when
/// `fast_data_reuse` has nothing to reuse.
fn build_duplicator(
    strategy: DuplicateStrategy,
    index: usize,
    config: Option<&ColumnConfig>,
    producer: &dyn Producer,
    field: &FieldSpec,
    inputs: &TableInputs,
    rng: &mut StdRng,
) -> Option<ColumnDuplicator> {
    let pool_size = config.and_then(|c| c.pool_size).unwrap_or(DEFAULT_POOL_SIZE);
    match strategy {
        DuplicateStrategy::GenerateNew => Some(ColumnDuplicator::GenerateNew),
        DuplicateStrategy::AllowDuplicates => {
            let value = config
                .and_then(|c| c.duplicate_value.as_ref())
                .and_then(|v| Value::from_config(v, &field.col_type, Some(field.scale)))
                .unwrap_or_else(|| producer.produce(field, rng));
            Some(ColumnDuplicator::Fixed(value))
        }
        DuplicateStrategy::SmartDuplicates => {
            let p = config
                .and_then(|c| c.reuse_probability)
                .unwrap_or(DEFAULT_SMART_REUSE_PROBABILITY);
            Some(ColumnDuplicator::smart(pool_size, p))
        }
        DuplicateStrategy::CachedPool => {
            let values = (0..pool_size).map(|_| producer.produce(field, rng)).collect();
            Some(ColumnDuplicator::Cached(Arc::new(values)))
        }
        DuplicateStrategy::FastDataReuse => {
            let values: Vec<Value> = inputs
                .sample
                .as_ref()
                .map(|rows| {
                    rows.iter()
                        .filter_map(|row| row.get(index))
                        .filter(|v| !v.is_null())
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            if values.is_empty() {
                return None;
            }
            let p = config
                .and_then(|c| c.reuse_probability)
                .unwrap_or(DEFAULT_FAST_REUSE_PROBABILITY);
            Some(ColumnDuplicator::Reuse {
                values: Arc::new(values),
                reuse_probability: p,
            })
        }
    }
}
