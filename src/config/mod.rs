//! Run configuration.
//!
//! Global defaults plus per-table and per-column overrides, loaded from YAML
//! or JSON. Resolution order for every column option is
//! column override > table default > global default.

mod template;

pub use template::config_template;

use crate::error::SeedError;
use crate::schema::Schema;
use anyhow::Context;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// How repeated values are chosen for a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateStrategy {
    /// Always fabricate a fresh value
    #[default]
    GenerateNew,
    /// One fixed value for every row
    AllowDuplicates,
    /// Small pool of distinct values, reused with a probability
    SmartDuplicates,
    /// Pre-fabricated pool, every row draws from it
    CachedPool,
    /// Reuse values sampled from existing rows
    FastDataReuse,
}

impl std::str::FromStr for DuplicateStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "generate_new" => Ok(DuplicateStrategy::GenerateNew),
            "allow_duplicates" => Ok(DuplicateStrategy::AllowDuplicates),
            "smart_duplicates" => Ok(DuplicateStrategy::SmartDuplicates),
            "cached_pool" => Ok(DuplicateStrategy::CachedPool),
            "fast_data_reuse" => Ok(DuplicateStrategy::FastDataReuse),
            _ => Err(format!(
                "Unknown duplicate strategy: {}. Valid options: generate_new, allow_duplicates, smart_duplicates, cached_pool, fast_data_reuse",
                s
            )),
        }
    }
}

impl std::fmt::Display for DuplicateStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DuplicateStrategy::GenerateNew => write!(f, "generate_new"),
            DuplicateStrategy::AllowDuplicates => write!(f, "allow_duplicates"),
            DuplicateStrategy::SmartDuplicates => write!(f, "smart_duplicates"),
            DuplicateStrategy::CachedPool => write!(f, "cached_pool"),
            DuplicateStrategy::FastDataReuse => write!(f, "fast_data_reuse"),
        }
    }
}

/// Which batch executor drives the workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    /// Partitioned for large runs, threads otherwise
    #[default]
    Auto,
    /// Worker threads sharing uniqueness registries and pools
    Threads,
    /// Isolated workers, each owning a hash partition of every uniqueness space
    Partitioned,
}

impl std::str::FromStr for ExecutorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(ExecutorKind::Auto),
            "threads" | "thread" => Ok(ExecutorKind::Threads),
            "partitioned" | "processes" => Ok(ExecutorKind::Partitioned),
            _ => Err(format!(
                "Unknown executor: {}. Valid options: auto, threads, partitioned",
                s
            )),
        }
    }
}

impl std::fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorKind::Auto => write!(f, "auto"),
            ExecutorKind::Threads => write!(f, "threads"),
            ExecutorKind::Partitioned => write!(f, "partitioned"),
        }
    }
}

/// Per-column generation overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ColumnConfig {
    /// Named value category, e.g. email, first_name, company, lorem
    pub generator_function: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub min_length: Option<u32>,
    pub max_length: Option<u32>,
    /// Draw uniformly from these values
    pub possible_values: Vec<serde_json::Value>,
    /// Draw from these values with the given relative weights
    pub weighted_values: BTreeMap<String, f64>,
    pub null_probability: Option<f64>,
    pub duplicate_strategy: Option<DuplicateStrategy>,
    /// Value used by `allow_duplicates`; fabricated once when absent
    pub duplicate_value: Option<serde_json::Value>,
    /// Pool capacity for `smart_duplicates` and `cached_pool`
    pub pool_size: Option<usize>,
    /// Rows sampled by `fast_data_reuse`
    pub sample_size: Option<usize>,
    pub reuse_probability: Option<f64>,
    /// Use the column's DEFAULT instead of generating
    pub use_default: bool,
}

/// Per-table settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TableConfig {
    /// Rows to insert into this table (overrides `default_rows`)
    pub rows_to_generate: Option<u64>,
    /// Table-wide duplicate strategy
    pub duplicate_strategy: Option<DuplicateStrategy>,
    pub columns: BTreeMap<String, ColumnConfig>,
}

impl TableConfig {
    /// Get configuration for a specific column (case-insensitive)
    pub fn get_column_config(&self, column: &str) -> Option<&ColumnConfig> {
        self.columns.get(column).or_else(|| {
            let lower = column.to_lowercase();
            self.columns
                .iter()
                .find(|(k, _)| k.to_lowercase() == lower)
                .map(|(_, v)| v)
        })
    }
}

pub const DEFAULT_POOL_SIZE: usize = 10;
pub const DEFAULT_SMART_REUSE_PROBABILITY: f64 = 0.5;
pub const DEFAULT_SAMPLE_SIZE: usize = 10_000;
pub const DEFAULT_FAST_REUSE_PROBABILITY: f64 = 0.95;
pub const DEFAULT_PATTERN_SAMPLE_SIZE: usize = 1000;

/// Complete run configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SeedConfig {
    /// Rows per batch; derived from total memory when absent
    pub batch_size: Option<usize>,
    /// Worker threads; derived from CPU count when absent
    pub max_workers: Option<usize>,
    /// Isolated workers for the partitioned executor
    pub max_processes: Option<usize>,
    /// Random seed; a random one is chosen and reported when absent
    pub seed: Option<u64>,
    /// Empty selected tables (children first) before inserting
    pub truncate_existing: bool,
    pub executor: ExecutorKind,
    /// Total requested rows at which `auto` switches to partitioned workers
    pub partition_threshold: u64,
    /// Retries per failed batch
    pub insert_retries: u32,
    /// Base delay of the exponential retry backoff
    pub retry_backoff_ms: u64,
    pub verify: bool,
    /// Child rows spot-checked per table during verification
    pub verify_sample_size: usize,
    /// Rows between progress events
    pub progress_interval: u64,
    /// Memory use (percent) above which batches shrink
    pub memory_high_water: f64,
    /// Memory use (percent) below which batches grow
    pub memory_low_water: f64,
    pub min_batch_size: usize,
    pub max_batch_size: usize,
    /// Regeneration attempts before a row is given up on
    pub unique_attempts: u32,
    /// Rows for tables without `rows_to_generate`
    pub default_rows: u64,
    /// Global duplicate strategy
    pub duplicate_strategy: DuplicateStrategy,
    /// Mix values common in existing rows into fabricated columns
    pub analyze_existing_data: bool,
    /// Rows sampled per table when analyzing existing data
    pub pattern_sample_size: usize,
    /// Only generate these tables (empty means all)
    pub include_tables: Vec<String>,
    pub exclude_tables: Vec<String>,
    /// Generate into an in-memory copy of the schema instead of the target
    pub dry_run: bool,
    pub tables: BTreeMap<String, TableConfig>,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            batch_size: None,
            max_workers: None,
            max_processes: None,
            seed: None,
            truncate_existing: false,
            executor: ExecutorKind::Auto,
            partition_threshold: 1_000_000,
            insert_retries: 3,
            retry_backoff_ms: 50,
            verify: true,
            verify_sample_size: 100,
            progress_interval: 1000,
            memory_high_water: 80.0,
            memory_low_water: 50.0,
            min_batch_size: 1000,
            max_batch_size: 100_000,
            unique_attempts: 100,
            default_rows: 100,
            duplicate_strategy: DuplicateStrategy::GenerateNew,
            analyze_existing_data: false,
            pattern_sample_size: DEFAULT_PATTERN_SAMPLE_SIZE,
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
            dry_run: false,
            tables: BTreeMap::new(),
        }
    }
}

impl SeedConfig {
    /// Load configuration from a YAML or JSON file (by extension)
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let is_json = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let config: SeedConfig = if is_json {
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON config: {}", path.display()))?
        } else {
            serde_yaml_ng::from_str(&content)
                .with_context(|| format!("Invalid YAML config: {}", path.display()))?
        };
        Ok(config)
    }

    /// Get configuration for a specific table
    pub fn get_table_config(&self, table_name: &str) -> Option<&TableConfig> {
        self.tables.get(table_name).or_else(|| {
            // Try case-insensitive match
            let lower = table_name.to_lowercase();
            self.tables
                .iter()
                .find(|(k, _)| k.to_lowercase() == lower)
                .map(|(_, v)| v)
        })
    }

    pub fn get_column_config(&self, table: &str, column: &str) -> Option<&ColumnConfig> {
        self.get_table_config(table)
            .and_then(|t| t.get_column_config(column))
    }

    /// Rows requested for a table
    pub fn rows_for(&self, table: &str) -> u64 {
        self.get_table_config(table)
            .and_then(|t| t.rows_to_generate)
            .unwrap_or(self.default_rows)
    }

    /// Requested strategy for a column before constraint downgrades
    pub fn requested_strategy(&self, table: &str, column: &str) -> DuplicateStrategy {
        let table_config = self.get_table_config(table);
        table_config
            .and_then(|t| t.get_column_config(column))
            .and_then(|c| c.duplicate_strategy)
            .or_else(|| table_config.and_then(|t| t.duplicate_strategy))
            .unwrap_or(self.duplicate_strategy)
    }

    /// Whether a table passes the include/exclude filters
    pub fn is_selected(&self, table: &str) -> bool {
        let matches = |list: &[String]| list.iter().any(|t| t.eq_ignore_ascii_case(table));
        if !self.include_tables.is_empty() && !matches(&self.include_tables) {
            return false;
        }
        !matches(&self.exclude_tables)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.max_workers = Some(workers);
        self.max_processes = Some(workers);
        self
    }

    pub fn with_executor(mut self, executor: ExecutorKind) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_rows(mut self, table: &str, rows: u64) -> Self {
        self.tables.entry(table.to_string()).or_default().rows_to_generate = Some(rows);
        self
    }

    /// Only generate these tables
    pub fn with_include_tables(mut self, tables: &[&str]) -> Self {
        self.include_tables = tables.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_table_strategy(mut self, table: &str, strategy: DuplicateStrategy) -> Self {
        self.tables
            .entry(table.to_string())
            .or_default()
            .duplicate_strategy = Some(strategy);
        self
    }

    pub fn with_column(mut self, table: &str, column: &str, config: ColumnConfig) -> Self {
        self.tables
            .entry(table.to_string())
            .or_default()
            .columns
            .insert(column.to_string(), config);
        self
    }

    /// Check value ranges and that every override names a known table and column.
    pub fn validate(&self, schema: &Schema) -> Result<(), SeedError> {
        check_probability("memory_high_water", self.memory_high_water / 100.0)?;
        check_probability("memory_low_water", self.memory_low_water / 100.0)?;
        if self.memory_low_water > self.memory_high_water {
            return Err(SeedError::Config(
                "memory_low_water must not exceed memory_high_water".to_string(),
            ));
        }
        if self.batch_size == Some(0) || self.max_batch_size == 0 {
            return Err(SeedError::Config("batch size must be at least 1".to_string()));
        }
        if self.min_batch_size > self.max_batch_size {
            return Err(SeedError::Config(
                "min_batch_size must not exceed max_batch_size".to_string(),
            ));
        }
        if self.max_workers == Some(0) || self.max_processes == Some(0) {
            return Err(SeedError::Config("worker count must be at least 1".to_string()));
        }
        if self.unique_attempts == 0 {
            return Err(SeedError::Config(
                "unique_attempts must be at least 1".to_string(),
            ));
        }
        if self.progress_interval == 0 {
            return Err(SeedError::Config(
                "progress_interval must be at least 1".to_string(),
            ));
        }
        if self.analyze_existing_data && self.pattern_sample_size == 0 {
            return Err(SeedError::Config(
                "pattern_sample_size must be at least 1 when analyze_existing_data is set"
                    .to_string(),
            ));
        }

        for name in self.include_tables.iter().chain(&self.exclude_tables) {
            if schema.get_table_id(name).is_none() {
                return Err(SeedError::Config(format!("unknown table in filter: {}", name)));
            }
        }

        for (table_name, table_config) in &self.tables {
            let table = schema.get_table(table_name).ok_or_else(|| {
                SeedError::Config(format!("unknown table in overrides: {}", table_name))
            })?;
            for (column_name, column) in &table_config.columns {
                if table.get_column(column_name).is_none() {
                    return Err(SeedError::Config(format!(
                        "unknown column in overrides: {}.{}",
                        table_name, column_name
                    )));
                }
                let at = format!("{}.{}", table_name, column_name);
                if let Some(p) = column.null_probability {
                    check_probability(&format!("{at}.null_probability"), p)?;
                }
                if let Some(p) = column.reuse_probability {
                    check_probability(&format!("{at}.reuse_probability"), p)?;
                }
                if let (Some(lo), Some(hi)) = (column.min_value, column.max_value) {
                    if lo > hi {
                        return Err(SeedError::Config(format!(
                            "{at}: min_value {lo} exceeds max_value {hi}"
                        )));
                    }
                }
                if let (Some(lo), Some(hi)) = (column.min_length, column.max_length) {
                    if lo > hi {
                        return Err(SeedError::Config(format!(
                            "{at}: min_length {lo} exceeds max_length {hi}"
                        )));
                    }
                }
                if column.pool_size == Some(0) {
                    return Err(SeedError::Config(format!("{at}: pool_size must be at least 1")));
                }
                if column.weighted_values.values().any(|w| !w.is_finite() || *w < 0.0) {
                    return Err(SeedError::Config(format!(
                        "{at}: weights must be non-negative numbers"
                    )));
                }
                if !column.weighted_values.is_empty()
                    && column.weighted_values.values().sum::<f64>() <= 0.0
                {
                    return Err(SeedError::Config(format!("{at}: weights sum to zero")));
                }
            }
        }
        Ok(())
    }
}

fn check_probability(name: &str, p: f64) -> Result<(), SeedError> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(SeedError::Config(format!(
            "{name} must be between 0 and 1 (got {p})"
        )))
    }
}
