//! Existing-data analysis.
//!
//! Reads the schema and a sample of every selected table and reports row
//! counts, column statistics and the value pattern each column appears to
//! follow. [`ColumnProfile`] is also what generation uses to mix values
//! common in existing rows into fresh ones.

use crate::config::SeedConfig;
use crate::db::DatabaseAccess;
use crate::error::SeedError;
use crate::generator::{detect_category, Row, Value};
use crate::schema::{Column, ColumnType, TableSchema};
use ahash::AHashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info};

/// Most common values kept per column
pub const COMMON_VALUES: usize = 10;

/// Example values listed per column
const SAMPLE_VALUES: usize = 5;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[A-Za-z]{2,}$").unwrap());

static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://[^\s/$.?#][^\s]*$").unwrap());

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .unwrap()
});

static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[\d\s().-]{7,20}$").unwrap());

/// Value frequencies of one column in a sample
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnProfile {
    pub sampled: usize,
    pub nulls: usize,
    pub distinct: usize,
    /// Most common non-NULL values, most frequent first
    pub common: Vec<(Value, u64)>,
}

impl ColumnProfile {
    pub fn from_values<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        let mut counts: AHashMap<&Value, u64> = AHashMap::new();
        let mut sampled = 0;
        let mut nulls = 0;
        for value in values {
            sampled += 1;
            if value.is_null() {
                nulls += 1;
            } else {
                *counts.entry(value).or_default() += 1;
            }
        }

        let distinct = counts.len();
        let mut common: Vec<(Value, u64)> =
            counts.into_iter().map(|(v, n)| (v.clone(), n)).collect();
        // Ties broken by value so equal samples give equal profiles
        common.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        common.truncate(COMMON_VALUES);

        Self {
            sampled,
            nulls,
            distinct,
            common,
        }
    }

    /// Profile of column `index` across sampled rows
    pub fn from_rows(rows: &[Row], index: usize) -> Self {
        Self::from_values(rows.iter().filter_map(|row| row.get(index)))
    }

    pub fn non_null(&self) -> usize {
        self.sampled - self.nulls
    }

    /// Share of the non-NULL sample taken up by the common values
    pub fn common_share(&self) -> f64 {
        let non_null = self.non_null();
        if non_null == 0 {
            return 0.0;
        }
        let covered: u64 = self.common.iter().map(|(_, n)| n).sum();
        covered as f64 / non_null as f64
    }

    /// At most half of the sampled values are distinct
    pub fn repeats(&self) -> bool {
        let non_null = self.non_null();
        non_null > 0 && self.distinct * 2 <= non_null
    }
}

/// The pattern a column follows: read from its values when every sampled
/// value agrees on one, from its name and type otherwise.
pub fn detect_pattern<'a>(
    column: &Column,
    values: impl IntoIterator<Item = &'a Value>,
) -> Option<String> {
    match column.col_type {
        ColumnType::Uuid => return Some("uuid".to_string()),
        ColumnType::Json => return Some("json".to_string()),
        _ => {}
    }

    let texts: Vec<&str> = values
        .into_iter()
        .filter_map(|v| match v {
            Value::Text(s) | Value::Uuid(s) => Some(s.as_str()),
            _ => None,
        })
        .collect();
    if !texts.is_empty() {
        let patterns: [(&str, &Regex); 4] = [
            ("email", &EMAIL_RE),
            ("url", &URL_RE),
            ("uuid", &UUID_RE),
            ("phone", &PHONE_RE),
        ];
        for (name, re) in patterns {
            if texts.iter().all(|t| re.is_match(t.trim())) {
                return Some(name.to_string());
            }
        }
    }

    detect_category(&column.name, &column.col_type).map(str::to_string)
}

/// A value and how often it was sampled
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ValueCount {
    pub value: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ColumnAnalysis {
    pub name: String,
    pub data_type: String,
    pub max_length: Option<u32>,
    pub nullable: bool,
    pub constraints: Vec<String>,
    pub detected_pattern: Option<String>,
    /// NULL share of the sample
    pub null_fraction: f64,
    pub distinct_values: usize,
    pub common_values: Vec<ValueCount>,
    pub sample_values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ForeignKeyAnalysis {
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct TableAnalysis {
    pub name: String,
    pub row_count: u64,
    pub sampled_rows: usize,
    pub columns: Vec<ColumnAnalysis>,
    pub foreign_keys: Vec<ForeignKeyAnalysis>,
}

/// Output of the `analyze` command
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct AnalysisReport {
    pub backend: String,
    pub tables: Vec<TableAnalysis>,
    pub total_rows: u64,
    pub elapsed_secs: f64,
}

impl AnalysisReport {
    pub fn table(&self, name: &str) -> Option<&TableAnalysis> {
        self.tables.iter().find(|t| t.name == name)
    }
}

impl TableAnalysis {
    pub fn column(&self, name: &str) -> Option<&ColumnAnalysis> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Analyze every table `config` selects. Rows are sampled only when
/// `sample_size` is non-zero.
pub fn analyze_database(
    db: &dyn DatabaseAccess,
    config: &SeedConfig,
    sample_size: usize,
) -> Result<AnalysisReport, SeedError> {
    let start = Instant::now();
    let schema = db.introspect()?;
    for name in config.include_tables.iter().chain(&config.exclude_tables) {
        if schema.get_table_id(name).is_none() {
            return Err(SeedError::Config(format!("unknown table in filter: {}", name)));
        }
    }

    let mut tables = Vec::new();
    for table in schema.iter().filter(|t| config.is_selected(&t.name)) {
        let row_count = db.count_rows(&table.name)?;
        let sample = if sample_size > 0 && row_count > 0 {
            db.sample_rows(&table.name, &table.column_names(), sample_size)?
        } else {
            Vec::new()
        };
        debug!(table = %table.name, rows = row_count, sampled = sample.len(), "table analyzed");
        tables.push(analyze_table(table, row_count, &sample));
    }

    let total_rows = tables.iter().map(|t| t.row_count).sum();
    info!(tables = tables.len(), rows = total_rows, "analysis complete");
    Ok(AnalysisReport {
        backend: db.name().to_string(),
        tables,
        total_rows,
        elapsed_secs: start.elapsed().as_secs_f64(),
    })
}

fn analyze_table(table: &TableSchema, row_count: u64, sample: &[Row]) -> TableAnalysis {
    let columns = table
        .columns
        .iter()
        .enumerate()
        .map(|(index, column)| {
            let profile = ColumnProfile::from_rows(sample, index);
            let values = sample.iter().filter_map(|row| row.get(index));
            let null_fraction = if profile.sampled == 0 {
                0.0
            } else {
                profile.nulls as f64 / profile.sampled as f64
            };
            ColumnAnalysis {
                name: column.name.clone(),
                data_type: column.col_type.as_str().to_string(),
                max_length: column.max_length,
                nullable: column.is_nullable,
                constraints: table
                    .class(column.ordinal)
                    .kinds()
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
                detected_pattern: detect_pattern(column, values.clone()),
                null_fraction,
                distinct_values: profile.distinct,
                common_values: profile
                    .common
                    .iter()
                    .filter(|(_, n)| *n > 1)
                    .map(|(v, n)| ValueCount {
                        value: v.to_string(),
                        count: *n,
                    })
                    .collect(),
                sample_values: values
                    .filter(|v| !v.is_null())
                    .take(SAMPLE_VALUES)
                    .map(ToString::to_string)
                    .collect(),
            }
        })
        .collect();

    let foreign_keys = table
        .foreign_keys
        .iter()
        .map(|fk| ForeignKeyAnalysis {
            name: fk.name.clone(),
            columns: fk.column_names.clone(),
            referenced_table: fk.referenced_table.clone(),
            referenced_columns: fk.referenced_columns.clone(),
        })
        .collect();

    TableAnalysis {
        name: table.name.clone(),
        row_count,
        sampled_rows: sample.len(),
        columns,
        foreign_keys,
    }
}
