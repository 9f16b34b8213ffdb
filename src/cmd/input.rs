//! Database and configuration inputs shared by the commands that open a database.

use crate::config::{DuplicateStrategy, ExecutorKind, SeedConfig};
use crate::db::DuckDbDatabase;
use anyhow::Context;
use std::fs;
use std::path::PathBuf;

/// Where the schema and rows live
pub(crate) struct Source {
    pub database: Option<PathBuf>,
    pub ddl: Option<PathBuf>,
}

impl Source {
    /// Open the database and apply the DDL file, if any
    pub fn open(&self) -> anyhow::Result<DuckDbDatabase> {
        let db = match &self.database {
            Some(path) => DuckDbDatabase::open(path)
                .with_context(|| format!("Failed to open database: {}", path.display()))?,
            None => {
                if self.ddl.is_none() {
                    anyhow::bail!("Must specify a database file, --ddl, or both");
                }
                DuckDbDatabase::open_in_memory()?
            }
        };

        if let Some(ddl) = &self.ddl {
            let sql = fs::read_to_string(ddl)
                .with_context(|| format!("Failed to read DDL file: {}", ddl.display()))?;
            db.execute_batch(&sql)
                .with_context(|| format!("Failed to apply DDL file: {}", ddl.display()))?;
        }
        Ok(db)
    }

    pub fn describe(&self) -> String {
        match (&self.database, &self.ddl) {
            (Some(db), _) => db.display().to_string(),
            (None, Some(ddl)) => format!("in-memory ({})", ddl.display()),
            (None, None) => "in-memory".to_string(),
        }
    }
}

/// Command-line settings layered over the configuration file
#[derive(Default)]
pub(crate) struct Overrides {
    pub config: Option<PathBuf>,
    pub rows: Option<u64>,
    pub table_rows: Option<String>,
    pub seed: Option<u64>,
    pub batch_size: Option<usize>,
    pub workers: Option<usize>,
    pub executor: Option<String>,
    pub strategy: Option<String>,
    pub tables: Option<String>,
    pub exclude: Option<String>,
    pub truncate: bool,
    pub dry_run: bool,
    pub no_verify: bool,
    pub analyze_existing: bool,
}

impl Overrides {
    /// Load the configuration file (or defaults) and apply every override
    pub fn resolve(self) -> anyhow::Result<SeedConfig> {
        let mut config = match &self.config {
            Some(path) => SeedConfig::load(path)?,
            None => SeedConfig::default(),
        };

        if let Some(rows) = self.rows {
            config.default_rows = rows;
        }
        if let Some(spec) = &self.table_rows {
            for (table, rows) in parse_table_rows(spec)? {
                config = config.with_rows(&table, rows);
            }
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if let Some(batch_size) = self.batch_size {
            if batch_size == 0 {
                anyhow::bail!("--batch-size must be greater than 0");
            }
            config = config.with_batch_size(batch_size);
        }
        if let Some(workers) = self.workers {
            if workers == 0 {
                anyhow::bail!("--workers must be greater than 0");
            }
            config = config.with_workers(workers);
        }
        if let Some(executor) = &self.executor {
            let kind = executor
                .parse::<ExecutorKind>()
                .map_err(|e| anyhow::anyhow!("{}", e))?;
            config = config.with_executor(kind);
        }
        if let Some(strategy) = &self.strategy {
            config.duplicate_strategy = strategy
                .parse::<DuplicateStrategy>()
                .map_err(|e| anyhow::anyhow!("{}", e))?;
        }
        if let Some(tables) = &self.tables {
            config.include_tables = split_list(tables);
        }
        if let Some(exclude) = &self.exclude {
            config.exclude_tables.extend(split_list(exclude));
        }
        config.truncate_existing |= self.truncate;
        config.dry_run |= self.dry_run;
        if self.no_verify {
            config.verify = false;
        }
        config.analyze_existing_data |= self.analyze_existing;
        Ok(config)
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Parse `users=1000,orders=5000`
pub(crate) fn parse_table_rows(spec: &str) -> anyhow::Result<Vec<(String, u64)>> {
    split_list(spec)
        .into_iter()
        .map(|entry| {
            let (table, rows) = entry
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("Expected table=rows, got '{}'", entry))?;
            let rows = rows
                .trim()
                .parse::<u64>()
                .with_context(|| format!("Invalid row count for {}: '{}'", table, rows))?;
            Ok((table.trim().to_string(), rows))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_table_rows() {
        let parsed = parse_table_rows("users=10, orders = 25").unwrap();
        assert_eq!(
            parsed,
            vec![("users".to_string(), 10), ("orders".to_string(), 25)]
        );
        assert!(parse_table_rows("users").is_err());
        assert!(parse_table_rows("users=many").is_err());
    }

    #[test]
    fn test_overrides_apply_over_defaults() {
        let config = Overrides {
            rows: Some(7),
            table_rows: Some("orders=3".to_string()),
            seed: Some(42),
            executor: Some("threads".to_string()),
            strategy: Some("smart-duplicates".to_string()),
            exclude: Some("audit".to_string()),
            no_verify: true,
            analyze_existing: true,
            ..Default::default()
        }
        .resolve()
        .unwrap();

        assert_eq!(config.default_rows, 7);
        assert_eq!(config.rows_for("orders"), 3);
        assert_eq!(config.rows_for("users"), 7);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.executor, ExecutorKind::Threads);
        assert_eq!(config.duplicate_strategy, DuplicateStrategy::SmartDuplicates);
        assert!(!config.is_selected("audit"));
        assert!(!config.verify);
        assert!(config.analyze_existing_data);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let result = Overrides {
            batch_size: Some(0),
            ..Default::default()
        }
        .resolve();
        assert!(result.is_err());
    }

    #[test]
    fn test_source_requires_database_or_ddl() {
        let source = Source {
            database: None,
            ddl: None,
        };
        assert!(source.open().is_err());
    }
}
