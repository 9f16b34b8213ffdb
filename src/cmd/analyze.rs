//! Analyze command CLI handler.

use super::input::{Overrides, Source};
use crate::analyze::{analyze_database, AnalysisReport};
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};

pub(crate) fn run(
    source: Source,
    overrides: Overrides,
    sample_size: usize,
    output: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    let config = overrides.resolve()?;
    let db = source.open()?;
    let report = analyze_database(&db, &config, sample_size)?;

    if let Some(path) = &output {
        write_report(&report, path)?;
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Analysis of {}", source.describe());
    println!();
    if report.tables.is_empty() {
        println!("No tables found.");
        return Ok(());
    }

    println!(
        "{:<32} {:>12} {:>8} {:>5}  {}",
        "Table", "Rows", "Columns", "FKs", "Patterns"
    );
    println!("{}", "─".repeat(80));
    for table in &report.tables {
        let patterns: Vec<String> = table
            .columns
            .iter()
            .filter_map(|c| c.detected_pattern.as_ref().map(|p| format!("{}={}", c.name, p)))
            .collect();
        println!(
            "{:<32} {:>12} {:>8} {:>5}  {}",
            truncate_string(&table.name, 32),
            table.row_count,
            table.columns.len(),
            table.foreign_keys.len(),
            patterns.join(", ")
        );
    }
    println!("{}", "─".repeat(80));
    println!("{:<32} {:>12}", "TOTAL", report.total_rows);

    if let Some(path) = output {
        println!();
        println!("Analysis saved to: {}", path.display());
    }
    Ok(())
}

/// JSON for a `.json` path, YAML otherwise
fn write_report(report: &AnalysisReport, path: &Path) -> anyhow::Result<()> {
    let is_json = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let content = if is_json {
        serde_json::to_string_pretty(report)?
    } else {
        serde_yaml_ng::to_string(report)?
    };
    fs::write(path, content)
        .with_context(|| format!("Failed to write analysis: {}", path.display()))
}

fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("orders", 32), "orders");
        assert_eq!(truncate_string("abcdefghij", 8), "abcde...");
    }
}
