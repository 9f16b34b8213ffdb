//! Plan command CLI handler.

use super::input::{Overrides, Source};
use crate::insert::Seeder;
use std::sync::Arc;

pub(crate) fn run(source: Source, overrides: Overrides, json: bool) -> anyhow::Result<()> {
    let config = overrides.resolve()?;
    let db = source.open()?;
    let seeder = Seeder::new(Arc::new(db), config);
    let report = seeder.plan()?.report(seeder.config());

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Insertion plan for {}", source.describe());
    println!();
    for stage in &report.stages {
        println!("Stage {}:", stage.index);
        for table in &stage.tables {
            println!("  {} ({} rows)", table.name, table.rows);
        }
    }
    if !report.self_referential.is_empty() {
        println!();
        println!("Self-referencing: {}", report.self_referential.join(", "));
    }
    println!();
    println!("Settings:");
    println!("  Executor: {} ({} workers)", report.executor, report.workers);
    println!("  Batch size: {}", report.batch_size);
    println!("  Seed: {}", report.seed);
    println!("  Total rows: {}", report.total_rows);
    Ok(())
}
