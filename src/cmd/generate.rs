//! Generate command CLI handler.

use super::input::{Overrides, Source};
use crate::insert::{Seeder, TableState};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::report::GenerationReport;
use ahash::AHashMap;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

pub(crate) fn run(
    source: Source,
    overrides: Overrides,
    progress: bool,
    json: bool,
) -> anyhow::Result<()> {
    let config = overrides.resolve()?;
    let db = source.open()?;

    if !json {
        if config.dry_run {
            eprintln!("Dry run: generating against {}", source.describe());
        } else {
            eprintln!("Generating into {}", source.describe());
        }
    }

    let mut seeder = Seeder::new(Arc::new(db), config);
    let bars = if progress && !json {
        let bars = TableBars::new()?;
        let sink = Arc::clone(&bars);
        let callback: ProgressSink = Arc::new(move |event: &ProgressEvent| sink.update(event));
        seeder = seeder.with_progress(callback);
        Some(bars)
    } else {
        None
    };

    let report = seeder.run()?;
    if let Some(bars) = bars {
        bars.finish();
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    let failed = report.failed_tables();
    if !failed.is_empty() {
        anyhow::bail!("{} table(s) failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}

/// One progress bar per table, created on the table's first event
struct TableBars {
    multi: MultiProgress,
    style: ProgressStyle,
    bars: Mutex<AHashMap<String, ProgressBar>>,
}

impl TableBars {
    fn new() -> anyhow::Result<Arc<Self>> {
        let style = ProgressStyle::with_template(
            "{spinner:.green} {prefix:>20} [{bar:40.cyan/blue}] {pos}/{len} rows ({per_sec}) {msg}",
        )?
        .progress_chars("█▓▒░  ")
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        Ok(Arc::new(Self {
            multi: MultiProgress::new(),
            style,
            bars: Mutex::new(AHashMap::new()),
        }))
    }

    fn update(&self, event: &ProgressEvent) {
        let mut bars = self.bars.lock();
        let bar = bars.entry(event.table.clone()).or_insert_with(|| {
            let bar = self.multi.add(ProgressBar::new(event.rows_target));
            bar.set_style(self.style.clone());
            bar.set_prefix(event.table.clone());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        });
        bar.set_position(event.rows_done);
        if event.is_complete() {
            bar.finish_with_message("done");
        }
    }

    fn finish(&self) {
        for bar in self.bars.lock().values() {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
    }
}

fn print_summary(report: &GenerationReport) {
    eprintln!();
    if report.interrupted {
        eprintln!("⚠ Run interrupted");
    } else if report.is_complete() {
        eprintln!("✓ Generation completed successfully!");
    } else {
        eprintln!("⚠ Generation finished with shortfalls");
    }

    eprintln!();
    eprintln!("Statistics:");
    eprintln!("  Backend: {}", report.backend);
    eprintln!("  Seed: {}", report.seed);
    eprintln!("  Executor: {} ({} workers)", report.executor, report.workers);
    eprintln!("  Stages: {}", report.stages.len());
    eprintln!(
        "  Rows: {} / {} inserted",
        report.rows_inserted(),
        report.rows_requested()
    );
    eprintln!("  Elapsed time: {:.3}s", report.elapsed_secs);
    if report.elapsed_secs > 0.0 {
        eprintln!("  Throughput: {:.0} rows/s", report.rows_per_second());
    }

    eprintln!();
    eprintln!("Per-table breakdown:");
    for table in &report.tables {
        let marker = match table.state {
            TableState::Done if table.shortfall.is_empty() => "✓",
            TableState::Done => "~",
            _ => "✗",
        };
        eprintln!(
            "  {} {} [{}]: {} / {} rows",
            marker, table.table, table.state, table.rows_inserted, table.rows_requested
        );
        for shortfall in &table.shortfall {
            eprintln!("      short {} rows: {}", shortfall.rows, shortfall.reason);
        }
        if table.self_reference_passes > 0 {
            eprintln!(
                "      self references linked: {} rows",
                table.self_reference_updates
            );
        }
        for error in table.errors.iter().take(3) {
            eprintln!("      error: {}", error);
        }
    }

    let downgrades: Vec<_> = report.downgrades().collect();
    if !downgrades.is_empty() {
        eprintln!();
        eprintln!("Strategy downgrades:");
        for downgrade in downgrades {
            eprintln!("  {}", downgrade);
        }
    }

    let mismatches: Vec<_> = report.mismatches().collect();
    if !mismatches.is_empty() {
        eprintln!();
        eprintln!("Verification mismatches:");
        for mismatch in mismatches {
            eprintln!("  {}", mismatch);
        }
    }
}
