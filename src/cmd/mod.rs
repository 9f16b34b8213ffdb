mod analyze;
mod generate;
mod init_config;
mod input;
mod plan;
mod schema;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate as generate_completions, Shell};
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sql-seeder")]
#[command(version)]
#[command(
    about = "Fill a database with constraint-aware synthetic data, parents before children",
    long_about = None
)]
pub struct Cli {
    /// Log debug output (RUST_LOG overrides)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate rows for every selected table and insert them
    Generate {
        /// DuckDB database file (in-memory database if omitted; requires --ddl)
        database: Option<PathBuf>,

        /// Execute this DDL file against the database before generating
        #[arg(long)]
        ddl: Option<PathBuf>,

        /// YAML or JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Rows per table when the configuration names none
        #[arg(short, long)]
        rows: Option<u64>,

        /// Per-table row counts (e.g., users=1000,orders=5000)
        #[arg(long)]
        table_rows: Option<String>,

        /// Random seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,

        /// Initial rows per batch (also the ceiling for adaptive growth)
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Number of workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Executor: auto, threads, or partitioned
        #[arg(long)]
        executor: Option<String>,

        /// Default duplicate strategy for columns without an override
        #[arg(long)]
        strategy: Option<String>,

        /// Only generate these tables (comma-separated)
        #[arg(short, long)]
        tables: Option<String>,

        /// Skip these tables (comma-separated)
        #[arg(short, long)]
        exclude: Option<String>,

        /// Delete existing rows of the selected tables first
        #[arg(long)]
        truncate: bool,

        /// Generate into an in-memory copy of the schema, leaving the database untouched
        #[arg(long)]
        dry_run: bool,

        /// Skip post-insert verification
        #[arg(long)]
        no_verify: bool,

        /// Reuse values common in existing rows when fabricating columns
        #[arg(long)]
        analyze_existing: bool,

        /// Show a progress bar per table
        #[arg(short, long)]
        progress: bool,

        /// Output the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the insertion stages and resolved run settings without generating
    Plan {
        /// DuckDB database file (in-memory database if omitted; requires --ddl)
        database: Option<PathBuf>,

        /// Execute this DDL file against the database before planning
        #[arg(long)]
        ddl: Option<PathBuf>,

        /// YAML or JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Rows per table when the configuration names none
        #[arg(short, long)]
        rows: Option<u64>,

        /// Only plan these tables (comma-separated)
        #[arg(short, long)]
        tables: Option<String>,

        /// Skip these tables (comma-separated)
        #[arg(short, long)]
        exclude: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report row counts, column statistics and detected value patterns
    Analyze {
        /// DuckDB database file (in-memory database if omitted; requires --ddl)
        database: Option<PathBuf>,

        /// Execute this DDL file against the database before analyzing
        #[arg(long)]
        ddl: Option<PathBuf>,

        /// Only analyze these tables (comma-separated)
        #[arg(short, long)]
        tables: Option<String>,

        /// Skip these tables (comma-separated)
        #[arg(short, long)]
        exclude: Option<String>,

        /// Rows sampled per table for value patterns (0 skips sampling)
        #[arg(short, long, default_value_t = 1000)]
        sample_size: usize,

        /// Save the analysis to a file (JSON for .json, YAML otherwise)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a commented starter configuration
    InitConfig {
        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print JSON Schemas for the configuration file and JSON outputs
    Schema {
        /// Only this schema (analysis, config, plan, report)
        #[arg(short, long)]
        name: Option<String>,

        /// Write <name>.schema.json files into this directory instead of stdout
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// List available schema names
        #[arg(long)]
        list: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Generate {
            database,
            ddl,
            config,
            rows,
            table_rows,
            seed,
            batch_size,
            workers,
            executor,
            strategy,
            tables,
            exclude,
            truncate,
            dry_run,
            no_verify,
            analyze_existing,
            progress,
            json,
        } => generate::run(
            input::Source { database, ddl },
            input::Overrides {
                config,
                rows,
                table_rows,
                seed,
                batch_size,
                workers,
                executor,
                strategy,
                tables,
                exclude,
                truncate,
                dry_run,
                no_verify,
                analyze_existing,
            },
            progress,
            json,
        ),
        Commands::Plan {
            database,
            ddl,
            config,
            rows,
            tables,
            exclude,
            json,
        } => plan::run(
            input::Source { database, ddl },
            input::Overrides {
                config,
                rows,
                tables,
                exclude,
                ..Default::default()
            },
            json,
        ),
        Commands::Analyze {
            database,
            ddl,
            tables,
            exclude,
            sample_size,
            output,
            json,
        } => analyze::run(
            input::Source { database, ddl },
            input::Overrides {
                tables,
                exclude,
                ..Default::default()
            },
            sample_size,
            output,
            json,
        ),
        Commands::InitConfig { output, force } => init_config::run(output, force),
        Commands::Schema {
            name,
            output_dir,
            list,
        } => schema::run(name, output_dir, list),
        Commands::Completions { shell } => {
            generate_completions(shell, &mut Cli::command(), "sql-seeder", &mut io::stdout());
            Ok(())
        }
    }
}
