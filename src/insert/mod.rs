//! Batch scheduler and parallel inserter.
//!
//! [`Seeder`] drives a whole run:
//!
//! 1. Analyze the schema and plan stages ([`Seeder::plan`])
//! 2. Optionally truncate selected tables, children first
//! 3. For each stage, prepare every eligible table (parent keys, sequence
//!    bases, samples, uniqueness registry) and let the executor drain the
//!    stage's batches
//! 4. Link self-references, verify, and report each table
//!
//! Tables of a stage only start once every parent finished DONE; a table
//! whose parent failed is reported FAILED with `parent_not_done` without
//! being touched.

mod batch;
mod executor;
mod retry;
mod run;
mod self_ref;
mod state;
mod verify;

pub use batch::{BatchJob, BatchPlanner};
pub use executor::{
    executor_for, BatchExecutor, PartitionedExecutor, SharedExecutor, StageContext,
};
pub use retry::{RetryPolicy, MAX_BACKOFF};
pub use run::{RunKeys, StageQueue, TableRun};
pub use self_ref::link_self_references;
pub use state::TableState;
pub use verify::verify_table;

use crate::analyze::ColumnProfile;
use crate::config::{DuplicateStrategy, ExecutorKind, SeedConfig, DEFAULT_SAMPLE_SIZE};
use crate::db::{DatabaseAccess, MemoryDatabase};
use crate::error::SeedError;
use crate::generator::{
    batch_rng, build_table_plan, sequence_columns, CapabilityRegistry, TableInputs,
    UniquenessRegistry,
};
use crate::monitor::{
    default_batch_size, default_process_count, default_worker_count, BatchSizer, SystemTelemetry,
    TelemetrySource,
};
use crate::progress::{ProgressSink, ProgressTracker, StopFlag};
use crate::report::{
    GenerationReport, PlanReport, PlanStage, PlannedTable, ShortfallReason, TableReport,
};
use crate::schema::{GenerationPlan, Schema, SchemaGraph, TableId};
use ahash::AHashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Most parent key tuples loaded per foreign key
pub const PARENT_KEY_LIMIT: usize = 1_000_000;

/// RNG streams outside the batch index range
const PLAN_STREAM: u64 = u64::MAX;
const SELF_REF_STREAM: u64 = u64::MAX - 1;

/// Everything decided before the first row is generated
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub schema: Schema,
    pub plan: GenerationPlan,
    /// Resolved executor, never `Auto`
    pub executor: ExecutorKind,
    pub workers: usize,
    pub batch_size: usize,
    pub seed: u64,
    pub total_rows: u64,
}

impl RunPlan {
    pub fn stage_names(&self) -> Vec<Vec<String>> {
        self.plan
            .stages
            .iter()
            .map(|stage| {
                stage
                    .iter()
                    .map(|&id| self.schema.table_name(id).to_string())
                    .collect()
            })
            .collect()
    }

    /// Stages with the row counts `config` requests
    pub fn report(&self, config: &SeedConfig) -> PlanReport {
        let stages = self
            .stage_names()
            .into_iter()
            .enumerate()
            .map(|(index, names)| PlanStage {
                index,
                tables: names
                    .into_iter()
                    .map(|name| PlannedTable {
                        rows: config.rows_for(&name),
                        name,
                    })
                    .collect(),
            })
            .collect();
        PlanReport {
            executor: self.executor.to_string(),
            workers: self.workers,
            batch_size: self.batch_size,
            seed: self.seed,
            total_rows: self.total_rows,
            stages,
            self_referential: self
                .plan
                .self_referential
                .iter()
                .map(|&id| self.schema.table_name(id).to_string())
                .collect(),
        }
    }
}

/// Populates a database according to a [`SeedConfig`].
pub struct Seeder {
    db: Arc<dyn DatabaseAccess>,
    config: SeedConfig,
    schema: Option<Schema>,
    registry: CapabilityRegistry,
    progress: Option<ProgressSink>,
    stop: StopFlag,
    telemetry: Arc<dyn TelemetrySource>,
}

impl Seeder {
    pub fn new(db: Arc<dyn DatabaseAccess>, config: SeedConfig) -> Self {
        Self {
            db,
            config,
            schema: None,
            registry: CapabilityRegistry::default(),
            progress: None,
            stop: StopFlag::new(),
            telemetry: Arc::new(SystemTelemetry::new()),
        }
    }

    /// Use this schema instead of introspecting the database
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn with_stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySource>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_registry(mut self, registry: CapabilityRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    pub fn config(&self) -> &SeedConfig {
        &self.config
    }

    /// Analyze the schema and resolve run-wide settings.
    ///
    /// Fails on cycles, invalid configuration, and excluded parents that
    /// have no rows to reference.
    pub fn plan(&self) -> Result<RunPlan, SeedError> {
        let schema = match &self.schema {
            Some(schema) => schema.clone(),
            None => self.db.introspect()?,
        };
        schema.validate()?;
        self.config.validate(&schema)?;
        self.check_generator_functions()?;

        let plan = SchemaGraph::with_tables(&schema, |id| {
            self.config.is_selected(schema.table_name(id))
        })
        .generation_plan()?;
        self.check_excluded_parents(&schema, &plan)?;

        let total_rows: u64 = plan
            .insertion_order()
            .iter()
            .map(|&id| self.config.rows_for(schema.table_name(id)))
            .sum();
        let batch_size = self
            .config
            .batch_size
            .unwrap_or_else(|| default_batch_size(self.telemetry.sample().total_memory))
            .min(self.config.max_batch_size)
            .max(1);
        let (executor, workers) = self.resolve_executor(total_rows);
        let seed = self.config.seed.unwrap_or_else(rand::random);

        Ok(RunPlan {
            schema,
            plan,
            executor,
            workers,
            batch_size,
            seed,
            total_rows,
        })
    }

    fn resolve_executor(&self, total_rows: u64) -> (ExecutorKind, usize) {
        let workers = self.config.max_workers.unwrap_or_else(default_worker_count);
        let processes = self
            .config
            .max_processes
            .unwrap_or_else(default_process_count);
        match self.config.executor {
            ExecutorKind::Threads => (ExecutorKind::Threads, workers),
            ExecutorKind::Partitioned => (ExecutorKind::Partitioned, processes),
            ExecutorKind::Auto => {
                if total_rows >= self.config.partition_threshold && processes > 1 {
                    (ExecutorKind::Partitioned, processes)
                } else {
                    (ExecutorKind::Threads, workers)
                }
            }
        }
    }

    fn check_generator_functions(&self) -> Result<(), SeedError> {
        for (table, table_config) in &self.config.tables {
            for (column, column_config) in &table_config.columns {
                if let Some(name) = &column_config.generator_function {
                    if !self.registry.contains(name) {
                        return Err(SeedError::Config(format!(
                            "{}.{}: unknown generator function '{}'",
                            table, column, name
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn check_excluded_parents(
        &self,
        schema: &Schema,
        plan: &GenerationPlan,
    ) -> Result<(), SeedError> {
        for id in plan.insertion_order() {
            let Some(table) = schema.table(id) else {
                continue;
            };
            for fk in &table.foreign_keys {
                let Some(parent) = fk.referenced_table_id else {
                    continue;
                };
                if parent == id || self.config.is_selected(schema.table_name(parent)) {
                    continue;
                }
                if self.db.count_rows(&fk.referenced_table)? == 0 {
                    return Err(SeedError::SchemaAnalysis(format!(
                        "{} references {}, which is excluded from the run and has no rows",
                        table.name, fk.referenced_table
                    )));
                }
            }
        }
        Ok(())
    }

    /// Run the whole pipeline and report every planned table.
    pub fn run(&self) -> Result<GenerationReport, SeedError> {
        let started = Instant::now();
        let run_plan = self.plan()?;
        let schema = &run_plan.schema;
        let config = &self.config;

        let target: Arc<dyn DatabaseAccess> = if config.dry_run {
            let external: Vec<String> = schema
                .iter()
                .filter(|t| !config.is_selected(&t.name))
                .map(|t| t.name.clone())
                .collect();
            Arc::new(MemoryDatabase::from_schema(schema.clone()).with_external_tables(external))
        } else {
            Arc::clone(&self.db)
        };

        info!(
            backend = target.name(),
            tables = run_plan.plan.table_count(),
            rows = run_plan.total_rows,
            executor = %run_plan.executor,
            workers = run_plan.workers,
            batch_size = run_plan.batch_size,
            seed = run_plan.seed,
            "starting run"
        );

        if config.truncate_existing && !config.dry_run {
            for id in run_plan.plan.insertion_order().into_iter().rev() {
                let name = schema.table_name(id);
                info!(table = %name, "truncating");
                target.truncate(name)?;
            }
        }

        let executor = executor_for(run_plan.executor, run_plan.workers);
        // An explicit batch size is also the ceiling for growth
        let ceiling = if config.batch_size.is_some() {
            run_plan.batch_size
        } else {
            config.max_batch_size
        };
        let sizer = Mutex::new(BatchSizer::new(
            run_plan.batch_size,
            config.min_batch_size,
            ceiling,
            config.memory_high_water,
            config.memory_low_water,
        ));
        let retry = RetryPolicy::new(config.insert_retries, config.retry_backoff_ms);

        let mut reports = Vec::with_capacity(run_plan.plan.table_count());
        let mut states: AHashMap<TableId, TableState> = AHashMap::new();

        for (stage_idx, stage) in run_plan.plan.stages.iter().enumerate() {
            let mut runs = Vec::with_capacity(stage.len());
            for &id in stage {
                if self.stop.is_stopped() {
                    let report = self.skipped(
                        schema,
                        id,
                        stage_idx,
                        TableState::Interrupted,
                        ShortfallReason::Interrupted,
                    );
                    states.insert(id, report.state);
                    reports.push(report);
                    continue;
                }
                if let Some(parent) = unfinished_parent(schema, id, &states) {
                    warn!(
                        table = %schema.table_name(id),
                        parent = %schema.table_name(parent),
                        "parent table not done, skipping"
                    );
                    let mut report = self.skipped(
                        schema,
                        id,
                        stage_idx,
                        TableState::Failed,
                        ShortfallReason::ParentNotDone,
                    );
                    report
                        .errors
                        .push(format!("parent table {} not done", schema.table_name(parent)));
                    states.insert(id, report.state);
                    reports.push(report);
                    continue;
                }
                match self.prepare_table(schema, id, stage_idx, target.as_ref(), run_plan.seed) {
                    Ok(run) => runs.push(Arc::new(run)),
                    Err(SeedError::Database(err)) => {
                        error!(table = %schema.table_name(id), error = %err, "could not prepare table");
                        let mut report = self.skipped(
                            schema,
                            id,
                            stage_idx,
                            TableState::Failed,
                            ShortfallReason::BatchFailed,
                        );
                        report.errors.push(err.to_string());
                        states.insert(id, report.state);
                        reports.push(report);
                    }
                    Err(other) => return Err(other),
                }
            }
            if runs.is_empty() {
                continue;
            }

            for run in &runs {
                run.transition(TableState::Generating);
            }
            let ctx = StageContext {
                db: target.as_ref(),
                tables: &runs,
                queue: StageQueue::new(&runs, &sizer, self.telemetry.as_ref(), &self.stop),
                retry,
                seed: run_plan.seed,
            };
            executor.run_stage(&ctx);

            for run in &runs {
                let report = self.finish_table(schema, run, target.as_ref(), run_plan.seed);
                states.insert(run.id, report.state);
                reports.push(report);
            }
        }

        let report = GenerationReport {
            backend: target.name().to_string(),
            seed: run_plan.seed,
            executor: executor.kind().to_string(),
            workers: executor.workers(),
            dry_run: config.dry_run,
            interrupted: self.stop.is_stopped(),
            stages: run_plan.stage_names(),
            tables: reports,
            elapsed_secs: started.elapsed().as_secs_f64(),
        };
        info!(
            requested = report.rows_requested(),
            inserted = report.rows_inserted(),
            elapsed_secs = report.elapsed_secs,
            "run finished"
        );
        Ok(report)
    }

    /// Report for a table that never started
    fn skipped(
        &self,
        schema: &Schema,
        id: TableId,
        stage: usize,
        state: TableState,
        reason: ShortfallReason,
    ) -> TableReport {
        let name = schema.table_name(id);
        let rows = self.config.rows_for(name);
        let mut report = TableReport::new(name, rows);
        report.state = state;
        report.stage = Some(stage);
        report.add_shortfall(reason, rows);
        report
    }

    /// Load everything a table's plan depends on and build its run state
    fn prepare_table(
        &self,
        schema: &Schema,
        id: TableId,
        stage: usize,
        db: &dyn DatabaseAccess,
        seed: u64,
    ) -> Result<TableRun, SeedError> {
        let table = schema
            .table(id)
            .ok_or_else(|| SeedError::SchemaAnalysis(format!("unknown table id {}", id)))?;
        let config = &self.config;
        let rows_before = db.count_rows(&table.name)?;
        let mut inputs = TableInputs::default();

        for (fk_idx, fk) in table.foreign_keys.iter().enumerate() {
            let Some(parent) = fk.referenced_table_id else {
                continue;
            };
            if parent == id {
                continue;
            }
            // Excluded parents are read from the source database
            let reader = if config.is_selected(schema.table_name(parent)) {
                db
            } else {
                self.db.as_ref()
            };
            let keys = reader.column_values(
                &fk.referenced_table,
                &fk.referenced_columns,
                Some(PARENT_KEY_LIMIT),
            )?;
            debug!(table = %table.name, parent = %fk.referenced_table, keys = keys.len(), "parent keys loaded");
            inputs.parent_keys.insert(fk_idx, Arc::new(keys));
        }

        for slot in sequence_columns(table, config) {
            let base = db
                .max_integer(&table.name, &table.columns[slot].name)?
                .unwrap_or(0);
            inputs.sequence_base.insert(slot, base);
        }

        let reuses = table.columns.iter().any(|c| {
            config.requested_strategy(&table.name, &c.name) == DuplicateStrategy::FastDataReuse
        });
        if reuses && rows_before > 0 {
            let sample_size = table
                .columns
                .iter()
                .filter_map(|c| config.get_column_config(&table.name, &c.name))
                .filter_map(|c| c.sample_size)
                .max()
                .unwrap_or(DEFAULT_SAMPLE_SIZE);
            let sample = db.sample_rows(&table.name, &table.column_names(), sample_size)?;
            debug!(table = %table.name, rows = sample.len(), "sampled existing rows");
            inputs.sample = Some(Arc::new(sample));
        }

        if config.analyze_existing_data && rows_before > 0 {
            let sample =
                db.sample_rows(&table.name, &table.column_names(), config.pattern_sample_size)?;
            for index in 0..table.columns.len() {
                let profile = ColumnProfile::from_rows(&sample, index);
                if profile.repeats() {
                    inputs.patterns.insert(index, profile);
                }
            }
            debug!(
                table = %table.name,
                rows = sample.len(),
                columns = inputs.patterns.len(),
                "existing value patterns"
            );
        }

        let mut rng = batch_rng(seed, id, PLAN_STREAM);
        let (plan, downgrades) =
            build_table_plan(schema, id, config, &self.registry, &inputs, &mut rng)?;

        let registry = UniquenessRegistry::for_table(table, &plan.sequence_columns);
        if rows_before > 0 {
            for key in 0..registry.key_count() {
                let columns: Vec<String> = registry
                    .key_slots(key)
                    .iter()
                    .map(|&s| table.columns[s].name.clone())
                    .collect();
                registry.seed(key, db.column_values(&table.name, &columns, None)?);
            }
        }

        let progress = ProgressTracker::new(
            table.name.clone(),
            plan.rows_requested,
            config.progress_interval,
            self.progress.clone(),
        );
        Ok(TableRun::new(stage, plan, registry, rows_before, downgrades, progress))
    }

    /// Self-reference pass, verification and the final state of a table
    fn finish_table(
        &self,
        schema: &Schema,
        run: &TableRun,
        db: &dyn DatabaseAccess,
        seed: u64,
    ) -> TableReport {
        if !run.is_failed() && run.is_dispatched() {
            run.transition(TableState::Inserting);

            if !run.plan.self_refs.is_empty() && run.rows_inserted() > 0 {
                let mut rng = batch_rng(seed, run.id, SELF_REF_STREAM);
                if let Err(err) = link_self_references(db, run, &mut rng) {
                    error!(table = %run.name, error = %err, "self-reference pass failed");
                    run.push_error(format!("self-reference pass failed: {}", err));
                }
            }

            if self.config.verify {
                run.transition(TableState::Verifying);
                if let Some(table) = schema.table(run.id) {
                    match verify_table(db, table, run, self.config.verify_sample_size) {
                        Ok(mismatches) => {
                            for mismatch in mismatches {
                                run.add_mismatch(mismatch);
                            }
                        }
                        Err(err) => run.push_error(format!("verification failed: {}", err)),
                    }
                }
            }
            run.transition(TableState::Done);
        }
        run.report(self.stop.is_stopped())
    }
}

/// A parent inside the run that did not reach DONE
fn unfinished_parent(
    schema: &Schema,
    id: TableId,
    states: &AHashMap<TableId, TableState>,
) -> Option<TableId> {
    let table = schema.table(id)?;
    table
        .foreign_keys
        .iter()
        .filter_map(|fk| fk.referenced_table_id)
        .filter(|&parent| parent != id)
        .find(|parent| states.get(parent).is_some_and(|s| *s != TableState::Done))
}
