//! Worker pools that execute the batches of a stage.
//!
//! Both executors run the same worker loop over the same [`StageQueue`];
//! they differ only in the generation scopes each worker gets:
//!
//! - [`SharedExecutor`]: every worker shares each table's uniqueness
//!   registry and value pools
//! - [`PartitionedExecutor`]: worker `i` of `n` owns the slice of each
//!   table's designated key whose tuple hashes are `i` modulo `n`, plus
//!   private pools; any further keys are claimed in the shared registry

use super::retry::RetryPolicy;
use super::run::{StageQueue, TableRun};
use super::BatchJob;
use crate::config::ExecutorKind;
use crate::db::DatabaseAccess;
use crate::generator::{batch_rng, GenerationScope, Partition};
use std::sync::Arc;
use std::thread;
use tracing::{debug, trace};

/// What the workers of one stage share
pub struct StageContext<'a> {
    pub db: &'a dyn DatabaseAccess,
    pub tables: &'a [Arc<TableRun>],
    pub queue: StageQueue<'a>,
    pub retry: RetryPolicy,
    pub seed: u64,
}

/// A bounded pool of workers draining a stage's queue
pub trait BatchExecutor: Send + Sync {
    fn kind(&self) -> ExecutorKind;

    fn workers(&self) -> usize;

    /// Generation scopes of worker `worker`, one per table of the stage
    fn scopes(&self, worker: usize, tables: &[Arc<TableRun>]) -> Vec<GenerationScope>;

    /// Run workers until the stage queue is empty. In-flight batches always
    /// finish; the queue stops handing out jobs on cancellation.
    fn run_stage(&self, ctx: &StageContext<'_>) {
        let workers = self.workers().max(1);
        debug!(workers, executor = %self.kind(), tables = ctx.tables.len(), "running stage");
        thread::scope(|s| {
            for worker in 0..workers {
                let scopes = self.scopes(worker, ctx.tables);
                s.spawn(move || work(ctx, &scopes));
            }
        });
    }
}

pub struct SharedExecutor {
    workers: usize,
}

impl SharedExecutor {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }
}

impl BatchExecutor for SharedExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Threads
    }

    fn workers(&self) -> usize {
        self.workers
    }

    fn scopes(&self, _worker: usize, tables: &[Arc<TableRun>]) -> Vec<GenerationScope> {
        tables
            .iter()
            .map(|t| GenerationScope::shared(Arc::clone(&t.plan), Arc::clone(&t.registry)))
            .collect()
    }
}

pub struct PartitionedExecutor {
    workers: usize,
}

impl PartitionedExecutor {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }
}

impl BatchExecutor for PartitionedExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Partitioned
    }

    fn workers(&self) -> usize {
        self.workers
    }

    fn scopes(&self, worker: usize, tables: &[Arc<TableRun>]) -> Vec<GenerationScope> {
        let partition = Partition {
            index: worker,
            count: self.workers,
        };
        tables
            .iter()
            .map(|t| {
                GenerationScope::isolated(Arc::clone(&t.plan), Arc::clone(&t.registry), partition)
            })
            .collect()
    }
}

/// Executor for a resolved kind. `Auto` must be resolved by the caller.
pub fn executor_for(kind: ExecutorKind, workers: usize) -> Box<dyn BatchExecutor> {
    match kind {
        ExecutorKind::Partitioned => Box::new(PartitionedExecutor::new(workers)),
        ExecutorKind::Threads | ExecutorKind::Auto => Box::new(SharedExecutor::new(workers)),
    }
}

/// Worker loop: take a job, generate its rows, write them.
fn work(ctx: &StageContext<'_>, scopes: &[GenerationScope]) {
    let mut epoch = ctx.queue.pressure_epoch();
    while let Some((slot, job)) = ctx.queue.next_job() {
        let current = ctx.queue.pressure_epoch();
        if current != epoch {
            for scope in scopes {
                scope.relieve();
            }
            epoch = current;
        }
        let table = &ctx.tables[slot];
        run_batch(ctx, table, &scopes[slot], &job);
        table.complete_job();
    }
}

fn run_batch(ctx: &StageContext<'_>, table: &TableRun, scope: &GenerationScope, job: &BatchJob) {
    let mut rng = batch_rng(ctx.seed, job.table, job.index);
    let batch = scope.generate_rows(job.start, job.rows, &mut rng);
    table.record_generation(&batch);
    if batch.rows.is_empty() {
        return;
    }

    trace!(table = %table.name, batch = job.index, rows = batch.rows.len(), "writing batch");
    let result = ctx.retry.run(
        &table.name,
        job.index,
        || ctx.db.insert_batch(&table.name, &table.columns, &batch.rows),
        |_, _| table.note_retry(),
    );
    match result {
        Ok(outcome) => table.record_insert(&batch.rows, outcome),
        Err(err) => table.fail(&err, batch.rows.len()),
    }
}
