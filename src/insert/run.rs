//! Run-scoped state of one table and the per-stage job queue.

use super::batch::{BatchJob, BatchPlanner};
use super::state::TableState;
use crate::db::InsertOutcome;
use crate::duplicate::Downgrade;
use crate::error::InsertionError;
use crate::generator::{
    GeneratedBatch, KeyTuple, Row, SelfRefPlan, TablePlan, UniquenessRegistry, Value, ValueSource,
};
use crate::monitor::{BatchSizer, TelemetrySource};
use crate::pk::{hash_key, hash_row_key, PkHash};
use crate::progress::{ProgressTracker, StopFlag};
use crate::report::{ShortfallReason, TableReport, VerificationMismatch};
use crate::schema::TableId;
use ahash::AHashSet;
use parking_lot::Mutex;
use smallvec::smallvec;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Error messages kept per table
const MAX_TABLE_ERRORS: usize = 20;

/// Which rows of a self-referencing table this run inserted
pub enum RunKeys {
    /// Sequence values above `base`
    Sequence { base: i64 },
    /// The table was empty before the run
    Whole,
    /// Hashes of the key tuples this run wrote
    Recorded(Mutex<AHashSet<PkHash>>),
}

impl RunKeys {
    fn for_self_ref(plan: &TablePlan, self_ref: &SelfRefPlan, rows_before: u64) -> Self {
        if let [slot] = self_ref.key_slots.as_slice() {
            if let Some(ValueSource::Sequence { base }) = plan.columns.get(*slot).map(|c| &c.source) {
                return RunKeys::Sequence { base: *base };
            }
        }
        if rows_before == 0 {
            RunKeys::Whole
        } else {
            RunKeys::Recorded(Mutex::new(AHashSet::new()))
        }
    }

    /// Key to start paging after
    pub fn start(&self) -> Option<KeyTuple> {
        match self {
            RunKeys::Sequence { base } => Some(smallvec![Value::Int(*base)]),
            _ => None,
        }
    }

    pub fn contains(&self, key: &KeyTuple) -> bool {
        match self {
            RunKeys::Sequence { .. } | RunKeys::Whole => true,
            RunKeys::Recorded(seen) => seen.lock().contains(&hash_key(key.iter())),
        }
    }

    fn record(&self, rows: &[Row], key_slots: &[usize]) {
        if let RunKeys::Recorded(seen) = self {
            let mut seen = seen.lock();
            seen.extend(rows.iter().filter_map(|row| hash_row_key(row, key_slots)));
        }
    }
}

/// Everything a run tracks for one table: its plan and registry, the
/// batch planner, counters and the current state. Discarded when the run
/// ends.
pub struct TableRun {
    pub id: TableId,
    pub name: String,
    pub stage: usize,
    pub plan: Arc<TablePlan>,
    pub registry: Arc<UniquenessRegistry>,
    pub columns: Vec<String>,
    pub rows_before: u64,
    pub downgrades: Vec<Downgrade>,
    pub progress: ProgressTracker,
    state: Mutex<TableState>,
    planner: Mutex<BatchPlanner>,
    started: Instant,
    generated: AtomicU64,
    inserted: AtomicU64,
    rejected: AtomicU64,
    exhausted: AtomicU64,
    no_parent_keys: AtomicU64,
    failed_rows: AtomicU64,
    batches: AtomicU64,
    retries: AtomicU64,
    in_flight: AtomicUsize,
    failed: AtomicBool,
    errors: Mutex<Vec<String>>,
    /// One entry per self-reference of the plan
    self_ref_keys: Vec<RunKeys>,
    mismatches: Mutex<Vec<VerificationMismatch>>,
    self_ref_passes: AtomicU64,
    self_ref_updates: AtomicU64,
}

impl TableRun {
    pub fn new(
        stage: usize,
        plan: TablePlan,
        registry: UniquenessRegistry,
        rows_before: u64,
        downgrades: Vec<Downgrade>,
        progress: ProgressTracker,
    ) -> Self {
        let self_ref_keys = plan
            .self_refs
            .iter()
            .map(|self_ref| RunKeys::for_self_ref(&plan, self_ref, rows_before))
            .collect();
        Self {
            id: plan.table_id,
            name: plan.table.clone(),
            stage,
            columns: plan.column_names(),
            planner: Mutex::new(BatchPlanner::new(plan.table_id, plan.rows_requested)),
            plan: Arc::new(plan),
            registry: Arc::new(registry),
            rows_before,
            downgrades,
            progress,
            state: Mutex::new(TableState::Pending),
            started: Instant::now(),
            generated: AtomicU64::new(0),
            inserted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            exhausted: AtomicU64::new(0),
            no_parent_keys: AtomicU64::new(0),
            failed_rows: AtomicU64::new(0),
            batches: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            failed: AtomicBool::new(false),
            errors: Mutex::new(Vec::new()),
            self_ref_keys,
            mismatches: Mutex::new(Vec::new()),
            self_ref_passes: AtomicU64::new(0),
            self_ref_updates: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> TableState {
        *self.state.lock()
    }

    /// Move to `next` if the lifecycle allows it
    pub fn transition(&self, next: TableState) -> bool {
        let mut state = self.state.lock();
        if *state == next {
            return true;
        }
        if !state.can_transition_to(next) {
            warn!(table = %self.name, from = %*state, to = %next, "illegal state transition ignored");
            return false;
        }
        debug!(table = %self.name, from = %*state, to = %next, "table state");
        *state = next;
        true
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    pub fn rows_inserted(&self) -> u64 {
        self.inserted.load(Ordering::Relaxed)
    }

    pub fn is_dispatched(&self) -> bool {
        self.planner.lock().is_exhausted()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn note_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn push_error(&self, message: String) {
        let mut errors = self.errors.lock();
        if errors.len() < MAX_TABLE_ERRORS {
            errors.push(message);
        }
    }

    pub fn record_generation(&self, batch: &GeneratedBatch) {
        self.generated
            .fetch_add(batch.rows.len() as u64, Ordering::Relaxed);
        self.exhausted.fetch_add(batch.exhausted, Ordering::Relaxed);
        self.no_parent_keys
            .fetch_add(batch.no_parent_keys, Ordering::Relaxed);
        for err in &batch.errors {
            debug!(table = %self.name, error = %err, "row skipped");
            self.push_error(err.to_string());
        }
    }

    /// Count a written batch and, when the table held rows before the run,
    /// remember which keys are this run's for the self-reference pass.
    pub fn record_insert(&self, rows: &[Row], outcome: InsertOutcome) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.inserted.fetch_add(outcome.inserted, Ordering::Relaxed);
        self.rejected.fetch_add(outcome.rejected, Ordering::Relaxed);
        for (self_ref, keys) in self.plan.self_refs.iter().zip(&self.self_ref_keys) {
            keys.record(rows, &self_ref.key_slots);
        }
        self.progress.advance(outcome.inserted);
    }

    /// Mark the table FAILED after a batch spent its retries
    pub fn fail(&self, err: &InsertionError, rows: usize) {
        error!(table = %self.name, batch = err.batch, attempts = err.attempts, error = %err.source, "batch failed");
        self.failed_rows.fetch_add(rows as u64, Ordering::Relaxed);
        self.push_error(err.to_string());
        self.failed.store(true, Ordering::Release);
        self.transition(TableState::Failed);
    }

    /// Finish a dispatched job
    pub fn complete_job(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    /// This run's rows for self-reference `index`
    pub fn run_keys(&self, index: usize) -> Option<&RunKeys> {
        self.self_ref_keys.get(index)
    }

    pub fn record_self_ref_pass(&self, updated: u64) {
        self.self_ref_passes.fetch_add(1, Ordering::Relaxed);
        self.self_ref_updates.fetch_add(updated, Ordering::Relaxed);
    }

    pub fn add_mismatch(&self, mismatch: VerificationMismatch) {
        warn!(table = %self.name, check = %mismatch.check, "verification mismatch: {}", mismatch);
        self.mismatches.lock().push(mismatch);
    }

    /// Close a table after its stage drained.
    ///
    /// Undispatched rows count as `interrupted` when the run was stopped and
    /// as `batch_failed` when the table failed.
    pub fn report(&self, interrupted: bool) -> TableReport {
        let requested = self.plan.rows_requested;
        let remaining = self.planner.lock().remaining();
        let mut state = self.state();
        if remaining > 0 && !state.is_terminal() && interrupted {
            self.transition(TableState::Interrupted);
            state = self.state();
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let inserted = self.rows_inserted();
        let mut report = TableReport::new(self.name.clone(), requested);
        report.state = state;
        report.stage = Some(self.stage);
        report.rows_generated = self.generated.load(Ordering::Relaxed);
        report.rows_inserted = inserted;
        report.rows_before = self.rows_before;
        report.elapsed_secs = elapsed;
        report.rows_per_second = if elapsed > 0.0 {
            inserted as f64 / elapsed
        } else {
            0.0
        };
        report.batches = self.batches.load(Ordering::Relaxed);
        report.batch_retries = self.retries.load(Ordering::Relaxed);
        report.downgrades = self.downgrades.clone();
        report.verification = self.mismatches.lock().clone();
        report.errors = self.errors.lock().clone();
        report.self_reference_passes = self.self_ref_passes.load(Ordering::Relaxed) as u32;
        report.self_reference_updates = self.self_ref_updates.load(Ordering::Relaxed);

        report.add_shortfall(
            ShortfallReason::GenerationExhausted,
            self.exhausted.load(Ordering::Relaxed),
        );
        report.add_shortfall(
            ShortfallReason::NoParentKeys,
            self.no_parent_keys.load(Ordering::Relaxed),
        );
        report.add_shortfall(
            ShortfallReason::RejectedByDatabase,
            self.rejected.load(Ordering::Relaxed),
        );
        report.add_shortfall(
            ShortfallReason::BatchFailed,
            self.failed_rows.load(Ordering::Relaxed),
        );
        let unsent = if state == TableState::Failed {
            ShortfallReason::BatchFailed
        } else {
            ShortfallReason::Interrupted
        };
        report.add_shortfall(unsent, remaining);

        info!(
            table = %self.name,
            state = %state,
            requested,
            inserted,
            elapsed_secs = elapsed,
            "table finished"
        );
        report
    }
}

/// Hands out the jobs of one stage, round-robin over its tables.
///
/// Each job is created when a worker asks for it, sized by the current
/// [`BatchSizer`] decision. Nothing is handed out once the stop flag is set
/// or for a table that failed.
pub struct StageQueue<'a> {
    tables: &'a [Arc<TableRun>],
    cursor: Mutex<usize>,
    sizer: &'a Mutex<BatchSizer>,
    telemetry: &'a dyn TelemetrySource,
    stop: &'a StopFlag,
    /// Bumped on every memory-pressure decision
    pressure_epoch: AtomicU64,
}

impl<'a> StageQueue<'a> {
    pub fn new(
        tables: &'a [Arc<TableRun>],
        sizer: &'a Mutex<BatchSizer>,
        telemetry: &'a dyn TelemetrySource,
        stop: &'a StopFlag,
    ) -> Self {
        Self {
            tables,
            cursor: Mutex::new(0),
            sizer,
            telemetry,
            stop,
            pressure_epoch: AtomicU64::new(0),
        }
    }

    pub fn pressure_epoch(&self) -> u64 {
        self.pressure_epoch.load(Ordering::Acquire)
    }

    /// Next job and the position of its table in the stage
    pub fn next_job(&self) -> Option<(usize, BatchJob)> {
        if self.stop.is_stopped() {
            return None;
        }
        let mut cursor = self.cursor.lock();
        let count = self.tables.len();
        for step in 0..count {
            let slot = (*cursor + step) % count;
            let table = &self.tables[slot];
            if table.is_failed() {
                continue;
            }
            let mut planner = table.planner.lock();
            if planner.is_exhausted() {
                continue;
            }

            let decision = self.sizer.lock().next(self.telemetry);
            if decision.pressure {
                self.pressure_epoch.fetch_add(1, Ordering::AcqRel);
            }
            let job = planner.next_job(decision.size)?;
            table.in_flight.fetch_add(1, Ordering::AcqRel);
            if planner.is_exhausted() {
                table.transition(TableState::Inserting);
            }
            *cursor = (slot + 1) % count;
            return Some((slot, job));
        }
        None
    }
}
