//! Progress events and run cancellation.
//!
//! A [`ProgressTracker`] per table counts committed rows and calls the
//! run's [`ProgressSink`] each time another `progress_interval` rows land.
//! The [`StopFlag`] is the run-wide cancellation switch, checked between
//! batches.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Snapshot passed to the progress sink
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub table: String,
    pub rows_done: u64,
    pub rows_target: u64,
    pub elapsed: Duration,
    /// Rows per second since the previous event
    pub rows_per_second: f64,
}

impl ProgressEvent {
    pub fn is_complete(&self) -> bool {
        self.rows_done >= self.rows_target
    }
}

/// Callback receiving progress events. Called from worker threads.
pub type ProgressSink = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Counts rows of one table and emits events at a fixed row interval.
pub struct ProgressTracker {
    table: String,
    target: u64,
    interval: u64,
    done: AtomicU64,
    started: Instant,
    /// Row count and time of the last event
    last: Mutex<(u64, Instant)>,
    sink: Option<ProgressSink>,
}

impl ProgressTracker {
    pub fn new(
        table: impl Into<String>,
        target: u64,
        interval: u64,
        sink: Option<ProgressSink>,
    ) -> Self {
        let now = Instant::now();
        Self {
            table: table.into(),
            target,
            interval: interval.max(1),
            done: AtomicU64::new(0),
            started: now,
            last: Mutex::new((0, now)),
            sink,
        }
    }

    pub fn rows_done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Record `rows` more rows. Emits at most one event per call, when an
    /// interval boundary was crossed.
    pub fn advance(&self, rows: u64) {
        let done = self.done.fetch_add(rows, Ordering::Relaxed) + rows;
        let Some(sink) = &self.sink else {
            return;
        };

        let event = {
            let mut last = self.last.lock();
            if done / self.interval <= last.0 / self.interval || done <= last.0 {
                return;
            }
            let now = Instant::now();
            let window = now.duration_since(last.1).as_secs_f64();
            let rows_per_second = if window > 0.0 {
                (done - last.0) as f64 / window
            } else {
                0.0
            };
            *last = (done, now);
            ProgressEvent {
                table: self.table.clone(),
                rows_done: done,
                rows_target: self.target,
                elapsed: now.duration_since(self.started),
                rows_per_second,
            }
        };
        sink(&event);
    }
}

/// Run-wide cancellation flag. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
