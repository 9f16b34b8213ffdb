//! Resource telemetry and adaptive batch sizing.
//!
//! The monitor is advisory: it only changes the size of batches not yet
//! created and raises a memory-pressure hint. It never blocks generation.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use sysinfo::System;
use tracing::debug;

const GIB: u64 = 1024 * 1024 * 1024;

/// Minimum time between two telemetry samples
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(200);

/// One reading of host memory and CPU
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSample {
    pub memory_percent: f64,
    pub cpu_percent: f32,
    pub total_memory: u64,
    pub available_memory: u64,
}

/// Where samples come from
pub trait TelemetrySource: Send + Sync {
    fn sample(&self) -> ResourceSample;
}

/// Live host telemetry via `sysinfo`
pub struct SystemTelemetry {
    system: Mutex<System>,
}

impl SystemTelemetry {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
        }
    }

    pub fn total_memory(&self) -> u64 {
        self.system.lock().total_memory()
    }
}

impl Default for SystemTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySource for SystemTelemetry {
    fn sample(&self) -> ResourceSample {
        let mut system = self.system.lock();
        system.refresh_memory();
        system.refresh_cpu_usage();
        let total = system.total_memory();
        let used = system.used_memory();
        ResourceSample {
            memory_percent: if total > 0 {
                used as f64 * 100.0 / total as f64
            } else {
                0.0
            },
            cpu_percent: system.global_cpu_usage(),
            total_memory: total,
            available_memory: system.available_memory(),
        }
    }
}

/// Scripted telemetry. Yields the queued memory readings in order, then
/// repeats the last one.
pub struct FixedTelemetry {
    readings: Mutex<VecDeque<f64>>,
    last: Mutex<f64>,
    total_memory: u64,
}

impl FixedTelemetry {
    pub fn new(memory_percent: f64) -> Self {
        Self::sequence(vec![memory_percent])
    }

    pub fn sequence(readings: Vec<f64>) -> Self {
        let last = readings.last().copied().unwrap_or(0.0);
        Self {
            readings: Mutex::new(readings.into()),
            last: Mutex::new(last),
            total_memory: 16 * GIB,
        }
    }

    pub fn with_total_memory(mut self, bytes: u64) -> Self {
        self.total_memory = bytes;
        self
    }
}

impl TelemetrySource for FixedTelemetry {
    fn sample(&self) -> ResourceSample {
        let memory_percent = match self.readings.lock().pop_front() {
            Some(reading) => {
                *self.last.lock() = reading;
                reading
            }
            None => *self.last.lock(),
        };
        let used = (self.total_memory as f64 * memory_percent / 100.0) as u64;
        ResourceSample {
            memory_percent,
            cpu_percent: 0.0,
            total_memory: self.total_memory,
            available_memory: self.total_memory.saturating_sub(used),
        }
    }
}

/// Default batch size from total host memory
pub fn default_batch_size(total_memory: u64) -> usize {
    match total_memory {
        m if m >= 32 * GIB => 100_000,
        m if m >= 16 * GIB => 50_000,
        m if m >= 8 * GIB => 25_000,
        _ => 10_000,
    }
}

pub fn default_worker_count() -> usize {
    num_cpus::get().max(1)
}

pub fn default_process_count() -> usize {
    num_cpus::get_physical().max(1)
}

/// Next batch size and whether memory pressure was seen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeDecision {
    pub size: usize,
    pub pressure: bool,
}

/// Adapts batch size to memory use.
///
/// Above the high-water mark the size halves (not below `min`); below the
/// low-water mark it grows by half (not above `max`).
#[derive(Debug, Clone)]
pub struct BatchSizer {
    current: usize,
    min: usize,
    max: usize,
    high_water: f64,
    low_water: f64,
    interval: Duration,
    last_sample: Option<Instant>,
}

impl BatchSizer {
    pub fn new(initial: usize, min: usize, max: usize, high_water: f64, low_water: f64) -> Self {
        let initial = initial.max(1);
        Self {
            current: initial,
            min: min.clamp(1, initial),
            max: max.max(initial),
            high_water,
            low_water,
            interval: SAMPLE_INTERVAL,
            last_sample: None,
        }
    }

    /// Sample on every call instead of rate limiting
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn next(&mut self, telemetry: &dyn TelemetrySource) -> SizeDecision {
        let now = Instant::now();
        let due = self
            .last_sample
            .map(|at| now.duration_since(at) >= self.interval)
            .unwrap_or(true);
        if !due {
            return SizeDecision {
                size: self.current,
                pressure: false,
            };
        }
        self.last_sample = Some(now);
        let sample = telemetry.sample();
        self.apply(sample.memory_percent)
    }

    fn apply(&mut self, memory_percent: f64) -> SizeDecision {
        let before = self.current;
        let pressure = memory_percent > self.high_water;
        if pressure {
            self.current = (self.current / 2).max(self.min);
        } else if memory_percent < self.low_water {
            self.current = (self.current + self.current / 2).min(self.max);
        }
        if self.current != before {
            debug!(
                memory_percent,
                from = before,
                to = self.current,
                "batch size adjusted"
            );
        }
        SizeDecision {
            size: self.current,
            pressure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_batch_size_tiers() {
        assert_eq!(default_batch_size(64 * GIB), 100_000);
        assert_eq!(default_batch_size(16 * GIB), 50_000);
        assert_eq!(default_batch_size(12 * GIB), 25_000);
        assert_eq!(default_batch_size(4 * GIB), 10_000);
    }

    #[test]
    fn test_sizer_halves_under_pressure() {
        let telemetry = FixedTelemetry::sequence(vec![90.0, 90.0, 90.0, 90.0]);
        let mut sizer =
            BatchSizer::new(8000, 1000, 100_000, 80.0, 50.0).with_sample_interval(Duration::ZERO);

        let first = sizer.next(&telemetry);
        assert_eq!(first, SizeDecision { size: 4000, pressure: true });
        assert_eq!(sizer.next(&telemetry).size, 2000);
        assert_eq!(sizer.next(&telemetry).size, 1000);
        assert_eq!(sizer.next(&telemetry).size, 1000);
    }

    #[test]
    fn test_sizer_grows_when_memory_is_free() {
        let telemetry = FixedTelemetry::new(10.0);
        let mut sizer =
            BatchSizer::new(1000, 500, 2000, 80.0, 50.0).with_sample_interval(Duration::ZERO);

        assert_eq!(sizer.next(&telemetry).size, 1500);
        assert_eq!(sizer.next(&telemetry).size, 2000);
        assert_eq!(sizer.next(&telemetry).size, 2000);
    }

    #[test]
    fn test_sizer_holds_between_water_marks() {
        let telemetry = FixedTelemetry::new(65.0);
        let mut sizer =
            BatchSizer::new(5000, 1000, 100_000, 80.0, 50.0).with_sample_interval(Duration::ZERO);
        for _ in 0..5 {
            assert_eq!(sizer.next(&telemetry), SizeDecision { size: 5000, pressure: false });
        }
    }

    #[test]
    fn test_sizer_rate_limits_samples() {
        let telemetry = FixedTelemetry::sequence(vec![90.0, 90.0]);
        let mut sizer = BatchSizer::new(8000, 1000, 100_000, 80.0, 50.0)
            .with_sample_interval(Duration::from_secs(3600));
        assert_eq!(sizer.next(&telemetry).size, 4000);
        assert_eq!(sizer.next(&telemetry).size, 4000);
    }

    #[test]
    fn test_small_initial_size_sets_floor() {
        let sizer = BatchSizer::new(50, 1000, 100_000, 80.0, 50.0);
        assert_eq!(sizer.min, 50);
    }

    #[test]
    fn test_fixed_telemetry_repeats_last() {
        let telemetry = FixedTelemetry::sequence(vec![10.0, 95.0]);
        assert_eq!(telemetry.sample().memory_percent, 10.0);
        assert_eq!(telemetry.sample().memory_percent, 95.0);
        assert_eq!(telemetry.sample().memory_percent, 95.0);
    }
}
