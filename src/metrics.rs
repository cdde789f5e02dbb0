//! Generic metric-sink seam. The core never talks to a concrete metrics
//! backend — it calls `counter`/`timer` on whatever `MetricSink` the host
//! application wires in, passing an atomic-counter struct into background
//! workers rather than reaching for a global.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A named, monotonically increasing counter.
pub trait Counter: Send + Sync {
    fn increment(&self, by: u64);
}

/// A named timer recording elapsed durations.
pub trait Timer: Send + Sync {
    fn record_millis(&self, millis: u64);
}

/// The metrics seam the directory store calls into. Implementations are
/// provided by the host application; `NoopMetricSink` is the library
/// default and `CountingMetricSink` is a simple in-process implementation
/// useful for tests and the demo binary.
pub trait MetricSink: Send + Sync {
    fn counter(&self, name: &'static str) -> Arc<dyn Counter>;
    fn timer(&self, name: &'static str) -> Arc<dyn Timer>;
}

pub struct NoopMetricSink;

struct NoopCounter;
impl Counter for NoopCounter {
    fn increment(&self, _by: u64) {}
}

struct NoopTimer;
impl Timer for NoopTimer {
    fn record_millis(&self, _millis: u64) {}
}

impl MetricSink for NoopMetricSink {
    fn counter(&self, _name: &'static str) -> Arc<dyn Counter> {
        Arc::new(NoopCounter)
    }

    fn timer(&self, _name: &'static str) -> Arc<dyn Timer> {
        Arc::new(NoopTimer)
    }
}

/// Measures the wall-clock duration of a closure and records it against
/// the given timer.
pub fn timed<T>(timer: &Arc<dyn Timer>, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let result = f();
    timer.record_millis(start.elapsed().as_millis() as u64);
    result
}

#[derive(Default)]
struct AtomicCounter(AtomicU64);
impl Counter for AtomicCounter {
    fn increment(&self, by: u64) {
        self.0.fetch_add(by, Ordering::Relaxed);
    }
}

#[derive(Default)]
struct AtomicTimer {
    total_millis: AtomicU64,
    samples: AtomicU64,
}
impl Timer for AtomicTimer {
    fn record_millis(&self, millis: u64) {
        self.total_millis.fetch_add(millis, Ordering::Relaxed);
        self.samples.fetch_add(1, Ordering::Relaxed);
    }
}

/// In-process counting sink backed by atomics, with a snapshot accessor
/// for tests and the `dirstore inspect`/`run` CLI subcommands.
#[derive(Default)]
pub struct CountingMetricSink {
    counters: std::sync::Mutex<std::collections::HashMap<&'static str, Arc<AtomicCounter>>>,
    timers: std::sync::Mutex<std::collections::HashMap<&'static str, Arc<AtomicTimer>>>,
}

impl CountingMetricSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter_value(&self, name: &'static str) -> u64 {
        self.counters
            .lock()
            .unwrap()
            .get(name)
            .map(|c| c.0.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

impl MetricSink for CountingMetricSink {
    fn counter(&self, name: &'static str) -> Arc<dyn Counter> {
        let mut counters = self.counters.lock().unwrap();
        Arc::clone(counters.entry(name).or_insert_with(|| Arc::new(AtomicCounter::default()))) as Arc<dyn Counter>
    }

    fn timer(&self, name: &'static str) -> Arc<dyn Timer> {
        let mut timers = self.timers.lock().unwrap();
        Arc::clone(timers.entry(name).or_insert_with(|| Arc::new(AtomicTimer::default()))) as Arc<dyn Timer>
    }
}
