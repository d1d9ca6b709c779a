//! Performance benchmarking for the language server.
//!
//! Timing and counter collection for LSP operations, off by default and
//! toggled at runtime through an execute-command.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Clone, Default)]
pub struct PerformanceTracker {
    measurements: Arc<Mutex<HashMap<String, Vec<Duration>>>>,
    counters: Arc<Mutex<HashMap<String, u64>>>,
    enabled: Arc<Mutex<bool>>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        *self.enabled.lock()
    }

    pub fn set_enabled(&self, enabled: bool) {
        *self.enabled.lock() = enabled;
        if enabled {
            self.reset();
        }
    }

    pub fn record(&self, operation: &str, duration: Duration) {
        if !self.is_enabled() {
            return;
        }
        self.measurements
            .lock()
            .entry(operation.to_string())
            .or_default()
            .push(duration);
    }

    pub fn increment(&self, counter: &str, amount: u64) {
        if !self.is_enabled() {
            return;
        }
        *self.counters.lock().entry(counter.to_string()).or_insert(0) += amount;
    }

    pub fn reset(&self) {
        self.measurements.lock().clear();
        self.counters.lock().clear();
    }

    pub fn generate_report(&self) -> String {
        let measurements = self.measurements.lock();
        let counters = self.counters.lock();

        let mut report = String::new();
        report.push_str("spec LSP Server Performance Report\n");
        report.push_str(&"=".repeat(60));
        report.push('\n');

        if measurements.is_empty() {
            report.push_str("  no timing data collected\n");
        } else {
            let mut operations: Vec<_> = measurements.iter().collect();
            operations.sort_by_key(|(name, _)| *name);
            for (operation, times) in operations {
                if times.is_empty() {
                    continue;
                }
                let count = times.len();
                let total: Duration = times.iter().sum();
                let mut sorted = times.clone();
                sorted.sort();
                let p95 = sorted[(count as f64 * 0.95) as usize];
                report.push_str(&format!(
                    "  {}: calls={} total={:.2}ms avg={:.2}ms p95={:.2}ms\n",
                    operation,
                    count,
                    total.as_secs_f64() * 1000.0,
                    total.as_secs_f64() * 1000.0 / count as f64,
                    p95.as_secs_f64() * 1000.0,
                ));
            }
        }

        if !counters.is_empty() {
            report.push_str(&"-".repeat(60));
            report.push('\n');
            let mut items: Vec<_> = counters.iter().collect();
            items.sort_by_key(|(name, _)| *name);
            for (name, value) in items {
                report.push_str(&format!("  {}: {}\n", name, value));
            }
        }

        report
    }
}

/// RAII guard for automatic timing.
pub struct TimingGuard {
    tracker: PerformanceTracker,
    operation: String,
    start: Instant,
}

impl TimingGuard {
    pub fn new(tracker: &PerformanceTracker, operation: impl Into<String>) -> Self {
        Self {
            tracker: tracker.clone(),
            operation: operation.into(),
            start: Instant::now(),
        }
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        self.tracker.record(&self.operation, self.start.elapsed());
    }
}
