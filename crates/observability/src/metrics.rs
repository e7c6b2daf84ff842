//! Run metrics
//!
//! Published through the `metrics` facade; a no-op unless a recorder
//! (e.g. the Prometheus exporter) is installed.

use std::fmt;
use std::time::Duration;

use contracts::ApproxCount;
use metrics::{counter, gauge, histogram};

/// Record the input file size
pub fn record_input_size(bytes: u64) {
    gauge!("reviews_loader_input_bytes").set(bytes as f64);
}

/// Record the approximate row count and its bounds
pub fn record_row_estimate(count: &ApproxCount) {
    gauge!("reviews_loader_rows_estimate").set(count.estimate as f64);
    gauge!("reviews_loader_rows_estimate_low").set(count.low as f64);
    gauge!("reviews_loader_rows_estimate_high").set(count.high as f64);
    gauge!("reviews_loader_rows_estimate_complete").set(if count.complete { 1.0 } else { 0.0 });
}

/// Record the written output
pub fn record_output(bytes: u64, files: usize) {
    gauge!("reviews_loader_output_bytes").set(bytes as f64);
    gauge!("reviews_loader_output_files").set(files as f64);
}

/// Record storage memory held by cached data
pub fn record_cache_memory(used_bytes: u64) {
    gauge!("reviews_loader_cache_memory_bytes").set(used_bytes as f64);
}

/// Record how long one pipeline step took
pub fn record_step_duration(step: &'static str, elapsed: Duration) {
    histogram!("reviews_loader_step_duration_seconds", "step" => step).record(elapsed.as_secs_f64());
}

/// Count a finished run
pub fn record_run_outcome(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("reviews_loader_runs_total", "status" => status).increment(1);
}

/// Step durations of one run, in execution order
#[derive(Debug, Clone, Default)]
pub struct StepTimings {
    steps: Vec<(&'static str, Duration)>,
}

impl StepTimings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step and publish its duration
    pub fn record(&mut self, step: &'static str, elapsed: Duration) {
        record_step_duration(step, elapsed);
        self.steps.push((step, elapsed));
    }

    pub fn get(&self, step: &str) -> Option<Duration> {
        self.steps
            .iter()
            .find(|(name, _)| *name == step)
            .map(|(_, elapsed)| *elapsed)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Duration)> + '_ {
        self.steps.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Sum of all recorded steps
    pub fn total(&self) -> Duration {
        self.steps.iter().map(|(_, elapsed)| *elapsed).sum()
    }
}

impl fmt::Display for StepTimings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return write!(f, "N/A");
        }
        for (i, (step, elapsed)) in self.steps.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{step}={:.2}s", elapsed.as_secs_f64())?;
        }
        Ok(())
    }
}
