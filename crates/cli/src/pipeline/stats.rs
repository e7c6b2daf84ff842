//! Run report.

use std::time::Duration;

use contracts::{to_gigabytes, ApproxCount};
use engine::{MemoryStatus, WriteSummary};
use observability::StepTimings;
use serde::Serialize;

/// Summary of a successful run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Session id, also used in part file names
    pub app_id: String,

    /// Input size on disk
    pub input_bytes: u64,

    /// Partitions the input was split into
    pub partitions: usize,

    /// Approximate row count
    pub row_count: Option<ApproxCount>,

    /// Parquet files written by the engine
    pub written: WriteSummary,

    /// Size of the output directory on disk
    pub output_bytes: u64,

    /// Storage memory after the write, when the engine reported it
    pub memory: Option<MemoryStatus>,

    /// Whether `nvidia-smi` found a GPU
    pub gpu_available: bool,

    /// Per-step durations
    pub timings: StepTimings,

    /// Total wall time
    pub duration: Duration,
}

/// JSON view of [`RunReport`]
#[derive(Serialize)]
struct ReportJson<'a> {
    app_id: &'a str,
    input_gb: f64,
    partitions: usize,
    row_estimate: Option<u64>,
    row_count_complete: Option<bool>,
    files: usize,
    rows_written: u64,
    output_gb: f64,
    cache_used_bytes: Option<u64>,
    gpu_available: bool,
    steps: Vec<(&'static str, f64)>,
    duration_secs: f64,
}

impl RunReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&ReportJson {
            app_id: &self.app_id,
            input_gb: to_gigabytes(self.input_bytes),
            partitions: self.partitions,
            row_estimate: self.row_count.map(|c| c.estimate),
            row_count_complete: self.row_count.map(|c| c.complete),
            files: self.written.files,
            rows_written: self.written.rows,
            output_gb: to_gigabytes(self.output_bytes),
            cache_used_bytes: self.memory.map(|m| m.storage_used.as_bytes()),
            gpu_available: self.gpu_available,
            steps: self
                .timings
                .iter()
                .map(|(step, elapsed)| (step, elapsed.as_secs_f64()))
                .collect(),
            duration_secs: self.duration.as_secs_f64(),
        })
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Run Summary ({}) ===\n", self.app_id);

        println!("Input");
        println!("   ├─ Size: {:.2} GB", to_gigabytes(self.input_bytes));
        println!("   └─ Partitions: {}", self.partitions);

        println!("\nRows");
        match &self.row_count {
            Some(count) => println!("   └─ Approximate count: {count}"),
            None => println!("   └─ Approximate count: N/A"),
        }

        println!("\nOutput");
        println!("   ├─ Files: {}", self.written.files);
        println!("   ├─ Rows written: {}", self.written.rows);
        println!("   └─ Size: {:.2} GB", to_gigabytes(self.output_bytes));

        println!("\nResources");
        match &self.memory {
            Some(memory) => println!(
                "   ├─ Cache memory: {} used of {}",
                memory.storage_used, memory.storage_budget
            ),
            None => println!("   ├─ Cache memory: unavailable"),
        }
        println!(
            "   └─ GPU: {}",
            if self.gpu_available { "available" } else { "none" }
        );

        println!("\nTimings");
        println!("   ├─ Steps: {}", self.timings);
        println!("   └─ Total: {:.2}s", self.duration.as_secs_f64());

        println!();
    }
}
