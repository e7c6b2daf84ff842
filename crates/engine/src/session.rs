//! Compute session abstraction
//!
//! Defines the traits the pipeline talks to, supporting the in-process
//! implementation and mock testing.

use std::path::Path;
use std::time::Duration;

use contracts::{ApproxCount, ByteSize, ParseMode, ProbeOutcome, RecordSchema, SaveMode, StorageLevel};

use crate::conf::SessionConf;
use crate::error::Result;

/// Compute session trait
///
/// Owns engine resources for the duration of one run. `stop` releases them;
/// callers are expected to call it exactly once.
pub trait ComputeSession: Send + Sync {
    /// Dataset handle produced by reads
    type Dataset: Dataset;

    /// Application name
    fn app_name(&self) -> &str;

    /// Unique id of this session
    fn app_id(&self) -> &str;

    /// Active configuration
    fn conf(&self) -> &SessionConf;

    /// Lazily read line-delimited JSON under a fixed schema
    ///
    /// Only resolves the input; records are parsed by the first action.
    ///
    /// # Errors
    /// - Input not found
    /// - Session stopped
    fn read_json(&self, path: &Path, schema: &RecordSchema, mode: ParseMode)
        -> Result<Self::Dataset>;

    /// Storage memory usage, if the engine can report it
    fn memory_status(&self) -> ProbeOutcome<MemoryStatus>;

    /// Release all resources
    fn stop(&self);

    /// Whether `stop` has run
    fn is_stopped(&self) -> bool;
}

/// Lazy dataset handle
///
/// Clones share the same underlying data and cache.
#[trait_variant::make(Dataset: Send)]
pub trait LocalDataset: Clone + Send + Sync + 'static {
    /// Record schema
    fn schema(&self) -> &RecordSchema;

    /// Schema rendered as a tree
    fn tree_string(&self) -> String {
        self.schema().tree_string()
    }

    /// Number of partitions a full scan uses
    fn num_partitions(&self) -> usize;

    /// Current storage level
    fn storage_level(&self) -> StorageLevel;

    /// Keep the data in memory once first materialized
    fn cache(&self);

    /// Render the first `n` rows as a table
    async fn show(&self, n: usize, truncate: bool) -> Result<String>;

    /// Count rows within `timeout`; returns an estimate if the scan is unfinished
    async fn count_approx(&self, timeout: Duration, confidence: f64) -> Result<ApproxCount>;

    /// Persist as a directory of Parquet files
    async fn write_parquet(&self, path: &Path, mode: SaveMode) -> Result<WriteSummary>;
}

/// Result of a Parquet write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub files: usize,
    pub rows: u64,
    pub bytes: u64,
}

/// Storage memory snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStatus {
    /// Bytes held by cached datasets
    pub storage_used: ByteSize,
    /// Bytes available for caching
    pub storage_budget: ByteSize,
    /// Number of cached datasets
    pub cached_datasets: usize,
}

impl MemoryStatus {
    pub fn storage_free(&self) -> ByteSize {
        ByteSize::from_bytes(
            self.storage_budget
                .as_bytes()
                .saturating_sub(self.storage_used.as_bytes()),
        )
    }
}
