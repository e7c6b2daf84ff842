//! Mock session for testing pipelines without scanning real data.
//!
//! Records every call so tests can check ordering and that `stop` runs
//! exactly once.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use contracts::{ApproxCount, ByteSize, ParseMode, ProbeOutcome, RecordSchema, SaveMode, StorageLevel};

use crate::conf::{self, SessionConf};
use crate::error::{EngineError, Result};
use crate::session::{ComputeSession, Dataset, MemoryStatus, WriteSummary};

/// Failure injection and canned results
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub fail_read: bool,
    pub fail_show: bool,
    pub fail_count: bool,
    pub fail_write: bool,
    /// Row count reported by `count_approx`
    pub rows: u64,
    /// None makes `memory_status` unavailable
    pub storage_used: Option<u64>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            fail_read: false,
            fail_show: false,
            fail_count: false,
            fail_write: false,
            rows: 4,
            storage_used: Some(1024),
        }
    }
}

#[derive(Default)]
struct MockState {
    calls: Mutex<Vec<String>>,
    stops: AtomicUsize,
    stopped: AtomicBool,
}

impl MockState {
    fn record(&self, call: impl Into<String>) {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(call.into());
    }
}

/// Mock compute session
#[derive(Clone)]
pub struct MockSession {
    config: MockConfig,
    conf: SessionConf,
    state: Arc<MockState>,
}

impl MockSession {
    pub fn new(config: MockConfig) -> Self {
        let mut conf = SessionConf::with_defaults();
        conf.set(conf::APP_NAME, "mock");
        conf.set(conf::APP_ID, "app-mock-0000");
        Self {
            config,
            conf,
            state: Arc::new(MockState::default()),
        }
    }

    /// Calls made so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.state
            .calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// How many times `stop` was called
    pub fn stop_count(&self) -> usize {
        self.state.stops.load(Ordering::SeqCst)
    }
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new(MockConfig::default())
    }
}

impl ComputeSession for MockSession {
    type Dataset = MockDataset;

    fn app_name(&self) -> &str {
        "mock"
    }

    fn app_id(&self) -> &str {
        "app-mock-0000"
    }

    fn conf(&self) -> &SessionConf {
        &self.conf
    }

    fn read_json(&self, path: &Path, schema: &RecordSchema, _mode: ParseMode) -> Result<MockDataset> {
        self.state.record("read_json");
        if self.config.fail_read || !path.exists() {
            return Err(EngineError::input_not_found(path.display().to_string()));
        }
        Ok(MockDataset {
            config: self.config.clone(),
            schema: schema.clone(),
            cached: Arc::new(AtomicBool::new(false)),
            state: self.state.clone(),
        })
    }

    fn memory_status(&self) -> ProbeOutcome<MemoryStatus> {
        self.state.record("memory_status");
        match self.config.storage_used {
            Some(used) => ProbeOutcome::Available(MemoryStatus {
                storage_used: ByteSize::from_bytes(used),
                storage_budget: ByteSize::from_gib(1),
                cached_datasets: 1,
            }),
            None => ProbeOutcome::unavailable("mock has no memory accounting"),
        }
    }

    fn stop(&self) {
        self.state.record("stop");
        self.state.stops.fetch_add(1, Ordering::SeqCst);
        self.state.stopped.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.state.stopped.load(Ordering::SeqCst)
    }
}

/// Mock dataset
#[derive(Clone)]
pub struct MockDataset {
    config: MockConfig,
    schema: RecordSchema,
    cached: Arc<AtomicBool>,
    state: Arc<MockState>,
}

impl Dataset for MockDataset {
    fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    fn num_partitions(&self) -> usize {
        1
    }

    fn storage_level(&self) -> StorageLevel {
        if self.cached.load(Ordering::SeqCst) {
            StorageLevel::MemoryOnly
        } else {
            StorageLevel::None
        }
    }

    fn cache(&self) {
        self.state.record("cache");
        self.cached.store(true, Ordering::SeqCst);
    }

    async fn show(&self, n: usize, _truncate: bool) -> Result<String> {
        self.state.record(format!("show({n})"));
        if self.config.fail_show {
            return Err(EngineError::task("mock show failure"));
        }
        Ok(format!("+---+\n|row|\n+---+\nonly showing top {n} rows\n"))
    }

    async fn count_approx(&self, _timeout: Duration, _confidence: f64) -> Result<ApproxCount> {
        self.state.record("count_approx");
        if self.config.fail_count {
            return Err(EngineError::Cancelled);
        }
        Ok(ApproxCount::exact(self.config.rows))
    }

    async fn write_parquet(&self, path: &Path, _mode: SaveMode) -> Result<WriteSummary> {
        self.state.record("write_parquet");
        if self.config.fail_write {
            return Err(EngineError::task("mock write failure"));
        }
        std::fs::create_dir_all(path)?;
        std::fs::write(path.join("part-00000-app-mock-0000.parquet"), b"PAR1")?;
        Ok(WriteSummary {
            files: 1,
            rows: self.config.rows,
            bytes: 4,
        })
    }
}
