//! In-process compute session
//!
//! Runs every action on the local machine: partitions are scanned on the
//! tokio blocking pool, bounded by `engine.worker.threads`.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use contracts::{ByteSize, ParquetCompression, ParseMode, PipelineSettings, ProbeOutcome, RecordSchema};
use tracing::{debug, info, warn};

use crate::conf::{self, SessionConf};
use crate::dataset::{CacheSlot, InProcessDataset};
use crate::error::{EngineError, Result};
use crate::event_log::{now_ms, EngineEvent, EventLog};
use crate::reader::InputFile;
use crate::session::{ComputeSession, MemoryStatus};

static SESSION_SEQ: AtomicU32 = AtomicU32::new(0);

/// Builder for [`InProcessSession`]
pub struct SessionBuilder {
    conf: SessionConf,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            conf: SessionConf::with_defaults(),
        }
    }

    /// Seed the configuration from pipeline settings
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        let session = &settings.session;
        Self::new()
            .app_name(&session.app_name)
            .config(conf::DRIVER_MEMORY, session.driver_memory.to_string())
            .config(conf::EXECUTOR_MEMORY, session.executor_memory.to_string())
            .config(conf::SHUFFLE_PARTITIONS, session.shuffle_partitions.to_string())
            .config(conf::EVENT_LOG_ENABLED, session.event_log.enabled.to_string())
            .config(
                conf::EVENT_LOG_DIR,
                session.event_log.dir.display().to_string(),
            )
            .config(
                conf::MAX_PARTITION_BYTES,
                settings.input.max_partition_bytes.to_string(),
            )
            .config(conf::READER_BATCH_SIZE, settings.input.batch_size.to_string())
            .config(
                conf::PARQUET_COMPRESSION,
                compression_name(settings.output.compression),
            )
    }

    pub fn app_name(self, name: impl Into<String>) -> Self {
        self.config(conf::APP_NAME, name)
    }

    pub fn config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.conf.set(key, value);
        self
    }

    /// Validate the configuration and start the session
    ///
    /// # Errors
    /// - Unparseable or out-of-range config values
    /// - Event log directory cannot be created
    pub fn build(self) -> Result<InProcessSession> {
        let mut conf = self.conf;

        let app_name = conf
            .get(conf::APP_NAME)
            .unwrap_or_default()
            .to_string();
        let driver_memory = conf.byte_size(conf::DRIVER_MEMORY)?;
        let executor_memory = conf.byte_size(conf::EXECUTOR_MEMORY)?;
        let storage_fraction = conf.f64(conf::MEMORY_STORAGE_FRACTION)?;
        if !(0.0..=1.0).contains(&storage_fraction) {
            return Err(EngineError::session_creation(format!(
                "{} must be within [0, 1], got {storage_fraction}",
                conf::MEMORY_STORAGE_FRACTION
            )));
        }
        let shuffle_partitions = conf.usize(conf::SHUFFLE_PARTITIONS)?;
        let batch_size = conf.usize(conf::READER_BATCH_SIZE)?;
        if shuffle_partitions == 0 || batch_size == 0 {
            return Err(EngineError::session_creation(format!(
                "{} and {} must be > 0",
                conf::SHUFFLE_PARTITIONS,
                conf::READER_BATCH_SIZE
            )));
        }
        let max_partition_bytes = conf.byte_size(conf::MAX_PARTITION_BYTES)?;
        let compression = conf.compression()?;

        let workers = match conf.get(conf::WORKER_THREADS) {
            Some(_) => conf.usize(conf::WORKER_THREADS)?.max(1),
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        };
        conf.set(conf::WORKER_THREADS, workers.to_string());

        let app_id = format!(
            "app-{}-{:04}",
            chrono::Local::now().format("%Y%m%d%H%M%S"),
            SESSION_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        conf.set(conf::APP_ID, &app_id);

        let event_log = if conf.bool(conf::EVENT_LOG_ENABLED)? {
            let dir = conf.path(conf::EVENT_LOG_DIR)?;
            let log = EventLog::create(&dir, &app_id).map_err(|e| {
                EngineError::session_creation(format!(
                    "cannot open event log in {}: {e}",
                    dir.display()
                ))
            })?;
            log.post(&EngineEvent::ApplicationStart {
                app_name: app_name.clone(),
                app_id: app_id.clone(),
                timestamp_ms: now_ms(),
            });
            Some(log)
        } else {
            None
        };

        let storage_budget =
            (executor_memory.as_bytes() as f64 * storage_fraction).floor() as u64;

        info!(
            app_name = %app_name,
            app_id = %app_id,
            workers,
            storage_budget = %ByteSize::from_bytes(storage_budget),
            "Session started"
        );

        Ok(InProcessSession {
            inner: Arc::new(SessionInner {
                app_name,
                app_id,
                conf,
                batch_size,
                max_partition_bytes: max_partition_bytes.as_bytes(),
                max_result_bytes: driver_memory.as_bytes(),
                compression,
                workers,
                storage: StorageMemory::new(storage_budget),
                event_log,
                next_job_id: AtomicU64::new(0),
                stopped: AtomicBool::new(false),
            }),
        })
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn compression_name(compression: ParquetCompression) -> &'static str {
    match compression {
        ParquetCompression::Uncompressed => "none",
        ParquetCompression::Snappy => "snappy",
        ParquetCompression::Zstd => "zstd",
    }
}

/// Session handle. Clones share the same session.
#[derive(Clone)]
pub struct InProcessSession {
    inner: Arc<SessionInner>,
}

impl InProcessSession {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Path of the event log, when enabled
    pub fn event_log_path(&self) -> Option<&Path> {
        self.inner.event_log.as_ref().map(EventLog::path)
    }
}

impl ComputeSession for InProcessSession {
    type Dataset = InProcessDataset;

    fn app_name(&self) -> &str {
        &self.inner.app_name
    }

    fn app_id(&self) -> &str {
        &self.inner.app_id
    }

    fn conf(&self) -> &SessionConf {
        &self.inner.conf
    }

    fn read_json(
        &self,
        path: &Path,
        schema: &RecordSchema,
        mode: ParseMode,
    ) -> Result<InProcessDataset> {
        self.inner.ensure_active()?;
        let input = InputFile::open(path)?;
        let plan = input.plan(self.inner.max_partition_bytes);
        debug!(
            path = %path.display(),
            codec = ?input.codec,
            partitions = plan.len(),
            "Planned JSON read"
        );
        Ok(InProcessDataset::new(
            self.inner.clone(),
            input,
            plan,
            schema.clone(),
            mode,
        ))
    }

    fn memory_status(&self) -> ProbeOutcome<MemoryStatus> {
        if self.is_stopped() {
            return ProbeOutcome::unavailable("session is stopped");
        }
        ProbeOutcome::Available(self.inner.storage.status())
    }

    fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            warn!(app_id = %self.inner.app_id, "Session already stopped");
            return;
        }

        self.inner.storage.release_all();
        if let Some(log) = &self.inner.event_log {
            log.post(&EngineEvent::ApplicationEnd {
                timestamp_ms: now_ms(),
            });
            log.close();
        }
        info!(app_id = %self.inner.app_id, "Session stopped");
    }

    fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }
}

/// State shared by a session and its datasets
pub(crate) struct SessionInner {
    pub(crate) app_name: String,
    pub(crate) app_id: String,
    pub(crate) conf: SessionConf,
    pub(crate) batch_size: usize,
    pub(crate) max_partition_bytes: u64,
    pub(crate) max_result_bytes: u64,
    pub(crate) compression: ParquetCompression,
    pub(crate) workers: usize,
    pub(crate) storage: StorageMemory,
    event_log: Option<EventLog>,
    next_job_id: AtomicU64,
    stopped: AtomicBool,
}

/// A running action, as recorded in the event log
pub(crate) struct Job {
    id: u64,
    started: Instant,
}

impl SessionInner {
    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(EngineError::SessionStopped {
                app_id: self.app_id.clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn is_active(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }

    pub(crate) fn start_job(&self, description: &str) -> Job {
        let id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
        if let Some(log) = &self.event_log {
            log.post(&EngineEvent::JobStart {
                job_id: id,
                description: description.to_string(),
                timestamp_ms: now_ms(),
            });
        }
        debug!(job_id = id, description, "Job started");
        Job {
            id,
            started: Instant::now(),
        }
    }

    pub(crate) fn end_job(&self, job: Job, succeeded: bool) {
        let duration_ms = job.started.elapsed().as_millis() as u64;
        if let Some(log) = &self.event_log {
            log.post(&EngineEvent::JobEnd {
                job_id: job.id,
                succeeded,
                duration_ms,
                timestamp_ms: now_ms(),
            });
        }
        debug!(job_id = job.id, succeeded, duration_ms, "Job finished");
    }
}

/// Storage memory accounting for cached datasets
pub(crate) struct StorageMemory {
    budget: u64,
    used: AtomicU64,
    slots: Mutex<Vec<Weak<CacheSlot>>>,
    cached: AtomicUsize,
}

impl StorageMemory {
    fn new(budget: u64) -> Self {
        Self {
            budget,
            used: AtomicU64::new(0),
            slots: Mutex::new(Vec::new()),
            cached: AtomicUsize::new(0),
        }
    }

    /// Reserve `bytes` more; false when the budget would be exceeded
    pub(crate) fn try_grow(&self, bytes: u64) -> bool {
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                used.checked_add(bytes).filter(|total| *total <= self.budget)
            })
            .is_ok()
    }

    /// Give back bytes reserved through [`Self::try_grow`]
    pub(crate) fn shrink(&self, bytes: u64) {
        let _ = self
            .used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                Some(used.saturating_sub(bytes))
            });
    }

    /// Track a filled slot so that stopping the session evicts it
    pub(crate) fn register(&self, slot: &Arc<CacheSlot>) {
        self.cached.fetch_add(1, Ordering::SeqCst);
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        slots.retain(|weak| weak.strong_count() > 0);
        slots.push(Arc::downgrade(slot));
    }

    /// Forget a registered slot holding `bytes`
    pub(crate) fn release(&self, bytes: u64) {
        self.shrink(bytes);
        let _ = self
            .cached
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)));
    }

    fn release_all(&self) {
        let slots = std::mem::take(&mut *self.slots.lock().unwrap_or_else(|p| p.into_inner()));
        for slot in slots.iter().filter_map(Weak::upgrade) {
            slot.evict();
        }
        self.used.store(0, Ordering::SeqCst);
        self.cached.store(0, Ordering::SeqCst);
    }

    pub(crate) fn status(&self) -> MemoryStatus {
        MemoryStatus {
            storage_used: ByteSize::from_bytes(self.used.load(Ordering::SeqCst)),
            storage_budget: ByteSize::from_bytes(self.budget),
            cached_datasets: self.cached.load(Ordering::SeqCst),
        }
    }
}
