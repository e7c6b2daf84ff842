//! In-process dataset: lazy scans over a planned JSON input.

use std::path::Path;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use contracts::{ApproxCount, ParseMode, RecordSchema, SaveMode, StorageLevel};
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::count;
use crate::display::render_table;
use crate::error::{EngineError, Result};
use crate::in_process::SessionInner;
use crate::reader::{to_arrow_schema, InputFile, PartitionScan, PartitionSpec, ScanOptions, ScanProgress, ScanStats};
use crate::session::{Dataset, WriteSummary};
use crate::writer::{self, PartStats, StagedOutput};

/// Fully scanned dataset held in memory
#[derive(Debug)]
pub(crate) struct Materialized {
    /// Batches per partition, in partition order
    partitions: Vec<Vec<RecordBatch>>,
    rows: u64,
    /// Storage memory reserved for the batches
    bytes: u64,
}

/// Batches kept for the cache while a scan runs.
///
/// Every batch is reserved against the storage budget as it is read. The
/// first batch that does not fit gives back everything reserved so far and
/// nothing more is kept for the rest of the scan.
struct Retention {
    session: Arc<SessionInner>,
    state: Mutex<RetentionState>,
}

#[derive(Default)]
struct RetentionState {
    reserved: u64,
    exhausted: bool,
}

impl Retention {
    fn new(session: Arc<SessionInner>) -> Arc<Self> {
        Arc::new(Self {
            session,
            state: Mutex::new(RetentionState::default()),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RetentionState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Keep `batch` in `kept` if the budget allows, else drop `kept`
    fn keep(&self, kept: &mut Vec<RecordBatch>, batch: RecordBatch) {
        let mut state = self.lock();
        if state.exhausted {
            kept.clear();
            return;
        }

        let bytes = batch.get_array_memory_size() as u64;
        if self.session.storage.try_grow(bytes) {
            state.reserved += bytes;
            kept.push(batch);
        } else {
            state.exhausted = true;
            self.session.storage.shrink(state.reserved);
            state.reserved = 0;
            kept.clear();
        }
    }

    /// Hand the reservation over to the cache; `None` if the budget ran out
    fn commit(&self) -> Option<u64> {
        let mut state = self.lock();
        if state.exhausted {
            return None;
        }
        Some(std::mem::take(&mut state.reserved))
    }
}

impl Drop for Retention {
    fn drop(&mut self) {
        let reserved = self.lock().reserved;
        self.session.storage.shrink(reserved);
    }
}

/// Cache slot of one dataset, shared by its clones
#[derive(Default)]
pub(crate) struct CacheSlot {
    data: Mutex<Option<Arc<Materialized>>>,
    /// Held while a scan fills the slot
    fill: AsyncMutex<()>,
}

impl CacheSlot {
    fn get(&self) -> Option<Arc<Materialized>> {
        self.data.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn put(&self, data: Arc<Materialized>) {
        *self.data.lock().unwrap_or_else(|p| p.into_inner()) = Some(data);
    }

    fn take(&self) -> Option<Arc<Materialized>> {
        self.data.lock().unwrap_or_else(|p| p.into_inner()).take()
    }

    /// Drop cached data without touching the accounting
    pub(crate) fn evict(&self) {
        self.take();
    }
}

struct DatasetInner {
    session: Arc<SessionInner>,
    input: InputFile,
    plan: Vec<PartitionSpec>,
    schema: RecordSchema,
    arrow_schema: SchemaRef,
    mode: ParseMode,
    cached: AtomicBool,
    slot: Arc<CacheSlot>,
    /// Full passes over the input so far
    passes: AtomicUsize,
}

impl Drop for DatasetInner {
    fn drop(&mut self) {
        if let Some(data) = self.slot.take() {
            self.session.storage.release(data.bytes);
        }
    }
}

/// Dataset produced by [`InProcessSession::read_json`](crate::InProcessSession)
#[derive(Clone)]
pub struct InProcessDataset {
    inner: Arc<DatasetInner>,
}

impl fmt::Debug for InProcessDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcessDataset")
            .field("input", &self.inner.input.path)
            .field("partitions", &self.inner.plan.len())
            .field("mode", &self.inner.mode)
            .field("storage_level", &self.storage_level())
            .finish()
    }
}

impl InProcessDataset {
    pub(crate) fn new(
        session: Arc<SessionInner>,
        input: InputFile,
        plan: Vec<PartitionSpec>,
        schema: RecordSchema,
        mode: ParseMode,
    ) -> Self {
        let arrow_schema = to_arrow_schema(&schema);
        Self {
            inner: Arc::new(DatasetInner {
                session,
                input,
                plan,
                schema,
                arrow_schema,
                mode,
                cached: AtomicBool::new(false),
                slot: Arc::new(CacheSlot::default()),
                passes: AtomicUsize::new(0),
            }),
        }
    }

    /// Input path this dataset reads
    pub fn input_path(&self) -> &Path {
        &self.inner.input.path
    }

    fn new_progress(&self) -> Arc<ScanProgress> {
        ScanProgress::new(self.inner.input.len)
    }

    fn open_scan(
        &self,
        spec: PartitionSpec,
        progress: Arc<ScanProgress>,
        limit: Option<usize>,
    ) -> Result<PartitionScan> {
        PartitionScan::open(
            &self.inner.input,
            spec,
            &self.inner.schema,
            ScanOptions {
                batch_size: self.inner.session.batch_size,
                mode: self.inner.mode,
                limit,
            },
            progress,
        )
    }

    /// Run `task` once per partition on the blocking pool, at most
    /// `workers` at a time. Results come back in partition order.
    async fn run_partitions<T, F>(&self, progress: Arc<ScanProgress>, task: F) -> Result<Vec<T>>
    where
        T: Send + 'static,
        F: Fn(PartitionSpec, Arc<ScanProgress>) -> Result<T> + Send + Sync + 'static,
    {
        let pass = self.inner.passes.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(pass, partitions = self.inner.plan.len(), "Scanning input");

        let task = Arc::new(task);
        let permits = Arc::new(Semaphore::new(self.inner.session.workers));
        let mut set = JoinSet::new();

        for spec in self.inner.plan.iter().copied() {
            let permit = permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| EngineError::task(e.to_string()))?;
            let task = task.clone();
            let progress = progress.clone();
            set.spawn_blocking(move || {
                let _permit = permit;
                task(spec, progress).map(|out| (spec.index, out))
            });
        }

        let mut results = Vec::with_capacity(self.inner.plan.len());
        while let Some(joined) = set.join_next().await {
            match joined.map_err(EngineError::from).and_then(|r| r) {
                Ok(item) => results.push(item),
                Err(e) => {
                    progress.cancel();
                    return Err(e);
                }
            }
        }
        results.sort_by_key(|(index, _)| *index);
        Ok(results.into_iter().map(|(_, out)| out).collect())
    }

    /// Fill the cache unless it is already filled; returns the row count.
    ///
    /// Data that does not fit the storage budget is counted but not kept.
    async fn fill_cache(&self, progress: Arc<ScanProgress>) -> Result<u64> {
        let slot = self.inner.slot.clone();
        let _fill = slot.fill.lock().await;
        if let Some(data) = slot.get() {
            return Ok(data.rows);
        }

        self.inner.session.ensure_active()?;
        let retention = Retention::new(self.inner.session.clone());
        let this = self.clone();
        let keeper = retention.clone();
        let parts = self
            .run_partitions(progress, move |spec, progress| {
                let mut scan = this.open_scan(spec, progress, None)?;
                let mut kept = Vec::new();
                while let Some(batch) = scan.next_batch()? {
                    keeper.keep(&mut kept, batch);
                }
                Ok((kept, scan.stats()))
            })
            .await?;

        let (partitions, stats): (Vec<_>, Vec<_>) = parts.into_iter().unzip();
        log_scan_stats(&stats);
        let rows = stats.iter().map(|s| s.rows).sum();
        self.store(&retention, partitions, rows);
        Ok(rows)
    }

    /// Put retained batches into the slot if the whole dataset fit
    fn store(&self, retention: &Retention, partitions: Vec<Vec<RecordBatch>>, rows: u64) {
        if !self.inner.session.is_active() {
            return;
        }

        match retention.commit() {
            Some(bytes) => {
                let data = Materialized {
                    partitions,
                    rows,
                    bytes,
                };
                info!(
                    rows,
                    bytes,
                    partitions = data.partitions.len(),
                    "Dataset cached in memory"
                );
                self.inner.slot.put(Arc::new(data));
                self.inner.session.storage.register(&self.inner.slot);
            }
            None => warn!(
                rows,
                budget = %self.inner.session.storage.status().storage_budget,
                "Not enough storage memory to cache dataset, it will be recomputed"
            ),
        }
    }

    /// Count rows without keeping them
    async fn count_rows(&self, progress: Arc<ScanProgress>) -> Result<u64> {
        let this = self.clone();
        let stats = self
            .run_partitions(progress, move |spec, progress| {
                let mut scan = this.open_scan(spec, progress, None)?;
                while scan.next_batch()?.is_some() {}
                Ok(scan.stats())
            })
            .await?;
        log_scan_stats(&stats);
        Ok(stats.iter().map(|s| s.rows).sum())
    }

    /// First `limit` rows, scanning partitions in order until enough are found
    async fn take_rows(&self, limit: usize) -> Result<Vec<RecordBatch>> {
        if let Some(data) = self.inner.slot.get() {
            let mut remaining = limit;
            let mut out = Vec::new();
            for batch in data.partitions.iter().flatten() {
                if remaining == 0 {
                    break;
                }
                let take = remaining.min(batch.num_rows());
                out.push(batch.slice(0, take));
                remaining -= take;
            }
            return Ok(out);
        }

        let this = self.clone();
        let progress = self.new_progress();
        tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            let mut remaining = limit;
            for spec in this.inner.plan.iter().copied() {
                if remaining == 0 {
                    break;
                }
                for batch in this.open_scan(spec, progress.clone(), Some(remaining))? {
                    let batch = batch?;
                    remaining = remaining.saturating_sub(batch.num_rows());
                    out.push(batch);
                }
            }
            Ok(out)
        })
        .await?
    }

    /// Write one part per partition into `staged`.
    ///
    /// Cached data is written from memory. A cached dataset whose cache is
    /// still empty is filled by the same pass that writes it.
    async fn write_parts(&self, staged: &StagedOutput) -> Result<Vec<Option<PartStats>>> {
        if let Some(data) = self.inner.slot.get() {
            return self.write_cached(staged, data).await;
        }
        if !self.storage_level().use_memory() {
            return self.write_scanned(staged, None).await;
        }

        let slot = self.inner.slot.clone();
        let _fill = slot.fill.lock().await;
        if let Some(data) = slot.get() {
            return self.write_cached(staged, data).await;
        }
        let retention = Retention::new(self.inner.session.clone());
        self.write_scanned(staged, Some(retention)).await
    }

    async fn write_cached(
        &self,
        staged: &StagedOutput,
        data: Arc<Materialized>,
    ) -> Result<Vec<Option<PartStats>>> {
        let props = writer::writer_properties(self.inner.session.compression);
        let mut set = JoinSet::new();
        for (index, batches) in data.partitions.iter().enumerate() {
            let path = staged.part_path(index);
            let batches = batches.clone();
            let props = props.clone();
            let schema = self.inner.arrow_schema.clone();
            set.spawn_blocking(move || {
                writer::write_part(&path, schema, batches.into_iter().map(Ok), props, false)
                    .map(|stats| (index, stats))
            });
        }

        let mut parts = vec![None; data.partitions.len()];
        while let Some(joined) = set.join_next().await {
            let (index, stats) = joined??;
            parts[index] = stats;
        }
        Ok(parts)
    }

    /// Stream every partition from the input into its part, keeping batches
    /// for the cache when `retention` is given
    async fn write_scanned(
        &self,
        staged: &StagedOutput,
        retention: Option<Arc<Retention>>,
    ) -> Result<Vec<Option<PartStats>>> {
        let props = writer::writer_properties(self.inner.session.compression);
        let schema = self.inner.arrow_schema.clone();
        let paths: Vec<_> = self
            .inner
            .plan
            .iter()
            .map(|spec| staged.part_path(spec.index))
            .collect();

        let this = self.clone();
        let keeper = retention.clone();
        let parts = self
            .run_partitions(self.new_progress(), move |spec, progress| {
                let mut scan = this.open_scan(spec, progress, None)?;
                let mut kept = Vec::new();
                let batches = scan.by_ref().map(|batch| -> Result<RecordBatch> {
                    let batch = batch?;
                    if let Some(keeper) = &keeper {
                        keeper.keep(&mut kept, batch.clone());
                    }
                    Ok(batch)
                });
                let part = writer::write_part(
                    &paths[spec.index],
                    schema.clone(),
                    batches,
                    props.clone(),
                    false,
                )?;
                Ok((part, kept, scan.stats()))
            })
            .await?;

        let mut written = Vec::with_capacity(parts.len());
        let mut partitions = Vec::with_capacity(parts.len());
        let mut stats = Vec::with_capacity(parts.len());
        for (part, kept, scanned) in parts {
            written.push(part);
            partitions.push(kept);
            stats.push(scanned);
        }
        log_scan_stats(&stats);

        if let Some(retention) = retention {
            self.store(&retention, partitions, stats.iter().map(|s| s.rows).sum());
        }
        Ok(written)
    }
}

fn log_scan_stats(stats: &[ScanStats]) {
    let total = stats.iter().fold(ScanStats::default(), |acc, s| ScanStats {
        rows: acc.rows + s.rows,
        malformed: acc.malformed + s.malformed,
        partial: acc.partial + s.partial,
        skipped: acc.skipped + s.skipped,
    });
    if total.malformed > 0 || total.partial > 0 {
        warn!(
            rows = total.rows,
            malformed = total.malformed,
            partial = total.partial,
            "Some records did not match the schema and were read as nulls"
        );
    }
    debug!(
        rows = total.rows,
        skipped = total.skipped,
        partitions = stats.len(),
        "Scan finished"
    );
}

impl Dataset for InProcessDataset {
    fn schema(&self) -> &RecordSchema {
        &self.inner.schema
    }

    fn num_partitions(&self) -> usize {
        self.inner.plan.len()
    }

    fn storage_level(&self) -> StorageLevel {
        if self.inner.cached.load(Ordering::SeqCst) {
            StorageLevel::MemoryOnly
        } else {
            StorageLevel::None
        }
    }

    fn cache(&self) {
        self.inner.cached.store(true, Ordering::SeqCst);
    }

    #[instrument(name = "dataset_show", skip(self))]
    async fn show(&self, n: usize, truncate: bool) -> Result<String> {
        let session = &self.inner.session;
        session.ensure_active()?;
        let job = session.start_job(&format!("show at {}", self.input_path().display()));

        let result = async {
            let batches = self.take_rows(n.saturating_add(1)).await?;
            let all = concat_batches(&self.inner.arrow_schema, &batches)?;
            let has_more = all.num_rows() > n;
            let shown = all.slice(0, all.num_rows().min(n));

            let bytes = shown.get_array_memory_size() as u64;
            if bytes > session.max_result_bytes {
                return Err(EngineError::ResultTooLarge {
                    bytes,
                    limit: session.max_result_bytes,
                });
            }
            render_table(&shown, has_more, truncate)
        }
        .await;

        session.end_job(job, result.is_ok());
        result
    }

    #[instrument(name = "dataset_count_approx", skip(self))]
    async fn count_approx(&self, timeout: Duration, confidence: f64) -> Result<ApproxCount> {
        let session = self.inner.session.clone();
        session.ensure_active()?;

        if let Some(data) = self.inner.slot.get() {
            return Ok(ApproxCount::exact(data.rows));
        }

        let job = session.start_job("countApprox");
        let progress = self.new_progress();

        let result = if self.storage_level().use_memory() {
            // Keep filling the cache in the background if the deadline passes
            let this = self.clone();
            let p = progress.clone();
            let fill = tokio::spawn(async move { this.fill_cache(p).await });
            match tokio::time::timeout(timeout, fill).await {
                Ok(joined) => joined
                    .map_err(EngineError::from)
                    .and_then(|r| r)
                    .map(ApproxCount::exact),
                Err(_) => Ok(count::estimate(&progress, confidence)),
            }
        } else {
            match tokio::time::timeout(timeout, self.count_rows(progress.clone())).await {
                Ok(rows) => rows.map(ApproxCount::exact),
                Err(_) => {
                    progress.cancel();
                    Ok(count::estimate(&progress, confidence))
                }
            }
        };

        if let Ok(count) = &result {
            if !count.complete {
                info!(
                    timeout_ms = timeout.as_millis() as u64,
                    fraction = progress.fraction(),
                    "Count did not finish in time, returning estimate"
                );
            }
        }
        session.end_job(job, result.is_ok());
        result
    }

    #[instrument(name = "dataset_write_parquet", skip(self, path), fields(path = %path.display()))]
    async fn write_parquet(&self, path: &Path, mode: SaveMode) -> Result<WriteSummary> {
        let session = self.inner.session.clone();
        session.ensure_active()?;
        let job = session.start_job(&format!("parquet at {}", path.display()));

        let result = async {
            let staged = StagedOutput::prepare(path, mode, &session.app_id, session.compression)?;
            let mut parts = self.write_parts(&staged).await?;

            if parts.iter().all(Option::is_none) {
                // Keep the schema readable even without rows
                let empty = writer::write_part(
                    &staged.part_path(0),
                    self.inner.arrow_schema.clone(),
                    Vec::new(),
                    writer::writer_properties(session.compression),
                    true,
                )?;
                parts = vec![empty];
            }
            staged.commit()?;

            let summary = parts.iter().flatten().fold(WriteSummary::default(), |acc, p| {
                WriteSummary {
                    files: acc.files + 1,
                    rows: acc.rows + p.rows,
                    bytes: acc.bytes + p.bytes,
                }
            });
            Ok(summary)
        }
        .await;

        match &result {
            Ok(summary) => info!(
                files = summary.files,
                rows = summary.rows,
                bytes = summary.bytes,
                "Parquet write complete"
            ),
            Err(e) => warn!(error = %e, "Parquet write failed, existing output left untouched"),
        }
        session.end_job(job, result.is_ok());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf;
    use crate::in_process::{InProcessSession, SessionBuilder};
    use crate::session::ComputeSession;
    use std::fs;

    const VALID: &str = r#"{"reviewerID":"A1","asin":"0001","reviewerName":"Ann","helpful":[2,3],"reviewText":"Good","overall":5.0,"summary":"ok","unixReviewTime":1382140800,"reviewTime":"10 19, 2013"}"#;

    fn session(extra: &[(&str, &str)]) -> InProcessSession {
        extra
            .iter()
            .fold(SessionBuilder::new().app_name("test"), |b, (k, v)| b.config(*k, *v))
            .build()
            .unwrap()
    }

    fn write_input(dir: &Path, lines: usize) -> std::path::PathBuf {
        let path = dir.join("reviews.json");
        let content: String = (0..lines)
            .map(|i| VALID.replace("\"A1\"", &format!("\"A{i}\"")) + "\n")
            .collect();
        fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_show_limits_rows() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path(), 10);
        let session = session(&[(conf::MAX_PARTITION_BYTES, "512")]);
        let ds = session
            .read_json(&input, &RecordSchema::reviews(), ParseMode::Permissive)
            .unwrap();
        assert!(ds.num_partitions() > 1);

        let table = ds.show(2, false).await.unwrap();
        assert!(table.contains("reviewerID"));
        assert!(table.contains("only showing top 2 rows"));
        // separator, header, separator, 2 rows, separator, footer
        assert_eq!(table.lines().count(), 7);
        session.stop();
    }

    #[tokio::test]
    async fn test_show_respects_driver_memory() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path(), 3);
        let session = session(&[(conf::DRIVER_MEMORY, "10b")]);
        let ds = session
            .read_json(&input, &RecordSchema::reviews(), ParseMode::Permissive)
            .unwrap();
        let err = ds.show(2, true).await.unwrap_err();
        assert!(matches!(err, EngineError::ResultTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_count_exact_with_and_without_cache() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path(), 25);
        let session = session(&[(conf::MAX_PARTITION_BYTES, "1k")]);
        let ds = session
            .read_json(&input, &RecordSchema::reviews(), ParseMode::Permissive)
            .unwrap();

        let count = ds.count_approx(Duration::from_secs(30), 0.95).await.unwrap();
        assert_eq!(count, ApproxCount::exact(25));

        ds.cache();
        assert_eq!(ds.storage_level(), StorageLevel::MemoryOnly);
        let count = ds.count_approx(Duration::from_secs(30), 0.95).await.unwrap();
        assert_eq!(count, ApproxCount::exact(25));

        let status = session.memory_status().available().unwrap();
        assert_eq!(status.cached_datasets, 1);
        assert!(status.storage_used.as_bytes() > 0);

        session.stop();
        assert!(ds.inner.slot.get().is_none());
    }

    #[tokio::test]
    async fn test_cache_over_budget_is_not_kept() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path(), 5);
        let session = session(&[(conf::EXECUTOR_MEMORY, "16b")]);
        let ds = session
            .read_json(&input, &RecordSchema::reviews(), ParseMode::Permissive)
            .unwrap();
        ds.cache();

        let count = ds.count_approx(Duration::from_secs(30), 0.95).await.unwrap();
        assert_eq!(count.estimate, 5);
        assert!(ds.inner.slot.get().is_none());
        let status = session.memory_status().available().unwrap();
        assert_eq!(status.cached_datasets, 0);
        assert_eq!(status.storage_used.as_bytes(), 0);
    }

    #[tokio::test]
    async fn test_over_budget_write_reads_input_once() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path(), 30);
        let output = dir.path().join("out.parquet");
        let session = session(&[
            (conf::EXECUTOR_MEMORY, "16b"),
            (conf::MAX_PARTITION_BYTES, "1k"),
        ]);
        let ds = session
            .read_json(&input, &RecordSchema::reviews(), ParseMode::Permissive)
            .unwrap();
        ds.cache();

        let summary = ds.write_parquet(&output, SaveMode::Overwrite).await.unwrap();
        assert_eq!(summary.rows, 30);
        assert_eq!(summary.files, ds.num_partitions());
        assert_eq!(ds.inner.passes.load(Ordering::SeqCst), 1);
        assert!(ds.inner.slot.get().is_none());
        assert_eq!(
            session.memory_status().available().unwrap().storage_used.as_bytes(),
            0
        );
    }

    #[tokio::test]
    async fn test_write_fills_cache_in_the_same_pass() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path(), 30);
        let output = dir.path().join("out.parquet");
        let session = session(&[(conf::MAX_PARTITION_BYTES, "1k")]);
        let ds = session
            .read_json(&input, &RecordSchema::reviews(), ParseMode::Permissive)
            .unwrap();
        ds.cache();

        let summary = ds.write_parquet(&output, SaveMode::Overwrite).await.unwrap();
        assert_eq!(summary.rows, 30);
        assert_eq!(ds.inner.passes.load(Ordering::SeqCst), 1);

        let data = ds.inner.slot.get().unwrap();
        assert_eq!(data.rows, 30);
        let status = session.memory_status().available().unwrap();
        assert_eq!(status.cached_datasets, 1);
        assert_eq!(status.storage_used.as_bytes(), data.bytes);

        // Served from memory from here on
        let count = ds.count_approx(Duration::from_secs(30), 0.95).await.unwrap();
        assert_eq!(count, ApproxCount::exact(30));
        let again = ds.write_parquet(&output, SaveMode::Overwrite).await.unwrap();
        assert_eq!(again.rows, 30);
        assert_eq!(ds.inner.passes.load(Ordering::SeqCst), 1);

        drop(data);
        drop(ds);
        let status = session.memory_status().available().unwrap();
        assert_eq!(status.cached_datasets, 0);
        assert_eq!(status.storage_used.as_bytes(), 0);
    }

    #[test]
    fn test_debug_names_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path(), 1);
        let session = session(&[]);
        let ds = session
            .read_json(&input, &RecordSchema::reviews(), ParseMode::Permissive)
            .unwrap();
        let debug = format!("{ds:?}");
        assert!(debug.contains("reviews.json"));
        assert!(debug.contains("partitions: 1"));
    }

    #[tokio::test]
    async fn test_count_times_out_with_estimate() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path(), 2000);
        let session = session(&[]);
        let ds = session
            .read_json(&input, &RecordSchema::reviews(), ParseMode::Permissive)
            .unwrap();

        let count = ds.count_approx(Duration::ZERO, 0.95).await.unwrap();
        if count.complete {
            assert_eq!(count.estimate, 2000);
        } else {
            assert!(count.low <= count.estimate && count.estimate <= count.high);
        }
    }

    #[tokio::test]
    async fn test_write_parquet_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path(), 20);
        let output = dir.path().join("out.parquet");
        let session = session(&[(conf::MAX_PARTITION_BYTES, "1k")]);
        let ds = session
            .read_json(&input, &RecordSchema::reviews(), ParseMode::Permissive)
            .unwrap();
        ds.cache();

        let first = ds.write_parquet(&output, SaveMode::Overwrite).await.unwrap();
        assert_eq!(first.rows, 20);
        assert_eq!(first.files, ds.num_partitions());
        assert!(output.join(writer::SUCCESS_MARKER).exists());

        fs::write(output.join("stale.txt"), b"x").unwrap();
        let second = ds.write_parquet(&output, SaveMode::Overwrite).await.unwrap();
        assert_eq!(second.rows, 20);
        assert!(!output.join("stale.txt").exists());

        let err = ds
            .write_parquet(&output, SaveMode::ErrorIfExists)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::OutputExists { .. }));
    }

    #[tokio::test]
    async fn test_write_empty_input_keeps_schema_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("empty.json");
        fs::write(&input, "\n\n").unwrap();
        let output = dir.path().join("out.parquet");
        let session = session(&[]);
        let ds = session
            .read_json(&input, &RecordSchema::reviews(), ParseMode::Permissive)
            .unwrap();

        let summary = ds.write_parquet(&output, SaveMode::Overwrite).await.unwrap();
        assert_eq!(summary.files, 1);
        assert_eq!(summary.rows, 0);
        let parts = fs::read_dir(&output)
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .ends_with(".parquet")
            })
            .count();
        assert_eq!(parts, 1);
    }

    #[tokio::test]
    async fn test_fail_fast_write_keeps_old_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("bad.json");
        fs::write(&input, format!("{VALID}\n{{broken\n")).unwrap();
        let output = dir.path().join("out.parquet");
        fs::create_dir(&output).unwrap();
        fs::write(output.join("keep.parquet"), b"old").unwrap();

        let session = session(&[]);
        let ds = session
            .read_json(&input, &RecordSchema::reviews(), ParseMode::FailFast)
            .unwrap();
        let err = ds.write_parquet(&output, SaveMode::Overwrite).await.unwrap_err();
        assert!(matches!(err, EngineError::MalformedRecord { line: 2, .. }));
        assert!(output.join("keep.parquet").exists());
    }

    #[tokio::test]
    async fn test_actions_fail_after_stop() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path(), 2);
        let session = session(&[]);
        let ds = session
            .read_json(&input, &RecordSchema::reviews(), ParseMode::Permissive)
            .unwrap();
        session.stop();
        assert!(matches!(
            ds.show(1, true).await,
            Err(EngineError::SessionStopped { .. })
        ));
    }
}
