//! Pipeline orchestrator - drives one load from session start to stop.
//!
//! Steps run strictly in order; the first failure aborts the rest, but the
//! session is always stopped through [`SessionGuard`].

use std::io;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use contracts::{to_gigabytes, ContractError, PipelineSettings, ProbeOutcome, RecordSchema};
use engine::{directory_size, ComputeSession, Dataset, SessionBuilder};
use observability::{StepTimings, SystemInfo};
use tracing::{debug, error, info, warn};

use super::{RunReport, SessionGuard};

pub const START_MARKER: &str = "=== Starting Amazon Reviews Processing ===";
pub const COMPLETE_MARKER: &str = "=== Processing Complete ===";

/// Main pipeline orchestrator
pub struct Pipeline {
    settings: PipelineSettings,
    metrics_port: Option<u16>,
}

impl Pipeline {
    /// Create a new pipeline with the given settings
    pub fn new(settings: PipelineSettings) -> Self {
        Self {
            settings,
            metrics_port: None,
        }
    }

    /// Serve Prometheus metrics on `port` while running
    pub fn with_metrics_port(mut self, port: Option<u16>) -> Self {
        self.metrics_port = port;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run the pipeline with an in-process session
    pub async fn run(self) -> Result<RunReport> {
        let started = Instant::now();
        info!("{START_MARKER}");

        if let Some(port) = self.metrics_port {
            observability::init_metrics_only(port)?;
        }

        let session = match SessionBuilder::from_settings(&self.settings)
            .build()
            .context("Failed to create compute session")
        {
            Ok(session) => session,
            Err(e) => {
                // No session yet, so there is nothing to stop
                error!("Pipeline failed: {e:?}");
                observability::record_run_outcome(false);
                return Err(e);
            }
        };

        self.execute(session, started).await
    }

    /// Run the pipeline on a session created by the caller
    pub async fn run_with<S: ComputeSession>(self, session: S) -> Result<RunReport> {
        let started = Instant::now();
        info!("{START_MARKER}");
        self.execute(session, started).await
    }

    async fn execute<S: ComputeSession>(&self, session: S, started: Instant) -> Result<RunReport> {
        let mut guard = SessionGuard::new(session);
        let mut report = RunReport {
            app_id: guard.session().app_id().to_string(),
            ..Default::default()
        };

        let result = self.run_steps(guard.session(), &mut report).await;
        guard.finish(result.is_ok());
        drop(guard);

        report.duration = started.elapsed();
        observability::record_run_outcome(result.is_ok());

        match result {
            Ok(()) => {
                info!(
                    "Total processing time: {:.2} seconds",
                    report.duration.as_secs_f64()
                );
                info!("{COMPLETE_MARKER}");
                Ok(report)
            }
            Err(e) => {
                error!("Pipeline failed: {e:?}");
                Err(e)
            }
        }
    }

    async fn run_steps<S: ComputeSession>(&self, session: &S, report: &mut RunReport) -> Result<()> {
        let settings = &self.settings;
        let mut timings = StepTimings::new();

        info!(
            app_name = %session.app_name(),
            app_id = %session.app_id(),
            driver_memory = %settings.session.driver_memory,
            executor_memory = %settings.session.executor_memory,
            shuffle_partitions = settings.session.shuffle_partitions,
            "Session created"
        );
        for (key, value) in session.conf().iter() {
            debug!("Session config: {key} = {value}");
        }

        // Environment
        let system = SystemInfo::collect(env!("CARGO_PKG_VERSION"));
        info!(
            version = %system.package_version,
            os = system.os,
            arch = system.arch,
            cpu_cores = system.cpu_cores,
            cwd = ?system.cwd,
            "Environment"
        );
        report.gpu_available = probe_gpu(&settings.logging.gpu_info_file())
            .await
            .is_available();

        let schema = RecordSchema::reviews();
        debug!(fields = ?schema.field_names().collect::<Vec<_>>(), "Schema defined");

        // Input
        let input = &settings.input.path;
        report.input_bytes = input_size(input).context("Failed to resolve input")?;
        info!("Input file size: {:.2} GB", to_gigabytes(report.input_bytes));
        observability::record_input_size(report.input_bytes);

        let step = Instant::now();
        let dataset = session
            .read_json(input, &schema, settings.input.parse_mode)
            .with_context(|| format!("Failed to load {}", input.display()))?;
        timings.record("load", step.elapsed());
        report.partitions = dataset.num_partitions();

        info!("Schema:\n{}", dataset.tree_string());
        info!(
            partitions = report.partitions,
            storage_level = %dataset.storage_level(),
            "Dataset loaded"
        );

        // Sample
        let step = Instant::now();
        let sample = dataset
            .show(settings.sampling.sample_size, false)
            .await
            .context("Failed to sample records")?;
        timings.record("sample", step.elapsed());
        info!("Sample records:\n{sample}");

        dataset.cache();
        info!(storage_level = %dataset.storage_level(), "Caching requested");

        // Approximate count
        let step = Instant::now();
        let count = dataset
            .count_approx(
                settings.sampling.count_timeout(),
                settings.sampling.count_confidence,
            )
            .await
            .context("Failed to count records")?;
        timings.record("count", step.elapsed());
        info!(
            estimate = count.estimate,
            low = count.low,
            high = count.high,
            complete = count.complete,
            "Approximate row count: {count}"
        );
        observability::record_row_estimate(&count);
        report.row_count = Some(count);

        // Persist
        let output = &settings.output.path;
        let step = Instant::now();
        report.written = dataset
            .write_parquet(output, settings.output.save_mode)
            .await
            .with_context(|| format!("Failed to write Parquet to {}", output.display()))?;
        let elapsed = step.elapsed();
        timings.record("persist", elapsed);
        info!(
            "Parquet write completed in {:.2} seconds",
            elapsed.as_secs_f64()
        );

        report.output_bytes = directory_size(output)
            .with_context(|| format!("Failed to measure {}", output.display()))?;
        info!(
            files = report.written.files,
            "Output size: {:.2} GB",
            to_gigabytes(report.output_bytes)
        );
        observability::record_output(report.output_bytes, report.written.files);

        // Memory
        match session.memory_status() {
            ProbeOutcome::Available(status) => {
                info!(
                    used = %status.storage_used,
                    free = %status.storage_free(),
                    budget = %status.storage_budget,
                    cached_datasets = status.cached_datasets,
                    "Storage memory status"
                );
                observability::record_cache_memory(status.storage_used.as_bytes());
                report.memory = Some(status);
            }
            ProbeOutcome::Unavailable { reason } => {
                warn!(reason = %reason, "Storage memory status unavailable");
            }
        }

        report.timings = timings;
        Ok(())
    }
}

/// Size of the input file; a missing file is reported as such
fn input_size(path: &Path) -> Result<u64, ContractError> {
    match std::fs::metadata(path) {
        Ok(metadata) => Ok(metadata.len()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(ContractError::input_not_found(path.display().to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// GPU probe on the blocking pool; never fails the run
async fn probe_gpu(path: &Path) -> ProbeOutcome<String> {
    let path = path.to_path_buf();
    match tokio::task::spawn_blocking(move || observability::probe_gpu(&path)).await {
        Ok(outcome) => outcome,
        Err(e) => ProbeOutcome::unavailable(format!("GPU probe task failed: {e}")),
    }
}
