//! # Observability
//!
//! Logging, run metrics and environment probes for the loader.
//!
//! ## Features
//!
//! - Diagnostics context: log file plus console, fixed line format
//! - Prometheus metrics export
//! - System info and GPU probe
//!
//! ## Usage
//!
//! ```ignore
//! let diagnostics = observability::Diagnostics::init(DiagnosticsConfig::from_settings(&settings.logging))?;
//! tracing::info!("=== Starting ===");
//! diagnostics.flush();
//! ```

mod format;
pub mod metrics;
pub mod system;

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use contracts::LoggingSettings;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

pub use crate::format::LineFormat;
pub use crate::metrics::{
    record_cache_memory, record_input_size, record_output, record_row_estimate,
    record_run_outcome, record_step_duration, StepTimings,
};
pub use crate::system::{probe_gpu, SystemInfo, NO_GPU_FOUND};

/// Console log format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Same lines as the log file
    #[default]
    Plain,
    /// Human-readable multi-line format
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON structured logs
    Json,
}

/// Diagnostics configuration
#[derive(Debug, Clone)]
pub struct DiagnosticsConfig {
    /// Directory holding the log file (created if absent)
    pub log_dir: PathBuf,
    /// Log file name inside `log_dir`
    pub log_file_name: String,
    /// Console format (None = file only)
    pub console: Option<LogFormat>,
    /// Console level when `RUST_LOG` is unset
    pub console_log_level: String,
    /// File level, independent of the console
    pub file_log_level: String,
}

impl DiagnosticsConfig {
    pub fn from_settings(logging: &LoggingSettings) -> Self {
        Self {
            log_dir: logging.dir.clone(),
            log_file_name: logging.file_name.clone(),
            ..Default::default()
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            log_file_name: "amazon_reviews_processing.log".to_string(),
            console: Some(LogFormat::Plain),
            console_log_level: "info".to_string(),
            file_log_level: "debug".to_string(),
        }
    }
}

/// Log file shared between the file layer and the [`Diagnostics`] handle
#[derive(Clone)]
struct SharedFile(Arc<Mutex<File>>);

impl Write for SharedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap_or_else(|p| p.into_inner()).write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.0.lock().unwrap_or_else(|p| p.into_inner()).write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().unwrap_or_else(|p| p.into_inner()).flush()
    }
}

impl<'a> MakeWriter<'a> for SharedFile {
    type Writer = SharedFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Handle to the logging setup of one process (or one test scope)
pub struct Diagnostics {
    log_file: PathBuf,
    file: Arc<Mutex<File>>,
    _guard: Option<DefaultGuard>,
}

impl Diagnostics {
    /// Install as the global subscriber
    ///
    /// # Errors
    /// - Log directory or file cannot be created
    /// - A global subscriber is already set
    pub fn init(config: DiagnosticsConfig) -> Result<Self> {
        let (subscriber, log_file, file) = build(&config)?;
        subscriber
            .try_init()
            .context("Failed to initialize tracing subscriber")?;
        Ok(Self::announce(log_file, file, None, &config))
    }

    /// Install for the current thread only, until the handle is dropped
    pub fn scoped(config: DiagnosticsConfig) -> Result<Self> {
        let (subscriber, log_file, file) = build(&config)?;
        let guard = tracing::subscriber::set_default(subscriber);
        Ok(Self::announce(log_file, file, Some(guard), &config))
    }

    fn announce(
        log_file: PathBuf,
        file: Arc<Mutex<File>>,
        guard: Option<DefaultGuard>,
        config: &DiagnosticsConfig,
    ) -> Self {
        tracing::debug!(
            log_file = %log_file.display(),
            console = ?config.console,
            "Diagnostics initialized"
        );
        Self {
            log_file,
            file,
            _guard: guard,
        }
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    /// Flush the log file
    pub fn flush(&self) {
        let mut file = self.file.lock().unwrap_or_else(|p| p.into_inner());
        if let Err(e) = file.flush().and_then(|_| file.sync_data()) {
            eprintln!("failed to flush log file {}: {e}", self.log_file.display());
        }
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

type Built = (
    tracing_subscriber::layer::Layered<Vec<BoxedLayer>, Registry>,
    PathBuf,
    Arc<Mutex<File>>,
);

/// `RUST_LOG` if set, otherwise `default_level`
fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Console layer; `RUST_LOG` (or `level`) applies to it alone
fn console_layer(format: LogFormat, level: &str) -> BoxedLayer {
    let filter = env_filter(level);
    match format {
        LogFormat::Plain => fmt::layer()
            .event_format(LineFormat)
            .with_writer(io::stderr)
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_writer(io::stderr)
            .with_filter(filter)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(io::stderr)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(io::stderr)
            .with_filter(filter)
            .boxed(),
    }
}

/// Console-only logging for commands that do not run the pipeline
pub fn init_console(format: LogFormat, default_level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(vec![console_layer(format, default_level)])
        .try_init()
        .context("Failed to initialize tracing subscriber")?;
    Ok(())
}

fn build(config: &DiagnosticsConfig) -> Result<Built> {
    fs::create_dir_all(&config.log_dir).with_context(|| {
        format!("Failed to create log directory {}", config.log_dir.display())
    })?;
    let log_file = config.log_dir.join(&config.log_file_name);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
        .with_context(|| format!("Failed to open log file {}", log_file.display()))?;
    let file = Arc::new(Mutex::new(file));

    let mut layers: Vec<BoxedLayer> = vec![fmt::layer()
        .event_format(LineFormat)
        .with_ansi(false)
        .with_writer(SharedFile(file.clone()))
        .with_filter(EnvFilter::new(&config.file_log_level))
        .boxed()];
    if let Some(format) = config.console {
        layers.push(console_layer(format, &config.console_log_level));
    }

    let subscriber = tracing_subscriber::registry().with(layers);
    Ok((subscriber, log_file, file))
}

/// Start the Prometheus exporter only (tracing set up elsewhere)
pub fn init_metrics_only(port: u16) -> Result<()> {
    let builder = PrometheusBuilder::new();
    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;

    tracing::info!(port = port, "Prometheus metrics endpoint initialized");
    Ok(())
}
