//! JSON-lines event log of one application.
//!
//! Written as `<dir>/<app id>.inprogress` while the session runs and renamed to
//! `<dir>/<app id>` on stop, so readers can tell finished logs apart.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use tracing::warn;

use crate::error::Result;

const IN_PROGRESS_SUFFIX: &str = ".inprogress";

/// One event record
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "Event")]
pub enum EngineEvent {
    ApplicationStart {
        #[serde(rename = "App Name")]
        app_name: String,
        #[serde(rename = "App ID")]
        app_id: String,
        #[serde(rename = "Timestamp")]
        timestamp_ms: i64,
    },
    JobStart {
        #[serde(rename = "Job ID")]
        job_id: u64,
        #[serde(rename = "Description")]
        description: String,
        #[serde(rename = "Timestamp")]
        timestamp_ms: i64,
    },
    JobEnd {
        #[serde(rename = "Job ID")]
        job_id: u64,
        #[serde(rename = "Succeeded")]
        succeeded: bool,
        #[serde(rename = "Duration Ms")]
        duration_ms: u64,
        #[serde(rename = "Timestamp")]
        timestamp_ms: i64,
    },
    ApplicationEnd {
        #[serde(rename = "Timestamp")]
        timestamp_ms: i64,
    },
}

/// Event log writer
pub struct EventLog {
    in_progress: PathBuf,
    finished: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl EventLog {
    /// Create the directory (if needed) and open the in-progress file
    pub fn create(dir: &Path, app_id: &str) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let finished = dir.join(app_id);
        let in_progress = dir.join(format!("{app_id}{IN_PROGRESS_SUFFIX}"));
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&in_progress)?;

        Ok(Self {
            in_progress,
            finished,
            writer: Mutex::new(Some(BufWriter::new(file))),
        })
    }

    /// Final path of the log once closed
    pub fn path(&self) -> &Path {
        &self.finished
    }

    /// Append one event. Failures are logged, never raised.
    pub fn post(&self, event: &EngineEvent) {
        let mut guard = match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(writer) = guard.as_mut() else {
            return;
        };

        let written = serde_json::to_writer(&mut *writer, event)
            .map_err(std::io::Error::from)
            .and_then(|_| writer.write_all(b"\n"))
            .and_then(|_| writer.flush());
        if let Err(e) = written {
            warn!(error = %e, path = %self.in_progress.display(), "Failed to write event log");
        }
    }

    /// Flush, close and move the log to its final name
    pub fn close(&self) {
        let mut guard = match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(mut writer) = guard.take() {
            if let Err(e) = writer.flush() {
                warn!(error = %e, "Failed to flush event log");
            }
            drop(writer);
            if let Err(e) = fs::rename(&self.in_progress, &self.finished) {
                warn!(error = %e, path = %self.in_progress.display(), "Failed to finalize event log");
            }
        }
    }
}

/// Milliseconds since the Unix epoch
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
