//! Environment probes: host summary and GPU detection.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use contracts::ProbeOutcome;
use tracing::{info, warn};

/// Written to the GPU info file when no GPU is detected
pub const NO_GPU_FOUND: &str = "No GPU found";

/// Host and build details logged at the start of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInfo {
    pub package_version: String,
    pub os: &'static str,
    pub arch: &'static str,
    pub cpu_cores: usize,
    pub cwd: Option<PathBuf>,
}

impl SystemInfo {
    pub fn collect(package_version: &str) -> Self {
        Self {
            package_version: package_version.to_string(),
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            cpu_cores: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            cwd: std::env::current_dir().ok(),
        }
    }
}

impl fmt::Display for SystemInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "version {} on {}-{}, {} CPU cores, cwd {}",
            self.package_version,
            self.os,
            self.arch,
            self.cpu_cores,
            self.cwd
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<unknown>".to_string())
        )
    }
}

/// Query `nvidia-smi` and store its output in `output`.
///
/// Never fails: a missing tool, a failing tool or an unwritable file all end
/// up as `Unavailable`, with `No GPU found` written when possible.
pub fn probe_gpu(output: &Path) -> ProbeOutcome<String> {
    probe_gpu_with("nvidia-smi", output)
}

fn probe_gpu_with(program: &str, output: &Path) -> ProbeOutcome<String> {
    let outcome = match Command::new(program).output() {
        Ok(out) if out.status.success() => {
            ProbeOutcome::Available(String::from_utf8_lossy(&out.stdout).into_owned())
        }
        Ok(out) => ProbeOutcome::unavailable(format!("{program} exited with {}", out.status)),
        Err(e) => ProbeOutcome::unavailable(format!("{program} not runnable: {e}")),
    };

    let content = match &outcome {
        ProbeOutcome::Available(report) => report.as_str(),
        ProbeOutcome::Unavailable { .. } => NO_GPU_FOUND,
    };
    let written = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|_| fs::write(output, content));
    if let Err(e) = written {
        warn!(error = %e, path = %output.display(), "Failed to write GPU info");
    }

    match &outcome {
        ProbeOutcome::Available(_) => info!(path = %output.display(), "GPU info recorded"),
        ProbeOutcome::Unavailable { reason } => warn!(reason = %reason, "{NO_GPU_FOUND}"),
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect() {
        let info = SystemInfo::collect("1.2.3");
        assert!(info.cpu_cores >= 1);
        assert!(!info.os.is_empty());
        assert!(info.to_string().starts_with("version 1.2.3 on "));
    }

    #[test]
    fn test_missing_tool_records_no_gpu() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/gpu_info.txt");
        let outcome = probe_gpu_with("definitely-not-a-real-gpu-tool", &path);
        assert!(!outcome.is_available());
        assert_eq!(fs::read_to_string(&path).unwrap(), NO_GPU_FOUND);
    }

    #[test]
    fn test_unwritable_output_does_not_fail() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be written as a file
        let outcome = probe_gpu_with("definitely-not-a-real-gpu-tool", dir.path());
        assert!(!outcome.is_available());
    }
}
