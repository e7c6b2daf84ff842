//! Settings resolution: file (or defaults), then CLI/env overrides, then validation.

use config_loader::ConfigLoader;
use contracts::PipelineSettings;
use tracing::info;

use crate::cli::RunArgs;
use crate::error::{CliError, Result};

const EVENT_LOG_SUBDIR: &str = "spark_events";

/// Build the settings for a run
pub fn resolve(args: &RunArgs) -> Result<PipelineSettings> {
    if let Some(path) = &args.config {
        if !path.exists() {
            return Err(CliError::config_not_found(path.display().to_string()));
        }
    }

    let mut settings = ConfigLoader::load_or_default(args.config.as_deref())?;
    apply_overrides(&mut settings, args);
    ConfigLoader::validate(&settings)?;
    Ok(settings)
}

fn apply_overrides(settings: &mut PipelineSettings, args: &RunArgs) {
    if let Some(input) = &args.input {
        info!(input = %input.display(), "Overriding input path from CLI");
        settings.input.path = input.clone();
    }
    if let Some(output) = &args.output {
        info!(output = %output.display(), "Overriding output path from CLI");
        settings.output.path = output.clone();
    }
    if let Some(dir) = &args.log_dir {
        // An event log kept under the old log dir moves with it
        if settings.session.event_log.dir == settings.logging.dir.join(EVENT_LOG_SUBDIR) {
            settings.session.event_log.dir = dir.join(EVENT_LOG_SUBDIR);
        }
        settings.logging.dir = dir.clone();
    }
    if let Some(memory) = args.driver_memory {
        settings.session.driver_memory = memory;
    }
    if let Some(memory) = args.executor_memory {
        settings.session.executor_memory = memory;
    }
    if let Some(partitions) = args.shuffle_partitions {
        settings.session.shuffle_partitions = partitions;
    }
    if let Some(sample_size) = args.sample_size {
        settings.sampling.sample_size = sample_size;
    }
    if let Some(secs) = args.count_timeout {
        settings.sampling.count_timeout_secs = secs;
    }
    if args.no_event_log {
        settings.session.event_log.enabled = false;
    }
}
