//! `run` command implementation.

use anyhow::{Context, Result};
use config_loader::ConfigLoader;
use contracts::{LoggingSettings, PipelineSettings};
use observability::{Diagnostics, DiagnosticsConfig, LogFormat};
use tracing::{error, info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::Pipeline;
use crate::settings;

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs, console: LogFormat, level: &str) -> Result<()> {
    run_pipeline_with(args, console, level, Diagnostics::init).await
}

/// [`run_pipeline`] with the way diagnostics get installed left to the caller
async fn run_pipeline_with<F>(
    args: &RunArgs,
    console: LogFormat,
    level: &str,
    install: F,
) -> Result<()>
where
    F: Fn(DiagnosticsConfig) -> Result<Diagnostics>,
{
    let settings = match settings::resolve(args) {
        Ok(settings) => settings,
        Err(e) => {
            // Still leave a log file behind for the failed run
            let mut logging = LoggingSettings::default();
            if let Some(dir) = &args.log_dir {
                logging.dir = dir.clone();
            }
            let diagnostics = install(diagnostics_config(&logging, console, level))?;
            error!("Failed to resolve settings: {e}");
            diagnostics.flush();
            return Err(e.into());
        }
    };

    let diagnostics = install(diagnostics_config(&settings.logging, console, level))?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        log_file = %diagnostics.log_file().display(),
        "Reviews loader starting"
    );
    info!(
        input = %settings.input.path.display(),
        output = %settings.output.path.display(),
        parse_mode = ?settings.input.parse_mode,
        save_mode = ?settings.output.save_mode,
        "Settings resolved"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - settings are valid, exiting");
        print_settings_summary(&settings)?;
        diagnostics.flush();
        return Ok(());
    }

    let pipeline = Pipeline::new(settings).with_metrics_port(args.metrics_port);

    // Dropping the pipeline future on a signal still stops the session
    let result = tokio::select! {
        result = pipeline.run() => result,
        _ = shutdown_signal() => {
            warn!("Received shutdown signal, run aborted");
            Err(anyhow::Error::from(CliError::pipeline_execution("interrupted by signal")))
        }
    };

    diagnostics.flush();
    match result {
        Ok(report) if args.json => {
            println!("{}", report.to_json()?);
            Ok(())
        }
        Ok(report) => {
            report.print_summary();
            Ok(())
        }
        Err(e) => Err(e).context("Pipeline execution failed"),
    }
}

fn diagnostics_config(logging: &LoggingSettings, console: LogFormat, level: &str) -> DiagnosticsConfig {
    DiagnosticsConfig {
        console: Some(console),
        console_log_level: level.to_string(),
        ..DiagnosticsConfig::from_settings(logging)
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print resolved settings for dry-run mode
fn print_settings_summary(settings: &PipelineSettings) -> Result<()> {
    println!("\n=== Settings Summary ===\n");
    println!("{}", ConfigLoader::to_toml(settings)?);
    Ok(())
}
