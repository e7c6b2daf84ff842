//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{PipelineSettings, SaveMode};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<SettingsSummary>,
}

#[derive(Serialize)]
struct SettingsSummary {
    version: String,
    input: String,
    output: String,
    driver_memory: String,
    executor_memory: String,
    shuffle_partitions: u32,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating settings");

    let result = validate_settings(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Settings validation failed")
    }
}

fn validate_settings(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(settings) => {
            let warnings = collect_warnings(&settings);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(SettingsSummary {
                    version: format!("{:?}", settings.version),
                    input: settings.input.path.display().to_string(),
                    output: settings.output.path.display().to_string(),
                    driver_memory: settings.session.driver_memory.to_string(),
                    executor_memory: settings.session.executor_memory.to_string(),
                    shuffle_partitions: settings.session.shuffle_partitions,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect non-fatal issues
fn collect_warnings(settings: &PipelineSettings) -> Vec<String> {
    let mut warnings = Vec::new();

    if !settings.input.path.exists() {
        warnings.push(format!(
            "Input file {} does not exist yet - a run would fail",
            settings.input.path.display()
        ));
    }

    if settings.output.save_mode == SaveMode::ErrorIfExists && settings.output.path.exists() {
        warnings.push(format!(
            "Output {} exists and save_mode is error_if_exists",
            settings.output.path.display()
        ));
    }

    if !settings.session.event_log.enabled {
        warnings.push("Event log disabled - job history will not be recorded".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Settings are valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Input: {}", summary.input);
            println!("  Output: {}", summary.output);
            println!(
                "  Memory: driver {}, executor {}",
                summary.driver_memory, summary.executor_memory
            );
            println!("  Shuffle partitions: {}", summary.shuffle_partitions);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Settings are invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(path: std::path::PathBuf) -> ValidateArgs {
        ValidateArgs {
            config: path,
            json: true,
        }
    }

    #[test]
    fn test_missing_file_is_invalid() {
        let result = validate_settings(&args("/no/such/loader.toml".into()));
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("File not found"));
    }

    #[test]
    fn test_valid_file_with_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("loader.toml");
        std::fs::write(
            &config,
            "[input]\npath = \"/no/such/input.json.gz\"\n\n[session.event_log]\nenabled = false\n",
        )
        .unwrap();

        let result = validate_settings(&args(config));
        assert!(result.valid);
        assert_eq!(result.warnings.map(|w| w.len()), Some(2));
        assert_eq!(result.summary.unwrap().shuffle_partitions, 100);
    }

    #[test]
    fn test_invalid_file_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("loader.toml");
        std::fs::write(&config, "[session]\nshuffle_partitions = 0\n").unwrap();

        let result = validate_settings(&args(config));
        assert!(!result.valid);
        assert!(result.error.is_some());
    }
}
