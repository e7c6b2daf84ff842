//! Settings validation
//!
//! Rules:
//! - derive-level bounds (`validator`): non-empty names, counts >= 1, confidence in (0, 1)
//! - input path != output path
//! - memory sizes large enough to hold a batch
//! - event log dir set when event logging is enabled

use contracts::{ByteSize, ContractError, PipelineSettings};
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// Smallest accepted driver / executor memory
const MIN_MEMORY: ByteSize = ByteSize::from_mib(32);

/// Validate PipelineSettings
///
/// Returns the first violation found, or Ok(()).
pub fn validate(settings: &PipelineSettings) -> Result<(), ContractError> {
    validate_bounds(settings)?;
    validate_paths(settings)?;
    validate_memory(settings)?;
    validate_event_log(settings)?;
    Ok(())
}

/// Derive-level bounds
fn validate_bounds(settings: &PipelineSettings) -> Result<(), ContractError> {
    match settings.validate() {
        Ok(()) => Ok(()),
        Err(errors) => {
            let (field, message) = first_violation(&errors, "")
                .unwrap_or_else(|| ("settings".to_string(), errors.to_string()));
            Err(ContractError::config_validation(field, message))
        }
    }
}

/// Depth-first walk to the first field error, keyed by dotted path.
fn first_violation(errors: &ValidationErrors, prefix: &str) -> Option<(String, String)> {
    let mut keys: Vec<_> = errors.errors().keys().collect();
    keys.sort();

    for key in keys {
        let path = if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}.{key}")
        };
        match &errors.errors()[key] {
            ValidationErrorsKind::Field(field_errors) => {
                if let Some(err) = field_errors.first() {
                    let message = err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("failed '{}' check", err.code));
                    return Some((path, message));
                }
            }
            ValidationErrorsKind::Struct(nested) => {
                if let Some(found) = first_violation(nested, &path) {
                    return Some(found);
                }
            }
            ValidationErrorsKind::List(items) => {
                for (idx, nested) in items {
                    if let Some(found) = first_violation(nested, &format!("{path}[{idx}]")) {
                        return Some(found);
                    }
                }
            }
        }
    }
    None
}

/// Input and output must differ; output overwrite would destroy the input
fn validate_paths(settings: &PipelineSettings) -> Result<(), ContractError> {
    if settings.input.path.as_os_str().is_empty() {
        return Err(ContractError::config_validation(
            "input.path",
            "input path cannot be empty",
        ));
    }
    if settings.output.path.as_os_str().is_empty() {
        return Err(ContractError::config_validation(
            "output.path",
            "output path cannot be empty",
        ));
    }
    if settings.input.path == settings.output.path {
        return Err(ContractError::config_validation(
            "output.path",
            format!(
                "output path '{}' must differ from input path",
                settings.output.path.display()
            ),
        ));
    }
    Ok(())
}

fn validate_memory(settings: &PipelineSettings) -> Result<(), ContractError> {
    let session = &settings.session;
    for (field, value) in [
        ("session.driver_memory", session.driver_memory),
        ("session.executor_memory", session.executor_memory),
    ] {
        if value < MIN_MEMORY {
            return Err(ContractError::config_validation(
                field,
                format!("memory must be >= {MIN_MEMORY}, got {value}"),
            ));
        }
    }

    if settings.input.max_partition_bytes.as_bytes() == 0 {
        return Err(ContractError::config_validation(
            "input.max_partition_bytes",
            "max_partition_bytes must be > 0",
        ));
    }
    Ok(())
}

fn validate_event_log(settings: &PipelineSettings) -> Result<(), ContractError> {
    let event_log = &settings.session.event_log;
    if event_log.enabled && event_log.dir.as_os_str().is_empty() {
        return Err(ContractError::config_validation(
            "session.event_log.dir",
            "event log dir cannot be empty when event logging is enabled",
        ));
    }
    Ok(())
}
