//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON settings files
//! - Validate settings legality
//! - Produce `PipelineSettings`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let settings = ConfigLoader::load_from_path(Path::new("loader.toml")).unwrap();
//! println!("Input: {}", settings.input.path.display());
//! ```

mod parser;
mod validator;

pub use contracts::PipelineSettings;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load settings from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load settings from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<PipelineSettings, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load settings from an optional path; `None` yields validated defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<PipelineSettings, ContractError> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => {
                let settings = PipelineSettings::default();
                validator::validate(&settings)?;
                Ok(settings)
            }
        }
    }

    /// Load settings from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<PipelineSettings, ContractError> {
        Self::parse_and_validate(content, format)
    }

    /// Check already-built settings (e.g. after CLI overrides)
    pub fn validate(settings: &PipelineSettings) -> Result<(), ContractError> {
        validator::validate(settings)
    }

    /// Serialize settings to TOML string
    pub fn to_toml(settings: &PipelineSettings) -> Result<String, ContractError> {
        toml::to_string_pretty(settings)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize settings to JSON string
    pub fn to_json(settings: &PipelineSettings) -> Result<String, ContractError> {
        serde_json::to_string_pretty(settings)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    /// Read configuration file content
    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }

    /// Parse and validate configuration content
    fn parse_and_validate(
        content: &str,
        format: ConfigFormat,
    ) -> Result<PipelineSettings, ContractError> {
        let settings = parser::parse(content, format)?;
        validator::validate(&settings)?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ByteSize;

    const MINIMAL_TOML: &str = r#"
[input]
path = "reviews.json.gz"

[output]
path = "reviews.parquet"

[session]
driver_memory = "1g"
executor_memory = "1g"
shuffle_partitions = 4
"#;

    #[test]
    fn test_load_from_str_toml() {
        let result = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let settings = result.unwrap();
        assert_eq!(settings.session.shuffle_partitions, 4);
        assert_eq!(settings.session.driver_memory, ByteSize::from_gib(1));
    }

    #[test]
    fn test_round_trip_toml() {
        let settings = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&settings).unwrap();
        let reloaded = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(settings.input.path, reloaded.input.path);
        assert_eq!(settings.session.driver_memory, reloaded.session.driver_memory);
    }

    #[test]
    fn test_round_trip_json() {
        let settings = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&settings).unwrap();
        let reloaded = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(settings.output.path, reloaded.output.path);
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = r#"
[input]
path = "same.json.gz"

[output]
path = "same.json.gz"
"#;
        let result = ConfigLoader::load_from_str(content, ConfigFormat::Toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("must differ"));
    }

    #[test]
    fn test_load_from_path_detects_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loader.json");
        std::fs::write(&path, r#"{ "sampling": { "sample_size": 7 } }"#).unwrap();

        let settings = ConfigLoader::load_from_path(&path).unwrap();
        assert_eq!(settings.sampling.sample_size, 7);

        let bad = dir.path().join("loader.yaml");
        std::fs::write(&bad, "sampling: {}").unwrap();
        let err = ConfigLoader::load_from_path(&bad).unwrap_err().to_string();
        assert!(err.contains("unsupported config format"), "got: {err}");
    }

    #[test]
    fn test_load_or_default() {
        let settings = ConfigLoader::load_or_default(None).unwrap();
        assert_eq!(settings.sampling.sample_size, 2);
    }
}
