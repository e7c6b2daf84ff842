//! Settings parsing
//!
//! TOML (primary) and JSON.

use contracts::{ContractError, PipelineSettings};

/// Config file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML (recommended)
    Toml,
    /// JSON
    Json,
}

impl ConfigFormat {
    /// Infer format from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Parse TOML settings
pub fn parse_toml(content: &str) -> Result<PipelineSettings, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Parse JSON settings
pub fn parse_json(content: &str) -> Result<PipelineSettings, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Parse according to format
pub fn parse(content: &str, format: ConfigFormat) -> Result<PipelineSettings, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ByteSize, ParquetCompression};
    use std::path::PathBuf;

    #[test]
    fn test_parse_toml_full() {
        let content = r#"
[input]
path = "data/reviews.json.gz"
parse_mode = "permissive"
batch_size = 1024
max_partition_bytes = "64m"

[output]
path = "out/reviews.parquet"
compression = "zstd"

[session]
app_name = "ReviewsTest"
driver_memory = "2g"
executor_memory = "3g"
shuffle_partitions = 8

[session.event_log]
enabled = false
dir = "events"

[sampling]
sample_size = 3
count_timeout_secs = 5

[logging]
dir = "run-logs"
"#;
        let result = parse_toml(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let settings = result.unwrap();
        assert_eq!(settings.input.path, PathBuf::from("data/reviews.json.gz"));
        assert_eq!(settings.input.batch_size, 1024);
        assert_eq!(settings.input.max_partition_bytes, ByteSize::from_mib(64));
        assert_eq!(settings.output.compression, ParquetCompression::Zstd);
        assert_eq!(settings.session.driver_memory, ByteSize::from_gib(2));
        assert_eq!(settings.session.executor_memory, ByteSize::from_gib(3));
        assert!(!settings.session.event_log.enabled);
        assert_eq!(settings.sampling.sample_size, 3);
        assert_eq!(settings.logging.dir, PathBuf::from("run-logs"));
        assert_eq!(settings.logging.file_name, "amazon_reviews_processing.log");
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{ "output": { "path": "reviews.parquet" } }"#;
        let result = parse_json(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        assert_eq!(result.unwrap().session.shuffle_partitions, 100);
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let content = "invalid toml [[[";
        let result = parse_toml(content);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_parse_bad_memory_string() {
        let content = "[session]\ndriver_memory = \"lots\"\n";
        let err = parse_toml(content).unwrap_err();
        assert!(err.to_string().contains("TOML parse error"), "got: {err}");
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_extension("toml"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("TOML"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("json"),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
