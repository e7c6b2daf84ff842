//! PipelineSettings - Config Loader output
//!
//! Every value the loader job used to hard-code: paths, session resources,
//! sampling/count budget and log locations. All sections default, so an empty
//! config file (or no file at all) yields the stock run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

use crate::{ByteSize, ParseMode, SaveMode};

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct PipelineSettings {
    /// Config version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Source file and parsing
    #[serde(default)]
    #[validate(nested)]
    pub input: InputSettings,

    /// Columnar output
    #[serde(default)]
    #[validate(nested)]
    pub output: OutputSettings,

    /// Compute session resources
    #[serde(default)]
    #[validate(nested)]
    pub session: SessionSettings,

    /// Sample and approximate count
    #[serde(default)]
    #[validate(nested)]
    pub sampling: SamplingSettings,

    /// Log file locations
    #[serde(default)]
    #[validate(nested)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InputSettings {
    /// Line-delimited JSON, optionally gzip compressed
    #[serde(default = "default_input_path")]
    pub path: PathBuf,

    #[serde(default)]
    pub parse_mode: ParseMode,

    /// Rows per in-memory record batch
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1))]
    pub batch_size: usize,

    /// Upper bound of one partition for splittable (uncompressed) input
    #[serde(default = "default_max_partition_bytes")]
    pub max_partition_bytes: ByteSize,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            path: default_input_path(),
            parse_mode: ParseMode::default(),
            batch_size: default_batch_size(),
            max_partition_bytes: default_max_partition_bytes(),
        }
    }
}

fn default_input_path() -> PathBuf {
    PathBuf::from("All_Amazon_Review.json.gz")
}

fn default_batch_size() -> usize {
    8192
}

fn default_max_partition_bytes() -> ByteSize {
    ByteSize::from_mib(128)
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OutputSettings {
    /// Output directory
    #[serde(default = "default_output_path")]
    pub path: PathBuf,

    #[serde(default)]
    pub save_mode: SaveMode,

    #[serde(default)]
    pub compression: ParquetCompression,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            save_mode: SaveMode::default(),
            compression: ParquetCompression::default(),
        }
    }
}

fn default_output_path() -> PathBuf {
    PathBuf::from("amazon_reviews.parquet")
}

/// Parquet page compression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParquetCompression {
    Uncompressed,
    #[default]
    Snappy,
    Zstd,
}

impl ParquetCompression {
    /// Infix used in part file names (`part-00000-<id>.snappy.parquet`)
    pub fn file_infix(&self) -> Option<&'static str> {
        match self {
            Self::Uncompressed => None,
            Self::Snappy => Some("snappy"),
            Self::Zstd => Some("zstd"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SessionSettings {
    #[serde(default = "default_app_name")]
    #[validate(length(min = 1))]
    pub app_name: String,

    #[serde(default = "default_memory")]
    pub driver_memory: ByteSize,

    #[serde(default = "default_memory")]
    pub executor_memory: ByteSize,

    #[serde(default = "default_shuffle_partitions")]
    #[validate(range(min = 1))]
    pub shuffle_partitions: u32,

    #[serde(default)]
    #[validate(nested)]
    pub event_log: EventLogSettings,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            driver_memory: default_memory(),
            executor_memory: default_memory(),
            shuffle_partitions: default_shuffle_partitions(),
            event_log: EventLogSettings::default(),
        }
    }
}

fn default_app_name() -> String {
    "AmazonReviewsLoader".to_string()
}

fn default_memory() -> ByteSize {
    ByteSize::from_gib(12)
}

fn default_shuffle_partitions() -> u32 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EventLogSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_event_log_dir")]
    pub dir: PathBuf,
}

impl Default for EventLogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_event_log_dir(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_event_log_dir() -> PathBuf {
    PathBuf::from("logs/spark_events")
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SamplingSettings {
    /// Rows rendered by the sample step
    #[serde(default = "default_sample_size")]
    #[validate(range(min = 1))]
    pub sample_size: usize,

    /// Time budget of the approximate count, in seconds
    #[serde(default = "default_count_timeout_secs")]
    #[validate(range(min = 1))]
    pub count_timeout_secs: u64,

    /// Confidence of the bounds reported with a partial count
    #[serde(default = "default_count_confidence")]
    #[validate(range(exclusive_min = 0.0, exclusive_max = 1.0))]
    pub count_confidence: f64,
}

impl SamplingSettings {
    pub fn count_timeout(&self) -> Duration {
        Duration::from_secs(self.count_timeout_secs)
    }
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            sample_size: default_sample_size(),
            count_timeout_secs: default_count_timeout_secs(),
            count_confidence: default_count_confidence(),
        }
    }
}

fn default_sample_size() -> usize {
    2
}

fn default_count_timeout_secs() -> u64 {
    60
}

fn default_count_confidence() -> f64 {
    0.95
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoggingSettings {
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_log_file_name")]
    #[validate(length(min = 1))]
    pub file_name: String,

    #[serde(default = "default_gpu_info_file_name")]
    #[validate(length(min = 1))]
    pub gpu_info_file_name: String,
}

impl LoggingSettings {
    pub fn log_file(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    pub fn gpu_info_file(&self) -> PathBuf {
        self.dir.join(&self.gpu_info_file_name)
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            file_name: default_log_file_name(),
            gpu_info_file_name: default_gpu_info_file_name(),
        }
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_file_name() -> String {
    "amazon_reviews_processing.log".to_string()
}

fn default_gpu_info_file_name() -> String {
    "gpu_info.txt".to_string()
}
