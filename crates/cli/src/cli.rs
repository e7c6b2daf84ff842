//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use contracts::ByteSize;
use std::path::PathBuf;

/// Reviews Loader - load the Amazon reviews NDJSON dump into Parquet
#[derive(Parser, Debug)]
#[command(
    name = "reviews-loader",
    author,
    version,
    about = "Load the Amazon reviews corpus into Parquet",
    long_about = "Reads the gzip-compressed, line-delimited Amazon reviews dump under a fixed\n\
                  schema, logs a sample and an approximate row count, and writes the data\n\
                  as a Parquet directory.\n\n\
                  Without a subcommand, `run` is executed with the given options.",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    /// Increase console verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "REVIEWS_LOADER_VERBOSE")]
    pub verbose: u8,

    /// Console shows warnings and errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Console log format
    #[arg(
        long,
        value_enum,
        default_value = "plain",
        global = true,
        env = "REVIEWS_LOADER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub run: RunArgs,
}

impl Cli {
    /// Console level when `RUST_LOG` is unset; the log file always records DEBUG
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the loader (default)
    Run(RunArgs),

    /// Validate a settings file without running
    Validate(ValidateArgs),

    /// Display the resolved settings and the record schema
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Settings file (TOML or JSON); built-in defaults when omitted
    #[arg(short, long, env = "REVIEWS_LOADER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the input NDJSON path
    #[arg(long, env = "REVIEWS_LOADER_INPUT")]
    pub input: Option<PathBuf>,

    /// Override the Parquet output directory
    #[arg(long, env = "REVIEWS_LOADER_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Override the log directory
    #[arg(long, env = "REVIEWS_LOADER_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Override driver memory (e.g. 12g)
    #[arg(long, env = "REVIEWS_LOADER_DRIVER_MEMORY")]
    pub driver_memory: Option<ByteSize>,

    /// Override executor memory (e.g. 12g)
    #[arg(long, env = "REVIEWS_LOADER_EXECUTOR_MEMORY")]
    pub executor_memory: Option<ByteSize>,

    /// Override the shuffle partition count
    #[arg(long, env = "REVIEWS_LOADER_SHUFFLE_PARTITIONS")]
    pub shuffle_partitions: Option<u32>,

    /// Override the number of sample records logged
    #[arg(long, env = "REVIEWS_LOADER_SAMPLE_SIZE")]
    pub sample_size: Option<usize>,

    /// Override the approximate count budget in seconds
    #[arg(long, env = "REVIEWS_LOADER_COUNT_TIMEOUT")]
    pub count_timeout: Option<u64>,

    /// Disable the engine event log
    #[arg(long)]
    pub no_event_log: bool,

    /// Prometheus metrics port (disabled when omitted)
    #[arg(long, env = "REVIEWS_LOADER_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Resolve and validate settings, then exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `validate` command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Settings file to validate
    #[arg(short, long, env = "REVIEWS_LOADER_CONFIG")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Settings file; built-in defaults when omitted
    #[arg(short, long, env = "REVIEWS_LOADER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Also show the record schema
    #[arg(long)]
    pub schema: bool,
}

/// Console log format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Same lines as the log file
    #[default]
    Plain,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON structured logging
    Json,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Plain => Self::Plain,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
            LogFormat::Json => Self::Json,
        }
    }
}
