//! Session configuration map.
//!
//! String keys and values, so every active setting can be listed verbatim;
//! typed getters parse on access.

use std::collections::BTreeMap;
use std::path::PathBuf;

use contracts::{ByteSize, ParquetCompression};

use crate::error::{EngineError, Result};

pub const APP_NAME: &str = "engine.app.name";
pub const APP_ID: &str = "engine.app.id";
pub const DRIVER_MEMORY: &str = "engine.driver.memory";
pub const EXECUTOR_MEMORY: &str = "engine.executor.memory";
pub const MEMORY_STORAGE_FRACTION: &str = "engine.memory.storageFraction";
pub const SHUFFLE_PARTITIONS: &str = "engine.sql.shuffle.partitions";
pub const EVENT_LOG_ENABLED: &str = "engine.eventLog.enabled";
pub const EVENT_LOG_DIR: &str = "engine.eventLog.dir";
pub const MAX_PARTITION_BYTES: &str = "engine.files.maxPartitionBytes";
pub const READER_BATCH_SIZE: &str = "engine.reader.batchSize";
pub const PARQUET_COMPRESSION: &str = "engine.sql.parquet.compression.codec";
pub const WORKER_THREADS: &str = "engine.worker.threads";

/// Ordered key/value configuration of one session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConf {
    entries: BTreeMap<String, String>,
}

impl SessionConf {
    /// Defaults applied before user settings
    pub fn with_defaults() -> Self {
        let mut conf = Self::default();
        conf.set(APP_NAME, "engine-app");
        conf.set(DRIVER_MEMORY, "1g");
        conf.set(EXECUTOR_MEMORY, "1g");
        conf.set(MEMORY_STORAGE_FRACTION, "0.6");
        conf.set(SHUFFLE_PARTITIONS, "200");
        conf.set(EVENT_LOG_ENABLED, "false");
        conf.set(MAX_PARTITION_BYTES, "128m");
        conf.set(READER_BATCH_SIZE, "8192");
        conf.set(PARQUET_COMPRESSION, "snappy");
        conf
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// All entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Entries whose key starts with `prefix`
    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.iter().filter(move |(k, _)| k.starts_with(prefix))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn required(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| EngineError::session_creation(format!("missing config key '{key}'")))
    }

    fn invalid(key: &str, value: &str, reason: impl std::fmt::Display) -> EngineError {
        EngineError::session_creation(format!("invalid value '{value}' for '{key}': {reason}"))
    }

    pub fn byte_size(&self, key: &str) -> Result<ByteSize> {
        let raw = self.required(key)?;
        raw.parse().map_err(|e| Self::invalid(key, raw, e))
    }

    pub fn usize(&self, key: &str) -> Result<usize> {
        let raw = self.required(key)?;
        raw.trim().parse().map_err(|e| Self::invalid(key, raw, e))
    }

    pub fn f64(&self, key: &str) -> Result<f64> {
        let raw = self.required(key)?;
        raw.trim().parse().map_err(|e| Self::invalid(key, raw, e))
    }

    pub fn bool(&self, key: &str) -> Result<bool> {
        let raw = self.required(key)?;
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(Self::invalid(key, raw, "expected a boolean")),
        }
    }

    pub fn path(&self, key: &str) -> Result<PathBuf> {
        self.required(key).map(PathBuf::from)
    }

    pub fn compression(&self) -> Result<ParquetCompression> {
        let raw = self.required(PARQUET_COMPRESSION)?;
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" | "uncompressed" => Ok(ParquetCompression::Uncompressed),
            "snappy" => Ok(ParquetCompression::Snappy),
            "zstd" => Ok(ParquetCompression::Zstd),
            _ => Err(Self::invalid(
                PARQUET_COMPRESSION,
                raw,
                "expected one of none, snappy, zstd",
            )),
        }
    }
}
