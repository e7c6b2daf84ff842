//! Run-level value types shared by the orchestrator and the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How malformed input records are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseMode {
    /// Malformed records become rows of nulls; bad fields become null
    #[default]
    Permissive,
    /// Malformed records are skipped
    DropMalformed,
    /// The first malformed record aborts the read
    FailFast,
}

/// What to do when the output path already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveMode {
    /// Replace the existing output entirely
    #[default]
    Overwrite,
    /// Fail if the output exists
    ErrorIfExists,
}

/// Where a dataset is retained between actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StorageLevel {
    /// Recomputed from the source on every action
    #[default]
    None,
    /// Materialized in memory after the first full scan
    MemoryOnly,
}

impl StorageLevel {
    pub fn use_memory(&self) -> bool {
        matches!(self, Self::MemoryOnly)
    }
}

impl fmt::Display for StorageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("NONE"),
            Self::MemoryOnly => f.write_str("MEMORY_ONLY"),
        }
    }
}

/// Result of a time-bounded row count.
///
/// `estimate` is exact when `complete` is true.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ApproxCount {
    pub estimate: u64,
    pub low: u64,
    pub high: u64,
    pub confidence: f64,
    pub complete: bool,
}

impl ApproxCount {
    pub fn exact(count: u64) -> Self {
        Self {
            estimate: count,
            low: count,
            high: count,
            confidence: 1.0,
            complete: true,
        }
    }
}

impl fmt::Display for ApproxCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.complete {
            write!(f, "{} (exact)", self.estimate)
        } else {
            write!(
                f,
                "{} (range [{}, {}], confidence {:.2})",
                self.estimate, self.low, self.high, self.confidence
            )
        }
    }
}

/// Lifecycle of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Created,
    SessionActive,
    Succeeded,
    Failed,
    Stopped,
}

impl RunPhase {
    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(&self, next: RunPhase) -> bool {
        use RunPhase::*;
        matches!(
            (self, next),
            (Created, SessionActive)
                | (SessionActive, Succeeded)
                | (SessionActive, Failed)
                | (Succeeded, Stopped)
                | (Failed, Stopped)
        )
    }
}

/// Outcome of a best-effort probe. Never an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome<T> {
    Available(T),
    Unavailable { reason: String },
}

impl<T> ProbeOutcome<T> {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    pub fn available(self) -> Option<T> {
        match self {
            Self::Available(value) => Some(value),
            Self::Unavailable { .. } => None,
        }
    }
}
