//! # Reviews Loader
//!
//! Command-line loader for the Amazon reviews corpus.
//!
//! Provides:
//! - Settings resolution (file, environment, flags)
//! - Pipeline orchestration with guaranteed session shutdown
//! - `run`, `validate` and `info` commands

pub mod cli;
pub mod commands;
pub mod error;
pub mod pipeline;
pub mod settings;
