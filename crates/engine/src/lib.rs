//! # Engine
//!
//! In-process compute session used by the loader pipeline.
//!
//! - [`ComputeSession`] / [`Dataset`]: the interface the pipeline drives
//! - [`InProcessSession`]: partitioned NDJSON scans on the blocking pool,
//!   memory cache with a storage budget, staged Parquet output
//! - [`MockSession`]: call recording and failure injection for tests

pub mod conf;
mod count;
mod dataset;
mod display;
mod error;
mod event_log;
mod in_process;
mod mock;
pub mod reader;
mod session;
pub mod writer;

pub use conf::SessionConf;
pub use dataset::InProcessDataset;
pub use display::render_table;
pub use error::{EngineError, Result};
pub use event_log::{EngineEvent, EventLog};
pub use in_process::{InProcessSession, SessionBuilder};
pub use mock::{MockConfig, MockDataset, MockSession};
pub use session::{ComputeSession, Dataset, LocalDataset, MemoryStatus, WriteSummary};
pub use writer::directory_size;
