//! # Contracts
//!
//! Shared interface types between the config loader, the compute engine and
//! the pipeline orchestrator. Business crates depend on this crate only;
//! reverse dependencies are prohibited.

mod error;
mod run;
mod schema;
mod settings;
mod units;

pub use error::*;
pub use run::*;
pub use schema::*;
pub use settings::*;
pub use units::{to_gigabytes, ByteSize};
