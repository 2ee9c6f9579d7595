//! Shared vocabulary for the stepshift crates.
//!
//! Identifiers, routing records, the `VersionRegistry` / `AlarmProvider`
//! collaborator contracts, and the `stepshift.toml` configuration file.

pub mod config;
pub mod error;
pub mod registry;
pub mod types;

pub use config::StepshiftConfig;
pub use error::{RegistryError, RegistryResult};
pub use registry::{AlarmProvider, VersionRegistry};
pub use types::*;
