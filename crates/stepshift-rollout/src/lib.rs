//! stepshift gradual rollout: alarm-gated traffic shifting between versions.
//!
//! This crate moves an alias of a versioned resource from its live version
//! to a newly released one. Traffic moves all at once, as a canary, or in
//! linear steps; between steps named alarms are polled, and the alias is
//! reverted to the old version the moment one fires.
//!
//! # Components
//!
//! - **`alias`**: the routing record being shifted (weights, rollback)
//! - **`monitor`**: alarm polling during each step's window
//! - **`strategy`**: step plans (AllAtOnce, Canary, Linear)
//! - **`manager`**: version resolution, the rollout state machine, pruning

pub mod alias;
pub mod error;
pub mod manager;
pub mod monitor;
pub mod strategy;

#[cfg(test)]
mod testing;

pub use alias::Alias;
pub use error::{RolloutError, RolloutResult};
pub use manager::{RolloutOptions, RolloutOutcome, RolloutPhase, VersionManager};
pub use monitor::{AlarmMonitor, Watch};
pub use strategy::{DeployStrategy, Step, StepConfig, StrategyKind};
