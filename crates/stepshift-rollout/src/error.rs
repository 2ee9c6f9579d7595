//! Failure taxonomy of a rollout.

use stepshift_core::{AliasId, RegistryError, ResourceId, VersionId};
use thiserror::Error;

use crate::manager::RolloutPhase;

/// Result type alias for rollout operations.
pub type RolloutResult<T> = Result<T, RolloutError>;

/// Every way a rollout invocation can fail. All of them are fatal to the
/// invocation; none is retried.
#[derive(Debug, Error)]
pub enum RolloutError {
    /// Bad strategy or monitor parameters, caught before any side effect.
    #[error("invalid rollout parameters: {0}")]
    Validation(String),

    /// Named alarm conditions that the provider does not know about.
    #[error("alarms {missing:?} do not exist")]
    Configuration { missing: Vec<String> },

    #[error(
        "there is no published version for {resource}; at least one published version is needed to create an alias"
    )]
    NoPublishedVersion { resource: ResourceId },

    /// The alias has no full-weight entry, so another rollout may be in flight.
    #[error(
        "alias {alias} has no routing entry with 100% of the traffic; a deploy might already be in progress"
    )]
    ConcurrentDeploy { alias: AliasId },

    /// An external call failed. Routing may or may not reflect the attempted change.
    #[error("registry call failed: {0}")]
    Registry(#[from] RegistryError),

    /// An alarm fired and traffic was reverted to the old version.
    #[error(
        "deployment of new version {new_version} failed; rolled back alias {alias} to old version {old_version}"
    )]
    RolledBack {
        alias: AliasId,
        new_version: VersionId,
        old_version: VersionId,
    },

    /// The wait was interrupted and traffic was reverted to the old version.
    #[error("rollout of alias {alias} cancelled; traffic reverted to {old_version}")]
    Cancelled { alias: AliasId, old_version: VersionId },

    /// Shutdown was requested outside a step; routing was left as it was.
    #[error("rollout of alias {alias} interrupted while {phase:?}; routing left unchanged")]
    Interrupted { alias: AliasId, phase: RolloutPhase },

    /// The process was stopped mid-call; routing may be left split.
    #[error(
        "rollout of alias {alias} aborted; inspect its routing and deploy again with --force if it is split"
    )]
    Aborted { alias: AliasId },
}

impl RolloutError {
    /// True when the failure left the alias fully on the old version.
    pub fn is_reverted(&self) -> bool {
        matches!(self, RolloutError::RolledBack { .. } | RolloutError::Cancelled { .. })
    }
}
