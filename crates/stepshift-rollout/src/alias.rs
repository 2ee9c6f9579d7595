//! The weighted routing record a rollout shifts.
//!
//! An `Alias` is bound to exactly two versions for its whole life: the
//! version that was live when the rollout started and the one being
//! released. Every change replaces the registry's routing wholesale.

use std::sync::atomic::{AtomicBool, Ordering};

use stepshift_core::{AliasId, FULL_WEIGHT, RoutingConfig, VersionId, VersionRegistry};
use tracing::{debug, info, warn};

use crate::error::{RolloutError, RolloutResult};

/// Routing target of one rollout.
pub struct Alias<'r, R> {
    registry: &'r R,
    id: AliasId,
    old_version: VersionId,
    new_version: VersionId,
    rolled_back: AtomicBool,
}

impl<'r, R: VersionRegistry> Alias<'r, R> {
    pub fn new(registry: &'r R, id: AliasId, old_version: VersionId, new_version: VersionId) -> Self {
        Self {
            registry,
            id,
            old_version,
            new_version,
            rolled_back: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &AliasId {
        &self.id
    }

    pub fn old_version(&self) -> &VersionId {
        &self.old_version
    }

    /// True once `rollback` has reverted routing.
    pub fn is_rolled_back(&self) -> bool {
        self.rolled_back.load(Ordering::SeqCst)
    }

    /// Route `old_weight`% to the old version and `new_weight`% to the new one.
    ///
    /// The weights must add up to 100. Registry failures are returned as-is;
    /// nothing is retried.
    pub async fn update_weights(&self, old_weight: u8, new_weight: u8) -> RolloutResult<()> {
        if u16::from(old_weight) + u16::from(new_weight) != u16::from(FULL_WEIGHT) {
            return Err(RolloutError::Validation(format!(
                "weights {old_weight}/{new_weight} must add up to {FULL_WEIGHT}"
            )));
        }

        let routing = RoutingConfig::split(
            self.old_version.clone(),
            old_weight,
            self.new_version.clone(),
            new_weight,
        );
        self.registry.update_alias(&self.id, &routing).await?;

        info!(
            alias = %self.id,
            old_version = %self.old_version,
            new_version = %self.new_version,
            old_weight,
            new_weight,
            "updated weights"
        );
        Ok(())
    }

    /// Point the alias 100% back at the old version.
    ///
    /// With `raise` set, a successful revert is reported as
    /// `RolloutError::RolledBack` so the invocation fails. The registry is
    /// written at most once per alias; later calls only repeat the outcome.
    pub async fn rollback(&self, raise: bool) -> RolloutResult<()> {
        if self.rolled_back.load(Ordering::SeqCst) {
            debug!(alias = %self.id, "already rolled back");
        } else {
            warn!(alias = %self.id, old_version = %self.old_version, "rolling back");
            let routing = RoutingConfig::single(self.old_version.clone());
            self.registry.update_alias(&self.id, &routing).await?;
            self.rolled_back.store(true, Ordering::SeqCst);
            warn!(
                alias = %self.id,
                old_version = %self.old_version,
                "old version back to receiving 100% of traffic"
            );
        }

        if raise {
            return Err(RolloutError::RolledBack {
                alias: self.id.clone(),
                new_version: self.new_version.clone(),
                old_version: self.old_version.clone(),
            });
        }
        Ok(())
    }
}
