//! Version manager: drives one rollout of one alias end to end.
//!
//! The registry's alias routing is the only durable state. A routing
//! without a full-weight entry marks a rollout in flight (or one that died
//! midway); only `force` may override it. Every invocation re-derives its
//! state from the registry:
//!
//! ```text
//! Idle → Resolving → Bootstrapping                     (alias absent)
//!                  → ConcurrencyCheck → Shifting → Committed → prune
//!                                                 → RolledBack
//! ```

use stepshift_core::{
    AlarmProvider, AliasId, ResourceId, RoutingConfig, VersionId, VersionRegistry,
};
use tracing::{debug, info, warn};

use crate::alias::Alias;
use crate::error::{RolloutError, RolloutResult};
use crate::monitor::{AlarmMonitor, Watch};
use crate::strategy::DeployStrategy;

/// Below this many retained versions, pruning may leave nothing to roll back to.
pub const MIN_SAFE_HISTORY: usize = 3;

/// Current phase of a rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloutPhase {
    Idle,
    /// Verifying alarms and resolving old/new versions.
    Resolving,
    /// Alias absent: creating it on the new version.
    Bootstrapping,
    /// Checking the alias for an unfinished rollout.
    ConcurrencyCheck,
    /// The strategy is moving traffic.
    Shifting,
    /// All traffic on the new version.
    Committed,
    /// Traffic reverted to the old version.
    RolledBack,
}

/// How a successful `orchestrate` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloutOutcome {
    /// The alias did not exist and was created on the new version.
    Bootstrapped,
    /// The alias already pointed at the release version.
    Unchanged,
    /// An unfinished routing was overwritten with the new version.
    Forced,
    /// Traffic fully shifted; `pruned` old versions were deleted.
    Committed { pruned: usize },
    /// An alarm reverted traffic and the monitor was told not to raise.
    RolledBack,
}

/// Per-invocation knobs of `orchestrate`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RolloutOptions {
    /// Publish the current definition instead of releasing the newest version.
    pub publish_revision: bool,
    /// Versions kept after a committed rollout; 0 disables pruning.
    pub history_max: usize,
    /// Overwrite an alias that has no full-weight entry.
    pub force: bool,
}

/// Phase tracking for one `orchestrate` call. Never persisted.
struct RolloutSession {
    alias: AliasId,
    phase: RolloutPhase,
}

impl RolloutSession {
    fn new(alias: AliasId) -> Self {
        Self {
            alias,
            phase: RolloutPhase::Idle,
        }
    }

    fn enter(&mut self, phase: RolloutPhase) {
        debug!(alias = %self.alias, from = ?self.phase, to = ?phase, "rollout phase");
        self.phase = phase;
    }

    /// Stop with `Interrupted` if a shutdown was requested.
    fn checkpoint<A: AlarmProvider>(&self, monitor: &AlarmMonitor<A>) -> RolloutResult<()> {
        if monitor.interrupted() {
            warn!(alias = %self.alias, phase = ?self.phase, "rollout interrupted");
            return Err(RolloutError::Interrupted {
                alias: self.alias.clone(),
                phase: self.phase,
            });
        }
        Ok(())
    }
}

/// Manages versions and releases of one resource through its aliases.
pub struct VersionManager<R> {
    registry: R,
    resource: ResourceId,
}

impl<R: VersionRegistry> VersionManager<R> {
    pub fn new(registry: R, resource: ResourceId) -> Self {
        Self { registry, resource }
    }

    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }

    /// Upload `content` as the latest (unpublished) definition.
    pub async fn upload_revision(&self, content: &str) -> RolloutResult<()> {
        self.registry
            .upload_definition(&self.resource, content)
            .await?;
        info!(resource = %self.resource, bytes = content.len(), "uploaded latest revision");
        Ok(())
    }

    /// The newest published version, if any.
    pub async fn latest_published_version(&self) -> RolloutResult<Option<VersionId>> {
        let versions = self.registry.list_versions(&self.resource).await?;
        Ok(versions.into_iter().next().map(|v| v.id))
    }

    /// The version to release: freshly published, or the newest existing one.
    pub async fn resolve_release_version(&self, publish_revision: bool) -> RolloutResult<VersionId> {
        let version = if publish_revision {
            info!(resource = %self.resource, "publishing current revision as a new version");
            self.registry.publish_version(&self.resource).await?
        } else {
            self.latest_published_version()
                .await?
                .ok_or_else(|| RolloutError::NoPublishedVersion {
                    resource: self.resource.clone(),
                })?
        };
        info!(%version, "version to release");
        Ok(version)
    }

    /// The version holding 100% of `routing`, or `None` mid-rollout.
    pub fn resolve_live_version(routing: &RoutingConfig) -> Option<VersionId> {
        let live = routing.full_weight_version().cloned();
        if let Some(version) = &live {
            info!(%version, "old version still live");
        }
        live
    }

    /// Move `alias_name` to the release version using `strategy`, watching
    /// `monitor` throughout, then prune version history.
    pub async fn orchestrate<A: AlarmProvider>(
        &self,
        alias_name: &str,
        strategy: &DeployStrategy,
        monitor: &AlarmMonitor<A>,
        options: &RolloutOptions,
    ) -> RolloutResult<RolloutOutcome> {
        let alias_id = self.resource.alias(alias_name);
        let mut session = RolloutSession::new(alias_id.clone());
        session.enter(RolloutPhase::Resolving);

        if monitor.has_conditions() {
            monitor.verify().await?;
            info!(alarms = ?monitor.names(), "will monitor alarms during deploy");
        } else {
            info!("no alarms to monitor during deploy");
        }

        let new_version = self.resolve_release_version(options.publish_revision).await?;
        session.checkpoint(monitor)?;

        let routing = match self.registry.get_alias(&alias_id).await {
            Ok(routing) => {
                info!(alias = %alias_id, %routing, "alias already exists");
                routing
            }
            Err(err) if err.is_not_found() => {
                session.enter(RolloutPhase::Bootstrapping);
                self.create_alias(&alias_id, &new_version).await?;
                return Ok(RolloutOutcome::Bootstrapped);
            }
            Err(err) => return Err(err.into()),
        };

        session.enter(RolloutPhase::ConcurrencyCheck);
        let Some(old_version) = Self::resolve_live_version(&routing) else {
            warn!(alias = %alias_id, %routing, "alias has no routing entry with 100% of the traffic");
            if !options.force {
                return Err(RolloutError::ConcurrentDeploy { alias: alias_id });
            }
            warn!(
                alias = %alias_id,
                version = %new_version,
                "force override: pointing 100% of traffic to the new version without a rollout"
            );
            self.registry
                .update_alias(&alias_id, &RoutingConfig::single(new_version.clone()))
                .await?;
            warn!(alias = %alias_id, version = %new_version, "alias now pointing 100% to version");
            return Ok(RolloutOutcome::Forced);
        };

        if old_version == new_version {
            info!(alias = %alias_id, version = %old_version, "alias already points at version, no update necessary");
            return Ok(RolloutOutcome::Unchanged);
        }
        info!(
            alias = %alias_id,
            from = %old_version,
            to = %new_version,
            strategy = %strategy.kind(),
            "deploying"
        );
        session.enter(RolloutPhase::Shifting);
        let target = Alias::new(&self.registry, alias_id.clone(), old_version, new_version);

        match strategy.deploy(&target, monitor).await {
            Ok(Watch::Clear) => {}
            Ok(Watch::RolledBack) => {
                session.enter(RolloutPhase::RolledBack);
                warn!(alias = %alias_id, "deploy rolled back, version history left untouched");
                return Ok(RolloutOutcome::RolledBack);
            }
            Err(err) => {
                if err.is_reverted() {
                    session.enter(RolloutPhase::RolledBack);
                }
                return Err(err);
            }
        }

        session.enter(RolloutPhase::Committed);
        session.checkpoint(monitor)?;
        let pruned = self.prune_history(options.history_max).await?;
        info!(alias = %alias_id, "done");
        Ok(RolloutOutcome::Committed { pruned })
    }

    /// Delete every version older than the newest `max_kept + 1`.
    ///
    /// `max_kept == 0` disables pruning. Returns the number deleted.
    pub async fn prune_history(&self, max_kept: usize) -> RolloutResult<usize> {
        if max_kept == 0 {
            info!("version history pruning disabled");
            return Ok(0);
        }
        if max_kept < MIN_SAFE_HISTORY {
            warn!(
                max_kept,
                minimum = MIN_SAFE_HISTORY,
                "history_max is below the least history needed to roll back later"
            );
        }

        let versions = self.registry.list_versions(&self.resource).await?;
        if versions.len() <= max_kept {
            info!(
                versions = versions.len(),
                max_kept, "no version history deletion necessary"
            );
            return Ok(0);
        }

        info!(max_kept, "deleting version history older than max_kept versions ago");
        let mut deleted = 0;
        for version in versions.iter().skip(max_kept + 1) {
            self.registry.delete_version(&version.id).await?;
            info!(version = %version.id, "deleted old version");
            deleted += 1;
        }
        Ok(deleted)
    }

    async fn create_alias(&self, alias: &AliasId, version: &VersionId) -> RolloutResult<()> {
        info!(%alias, %version, "alias not found, creating it with 100% of traffic on the version");
        self.registry
            .create_alias(alias, &RoutingConfig::single(version.clone()))
            .await?;
        info!(
            %alias,
            %version,
            "created alias; first version for this alias, so no rollback is possible"
        );
        Ok(())
    }
}
