//! Collaborator contracts consumed by the rollout orchestrator.
//!
//! Both traits are implemented by whatever backs a deployment: the embedded
//! redb store in `stepshift-state`, or a fake in tests. Handles are passed in
//! explicitly; nothing in stepshift reaches for a global client.

use std::future::Future;

use crate::error::RegistryResult;
use crate::types::{AliasId, ConditionStatus, ResourceId, RoutingConfig, VersionId, VersionInfo};

/// Versions and alias routing of versioned resources.
pub trait VersionRegistry: Send + Sync {
    /// Published versions of `resource`, newest first.
    fn list_versions(
        &self,
        resource: &ResourceId,
    ) -> impl Future<Output = RegistryResult<Vec<VersionInfo>>> + Send;

    /// Snapshot the current definition of `resource` as a new version.
    fn publish_version(
        &self,
        resource: &ResourceId,
    ) -> impl Future<Output = RegistryResult<VersionId>> + Send;

    fn delete_version(&self, version: &VersionId) -> impl Future<Output = RegistryResult<()>> + Send;

    /// Current routing of `alias`. Fails with `RegistryError::NotFound` if
    /// the alias does not exist.
    fn get_alias(&self, alias: &AliasId) -> impl Future<Output = RegistryResult<RoutingConfig>> + Send;

    fn create_alias(
        &self,
        alias: &AliasId,
        routing: &RoutingConfig,
    ) -> impl Future<Output = RegistryResult<()>> + Send;

    /// Replace the routing of an existing alias wholesale.
    fn update_alias(
        &self,
        alias: &AliasId,
        routing: &RoutingConfig,
    ) -> impl Future<Output = RegistryResult<()>> + Send;

    /// Replace the unversioned latest definition of `resource`.
    fn upload_definition(
        &self,
        resource: &ResourceId,
        content: &str,
    ) -> impl Future<Output = RegistryResult<()>> + Send;
}

/// Source of named health conditions (alarms).
pub trait AlarmProvider: Send + Sync {
    /// Status of each requested name, in request order. Names unknown to the
    /// provider come back with `exists == false`.
    fn describe_conditions(
        &self,
        names: &[String],
    ) -> impl Future<Output = RegistryResult<Vec<ConditionStatus>>> + Send;
}
