//! Records persisted by the stepshift state store.

use serde::{Deserialize, Serialize};
use stepshift_core::{AliasId, ResourceId, RoutingConfig, VersionId, VersionInfo};

/// The mutable, not-yet-published definition of a resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DefinitionRecord {
    pub resource: ResourceId,
    pub content: String,
    /// Unix timestamp (seconds) of the last upload.
    pub updated_at: u64,
}

/// An immutable published version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionRecord {
    pub id: VersionId,
    pub resource: ResourceId,
    /// Per-resource publish order, starting at 1.
    pub sequence: u64,
    /// Definition content snapshotted at publish time.
    pub content: String,
    pub created_at: u64,
}

impl VersionRecord {
    pub fn info(&self) -> VersionInfo {
        VersionInfo {
            id: self.id.clone(),
            created_at: self.created_at,
        }
    }
}

/// Routing of one alias.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AliasRecord {
    pub alias: AliasId,
    pub routing: RoutingConfig,
    pub created_at: u64,
    pub updated_at: u64,
}

/// A named alarm condition and its current state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlarmRecord {
    pub name: String,
    pub firing: bool,
    pub updated_at: u64,
}

/// Seconds since the Unix epoch.
pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
