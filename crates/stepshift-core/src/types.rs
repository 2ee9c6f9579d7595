//! Identifiers and routing records shared across stepshift crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Total weight every routing configuration must add up to.
pub const FULL_WEIGHT: u8 = 100;

/// Stable identifier of a deployable resource (ARN-like).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identifier of the `sequence`-th published version of this resource.
    pub fn version(&self, sequence: u64) -> VersionId {
        VersionId(format!("{}:{sequence}", self.0))
    }

    /// Identifier of the named alias on this resource.
    pub fn alias(&self, name: &str) -> AliasId {
        AliasId {
            resource: self.clone(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one immutable published version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(String);

impl VersionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named alias of a resource. Displays as `{resource}:{name}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AliasId {
    pub resource: ResourceId,
    pub name: String,
}

impl AliasId {
    /// Composite key used by registries that store aliases in a flat table.
    pub fn table_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for AliasId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.name)
    }
}

// ── Routing ────────────────────────────────────────────────────────

/// One (version, weight) pair of an alias routing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingEntry {
    pub version: VersionId,
    pub weight: u8,
}

/// Weighted routing of an alias across published versions.
///
/// A steady-state config has exactly one entry at full weight. During a
/// rollout it holds the old and the new version.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingConfig(Vec<RoutingEntry>);

impl RoutingConfig {
    /// All traffic to `version`.
    pub fn single(version: VersionId) -> Self {
        Self(vec![RoutingEntry {
            version,
            weight: FULL_WEIGHT,
        }])
    }

    /// Traffic split between an old and a new version.
    pub fn split(old: VersionId, old_weight: u8, new: VersionId, new_weight: u8) -> Self {
        Self(vec![
            RoutingEntry {
                version: old,
                weight: old_weight,
            },
            RoutingEntry {
                version: new,
                weight: new_weight,
            },
        ])
    }

    pub fn entries(&self) -> &[RoutingEntry] {
        &self.0
    }

    pub fn total_weight(&self) -> u32 {
        self.0.iter().map(|e| u32::from(e.weight)).sum()
    }

    /// True when the weights add up to exactly 100.
    pub fn is_complete(&self) -> bool {
        self.total_weight() == u32::from(FULL_WEIGHT)
    }

    /// The version holding all of the traffic, if any.
    pub fn full_weight_version(&self) -> Option<&VersionId> {
        self.0
            .iter()
            .find(|e| e.weight == FULL_WEIGHT)
            .map(|e| &e.version)
    }
}

impl fmt::Display for RoutingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, entry) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}%", entry.version, entry.weight)?;
        }
        f.write_str("]")
    }
}

// ── Registry records ───────────────────────────────────────────────

/// A published version as reported by `list_versions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub id: VersionId,
    /// Unix timestamp (seconds) when the version was published.
    pub created_at: u64,
}

/// Current state of one named alarm condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionStatus {
    pub name: String,
    pub exists: bool,
    pub firing: bool,
}
