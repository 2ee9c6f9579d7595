//! redb-backed version registry and alarm store.
//!
//! Provides typed operations over definitions, published versions, alias
//! routing, and alarm conditions, and exposes them to the orchestrator
//! through the `VersionRegistry` and `AlarmProvider` contracts. The store
//! supports both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use stepshift_core::{
    AlarmProvider, AliasId, ConditionStatus, RegistryResult, ResourceId, RoutingConfig,
    VersionId, VersionInfo, VersionRegistry,
};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(DEFINITIONS).map_err(map_err!(Table))?;
        txn.open_table(VERSIONS).map_err(map_err!(Table))?;
        txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
        txn.open_table(ALIASES).map_err(map_err!(Table))?;
        txn.open_table(ALARMS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Record helpers ─────────────────────────────────────────────

    fn get_record<T: DeserializeOwned>(&self, def: RecordTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let record = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn list_records<T: DeserializeOwned>(&self, def: RecordTable) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        Ok(results)
    }

    fn put_record<T: Serialize>(&self, def: RecordTable, key: &str, record: &T) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn remove_record(&self, def: RecordTable, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Definitions ────────────────────────────────────────────────

    /// Replace the latest (unpublished) definition of a resource.
    pub fn put_definition(&self, resource: &ResourceId, content: &str) -> StateResult<()> {
        let record = DefinitionRecord {
            resource: resource.clone(),
            content: content.to_string(),
            updated_at: epoch_secs(),
        };
        self.put_record(DEFINITIONS, resource.as_str(), &record)?;
        debug!(%resource, bytes = content.len(), "definition stored");
        Ok(())
    }

    // ── Versions ───────────────────────────────────────────────────

    /// Publish the current definition as a new version.
    ///
    /// If the definition is unchanged since the newest version, that
    /// version is returned instead of minting a duplicate.
    pub fn publish(&self, resource: &ResourceId) -> StateResult<VersionRecord> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let record = {
            let definitions = txn.open_table(DEFINITIONS).map_err(map_err!(Table))?;
            let definition: DefinitionRecord = match definitions
                .get(resource.as_str())
                .map_err(map_err!(Read))?
            {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => {
                    return Err(StateError::NotFound(format!(
                        "no definition uploaded for {resource}"
                    )));
                }
            };

            let mut versions = txn.open_table(VERSIONS).map_err(map_err!(Table))?;
            let latest = versions_of(&versions, resource)?.into_iter().next();
            if let Some(latest) = latest.filter(|v| v.content == definition.content) {
                debug!(%resource, version = %latest.id, "definition unchanged, reusing version");
                return Ok(latest);
            }

            let mut sequences = txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
            let sequence = sequences
                .get(resource.as_str())
                .map_err(map_err!(Read))?
                .map(|guard| guard.value())
                .unwrap_or(0)
                + 1;
            sequences
                .insert(resource.as_str(), sequence)
                .map_err(map_err!(Write))?;

            let record = VersionRecord {
                id: resource.version(sequence),
                resource: resource.clone(),
                sequence,
                content: definition.content,
                created_at: epoch_secs(),
            };
            let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
            versions
                .insert(record.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            record
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%resource, version = %record.id, "version published");
        Ok(record)
    }

    /// Versions of a resource, newest first.
    pub fn list_versions_of(&self, resource: &ResourceId) -> StateResult<Vec<VersionRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(VERSIONS).map_err(map_err!(Table))?;
        versions_of(&table, resource)
    }

    pub fn get_version(&self, id: &VersionId) -> StateResult<Option<VersionRecord>> {
        self.get_record(VERSIONS, id.as_str())
    }

    /// Delete a version. Returns true if it existed.
    ///
    /// A version that any alias still routes to, even at weight 0, is
    /// refused with `Conflict`.
    pub fn remove_version(&self, id: &VersionId) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let aliases = txn.open_table(ALIASES).map_err(map_err!(Table))?;
            for entry in aliases.iter().map_err(map_err!(Read))? {
                let (_, value) = entry.map_err(map_err!(Read))?;
                let record: AliasRecord =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                if record.routing.entries().iter().any(|e| &e.version == id) {
                    return Err(StateError::Conflict(format!(
                        "version {id} is still routed by alias {}",
                        record.alias
                    )));
                }
            }
            let mut versions = txn.open_table(VERSIONS).map_err(map_err!(Table))?;
            existed = versions.remove(id.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(version = %id, existed, "version deleted");
        Ok(existed)
    }

    // ── Aliases ────────────────────────────────────────────────────

    pub fn get_alias_record(&self, alias: &AliasId) -> StateResult<Option<AliasRecord>> {
        self.get_record(ALIASES, &alias.table_key())
    }

    /// Create an alias. Fails if it already exists.
    pub fn insert_alias(&self, alias: &AliasId, routing: &RoutingConfig) -> StateResult<()> {
        let key = alias.table_key();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            check_routing(&txn, alias, routing)?;
            let mut table = txn.open_table(ALIASES).map_err(map_err!(Table))?;
            if table.get(key.as_str()).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::AlreadyExists(format!("alias {alias}")));
            }
            let now = epoch_secs();
            let record = AliasRecord {
                alias: alias.clone(),
                routing: routing.clone(),
                created_at: now,
                updated_at: now,
            };
            let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%alias, %routing, "alias created");
        Ok(())
    }

    /// Replace the routing of an existing alias.
    pub fn replace_alias_routing(&self, alias: &AliasId, routing: &RoutingConfig) -> StateResult<()> {
        let key = alias.table_key();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            check_routing(&txn, alias, routing)?;
            let mut table = txn.open_table(ALIASES).map_err(map_err!(Table))?;
            let existing: AliasRecord = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(format!("alias {alias}"))),
            };
            let record = AliasRecord {
                routing: routing.clone(),
                updated_at: epoch_secs(),
                ..existing
            };
            let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%alias, %routing, "alias routing replaced");
        Ok(())
    }

    // ── Alarms ─────────────────────────────────────────────────────

    /// Insert or update an alarm condition.
    pub fn put_alarm(&self, name: &str, firing: bool) -> StateResult<()> {
        let record = AlarmRecord {
            name: name.to_string(),
            firing,
            updated_at: epoch_secs(),
        };
        self.put_record(ALARMS, name, &record)?;
        debug!(%name, firing, "alarm stored");
        Ok(())
    }

    pub fn get_alarm(&self, name: &str) -> StateResult<Option<AlarmRecord>> {
        self.get_record(ALARMS, name)
    }

    pub fn list_alarms(&self) -> StateResult<Vec<AlarmRecord>> {
        self.list_records(ALARMS)
    }

    /// Delete an alarm condition. Returns true if it existed.
    pub fn delete_alarm(&self, name: &str) -> StateResult<bool> {
        self.remove_record(ALARMS, name)
    }
}

/// Versions of `resource` found in `table`, newest first.
fn versions_of<T>(table: &T, resource: &ResourceId) -> StateResult<Vec<VersionRecord>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let mut results = Vec::new();
    for entry in table.iter().map_err(map_err!(Read))? {
        let (_, value) = entry.map_err(map_err!(Read))?;
        let record: VersionRecord =
            serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
        if &record.resource == resource {
            results.push(record);
        }
    }
    results.sort_by(|a, b| b.sequence.cmp(&a.sequence));
    Ok(results)
}

/// Reject routing that does not add up to 100 or names unknown versions.
fn check_routing(txn: &WriteTransaction, alias: &AliasId, routing: &RoutingConfig) -> StateResult<()> {
    if routing.entries().is_empty() || !routing.is_complete() {
        return Err(StateError::Invalid(format!(
            "routing {routing} for {alias} must add up to 100"
        )));
    }
    let versions = txn.open_table(VERSIONS).map_err(map_err!(Table))?;
    for entry in routing.entries() {
        let known = match versions.get(entry.version.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: VersionRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                record.resource == alias.resource
            }
            None => false,
        };
        if !known {
            return Err(StateError::Invalid(format!(
                "version {} is not a published version of {}",
                entry.version, alias.resource
            )));
        }
    }
    Ok(())
}

// ── Collaborator contracts ─────────────────────────────────────────

impl VersionRegistry for StateStore {
    async fn list_versions(&self, resource: &ResourceId) -> RegistryResult<Vec<VersionInfo>> {
        let versions = self.list_versions_of(resource)?;
        Ok(versions.iter().map(VersionRecord::info).collect())
    }

    async fn publish_version(&self, resource: &ResourceId) -> RegistryResult<VersionId> {
        Ok(self.publish(resource)?.id)
    }

    async fn delete_version(&self, version: &VersionId) -> RegistryResult<()> {
        if self.remove_version(version)? {
            Ok(())
        } else {
            Err(StateError::NotFound(format!("version {version}")).into())
        }
    }

    async fn get_alias(&self, alias: &AliasId) -> RegistryResult<RoutingConfig> {
        match self.get_alias_record(alias)? {
            Some(record) => Ok(record.routing),
            None => Err(StateError::NotFound(format!("alias {alias}")).into()),
        }
    }

    async fn create_alias(&self, alias: &AliasId, routing: &RoutingConfig) -> RegistryResult<()> {
        Ok(self.insert_alias(alias, routing)?)
    }

    async fn update_alias(&self, alias: &AliasId, routing: &RoutingConfig) -> RegistryResult<()> {
        Ok(self.replace_alias_routing(alias, routing)?)
    }

    async fn upload_definition(&self, resource: &ResourceId, content: &str) -> RegistryResult<()> {
        Ok(self.put_definition(resource, content)?)
    }
}

impl AlarmProvider for StateStore {
    async fn describe_conditions(&self, names: &[String]) -> RegistryResult<Vec<ConditionStatus>> {
        let mut statuses = Vec::with_capacity(names.len());
        for name in names {
            let record = self.get_alarm(name)?;
            statuses.push(ConditionStatus {
                name: name.clone(),
                exists: record.is_some(),
                firing: record.is_some_and(|r| r.firing),
            });
        }
        Ok(statuses)
    }
}
