//! Recording fakes for the collaborator contracts.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use stepshift_core::{
    AlarmProvider, AliasId, ConditionStatus, RegistryError, RegistryResult, ResourceId,
    RoutingConfig, VersionId, VersionInfo, VersionRegistry,
};

pub fn resource() -> ResourceId {
    ResourceId::new("orders")
}

/// Mutating registry call, in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Publish(VersionId),
    DeleteVersion(VersionId),
    CreateAlias(RoutingConfig),
    UpdateAlias(RoutingConfig),
    Upload(String),
}

#[derive(Default)]
struct RegistryState {
    /// Newest first.
    versions: Vec<VersionInfo>,
    next_sequence: u64,
    alias: Option<RoutingConfig>,
    calls: Vec<Call>,
    fail_updates: bool,
    /// Raise the shutdown signal once this many alias updates landed.
    signal_after: Option<(usize, watch::Sender<bool>)>,
}

/// In-memory registry holding a single resource with at most one alias.
#[derive(Clone, Default)]
pub struct FakeRegistry {
    inner: Arc<Mutex<RegistryState>>,
}

impl FakeRegistry {
    /// Registry with versions `orders:1..=count` published.
    pub fn with_versions(count: u64) -> Self {
        let registry = Self::default();
        {
            let mut state = registry.inner.lock().unwrap();
            state.versions = (1..=count)
                .rev()
                .map(|seq| VersionInfo {
                    id: resource().version(seq),
                    created_at: 1000 + seq,
                })
                .collect();
            state.next_sequence = count + 1;
        }
        registry
    }

    pub fn with_alias(self, routing: RoutingConfig) -> Self {
        self.inner.lock().unwrap().alias = Some(routing);
        self
    }

    pub fn signal_after_updates(self, updates: usize, signal: watch::Sender<bool>) -> Self {
        self.inner.lock().unwrap().signal_after = Some((updates, signal));
        self
    }

    pub fn fail_updates(&self) {
        self.inner.lock().unwrap().fail_updates = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn routing(&self) -> Option<RoutingConfig> {
        self.inner.lock().unwrap().alias.clone()
    }

    pub fn update_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::UpdateAlias(_)))
            .count()
    }

    /// (old, new) weights of every two-entry update, in order.
    pub fn weight_steps(&self) -> Vec<(u8, u8)> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                Call::UpdateAlias(routing) if routing.entries().len() == 2 => {
                    Some((routing.entries()[0].weight, routing.entries()[1].weight))
                }
                _ => None,
            })
            .collect()
    }

    pub fn deleted(&self) -> Vec<VersionId> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                Call::DeleteVersion(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }
}

impl VersionRegistry for FakeRegistry {
    async fn list_versions(&self, _resource: &ResourceId) -> RegistryResult<Vec<VersionInfo>> {
        Ok(self.inner.lock().unwrap().versions.clone())
    }

    async fn publish_version(&self, resource: &ResourceId) -> RegistryResult<VersionId> {
        let mut state = self.inner.lock().unwrap();
        let id = resource.version(state.next_sequence);
        let created_at = 1000 + state.next_sequence;
        state.next_sequence += 1;
        state.versions.insert(
            0,
            VersionInfo {
                id: id.clone(),
                created_at,
            },
        );
        state.calls.push(Call::Publish(id.clone()));
        Ok(id)
    }

    async fn delete_version(&self, version: &VersionId) -> RegistryResult<()> {
        let mut state = self.inner.lock().unwrap();
        state.versions.retain(|v| &v.id != version);
        state.calls.push(Call::DeleteVersion(version.clone()));
        Ok(())
    }

    async fn get_alias(&self, alias: &AliasId) -> RegistryResult<RoutingConfig> {
        self.inner
            .lock()
            .unwrap()
            .alias
            .clone()
            .ok_or_else(|| RegistryError::NotFound(format!("alias {alias}")))
    }

    async fn create_alias(&self, _alias: &AliasId, routing: &RoutingConfig) -> RegistryResult<()> {
        let mut state = self.inner.lock().unwrap();
        state.alias = Some(routing.clone());
        state.calls.push(Call::CreateAlias(routing.clone()));
        Ok(())
    }

    async fn update_alias(&self, alias: &AliasId, routing: &RoutingConfig) -> RegistryResult<()> {
        let mut state = self.inner.lock().unwrap();
        if state.fail_updates {
            return Err(RegistryError::Backend(format!("throttled updating {alias}")));
        }
        state.alias = Some(routing.clone());
        state.calls.push(Call::UpdateAlias(routing.clone()));
        let updates = state
            .calls
            .iter()
            .filter(|c| matches!(c, Call::UpdateAlias(_)))
            .count();
        if let Some((after, signal)) = &state.signal_after {
            if updates >= *after {
                let _ = signal.send(true);
            }
        }
        Ok(())
    }

    async fn upload_definition(&self, _resource: &ResourceId, content: &str) -> RegistryResult<()> {
        let mut state = self.inner.lock().unwrap();
        state.calls.push(Call::Upload(content.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct AlarmState {
    known: HashSet<String>,
    /// 1-based describe call from which every known alarm is firing.
    fire_from_call: Option<usize>,
    describe_calls: usize,
}

/// Alarm provider that starts firing after a fixed number of queries.
#[derive(Clone, Default)]
pub struct FakeAlarms {
    inner: Arc<Mutex<AlarmState>>,
}

impl FakeAlarms {
    pub fn known(names: &[&str]) -> Self {
        let alarms = Self::default();
        alarms.inner.lock().unwrap().known = names.iter().map(|n| n.to_string()).collect();
        alarms
    }

    /// Fire on the `call`-th describe request and every one after it.
    pub fn firing_from_call(self, call: usize) -> Self {
        self.inner.lock().unwrap().fire_from_call = Some(call);
        self
    }

    pub fn describe_calls(&self) -> usize {
        self.inner.lock().unwrap().describe_calls
    }
}

impl AlarmProvider for FakeAlarms {
    async fn describe_conditions(&self, names: &[String]) -> RegistryResult<Vec<ConditionStatus>> {
        let mut state = self.inner.lock().unwrap();
        state.describe_calls += 1;
        let firing = state
            .fire_from_call
            .is_some_and(|from| state.describe_calls >= from);
        Ok(names
            .iter()
            .map(|name| {
                let exists = state.known.contains(name);
                ConditionStatus {
                    name: name.clone(),
                    exists,
                    firing: exists && firing,
                }
            })
            .collect())
    }
}
