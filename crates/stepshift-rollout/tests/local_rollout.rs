//! End-to-end rollouts against the embedded redb registry.

use std::time::Duration;

use stepshift_core::{ResourceId, RoutingConfig, VersionRegistry};
use stepshift_rollout::*;
use stepshift_state::StateStore;

fn resource() -> ResourceId {
    ResourceId::new("orders")
}

fn store() -> StateStore {
    StateStore::open_in_memory().unwrap()
}

fn monitor(store: &StateStore, names: &[&str]) -> AlarmMonitor<StateStore> {
    AlarmMonitor::new(
        store.clone(),
        names.iter().map(|n| n.to_string()).collect(),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn publishing() -> RolloutOptions {
    RolloutOptions {
        publish_revision: true,
        ..Default::default()
    }
}

async fn live_routing(store: &StateStore) -> RoutingConfig {
    store.get_alias(&resource().alias("live")).await.unwrap()
}

#[tokio::test(start_paused = true)]
async fn first_release_bootstraps_then_linear_commits() {
    let store = store();
    let manager = VersionManager::new(store.clone(), resource());
    let strategy = DeployStrategy::linear(50, Duration::from_secs(10)).unwrap();

    manager.upload_revision("{\"rev\": 1}").await.unwrap();
    let outcome = manager
        .orchestrate("live", &strategy, &monitor(&store, &[]), &publishing())
        .await
        .unwrap();
    assert_eq!(outcome, RolloutOutcome::Bootstrapped);
    assert_eq!(live_routing(&store).await, RoutingConfig::single(resource().version(1)));

    manager.upload_revision("{\"rev\": 2}").await.unwrap();
    let outcome = manager
        .orchestrate("live", &strategy, &monitor(&store, &[]), &publishing())
        .await
        .unwrap();
    assert_eq!(outcome, RolloutOutcome::Committed { pruned: 0 });
    assert_eq!(
        live_routing(&store).await.full_weight_version(),
        Some(&resource().version(2))
    );
}

#[tokio::test(start_paused = true)]
async fn rerun_with_unchanged_definition_is_a_no_op() {
    let store = store();
    let manager = VersionManager::new(store.clone(), resource());
    let strategy = DeployStrategy::all_at_once(100, Duration::from_secs(1)).unwrap();

    manager.upload_revision("{\"rev\": 1}").await.unwrap();
    manager
        .orchestrate("live", &strategy, &monitor(&store, &[]), &publishing())
        .await
        .unwrap();

    let outcome = manager
        .orchestrate("live", &strategy, &monitor(&store, &[]), &publishing())
        .await
        .unwrap();
    assert_eq!(outcome, RolloutOutcome::Unchanged);
    assert_eq!(store.list_versions_of(&resource()).unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn alarm_during_canary_reverts_traffic() {
    let store = store();
    store.put_alarm("orders-5xx", false).unwrap();
    let manager = VersionManager::new(store.clone(), resource());
    let strategy = DeployStrategy::canary(10, Duration::from_secs(60)).unwrap();

    manager.upload_revision("{\"rev\": 1}").await.unwrap();
    manager
        .orchestrate("live", &strategy, &monitor(&store, &["orders-5xx"]), &publishing())
        .await
        .unwrap();

    manager.upload_revision("{\"rev\": 2}").await.unwrap();
    let trigger = store.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(12)).await;
        trigger.put_alarm("orders-5xx", true).unwrap();
    });

    let err = manager
        .orchestrate("live", &strategy, &monitor(&store, &["orders-5xx"]), &publishing())
        .await
        .unwrap_err();

    assert!(matches!(err, RolloutError::RolledBack { .. }));
    assert_eq!(live_routing(&store).await, RoutingConfig::single(resource().version(1)));
    assert!(store.get_version(&resource().version(2)).unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn unknown_alarm_blocks_rollout() {
    let store = store();
    let manager = VersionManager::new(store.clone(), resource());
    let strategy = DeployStrategy::canary(10, Duration::from_secs(60)).unwrap();

    manager.upload_revision("{\"rev\": 1}").await.unwrap();
    let err = manager
        .orchestrate("live", &strategy, &monitor(&store, &["nope"]), &publishing())
        .await
        .unwrap_err();

    assert!(matches!(err, RolloutError::Configuration { .. }));
    assert!(store.list_versions_of(&resource()).unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stuck_split_requires_force() {
    let store = store();
    let manager = VersionManager::new(store.clone(), resource());
    let strategy = DeployStrategy::linear(20, Duration::from_secs(1)).unwrap();

    for rev in 1..=3 {
        store.put_definition(&resource(), &format!("{{\"rev\": {rev}}}")).unwrap();
        store.publish(&resource()).unwrap();
    }
    let split = RoutingConfig::split(resource().version(1), 60, resource().version(2), 40);
    store.insert_alias(&resource().alias("live"), &split).unwrap();

    let err = manager
        .orchestrate("live", &strategy, &monitor(&store, &[]), &RolloutOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RolloutError::ConcurrentDeploy { .. }));

    let forced = RolloutOptions {
        force: true,
        ..Default::default()
    };
    let outcome = manager
        .orchestrate("live", &strategy, &monitor(&store, &[]), &forced)
        .await
        .unwrap();
    assert_eq!(outcome, RolloutOutcome::Forced);
    assert_eq!(live_routing(&store).await, RoutingConfig::single(resource().version(3)));
}

#[tokio::test(start_paused = true)]
async fn committed_rollout_prunes_history() {
    let store = store();
    let manager = VersionManager::new(store.clone(), resource());
    let strategy = DeployStrategy::all_at_once(100, Duration::from_secs(1)).unwrap();
    let options = RolloutOptions {
        publish_revision: true,
        history_max: 3,
        force: false,
    };

    for rev in 1..=7 {
        manager.upload_revision(&format!("{{\"rev\": {rev}}}")).await.unwrap();
        manager
            .orchestrate("live", &strategy, &monitor(&store, &[]), &options)
            .await
            .unwrap();
    }

    let remaining: Vec<String> = store
        .list_versions_of(&resource())
        .unwrap()
        .iter()
        .map(|v| v.id.to_string())
        .collect();
    assert_eq!(remaining, vec!["orders:7", "orders:6", "orders:5", "orders:4"]);
}
