//! Alarm monitor. Watches named alarm conditions while traffic shifts.
//!
//! `check_during` is the wait primitive every strategy uses between weight
//! steps. With no alarm names configured it simply holds for the window;
//! otherwise it polls the provider and reverts the alias the moment any
//! condition fires. The wait can be interrupted through a shutdown
//! signal, in which case the alias is reverted as well.

use std::time::Duration;

use stepshift_core::{AlarmProvider, VersionRegistry};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::alias::Alias;
use crate::error::{RolloutError, RolloutResult};

/// Result of one monitoring window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Watch {
    /// The window elapsed with no alarm firing.
    Clear,
    /// An alarm fired and the alias was reverted without raising.
    RolledBack,
}

/// Polls a set of named alarms for the duration of each rollout step.
pub struct AlarmMonitor<A> {
    provider: A,
    names: Vec<String>,
    poll_interval: Duration,
    raise_on_rollback: bool,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<A: AlarmProvider> AlarmMonitor<A> {
    /// Create a monitor for `names`, polled every `poll_interval`.
    ///
    /// An empty name set disables monitoring: windows are held on a timer.
    pub fn new(provider: A, names: Vec<String>, poll_interval: Duration) -> RolloutResult<Self> {
        if poll_interval.is_zero() {
            return Err(RolloutError::Validation(
                "alarm poll interval must be at least 1 second".to_string(),
            ));
        }
        Ok(Self {
            provider,
            names,
            poll_interval,
            raise_on_rollback: true,
            shutdown: None,
        })
    }

    /// Whether a rollback triggered by an alarm fails the rollout (default)
    /// or only stops it.
    pub fn with_raise_on_rollback(mut self, raise: bool) -> Self {
        self.raise_on_rollback = raise;
        self
    }

    /// Interrupt monitoring windows once `shutdown` flips to `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// True once the shutdown signal has been raised.
    pub fn interrupted(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    pub fn has_conditions(&self) -> bool {
        !self.names.is_empty()
    }

    /// Fail with `Configuration` naming every alarm the provider does not know.
    pub async fn verify(&self) -> RolloutResult<()> {
        let statuses = self.provider.describe_conditions(&self.names).await?;
        let missing: Vec<String> = self
            .names
            .iter()
            .filter(|name| !statuses.iter().any(|s| &s.name == *name && s.exists))
            .cloned()
            .collect();

        if !missing.is_empty() {
            return Err(RolloutError::Configuration { missing });
        }
        debug!(alarms = ?self.names, "all alarms exist");
        Ok(())
    }

    /// True if any watched alarm is currently firing.
    pub async fn is_firing(&self) -> RolloutResult<bool> {
        let statuses = self.provider.describe_conditions(&self.names).await?;
        let firing: Vec<&str> = statuses
            .iter()
            .filter(|s| s.exists && s.firing)
            .map(|s| s.name.as_str())
            .collect();

        if firing.is_empty() {
            return Ok(false);
        }
        warn!(alarms = %firing.join(", "), "alarms triggered");
        Ok(true)
    }

    /// Hold for `duration`, reverting `target` if an alarm fires meanwhile.
    ///
    /// Alarms are checked at the start of the window, every poll interval,
    /// and once more when the window closes, so a poll interval longer than
    /// the window still yields a check. `target` is reverted at most once.
    pub async fn check_during<R: VersionRegistry>(
        &self,
        target: &Alias<'_, R>,
        duration: Duration,
    ) -> RolloutResult<Watch> {
        let mut shutdown = self.shutdown.clone();

        if !self.has_conditions() {
            info!(secs = duration.as_secs(), "no alarms to monitor, holding");
            if hold(&mut shutdown, duration).await {
                return self.cancel(target).await;
            }
            return Ok(Watch::Clear);
        }

        if self.poll_interval > duration {
            warn!(
                poll_secs = self.poll_interval.as_secs(),
                window_secs = duration.as_secs(),
                "alarm poll interval is longer than the monitoring window"
            );
        }

        let start = Instant::now();
        loop {
            if self.is_firing().await? {
                target.rollback(self.raise_on_rollback).await?;
                return Ok(Watch::RolledBack);
            }

            let elapsed = start.elapsed();
            if elapsed >= duration {
                return Ok(Watch::Clear);
            }
            debug!(alias = %target.id(), "monitoring alarms, none triggered");

            let nap = self.poll_interval.min(duration - elapsed);
            if hold(&mut shutdown, nap).await {
                return self.cancel(target).await;
            }
        }
    }

    /// Revert `target` after a shutdown and fail with `Cancelled`.
    pub(crate) async fn cancel<R: VersionRegistry>(
        &self,
        target: &Alias<'_, R>,
    ) -> RolloutResult<Watch> {
        warn!(alias = %target.id(), "rollout interrupted, reverting traffic");
        target.rollback(false).await?;
        Err(RolloutError::Cancelled {
            alias: target.id().clone(),
            old_version: target.old_version().clone(),
        })
    }
}

/// Sleep for `duration`. Returns true if the shutdown signal fired first.
async fn hold(shutdown: &mut Option<watch::Receiver<bool>>, duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = shutdown_requested(shutdown) => true,
    }
}

/// Resolves once the signal reads `true`. Never resolves without a signal,
/// or after its sender is gone.
async fn shutdown_requested(shutdown: &mut Option<watch::Receiver<bool>>) {
    let Some(rx) = shutdown else {
        return std::future::pending().await;
    };
    loop {
        let requested = *rx.borrow_and_update();
        if requested {
            return;
        }
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeAlarms, FakeRegistry, resource};
    use stepshift_core::RoutingConfig;

    fn alias(registry: &FakeRegistry) -> Alias<'_, FakeRegistry> {
        Alias::new(
            registry,
            resource().alias("live"),
            resource().version(1),
            resource().version(2),
        )
    }

    fn monitor(alarms: &FakeAlarms, names: &[&str], poll_secs: u64) -> AlarmMonitor<FakeAlarms> {
        AlarmMonitor::new(
            alarms.clone(),
            names.iter().map(|n| n.to_string()).collect(),
            Duration::from_secs(poll_secs),
        )
        .unwrap()
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let result = AlarmMonitor::new(FakeAlarms::default(), vec![], Duration::ZERO);
        assert!(matches!(result, Err(RolloutError::Validation(_))));
    }

    #[tokio::test]
    async fn verify_lists_every_missing_alarm() {
        let alarms = FakeAlarms::known(&["errors"]);
        let err = monitor(&alarms, &["errors", "typo-1", "typo-2"], 60)
            .verify()
            .await
            .unwrap_err();
        match err {
            RolloutError::Configuration { missing } => {
                assert_eq!(missing, vec!["typo-1".to_string(), "typo-2".to_string()]);
            }
            other => panic!("expected Configuration, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn verify_passes_when_all_exist() {
        let alarms = FakeAlarms::known(&["errors", "latency"]);
        monitor(&alarms, &["errors", "latency"], 60).verify().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn empty_alarm_set_waits_full_window_without_querying() {
        let registry = FakeRegistry::with_versions(2);
        let alarms = FakeAlarms::default();
        let monitor = monitor(&alarms, &[], 60);

        let started = Instant::now();
        let watch = monitor
            .check_during(&alias(&registry), Duration::from_secs(300))
            .await
            .unwrap();

        assert_eq!(watch, Watch::Clear);
        assert_eq!(started.elapsed(), Duration::from_secs(300));
        assert_eq!(alarms.describe_calls(), 0);
        assert!(registry.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_alarms_poll_through_window() {
        let registry = FakeRegistry::with_versions(2);
        let alarms = FakeAlarms::known(&["errors"]);
        let monitor = monitor(&alarms, &["errors"], 3);

        let started = Instant::now();
        let watch = monitor
            .check_during(&alias(&registry), Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(watch, Watch::Clear);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
        // t = 0, 3, 6, 9, 10
        assert_eq!(alarms.describe_calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_longer_than_window_still_checks() {
        let registry = FakeRegistry::with_versions(2);
        let alarms = FakeAlarms::known(&["errors"]);
        let monitor = monitor(&alarms, &["errors"], 60);

        monitor
            .check_during(&alias(&registry), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(alarms.describe_calls() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn firing_alarm_rolls_back_once_and_raises() {
        let registry = FakeRegistry::with_versions(2);
        let alarms = FakeAlarms::known(&["errors"]).firing_from_call(2);
        let monitor = monitor(&alarms, &["errors"], 10);

        let started = Instant::now();
        let err = monitor
            .check_during(&alias(&registry), Duration::from_secs(120))
            .await
            .unwrap_err();

        assert!(matches!(err, RolloutError::RolledBack { .. }));
        assert_eq!(started.elapsed(), Duration::from_secs(10));
        assert_eq!(alarms.describe_calls(), 2);
        assert_eq!(registry.update_count(), 1);
        assert_eq!(registry.routing(), Some(RoutingConfig::single(resource().version(1))));
    }

    #[tokio::test(start_paused = true)]
    async fn firing_alarm_without_raise_stops_polling() {
        let registry = FakeRegistry::with_versions(2);
        let alarms = FakeAlarms::known(&["errors"]).firing_from_call(1);
        let monitor = monitor(&alarms, &["errors"], 10).with_raise_on_rollback(false);

        let watch = monitor
            .check_during(&alias(&registry), Duration::from_secs(120))
            .await
            .unwrap();

        assert_eq!(watch, Watch::RolledBack);
        assert_eq!(alarms.describe_calls(), 1);
        assert_eq!(registry.update_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_hold_and_reverts() {
        let registry = FakeRegistry::with_versions(2);
        let (tx, rx) = watch::channel(false);
        let monitor = monitor(&FakeAlarms::default(), &[], 60).with_shutdown(rx);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            let _ = tx.send(true);
        });

        let started = Instant::now();
        let err = monitor
            .check_during(&alias(&registry), Duration::from_secs(600))
            .await
            .unwrap_err();

        assert!(matches!(err, RolloutError::Cancelled { .. }));
        assert_eq!(started.elapsed(), Duration::from_secs(30));
        assert_eq!(registry.routing(), Some(RoutingConfig::single(resource().version(1))));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_polling_and_reverts() {
        let registry = FakeRegistry::with_versions(2);
        let alarms = FakeAlarms::known(&["errors"]);
        let (tx, rx) = watch::channel(false);
        let monitor = monitor(&alarms, &["errors"], 10).with_shutdown(rx);
        assert!(!monitor.interrupted());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(25)).await;
            let _ = tx.send(true);
        });

        let started = Instant::now();
        let err = monitor
            .check_during(&alias(&registry), Duration::from_secs(120))
            .await
            .unwrap_err();

        assert!(matches!(err, RolloutError::Cancelled { .. }));
        assert!(monitor.interrupted());
        assert_eq!(started.elapsed(), Duration::from_secs(25));
        // t = 0, 10, 20
        assert_eq!(alarms.describe_calls(), 3);
        assert_eq!(registry.update_count(), 1);
        assert_eq!(registry.routing(), Some(RoutingConfig::single(resource().version(1))));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_shutdown_sender_never_cancels() {
        let registry = FakeRegistry::with_versions(2);
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let monitor = monitor(&FakeAlarms::default(), &[], 60).with_shutdown(rx);

        let watch = monitor
            .check_during(&alias(&registry), Duration::from_secs(90))
            .await
            .unwrap();
        assert_eq!(watch, Watch::Clear);
    }
}
