use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use stepshift_core::config::{
    DEFAULT_HISTORY_MAX, DEFAULT_INCREMENT, DEFAULT_INTERVAL_SECS, DEFAULT_POLL_INTERVAL_SECS,
    DEFAULT_STRATEGY,
};
use stepshift_core::{ResourceId, StepshiftConfig};
use stepshift_rollout::{
    AlarmMonitor, DeployStrategy, RolloutError, RolloutOptions, RolloutOutcome, VersionManager,
};
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Args, Debug, Default)]
pub struct DeployArgs {
    /// Path to a stepshift.toml (default: ./stepshift.toml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Name of the resource to release
    #[arg(long)]
    pub resource: Option<String>,
    /// Name of the alias to shift
    #[arg(long)]
    pub alias: Option<String>,
    /// Deploy strategy: allatonce, canary or linear
    #[arg(long)]
    pub strategy: Option<String>,
    /// Alarm names to monitor during the deploy
    #[arg(long, num_args = 1..)]
    pub alarms: Vec<String>,
    /// Definition file to upload as the latest revision before publishing
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Publish the current revision as the next version
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub publish_revision: Option<bool>,
    /// Percentage of traffic moved per step (1-100)
    #[arg(long)]
    pub increment: Option<u32>,
    /// Seconds to hold and monitor at each step
    #[arg(long)]
    pub interval: Option<u64>,
    /// Seconds between alarm polls
    #[arg(long)]
    pub alarm_polling: Option<u64>,
    /// Versions to keep after a successful deploy (0 disables pruning)
    #[arg(long)]
    pub history_max: Option<usize>,
    /// Overwrite an alias that is not pointing 100% at one version.
    ///
    /// Use this to recover from a previous deploy that died without
    /// rolling back. It may overwrite a deploy that is still in progress.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub force: Option<bool>,
    /// Fail the deploy when an alarm triggers a rollback
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub raise_on_rollback: Option<bool>,
}

/// Deploy parameters after merging flags, stepshift.toml and defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploySettings {
    pub resource: String,
    pub alias: String,
    pub strategy: String,
    pub increment: u32,
    pub interval: Duration,
    pub alarms: Vec<String>,
    pub poll_interval: Duration,
    pub raise_on_rollback: bool,
    pub file: Option<PathBuf>,
    pub options: RolloutOptions,
}

impl DeploySettings {
    pub fn resolve(args: &DeployArgs, config: &StepshiftConfig) -> anyhow::Result<Self> {
        let deploy = config.deploy();
        let alarms = config.alarms();

        let resource = args
            .resource
            .clone()
            .or(deploy.resource)
            .context("no resource given (use --resource or [deploy].resource)")?;
        let alias = args
            .alias
            .clone()
            .or(deploy.alias)
            .context("no alias given (use --alias or [deploy].alias)")?;

        let names = if args.alarms.is_empty() {
            alarms.names.unwrap_or_default()
        } else {
            args.alarms.clone()
        };

        Ok(Self {
            resource,
            alias,
            strategy: args
                .strategy
                .clone()
                .or(deploy.strategy)
                .unwrap_or_else(|| DEFAULT_STRATEGY.to_string()),
            increment: args
                .increment
                .or(deploy.increment)
                .unwrap_or(DEFAULT_INCREMENT),
            interval: Duration::from_secs(
                args.interval
                    .or(deploy.interval)
                    .unwrap_or(DEFAULT_INTERVAL_SECS),
            ),
            alarms: names,
            poll_interval: Duration::from_secs(
                args.alarm_polling
                    .or(alarms.poll_interval)
                    .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
            ),
            raise_on_rollback: args
                .raise_on_rollback
                .or(alarms.raise_on_rollback)
                .unwrap_or(true),
            file: args.file.clone().or(deploy.file.map(PathBuf::from)),
            options: RolloutOptions {
                publish_revision: args
                    .publish_revision
                    .or(deploy.publish_revision)
                    .unwrap_or(false),
                history_max: args
                    .history_max
                    .or(deploy.history_max)
                    .unwrap_or(DEFAULT_HISTORY_MAX),
                force: args.force.or(deploy.force).unwrap_or(false),
            },
        })
    }
}

pub async fn deploy(data_dir: &Path, args: DeployArgs) -> anyhow::Result<()> {
    let config = StepshiftConfig::load(args.config.as_deref())?;
    let settings = DeploySettings::resolve(&args, &config)?;

    // Parameters are checked before anything touches the registry.
    let strategy = DeployStrategy::from_name(&settings.strategy, settings.increment, settings.interval)?;

    let store = super::open_store(data_dir)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = AlarmMonitor::new(store.clone(), settings.alarms.clone(), settings.poll_interval)?
        .with_raise_on_rollback(settings.raise_on_rollback)
        .with_shutdown(shutdown_rx);

    let resource = ResourceId::new(&settings.resource);
    let alias = resource.alias(&settings.alias);
    let manager = VersionManager::new(store, resource);

    let content = match &settings.file {
        Some(file) => Some(
            std::fs::read_to_string(file)
                .with_context(|| format!("reading definition {}", file.display()))?,
        ),
        None => None,
    };

    let rollout = async {
        if let Some(content) = &content {
            manager.upload_revision(content).await?;
        }
        manager
            .orchestrate(&settings.alias, &strategy, &monitor, &settings.options)
            .await
    };

    let outcome = tokio::select! {
        outcome = rollout => outcome?,
        () = escalate(shutdown_tx, tokio::signal::ctrl_c) => {
            return Err(RolloutError::Aborted { alias }.into());
        }
    };

    match outcome {
        RolloutOutcome::Committed { pruned } => {
            info!(alias = %settings.alias, pruned, "deploy complete")
        }
        RolloutOutcome::RolledBack => {
            warn!(alias = %settings.alias, "deploy rolled back, not raising as configured")
        }
        other => info!(alias = %settings.alias, outcome = ?other, "deploy complete"),
    }
    Ok(())
}

/// Raise `shutdown` on the first interrupt and resolve on the second.
///
/// After the first one the rollout reverts or stops at its next step; the
/// second abandons whatever registry call is in flight.
async fn escalate<F, Fut>(shutdown: watch::Sender<bool>, mut interrupt: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if interrupt().await.is_err() {
        return std::future::pending().await;
    }
    warn!("interrupt received, stopping rollout; interrupt again to abort immediately");
    let _ = shutdown.send(true);

    if interrupt().await.is_err() {
        return std::future::pending().await;
    }
    error!("second interrupt received, aborting rollout");
}
