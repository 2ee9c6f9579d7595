//! Deploy strategies: all-at-once, canary and linear.
//!
//! A strategy is a fixed plan of weight steps. Each step routes a share
//! of traffic to the new version and optionally holds a monitoring window
//! before the next one.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stepshift_core::{AlarmProvider, FULL_WEIGHT, VersionRegistry};
use tracing::info;

use crate::alias::Alias;
use crate::error::{RolloutError, RolloutResult};
use crate::monitor::{AlarmMonitor, Watch};

/// Name of a strategy, as given on the command line or in stepshift.toml.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    AllAtOnce,
    Canary,
    Linear,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::AllAtOnce => "allatonce",
            StrategyKind::Canary => "canary",
            StrategyKind::Linear => "linear",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = RolloutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "allatonce" => Ok(StrategyKind::AllAtOnce),
            "canary" => Ok(StrategyKind::Canary),
            "linear" => Ok(StrategyKind::Linear),
            other => Err(RolloutError::Validation(format!(
                "unknown strategy {other:?}, expected allatonce, canary or linear"
            ))),
        }
    }
}

/// Weight increment and hold time shared by every strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepConfig {
    increment: u8,
    interval: Duration,
}

impl StepConfig {
    /// `increment` must lie in 1..=100.
    pub fn new(increment: u32, interval: Duration) -> RolloutResult<Self> {
        if increment < 1 {
            return Err(RolloutError::Validation(format!(
                "increment must be at least 1, got {increment}"
            )));
        }
        if increment > u32::from(FULL_WEIGHT) {
            return Err(RolloutError::Validation(format!(
                "increment must be at most {FULL_WEIGHT}, got {increment}"
            )));
        }
        Ok(Self {
            increment: increment as u8,
            interval,
        })
    }

    /// Percentage of traffic moved per step.
    pub fn increment(&self) -> u8 {
        self.increment
    }

    /// Monitoring window held after a step.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// One planned weight change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// Share of traffic on the new version after this step.
    pub new_weight: u8,
    /// Whether a monitoring window follows the step.
    pub monitored: bool,
}

impl Step {
    pub fn old_weight(&self) -> u8 {
        FULL_WEIGHT - self.new_weight
    }
}

/// How to shift traffic from the old version to the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStrategy {
    /// Move everything at once, then monitor (blue/green).
    AllAtOnce(StepConfig),
    /// Move `increment`%, monitor once, then move the rest.
    Canary(StepConfig),
    /// Move `increment`% per step, monitoring after each, until 100%.
    Linear(StepConfig),
}

impl DeployStrategy {
    pub fn new(kind: StrategyKind, increment: u32, interval: Duration) -> RolloutResult<Self> {
        let config = StepConfig::new(increment, interval)?;
        Ok(match kind {
            StrategyKind::AllAtOnce => DeployStrategy::AllAtOnce(config),
            StrategyKind::Canary => DeployStrategy::Canary(config),
            StrategyKind::Linear => DeployStrategy::Linear(config),
        })
    }

    /// Build a strategy from its case-insensitive name.
    pub fn from_name(name: &str, increment: u32, interval: Duration) -> RolloutResult<Self> {
        Self::new(name.parse()?, increment, interval)
    }

    pub fn all_at_once(increment: u32, interval: Duration) -> RolloutResult<Self> {
        Self::new(StrategyKind::AllAtOnce, increment, interval)
    }

    pub fn canary(increment: u32, interval: Duration) -> RolloutResult<Self> {
        Self::new(StrategyKind::Canary, increment, interval)
    }

    pub fn linear(increment: u32, interval: Duration) -> RolloutResult<Self> {
        Self::new(StrategyKind::Linear, increment, interval)
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            DeployStrategy::AllAtOnce(_) => StrategyKind::AllAtOnce,
            DeployStrategy::Canary(_) => StrategyKind::Canary,
            DeployStrategy::Linear(_) => StrategyKind::Linear,
        }
    }

    pub fn config(&self) -> &StepConfig {
        match self {
            DeployStrategy::AllAtOnce(c) | DeployStrategy::Canary(c) | DeployStrategy::Linear(c) => c,
        }
    }

    /// The weight steps this strategy performs, in order.
    pub fn steps(&self) -> Vec<Step> {
        match self {
            DeployStrategy::AllAtOnce(_) => vec![Step {
                new_weight: FULL_WEIGHT,
                monitored: true,
            }],
            DeployStrategy::Canary(cfg) => {
                let mut steps = vec![Step {
                    new_weight: cfg.increment,
                    monitored: true,
                }];
                if cfg.increment < FULL_WEIGHT {
                    steps.push(Step {
                        new_weight: FULL_WEIGHT,
                        monitored: false,
                    });
                }
                steps
            }
            DeployStrategy::Linear(cfg) => {
                let mut steps = Vec::new();
                let mut new_weight = 0u8;
                while new_weight < FULL_WEIGHT {
                    new_weight = new_weight.saturating_add(cfg.increment).min(FULL_WEIGHT);
                    steps.push(Step {
                        new_weight,
                        monitored: true,
                    });
                }
                steps
            }
        }
    }

    /// Expected wall-clock time of an uneventful rollout.
    pub fn expected_duration(&self) -> Duration {
        let holds = self.steps().iter().filter(|s| s.monitored).count() as u32;
        self.config().interval.saturating_mul(holds)
    }

    /// Shift `target` from its old version to its new one, monitoring with
    /// `monitor` between steps.
    ///
    /// Returns `Watch::RolledBack` if an alarm reverted the alias and the
    /// monitor was configured not to raise; no further steps are taken.
    /// A shutdown seen between steps reverts the alias and fails with
    /// `Cancelled`, including before the unmonitored last canary step.
    pub async fn deploy<R, A>(
        &self,
        target: &Alias<'_, R>,
        monitor: &AlarmMonitor<A>,
    ) -> RolloutResult<Watch>
    where
        R: VersionRegistry,
        A: AlarmProvider,
    {
        let cfg = self.config();
        match self {
            DeployStrategy::AllAtOnce(_) => info!(
                window_secs = cfg.interval.as_secs(),
                "all-at-once deploy: moving 100% of traffic to the new version immediately"
            ),
            DeployStrategy::Canary(_) => info!(
                increment = cfg.increment,
                window_secs = cfg.interval.as_secs(),
                "canary deploy: moving the canary share first, then the rest"
            ),
            DeployStrategy::Linear(_) => info!(
                increment = cfg.increment,
                every_secs = cfg.interval.as_secs(),
                total_secs = self.expected_duration().as_secs(),
                "linear deploy: moving traffic in even steps"
            ),
        }

        let steps = self.steps();
        let total = steps.len();
        for (index, step) in steps.into_iter().enumerate() {
            if monitor.interrupted() {
                return monitor.cancel(target).await;
            }
            target
                .update_weights(step.old_weight(), step.new_weight)
                .await?;

            if step.monitored && monitor.check_during(target, cfg.interval).await? == Watch::RolledBack {
                info!(step = index + 1, total, "rollout stopped after rollback");
                return Ok(Watch::RolledBack);
            }
        }

        if matches!(self, DeployStrategy::Canary(c) if c.increment == FULL_WEIGHT) {
            info!("canary increment was 100, no second step required");
        }
        info!(alias = %target.id(), "traffic fully shifted to the new version");
        Ok(Watch::Clear)
    }
}
