//! stepshift.toml configuration parser.
//!
//! Every field is optional. Command-line flags take precedence over the
//! file, and the file over the built-in defaults below.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "stepshift.toml";

pub const DEFAULT_STRATEGY: &str = "allatonce";
pub const DEFAULT_INCREMENT: u32 = 5;
pub const DEFAULT_INTERVAL_SECS: u64 = 120;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_HISTORY_MAX: usize = 0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepshiftConfig {
    pub deploy: Option<DeployConfig>,
    pub alarms: Option<AlarmsConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeployConfig {
    pub resource: Option<String>,
    pub alias: Option<String>,
    /// One of `allatonce`, `canary`, `linear`.
    pub strategy: Option<String>,
    pub increment: Option<u32>,
    /// Seconds held at each weight step.
    pub interval: Option<u64>,
    pub publish_revision: Option<bool>,
    /// Versions to keep after a successful rollout; 0 disables pruning.
    pub history_max: Option<usize>,
    pub force: Option<bool>,
    /// Definition file uploaded before publishing.
    pub file: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlarmsConfig {
    pub names: Option<Vec<String>>,
    pub poll_interval: Option<u64>,
    pub raise_on_rollback: Option<bool>,
}

impl StepshiftConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: StepshiftConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load `path` if given (it must exist), otherwise `./stepshift.toml`
    /// when present, otherwise an empty config.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    Self::from_file(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn deploy(&self) -> DeployConfig {
        self.deploy.clone().unwrap_or_default()
    }

    pub fn alarms(&self) -> AlarmsConfig {
        self.alarms.clone().unwrap_or_default()
    }
}
