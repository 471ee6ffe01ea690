//! Mounter configuration (TOML).
//!
//! ```toml
//! default_fstype = "ext4"
//!
//! [backoff]
//! initial_delay_ms = 1000
//! factor = 1.1
//! steps = 15
//!
//! [commands]
//! udevadm_timeout_secs = 30
//! ```
//!
//! Every key is optional; missing keys fall back to the defaults above.

use crate::backoff::Backoff;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use volmount_error::{MountError, MountResult};

/// Upper bound on `backoff.steps`.
pub const MAX_BACKOFF_STEPS: u32 = 1000;

/// Longest a single device lookup may spend waiting between probes.
pub const MAX_LOOKUP_WAIT: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MounterConfig {
    /// Filesystem created on blank devices when the caller does not name one.
    pub default_fstype: String,
    pub backoff: BackoffConfig,
    pub commands: CommandConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_delay_ms: u64,
    pub factor: f64,
    pub steps: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub udevadm_timeout_secs: u64,
}

impl Default for MounterConfig {
    fn default() -> Self {
        Self {
            default_fstype: "ext4".to_string(),
            backoff: BackoffConfig::default(),
            commands: CommandConfig::default(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            factor: 1.1,
            steps: 15,
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            udevadm_timeout_secs: 30,
        }
    }
}

impl BackoffConfig {
    /// A fresh schedule for one resolution call.
    pub fn schedule(&self) -> Backoff {
        Backoff {
            duration: Duration::from_millis(self.initial_delay_ms),
            factor: self.factor,
            steps: self.steps,
        }
    }
}

impl CommandConfig {
    pub fn udevadm_timeout(&self) -> Duration {
        Duration::from_secs(self.udevadm_timeout_secs)
    }
}

impl MounterConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Unable to read {}", path.display()))?;
        let cfg = Self::from_toml(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> MountResult<()> {
        if self.backoff.steps == 0 || self.backoff.steps > MAX_BACKOFF_STEPS {
            return Err(MountError::Config(format!(
                "backoff.steps must be between 1 and {MAX_BACKOFF_STEPS}"
            )));
        }
        if self.backoff.initial_delay_ms == 0 {
            return Err(MountError::Config(
                "backoff.initial_delay_ms must be positive".into(),
            ));
        }
        if !self.backoff.factor.is_finite() || self.backoff.factor < 1.0 {
            return Err(MountError::Config(
                "backoff.factor must be a finite number >= 1.0".into(),
            ));
        }
        let total = self.backoff.schedule().total_delay();
        if total > MAX_LOOKUP_WAIT {
            return Err(MountError::Config(format!(
                "backoff schedule waits {total:?} in total, more than {MAX_LOOKUP_WAIT:?}"
            )));
        }
        if self.default_fstype.trim().is_empty() {
            return Err(MountError::Config("default_fstype must not be empty".into()));
        }
        if self.commands.udevadm_timeout_secs == 0 {
            return Err(MountError::Config(
                "commands.udevadm_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}
