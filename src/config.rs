use crate::error::{Result, WatchError};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

/// Runtime settings, typically loaded from a JSON file.
///
/// Every field has a default, so `{}` is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub polling: PollingConfig,
    pub verification: VerificationConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Upper bound on a single status fetch before it counts as a transport error.
    pub fetch_timeout_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 15_000,
        }
    }
}

impl PollingConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub attempt_interval_ms: u64,
    pub max_attempts: u32,
    pub request_timeout_ms: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            attempt_interval_ms: 5_000,
            max_attempts: 12,
            request_timeout_ms: 10_000,
        }
    }
}

impl VerificationConfig {
    pub fn attempt_interval(&self) -> Duration {
        Duration::from_millis(self.attempt_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl WatchConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let config: WatchConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.polling.fetch_timeout_ms == 0 {
            return Err(WatchError::Config(
                "polling.fetch_timeout_ms must be positive".to_string(),
            ));
        }
        if self.verification.max_attempts == 0 {
            return Err(WatchError::Config(
                "verification.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.verification.attempt_interval_ms == 0 {
            return Err(WatchError::Config(
                "verification.attempt_interval_ms must be positive".to_string(),
            ));
        }
        if self.verification.request_timeout_ms == 0 {
            return Err(WatchError::Config(
                "verification.request_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
