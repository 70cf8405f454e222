//! TOML-based queue configuration.
//!
//! Stores the operational knobs of the notification queue:
//! - default retry budget and retention window
//! - the staleness timeout for processing claims
//! - push endpoint credentials (optional; the queue is a no-op without them)
//!
//! Configuration is stored at `~/.config/familyload/config.toml`.

use serde::{Deserialize, Serialize};

use super::data_dir;

/// Push endpoint credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// HTTPS endpoint of the multicast push relay.
    pub endpoint: String,
    /// Bearer token for the relay.
    pub api_key: String,
}

/// Notification queue configuration.
///
/// Serialized to/from TOML at `~/.config/familyload/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Retry budget for a queued notification unless overridden per call.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
    /// Days a terminal queue row is kept before cleanup.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    /// Minutes after which another processor may steal a claimed row.
    #[serde(default = "default_claim_stale_minutes")]
    pub claim_stale_minutes: i64,
    /// Push relay credentials. Absent means the queue never dispatches.
    #[serde(default)]
    pub push: Option<PushConfig>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_max_retries: default_max_retries(),
            retention_days: default_retention_days(),
            claim_stale_minutes: default_claim_stale_minutes(),
            push: None,
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_retention_days() -> i64 {
    7
}
fn default_claim_stale_minutes() -> i64 {
    10
}

impl QueueConfig {
    fn path() -> Result<std::path::PathBuf, Box<dyn std::error::Error>> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load configuration, writing defaults on first run.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be parsed, or if
    /// the defaults cannot be written.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg: QueueConfig = toml::from_str(&content)?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Load configuration, falling back to defaults on any error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Persist configuration to disk.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(Self::path()?, content)?;
        Ok(())
    }
}
