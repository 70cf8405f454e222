pub mod config;
pub mod queue_db;

pub use config::QueueConfig;
pub use queue_db::{DeviceToken, NotificationStatus, QueueDb, QueuedNotification, QueueStats};

use std::path::PathBuf;

/// Returns `~/.config/familyload[-dev]/` based on FAMILYLOAD_ENV.
///
/// Set FAMILYLOAD_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if the home directory cannot be determined or if
/// creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("FAMILYLOAD_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("familyload-dev")
    } else {
        base_dir.join("familyload")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
