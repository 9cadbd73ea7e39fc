mod config;
pub mod calendar_db;
pub mod migrations;

pub use calendar_db::CalendarDb;
pub use config::{Config, LogConfig, NotificationFormat, NotificationsConfig, RemindersConfig};

use std::path::PathBuf;

/// Returns `~/.config/almanac[-dev]/` based on ALMANAC_ENV.
///
/// Set ALMANAC_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("ALMANAC_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("almanac-dev")
    } else {
        base_dir.join("almanac")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
