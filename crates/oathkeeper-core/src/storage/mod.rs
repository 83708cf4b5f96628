mod config;
pub mod database;

pub use config::Config;
pub use database::{ComplianceStats, CycleRecord, Database};

use std::path::PathBuf;

/// Returns the data directory, resolved in order:
/// `OATHKEEPER_DATA_DIR` if set, else `~/.config/oathkeeper[-dev]/` based
/// on `OATHKEEPER_ENV`.
///
/// Set OATHKEEPER_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if the home directory cannot be determined or if
/// creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Ok(dir) = std::env::var("OATHKEEPER_DATA_DIR") {
        let dir = PathBuf::from(dir);
        std::fs::create_dir_all(&dir)?;
        return Ok(dir);
    }

    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("OATHKEEPER_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("oathkeeper-dev")
    } else {
        base_dir.join("oathkeeper")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
