mod config;
pub mod database;
pub mod migrations;
mod store;

pub use config::Config;
pub use database::DinnerDb;
pub use store::MatchStore;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the data directory.
///
/// `$DINNERHOP_DATA_DIR` wins when set. Otherwise `~/.config/dinnerhop/`,
/// or `~/.config/dinnerhop-dev/` with `DINNERHOP_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("DINNERHOP_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("DINNERHOP_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("dinnerhop-dev")
            } else {
                base_dir.join("dinnerhop")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
