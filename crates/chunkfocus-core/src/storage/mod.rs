mod config;
pub mod database;
pub mod migrations;

pub use config::{Config, RecalibrationConfig, SessionConfig};
pub use database::{HistoryRecord, RecalibrationRecord, SqliteStore};

use std::path::PathBuf;

/// Returns `~/.config/chunkfocus[-dev]/` based on CHUNKFOCUS_ENV.
///
/// Set CHUNKFOCUS_ENV=dev to use the development data directory, or
/// CHUNKFOCUS_DATA_DIR to point somewhere else entirely.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let dir = match std::env::var_os("CHUNKFOCUS_DATA_DIR") {
        Some(custom) if !custom.is_empty() => PathBuf::from(custom),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env =
                std::env::var("CHUNKFOCUS_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("chunkfocus-dev")
            } else {
                base_dir.join("chunkfocus")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
