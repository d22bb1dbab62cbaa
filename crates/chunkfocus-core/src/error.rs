//! Core error types for chunkfocus-core.
//!
//! Controller errors are plain data so a UI layer can map each variant to a
//! specific message. Storage and configuration errors wrap their sources.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::phase::Phase;

/// Core error type for chunkfocus-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Focus session errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Recalibration errors
    #[error("Recalibration error: {0}")]
    Recalibration(#[from] RecalibrationError),

    /// Storage errors
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by the focus session controller.
///
/// Validation variants leave controller state untouched. `PersistenceFailed`
/// is never returned from a transition; it only shows up in `last_error`.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SessionError {
    #[error("Tile text is empty")]
    EmptyInput,

    #[error("A session holds at most {limit} tiles")]
    TooManyTiles { limit: usize },

    #[error("Cannot begin a chunk in phase {phase} with {tile_count} tile(s)")]
    InvalidBegin { phase: Phase, tile_count: usize },

    #[error("Persisting session state failed: {0}")]
    PersistenceFailed(String),

    #[error("Unexpected session state: {0}")]
    Unexpected(String),
}

/// Errors raised by the recalibration controller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecalibrationError {
    #[error("{value} minute(s) is outside the allowed range {min}..={max}")]
    MinutesOutOfRange { value: u32, min: u32, max: u32 },

    #[error("A recalibration is already running")]
    Busy,

    #[error("No recalibration is running")]
    NotRunning,

    #[error("No recalibration is paused")]
    NotPaused,
}

/// Errors from a persistence collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("Failed to write '{key}': {message}")]
    WriteFailed { key: String, message: String },

    #[error("Failed to read '{key}': {message}")]
    ReadFailed { key: String, message: String },

    #[error("Stored value for '{key}' could not be decoded: {message}")]
    Decode { key: String, message: String },
}

/// SQLite store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Another connection holds the database
    #[error("Database is locked by another process")]
    Locked,

    /// Data directory could not be prepared
    #[error("Data directory unavailable: {0}")]
    DataDir(#[from] std::io::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => match err.code {
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                    StoreError::Locked
                }
                _ => StoreError::QueryFailed(err.to_string()),
            },
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}
