//! # Chunkfocus Core Library
//!
//! This library provides the core logic for Chunkfocus, a two-chunk focus
//! timer with short recalibration exercises. Everything runs headless so the
//! `chunkfocus` CLI (or any other host) is a thin layer over the same core.
//!
//! ## Architecture
//!
//! - **Clock Engine**: A resumable countdown on a monotonic deadline that
//!   survives pause, backgrounding and process death
//! - **Session**: Tile intake and two consecutive focus chunks with
//!   three-tier recovery (live clock, safety snapshot, canonical snapshot)
//! - **Recalibration**: Breathing and balancing countdowns with haptic cues
//! - **Storage**: SQLite-backed key-value/history store and TOML configuration
//!
//! ## Key Components
//!
//! - [`ClockEngine`]: Countdown state machine and tick task
//! - [`SessionController`]: Focus session lifecycle
//! - [`RecalibrationController`]: Post-session exercises
//! - [`SqliteStore`]: Snapshot and history persistence
//! - [`Config`]: Application configuration management

pub mod clock;
pub mod collaborators;
pub mod error;
pub mod phase;
pub mod recalibration;
pub mod session;
pub mod storage;

pub use clock::{ClockEngine, ClockSafetySnapshot, ClockState, TickHandler};
pub use collaborators::{Haptics, HistorySink, Persistence, PersistenceExt};
pub use error::{
    ConfigError, CoreError, PersistenceError, RecalibrationError, SessionError, StoreError,
};
pub use phase::Phase;
pub use recalibration::{RecalibrationController, RecalibrationMode, RecalibrationSettings};
pub use session::{SessionController, SessionSettings, Tile};
pub use storage::{Config, SqliteStore};
