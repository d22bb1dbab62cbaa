//! Narrow interfaces to the world outside the countdown core.
//!
//! Persistence, haptics and the history sink are stateless from the core's
//! point of view and may be shared by several controllers at once.

mod memory;

pub use memory::{MemoryHistory, MemoryStore};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::session::Tile;

/// Canonical focus session snapshot key.
pub const SESSION_SNAPSHOT_KEY: &str = "focus.vm.snapshot.v2";
/// Clock crash-safety snapshot key.
pub const CLOCK_SAFETY_KEY: &str = "focus.actor.safety";
/// Session-complete prompt, kept after the canonical snapshot is gone.
pub const RECALIBRATE_PROMPT_KEY: &str = "focus.vm.recalibrate_prompt";

/// String-keyed async storage.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn write_raw(&self, key: &str, json: String) -> Result<(), PersistenceError>;

    async fn read_raw(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    /// Remove the value under `key`. Missing keys are not an error.
    async fn clear(&self, key: &str);
}

/// Typed helpers over [`Persistence`].
#[async_trait]
pub trait PersistenceExt: Persistence {
    async fn write<T>(&self, value: &T, key: &str) -> Result<(), PersistenceError>
    where
        T: Serialize + Sync,
    {
        let json = serde_json::to_string(value).map_err(|e| PersistenceError::WriteFailed {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.write_raw(key, json).await
    }

    async fn read_if_exists<T>(&self, key: &str) -> Result<Option<T>, PersistenceError>
    where
        T: DeserializeOwned,
    {
        match self.read_raw(key).await? {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| PersistenceError::Decode {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }
}

impl<P: Persistence + ?Sized> PersistenceExt for P {}

/// One haptic pulse in a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pulse {
    Short,
    Long,
}

/// Fire-and-forget haptic feedback.
pub trait Haptics: Send + Sync {
    /// A tile was accepted.
    fn added(&self);

    /// A focus chunk ran out.
    fn notify_done(&self);

    /// Play an arbitrary pulse pattern (recalibration cues).
    fn play(&self, _pattern: &[Pulse]) {}
}

/// Haptics that do nothing, for headless hosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHaptics;

impl Haptics for NoopHaptics {
    fn added(&self) {}
    fn notify_done(&self) {}
}

/// Haptics that only log, so terminal hosts can see the cues.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHaptics;

impl Haptics for TracingHaptics {
    fn added(&self) {
        tracing::info!(cue = "added", "haptic");
    }

    fn notify_done(&self) {
        tracing::info!(cue = "done", "haptic");
    }

    fn play(&self, pattern: &[Pulse]) {
        tracing::info!(?pattern, "haptic");
    }
}

/// Receives completed tiles once a full session ends.
pub trait HistorySink: Send + Sync {
    fn add_to_history(&self, tile: &Tile, category_id: Uuid);
}
