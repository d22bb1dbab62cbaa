use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use super::{HistorySink, Persistence};
use crate::error::PersistenceError;
use crate::session::Tile;

/// In-process key-value store.
///
/// Writes can be made to fail on demand to exercise error surfacing.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values().contains_key(key)
    }

    /// Raw stored JSON, if any.
    pub fn get(&self, key: &str) -> Option<String> {
        self.values().get(key).cloned()
    }

    /// Store raw JSON directly, bypassing failure injection.
    pub fn insert(&self, key: &str, json: impl Into<String>) {
        self.values().insert(key.to_string(), json.into());
    }

    fn values(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn write_raw(&self, key: &str, json: String) -> Result<(), PersistenceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::WriteFailed {
                key: key.to_string(),
                message: "store is read-only".into(),
            });
        }
        self.values().insert(key.to_string(), json);
        Ok(())
    }

    async fn read_raw(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.values().get(key).cloned())
    }

    async fn clear(&self, key: &str) {
        self.values().remove(key);
    }
}

/// History sink that keeps every entry in memory.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    entries: Mutex<Vec<(Tile, Uuid)>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(Tile, Uuid)> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HistorySink for MemoryHistory {
    fn add_to_history(&self, tile: &Tile, category_id: Uuid) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((tile.clone(), category_id));
    }
}
