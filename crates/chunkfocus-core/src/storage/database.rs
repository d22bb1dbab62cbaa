//! SQLite-backed storage.
//!
//! Provides persistent storage for:
//! - Controller snapshots (key-value table)
//! - Tiles completed in a full session
//! - Completed recalibrations

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use super::{data_dir, migrations};
use crate::collaborators::{HistorySink, Persistence};
use crate::error::{PersistenceError, StoreError};
use crate::recalibration::RecalibrationMode;
use crate::session::Tile;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: i64,
    pub tile_id: Uuid,
    pub text: String,
    pub category_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecalibrationRecord {
    pub id: i64,
    pub mode: RecalibrationMode,
    pub minutes: u32,
    pub completed_at: DateTime<Utc>,
}

/// SQLite database behind the [`Persistence`] and [`HistorySink`] seams.
///
/// The synchronous methods block the caller. The [`Persistence`] impl runs
/// them on tokio's blocking pool so per-second snapshot writes never stall a
/// runtime worker.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open the database at `<data dir>/chunkfocus.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the data directory or database cannot be opened,
    /// or if migration fails.
    pub fn open() -> Result<Self, StoreError> {
        let path = data_dir()?.join("chunkfocus.db");
        Self::open_at(&path)
    }

    /// Open (or create) a database file at `path`.
    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        migrations::migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        lock(&self.conn)
    }

    /// Run `f` against the connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || f(&lock(&conn)))
            .await
            .map_err(|e| StoreError::QueryFailed(format!("storage task failed: {e}")))?
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        kv_get(&self.conn(), key)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        kv_set(&self.conn(), key, value)
    }

    pub fn kv_delete(&self, key: &str) -> Result<(), StoreError> {
        kv_delete(&self.conn(), key)
    }

    /// Record a tile completed as part of a full session.
    pub fn record_history(&self, tile: &Tile, category_id: Uuid) -> Result<i64, StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO history (tile_id, text, category_id, created_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                tile.id.to_string(),
                tile.text,
                category_id.to_string(),
                tile.created_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn record_recalibration(
        &self,
        mode: RecalibrationMode,
        minutes: u32,
    ) -> Result<i64, StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO recalibrations (mode, minutes, completed_at) VALUES (?1, ?2, ?3)",
            params![mode.as_str(), minutes, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Completed tiles, oldest first.
    pub fn history(&self) -> Result<Vec<HistoryRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, tile_id, text, category_id, created_at, completed_at
             FROM history
             ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, tile_id, text, category_id, created_at, completed_at) = row?;
            records.push(HistoryRecord {
                id,
                tile_id: parse_uuid(&tile_id)?,
                text,
                category_id: parse_uuid(&category_id)?,
                created_at: parse_timestamp(&created_at)?,
                completed_at: parse_timestamp(&completed_at)?,
            });
        }
        Ok(records)
    }

    /// Completed recalibrations, oldest first.
    pub fn recalibrations(&self) -> Result<Vec<RecalibrationRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, mode, minutes, completed_at FROM recalibrations ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, mode, minutes, completed_at) = row?;
            records.push(RecalibrationRecord {
                id,
                mode: mode.parse().map_err(StoreError::QueryFailed)?,
                minutes,
                completed_at: parse_timestamp(&completed_at)?,
            });
        }
        Ok(records)
    }
}

#[async_trait]
impl Persistence for SqliteStore {
    async fn write_raw(&self, key: &str, json: String) -> Result<(), PersistenceError> {
        let owned = key.to_string();
        self.with_conn(move |conn| kv_set(conn, &owned, &json))
            .await
            .map_err(|e| PersistenceError::WriteFailed {
                key: key.to_string(),
                message: e.to_string(),
            })
    }

    async fn read_raw(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let owned = key.to_string();
        self.with_conn(move |conn| kv_get(conn, &owned))
            .await
            .map_err(|e| PersistenceError::ReadFailed {
                key: key.to_string(),
                message: e.to_string(),
            })
    }

    async fn clear(&self, key: &str) {
        let owned = key.to_string();
        if let Err(e) = self.with_conn(move |conn| kv_delete(conn, &owned)).await {
            warn!("failed to clear '{key}': {e}");
        }
    }
}

fn kv_get(conn: &Connection, key: &str) -> Result<Option<String>, StoreError> {
    let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
    let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
    match result {
        Ok(v) => Ok(Some(v)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn kv_set(conn: &Connection, key: &str, value: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

fn kv_delete(conn: &Connection, key: &str) -> Result<(), StoreError> {
    conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
    Ok(())
}

fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

impl HistorySink for SqliteStore {
    fn add_to_history(&self, tile: &Tile, category_id: Uuid) {
        if let Err(e) = self.record_history(tile, category_id) {
            warn!(tile = %tile.id, "failed to record history: {e}");
        }
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|e| StoreError::QueryFailed(format!("bad uuid '{raw}': {e}")))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::QueryFailed(format!("bad timestamp '{raw}': {e}")))
}
