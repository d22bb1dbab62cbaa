//! Canonical focus session snapshot.
//!
//! The snapshot is the single source of truth for tiles, phase and chunk
//! progress across process restarts. It is rewritten after every mutation.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::tile::Tile;
use super::MAX_CHUNKS;
use crate::phase::Phase;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub tile_texts: Vec<String>,
    /// Full tiles, so identities survive a restart. Older snapshots may
    /// lack this field; tiles are then re-minted from `tile_texts`.
    #[serde(default)]
    pub tiles: Vec<Tile>,
    pub phase: Phase,
    pub chunk_index: u8,
    pub remaining_seconds: u64,
    pub show_recalibrate: bool,
    #[serde(default)]
    pub haptic_fired_chunks: BTreeSet<u8>,
}

impl SessionSnapshot {
    /// Tiles to restore. Stored tiles are used only when they agree with
    /// the canonical texts.
    pub fn restored_tiles(&self) -> Vec<Tile> {
        let agree = self.tiles.len() == self.tile_texts.len()
            && self
                .tiles
                .iter()
                .zip(&self.tile_texts)
                .all(|(tile, text)| &tile.text == text);
        if agree {
            self.tiles.clone()
        } else {
            self.tile_texts.iter().map(Tile::new).collect()
        }
    }

    /// Chunk index clamped into its legal range.
    pub fn chunk_index(&self) -> u8 {
        self.chunk_index.min(MAX_CHUNKS)
    }

    /// Haptic guard rebuilt from the authoritative chunk index.
    ///
    /// Every chunk below the index is complete and must not buzz again. A
    /// stored entry for the current index is kept: the cue fired but the
    /// process died before the transition was written.
    pub fn rebuilt_haptic_guard(&self) -> BTreeSet<u8> {
        let index = self.chunk_index();
        let mut guard: BTreeSet<u8> = (0..index).collect();
        if self.haptic_fired_chunks.contains(&index) && index < MAX_CHUNKS {
            guard.insert(index);
        }
        guard
    }
}
