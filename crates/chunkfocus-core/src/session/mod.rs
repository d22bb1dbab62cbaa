//! Two-chunk focus session.
//!
//! ```text
//! none -> idle -> running <-> paused
//!                    |
//!                    v
//!         finished(chunk 1) -> running -> finished(chunk 2, complete)
//! ```

mod controller;
mod recovery;
mod snapshot;
mod tile;

pub use controller::{PrimaryTapOutcome, SessionController, SessionView};
pub use recovery::{RecoveryOutcome, RecoverySource};
pub use snapshot::SessionSnapshot;
pub use tile::Tile;

use uuid::Uuid;

/// Tiles per session.
pub const MAX_TILES: usize = 2;
/// Chunks per session; also the terminal chunk index.
pub const MAX_CHUNKS: u8 = 2;

/// Knobs the session controller reads at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Length of one chunk in seconds.
    pub chunk_secs: u64,
    /// Category completed tiles are filed under.
    pub general_category_id: Uuid,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            chunk_secs: 20 * 60,
            general_category_id: Uuid::nil(),
        }
    }
}
