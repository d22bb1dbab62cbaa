//! Three-tier recovery after backgrounding or a cold launch.
//!
//! 1. Live clock: the engine still holds a deadline or a frozen value.
//! 2. Safety snapshot: the process died; the clock's own record on disk
//!    still yields a wall-clock-accurate remaining time.
//! 3. Canonical snapshot: the last written session state, re-armed from its
//!    stored remaining seconds.
//!
//! The first tier that yields a value wins.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::controller::{SessionCore, SessionState};
use super::snapshot::SessionSnapshot;
use crate::clock::ClockSafetySnapshot;
use crate::collaborators::{
    PersistenceExt, CLOCK_SAFETY_KEY, RECALIBRATE_PROMPT_KEY, SESSION_SNAPSHOT_KEY,
};
use crate::error::SessionError;
use crate::phase::Phase;

/// Which source a recovery trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoverySource {
    LiveClock,
    SafetySnapshot,
    CanonicalSnapshot,
    Nothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecoveryOutcome {
    pub source: RecoverySource,
    /// Remaining seconds the chosen source reported, if it carried any.
    pub remaining: Option<u64>,
}

impl RecoveryOutcome {
    fn nothing() -> Self {
        Self {
            source: RecoverySource::Nothing,
            remaining: None,
        }
    }
}

impl SessionCore {
    pub(super) async fn recover(self: &Arc<Self>) -> RecoveryOutcome {
        let mut st = self.state.lock().await;

        if let Some(remaining) = self.clock.remaining_after_foreground() {
            self.persistence.clear(CLOCK_SAFETY_KEY).await;
            debug!(remaining, "recovering from live clock");
            return self
                .apply_remaining(&mut st, remaining, RecoverySource::LiveClock)
                .await;
        }

        // In-memory clock state is gone. A fresh controller also has no
        // tiles yet; the canonical snapshot supplies them.
        let canonical = self
            .read_snapshot::<SessionSnapshot>(&mut st, SESSION_SNAPSHOT_KEY)
            .await;
        if st.phase == Phase::None {
            match &canonical {
                Some(snap) => {
                    st.restore(snap);
                    info!(phase = %st.phase, chunk = st.chunk_index, "session restored from snapshot");
                }
                None => {
                    // Last session completed; only its prompt is left.
                    let prompt = self
                        .read_snapshot::<bool>(&mut st, RECALIBRATE_PROMPT_KEY)
                        .await;
                    st.show_recalibrate = prompt.unwrap_or(false);
                }
            }
        }

        if let Some(safety) = self
            .read_snapshot::<ClockSafetySnapshot>(&mut st, CLOCK_SAFETY_KEY)
            .await
        {
            self.persistence.clear(CLOCK_SAFETY_KEY).await;
            if st.phase == Phase::Running {
                let remaining = self.clock.restore_from_safety_snapshot(&safety).await;
                debug!(remaining, "recovering from safety snapshot");
                return self
                    .apply_remaining(&mut st, remaining, RecoverySource::SafetySnapshot)
                    .await;
            }
            debug!(phase = %st.phase, "safety snapshot ignored");
        }

        if st.phase.is_active() {
            let remaining = st.remaining_seconds;
            debug!(remaining, "recovering from canonical snapshot");
            return self
                .apply_remaining(&mut st, remaining, RecoverySource::CanonicalSnapshot)
                .await;
        }

        self.publish(&st);
        if canonical.is_some() {
            RecoveryOutcome {
                source: RecoverySource::CanonicalSnapshot,
                remaining: None,
            }
        } else {
            RecoveryOutcome::nothing()
        }
    }

    /// Re-arm (or finish) the current chunk from a recovered value.
    async fn apply_remaining(
        self: &Arc<Self>,
        st: &mut SessionState,
        remaining: u64,
        source: RecoverySource,
    ) -> RecoveryOutcome {
        match st.phase {
            Phase::Running if remaining == 0 => {
                info!(?source, chunk = st.chunk_index, "chunk ran out while away");
                self.complete_chunk_locked(st).await;
            }
            Phase::Running => {
                st.remaining_seconds = remaining;
                self.clock.start_ticking(remaining, self.handler()).await;
                self.commit(st).await;
            }
            Phase::Paused => {
                st.remaining_seconds = remaining;
                if source != RecoverySource::LiveClock {
                    // Seed the engine so a later resume has a frozen value.
                    self.clock.pause_ticking(remaining).await;
                }
                self.commit(st).await;
            }
            _ => {
                debug!(phase = %st.phase, "no chunk to re-arm");
                self.clock.reset().await;
                self.publish(st);
            }
        }
        RecoveryOutcome {
            source,
            remaining: Some(remaining),
        }
    }

    async fn read_snapshot<T>(&self, st: &mut SessionState, key: &str) -> Option<T>
    where
        T: serde::de::DeserializeOwned,
    {
        match self.persistence.read_if_exists::<T>(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("failed to read '{key}': {e}");
                st.last_error = Some(SessionError::PersistenceFailed(e.to_string()));
                None
            }
        }
    }
}
