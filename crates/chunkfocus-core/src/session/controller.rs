//! Focus session controller.
//!
//! Every public operation takes the session lock for its whole duration, and
//! so does every clock callback. That lock is the single context in which
//! tiles, phase and chunk progress change. Each mutation ends with a
//! canonical snapshot write and a fresh [`SessionView`] on the watch channel.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::recovery::RecoveryOutcome;
use super::snapshot::SessionSnapshot;
use super::tile::Tile;
use super::{SessionSettings, MAX_CHUNKS, MAX_TILES};
use crate::clock::{ClockEngine, SystemClock, TickHandler, WallClock};
use crate::collaborators::{
    Haptics, HistorySink, Persistence, PersistenceExt, CLOCK_SAFETY_KEY, RECALIBRATE_PROMPT_KEY,
    SESSION_SNAPSHOT_KEY,
};
use crate::error::{PersistenceError, SessionError};
use crate::phase::Phase;

/// Which way a primary tap was routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryTapOutcome {
    Added(Tile),
    Began,
}

/// Observable session state, published after every change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub phase: Phase,
    pub chunk_index: u8,
    pub remaining_seconds: u64,
    pub tiles: Vec<Tile>,
    pub show_recalibrate: bool,
    pub last_error: Option<SessionError>,
}

#[derive(Debug, Default)]
pub(super) struct SessionState {
    pub(super) tiles: Vec<Tile>,
    pub(super) phase: Phase,
    pub(super) chunk_index: u8,
    pub(super) remaining_seconds: u64,
    pub(super) show_recalibrate: bool,
    pub(super) haptic_fired: BTreeSet<u8>,
    pub(super) last_error: Option<SessionError>,
}

impl SessionState {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            tile_texts: self.tiles.iter().map(|t| t.text.clone()).collect(),
            tiles: self.tiles.clone(),
            phase: self.phase,
            chunk_index: self.chunk_index,
            remaining_seconds: self.remaining_seconds,
            show_recalibrate: self.show_recalibrate,
            haptic_fired_chunks: self.haptic_fired.clone(),
        }
    }

    fn view(&self) -> SessionView {
        SessionView {
            phase: self.phase,
            chunk_index: self.chunk_index,
            remaining_seconds: self.remaining_seconds,
            tiles: self.tiles.clone(),
            show_recalibrate: self.show_recalibrate,
            last_error: self.last_error.clone(),
        }
    }

    /// Overwrite with the canonical snapshot. The chunk index is trusted
    /// over the stored haptic set.
    pub(super) fn restore(&mut self, snap: &SessionSnapshot) {
        self.tiles = snap.restored_tiles();
        self.phase = snap.phase;
        self.chunk_index = snap.chunk_index();
        self.remaining_seconds = snap.remaining_seconds;
        self.show_recalibrate = snap.show_recalibrate;
        self.haptic_fired = snap.rebuilt_haptic_guard();
    }

    /// Both chunks done. Nothing is left to resume.
    pub(super) fn is_complete(&self) -> bool {
        self.phase == Phase::Finished && self.chunk_index >= MAX_CHUNKS
    }

    fn can_begin(&self) -> bool {
        self.tiles.len() == MAX_TILES
            && (matches!(self.phase, Phase::None | Phase::Idle)
                || (self.phase == Phase::Finished && self.chunk_index == 1))
    }

    fn invalid_begin(&self) -> SessionError {
        SessionError::InvalidBegin {
            phase: self.phase,
            tile_count: self.tiles.len(),
        }
    }
}

pub(super) struct SessionCore {
    pub(super) state: Mutex<SessionState>,
    pub(super) clock: ClockEngine,
    pub(super) persistence: Arc<dyn Persistence>,
    haptics: Arc<dyn Haptics>,
    history: Arc<dyn HistorySink>,
    settings: SessionSettings,
    view_tx: watch::Sender<SessionView>,
}

impl SessionCore {
    pub(super) fn handler(self: &Arc<Self>) -> Arc<dyn TickHandler> {
        Arc::clone(self) as Arc<dyn TickHandler>
    }

    pub(super) fn publish(&self, st: &SessionState) {
        self.view_tx.send_replace(st.view());
    }

    /// Write the canonical snapshot, then publish. A failed write is logged
    /// and kept in `last_error` until the next successful one; the
    /// transition itself stands.
    ///
    /// A completed (or empty) session has no canonical snapshot. Only the
    /// recalibration prompt outlives it.
    pub(super) async fn commit(&self, st: &mut SessionState) {
        let result = if st.is_complete() || st.phase == Phase::None {
            self.persistence.clear(SESSION_SNAPSHOT_KEY).await;
            self.write_prompt(st.show_recalibrate).await
        } else {
            self.persistence
                .write(&st.snapshot(), SESSION_SNAPSHOT_KEY)
                .await
        };
        match result {
            Ok(()) => {
                if matches!(st.last_error, Some(SessionError::PersistenceFailed(_))) {
                    debug!("persistence recovered");
                    st.last_error = None;
                }
            }
            Err(e) => {
                warn!("failed to persist session snapshot: {e}");
                st.last_error = Some(SessionError::PersistenceFailed(e.to_string()));
            }
        }
        self.publish(st);
    }

    async fn write_prompt(&self, show: bool) -> Result<(), PersistenceError> {
        if show {
            self.persistence.write(&true, RECALIBRATE_PROMPT_KEY).await
        } else {
            self.persistence.clear(RECALIBRATE_PROMPT_KEY).await;
            Ok(())
        }
    }

    fn add_tile_locked(&self, st: &mut SessionState, text: &str) -> Result<Tile, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyInput);
        }
        if st.tiles.len() >= MAX_TILES {
            return Err(SessionError::TooManyTiles { limit: MAX_TILES });
        }
        let tile = Tile::new(text);
        st.tiles.push(tile.clone());
        if st.phase == Phase::None {
            st.phase = Phase::Idle;
        }
        self.haptics.added();
        debug!(tile = %tile.id, count = st.tiles.len(), "tile added");
        Ok(tile)
    }

    async fn begin_locked(self: &Arc<Self>, st: &mut SessionState) -> Result<(), SessionError> {
        if !st.can_begin() {
            return Err(st.invalid_begin());
        }
        st.phase = Phase::Running;
        st.remaining_seconds = self.settings.chunk_secs;
        self.clock
            .start_ticking(self.settings.chunk_secs, self.handler())
            .await;
        info!(chunk = st.chunk_index, secs = self.settings.chunk_secs, "chunk started");
        self.commit(st).await;
        Ok(())
    }

    /// Chunk ran out, whoever noticed. Guard, haptic, transition, write.
    pub(super) async fn complete_chunk_locked(&self, st: &mut SessionState) {
        if !st.phase.is_active() {
            debug!(phase = %st.phase, "completion for inactive chunk ignored");
            return;
        }
        let index = st.chunk_index;
        if st.haptic_fired.insert(index) {
            self.haptics.notify_done();
        } else {
            debug!(chunk = index, "completion cue already fired");
        }
        if let Err(e) = self.finish_chunk_locked(st).await {
            warn!("chunk completion rejected: {e}");
        }
    }

    async fn finish_chunk_locked(&self, st: &mut SessionState) -> Result<(), SessionError> {
        if !st.phase.is_active() || st.chunk_index >= MAX_CHUNKS {
            return Err(SessionError::Unexpected(format!(
                "no chunk to finish in phase {} at chunk {}",
                st.phase, st.chunk_index
            )));
        }
        self.clock.reset().await;
        self.persistence.clear(CLOCK_SAFETY_KEY).await;

        st.chunk_index += 1;
        st.remaining_seconds = 0;
        st.phase = Phase::Finished;
        if st.chunk_index == MAX_CHUNKS {
            st.show_recalibrate = true;
            for tile in &st.tiles {
                self.history
                    .add_to_history(tile, self.settings.general_category_id);
            }
            info!("focus session complete");
        } else {
            info!(chunk = st.chunk_index, "chunk finished");
        }
        self.commit(st).await;
        Ok(())
    }
}

#[async_trait]
impl TickHandler for SessionCore {
    async fn on_tick(&self, remaining: u64) {
        let mut st = self.state.lock().await;
        if st.phase != Phase::Running {
            return;
        }
        st.remaining_seconds = remaining;
        self.commit(&mut st).await;
    }

    async fn on_finish(&self) {
        let mut st = self.state.lock().await;
        self.complete_chunk_locked(&mut st).await;
    }
}

/// Two-chunk focus session built on one [`ClockEngine`].
///
/// Dropping the controller aborts its tick task.
pub struct SessionController {
    core: Arc<SessionCore>,
}

impl SessionController {
    pub fn new(
        settings: SessionSettings,
        persistence: Arc<dyn Persistence>,
        haptics: Arc<dyn Haptics>,
        history: Arc<dyn HistorySink>,
    ) -> Self {
        Self::with_wall_clock(settings, persistence, haptics, history, Arc::new(SystemClock))
    }

    pub fn with_wall_clock(
        settings: SessionSettings,
        persistence: Arc<dyn Persistence>,
        haptics: Arc<dyn Haptics>,
        history: Arc<dyn HistorySink>,
        wall: Arc<dyn WallClock>,
    ) -> Self {
        let (view_tx, _) = watch::channel(SessionView::default());
        Self {
            core: Arc::new(SessionCore {
                state: Mutex::new(SessionState::default()),
                clock: ClockEngine::with_wall_clock(wall),
                persistence,
                haptics,
                history,
                settings,
                view_tx,
            }),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn view(&self) -> SessionView {
        self.core.view_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.core.view_tx.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.core.view_tx.borrow().phase
    }

    pub fn chunk_index(&self) -> u8 {
        self.core.view_tx.borrow().chunk_index
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.core.view_tx.borrow().remaining_seconds
    }

    pub fn tiles(&self) -> Vec<Tile> {
        self.core.view_tx.borrow().tiles.clone()
    }

    /// Session-complete flag; the UI offers a recalibration while set.
    pub fn show_recalibrate(&self) -> bool {
        self.core.view_tx.borrow().show_recalibrate
    }

    pub fn last_error(&self) -> Option<SessionError> {
        self.core.view_tx.borrow().last_error.clone()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.core.settings
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub async fn enter_idle_if_needed(&self) {
        let mut st = self.core.state.lock().await;
        if st.phase == Phase::None {
            st.phase = Phase::Idle;
            self.core.commit(&mut st).await;
        }
    }

    /// Append a tile. Never starts a timer.
    pub async fn add_tile_and_prepare_for_session(&self, text: &str) -> Result<Tile, SessionError> {
        let mut st = self.core.state.lock().await;
        let tile = self.core.add_tile_locked(&mut st, text)?;
        self.core.commit(&mut st).await;
        Ok(tile)
    }

    /// Shared funnel for submit-on-enter and the bottom action button.
    ///
    /// Adds `validated_input` while fewer than two tiles exist, otherwise
    /// begins (or advances to) the next chunk.
    pub async fn handle_primary_tap(
        &self,
        validated_input: &str,
    ) -> Result<PrimaryTapOutcome, SessionError> {
        let mut st = self.core.state.lock().await;
        if st.tiles.len() < MAX_TILES {
            let tile = self.core.add_tile_locked(&mut st, validated_input)?;
            self.core.commit(&mut st).await;
            return Ok(PrimaryTapOutcome::Added(tile));
        }
        self.core.begin_locked(&mut st).await?;
        Ok(PrimaryTapOutcome::Began)
    }

    /// Start the next chunk. Needs both tiles and an idle phase, or the
    /// first chunk finished.
    pub async fn begin_overall_session(&self) -> Result<(), SessionError> {
        let mut st = self.core.state.lock().await;
        self.core.begin_locked(&mut st).await
    }

    /// The chunk-finished path used by the live tick loop and by recovery.
    /// Safe to call more than once for the same chunk.
    pub async fn complete_current_chunk(&self) {
        let mut st = self.core.state.lock().await;
        self.core.complete_chunk_locked(&mut st).await;
    }

    /// Advance the chunk index by one without the completion cue.
    pub async fn finish_current_chunk(&self) -> Result<(), SessionError> {
        let mut st = self.core.state.lock().await;
        self.core.finish_chunk_locked(&mut st).await
    }

    pub async fn pause_current_countdown(&self) -> Result<(), SessionError> {
        let mut st = self.core.state.lock().await;
        if st.phase != Phase::Running {
            return Err(SessionError::Unexpected(format!(
                "pause requires a running chunk, phase is {}",
                st.phase
            )));
        }
        let remaining = self.core.clock.remaining();
        self.core.clock.pause_ticking(remaining).await;
        st.remaining_seconds = remaining;
        st.phase = Phase::Paused;
        debug!(remaining, "chunk paused");
        self.core.commit(&mut st).await;
        Ok(())
    }

    pub async fn resume_current_countdown(&self) -> Result<(), SessionError> {
        let mut st = self.core.state.lock().await;
        if st.phase != Phase::Paused {
            return Err(SessionError::Unexpected(format!(
                "resume requires a paused chunk, phase is {}",
                st.phase
            )));
        }
        st.phase = Phase::Running;
        let handler = self.core.handler();
        if !self.core.clock.resume_ticking(Arc::clone(&handler)).await {
            // Engine lost its pause state (e.g. restored from disk).
            self.core
                .clock
                .start_ticking(st.remaining_seconds, handler)
                .await;
        }
        debug!(remaining = st.remaining_seconds, "chunk resumed");
        self.core.commit(&mut st).await;
        Ok(())
    }

    /// Clear the session-complete flag once the prompt was shown.
    pub async fn dismiss_recalibration_prompt(&self) {
        let mut st = self.core.state.lock().await;
        if st.show_recalibrate {
            st.show_recalibrate = false;
            self.core.commit(&mut st).await;
        }
    }

    /// Back to `none` with no tiles, from any phase.
    pub async fn reset_session_state_for_new_start(&self) {
        let mut st = self.core.state.lock().await;
        self.core.clock.reset().await;
        *st = SessionState::default();
        self.core.persistence.clear(SESSION_SNAPSHOT_KEY).await;
        self.core.persistence.clear(CLOCK_SAFETY_KEY).await;
        self.core.persistence.clear(RECALIBRATE_PROMPT_KEY).await;
        self.core.publish(&st);
        info!("session reset");
    }

    /// App is going to the background: persist, stop ticking, and leave a
    /// safety snapshot in case the process is terminated.
    pub async fn suspend_ticking_for_background(&self) {
        let mut st = self.core.state.lock().await;
        if st.phase == Phase::Running {
            st.remaining_seconds = self.core.clock.remaining();
        }
        self.core.commit(&mut st).await;
        self.core.clock.suspend_for_background().await;

        if let Some(safety) = self.core.clock.make_snapshot() {
            if let Err(e) = self.core.persistence.write(&safety, CLOCK_SAFETY_KEY).await {
                warn!("failed to persist clock safety snapshot: {e}");
                st.last_error = Some(SessionError::PersistenceFailed(e.to_string()));
                self.core.publish(&st);
            }
        }
        debug!(phase = %st.phase, remaining = st.remaining_seconds, "suspended for background");
    }

    /// App is back in the foreground. Runs the three-tier recovery.
    pub async fn resume_ticking_after_foreground(&self) -> RecoveryOutcome {
        self.core.recover().await
    }

    /// Cold launch. Same procedure as returning to the foreground.
    pub async fn restore_active_session_if_any(&self) -> RecoveryOutcome {
        self.core.recover().await
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.core.clock.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{MemoryHistory, MemoryStore, NoopHaptics};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingHaptics {
        added: AtomicUsize,
        done: AtomicUsize,
    }

    impl Haptics for CountingHaptics {
        fn added(&self) {
            self.added.fetch_add(1, Ordering::SeqCst);
        }
        fn notify_done(&self) {
            self.done.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        controller: SessionController,
        store: Arc<MemoryStore>,
        haptics: Arc<CountingHaptics>,
        history: Arc<MemoryHistory>,
    }

    fn fixture(chunk_secs: u64) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let haptics = Arc::new(CountingHaptics::default());
        let history = Arc::new(MemoryHistory::new());
        let controller = SessionController::new(
            SessionSettings {
                chunk_secs,
                ..SessionSettings::default()
            },
            store.clone(),
            haptics.clone(),
            history.clone(),
        );
        Fixture {
            controller,
            store,
            haptics,
            history,
        }
    }

    async fn with_two_tiles(f: &Fixture) {
        f.controller
            .add_tile_and_prepare_for_session("Write report")
            .await
            .unwrap();
        f.controller
            .add_tile_and_prepare_for_session("Review PR")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn third_tile_is_rejected() {
        let f = fixture(60);
        with_two_tiles(&f).await;
        assert_eq!(f.controller.tiles().len(), 2);

        let err = f
            .controller
            .add_tile_and_prepare_for_session("x")
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::TooManyTiles { limit: 2 });
        assert_eq!(f.controller.tiles().len(), 2);
        assert_eq!(f.haptics.added.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn blank_tile_is_rejected_and_text_is_trimmed() {
        let f = fixture(60);
        let err = f
            .controller
            .add_tile_and_prepare_for_session("   \t")
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::EmptyInput);
        assert_eq!(f.controller.phase(), Phase::None);

        let tile = f
            .controller
            .add_tile_and_prepare_for_session("  Write report  ")
            .await
            .unwrap();
        assert_eq!(tile.text, "Write report");
        assert_eq!(f.controller.phase(), Phase::Idle);
        assert!(f.store.contains(SESSION_SNAPSHOT_KEY));
    }

    #[tokio::test(start_paused = true)]
    async fn begin_twice_is_invalid() {
        let f = fixture(60);
        with_two_tiles(&f).await;
        f.controller.begin_overall_session().await.unwrap();
        assert_eq!(f.controller.phase(), Phase::Running);

        let err = f.controller.begin_overall_session().await.unwrap_err();
        assert_eq!(
            err,
            SessionError::InvalidBegin {
                phase: Phase::Running,
                tile_count: 2
            }
        );
        assert_eq!(f.controller.phase(), Phase::Running);
    }

    #[tokio::test]
    async fn begin_needs_two_tiles() {
        let f = fixture(60);
        f.controller
            .add_tile_and_prepare_for_session("only one")
            .await
            .unwrap();
        let err = f.controller.begin_overall_session().await.unwrap_err();
        assert_eq!(
            err,
            SessionError::InvalidBegin {
                phase: Phase::Idle,
                tile_count: 1
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn primary_tap_adds_then_begins() {
        let f = fixture(60);
        let first = f.controller.handle_primary_tap("Write report").await.unwrap();
        assert!(matches!(first, PrimaryTapOutcome::Added(ref t) if t.text == "Write report"));
        f.controller.handle_primary_tap("Review PR").await.unwrap();

        let began = f.controller.handle_primary_tap("").await.unwrap();
        assert_eq!(began, PrimaryTapOutcome::Began);
        assert_eq!(f.controller.phase(), Phase::Running);

        let err = f.controller.handle_primary_tap("").await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidBegin { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn live_chunk_runs_out_and_next_begins() {
        let f = fixture(3);
        with_two_tiles(&f).await;
        f.controller.begin_overall_session().await.unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(f.controller.phase(), Phase::Finished);
        assert_eq!(f.controller.chunk_index(), 1);
        assert!(!f.controller.show_recalibrate());
        assert_eq!(f.haptics.done.load(Ordering::SeqCst), 1);

        assert_eq!(
            f.controller.handle_primary_tap("").await.unwrap(),
            PrimaryTapOutcome::Began
        );
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(f.controller.chunk_index(), 2);
        assert!(f.controller.show_recalibrate());
        assert_eq!(f.haptics.done.load(Ordering::SeqCst), 2);
        assert_eq!(f.history.len(), 2);
        assert!(!f.store.contains(SESSION_SNAPSHOT_KEY));
        assert_eq!(f.store.get(RECALIBRATE_PROMPT_KEY).as_deref(), Some("true"));
    }

    #[tokio::test(start_paused = true)]
    async fn completion_twice_fires_haptic_once() {
        let f = fixture(600);
        with_two_tiles(&f).await;
        f.controller.begin_overall_session().await.unwrap();

        f.controller.complete_current_chunk().await;
        f.controller.complete_current_chunk().await;

        assert_eq!(f.haptics.done.load(Ordering::SeqCst), 1);
        assert_eq!(f.controller.chunk_index(), 1);
        assert_eq!(f.controller.phase(), Phase::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_and_resume_guard_their_phase() {
        let f = fixture(600);
        with_two_tiles(&f).await;
        assert!(matches!(
            f.controller.pause_current_countdown().await,
            Err(SessionError::Unexpected(_))
        ));

        f.controller.begin_overall_session().await.unwrap();
        tokio::time::sleep(Duration::from_secs(100)).await;
        f.controller.pause_current_countdown().await.unwrap();
        assert_eq!(f.controller.phase(), Phase::Paused);
        assert_eq!(f.controller.remaining_seconds(), 500);

        tokio::time::sleep(Duration::from_secs(1000)).await;
        assert_eq!(f.controller.remaining_seconds(), 500);
        assert!(matches!(
            f.controller.pause_current_countdown().await,
            Err(SessionError::Unexpected(_))
        ));

        f.controller.resume_current_countdown().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(f.controller.phase(), Phase::Running);
        assert_eq!(f.controller.remaining_seconds(), 490);
    }

    #[tokio::test(start_paused = true)]
    async fn persistence_failure_is_surfaced_not_fatal() {
        let f = fixture(600);
        with_two_tiles(&f).await;
        f.store.set_fail_writes(true);

        f.controller.begin_overall_session().await.unwrap();

        assert_eq!(f.controller.phase(), Phase::Running);
        assert!(matches!(
            f.controller.last_error(),
            Some(SessionError::PersistenceFailed(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn persistence_error_clears_after_next_good_write() {
        let f = fixture(600);
        with_two_tiles(&f).await;
        f.store.set_fail_writes(true);
        f.controller.begin_overall_session().await.unwrap();
        assert!(f.controller.last_error().is_some());

        f.store.set_fail_writes(false);
        f.controller.pause_current_countdown().await.unwrap();

        assert_eq!(f.controller.last_error(), None);
        assert!(f.store.contains(SESSION_SNAPSHOT_KEY));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_everything() {
        let f = fixture(600);
        with_two_tiles(&f).await;
        f.controller.begin_overall_session().await.unwrap();
        f.controller.suspend_ticking_for_background().await;
        assert!(f.store.contains(CLOCK_SAFETY_KEY));

        f.controller.reset_session_state_for_new_start().await;

        assert_eq!(f.controller.view(), SessionView::default());
        assert!(!f.store.contains(SESSION_SNAPSHOT_KEY));
        assert!(!f.store.contains(CLOCK_SAFETY_KEY));
        tokio::time::sleep(Duration::from_secs(700)).await;
        assert_eq!(f.haptics.done.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn finish_without_active_chunk_is_unexpected() {
        let store = Arc::new(MemoryStore::new());
        let controller = SessionController::new(
            SessionSettings::default(),
            store,
            Arc::new(NoopHaptics),
            Arc::new(MemoryHistory::new()),
        );
        assert!(matches!(
            controller.finish_current_chunk().await,
            Err(SessionError::Unexpected(_))
        ));
        assert_eq!(controller.chunk_index(), 0);
    }
}
