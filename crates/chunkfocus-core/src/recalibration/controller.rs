//! Breathing / balancing recalibration controller.
//!
//! A single short countdown on its own [`ClockEngine`]. The cadence (breath
//! phase or balancing side) is derived from elapsed time on every tick and
//! is never persisted.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use super::cadence::{
    side_index_at, BreathingCadence, BREATH_CUE, COMPLETION_CUE, SIDE_SWITCH_CUE,
};
use super::{RecalibrationMode, RecalibrationSettings, MINUTES_RANGE};
use crate::clock::{ClockEngine, SystemClock, TickHandler, WallClock};
use crate::collaborators::Haptics;
use crate::error::RecalibrationError;
use crate::phase::Phase;

type CompletionCallback = Arc<dyn Fn(RecalibrationMode) + Send + Sync>;

/// Observable recalibration state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecalibrationView {
    pub phase: Phase,
    pub mode: Option<RecalibrationMode>,
    pub total_secs: u64,
    pub remaining_secs: u64,
    /// Index into the breathing cycle.
    pub phase_index: usize,
    /// Balancing side, 0 or 1.
    pub side_index: u8,
    pub breathing_minutes: u32,
    pub balancing_minutes: u32,
}

struct RecalState {
    phase: Phase,
    mode: Option<RecalibrationMode>,
    total_secs: u64,
    remaining_secs: u64,
    phase_index: usize,
    side_index: u8,
    last_minute: u64,
    /// Wall-clock epoch (ms) the running countdown ends at. `None` unless
    /// running.
    deadline_epoch_ms: Option<i64>,
    breathing_minutes: u32,
    balancing_minutes: u32,
}

impl RecalState {
    fn view(&self) -> RecalibrationView {
        RecalibrationView {
            phase: self.phase,
            mode: self.mode,
            total_secs: self.total_secs,
            remaining_secs: self.remaining_secs,
            phase_index: self.phase_index,
            side_index: self.side_index,
            breathing_minutes: self.breathing_minutes,
            balancing_minutes: self.balancing_minutes,
        }
    }

    fn clear_run(&mut self) {
        self.phase = Phase::Idle;
        self.mode = None;
        self.total_secs = 0;
        self.remaining_secs = 0;
        self.phase_index = 0;
        self.side_index = 0;
        self.last_minute = 0;
        self.deadline_epoch_ms = None;
    }
}

struct RecalCore {
    state: Mutex<RecalState>,
    clock: ClockEngine,
    wall: Arc<dyn WallClock>,
    haptics: Arc<dyn Haptics>,
    cadence: BreathingCadence,
    on_completed: RwLock<Option<CompletionCallback>>,
    view_tx: watch::Sender<RecalibrationView>,
}

impl RecalCore {
    fn handler(self: &Arc<Self>) -> Arc<dyn TickHandler> {
        Arc::clone(self) as Arc<dyn TickHandler>
    }

    fn publish(&self, st: &RecalState) {
        self.view_tx.send_replace(st.view());
    }

    /// Arm the monotonic countdown and record where it ends on the wall clock.
    async fn arm(self: &Arc<Self>, st: &mut RecalState, remaining: u64) {
        let remaining_ms = i64::try_from(remaining.saturating_mul(1000)).unwrap_or(i64::MAX);
        st.deadline_epoch_ms = Some(self.wall.now_epoch_ms().saturating_add(remaining_ms));
        self.clock.start_ticking(remaining, self.handler()).await;
    }

    /// Remaining seconds by the wall clock, if a deadline is recorded.
    fn wall_remaining(&self, st: &RecalState) -> Option<u64> {
        let left_ms = st.deadline_epoch_ms?.saturating_sub(self.wall.now_epoch_ms());
        Some((left_ms.max(0) as u64).div_ceil(1000))
    }

    /// Move the cadence to `remaining`, cueing boundaries that were crossed.
    /// The final second gets the completion pattern instead.
    fn advance_cadence(&self, st: &mut RecalState, remaining: u64) {
        st.remaining_secs = remaining;
        let elapsed = st.total_secs.saturating_sub(remaining);
        match st.mode {
            Some(RecalibrationMode::Breathing) => {
                let index = self.cadence.phase_index_at(elapsed);
                if index != st.phase_index {
                    st.phase_index = index;
                    if remaining > 0 {
                        self.haptics.play(BREATH_CUE);
                    }
                }
            }
            Some(RecalibrationMode::Balancing) => {
                let minute = elapsed / 60;
                if remaining > 0 && minute > st.last_minute {
                    st.last_minute = minute;
                    let side = side_index_at(elapsed);
                    if side != st.side_index {
                        st.side_index = side;
                        self.haptics.play(SIDE_SWITCH_CUE);
                    }
                }
            }
            None => {}
        }
    }

    async fn complete_locked(&self, st: &mut RecalState) {
        if !st.phase.is_active() {
            debug!(phase = %st.phase, "recalibration completion ignored");
            return;
        }
        let mode = st.mode;
        self.clock.reset().await;
        self.haptics.play(COMPLETION_CUE);
        st.clear_run();
        self.publish(st);
        info!(?mode, "recalibration complete");

        if let Some(mode) = mode {
            let callback = self
                .on_completed
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(callback) = callback {
                callback(mode);
            }
        }
    }
}

#[async_trait]
impl TickHandler for RecalCore {
    async fn on_tick(&self, remaining: u64) {
        let mut st = self.state.lock().await;
        if st.phase != Phase::Running {
            return;
        }
        self.advance_cadence(&mut st, remaining);
        self.publish(&st);
    }

    async fn on_finish(&self) {
        let mut st = self.state.lock().await;
        self.complete_locked(&mut st).await;
    }
}

/// Drives one breathing or balancing countdown at a time.
///
/// Dropping the controller aborts its tick task.
pub struct RecalibrationController {
    core: Arc<RecalCore>,
}

impl RecalibrationController {
    pub fn new(settings: RecalibrationSettings, haptics: Arc<dyn Haptics>) -> Self {
        Self::with_wall_clock(settings, haptics, Arc::new(SystemClock))
    }

    pub fn with_wall_clock(
        settings: RecalibrationSettings,
        haptics: Arc<dyn Haptics>,
        wall: Arc<dyn WallClock>,
    ) -> Self {
        let st = RecalState {
            phase: Phase::Idle,
            mode: None,
            total_secs: 0,
            remaining_secs: 0,
            phase_index: 0,
            side_index: 0,
            last_minute: 0,
            deadline_epoch_ms: None,
            breathing_minutes: clamp_minutes(settings.breathing_minutes),
            balancing_minutes: clamp_minutes(settings.balancing_minutes),
        };
        let (view_tx, _) = watch::channel(st.view());
        Self {
            core: Arc::new(RecalCore {
                state: Mutex::new(st),
                clock: ClockEngine::with_wall_clock(Arc::clone(&wall)),
                wall,
                haptics,
                cadence: settings.cadence,
                on_completed: RwLock::new(None),
                view_tx,
            }),
        }
    }

    /// Register the hook that logs finished recalibrations.
    pub fn set_on_completed<F>(&self, callback: F)
    where
        F: Fn(RecalibrationMode) + Send + Sync + 'static,
    {
        *self
            .core
            .on_completed
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn view(&self) -> RecalibrationView {
        self.core.view_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RecalibrationView> {
        self.core.view_tx.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.core.view_tx.borrow().phase
    }

    pub fn mode(&self) -> Option<RecalibrationMode> {
        self.core.view_tx.borrow().mode
    }

    pub fn remaining_secs(&self) -> u64 {
        self.core.view_tx.borrow().remaining_secs
    }

    pub fn phase_index(&self) -> usize {
        self.core.view_tx.borrow().phase_index
    }

    pub fn side_index(&self) -> u8 {
        self.core.view_tx.borrow().side_index
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub async fn start(&self, mode: RecalibrationMode) -> Result<(), RecalibrationError> {
        let mut st = self.core.state.lock().await;
        if st.phase.is_active() {
            return Err(RecalibrationError::Busy);
        }
        let minutes = match mode {
            RecalibrationMode::Breathing => st.breathing_minutes,
            RecalibrationMode::Balancing => st.balancing_minutes,
        };
        let total = u64::from(minutes) * 60;
        st.clear_run();
        st.phase = Phase::Running;
        st.mode = Some(mode);
        st.total_secs = total;
        st.remaining_secs = total;
        self.core.arm(&mut st, total).await;
        info!(?mode, minutes, "recalibration started");
        self.core.publish(&st);
        Ok(())
    }

    pub async fn pause(&self) -> Result<(), RecalibrationError> {
        let mut st = self.core.state.lock().await;
        if st.phase != Phase::Running {
            return Err(RecalibrationError::NotRunning);
        }
        let remaining = self.core.clock.remaining();
        self.core.clock.pause_ticking(remaining).await;
        st.remaining_secs = remaining;
        st.phase = Phase::Paused;
        st.deadline_epoch_ms = None;
        self.core.publish(&st);
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), RecalibrationError> {
        let mut st = self.core.state.lock().await;
        if st.phase != Phase::Paused {
            return Err(RecalibrationError::NotPaused);
        }
        st.phase = Phase::Running;
        let remaining = st.remaining_secs;
        self.core.arm(&mut st, remaining).await;
        self.core.publish(&st);
        Ok(())
    }

    /// Abandon the current run without the completion cue or callback.
    pub async fn cancel(&self) {
        let mut st = self.core.state.lock().await;
        self.core.clock.reset().await;
        st.clear_run();
        self.core.publish(&st);
        debug!("recalibration cancelled");
    }

    pub async fn set_breathing_minutes(&self, minutes: u32) -> Result<(), RecalibrationError> {
        let mut st = self.core.state.lock().await;
        validate_change(&st, minutes)?;
        st.breathing_minutes = minutes;
        self.core.publish(&st);
        Ok(())
    }

    pub async fn set_balancing_minutes(&self, minutes: u32) -> Result<(), RecalibrationError> {
        let mut st = self.core.state.lock().await;
        validate_change(&st, minutes)?;
        st.balancing_minutes = minutes;
        self.core.publish(&st);
        Ok(())
    }

    pub async fn app_did_enter_background(&self) {
        let _st = self.core.state.lock().await;
        self.core.clock.suspend_for_background().await;
    }

    /// Reconcile with the time spent away. Remaining is the smaller of the
    /// monotonic and the wall-clock remainder; the monotonic clock can stand
    /// still while the system sleeps. A run that ran out in the background
    /// completes now instead of resuming.
    pub async fn app_did_become_active(&self) {
        let mut st = self.core.state.lock().await;
        if st.phase != Phase::Running {
            return;
        }
        let monotonic = self.core.clock.remaining_after_foreground();
        let wall = self.core.wall_remaining(&st);
        let remaining = match (monotonic, wall) {
            (Some(m), Some(w)) => m.min(w),
            (Some(r), None) | (None, Some(r)) => r,
            (None, None) => return,
        };
        if remaining == 0 {
            self.core.complete_locked(&mut st).await;
            return;
        }
        self.core.advance_cadence(&mut st, remaining);
        self.core.arm(&mut st, remaining).await;
        self.core.publish(&st);
        debug!(remaining, "recalibration resumed after foreground");
    }
}

impl Drop for RecalibrationController {
    fn drop(&mut self) {
        self.core.clock.shutdown();
    }
}

fn validate_change(st: &RecalState, minutes: u32) -> Result<(), RecalibrationError> {
    if !MINUTES_RANGE.contains(&minutes) {
        return Err(RecalibrationError::MinutesOutOfRange {
            value: minutes,
            min: *MINUTES_RANGE.start(),
            max: *MINUTES_RANGE.end(),
        });
    }
    if st.phase == Phase::Running {
        return Err(RecalibrationError::Busy);
    }
    Ok(())
}

fn clamp_minutes(minutes: u32) -> u32 {
    minutes.clamp(*MINUTES_RANGE.start(), *MINUTES_RANGE.end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::collaborators::Pulse;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct PatternLog {
        patterns: std::sync::Mutex<Vec<Vec<Pulse>>>,
    }

    impl PatternLog {
        fn count(&self, pattern: &[Pulse]) -> usize {
            self.patterns
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.as_slice() == pattern)
                .count()
        }
    }

    impl Haptics for PatternLog {
        fn added(&self) {}
        fn notify_done(&self) {}
        fn play(&self, pattern: &[Pulse]) {
            self.patterns.lock().unwrap().push(pattern.to_vec());
        }
    }

    fn controller(breathing: u32, balancing: u32) -> (RecalibrationController, Arc<PatternLog>) {
        let haptics = Arc::new(PatternLog::default());
        let settings = RecalibrationSettings {
            breathing_minutes: breathing,
            balancing_minutes: balancing,
            cadence: BreathingCadence::default(),
        };
        (RecalibrationController::new(settings, haptics.clone()), haptics)
    }

    #[tokio::test(start_paused = true)]
    async fn breathing_cues_every_boundary_then_completes_once() {
        let (ctl, haptics) = controller(1, 2);
        let completed = Arc::new(AtomicUsize::new(0));
        let seen = completed.clone();
        ctl.set_on_completed(move |mode| {
            assert_eq!(mode, RecalibrationMode::Breathing);
            seen.fetch_add(1, Ordering::SeqCst);
        });

        ctl.start(RecalibrationMode::Breathing).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(ctl.phase_index(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;

        // Boundaries at 4, 8, ... 56 seconds.
        assert_eq!(haptics.count(BREATH_CUE), 14);
        assert_eq!(haptics.count(COMPLETION_CUE), 1);
        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert_eq!(ctl.phase(), Phase::Idle);
        assert_eq!(ctl.mode(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn balancing_switches_side_each_minute_but_not_at_start() {
        let (ctl, haptics) = controller(2, 3);
        ctl.start(RecalibrationMode::Balancing).await.unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(ctl.side_index(), 0);
        assert_eq!(haptics.count(SIDE_SWITCH_CUE), 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(ctl.side_index(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(ctl.side_index(), 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        // Minutes 1 and 2 switched; minute 3 is the end.
        assert_eq!(haptics.count(SIDE_SWITCH_CUE), 2);
        assert_eq!(haptics.count(COMPLETION_CUE), 1);
        assert_eq!(ctl.phase(), Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn finishing_in_background_completes_on_foreground() {
        let (ctl, haptics) = controller(1, 2);
        let completed = Arc::new(AtomicUsize::new(0));
        let seen = completed.clone();
        ctl.set_on_completed(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        ctl.start(RecalibrationMode::Breathing).await.unwrap();
        ctl.app_did_enter_background().await;
        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(completed.load(Ordering::SeqCst), 0);

        ctl.app_did_become_active().await;

        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert_eq!(haptics.count(COMPLETION_CUE), 1);
        assert_eq!(ctl.phase(), Phase::Idle);

        ctl.app_did_become_active().await;
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn foreground_resumes_with_elapsed_time_deducted() {
        let (ctl, _haptics) = controller(2, 2);
        ctl.start(RecalibrationMode::Balancing).await.unwrap();
        ctl.app_did_enter_background().await;
        tokio::time::advance(Duration::from_secs(75)).await;

        ctl.app_did_become_active().await;

        assert_eq!(ctl.phase(), Phase::Running);
        assert_eq!(ctl.remaining_secs(), 45);
        assert_eq!(ctl.side_index(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wall_time_away_counts_when_the_monotonic_clock_stood_still() {
        let wall = Arc::new(ManualClock::new(1_700_000_000_000));
        let haptics = Arc::new(PatternLog::default());
        let settings = RecalibrationSettings {
            breathing_minutes: 1,
            ..RecalibrationSettings::default()
        };
        let ctl = RecalibrationController::with_wall_clock(settings, haptics.clone(), wall.clone());
        let completed = Arc::new(AtomicUsize::new(0));
        let seen = completed.clone();
        ctl.set_on_completed(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        ctl.start(RecalibrationMode::Breathing).await.unwrap();
        ctl.app_did_enter_background().await;
        wall.advance_secs(120);

        ctl.app_did_become_active().await;

        assert_eq!(ctl.phase(), Phase::Idle);
        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert_eq!(haptics.count(COMPLETION_CUE), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_wall_time_away_is_deducted() {
        let wall = Arc::new(ManualClock::new(1_700_000_000_000));
        let ctl = RecalibrationController::with_wall_clock(
            RecalibrationSettings::default(),
            Arc::new(PatternLog::default()),
            wall.clone(),
        );

        ctl.start(RecalibrationMode::Balancing).await.unwrap();
        ctl.app_did_enter_background().await;
        wall.advance_secs(80);
        ctl.app_did_become_active().await;

        assert_eq!(ctl.phase(), Phase::Running);
        assert_eq!(ctl.remaining_secs(), 40);
        assert_eq!(ctl.side_index(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn minutes_are_validated() {
        let (ctl, _haptics) = controller(2, 2);
        assert_eq!(
            ctl.set_breathing_minutes(0).await,
            Err(RecalibrationError::MinutesOutOfRange {
                value: 0,
                min: 1,
                max: 4
            })
        );
        assert!(ctl.set_balancing_minutes(5).await.is_err());
        ctl.set_breathing_minutes(3).await.unwrap();
        assert_eq!(ctl.view().breathing_minutes, 3);

        ctl.start(RecalibrationMode::Breathing).await.unwrap();
        assert_eq!(ctl.view().total_secs, 180);
        assert_eq!(
            ctl.set_balancing_minutes(3).await,
            Err(RecalibrationError::Busy)
        );
        assert_eq!(
            ctl.start(RecalibrationMode::Balancing).await,
            Err(RecalibrationError::Busy)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn pause_freezes_and_cancel_skips_completion() {
        let (ctl, haptics) = controller(1, 1);
        let completed = Arc::new(AtomicUsize::new(0));
        let seen = completed.clone();
        ctl.set_on_completed(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        ctl.start(RecalibrationMode::Breathing).await.unwrap();
        tokio::time::sleep(Duration::from_secs(20)).await;
        ctl.pause().await.unwrap();
        assert_eq!(ctl.remaining_secs(), 40);
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(ctl.remaining_secs(), 40);
        assert_eq!(ctl.pause().await, Err(RecalibrationError::NotRunning));

        ctl.resume().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(ctl.remaining_secs(), 30);

        ctl.cancel().await;
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(completed.load(Ordering::SeqCst), 0);
        assert_eq!(haptics.count(COMPLETION_CUE), 0);
        assert_eq!(ctl.phase(), Phase::Idle);
        assert_eq!(ctl.resume().await, Err(RecalibrationError::NotPaused));
    }
}
