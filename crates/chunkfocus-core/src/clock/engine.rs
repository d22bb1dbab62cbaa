//! Cancellable countdown engine.
//!
//! The engine owns at most one tick task. The task sleeps on the monotonic
//! tokio clock until the next whole-second boundary of its deadline, so
//! wall-clock changes made by the user never bend a running countdown.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running -> Idle            (ran to zero, on_finish fired)
//! Running -> Paused -> Running       (user pause / resume)
//! Running -> Running (no task)       (background suspend, deadline kept)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let engine = ClockEngine::new();
//! engine.start_ticking(1200, handler.clone()).await;
//! engine.suspend_for_background().await;
//! // ... later, after the app returns to the foreground:
//! let remaining = engine.remaining_after_foreground();
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::wall::{SystemClock, WallClock};

/// Longest countdown the engine arms; longer requests are clamped.
pub const MAX_COUNTDOWN_SECS: u64 = 365 * 24 * 60 * 60;

/// Receives countdown progress from the tick task.
///
/// Both callbacks run on the tick task. `on_tick` must not call back into the
/// engine that is driving it; `on_finish` may, since the task has already
/// detached itself by then.
#[async_trait]
pub trait TickHandler: Send + Sync + 'static {
    async fn on_tick(&self, remaining: u64);
    async fn on_finish(&self);
}

/// What the engine currently knows about its countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Idle,
    /// Counting down towards `deadline`. A tick task may or may not be
    /// attached; after a background suspend it is not.
    Running { deadline: Instant },
    /// Frozen by the user.
    Paused { remaining: u64 },
}

/// Crash-recovery record of a running countdown.
///
/// Written only around backgrounding, read only when the process was
/// terminated and the in-memory deadline is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockSafetySnapshot {
    /// Wall-clock epoch (ms) at which the current countdown was armed.
    pub session_start_epoch_ms: i64,
    pub remaining_seconds: u64,
    /// Wall-clock epoch (ms) at which this record was taken.
    pub captured_at_epoch_ms: i64,
}

struct TickTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Inner {
    state: ClockState,
    task: Option<TickTask>,
    /// Bumped on every arm and every cancel so a superseded loop can tell
    /// it no longer owns the engine.
    generation: u64,
    armed_at_epoch_ms: i64,
}

/// Monotonic countdown with pause, background suspend and crash snapshots.
pub struct ClockEngine {
    inner: Arc<Mutex<Inner>>,
    wall: Arc<dyn WallClock>,
}

impl ClockEngine {
    pub fn new() -> Self {
        Self::with_wall_clock(Arc::new(SystemClock))
    }

    pub fn with_wall_clock(wall: Arc<dyn WallClock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: ClockState::Idle,
                task: None,
                generation: 0,
                armed_at_epoch_ms: 0,
            })),
            wall,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> ClockState {
        lock(&self.inner).state
    }

    /// True while a tick task is attached and has not exited.
    pub fn is_ticking(&self) -> bool {
        lock(&self.inner)
            .task
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Remaining whole seconds from whichever state is current. Idle is 0.
    pub fn remaining(&self) -> u64 {
        match lock(&self.inner).state {
            ClockState::Idle => 0,
            ClockState::Running { deadline } => remaining_secs(deadline, Instant::now()),
            ClockState::Paused { remaining } => remaining,
        }
    }

    /// Remaining seconds after returning from the background.
    ///
    /// A kept deadline is recomputed (0 means the countdown ran out while
    /// suspended); a user pause reports its frozen value. `None` means the
    /// engine holds no countdown at all, e.g. after a process restart.
    pub fn remaining_after_foreground(&self) -> Option<u64> {
        match lock(&self.inner).state {
            ClockState::Idle => None,
            ClockState::Running { deadline } => Some(remaining_secs(deadline, Instant::now())),
            ClockState::Paused { remaining } => Some(remaining),
        }
    }

    /// Capture a safety snapshot. Only a running countdown produces one;
    /// a paused one is fully described by the caller's own snapshot.
    pub fn make_snapshot(&self) -> Option<ClockSafetySnapshot> {
        let inner = lock(&self.inner);
        match inner.state {
            ClockState::Running { deadline } => Some(ClockSafetySnapshot {
                session_start_epoch_ms: inner.armed_at_epoch_ms,
                remaining_seconds: remaining_secs(deadline, Instant::now()),
                captured_at_epoch_ms: self.wall.now_epoch_ms(),
            }),
            _ => None,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Arm a countdown of `total_secs`, replacing any existing one.
    ///
    /// The previous tick task is cancelled and joined before the new one is
    /// spawned.
    pub async fn start_ticking(&self, total_secs: u64, handler: Arc<dyn TickHandler>) {
        self.cancel_task().await;

        let now = Instant::now();
        let deadline = now
            .checked_add(Duration::from_secs(total_secs))
            .filter(|_| total_secs <= MAX_COUNTDOWN_SECS)
            .unwrap_or_else(|| {
                warn!(total_secs, "countdown too long, clamping");
                now + Duration::from_secs(MAX_COUNTDOWN_SECS)
            });
        let cancel = CancellationToken::new();
        let mut inner = lock(&self.inner);
        inner.generation += 1;
        inner.state = ClockState::Running { deadline };
        inner.armed_at_epoch_ms = self.wall.now_epoch_ms();
        let handle = tokio::spawn(tick_loop(
            Arc::clone(&self.inner),
            inner.generation,
            deadline,
            cancel.clone(),
            handler,
        ));
        inner.task = Some(TickTask { cancel, handle });
        debug!(total_secs, generation = inner.generation, "countdown armed");
    }

    /// Freeze the countdown at `current_remaining`.
    pub async fn pause_ticking(&self, current_remaining: u64) {
        self.cancel_task().await;
        lock(&self.inner).state = ClockState::Paused {
            remaining: current_remaining,
        };
        debug!(remaining = current_remaining, "countdown paused");
    }

    /// Re-arm from the frozen value (or from a kept deadline).
    ///
    /// Returns `false` and does nothing when there is nothing to resume.
    pub async fn resume_ticking(&self, handler: Arc<dyn TickHandler>) -> bool {
        let remaining = match lock(&self.inner).state {
            ClockState::Paused { remaining } => remaining,
            ClockState::Running { deadline } => remaining_secs(deadline, Instant::now()),
            ClockState::Idle => {
                debug!("resume requested without pause state");
                return false;
            }
        };
        self.start_ticking(remaining, handler).await;
        true
    }

    /// Stop the tick task but keep the deadline, so time keeps elapsing.
    pub async fn suspend_for_background(&self) {
        self.cancel_task().await;
        debug!(state = ?self.state(), "tick task suspended for background");
    }

    /// Seed a frozen countdown from a safety snapshot taken before the
    /// process died. Wall time elapsed since the capture is deducted; a
    /// clock that moved backwards counts as no elapsed time.
    pub async fn restore_from_safety_snapshot(&self, snap: &ClockSafetySnapshot) -> u64 {
        self.cancel_task().await;

        let elapsed_ms = self
            .wall
            .now_epoch_ms()
            .saturating_sub(snap.captured_at_epoch_ms)
            .max(0) as u64;
        let left_ms = snap
            .remaining_seconds
            .min(MAX_COUNTDOWN_SECS)
            .saturating_mul(1000)
            .saturating_sub(elapsed_ms);
        let remaining = left_ms.div_ceil(1000);

        let mut inner = lock(&self.inner);
        inner.state = ClockState::Paused { remaining };
        inner.armed_at_epoch_ms = snap.session_start_epoch_ms;
        debug!(
            stored = snap.remaining_seconds,
            elapsed_ms, remaining, "restored from safety snapshot"
        );
        remaining
    }

    /// Cancel any tick task and forget the countdown.
    pub async fn reset(&self) {
        self.cancel_task().await;
        lock(&self.inner).state = ClockState::Idle;
    }

    /// Synchronous teardown for `Drop` paths: aborts the tick task without
    /// waiting for it.
    pub fn shutdown(&self) {
        let mut inner = lock(&self.inner);
        inner.generation += 1;
        if let Some(task) = inner.task.take() {
            task.cancel.cancel();
            task.handle.abort();
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    async fn cancel_task(&self) {
        let task = {
            let mut inner = lock(&self.inner);
            inner.generation += 1;
            inner.task.take()
        };
        let Some(task) = task else {
            return;
        };
        task.cancel.cancel();
        // A loop parked inside a handler (e.g. waiting on its owner's lock)
        // only stops at that await point, hence the abort.
        task.handle.abort();
        match task.handle.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => warn!("tick task ended abnormally: {e}"),
        }
        trace!("tick task joined");
    }
}

impl Default for ClockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ClockEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn tick_loop(
    inner: Arc<Mutex<Inner>>,
    generation: u64,
    deadline: Instant,
    cancel: CancellationToken,
    handler: Arc<dyn TickHandler>,
) {
    let mut last: Option<u64> = None;
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let now = Instant::now();
        let remaining = remaining_secs(deadline, now);
        if last != Some(remaining) {
            last = Some(remaining);
            handler.on_tick(remaining).await;
        }
        if remaining == 0 {
            break;
        }

        if cancel.is_cancelled() {
            return;
        }
        // Wake exactly when the ceiling drops by one; never more than 1s away.
        let wake = deadline
            .checked_sub(Duration::from_secs(remaining - 1))
            .unwrap_or_else(|| now + Duration::from_secs(1));
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep_until(wake) => {}
        }
        if cancel.is_cancelled() {
            return;
        }
    }

    {
        let mut guard = lock(&inner);
        if guard.generation != generation || cancel.is_cancelled() {
            return;
        }
        guard.state = ClockState::Idle;
        guard.task = None;
    }
    trace!(generation, "countdown reached zero");
    handler.on_finish().await;
}

/// `ceil(deadline - now)` in whole seconds, never negative.
pub(crate) fn remaining_secs(deadline: Instant, now: Instant) -> u64 {
    let left = deadline.saturating_duration_since(now);
    left.as_nanos().div_ceil(1_000_000_000) as u64
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}
