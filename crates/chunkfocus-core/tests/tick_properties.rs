//! Tick-sequence properties of the clock engine under virtual time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chunkfocus_core::{ClockEngine, TickHandler};
use proptest::prelude::*;

#[derive(Default)]
struct Recorder {
    ticks: Mutex<Vec<u64>>,
    finishes: AtomicUsize,
    ticks_at_finish: AtomicUsize,
}

#[async_trait]
impl TickHandler for Recorder {
    async fn on_tick(&self, remaining: u64) {
        self.ticks.lock().unwrap().push(remaining);
    }

    async fn on_finish(&self) {
        let seen = self.ticks.lock().unwrap().len();
        self.ticks_at_finish.store(seen, Ordering::SeqCst);
        self.finishes.fetch_add(1, Ordering::SeqCst);
    }
}

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn ticks_are_gap_free_and_finish_once(total in 0u64..90) {
        let rec = Arc::new(Recorder::default());
        paused_runtime().block_on(async {
            let engine = ClockEngine::new();
            engine.start_ticking(total, rec.clone()).await;
            tokio::time::sleep(Duration::from_secs(total + 5)).await;
        });

        let ticks = rec.ticks.lock().unwrap().clone();
        let expected: Vec<u64> = (0..=total).rev().collect();
        prop_assert_eq!(&ticks, &expected);
        prop_assert_eq!(rec.finishes.load(Ordering::SeqCst), 1);
        prop_assert_eq!(rec.ticks_at_finish.load(Ordering::SeqCst), ticks.len());
    }

    #[test]
    fn pause_then_resume_continues_from_frozen_value(
        total in 2u64..60,
        pause_ms in 0u64..60_000,
        away_secs in 0u64..600,
    ) {
        let pause_ms = pause_ms % (total * 1000);
        let rec = Arc::new(Recorder::default());
        let frozen = paused_runtime().block_on(async {
            let engine = ClockEngine::new();
            engine.start_ticking(total, rec.clone()).await;
            tokio::time::sleep(Duration::from_millis(pause_ms)).await;

            let frozen = engine.remaining();
            engine.pause_ticking(frozen).await;
            tokio::time::sleep(Duration::from_secs(away_secs)).await;
            assert_eq!(engine.remaining(), frozen);

            assert!(engine.resume_ticking(rec.clone()).await);
            tokio::time::sleep(Duration::from_secs(frozen + 5)).await;
            frozen
        });

        let ticks = rec.ticks.lock().unwrap().clone();
        prop_assert!(frozen >= 1 && frozen <= total);
        // The run before the pause and the resumed run are each gap-free.
        let resumed_at = ticks.iter().rposition(|&t| t == frozen).unwrap();
        let resumed: Vec<u64> = ticks[resumed_at..].to_vec();
        let expected: Vec<u64> = (0..=frozen).rev().collect();
        prop_assert_eq!(resumed, expected);
        prop_assert!(ticks[..resumed_at].windows(2).all(|w| w[0] == w[1] + 1));
        prop_assert_eq!(rec.finishes.load(Ordering::SeqCst), 1);
    }
}
