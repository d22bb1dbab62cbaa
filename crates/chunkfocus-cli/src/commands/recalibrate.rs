use std::io::Write;
use std::sync::Arc;

use chunkfocus_core::collaborators::TracingHaptics;
use chunkfocus_core::recalibration::{BreathPhase, RecalibrationView};
use chunkfocus_core::{Config, Phase, RecalibrationController, RecalibrationMode, SqliteStore};

use super::{format_clock, session, CliResult};

pub async fn run(mode: RecalibrationMode, minutes: Option<u32>) -> CliResult {
    let config = Config::load()?;
    let store = Arc::new(SqliteStore::open()?);
    let recal =
        RecalibrationController::new(config.recalibration_settings(), Arc::new(TracingHaptics));

    if let Some(minutes) = minutes {
        match mode {
            RecalibrationMode::Breathing => recal.set_breathing_minutes(minutes).await?,
            RecalibrationMode::Balancing => recal.set_balancing_minutes(minutes).await?,
        }
    }
    let length = match mode {
        RecalibrationMode::Breathing => recal.view().breathing_minutes,
        RecalibrationMode::Balancing => recal.view().balancing_minutes,
    };

    let sink = Arc::clone(&store);
    recal.set_on_completed(move |mode| {
        if let Err(e) = sink.record_recalibration(mode, length) {
            tracing::warn!(%mode, "failed to record recalibration: {e}");
        }
    });

    recal.start(mode).await?;
    println!("{mode} for {length} min (Ctrl-C to stop)");

    let mut views = recal.subscribe();
    loop {
        let view = views.borrow_and_update().clone();
        if view.phase == Phase::Idle {
            break;
        }
        print!("\r{}  {:<10}", format_clock(view.remaining_secs), cue_label(&view));
        std::io::stdout().flush()?;

        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                recal.cancel().await;
                println!();
                println!("{mode} stopped");
                return Ok(());
            }
        }
    }

    println!();
    println!("{mode} complete");
    session::acknowledge_recalibration().await
}

fn cue_label(view: &RecalibrationView) -> &'static str {
    match view.mode {
        Some(RecalibrationMode::Breathing) => match BreathPhase::ALL.get(view.phase_index) {
            Some(BreathPhase::Inhale) => "inhale",
            Some(BreathPhase::HoldIn) | Some(BreathPhase::HoldOut) => "hold",
            Some(BreathPhase::Exhale) => "exhale",
            None => "",
        },
        Some(RecalibrationMode::Balancing) if view.side_index == 0 => "left foot",
        Some(RecalibrationMode::Balancing) => "right foot",
        None => "",
    }
}
