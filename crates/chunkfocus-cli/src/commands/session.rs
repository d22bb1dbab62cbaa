use std::io::Write;
use std::sync::Arc;

use chunkfocus_core::collaborators::TracingHaptics;
use chunkfocus_core::session::{
    PrimaryTapOutcome, RecoveryOutcome, RecoverySource, SessionView, MAX_CHUNKS, MAX_TILES,
};
use chunkfocus_core::{Config, CoreError, Phase, SessionController, SqliteStore};
use serde::Serialize;

use super::{format_clock, CliResult};

#[derive(Serialize)]
struct Status<'a> {
    #[serde(flatten)]
    view: &'a SessionView,
    recovered_from: RecoverySource,
}

/// Cold launch: build the controller over the on-disk store and recover.
async fn open() -> Result<(SessionController, RecoveryOutcome), CoreError> {
    let config = Config::load()?;
    let store = Arc::new(SqliteStore::open()?);
    let controller = SessionController::new(
        config.session_settings(),
        store.clone(),
        Arc::new(TracingHaptics),
        store,
    );
    let outcome = controller.restore_active_session_if_any().await;
    tracing::debug!(?outcome, "session opened");
    Ok((controller, outcome))
}

/// Leave a running chunk elapsing on wall time for the next invocation.
async fn close(controller: &SessionController) {
    if controller.phase() == Phase::Running {
        controller.suspend_ticking_for_background().await;
    }
    if let Some(e) = controller.last_error() {
        eprintln!("warning: {e}");
    }
}

pub async fn add(text: &str) -> CliResult {
    let (controller, _) = open().await?;
    let result = controller.add_tile_and_prepare_for_session(text).await;
    close(&controller).await;

    let tile = result?;
    println!(
        "added \"{}\" ({}/{MAX_TILES})",
        tile.text,
        controller.tiles().len()
    );
    Ok(())
}

pub async fn go(text: Option<&str>, detach: bool) -> CliResult {
    let (controller, _) = open().await?;
    let outcome = match controller.handle_primary_tap(text.unwrap_or_default()).await {
        Ok(outcome) => outcome,
        Err(e) => {
            close(&controller).await;
            return Err(e.into());
        }
    };

    match outcome {
        PrimaryTapOutcome::Added(tile) => {
            close(&controller).await;
            println!(
                "added \"{}\" ({}/{MAX_TILES})",
                tile.text,
                controller.tiles().len()
            );
            Ok(())
        }
        PrimaryTapOutcome::Began if detach => {
            close(&controller).await;
            println!(
                "chunk {} of {MAX_CHUNKS} started ({})",
                controller.chunk_index() + 1,
                format_clock(controller.remaining_seconds())
            );
            Ok(())
        }
        PrimaryTapOutcome::Began => run_foreground(&controller).await,
    }
}

pub async fn resume(detach: bool) -> CliResult {
    let (controller, _) = open().await?;
    if controller.phase() == Phase::Paused {
        if let Err(e) = controller.resume_current_countdown().await {
            close(&controller).await;
            return Err(e.into());
        }
    }
    if controller.phase() != Phase::Running {
        close(&controller).await;
        report_end(&controller.view());
        return Ok(());
    }
    if detach {
        close(&controller).await;
        println!("resumed at {}", format_clock(controller.remaining_seconds()));
        return Ok(());
    }
    run_foreground(&controller).await
}

pub async fn pause() -> CliResult {
    let (controller, _) = open().await?;
    let result = controller.pause_current_countdown().await;
    close(&controller).await;

    result?;
    println!("paused at {}", format_clock(controller.remaining_seconds()));
    Ok(())
}

pub async fn status() -> CliResult {
    let (controller, outcome) = open().await?;
    close(&controller).await;

    let view = controller.view();
    let status = Status {
        view: &view,
        recovered_from: outcome.source,
    };
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

pub async fn reset() -> CliResult {
    let (controller, _) = open().await?;
    controller.reset_session_state_for_new_start().await;
    println!("session reset");
    Ok(())
}

/// Clear the session-complete prompt after a recalibration ran.
pub async fn acknowledge_recalibration() -> CliResult {
    let (controller, _) = open().await?;
    controller.dismiss_recalibration_prompt().await;
    close(&controller).await;
    Ok(())
}

/// Count the running chunk down on this terminal. Ctrl-C steps away and
/// leaves the chunk elapsing in the background.
async fn run_foreground(controller: &SessionController) -> CliResult {
    let mut views = controller.subscribe();
    println!(
        "chunk {} of {MAX_CHUNKS} (Ctrl-C to step away)",
        controller.chunk_index() + 1
    );

    loop {
        let view = views.borrow_and_update().clone();
        if view.phase != Phase::Running {
            break;
        }
        print!("\r{}  ", format_clock(view.remaining_seconds));
        std::io::stdout().flush()?;

        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                controller.suspend_ticking_for_background().await;
                println!();
                println!("stepped away; `chunkfocus resume` picks the chunk up again");
                return Ok(());
            }
        }
    }

    println!();
    close(controller).await;
    report_end(&controller.view());
    Ok(())
}

fn report_end(view: &SessionView) {
    match view.phase {
        Phase::Finished if view.show_recalibrate => {
            println!("session complete. Try `chunkfocus breathe` or `chunkfocus balance`");
        }
        Phase::Finished => {
            println!(
                "chunk {} of {MAX_CHUNKS} done. `chunkfocus go` starts the next one",
                view.chunk_index
            );
        }
        Phase::Paused => {
            println!("paused at {}", format_clock(view.remaining_seconds));
        }
        _ => println!("no chunk is running"),
    }
}
