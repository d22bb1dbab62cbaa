use chunkfocus_core::storage::{HistoryRecord, RecalibrationRecord};
use chunkfocus_core::SqliteStore;
use serde::Serialize;

use super::CliResult;

#[derive(Serialize)]
struct History {
    tiles: Vec<HistoryRecord>,
    recalibrations: Vec<RecalibrationRecord>,
}

pub fn run() -> CliResult {
    let store = SqliteStore::open()?;
    let history = History {
        tiles: store.history()?,
        recalibrations: store.recalibrations()?,
    };
    println!("{}", serde_json::to_string_pretty(&history)?);
    Ok(())
}
