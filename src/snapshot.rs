//! Capturing the live table as a snapshot.

use tracing::debug;

use crate::extract;
use crate::locate;
use crate::page::Document;
use crate::pipeline::{self, PassOutcome};
use crate::store::{Persistence, Snapshot, SnapshotStore};

/// Current unix time in milliseconds, the id space of snapshots.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Snapshot of the ranking table in `doc`, or why there is none.
pub fn capture(doc: &Document, taken_at: i64) -> Result<Snapshot, PassOutcome> {
    let table = locate::locate(doc).ok_or(PassOutcome::NoTable)?;
    let players = extract::extract(table);
    if players.is_empty() {
        return Err(PassOutcome::NoPlayers);
    }
    debug!(players = players.len(), "captured ranking table");
    Ok(Snapshot::from_players(taken_at, &players))
}

/// Save the live table as the new baseline and re-annotate the page against
/// it. Returns the stored snapshot id and the fresh pass.
pub fn save_current<P: Persistence>(
    doc: &mut Document,
    store: &mut SnapshotStore<P>,
    taken_at: i64,
) -> Result<(i64, PassOutcome), PassOutcome> {
    let snapshot = capture(doc, taken_at)?;
    let id = store.save(snapshot);
    let outcome = pipeline::run_pass(doc, store);
    Ok((id, outcome))
}
