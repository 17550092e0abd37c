pub mod json;
pub mod table;

use crate::pipeline::PassOutcome;
use crate::store::{Persistence, SnapshotStore};

/// Format unix milliseconds as a local date, "unknown" when out of range.
pub fn format_timestamp(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| {
            dt.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// One-line summary of the store: current baseline and snapshot count.
pub fn status_line<P: Persistence>(store: &SnapshotStore<P>) -> String {
    let snapshots = store.load();
    let baseline = store
        .baseline_id()
        .and_then(|id| snapshots.iter().find(|s| s.id == id));

    match baseline {
        Some(base) => format!(
            "Baseline: {} — Snapshots: {}",
            format_timestamp(base.taken_at()),
            snapshots.len()
        ),
        None if !snapshots.is_empty() => format!("Snapshots: {} — pick one", snapshots.len()),
        None => "No snapshots yet — run \"rankscan save\"".to_string(),
    }
}

pub fn print(outcome: &PassOutcome, json_output: bool) {
    match outcome.diff() {
        Some(result) if json_output => println!("{}", json::render(result)),
        Some(result) => print!("{}", table::render(result)),
        None => println!("{outcome}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryBackend, Snapshot};
    use std::collections::BTreeMap;

    fn snap(id: i64) -> Snapshot {
        Snapshot { id, timestamp: id, players: BTreeMap::new() }
    }

    #[test]
    fn status_line_variants() {
        let mut store = SnapshotStore::new(MemoryBackend::new(), "example.com", 5);
        assert!(status_line(&store).starts_with("No snapshots yet"));

        store.save(snap(1_700_000_000_000));
        assert!(status_line(&store).starts_with("Baseline: "));
        assert!(status_line(&store).ends_with("Snapshots: 1"));

        store.set_baseline_id(None);
        assert_eq!(status_line(&store), "Snapshots: 1 — pick one");
    }

    #[test]
    fn out_of_range_timestamp() {
        assert_eq!(format_timestamp(i64::MAX), "unknown");
    }
}
