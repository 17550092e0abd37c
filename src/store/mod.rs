//! Snapshot storage.
//!
//! Snapshots live behind a small key/value persistence port so the store does
//! not care whether it is backed by sqlite or memory. Two keys are used per
//! origin:
//! - `rank_snapshots__<origin>`: json array of snapshots, ascending by id
//! - `rank_baseline_id__<origin>`: id of the snapshot diffs are computed against
//!
//! Storage is best-effort. Every port failure is logged and collapsed to a
//! default (reads) or dropped (writes) so annotation never stops on it.

pub mod diff;
pub mod sqlite;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::extract::{ExtractedPlayer, Metric, PlayerRecord};

pub const DEFAULT_MAX_SNAPSHOTS: usize = 50;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not determine data directory")]
    NoDataDir,
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Key/value persistence port.
pub trait Persistence {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
    fn delete(&mut self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    values: HashMap<String, String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), StoreError> {
        self.values.remove(key);
        Ok(())
    }
}

/// A player's stored values. Metrics missing from an older record stay `None`
/// so they produce no delta instead of a delta against zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPlayer {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buildings: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub troops: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buildings_count: Option<i64>,
}

impl SnapshotPlayer {
    pub fn metric(&self, metric: Metric) -> Option<i64> {
        match metric {
            Metric::Rank => self.rank,
            Metric::Training => self.training,
            Metric::Buildings => self.buildings,
            Metric::Troops => self.troops,
            Metric::Total => self.total,
            Metric::BuildingsCount => self.buildings_count,
        }
    }
}

impl From<&PlayerRecord> for SnapshotPlayer {
    fn from(record: &PlayerRecord) -> Self {
        let m = &record.metrics;
        SnapshotPlayer {
            name: record.name.clone(),
            rank: Some(m.rank),
            training: Some(m.training),
            buildings: Some(m.buildings),
            troops: Some(m.troops),
            total: Some(m.total),
            buildings_count: Some(m.buildings_count),
        }
    }
}

/// Point-in-time capture of every player in the ranking table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Creation time in unix milliseconds, doubling as sort key.
    pub id: i64,
    #[serde(rename = "ts", default)]
    pub timestamp: i64,
    #[serde(default)]
    pub players: BTreeMap<String, SnapshotPlayer>,
}

impl Snapshot {
    /// Build a snapshot from extracted rows. Duplicate identities keep the
    /// first row seen.
    pub fn from_players(timestamp: i64, players: &[ExtractedPlayer]) -> Self {
        let mut map = BTreeMap::new();
        for player in players {
            map.entry(player.record.identity.as_str().to_string())
                .or_insert_with(|| SnapshotPlayer::from(&player.record));
        }

        Snapshot {
            id: timestamp,
            timestamp,
            players: map,
        }
    }

    /// Capture time; records without one fall back to the id.
    pub fn taken_at(&self) -> i64 {
        if self.timestamp != 0 {
            self.timestamp
        } else {
            self.id
        }
    }

    pub fn player(&self, identity: &str) -> Option<&SnapshotPlayer> {
        self.players.get(identity)
    }
}

/// Normalize a host into the origin part of the storage keys.
pub fn origin_key(host: &str) -> String {
    let host = host.trim().to_lowercase();
    host.strip_prefix("www.").unwrap_or(&host).to_string()
}

/// Snapshots and baseline pointer for one page origin.
pub struct SnapshotStore<P: Persistence> {
    backend: P,
    snapshots_key: String,
    baseline_key: String,
    max_snapshots: usize,
}

impl<P: Persistence> SnapshotStore<P> {
    pub fn new(backend: P, origin: &str, max_snapshots: usize) -> Self {
        let origin = origin_key(origin);
        SnapshotStore {
            backend,
            snapshots_key: format!("rank_snapshots__{origin}"),
            baseline_key: format!("rank_baseline_id__{origin}"),
            max_snapshots: max_snapshots.max(1),
        }
    }

    pub fn backend(&self) -> &P {
        &self.backend
    }

    pub fn max_snapshots(&self) -> usize {
        self.max_snapshots
    }

    /// All snapshots, ascending by id. Empty when storage fails.
    pub fn load(&self) -> Vec<Snapshot> {
        let raw = match self.backend.get(&self.snapshots_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "failed to read snapshots");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<Snapshot>>(&raw) {
            Ok(mut snapshots) => {
                snapshots.sort_by_key(|s| s.id);
                snapshots
            }
            Err(e) => {
                warn!(error = %e, "stored snapshots are not a snapshot array, ignoring");
                Vec::new()
            }
        }
    }

    /// Replace the stored snapshots, keeping the newest `max_snapshots`.
    pub fn save_all(&mut self, snapshots: &[Snapshot]) {
        let skip = snapshots.len().saturating_sub(self.max_snapshots);
        let kept = &snapshots[skip..];

        let result = serde_json::to_string(kept)
            .map_err(StoreError::from)
            .and_then(|json| self.backend.set(&self.snapshots_key, &json));
        if let Err(e) = result {
            warn!(error = %e, "failed to write snapshots");
        }
    }

    pub fn baseline_id(&self) -> Option<i64> {
        match self.backend.get(&self.baseline_key) {
            Ok(Some(raw)) => serde_json::from_str::<Option<i64>>(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "stored baseline id is not a number, ignoring");
                None
            }),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "failed to read baseline id");
                None
            }
        }
    }

    pub fn set_baseline_id(&mut self, id: Option<i64>) {
        let result = serde_json::to_string(&id)
            .map_err(StoreError::from)
            .and_then(|json| self.backend.set(&self.baseline_key, &json));
        if let Err(e) = result {
            warn!(error = %e, "failed to write baseline id");
        }
    }

    pub fn get(&self, id: i64) -> Option<Snapshot> {
        self.load().into_iter().find(|s| s.id == id)
    }

    pub fn latest(&self) -> Option<Snapshot> {
        self.load().pop()
    }

    /// Snapshot that diffs run against: the baseline pointer when it still
    /// resolves, otherwise the most recent snapshot.
    pub fn resolve_baseline(&self) -> Option<Snapshot> {
        let mut snapshots = self.load();
        if let Some(id) = self.baseline_id() {
            if let Some(pos) = snapshots.iter().position(|s| s.id == id) {
                return Some(snapshots.swap_remove(pos));
            }
            debug!(baseline_id = id, "baseline pointer is dangling, using latest snapshot");
        }
        snapshots.pop()
    }

    /// Append a snapshot and make it the baseline. Returns the stored id,
    /// which is bumped past the newest existing id on collision.
    pub fn save(&mut self, mut snapshot: Snapshot) -> i64 {
        let mut snapshots = self.load();
        if let Some(newest) = snapshots.last() {
            if snapshot.id <= newest.id && snapshots.iter().any(|s| s.id == snapshot.id) {
                snapshot.id = newest.id + 1;
            }
        }

        let id = snapshot.id;
        snapshots.push(snapshot);
        snapshots.sort_by_key(|s| s.id);

        let evicted = snapshots.len().saturating_sub(self.max_snapshots);
        if evicted > 0 {
            snapshots.drain(..evicted);
            debug!(evicted, "evicted oldest snapshots");
        }

        self.save_all(&snapshots);
        self.set_baseline_id(Some(id));
        info!(snapshot_id = id, stored = snapshots.len(), "snapshot saved");
        id
    }

    /// Mark an existing snapshot as baseline. Returns false for unknown ids.
    pub fn select_baseline(&mut self, id: i64) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        self.set_baseline_id(Some(id));
        true
    }

    /// Delete a snapshot. Deleting the baseline moves the pointer to the
    /// newest remaining snapshot, or clears it.
    pub fn delete(&mut self, id: i64) -> bool {
        let mut snapshots = self.load();
        let before = snapshots.len();
        snapshots.retain(|s| s.id != id);
        if snapshots.len() == before {
            return false;
        }

        self.save_all(&snapshots);
        if self.baseline_id() == Some(id) {
            let next = snapshots.last().map(|s| s.id);
            self.set_baseline_id(next);
            debug!(deleted = id, baseline_id = ?next, "baseline moved after delete");
        }
        info!(snapshot_id = id, "snapshot deleted");
        true
    }

    /// Drop every snapshot and the baseline pointer. Refuses unless
    /// `confirmed` is set.
    pub fn clear_all(&mut self, confirmed: bool) -> bool {
        if !confirmed {
            return false;
        }
        for key in [&self.snapshots_key, &self.baseline_key] {
            if let Err(e) = self.backend.delete(key) {
                warn!(error = %e, key = key.as_str(), "failed to delete key");
            }
        }
        info!("all snapshots cleared");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingBackend;

    impl Persistence for FailingBackend {
        fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("denied".into()))
        }
        fn set(&mut self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("denied".into()))
        }
        fn delete(&mut self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("denied".into()))
        }
    }

    fn snap(id: i64) -> Snapshot {
        Snapshot {
            id,
            timestamp: id,
            players: BTreeMap::new(),
        }
    }

    fn store(max: usize) -> SnapshotStore<MemoryBackend> {
        SnapshotStore::new(MemoryBackend::new(), "www.example.com", max)
    }

    fn ids<P: Persistence>(store: &SnapshotStore<P>) -> Vec<i64> {
        store.load().iter().map(|s| s.id).collect()
    }

    #[test]
    fn keys_are_scoped_by_origin() {
        let mut store = store(5);
        store.save(snap(1));
        let backend = store.backend();
        assert!(backend.get("rank_snapshots__example.com").unwrap().is_some());
        assert_eq!(
            backend.get("rank_baseline_id__example.com").unwrap().as_deref(),
            Some("1")
        );
    }

    #[test]
    fn save_makes_new_snapshot_the_baseline() {
        let mut store = store(5);
        store.save(snap(10));
        store.save(snap(20));
        assert_eq!(store.baseline_id(), Some(20));
        assert_eq!(ids(&store), vec![10, 20]);
        assert_eq!(store.latest().map(|s| s.id), Some(20));
    }

    #[test]
    fn capacity_evicts_exactly_the_oldest() {
        let mut store = store(3);
        for id in [1, 2, 3] {
            store.save(snap(id));
        }
        store.save(snap(4));
        assert_eq!(ids(&store), vec![2, 3, 4]);
    }

    #[test]
    fn colliding_id_is_bumped() {
        let mut store = store(5);
        store.save(snap(100));
        let id = store.save(snap(100));
        assert_eq!(id, 101);
        assert_eq!(ids(&store), vec![100, 101]);
    }

    #[test]
    fn dangling_baseline_falls_back_to_latest() {
        let mut store = store(5);
        store.save(snap(1));
        store.save(snap(2));
        store.set_baseline_id(Some(99));
        assert_eq!(store.resolve_baseline().map(|s| s.id), Some(2));

        store.set_baseline_id(Some(1));
        assert_eq!(store.resolve_baseline().map(|s| s.id), Some(1));
    }

    #[test]
    fn deleting_baseline_moves_pointer_to_newest_remaining() {
        let mut store = store(5);
        for id in [1, 2, 3] {
            store.save(snap(id));
        }
        assert!(store.select_baseline(2));
        assert!(store.delete(2));
        assert_eq!(store.baseline_id(), Some(3));

        assert!(store.delete(3));
        assert_eq!(store.baseline_id(), Some(1));
        assert!(store.delete(1));
        assert_eq!(store.baseline_id(), None);
        assert!(store.resolve_baseline().is_none());
    }

    #[test]
    fn deleting_other_snapshot_keeps_baseline() {
        let mut store = store(5);
        store.save(snap(1));
        store.save(snap(2));
        assert!(store.delete(1));
        assert_eq!(store.baseline_id(), Some(2));
        assert!(!store.delete(42));
    }

    #[test]
    fn select_unknown_baseline_is_refused() {
        let mut store = store(5);
        store.save(snap(1));
        assert!(!store.select_baseline(7));
        assert_eq!(store.baseline_id(), Some(1));
    }

    #[test]
    fn clear_all_requires_confirmation() {
        let mut store = store(5);
        store.save(snap(1));
        assert!(!store.clear_all(false));
        assert_eq!(ids(&store), vec![1]);

        assert!(store.clear_all(true));
        assert!(store.load().is_empty());
        assert_eq!(store.baseline_id(), None);
    }

    #[test]
    fn failing_backend_degrades_to_defaults() {
        let mut store = SnapshotStore::new(FailingBackend, "example.com", 5);
        assert!(store.load().is_empty());
        assert_eq!(store.baseline_id(), None);
        assert!(store.resolve_baseline().is_none());
        // writes are dropped without panicking
        store.save(snap(1));
        assert!(!store.delete(1));
        assert!(store.clear_all(true));
    }

    #[test]
    fn corrupt_values_are_ignored() {
        let mut backend = MemoryBackend::new();
        backend.set("rank_snapshots__example.com", "{not json").unwrap();
        backend.set("rank_baseline_id__example.com", "\"abc\"").unwrap();
        let store = SnapshotStore::new(backend, "example.com", 5);
        assert!(store.load().is_empty());
        assert_eq!(store.baseline_id(), None);
    }

    #[test]
    fn persisted_format_uses_camel_case_fields() {
        let json = r#"[{"id":5,"ts":5,"players":{"42":{"name":"Alpha","rank":1,"training":2,"buildings":3,"troops":4,"total":9,"buildingsCount":7}}}]"#;
        let mut backend = MemoryBackend::new();
        backend.set("rank_snapshots__example.com", json).unwrap();
        let store = SnapshotStore::new(backend, "example.com", 5);

        let snapshots = store.load();
        let player = snapshots[0].player("42").unwrap();
        assert_eq!(player.name, "Alpha");
        assert_eq!(player.metric(Metric::BuildingsCount), Some(7));

        let back: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&snapshots).unwrap()).unwrap();
        assert_eq!(back[0]["players"]["42"]["buildingsCount"], 7);
        assert_eq!(back[0]["ts"], 5);
    }

    #[test]
    fn missing_timestamp_falls_back_to_id() {
        let snapshot: Snapshot = serde_json::from_str(r#"{"id":77,"players":{}}"#).unwrap();
        assert_eq!(snapshot.taken_at(), 77);
    }
}
