//! Snapshot comparison engine.
//!
//! Compares the players extracted from the live table against a baseline
//! snapshot:
//! - Matches players by identity
//! - Computes a signed delta per metric that has a baseline value
//! - Classifies each delta, with rank inverted (a smaller rank number is a
//!   move up the leaderboard)
//! - Flags players whose name differs from the baseline record

use std::cmp::Ordering;

use serde::Serialize;

use crate::extract::{ExtractedPlayer, Identity, Metric};
use crate::store::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improved,
    Unchanged,
    Worsened,
}

/// Classification marker set on a metric cell. Rank markers live in their own
/// namespace because their polarity is inverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
    Value(Trend),
    Rank(Trend),
}

impl Marker {
    pub const ALL_CLASSES: [&'static str; 6] = [
        "delta-pos",
        "delta-zero",
        "delta-neg",
        "rank-pos",
        "rank-zero",
        "rank-neg",
    ];

    pub fn for_metric(metric: Metric, trend: Trend) -> Self {
        if metric.lower_is_better() {
            Marker::Rank(trend)
        } else {
            Marker::Value(trend)
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            Marker::Value(Trend::Improved) => "delta-pos",
            Marker::Value(Trend::Unchanged) => "delta-zero",
            Marker::Value(Trend::Worsened) => "delta-neg",
            Marker::Rank(Trend::Improved) => "rank-pos",
            Marker::Rank(Trend::Unchanged) => "rank-zero",
            Marker::Rank(Trend::Worsened) => "rank-neg",
        }
    }
}

/// Classify `delta = current - baseline` for `metric`.
pub fn classify(metric: Metric, delta: i64) -> Trend {
    match (delta.cmp(&0), metric.lower_is_better()) {
        (Ordering::Equal, _) => Trend::Unchanged,
        (Ordering::Greater, false) | (Ordering::Less, true) => Trend::Improved,
        _ => Trend::Worsened,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricDelta {
    pub metric: Metric,
    pub current: i64,
    pub baseline: i64,
    pub delta: i64,
    pub trend: Trend,
    pub marker: Marker,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerDiff {
    /// Index of the player's row in the live table.
    pub row: usize,
    pub identity: Identity,
    pub name: String,
    pub current: crate::extract::Metrics,
    pub in_baseline: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub former_name: Option<String>,
    pub deltas: Vec<MetricDelta>,
}

impl PlayerDiff {
    pub fn delta(&self, metric: Metric) -> Option<&MetricDelta> {
        self.deltas.iter().find(|d| d.metric == metric)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_timestamp: Option<i64>,
    pub players: Vec<PlayerDiff>,
}

impl DiffResult {
    pub fn new_players(&self) -> usize {
        self.players.iter().filter(|p| !p.in_baseline).count()
    }

    pub fn renamed_players(&self) -> usize {
        self.players.iter().filter(|p| p.former_name.is_some()).count()
    }
}

/// Compare current players against `baseline`. Without a baseline every
/// player is reported with no deltas.
pub fn compare(players: &[ExtractedPlayer], baseline: Option<&Snapshot>) -> DiffResult {
    let mut result = DiffResult {
        baseline_id: baseline.map(|b| b.id),
        baseline_timestamp: baseline.map(|b| b.taken_at()),
        players: Vec::with_capacity(players.len()),
    };

    for player in players {
        let record = &player.record;
        let prev = baseline.and_then(|b| b.player(record.identity.as_str()));

        let former_name = prev
            .filter(|p| !p.name.is_empty() && p.name != record.name)
            .map(|p| p.name.clone());

        let deltas = match prev {
            Some(prev) => Metric::ALL
                .iter()
                .filter_map(|&metric| {
                    let old = prev.metric(metric)?;
                    let current = record.metrics.get(metric);
                    let delta = current.saturating_sub(old);
                    let trend = classify(metric, delta);
                    Some(MetricDelta {
                        metric,
                        current,
                        baseline: old,
                        delta,
                        trend,
                        marker: Marker::for_metric(metric, trend),
                    })
                })
                .collect(),
            None => Vec::new(),
        };

        result.players.push(PlayerDiff {
            row: player.row,
            identity: record.identity.clone(),
            name: record.name.clone(),
            current: record.metrics,
            in_baseline: prev.is_some(),
            former_name,
            deltas,
        });
    }

    result
}
