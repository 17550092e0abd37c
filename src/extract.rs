//! Row extraction for a located ranking table.
//!
//! Data rows expose at least seven cells in a fixed order: rank, name,
//! training, buildings, troops, total and building count. Anything shorter
//! (pagination, ads, spacer rows) is skipped.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::page::Table;
use crate::parse::parse_integer;

pub const MIN_CELLS: usize = 7;

static PLAYER_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:jugador|player)\?id=(\d+)").unwrap_or_else(|_| unreachable!()));

/// Key matching the same player across snapshots.
///
/// Either the numeric id from the player's profile link or `name:<name>`.
/// A player without an id who renames shows up as a different identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn from_player_id(id: &str) -> Self {
        Identity(id.to_string())
    }

    pub fn from_name(name: &str) -> Self {
        Identity(format!("name:{name}"))
    }

    /// Identity for a name cell: the id in `href` when present, else the name.
    pub fn resolve(href: Option<&str>, name: &str) -> Self {
        href.and_then(|h| PLAYER_ID.captures(h))
            .and_then(|caps| caps.get(1))
            .map(|m| Identity::from_player_id(m.as_str()))
            .unwrap_or_else(|| Identity::from_name(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_name_fallback(&self) -> bool {
        self.0.starts_with("name:")
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    Rank,
    Training,
    Buildings,
    Troops,
    Total,
    BuildingsCount,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::Rank,
        Metric::Training,
        Metric::Buildings,
        Metric::Troops,
        Metric::Total,
        Metric::BuildingsCount,
    ];

    /// Column of the metric in a data row.
    pub fn column(self) -> usize {
        match self {
            Metric::Rank => 0,
            Metric::Training => 2,
            Metric::Buildings => 3,
            Metric::Troops => 4,
            Metric::Total => 5,
            Metric::BuildingsCount => 6,
        }
    }

    /// A lower rank number is better; every other metric grows with the player.
    pub fn lower_is_better(self) -> bool {
        matches!(self, Metric::Rank)
    }
}

pub const NAME_COLUMN: usize = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub rank: i64,
    pub training: i64,
    pub buildings: i64,
    pub troops: i64,
    pub total: i64,
    pub buildings_count: i64,
}

impl Metrics {
    pub fn get(&self, metric: Metric) -> i64 {
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

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub identity: Identity,
    pub name: String,
    pub metrics: Metrics,
}

/// A record plus the index of the table row it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPlayer {
    pub row: usize,
    pub record: PlayerRecord,
}

/// Read every well-formed data row of `table`.
///
/// An empty result means there is nothing to diff; it is not an error.
pub fn extract(table: &Table) -> Vec<ExtractedPlayer> {
    if table.rows.len() < 2 {
        return Vec::new();
    }

    let mut players = Vec::new();

    for (row_index, row) in table.rows.iter().enumerate().skip(1) {
        let cells = &row.cells;
        if cells.len() < MIN_CELLS {
            continue;
        }

        let name_cell = &cells[NAME_COLUMN];
        let name = match &name_cell.link {
            Some(link) => link.text.trim().to_string(),
            None => name_cell.text.trim().to_string(),
        };
        let href = name_cell.link.as_ref().map(|l| l.href.as_str());
        let identity = Identity::resolve(href, &name);

        let value = |metric: Metric| parse_integer(&cells[metric.column()].text_content());
        let metrics = Metrics {
            rank: value(Metric::Rank),
            training: value(Metric::Training),
            buildings: value(Metric::Buildings),
            troops: value(Metric::Troops),
            total: value(Metric::Total),
            buildings_count: value(Metric::BuildingsCount),
        };

        players.push(ExtractedPlayer {
            row: row_index,
            record: PlayerRecord {
                identity,
                name,
                metrics,
            },
        });
    }

    players
}
