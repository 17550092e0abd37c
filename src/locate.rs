//! Heuristic discovery of the ranking table.
//!
//! The page markup is not ours and its classes change without notice, so the
//! table is picked on what its header says rather than where it sits. Tokens
//! are matched in English and Spanish.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::page::{Document, Table};

/// Lowest score accepted as positive evidence of a ranking table.
pub const MIN_SCORE: u32 = 3;

/// Header width that earns the wide-header bonus.
pub const WIDE_HEADER: usize = 7;

fn token(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|_| unreachable!())
}

static RANK: Lazy<Regex> = Lazy::new(|| token(r"(?:^|\s)(?:#|rank)(?:\s|$)"));
static NAME: Lazy<Regex> = Lazy::new(|| token(r"\b(?:name|nombre)\b"));
static POINTS: Lazy<Regex> = Lazy::new(|| token(r"\b(?:points?|puntos?)\b"));
static TRAINING: Lazy<Regex> = Lazy::new(|| token(r"\b(?:train|entren)"));
static BUILDINGS: Lazy<Regex> = Lazy::new(|| token(r"\b(?:build|edific)"));
static TROOPS: Lazy<Regex> = Lazy::new(|| token(r"\b(?:troop|tropa)"));
static TOTAL: Lazy<Regex> = Lazy::new(|| token(r"\b(?:total|suma)"));

/// Per-signal breakdown of a header's score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeaderScore {
    pub rank: u32,
    pub name: u32,
    pub points: u32,
    pub training: u32,
    pub buildings: u32,
    pub troops: u32,
    pub total: u32,
    pub wide: u32,
}

impl HeaderScore {
    pub fn sum(&self) -> u32 {
        self.rank
            + self.name
            + self.points
            + self.training
            + self.buildings
            + self.troops
            + self.total
            + self.wide
    }
}

/// Score header cell texts. Texts are trimmed and lower-cased here.
pub fn score_header<S: AsRef<str>>(cells: &[S]) -> HeaderScore {
    let joined = cells
        .iter()
        .map(|c| c.as_ref().trim().to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");

    let hit = |re: &Regex, weight: u32| if re.is_match(&joined) { weight } else { 0 };

    HeaderScore {
        rank: hit(&RANK, 3),
        name: hit(&NAME, 3),
        points: hit(&POINTS, 2),
        training: hit(&TRAINING, 1),
        buildings: hit(&BUILDINGS, 1),
        troops: hit(&TROOPS, 1),
        total: hit(&TOTAL, 1),
        wide: if cells.len() >= WIDE_HEADER { 1 } else { 0 },
    }
}

/// Score a table by its first row. `None` for a table without rows.
pub fn score_table(table: &Table) -> Option<HeaderScore> {
    let header = table.header()?;
    let texts: Vec<&str> = header.cells.iter().map(|c| c.text.as_str()).collect();
    Some(score_header(&texts))
}

/// Index of the most plausible ranking table in `doc`.
pub fn locate_index(doc: &Document) -> Option<usize> {
    if doc.tables.is_empty() {
        return None;
    }

    let mut best: Option<(usize, u32)> = None;
    for (index, table) in doc.tables.iter().enumerate() {
        let Some(score) = score_table(table) else { continue };
        let sum = score.sum();
        if best.map_or(true, |(_, best_sum)| sum > best_sum) {
            best = Some((index, sum));
        }
    }

    if let Some((index, sum)) = best {
        if sum >= MIN_SCORE {
            debug!(table = index, score = sum, "ranking table located by header");
            return Some(index);
        }
    }

    // no header is convincing enough: take the longest table, first one on ties
    let mut longest = 0;
    for (index, table) in doc.tables.iter().enumerate() {
        if table.rows.len() > doc.tables[longest].rows.len() {
            longest = index;
        }
    }
    debug!(table = longest, "no convincing header, falling back to longest table");
    Some(longest)
}

pub fn locate(doc: &Document) -> Option<&Table> {
    locate_index(doc).map(|index| &doc.tables[index])
}

pub fn locate_mut(doc: &mut Document) -> Option<&mut Table> {
    let index = locate_index(doc)?;
    doc.tables.get_mut(index)
}
