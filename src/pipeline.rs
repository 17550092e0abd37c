//! One annotation pass: locate, extract, resolve the baseline, render.

use std::fmt;

use tracing::debug;

use crate::annotate;
use crate::extract;
use crate::locate;
use crate::page::Document;
use crate::store::diff::DiffResult;
use crate::store::{Persistence, SnapshotStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// The content region has no table.
    NoTable,
    /// A table was found but none of its rows look like player rows.
    NoPlayers,
    /// The table was (re)annotated. `baseline_id` is `None` when the store is
    /// empty, in which case every annotation was just cleared.
    Annotated(DiffResult),
}

impl PassOutcome {
    pub fn diff(&self) -> Option<&DiffResult> {
        match self {
            PassOutcome::Annotated(result) => Some(result),
            _ => None,
        }
    }
}

impl fmt::Display for PassOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassOutcome::NoTable => write!(f, "ranking table not found"),
            PassOutcome::NoPlayers => write!(f, "ranking table has no player rows"),
            PassOutcome::Annotated(result) => match result.baseline_id {
                Some(id) => write!(
                    f,
                    "{} players compared against snapshot {id} ({} new, {} renamed)",
                    result.players.len(),
                    result.new_players(),
                    result.renamed_players()
                ),
                None => write!(f, "{} players, no snapshot to compare against", result.players.len()),
            },
        }
    }
}

/// Run a pass against the store's resolved baseline. Labels and markers left
/// anywhere in the document by an earlier pass are removed first.
pub fn run_pass<P: Persistence>(doc: &mut Document, store: &SnapshotStore<P>) -> PassOutcome {
    for table in &mut doc.tables {
        annotate::clear_annotations(table);
    }

    let Some(table) = locate::locate_mut(doc) else {
        debug!("no table in content region");
        return PassOutcome::NoTable;
    };

    let players = extract::extract(table);
    if players.is_empty() {
        debug!("located table has no player rows");
        return PassOutcome::NoPlayers;
    }

    let baseline = store.resolve_baseline();
    let result = annotate::diff_and_annotate(table, &players, baseline.as_ref());
    PassOutcome::Annotated(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{Annotation, Cell, Row, Table};
    use crate::store::{MemoryBackend, Snapshot};

    fn ranking(total: &str) -> Table {
        let header = ["#", "Name", "Training", "Buildings", "Troops", "Total", "Count"];
        Table::new(vec![
            Row::new(header.into_iter().map(Cell::header).collect()),
            Row::new(
                ["1", "Alpha", "1", "2", "3", total, "4"]
                    .into_iter()
                    .map(Cell::new)
                    .collect(),
            ),
        ])
    }

    fn store() -> SnapshotStore<MemoryBackend> {
        SnapshotStore::new(MemoryBackend::new(), "example.com", 10)
    }

    #[test]
    fn empty_document_reports_no_table() {
        let mut doc = Document::default();
        assert_eq!(run_pass(&mut doc, &store()), PassOutcome::NoTable);
    }

    #[test]
    fn table_without_player_rows() {
        let mut doc = Document::new(vec![Table::new(vec![Row::new(vec![Cell::header("#")])])]);
        assert_eq!(run_pass(&mut doc, &store()), PassOutcome::NoPlayers);
    }

    #[test]
    fn stale_labels_on_other_tables_are_cleared() {
        let mut stale = Table::new(vec![Row::new(vec![Cell::new("x"), Cell::new("y")])]);
        stale.rows[0].cells[1].push_annotation(Annotation::Delta("[+9]".into()));
        stale.rows[0].cells[1].add_class("delta-pos");
        stale.rows[0].cells[0].push_annotation(Annotation::FormerName("aka: Old".into()));

        let mut doc = Document::new(vec![stale, ranking("10")]);
        assert!(run_pass(&mut doc, &store()).diff().is_some());

        let first = &doc.tables[0].rows[0].cells;
        assert!(first.iter().all(|c| c.annotations.is_empty()));
        assert!(!first[1].has_class("delta-pos"));

        // the pass is also a cleanup when no table qualifies
        let mut orphan = Table::new(vec![Row::new(vec![Cell::header("#")])]);
        orphan.rows[0].cells[0].push_annotation(Annotation::Delta("[0]".into()));
        let mut doc = Document::new(vec![orphan]);
        assert_eq!(run_pass(&mut doc, &store()), PassOutcome::NoPlayers);
        assert!(doc.tables[0].rows[0].cells[0].annotations.is_empty());
    }

    #[test]
    fn empty_store_renders_nothing() {
        let mut doc = Document::new(vec![ranking("10")]);
        let outcome = run_pass(&mut doc, &store());
        let result = outcome.diff().unwrap();
        assert_eq!(result.baseline_id, None);
        assert!(doc.tables[0].rows[1].cells.iter().all(|c| c.annotations.is_empty()));
    }

    #[test]
    fn deleting_the_baseline_falls_back_to_newest_remaining() {
        let mut store = store();
        let old = Document::new(vec![ranking("10")]);
        let mid = Document::new(vec![ranking("20")]);
        let players = |doc: &Document| extract::extract(&doc.tables[0]);
        store.save(Snapshot::from_players(1, &players(&old)));
        store.save(Snapshot::from_players(2, &players(&mid)));
        assert!(store.select_baseline(1));

        let mut live = Document::new(vec![ranking("25")]);
        let delta = |doc: &Document| doc.tables[0].rows[1].cells[5].annotations.clone();

        run_pass(&mut live, &store);
        assert_eq!(delta(&live)[0].text(), "[+15]");

        store.delete(1);
        run_pass(&mut live, &store);
        assert_eq!(delta(&live)[0].text(), "[+5]");

        store.delete(2);
        let outcome = run_pass(&mut live, &store);
        assert_eq!(outcome.diff().unwrap().baseline_id, None);
        assert!(delta(&live).is_empty());
    }
}
