//! Rendering of a diff into the live table.
//!
//! Every pass starts by wiping what the previous pass rendered, so running it
//! again on an unchanged table and baseline leaves the table byte-identical.

use tracing::debug;

use crate::extract::{ExtractedPlayer, NAME_COLUMN};
use crate::page::{Annotation, Table};
use crate::parse::format_signed;
use crate::store::diff::{self, DiffResult, Marker};
use crate::store::Snapshot;

/// Remove every annotation and classification marker from `table`.
pub fn clear_annotations(table: &mut Table) {
    for cell in table.cells_mut() {
        cell.annotations.clear();
        for class in Marker::ALL_CLASSES {
            cell.remove_class(class);
        }
    }
}

/// Write `result` into `table`: a former-name label in the name cell and a
/// signed delta plus marker class in each metric cell that has a delta.
pub fn annotate(table: &mut Table, result: &DiffResult) {
    for player in &result.players {
        if let Some(old_name) = &player.former_name {
            if let Some(cell) = table.cell_mut(player.row, NAME_COLUMN) {
                cell.push_annotation(Annotation::FormerName(format!("aka: {old_name}")));
            }
        }

        for delta in &player.deltas {
            let Some(cell) = table.cell_mut(player.row, delta.metric.column()) else {
                continue;
            };
            cell.push_annotation(Annotation::Delta(format!("[{}]", format_signed(delta.delta))));
            cell.add_class(delta.marker.css_class());
        }
    }
}

/// Clear, compare and render in one go.
pub fn diff_and_annotate(
    table: &mut Table,
    players: &[ExtractedPlayer],
    baseline: Option<&Snapshot>,
) -> DiffResult {
    clear_annotations(table);
    let result = diff::compare(players, baseline);
    annotate(table, &result);
    debug!(
        players = result.players.len(),
        new = result.new_players(),
        renamed = result.renamed_players(),
        "table annotated"
    );
    result
}
