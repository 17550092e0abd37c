//! Terminal table rendering for diff results.
//!
//! One line per player in table order: rank, name and each metric with its
//! delta in brackets. Renamed players get an `aka` line underneath.

use crate::extract::Metric;
use crate::parse::format_signed;
use crate::store::diff::DiffResult;

const COLUMNS: [(Metric, &str); 6] = [
    (Metric::Rank, "#"),
    (Metric::Training, "Training"),
    (Metric::Buildings, "Buildings"),
    (Metric::Troops, "Troops"),
    (Metric::Total, "Total"),
    (Metric::BuildingsCount, "Bldgs"),
];

pub fn render(result: &DiffResult) -> String {
    if result.players.is_empty() {
        return String::from("No players found.\n");
    }

    let mut output = String::new();

    output.push_str(&format!("{:<24}", "Name"));
    for (_, title) in COLUMNS {
        output.push_str(&format!(" {title:>18}"));
    }
    output.push('\n');
    output.push_str(&"-".repeat(24 + COLUMNS.len() * 19));
    output.push('\n');

    for player in &result.players {
        output.push_str(&format!("{:<24}", truncate(&player.name, 24)));
        for (metric, _) in COLUMNS {
            let value = player.current.get(metric);
            let cell = match player.delta(metric) {
                Some(delta) => format!("{value} [{}]", format_signed(delta.delta)),
                None => value.to_string(),
            };
            output.push_str(&format!(" {cell:>18}"));
        }
        output.push('\n');

        if let Some(old) = &player.former_name {
            output.push_str(&format!("  aka: {old}\n"));
        }
    }

    if result.baseline_id.is_some() {
        output.push_str(&format!(
            "\n{} players, {} new since baseline, {} renamed\n",
            result.players.len(),
            result.new_players(),
            result.renamed_players()
        ));
    } else {
        output.push_str(&format!("\n{} players, no baseline\n", result.players.len()));
    }

    output
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{truncated}...")
    }
}
