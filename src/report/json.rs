//! JSON output for diff results.
//!
//! Serializes DiffResult for scripting and piping.

use crate::store::diff::DiffResult;

pub fn render(result: &DiffResult) -> String {
    serde_json::to_string_pretty(result).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{ExtractedPlayer, Identity, Metrics, PlayerRecord};
    use crate::store::diff::compare;
    use crate::store::Snapshot;

    #[test]
    fn renders_deltas_with_metric_names() {
        let player = |total| ExtractedPlayer {
            row: 1,
            record: PlayerRecord {
                identity: Identity::from_player_id("7"),
                name: "Alpha".into(),
                metrics: Metrics { total, ..Metrics::default() },
            },
        };
        let base = Snapshot::from_players(5, &[player(10)]);
        let result = compare(&[player(12)], Some(&base));

        let value: serde_json::Value = serde_json::from_str(&render(&result)).unwrap();
        assert_eq!(value["baseline_id"], 5);
        assert_eq!(value["players"][0]["identity"], "7");
        let total = value["players"][0]["deltas"]
            .as_array()
            .unwrap()
            .iter()
            .find(|d| d["metric"] == "total")
            .unwrap();
        assert_eq!(total["delta"], 2);
        assert_eq!(total["trend"], "improved");
    }
}
