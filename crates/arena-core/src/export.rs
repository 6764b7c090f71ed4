use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;

use crate::standings::EngineStats;
use crate::util::{atomic_write, ensure_parent_dir};

fn sorted_by_points(standings: &[EngineStats]) -> Vec<EngineStats> {
    let mut sorted = standings.to_vec();
    sorted.sort_by(|a, b| {
        b.points
            .partial_cmp(&a.points)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                b.score_percent()
                    .partial_cmp(&a.score_percent())
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    });
    sorted
}

pub fn write_standings_csv(path: &Path, standings: &[EngineStats]) -> Result<()> {
    ensure_parent_dir(path)?;
    let mut out = String::from("rank,name,pts,g,w,d,l,score_percent\n");
    for (rank, row) in sorted_by_points(standings).iter().enumerate() {
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{}\n",
            rank + 1,
            row.name,
            row.points,
            row.games,
            row.wins,
            row.draws,
            row.losses,
            row.score_percent()
        ));
    }
    fs::write(path, out).with_context(|| format!("failed to write {}", path.display()))
}

pub fn write_standings_html(path: &Path, event_name: &str, standings: &[EngineStats]) -> Result<()> {
    let mut html = String::from(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\">\
         <title>Standings</title>\
         <style>table{border-collapse:collapse;font-family:Arial,sans-serif}\
         th,td{border:1px solid #ccc;padding:4px 8px;text-align:left}</style>\
         </head><body>\n",
    );
    html.push_str(&format!("<h2>{event_name}</h2>\n"));
    html.push_str(
        "<table>\n<thead><tr>\
         <th>Rank</th><th>Name</th><th>Pts</th><th>G</th><th>W</th><th>D</th><th>L</th><th>Score%</th>\
         </tr></thead>\n<tbody>\n",
    );
    for (rank, row) in sorted_by_points(standings).iter().enumerate() {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            rank + 1,
            row.name,
            row.points,
            row.games,
            row.wins,
            row.draws,
            row.losses,
            row.score_percent()
        ));
    }
    html.push_str("</tbody></table>\n</body></html>\n");
    atomic_write(path, &html)
}

pub fn write_summary_json(
    path: &Path,
    event_name: &str,
    tc_desc: &str,
    mode: &str,
    total_games: u32,
    standings: &[EngineStats],
) -> Result<()> {
    let top10: Vec<_> = sorted_by_points(standings)
        .iter()
        .take(10)
        .enumerate()
        .map(|(i, row)| {
            json!({
                "rank": i + 1,
                "name": row.name,
                "pts": row.points,
                "g": row.games,
                "w": row.wins,
                "d": row.draws,
                "l": row.losses,
                "score_percent": row.score_percent(),
            })
        })
        .collect();
    let summary = json!({
        "event": event_name,
        "tc": tc_desc,
        "mode": mode,
        "total_games": total_games,
        "top10": top10,
    });
    atomic_write(path, &serde_json::to_string_pretty(&summary).unwrap_or_default())
}

pub fn write_results_json(
    path: &Path,
    event_name: &str,
    tc_desc: &str,
    mode: &str,
    games_played: u32,
    standings: &[EngineStats],
    termination_counts: &BTreeMap<String, u32>,
) -> Result<()> {
    let rows: Vec<_> = standings
        .iter()
        .map(|row| {
            json!({
                "name": row.name,
                "pts": row.points,
                "g": row.games,
                "w": row.wins,
                "d": row.draws,
                "l": row.losses,
            })
        })
        .collect();
    let results = json!({
        "event": event_name,
        "tc": tc_desc,
        "mode": mode,
        "games_played": games_played,
        "termination_counts": termination_counts,
        "standings": rows,
    });
    ensure_parent_dir(path)?;
    fs::write(path, serde_json::to_string_pretty(&results).unwrap_or_default())
        .with_context(|| format!("failed to write {}", path.display()))
}
