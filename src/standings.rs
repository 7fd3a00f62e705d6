//! Standings ranking and rendering.
use crate::ledger::Ledger;
use std::cmp::Ordering;
use std::fmt::Write as _;

/// One line of the tournament standings.
#[derive(Debug, Clone, PartialEq)]
pub struct StandingsRow {
    /// 1-based position.
    pub rank: usize,
    pub name: String,
    pub best_time: Option<f64>,
    pub average_time: Option<f64>,
    pub races_count: usize,
}

/// Rank every competitor by best time, fastest first. Competitors without a
/// time go last; ties keep registration order.
pub fn rank(ledger: &Ledger) -> Vec<StandingsRow> {
    let mut order: Vec<_> = ledger.competitors().iter().collect();
    order.sort_by(|a, b| by_best_time(a.best_time(), b.best_time()));
    order
        .into_iter()
        .enumerate()
        .map(|(i, c)| StandingsRow {
            rank: i + 1,
            name: c.name().to_string(),
            best_time: c.best_time(),
            average_time: c.average_time(),
            races_count: c.races_count(),
        })
        .collect()
}

fn by_best_time(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn fmt_secs(t: Option<f64>) -> String {
    t.map(|t| format!("{t:.4}s")).unwrap_or_else(|| "---".to_string())
}

/// Plain-text standings table for terminals and logs.
pub fn render_table(rows: &[StandingsRow]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<6} {:<20} {:<12} {:<12} {:<8}", "Rank", "Name", "Best Time", "Avg Time", "Races");
    let _ = writeln!(out, "{}", "-".repeat(60));
    for r in rows {
        let medal = match (r.rank, r.best_time) {
            (1, Some(_)) => " (1st)",
            (2, Some(_)) => " (2nd)",
            (3, Some(_)) => " (3rd)",
            _ => "",
        };
        let _ = writeln!(
            out,
            "{:<6} {:<20} {:<12} {:<12} {:<8}{}",
            r.rank,
            r.name,
            fmt_secs(r.best_time),
            fmt_secs(r.average_time),
            r.races_count,
            medal
        );
    }
    out
}
