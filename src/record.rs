//! Durable record schemas: heat log rows, standings snapshot rows and raw
//! capture frames.
use crate::ledger::LaneAssignment;
use crate::race::{LANES, RaceResult};
use crate::standings::StandingsRow;
use serde::{Deserialize, Serialize};

/// One lane of a finished heat.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaneOutcome {
    pub name: Option<String>,
    pub time: Option<f64>,
}

/// Everything the heat log keeps about one heat.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatOutcome {
    pub heat_number: u32,
    /// Local wall-clock time, `YYYY-MM-DD HH:MM:SS`.
    pub timestamp: String,
    /// Index `i` holds lane `i + 1`.
    pub lanes: [LaneOutcome; LANES],
    pub winner: Option<String>,
}

impl HeatOutcome {
    /// Combine the lanes raced with the times read. The winner is whoever
    /// sat in the fastest lane; a winning lane nobody was assigned to leaves
    /// the winner empty.
    pub fn new(
        heat_number: u32,
        timestamp: String,
        assignment: &LaneAssignment,
        result: &RaceResult,
    ) -> Self {
        let lanes = std::array::from_fn(|i| LaneOutcome {
            name: assignment.get(i + 1).map(str::to_string),
            time: result.lane(i + 1),
        });
        let winner = result
            .winner()
            .and_then(|w| assignment.get(w.lane))
            .map(str::to_string);
        Self { heat_number, timestamp, lanes, winner }
    }

    /// Times as a [`RaceResult`], for recomputing from a log.
    pub fn result(&self) -> RaceResult {
        RaceResult::new(std::array::from_fn(|i| self.lanes[i].time))
    }

    /// Names as a [`LaneAssignment`]. Names repeated across lanes in a
    /// hand-edited log are kept in their first lane only.
    pub fn assignment(&self) -> LaneAssignment {
        let mut a = LaneAssignment::new();
        for (i, lane) in self.lanes.iter().enumerate() {
            if let Some(name) = &lane.name {
                let _ = a.assign(i + 1, name.clone());
            }
        }
        a
    }
}

pub(crate) fn fmt_time(t: Option<f64>) -> String {
    t.map(|t| format!("{t:.4}")).unwrap_or_default()
}

fn parse_time(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() { None } else { s.parse().ok() }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

/// CSV shape of a heat log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatRow {
    #[serde(rename = "Heat #")]
    pub heat: u32,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "Lane 1 Name")]
    pub lane1_name: String,
    #[serde(rename = "Lane 1 Time")]
    pub lane1_time: String,
    #[serde(rename = "Lane 2 Name")]
    pub lane2_name: String,
    #[serde(rename = "Lane 2 Time")]
    pub lane2_time: String,
    #[serde(rename = "Lane 3 Name")]
    pub lane3_name: String,
    #[serde(rename = "Lane 3 Time")]
    pub lane3_time: String,
    #[serde(rename = "Lane 4 Name")]
    pub lane4_name: String,
    #[serde(rename = "Lane 4 Time")]
    pub lane4_time: String,
    #[serde(rename = "Heat Winner")]
    pub winner: String,
}

impl From<&HeatOutcome> for HeatRow {
    fn from(h: &HeatOutcome) -> Self {
        let name = |i: usize| h.lanes[i].name.clone().unwrap_or_default();
        let time = |i: usize| fmt_time(h.lanes[i].time);
        Self {
            heat: h.heat_number,
            timestamp: h.timestamp.clone(),
            lane1_name: name(0),
            lane1_time: time(0),
            lane2_name: name(1),
            lane2_time: time(1),
            lane3_name: name(2),
            lane3_time: time(2),
            lane4_name: name(3),
            lane4_time: time(3),
            winner: h.winner.clone().unwrap_or_default(),
        }
    }
}

impl From<HeatRow> for HeatOutcome {
    fn from(r: HeatRow) -> Self {
        let lane = |name: String, time: String| LaneOutcome {
            name: non_empty(name),
            time: parse_time(&time),
        };
        Self {
            heat_number: r.heat,
            timestamp: r.timestamp,
            lanes: [
                lane(r.lane1_name, r.lane1_time),
                lane(r.lane2_name, r.lane2_time),
                lane(r.lane3_name, r.lane3_time),
                lane(r.lane4_name, r.lane4_time),
            ],
            winner: non_empty(r.winner),
        }
    }
}

/// CSV shape of a standings snapshot row.
#[derive(Debug, Clone, Serialize)]
pub struct StandingsRecord {
    #[serde(rename = "Rank")]
    pub rank: usize,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Best Time")]
    pub best_time: String,
    #[serde(rename = "Average Time")]
    pub average_time: String,
    #[serde(rename = "Total Races")]
    pub races: usize,
}

impl From<&StandingsRow> for StandingsRecord {
    fn from(r: &StandingsRow) -> Self {
        Self {
            rank: r.rank,
            name: r.name.clone(),
            best_time: fmt_time(r.best_time),
            average_time: fmt_time(r.average_time),
            races: r.races_count,
        }
    }
}

/// First frame of a raw capture file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureHeader {
    pub version: u16,
    pub created_unix_ns: u128,
    /// Where the bytes came from (device path, `-` for stdin).
    pub source: String,
}

/// One framed line received from the timer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureLine {
    pub seq: u64,
    pub recv_unix_ns: u128,
    /// Heat being listened for when the line arrived.
    pub heat_number: u32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CaptureFrame {
    Header(CaptureHeader),
    Line(CaptureLine),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_names_winner_from_assignment() {
        let a = LaneAssignment::from_pairs([(1, "Alice"), (2, "Bob")]).unwrap();
        let r = RaceResult::new([Some(1.2345), Some(1.1111), None, None]);
        let h = HeatOutcome::new(1, "2024-01-01 10:00:00".into(), &a, &r);
        assert_eq!(h.winner.as_deref(), Some("Bob"));
        assert_eq!(h.lanes[2], LaneOutcome::default());

        let row = HeatRow::from(&h);
        assert_eq!(row.lane1_time, "1.2345");
        assert_eq!(row.lane3_name, "");
        assert_eq!(row.winner, "Bob");
    }

    #[test]
    fn winning_unassigned_lane_has_no_winner_name() {
        let a = LaneAssignment::from_pairs([(1, "Alice")]).unwrap();
        let r = RaceResult::new([Some(2.0), None, Some(1.0), None]);
        let h = HeatOutcome::new(3, String::new(), &a, &r);
        assert_eq!(h.winner, None);
        assert_eq!(h.lanes[2].time, Some(1.0));
    }

    #[test]
    fn row_converts_back_to_outcome() {
        let a = LaneAssignment::from_pairs([(2, "Bob"), (4, "Dee")]).unwrap();
        let r = RaceResult::new([Some(9.0), Some(1.5), None, None]);
        let h = HeatOutcome::new(7, "t".into(), &a, &r);
        let back = HeatOutcome::from(HeatRow::from(&h));
        assert_eq!(back, h);
        assert_eq!(back.assignment(), a);
        assert_eq!(back.result(), r);
    }

    #[test]
    fn snapshot_row_leaves_sentinels_empty() {
        let rec = StandingsRecord::from(&StandingsRow {
            rank: 2,
            name: "Idle".into(),
            best_time: None,
            average_time: None,
            races_count: 0,
        });
        assert_eq!(rec.best_time, "");
        assert_eq!(rec.average_time, "");
    }
}
