//! Heat log and standings snapshot files.
//!
//! Both files are CSV and live side by side in the results directory,
//! namespaced by the session start stamp. The heat log is append-only; the
//! snapshot is rewritten in full after every heat.
use crate::error::PersistenceError;
use crate::ledger::{LaneAssignment, Ledger};
use crate::record::{HeatOutcome, HeatRow, StandingsRecord};
use crate::standings::StandingsRow;
use csv::WriterBuilder;
use log::{debug, info, warn};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::OffsetDateTime;

/// Local time if the offset can be determined, UTC otherwise.
pub fn now_local() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// `YYYYMMDD_HHMMSS`, used to name session files.
pub fn session_stamp(t: OffsetDateTime) -> String {
    let fmt = format_description!("[year][month][day]_[hour][minute][second]");
    t.format(&fmt).unwrap_or_else(|_| t.unix_timestamp().to_string())
}

/// `YYYY-MM-DD HH:MM:SS`, used in heat log rows.
pub fn heat_timestamp(t: OffsetDateTime) -> String {
    let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    t.format(&fmt).unwrap_or_else(|_| t.unix_timestamp().to_string())
}

/// Writer for one tournament session's result files.
#[derive(Debug)]
pub struct ResultsWriter {
    heats_path: PathBuf,
    standings_path: PathBuf,
    header_written: bool,
}

impl ResultsWriter {
    /// Name the session files `heats_<stamp>.csv` and `standings_<stamp>.csv`
    /// inside `dir`. Nothing touches the disk until the first write.
    pub fn new(dir: impl AsRef<Path>, stamp: &str) -> Self {
        let dir = dir.as_ref();
        Self {
            heats_path: dir.join(format!("heats_{stamp}.csv")),
            standings_path: dir.join(format!("standings_{stamp}.csv")),
            header_written: false,
        }
    }

    pub fn heats_path(&self) -> &Path {
        &self.heats_path
    }

    pub fn standings_path(&self) -> &Path {
        &self.standings_path
    }

    fn ensure_dir(path: &Path) -> Result<(), PersistenceError> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent).map_err(|source| PersistenceError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })
            }
            _ => Ok(()),
        }
    }

    /// Append one heat row. The header goes out with the first row of the
    /// session; a failed first write leaves it pending for the next one.
    pub fn append_heat(&mut self, heat: &HeatOutcome) -> Result<(), PersistenceError> {
        Self::ensure_dir(&self.heats_path)?;
        let err = |source: csv::Error| PersistenceError::HeatLog {
            heat: heat.heat_number,
            path: self.heats_path.clone(),
            source,
        };
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.heats_path)
            .map_err(|e| err(e.into()))?;
        let mut w = WriterBuilder::new().has_headers(!self.header_written).from_writer(file);
        w.serialize(HeatRow::from(heat)).map_err(err)?;
        w.flush().map_err(|e| err(e.into()))?;
        self.header_written = true;
        debug!("appended heat {} to {:?}", heat.heat_number, self.heats_path);
        Ok(())
    }

    /// Replace the standings snapshot with `rows`.
    pub fn write_standings(&self, rows: &[StandingsRow]) -> Result<(), PersistenceError> {
        Self::ensure_dir(&self.standings_path)?;
        write_standings_file(&self.standings_path, rows)?;
        info!("standings saved to {:?}", self.standings_path);
        Ok(())
    }
}

/// Write a full standings snapshot to `path`, truncating any previous one.
pub fn write_standings_file(path: &Path, rows: &[StandingsRow]) -> Result<(), PersistenceError> {
    let err = |source: csv::Error| PersistenceError::Snapshot { path: path.to_path_buf(), source };
    let mut w = WriterBuilder::new().has_headers(false).from_path(path).map_err(err)?;
    w.write_record(["Rank", "Name", "Best Time", "Average Time", "Total Races"]).map_err(err)?;
    for row in rows {
        w.serialize(StandingsRecord::from(row)).map_err(err)?;
    }
    w.flush().map_err(|e| err(e.into()))?;
    Ok(())
}

/// Read a heat log back, oldest heat first.
pub fn read_heat_log(path: &Path) -> Result<Vec<HeatOutcome>, csv::Error> {
    let mut rdr = csv::Reader::from_path(path)?;
    rdr.deserialize::<HeatRow>()
        .map(|row| row.map(HeatOutcome::from))
        .collect()
}

/// Replay logged heats into a fresh ledger. Competitors are registered in
/// order of first appearance, which matches the live registration order
/// only when everyone raced in that order. Names are trimmed the way
/// registration trims them; a lane whose name cannot be registered is
/// dropped from its heat with a warning.
pub fn rebuild_ledger(heats: &[HeatOutcome]) -> Ledger {
    let mut ledger = Ledger::new();
    for heat in heats {
        let mut assignment = LaneAssignment::new();
        for (lane, name) in heat.assignment().iter() {
            let name = name.trim();
            if ledger.get(name).is_none() {
                if let Err(e) = ledger.register(name) {
                    warn!("heat {} lane {lane}: {e}", heat.heat_number);
                    continue;
                }
            }
            if let Err(e) = assignment.assign(lane, name) {
                warn!("heat {} lane {lane}: {e}", heat.heat_number);
            }
        }
        if let Err(e) = ledger.apply_heat(heat.heat_number, &assignment, &heat.result()) {
            warn!("heat {} skipped: {e}", heat.heat_number);
        }
    }
    ledger
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::race::RaceResult;
    use time::macros::datetime;

    fn heat(n: u32) -> HeatOutcome {
        let a = LaneAssignment::from_pairs([(1, "Alice"), (3, "Cy")]).unwrap();
        let r = RaceResult::new([Some(1.25), Some(0.5), Some(2.0), None]);
        HeatOutcome::new(n, format!("2024-05-01 12:00:0{n}"), &a, &r)
    }

    #[test]
    fn stamps_are_formatted() {
        let t = datetime!(2024-05-01 09:08:07 UTC);
        assert_eq!(session_stamp(t), "20240501_090807");
        assert_eq!(heat_timestamp(t), "2024-05-01 09:08:07");
    }

    #[test]
    fn heat_log_header_once_and_rows_appended() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = ResultsWriter::new(dir.path().join("results"), "S");
        w.append_heat(&heat(1)).unwrap();
        w.append_heat(&heat(2)).unwrap();
        let text = fs::read_to_string(w.heats_path()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Heat #,Timestamp,Lane 1 Name"));
        assert_eq!(lines[1], "1,2024-05-01 12:00:01,Alice,1.2500,,0.5000,Cy,2.0000,,,");
        let back = read_heat_log(w.heats_path()).unwrap();
        assert_eq!(back, vec![heat(1), heat(2)]);
    }

    #[test]
    fn failed_append_is_distinct_and_recoverable() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = ResultsWriter::new(dir.path(), "S");
        w.append_heat(&heat(1)).unwrap();
        // park the log and put a directory in its place so the open fails
        let parked = dir.path().join("parked.csv");
        fs::rename(w.heats_path(), &parked).unwrap();
        fs::create_dir(w.heats_path()).unwrap();
        let err = w.append_heat(&heat(2)).unwrap_err();
        assert!(matches!(err, PersistenceError::HeatLog { heat: 2, .. }));
        fs::remove_dir(w.heats_path()).unwrap();
        fs::rename(&parked, w.heats_path()).unwrap();
        w.append_heat(&heat(3)).unwrap();
        assert_eq!(read_heat_log(w.heats_path()).unwrap(), vec![heat(1), heat(3)]);
    }

    #[test]
    fn rebuilds_ledger_from_log() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = ResultsWriter::new(dir.path(), "S");
        w.append_heat(&heat(1)).unwrap();
        let a = LaneAssignment::from_pairs([(2, "Cy"), (4, "Dee")]).unwrap();
        let r = RaceResult::new([None, Some(1.75), None, None]);
        w.append_heat(&HeatOutcome::new(2, "t".into(), &a, &r)).unwrap();

        let ledger = rebuild_ledger(&read_heat_log(w.heats_path()).unwrap());
        let names: Vec<_> = ledger.competitors().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["Alice", "Cy", "Dee"]);
        let cy = ledger.get("Cy").unwrap();
        assert_eq!(cy.races_count(), 2);
        assert_eq!(cy.best_time(), Some(1.75));
        assert_eq!(ledger.get("Dee").unwrap().races_count(), 0);
    }

    #[test]
    fn rebuild_trims_hand_edited_names() {
        let r = RaceResult::new([Some(2.0), Some(1.0), Some(3.0), None]);
        let first = LaneAssignment::from_pairs([(1, "Bob"), (2, "Cy")]).unwrap();
        let edited = LaneAssignment::from_pairs([(1, " Bob"), (2, "Cy "), (3, "  ")]).unwrap();
        let heats = [HeatOutcome::new(1, "t".into(), &first, &r), HeatOutcome::new(2, "t".into(), &edited, &r)];

        let ledger = rebuild_ledger(&heats);
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.get("Bob").unwrap().races_count(), 2);
        assert_eq!(ledger.get("Cy").unwrap().races_count(), 2);
        assert_eq!(ledger.get("Cy").unwrap().best_time(), Some(1.0));
    }

    #[test]
    fn snapshot_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let w = ResultsWriter::new(dir.path(), "S");
        let row = |rank, name: &str| StandingsRow {
            rank,
            name: name.into(),
            best_time: Some(1.0),
            average_time: None,
            races_count: 1,
        };
        w.write_standings(&[row(1, "A"), row(2, "B")]).unwrap();
        w.write_standings(&[row(1, "B")]).unwrap();
        let text = fs::read_to_string(w.standings_path()).unwrap();
        assert_eq!(text, "Rank,Name,Best Time,Average Time,Total Races\n1,B,1.0000,,1\n");
    }

    #[test]
    fn snapshot_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let w = ResultsWriter::new(dir.path(), "S");
        fs::create_dir(w.standings_path()).unwrap();
        let err = w.write_standings(&[]).unwrap_err();
        assert!(matches!(err, PersistenceError::Snapshot { .. }));
    }
}
