//! Competitor ledger.
//!
//! Owns every competitor's aggregate statistics for the tournament. The only
//! mutation paths are registration, withdrawal of a competitor who has not
//! raced, and [`Ledger::apply_heat`].
use crate::error::{CommandError, LedgerError};
use crate::race::{LANES, RaceResult};
use log::debug;

/// One finished run of a competitor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeatRecord {
    pub heat_number: u32,
    pub lane: usize,
    pub time: f64,
}

/// Aggregate statistics of one competitor.
#[derive(Debug, Clone, PartialEq)]
pub struct Competitor {
    name: String,
    heats: Vec<HeatRecord>,
    best_time: Option<f64>,
    total_time: f64,
}

impl Competitor {
    fn new(name: String) -> Self {
        Self { name, heats: Vec::new(), best_time: None, total_time: 0.0 }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Heats raced, in heat order.
    pub fn heats(&self) -> &[HeatRecord] {
        &self.heats
    }

    pub fn best_time(&self) -> Option<f64> {
        self.best_time
    }

    pub fn total_time(&self) -> f64 {
        self.total_time
    }

    pub fn races_count(&self) -> usize {
        self.heats.len()
    }

    /// Mean finish time, `None` before the first race.
    pub fn average_time(&self) -> Option<f64> {
        match self.races_count() {
            0 => None,
            n => Some(self.total_time / n as f64),
        }
    }

    fn record(&mut self, rec: HeatRecord) {
        self.total_time += rec.time;
        self.best_time = Some(match self.best_time {
            Some(best) if best <= rec.time => best,
            _ => rec.time,
        });
        self.heats.push(rec);
    }
}

/// Which competitor races in which lane for the next heat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaneAssignment {
    lanes: [Option<String>; LANES],
}

impl LaneAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(lane, name)` pairs, rejecting out-of-range lanes and a
    /// name assigned twice. A later pair for the same lane replaces the
    /// earlier one.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, CommandError>
    where
        I: IntoIterator<Item = (usize, S)>,
        S: Into<String>,
    {
        let mut out = Self::new();
        for (lane, name) in pairs {
            out.assign(lane, name)?;
        }
        Ok(out)
    }

    /// Put `name` in a 1-based `lane`.
    pub fn assign(&mut self, lane: usize, name: impl Into<String>) -> Result<(), CommandError> {
        if !(1..=LANES).contains(&lane) {
            return Err(CommandError::LaneOutOfRange(lane));
        }
        let name = name.into();
        if let Some(first) = self.lane_of(&name).filter(|&l| l != lane) {
            return Err(CommandError::DuplicateLaneAssignment { name, first, second: lane });
        }
        self.lanes[lane - 1] = Some(name);
        Ok(())
    }

    pub fn clear(&mut self, lane: usize) {
        if let Some(slot) = lane.checked_sub(1).and_then(|i| self.lanes.get_mut(i)) {
            *slot = None;
        }
    }

    /// Competitor in a 1-based lane.
    pub fn get(&self, lane: usize) -> Option<&str> {
        lane.checked_sub(1)
            .and_then(|i| self.lanes.get(i))
            .and_then(|s| s.as_deref())
    }

    /// Lane `name` is assigned to.
    pub fn lane_of(&self, name: &str) -> Option<usize> {
        self.lanes.iter().position(|s| s.as_deref() == Some(name)).map(|i| i + 1)
    }

    /// Occupied lanes as `(lane, name)` in lane order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.lanes
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_deref().map(|s| (i + 1, s)))
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.iter().all(Option::is_none)
    }
}

/// All competitors in registration order.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    competitors: Vec<Competitor>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new competitor. The name is trimmed and must be unique.
    pub fn register(&mut self, name: &str) -> Result<&Competitor, CommandError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CommandError::EmptyName);
        }
        if self.get(name).is_some() {
            return Err(CommandError::DuplicateCompetitor(name.to_string()));
        }
        self.competitors.push(Competitor::new(name.to_string()));
        debug!("registered competitor {name}");
        Ok(&self.competitors[self.competitors.len() - 1])
    }

    /// Remove a competitor who has not raced yet.
    pub fn withdraw(&mut self, name: &str) -> Result<(), CommandError> {
        let idx = self
            .position(name)
            .ok_or_else(|| CommandError::UnknownCompetitor(name.to_string()))?;
        if self.competitors[idx].races_count() > 0 {
            return Err(CommandError::CompetitorHasRaced(name.to_string()));
        }
        self.competitors.remove(idx);
        debug!("withdrew competitor {name}");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Competitor> {
        self.competitors.iter().find(|c| c.name == name)
    }

    /// Competitors in registration order.
    pub fn competitors(&self) -> &[Competitor] {
        &self.competitors
    }

    pub fn len(&self) -> usize {
        self.competitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.competitors.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.competitors.iter().position(|c| c.name == name)
    }

    /// Record one heat. Every lane with both an assigned competitor and a
    /// positive time counts as a race; assigned lanes without one are DNFs
    /// and unassigned times are ignored.
    ///
    /// All qualifying lanes are resolved before anything is written, so an
    /// error leaves the ledger untouched. Returns the number of races recorded.
    pub fn apply_heat(
        &mut self,
        heat_number: u32,
        assignment: &LaneAssignment,
        result: &RaceResult,
    ) -> Result<usize, LedgerError> {
        let mut updates = Vec::with_capacity(LANES);
        for (lane, name) in assignment.iter() {
            let Some(time) = result.lane(lane).filter(|t| *t > 0.0) else { continue };
            let idx = self.position(name).ok_or_else(|| LedgerError::UnknownCompetitor {
                lane,
                name: name.to_string(),
            })?;
            updates.push((idx, HeatRecord { heat_number, lane, time }));
        }
        for &(idx, rec) in &updates {
            self.competitors[idx].record(rec);
        }
        Ok(updates.len())
    }

    /// Suggest lanes for the next heat: the least-raced competitors, ties in
    /// registration order, filling lanes 1-4.
    pub fn auto_assign(&self) -> LaneAssignment {
        let mut order: Vec<&Competitor> = self.competitors.iter().collect();
        order.sort_by_key(|c| c.races_count());
        let mut lanes = LaneAssignment::new();
        for (i, c) in order.into_iter().take(LANES).enumerate() {
            lanes.lanes[i] = Some(c.name.clone());
        }
        lanes
    }
}
