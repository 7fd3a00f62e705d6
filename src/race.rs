//! Per-heat time arrays and winner resolution.

/// Physical lanes on the track.
pub const LANES: usize = 4;

/// Finish times for one heat, slot `i` holding lane `i + 1`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RaceResult {
    times: [Option<f64>; LANES],
}

/// Winning lane (1-based) and its time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Winner {
    pub lane: usize,
    pub time: f64,
}

impl RaceResult {
    pub fn new(times: [Option<f64>; LANES]) -> Self {
        Self { times }
    }

    pub fn times(&self) -> &[Option<f64>; LANES] {
        &self.times
    }

    /// Time for a 1-based lane; `None` for absent or out-of-range lanes.
    pub fn lane(&self, lane: usize) -> Option<f64> {
        lane.checked_sub(1)
            .and_then(|i| self.times.get(i).copied().flatten())
    }

    /// True when no lane has a time, i.e. the line was telemetry.
    pub fn is_empty(&self) -> bool {
        self.times.iter().all(Option::is_none)
    }

    /// Present times as `(lane, time)` pairs in lane order.
    pub fn finishers(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.times
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.map(|t| (i + 1, t)))
    }

    /// Lane with the strictly smallest time; exact ties go to the lower lane.
    pub fn winner(&self) -> Option<Winner> {
        let mut best: Option<Winner> = None;
        for (lane, time) in self.finishers() {
            match best {
                Some(w) if time >= w.time => {}
                _ => best = Some(Winner { lane, time }),
            }
        }
        best
    }
}
