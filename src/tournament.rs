//! Tournament state and the heat listening pipeline.
//!
//! A [`Tournament`] owns the ledger, the result files and the heat counter
//! (together the [`Engine`]) plus the connected timer. Listening for a heat
//! moves the engine and the timer onto a pipeline thread; they come back when
//! the thread is reaped. While they are away every ledger command is
//! rejected, so there is exactly one writer at any time without locks.
//!
//! Results travel back as [`PipelineEvent`]s over a channel the front end
//! drains on its own thread.
use crate::capture::CaptureSink;
use crate::error::{CommandError, LedgerError, PersistenceError, TransportError};
use crate::framer::LineFramer;
use crate::ledger::{Competitor, LaneAssignment, Ledger};
use crate::parser::parse_timer_line;
use crate::persist::{heat_timestamp, now_local, ResultsWriter};
use crate::race::{RaceResult, Winner};
use crate::record::HeatOutcome;
use crate::standings::{rank, StandingsRow};
use crate::transport::ByteSource;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Sleep between empty polls of the timer.
pub const DEFAULT_IDLE_BACKOFF: Duration = Duration::from_millis(10);

/// Listener state as seen by the front end.
#[derive(Debug)]
pub enum ListenState {
    Idle,
    Listening { heat_number: u32 },
    /// Stopped on request before a result arrived; nothing was recorded.
    Cancelled,
    /// The timer failed. The ledger and files are intact; reconnect to go on.
    Error(TransportError),
}

/// Everything that came out of one resolved heat.
#[derive(Debug)]
pub struct HeatReport {
    pub outcome: HeatOutcome,
    pub result: RaceResult,
    pub winner: Option<Winner>,
    /// Standings after this heat.
    pub standings: Vec<StandingsRow>,
    /// Set when the ledger refused the heat; its stats were not applied.
    pub ledger_error: Option<LedgerError>,
    /// File writes that failed for this heat. Never fatal.
    pub persistence: Vec<PersistenceError>,
}

#[derive(Debug)]
pub enum PipelineEvent {
    State(ListenState),
    /// A non-empty line received from the timer.
    Line(String),
    Heat(Box<HeatReport>),
}

/// Ledger, result files and heat counter. Owned by exactly one thread.
pub struct Engine {
    ledger: Ledger,
    writer: ResultsWriter,
    heat_number: u32,
    capture: Option<CaptureSink>,
}

impl Engine {
    pub fn new(writer: ResultsWriter) -> Self {
        Self { ledger: Ledger::new(), writer, heat_number: 1, capture: None }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Heat that the next listen will record.
    pub fn heat_number(&self) -> u32 {
        self.heat_number
    }

    /// Apply a parsed result as the current heat: update the ledger, log the
    /// heat, rewrite the snapshot and move to the next heat number. File
    /// failures are collected in the report rather than returned.
    pub fn complete_heat(&mut self, assignment: &LaneAssignment, result: RaceResult) -> HeatReport {
        let heat = self.heat_number;
        let ledger_error = match self.ledger.apply_heat(heat, assignment, &result) {
            Ok(n) => {
                debug!("heat {heat}: recorded {n} races");
                None
            }
            Err(e) => {
                error!("heat {heat} not applied to ledger: {e}");
                Some(e)
            }
        };
        let outcome = HeatOutcome::new(heat, heat_timestamp(now_local()), assignment, &result);
        let winner = result.winner();
        let standings = rank(&self.ledger);

        let mut persistence = Vec::new();
        if let Err(e) = self.writer.append_heat(&outcome) {
            error!("heat {heat} missing from heat log: {e}");
            persistence.push(e);
        }
        if let Err(e) = self.writer.write_standings(&standings) {
            warn!("standings snapshot not updated: {e}");
            persistence.push(e);
        }

        match (&winner, &outcome.winner) {
            (Some(w), Some(name)) => info!("heat {heat} won by {name} in lane {} ({:.4}s)", w.lane, w.time),
            (Some(w), None) => info!("heat {heat} fastest lane {} ({:.4}s) was unassigned", w.lane, w.time),
            _ => info!("heat {heat} finished without a winner"),
        }
        self.heat_number += 1;
        HeatReport { outcome, result, winner, standings, ledger_error, persistence }
    }
}

/// How a listen ended.
#[derive(Debug)]
pub enum ListenEnd {
    Heat,
    Cancelled,
    Failed(TransportError),
}

/// Poll `source` until a line with at least one time arrives, then complete
/// that heat. Telemetry lines are reported and skipped. The framer lives
/// only for this call, so nothing is carried into the next listen.
pub fn listen_for_heat(
    engine: &mut Engine,
    source: &mut dyn ByteSource,
    assignment: &LaneAssignment,
    cancel: &AtomicBool,
    idle_backoff: Duration,
    events: &Sender<PipelineEvent>,
) -> ListenEnd {
    let mut framer = LineFramer::new();
    let mut chunk = Vec::new();
    loop {
        if cancel.load(Ordering::Acquire) {
            return ListenEnd::Cancelled;
        }
        match source.bytes_available() {
            Ok(0) => {
                std::thread::sleep(idle_backoff);
                continue;
            }
            Ok(_) => {}
            Err(e) => return ListenEnd::Failed(e),
        }
        chunk.clear();
        if let Err(e) = source.read_available(&mut chunk) {
            return ListenEnd::Failed(e);
        }
        for line in framer.push(&chunk) {
            debug!("raw data: {line}");
            if let Some(capture) = engine.capture.as_mut() {
                capture.record_line(engine.heat_number, &line);
            }
            let _ = events.send(PipelineEvent::Line(line.clone()));

            let result = parse_timer_line(&line);
            if result.is_empty() {
                continue;
            }
            let report = engine.complete_heat(assignment, result);
            let _ = events.send(PipelineEvent::Heat(Box::new(report)));
            return ListenEnd::Heat;
        }
    }
}

struct Listener {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<(Engine, Option<Box<dyn ByteSource>>)>,
}

/// Front-end facing tournament handle.
pub struct Tournament {
    engine: Option<Engine>,
    source: Option<Box<dyn ByteSource>>,
    listener: Option<Listener>,
    idle_backoff: Duration,
    events_tx: Sender<PipelineEvent>,
    events_rx: Receiver<PipelineEvent>,
}

impl Tournament {
    pub fn new(writer: ResultsWriter) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            engine: Some(Engine::new(writer)),
            source: None,
            listener: None,
            idle_backoff: DEFAULT_IDLE_BACKOFF,
            events_tx,
            events_rx,
        }
    }

    pub fn with_idle_backoff(mut self, idle_backoff: Duration) -> Self {
        self.idle_backoff = idle_backoff;
        self
    }

    /// Record every received line to a raw capture.
    pub fn with_capture(mut self, sink: CaptureSink) -> Self {
        if let Some(engine) = self.engine.as_mut() {
            engine.capture = Some(sink);
        }
        self
    }

    /// Channel carrying listener state changes, raw lines and heat reports.
    pub fn events(&self) -> Receiver<PipelineEvent> {
        self.events_rx.clone()
    }

    fn engine(&self) -> Result<&Engine, CommandError> {
        self.engine.as_ref().ok_or(CommandError::Listening)
    }

    fn engine_mut(&mut self) -> Result<&mut Engine, CommandError> {
        self.engine.as_mut().ok_or(CommandError::Listening)
    }

    /// Attach a timer, replacing any previous one. Refused while the current
    /// timer's reader still holds its device, since a second reader on the
    /// same device would lose whatever bytes the first one picks up.
    pub fn connect(&mut self, source: Box<dyn ByteSource>) -> Result<(), CommandError> {
        if self.listener.is_some() {
            return Err(CommandError::Listening);
        }
        if self.device_busy() {
            return Err(CommandError::DeviceBusy);
        }
        self.source = Some(source);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.source.is_some()
    }

    /// True when `connect` would be refused with [`CommandError::DeviceBusy`].
    pub fn device_busy(&self) -> bool {
        self.source.as_ref().is_some_and(|s| s.holds_device())
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    pub fn ledger(&self) -> Result<&Ledger, CommandError> {
        Ok(&self.engine()?.ledger)
    }

    pub fn heat_number(&self) -> Result<u32, CommandError> {
        Ok(self.engine()?.heat_number)
    }

    pub fn register(&mut self, name: &str) -> Result<&Competitor, CommandError> {
        self.engine_mut()?.ledger.register(name)
    }

    pub fn withdraw(&mut self, name: &str) -> Result<(), CommandError> {
        self.engine_mut()?.ledger.withdraw(name)
    }

    pub fn standings(&self) -> Result<Vec<StandingsRow>, CommandError> {
        Ok(rank(&self.engine()?.ledger))
    }

    pub fn auto_assign(&self) -> Result<LaneAssignment, CommandError> {
        Ok(self.engine()?.ledger.auto_assign())
    }

    pub fn heats_path(&self) -> Result<PathBuf, CommandError> {
        Ok(self.engine()?.writer.heats_path().to_path_buf())
    }

    /// Rewrite the standings snapshot from the current ledger on demand.
    pub fn save_standings(&self) -> Result<Result<PathBuf, PersistenceError>, CommandError> {
        let engine = self.engine()?;
        let rows = rank(&engine.ledger);
        Ok(engine
            .writer
            .write_standings(&rows)
            .map(|()| engine.writer.standings_path().to_path_buf()))
    }

    /// Start listening for the current heat on the pipeline thread.
    ///
    /// Every assigned name must be registered. Only one listen may be active.
    pub fn start_listening(&mut self, assignment: LaneAssignment) -> Result<(), CommandError> {
        if self.listener.is_some() {
            return Err(CommandError::AlreadyListening);
        }
        let engine = self.engine()?;
        if let Some((_, name)) = assignment.iter().find(|(_, n)| engine.ledger.get(n).is_none()) {
            return Err(CommandError::UnknownCompetitor(name.to_string()));
        }
        let mut source = self.source.take().ok_or(CommandError::NotConnected)?;
        let mut engine = self.engine.take().ok_or(CommandError::Listening)?;

        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();
        let events = self.events_tx.clone();
        let idle_backoff = self.idle_backoff;
        let heat_number = engine.heat_number;
        info!("listening for heat {heat_number}");
        let _ = events.send(PipelineEvent::State(ListenState::Listening { heat_number }));

        let handle = std::thread::spawn(move || {
            let end =
                listen_for_heat(&mut engine, source.as_mut(), &assignment, &flag, idle_backoff, &events);
            let (state, source) = match end {
                ListenEnd::Heat => (ListenState::Idle, Some(source)),
                ListenEnd::Cancelled => {
                    info!("listening for heat {heat_number} cancelled");
                    (ListenState::Cancelled, Some(source))
                }
                ListenEnd::Failed(e) => {
                    error!("timer failed while listening for heat {heat_number}: {e}");
                    (ListenState::Error(e), None)
                }
            };
            let _ = events.send(PipelineEvent::State(state));
            (engine, source)
        });
        self.listener = Some(Listener { cancel, handle });
        Ok(())
    }

    /// Ask the active listen to stop. Call [`Tournament::wait`] to take the
    /// ledger back.
    pub fn cancel(&self) -> Result<(), CommandError> {
        let listener = self.listener.as_ref().ok_or(CommandError::NotListening)?;
        listener.cancel.store(true, Ordering::Release);
        Ok(())
    }

    /// Block until the active listen ends and take the engine back.
    pub fn wait(&mut self) -> Result<(), CommandError> {
        let listener = self.listener.take().ok_or(CommandError::NotListening)?;
        let (engine, source) = match listener.handle.join() {
            Ok(parts) => parts,
            Err(panic) => std::panic::resume_unwind(panic),
        };
        self.engine = Some(engine);
        if source.is_none() {
            warn!("timer disconnected; reconnect before the next heat");
        }
        self.source = source;
        Ok(())
    }

    /// Take the engine back if the active listen has already ended. Returns
    /// true when nothing is listening afterwards.
    pub fn reap(&mut self) -> bool {
        let finished = match &self.listener {
            None => return true,
            Some(l) => l.handle.is_finished(),
        };
        finished && self.wait().is_ok()
    }
}

impl Drop for Tournament {
    fn drop(&mut self) {
        if self.cancel().is_ok() {
            let _ = self.wait();
        }
    }
}
