//! Heat timing and standings engine for a four-lane race timer.
//!
//! The timer streams ASCII lines over a serial link; this crate turns them
//! into heat results and tournament standings:
//!
//! - `framer`: byte chunks to trimmed lines, tolerant of bad bytes and
//!   arbitrary chunk boundaries
//! - `parser`: one line to per-lane times (`<digits>.<4 digits>` tokens in
//!   lane order)
//! - `race`: per-heat time array and winner resolution
//! - `ledger`: competitors, lane assignments and cumulative statistics
//! - `standings`: ranking by best time and table rendering
//! - `persist`: append-only heat log and standings snapshot (CSV)
//! - `capture`: CRC-framed raw line capture for offline replay
//! - `transport`: the pollable byte source boundary
//! - `tournament`: single-writer orchestration and the listening pipeline
//!
//! The `heat_timer` binary is an interactive front end over [`Tournament`];
//! `replay` and `standings` work offline from capture files and heat logs.
pub mod capture;
pub mod error;
pub mod framer;
pub mod ledger;
pub mod parser;
pub mod persist;
pub mod race;
pub mod record;
pub mod standings;
pub mod tournament;
pub mod transport;

pub use error::{CommandError, LedgerError, PersistenceError, TransportError};
pub use ledger::{Competitor, LaneAssignment, Ledger};
pub use race::{RaceResult, Winner};
pub use tournament::{HeatReport, ListenState, PipelineEvent, Tournament};
