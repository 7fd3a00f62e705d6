//! Error kinds surfaced by the engine.
//!
//! Parsing and winner resolution never fail, so there is no parse error here:
//! a line without time tokens is simply telemetry.
use std::path::PathBuf;
use thiserror::Error;

/// Failures of the byte source. Fatal to the current listen only.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The device went away (EOF on the stream, reader thread gone).
    #[error("timer device disconnected")]
    Disconnected,

    /// Any other I/O fault while reading.
    #[error("timer I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// File write failures. Never fatal: the in-memory ledger stays authoritative.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Appending the heat row failed; that row is lost from the log.
    #[error("failed to append heat {heat} to {path:?}: {source}")]
    HeatLog {
        heat: u32,
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Rewriting the standings snapshot failed.
    #[error("failed to write standings snapshot {path:?}: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to create results directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Commands rejected synchronously, with no state change.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("competitor name cannot be empty")]
    EmptyName,

    #[error("{0} is already registered")]
    DuplicateCompetitor(String),

    #[error("no competitor named {0}")]
    UnknownCompetitor(String),

    #[error("{0} has already raced and cannot be withdrawn")]
    CompetitorHasRaced(String),

    #[error("lane {0} is out of range (1-4)")]
    LaneOutOfRange(usize),

    #[error("{name} is assigned to both lane {first} and lane {second}")]
    DuplicateLaneAssignment {
        name: String,
        first: usize,
        second: usize,
    },

    #[error("a heat is already being listened for")]
    AlreadyListening,

    #[error("not allowed while a heat is being listened for")]
    Listening,

    #[error("no heat is being listened for")]
    NotListening,

    #[error("no timer connected")]
    NotConnected,

    #[error("the connected timer is still reading its device")]
    DeviceBusy,
}

/// Internal ledger inconsistency. The heat it was raised for is not applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("lane {lane} is assigned to unknown competitor {name}")]
    UnknownCompetitor { lane: usize, name: String },
}
