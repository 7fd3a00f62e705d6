//! Byte sources the listener can poll.
//!
//! The physical link is outside this crate: anything implementing
//! [`std::io::Read`] (a configured serial device node, stdin, a socket) can be
//! wrapped in a [`ReaderSource`]. [`ReplaySource`] plays back scripted chunks.
use crate::error::TransportError;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError};
use log::{debug, warn};
use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::thread::JoinHandle;
use std::time::Duration;

/// A pollable byte stream.
///
/// `Ok(0)` from either call means "no data yet" and is never an error;
/// disconnects and faults come back as [`TransportError`].
pub trait ByteSource: Send {
    /// Bytes that can be read right now without blocking past the source's
    /// own per-call timeout.
    fn bytes_available(&mut self) -> Result<usize, TransportError>;

    /// Move every available byte into `buf`, returning how many were added.
    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize, TransportError>;

    /// True while a thread behind this source is still reading the device.
    /// Such a thread keeps consuming bytes after the source is dropped, so
    /// nothing else may open the device until it ends.
    fn holds_device(&self) -> bool {
        false
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        (**self).bytes_available()
    }

    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize, TransportError> {
        (**self).read_available(buf)
    }

    fn holds_device(&self) -> bool {
        (**self).holds_device()
    }
}

type Chunk = Result<Vec<u8>, std::io::Error>;

/// Wraps a blocking reader in a background thread so it can be polled.
///
/// The thread forwards whatever each `read` returns over a bounded channel.
/// EOF ends the stream and is reported as [`TransportError::Disconnected`]
/// once buffered bytes are consumed. A blocked `read` cannot be interrupted,
/// so the thread outlives the source until its reader returns.
pub struct ReaderSource {
    rx: Receiver<Chunk>,
    reader: JoinHandle<()>,
    pending: Vec<u8>,
    poll_timeout: Duration,
    failed: Option<TransportError>,
}

impl ReaderSource {
    pub fn spawn<R>(mut reader: R, poll_timeout: Duration) -> Self
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = bounded::<Chunk>(256);
        let reader = std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => {
                        debug!("timer stream reached EOF");
                        break;
                    }
                    Ok(n) => {
                        if tx.send(Ok(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                        std::thread::sleep(Duration::from_millis(10));
                    }
                    Err(e) => {
                        warn!("timer read failed: {e}");
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        });
        Self { rx, reader, pending: Vec::new(), poll_timeout, failed: None }
    }

    fn absorb(&mut self, chunk: Chunk) {
        match chunk {
            Ok(bytes) => self.pending.extend_from_slice(&bytes),
            Err(e) => self.failed = Some(TransportError::Io(e)),
        }
    }

    fn fill(&mut self) {
        if self.failed.is_some() {
            return;
        }
        if self.pending.is_empty() {
            match self.rx.recv_timeout(self.poll_timeout) {
                Ok(chunk) => self.absorb(chunk),
                Err(RecvTimeoutError::Timeout) => return,
                Err(RecvTimeoutError::Disconnected) => {
                    self.failed = Some(TransportError::Disconnected);
                    return;
                }
            }
        }
        loop {
            match self.rx.try_recv() {
                Ok(chunk) => self.absorb(chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.failed.get_or_insert(TransportError::Disconnected);
                    break;
                }
            }
        }
    }

    /// Bytes buffered so far are delivered before a failure is reported.
    fn take_failure(&mut self) -> Result<(), TransportError> {
        match (self.pending.is_empty(), self.failed.take()) {
            (true, Some(e)) => Err(e),
            (false, Some(e)) => {
                self.failed = Some(e);
                Ok(())
            }
            (_, None) => Ok(()),
        }
    }
}

impl ByteSource for ReaderSource {
    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        self.fill();
        self.take_failure()?;
        Ok(self.pending.len())
    }

    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize, TransportError> {
        if self.pending.is_empty() {
            self.fill();
        }
        self.take_failure()?;
        let n = self.pending.len();
        buf.append(&mut self.pending);
        Ok(n)
    }

    fn holds_device(&self) -> bool {
        !self.reader.is_finished()
    }
}

/// Scripted source: hands out one chunk per read, then either stays idle or
/// fails with the configured error.
#[derive(Default)]
pub struct ReplaySource {
    chunks: VecDeque<Vec<u8>>,
    end: Option<TransportError>,
}

impl ReplaySource {
    pub fn new<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        Self { chunks: chunks.into_iter().map(Into::into).collect(), end: None }
    }

    /// Fail with `err` once the chunks run out instead of idling.
    pub fn then_fail(mut self, err: TransportError) -> Self {
        self.end = Some(err);
        self
    }
}

impl ByteSource for ReplaySource {
    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        match self.chunks.front() {
            Some(c) => Ok(c.len()),
            None => self.end.take().map_or(Ok(0), Err),
        }
    }

    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize, TransportError> {
        match self.chunks.pop_front() {
            Some(c) => {
                buf.extend_from_slice(&c);
                Ok(c.len())
            }
            None => self.end.take().map_or(Ok(0), Err),
        }
    }
}
