//! Raw telemetry capture.
//!
//! Every framed line the listener sees is recorded so a session can be
//! replayed offline. Frames are `[len:u32 LE][crc32:u32 LE][bincode payload]`
//! and are written by a background thread fed over a bounded channel, so a
//! slow disk never stalls the listener.
use crate::record::{CaptureFrame, CaptureHeader, CaptureLine};
use anyhow::{bail, Context, Result};
use crc32fast::Hasher as Crc32;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{error, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::{SystemTime, UNIX_EPOCH};

pub const CAPTURE_VERSION: u16 = 1;

pub fn now_unix_ns() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

pub fn write_frame<W: Write>(w: &mut W, frame: &CaptureFrame) -> Result<()> {
    let payload = bincode::serialize(frame)?;
    let mut hasher = Crc32::new();
    hasher.update(&payload);
    let crc = hasher.finalize();

    let len = payload.len() as u32;
    w.write_all(&len.to_le_bytes())?;
    w.write_all(&crc.to_le_bytes())?;
    w.write_all(&payload)?;
    Ok(())
}

fn writer_thread(out: PathBuf, rx: Receiver<CaptureFrame>) -> Result<()> {
    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).ok();
        }
    }
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&out)
        .with_context(|| format!("open capture {out:?}"))?;
    // flushed per frame, so the buffer only needs to hold one line
    let mut w = BufWriter::with_capacity(8 << 10, file); // 8 KiB buffer
    for frame in rx {
        write_frame(&mut w, &frame)?;
        w.flush()?;
    }
    w.flush()?;
    Ok(())
}

/// Handle to a running capture writer.
pub struct CaptureSink {
    tx: Sender<CaptureFrame>,
    seq: u64,
    handle: Option<JoinHandle<()>>,
}

impl CaptureSink {
    /// Start writing a capture to `out`. `source` names where the bytes come
    /// from and goes into the header frame.
    pub fn spawn(out: PathBuf, source: &str) -> Self {
        let (tx, rx) = bounded::<CaptureFrame>(1024);
        let handle = std::thread::spawn(move || {
            if let Err(e) = writer_thread(out, rx) {
                error!("capture writer error: {e:#}");
            }
        });
        let header = CaptureFrame::Header(CaptureHeader {
            version: CAPTURE_VERSION,
            created_unix_ns: now_unix_ns(),
            source: source.to_string(),
        });
        tx.send(header).ok();
        Self { tx, seq: 0, handle: Some(handle) }
    }

    /// Queue one line. Drops it with a warning if the writer is gone or
    /// has fallen too far behind.
    pub fn record_line(&mut self, heat_number: u32, text: &str) {
        let frame = CaptureFrame::Line(CaptureLine {
            seq: self.seq,
            recv_unix_ns: now_unix_ns(),
            heat_number,
            text: text.to_string(),
        });
        self.seq += 1;
        match self.tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("capture queue full, dropped line {}", self.seq - 1),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Flush everything queued and wait for the writer to finish.
    pub fn finish(mut self) {
        self.close();
    }

    fn close(&mut self) {
        // replacing the sender disconnects the writer's receiver
        let (dead, _) = bounded(0);
        drop(std::mem::replace(&mut self.tx, dead));
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for CaptureSink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Sequential reader over a capture file, verifying each frame's CRC.
pub struct CaptureReader<R> {
    rdr: R,
    frames: usize,
}

impl CaptureReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open {path:?}"))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: Read> CaptureReader<R> {
    pub fn new(rdr: R) -> Self {
        Self { rdr, frames: 0 }
    }

    /// Next frame, `None` at a clean end of file.
    pub fn next_frame(&mut self) -> Result<Option<CaptureFrame>> {
        let mut len = [0u8; 4];
        match self.rdr.read_exact(&mut len) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let mut crc = [0u8; 4];
        self.rdr.read_exact(&mut crc).context("truncated frame header")?;
        let crc_on_file = u32::from_le_bytes(crc);
        let mut payload = vec![0u8; u32::from_le_bytes(len) as usize];
        self.rdr.read_exact(&mut payload).context("truncated frame payload")?;

        let mut hasher = Crc32::new();
        hasher.update(&payload);
        let crc_calc = hasher.finalize();
        if crc_calc != crc_on_file {
            bail!(
                "CRC mismatch at frame {}: file={:#x}, calc={:#x}",
                self.frames,
                crc_on_file,
                crc_calc
            );
        }
        self.frames += 1;
        Ok(Some(bincode::deserialize(&payload).context("bincode decode")?))
    }
}

impl<R: Read> Iterator for CaptureReader<R> {
    type Item = Result<CaptureFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}
