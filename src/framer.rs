//! Byte stream to line framing.
//!
//! The timer terminates records with `\n`, `\r` or both. Each split consumes
//! only the first delimiter found, so a `\r\n` pair yields one line plus an
//! empty one, which is then dropped by trimming.

/// Accumulates raw bytes across polls and yields complete, trimmed lines.
#[derive(Debug, Default)]
pub struct LineFramer {
    /// Decoded text not yet terminated by a delimiter.
    buffer: String,
    /// Trailing bytes of an incomplete UTF-8 sequence from the previous chunk.
    pending: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every line it completes.
    ///
    /// Undecodable bytes are dropped; a multi-byte character split across two
    /// chunks is reassembled.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);
        self.decode_into_buffer(&bytes);
        self.drain_lines()
    }

    /// Text buffered without a trailing delimiter.
    pub fn remainder(&self) -> &str {
        &self.buffer
    }

    fn decode_into_buffer(&mut self, mut bytes: &[u8]) {
        loop {
            match std::str::from_utf8(bytes) {
                Ok(s) => {
                    self.buffer.push_str(s);
                    return;
                }
                Err(e) => {
                    let (valid, rest) = bytes.split_at(e.valid_up_to());
                    // valid_up_to guarantees this slice decodes
                    self.buffer.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(bad) => bytes = &rest[bad..],
                        None => {
                            // incomplete sequence at the end, wait for more
                            self.pending = rest.to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }

    fn drain_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.find(['\n', '\r']) {
            let rest = self.buffer.split_off(pos + 1);
            let raw = std::mem::replace(&mut self.buffer, rest);
            let line = raw[..pos].trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }
}
