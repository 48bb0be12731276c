//! Accumulates backend output between recognizer passes.

use bytes::{Buf, BytesMut};
use tracing::debug;

/// Initial capacity; Unison's output between prompts is small.
const INITIAL_CAPACITY: usize = 4 * 1024;

#[derive(Debug)]
pub struct InputBuffer {
    data: BytesMut,
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl InputBuffer {
    pub fn new() -> Self {
        Self {
            data: BytesMut::with_capacity(INITIAL_CAPACITY),
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.data.extend_from_slice(chunk);
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn consume(&mut self, n: usize) {
        self.data.advance(n.min(self.data.len()));
    }

    /// Remove the first complete line, returning what is left visible on it.
    ///
    /// A trailing `\r` is dropped, and anything before the last remaining
    /// `\r` was overwritten on the terminal, so it is dropped too.
    pub fn take_line(&mut self) -> Option<String> {
        let pos = self.data.iter().position(|&b| b == b'\n')?;
        let raw = self.data.split_to(pos + 1);
        let mut line = &raw[..pos];
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }
        if let Some(cr) = line.iter().rposition(|&b| b == b'\r') {
            debug!(
                dropped = %String::from_utf8_lossy(&line[..cr]),
                "Discarding carriage-return overwritten text"
            );
            line = &line[cr + 1..];
        }
        Some(String::from_utf8_lossy(line).into_owned())
    }

    /// Everything buffered, as text. Used for tail prompts.
    pub fn tail(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    pub fn clear(&mut self) -> String {
        let rest = self.tail();
        self.data.clear();
        rest
    }
}
