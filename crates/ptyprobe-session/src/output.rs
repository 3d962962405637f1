//! Transcript accumulation.

use memchr::memmem::Finder;

/// Append-only buffer of raw terminal output.
///
/// Bytes are kept exactly as read from the PTY, escape sequences included.
/// Bytes are never removed once appended.
#[derive(Debug, Default)]
pub struct TranscriptBuffer {
    /// Raw bytes received from PTY (with ANSI codes)
    bytes: Vec<u8>,
    /// Number of non-empty chunks appended
    chunks: usize,
}

impl TranscriptBuffer {
    /// Create a new, empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk to the end of the buffer.
    pub fn append(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        self.bytes.extend_from_slice(chunk);
        self.chunks += 1;
    }

    /// All bytes captured so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of bytes captured.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether nothing has been captured.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of non-empty chunks appended.
    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    /// Consume the buffer, returning the captured bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Whether `pattern` occurs anywhere in the buffer.
    pub fn contains(&self, pattern: &[u8]) -> bool {
        memchr::memmem::find(&self.bytes, pattern).is_some()
    }

    /// Search `self[from..]` for any of `finders`.
    ///
    /// Returns `(finder index, absolute offset)` of the earliest-listed finder
    /// that matches. `from` past the end yields `None`.
    pub fn find_any(&self, finders: &[Finder<'_>], from: usize) -> Option<(usize, usize)> {
        let haystack = self.bytes.get(from..)?;
        finders
            .iter()
            .enumerate()
            .find_map(|(i, finder)| finder.find(haystack).map(|pos| (i, from + pos)))
    }
}
