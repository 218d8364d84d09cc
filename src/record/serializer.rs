//! Record Serializer
//!
//! Records become newline-terminated JSON lines. Positions are measured in
//! UTF-8 bytes, never in characters, so they match what lands on disk.

use serde::Serialize;

use crate::error::Result;

use super::Record;

/// Byte range of one JSON line, trailing newline excluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Concatenated lines plus the position of each within `content`
#[derive(Debug, Clone, Default)]
pub struct SerializedBatch {
    pub content: Vec<u8>,
    pub positions: Vec<ByteRange>,
}

/// Serialize one record as `json + "\n"`; the range covers the JSON only
pub fn serialize_record<T: Serialize + ?Sized>(record: &T) -> Result<(Vec<u8>, ByteRange)> {
    let mut line = serde_json::to_vec(record)?;
    let range = ByteRange {
        start: 0,
        end: line.len() as u64,
    };
    line.push(b'\n');
    Ok((line, range))
}

/// Serialize records in input order
pub fn serialize_records<T: Serialize>(records: &[T]) -> Result<SerializedBatch> {
    let mut batch = SerializedBatch::default();

    for record in records {
        let start = batch.content.len() as u64;
        serde_json::to_writer(&mut batch.content, record)?;
        let end = batch.content.len() as u64;
        batch.content.push(b'\n');
        batch.positions.push(ByteRange { start, end });
    }

    Ok(batch)
}

/// Parse one line's JSON bytes
pub fn parse_record<R: Record>(bytes: &[u8]) -> Result<R> {
    Ok(serde_json::from_slice(bytes)?)
}

// =============================================================================
// Line Scanning
// =============================================================================

/// A complete non-empty line found by [`LineScanner`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedLine {
    pub range: ByteRange,
    pub bytes: Vec<u8>,
    /// `false` only for an unterminated tail returned by `finish`
    pub terminated: bool,
}

/// Splits a byte stream into lines across arbitrary chunk boundaries.
///
/// Chunks may cut a JSON line (or a multi-byte character) anywhere; the
/// partial line is buffered until its newline arrives. Empty lines are
/// skipped but still advance the byte position.
#[derive(Debug, Default)]
pub struct LineScanner {
    /// Absolute byte offset of `pending[0]`
    pending_start: u64,
    pending: Vec<u8>,
}

impl LineScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting positions from `offset` instead of 0
    pub fn starting_at(offset: u64) -> Self {
        Self {
            pending_start: offset,
            pending: Vec::new(),
        }
    }

    /// Feed the next chunk, return every line it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ScannedLine> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.pending.extend_from_slice(&rest[..pos]);
            rest = &rest[pos + 1..];

            let bytes = std::mem::take(&mut self.pending);
            let start = self.pending_start;
            let end = start + bytes.len() as u64;
            self.pending_start = end + 1;

            if !bytes.is_empty() {
                lines.push(ScannedLine {
                    range: ByteRange { start, end },
                    bytes,
                    terminated: true,
                });
            }
        }

        self.pending.extend_from_slice(rest);
        lines
    }

    /// Bytes buffered without a terminating newline
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Flush the unterminated tail, if it holds anything but whitespace
    pub fn finish(self) -> Option<ScannedLine> {
        if self.pending.iter().all(|b| b.is_ascii_whitespace()) {
            return None;
        }

        let start = self.pending_start;
        let end = start + self.pending.len() as u64;
        Some(ScannedLine {
            range: ByteRange { start, end },
            bytes: self.pending,
            terminated: false,
        })
    }
}
