//! Index Module
//!
//! Binary sidecar index for one JSONL data file.
//!
//! ## Responsibilities
//! - Fixed-size header + entry slots (O(1) seek to any entry, including the last)
//! - Byte ranges of every record line in the data file
//! - Message time per record for time range queries
//! - CRC32 per slot for torn-write / bit-flip detection
//!
//! ## File Format
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │ Header (64 bytes)                                         │
//! │   Version: u32 | FileNumber: u32 | GlobalLineOffset: u64  │
//! │   Magic "MLIX" (4) | Reserved (40) | CRC32 (4)            │
//! ├───────────────────────────────────────────────────────────┤
//! │ Entry (64 bytes)                                          │
//! │   LineLocal: u32 | LineGlobal: u64 | StartByte: u64       │
//! │   EndByte: u64 | MessageTime: i64 | TimeSource: u8        │
//! │   Reserved (23) | CRC32 (4)                               │
//! │   ... repeated for each record line ...                   │
//! └───────────────────────────────────────────────────────────┘
//! ```
//! All integers are little-endian. The CRC covers the first 60 bytes of
//! the slot.

mod codec;
mod store;

use std::path::{Path, PathBuf};

pub use codec::{decode_entry, decode_header, encode_entry, encode_header};
pub use store::{
    append_index_entries, append_index_entry, create_index_header, get_last_index_entry, index_entry_count,
    read_index, read_index_entries, read_index_entry, read_index_header, remove_index,
    replace_last_index_entry, truncate_index_entries, IndexData,
};

// =============================================================================
// Shared Constants
// =============================================================================

/// Current index format version
pub const INDEX_VERSION: u32 = 1;

/// Magic bytes identifying an index header
pub(crate) const MAGIC: &[u8; 4] = b"MLIX";

/// Header slot size in bytes
pub const HEADER_SIZE: u64 = 64;

/// Entry slot size in bytes
pub const ENTRY_SIZE: u64 = 64;

/// Bytes covered by the slot checksum
pub(crate) const CHECKSUM_OFFSET: usize = 60;

/// Sidecar suffix appended to the data file name
pub const INDEX_SUFFIX: &str = ".idx";

// =============================================================================
// Index Types
// =============================================================================

/// Where a record's message time came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeSource {
    /// The record's own `timestamp` field
    Created = 0,
    /// A caller-supplied extractor
    Extracted = 1,
}

impl TimeSource {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TimeSource::Created),
            1 => Some(TimeSource::Extracted),
            _ => None,
        }
    }
}

/// Index header stored at the beginning of each `.idx` file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub version: u32,
    /// 1-based ordinal among the stream's files
    pub file_number: u32,
    /// Number of records in all prior files of the stream
    pub global_line_offset: u64,
}

impl IndexHeader {
    pub fn new(file_number: u32, global_line_offset: u64) -> Self {
        Self {
            version: INDEX_VERSION,
            file_number,
            global_line_offset,
        }
    }

    /// Global line number of the first record this file can hold
    pub fn first_line_global(&self) -> u64 {
        self.global_line_offset + 1
    }
}

/// Index entry for a single record line
///
/// `start_byte..end_byte` covers the JSON text only; the trailing newline
/// is not part of the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// 1-based line number within the data file
    pub line_number_local: u32,
    /// 1-based line number within the whole stream
    pub line_number_global: u64,
    pub start_byte: u64,
    pub end_byte: u64,
    /// Unix millis
    pub message_time: i64,
    pub time_source: TimeSource,
}

impl IndexEntry {
    /// Byte length of the JSON text
    pub fn len(&self) -> u64 {
        self.end_byte - self.start_byte
    }

    pub fn is_empty(&self) -> bool {
        self.end_byte == self.start_byte
    }
}

/// Sidecar index path for a data file: `<data>.idx`
pub fn index_path(data_path: &Path) -> PathBuf {
    let mut name = data_path.as_os_str().to_os_string();
    name.push(INDEX_SUFFIX);
    PathBuf::from(name)
}
