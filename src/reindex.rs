//! Reindexer
//!
//! Rebuilds index files purely from data files. This is the recovery path:
//! existing `.idx` files are never trusted, only deleted and re-derived.
//!
//! ## Steps (per stream, files in filename order)
//! 1. Delete the file's index and write a fresh header
//!    (`file_number = position + 1`, running `global_line_offset`)
//! 2. Stream the data file in fixed-size chunks; lines may straddle chunks
//! 3. Index every non-empty line: byte range, message time
//! 4. Carry the file's last global line number into the next header
//!
//! Data files are only ever opened for reading.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use crate::config::SyncStrategy;
use crate::error::{LogError, Result};
use crate::index::{self, IndexEntry, IndexHeader};
use crate::record::{
    parse_record, resolve_message_time, LineScanner, MessageTimeFn, Record, ScannedLine,
};

/// Options shared by every file of one reindex pass
pub struct ReindexOptions<'a, R: Record> {
    pub chunk_size: usize,
    pub sync: SyncStrategy,
    pub message_time: Option<&'a MessageTimeFn<R>>,
}

/// Outcome of reindexing one data file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileReindex {
    pub header: IndexHeader,
    pub records: u64,
    pub bytes_scanned: u64,
    /// An unterminated, unparseable tail line was left out of the index
    pub dropped_tail: bool,
}

impl FileReindex {
    /// Global line number of this file's last record
    pub fn last_line_global(&self) -> u64 {
        self.header.global_line_offset + self.records
    }
}

/// Outcome of reindexing a whole stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReindexStats {
    pub stream: String,
    pub files: usize,
    pub records: u64,
    pub bytes_scanned: u64,
    pub dropped_tails: usize,
}

/// Reindex `files` (already in chronological order) as one stream
pub async fn reindex_all_files<R: Record>(
    stream: &str,
    files: &[PathBuf],
    options: &ReindexOptions<'_, R>,
) -> Result<ReindexStats> {
    let mut stats = ReindexStats {
        stream: stream.to_string(),
        ..ReindexStats::default()
    };
    let mut global_line_offset = 0u64;

    for (position, path) in files.iter().enumerate() {
        let header = IndexHeader::new(position as u32 + 1, global_line_offset);
        let file = reindex_file(path, header, options).await?;

        global_line_offset = file.last_line_global();
        stats.files += 1;
        stats.records += file.records;
        stats.bytes_scanned += file.bytes_scanned;
        stats.dropped_tails += usize::from(file.dropped_tail);
    }

    info!(
        stream,
        files = stats.files,
        records = stats.records,
        bytes = stats.bytes_scanned,
        dropped_tails = stats.dropped_tails,
        "reindexed stream"
    );
    Ok(stats)
}

/// Rebuild one file's index under `header`
pub async fn reindex_file<R: Record>(
    data_path: &Path,
    header: IndexHeader,
    options: &ReindexOptions<'_, R>,
) -> Result<FileReindex> {
    index::remove_index(data_path).await?;
    index::create_index_header(data_path, header, false, options.sync).await?;

    let mut file = File::open(data_path).await?;
    let mut chunk = vec![0u8; options.chunk_size.max(1)];
    let mut scanner = LineScanner::new();
    let mut outcome = FileReindex {
        header,
        records: 0,
        bytes_scanned: 0,
        dropped_tail: false,
    };

    loop {
        let read = file.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        outcome.bytes_scanned += read as u64;

        let mut entries = Vec::new();
        for line in scanner.feed(&chunk[..read]) {
            entries.push(index_line(&line, &mut outcome, options)?);
        }
        index::append_index_entries(data_path, &entries, options.sync).await?;
    }

    if let Some(tail) = scanner.finish() {
        match index_line(&tail, &mut outcome, options) {
            Ok(entry) => index::append_index_entry(data_path, &entry, options.sync).await?,
            Err(LogError::Serialization(e)) => {
                warn!(
                    path = %data_path.display(),
                    start = tail.range.start,
                    bytes = tail.range.len(),
                    error = %e,
                    "dropping unterminated tail line"
                );
                outcome.dropped_tail = true;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(outcome)
}

fn index_line<R: Record>(
    line: &ScannedLine,
    outcome: &mut FileReindex,
    options: &ReindexOptions<'_, R>,
) -> Result<IndexEntry> {
    let record: R = parse_record(&line.bytes)?;
    let (message_time, time_source) = resolve_message_time(&record, options.message_time);

    outcome.records += 1;
    Ok(IndexEntry {
        line_number_local: outcome.records as u32,
        line_number_global: outcome.header.global_line_offset + outcome.records,
        start_byte: line.range.start,
        end_byte: line.range.end,
        message_time,
        time_source,
    })
}
