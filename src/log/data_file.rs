//! Data File
//!
//! Byte-level operations on one `.jsonl` data file, each keeping the
//! sidecar index in lockstep with the bytes written.
//!
//! Callers decide *which* file (caller-named or engine-rotated) and which
//! header a brand-new file should get; this module only knows paths.

use std::io::SeekFrom;
use std::path::Path;

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

use crate::config::SyncStrategy;
use crate::error::{not_found_as_none, LogError, Result};
use crate::index::{self, IndexEntry, IndexHeader};
use crate::record::{
    parse_record, resolve_message_time, serialize_record, LineScanner, MessageTimeFn, Record,
};

/// Per-call write context
pub(crate) struct WriteContext<'a, R: Record> {
    pub sync: SyncStrategy,
    pub message_time: Option<&'a MessageTimeFn<R>>,
}

// =============================================================================
// Writes
// =============================================================================

/// Return the file's header, creating the index with `initial` when both
/// the data file and its index are still empty.
pub(crate) async fn ensure_index(
    data_path: &Path,
    initial: IndexHeader,
    sync: SyncStrategy,
) -> Result<IndexHeader> {
    if let Some(header) = index::read_index_header(data_path).await? {
        return Ok(header);
    }

    if data_file_size(data_path).await?.unwrap_or(0) > 0 {
        return Err(LogError::MissingIndex(data_path.display().to_string()));
    }

    index::create_index_header(data_path, initial, true, sync).await?;
    Ok(initial)
}

/// Append one record line and its index entry
pub(crate) async fn append<R: Record>(
    data_path: &Path,
    record: &R,
    initial: IndexHeader,
    ctx: &WriteContext<'_, R>,
) -> Result<IndexEntry> {
    let header = ensure_index(data_path, initial, ctx.sync).await?;
    let last = index::get_last_index_entry(data_path).await?;
    let (line, range) = serialize_record(record)?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(data_path)
        .await?;
    let len = file.metadata().await?.len();
    let offset = append_offset(&file, data_path, last.as_ref(), len).await?;

    let mut bytes = Vec::with_capacity(line.len() + 1);
    if offset.separator {
        bytes.push(b'\n');
    }
    bytes.extend_from_slice(&line);
    write_and_sync(&mut file, &bytes, ctx.sync).await?;
    let start = offset.start + u64::from(offset.separator);

    let line_number_local = last.map_or(1, |e| e.line_number_local + 1);
    let (message_time, time_source) = resolve_message_time(record, ctx.message_time);
    let entry = IndexEntry {
        line_number_local,
        line_number_global: header.global_line_offset + u64::from(line_number_local),
        start_byte: start,
        end_byte: start + range.end,
        message_time,
        time_source,
    };
    index::append_index_entry(data_path, &entry, ctx.sync).await?;

    debug!(
        path = %data_path.display(),
        line = entry.line_number_global,
        bytes = entry.len(),
        "appended record"
    );
    Ok(entry)
}

/// Truncate the file to exactly this one record
pub(crate) async fn overwrite<R: Record>(
    data_path: &Path,
    record: &R,
    initial: IndexHeader,
    ctx: &WriteContext<'_, R>,
) -> Result<IndexEntry> {
    let header = index::read_index_header(data_path)
        .await?
        .unwrap_or(initial);
    let (line, range) = serialize_record(record)?;

    if let Some(parent) = data_path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(data_path)
        .await?;
    write_and_sync(&mut file, &line, ctx.sync).await?;

    index::create_index_header(data_path, header, true, ctx.sync).await?;

    let (message_time, time_source) = resolve_message_time(record, ctx.message_time);
    let entry = IndexEntry {
        line_number_local: 1,
        line_number_global: header.global_line_offset + 1,
        start_byte: 0,
        end_byte: range.end,
        message_time,
        time_source,
    };
    index::append_index_entry(data_path, &entry, ctx.sync).await?;

    debug!(path = %data_path.display(), "overwrote file with single record");
    Ok(entry)
}

/// Swap the last record's bytes and index entry; record count is unchanged
pub(crate) async fn replace_last<R: Record>(
    data_path: &Path,
    record: &R,
    ctx: &WriteContext<'_, R>,
) -> Result<IndexEntry> {
    let Some(last) = index::get_last_index_entry(data_path).await? else {
        return Err(LogError::EmptyFile(data_path.display().to_string()));
    };
    let (line, range) = serialize_record(record)?;

    let mut file = OpenOptions::new().write(true).open(data_path).await?;
    file.set_len(last.start_byte).await?;
    file.seek(SeekFrom::Start(last.start_byte)).await?;
    write_and_sync(&mut file, &line, ctx.sync).await?;

    let (message_time, time_source) = resolve_message_time(record, ctx.message_time);
    let entry = IndexEntry {
        end_byte: last.start_byte + range.end,
        message_time,
        time_source,
        ..last
    };
    index::replace_last_index_entry(data_path, &entry, ctx.sync).await?;

    debug!(
        path = %data_path.display(),
        line = entry.line_number_global,
        "replaced last record"
    );
    Ok(entry)
}

// =============================================================================
// Reads
// =============================================================================

/// Size of the data file, `None` if it does not exist
pub(crate) async fn data_file_size(data_path: &Path) -> Result<Option<u64>> {
    Ok(not_found_as_none(fs::metadata(data_path).await)?.map(|m| m.len()))
}

/// Parse every non-empty line of the file, without consulting the index
pub(crate) async fn read_all<R: Record>(data_path: &Path) -> Result<Vec<R>> {
    let Some(content) = not_found_as_none(fs::read(data_path).await)? else {
        return Ok(Vec::new());
    };

    let mut scanner = LineScanner::new();
    let mut records = scanner
        .feed(&content)
        .iter()
        .map(|line| parse_record(&line.bytes))
        .collect::<Result<Vec<R>>>()?;

    // An unparseable tail is a torn write, never acknowledged by the index
    if let Some(tail) = scanner.finish() {
        match parse_record(&tail.bytes) {
            Ok(record) => records.push(record),
            Err(e) => warn!(
                path = %data_path.display(),
                start = tail.range.start,
                error = %e,
                "skipping unterminated tail line"
            ),
        }
    }
    Ok(records)
}

/// Read the record behind the file's last index entry
pub(crate) async fn read_last<R: Record>(data_path: &Path) -> Result<Option<R>> {
    let Some(last) = index::get_last_index_entry(data_path).await? else {
        return Ok(None);
    };

    let records = read_entries(data_path, std::slice::from_ref(&last)).await?;
    Ok(records.into_iter().next())
}

/// Read the records behind `entries` (file order) with one contiguous read
pub(crate) async fn read_entries<R: Record>(
    data_path: &Path,
    entries: &[IndexEntry],
) -> Result<Vec<R>> {
    let (Some(first), Some(last)) = (entries.first(), entries.last()) else {
        return Ok(Vec::new());
    };
    let span_start = first.start_byte;
    let span_end = last.end_byte;
    if span_end < span_start {
        return Err(LogError::CorruptIndex(format!(
            "{}: entries out of order ({}..{})",
            data_path.display(),
            span_start,
            span_end
        )));
    }

    let mut file = File::open(data_path).await?;
    let mut span = vec![0u8; (span_end - span_start) as usize];
    file.seek(SeekFrom::Start(span_start)).await?;
    file.read_exact(&mut span).await?;

    entries
        .iter()
        .map(|entry| {
            let from = entry.start_byte.checked_sub(span_start);
            let to = entry.end_byte.checked_sub(span_start);
            match (from, to) {
                (Some(from), Some(to)) if from <= to && to as usize <= span.len() => {
                    parse_record(&span[from as usize..to as usize])
                }
                _ => Err(LogError::CorruptIndex(format!(
                    "{}: entry {} outside read span",
                    data_path.display(),
                    entry.line_number_global
                ))),
            }
        })
        .collect()
}

// =============================================================================
// Private Helpers
// =============================================================================

/// Where the next appended line goes
struct AppendOffset {
    /// Byte the write begins at
    start: u64,
    /// The last indexed line lacks its newline; write one first
    separator: bool,
}

/// Reconcile the data file length with the index before an append.
///
/// Bytes past the last entry are either a torn tail (no newline) which is
/// truncated away, or complete lines the index never recorded, which only
/// a reindex can number.
async fn append_offset(
    file: &File,
    data_path: &Path,
    last: Option<&IndexEntry>,
    len: u64,
) -> Result<AppendOffset> {
    if let Some(last) = last {
        if len < last.end_byte {
            return Err(LogError::CorruptIndex(format!(
                "{}: index ends at byte {} but data file has {} bytes",
                data_path.display(),
                last.end_byte,
                len
            )));
        }
        // Indexed tail kept by a reindex without its newline
        if len == last.end_byte {
            return Ok(AppendOffset {
                start: len,
                separator: true,
            });
        }
    }

    let expected = last.map_or(0, |e| e.end_byte + 1);
    if len == expected {
        return Ok(AppendOffset {
            start: len,
            separator: false,
        });
    }

    let mut reader = File::open(data_path).await?;
    let mut unindexed = Vec::with_capacity((len - expected) as usize);
    reader.seek(SeekFrom::Start(expected)).await?;
    reader.read_to_end(&mut unindexed).await?;

    let mut scanner = LineScanner::starting_at(expected);
    let lines = scanner.feed(&unindexed);
    if let Some(first) = lines.first() {
        return Err(LogError::CorruptIndex(format!(
            "{}: {} unindexed line(s) from byte {}; reindex the stream",
            data_path.display(),
            lines.len(),
            first.range.start
        )));
    }

    let keep = len - scanner.pending_len() as u64;
    if keep < len {
        warn!(
            path = %data_path.display(),
            from = keep,
            bytes = len - keep,
            "truncating torn tail before append"
        );
        file.set_len(keep).await?;
    }
    Ok(AppendOffset {
        start: keep,
        separator: false,
    })
}

async fn write_and_sync(file: &mut File, bytes: &[u8], sync: SyncStrategy) -> Result<()> {
    file.write_all(bytes).await?;
    file.flush().await?;
    if sync == SyncStrategy::EveryWrite {
        file.sync_data().await?;
    }
    Ok(())
}
