//! Index Store
//!
//! Reads and writes `.idx` sidecar files on disk.
//!
//! Every function takes the *data file* path; the sidecar path is derived
//! with [`index_path`]. A missing index file reads as "no data yet"
//! (`None` / empty / zero), never as an error.

use std::io::SeekFrom;
use std::path::Path;

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::config::SyncStrategy;
use crate::error::{not_found_as_none, LogError, Result};

use super::codec::{decode_entry, decode_header, encode_entry, encode_header};
use super::{index_path, IndexEntry, IndexHeader, ENTRY_SIZE, HEADER_SIZE};

/// Header and all entries of one index file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexData {
    pub header: IndexHeader,
    pub entries: Vec<IndexEntry>,
}

// =============================================================================
// Writes
// =============================================================================

/// Create a new index file holding only `header`.
///
/// Fails with `AlreadyExists` if the index is present; pass
/// `truncate = true` to reset an existing index to an empty one.
pub async fn create_index_header(
    data_path: &Path,
    header: IndexHeader,
    truncate: bool,
    sync: SyncStrategy,
) -> Result<()> {
    let idx_path = index_path(data_path);
    if let Some(parent) = idx_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut options = OpenOptions::new();
    options.write(true);
    if truncate {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }

    let mut file = options.open(&idx_path).await?;
    write_slots(&mut file, &encode_header(&header), sync).await
}

/// Append one entry. Never rewrites prior entries.
pub async fn append_index_entry(
    data_path: &Path,
    entry: &IndexEntry,
    sync: SyncStrategy,
) -> Result<()> {
    let mut file = OpenOptions::new()
        .append(true)
        .open(index_path(data_path))
        .await?;

    write_slots(&mut file, &encode_entry(entry), sync).await
}

/// Append a batch of entries with a single write
pub async fn append_index_entries(
    data_path: &Path,
    entries: &[IndexEntry],
    sync: SyncStrategy,
) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }

    let mut buf = Vec::with_capacity(entries.len() * ENTRY_SIZE as usize);
    for entry in entries {
        buf.extend_from_slice(&encode_entry(entry));
    }

    let mut file = OpenOptions::new()
        .append(true)
        .open(index_path(data_path))
        .await?;
    write_slots(&mut file, &buf, sync).await
}

/// Drop every entry after the first `keep`
pub async fn truncate_index_entries(data_path: &Path, keep: u64) -> Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .open(index_path(data_path))
        .await?;

    file.set_len(HEADER_SIZE + keep * ENTRY_SIZE).await?;
    Ok(())
}

/// Swap the last entry for `entry`, keeping the entry count unchanged
pub async fn replace_last_index_entry(
    data_path: &Path,
    entry: &IndexEntry,
    sync: SyncStrategy,
) -> Result<()> {
    let count = index_entry_count(data_path).await?;
    if count == 0 {
        return Err(LogError::EmptyFile(
            index_path(data_path).display().to_string(),
        ));
    }

    truncate_index_entries(data_path, count - 1).await?;
    append_index_entry(data_path, entry, sync).await
}

/// Delete the index file. Returns whether one existed.
pub async fn remove_index(data_path: &Path) -> Result<bool> {
    Ok(not_found_as_none(fs::remove_file(index_path(data_path)).await)?.is_some())
}

// =============================================================================
// Reads
// =============================================================================

/// Read the header, or `None` when the index does not exist yet
pub async fn read_index_header(data_path: &Path) -> Result<Option<IndexHeader>> {
    let Some(mut file) = open_index(data_path).await? else {
        return Ok(None);
    };

    let len = file.metadata().await?.len();
    if len == 0 {
        return Ok(None);
    }
    if len < HEADER_SIZE {
        return Err(LogError::CorruptIndex(format!(
            "{}: truncated header ({} bytes)",
            index_path(data_path).display(),
            len
        )));
    }

    let mut slot = [0u8; HEADER_SIZE as usize];
    file.read_exact(&mut slot).await?;
    decode_header(&slot).map(Some)
}

/// Number of entries, derived from the file size
pub async fn index_entry_count(data_path: &Path) -> Result<u64> {
    let Some(file) = open_index(data_path).await? else {
        return Ok(0);
    };

    let len = file.metadata().await?.len();
    count_from_len(data_path, len)
}

/// Read `count` entries starting at zero-based slot `from`.
///
/// `count = None` reads to the end. Out-of-range windows are clamped.
pub async fn read_index_entries(
    data_path: &Path,
    from: u64,
    count: Option<u64>,
) -> Result<Vec<IndexEntry>> {
    let Some(mut file) = open_index(data_path).await? else {
        return Ok(Vec::new());
    };

    let total = count_from_len(data_path, file.metadata().await?.len())?;
    if from >= total {
        return Ok(Vec::new());
    }
    let end = match count {
        Some(n) => total.min(from.saturating_add(n)),
        None => total,
    };

    let mut buf = vec![0u8; ((end - from) * ENTRY_SIZE) as usize];
    file.seek(SeekFrom::Start(HEADER_SIZE + from * ENTRY_SIZE))
        .await?;
    file.read_exact(&mut buf).await?;

    buf.chunks_exact(ENTRY_SIZE as usize)
        .map(decode_entry)
        .collect()
}

/// Read the entry in zero-based slot `position`
pub async fn read_index_entry(data_path: &Path, position: u64) -> Result<Option<IndexEntry>> {
    let Some(mut file) = open_index(data_path).await? else {
        return Ok(None);
    };

    let total = count_from_len(data_path, file.metadata().await?.len())?;
    if position >= total {
        return Ok(None);
    }

    read_slot_at(&mut file, position).await.map(Some)
}

/// O(1): seek straight to the tail slot
pub async fn get_last_index_entry(data_path: &Path) -> Result<Option<IndexEntry>> {
    let Some(mut file) = open_index(data_path).await? else {
        return Ok(None);
    };

    let total = count_from_len(data_path, file.metadata().await?.len())?;
    if total == 0 {
        return Ok(None);
    }

    read_slot_at(&mut file, total - 1).await.map(Some)
}

/// Header plus every entry, or `None` when there is no header
pub async fn read_index(data_path: &Path) -> Result<Option<IndexData>> {
    let Some(header) = read_index_header(data_path).await? else {
        return Ok(None);
    };
    let entries = read_index_entries(data_path, 0, None).await?;

    Ok(Some(IndexData { header, entries }))
}

// =============================================================================
// Private Helpers
// =============================================================================

async fn open_index(data_path: &Path) -> Result<Option<File>> {
    not_found_as_none(File::open(index_path(data_path)).await)
}

fn count_from_len(data_path: &Path, len: u64) -> Result<u64> {
    if len == 0 || len == HEADER_SIZE {
        return Ok(0);
    }
    if len < HEADER_SIZE || (len - HEADER_SIZE) % ENTRY_SIZE != 0 {
        return Err(LogError::CorruptIndex(format!(
            "{}: size {} is not header + whole entries",
            index_path(data_path).display(),
            len
        )));
    }
    Ok((len - HEADER_SIZE) / ENTRY_SIZE)
}

async fn read_slot_at(file: &mut File, position: u64) -> Result<IndexEntry> {
    let mut slot = [0u8; ENTRY_SIZE as usize];
    file.seek(SeekFrom::Start(HEADER_SIZE + position * ENTRY_SIZE))
        .await?;
    file.read_exact(&mut slot).await?;
    decode_entry(&slot)
}

async fn write_slots(file: &mut File, slot: &[u8], sync: SyncStrategy) -> Result<()> {
    file.write_all(slot).await?;
    file.flush().await?;
    if sync == SyncStrategy::EveryWrite {
        file.sync_data().await?;
    }
    Ok(())
}
