//! Log File Manager
//!
//! Owns the set of rotated data files of each stream.
//!
//! ## Responsibilities
//! - Discover a stream's files on first use, newest last
//! - Cache the current (open for append) file per stream
//! - Decide rotation and mint the next file name + header

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tokio::fs;
use tracing::info;

use crate::error::{not_found_as_none, LogError, Result};
use crate::index::{self, IndexHeader};

use super::data_file;

/// Data file extension
pub const DATA_EXTENSION: &str = "jsonl";

/// Width of the zero-padded global line index in data file names
pub const FILE_NAME_DIGITS: usize = 32;

/// Manages the data files of every stream under one base directory
///
/// ## Concurrency:
/// - `current`: per-instance cache behind a parking_lot Mutex, never held across `.await`
/// - Assumes a single writer per stream per process; another process
///   writing the same directory makes the cache stale
pub struct LogFileManager {
    /// Root directory: one subdirectory per stream
    base_dir: PathBuf,

    /// Rotation threshold in bytes
    max_file_size: u64,

    /// stream id → current data file
    current: Mutex<HashMap<String, PathBuf>>,
}

impl LogFileManager {
    pub fn new(base_dir: impl Into<PathBuf>, max_file_size: u64) -> Self {
        Self {
            base_dir: base_dir.into(),
            max_file_size,
            current: Mutex::new(HashMap::new()),
        }
    }

    // =========================================================================
    // Naming
    // =========================================================================

    /// Directory holding a stream's files
    pub fn stream_dir(&self, stream: &str) -> PathBuf {
        self.base_dir.join(stream)
    }

    /// Path of the data file named `name` (without extension)
    pub fn file_path(&self, stream: &str, name: &str) -> PathBuf {
        self.stream_dir(stream)
            .join(format!("{}.{}", name, DATA_EXTENSION))
    }

    /// Path of the file whose first record has global line `line`
    pub fn file_path_for_line(&self, stream: &str, line: u64) -> PathBuf {
        self.file_path(stream, &format_file_name(line))
    }

    // =========================================================================
    // Discovery
    // =========================================================================

    /// Every data file of the stream in chronological (= filename) order
    pub async fn list_files(&self, stream: &str) -> Result<Vec<PathBuf>> {
        let Some(mut dir) = not_found_as_none(fs::read_dir(self.stream_dir(stream)).await)?
        else {
            return Ok(Vec::new());
        };

        let mut files = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if parse_data_file_name(&path).is_some() {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }

    /// Names of all stream directories under the base directory
    pub async fn list_streams(&self) -> Result<Vec<String>> {
        let Some(mut dir) = not_found_as_none(fs::read_dir(&self.base_dir).await)? else {
            return Ok(Vec::new());
        };

        let mut streams = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                streams.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        streams.sort();
        Ok(streams)
    }

    /// Current file of the stream, or `None` if it has no files yet.
    ///
    /// Only the first call per stream lists the directory.
    pub async fn current_file(&self, stream: &str) -> Result<Option<PathBuf>> {
        if let Some(path) = self.current.lock().get(stream) {
            return Ok(Some(path.clone()));
        }

        let latest = self.list_files(stream).await?.pop();
        if let Some(path) = &latest {
            self.set_current(stream, path.clone());
        }
        Ok(latest)
    }

    /// Current file, or the stream's first file name if nothing exists yet
    pub async fn resolve_current_file(&self, stream: &str) -> Result<PathBuf> {
        match self.current_file(stream).await? {
            Some(path) => Ok(path),
            None => {
                let first = self.file_path_for_line(stream, 1);
                self.set_current(stream, first.clone());
                Ok(first)
            }
        }
    }

    pub fn set_current(&self, stream: &str, path: PathBuf) {
        self.current.lock().insert(stream.to_string(), path);
    }

    /// Drop the cached current file; the next lookup lists the directory
    pub fn forget(&self, stream: &str) {
        self.current.lock().remove(stream);
    }

    // =========================================================================
    // Rotation
    // =========================================================================

    /// `true` once the file has reached the size threshold
    pub async fn should_rotate(&self, data_path: &Path) -> Result<bool> {
        let size = data_file::data_file_size(data_path).await?.unwrap_or(0);
        Ok(size >= self.max_file_size)
    }

    /// Name and header of the file that follows `current`.
    ///
    /// Fails if `current` has no indexed records: its successor's name is
    /// derived from the last entry.
    pub async fn next_file(&self, stream: &str, current: &Path) -> Result<(PathBuf, IndexHeader)> {
        let Some(last) = index::get_last_index_entry(current).await? else {
            return Err(LogError::RotationWithoutIndex(current.display().to_string()));
        };
        let Some(header) = index::read_index_header(current).await? else {
            return Err(LogError::MissingIndex(current.display().to_string()));
        };

        let next_line = last.line_number_global + 1;
        let path = self.file_path_for_line(stream, next_line);
        let next_header = IndexHeader::new(header.file_number + 1, last.line_number_global);

        info!(
            stream,
            from = %current.display(),
            to = %path.display(),
            file_number = next_header.file_number,
            "rotating data file"
        );
        Ok((path, next_header))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }
}

/// Zero-padded 32-digit file name for a global line index
pub fn format_file_name(line: u64) -> String {
    format!("{:0width$}", line, width = FILE_NAME_DIGITS)
}

/// Global line index encoded in a file name (without extension)
pub fn parse_file_name(name: &str) -> Option<u64> {
    if name.len() != FILE_NAME_DIGITS || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

/// Global line index of a `<32 digits>.jsonl` path
pub fn parse_data_file_name(path: &Path) -> Option<u64> {
    if path.extension()? != DATA_EXTENSION {
        return None;
    }
    parse_file_name(&path.file_stem()?.to_string_lossy())
}
