//! Named Log
//!
//! The minimal capability: the caller picks each file's relative path
//! (by date, by content hash, ...) and the log keeps every file indexed.
//! No rotation; each named file is a one-file stream with file number 1.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::config::SyncStrategy;
use crate::error::{not_found_as_none, Result};
use crate::index::{self, IndexEntry, IndexHeader};
use crate::record::{MessageTimeFn, Record};

use super::data_file::{self, WriteContext};
use super::manager::DATA_EXTENSION;

/// Summary of one named file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Relative path the file was written under
    pub name: String,
    pub record_count: u64,
    pub size_bytes: u64,
}

/// Caller-named JSONL files under one base directory
pub struct NamedLog<R: Record = serde_json::Value> {
    base_dir: PathBuf,
    sync: SyncStrategy,
    message_time: Option<MessageTimeFn<R>>,
}

impl<R: Record> NamedLog<R> {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            sync: SyncStrategy::OsBuffered,
            message_time: None,
        }
    }

    pub fn with_sync(mut self, sync: SyncStrategy) -> Self {
        self.sync = sync;
        self
    }

    /// Index message times with `extract` instead of the record timestamp
    pub fn with_message_time(mut self, extract: MessageTimeFn<R>) -> Self {
        self.message_time = Some(extract);
        self
    }

    /// `<base>/<relative_path>.jsonl`
    pub fn file_path(&self, relative_path: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}.{}", relative_path, DATA_EXTENSION))
    }

    /// Replace the file's content with exactly this record
    pub async fn write_record(&self, relative_path: &str, record: &R) -> Result<IndexEntry> {
        data_file::overwrite(
            &self.file_path(relative_path),
            record,
            IndexHeader::new(1, 0),
            &self.write_context(),
        )
        .await
    }

    pub async fn append_record(&self, relative_path: &str, record: &R) -> Result<IndexEntry> {
        data_file::append(
            &self.file_path(relative_path),
            record,
            IndexHeader::new(1, 0),
            &self.write_context(),
        )
        .await
    }

    /// All records of the file; empty if it does not exist
    pub async fn read_records(&self, relative_path: &str) -> Result<Vec<R>> {
        data_file::read_all(&self.file_path(relative_path)).await
    }

    pub async fn read_last_record(&self, relative_path: &str) -> Result<Option<R>> {
        data_file::read_last(&self.file_path(relative_path)).await
    }

    /// Fails with `EmptyFile` if the file holds no records (or is missing)
    pub async fn replace_last_record(&self, relative_path: &str, record: &R) -> Result<IndexEntry> {
        data_file::replace_last(&self.file_path(relative_path), record, &self.write_context())
            .await
    }

    /// Record count and size, `None` if the file does not exist
    pub async fn file_info(&self, relative_path: &str) -> Result<Option<FileInfo>> {
        let path = self.file_path(relative_path);
        let Some(size_bytes) = data_file::data_file_size(&path).await? else {
            return Ok(None);
        };

        Ok(Some(FileInfo {
            name: relative_path.to_string(),
            record_count: index::index_entry_count(&path).await?,
            size_bytes,
        }))
    }

    /// Names (without extension) of the data files directly under `dir`
    pub async fn list_file_names(&self, dir: &str) -> Result<Vec<String>> {
        let Some(mut entries) = not_found_as_none(fs::read_dir(self.base_dir.join(dir)).await)?
        else {
            return Ok(Vec::new());
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == DATA_EXTENSION) {
                if let Some(stem) = path.file_stem() {
                    names.push(stem.to_string_lossy().into_owned());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn write_context(&self) -> WriteContext<'_, R> {
        WriteContext {
            sync: self.sync,
            message_time: self.message_time.as_ref(),
        }
    }
}
