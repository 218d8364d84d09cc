//! Engine Module
//!
//! The storage engine facade over self-rotating streams.
//!
//! ## Responsibilities
//! - Resolve the current data file of a stream, rotate at the size threshold
//! - Keep every byte written in lockstep with its index entry
//! - Range reads pruned by index headers
//! - Gate ordinary operations against reindex

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::fs;
use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::error::Result;
use crate::index::{self, IndexData, IndexEntry, IndexHeader};
use crate::log::data_file::{self, WriteContext};
use crate::log::LogFileManager;
use crate::record::{MessageTimeFn, Record};
use crate::reindex::{reindex_all_files, ReindexOptions, ReindexStats};
use crate::stream::{checked_stream_id, StreamGate};

/// Which data files `read_records` reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSelector {
    /// The file currently open for append
    Current,
    /// One file by name (32-digit stem, no extension)
    Named(String),
    /// Every file of the stream in order
    All,
}

/// Summary of one stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub stream: String,
    pub file_count: usize,
    pub record_count: u64,
    pub total_bytes: u64,
    pub first_message_time: Option<i64>,
    pub last_message_time: Option<i64>,
}

/// The main storage engine
///
/// ## Concurrency Model
///
/// - Each stream has a [`StreamGate`]:
///   - reads take it shared
///   - append / write / replace take it shared plus the stream's writer mutex
///   - reindex takes it exclusively, after in-flight operations drain
/// - Streams never contend with each other
/// - The current-file cache and the gate map belong to this instance only
pub struct LogEngine<R: Record = serde_json::Value> {
    /// Engine configuration
    config: Config,

    /// Per-stream file discovery, naming and rotation
    files: LogFileManager,

    /// stream id → gate
    gates: Mutex<HashMap<String, Arc<StreamGate>>>,

    /// Optional message time extractor (defaults to the record timestamp)
    message_time: Option<MessageTimeFn<R>>,
}

impl<R: Record> LogEngine<R> {
    /// Open or create an engine rooted at `config.base_dir`
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.base_dir).await?;

        info!(
            base_dir = %config.base_dir.display(),
            max_file_size = config.max_file_size,
            "opened log engine"
        );

        Ok(Self {
            files: LogFileManager::new(&config.base_dir, config.max_file_size),
            config,
            gates: Mutex::new(HashMap::new()),
            message_time: None,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified base directory
    pub async fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().base_dir(path).build()).await
    }

    /// Index message times with `extract` instead of the record timestamp
    pub fn with_message_time(mut self, extract: MessageTimeFn<R>) -> Self {
        self.message_time = Some(extract);
        self
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Append a record to the stream, rotating first if the current file
    /// has reached `max_file_size`. The first write creates the stream.
    #[instrument(skip(self, record))]
    pub async fn append_record(&self, stream: &str, record: &R) -> Result<IndexEntry> {
        let stream = checked_stream_id(stream)?;
        let gate = self.gate(&stream);
        let _access = gate.write().await;

        let (path, initial) = self.writable_file(&stream).await?;
        data_file::append(&path, record, initial, &self.write_context()).await
    }

    /// Truncate the current file to exactly this record
    #[instrument(skip(self, record))]
    pub async fn write_record(&self, stream: &str, record: &R) -> Result<IndexEntry> {
        let stream = checked_stream_id(stream)?;
        let gate = self.gate(&stream);
        let _access = gate.write().await;

        let path = self.files.resolve_current_file(&stream).await?;
        let initial = self.initial_header(&stream, &path).await?;
        data_file::overwrite(&path, record, initial, &self.write_context()).await
    }

    /// Replace the stream's last record. Record count is unchanged.
    ///
    /// Fails with `EmptyFile` when the stream has no records; no file is
    /// created in that case.
    #[instrument(skip(self, record))]
    pub async fn replace_last_record(&self, stream: &str, record: &R) -> Result<IndexEntry> {
        let stream = checked_stream_id(stream)?;
        let gate = self.gate(&stream);
        let _access = gate.write().await;

        let path = match self.files.current_file(&stream).await? {
            Some(path) => path,
            None => self.files.file_path_for_line(&stream, 1),
        };
        data_file::replace_last(&path, record, &self.write_context()).await
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Last record of the stream: one index seek plus one data read
    #[instrument(skip(self))]
    pub async fn read_last_record(&self, stream: &str) -> Result<Option<R>> {
        let stream = checked_stream_id(stream)?;
        let gate = self.gate(&stream);
        let _access = gate.read().await;

        let Some(current) = self.files.current_file(&stream).await? else {
            return Ok(None);
        };
        if let Some(record) = data_file::read_last(&current).await? {
            return Ok(Some(record));
        }

        // A freshly rotated file may not hold its first record yet
        match self.previous_file(&stream, &current).await? {
            Some(previous) => data_file::read_last(&previous).await,
            None => Ok(None),
        }
    }

    /// All records of the selected file(s); empty if nothing exists
    #[instrument(skip(self))]
    pub async fn read_records(&self, stream: &str, selector: FileSelector) -> Result<Vec<R>> {
        let stream = checked_stream_id(stream)?;
        let gate = self.gate(&stream);
        let _access = gate.read().await;

        let paths: Vec<PathBuf> = match selector {
            FileSelector::Current => self.files.current_file(&stream).await?.into_iter().collect(),
            FileSelector::Named(name) => vec![self.files.file_path(&stream, &name)],
            FileSelector::All => self.files.list_files(&stream).await?,
        };

        let mut records = Vec::new();
        for path in paths {
            records.extend(data_file::read_all::<R>(&path).await?);
        }
        Ok(records)
    }

    /// Records with global line numbers in `from..=to`.
    ///
    /// Files are pruned by their headers before any entry is read; inside
    /// an overlapping file only the matching window of entries is read.
    #[instrument(skip(self))]
    pub async fn read_from_line_range(&self, stream: &str, from: u64, to: u64) -> Result<Vec<R>> {
        let stream = checked_stream_id(stream)?;
        if to == 0 || from > to {
            return Ok(Vec::new());
        }
        let gate = self.gate(&stream);
        let _access = gate.read().await;

        let headers = self.file_headers(&stream).await?;
        let mut records = Vec::new();

        for (i, (path, header)) in headers.iter().enumerate() {
            if header.global_line_offset >= to {
                break;
            }
            // Highest line this file can hold: the next file's offset
            let upper = headers
                .get(i + 1)
                .map_or(u64::MAX, |(_, next)| next.global_line_offset);
            if upper < from {
                continue;
            }

            let first_slot = from.max(header.first_line_global()) - header.first_line_global();
            let last_line = to.min(upper);
            let count = (last_line - header.global_line_offset).saturating_sub(first_slot);

            let entries: Vec<IndexEntry> =
                index::read_index_entries(path, first_slot, Some(count))
                    .await?
                    .into_iter()
                    .filter(|e| e.line_number_global >= from && e.line_number_global <= to)
                    .collect();
            records.extend(data_file::read_entries::<R>(path, &entries).await?);
        }

        debug!(from, to, count = records.len(), "read line range");
        Ok(records)
    }

    /// Records whose indexed message time lies in `from_ms..=to_ms`, in
    /// stream order. Lines outside the window are never parsed.
    #[instrument(skip(self))]
    pub async fn read_from_time_range(
        &self,
        stream: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<R>> {
        let stream = checked_stream_id(stream)?;
        if from_ms > to_ms {
            return Ok(Vec::new());
        }
        let gate = self.gate(&stream);
        let _access = gate.read().await;

        let mut records = Vec::new();
        for path in self.files.list_files(&stream).await? {
            let entries: Vec<IndexEntry> = index::read_index_entries(&path, 0, None)
                .await?
                .into_iter()
                .filter(|e| e.message_time >= from_ms && e.message_time <= to_ms)
                .collect();

            // Matching entries may be sparse; read runs of adjacent lines together
            for run in contiguous_runs(&entries) {
                records.extend(data_file::read_entries::<R>(&path, run).await?);
            }
        }
        Ok(records)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Rebuild every index file of one stream from its data files
    #[instrument(skip(self))]
    pub async fn reindex_stream(&self, stream: &str) -> Result<ReindexStats> {
        let stream = checked_stream_id(stream)?;
        self.reindex_dir(&stream).await
    }

    /// Rebuild the indexes of every stream directory under the base
    /// directory, taken by their on-disk names.
    ///
    /// Each stream is exclusive for the duration of its own pass.
    #[instrument(skip(self))]
    pub async fn reindex_all(&self) -> Result<Vec<ReindexStats>> {
        let streams = self.files.list_streams().await?;
        info!(streams = streams.len(), "reindexing all streams");

        let mut all = Vec::with_capacity(streams.len());
        for dir in streams {
            all.push(self.reindex_dir(&dir).await?);
        }
        Ok(all)
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Stream directory names under the base directory
    pub async fn list_streams(&self) -> Result<Vec<String>> {
        self.files.list_streams().await
    }

    /// Data file names (32-digit stems) of the stream in order
    pub async fn list_files(&self, stream: &str) -> Result<Vec<String>> {
        let stream = checked_stream_id(stream)?;
        Ok(self
            .files
            .list_files(&stream)
            .await?
            .iter()
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect())
    }

    /// Header and entries of one data file's index
    pub async fn read_index(&self, stream: &str, file_name: &str) -> Result<Option<IndexData>> {
        let stream = checked_stream_id(stream)?;
        let gate = self.gate(&stream);
        let _access = gate.read().await;

        index::read_index(&self.files.file_path(&stream, file_name)).await
    }

    /// File count, record count, bytes and message time bounds
    pub async fn stream_stats(&self, stream: &str) -> Result<StreamStats> {
        let stream = checked_stream_id(stream)?;
        let gate = self.gate(&stream);
        let _access = gate.read().await;

        let files = self.files.list_files(&stream).await?;
        let mut stats = StreamStats {
            stream: stream.clone(),
            file_count: files.len(),
            ..StreamStats::default()
        };

        for path in &files {
            stats.record_count += index::index_entry_count(path).await?;
            stats.total_bytes += data_file::data_file_size(path).await?.unwrap_or(0);

            if stats.first_message_time.is_none() {
                stats.first_message_time =
                    index::read_index_entry(path, 0).await?.map(|e| e.message_time);
            }
            if let Some(last) = index::get_last_index_entry(path).await? {
                stats.last_message_time = Some(last.message_time);
            }
        }
        Ok(stats)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the base directory path
    pub fn base_dir(&self) -> &Path {
        &self.config.base_dir
    }

    /// Directory of a (normalized) stream
    pub fn stream_dir(&self, stream: &str) -> Result<PathBuf> {
        Ok(self.files.stream_dir(&checked_stream_id(stream)?))
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn gate(&self, stream: &str) -> Arc<StreamGate> {
        let mut gates = self.gates.lock();
        Arc::clone(gates.entry(stream.to_string()).or_default())
    }

    fn write_context(&self) -> WriteContext<'_, R> {
        WriteContext {
            sync: self.config.sync_strategy,
            message_time: self.message_time.as_ref(),
        }
    }

    /// Current file for an append, rotated if it has reached the threshold,
    /// plus the header a brand-new file should get
    async fn writable_file(&self, stream: &str) -> Result<(PathBuf, IndexHeader)> {
        let current = self.files.resolve_current_file(stream).await?;

        if !self.files.should_rotate(&current).await? {
            let initial = self.initial_header(stream, &current).await?;
            return Ok((current, initial));
        }

        let (next, header) = self.files.next_file(stream, &current).await?;
        self.files.set_current(stream, next.clone());
        Ok((next, header))
    }

    /// Header for `path` if its index does not exist yet
    async fn initial_header(&self, stream: &str, path: &Path) -> Result<IndexHeader> {
        if let Some(header) = index::read_index_header(path).await? {
            return Ok(header);
        }

        if data_file::data_file_size(path).await?.is_none() {
            info!(stream, path = %path.display(), "creating stream file");
        }
        Ok(IndexHeader::new(1, 0))
    }

    /// Each data file with its index header, in order; unindexed files are skipped
    async fn file_headers(&self, stream: &str) -> Result<Vec<(PathBuf, IndexHeader)>> {
        let mut headers = Vec::new();
        for path in self.files.list_files(stream).await? {
            if let Some(header) = index::read_index_header(&path).await? {
                headers.push((path, header));
            }
        }
        Ok(headers)
    }

    /// Reindex the directory `dir` exactly as named
    async fn reindex_dir(&self, dir: &str) -> Result<ReindexStats> {
        let gate = self.gate(dir);
        let _exclusive = gate.exclusive().await;

        let files = self.files.list_files(dir).await?;
        let options = ReindexOptions {
            chunk_size: self.config.reindex_chunk_size,
            sync: self.config.sync_strategy,
            message_time: self.message_time.as_ref(),
        };
        let stats = reindex_all_files(dir, &files, &options).await?;

        self.files.forget(dir);
        Ok(stats)
    }

    /// Newest data file named before `current`.
    ///
    /// `current` itself may have no data file yet (a rotation whose first
    /// append failed), so this compares names rather than positions.
    async fn previous_file(&self, stream: &str, current: &Path) -> Result<Option<PathBuf>> {
        let files = self.files.list_files(stream).await?;
        Ok(files.into_iter().rev().find(|p| p.as_path() < current))
    }
}

/// Split entries into runs of consecutive line numbers
fn contiguous_runs(entries: &[IndexEntry]) -> impl Iterator<Item = &[IndexEntry]> {
    entries.chunk_by(|a, b| b.line_number_local == a.line_number_local + 1)
}
