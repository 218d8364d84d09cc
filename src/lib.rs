//! # marketlog
//!
//! An append-only, indexed JSONL log store for time-stamped records:
//! - Every data file carries a binary sidecar index (O(1) last-record reads)
//! - Self-rotating streams with stream-wide (global) line numbers
//! - Line range and time range reads that skip unrelated files
//! - Index rebuild purely from data files
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        LogEngine                            │
//! │          (per-stream gate: shared ops / reindex)            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ FileManager │          │  Reindexer  │
//!   │ (rotation)  │          │  (chunked)  │
//!   └──────┬──────┘          └──────┬──────┘
//!          │                        │
//!          ▼                        ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │  Data File  │─────────▶│    Index    │
//!   │   (JSONL)   │          │   (.idx)    │
//!   └─────────────┘          └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod index;
pub mod record;
pub mod log;
pub mod stream;
pub mod reindex;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{LogError, Result};
pub use config::{Config, SyncStrategy};
pub use engine::{FileSelector, LogEngine, StreamStats};
pub use index::{IndexEntry, IndexHeader, TimeSource};
pub use log::{FileInfo, NamedLog};
pub use record::{MessageTimeFn, Record, StorageRecord};
pub use reindex::ReindexStats;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of marketlog
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
