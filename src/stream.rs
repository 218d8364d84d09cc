//! Stream identity and per-stream gating.

use tokio::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{LogError, Result};

/// Normalize a caller-supplied stream id into a safe directory name.
///
/// Lowercases, maps everything outside `[a-z0-9_]` to `_`, collapses runs
/// of `_` and trims them from both ends: `"Kraken::OrderBook"` →
/// `"kraken_orderbook"`.
pub fn normalize_stream_id(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());

    for c in raw.chars().flat_map(char::to_lowercase) {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
            c
        } else {
            '_'
        };
        if c == '_' && (out.is_empty() || out.ends_with('_')) {
            continue;
        }
        out.push(c);
    }

    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Normalized id, or `InvalidStreamId` if nothing usable is left
pub fn checked_stream_id(raw: &str) -> Result<String> {
    let id = normalize_stream_id(raw);
    if id.is_empty() {
        return Err(LogError::InvalidStreamId(raw.to_string()));
    }
    Ok(id)
}

/// Access gate for one stream
///
/// - `maintenance`: shared by every ordinary operation, exclusive for
///   reindex. Reindex waits for in-flight operations to drain and blocks
///   new ones until it finishes.
/// - `writer`: serializes mutating operations so byte offsets computed
///   from the file length cannot race.
#[derive(Debug, Default)]
pub struct StreamGate {
    maintenance: RwLock<()>,
    writer: Mutex<()>,
}

/// Held for the duration of an ordinary read
pub struct ReadAccess<'a> {
    _maintenance: RwLockReadGuard<'a, ()>,
}

/// Held for the duration of an append / write / replace
pub struct WriteAccess<'a> {
    _maintenance: RwLockReadGuard<'a, ()>,
    _writer: MutexGuard<'a, ()>,
}

impl StreamGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn read(&self) -> ReadAccess<'_> {
        ReadAccess {
            _maintenance: self.maintenance.read().await,
        }
    }

    pub async fn write(&self) -> WriteAccess<'_> {
        let maintenance = self.maintenance.read().await;
        let writer = self.writer.lock().await;
        WriteAccess {
            _maintenance: maintenance,
            _writer: writer,
        }
    }

    pub async fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.maintenance.write().await
    }
}
