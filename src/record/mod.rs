//! Record Module
//!
//! What gets stored: any serde type carrying a caller-assigned `timestamp`.
//!
//! ## Responsibilities
//! - `Record` trait: JSON (de)serialization + default message time
//! - `StorageRecord<T>`: `{ timestamp, ...payload }` wrapper
//! - Message time resolution (own timestamp vs. caller extractor)
//! - Line serialization with UTF-8 byte accounting (see [`serializer`])

pub mod serializer;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::index::TimeSource;

pub use serializer::{
    parse_record, serialize_record, serialize_records, ByteRange, LineScanner, ScannedLine,
    SerializedBatch,
};

/// A record that can be appended to a log
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    /// Caller-assigned time (unix millis), used when no extractor is set
    fn timestamp(&self) -> i64;
}

/// Caller-supplied message time extractor
pub type MessageTimeFn<R> = Arc<dyn Fn(&R) -> i64 + Send + Sync>;

/// Generic `{ timestamp, ...payload }` record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageRecord<T> {
    pub timestamp: i64,
    #[serde(flatten)]
    pub payload: T,
}

impl<T> StorageRecord<T> {
    pub fn new(timestamp: i64, payload: T) -> Self {
        Self { timestamp, payload }
    }
}

impl<T> Record for StorageRecord<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// Untyped records: `timestamp` is read from the top-level object.
/// Floats are truncated; a missing or non-numeric field reads as 0.
impl Record for serde_json::Value {
    fn timestamp(&self) -> i64 {
        match self.get("timestamp") {
            Some(value) => value
                .as_i64()
                .or_else(|| value.as_f64().map(|f| f as i64))
                .unwrap_or(0),
            None => 0,
        }
    }
}

/// Message time for `record` and where it came from
pub fn resolve_message_time<R: Record>(
    record: &R,
    extractor: Option<&MessageTimeFn<R>>,
) -> (i64, TimeSource) {
    match extractor {
        Some(extract) => (extract(record), TimeSource::Extracted),
        None => (record.timestamp(), TimeSource::Created),
    }
}
