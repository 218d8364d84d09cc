//! Tests for LogEngine writes, reads and inspection
//!
//! These tests verify:
//! - Stream creation on first append
//! - Global line numbering across rotation
//! - Current / named / all file reads
//! - Overwrite and replace-last semantics
//! - Stream id normalization
//! - Persistence across engine instances

use std::sync::Arc;

use marketlog::index::{self, IndexHeader, TimeSource};
use marketlog::log::format_file_name;
use marketlog::{Config, FileSelector, LogEngine, LogError};
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::common::{append_ticks, seq_of, setup_engine, tick, tick_line_len};

// =============================================================================
// Open Tests
// =============================================================================

#[tokio::test]
async fn test_open_creates_base_dir() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("data");

    let engine: LogEngine = LogEngine::open_path(&path).await.unwrap();

    assert!(path.is_dir());
    assert_eq!(engine.base_dir(), path.as_path());
    assert!(engine.list_streams().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_open_rejects_invalid_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .base_dir(temp_dir.path())
        .max_file_size(0)
        .build();

    let result = LogEngine::<Value>::open(config).await;
    assert!(matches!(result, Err(LogError::Config(_))));
}

// =============================================================================
// Append Tests
// =============================================================================

#[tokio::test]
async fn test_first_append_creates_stream() {
    let (temp, engine) = setup_engine(100).await;

    let entry = engine.append_record("btcusdt", &tick(1)).await.unwrap();

    assert_eq!(entry.line_number_local, 1);
    assert_eq!(entry.line_number_global, 1);
    assert_eq!(entry.start_byte, 0);
    assert_eq!(entry.end_byte, tick_line_len() - 1);

    let data = temp
        .path()
        .join("btcusdt")
        .join(format!("{}.jsonl", format_file_name(1)));
    assert!(data.exists());
    assert_eq!(
        index::read_index_header(&data).await.unwrap(),
        Some(IndexHeader::new(1, 0))
    );
}

#[tokio::test]
async fn test_three_appends_read_last() {
    let (_temp, engine) = setup_engine(100).await;

    for ts in [1000, 2000, 3000] {
        engine
            .append_record("trades", &json!({"timestamp": ts, "px": ts / 10}))
            .await
            .unwrap();
    }

    let last = engine.read_last_record("trades").await.unwrap().unwrap();
    assert_eq!(last["timestamp"], 3000);

    let name = &engine.list_files("trades").await.unwrap()[0];
    let data = engine.read_index("trades", name).await.unwrap().unwrap();
    let globals: Vec<u64> = data.entries.iter().map(|e| e.line_number_global).collect();
    assert_eq!(globals, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_rotation_keeps_global_numbering() {
    let (_temp, engine) = setup_engine(5).await;
    append_ticks(&engine, "s", 1..=23).await;

    let files = engine.list_files("s").await.unwrap();
    let expected: Vec<String> = [1, 6, 11, 16, 21].iter().map(|&n| format_file_name(n)).collect();
    assert_eq!(files, expected);

    let mut expected_global = 1u64;
    for (i, name) in files.iter().enumerate() {
        let data = engine.read_index("s", name).await.unwrap().unwrap();
        assert_eq!(data.header.file_number, i as u32 + 1);
        assert_eq!(data.header.global_line_offset, expected_global - 1);

        for (j, entry) in data.entries.iter().enumerate() {
            assert_eq!(entry.line_number_local, j as u32 + 1);
            assert_eq!(entry.line_number_global, expected_global);
            expected_global += 1;
        }
    }
    assert_eq!(expected_global, 24);
}

#[tokio::test]
async fn test_rotation_happens_on_next_append_after_threshold() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .base_dir(temp_dir.path())
        .max_file_size(tick_line_len())
        .build();
    let engine: LogEngine = LogEngine::open(config).await.unwrap();

    // Exactly reaches the threshold; stays in the first file
    engine.append_record("edge", &tick(1)).await.unwrap();
    assert_eq!(engine.list_files("edge").await.unwrap().len(), 1);

    let second = engine.append_record("edge", &tick(2)).await.unwrap();
    assert_eq!(
        engine.list_files("edge").await.unwrap(),
        vec![format_file_name(1), format_file_name(2)]
    );
    assert_eq!(second.line_number_local, 1);
    assert_eq!(second.line_number_global, 2);
}

#[tokio::test]
async fn test_concurrent_appends_are_serialized() {
    let (_temp, engine) = setup_engine(8).await;
    let engine = Arc::new(engine);

    let mut handles = Vec::new();
    for seq in 1..=40u64 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine.append_record("hot", &tick(seq)).await.unwrap()
        }));
    }

    let mut globals = Vec::new();
    for handle in handles {
        globals.push(handle.await.unwrap().line_number_global);
    }
    globals.sort_unstable();
    assert_eq!(globals, (1..=40).collect::<Vec<u64>>());

    let records = engine.read_records("hot", FileSelector::All).await.unwrap();
    assert_eq!(records.len(), 40);
    assert_eq!(engine.list_files("hot").await.unwrap().len(), 5);
}

// =============================================================================
// Read Tests
// =============================================================================

#[tokio::test]
async fn test_read_missing_stream() {
    let (_temp, engine) = setup_engine(5).await;

    assert_eq!(engine.read_last_record("ghost").await.unwrap(), None);
    assert!(engine
        .read_records("ghost", FileSelector::All)
        .await
        .unwrap()
        .is_empty());
    assert!(engine
        .read_records("ghost", FileSelector::Current)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_read_records_by_selector() {
    let (_temp, engine) = setup_engine(5).await;
    append_ticks(&engine, "s", 1..=12).await;

    let current = engine.read_records("s", FileSelector::Current).await.unwrap();
    assert_eq!(current.iter().map(seq_of).collect::<Vec<_>>(), vec![11, 12]);

    let named = engine
        .read_records("s", FileSelector::Named(format_file_name(6)))
        .await
        .unwrap();
    assert_eq!(named.iter().map(seq_of).collect::<Vec<_>>(), vec![6, 7, 8, 9, 10]);

    let all = engine.read_records("s", FileSelector::All).await.unwrap();
    assert_eq!(all.iter().map(seq_of).collect::<Vec<_>>(), (1..=12).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_read_last_after_rotation() {
    let (_temp, engine) = setup_engine(3).await;
    append_ticks(&engine, "s", 1..=7).await;

    let last = engine.read_last_record("s").await.unwrap().unwrap();
    assert_eq!(seq_of(&last), 7);
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .base_dir(temp_dir.path())
        .max_file_size(tick_line_len() * 4)
        .build();

    {
        let engine: LogEngine = LogEngine::open(config.clone()).await.unwrap();
        append_ticks(&engine, "s", 1..=6).await;
    }

    let engine: LogEngine = LogEngine::open(config).await.unwrap();
    let entry = engine.append_record("s", &tick(7)).await.unwrap();

    assert_eq!(entry.line_number_global, 7);
    assert_eq!(entry.line_number_local, 3);
    assert_eq!(seq_of(&engine.read_last_record("s").await.unwrap().unwrap()), 7);
}

#[tokio::test]
async fn test_engines_do_not_share_cache() {
    let temp_dir = TempDir::new().unwrap();
    let a: LogEngine = LogEngine::open_path(&temp_dir.path().join("a")).await.unwrap();
    let b: LogEngine = LogEngine::open_path(&temp_dir.path().join("b")).await.unwrap();

    a.append_record("s", &tick(1)).await.unwrap();

    assert_eq!(b.read_last_record("s").await.unwrap(), None);
    assert!(b.list_streams().await.unwrap().is_empty());
}

// =============================================================================
// Write / Replace Tests
// =============================================================================

#[tokio::test]
async fn test_write_record_truncates_current_file() {
    let (_temp, engine) = setup_engine(100).await;
    append_ticks(&engine, "snap", 1..=4).await;

    let entry = engine.write_record("snap", &tick(99)).await.unwrap();

    assert_eq!(entry.line_number_local, 1);
    assert_eq!(entry.line_number_global, 1);
    let records = engine.read_records("snap", FileSelector::Current).await.unwrap();
    assert_eq!(records, vec![tick(99)]);
}

#[tokio::test]
async fn test_write_record_on_fresh_stream() {
    let (_temp, engine) = setup_engine(100).await;

    engine.write_record("fresh", &tick(1)).await.unwrap();
    engine.append_record("fresh", &tick(2)).await.unwrap();

    let all = engine.read_records("fresh", FileSelector::All).await.unwrap();
    assert_eq!(all, vec![tick(1), tick(2)]);
}

#[tokio::test]
async fn test_replace_last_on_single_record_stream() {
    let (_temp, engine) = setup_engine(100).await;
    engine
        .append_record("book", &json!({"timestamp": 1, "bids": [[100.0, 1.0]]}))
        .await
        .unwrap();

    let replacement = json!({"timestamp": 2, "bids": [[101.5, 3.25], [101.0, 7.0]]});
    engine.replace_last_record("book", &replacement).await.unwrap();

    let records = engine.read_records("book", FileSelector::Current).await.unwrap();
    assert_eq!(records, vec![replacement.clone()]);

    let name = &engine.list_files("book").await.unwrap()[0];
    let data = engine.read_index("book", name).await.unwrap().unwrap();
    assert_eq!(data.entries.len(), 1);
    assert_eq!(data.entries[0].message_time, 2);

    let raw = std::fs::read_to_string(
        engine
            .stream_dir("book")
            .unwrap()
            .join(format!("{}.jsonl", name)),
    )
    .unwrap();
    assert_eq!(raw.lines().count(), 1);
}

#[tokio::test]
async fn test_replace_last_on_empty_stream() {
    let (_temp, engine) = setup_engine(100).await;

    let result = engine.replace_last_record("empty", &tick(1)).await;

    assert!(matches!(result, Err(LogError::EmptyFile(_))));
    assert!(!engine.stream_dir("empty").unwrap().exists());
}

#[tokio::test]
async fn test_replace_last_keeps_numbering() {
    let (_temp, engine) = setup_engine(3).await;
    append_ticks(&engine, "s", 1..=5).await;

    let entry = engine.replace_last_record("s", &tick(500)).await.unwrap();
    assert_eq!(entry.line_number_global, 5);

    let next = engine.append_record("s", &tick(6)).await.unwrap();
    assert_eq!(next.line_number_global, 6);

    let all = engine.read_records("s", FileSelector::All).await.unwrap();
    assert_eq!(all.iter().map(seq_of).collect::<Vec<_>>(), vec![1, 2, 3, 4, 500, 6]);
}

// =============================================================================
// Stream Id Tests
// =============================================================================

#[tokio::test]
async fn test_stream_ids_are_normalized() {
    let (temp, engine) = setup_engine(100).await;

    engine.append_record("Binance/BTC-USDT", &tick(1)).await.unwrap();
    engine.append_record("binance_btc_usdt", &tick(2)).await.unwrap();

    assert!(temp.path().join("binance_btc_usdt").is_dir());
    assert_eq!(engine.list_streams().await.unwrap(), vec!["binance_btc_usdt"]);
    assert_eq!(
        engine
            .read_records("BINANCE::btc::usdt", FileSelector::All)
            .await
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn test_invalid_stream_id() {
    let (_temp, engine) = setup_engine(100).await;

    let result = engine.append_record("@@@", &tick(1)).await;
    assert!(matches!(result, Err(LogError::InvalidStreamId(_))));
    assert!(engine.list_streams().await.unwrap().is_empty());
}

// =============================================================================
// Message Time / Stats Tests
// =============================================================================

#[tokio::test]
async fn test_message_time_extractor() {
    let temp_dir = TempDir::new().unwrap();
    let engine = LogEngine::<Value>::open_path(temp_dir.path())
        .await
        .unwrap()
        .with_message_time(Arc::new(|v: &Value| v["E"].as_i64().unwrap_or(0)));

    let entry = engine
        .append_record("depth", &json!({"timestamp": 10, "E": 12345}))
        .await
        .unwrap();

    assert_eq!(entry.message_time, 12345);
    assert_eq!(entry.time_source, TimeSource::Extracted);
}

#[tokio::test]
async fn test_stream_stats() {
    let (_temp, engine) = setup_engine(4).await;
    append_ticks(&engine, "s", 1..=10).await;

    let stats = engine.stream_stats("s").await.unwrap();

    assert_eq!(stats.stream, "s");
    assert_eq!(stats.file_count, 3);
    assert_eq!(stats.record_count, 10);
    assert_eq!(stats.total_bytes, tick_line_len() * 10);
    assert_eq!(stats.first_message_time, Some(tick(1)["timestamp"].as_i64().unwrap()));
    assert_eq!(stats.last_message_time, Some(tick(10)["timestamp"].as_i64().unwrap()));

    let empty = engine.stream_stats("none").await.unwrap();
    assert_eq!(empty.file_count, 0);
    assert_eq!(empty.first_message_time, None);
}

// =============================================================================
// Failed Rotation Tests
// =============================================================================

/// Record whose serialization can be made to fail
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
struct Flaky {
    timestamp: i64,
    fail: bool,
}

impl serde::Serialize for Flaky {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::{Error, SerializeStruct};

        if self.fail {
            return Err(S::Error::custom("refused"));
        }
        let mut state = serializer.serialize_struct("Flaky", 2)?;
        state.serialize_field("timestamp", &self.timestamp)?;
        state.serialize_field("fail", &self.fail)?;
        state.end()
    }
}

impl marketlog::Record for Flaky {
    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

#[tokio::test]
async fn test_read_last_after_failed_rotation() {
    let temp_dir = TempDir::new().unwrap();
    let ok = Flaky {
        timestamp: 1,
        fail: false,
    };
    let line_len = serde_json::to_vec(&ok).unwrap().len() as u64 + 1;
    let config = Config::builder()
        .base_dir(temp_dir.path())
        .max_file_size(line_len)
        .build();
    let engine: LogEngine<Flaky> = LogEngine::open(config).await.unwrap();

    engine.append_record("s", &ok).await.unwrap();

    // Rotates to file 2, then fails before any data is written
    let bad = Flaky {
        timestamp: 2,
        fail: true,
    };
    assert!(matches!(
        engine.append_record("s", &bad).await,
        Err(LogError::Serialization(_))
    ));
    assert_eq!(engine.list_files("s").await.unwrap(), vec![format_file_name(1)]);

    assert_eq!(engine.read_last_record("s").await.unwrap(), Some(ok.clone()));

    // The rotated file is still usable
    let next = Flaky {
        timestamp: 3,
        fail: false,
    };
    let entry = engine.append_record("s", &next).await.unwrap();
    assert_eq!(entry.line_number_global, 2);
    assert_eq!(engine.read_last_record("s").await.unwrap(), Some(next));
}
