//! Log Module
//!
//! JSONL data files and the capabilities built on them.
//!
//! ## Capability levels
//! - [`NamedLog`]: caller controls each file's relative path
//! - [`LogFileManager`] + [`crate::LogEngine`]: self-rotating streams whose
//!   files are named by the global line index of their first record
//!
//! ## On-disk layout
//! ```text
//! {base}/{stream}/00000000000000000000000000000001.jsonl      data
//! {base}/{stream}/00000000000000000000000000000001.jsonl.idx  sidecar index
//! {base}/{stream}/00000000000000000000000000082572.jsonl      next file
//! ```

pub(crate) mod data_file;
mod manager;
mod named;

pub use manager::{
    format_file_name, parse_data_file_name, parse_file_name, LogFileManager, DATA_EXTENSION,
    FILE_NAME_DIGITS,
};
pub use named::{FileInfo, NamedLog};
