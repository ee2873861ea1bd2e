//! Delimited text: splittable reading, sharded writing and pattern watching.
//!
//! - [`TextSource`] / [`TextReader`] - bundle splitting and range-bound reads
//! - [`TextSink`] / [`SinkShard`] / [`WindowedTextWriter`] - sharded output
//! - [`DelimiterScanner`] - the record scanner underneath the source
//! - [`FileWatcher`] / [`watch_and_read`] - continuous pattern polling

pub mod delimiter;
pub mod header;
pub mod scanner;
pub mod sink;
pub mod source;
pub mod watch;

pub use delimiter::Delimiter;
pub use header::{HeaderConsumer, HeaderHandler, HeaderMatcher, HeaderResult};
pub use scanner::{DelimiterScanner, ScanOptions, ScannedRecord};
pub use sink::{SinkShard, TextSink, TextSinkBuilder, TextSinkOptions, WindowedTextWriter};
pub use source::{
    Bundle, SplitHandle, TextReader, TextSource, TextSourceBuilder, TextSourceOptions,
    read_all_from_patterns,
};
pub use watch::{FileWatcher, WatchOptions, watch_and_read};
