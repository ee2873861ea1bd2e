//! # Textshard
//!
//! A **splittable, compression-transparent reader and writer** for delimited
//! text records, in the style of Apache Beam's text connector. Textshard cuts
//! files into byte-range bundles that can be read independently and in
//! parallel, lets a running read hand off its unread tail to another worker,
//! and writes records into sharded, optionally compressed output files.
//!
//! ## Key Features
//!
//! - **Unaligned byte-range bundles** - every record is read exactly once,
//!   whatever the cut points
//! - **Dynamic work rebalancing** - split a running reader at a fraction of its range
//! - **Custom delimiters and escapes** - multi-byte delimiters, one-byte escape character
//! - **Headers** - skip leading lines or match and deliver a header block
//! - **Transparent compression** - gzip, deflate, bzip2, zstd and xz, detected by suffix
//! - **Sharded sinks** - shard name templates, record/byte thresholds, header and footer
//! - **Windowed writes** - one set of shards per event-time window
//! - **Pattern watching** - poll a glob and read new or updated files
//!
//! ## Quick Start
//!
//! ```no_run
//! use textshard::*;
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let source = TextSource::builder("logs/*.txt.gz").build()?;
//! let lines = source.read_all_strings()?;
//!
//! let sink = TextSink::builder("out/lines")
//!     .file_name_suffix(".txt")
//!     .num_shards(4)
//!     .build()?;
//! let written = sink.write_all(lines.iter().map(String::as_bytes))?;
//! assert_eq!(written.len(), 4);
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Bundles and range tracking
//!
//! [`TextSource::split`] turns each matched file into [`Bundle`]s: byte
//! ranges over uncompressed files, or one unbounded bundle per compressed
//! file. A record belongs to the bundle that contains its first byte, so a
//! reader skips forward to the first record boundary at or after its start
//! and may read past its stop to finish the last record it owns.
//!
//! Each [`TextReader`] is driven by a [`RangeTracker`], which claims record
//! starts and arbitrates concurrent split requests issued through a
//! [`SplitHandle`].
//!
//! ### Scanning
//!
//! The [`DelimiterScanner`] finds record boundaries over any byte stream,
//! treating `\n` and `\r\n` as the default separator, or a
//! configured multi-byte [`Delimiter`]. An escape byte protects a following
//! delimiter from acting as a separator.
//!
//! ### Sinks
//!
//! A [`TextSink`] writes records into shards named by a template such as
//! `-SSSSS-of-NNNNN`, rotating to a new shard when a record or byte limit is
//! reached. Shards are written to temporary files and renamed into place once
//! the shard count is known.
//!
//! ## Feature Flags
//!
//! - `compression-gzip` - gzip and deflate (zlib) codecs
//! - `compression-zstd` - Zstandard codec
//! - `compression-bzip2` - bzip2 codec
//! - `compression-xz` - xz codec
//! - `parallel-io` - [`TextSource::read_all_par`] on Rayon
//!
//! All features are enabled by default. Selecting a codec whose feature is
//! disabled fails with [`TextIoError::CodecUnavailable`].
//!
//! ## Module Overview
//!
//! - [`range`] - Offset ranges and the thread-safe range tracker
//! - [`io`] - Compression, glob matching, and the text source/sink
//! - [`window`] - Event-time windows for windowed writes
//! - [`error`] - Configuration errors
//! - [`testing`] - Fixtures and split-consistency assertions

pub mod error;
pub mod io;
pub mod range;
pub mod testing;
pub mod window;

pub use error::TextIoError;
pub use io::compression::CompressionType;
pub use io::glob::FileMetadata;
pub use io::text::{
    Bundle, Delimiter, DelimiterScanner, FileWatcher, HeaderHandler, HeaderResult, SinkShard,
    SplitHandle, TextReader, TextSink, TextSinkOptions, TextSource, TextSourceOptions,
    WatchOptions, WindowedTextWriter, read_all_from_patterns, watch_and_read,
};
pub use range::{OffsetRange, RangeTracker, SplitPointProgress, SplitResult};
pub use window::{TimestampMs, Timestamped, Window};
