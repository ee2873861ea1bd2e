//! Testing utilities for sources and sinks.
//!
//! This module provides helpers used by the crate's own tests and available
//! to downstream code that builds on [`TextSource`](crate::TextSource):
//!
//! - **Fixtures**: files with known lines and line endings, glob patterns over
//!   several such files, and compressed file writers.
//! - **Assertions**: record comparisons that print mismatches as text.
//! - **Source checks**: split consistency, reentrant reads and concurrent
//!   splitting against an unsplit reference read.
//!
//! # Example
//!
//! ```no_run
//! use textshard::TextSource;
//! use textshard::testing::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let dir = tempfile::tempdir()?;
//! let (path, lines) = write_data(dir.path(), 10, &Eol::Mixed, b"line")?;
//!
//! let source = TextSource::builder(path.to_string_lossy()).build()?;
//! let bundles = source.split(u64::MAX)?;
//! assert_records_equal(&read_from_bundle(&source, &bundles[0])?, &lines);
//!
//! let stats = assert_split_at_fraction_exhaustive(&source, &bundles[0])?;
//! assert!(stats.accepted > 0);
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod fixtures;
pub mod sources;

pub use assertions::*;
pub use fixtures::*;
pub use sources::*;
