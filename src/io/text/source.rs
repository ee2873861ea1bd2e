//! Splittable text source: static bundles, range-bound readers, ReadAll.
//!
//! A [`TextSource`] matches a file pattern, cuts each matched file into
//! [`Bundle`]s and reads a bundle through a [`TextReader`]. Bundles over
//! uncompressed files are byte ranges that are **not** aligned to records:
//! a reader opened at a non-zero offset skips forward to the first record
//! boundary at or after its start, and the bundle that contains a record's
//! first byte is the one that emits it. Compressed files are always a single
//! unbounded bundle.
//!
//! While a reader is running, another thread can shrink its range through a
//! [`SplitHandle`] and receive the unread tail as a new bundle.
//!
//! # Examples
//!
//! ```no_run
//! use textshard::io::text::TextSource;
//!
//! let source = TextSource::builder("data/*.txt")
//!     .skip_header_lines(1)
//!     .build()?;
//! for bundle in source.split(64 * 1024 * 1024)? {
//!     for record in source.read(&bundle)? {
//!         let record = record?;
//!         // ...
//!     }
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

use super::delimiter::Delimiter;
use super::header::{HeaderConsumer, HeaderHandler, HeaderMatcher, HeaderResult};
use super::scanner::{DEFAULT_BUFFER_SIZE, DelimiterScanner, ScanOptions, ScannedRecord};
use crate::error::TextIoError;
use crate::io::compression::{CompressionType, open_reader};
use crate::io::glob::{FileMetadata, match_files, match_files_required};
use crate::range::{OffsetRange, RangeTracker};
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Serializable source configuration.
///
/// Every field has a default, so `{}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TextSourceOptions {
    /// Lower bound for static bundle sizes, in bytes.
    pub min_bundle_size: u64,
    pub compression: CompressionType,
    /// Remove the delimiter from each record.
    pub strip_trailing_newlines: bool,
    /// `None` means the default newline (LF or CRLF).
    pub delimiter: Option<Delimiter>,
    /// Single escape byte; written in JSON as a one-character string.
    #[serde(deserialize_with = "deserialize_escape")]
    pub escapechar: Option<u8>,
    /// Records dropped from the head of every file.
    pub skip_header_lines: usize,
    /// Refill size of the read buffer, at least 1.
    pub buffer_size: usize,
}

impl Default for TextSourceOptions {
    fn default() -> Self {
        Self {
            min_bundle_size: 0,
            compression: CompressionType::Auto,
            strip_trailing_newlines: true,
            delimiter: None,
            escapechar: None,
            skip_header_lines: 0,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl TextSourceOptions {
    /// Parse options from JSON.
    ///
    /// # Errors
    /// Returns an error on malformed JSON or an invalid delimiter.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("parse text source options")
    }

    fn validate(&self) -> Result<(), TextIoError> {
        if self.buffer_size == 0 {
            return Err(TextIoError::InvalidBufferSize);
        }
        self.delimiter
            .clone()
            .unwrap_or_default()
            .check_escape(self.escapechar)
    }

    fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            delimiter: self.delimiter.clone().unwrap_or_default(),
            escape: self.escapechar,
            strip_trailing_delimiter: self.strip_trailing_newlines,
            buffer_size: self.buffer_size,
        }
    }
}

fn deserialize_escape<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u8>, D::Error> {
    use serde::de::Error;
    match Option::<String>::deserialize(d)? {
        None => Ok(None),
        Some(s) if s.len() == 1 => Ok(Some(s.as_bytes()[0])),
        Some(s) => Err(D::Error::custom(format!(
            "escapechar must be a single byte, got {s:?}"
        ))),
    }
}

/// One unit of parallel read work: a byte range of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub path: PathBuf,
    pub range: OffsetRange,
    /// Resolved codec (never `Auto` for bundles produced by a source).
    pub compression: CompressionType,
}

impl Bundle {
    /// Whole-file bundle for a matched file.
    fn whole(file: &FileMetadata, compression: CompressionType) -> Self {
        let compression = compression.resolve(&file.path);
        let range = if compression.is_splittable() {
            OffsetRange::new(0, file.size)
        } else {
            OffsetRange::unbounded(0)
        };
        Self {
            path: file.path.clone(),
            range,
            compression,
        }
    }

    /// Same file and codec, different range.
    pub fn with_range(&self, range: OffsetRange) -> Self {
        Self {
            range,
            ..self.clone()
        }
    }

    pub fn is_splittable(&self) -> bool {
        self.compression.is_splittable() && !self.range.is_unbounded()
    }
}

/// A configured, validated text source over a file pattern.
#[derive(Debug, Clone)]
pub struct TextSource {
    pattern: String,
    options: TextSourceOptions,
    header: HeaderHandler,
}

impl TextSource {
    pub fn builder(pattern: impl Into<String>) -> TextSourceBuilder {
        TextSourceBuilder {
            pattern: pattern.into(),
            options: TextSourceOptions::default(),
            delimiter: None,
            processor: None,
        }
    }

    /// Build a source from deserialized options.
    ///
    /// # Errors
    /// Returns [`TextIoError`] (inside `anyhow`) for invalid settings.
    pub fn from_options(pattern: impl Into<String>, options: TextSourceOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            pattern: pattern.into(),
            header: HeaderHandler::new(options.skip_header_lines),
            options,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn options(&self) -> &TextSourceOptions {
        &self.options
    }

    /// Same settings over a different pattern.
    pub fn with_pattern(&self, pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ..self.clone()
        }
    }

    /// Cut every matched file into bundles of about `desired_bundle_size` bytes.
    ///
    /// Compressed files yield one unbounded bundle each; empty uncompressed
    /// files yield none.
    ///
    /// # Errors
    /// Fails if the pattern is invalid or matches no files.
    pub fn split(&self, desired_bundle_size: u64) -> Result<Vec<Bundle>> {
        let files = match_files_required(&self.pattern)?;
        let mut bundles = Vec::new();
        for file in &files {
            let whole = Bundle::whole(file, self.options.compression);
            if !whole.is_splittable() {
                bundles.push(whole);
                continue;
            }
            bundles.extend(
                whole
                    .range
                    .split(desired_bundle_size, self.options.min_bundle_size)
                    .into_iter()
                    .map(|r| whole.with_range(r)),
            );
        }
        debug!(
            pattern = %self.pattern,
            files = files.len(),
            bundles = bundles.len(),
            desired_bundle_size,
            "split text source"
        );
        Ok(bundles)
    }

    /// Open a reader bound to `bundle`.
    ///
    /// # Errors
    /// Fails if the file cannot be opened, seeked or decoded while locating
    /// the header or the first record boundary.
    pub fn read(&self, bundle: &Bundle) -> Result<TextReader> {
        let path = &bundle.path;
        let compression = bundle.compression.resolve(path);
        let scan = self.options.scan_options();
        let start = bundle.range.start;
        debug!(path = %path.display(), range = %bundle.range, codec = compression.name(), "open bundle");

        let mut header = None;
        let mut pending = None;
        let scanner = if self.header.is_active() {
            let mut scanner = DelimiterScanner::new(open_reader(path, compression)?, &scan, 0);
            let outcome = self
                .header
                .process(&mut scanner)
                .with_context(|| format!("read header of {}", path.display()))?;
            if start == 0 {
                self.header.deliver(&outcome.result);
            }
            if start <= outcome.result.end_offset {
                pending = outcome.pending;
                if start == 0 {
                    header = Some(outcome.result);
                }
                Some(scanner)
            } else {
                self.open_aligned(path, compression, start, &scan)?
            }
        } else if start == 0 {
            Some(DelimiterScanner::new(open_reader(path, compression)?, &scan, 0))
        } else {
            self.open_aligned(path, compression, start, &scan)?
        };

        Ok(TextReader {
            bundle: bundle.clone(),
            scanner,
            pending,
            tracker: Arc::new(RangeTracker::new(bundle.range)),
            header,
            finished: false,
        })
    }

    /// Scanner positioned at the first record boundary at or after `start`,
    /// or `None` if no record starts in `[start, EOF)`.
    fn open_aligned(
        &self,
        path: &Path,
        compression: CompressionType,
        start: u64,
        scan: &ScanOptions,
    ) -> Result<Option<RecordScanner>> {
        let mut scanner = if compression.is_splittable() {
            let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
            // A delimiter ending at or after `start` begins at or after `from`;
            // back up over escape bytes so its escape state is visible.
            let mut from = start.saturating_sub(scan.delimiter.pattern().len() as u64);
            if let Some(escape) = scan.escape {
                from = escape_run_start(&mut f, from, escape)
                    .with_context(|| format!("read {}", path.display()))?;
            }
            f.seek(SeekFrom::Start(from))
                .with_context(|| format!("seek {} to {from}", path.display()))?;
            DelimiterScanner::new(Box::new(f) as Box<dyn Read + Send>, scan, from)
        } else {
            DelimiterScanner::new(open_reader(path, compression)?, scan, 0)
        };
        let found = scanner
            .skip_to_record_start(start)
            .with_context(|| format!("read {}", path.display()))?;
        Ok(found.then_some(scanner))
    }

    /// Read one whole file.
    pub(crate) fn read_file(&self, file: &FileMetadata) -> Result<Vec<Vec<u8>>> {
        self.read(&Bundle::whole(file, self.options.compression))?
            .collect()
    }

    /// Read every matched file completely, in file order.
    ///
    /// Files that vanish between matching and opening are skipped with a
    /// warning.
    ///
    /// # Errors
    /// Fails on an invalid pattern, zero matches, or a read/decode error.
    pub fn read_all(&self) -> Result<Vec<Vec<u8>>> {
        Ok(self
            .read_all_with_filename()?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }

    /// [`read_all`](Self::read_all) decoded as UTF-8.
    ///
    /// # Errors
    /// Also fails if a record is not valid UTF-8.
    pub fn read_all_strings(&self) -> Result<Vec<String>> {
        self.read_all()?
            .into_iter()
            .map(|r| String::from_utf8(r).context("record is not valid UTF-8"))
            .collect()
    }

    /// [`read_all`](Self::read_all), pairing each record with its file.
    ///
    /// # Errors
    /// Same as [`read_all`](Self::read_all).
    pub fn read_all_with_filename(&self) -> Result<Vec<(PathBuf, Vec<u8>)>> {
        let mut out = Vec::new();
        for file in match_files_required(&self.pattern)? {
            if let Some(records) = skip_if_vanished(&file, self.read_file(&file))? {
                out.extend(records.into_iter().map(|r| (file.path.clone(), r)));
            }
        }
        Ok(out)
    }

    /// Split into bundles and read them on the rayon pool, keeping bundle
    /// order in the output.
    ///
    /// With `desired_bundle_size = None` the total input is divided into
    /// about two bundles per CPU.
    ///
    /// # Errors
    /// Fails on an invalid pattern, zero matches, or any bundle read error.
    ///
    /// # Feature
    /// Requires the `parallel-io` feature.
    #[cfg(feature = "parallel-io")]
    pub fn read_all_par(&self, desired_bundle_size: Option<u64>) -> Result<Vec<Vec<u8>>> {
        use rayon::prelude::*;
        let desired = match desired_bundle_size {
            Some(n) => n,
            None => {
                let total: u64 = match_files_required(&self.pattern)?
                    .iter()
                    .map(|f| f.size)
                    .sum();
                (total / (2 * num_cpus::get().max(1) as u64)).max(1)
            }
        };
        let bundles = self.split(desired)?;
        let parts: Vec<Vec<Vec<u8>>> = bundles
            .par_iter()
            .map(|b| self.read(b)?.collect::<Result<Vec<_>>>())
            .collect::<Result<_>>()?;
        Ok(parts.into_iter().flatten().collect())
    }
}

/// Read every file of every pattern with `source`'s settings.
///
/// Patterns that match nothing and files that vanish before they are opened
/// are skipped with a warning rather than failing the whole read.
///
/// # Errors
/// Fails on an invalid pattern or a read/decode error in an existing file.
pub fn read_all_from_patterns<P: AsRef<str>>(
    source: &TextSource,
    patterns: &[P],
) -> Result<Vec<(PathBuf, Vec<u8>)>> {
    let mut out = Vec::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        let files = match_files(pattern)?;
        if files.is_empty() {
            warn!(pattern, "pattern matched no files; skipping");
            continue;
        }
        for file in &files {
            if let Some(records) = skip_if_vanished(file, source.read_file(file))? {
                out.extend(records.into_iter().map(|r| (file.path.clone(), r)));
            }
        }
    }
    Ok(out)
}

fn skip_if_vanished<T>(file: &FileMetadata, result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(err)
            if err
                .downcast_ref::<io::Error>()
                .is_some_and(|e| e.kind() == io::ErrorKind::NotFound) =>
        {
            warn!(path = %file.path.display(), "file vanished before it was read; skipping");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Offset where the run of `escape` bytes ending right before `pos` begins.
fn escape_run_start(f: &mut File, pos: u64, escape: u8) -> io::Result<u64> {
    let mut chunk = [0u8; 64];
    let mut p = pos;
    while p > 0 {
        let n = (p as usize).min(chunk.len());
        f.seek(SeekFrom::Start(p - n as u64))?;
        f.read_exact(&mut chunk[..n])?;
        let run = chunk[..n].iter().rev().take_while(|&&b| b == escape).count();
        p -= run as u64;
        if run < n {
            break;
        }
    }
    Ok(p)
}

/// Programmatic configuration for [`TextSource`].
pub struct TextSourceBuilder {
    pattern: String,
    options: TextSourceOptions,
    delimiter: Option<Vec<u8>>,
    processor: Option<(HeaderMatcher, HeaderConsumer)>,
}

impl TextSourceBuilder {
    /// Start from deserialized options; later calls override them.
    pub fn options(mut self, options: TextSourceOptions) -> Self {
        self.options = options;
        self
    }

    pub fn min_bundle_size(mut self, bytes: u64) -> Self {
        self.options.min_bundle_size = bytes;
        self
    }

    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.options.compression = compression;
        self
    }

    pub fn strip_trailing_newlines(mut self, strip: bool) -> Self {
        self.options.strip_trailing_newlines = strip;
        self
    }

    /// Custom delimiter; validated by [`build`](Self::build).
    pub fn delimiter(mut self, delimiter: impl Into<Vec<u8>>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    pub fn escapechar(mut self, escape: u8) -> Self {
        self.options.escapechar = Some(escape);
        self
    }

    pub fn skip_header_lines(mut self, n: usize) -> Self {
        self.options.skip_header_lines = n;
        self
    }

    pub fn buffer_size(mut self, bytes: usize) -> Self {
        self.options.buffer_size = bytes;
        self
    }

    /// Send leading records accepted by `matcher` to `consumer` instead of
    /// the output. Runs after `skip_header_lines`.
    pub fn header_processor<M, C>(mut self, matcher: M, consumer: C) -> Self
    where
        M: Fn(&[u8]) -> bool + Send + Sync + 'static,
        C: Fn(&[Vec<u8>]) + Send + Sync + 'static,
    {
        self.processor = Some((Arc::new(matcher), Arc::new(consumer)));
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    /// Returns [`TextIoError`] (inside `anyhow`) for an empty or
    /// self-overlapping delimiter, an escape byte inside the delimiter, or a
    /// zero buffer size.
    pub fn build(self) -> Result<TextSource> {
        let mut options = self.options;
        if let Some(bytes) = self.delimiter {
            options.delimiter = Some(Delimiter::custom(bytes)?);
        }
        let mut source = TextSource::from_options(self.pattern, options)?;
        if let Some((matcher, consumer)) = self.processor {
            source.header = source.header.with_processor(matcher, consumer);
        }
        Ok(source)
    }
}

type RecordScanner = DelimiterScanner<Box<dyn Read + Send>>;

/// Iterator over the records of one bundle.
///
/// Each record boundary is claimed from the bundle's [`RangeTracker`] before
/// the record is read, so a concurrent split takes effect at the next record.
pub struct TextReader {
    bundle: Bundle,
    scanner: Option<RecordScanner>,
    pending: Option<ScannedRecord>,
    tracker: Arc<RangeTracker>,
    header: Option<HeaderResult>,
    finished: bool,
}

impl TextReader {
    pub fn bundle(&self) -> &Bundle {
        &self.bundle
    }

    /// Header lines, for the bundle starting at offset 0 of a file with a
    /// header processor or skipped lines.
    pub fn header(&self) -> Option<&HeaderResult> {
        self.header.as_ref()
    }

    pub fn tracker(&self) -> Arc<RangeTracker> {
        Arc::clone(&self.tracker)
    }

    /// A handle another thread can use to split this reader.
    pub fn split_handle(&self) -> SplitHandle {
        SplitHandle {
            bundle: self.bundle.clone(),
            tracker: self.tracker(),
        }
    }

    /// Shrink this reader's range; see [`SplitHandle::try_split_at_fraction`].
    pub fn split_at_fraction(&self, fraction: f64) -> Option<Bundle> {
        self.split_handle().try_split_at_fraction(fraction)
    }

    pub fn fraction_consumed(&self) -> f64 {
        self.tracker.fraction_consumed()
    }

    fn advance(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(scanner) = self.scanner.as_mut() else {
            self.tracker.mark_done();
            return Ok(None);
        };
        let start = match &self.pending {
            Some(record) => record.start,
            None => {
                let at_end = scanner
                    .at_end()
                    .with_context(|| format!("read {}", self.bundle.path.display()))?;
                if at_end {
                    self.tracker.mark_done();
                    return Ok(None);
                }
                scanner.offset()
            }
        };
        if !self.tracker.try_claim(start)? {
            return Ok(None);
        }
        let record = match self.pending.take() {
            Some(record) => Some(record),
            None => scanner
                .next_record()
                .with_context(|| format!("read {}", self.bundle.path.display()))?,
        };
        let Some(record) = record else {
            self.tracker.mark_done();
            return Ok(None);
        };
        self.tracker.set_next_record_start(record.next_start);
        Ok(Some(record.bytes))
    }
}

impl Iterator for TextReader {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let out = self.advance().transpose();
        if !matches!(out, Some(Ok(_))) {
            self.finished = true;
        }
        out
    }
}

/// Thread-safe handle for dynamically splitting a running [`TextReader`].
#[derive(Debug, Clone)]
pub struct SplitHandle {
    bundle: Bundle,
    tracker: Arc<RangeTracker>,
}

impl SplitHandle {
    /// Shrink the reader's range at `fraction` of its original size and
    /// return the unread tail as a new bundle, or `None` if refused.
    pub fn try_split_at_fraction(&self, fraction: f64) -> Option<Bundle> {
        self.tracker
            .try_split(fraction)
            .map(|split| self.bundle.with_range(split.residual))
    }
}
