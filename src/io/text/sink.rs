//! Delimited text sink with sharding, rotation and windowed output.
//!
//! A [`TextSink`] writes records as `record + delimiter` into shard files
//! named `prefix + template + suffix`. The template is expanded per shard:
//!
//! | Token | Expands to |
//! |---|---|
//! | `S…` | shard index, zero-padded to the run length |
//! | `N…` | total shard count, zero-padded to the run length |
//! | `W…` | window as `[start_secs, end_secs)`, e.g. `[1614556800.0, 1614556805.0)` |
//! | `V…` | window as `[YYYY-MM-DDTHH-MM-SS, …)` in UTC |
//!
//! An empty template writes exactly one file named `prefix + suffix`.
//!
//! Shards are written to temporary files next to their destination and
//! renamed only once every shard of a write has been closed, because the
//! final shard count (the `N` in every name) is known only then.
//!
//! ```no_run
//! use textshard::io::text::TextSink;
//!
//! let sink = TextSink::builder("out/part")
//!     .file_name_suffix(".txt.gz")
//!     .max_records_per_shard(1_000_000)
//!     .header("id,name")
//!     .build()?;
//! let files = sink.write_all(["1,alice", "2,bob"])?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::error::TextIoError;
use crate::io::compression::{CompressionType, FinishWrite, wrap_writer};
use crate::window::{TimestampMs, Timestamped, Window};
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fs::{File, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tempfile::{NamedTempFile, TempPath};
use tracing::{debug, info, warn};

/// Template used when none is configured.
pub const DEFAULT_SHARD_NAME_TEMPLATE: &str = "-SSSSS-of-NNNNN";

/// Template used for windowed output when the configured one has no window token.
pub const DEFAULT_WINDOWED_SHARD_NAME_TEMPLATE: &str = "-W-SSSSS-of-NNNNN";

/// Serializable sink configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TextSinkOptions {
    pub file_name_suffix: String,
    /// `None` selects [`DEFAULT_SHARD_NAME_TEMPLATE`]; `Some("")` writes one
    /// unsharded file.
    pub shard_name_template: Option<String>,
    /// Fixed number of writers; `0` lets the data decide (one writer rotated
    /// by the thresholds).
    pub num_shards: usize,
    pub compression: CompressionType,
    /// Write the delimiter after every record, header and footer.
    pub append_trailing_newlines: bool,
    #[serde(deserialize_with = "deserialize_bytes")]
    pub delimiter: Vec<u8>,
    #[serde(deserialize_with = "deserialize_opt_bytes")]
    pub header: Option<Vec<u8>>,
    #[serde(deserialize_with = "deserialize_opt_bytes")]
    pub footer: Option<Vec<u8>>,
    pub max_records_per_shard: Option<u64>,
    /// Uncompressed bytes per shard, header and footer included.
    pub max_bytes_per_shard: Option<u64>,
    /// Produce no file at all when nothing was written.
    pub skip_if_empty: bool,
}

impl Default for TextSinkOptions {
    fn default() -> Self {
        Self {
            file_name_suffix: String::new(),
            shard_name_template: None,
            num_shards: 0,
            compression: CompressionType::Auto,
            append_trailing_newlines: true,
            delimiter: b"\n".to_vec(),
            header: None,
            footer: None,
            max_records_per_shard: None,
            max_bytes_per_shard: None,
            skip_if_empty: false,
        }
    }
}

impl TextSinkOptions {
    /// Parse options from JSON.
    ///
    /// # Errors
    /// Returns an error on malformed JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("parse text sink options")
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BytesRepr {
    Text(String),
    Bytes(Vec<u8>),
}

impl From<BytesRepr> for Vec<u8> {
    fn from(repr: BytesRepr) -> Self {
        match repr {
            BytesRepr::Text(s) => s.into_bytes(),
            BytesRepr::Bytes(b) => b,
        }
    }
}

fn deserialize_bytes<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
    BytesRepr::deserialize(d).map(Into::into)
}

fn deserialize_opt_bytes<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
    Option::<BytesRepr>::deserialize(d).map(|o| o.map(Into::into))
}

// ============================================================================
// Shard name templates
// ============================================================================

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("S+|N+|W+|V+").expect("valid shard token regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Index(usize),
    Count(usize),
    WindowSecs,
    WindowDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ShardNameTemplate {
    segments: Vec<Segment>,
}

impl ShardNameTemplate {
    fn parse(raw: &str) -> Self {
        let mut segments = Vec::new();
        let mut last = 0;
        for m in TOKEN.find_iter(raw) {
            if m.start() > last {
                segments.push(Segment::Literal(raw[last..m.start()].to_string()));
            }
            let width = m.len();
            segments.push(match raw.as_bytes()[m.start()] {
                b'S' => Segment::Index(width),
                b'N' => Segment::Count(width),
                b'W' => Segment::WindowSecs,
                _ => Segment::WindowDate,
            });
            last = m.end();
        }
        if last < raw.len() {
            segments.push(Segment::Literal(raw[last..].to_string()));
        }
        Self { segments }
    }

    fn has_index(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Index(_)))
    }

    fn has_window(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::WindowSecs | Segment::WindowDate))
    }

    fn render(&self, index: usize, count: usize, window: &Window) -> String {
        let mut out = String::new();
        for seg in &self.segments {
            match seg {
                Segment::Literal(s) => out.push_str(s),
                Segment::Index(width) => out.push_str(&format!("{index:0w$}", w = *width)),
                Segment::Count(width) => out.push_str(&format!("{count:0w$}", w = *width)),
                Segment::WindowSecs if !window.is_global() => out.push_str(&format!(
                    "[{:.1}, {:.1})",
                    window.start as f64 / 1000.0,
                    window.end as f64 / 1000.0
                )),
                Segment::WindowDate if !window.is_global() => out.push_str(&format!(
                    "[{}, {})",
                    render_instant(window.start),
                    render_instant(window.end)
                )),
                Segment::WindowSecs | Segment::WindowDate => {}
            }
        }
        out
    }
}

fn render_instant(ms: TimestampMs) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(ms).map_or_else(
        || ms.to_string(),
        |t| t.format("%Y-%m-%dT%H-%M-%S").to_string(),
    )
}

// ============================================================================
// Sink
// ============================================================================

/// A configured, validated text sink.
#[derive(Debug, Clone)]
pub struct TextSink {
    prefix: String,
    options: Arc<TextSinkOptions>,
    template: ShardNameTemplate,
}

impl TextSink {
    pub fn builder(file_path_prefix: impl Into<String>) -> TextSinkBuilder {
        TextSinkBuilder {
            prefix: file_path_prefix.into(),
            options: TextSinkOptions::default(),
        }
    }

    /// Build a sink from deserialized options.
    ///
    /// # Errors
    /// [`TextIoError::InvalidShardTemplate`] when the template has no `S` run
    /// but more than one shard could be produced, and
    /// [`TextIoError::EmptyDelimiter`] when trailing delimiters are enabled
    /// with an empty delimiter.
    pub fn from_options(file_path_prefix: impl Into<String>, options: TextSinkOptions) -> Result<Self> {
        let raw = options
            .shard_name_template
            .as_deref()
            .unwrap_or(DEFAULT_SHARD_NAME_TEMPLATE);
        let template = ShardNameTemplate::parse(raw);
        let may_rotate = options.max_records_per_shard.is_some() || options.max_bytes_per_shard.is_some();
        if !template.has_index() && (options.num_shards > 1 || may_rotate) {
            return Err(TextIoError::InvalidShardTemplate {
                template: raw.to_string(),
                reason: "a template without an S run can only name a single shard",
            }
            .into());
        }
        if options.append_trailing_newlines && options.delimiter.is_empty() {
            return Err(TextIoError::EmptyDelimiter.into());
        }
        Ok(Self {
            prefix: file_path_prefix.into(),
            options: Arc::new(options),
            template,
        })
    }

    pub fn options(&self) -> &TextSinkOptions {
        &self.options
    }

    /// Final path of shard `index` of `count` for `window`.
    pub fn shard_path(&self, window: &Window, index: usize, count: usize) -> PathBuf {
        self.pane_shard_path(window, 0, index, count)
    }

    /// Like [`shard_path`](Self::shard_path) for pane `pane` of `window`.
    ///
    /// Pane 0 keeps the plain name; later panes insert `-pane{pane}` after
    /// the prefix so repeated flushes of one window never collide.
    pub fn pane_shard_path(&self, window: &Window, pane: usize, index: usize, count: usize) -> PathBuf {
        let template = self.template_for(window);
        let tag = if pane == 0 {
            String::new()
        } else {
            format!("-pane{pane}")
        };
        PathBuf::from(format!(
            "{}{tag}{}{}",
            self.prefix,
            template.render(index, count, window),
            self.options.file_name_suffix
        ))
    }

    fn template_for(&self, window: &Window) -> &ShardNameTemplate {
        static WINDOWED: LazyLock<ShardNameTemplate> =
            LazyLock::new(|| ShardNameTemplate::parse(DEFAULT_WINDOWED_SHARD_NAME_TEMPLATE));
        if !window.is_global() && !self.template.has_window() {
            &WINDOWED
        } else {
            &self.template
        }
    }

    /// Codec for this sink's files, resolved against `prefix + suffix`.
    fn compression(&self) -> CompressionType {
        self.options
            .compression
            .resolve(format!("{}{}", self.prefix, self.options.file_name_suffix))
    }

    /// Open a single shard file at `path` and write the header.
    ///
    /// # Errors
    /// Fails if the file (or its parent directory) cannot be created.
    pub fn open(&self, path: impl AsRef<Path>) -> Result<SinkShard> {
        let path = path.as_ref();
        ensure_parent(path)?;
        let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let compression = self.options.compression.resolve(path);
        SinkShard::start(path.to_path_buf(), f, compression, Arc::clone(&self.options))
    }

    /// Write all records as one unwindowed batch and return the shard paths.
    ///
    /// # Errors
    /// Fails on any create, write, finish or rename error.
    pub fn write_all<I, B>(&self, records: I) -> Result<Vec<PathBuf>>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        self.write_window(&Window::GLOBAL, records)
    }

    /// Write all records of one window and return the shard paths.
    ///
    /// Records go round-robin to `max(num_shards, 1)` writers; a writer
    /// rotates to a new file when the next record would exceed a threshold.
    /// Without records this produces `max(num_shards, 1)` empty shards, or
    /// nothing when `skip_if_empty` is set.
    ///
    /// # Errors
    /// Fails on any create, write, finish or rename error.
    pub fn write_window<I, B>(&self, window: &Window, records: I) -> Result<Vec<PathBuf>>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        self.write_pane(window, 0, records)
    }

    /// Write one pane of `window`; see [`write_window`](Self::write_window).
    ///
    /// # Errors
    /// Fails on any create, write, finish or rename error.
    pub fn write_pane<I, B>(&self, window: &Window, pane: usize, records: I) -> Result<Vec<PathBuf>>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let dir = self
            .pane_shard_path(window, pane, 0, 1)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        create_dir_all(&dir).with_context(|| format!("mkdir -p {}", dir.display()))?;
        let compression = self.compression();

        let writers = self.options.num_shards.max(1);
        let mut lanes: Vec<Lane> = (0..writers).map(|_| Lane::default()).collect();
        let mut total = 0u64;
        for (i, record) in records.into_iter().enumerate() {
            let record = record.as_ref();
            let lane = &mut lanes[i % writers];
            if let Some(shard) = &lane.current
                && !shard.has_room_for(record.len())
            {
                lane.rotate()?;
            }
            if lane.current.is_none() {
                lane.current = Some(self.open_temp(&dir, compression)?);
            }
            if let Some(shard) = lane.current.as_mut() {
                shard.write_record(record)?;
                total += 1;
            }
        }

        if total == 0 && self.options.skip_if_empty {
            info!(prefix = %self.prefix, "no records; skipping empty output");
            return Ok(Vec::new());
        }

        let mut temps = Vec::new();
        for lane in &mut lanes {
            if lane.current.is_none() && lane.finished.is_empty() {
                lane.current = Some(self.open_temp(&dir, compression)?);
            }
            lane.rotate()?;
            temps.append(&mut lane.finished);
        }

        let count = temps.len();
        let mut paths = Vec::with_capacity(count);
        for (index, temp) in temps.into_iter().enumerate() {
            let path = self.pane_shard_path(window, pane, index, count);
            temp.persist(&path)
                .with_context(|| format!("rename shard to {}", path.display()))?;
            debug!(path = %path.display(), "published shard");
            paths.push(path);
        }
        info!(prefix = %self.prefix, shards = count, records = total, "text sink finalized");
        Ok(paths)
    }

    fn open_temp(&self, dir: &Path, compression: CompressionType) -> Result<TempShard> {
        let (f, temp) = NamedTempFile::new_in(dir)
            .with_context(|| format!("create temp shard in {}", dir.display()))?
            .into_parts();
        let shard = SinkShard::start(temp.to_path_buf(), f, compression, Arc::clone(&self.options))?;
        Ok(TempShard { shard, temp })
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
    }
    Ok(())
}

struct TempShard {
    shard: SinkShard,
    temp: TempPath,
}

impl TempShard {
    fn has_room_for(&self, len: usize) -> bool {
        self.shard.has_room_for(len)
    }

    fn write_record(&mut self, record: &[u8]) -> Result<()> {
        self.shard.write_record(record)
    }
}

#[derive(Default)]
struct Lane {
    current: Option<TempShard>,
    finished: Vec<TempPath>,
}

impl Lane {
    /// Close the open shard, if any.
    fn rotate(&mut self) -> Result<()> {
        if let Some(TempShard { shard, temp }) = self.current.take() {
            shard.close()?;
            self.finished.push(temp);
        }
        Ok(())
    }
}

/// An open output file.
///
/// The header is written when the shard is opened; [`close`](Self::close)
/// writes the footer and finishes the codec stream.
pub struct SinkShard {
    path: PathBuf,
    writer: Box<dyn FinishWrite>,
    options: Arc<TextSinkOptions>,
    records: u64,
    bytes: u64,
}

impl SinkShard {
    fn start(
        path: PathBuf,
        file: File,
        compression: CompressionType,
        options: Arc<TextSinkOptions>,
    ) -> Result<Self> {
        let writer = wrap_writer(file, compression, &path)?;
        let mut shard = Self {
            path,
            writer,
            options,
            records: 0,
            bytes: 0,
        };
        if let Some(header) = shard.options.header.clone() {
            shard.put_line(&header)?;
        }
        debug!(path = %shard.path.display(), codec = compression.name(), "opened shard");
        Ok(shard)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    /// Uncompressed bytes written so far, header included.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    fn line_len(&self, len: usize) -> u64 {
        let delim = if self.options.append_trailing_newlines {
            self.options.delimiter.len()
        } else {
            0
        };
        (len + delim) as u64
    }

    /// Whether one more record of `len` bytes fits under the thresholds.
    ///
    /// An empty shard always accepts a record, however large.
    pub fn has_room_for(&self, len: usize) -> bool {
        if self.records == 0 {
            return true;
        }
        if let Some(max) = self.options.max_records_per_shard
            && self.records + 1 > max
        {
            return false;
        }
        if let Some(max) = self.options.max_bytes_per_shard {
            let footer = self
                .options
                .footer
                .as_ref()
                .map_or(0, |f| self.line_len(f.len()));
            if self.bytes + self.line_len(len) + footer > max {
                return false;
            }
        }
        true
    }

    fn put_line(&mut self, line: &[u8]) -> Result<()> {
        self.writer
            .write_all(line)
            .with_context(|| format!("write {}", self.path.display()))?;
        if self.options.append_trailing_newlines {
            self.writer
                .write_all(&self.options.delimiter)
                .with_context(|| format!("write {}", self.path.display()))?;
        }
        self.bytes += self.line_len(line.len());
        Ok(())
    }

    /// Append one record (and the delimiter, if configured).
    ///
    /// # Errors
    /// Fails on a write error.
    pub fn write_record(&mut self, record: &[u8]) -> Result<()> {
        self.put_line(record)?;
        self.records += 1;
        Ok(())
    }

    /// Write the footer, flush and finish the codec stream.
    ///
    /// Returns the number of records written.
    ///
    /// # Errors
    /// Fails on a write or finish error.
    pub fn close(mut self) -> Result<u64> {
        if let Some(footer) = self.options.footer.clone() {
            self.put_line(&footer)?;
        }
        let path = self.path;
        self.writer
            .finish()
            .with_context(|| format!("finish {}", path.display()))?;
        debug!(path = %path.display(), records = self.records, bytes = self.bytes, "closed shard");
        Ok(self.records)
    }
}

/// Programmatic configuration for [`TextSink`].
pub struct TextSinkBuilder {
    prefix: String,
    options: TextSinkOptions,
}

impl TextSinkBuilder {
    /// Start from deserialized options; later calls override them.
    pub fn options(mut self, options: TextSinkOptions) -> Self {
        self.options = options;
        self
    }

    pub fn file_name_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.options.file_name_suffix = suffix.into();
        self
    }

    pub fn shard_name_template(mut self, template: impl Into<String>) -> Self {
        self.options.shard_name_template = Some(template.into());
        self
    }

    pub fn num_shards(mut self, n: usize) -> Self {
        self.options.num_shards = n;
        self
    }

    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.options.compression = compression;
        self
    }

    pub fn append_trailing_newlines(mut self, append: bool) -> Self {
        self.options.append_trailing_newlines = append;
        self
    }

    pub fn delimiter(mut self, delimiter: impl Into<Vec<u8>>) -> Self {
        self.options.delimiter = delimiter.into();
        self
    }

    pub fn header(mut self, header: impl Into<Vec<u8>>) -> Self {
        self.options.header = Some(header.into());
        self
    }

    pub fn footer(mut self, footer: impl Into<Vec<u8>>) -> Self {
        self.options.footer = Some(footer.into());
        self
    }

    pub fn max_records_per_shard(mut self, n: u64) -> Self {
        self.options.max_records_per_shard = Some(n);
        self
    }

    pub fn max_bytes_per_shard(mut self, n: u64) -> Self {
        self.options.max_bytes_per_shard = Some(n);
        self
    }

    pub fn skip_if_empty(mut self, skip: bool) -> Self {
        self.options.skip_if_empty = skip;
        self
    }

    /// Validate and build; see [`TextSink::from_options`].
    ///
    /// # Errors
    /// Same as [`TextSink::from_options`].
    pub fn build(self) -> Result<TextSink> {
        TextSink::from_options(self.prefix, self.options)
    }
}

// ============================================================================
// Windowed writer
// ============================================================================

/// Buffers timestamped records per fixed window and writes each window's
/// shards once the watermark passes the window end.
///
/// The window size is the explicit `window_size`, else the triggering
/// frequency, else everything lands in the global window and is written on
/// [`close`](Self::close). With both set, every frequency boundary the
/// watermark crosses also flushes the buffered records of still-open windows
/// as an early pane. Records for a window that was already closed are
/// dropped.
pub struct WindowedTextWriter {
    sink: TextSink,
    window_size_ms: Option<i64>,
    frequency_ms: Option<i64>,
    next_fire: Option<TimestampMs>,
    pending: BTreeMap<Window, Vec<Vec<u8>>>,
    panes: BTreeMap<Window, usize>,
    watermark: TimestampMs,
    written: Vec<PathBuf>,
}

fn duration_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX).max(1)
}

impl WindowedTextWriter {
    pub fn new(sink: TextSink, window_size: Option<Duration>, triggering_frequency: Option<Duration>) -> Self {
        let (window_size_ms, frequency_ms) = match (window_size, triggering_frequency) {
            (Some(size), freq) => (Some(duration_ms(size)), freq.map(duration_ms)),
            (None, freq) => (freq.map(duration_ms), None),
        };
        Self {
            sink,
            window_size_ms,
            frequency_ms,
            next_fire: None,
            pending: BTreeMap::new(),
            panes: BTreeMap::new(),
            watermark: TimestampMs::MIN,
            written: Vec::new(),
        }
    }

    /// Write `records` as the next pane of `window`.
    fn flush_pane(&mut self, window: Window, records: &[Vec<u8>]) -> Result<Vec<PathBuf>> {
        let pane = self.panes.entry(window).or_insert(0);
        let index = *pane;
        *pane += 1;
        self.sink.write_pane(&window, index, records)
    }

    /// True when `watermark` reached the next frequency boundary.
    fn frequency_fired(&mut self, watermark: TimestampMs) -> bool {
        let Some(freq) = self.frequency_ms else {
            return false;
        };
        let following = watermark
            .div_euclid(freq)
            .saturating_add(1)
            .saturating_mul(freq);
        match self.next_fire {
            Some(due) if watermark >= due => {
                self.next_fire = Some(following);
                true
            }
            Some(_) => false,
            None => {
                self.next_fire = Some(following);
                false
            }
        }
    }

    fn window_of(&self, ts: TimestampMs) -> Window {
        self.window_size_ms
            .map_or(Window::GLOBAL, |size| Window::tumble(ts, size, 0))
    }

    /// Buffer a record. Returns `false` if it was dropped as late.
    pub fn write(&mut self, record: Timestamped<Vec<u8>>) -> bool {
        let window = self.window_of(record.ts);
        if window.is_closed_by(self.watermark) {
            warn!(
                ts = record.ts,
                window_end = window.end,
                watermark = self.watermark,
                "dropping late record for an already written window"
            );
            return false;
        }
        self.pending.entry(window).or_default().push(record.value);
        true
    }

    /// Move the watermark forward and write every window it closes, plus an
    /// early pane for each open window when a frequency boundary is crossed.
    ///
    /// Returns the shard paths written by this call.
    ///
    /// # Errors
    /// Fails on any sink error.
    pub fn advance_watermark(&mut self, watermark: TimestampMs) -> Result<Vec<PathBuf>> {
        self.watermark = self.watermark.max(watermark);
        let fired = self.frequency_fired(self.watermark);
        let ready: Vec<Window> = self
            .pending
            .keys()
            .filter(|w| fired || w.is_closed_by(self.watermark))
            .copied()
            .collect();
        let mut out = Vec::new();
        for window in ready {
            if let Some(records) = self.pending.remove(&window) {
                debug!(start = window.start, end = window.end, records = records.len(), "flushing pane");
                out.extend(self.flush_pane(window, &records)?);
            }
        }
        self.panes.retain(|w, _| !w.is_closed_by(self.watermark));
        self.written.extend(out.iter().cloned());
        Ok(out)
    }

    /// Write all remaining windows and return every path this writer produced.
    ///
    /// With no records at all in the global window, this still produces the
    /// sink's usual empty output.
    ///
    /// # Errors
    /// Fails on any sink error.
    pub fn close(mut self) -> Result<Vec<PathBuf>> {
        if self.window_size_ms.is_none() && self.pending.is_empty() {
            self.pending.insert(Window::GLOBAL, Vec::new());
        }
        for (window, records) in std::mem::take(&mut self.pending) {
            let paths = self.flush_pane(window, &records)?;
            self.written.extend(paths);
        }
        Ok(self.written)
    }
}
