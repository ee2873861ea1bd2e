//! Buffered, escape-aware delimiter scanning.
//!
//! [`DelimiterScanner`] turns a byte stream into records. It never discards
//! bytes that could belong to a delimiter straddling a refill, treats a
//! delimiter truncated by end of stream as ordinary content, and honours an
//! optional escape byte: an odd run of escape bytes directly before a
//! delimiter makes that delimiter literal content (the escaping byte is
//! removed), an even run cancels out.
//!
//! Offsets reported in [`ScannedRecord`] are absolute positions in the
//! stream, counted from the offset the scanner was created at.

use super::delimiter::Delimiter;
use memchr::memmem::Finder;
use std::io::{self, Read};

/// Default refill size in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// How records are cut out of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    pub delimiter: Delimiter,
    pub escape: Option<u8>,
    /// Drop the matched delimiter from each record.
    pub strip_trailing_delimiter: bool,
    pub buffer_size: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            delimiter: Delimiter::newline(),
            escape: None,
            strip_trailing_delimiter: true,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// One record and where it sits in the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedRecord {
    pub bytes: Vec<u8>,
    /// Offset of the first byte of the record.
    pub start: u64,
    /// Offset just past the record's delimiter: where the next record starts.
    pub next_start: u64,
    /// False for a final fragment that ended at end of stream.
    pub terminated: bool,
}

#[derive(Debug)]
struct Separator {
    start: usize,
    end: usize,
    elided: Vec<usize>,
}

/// Lazy record reader over `R`.
pub struct DelimiterScanner<R> {
    reader: R,
    buf: Vec<u8>,
    pos: usize,
    base: u64,
    eof: bool,
    finder: Finder<'static>,
    delim_len: usize,
    newline: bool,
    escape: Option<u8>,
    strip: bool,
    buffer_size: usize,
}

impl<R: Read> DelimiterScanner<R> {
    /// Scan `reader`, whose first byte sits at absolute `offset`.
    pub fn new(reader: R, options: &ScanOptions, offset: u64) -> Self {
        let pattern = options.delimiter.pattern();
        Self {
            reader,
            buf: Vec::with_capacity(options.buffer_size.max(1) * 2),
            pos: 0,
            base: offset,
            eof: false,
            finder: Finder::new(pattern).into_owned(),
            delim_len: pattern.len(),
            newline: options.delimiter.is_newline(),
            escape: options.escape,
            strip: options.strip_trailing_delimiter,
            buffer_size: options.buffer_size.max(1),
        }
    }

    /// Absolute offset of the next unread byte.
    pub fn offset(&self) -> u64 {
        self.base + self.pos as u64
    }

    /// True when no bytes remain after [`offset`](Self::offset).
    ///
    /// Refills the buffer if needed, so a reader can ask before claiming a
    /// record that may not exist.
    pub fn at_end(&mut self) -> io::Result<bool> {
        if self.pos < self.buf.len() {
            return Ok(false);
        }
        if !self.eof {
            self.compact();
            self.fill()?;
        }
        Ok(self.pos >= self.buf.len())
    }

    /// Next record, or `None` at end of stream.
    ///
    /// # Errors
    ///
    /// Propagates read errors from the underlying stream, including
    /// decompression failures.
    pub fn next_record(&mut self) -> io::Result<Option<ScannedRecord>> {
        self.compact();
        let start = self.pos;
        let abs_start = self.offset();
        let (body_end, next, elided, terminated) = match self.find_separator()? {
            Some(sep) => {
                let body_end = if self.strip { sep.start } else { sep.end };
                (body_end, sep.end, sep.elided, true)
            }
            None if start == self.buf.len() => return Ok(None),
            None => (self.buf.len(), self.buf.len(), self.pending_elisions(start), false),
        };

        let mut bytes = Vec::with_capacity(body_end - start);
        let mut from = start;
        for e in elided {
            bytes.extend_from_slice(&self.buf[from..e]);
            from = e + 1;
        }
        bytes.extend_from_slice(&self.buf[from..body_end]);
        self.pos = next;

        Ok(Some(ScannedRecord {
            bytes,
            start: abs_start,
            next_start: self.offset(),
            terminated,
        }))
    }

    /// Advance to the first record boundary at or after `min_start`.
    ///
    /// Returns `false` when the stream ends first. The scanner must have been
    /// positioned so that any escape run affecting the first delimiter is in
    /// front of it.
    pub fn skip_to_record_start(&mut self, min_start: u64) -> io::Result<bool> {
        loop {
            self.compact();
            match self.find_separator()? {
                Some(sep) => {
                    self.pos = sep.end;
                    if self.offset() >= min_start {
                        return Ok(true);
                    }
                }
                None => {
                    self.pos = self.buf.len();
                    return Ok(false);
                }
            }
        }
    }

    fn compact(&mut self) {
        if self.pos >= self.buffer_size {
            self.buf.drain(..self.pos);
            self.base += self.pos as u64;
            self.pos = 0;
        }
    }

    fn fill(&mut self) -> io::Result<usize> {
        let old = self.buf.len();
        self.buf.resize(old + self.buffer_size, 0);
        loop {
            match self.reader.read(&mut self.buf[old..]) {
                Ok(n) => {
                    self.buf.truncate(old + n);
                    if n == 0 {
                        self.eof = true;
                    }
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.buf.truncate(old);
                    return Err(e);
                }
            }
        }
    }

    /// Find the next unescaped delimiter at or after `self.pos`, refilling as
    /// needed. Buffer indices stay valid until the next `compact`.
    fn find_separator(&mut self) -> io::Result<Option<Separator>> {
        let k = self.delim_len;
        let mut cursor = self.pos;
        let mut elided = Vec::new();
        loop {
            match self.finder.find(&self.buf[cursor..]) {
                Some(rel) => {
                    let idx = cursor + rel;
                    if self.is_escaped(idx) {
                        elided.push(idx - 1);
                        cursor = idx + k;
                        continue;
                    }
                    let start = if self.newline
                        && idx > self.pos
                        && self.buf[idx - 1] == b'\r'
                        && !self.is_escaped(idx - 1)
                    {
                        idx - 1
                    } else {
                        idx
                    };
                    return Ok(Some(Separator {
                        start,
                        end: idx + k,
                        elided,
                    }));
                }
                None if self.eof => return Ok(None),
                None => {
                    // Keep the last k-1 bytes searchable across the refill.
                    cursor = cursor.max(self.buf.len().saturating_sub(k - 1));
                    self.fill()?;
                }
            }
        }
    }

    /// Elisions inside an unterminated final fragment starting at `start`.
    fn pending_elisions(&self, start: usize) -> Vec<usize> {
        let k = self.delim_len;
        let mut out = Vec::new();
        let mut cursor = start;
        while let Some(rel) = self.finder.find(&self.buf[cursor..]) {
            let idx = cursor + rel;
            if self.is_escaped(idx) {
                out.push(idx - 1);
            }
            cursor = idx + k;
        }
        out
    }

    /// True if an odd run of escape bytes ends right before `idx`.
    fn is_escaped(&self, idx: usize) -> bool {
        let Some(e) = self.escape else {
            return false;
        };
        let run = self.buf[..idx].iter().rev().take_while(|&&b| b == e).count();
        run % 2 == 1
    }
}

impl<R: Read> Iterator for DelimiterScanner<R> {
    type Item = io::Result<ScannedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}
