//! Header extraction ahead of the first data record.
//!
//! A [`HeaderHandler`] first discards `skip_lines` records, then feeds the
//! following records to an optional matcher. Matched records are header
//! lines; the first non-matching record is the first data record and ends
//! header processing for good.

use super::scanner::{DelimiterScanner, ScannedRecord};
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;

/// Decides whether a record is a header line.
pub type HeaderMatcher = Arc<dyn Fn(&[u8]) -> bool + Send + Sync>;

/// Receives the header lines of a file (once per file, from the bundle that
/// starts at offset 0).
pub type HeaderConsumer = Arc<dyn Fn(&[Vec<u8>]) + Send + Sync>;

/// Header lines extracted from the head of a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderResult {
    /// Matched header lines, in file order. Skipped lines are not included.
    pub lines: Vec<Vec<u8>>,
    /// Offset where the first data record starts.
    pub end_offset: u64,
}

pub(crate) struct HeaderOutcome {
    pub result: HeaderResult,
    /// The record that ended matching; it is the first data record.
    pub pending: Option<ScannedRecord>,
}

#[derive(Clone, Default)]
pub struct HeaderHandler {
    skip_lines: usize,
    processor: Option<(HeaderMatcher, HeaderConsumer)>,
}

impl fmt::Debug for HeaderHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderHandler")
            .field("skip_lines", &self.skip_lines)
            .field("processor", &self.processor.is_some())
            .finish()
    }
}

impl HeaderHandler {
    pub fn new(skip_lines: usize) -> Self {
        Self {
            skip_lines,
            processor: None,
        }
    }

    /// Route records accepted by `matcher` to `consumer`.
    pub fn with_processor(mut self, matcher: HeaderMatcher, consumer: HeaderConsumer) -> Self {
        self.processor = Some((matcher, consumer));
        self
    }

    pub fn skip_lines(&self) -> usize {
        self.skip_lines
    }

    /// True when there is anything to do before the first data record.
    pub fn is_active(&self) -> bool {
        self.skip_lines > 0 || self.processor.is_some()
    }

    /// Consume the header from a scanner positioned at offset 0.
    pub(crate) fn process<R: Read>(
        &self,
        scanner: &mut DelimiterScanner<R>,
    ) -> io::Result<HeaderOutcome> {
        for _ in 0..self.skip_lines {
            if scanner.next_record()?.is_none() {
                break;
            }
        }

        let mut lines = Vec::new();
        let mut pending = None;
        if let Some((matcher, _)) = &self.processor {
            while let Some(record) = scanner.next_record()? {
                if matcher(&record.bytes) {
                    lines.push(record.bytes);
                } else {
                    pending = Some(record);
                    break;
                }
            }
        }

        let end_offset = pending
            .as_ref()
            .map_or_else(|| scanner.offset(), |r: &ScannedRecord| r.start);
        Ok(HeaderOutcome {
            result: HeaderResult { lines, end_offset },
            pending,
        })
    }

    /// Hand header lines to the consumer, if one is configured.
    pub(crate) fn deliver(&self, result: &HeaderResult) {
        if let Some((_, consumer)) = &self.processor {
            consumer(&result.lines);
        }
    }
}
