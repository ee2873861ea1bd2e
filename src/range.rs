//! Byte ranges and the thread-safe tracker that drives dynamic rebalancing.
//!
//! An [`OffsetRange`] is a half-open `[start, stop)` window into one file's
//! *uncompressed* byte stream. Compressed files cannot be entered mid-stream,
//! so their ranges use [`UNBOUNDED`] as the stop and are never split.
//!
//! A [`RangeTracker`] is shared between exactly two roles:
//!
//! - the **reader**, which claims each record boundary through
//!   [`RangeTracker::try_claim`] before emitting the record, and
//! - the **rebalancer**, which may shrink the range from another thread via
//!   [`RangeTracker::try_split_at_fraction`].
//!
//! All state lives behind one mutex that is held only for the check-and-set,
//! never across I/O, so a split request cannot block on a disk read.
//!
//! # Example
//!
//! ```
//! use textshard::range::{OffsetRange, RangeTracker};
//!
//! let tracker = RangeTracker::new(OffsetRange::new(0, 100));
//! assert!(tracker.try_claim(0)?);
//! assert_eq!(tracker.try_split_at_fraction(0.5), Some(50));
//! assert!(tracker.try_claim(40)?);
//! assert!(!tracker.try_claim(50)?); // the residual owns offset 50 now
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Stop offset of a range whose length is unknown (compressed input).
pub const UNBOUNDED: u64 = u64::MAX;

/// Half-open byte interval `[start, stop)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OffsetRange {
    pub start: u64,
    pub stop: u64,
}

impl OffsetRange {
    /// Create a range. `start` must not exceed `stop`.
    pub fn new(start: u64, stop: u64) -> Self {
        debug_assert!(start <= stop, "range start {start} exceeds stop {stop}");
        Self { start, stop }
    }

    /// A range from `start` to the end of the stream, length unknown.
    pub fn unbounded(start: u64) -> Self {
        Self {
            start,
            stop: UNBOUNDED,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.stop == UNBOUNDED
    }

    /// Number of bytes covered, or `None` for unbounded ranges.
    pub fn len(&self) -> Option<u64> {
        (!self.is_unbounded()).then(|| self.stop - self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.stop
    }

    /// Partition into consecutive sub-ranges of roughly `desired` bytes.
    ///
    /// Each piece is `max(desired, min)` bytes. A tail shorter than
    /// `desired / 4` or `min` is folded into the piece before it rather than
    /// becoming a tiny bundle of its own. Unbounded ranges are returned whole.
    pub fn split(&self, desired: u64, min: u64) -> Vec<OffsetRange> {
        if self.is_unbounded() {
            return vec![*self];
        }
        let size = desired.max(min).max(1);
        let mut out = Vec::new();
        let mut cur = self.start;
        while cur < self.stop {
            let mut end = cur.saturating_add(size).min(self.stop);
            let remaining = self.stop - end;
            if remaining < desired / 4 || remaining < min {
                end = self.stop;
            }
            out.push(OffsetRange::new(cur, end));
            cur = end;
        }
        out
    }
}

impl fmt::Display for OffsetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unbounded() {
            write!(f, "[{}, +inf)", self.start)
        } else {
            write!(f, "[{}, {})", self.start, self.stop)
        }
    }
}

/// The two halves produced by a successful dynamic split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitResult {
    /// What the tracker still owns: `[start, split)`.
    pub primary: OffsetRange,
    /// What was handed off: `[split, old_stop)`.
    pub residual: OffsetRange,
}

/// Progress counters in units of split points (record boundaries).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitPointProgress {
    /// Split points fully consumed; the one currently being read is excluded.
    pub consumed: u64,
    /// Split points left including the current one; `None` when unknown.
    pub remaining: Option<u64>,
}

#[derive(Debug)]
struct TrackerState {
    start: u64,
    original_stop: u64,
    stop: u64,
    last_record_start: Option<u64>,
    next_record_start: Option<u64>,
    split_points_seen: u64,
    done: bool,
}

/// Tracks how much of one [`OffsetRange`] remains to be read.
#[derive(Debug)]
pub struct RangeTracker {
    state: Mutex<TrackerState>,
}

impl RangeTracker {
    pub fn new(range: OffsetRange) -> Self {
        Self {
            state: Mutex::new(TrackerState {
                start: range.start,
                original_stop: range.stop,
                stop: range.stop,
                last_record_start: None,
                next_record_start: None,
                split_points_seen: 0,
                done: false,
            }),
        }
    }

    // Tracker state stays consistent across a panicking holder: every
    // mutation is a plain field store.
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn start_position(&self) -> u64 {
        self.lock().start
    }

    /// Current (possibly shrunk) stop offset.
    pub fn stop_position(&self) -> u64 {
        self.lock().stop
    }

    /// Current `[start, stop)`.
    pub fn range(&self) -> OffsetRange {
        let s = self.lock();
        OffsetRange::new(s.start, s.stop)
    }

    pub fn last_record_start(&self) -> Option<u64> {
        self.lock().last_record_start
    }

    pub fn is_done(&self) -> bool {
        self.lock().done
    }

    /// Report a record boundary at `record_start`.
    ///
    /// Returns `Ok(false)` when `is_split_point` and the offset is at or past
    /// the stop position: the range is exhausted and the tracker is marked
    /// done. Otherwise the record is accepted.
    ///
    /// # Errors
    ///
    /// Protocol violations by the reader: a record before the range start, a
    /// first record that is not a split point, or offsets that move backwards.
    pub fn try_return_record_at(&self, is_split_point: bool, record_start: u64) -> Result<bool> {
        let mut s = self.lock();
        if s.done {
            return Ok(false);
        }
        if record_start < s.start {
            bail!(
                "record at offset {record_start} precedes range start {}",
                s.start
            );
        }
        match s.last_record_start {
            None if !is_split_point => {
                bail!("first record at offset {record_start} must be a split point")
            }
            Some(last) if record_start < last => {
                bail!("record at offset {record_start} precedes previous record at {last}")
            }
            Some(last) if record_start == last && is_split_point => {
                bail!("split point at offset {record_start} was already returned")
            }
            _ => {}
        }
        if is_split_point && record_start >= s.stop {
            s.done = true;
            return Ok(false);
        }
        s.last_record_start = Some(record_start);
        if is_split_point {
            s.split_points_seen += 1;
        }
        Ok(true)
    }

    /// Claim a split point; shorthand for `try_return_record_at(true, pos)`.
    pub fn try_claim(&self, record_start: u64) -> Result<bool> {
        self.try_return_record_at(true, record_start)
    }

    /// Tell the tracker where the record after the current one begins.
    ///
    /// Used only for split-point progress.
    pub fn set_next_record_start(&self, offset: u64) {
        self.lock().next_record_start = Some(offset);
    }

    /// Mark the range finished (end of stream reached).
    pub fn mark_done(&self) {
        self.lock().done = true;
    }

    /// Byte offset corresponding to `fraction` of the original range,
    /// rounded up to a whole byte.
    pub fn position_at_fraction(&self, fraction: f64) -> u64 {
        let s = self.lock();
        position_at(&s, fraction)
    }

    /// Shrink the range so it ends at `fraction` of the original range.
    ///
    /// Returns the new stop offset, or `None` if the split is refused.
    pub fn try_split_at_fraction(&self, fraction: f64) -> Option<u64> {
        self.try_split(fraction).map(|r| r.residual.start)
    }

    /// Like [`try_split_at_fraction`](Self::try_split_at_fraction), but returns
    /// both halves.
    ///
    /// Refused when the fraction is outside `(0, 1)`, the range is unbounded,
    /// the tracker is done, or the split offset would cut off an already
    /// returned record or not shrink the range.
    pub fn try_split(&self, fraction: f64) -> Option<SplitResult> {
        let mut s = self.lock();
        if !(fraction > 0.0 && fraction < 1.0) {
            debug!(fraction, "split refused: fraction outside (0, 1)");
            return None;
        }
        if s.original_stop == UNBOUNDED {
            debug!(fraction, "split refused: unbounded range");
            return None;
        }
        if s.done {
            debug!(fraction, "split refused: tracker done");
            return None;
        }
        let candidate = position_at(&s, fraction);
        if let Some(last) = s.last_record_start
            && candidate <= last
        {
            debug!(candidate, last, "split refused: at or before last returned record");
            return None;
        }
        if candidate >= s.stop {
            debug!(candidate, stop = s.stop, "split refused: does not shrink range");
            return None;
        }
        let residual = OffsetRange::new(candidate, s.stop);
        s.stop = candidate;
        debug!(start = s.start, candidate, residual = %residual, "split accepted");
        Some(SplitResult {
            primary: OffsetRange::new(s.start, candidate),
            residual,
        })
    }

    /// Fraction of the current range consumed, by last returned record start.
    ///
    /// Zero before the first record and for unbounded ranges (one once done).
    pub fn fraction_consumed(&self) -> f64 {
        let s = self.lock();
        if s.stop == UNBOUNDED {
            return if s.done { 1.0 } else { 0.0 };
        }
        let Some(last) = s.last_record_start else {
            return 0.0;
        };
        if s.stop <= s.start {
            return 1.0;
        }
        ((last - s.start) as f64 / (s.stop - s.start) as f64).clamp(0.0, 1.0)
    }

    /// Split points consumed and remaining.
    ///
    /// `remaining` is unknown while more record boundaries may lie inside the
    /// range, becomes `Some(1)` once the next record would start at or past the
    /// stop (the current record is the last), and `Some(0)` once done.
    pub fn split_points(&self) -> SplitPointProgress {
        let s = self.lock();
        let consumed = s.split_points_seen.saturating_sub(1);
        let remaining = if s.done {
            Some(0)
        } else {
            match s.next_record_start {
                Some(next) if s.last_record_start.is_some() && next >= s.stop => Some(1),
                _ => None,
            }
        };
        SplitPointProgress {
            consumed,
            remaining,
        }
    }
}

fn position_at(s: &TrackerState, fraction: f64) -> u64 {
    if s.original_stop == UNBOUNDED {
        return UNBOUNDED;
    }
    let span = (s.original_stop - s.start) as f64;
    s.start + (fraction * span).ceil() as u64
}
