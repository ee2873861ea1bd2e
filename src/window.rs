//! Event-time windows for windowed text output.
//!
//! Timestamps are milliseconds since the UNIX epoch. A [`Window`] is the
//! half-open interval `[start, end)`; [`Window::GLOBAL`] covers all time and
//! is what unwindowed writes use.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Milliseconds since UNIX epoch (UTC).
pub type TimestampMs = i64;

/// A closed-open time range: [start, end).
#[derive(Copy, Clone, Debug, Serialize, Deserialize, Eq)]
pub struct Window {
    pub start: TimestampMs,
    pub end: TimestampMs,
}

impl Window {
    /// The single window spanning all of time.
    pub const GLOBAL: Window = Window {
        start: TimestampMs::MIN,
        end: TimestampMs::MAX,
    };

    #[inline]
    pub fn new(start: TimestampMs, end: TimestampMs) -> Self {
        debug_assert!(end >= start);
        Self { start, end }
    }

    /// The fixed window of `size_ms` containing `ts`, aligned to `offset_ms`.
    #[inline]
    pub fn tumble(ts: TimestampMs, size_ms: i64, offset_ms: i64) -> Self {
        debug_assert!(size_ms > 0);
        let k = div_floor(ts - offset_ms, size_ms);
        let start = k * size_ms + offset_ms;
        Self {
            start,
            end: start + size_ms,
        }
    }

    #[inline]
    pub fn is_global(&self) -> bool {
        *self == Self::GLOBAL
    }

    #[inline]
    pub fn contains(&self, ts: TimestampMs) -> bool {
        self.start <= ts && ts < self.end
    }

    /// True once a watermark at `watermark` guarantees no more on-time data.
    #[inline]
    pub fn is_closed_by(&self, watermark: TimestampMs) -> bool {
        !self.is_global() && watermark >= self.end
    }
}

/// Floor division for i64 (unlike `/` which truncates toward zero).
#[inline]
fn div_floor(a: i64, b: i64) -> i64 {
    let q = a / b;
    let r = a % b;
    if (r != 0) && ((r > 0) != (b > 0)) { q - 1 } else { q }
}

// Hash/Ord so windows can key a BTreeMap of pending shards.
impl PartialEq for Window {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.end == other.end
    }
}
impl Hash for Window {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.start.hash(state);
        self.end.hash(state);
    }
}
impl Ord for Window {
    #[inline]
    fn cmp(&self, o: &Self) -> Ordering {
        self.start.cmp(&o.start).then(self.end.cmp(&o.end))
    }
}
impl PartialOrd for Window {
    #[inline]
    fn partial_cmp(&self, o: &Self) -> Option<Ordering> {
        Some(self.cmp(o))
    }
}

/// A timestamped element (event-time semantics).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Timestamped<T> {
    pub ts: TimestampMs,
    pub value: T,
}

impl<T> Timestamped<T> {
    #[inline]
    pub fn new(ts: TimestampMs, value: T) -> Self {
        Self { ts, value }
    }
}
