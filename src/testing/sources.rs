//! Correctness checks for splittable sources.
//!
//! The central property: reading a bundle once, or reading it partly, splitting
//! it at any fraction and reading both halves, must produce the same records
//! in the same order.

use crate::io::text::{Bundle, TextSource};
use anyhow::{Result, anyhow};
use std::thread;

use super::assertions::{assert_records_equal, assert_records_unordered_equal};

/// Read every record of `bundle`.
///
/// # Errors
/// Propagates open and read errors.
pub fn read_from_bundle(source: &TextSource, bundle: &Bundle) -> Result<Vec<Vec<u8>>> {
    source.read(bundle)?.collect()
}

/// Assert that `bundles` together yield exactly the records of `reference`.
///
/// # Errors
/// Propagates open and read errors.
///
/// # Panics
/// Panics if the record multisets differ.
pub fn assert_bundles_equal_reference(
    source: &TextSource,
    reference: &Bundle,
    bundles: &[Bundle],
) -> Result<()> {
    let expected = read_from_bundle(source, reference)?;
    let mut actual = Vec::new();
    for b in bundles {
        actual.extend(read_from_bundle(source, b)?);
    }
    assert_records_unordered_equal(&actual, &expected);
    Ok(())
}

/// Interleave two readers over the same bundle: after each prefix length,
/// a fresh reader must still see all records and the first must finish
/// cleanly.
///
/// # Errors
/// Propagates open and read errors.
///
/// # Panics
/// Panics if any read differs from the reference.
pub fn assert_reentrant_reads_succeed(source: &TextSource, bundle: &Bundle) -> Result<()> {
    let expected = read_from_bundle(source, bundle)?;
    for n in 0..expected.len() {
        let mut first = source.read(bundle)?;
        let mut seen = Vec::new();
        for _ in 0..n {
            if let Some(r) = first.next() {
                seen.push(r?);
            }
        }
        assert_records_equal(&read_from_bundle(source, bundle)?, &expected);
        for r in first {
            seen.push(r?);
        }
        assert_records_equal(&seen, &expected);
    }
    Ok(())
}

/// Outcome counts of an exhaustive split run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitStats {
    pub attempts: usize,
    pub accepted: usize,
    pub refused: usize,
}

/// For every number of records read before splitting and every byte fraction
/// of the bundle, split, finish the primary, read the residual, and check
/// that primary followed by residual equals the unsplit read.
///
/// Unbounded bundles only check that every split is refused.
///
/// # Errors
/// Propagates open and read errors.
///
/// # Panics
/// Panics on the first inconsistent split.
pub fn assert_split_at_fraction_exhaustive(source: &TextSource, bundle: &Bundle) -> Result<SplitStats> {
    let expected = read_from_bundle(source, bundle)?;
    let size = bundle.range.len().unwrap_or(0);
    let fractions: Vec<f64> = if size > 1 {
        (1..size).map(|j| j as f64 / size as f64).collect()
    } else {
        vec![0.25, 0.5, 0.75]
    };

    let mut stats = SplitStats::default();
    for n in 0..=expected.len() {
        for &fraction in &fractions {
            stats.attempts += 1;
            if check_split(source, bundle, &expected, n, fraction)? {
                stats.accepted += 1;
            } else {
                stats.refused += 1;
            }
        }
    }
    if !bundle.is_splittable() {
        assert_eq!(stats.accepted, 0, "unsplittable bundle accepted a split");
    }
    Ok(stats)
}

fn check_split(
    source: &TextSource,
    bundle: &Bundle,
    expected: &[Vec<u8>],
    n: usize,
    fraction: f64,
) -> Result<bool> {
    let mut reader = source.read(bundle)?;
    let mut out = Vec::with_capacity(expected.len());
    for _ in 0..n {
        match reader.next() {
            Some(r) => out.push(r?),
            None => break,
        }
    }
    let residual = reader.split_at_fraction(fraction);
    for r in reader {
        out.push(r?);
    }
    if let Some(res) = &residual {
        out.extend(read_from_bundle(source, res)?);
    }
    assert!(
        out == expected,
        "split after {n} records at fraction {fraction} ({:?}) broke the read:\n  expected {} records, got {}",
        residual.as_ref().map(|r| r.range),
        expected.len(),
        out.len()
    );
    Ok(residual.is_some())
}

/// Read `records_before_split` records, then race the rest of the read
/// against a split at `fraction` issued from another thread.
///
/// Returns whether the split was accepted.
///
/// # Errors
/// Propagates open and read errors.
///
/// # Panics
/// Panics if primary plus residual differs from the unsplit read.
pub fn assert_split_at_fraction_concurrent(
    source: &TextSource,
    bundle: &Bundle,
    records_before_split: usize,
    fraction: f64,
) -> Result<bool> {
    let expected = read_from_bundle(source, bundle)?;
    let mut reader = source.read(bundle)?;
    let mut out = Vec::new();
    for _ in 0..records_before_split {
        match reader.next() {
            Some(r) => out.push(r?),
            None => break,
        }
    }
    let handle = reader.split_handle();
    let (rest, residual) = thread::scope(|s| {
        let splitter = s.spawn(move || handle.try_split_at_fraction(fraction));
        let rest: Result<Vec<Vec<u8>>> = reader.by_ref().collect();
        let residual = splitter
            .join()
            .map_err(|_| anyhow!("splitter thread panicked"));
        (rest, residual)
    });
    out.extend(rest?);
    let residual = residual?;
    if let Some(res) = &residual {
        out.extend(read_from_bundle(source, res)?);
    }
    assert_records_equal(&out, &expected);
    Ok(residual.is_some())
}
