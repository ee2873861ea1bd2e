//! Assertions over records with readable diagnostics.
//!
//! Records are raw bytes; mismatches are reported with a lossy UTF-8
//! rendering so failures in text tests read naturally.

use std::borrow::Cow;
use std::collections::HashMap;

fn show(records: &[Vec<u8>]) -> Vec<Cow<'_, str>> {
    records.iter().map(|r| String::from_utf8_lossy(r)).collect()
}

/// Assert that two record lists are equal in order and content.
///
/// # Panics
///
/// Panics if the lists differ in length or content.
///
/// # Example
///
/// ```
/// use textshard::testing::assert_records_equal;
///
/// let actual = vec![b"a".to_vec(), b"b".to_vec()];
/// assert_records_equal(&actual, &[b"a".to_vec(), b"b".to_vec()]);
/// ```
pub fn assert_records_equal(actual: &[Vec<u8>], expected: &[Vec<u8>]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "Record count mismatch:\n  Expected: {:?}\n  Actual: {:?}",
        show(expected),
        show(actual)
    );
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            a == e,
            "Record mismatch at index {i}:\n  Expected: {:?}\n  Actual: {:?}",
            String::from_utf8_lossy(e),
            String::from_utf8_lossy(a)
        );
    }
}

/// Assert that two record lists hold the same multiset of records.
///
/// # Panics
///
/// Panics listing the records missing from and extra in `actual`.
pub fn assert_records_unordered_equal(actual: &[Vec<u8>], expected: &[Vec<u8>]) {
    let mut counts: HashMap<&[u8], i64> = HashMap::new();
    for r in expected {
        *counts.entry(r.as_slice()).or_default() += 1;
    }
    for r in actual {
        *counts.entry(r.as_slice()).or_default() -= 1;
    }
    let missing: Vec<_> = counts
        .iter()
        .filter(|(_, n)| **n > 0)
        .map(|(r, n)| (String::from_utf8_lossy(r), *n))
        .collect();
    let extra: Vec<_> = counts
        .iter()
        .filter(|(_, n)| **n < 0)
        .map(|(r, n)| (String::from_utf8_lossy(r), -*n))
        .collect();
    assert!(
        missing.is_empty() && extra.is_empty(),
        "Record multiset mismatch:\n  Missing: {missing:?}\n  Extra: {extra:?}"
    );
}

/// Convenience: turn string literals into byte records.
///
/// ```
/// use textshard::testing::records;
///
/// assert_eq!(records(&["a", "b"]), vec![b"a".to_vec(), b"b".to_vec()]);
/// ```
#[must_use]
pub fn records(lines: &[&str]) -> Vec<Vec<u8>> {
    lines.iter().map(|l| l.as_bytes().to_vec()).collect()
}
