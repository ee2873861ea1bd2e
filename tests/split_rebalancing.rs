//! Static splitting, progress reporting and dynamic work rebalancing.

use anyhow::Result;
use std::fs;
use tempfile::TempDir;
use textshard::testing::*;
use textshard::*;

fn whole_bundle(source: &TextSource) -> Result<Bundle> {
    let mut bundles = source.split(u64::MAX)?;
    assert_eq!(bundles.len(), 1);
    Ok(bundles.remove(0))
}

#[test]
fn test_static_split_matches_reference() -> Result<()> {
    let dir = TempDir::new()?;
    for eol in [Eol::Lf, Eol::Crlf, Eol::Mixed, Eol::LfWithNothingAtLastLine] {
        let (path, _) = write_data(dir.path(), 50, &eol, b"line")?;
        let source = TextSource::builder(path.to_string_lossy()).build()?;
        let reference = whole_bundle(&source)?;
        for desired in [1, 3, 10, 25, 100, 1000] {
            let bundles = source.split(desired)?;
            assert_bundles_equal_reference(&source, &reference, &bundles)?;
        }
    }
    Ok(())
}

#[test]
fn test_static_split_respects_min_bundle_size() -> Result<()> {
    let dir = TempDir::new()?;
    let (path, _) = write_data(dir.path(), 100, &Eol::Lf, b"line")?;
    let source = TextSource::builder(path.to_string_lossy())
        .min_bundle_size(200)
        .build()?;
    let bundles = source.split(10)?;
    assert!(bundles.len() > 1);
    assert!(bundles.iter().all(|b| b.range.len().is_some_and(|n| n >= 200)));
    assert_bundles_equal_reference(&source, &whole_bundle(&source)?, &bundles)?;
    Ok(())
}

#[test]
fn test_progress() -> Result<()> {
    let dir = TempDir::new()?;
    let (path, _) = write_data(dir.path(), 10, &Eol::Lf, b"line")?;
    let source = TextSource::builder(path.to_string_lossy()).build()?;
    let bundle = whole_bundle(&source)?;

    let mut reader = source.read(&bundle)?;
    let tracker = reader.tracker();
    let mut fractions = Vec::new();
    let mut split_points = Vec::new();
    while let Some(record) = reader.next() {
        record?;
        fractions.push(tracker.fraction_consumed());
        split_points.push(tracker.split_points());
    }

    let expected: Vec<f64> = (0..10).map(|i| f64::from(i) / 10.0).collect();
    assert_eq!(fractions, expected);

    let mut expected_points: Vec<SplitPointProgress> = (0..9)
        .map(|i| SplitPointProgress { consumed: i, remaining: None })
        .collect();
    expected_points.push(SplitPointProgress { consumed: 9, remaining: Some(1) });
    assert_eq!(split_points, expected_points);

    assert!(tracker.is_done());
    assert_eq!(tracker.split_points().remaining, Some(0));
    Ok(())
}

#[test]
fn test_progress_does_not_count_end_of_file() -> Result<()> {
    let dir = TempDir::new()?;
    let (path, lines) = write_data(dir.path(), 3, &Eol::Lf, b"line")?;
    let source = TextSource::builder(path.to_string_lossy()).build()?;
    let bundle = whole_bundle(&source)?.with_range(OffsetRange::new(0, 1_000));

    let mut reader = source.read(&bundle)?;
    let tracker = reader.tracker();
    let mut got = Vec::new();
    for record in reader.by_ref() {
        got.push(record?);
    }
    assert_records_equal(&got, &lines);
    assert!(tracker.is_done());
    assert_eq!(
        tracker.split_points(),
        SplitPointProgress { consumed: 2, remaining: Some(0) }
    );
    Ok(())
}

#[test]
fn test_split_at_fraction_gives_residual_bundle() -> Result<()> {
    let dir = TempDir::new()?;
    let (path, lines) = write_data(dir.path(), 10, &Eol::Lf, b"line")?;
    let source = TextSource::builder(path.to_string_lossy()).build()?;
    let bundle = whole_bundle(&source)?;

    let mut reader = source.read(&bundle)?;
    let first = reader.next().transpose()?;
    assert_eq!(first.as_deref(), Some(&b"line0"[..]));

    let residual = reader.split_at_fraction(0.5).expect("split at the middle is accepted");
    assert_eq!(residual.range, OffsetRange::new(30, 60));
    assert_eq!(reader.tracker().stop_position(), 30);

    let primary: Vec<Vec<u8>> = reader.collect::<Result<_>>()?;
    assert_records_equal(&primary, &lines[1..5]);
    assert_records_equal(&read_from_bundle(&source, &residual)?, &lines[5..]);
    Ok(())
}

#[test]
fn test_split_refused_before_last_returned_record() -> Result<()> {
    let dir = TempDir::new()?;
    let (path, _) = write_data(dir.path(), 10, &Eol::Lf, b"line")?;
    let source = TextSource::builder(path.to_string_lossy()).build()?;
    let mut reader = source.read(&whole_bundle(&source)?)?;
    for _ in 0..6 {
        reader.next().transpose()?;
    }
    // The sixth record starts at offset 30.
    assert!(reader.split_at_fraction(0.5).is_none());
    assert!(reader.split_at_fraction(0.0).is_none());
    assert!(reader.split_at_fraction(1.0).is_none());
    assert!(reader.split_at_fraction(0.75).is_some());
    Ok(())
}

#[test]
fn test_split_at_fraction_exhaustive() -> Result<()> {
    let dir = TempDir::new()?;
    for eol in [Eol::Lf, Eol::Crlf, Eol::Mixed, Eol::LfWithNothingAtLastLine] {
        let (path, _) = write_data(dir.path(), 5, &eol, b"line")?;
        let source = TextSource::builder(path.to_string_lossy()).build()?;
        let stats = assert_split_at_fraction_exhaustive(&source, &whole_bundle(&source)?)?;
        assert!(stats.accepted > 0, "{eol:?}: {stats:?}");
        assert!(stats.refused > 0, "{eol:?}: {stats:?}");
    }
    Ok(())
}

#[test]
fn test_split_at_fraction_exhaustive_custom_delimiter() -> Result<()> {
    let dir = TempDir::new()?;
    let (path, _) = write_data(dir.path(), 6, &Eol::Custom(b"*|".to_vec()), b"r")?;
    let source = TextSource::builder(path.to_string_lossy())
        .delimiter("*|")
        .build()?;
    assert_split_at_fraction_exhaustive(&source, &whole_bundle(&source)?)?;
    Ok(())
}

#[test]
fn test_split_at_fraction_exhaustive_with_escapes() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("esc.txt");
    fs::write(&path, b"a\\*|b*|c\\\\*|d\\\\\\*|e*|f")?;
    let source = TextSource::builder(path.to_string_lossy())
        .delimiter("*|")
        .escapechar(b'\\')
        .build()?;
    let bundle = whole_bundle(&source)?;
    assert_records_equal(
        &read_from_bundle(&source, &bundle)?,
        &records(&["a*|b", "c\\\\", "d\\\\*|e", "f"]),
    );
    assert_split_at_fraction_exhaustive(&source, &bundle)?;
    Ok(())
}

#[test]
fn test_split_at_fraction_exhaustive_escaped_newlines() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("esc.txt");
    fs::write(&path, b"one\\\ntwo\r\nthree\\\\\nfour\\\r\nfive")?;
    let source = TextSource::builder(path.to_string_lossy())
        .escapechar(b'\\')
        .build()?;
    assert_split_at_fraction_exhaustive(&source, &whole_bundle(&source)?)?;
    Ok(())
}

#[test]
fn test_split_at_fraction_exhaustive_with_header() -> Result<()> {
    let dir = TempDir::new()?;
    let (path, _) = write_data(dir.path(), 6, &Eol::Lf, b"line")?;
    let source = TextSource::builder(path.to_string_lossy())
        .skip_header_lines(2)
        .build()?;
    assert_split_at_fraction_exhaustive(&source, &whole_bundle(&source)?)?;
    Ok(())
}

#[test]
fn test_reentrant_reads() -> Result<()> {
    let dir = TempDir::new()?;
    let (path, _) = write_data(dir.path(), 10, &Eol::Mixed, b"line")?;
    let source = TextSource::builder(path.to_string_lossy()).build()?;
    assert_reentrant_reads_succeed(&source, &whole_bundle(&source)?)?;
    Ok(())
}

#[test]
fn test_split_at_fraction_concurrent() -> Result<()> {
    let dir = TempDir::new()?;
    let (path, _) = write_data(dir.path(), 40, &Eol::Lf, b"line")?;
    let source = TextSource::builder(path.to_string_lossy()).build()?;
    let bundle = whole_bundle(&source)?;
    for before in [0, 1, 10, 39, 40] {
        for fraction in [0.1, 0.5, 0.9] {
            assert_split_at_fraction_concurrent(&source, &bundle, before, fraction)?;
        }
    }
    Ok(())
}

#[test]
fn test_split_residual_can_be_split_again() -> Result<()> {
    let dir = TempDir::new()?;
    let (path, lines) = write_data(dir.path(), 20, &Eol::Lf, b"line")?;
    let source = TextSource::builder(path.to_string_lossy()).build()?;

    let mut reader = source.read(&whole_bundle(&source)?)?;
    let mut out = vec![reader.next().transpose()?.unwrap_or_default()];
    let residual = reader.split_at_fraction(0.25).expect("first split");
    out.extend(reader.collect::<Result<Vec<_>>>()?);

    let mut second = source.read(&residual)?;
    out.push(second.next().transpose()?.unwrap_or_default());
    let tail = second.split_at_fraction(0.5).expect("second split");
    out.extend(second.collect::<Result<Vec<_>>>()?);
    out.extend(read_from_bundle(&source, &tail)?);

    assert_records_equal(&out, &lines);
    Ok(())
}

#[cfg(feature = "compression-gzip")]
#[test]
fn test_compressed_file_is_one_unsplittable_bundle() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("data.txt.gz");
    let body: Vec<u8> = (0..100).flat_map(|i| format!("line{i}\n").into_bytes()).collect();
    write_file(&path, &body, CompressionType::Auto)?;

    let source = TextSource::builder(path.to_string_lossy()).build()?;
    let bundles = source.split(10)?;
    assert_eq!(bundles.len(), 1);
    assert!(bundles[0].range.is_unbounded());
    assert!(!bundles[0].is_splittable());

    let mut reader = source.read(&bundles[0])?;
    reader.next().transpose()?;
    assert!(reader.split_at_fraction(0.5).is_none());
    assert_eq!(reader.fraction_consumed(), 0.0);
    let stats = assert_split_at_fraction_exhaustive(&source, &bundles[0])?;
    assert_eq!(stats.accepted, 0);
    Ok(())
}
