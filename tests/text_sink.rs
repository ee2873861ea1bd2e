//! Integration tests for sharded text output.

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use textshard::testing::*;
use textshard::*;

fn prefix(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().into_owned()
}

fn numbered(n: usize) -> Vec<Vec<u8>> {
    (0..n).map(|i| format!("record-{i:02}").into_bytes()).collect()
}

fn read_back(paths: &[PathBuf]) -> Result<Vec<Vec<u8>>> {
    let mut out = Vec::new();
    for path in paths {
        let source = TextSource::builder(path.to_string_lossy()).build()?;
        out.extend(source.read_all()?);
    }
    Ok(out)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[test]
fn test_write_single_shard_with_default_template() -> Result<()> {
    let dir = TempDir::new()?;
    let sink = TextSink::builder(prefix(&dir, "out"))
        .file_name_suffix(".txt")
        .build()?;
    let input = numbered(5);
    let paths = sink.write_all(&input)?;
    assert_eq!(paths.len(), 1);
    assert_eq!(file_name(&paths[0]), "out-00000-of-00001.txt");
    assert_eq!(
        fs::read(&paths[0])?,
        b"record-00\nrecord-01\nrecord-02\nrecord-03\nrecord-04\n"
    );
    Ok(())
}

#[test]
fn test_write_fixed_number_of_shards() -> Result<()> {
    let dir = TempDir::new()?;
    let sink = TextSink::builder(prefix(&dir, "out"))
        .num_shards(3)
        .build()?;
    let input = numbered(10);
    let paths = sink.write_all(&input)?;
    let names: Vec<String> = paths.iter().map(|p| file_name(p)).collect();
    assert_eq!(
        names,
        vec!["out-00000-of-00003", "out-00001-of-00003", "out-00002-of-00003"]
    );
    assert_records_unordered_equal(&read_back(&paths)?, &input);
    Ok(())
}

#[test]
fn test_fixed_shards_are_written_even_without_records() -> Result<()> {
    let dir = TempDir::new()?;
    let sink = TextSink::builder(prefix(&dir, "out"))
        .num_shards(2)
        .header("h")
        .build()?;
    let paths = sink.write_all(Vec::<Vec<u8>>::new())?;
    assert_eq!(paths.len(), 2);
    for path in &paths {
        assert_eq!(fs::read(path)?, b"h\n");
    }
    Ok(())
}

#[test]
fn test_max_records_per_shard() -> Result<()> {
    let dir = TempDir::new()?;
    let sink = TextSink::builder(prefix(&dir, "out"))
        .max_records_per_shard(13)
        .build()?;
    let input = numbered(100);
    let paths = sink.write_all(&input)?;
    assert!(paths.len() >= 8, "got {} shards", paths.len());
    for path in &paths {
        let records = read_back(std::slice::from_ref(path))?;
        assert!(records.len() <= 13, "{} has {} records", path.display(), records.len());
        assert!(file_name(path).ends_with(&format!("-of-{:05}", paths.len())));
    }
    assert_records_unordered_equal(&read_back(&paths)?, &input);
    Ok(())
}

#[test]
fn test_max_bytes_per_shard_counts_header_and_footer() -> Result<()> {
    let dir = TempDir::new()?;
    let header = "h".repeat(19);
    let footer = "f".repeat(29);
    let sink = TextSink::builder(prefix(&dir, "out"))
        .header(header.clone())
        .footer(footer.clone())
        .max_bytes_per_shard(300)
        .build()?;
    let input = numbered(100);
    let paths = sink.write_all(&input)?;
    assert!(paths.len() >= 4, "got {} shards", paths.len());

    let mut data = Vec::new();
    for path in &paths {
        let bytes = fs::read(path)?;
        assert!(bytes.len() <= 300, "{} is {} bytes", path.display(), bytes.len());
        let text = String::from_utf8(bytes)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.first().copied(), Some(header.as_str()));
        assert_eq!(lines.last().copied(), Some(footer.as_str()));
        data.extend(lines[1..lines.len() - 1].iter().map(|l| l.as_bytes().to_vec()));
    }
    assert_records_unordered_equal(&data, &input);
    Ok(())
}

#[test]
fn test_oversized_record_gets_its_own_shard() -> Result<()> {
    let dir = TempDir::new()?;
    let sink = TextSink::builder(prefix(&dir, "out"))
        .max_bytes_per_shard(8)
        .build()?;
    let input = records(&["a", "this record is far too long", "b"]);
    let paths = sink.write_all(&input)?;
    assert_eq!(paths.len(), 3);
    assert_records_equal(&read_back(&paths)?, &input);
    Ok(())
}

#[test]
fn test_skip_if_empty() -> Result<()> {
    let dir = TempDir::new()?;
    let sink = TextSink::builder(prefix(&dir, "out"))
        .skip_if_empty(true)
        .build()?;
    assert!(sink.write_all(Vec::<Vec<u8>>::new())?.is_empty());
    assert_eq!(fs::read_dir(dir.path())?.count(), 0);

    let sink = TextSink::builder(prefix(&dir, "out")).build()?;
    let paths = sink.write_all(Vec::<Vec<u8>>::new())?;
    assert_eq!(paths.len(), 1);
    assert!(fs::read(&paths[0])?.is_empty());
    Ok(())
}

#[test]
fn test_unsharded_template() -> Result<()> {
    let dir = TempDir::new()?;
    let sink = TextSink::builder(prefix(&dir, "single"))
        .shard_name_template("")
        .file_name_suffix(".csv")
        .header("a,b")
        .build()?;
    let paths = sink.write_all(["1,2", "3,4"])?;
    assert_eq!(paths, vec![dir.path().join("single.csv")]);
    assert_eq!(fs::read(&paths[0])?, b"a,b\n1,2\n3,4\n");
    Ok(())
}

#[test]
fn test_custom_template_and_delimiter() -> Result<()> {
    let dir = TempDir::new()?;
    let sink = TextSink::builder(prefix(&dir, "part"))
        .shard_name_template("_SS_of_NN")
        .delimiter("*|")
        .num_shards(2)
        .build()?;
    let paths = sink.write_all(["a", "b", "c"])?;
    let names: Vec<String> = paths.iter().map(|p| file_name(p)).collect();
    assert_eq!(names, vec!["part_00_of_02", "part_01_of_02"]);
    assert_eq!(fs::read(&paths[0])?, b"a*|c*|");
    assert_eq!(fs::read(&paths[1])?, b"b*|");
    Ok(())
}

#[test]
fn test_without_trailing_newlines() -> Result<()> {
    let dir = TempDir::new()?;
    let sink = TextSink::builder(prefix(&dir, "raw"))
        .shard_name_template("")
        .append_trailing_newlines(false)
        .build()?;
    let paths = sink.write_all(["ab", "cd\n"])?;
    assert_eq!(fs::read(&paths[0])?, b"abcd\n");
    Ok(())
}

#[cfg(feature = "compression-gzip")]
#[test]
fn test_compressed_output_by_suffix() -> Result<()> {
    let dir = TempDir::new()?;
    let sink = TextSink::builder(prefix(&dir, "out"))
        .file_name_suffix(".txt.gz")
        .header("header")
        .max_records_per_shard(40)
        .build()?;
    let input = numbered(100);
    let paths = sink.write_all(&input)?;
    assert_eq!(paths.len(), 3);
    for path in &paths {
        let raw = fs::read(path)?;
        assert_eq!(&raw[..2], &[0x1f, 0x8b], "gzip magic in {}", path.display());
    }

    let mut data = Vec::new();
    for path in &paths {
        let source = TextSource::builder(path.to_string_lossy())
            .skip_header_lines(1)
            .build()?;
        data.extend(source.read_all()?);
    }
    assert_records_unordered_equal(&data, &input);
    Ok(())
}

#[cfg(feature = "compression-bzip2")]
#[test]
fn test_explicit_compression_overrides_suffix() -> Result<()> {
    let dir = TempDir::new()?;
    let sink = TextSink::builder(prefix(&dir, "out"))
        .file_name_suffix(".txt")
        .compression(CompressionType::Bzip2)
        .build()?;
    let input = numbered(20);
    let paths = sink.write_all(&input)?;
    let source = TextSource::builder(paths[0].to_string_lossy())
        .compression(CompressionType::Bzip2)
        .build()?;
    assert_records_equal(&source.read_all()?, &input);
    Ok(())
}

#[test]
fn test_open_single_shard() -> Result<()> {
    let dir = TempDir::new()?;
    let sink = TextSink::builder(prefix(&dir, "unused"))
        .header("H")
        .footer("F")
        .build()?;
    let path = dir.path().join("nested/dir/manual.txt");
    let mut shard = sink.open(&path)?;
    shard.write_record(b"one")?;
    shard.write_record(b"two")?;
    assert_eq!(shard.records(), 2);
    assert_eq!(shard.bytes(), 10);
    assert_eq!(shard.close()?, 2);
    assert_eq!(fs::read(&path)?, b"H\none\ntwo\nF\n");
    Ok(())
}

#[test]
fn test_options_from_json_build_a_sink() -> Result<()> {
    let dir = TempDir::new()?;
    let options = TextSinkOptions::from_json(
        r#"{"file_name_suffix": ".txt", "num_shards": 2, "footer": "end"}"#,
    )?;
    let sink = TextSink::from_options(prefix(&dir, "json"), options)?;
    let paths = sink.write_all(["x"])?;
    assert_eq!(paths.len(), 2);
    assert_eq!(fs::read(&paths[0])?, b"x\nend\n");
    assert_eq!(fs::read(&paths[1])?, b"end\n");
    Ok(())
}

// ============================================================================
// Windowed output
// ============================================================================

const T0: TimestampMs = 1_614_556_800_000;

#[test]
fn test_windowed_writer_names_shards_by_window() -> Result<()> {
    let dir = TempDir::new()?;
    let sink = TextSink::builder(prefix(&dir, "win"))
        .file_name_suffix(".txt")
        .build()?;
    let mut writer = WindowedTextWriter::new(sink, Some(Duration::from_secs(5)), None);

    assert!(writer.write(Timestamped::new(T0 + 1_000, b"a".to_vec())));
    assert!(writer.write(Timestamped::new(T0 + 6_000, b"b".to_vec())));
    assert!(writer.write(Timestamped::new(T0 + 2_000, b"c".to_vec())));

    let first = writer.advance_watermark(T0 + 5_000)?;
    assert_eq!(first.len(), 1);
    assert_eq!(
        file_name(&first[0]),
        "win-[1614556800.0, 1614556805.0)-00000-of-00001.txt"
    );
    assert_records_equal(&read_back(&first)?, &records(&["a", "c"]));

    assert!(!writer.write(Timestamped::new(T0 + 4_000, b"late".to_vec())));

    let all = writer.close()?;
    assert_eq!(all.len(), 2);
    assert_eq!(
        file_name(&all[1]),
        "win-[1614556805.0, 1614556810.0)-00000-of-00001.txt"
    );
    assert_records_equal(&read_back(&all[1..])?, &records(&["b"]));
    Ok(())
}

#[test]
fn test_windowed_writer_with_date_template() -> Result<()> {
    let dir = TempDir::new()?;
    let sink = TextSink::builder(prefix(&dir, "win"))
        .shard_name_template("-V-SSSSS-of-NNNNN")
        .build()?;
    let mut writer = WindowedTextWriter::new(sink, None, Some(Duration::from_secs(5)));
    writer.write(Timestamped::new(T0, b"x".to_vec()));
    let paths = writer.close()?;
    assert_eq!(
        paths.iter().map(|p| file_name(p)).collect::<Vec<_>>(),
        vec!["win-[2021-03-01T00-00-00, 2021-03-01T00-00-05)-00000-of-00001"]
    );
    Ok(())
}

#[test]
fn test_unwindowed_writer_writes_on_close() -> Result<()> {
    let dir = TempDir::new()?;
    let sink = TextSink::builder(prefix(&dir, "all")).build()?;
    let mut writer = WindowedTextWriter::new(sink.clone(), None, None);
    writer.write(Timestamped::new(1, b"x".to_vec()));
    writer.write(Timestamped::new(10_000_000, b"y".to_vec()));
    assert!(writer.advance_watermark(TimestampMs::MAX)?.is_empty());
    let paths = writer.close()?;
    assert_eq!(paths, vec![PathBuf::from(format!("{}-00000-of-00001", prefix(&dir, "all")))]);
    assert_records_equal(&read_back(&paths)?, &records(&["x", "y"]));

    let empty = WindowedTextWriter::new(sink, None, None).close()?;
    assert_eq!(empty.len(), 1);
    Ok(())
}

#[test]
fn test_windowed_writer_flushes_panes_at_triggering_frequency() -> Result<()> {
    let dir = TempDir::new()?;
    let sink = TextSink::builder(prefix(&dir, "trig"))
        .file_name_suffix(".txt")
        .build()?;
    let mut writer = WindowedTextWriter::new(
        sink,
        Some(Duration::from_secs(60)),
        Some(Duration::from_secs(10)),
    );

    let lines = numbered(25);
    let mut early = Vec::new();
    for (i, line) in (0i64..).zip(&lines) {
        let ts = T0 + i * 1_000;
        assert!(writer.write(Timestamped::new(ts, line.clone())));
        early.extend(writer.advance_watermark(ts)?);
    }
    assert_eq!(early.len(), 2);
    assert_records_equal(&read_back(&early[..1])?, &lines[..11]);
    assert_records_equal(&read_back(&early[1..])?, &lines[11..21]);

    let all = writer.close()?;
    assert_eq!(
        all.iter().map(|p| file_name(p)).collect::<Vec<_>>(),
        vec![
            "trig-[1614556800.0, 1614556860.0)-00000-of-00001.txt",
            "trig-pane1-[1614556800.0, 1614556860.0)-00000-of-00001.txt",
            "trig-pane2-[1614556800.0, 1614556860.0)-00000-of-00001.txt",
        ]
    );
    assert_records_equal(&read_back(&all)?, &lines);
    Ok(())
}
