//! Continuous pattern matching.

use anyhow::Result;
use std::fs::{self, File};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use textshard::testing::*;
use textshard::*;

fn names(files: &[FileMetadata]) -> Vec<String> {
    files
        .iter()
        .filter_map(|f| f.path.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect()
}

#[test]
fn test_watcher_emits_each_file_once() -> Result<()> {
    let dir = TempDir::new()?;
    let pattern = format!("{}/*.txt", dir.path().display());
    let mut watcher = FileWatcher::new(pattern, false);
    assert!(watcher.poll()?.is_empty());

    fs::write(dir.path().join("a.txt"), b"a\n")?;
    assert_eq!(names(&watcher.poll()?), vec!["a.txt"]);
    assert!(watcher.poll()?.is_empty());

    fs::write(dir.path().join("b.txt"), b"b\n")?;
    fs::write(dir.path().join("ignored.csv"), b"c\n")?;
    assert_eq!(names(&watcher.poll()?), vec!["b.txt"]);

    let a = File::options().append(true).open(dir.path().join("a.txt"))?;
    a.set_modified(SystemTime::now() + Duration::from_secs(60))?;
    assert!(watcher.poll()?.is_empty());
    Ok(())
}

#[test]
fn test_watcher_reemits_updated_files() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("a.txt");
    fs::write(&path, b"a\n")?;
    let mut watcher = FileWatcher::new(format!("{}/*.txt", dir.path().display()), true);
    assert_eq!(watcher.poll()?.len(), 1);
    assert!(watcher.poll()?.is_empty());

    let f = File::options().append(true).open(&path)?;
    f.set_modified(SystemTime::now() + Duration::from_secs(60))?;
    let again = watcher.poll()?;
    assert_eq!(names(&again), vec!["a.txt"]);
    assert!(watcher.poll()?.is_empty());
    Ok(())
}

#[test]
fn test_watch_and_read_stops_at_stop_time() -> Result<()> {
    let dir = TempDir::new()?;
    let (pattern, lines) = write_pattern(dir.path(), &[3, 4])?;
    let source = TextSource::builder(pattern).build()?;
    let options = WatchOptions {
        interval: Duration::from_millis(10),
        stop: Some(SystemTime::now() + Duration::from_millis(100)),
        ..WatchOptions::default()
    };

    let mut got = Vec::new();
    let files = watch_and_read(&source, &options, |_, record| {
        got.push(record);
        Ok(())
    })?;
    assert_eq!(files, 2);
    assert_records_equal(&got, &lines);
    Ok(())
}

#[test]
fn test_watch_and_read_stops_when_callback_fails() -> Result<()> {
    let dir = TempDir::new()?;
    let (pattern, _) = write_pattern(dir.path(), &[3])?;
    let source = TextSource::builder(pattern).build()?;
    let err = watch_and_read(&source, &WatchOptions::default(), |_, _| {
        anyhow::bail!("enough")
    })
    .unwrap_err();
    assert!(format!("{err:#}").contains("enough"));
    Ok(())
}

#[mark_flaky_tests::flaky]
#[test]
fn test_watch_and_read_picks_up_new_files() {
    let dir = TempDir::new().unwrap();
    let source = TextSource::builder(format!("{}/*.txt", dir.path().display()))
        .build()
        .unwrap();
    let options = WatchOptions {
        interval: Duration::from_millis(10),
        stop: Some(SystemTime::now() + Duration::from_millis(500)),
        ..WatchOptions::default()
    };

    let staging = dir.path().join("staging");
    fs::create_dir(&staging).unwrap();
    let target: PathBuf = dir.path().join("late.txt");
    let writer = {
        let staging = staging.join("late.tmp");
        let target = target.clone();
        thread::spawn(move || -> std::io::Result<()> {
            thread::sleep(Duration::from_millis(100));
            fs::write(&staging, b"x\ny\n")?;
            fs::rename(&staging, &target)
        })
    };

    let mut got = Vec::new();
    let files = watch_and_read(&source, &options, |path, record| {
        assert_eq!(path, target.as_path());
        got.push(record);
        Ok(())
    })
    .unwrap();
    writer.join().expect("writer thread").unwrap();
    assert_eq!(files, 1);
    assert_records_equal(&got, &records(&["x", "y"]));
}
