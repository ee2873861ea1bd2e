//! Continuous matching of a file pattern.
//!
//! [`FileWatcher`] remembers every file it has emitted, keyed by path and
//! modification time. [`watch_and_read`] drives a watcher on a fixed polling
//! interval and reads each newly emitted file with a [`TextSource`].

use super::source::TextSource;
use crate::io::glob::{FileMetadata, match_files};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Emits files matching a pattern that were not emitted before.
#[derive(Debug, Clone)]
pub struct FileWatcher {
    pattern: String,
    match_updated_files: bool,
    seen: HashMap<PathBuf, Option<SystemTime>>,
}

impl FileWatcher {
    /// With `match_updated_files`, a known file is emitted again whenever its
    /// modification time moves forward.
    pub fn new(pattern: impl Into<String>, match_updated_files: bool) -> Self {
        Self {
            pattern: pattern.into(),
            match_updated_files,
            seen: HashMap::new(),
        }
    }

    /// Re-match the pattern and return new (or updated) files, sorted by path.
    ///
    /// # Errors
    /// Fails if the pattern is invalid or a directory cannot be listed.
    pub fn poll(&mut self) -> Result<Vec<FileMetadata>> {
        let mut out = Vec::new();
        for file in match_files(&self.pattern)? {
            let emit = match self.seen.get(&file.path) {
                None => true,
                Some(prev) => self.match_updated_files && file.modified > *prev,
            };
            if emit {
                self.seen.insert(file.path.clone(), file.modified);
                out.push(file);
            }
        }
        debug!(pattern = %self.pattern, new_files = out.len(), "polled pattern");
        Ok(out)
    }
}

/// When and how often [`watch_and_read`] polls.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub interval: Duration,
    /// Do not poll before this instant.
    pub start: Option<SystemTime>,
    /// Stop polling at this instant; `None` polls until the callback fails.
    pub stop: Option<SystemTime>,
    pub match_updated_files: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            start: None,
            stop: None,
            match_updated_files: false,
        }
    }
}

/// Poll `source`'s pattern within `[start, stop)` and pass every record of
/// every newly matched file to `on_record` together with its path.
///
/// Files that vanish before they can be read are skipped with a warning.
/// Returns the number of files read.
///
/// # Errors
/// Fails on an invalid pattern, a read error, or an error from `on_record`.
pub fn watch_and_read<F>(source: &TextSource, options: &WatchOptions, mut on_record: F) -> Result<usize>
where
    F: FnMut(&Path, Vec<u8>) -> Result<()>,
{
    let mut watcher = FileWatcher::new(source.pattern(), options.match_updated_files);
    if let Some(start) = options.start
        && let Ok(wait) = start.duration_since(SystemTime::now())
    {
        thread::sleep(wait);
    }

    let mut files_read = 0;
    loop {
        if options.stop.is_some_and(|stop| SystemTime::now() >= stop) {
            break;
        }
        for file in watcher.poll()? {
            let records = match source.read_file(&file) {
                Ok(records) => records,
                Err(err) if !file.path.exists() => {
                    warn!(path = %file.path.display(), %err, "watched file vanished; skipping");
                    continue;
                }
                Err(err) => return Err(err),
            };
            for record in records {
                on_record(&file.path, record)
                    .with_context(|| format!("handle record from {}", file.path.display()))?;
            }
            files_read += 1;
        }
        thread::sleep(options.interval);
    }
    info!(pattern = source.pattern(), files_read, "stopped watching");
    Ok(files_read)
}
