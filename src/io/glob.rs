//! File pattern matching for text sources and watchers.
//!
//! Patterns use standard glob syntax and always resolve to a **sorted** list
//! of regular files, so bundle order and read order are deterministic.
//!
//! # Examples
//!
//! ```no_run
//! use textshard::io::glob::{expand_glob, match_files};
//!
//! let files = expand_glob("logs/*.txt")?;
//! let with_sizes = match_files("logs/2024-*/part-*.txt.gz")?;
//! # use anyhow::Error; Ok::<(), Error>(())
//! ```

use anyhow::{Context, Result, bail};
use glob::glob;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::warn;

/// Expand a glob pattern into a sorted vector of matching file paths.
///
/// # Pattern Syntax
///
/// - `*` matches any sequence of characters within a path component
/// - `?` matches any single character
/// - `**` matches zero or more directories
/// - `[abc]` / `[!abc]` match (or exclude) a character set
///
/// A pattern naming an existing file matches that file literally, even when
/// the name contains metacharacters such as `[` (windowed shard names do).
///
/// # Errors
///
/// Returns an error if the pattern is invalid or a directory along the way
/// cannot be read. Zero matches is *not* an error here.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let literal = Path::new(pattern);
    if literal.is_file() {
        return Ok(vec![literal.to_path_buf()]);
    }

    let paths = glob(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))?;

    let mut result = Vec::new();
    for entry in paths {
        let path =
            entry.with_context(|| format!("error reading glob entry for pattern: {pattern}"))?;
        if path.is_file() {
            result.push(path);
        }
    }

    result.sort();
    Ok(result)
}

/// A matched file with the metadata sources need for splitting and watching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub path: PathBuf,
    /// Size in bytes at match time.
    pub size: u64,
    /// Last modification time, when the platform reports one.
    pub modified: Option<SystemTime>,
}

/// Expand `pattern` and stat every match.
///
/// Files that disappear between listing and stat are skipped with a warning.
///
/// # Errors
///
/// Same as [`expand_glob`].
pub fn match_files(pattern: &str) -> Result<Vec<FileMetadata>> {
    let mut out = Vec::new();
    for path in expand_glob(pattern)? {
        match path.metadata() {
            Ok(meta) => out.push(FileMetadata {
                size: meta.len(),
                modified: meta.modified().ok(),
                path,
            }),
            Err(err) => warn!(path = %path.display(), %err, "matched file vanished; skipping"),
        }
    }
    Ok(out)
}

/// Like [`match_files`], but zero matches is an error.
///
/// # Errors
///
/// Returns an error if the pattern is invalid, unreadable, or matches nothing.
pub fn match_files_required(pattern: &str) -> Result<Vec<FileMetadata>> {
    let files = match_files(pattern)?;
    if files.is_empty() {
        bail!("no files found matching pattern: {pattern}");
    }
    Ok(files)
}
