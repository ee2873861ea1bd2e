//! Files with known contents for source and sink tests.

use crate::io::compression::{CompressionType, wrap_writer};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// How [`write_data`] terminates lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eol {
    Lf,
    Crlf,
    /// Alternating LF and CRLF, starting with LF.
    Mixed,
    /// LF everywhere except after the last line.
    LfWithNothingAtLastLine,
    Custom(Vec<u8>),
}

impl Eol {
    fn terminator(&self, i: usize, n: usize) -> &[u8] {
        match self {
            Eol::Lf => b"\n",
            Eol::Crlf => b"\r\n",
            Eol::Mixed if i % 2 == 0 => b"\n",
            Eol::Mixed => b"\r\n",
            Eol::LfWithNothingAtLastLine if i + 1 == n => b"",
            Eol::LfWithNothingAtLastLine => b"\n",
            Eol::Custom(d) => d,
        }
    }
}

/// Write `num_lines` lines `line_value + index` into a new file under `dir`.
///
/// Returns the file path and the lines without terminators.
///
/// # Errors
/// Fails if the file cannot be created or written.
///
/// # Example
///
/// ```
/// use textshard::testing::{write_data, Eol};
///
/// # fn main() -> anyhow::Result<()> {
/// let dir = tempfile::tempdir()?;
/// let (path, lines) = write_data(dir.path(), 3, &Eol::Crlf, b"line")?;
/// assert_eq!(lines[2], b"line2");
/// assert_eq!(std::fs::read(&path)?.len(), 3 * 7);
/// # Ok(())
/// # }
/// ```
pub fn write_data(
    dir: &Path,
    num_lines: usize,
    eol: &Eol,
    line_value: &[u8],
) -> Result<(PathBuf, Vec<Vec<u8>>)> {
    let (mut f, path) = tempfile::Builder::new()
        .prefix("mytemp")
        .tempfile_in(dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?
        .keep()?;
    let mut lines = Vec::with_capacity(num_lines);
    for i in 0..num_lines {
        let mut line = line_value.to_vec();
        line.extend_from_slice(i.to_string().as_bytes());
        f.write_all(&line)?;
        f.write_all(eol.terminator(i, num_lines))?;
        lines.push(line);
    }
    f.flush()?;
    Ok((path, lines))
}

/// Write one file per entry of `lines_per_file` (LF terminated) and return a
/// glob matching all of them plus every line in file order.
///
/// # Errors
/// Fails if a file cannot be created or written.
pub fn write_pattern(dir: &Path, lines_per_file: &[usize]) -> Result<(String, Vec<Vec<u8>>)> {
    let mut all = Vec::new();
    let mut files = Vec::new();
    for &n in lines_per_file {
        let (path, lines) = write_data(dir, n, &Eol::Lf, b"line")?;
        files.push((path, lines));
    }
    // Glob order is path order.
    files.sort_by(|a, b| a.0.cmp(&b.0));
    for (_, lines) in files {
        all.extend(lines);
    }
    Ok((format!("{}/mytemp*", dir.display()), all))
}

/// Write `bytes` to `path` through the given codec.
///
/// # Errors
/// Fails if the file cannot be created, encoded or finished.
pub fn write_file(path: &Path, bytes: &[u8], compression: CompressionType) -> Result<()> {
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = wrap_writer(f, compression, path)?;
    w.write_all(bytes)?;
    w.finish().with_context(|| format!("finish {}", path.display()))
}
