//! Compression policy and pluggable codecs for transparent text I/O.
//!
//! A [`CompressionType`] names a codec or asks for it to be resolved from the
//! file name ([`CompressionType::Auto`]). The policy has one hard consequence
//! for reading: **every codec other than [`CompressionType::Uncompressed`]
//! makes the file a single, non-splittable unit**, because a compressed stream
//! cannot be entered at an arbitrary byte offset.
//!
//! ## Built-in Codecs
//!
//! When enabled via feature flags, the following codecs are available:
//! - **Gzip** (`.gz`, `.gzip`) - via `flate2` (feature: `compression-gzip`)
//! - **Deflate** (`.deflate`, zlib framing) - via `flate2` (feature: `compression-gzip`)
//! - **Bzip2** (`.bz2`, `.bzip2`) - via `bzip2` (feature: `compression-bzip2`)
//! - **Zstd** (`.zst`, `.zstd`) - via `zstd` (feature: `compression-zstd`)
//! - **Xz** (`.xz`) - via `xz2` (feature: `compression-xz`)
//!
//! Resolution by suffix does not depend on the enabled features; opening a
//! stream with a codec that was compiled out fails with
//! [`TextIoError::CodecUnavailable`].
//!
//! ## Concatenated streams
//!
//! Readers decode concatenated members (`cat a.gz b.gz > c.gz`, back-to-back
//! zlib streams, multi-stream bzip2/xz, multi-frame zstd) as one logical
//! stream. A zero-length file decodes to an empty stream for every codec.
//!
//! ## Writing
//!
//! Writers are returned as [`FinishWrite`] trait objects. Dropping one loses
//! the codec trailer; call [`FinishWrite::finish`] to flush and close.
//!
//! ```no_run
//! use textshard::io::compression::{open_reader, CompressionType};
//! use std::io::Read;
//! # fn main() -> anyhow::Result<()> {
//! let mut reader = open_reader("logs/part-0.txt.gz", CompressionType::Auto)?;
//! let mut text = String::new();
//! reader.read_to_string(&mut text)?;
//! # Ok(())
//! # }
//! ```

use crate::error::TextIoError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Codec selection for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    /// Resolve from the file name suffix when the file is opened.
    #[default]
    Auto,
    /// Plain bytes; the only splittable mode.
    Uncompressed,
    /// RFC 1952 gzip.
    Gzip,
    /// bzip2.
    Bzip2,
    /// zlib-framed deflate.
    Deflate,
    /// Zstandard.
    Zstd,
    /// xz / LZMA2.
    Xz,
}

const SUFFIXES: &[(CompressionType, &[&str])] = &[
    (CompressionType::Gzip, &[".gz", ".gzip"]),
    (CompressionType::Bzip2, &[".bz2", ".bzip2"]),
    (CompressionType::Deflate, &[".deflate"]),
    (CompressionType::Zstd, &[".zst", ".zstd"]),
    (CompressionType::Xz, &[".xz"]),
];

impl CompressionType {
    /// Detect the codec from a path suffix (case-insensitive).
    ///
    /// Unknown suffixes resolve to [`CompressionType::Uncompressed`].
    pub fn detect(path: impl AsRef<Path>) -> Self {
        let name = path.as_ref().to_string_lossy().to_lowercase();
        SUFFIXES
            .iter()
            .find(|(_, exts)| exts.iter().any(|ext| name.ends_with(ext)))
            .map_or(Self::Uncompressed, |(kind, _)| *kind)
    }

    /// Replace [`CompressionType::Auto`] with the codec detected from `path`.
    pub fn resolve(self, path: impl AsRef<Path>) -> Self {
        match self {
            Self::Auto => Self::detect(path),
            other => other,
        }
    }

    /// True only for [`CompressionType::Uncompressed`].
    ///
    /// An unresolved [`CompressionType::Auto`] is not splittable.
    pub fn is_splittable(self) -> bool {
        self == Self::Uncompressed
    }

    /// Canonical codec name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Uncompressed => "uncompressed",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
            Self::Deflate => "deflate",
            Self::Zstd => "zstd",
            Self::Xz => "xz",
        }
    }

    /// Preferred file suffix for output written with this codec.
    pub fn default_extension(self) -> Option<&'static str> {
        SUFFIXES
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, exts)| exts[0])
    }

    /// Look up the codec implementation. `Ok(None)` means "no codec".
    ///
    /// `Auto` must be resolved before calling this.
    fn codec(self) -> Result<Option<&'static dyn CompressionCodec>, TextIoError> {
        match self {
            Self::Auto | Self::Uncompressed => Ok(None),
            #[cfg(feature = "compression-gzip")]
            Self::Gzip => Ok(Some(&GzipCodec)),
            #[cfg(feature = "compression-gzip")]
            Self::Deflate => Ok(Some(&DeflateCodec)),
            #[cfg(feature = "compression-bzip2")]
            Self::Bzip2 => Ok(Some(&Bzip2Codec)),
            #[cfg(feature = "compression-zstd")]
            Self::Zstd => Ok(Some(&ZstdCodec)),
            #[cfg(feature = "compression-xz")]
            Self::Xz => Ok(Some(&XzCodec)),
            #[allow(unreachable_patterns)]
            other => Err(TextIoError::CodecUnavailable { codec: other.name() }),
        }
    }
}

/// A writer that must be explicitly finished to produce a valid stream.
pub trait FinishWrite: Write + Send {
    /// Flush buffered bytes, write any codec trailer and release the handle.
    fn finish(self: Box<Self>) -> io::Result<()>;
}

impl<W: Write + Send> FinishWrite for BufWriter<W> {
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.flush()
    }
}

/// Pluggable compression codec.
///
/// Implementations must be `Send + Sync`; the built-ins are zero-sized statics.
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name (e.g., "gzip").
    fn name(&self) -> &'static str;

    /// Wrap a buffered reader with decompression.
    fn wrap_reader(&self, reader: Box<dyn BufRead + Send>) -> io::Result<Box<dyn Read + Send>>;

    /// Wrap a writer with compression.
    fn wrap_writer(&self, writer: Box<dyn Write + Send>) -> io::Result<Box<dyn FinishWrite>>;
}

/// Open `path` and return a reader over its *uncompressed* bytes.
///
/// # Errors
/// Fails if the file cannot be opened or the codec is unavailable. Corrupt
/// compressed data surfaces later as an I/O error from the returned reader.
pub fn open_reader(
    path: impl AsRef<Path>,
    compression: CompressionType,
) -> Result<Box<dyn Read + Send>> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    wrap_reader(f, compression, path)
        .with_context(|| format!("setup decompression for {}", path.display()))
}

/// Wrap `reader` with the decompressor selected by `compression` (resolved
/// against `path_hint` when `Auto`).
///
/// # Errors
/// Fails if the codec is unavailable or the underlying stream cannot be peeked.
pub fn wrap_reader<R: Read + Send + 'static>(
    reader: R,
    compression: CompressionType,
    path_hint: impl AsRef<Path>,
) -> Result<Box<dyn Read + Send>> {
    let mut buffered = BufReader::new(reader);
    let Some(codec) = compression.resolve(path_hint).codec()? else {
        return Ok(Box::new(buffered));
    };
    // Zero-length input is an empty stream, not a truncated header.
    if buffered.fill_buf()?.is_empty() {
        return Ok(Box::new(io::empty()));
    }
    codec
        .wrap_reader(Box::new(buffered))
        .with_context(|| format!("wrap reader with {} codec", codec.name()))
}

/// Wrap `writer` with the compressor selected by `compression` (resolved
/// against `path_hint` when `Auto`). Uncompressed output is buffered.
///
/// # Errors
/// Fails if the codec is unavailable or the encoder cannot be initialized.
pub fn wrap_writer<W: Write + Send + 'static>(
    writer: W,
    compression: CompressionType,
    path_hint: impl AsRef<Path>,
) -> Result<Box<dyn FinishWrite>> {
    match compression.resolve(path_hint).codec()? {
        Some(codec) => codec
            .wrap_writer(Box::new(writer))
            .with_context(|| format!("wrap writer with {} codec", codec.name())),
        None => Ok(Box::new(BufWriter::new(writer))),
    }
}

// ============================================================================
// Built-in Codec Implementations
// ============================================================================

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn wrap_reader(&self, reader: Box<dyn BufRead + Send>) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(flate2::bufread::MultiGzDecoder::new(reader)))
    }

    fn wrap_writer(&self, writer: Box<dyn Write + Send>) -> io::Result<Box<dyn FinishWrite>> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        Ok(Box::new(GzEncoder::new(BufWriter::new(writer), Compression::default())))
    }
}

#[cfg(feature = "compression-gzip")]
impl<W: Write + Send> FinishWrite for flate2::write::GzEncoder<W> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        flate2::write::GzEncoder::finish(*self)?.flush()
    }
}

#[cfg(feature = "compression-gzip")]
struct DeflateCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for DeflateCodec {
    fn name(&self) -> &'static str {
        "deflate"
    }

    fn wrap_reader(&self, reader: Box<dyn BufRead + Send>) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(MultiZlibDecoder::new(reader)))
    }

    fn wrap_writer(&self, writer: Box<dyn Write + Send>) -> io::Result<Box<dyn FinishWrite>> {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        Ok(Box::new(ZlibEncoder::new(BufWriter::new(writer), Compression::default())))
    }
}

#[cfg(feature = "compression-gzip")]
impl<W: Write + Send> FinishWrite for flate2::write::ZlibEncoder<W> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        flate2::write::ZlibEncoder::finish(*self)?.flush()
    }
}

/// Decodes back-to-back zlib streams as one stream.
///
/// `flate2::bufread::ZlibDecoder` consumes exactly the bytes of one stream
/// from the underlying `BufRead`, so whatever is left starts the next member.
#[cfg(feature = "compression-gzip")]
struct MultiZlibDecoder<R: BufRead> {
    inner: Option<flate2::bufread::ZlibDecoder<R>>,
}

#[cfg(feature = "compression-gzip")]
impl<R: BufRead> MultiZlibDecoder<R> {
    fn new(reader: R) -> Self {
        Self {
            inner: Some(flate2::bufread::ZlibDecoder::new(reader)),
        }
    }
}

#[cfg(feature = "compression-gzip")]
impl<R: BufRead> Read for MultiZlibDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let Some(decoder) = self.inner.as_mut() else {
                return Ok(0);
            };
            let n = decoder.read(buf)?;
            if n > 0 || buf.is_empty() {
                return Ok(n);
            }
            let Some(finished) = self.inner.take() else {
                return Ok(0);
            };
            let mut rest = finished.into_inner();
            if rest.fill_buf()?.is_empty() {
                return Ok(0);
            }
            self.inner = Some(flate2::bufread::ZlibDecoder::new(rest));
        }
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
impl CompressionCodec for Bzip2Codec {
    fn name(&self) -> &'static str {
        "bzip2"
    }

    fn wrap_reader(&self, reader: Box<dyn BufRead + Send>) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(bzip2::read::MultiBzDecoder::new(reader)))
    }

    fn wrap_writer(&self, writer: Box<dyn Write + Send>) -> io::Result<Box<dyn FinishWrite>> {
        use bzip2::write::BzEncoder;
        use bzip2::Compression;
        Ok(Box::new(BzEncoder::new(BufWriter::new(writer), Compression::default())))
    }
}

#[cfg(feature = "compression-bzip2")]
impl<W: Write + Send> FinishWrite for bzip2::write::BzEncoder<W> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        bzip2::write::BzEncoder::finish(*self)?.flush()
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn wrap_reader(&self, reader: Box<dyn BufRead + Send>) -> io::Result<Box<dyn Read + Send>> {
        zstd::stream::read::Decoder::with_buffer(reader).map(|d| Box::new(d) as Box<dyn Read + Send>)
    }

    fn wrap_writer(&self, writer: Box<dyn Write + Send>) -> io::Result<Box<dyn FinishWrite>> {
        zstd::stream::write::Encoder::new(BufWriter::new(writer), 3)
            .map(|e| Box::new(e) as Box<dyn FinishWrite>)
    }
}

#[cfg(feature = "compression-zstd")]
impl<W: Write + Send> FinishWrite for zstd::stream::write::Encoder<'static, W> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        zstd::stream::write::Encoder::finish(*self)?.flush()
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
impl CompressionCodec for XzCodec {
    fn name(&self) -> &'static str {
        "xz"
    }

    fn wrap_reader(&self, reader: Box<dyn BufRead + Send>) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(xz2::bufread::XzDecoder::new_multi_decoder(reader)))
    }

    fn wrap_writer(&self, writer: Box<dyn Write + Send>) -> io::Result<Box<dyn FinishWrite>> {
        use xz2::write::XzEncoder;
        Ok(Box::new(XzEncoder::new(BufWriter::new(writer), 6)))
    }
}

#[cfg(feature = "compression-xz")]
impl<W: Write + Send> FinishWrite for xz2::write::XzEncoder<W> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        xz2::write::XzEncoder::finish(*self)?.flush()
    }
}
