//! Transparent decompression of inputs and compression of outputs.
//!
//! Inputs are classified by content: the first bytes of the stream are peeked
//! and matched against each enabled codec's magic signature. Outputs are
//! classified by file extension, since there is nothing to peek at yet.
//!
//! ## Built-in Codecs
//!
//! - **Gzip** (`1f 8b`, `.gz`) - via `flate2` (feature: `compression-gzip`)
//! - **Zstd** (`28 b5 2f fd`, `.zst`) - via `zstd` (feature: `compression-zstd`)
//! - **Bzip2** (`BZh`, `.bz2`) - via `bzip2` (feature: `compression-bzip2`)
//! - **Xz** (`fd 37 7a 58 5a 00`, `.xz`) - via `xz2` (feature: `compression-xz`)
//!
//! A decompressing codec sits between the byte source and the line buffer and
//! owns its own, smaller buffer of compressed bytes. A corrupt or truncated
//! stream surfaces as a read error, which fails the input; nothing after the
//! failure point reaches the line reader.
//!
//! Compressing writers are [`FinishWrite`]s, so the stream trailer is written
//! and its errors observed when the output is finished rather than dropped.

use crate::error::OpenError;
use anyhow::{Context, Result};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Smallest buffer for compressed input.
const MIN_COMPRESSED_BUF: usize = 8 * 1024;

/// A compression format that can wrap a byte stream.
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name (e.g. "gzip").
    fn name(&self) -> &'static str;

    /// File extensions associated with this codec, lowercase with the leading dot.
    fn extensions(&self) -> &[&str];

    /// Signature at the start of a compressed stream.
    fn magic_bytes(&self) -> &[u8];

    /// Wrap a buffered reader with decompression.
    fn wrap_reader(&self, reader: BufReader<Box<dyn Read>>) -> io::Result<Box<dyn Read>>;

    /// Wrap a writer with compression.
    fn wrap_writer(&self, writer: Box<dyn Write>) -> io::Result<Box<dyn FinishWrite>>;
}

/// A writer that has to be told its stream is complete.
pub trait FinishWrite: Write {
    /// Write any trailer, then flush the underlying writer.
    ///
    /// # Errors
    /// Returns the error of the final writes.
    fn finish(self: Box<Self>) -> io::Result<()>;
}

impl FinishWrite for Box<dyn Write> {
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.flush()
    }
}

impl<W: Write> FinishWrite for BufWriter<W> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        let mut inner = (*self).into_inner().map_err(io::IntoInnerError::into_error)?;
        inner.flush()
    }
}

#[cfg(feature = "compression-gzip")]
impl<W: Write> FinishWrite for flate2::write::GzEncoder<W> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        (*self).finish()?.flush()
    }
}

#[cfg(feature = "compression-zstd")]
impl<W: Write> FinishWrite for zstd::stream::write::Encoder<'static, W> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        (*self).finish()?.flush()
    }
}

#[cfg(feature = "compression-bzip2")]
impl<W: Write> FinishWrite for bzip2::write::BzEncoder<W> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        (*self).finish()?.flush()
    }
}

#[cfg(feature = "compression-xz")]
impl<W: Write> FinishWrite for xz2::write::XzEncoder<W> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        (*self).finish()?.flush()
    }
}

static CODECS: &[&dyn CompressionCodec] = &[
    #[cfg(feature = "compression-gzip")]
    &GzipCodec,
    #[cfg(feature = "compression-zstd")]
    &ZstdCodec,
    #[cfg(feature = "compression-bzip2")]
    &Bzip2Codec,
    #[cfg(feature = "compression-xz")]
    &XzCodec,
];

/// All codecs compiled into this build.
#[must_use]
pub fn codecs() -> &'static [&'static dyn CompressionCodec] {
    CODECS
}

/// Find the codec whose magic bytes start `head`.
#[must_use]
pub fn detect_from_magic(head: &[u8]) -> Option<&'static dyn CompressionCodec> {
    codecs()
        .iter()
        .copied()
        .find(|c| head.starts_with(c.magic_bytes()))
}

/// Find the codec registered for the extension of `path`.
#[must_use]
pub fn detect_from_extension(path: impl AsRef<Path>) -> Option<&'static dyn CompressionCodec> {
    let path_str = path.as_ref().to_string_lossy().to_lowercase();
    codecs()
        .iter()
        .copied()
        .find(|c| c.extensions().iter().any(|ext| path_str.ends_with(ext)))
}

/// Peek at the start of `reader` and insert a decompression stage if the
/// content is compressed.
///
/// `line_buf_size` is the capacity of the line buffer the result will feed;
/// compressed bytes are staged in a buffer a quarter of that size.
///
/// Returns the (possibly wrapped) reader and the name of the codec in use.
///
/// # Errors
/// Returns [`OpenError::Codec`] when peeking fails or the codec cannot be
/// initialized.
pub fn auto_detect_reader(
    reader: Box<dyn Read>,
    line_buf_size: usize,
) -> Result<(Box<dyn Read>, Option<&'static str>), OpenError> {
    let capacity = (line_buf_size / 4).max(MIN_COMPRESSED_BUF);
    let mut buffered = BufReader::with_capacity(capacity, reader);
    let head = buffered.fill_buf().map_err(|source| OpenError::Codec {
        codec: "input",
        source,
    })?;

    match detect_from_magic(head) {
        Some(codec) => {
            let wrapped = codec
                .wrap_reader(buffered)
                .map_err(|source| OpenError::Codec {
                    codec: codec.name(),
                    source,
                })?;
            log::debug!("input is {}-compressed", codec.name());
            Ok((wrapped, Some(codec.name())))
        }
        None => Ok((Box::new(buffered), None)),
    }
}

/// Wrap a writer with compression chosen from the extension of `path_hint`,
/// or with a plain buffer if the extension is not recognized.
///
/// # Errors
/// Returns an error if the codec fails to initialize.
pub fn auto_detect_writer<W: Write + 'static>(
    writer: W,
    path_hint: impl AsRef<Path>,
) -> Result<Box<dyn FinishWrite>> {
    if let Some(codec) = detect_from_extension(&path_hint) {
        return codec
            .wrap_writer(Box::new(writer))
            .with_context(|| format!("wrap writer with {} codec", codec.name()));
    }
    Ok(Box::new(BufWriter::new(writer)))
}

/// Decoder adapter that stops reading once the stream ended, warning about
/// trailing bytes, and tags decoder failures with the codec name.
struct StopOnError<D> {
    codec: &'static str,
    decoder: Option<D>,
    trailing: fn(&mut D) -> usize,
}

impl<D: Read> Read for StopOnError<D> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(0);
        };
        match decoder.read(out) {
            Ok(0) if !out.is_empty() => {
                let trailing = (self.trailing)(decoder);
                if trailing > 0 {
                    log::warn!("{}: trailing data ({trailing} bytes)", self.codec);
                }
                self.decoder = None;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(e),
            Err(e) => {
                self.decoder = None;
                Err(io::Error::new(e.kind(), format!("{}: {e}", self.codec)))
            }
        }
    }
}

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> &[u8] {
        &[0x1f, 0x8b]
    }

    fn wrap_reader(&self, reader: BufReader<Box<dyn Read>>) -> io::Result<Box<dyn Read>> {
        use flate2::bufread::GzDecoder;
        Ok(Box::new(StopOnError {
            codec: "inflate",
            decoder: Some(GzDecoder::new(reader)),
            trailing: |d: &mut GzDecoder<BufReader<Box<dyn Read>>>| {
                d.get_mut().fill_buf().map(<[u8]>::len).unwrap_or(0)
            },
        }))
    }

    fn wrap_writer(&self, writer: Box<dyn Write>) -> io::Result<Box<dyn FinishWrite>> {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        Ok(Box::new(GzEncoder::new(writer, Compression::default())))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> &[u8] {
        &[0x28, 0xb5, 0x2f, 0xfd]
    }

    fn wrap_reader(&self, reader: BufReader<Box<dyn Read>>) -> io::Result<Box<dyn Read>> {
        let decoder = zstd::stream::read::Decoder::with_buffer(reader)?.single_frame();
        Ok(Box::new(StopOnError {
            codec: "zstd",
            decoder: Some(decoder),
            trailing: |d: &mut zstd::stream::read::Decoder<'static, BufReader<Box<dyn Read>>>| {
                d.get_mut().fill_buf().map(<[u8]>::len).unwrap_or(0)
            },
        }))
    }

    fn wrap_writer(&self, writer: Box<dyn Write>) -> io::Result<Box<dyn FinishWrite>> {
        zstd::stream::write::Encoder::new(writer, 3).map(|e| Box::new(e) as Box<dyn FinishWrite>)
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
impl CompressionCodec for Bzip2Codec {
    fn name(&self) -> &'static str {
        "bzip2"
    }

    fn extensions(&self) -> &[&str] {
        &[".bz2", ".bzip2"]
    }

    fn magic_bytes(&self) -> &[u8] {
        b"BZh"
    }

    fn wrap_reader(&self, reader: BufReader<Box<dyn Read>>) -> io::Result<Box<dyn Read>> {
        use bzip2::bufread::BzDecoder;
        Ok(Box::new(StopOnError {
            codec: "bzip2",
            decoder: Some(BzDecoder::new(reader)),
            trailing: |d: &mut BzDecoder<BufReader<Box<dyn Read>>>| {
                d.get_mut().fill_buf().map(<[u8]>::len).unwrap_or(0)
            },
        }))
    }

    fn wrap_writer(&self, writer: Box<dyn Write>) -> io::Result<Box<dyn FinishWrite>> {
        use bzip2::Compression;
        use bzip2::write::BzEncoder;
        Ok(Box::new(BzEncoder::new(writer, Compression::default())))
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
impl CompressionCodec for XzCodec {
    fn name(&self) -> &'static str {
        "xz"
    }

    fn extensions(&self) -> &[&str] {
        &[".xz"]
    }

    fn magic_bytes(&self) -> &[u8] {
        &[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]
    }

    fn wrap_reader(&self, reader: BufReader<Box<dyn Read>>) -> io::Result<Box<dyn Read>> {
        use xz2::bufread::XzDecoder;
        Ok(Box::new(StopOnError {
            codec: "xz",
            decoder: Some(XzDecoder::new(reader)),
            trailing: |d: &mut XzDecoder<BufReader<Box<dyn Read>>>| {
                d.get_mut().fill_buf().map(<[u8]>::len).unwrap_or(0)
            },
        }))
    }

    fn wrap_writer(&self, writer: Box<dyn Write>) -> io::Result<Box<dyn FinishWrite>> {
        use xz2::write::XzEncoder;
        Ok(Box::new(XzEncoder::new(writer, 6)))
    }
}
