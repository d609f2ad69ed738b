//! Batched writes to the output sink.

use crate::io::compression::{FinishWrite, auto_detect_writer};
use anyhow::{Context, Result};
use std::fs::{File, create_dir_all};
use std::io::{self, Write};
use std::path::Path;

/// Default batch size before bytes are handed to the sink.
pub const DEFAULT_OUTPUT_BUF: usize = 64 * 1024;

/// Accumulates output bytes and writes them in large batches.
///
/// Whatever is still buffered is flushed on drop; errors at that point are
/// only logged, so call [`finish`](Self::finish) to observe them.
pub struct OutputBuffer {
    // None once finished
    sink: Option<Box<dyn FinishWrite>>,
    buf: Vec<u8>,
    capacity: usize,
    written: u64,
}

impl OutputBuffer {
    #[must_use]
    pub fn new(sink: Box<dyn Write>) -> Self {
        Self::with_capacity(sink, DEFAULT_OUTPUT_BUF)
    }

    #[must_use]
    pub fn with_capacity(sink: Box<dyn Write>, capacity: usize) -> Self {
        Self::with_finish_writer(Box::new(sink), capacity)
    }

    /// Buffer in front of a sink whose stream needs an explicit end, such as
    /// a compressor.
    #[must_use]
    pub fn with_finish_writer(sink: Box<dyn FinishWrite>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            sink: Some(sink),
            buf: Vec::with_capacity(capacity),
            capacity,
            written: 0,
        }
    }

    /// Write to `path`, compressed according to its extension, or to stdout
    /// when no path is given. Parent directories are created as needed.
    ///
    /// # Errors
    /// Returns an error if the file or its directories cannot be created.
    pub fn create(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::new(Box::new(io::stdout())));
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
        }
        let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let sink = auto_detect_writer(f, path)?;
        Ok(Self::with_finish_writer(sink, DEFAULT_OUTPUT_BUF))
    }

    /// Append bytes, writing full batches through to the sink.
    ///
    /// # Errors
    /// Returns the sink's write error.
    pub fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.buf.len() + bytes.len() > self.capacity {
            self.write_buf()?;
            if bytes.len() >= self.capacity {
                self.sink()?.write_all(bytes)?;
                self.written += bytes.len() as u64;
                return Ok(());
            }
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Append a single byte.
    ///
    /// # Errors
    /// Returns the sink's write error.
    pub fn append_byte(&mut self, b: u8) -> io::Result<()> {
        if self.buf.len() >= self.capacity {
            self.write_buf()?;
        }
        self.buf.push(b);
        Ok(())
    }

    /// Terminate the current row with `\r\n`.
    ///
    /// # Errors
    /// Returns the sink's write error.
    pub fn append_nl(&mut self) -> io::Result<()> {
        self.append(b"\r\n")
    }

    fn sink(&mut self) -> io::Result<&mut Box<dyn FinishWrite>> {
        self.sink
            .as_mut()
            .ok_or_else(|| io::Error::other("output already finished"))
    }

    fn write_buf(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            let Some(sink) = self.sink.as_mut() else {
                return Err(io::Error::other("output already finished"));
            };
            sink.write_all(&self.buf)?;
            self.written += self.buf.len() as u64;
            self.buf.clear();
        }
        Ok(())
    }

    /// Write everything buffered and flush the sink.
    ///
    /// # Errors
    /// Returns the sink's write or flush error.
    pub fn flush(&mut self) -> io::Result<()> {
        self.write_buf()?;
        self.sink()?.flush()
    }

    /// Write everything buffered and end the stream, writing a compressor's
    /// trailer. Returns the bytes handed to the sink.
    ///
    /// # Errors
    /// Returns the first write, flush or trailer error.
    pub fn finish(mut self) -> io::Result<u64> {
        self.write_buf()?;
        if let Some(sink) = self.sink.take() {
            sink.finish()?;
        }
        Ok(self.written)
    }

    /// Bytes handed to the sink so far.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.written
    }
}

impl Drop for OutputBuffer {
    fn drop(&mut self) {
        if self.sink.is_none() {
            return;
        }
        if let Err(e) = self.flush() {
            log::error!("failed to flush output: {e}");
        }
    }
}
