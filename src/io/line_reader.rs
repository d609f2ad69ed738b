//! Newline-delimited reads over a fixed-capacity buffer.
//!
//! The reader hands out lines as views into its own buffer. A view stays
//! valid until the next call that reads from the reader, which the borrow
//! checker enforces for [`LineReader::read_line`].
//!
//! Encoding is sniffed once, from the first bytes of the stream:
//! - a UTF-8 BOM is skipped,
//! - a UTF-16 BOM (either byte order) switches to a lossy narrowing mode in
//!   which every code unit with a non-zero high byte becomes `?` and every
//!   other unit becomes its low byte. Narrowing happens in place on refill.

use crate::utils::sample;
use memchr::memchr;
use std::io::{self, Read};
use std::ops::Range;

/// Text encoding detected from the byte order mark.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    /// No BOM; bytes are passed through.
    Plain,
    /// UTF-8 with a BOM, which is skipped.
    Utf8Bom,
    /// UTF-16 big endian, narrowed to single bytes.
    Utf16Be,
    /// UTF-16 little endian, narrowed to single bytes.
    Utf16Le,
}

impl Encoding {
    fn is_utf16(self) -> bool {
        matches!(self, Encoding::Utf16Be | Encoding::Utf16Le)
    }
}

/// Outcome of pulling one line from the buffer.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum LineSpan {
    /// Buffer range of a line, terminator included when present.
    Line(Range<usize>),
    /// A full buffer held no newline. The line has been dropped.
    TooLong { sample: String },
    /// The source is exhausted.
    Eof,
}

/// Buffered line splitter over any byte stream.
pub struct LineReader {
    source: Box<dyn Read>,
    buf: Box<[u8]>,
    cursor: usize,
    filled: usize,
    eof: bool,
    encoding: Encoding,
    // first half of a UTF-16 code unit split across two reads
    odd_byte: Option<u8>,
    // dropping the tail of an oversized line
    discarding: bool,
    io_error: Option<io::Error>,
}

impl LineReader {
    /// Wrap `source` with a buffer of `capacity` bytes and sniff its encoding.
    #[must_use]
    pub fn new(source: Box<dyn Read>, capacity: usize) -> Self {
        let mut reader = Self {
            source,
            buf: vec![0u8; capacity.max(4)].into_boxed_slice(),
            cursor: 0,
            filled: 0,
            eof: false,
            encoding: Encoding::Plain,
            odd_byte: None,
            discarding: false,
            io_error: None,
        };
        reader.fill();
        reader.detect_bom();
        reader
    }

    fn detect_bom(&mut self) {
        let head = &self.buf[..self.filled];
        if head.starts_with(&[0xef, 0xbb, 0xbf]) {
            self.encoding = Encoding::Utf8Bom;
            self.cursor = 3;
        } else if head.starts_with(&[0xfe, 0xff]) {
            self.encoding = Encoding::Utf16Be;
            self.cursor = 2;
            self.filled = self.narrow(2, self.filled);
        } else if head.starts_with(&[0xff, 0xfe]) {
            self.encoding = Encoding::Utf16Le;
            self.cursor = 2;
            self.filled = self.narrow(2, self.filled);
        }
    }

    /// Encoding detected when the reader was created.
    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Capacity of the line buffer, i.e. the longest line that can be returned.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// True once the source is exhausted and every buffered byte was consumed.
    #[must_use]
    pub fn eos(&self) -> bool {
        self.eof && self.cursor >= self.filled
    }

    /// The read error that ended the stream early, if any.
    #[must_use]
    pub fn io_error(&self) -> Option<&io::Error> {
        self.io_error.as_ref()
    }

    pub(crate) fn take_io_error(&mut self) -> Option<io::Error> {
        self.io_error.take()
    }

    /// Narrow UTF-16 code units in `buf[start..end]` to bytes, in place.
    /// Returns the end of the narrowed data. An unpaired last byte is kept
    /// aside for the next refill.
    fn narrow(&mut self, start: usize, end: usize) -> usize {
        let (high, low) = match self.encoding {
            Encoding::Utf16Be => (0, 1),
            Encoding::Utf16Le => (1, 0),
            Encoding::Plain | Encoding::Utf8Bom => return end,
        };
        let mut input = start;
        let mut out = start;
        while input + 1 < end {
            self.buf[out] = if self.buf[input + high] != 0 {
                b'?'
            } else {
                self.buf[input + low]
            };
            out += 1;
            input += 2;
        }
        if input < end {
            self.odd_byte = Some(self.buf[input]);
        }
        out
    }

    /// Move unread bytes to the front, then read until the buffer is full or
    /// the source is exhausted.
    fn fill(&mut self) {
        if self.cursor > 0 {
            self.buf.copy_within(self.cursor..self.filled, 0);
            self.filled -= self.cursor;
            self.cursor = 0;
        }

        let utf16 = self.encoding.is_utf16();
        while !self.eof {
            let room = self.buf.len() - self.filled;
            if room == 0 || (utf16 && room < 2) {
                break;
            }

            let start = self.filled;
            let mut raw_start = start;
            if let Some(b) = self.odd_byte.take() {
                self.buf[raw_start] = b;
                raw_start += 1;
            }

            let n = match self.source.read(&mut self.buf[raw_start..]) {
                Ok(0) => {
                    self.eof = true;
                    0
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => 0,
                Err(e) => {
                    log::error!("read error: {e}");
                    self.io_error = Some(e);
                    self.eof = true;
                    0
                }
            };

            let raw_end = raw_start + n;
            self.filled = if utf16 {
                self.narrow(start, raw_end)
            } else {
                raw_end
            };
        }
    }

    fn find_newline(&self) -> Option<usize> {
        memchr(b'\n', &self.buf[self.cursor..self.filled]).map(|i| self.cursor + i)
    }

    /// Skip the remainder of a dropped line. Returns false if the stream ended first.
    fn resync(&mut self) -> bool {
        while self.discarding {
            if let Some(nl) = self.find_newline() {
                self.cursor = nl + 1;
                self.discarding = false;
            } else {
                self.cursor = self.filled;
                if self.eof {
                    self.discarding = false;
                    return false;
                }
                self.fill();
            }
        }
        true
    }

    fn take_line(&mut self, end: usize) -> LineSpan {
        let start = self.cursor;
        self.cursor = end;
        LineSpan::Line(start..end)
    }

    /// Pull the next line. At most one compaction happens per call.
    pub(crate) fn next_line(&mut self) -> LineSpan {
        if !self.resync() {
            return LineSpan::Eof;
        }

        if let Some(nl) = self.find_newline() {
            return self.take_line(nl + 1);
        }

        if !self.eof && (self.cursor > 0 || self.filled < self.buf.len()) {
            self.fill();
            if let Some(nl) = self.find_newline() {
                return self.take_line(nl + 1);
            }
        }

        if self.eof {
            if self.io_error.is_some() {
                // a line cut short by a read error is not a line
                self.cursor = self.filled;
                return LineSpan::Eof;
            }
            // end of input terminates the last line
            return if self.cursor < self.filled {
                let end = self.filled;
                self.take_line(end)
            } else {
                LineSpan::Eof
            };
        }

        let sample = sample(&self.buf[self.cursor..self.filled]);
        self.cursor = self.filled;
        self.discarding = true;
        LineSpan::TooLong { sample }
    }

    /// Bytes of a range handed out by [`next_line`](Self::next_line).
    pub(crate) fn bytes(&self, range: Range<usize>) -> &[u8] {
        &self.buf[range]
    }

    /// Return the next line, terminator included.
    ///
    /// `None` means either end of input or a line longer than the buffer,
    /// which is reported and skipped; check [`eos`](Self::eos) to tell them apart.
    pub fn read_line(&mut self) -> Option<&[u8]> {
        match self.next_line() {
            LineSpan::Line(range) => Some(&self.buf[range]),
            LineSpan::TooLong { sample } => {
                log::warn!("line too long, near '{sample}'");
                None
            }
            LineSpan::Eof => None,
        }
    }

    /// Raw read of up to `max` bytes, ignoring line structure.
    pub fn read(&mut self, max: usize) -> &[u8] {
        if max > self.filled - self.cursor && !self.eof {
            self.fill();
        }
        let n = max.min(self.filled - self.cursor);
        let start = self.cursor;
        self.cursor += n;
        &self.buf[start..start + n]
    }
}
