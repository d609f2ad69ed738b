//! Quote-aware CSV rows on top of [`LineReader`].
//!
//! A [`CsvReader`] walks its input one row at a time. Fields are handed out as
//! [`FieldSpan`]s: offsets into the current row, tied by lifetime to the
//! [`Row`] borrow they came from, so no span can outlive the row it indexes.
//!
//! Rows normally borrow straight from the line buffer. When a quoted field
//! runs past the end of a physical line, the row is copied into an owned
//! buffer and the following lines are appended to it until the closing quote
//! shows up. Offsets handed out earlier for the same row stay valid across
//! that switch.
//!
//! Unescaping is zero-copy unless a field contains a doubled quote.
//!
//! ```
//! use ironcsv::config::ReaderOptions;
//! use ironcsv::io::csv::CsvReader;
//!
//! let data = "id,comment\n1,\"multi\nline\"\n";
//! let mut rdr = CsvReader::from_reader("inline", Box::new(data.as_bytes()), &ReaderOptions::default());
//! let mut rows = Vec::new();
//! while let Some(mut row) = rdr.next_row() {
//!     rows.push(row.parse_line()?);
//! }
//! assert_eq!(rows[1], vec!["1".to_string(), "multi\nline".to_string()]);
//! # Ok::<(), ironcsv::error::CsvError>(())
//! ```

use crate::config::ReaderOptions;
use crate::error::{CsvError, OpenError};
use crate::io::compression::auto_detect_reader;
use crate::io::line_reader::{Encoding, LineReader, LineSpan};
use crate::io::source::Input;
use crate::utils::sample;
use memchr::memchr;
use std::borrow::Cow;
use std::io::{self, Read};
use std::marker::PhantomData;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RowState {
    NeedsRow,
    InRow,
    RowExhausted,
    Failed,
}

#[derive(Clone, Copy, Debug)]
enum RowStorage {
    /// Row lives in the line buffer at this offset.
    Borrowed { start: usize },
    /// Row spans several lines and was copied to `line_copy`.
    Copied,
}

/// Streaming CSV reader.
pub struct CsvReader {
    name: String,
    lines: LineReader,
    separator: u8,
    quote: u8,
    max_row_len: usize,
    compression: Option<&'static str>,

    storage: RowStorage,
    line_copy: Vec<u8>,
    row_len_nl: usize,
    row_len: usize,
    cursor: usize,
    state: RowState,

    line_number: u64,
    row_number: u64,
    skipped_lines: u64,
    fatal: Option<CsvError>,
}

impl CsvReader {
    /// Open `input`, decompressing it if its content is compressed.
    ///
    /// # Errors
    /// Returns [`OpenError`] if the input cannot be opened or the codec fails
    /// to initialize.
    pub fn open(input: &Input, opts: &ReaderOptions) -> Result<Self, OpenError> {
        let raw = input.open()?;
        let (source, compression) = auto_detect_reader(raw, opts.max_row_len)?;
        let mut reader = Self::from_reader(input.to_string(), source, opts);
        reader.compression = compression;
        Ok(reader)
    }

    /// Read rows from an already opened, uncompressed stream.
    #[must_use]
    pub fn from_reader(name: impl Into<String>, source: Box<dyn Read>, opts: &ReaderOptions) -> Self {
        Self {
            name: name.into(),
            lines: LineReader::new(source, opts.max_row_len),
            separator: opts.separator,
            quote: opts.quote,
            max_row_len: opts.max_row_len,
            compression: None,
            storage: RowStorage::Borrowed { start: 0 },
            line_copy: Vec::new(),
            row_len_nl: 0,
            row_len: 0,
            cursor: 1,
            state: RowState::NeedsRow,
            line_number: 0,
            row_number: 0,
            skipped_lines: 0,
            fatal: None,
        }
    }

    /// Display name of the input, for diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.lines.encoding()
    }

    /// Codec the input was decompressed with, if any.
    #[must_use]
    pub fn compression(&self) -> Option<&'static str> {
        self.compression
    }

    #[must_use]
    pub fn separator(&self) -> u8 {
        self.separator
    }

    #[must_use]
    pub fn quote(&self) -> u8 {
        self.quote
    }

    /// Physical lines consumed so far, including dropped ones.
    #[must_use]
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    /// Rows fetched so far.
    #[must_use]
    pub fn row_number(&self) -> u64 {
        self.row_number
    }

    /// Lines dropped for not fitting in the line buffer.
    #[must_use]
    pub fn skipped_lines(&self) -> u64 {
        self.skipped_lines
    }

    /// The error that stopped the reader before end of input, if any.
    #[must_use]
    pub fn fatal_error(&self) -> Option<&CsvError> {
        self.fatal.as_ref()
    }

    /// The read error that cut the input short, if any.
    #[must_use]
    pub fn io_error(&self) -> Option<&io::Error> {
        self.lines.io_error()
    }

    /// Take ownership of the read error, leaving none behind.
    pub fn take_io_error(&mut self) -> Option<io::Error> {
        self.lines.take_io_error()
    }

    /// True when no more rows or fields are available.
    #[must_use]
    pub fn eos(&self) -> bool {
        match self.state {
            RowState::Failed => true,
            RowState::InRow if self.cursor <= self.row_len => false,
            _ => self.lines.eos(),
        }
    }

    fn row_bytes(&self) -> &[u8] {
        match self.storage {
            RowStorage::Borrowed { start } => self.lines.bytes(start..start + self.row_len_nl),
            RowStorage::Copied => &self.line_copy[..self.row_len_nl],
        }
    }

    fn trim_newlines(&mut self) {
        let mut len = self.row_len_nl;
        let row = self.row_bytes();
        if len > 0 && row[len - 1] == b'\n' {
            len -= 1;
        }
        if len > 0 && row[len - 1] == b'\r' {
            len -= 1;
        }
        self.row_len = len;
    }

    /// Advance to the next row. Lines too long for the buffer are skipped.
    ///
    /// Returns `false` once the input is exhausted or the reader failed;
    /// every later call returns `false` too.
    pub fn fetch_line(&mut self) -> bool {
        if self.state == RowState::Failed {
            return false;
        }

        loop {
            match self.lines.next_line() {
                LineSpan::Line(range) => {
                    self.line_number += 1;
                    self.row_number += 1;
                    self.storage = RowStorage::Borrowed { start: range.start };
                    self.row_len_nl = range.len();
                    self.trim_newlines();
                    self.cursor = 0;
                    self.state = RowState::InRow;
                    return true;
                }
                LineSpan::TooLong { sample } => {
                    self.line_number += 1;
                    self.skipped_lines += 1;
                    log::warn!(
                        "{}: line {} too long, near '{sample}'",
                        self.name,
                        self.line_number
                    );
                }
                LineSpan::Eof => {
                    self.state = RowState::Failed;
                    self.cursor = 1;
                    self.row_len = 0;
                    self.row_len_nl = 0;
                    return false;
                }
            }
        }
    }

    /// Fetch the next row and borrow it.
    pub fn next_row(&mut self) -> Option<Row<'_>> {
        if self.fetch_line() {
            Some(Row { reader: self })
        } else {
            None
        }
    }

    /// Borrow the current row without advancing.
    pub fn current_row(&mut self) -> Row<'_> {
        Row { reader: self }
    }

    fn fail(&mut self, err: CsvError) -> CsvError {
        if !self.lines.eos() {
            log::warn!("{}: ignoring end of file after line {}", self.name, self.line_number);
        }
        self.state = RowState::Failed;
        self.cursor = self.row_len + 1;
        self.fatal = Some(err.clone());
        err
    }

    /// Append the next physical line to the current row, switching the row
    /// to owned storage first. Returns the offset where the appended line starts.
    fn extend_row(&mut self) -> Result<usize, CsvError> {
        if let RowStorage::Borrowed { start } = self.storage {
            self.line_copy.clear();
            self.line_copy.reserve(self.max_row_len);
            let current = self.lines.bytes(start..start + self.row_len_nl);
            self.line_copy.extend_from_slice(current);
            self.storage = RowStorage::Copied;
        }

        let prev_len = self.row_len_nl;
        match self.lines.next_line() {
            LineSpan::Line(range) if prev_len + range.len() <= self.max_row_len => {
                self.line_number += 1;
                self.line_copy.extend_from_slice(self.lines.bytes(range));
                self.row_len_nl = self.line_copy.len();
                self.trim_newlines();
                Ok(prev_len)
            }
            LineSpan::Line(_) | LineSpan::TooLong { .. } => {
                self.line_number += 1;
                let err = CsvError::RowTooLong {
                    sample: sample(&self.line_copy),
                };
                Err(self.fail(err))
            }
            LineSpan::Eof => {
                let err = CsvError::UnterminatedQuote {
                    sample: sample(&self.line_copy),
                };
                Err(self.fail(err))
            }
        }
    }

    /// Scan the next field of the current row as `(offset, len)`.
    fn next_field(&mut self) -> Option<Result<(usize, usize), CsvError>> {
        if self.state != RowState::InRow {
            return None;
        }
        if self.cursor > self.row_len {
            self.state = RowState::RowExhausted;
            return None;
        }

        let start = self.cursor;
        if start == self.row_len {
            // trailing separator, or an empty row
            self.cursor += 1;
            return Some(Ok((start, 0)));
        }

        let (sep, quote) = (self.separator, self.quote);
        let row = self.row_bytes();
        if row[start] != quote {
            let len = memchr(sep, &row[start..self.row_len]).unwrap_or(self.row_len - start);
            self.cursor = start + len + 1;
            return Some(Ok((start, len)));
        }

        // quoted field: len covers the opening quote and everything scanned so far
        let mut len = 1;
        loop {
            let row = self.row_bytes();
            let from = start + len;
            let closing = if from < self.row_len {
                memchr(quote, &row[from..self.row_len]).map(|i| from + i)
            } else {
                None
            };

            if let Some(q) = closing {
                len = q - start + 1;
                let after = q + 1;
                if after >= self.row_len {
                    self.cursor = after + 1;
                    return Some(Ok((start, len)));
                }
                let next = row[after];
                if next == sep {
                    self.cursor = after + 1;
                    return Some(Ok((start, len)));
                }
                if next == quote {
                    len += 1;
                    continue;
                }
                self.cursor = after;
                return Some(Err(CsvError::QuoteSyntax {
                    offset: after,
                    found: char::from(next),
                }));
            }

            match self.extend_row() {
                Ok(appended_at) => len = appended_at - start,
                Err(e) => return Some(Err(e)),
            }
        }
    }

    /// Raw passthrough: the unread rest of the current row first, then
    /// whatever the line buffer holds. Do not mix with row reads.
    pub fn read(&mut self, max: usize) -> &[u8] {
        if self.state == RowState::InRow && self.cursor < self.row_len_nl {
            let n = max.min(self.row_len_nl - self.cursor);
            let start = self.cursor;
            self.cursor += n;
            return &self.row_bytes()[start..start + n];
        }
        self.lines.read(max)
    }
}

/// Location of one field inside the [`Row`] it was read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSpan<'r> {
    offset: usize,
    len: usize,
    _row: PhantomData<&'r ()>,
}

impl FieldSpan<'_> {
    /// Offset of the field in the row, opening quote included.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length of the still escaped field.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// The current row of a [`CsvReader`].
pub struct Row<'r> {
    reader: &'r mut CsvReader,
}

impl<'r> Row<'r> {
    /// Next field of the row, or `None` once the row is exhausted.
    ///
    /// A [`CsvError::QuoteSyntax`] leaves the cursor on the offending byte, so
    /// reading on resumes after it. Any other error ends the input.
    pub fn read_csv_field(&mut self) -> Option<Result<FieldSpan<'r>, CsvError>> {
        self.reader.next_field().map(|res| {
            res.map(|(offset, len)| FieldSpan {
                offset,
                len,
                _row: PhantomData,
            })
        })
    }

    /// Escaped bytes of a field.
    #[must_use]
    pub fn get(&self, span: FieldSpan<'r>) -> &[u8] {
        self.field_at(span.offset, span.len)
    }

    /// Unescaped bytes of a field.
    #[must_use]
    pub fn unescape(&self, span: FieldSpan<'r>) -> Cow<'_, [u8]> {
        unescape_csv_field(self.get(span), self.reader.quote)
    }

    pub(crate) fn field_at(&self, offset: usize, len: usize) -> &[u8] {
        &self.reader.row_bytes()[offset..offset + len]
    }

    /// Rewind so the next [`read_csv_field`](Self::read_csv_field) starts at the first field again.
    pub fn reset_field_cursor(&mut self) {
        if matches!(self.reader.state, RowState::InRow | RowState::RowExhausted) {
            self.reader.cursor = 0;
            self.reader.state = RowState::InRow;
        }
    }

    /// Every remaining field, unescaped.
    ///
    /// # Errors
    /// Returns the first field error of the row.
    pub fn parse_line(&mut self) -> Result<Vec<String>, CsvError> {
        let mut fields = Vec::new();
        while let Some(span) = self.read_csv_field() {
            let span = span?;
            fields.push(String::from_utf8_lossy(&self.unescape(span)).into_owned());
        }
        Ok(fields)
    }

    /// Row content without its line terminator.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.reader.row_bytes()[..self.reader.row_len]
    }

    /// Row content including its line terminator.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        self.reader.row_bytes()
    }

    /// True for a row holding no bytes besides its terminator.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.reader.row_len == 0
    }

    /// Physical line on which this row ends.
    #[must_use]
    pub fn line_number(&self) -> u64 {
        self.reader.line_number
    }

    #[must_use]
    pub fn row_number(&self) -> u64 {
        self.reader.row_number
    }
}

/// Strip the surrounding quotes of a field and collapse doubled quotes.
///
/// Borrows from `field` unless a doubled quote has to be collapsed.
///
/// ```
/// use ironcsv::io::csv::unescape_csv_field;
///
/// assert_eq!(&*unescape_csv_field(b"plain", b'"'), b"plain");
/// assert_eq!(&*unescape_csv_field(b"\"a,b\"", b'"'), b"a,b");
/// assert_eq!(&*unescape_csv_field(b"\"say \"\"hi\"\"\"", b'"'), b"say \"hi\"");
/// ```
#[must_use]
pub fn unescape_csv_field(field: &[u8], quote: u8) -> Cow<'_, [u8]> {
    if field.first() != Some(&quote) {
        return Cow::Borrowed(field);
    }

    let inner = if field.len() >= 2 && field[field.len() - 1] == quote {
        &field[1..field.len() - 1]
    } else {
        &field[1..]
    };

    let Some(first) = memchr(quote, inner) else {
        return Cow::Borrowed(inner);
    };

    let mut out = Vec::with_capacity(inner.len());
    let mut rest = inner;
    let mut next = Some(first);
    while let Some(i) = next {
        out.extend_from_slice(&rest[..=i]);
        rest = rest.get(i + 2..).unwrap_or_default();
        next = memchr(quote, rest);
    }
    out.extend_from_slice(rest);
    Cow::Owned(out)
}

/// Quote a value, doubling embedded quotes. The empty value stays empty.
///
/// ```
/// use ironcsv::io::csv::escape_csv_field;
///
/// assert_eq!(escape_csv_field(b"a\"b", b'"'), b"\"a\"\"b\"");
/// assert_eq!(escape_csv_field(b"", b'"'), b"");
/// ```
#[must_use]
pub fn escape_csv_field(value: &[u8], quote: u8) -> Vec<u8> {
    let mut out = Vec::new();
    escape_csv_field_into(value, quote, &mut out);
    out
}

/// [`escape_csv_field`], appending to `out`.
pub fn escape_csv_field_into(value: &[u8], quote: u8, out: &mut Vec<u8>) {
    if value.is_empty() {
        return;
    }
    out.reserve(value.len() + 2);
    out.push(quote);
    let mut rest = value;
    while let Some(i) = memchr(quote, rest) {
        out.extend_from_slice(&rest[..=i]);
        out.push(quote);
        rest = &rest[i + 1..];
    }
    out.extend_from_slice(rest);
    out.push(quote);
}

/// [`escape_csv_field`] for text.
#[must_use]
pub fn escape_csv_str(value: &str, quote: char) -> String {
    if value.is_empty() {
        return String::new();
    }
    let q = quote.to_string();
    format!("{q}{}{q}", value.replace(quote, &format!("{q}{q}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(data: &str, max_row_len: usize) -> CsvReader {
        let opts = ReaderOptions::default().with_max_row_len(max_row_len);
        CsvReader::from_reader("test", Box::new(io::Cursor::new(data.as_bytes().to_vec())), &opts)
    }

    #[test]
    fn trailing_separator_yields_empty_field() {
        let mut rdr = reader("a,b,\n", 64);
        let mut row = rdr.next_row().unwrap();
        assert_eq!(row.parse_line().unwrap(), vec!["a", "b", ""]);
    }

    #[test]
    fn blank_row_has_one_empty_field() {
        let mut rdr = reader("\r\n", 64);
        let mut row = rdr.next_row().unwrap();
        assert!(row.is_blank());
        assert_eq!(row.parse_line().unwrap(), vec![""]);
    }

    #[test]
    fn syntax_error_resumes_after_bad_quote() {
        let mut rdr = reader("\"ab\"x,c\n", 64);
        let mut row = rdr.next_row().unwrap();
        let err = row.read_csv_field().unwrap().unwrap_err();
        assert_eq!(err, CsvError::QuoteSyntax { offset: 4, found: 'x' });
        let next = row.read_csv_field().unwrap().unwrap();
        assert_eq!(row.get(next), b"x");
    }

    #[test]
    fn reset_rescans_row() {
        let mut rdr = reader("a,b\n", 64);
        let mut row = rdr.next_row().unwrap();
        assert_eq!(row.parse_line().unwrap().len(), 2);
        row.reset_field_cursor();
        assert_eq!(row.parse_line().unwrap().len(), 2);
    }

    #[test]
    fn raw_read_returns_rest_of_row_then_buffer() {
        let mut rdr = reader("a,b\nc,d\n", 64);
        let mut row = rdr.next_row().unwrap();
        let first = row.read_csv_field().unwrap().unwrap();
        assert_eq!(row.get(first), b"a");
        assert_eq!(rdr.read(100), b"b\n");
        assert_eq!(rdr.read(100), b"c,d\n");
    }

    #[test]
    fn quote_at_end_without_opening_is_literal() {
        assert_eq!(&*unescape_csv_field(b"ab\"", b'"'), b"ab\"");
        assert_eq!(&*unescape_csv_field(b"\"\"", b'"'), b"");
        assert_eq!(escape_csv_str("a\"b", '"'), "\"a\"\"b\"");
    }
}
