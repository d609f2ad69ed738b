//! Reading and writing CSV bytes.
//!
//! - [`source`]: files and standard input
//! - [`compression`]: transparent codecs on both sides
//! - [`line_reader`]: newline splitting with BOM and UTF-16 handling
//! - [`csv`]: quote-aware rows and fields
//! - [`output`]: batched output
//! - [`glob`]: expanding input arguments

pub mod compression;
pub mod csv;
pub mod glob;
pub mod line_reader;
pub mod output;
pub mod source;

pub use self::csv::{CsvReader, FieldSpan, Row, escape_csv_field, escape_csv_str, unescape_csv_field};
pub use line_reader::{Encoding, LineReader};
pub use output::OutputBuffer;
pub use source::Input;
