//! Error types for the reader, the arena and the aggregation engine.
//!
//! The split follows how far a failure reaches:
//! - [`OpenError`] and [`CsvError`] concern one input,
//! - [`ArenaError`] means aggregation state can no longer grow,
//! - a malformed aggregate spec stops the run before any file is read,
//! - [`AggregError`] wraps both and tells the caller, through
//!   [`AggregError::is_fatal`], whether the run may continue with the next file.

use std::io;
use std::path::PathBuf;

/// Failure to open an input.
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("cannot open {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("won't read from <stdin>, is a tty. To force, use '-'")]
    StdinIsTty,

    #[error("cannot set up {codec} decompression: {source}")]
    Codec {
        codec: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Row level parse failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CsvError {
    /// A closing quote followed by something other than a quote or the separator.
    #[error("csv syntax error at byte {offset}: quote followed by {found:?}")]
    QuoteSyntax { offset: usize, found: char },

    /// A quoted field did not terminate within the row length limit or before end of input.
    #[error("csv row too long (maybe unclosed quote?) near '{sample}'")]
    RowTooLong { sample: String },

    /// End of input inside a quoted field.
    #[error("unterminated quoted field near '{sample}'")]
    UnterminatedQuote { sample: String },
}

impl CsvError {
    /// Whether the reader can go on with the next row.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CsvError::QuoteSyntax { .. })
    }
}

/// The arena could not hand out more memory.
#[derive(Debug, thiserror::Error)]
pub enum ArenaError {
    #[error("cannot create spill file in {}: {source}", dir.display())]
    SpillFile {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot map {size} bytes: {source}")]
    Map {
        size: usize,
        #[source]
        source: io::Error,
    },

    #[error("allocation of {0} bytes exceeds the addressable chunk size")]
    TooLarge(usize),
}

/// Errors raised while configuring or running an aggregation.
#[derive(Debug, thiserror::Error)]
pub enum AggregError {
    #[error("syntax error in aggregate spec: {0}")]
    SpecSyntax(String),

    #[error("invalid aggregator function {0}")]
    UnknownFunction(String),

    #[error("empty aggregator")]
    EmptySpec,

    #[error("column not found: {0}, skipping file")]
    ColumnNotFound(String),

    #[error("merge input header does not match the aggregate columns: expected {expected:?}, found {found:?}")]
    MergeSchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("{input}: {source}")]
    Row {
        input: String,
        #[source]
        source: CsvError,
    },

    #[error("{input}: read error: {source}")]
    Read {
        input: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Open(#[from] OpenError),

    #[error("aggregation state exhausted: {0}")]
    Arena(#[from] ArenaError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl AggregError {
    /// Whether the whole run has to stop, as opposed to skipping the current file.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AggregError::Arena(_)
                | AggregError::Io(_)
                | AggregError::SpecSyntax(_)
                | AggregError::UnknownFunction(_)
                | AggregError::EmptySpec
        )
    }
}
