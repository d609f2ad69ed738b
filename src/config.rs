//! Reader, arena and engine configuration.
//!
//! Every struct has working defaults and can be loaded from JSON, where all
//! fields are optional:
//!
//! ```json
//! {
//!   "reader": { "separator": ";", "max_row_len": 1048576, "has_headers": true },
//!   "arena": { "spill_dir": "/var/tmp" }
//! }
//! ```

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Default line buffer capacity and row length limit.
pub const DEFAULT_MAX_ROW_LEN: usize = 64 * 1024;
/// Default size of the first arena chunk.
pub const DEFAULT_MIN_CHUNK: usize = 16 * 1024 * 1024;
/// Default ceiling for geometric chunk growth.
pub const DEFAULT_MAX_CHUNK: usize = 256 * 1024 * 1024;

/// How input bytes are split into rows and fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Field separator.
    #[serde(with = "byte_char")]
    pub separator: u8,
    /// Quote character; doubled inside a quoted field to stand for itself.
    #[serde(with = "byte_char")]
    pub quote: u8,
    /// Capacity of the line buffer, also the limit for a row spanning several lines.
    pub max_row_len: usize,
    /// Whether the first row holds column names.
    pub has_headers: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            separator: b',',
            quote: b'"',
            max_row_len: DEFAULT_MAX_ROW_LEN,
            has_headers: true,
        }
    }
}

impl ReaderOptions {
    /// Builder-style separator override.
    #[must_use]
    pub fn with_separator(mut self, separator: u8) -> Self {
        self.separator = separator;
        self
    }

    /// Builder-style quote override.
    #[must_use]
    pub fn with_quote(mut self, quote: u8) -> Self {
        self.quote = quote;
        self
    }

    /// Builder-style row length override.
    #[must_use]
    pub fn with_max_row_len(mut self, max_row_len: usize) -> Self {
        self.max_row_len = max_row_len;
        self
    }

    /// Builder-style header flag override.
    #[must_use]
    pub fn with_headers(mut self, has_headers: bool) -> Self {
        self.has_headers = has_headers;
        self
    }

    /// Reject combinations the parser cannot work with.
    ///
    /// # Errors
    /// Returns an error when separator and quote coincide, when either one is
    /// a line terminator, or when the row limit is too small to hold anything.
    pub fn validate(&self) -> Result<()> {
        if self.separator == self.quote {
            bail!("separator and quote must differ");
        }
        if matches!(self.separator, b'\n' | b'\r') || matches!(self.quote, b'\n' | b'\r') {
            bail!("separator and quote cannot be line terminators");
        }
        if self.max_row_len < 4 {
            bail!("max_row_len must be at least 4 bytes, got {}", self.max_row_len);
        }
        Ok(())
    }
}

/// Chunk sizing and backing store for the bump arena.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaOptions {
    /// Size of the first chunk.
    pub min_chunk: usize,
    /// Chunks double in size until they reach this.
    pub max_chunk: usize,
    /// Directory for file-backed chunks. `None` maps anonymous memory.
    pub spill_dir: Option<PathBuf>,
}

impl Default for ArenaOptions {
    fn default() -> Self {
        Self {
            min_chunk: DEFAULT_MIN_CHUNK,
            max_chunk: DEFAULT_MAX_CHUNK,
            spill_dir: None,
        }
    }
}

/// Everything an [`Aggregation`](crate::engine::Aggregation) needs besides its spec.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    pub reader: ReaderOptions,
    pub arena: ArenaOptions,
}

impl EngineOptions {
    /// Load options from a JSON file. Missing fields keep their defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid JSON for this
    /// structure, or describes invalid reader options.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let opts: Self = serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse config {}", path.display()))?;
        opts.reader
            .validate()
            .with_context(|| format!("invalid reader options in {}", path.display()))?;
        Ok(opts)
    }
}

/// Serde adapter storing a single-byte character as a one-character string.
mod byte_char {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(b: &u8, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&char::from(*b).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
        let s = String::deserialize(d)?;
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii() => Ok(c as u8),
            _ => Err(D::Error::custom(format!(
                "expected a single ASCII character, got {s:?}"
            ))),
        }
    }
}
