//! Counters describing an aggregation run.
//!
//! [`RunStats`] is filled in by the engine as files are processed and
//! rendered as JSON. The binary prints it to stderr, since stdout usually
//! carries the CSV output.
//!
//! ```no_run
//! use ironcsv::config::EngineOptions;
//! use ironcsv::engine::{AggregSpec, Aggregation};
//! use ironcsv::io::Input;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut engine = Aggregation::new(AggregSpec::parse("name,count()")?, EngineOptions::default());
//! engine.aggregate(&Input::from_arg("events.csv"))?;
//! let stats = engine.stats();
//! eprintln!("{}", serde_json::to_string_pretty(&stats.to_json())?);
//! # Ok(())
//! # }
//! ```

use serde::Serialize;
use serde_json::Value;
use std::time::Instant;

/// Outcome of processing one input.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    /// Input name, `<stdin>` for standard input.
    pub input: String,
    /// Data rows read, header excluded.
    pub rows_read: u64,
    /// Rows folded into the aggregate.
    pub rows_folded: u64,
    /// Rows dropped for a wrong field count or a quote syntax error.
    pub rows_skipped: u64,
    /// Empty rows ignored in multi-column input.
    pub blank_rows: u64,
    /// Physical lines dropped for exceeding the line buffer.
    pub lines_too_long: u64,
    /// Groups created by this input.
    pub new_groups: u64,
    /// Codec the input was decompressed with.
    pub compression: Option<&'static str>,
    /// Error that ended processing of this input early.
    pub error: Option<String>,
}

impl FileSummary {
    #[must_use]
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Aggregate counters over all inputs of a run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunStats {
    pub files_ok: u64,
    pub files_failed: u64,
    pub rows_read: u64,
    pub rows_folded: u64,
    pub rows_skipped: u64,
    pub blank_rows: u64,
    pub lines_too_long: u64,
    /// Distinct groups held by the engine.
    pub groups: u64,
    pub hash_capacity: u64,
    pub rehashes: u32,
    pub longest_probe: u64,
    pub arena_allocated_bytes: u64,
    pub arena_reserved_bytes: u64,
    pub arena_chunks: u64,
    pub elapsed_ms: u64,
    pub files: Vec<FileSummary>,
    #[serde(skip)]
    started: Option<Instant>,
}

impl RunStats {
    /// Start the wall clock used for `elapsed_ms`.
    pub fn record_start(&mut self) {
        self.started.get_or_insert_with(Instant::now);
    }

    /// Update `elapsed_ms` from the start recorded earlier.
    pub fn record_end(&mut self) {
        if let Some(start) = self.started {
            self.elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        }
    }

    /// Add one input's summary to the totals.
    pub fn record_file(&mut self, file: FileSummary) {
        if file.failed() {
            self.files_failed += 1;
        } else {
            self.files_ok += 1;
        }
        self.rows_read += file.rows_read;
        self.rows_folded += file.rows_folded;
        self.rows_skipped += file.rows_skipped;
        self.blank_rows += file.blank_rows;
        self.lines_too_long += file.lines_too_long;
        self.files.push(file);
    }

    /// Whether any input failed to be fully processed.
    #[must_use]
    pub fn any_failed(&self) -> bool {
        self.files_failed > 0
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_follow_file_summaries() {
        let mut stats = RunStats::default();
        stats.record_file(FileSummary {
            rows_read: 10,
            rows_folded: 8,
            rows_skipped: 2,
            ..FileSummary::new("a.csv")
        });
        stats.record_file(FileSummary {
            error: Some("column not found: x, skipping file".into()),
            ..FileSummary::new("b.csv")
        });
        assert_eq!((stats.files_ok, stats.files_failed), (1, 1));
        assert!(stats.any_failed());

        let json = stats.to_json();
        assert_eq!(json["rows_folded"], 8);
        assert_eq!(json["files"][1]["input"], "b.csv");
        assert!(json.get("started").is_none());
    }
}
