//! # ironcsv
//!
//! A **streaming CSV toolkit** with an out-of-core group-by engine.
//!
//! ## Key Features
//!
//! - **Streaming reader** - rows are borrowed from a fixed-size line buffer and
//!   copied only when a quoted field spans several lines
//! - **Tolerant parsing** - oversized lines, bad quotes and short rows are
//!   reported and skipped instead of aborting the run
//! - **Transparent input decoding** - gzip, zstd, bzip2 and xz by magic bytes
//!   (feature flags), UTF-8 and UTF-16 byte order marks
//! - **Group-by aggregation** - `str`, `downcase`, `top20`, `min`, `max`,
//!   `minstr`, `maxstr` and `count` over any number of files
//! - **Map-reduce merging** - partial outputs of the same spec fold into one
//! - **Disk-backed state** - aggregation memory can live in unlinked
//!   temporary files, paged by the operating system
//!
//! ## Quick Start
//!
//! ```
//! use ironcsv::config::EngineOptions;
//! use ironcsv::engine::{AggregSpec, Aggregation};
//! use ironcsv::io::{Input, OutputBuffer};
//!
//! # fn main() -> anyhow::Result<()> {
//! # let dir = tempfile::tempdir()?;
//! # let path = dir.path().join("scores.csv");
//! # std::fs::write(&path, "name,score\nalice,3\nbob,5\nalice,7\n")?;
//! let spec = AggregSpec::parse("name,max(score)")?;
//! let mut engine = Aggregation::new(spec, EngineOptions::default());
//! engine.aggregate(&Input::from(path.as_path()))?;
//! assert_eq!(engine.len(), 2);
//!
//! let mut out = OutputBuffer::new(Box::new(std::io::sink()));
//! engine.dump_output(&mut out)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`io`] - byte sources, codecs, the line reader, the CSV reader and output
//! - [`engine`] - spec parsing and the aggregation engine
//! - [`aggregators`] - the built-in accumulators
//! - [`hashset`] - the insert-only table holding groups
//! - [`arena`] - the bump allocator holding keys and states
//! - [`config`] - options, loadable from JSON
//! - [`metrics`] - run counters
//! - [`error`] - error types

pub mod aggregators;
pub mod arena;
pub mod config;
pub mod engine;
pub mod error;
pub mod hashset;
pub mod io;
pub mod metrics;
pub mod utils;

pub use aggregators::Aggregator;
pub use arena::{Arena, ArenaSlice, BumpArena};
pub use config::{ArenaOptions, EngineOptions, ReaderOptions};
pub use engine::{AggregColumn, AggregSpec, Aggregation};
pub use error::{AggregError, ArenaError, CsvError, OpenError};
pub use io::{CsvReader, Input, OutputBuffer};
pub use metrics::{FileSummary, RunStats};
