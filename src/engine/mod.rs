//! Group-by aggregation over CSV inputs.
//!
//! An [`Aggregation`] is built once from an [`AggregSpec`] and then fed any
//! number of inputs, either raw ([`Aggregation::aggregate`]) or as earlier
//! outputs of the same spec ([`Aggregation::merge`]). Groups live in an
//! [`OpenHashSet`] whose keys and states are allocated from an [`Arena`], so
//! with a spill directory the aggregate can grow past physical memory.
//!
//! ```no_run
//! use ironcsv::config::EngineOptions;
//! use ironcsv::engine::{AggregSpec, Aggregation};
//! use ironcsv::io::Input;
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! let spec = AggregSpec::parse("name,max(score),count()")?;
//! let mut engine = Aggregation::new(spec, EngineOptions::default());
//! for file in ["scores-1.csv", "scores-2.csv.gz"] {
//!     if let Err(e) = engine.aggregate(&Input::from_arg(file)) {
//!         if e.is_fatal() {
//!             return Err(e.into());
//!         }
//!     }
//! }
//! engine.write_output(Some(Path::new("out.csv")))?;
//! # Ok(())
//! # }
//! ```
//!
//! Failures are scoped the way [`AggregError::is_fatal`] describes: a bad
//! row is skipped, a bad file is abandoned, and only arena exhaustion stops
//! the whole run.

pub mod spec;
mod state;

pub use spec::{AggregColumn, AggregSpec};

use crate::arena::{Arena, BumpArena};
use crate::config::EngineOptions;
use crate::error::{AggregError, CsvError};
use crate::hashset::OpenHashSet;
use crate::io::csv::{CsvReader, Row, escape_csv_field_into, unescape_csv_field};
use crate::io::output::OutputBuffer;
use crate::io::source::Input;
use crate::metrics::{FileSummary, RunStats};
use crate::utils::murmur3_64;
use anyhow::Context;
use state::Binding;
use std::borrow::Cow;
use std::io;
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Aggregate,
    Merge,
}

enum RowOutcome {
    Folded { new_group: bool },
    Blank,
    WrongWidth(usize),
    Invalid(CsvError),
}

/// Group-by aggregation state.
pub struct Aggregation<A: Arena = BumpArena> {
    spec: AggregSpec,
    opts: EngineOptions,
    arena: A,
    table: OpenHashSet,
    stats: RunStats,
    // scratch reused across rows
    key: Vec<u8>,
    spans: Vec<Option<(usize, usize)>>,
}

impl Aggregation<BumpArena> {
    /// Engine backed by a [`BumpArena`] configured from `opts.arena`.
    #[must_use]
    pub fn new(spec: AggregSpec, opts: EngineOptions) -> Self {
        let arena = BumpArena::new(opts.arena.clone());
        Self::with_arena(spec, opts, arena)
    }
}

impl<A: Arena> Aggregation<A> {
    pub fn with_arena(spec: AggregSpec, opts: EngineOptions, arena: A) -> Self {
        let mut stats = RunStats::default();
        stats.record_start();
        Self {
            spec,
            opts,
            arena,
            table: OpenHashSet::new(),
            stats,
            key: Vec::new(),
            spans: Vec::new(),
        }
    }

    #[must_use]
    pub fn spec(&self) -> &AggregSpec {
        &self.spec
    }

    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.opts
    }

    /// Number of groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Fold the rows of a raw input into the aggregate.
    ///
    /// # Errors
    /// Returns an error when the input could not be processed to its end.
    /// Rows folded before the failure stay in the aggregate. Check
    /// [`AggregError::is_fatal`] to decide whether to go on with other inputs.
    pub fn aggregate(&mut self, input: &Input) -> Result<FileSummary, AggregError> {
        self.process(input, Mode::Aggregate)
    }

    /// Fold an earlier output of this same spec into the aggregate.
    ///
    /// # Errors
    /// As for [`aggregate`](Self::aggregate); additionally
    /// [`AggregError::MergeSchemaMismatch`] when the header differs from the
    /// output column names.
    pub fn merge(&mut self, input: &Input) -> Result<FileSummary, AggregError> {
        self.process(input, Mode::Merge)
    }

    fn process(&mut self, input: &Input, mode: Mode) -> Result<FileSummary, AggregError> {
        let mut summary = FileSummary::new(input.to_string());
        let result = match CsvReader::open(input, &self.opts.reader) {
            Ok(mut reader) => {
                summary.compression = reader.compression();
                let res = self.fold_file(&mut reader, mode, &mut summary);
                summary.lines_too_long = reader.skipped_lines();
                res
            }
            Err(e) => Err(e.into()),
        };

        if let Err(e) = &result {
            log::error!("{e}");
            summary.error = Some(e.to_string());
        } else {
            log::info!(
                "{}: {} rows folded, {} skipped, {} new groups",
                summary.input,
                summary.rows_folded,
                summary.rows_skipped,
                summary.new_groups
            );
        }
        self.stats.record_file(summary.clone());
        result.map(|()| summary)
    }

    fn fold_file(
        &mut self,
        reader: &mut CsvReader,
        mode: Mode,
        summary: &mut FileSummary,
    ) -> Result<(), AggregError> {
        let name = reader.name().to_string();
        let row_error = |source: CsvError| AggregError::Row {
            input: name.clone(),
            source,
        };

        // merge inputs are outputs of this tool and always carry a header
        let has_headers = self.opts.reader.has_headers || mode == Mode::Merge;
        if !reader.fetch_line() {
            log::info!("{name}: empty input");
            return finish(reader, &name);
        }

        let binding = if has_headers {
            let headers = reader.current_row().parse_line().map_err(row_error)?;
            match mode {
                Mode::Aggregate => Binding::by_name(&self.spec, &headers)?,
                Mode::Merge => Binding::for_merge(&self.spec, &headers)?,
            }
        } else {
            let Some(width) = discover_width(reader, &name, summary).map_err(row_error)? else {
                return finish(reader, &name);
            };
            Binding::by_position(&self.spec, width)?
        };
        log::debug!("{name}: {:?} bound to input fields {:?}", mode, binding.input_of);

        // without a header the row used for binding is the first data row
        let mut pending = !has_headers;
        loop {
            if !pending && !reader.fetch_line() {
                break;
            }
            pending = false;

            let mut row = reader.current_row();
            summary.rows_read += 1;
            match self.fold_row(&mut row, &binding, mode)? {
                RowOutcome::Folded { new_group } => {
                    summary.rows_folded += 1;
                    summary.new_groups += u64::from(new_group);
                }
                RowOutcome::Blank => summary.blank_rows += 1,
                RowOutcome::WrongWidth(found) => {
                    summary.rows_skipped += 1;
                    log::warn!(
                        "{name}: line {}: expected {} fields, found {found}, skipping row",
                        row.line_number(),
                        binding.width
                    );
                }
                RowOutcome::Invalid(e) if e.is_recoverable() => {
                    summary.rows_skipped += 1;
                    log::warn!("{name}: line {}: {e}, skipping row", row.line_number());
                }
                RowOutcome::Invalid(e) => return Err(row_error(e)),
            }
        }

        finish(reader, &name)
    }

    fn fold_row(
        &mut self,
        row: &mut Row<'_>,
        binding: &Binding,
        mode: Mode,
    ) -> Result<RowOutcome, AggregError> {
        self.spans.clear();
        self.spans.resize(binding.width, None);

        let mut count = 0;
        while let Some(field) = row.read_csv_field() {
            let span = match field {
                Ok(span) => span,
                Err(e) => return Ok(RowOutcome::Invalid(e)),
            };
            if count < binding.width && binding.needed[count] {
                self.spans[count] = Some((span.offset(), span.len()));
            }
            count += 1;
        }

        if count != binding.width {
            if row.is_blank() && binding.width > 1 {
                return Ok(RowOutcome::Blank);
            }
            return Ok(RowOutcome::WrongWidth(count));
        }

        let new_group = self.fold_fields(row, binding, mode)?;
        Ok(RowOutcome::Folded { new_group })
    }

    /// Find or create the row's group and fold the bound fields, then the unbound columns.
    fn fold_fields(&mut self, row: &Row<'_>, binding: &Binding, mode: Mode) -> Result<bool, AggregError> {
        let quote = self.opts.reader.quote;

        self.key.clear();
        for (ci, col) in self.spec.columns().iter().enumerate() {
            if col.aggregator.is_key() {
                let value = field_value(row, &self.spans, binding.input_of[ci], quote);
                state::push_key_part(&mut self.key, col.aggregator, &value);
            }
        }

        let hash = murmur3_64(&self.key, 0);
        let (bucket, first) = match self.table.find(&self.arena, hash, &self.key) {
            Some(bucket) => (bucket, false),
            None => {
                let bucket = state::new_bucket(&mut self.arena, hash, &self.key, self.spec.len())?;
                self.table.insert(bucket);
                (bucket, true)
            }
        };

        for bound in [true, false] {
            for (ci, col) in self.spec.columns().iter().enumerate() {
                let input = binding.input_of[ci];
                if input.is_some() != bound {
                    continue;
                }
                let mut slot = state::read_slot(&self.arena, &bucket, ci);
                if input.is_some() {
                    let value = field_value(row, &self.spans, input, quote);
                    match mode {
                        Mode::Aggregate => {
                            col.aggregator
                                .aggreg(&mut self.arena, &mut slot, Some(&*value), first)?;
                        }
                        Mode::Merge => {
                            col.aggregator.merge(&mut self.arena, &mut slot, &value, first)?;
                        }
                    }
                } else {
                    col.aggregator.aggreg(&mut self.arena, &mut slot, None, first)?;
                }
                state::write_slot(&mut self.arena, &bucket, ci, &slot);
            }
        }
        Ok(first)
    }

    /// Write the header and one row per group, in table order.
    ///
    /// Header names are always quoted; rows end with `\r\n`.
    ///
    /// # Errors
    /// Returns the output's write error.
    pub fn dump_output(&self, out: &mut OutputBuffer) -> io::Result<u64> {
        let (sep, quote) = (self.opts.reader.separator, self.opts.reader.quote);
        let mut line = Vec::new();

        for (i, name) in self.spec.outnames().enumerate() {
            if i > 0 {
                line.push(sep);
            }
            escape_csv_field_into(name.as_bytes(), quote, &mut line);
        }
        out.append(&line)?;
        out.append_nl()?;

        let mut rows = 0;
        for bucket in self.table.iter() {
            line.clear();
            for (ci, col) in self.spec.columns().iter().enumerate() {
                if ci > 0 {
                    line.push(sep);
                }
                let slot = state::read_slot(&self.arena, bucket, ci);
                col.aggregator.out(&self.arena, &slot, quote, &mut line);
            }
            out.append(&line)?;
            out.append_nl()?;
            rows += 1;
        }
        out.flush()?;
        Ok(rows)
    }

    /// [`dump_output`](Self::dump_output) to a file, compressed by extension,
    /// or to stdout. The output is finished before returning, so a
    /// compressed file is complete once this succeeds.
    ///
    /// # Errors
    /// Returns an error if the output cannot be created, written or finished.
    pub fn write_output(&self, path: Option<&Path>) -> anyhow::Result<u64> {
        let target = path.map_or_else(|| "<stdout>".to_string(), |p| p.display().to_string());
        let mut out = OutputBuffer::create(path)?;
        let rows = self
            .dump_output(&mut out)
            .with_context(|| format!("write {target}"))?;
        out.finish().with_context(|| format!("finish {target}"))?;
        log::info!("{target}: {rows} groups written");
        Ok(rows)
    }

    /// Counters so far, including table and arena figures.
    #[must_use]
    pub fn stats(&self) -> RunStats {
        let mut stats = self.stats.clone();
        stats.groups = self.table.len() as u64;
        stats.hash_capacity = self.table.capacity() as u64;
        stats.rehashes = self.table.rehash_count();
        stats.longest_probe = self.table.longest_probe() as u64;
        stats.arena_allocated_bytes = self.arena.allocated_bytes();
        stats.arena_reserved_bytes = self.arena.reserved_bytes();
        stats.arena_chunks = self.arena.chunk_count() as u64;
        stats.record_end();
        stats
    }
}

fn field_value<'a>(
    row: &'a Row<'_>,
    spans: &[Option<(usize, usize)>],
    input: Option<usize>,
    quote: u8,
) -> Cow<'a, [u8]> {
    match input.and_then(|i| spans[i]) {
        Some((offset, len)) => unescape_csv_field(row.field_at(offset, len), quote),
        None => Cow::Borrowed(&[][..]),
    }
}

/// Count the fields of the first parsable row of header-less input and
/// rewind it. Rows with a quote syntax error are skipped on the way.
/// `None` when no row is left.
fn discover_width(
    reader: &mut CsvReader,
    name: &str,
    summary: &mut FileSummary,
) -> Result<Option<usize>, CsvError> {
    loop {
        let mut row = reader.current_row();
        let mut width = 0;
        let mut failed = None;
        while let Some(field) = row.read_csv_field() {
            match field {
                Ok(_) => width += 1,
                Err(e) => {
                    failed = Some(e);
                    break;
                }
            }
        }
        match failed {
            None => {
                row.reset_field_cursor();
                return Ok(Some(width));
            }
            Some(e) if e.is_recoverable() => {
                summary.rows_read += 1;
                summary.rows_skipped += 1;
                log::warn!("{name}: line {}: {e}, skipping row", row.line_number());
            }
            Some(e) => return Err(e),
        }
        if !reader.fetch_line() {
            return Ok(None);
        }
    }
}

fn finish(reader: &mut CsvReader, name: &str) -> Result<(), AggregError> {
    match reader.take_io_error() {
        Some(source) => Err(AggregError::Read {
            input: name.to_string(),
            source,
        }),
        None => Ok(()),
    }
}
