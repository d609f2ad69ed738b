//! `csv-aggr`: group-by aggregation over CSV files.
//!
//! ```text
//! csv-aggr 'name,max(score),count()' scores-*.csv.gz -o totals.csv
//! csv-aggr -m 'name,max(score),count()' part-1.csv part-2.csv
//! ```

use anyhow::{Context, Result, bail};
use clap::Parser;
use ironcsv::config::EngineOptions;
use ironcsv::engine::{AggregSpec, Aggregation};
use ironcsv::io::glob::expand_inputs;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "csv-aggr",
    version,
    about = "Group CSV rows by key columns and aggregate the others.",
    after_help = "Functions: str(col), downcase(col), top20(col), min(col), max(col), \
                  minstr(col), maxstr(col), count().\n\
                  A bare column name means str(col); name=func(col) renames the output column."
)]
struct Args {
    /// Aggregate spec, for example `name,hits=count(),max(score)`.
    spec: String,

    /// Input files or glob patterns; `-` is stdin. Reads stdin when omitted.
    files: Vec<String>,

    /// Write to this file instead of stdout. Compressed by extension.
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Maximum row length in bytes, also the line buffer size.
    #[arg(short = 'L', long, value_name = "BYTES")]
    max_line_len: Option<usize>,

    /// Inputs are outputs of earlier runs with the same spec.
    #[arg(short, long)]
    merge: bool,

    /// Field separator; accepts `\t`, `\0`, `\f` and `\\`.
    #[arg(short, long, value_parser = parse_byte_char)]
    separator: Option<u8>,

    /// Quote character.
    #[arg(short, long, value_parser = parse_byte_char)]
    quote: Option<u8>,

    /// Inputs have no header; columns are named 0, 1, ...
    #[arg(short = 'H', long)]
    no_header: bool,

    /// Keep aggregation state in files under this directory.
    #[arg(short = 'T', long, value_name = "DIR")]
    spill_dir: Option<PathBuf>,

    /// JSON file with reader and arena options. Flags take precedence.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print run statistics as JSON to stderr.
    #[arg(long)]
    stats: bool,
}

/// Parse a single-byte character, with the usual backslash escapes.
fn parse_byte_char(s: &str) -> Result<u8, String> {
    match s {
        "\\t" => Ok(b'\t'),
        "\\0" => Ok(b'\0'),
        "\\f" => Ok(0x0c),
        "\\\\" => Ok(b'\\'),
        _ => match s.as_bytes() {
            [b] if b.is_ascii() => Ok(*b),
            _ => Err(format!("expected a single ASCII character, got {s:?}")),
        },
    }
}

impl Args {
    fn options(&self) -> Result<EngineOptions> {
        let mut opts = match &self.config {
            Some(path) => EngineOptions::from_json_file(path)?,
            None => EngineOptions::default(),
        };
        if let Some(sep) = self.separator {
            opts.reader.separator = sep;
        }
        if let Some(quote) = self.quote {
            opts.reader.quote = quote;
        }
        if let Some(len) = self.max_line_len {
            opts.reader.max_row_len = len;
        }
        if self.no_header {
            opts.reader.has_headers = false;
        }
        if let Some(dir) = &self.spill_dir {
            if !dir.is_dir() {
                bail!("spill directory {} does not exist", dir.display());
            }
            opts.arena.spill_dir = Some(dir.clone());
        }
        opts.reader.validate()?;
        Ok(opts)
    }
}

/// Returns whether every input was processed completely.
fn run(args: &Args) -> Result<bool> {
    let opts = args.options()?;
    let spec = AggregSpec::parse(&args.spec).context("invalid aggregate spec")?;
    let inputs = expand_inputs(&args.files)?;

    let mut engine = Aggregation::new(spec, opts);
    for input in &inputs {
        let res = if args.merge {
            engine.merge(input)
        } else {
            engine.aggregate(input)
        };
        if let Err(e) = res
            && e.is_fatal()
        {
            return Err(e).context("aborting");
        }
    }

    engine.write_output(args.output.as_deref())?;

    let stats = engine.stats();
    if args.stats {
        eprintln!("{}", serde_json::to_string_pretty(&stats.to_json())?);
    }
    Ok(!stats.any_failed())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separator_escapes() {
        assert_eq!(parse_byte_char("\\t"), Ok(b'\t'));
        assert_eq!(parse_byte_char("\\0"), Ok(0));
        assert_eq!(parse_byte_char("\\f"), Ok(0x0c));
        assert_eq!(parse_byte_char("\\\\"), Ok(b'\\'));
        assert_eq!(parse_byte_char(";"), Ok(b';'));
        assert!(parse_byte_char("ab").is_err());
        assert!(parse_byte_char("").is_err());
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::parse_from(["csv-aggr", "-s", "\\t", "-H", "-L", "128", "0,count()"]);
        let opts = args.options().unwrap();
        assert_eq!(opts.reader.separator, b'\t');
        assert!(!opts.reader.has_headers);
        assert_eq!(opts.reader.max_row_len, 128);
    }
}
