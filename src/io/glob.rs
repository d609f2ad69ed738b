//! Turning command line input arguments into [`Input`]s.
//!
//! An argument that names an existing path, or `-`, is taken literally.
//! Anything else containing glob metacharacters is expanded, with matches
//! sorted so runs over the same file set are reproducible.
//!
//! ```no_run
//! use ironcsv::io::glob::expand_inputs;
//!
//! let inputs = expand_inputs(&["logs/2024-*.csv.gz".to_string(), "-".to_string()])?;
//! # use anyhow::Error; Ok::<(), Error>(())
//! ```

use crate::io::source::Input;
use anyhow::{Context, Result, bail};
use glob::glob;
use std::path::{Path, PathBuf};

/// Expand a glob pattern into a sorted vector of matching file paths.
///
/// Directories are left out.
///
/// # Errors
/// Returns an error if the pattern is invalid or a matched entry cannot be read.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))?;

    let mut result = Vec::new();
    for entry in paths {
        let path =
            entry.with_context(|| format!("error reading glob entry for pattern: {pattern}"))?;
        if path.is_file() {
            result.push(path);
        }
    }
    result.sort();
    Ok(result)
}

fn has_glob_meta(arg: &str) -> bool {
    arg.contains(['*', '?', '['])
}

/// Resolve input arguments in order. No arguments means implicit stdin.
///
/// A pattern that matches nothing is an error; a plain path that does not
/// exist is passed through so the open failure is reported against that file.
///
/// # Errors
/// Returns an error for an invalid pattern or a pattern without matches.
pub fn expand_inputs(args: &[String]) -> Result<Vec<Input>> {
    if args.is_empty() {
        return Ok(vec![Input::DefaultStdin]);
    }

    let mut inputs = Vec::with_capacity(args.len());
    for arg in args {
        if arg == "-" || Path::new(arg).exists() || !has_glob_meta(arg) {
            inputs.push(Input::from_arg(arg));
            continue;
        }
        let matches = expand_glob(arg)?;
        if matches.is_empty() {
            bail!("no files found matching pattern: {arg}");
        }
        log::debug!("{arg}: {} files", matches.len());
        inputs.extend(matches.into_iter().map(Input::Path));
    }
    Ok(inputs)
}
