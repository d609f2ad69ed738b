//! Byte sources: files and standard input.

use crate::error::OpenError;
use std::fmt;
use std::fs::File;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

/// Where input bytes come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    /// Standard input, requested explicitly with `-`.
    Stdin,
    /// Standard input because no file was named. Refused when it is a terminal.
    DefaultStdin,
    /// A file on disk.
    Path(PathBuf),
}

impl Input {
    /// Interpret a command line argument: `-` is stdin, anything else a path.
    #[must_use]
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            Input::Stdin
        } else {
            Input::Path(PathBuf::from(arg))
        }
    }

    /// Open the raw byte stream.
    ///
    /// # Errors
    /// Returns [`OpenError::Io`] if the file cannot be opened and
    /// [`OpenError::StdinIsTty`] when reading implicit stdin from a terminal.
    pub fn open(&self) -> Result<Box<dyn Read>, OpenError> {
        match self {
            Input::Stdin => Ok(Box::new(io::stdin())),
            Input::DefaultStdin => {
                if io::stdin().is_terminal() {
                    return Err(OpenError::StdinIsTty);
                }
                Ok(Box::new(io::stdin()))
            }
            Input::Path(path) => File::open(path)
                .map(|f| Box::new(f) as Box<dyn Read>)
                .map_err(|source| OpenError::Io {
                    path: path.clone(),
                    source,
                }),
        }
    }
}

impl From<&Path> for Input {
    fn from(path: &Path) -> Self {
        Input::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for Input {
    fn from(path: PathBuf) -> Self {
        Input::Path(path)
    }
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Stdin | Input::DefaultStdin => f.write_str("<stdin>"),
            Input::Path(p) => write!(f, "{}", p.display()),
        }
    }
}
