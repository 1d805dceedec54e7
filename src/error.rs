use std::io;
use std::path::PathBuf;

use nix::unistd::Pid;
use thiserror::Error;

/// Result type for anything the prompt loop can recover from.
pub type ShellResult<T> = Result<T, ShellError>;

/// The line could not be turned into a runnable topology. Nothing was spawned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("too many commands: {found} (at most {limit} allowed)")]
    TooManySegments { found: usize, limit: usize },

    #[error("empty command at position {position}")]
    EmptyCommand { position: usize },

    #[error("too many arguments in `{command}`: {found} (at most {limit} allowed)")]
    ArgListTooLong {
        command: String,
        found: usize,
        limit: usize,
    },

    #[error("argument contains a NUL byte")]
    InteriorNul,

    #[error("input longer than {limit} bytes")]
    InputTooLong { limit: usize },

    #[error("missing file name after '{marker}'")]
    MissingRedirectTarget { marker: &'static str },

    #[error("more than one '{marker}' redirection")]
    DuplicateRedirect { marker: &'static str },

    #[error("'|' cannot be combined with '||' on one line")]
    PipeMixedWithOr,
}

/// The OS refused a channel, a process, or a reap.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("cannot create pipe: {0}")]
    ChannelCreationFailed(#[source] nix::Error),

    #[error("cannot start `{program}`: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: nix::Error,
    },

    #[error("cannot reap process {pid}: {source}")]
    ReapFailed {
        pid: Pid,
        #[source]
        source: nix::Error,
    },
}

/// Failures of the whole-file operators (`~`, `#`, `+`).
#[derive(Debug, Error)]
pub enum FileOpError {
    #[error("'{operator}' needs {expected}")]
    MissingOperand {
        operator: char,
        expected: &'static str,
    },

    #[error("{0}: only .txt files are supported")]
    NotText(String),

    #[error("too many files: at most {limit} can be concatenated")]
    TooManyFiles { limit: usize },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ShellError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    FileOp(#[from] FileOpError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
