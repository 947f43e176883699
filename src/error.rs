use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Process exit code for success, and for "ready" in test mode.
pub const EXIT_OK: i32 = 0;
/// Test mode only: at least one job is still running.
pub const EXIT_NOT_READY: i32 = 1;
/// Bad flags or arguments. Matches the code clap uses for parse failures.
pub const EXIT_USAGE: i32 = 2;
/// Resource or system error: the store or a record could not be
/// opened, created, locked, or the runner could not be started.
pub const EXIT_RESOURCE: i32 = 111;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("cannot open queue directory {path}: {source}")]
    StoreUnavailable { path: PathBuf, source: io::Error },

    #[error("cannot claim record {name}: {source}")]
    ClaimFailed { name: String, source: io::Error },

    #[error("record {name}: {source}")]
    RecordIo { name: String, source: io::Error },

    #[error("cannot start runner process: {0}")]
    SpawnFailed(io::Error),

    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl QueueError {
    /// Map an error to the conventional process exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            QueueError::Usage(_) => EXIT_USAGE,
            _ => EXIT_RESOURCE,
        }
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
