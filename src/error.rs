use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The root powercap zone of package 0 could not be opened, nothing can be measured.
    #[error("RAPL discovery failed, could not open {path}: {source}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unexpected content in {path}: {content:?}")]
    Parse { path: PathBuf, content: String },

    #[error("failed to open output log {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("sampling interval must be at least one millisecond")]
    InvalidInterval,

    #[error("measurement already running for session {0:?}")]
    AlreadySampling(String),

    #[error("no measurement running")]
    NotSampling,

    #[error("sampling thread panicked, the session log was lost")]
    TickPanicked,
}
