//! Error kinds shared by every Runnerd crate.
//!
//! One enum covers the whole control surface so front ends (HTTP, REPL)
//! can map kinds to their own signaling without string matching.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("process '{0}' already exists")]
    DuplicateName(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("process '{name}' is already running with pid {pid}")]
    AlreadyRunning { name: String, pid: u32 },

    #[error("process '{0}' is not running")]
    NotRunning(String),

    #[error("process '{0}' is scheduled and cannot be started manually")]
    ScheduledProcess(String),

    #[error("process '{0}' is not configured for automatic scheduling")]
    NotSchedulable(String),

    #[error("invalid time format '{0}': must be a unix timestamp or an RFC1123 string")]
    InvalidTimeFormat(String),

    #[error("timing rule '{0}' already exists")]
    DuplicateRule(String),

    #[error("process '{0}' has no job timing configured")]
    NoTimingConfigured(String),

    #[error("failed to launch '{name}': {source}")]
    Launch {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to terminate '{name}': {source}")]
    Termination {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt state file {path}: {source}")]
    CorruptState {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// A missing process, reported with its name.
    pub fn process_not_found(name: &str) -> Self {
        Self::NotFound(format!("process '{name}'"))
    }

    /// A missing timing rule, reported with its name.
    pub fn rule_not_found(name: &str) -> Self {
        Self::NotFound(format!("timing rule '{name}'"))
    }
}
