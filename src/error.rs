//! Harness-level error types.
//!
//! Anything about the tested binaries is an `Outcome`, never an error. These
//! variants cover the harness's own preconditions and the interrupt path.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that stop or degrade a harness run.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Run interrupted")]
    Interrupted,

    #[error("Failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },
}

impl HarnessError {
    /// Returns true if this error came from an external cancellation.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}
