//! Errors from reading and persisting the download ledger.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading or saving the ledger.
///
/// A malformed ledger file is not an error: it is reported through
/// [`super::LoadOutcome::Corrupted`] and the ledger starts empty.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Reading, writing or renaming the ledger file failed.
    #[error("IO error on ledger file {path}: {source}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The in-memory ledger could not be serialized.
    #[error("cannot serialize ledger: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl LedgerError {
    /// Creates an IO error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
