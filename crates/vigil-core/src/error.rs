// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Vigil database gateway.

use std::path::PathBuf;

use thiserror::Error;

/// The primary error type returned by gateway operations.
///
/// `Open`, `NotOpen` and `DanglingStatements` are sequencing or configuration
/// faults: callers must not retry them. Writes made by other processes are
/// never reported through this type; they surface as observer callbacks.
#[derive(Debug, Error)]
pub enum VigilError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// The database file could not be opened or created.
    #[error("cannot open database at {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An operation that needs an open handle ran before the handle was opened.
    #[error("database handle is not open")]
    NotOpen,

    /// A unit of work returned while prepared statements were still stepping.
    #[error("unit of work left prepared statements open")]
    DanglingStatements,

    /// Engine errors raised while running a unit of work or configuring the handle.
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Failure to set up the file descriptors or kernel subscription used for monitoring.
    #[error("monitor error: {source}")]
    Monitor {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The file does not carry the header layout the change counter depends on.
    #[error("unsupported database format: {0}")]
    UnsupportedFormat(String),

    /// The gateway thread has shut down and can no longer accept work.
    #[error("gateway is shut down")]
    Closed,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl VigilError {
    /// Whether this error reports a caller sequencing or configuration fault.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VigilError::Open { .. } | VigilError::NotOpen | VigilError::DanglingStatements
        )
    }
}
