//! Error types for connection table decoding
//!
//! # Error Categories
//!
//! - **Input unavailable**: `SourceUnavailable`, `Io`, `CommandExecution`
//! - **Malformed record**: `MalformedLine`, `TooFewLines`, `ColumnCountMismatch`
//! - **Invalid address length**: `InvalidAddressFormat`
//! - **Unsupported value**: `UnsupportedProtocol`, `UnsupportedState`
//!
//! The first three categories abort a run. Unsupported values are only ever
//! produced while counting, where they are logged and the record is skipped.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while reading, decoding or counting connection tables
#[derive(Debug, Error)]
pub enum ConnstatError {
    /// The /proc root (or another required source path) does not exist
    #[error("path \"{}\" does not exist", .0.display())]
    SourceUnavailable(PathBuf),

    /// A table file exists but could not be read
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A packed-table line does not match the fixed field grammar
    #[error("could not extract connection info from line:\n{0}")]
    MalformedLine(String),

    /// A hex address field is neither 8 nor 32 hex digits
    #[error("value \"{0}\" does not look like an IP address")]
    InvalidAddressFormat(String),

    /// The external connection-listing tool failed to run or exited non-zero
    #[error("failed to execute {program}: {reason}")]
    CommandExecution { program: String, reason: String },

    /// Tabular output has no header row
    #[error("expected at least 2 non-empty lines of output, got {0}")]
    TooFewLines(usize),

    /// A tabular data row splits into a different number of columns than the header
    #[error("row has {found} columns but header has {expected}: {row}")]
    ColumnCountMismatch {
        expected: usize,
        found: usize,
        row: String,
    },

    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("unsupported connection state: {0}")]
    UnsupportedState(String),
}

pub type Result<T> = std::result::Result<T, ConnstatError>;
