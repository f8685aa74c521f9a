//! Error types for id allocation and strategy parsing.

use std::path::PathBuf;

use keel_types::ErrorKind;
use thiserror::Error;

/// Errors that can occur while allocating ids or parsing strategies.
#[derive(Debug, Error)]
pub enum IdError {
    /// The active strategy forbids allocating new ids.
    #[error("allocating new {kind} ids is not allowed in this context")]
    AllocationForbidden { kind: &'static str },

    /// The id counter cannot advance any further.
    #[error("{kind} id range exhausted at {current}")]
    Exhausted { kind: &'static str, current: u64 },

    /// A strategy string is malformed.
    #[error("invalid id strategy at offset {offset}: {reason}")]
    Parse { offset: usize, reason: String },

    /// A strategy string names a strategy that does not exist.
    #[error("unknown id strategy '{name}' at offset {offset}")]
    UnknownStrategy { name: String, offset: usize },

    /// A durable counter file failed its checksum or has the wrong size.
    #[error("corrupt id counter file {path}: {reason}")]
    CorruptCounter { path: PathBuf, reason: String },

    /// I/O error on a durable counter file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IdError {
    /// Taxonomy classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AllocationForbidden { .. } => ErrorKind::WriteDisabled,
            Self::Exhausted { .. } => ErrorKind::Internal,
            Self::Parse { .. } | Self::UnknownStrategy { .. } => ErrorKind::ParseError,
            Self::CorruptCounter { .. } | Self::Io(_) => ErrorKind::TransferFailure,
        }
    }
}

/// Convenience type alias for id operations.
pub type IdResult<T> = std::result::Result<T, IdError>;
