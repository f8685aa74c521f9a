//! Error types for storing and loading.

use keel_handler::HandlerError;
use keel_ids::IdError;
use keel_registry::RegistryError;
use keel_types::{ErrorKind, ObjectId, TypeId};
use thiserror::Error;

/// Errors that can occur while storing or loading object graphs.
#[derive(Debug, Error)]
pub enum StorerError {
    /// The storer is switched off.
    #[error("storer is deactivated")]
    Deactivated,

    /// Storing is administratively disabled.
    #[error("storing is disabled: {reason}")]
    StoringDisabled { reason: String },

    /// The pending batch would outgrow the storer's maximum capacity.
    #[error("storer capacity exceeded: {requested} records requested, maximum is {maximum}")]
    CapacityExceeded { requested: usize, maximum: usize },

    /// The write target or read source failed.
    #[error("transfer failed: {message}")]
    Transfer { message: String },

    /// A persisted reference points to a record the source does not have.
    #[error("no record for object id {object_id}")]
    MissingRecord { object_id: ObjectId },

    /// A handler created no instance for a record that is not a dropped enum constant.
    #[error("type {type_id} created no instance for object id {object_id}")]
    NotCreated { object_id: ObjectId, type_id: TypeId },

    /// Type handler error.
    #[error("handler error: {0}")]
    Handler(#[from] HandlerError),

    /// Registry error.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Id allocation error.
    #[error("id error: {0}")]
    Id(#[from] IdError),
}

impl StorerError {
    pub fn transfer(error: impl std::fmt::Display) -> Self {
        Self::Transfer {
            message: error.to_string(),
        }
    }

    /// Taxonomy classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Deactivated => ErrorKind::StorerDeactivated,
            Self::StoringDisabled { .. } => ErrorKind::WriteDisabled,
            Self::CapacityExceeded { .. } => ErrorKind::InvalidArgument,
            Self::Transfer { .. } => ErrorKind::TransferFailure,
            Self::MissingRecord { .. } => ErrorKind::UnknownIdentifier,
            Self::NotCreated { .. } => ErrorKind::Internal,
            Self::Handler(e) => e.kind(),
            Self::Registry(e) => e.kind(),
            Self::Id(e) => e.kind(),
        }
    }

    /// Flatten into a handler error, for errors raised inside a handler callback.
    pub(crate) fn into_handler_error(self) -> HandlerError {
        match self {
            Self::Handler(e) => e,
            other => HandlerError::external(other.kind(), other),
        }
    }
}

/// Convenience type alias for storer operations.
pub type StorerResult<T> = std::result::Result<T, StorerError>;
