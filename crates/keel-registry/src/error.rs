//! Error types for registry operations.

use std::time::Duration;

use keel_ids::IdError;
use keel_types::{ErrorKind, ObjectId, TypeId};
use thiserror::Error;

/// Errors that can occur while registering objects or types.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// An object id outside every object range was passed for registration.
    #[error("improper object id {object_id}")]
    ImproperObjectId { object_id: ObjectId },

    /// The object id is already registered to a different live object.
    #[error(
        "object id {object_id} is already registered to another {registered_type}, \
         cannot register {new_type}"
    )]
    ObjectIdConflict {
        object_id: ObjectId,
        registered_type: &'static str,
        new_type: &'static str,
    },

    /// The object is already registered under a different object id.
    #[error("{type_name} is already registered with object id {registered}, cannot register it as {new}")]
    ObjectConflict {
        type_name: &'static str,
        registered: ObjectId,
        new: ObjectId,
    },

    /// The type id is already assigned to another type.
    #[error("type id {type_id} is already assigned to {registered}, cannot assign it to {new}")]
    TypeIdConflict {
        type_id: TypeId,
        registered: String,
        new: String,
    },

    /// The type already has a different type id.
    #[error("type {type_name} already has type id {registered}, cannot assign {new}")]
    TypeConflict {
        type_name: String,
        registered: TypeId,
        new: TypeId,
    },

    /// The universal root type was passed for registration.
    #[error("the root type {type_name} is never registered")]
    RootType { type_name: String },

    /// A null type id was passed for registration.
    #[error("null type id for type {type_name}")]
    NullTypeId { type_name: String },

    /// A registry capacity of zero was requested.
    #[error("invalid registry capacity {capacity}")]
    InvalidCapacity { capacity: usize },

    /// A hash density outside `(0, ∞)` was requested.
    #[error("invalid hash density {density}")]
    InvalidHashDensity { density: f32 },

    /// A bulk operation could not acquire the registry lock in time.
    #[error("{operation} rejected: registry lock not acquired within {timeout:?}")]
    LockRejected {
        operation: &'static str,
        timeout: Duration,
    },

    /// Id allocation failed.
    #[error("id allocation error: {0}")]
    Id(#[from] IdError),
}

impl RegistryError {
    /// Taxonomy classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ObjectIdConflict { .. }
            | Self::ObjectConflict { .. }
            | Self::TypeIdConflict { .. }
            | Self::TypeConflict { .. } => ErrorKind::ConsistencyViolation,
            Self::ImproperObjectId { .. }
            | Self::RootType { .. }
            | Self::NullTypeId { .. }
            | Self::InvalidCapacity { .. }
            | Self::InvalidHashDensity { .. } => ErrorKind::InvalidArgument,
            Self::LockRejected { .. } => ErrorKind::LockRejected,
            Self::Id(e) => e.kind(),
        }
    }
}

/// Convenience type alias for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
