//! Error types for foundation type operations, and the shared error taxonomy.

use std::fmt;

use thiserror::Error;

/// Classification every Keel error maps onto.
///
/// Concrete error enums stay crate-local; callers that need to branch on the
/// category (retry, surface, abort) ask for the kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A type-id or object-id is claimed by two different runtime entities.
    ConsistencyViolation,
    /// Lookup of a type-id or object-id that was never registered.
    UnknownIdentifier,
    /// A runtime type has no handler.
    TypeNotPersistable,
    /// Ambiguous or incomplete member mapping during migration.
    SchemaMismatch,
    /// Failure reported by the external read/write target.
    TransferFailure,
    /// Storing is administratively disabled.
    WriteDisabled,
    /// Malformed dictionary text or id-strategy string.
    ParseError,
    /// A deactivated storer received a mutating call.
    StorerDeactivated,
    /// A bulk registry operation could not acquire its lock in time.
    LockRejected,
    /// A caller supplied an argument outside the accepted domain.
    InvalidArgument,
    /// Anything else.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConsistencyViolation => "consistency violation",
            Self::UnknownIdentifier => "unknown identifier",
            Self::TypeNotPersistable => "type not persistable",
            Self::SchemaMismatch => "schema mismatch",
            Self::TransferFailure => "transfer failure",
            Self::WriteDisabled => "write disabled",
            Self::ParseError => "parse error",
            Self::StorerDeactivated => "storer deactivated",
            Self::LockRejected => "lock rejected",
            Self::InvalidArgument => "invalid argument",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Errors raised by the foundation types.
#[derive(Debug, Error)]
pub enum TypesError {
    /// A raw value is outside the range of the requested id kind.
    #[error("{value} is not a valid {expected} id")]
    IdOutOfRange { value: u64, expected: &'static str },

    /// A primitive type name is not known.
    #[error("unknown primitive type: {name}")]
    UnknownPrimitive { name: String },

    /// A value does not fit the primitive kind it is converted to.
    #[error("cannot convert {value} to {target}")]
    ValueConversion { value: String, target: &'static str },
}

impl TypesError {
    /// Taxonomy classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::IdOutOfRange { .. } => ErrorKind::InvalidArgument,
            Self::UnknownPrimitive { .. } => ErrorKind::UnknownIdentifier,
            Self::ValueConversion { .. } => ErrorKind::SchemaMismatch,
        }
    }
}
