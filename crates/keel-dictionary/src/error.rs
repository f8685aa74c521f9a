//! Error types for the type dictionary.

use keel_types::{ErrorKind, TypeId};
use thiserror::Error;

/// What went wrong while parsing dictionary text.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("missing type id")]
    MissingTypeId,

    #[error("invalid type id '{0}'")]
    InvalidTypeId(String),

    #[error("missing type name")]
    MissingTypeName,

    #[error("missing '{{' opening the type body")]
    MissingBodyOpen,

    #[error("missing member name")]
    MissingMemberName,

    #[error("missing primitive definition")]
    MissingPrimitiveDefinition,

    #[error("unknown primitive definition '{0}'")]
    UnknownPrimitiveDefinition(String),

    #[error("missing enum constant name")]
    MissingEnumName,

    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),

    #[error("trailing content '{0}' after closing bracket")]
    TrailingContent(String),

    #[error("incomplete input")]
    IncompleteInput,

    #[error("invalid type description: {0}")]
    InvalidDescription(String),
}

/// A parse failure at a character offset into the input.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{kind} at offset {offset}")]
pub struct ParseError {
    pub offset: usize,
    pub kind: ParseErrorKind,
}

/// Errors that can occur while building or persisting a type dictionary.
#[derive(Debug, Error)]
pub enum DictionaryError {
    /// Malformed dictionary text.
    #[error("dictionary parse error: {0}")]
    Parse(#[from] ParseError),

    /// Two members of one scope share an identifier.
    #[error("duplicate member '{identifier}' in type {type_name}")]
    DuplicateMember {
        type_name: String,
        identifier: String,
    },

    /// A member's minimum length exceeds its maximum length.
    #[error("member '{member}' of type {type_name} has min length {min} > max length {max}")]
    InvalidLength {
        type_name: String,
        member: String,
        min: u64,
        max: u64,
    },

    /// A type name is empty or contains whitespace.
    #[error("invalid type name '{name}'")]
    InvalidTypeName { name: String },

    /// A member name is empty or contains reserved characters.
    #[error("invalid member name '{name}' in type {type_name}")]
    InvalidMemberName { type_name: String, name: String },

    /// A type id is claimed by two different type names.
    #[error("type id {type_id} is already assigned to {existing}, cannot assign it to {new}")]
    TypeIdConflict {
        type_id: TypeId,
        existing: String,
        new: String,
    },

    /// A type id is registered again with a different shape.
    #[error("type id {type_id} of {type_name} is already registered with a different description")]
    DescriptionConflict { type_id: TypeId, type_name: String },

    /// A description was added to the lineage of another type.
    #[error("type {type_name} does not belong to lineage {lineage}")]
    LineageMismatch { lineage: String, type_name: String },

    /// I/O error while loading or storing dictionary text.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DictionaryError {
    /// Taxonomy classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse(_) => ErrorKind::ParseError,
            Self::TypeIdConflict { .. }
            | Self::DescriptionConflict { .. }
            | Self::LineageMismatch { .. } => ErrorKind::ConsistencyViolation,
            Self::DuplicateMember { .. }
            | Self::InvalidLength { .. }
            | Self::InvalidTypeName { .. }
            | Self::InvalidMemberName { .. } => ErrorKind::InvalidArgument,
            Self::Io(_) => ErrorKind::TransferFailure,
        }
    }
}

/// Convenience type alias for dictionary operations.
pub type DictionaryResult<T> = std::result::Result<T, DictionaryError>;
