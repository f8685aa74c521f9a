//! Error types for type handlers and schema migration.

use keel_dictionary::DictionaryError;
use keel_registry::RegistryError;
use keel_types::{ErrorKind, ObjectId, TypeId, TypesError};
use thiserror::Error;

/// Errors that can occur while handling, registering or migrating types.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// No handler is registered for the runtime type.
    #[error("type {type_name} is not persistable: no type handler registered")]
    NotPersistable { type_name: String },

    /// The runtime type was explicitly excluded from persistence.
    #[error("type {type_name} is explicitly marked as not persistable")]
    ExplicitlyNotPersistable { type_name: String },

    /// A handler is bound to a type with no Rust counterpart.
    #[error("type handler for {type_name} is not bound to a concrete Rust type")]
    AbstractType { type_name: String },

    /// A second handler was registered for the same runtime type.
    #[error("a type handler for {type_name} is already registered")]
    DuplicateHandler { type_name: String },

    /// A record refers to a type id the dictionary does not know.
    #[error("unknown type id {type_id}")]
    UnknownTypeId { type_id: TypeId },

    /// A reference could not be resolved to a live object.
    #[error("unresolvable reference to object id {object_id} in {type_name}")]
    UnknownObjectId {
        type_name: String,
        object_id: ObjectId,
    },

    /// A persisted type has no counterpart among the registered handlers.
    #[error("no current type handler for persisted type {type_name} ({type_id})")]
    NoCurrentType { type_id: TypeId, type_name: String },

    /// A handler's type id was initialized twice with different values.
    #[error("type handler for {type_name} already has type id {initialized}, cannot set {new}")]
    TypeIdMismatch {
        type_name: String,
        initialized: TypeId,
        new: TypeId,
    },

    /// A handler was asked for its description before its type id was set.
    #[error("type handler for {type_name} has no type id yet")]
    TypeIdNotInitialized { type_name: String },

    /// A handler was handed an instance of another type.
    #[error("type handler for {expected} cannot handle an instance of {actual}")]
    WrongInstanceType {
        expected: String,
        actual: &'static str,
    },

    /// A record does not have one value per instance member.
    #[error("record of {type_name} has {actual} values, expected {expected}")]
    RecordMismatch {
        type_name: String,
        expected: usize,
        actual: usize,
    },

    /// A record value has the wrong variant for its member.
    #[error("member '{member}' of {type_name} expects {expected}, found {actual}")]
    ValueMismatch {
        type_name: String,
        member: String,
        expected: String,
        actual: &'static str,
    },

    /// A member the handler needs is missing from the record layout.
    #[error("type {type_name} has no member '{member}'")]
    MissingMember { type_name: String, member: String },

    /// Several current members match a legacy member equally well.
    #[error("ambiguous mapping for legacy member '{member}' of {type_name}: candidates {candidates:?}")]
    AmbiguousMatch {
        type_name: String,
        member: String,
        candidates: Vec<String>,
    },

    /// A legacy enum constant has no current counterpart and was not discarded.
    #[error("legacy enum constant {type_name}#{constant} is neither mapped nor discarded")]
    UnmappedEnumConstant { type_name: String, constant: String },

    /// A current field has no legacy source and defaults are not allowed.
    #[error("current member '{member}' of {type_name} has no legacy source")]
    UnmappedField { type_name: String, member: String },

    /// A legacy member cannot be translated into the current member it maps to.
    #[error("legacy member '{legacy}' of {type_name} cannot be translated into '{current}'")]
    IncompatibleMember {
        type_name: String,
        legacy: String,
        current: String,
    },

    /// An explicit mapping names a current member that does not exist.
    #[error("mapping for {type_name}#{member} targets unknown member '{target}'")]
    UnknownMappingTarget {
        type_name: String,
        member: String,
        target: String,
    },

    /// A custom type cannot be migrated because a layout is not fixed-length.
    #[error("custom type {type_name} can only be migrated between fixed-length layouts")]
    VariableLengthLegacyLayout { type_name: String },

    /// A load-only legacy handler was asked to store.
    #[error("legacy type handler for {type_name} ({type_id}) cannot store instances")]
    LegacyStore { type_id: TypeId, type_name: String },

    /// A persisted enum ordinal has no constant.
    #[error("enum {type_name} has no constant with ordinal {ordinal}")]
    InvalidOrdinal { type_name: String, ordinal: i64 },

    /// A refactoring mapping line is malformed.
    #[error("refactoring mapping line {line}: {reason}")]
    MappingParse { line: usize, reason: String },

    /// An error raised by an injected collaborator, such as a store context.
    #[error("{message}")]
    External { kind: ErrorKind, message: String },

    /// Dictionary error.
    #[error("dictionary error: {0}")]
    Dictionary(#[from] DictionaryError),

    /// Registry error.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Value conversion error.
    #[error("value error: {0}")]
    Types(#[from] TypesError),
}

impl HandlerError {
    /// Wrap an error from a collaborator, keeping its classification.
    pub fn external(kind: ErrorKind, error: impl std::fmt::Display) -> Self {
        Self::External {
            kind,
            message: error.to_string(),
        }
    }

    /// Taxonomy classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotPersistable { .. }
            | Self::ExplicitlyNotPersistable { .. }
            | Self::NoCurrentType { .. } => ErrorKind::TypeNotPersistable,
            Self::UnknownTypeId { .. } | Self::UnknownObjectId { .. } => {
                ErrorKind::UnknownIdentifier
            }
            Self::TypeIdMismatch { .. } | Self::DuplicateHandler { .. } => {
                ErrorKind::ConsistencyViolation
            }
            Self::TypeIdNotInitialized { .. } => ErrorKind::Internal,
            Self::WrongInstanceType { .. }
            | Self::LegacyStore { .. }
            | Self::AbstractType { .. } => ErrorKind::InvalidArgument,
            Self::RecordMismatch { .. }
            | Self::ValueMismatch { .. }
            | Self::MissingMember { .. }
            | Self::AmbiguousMatch { .. }
            | Self::UnmappedEnumConstant { .. }
            | Self::UnmappedField { .. }
            | Self::IncompatibleMember { .. }
            | Self::UnknownMappingTarget { .. }
            | Self::VariableLengthLegacyLayout { .. }
            | Self::InvalidOrdinal { .. } => ErrorKind::SchemaMismatch,
            Self::MappingParse { .. } => ErrorKind::ParseError,
            Self::External { kind, .. } => *kind,
            Self::Dictionary(e) => e.kind(),
            Self::Registry(e) => e.kind(),
            Self::Types(e) => e.kind(),
        }
    }
}

/// Convenience type alias for handler operations.
pub type HandlerResult<T> = std::result::Result<T, HandlerError>;
