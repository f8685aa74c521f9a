//! Type handlers for Keel.
//!
//! A type handler translates between live instances of one runtime type and
//! the flat [`EntityRecord`](keel_types::EntityRecord)s that storage sees. It
//! also describes the type's persistent shape as a list of members, which
//! becomes the type's entry in the type dictionary.
//!
//! Handlers come in four flavours:
//!
//! - reflective [`EntityLayout`]s, declared field by field
//! - [`CustomHandler`]s driven by a hand-written [`CustomBinding`]
//! - [`EnumHandler`]s for singleton enum constants
//! - legacy handlers, created on demand for older persisted shapes
//!
//! The [`TypeHandlerManager`] owns them all and keeps the type dictionary in
//! step with the registered handlers.
//!
//! # Modules
//!
//! - [`error`] — Error types for handler operations
//! - [`handler`] — The [`TypeHandler`] trait and record helpers
//! - [`context`] — Store and load contexts handlers call back into
//! - [`layout`] — Reflective [`EntityLayout`] builder
//! - [`custom`] — Custom handlers, strings and reference arrays
//! - [`enums`] — Enum constant handlers
//! - [`legacy`] — Legacy shape matching and migrating handlers
//! - [`manager`] — [`TypeHandlerManager`]

pub mod context;
pub mod custom;
pub mod enums;
pub mod error;
pub mod handler;
pub mod layout;
pub mod legacy;
pub mod manager;

pub use context::{Link, ObjectResolver, StoreAndCommit, StoreContext};
pub use custom::{
    reference_array_handler, string_handler, CustomBinding, CustomHandler, ReferenceArray,
    ReferenceArrayHandler, StringHandler, REFERENCE_ARRAY_TYPE_NAME, STRING_TYPE_NAME,
};
pub use enums::{is_enum_singleton, EnumHandler, PersistentEnum};
pub use error::{HandlerError, HandlerResult};
pub use handler::{
    check_arity, downcast, resolve_reference, FieldValues, HandlerKind, SharedHandler,
    TypeHandler, TypeIdCell,
};
pub use layout::EntityLayout;
pub use legacy::{
    LegacyConfig, LegacyTypeHandler, LegacyTypeHandlerCreator, RefactoringMapping,
    UnmappedFieldPolicy,
};
pub use manager::TypeHandlerManager;
