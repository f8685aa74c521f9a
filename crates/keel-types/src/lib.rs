//! Foundation types for Keel.
//!
//! Every other Keel crate depends on `keel-types`. It defines the vocabulary
//! shared by the dictionary, the registries, the handlers and the storers:
//!
//! # Key Types
//!
//! - [`ObjectId`] / [`TypeId`] — numeric persistent identifiers and their ranges
//! - [`PrimitiveKind`] — the fixed-length primitive field kinds
//! - [`Value`] / [`EntityRecord`] — the handler-level record form of an instance
//! - [`ObjectRef`] / [`ObjectHandle`] — shared object references and their identity
//! - [`RuntimeType`] — a runtime type descriptor with an optional supertype
//! - [`ErrorKind`] — the error taxonomy every crate maps its errors onto

pub mod error;
pub mod id;
pub mod object;
pub mod primitive;
pub mod runtime_type;
pub mod value;

pub use error::{ErrorKind, TypesError};
pub use id::{IdKind, ObjectId, PersistentId, TypeId};
pub use object::{Entity, ObjectHandle, ObjectRef, ObjectRefExt, WeakObjectRef};
pub use primitive::PrimitiveKind;
pub use runtime_type::{RuntimeType, ROOT_TYPE_NAME};
pub use value::{EntityRecord, Primitive, Value};
