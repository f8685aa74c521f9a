//! Keel: identity and schema core of an embedded object-graph persistence
//! engine.
//!
//! This crate assembles the lower layers into one [`PersistenceManager`]
//! configured through [`PersistenceConfig`], and re-exports the types an
//! application needs to describe its own types and work with stored graphs.
//!
//! # Modules
//!
//! - [`config`] — [`PersistenceConfig`] and its TOML form
//! - [`error`] — [`KeelError`] wrapping every layer's errors
//! - [`manager`] — [`PersistenceManager`]

pub mod config;
pub mod error;
pub mod manager;

pub use config::{LegacySection, PersistenceConfig};
pub use error::{KeelError, KeelResult};
pub use manager::PersistenceManager;

pub use keel_dictionary::{
    DictionaryStorage, FileDictionaryStorage, InMemoryDictionaryStorage, Member, TypeDescription,
    TypeDictionary,
};
pub use keel_handler::{
    CustomBinding, CustomHandler, EntityLayout, EnumHandler, FieldValues, LegacyConfig, Link,
    ObjectResolver, PersistentEnum, RefactoringMapping, ReferenceArray, SharedHandler, StoreContext,
    TypeHandler, UnmappedFieldPolicy,
};
pub use keel_ids::{IdStrategy, IdStrategyPair};
pub use keel_registry::RegistryConfig;
pub use keel_storer::{
    Batch, DeactivatableStorer, DispatchMode, InMemoryStorage, PersistenceSource,
    PersistenceTarget, RootEntry, Roots, RootsView, Storer, StorerConfig, StorerMode,
    StorerSwitch, WriteController, DEFAULT_ROOT,
};
pub use keel_types::{
    EntityRecord, ErrorKind, ObjectId, ObjectRef, ObjectRefExt, RuntimeType, TypeId, Value,
};
