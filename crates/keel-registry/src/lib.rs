//! Registries for Keel.
//!
//! Two biunique tables sit at the centre of every persistence context:
//!
//! - the [`ObjectRegistry`] maps object ids to live objects, keyed on object
//!   identity rather than value equality
//! - the [`TypeRegistry`] maps type ids to [`RuntimeType`](keel_types::RuntimeType)s
//!
//! The [`TypeManager`] combines the type registry with a type id provider and
//! hands out ids on demand, registering supertype chains along the way.
//!
//! # Modules
//!
//! - [`error`] — Error types for registry operations
//! - [`object_registry`] — [`ObjectRegistry`], its configuration and statistics
//! - [`type_registry`] — [`TypeRegistry`]
//! - [`type_manager`] — [`TypeManager`]
//! - [`backoff`] — [`LockRetry`] for lock-rejected bulk operations

pub mod backoff;
pub mod error;
pub mod object_registry;
pub mod type_manager;
pub mod type_registry;

pub use backoff::LockRetry;
pub use error::{RegistryError, RegistryResult};
pub use object_registry::{HashStatistics, ObjectIdsProcessor, ObjectRegistry, RegistryConfig};
pub use type_manager::TypeManager;
pub use type_registry::TypeRegistry;
