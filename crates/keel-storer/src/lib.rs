//! Store and load protocol for Keel.
//!
//! A store operation walks an object graph from the instances it is given.
//! Each reachable instance is numbered through the [`ObjectManager`] and, if
//! the storer's mode says so, turned into a record by its type handler. The
//! collected batch goes to a [`PersistenceTarget`] on commit, and only then
//! do the new ids enter the shared registry.
//!
//! The [`Loader`] goes the other way, from a [`PersistenceSource`] to live
//! objects, routing older record shapes through legacy handlers.
//!
//! # Modules
//!
//! - [`error`] — Error types for store and load operations
//! - [`object_manager`] — [`ObjectManager`]: registry plus object id provider
//! - [`storer`] — The [`Storer`] trait and the lazy/eager [`BatchStorer`]
//! - [`deactivatable`] — [`DeactivatableStorer`] and its [`StorerSwitch`]
//! - [`target`] — Targets, sources, write control and [`InMemoryStorage`]
//! - [`loader`] — [`Loader`]
//! - [`roots`] — [`Roots`], [`RootsView`] and the roots handler
//! - [`dispatcher`] — Pass-through and isolating context dispatch

pub mod deactivatable;
pub mod dispatcher;
pub mod error;
pub mod loader;
pub mod object_manager;
pub mod roots;
pub mod storer;
pub mod target;

pub use deactivatable::{DeactivatableStorer, DisabledStorer, StorerSwitch};
pub use dispatcher::{
    DispatchMode, IsolatingDispatcher, PassThroughDispatcher, PersistenceContextDispatcher,
};
pub use error::{StorerError, StorerResult};
pub use loader::Loader;
pub use object_manager::{ObjectManager, StorerToken};
pub use roots::{
    roots_handler, RootEntry, Roots, RootsHandler, RootsView, DEFAULT_ROOT, ROOTS_OBJECT_ID,
    ROOTS_TYPE_NAME,
};
pub use storer::{BatchStorer, Storer, StorerConfig, StorerMode, StorerState};
pub use target::{
    Batch, InMemoryStorage, PersistenceSource, PersistenceTarget, SwitchableWriteController,
    WriteController,
};
