//! Id allocation for Keel.
//!
//! Type ids and object ids are handed out by [`IdProvider`]s. A provider is
//! chosen through an [`IdStrategy`], which has a small textual form so that it
//! can live in configuration files:
//!
//! ```text
//! Transient(1000)
//! None
//! File(data/object-ids)
//! Type:'Transient(1000000)', Object:'Transient(1000000000000000000)'
//! ```
//!
//! # Modules
//!
//! - [`error`] — Error types for id allocation and strategy parsing
//! - [`provider`] — The [`IdProvider`] trait, [`TransientIdProvider`], [`FailingIdProvider`]
//! - [`file`] — Durable [`FileIdProvider`]
//! - [`strategy`] — [`IdStrategy`] / [`IdStrategyPair`] and their text form

pub mod error;
pub mod file;
pub mod provider;
pub mod strategy;

pub use error::{IdError, IdResult};
pub use file::FileIdProvider;
pub use provider::{FailingIdProvider, IdProvider, TransientIdProvider};
pub use strategy::{IdStrategy, IdStrategyPair};

/// Object id provider as a trait object.
pub type ObjectIdProvider = dyn IdProvider<keel_types::ObjectId>;

/// Type id provider as a trait object.
pub type TypeIdProvider = dyn IdProvider<keel_types::TypeId>;
