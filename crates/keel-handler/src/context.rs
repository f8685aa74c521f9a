//! The collaborators a handler talks to while storing and loading.

use std::fmt;

use keel_registry::ObjectRegistry;
use keel_types::{ObjectId, ObjectRef};
use parking_lot::RwLock;

use crate::error::HandlerResult;

/// Callback a handler uses for every reference it writes.
///
/// The storer implements this: applying a reference assigns or looks up the
/// referenced object's id and enqueues the object as the storer's mode
/// dictates.
pub trait StoreContext {
    fn apply(&mut self, instance: &ObjectRef) -> HandlerResult<ObjectId>;
}

/// Resolves object ids to live objects while loading.
pub trait ObjectResolver {
    fn lookup_object(&self, object_id: ObjectId) -> Option<ObjectRef>;
}

impl ObjectResolver for ObjectRegistry {
    fn lookup_object(&self, object_id: ObjectId) -> Option<ObjectRef> {
        ObjectRegistry::lookup_object(self, object_id)
    }
}

/// Stores one instance and commits it immediately.
///
/// Injected into re-persisting legacy handlers by the layer that owns the
/// storers, so that migrated instances are written back in their current
/// shape.
pub trait StoreAndCommit: Send + Sync {
    fn store_and_commit(&self, instance: &ObjectRef) -> HandlerResult<ObjectId>;
}

/// A reference field that is filled in after its owner is constructed.
///
/// Loading builds every instance first and resolves references in a second
/// pass, so reference fields of persistent types need to be settable through
/// a shared reference.
#[derive(Default)]
pub struct Link(RwLock<Option<ObjectRef>>);

impl Link {
    pub fn new(target: Option<ObjectRef>) -> Self {
        Self(RwLock::new(target))
    }

    pub fn to(target: &ObjectRef) -> Self {
        Self::new(Some(ObjectRef::clone(target)))
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<ObjectRef> {
        self.0.read().clone()
    }

    pub fn set(&self, target: Option<ObjectRef>) {
        *self.0.write() = target;
    }

    pub fn is_set(&self) -> bool {
        self.0.read().is_some()
    }
}

impl Clone for Link {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0.read() {
            Some(target) => write!(f, "Link({:p})", std::sync::Arc::as_ptr(target)),
            None => f.write_str("Link(None)"),
        }
    }
}
