use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

/// Anything that can live in an object graph.
///
/// Blanket-implemented for every `'static + Send + Sync` type; application
/// types never implement it by hand.
pub trait Entity: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// The Rust type id of the concrete type.
    fn rust_type(&self) -> std::any::TypeId;

    /// The Rust type name of the concrete type.
    fn rust_type_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync> Entity for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn rust_type(&self) -> std::any::TypeId {
        std::any::TypeId::of::<T>()
    }

    fn rust_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

impl fmt::Debug for dyn Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:p}", self.rust_type_name(), self as *const dyn Entity as *const ())
    }
}

/// A shared reference to a graph object.
pub type ObjectRef = Arc<dyn Entity>;

/// A non-owning reference to a graph object.
pub type WeakObjectRef = Weak<dyn Entity>;

/// Stable identity of a shared object: the address of its allocation.
///
/// Two `ObjectRef`s have the same handle exactly when they point to the same
/// allocation. A handle stays unique for as long as any strong or weak
/// reference keeps the allocation alive.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(usize);

impl ObjectHandle {
    pub fn of(object: &ObjectRef) -> Self {
        Self(Arc::as_ptr(object) as *const () as usize)
    }

    pub fn of_weak(object: &WeakObjectRef) -> Self {
        Self(Weak::as_ptr(object) as *const () as usize)
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectHandle({:#x})", self.0)
    }
}

/// Convenience accessors on [`ObjectRef`].
///
/// These dispatch to the referenced object, never to the `Arc` itself, which
/// would otherwise also satisfy [`Entity`].
pub trait ObjectRefExt {
    fn handle(&self) -> ObjectHandle;

    fn entity_type(&self) -> std::any::TypeId;

    fn entity_type_name(&self) -> &'static str;

    fn downcast_ref<T: Any>(&self) -> Option<&T>;

    fn is<T: Any>(&self) -> bool {
        self.downcast_ref::<T>().is_some()
    }

    fn same_object(&self, other: &ObjectRef) -> bool {
        self.handle() == other.handle()
    }
}

impl ObjectRefExt for ObjectRef {
    fn handle(&self) -> ObjectHandle {
        ObjectHandle::of(self)
    }

    fn entity_type(&self) -> std::any::TypeId {
        (**self).rust_type()
    }

    fn entity_type_name(&self) -> &'static str {
        (**self).rust_type_name()
    }

    fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (**self).as_any().downcast_ref::<T>()
    }
}
