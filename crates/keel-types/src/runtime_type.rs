use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

/// Persistent name of the universal root type.
pub const ROOT_TYPE_NAME: &str = "keel.Object";

/// A runtime type as the type registry sees it.
///
/// Identified by its persistent name. Carries the Rust type it stands for (if
/// it is concrete) and its supertype, so that registering a type can register
/// its whole supertype chain.
#[derive(Clone)]
pub struct RuntimeType(Arc<Inner>);

struct Inner {
    name: String,
    rust_type: Option<std::any::TypeId>,
    super_type: Option<RuntimeType>,
}

impl RuntimeType {
    /// The universal root type. It has no supertype and is never registered.
    pub fn root() -> Self {
        static ROOT: OnceLock<RuntimeType> = OnceLock::new();
        ROOT.get_or_init(|| {
            RuntimeType(Arc::new(Inner {
                name: ROOT_TYPE_NAME.to_string(),
                rust_type: None,
                super_type: None,
            }))
        })
        .clone()
    }

    /// A concrete type bound to `T`, directly below the root type.
    pub fn of<T: Any>(name: impl Into<String>) -> Self {
        Self(Arc::new(Inner {
            name: name.into(),
            rust_type: Some(std::any::TypeId::of::<T>()),
            super_type: Some(Self::root()),
        }))
    }

    /// A type with no Rust counterpart, e.g. an abstract supertype.
    pub fn named(name: impl Into<String>) -> Self {
        Self(Arc::new(Inner {
            name: name.into(),
            rust_type: None,
            super_type: Some(Self::root()),
        }))
    }

    /// This type with `super_type` as its direct supertype.
    pub fn extending(self, super_type: RuntimeType) -> Self {
        Self(Arc::new(Inner {
            name: self.0.name.clone(),
            rust_type: self.0.rust_type,
            super_type: Some(super_type),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn rust_type(&self) -> Option<std::any::TypeId> {
        self.0.rust_type
    }

    pub fn super_type(&self) -> Option<&RuntimeType> {
        self.0.super_type.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.0.super_type.is_none() && self.0.name == ROOT_TYPE_NAME
    }

    /// The supertype chain, nearest first, excluding the root type.
    pub fn super_types(&self) -> Vec<RuntimeType> {
        let mut chain = Vec::new();
        let mut current = self.super_type();
        while let Some(t) = current {
            if t.is_root() {
                break;
            }
            chain.push(t.clone());
            current = t.super_type();
        }
        chain
    }
}

impl PartialEq for RuntimeType {
    fn eq(&self, other: &Self) -> bool {
        self.0.name == other.0.name
    }
}

impl Eq for RuntimeType {}

impl Hash for RuntimeType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.name.hash(state);
    }
}

impl fmt::Debug for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuntimeType({})", self.0.name)
    }
}

impl fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}
