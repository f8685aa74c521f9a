use std::fmt;
use std::sync::Arc;

use keel_ids::TypeIdProvider;
use keel_types::{RuntimeType, TypeId};
use parking_lot::Mutex;
use tracing::info;

use crate::error::{RegistryError, RegistryResult};
use crate::type_registry::TypeRegistry;

/// Hands out type ids on demand.
///
/// Combines a [`TypeRegistry`] with a type id provider. All mutations run
/// under one lock so that two threads ensuring the same type agree on its id.
pub struct TypeManager {
    registry: Arc<TypeRegistry>,
    provider: Box<TypeIdProvider>,
    lock: Mutex<()>,
}

impl TypeManager {
    pub fn new(registry: Arc<TypeRegistry>, provider: Box<TypeIdProvider>) -> Self {
        Self {
            registry,
            provider,
            lock: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn lookup_type_id(&self, runtime_type: &RuntimeType) -> Option<TypeId> {
        self.registry.lookup_type_id(runtime_type)
    }

    pub fn lookup_type(&self, type_id: TypeId) -> Option<RuntimeType> {
        self.registry.lookup_type(type_id)
    }

    /// The id of `runtime_type`, allocating and registering one if needed.
    ///
    /// Newly registered types also get their supertype chain ensured, up to
    /// but not including the root type.
    pub fn ensure_type_id(&self, runtime_type: &RuntimeType) -> RegistryResult<TypeId> {
        if let Some(type_id) = self.registry.lookup_type_id(runtime_type) {
            return Ok(type_id);
        }
        let _guard = self.lock.lock();
        self.ensure_locked(runtime_type)
    }

    fn ensure_locked(&self, runtime_type: &RuntimeType) -> RegistryResult<TypeId> {
        if runtime_type.is_root() {
            return Err(RegistryError::RootType {
                type_name: runtime_type.name().to_string(),
            });
        }
        if let Some(type_id) = self.registry.lookup_type_id(runtime_type) {
            return Ok(type_id);
        }
        let type_id = self.provider.provide_next_id()?;
        self.registry.register_type(type_id, runtime_type.clone())?;
        info!(type_id = %type_id, type_name = runtime_type.name(), "new type id assigned");
        if let Some(super_type) = runtime_type.super_type() {
            if !super_type.is_root() {
                self.ensure_locked(super_type)?;
            }
        }
        Ok(type_id)
    }

    /// Register a known pair, e.g. one read from the type dictionary, and
    /// move the provider past its id.
    pub fn register_type(&self, type_id: TypeId, runtime_type: RuntimeType) -> RegistryResult<bool> {
        let _guard = self.lock.lock();
        let added = self.registry.register_type(type_id, runtime_type)?;
        self.provider.update_current_id(type_id)?;
        Ok(added)
    }

    /// Fast-forward the provider to at least `type_id`.
    pub fn update_current_type_id(&self, type_id: TypeId) -> RegistryResult<()> {
        let _guard = self.lock.lock();
        self.provider.update_current_id(type_id)?;
        Ok(())
    }

    pub fn current_type_id(&self) -> TypeId {
        self.provider.current_id()
    }

    /// Allocate an id without binding it to a runtime type.
    ///
    /// Used for dictionary entries of types that only exist in stored data.
    pub fn provide_next_type_id(&self) -> RegistryResult<TypeId> {
        let _guard = self.lock.lock();
        Ok(self.provider.provide_next_id()?)
    }
}

impl fmt::Debug for TypeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeManager")
            .field("registry", &self.registry)
            .field("provider", &self.provider)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use keel_ids::{FailingIdProvider, TransientIdProvider};
    use keel_types::ErrorKind;

    use super::*;

    fn manager(seed: u64) -> TypeManager {
        TypeManager::new(
            Arc::new(TypeRegistry::new()),
            Box::new(TransientIdProvider::<TypeId>::new(seed)),
        )
    }

    #[test]
    fn ensure_is_idempotent() {
        let manager = manager(100);
        let t = RuntimeType::named("app.A");
        let first = manager.ensure_type_id(&t).unwrap();
        let second = manager.ensure_type_id(&t).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, TypeId::new(101));
        assert_eq!(manager.current_type_id(), TypeId::new(101));
    }

    #[test]
    fn supertype_chain_is_registered_up_to_root() {
        let manager = manager(100);
        let animal = RuntimeType::named("app.Animal");
        let dog = RuntimeType::named("app.Dog").extending(animal.clone());
        let puppy = RuntimeType::named("app.Puppy").extending(dog.clone());

        manager.ensure_type_id(&puppy).unwrap();
        assert!(manager.lookup_type_id(&dog).is_some());
        assert!(manager.lookup_type_id(&animal).is_some());
        assert!(manager.lookup_type_id(&RuntimeType::root()).is_none());
        assert_eq!(manager.registry().size(), 3);
    }

    #[test]
    fn root_type_never_gets_an_id() {
        let manager = manager(100);
        let err = manager.ensure_type_id(&RuntimeType::root()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn known_pairs_fast_forward_the_provider() {
        let manager = manager(100);
        manager
            .register_type(TypeId::new(500), RuntimeType::named("app.Old"))
            .unwrap();
        let fresh = manager.ensure_type_id(&RuntimeType::named("app.New")).unwrap();
        assert_eq!(fresh, TypeId::new(501));
        manager.update_current_type_id(TypeId::new(10)).unwrap();
        assert_eq!(manager.current_type_id(), TypeId::new(501));
    }

    #[test]
    fn failing_provider_surfaces_allocation_error() {
        let manager = TypeManager::new(
            Arc::new(TypeRegistry::new()),
            Box::new(FailingIdProvider::<TypeId>::new()),
        );
        assert!(manager.ensure_type_id(&RuntimeType::named("app.A")).is_err());
    }

    #[test]
    fn concurrent_ensure_agrees_on_one_id() {
        let manager = Arc::new(manager(100));
        let ids: Vec<TypeId> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                thread::spawn(move || manager.ensure_type_id(&RuntimeType::named("app.Shared")).unwrap())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect();
        assert!(ids.iter().all(|&id| id == ids[0]));
        assert_eq!(manager.registry().size(), 1);
    }
}
