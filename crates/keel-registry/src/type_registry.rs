use std::collections::{BTreeMap, HashMap};
use std::fmt;

use keel_types::{RuntimeType, TypeId};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{RegistryError, RegistryResult};

#[derive(Default)]
struct Tables {
    by_id: BTreeMap<TypeId, RuntimeType>,
    by_type: HashMap<RuntimeType, TypeId>,
}

impl Tables {
    /// `Ok(true)` if the pair is new, `Ok(false)` if already registered.
    fn check(&self, type_id: TypeId, runtime_type: &RuntimeType) -> RegistryResult<bool> {
        if runtime_type.is_root() {
            return Err(RegistryError::RootType {
                type_name: runtime_type.name().to_string(),
            });
        }
        if type_id.is_null() {
            return Err(RegistryError::NullTypeId {
                type_name: runtime_type.name().to_string(),
            });
        }
        if let Some(registered) = self.by_id.get(&type_id) {
            if registered != runtime_type {
                return Err(RegistryError::TypeIdConflict {
                    type_id,
                    registered: registered.name().to_string(),
                    new: runtime_type.name().to_string(),
                });
            }
            return Ok(false);
        }
        if let Some(&registered) = self.by_type.get(runtime_type) {
            return Err(RegistryError::TypeConflict {
                type_name: runtime_type.name().to_string(),
                registered,
                new: type_id,
            });
        }
        Ok(true)
    }

    fn insert(&mut self, type_id: TypeId, runtime_type: RuntimeType) {
        self.by_type.insert(runtime_type.clone(), type_id);
        self.by_id.insert(type_id, runtime_type);
    }
}

/// Biunique `type id ⇄ runtime type` table.
///
/// Every operation takes one registry-wide lock. Conflicting registrations
/// are always errors; nothing is ever overwritten.
#[derive(Default)]
pub struct TypeRegistry {
    tables: Mutex<Tables>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup_type_id(&self, runtime_type: &RuntimeType) -> Option<TypeId> {
        self.tables.lock().by_type.get(runtime_type).copied()
    }

    pub fn lookup_type(&self, type_id: TypeId) -> Option<RuntimeType> {
        self.tables.lock().by_id.get(&type_id).cloned()
    }

    /// Register `runtime_type` under `type_id`.
    ///
    /// Returns `false` if exactly this pair is already registered. Fails,
    /// naming both the registered and the new value, if either side is
    /// already bound to something else.
    pub fn register_type(&self, type_id: TypeId, runtime_type: RuntimeType) -> RegistryResult<bool> {
        let mut tables = self.tables.lock();
        if !tables.check(type_id, &runtime_type)? {
            return Ok(false);
        }
        debug!(type_id = %type_id, type_name = runtime_type.name(), "type registered");
        tables.insert(type_id, runtime_type);
        Ok(true)
    }

    /// Register all pairs, or none of them if any pair conflicts.
    ///
    /// Returns the number of newly registered pairs.
    pub fn register_types<I>(&self, pairs: I) -> RegistryResult<usize>
    where
        I: IntoIterator<Item = (TypeId, RuntimeType)>,
    {
        let pairs: Vec<(TypeId, RuntimeType)> = pairs.into_iter().collect();
        let mut tables = self.tables.lock();

        // Validate against the registry and against each other before any insert.
        let mut staged = Tables::default();
        for (type_id, runtime_type) in &pairs {
            if tables.check(*type_id, runtime_type)? && staged.check(*type_id, runtime_type)? {
                staged.insert(*type_id, runtime_type.clone());
            }
        }
        let added = staged.by_id.len();
        for (type_id, runtime_type) in staged.by_id {
            tables.insert(type_id, runtime_type);
        }
        if added > 0 {
            debug!(count = added, "types registered");
        }
        Ok(added)
    }

    pub fn size(&self) -> usize {
        self.tables.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Visit every pair in ascending type id order.
    pub fn iterate(&self, mut visitor: impl FnMut(TypeId, &RuntimeType)) {
        let tables = self.tables.lock();
        for (&type_id, runtime_type) in &tables.by_id {
            visitor(type_id, runtime_type);
        }
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use keel_types::ErrorKind;
    use proptest::prelude::*;

    use super::*;

    fn tid(raw: u64) -> TypeId {
        TypeId::new(raw)
    }

    // ---- Registration ----

    #[test]
    fn register_and_lookup() {
        let registry = TypeRegistry::new();
        let person = RuntimeType::named("app.Person");
        assert!(registry.register_type(tid(7), person.clone()).unwrap());
        assert!(!registry.register_type(tid(7), person.clone()).unwrap());
        assert_eq!(registry.lookup_type_id(&person), Some(tid(7)));
        assert_eq!(registry.lookup_type(tid(7)), Some(person));
        assert_eq!(registry.size(), 1);
    }

    #[test]
    fn id_conflict_names_both_types() {
        let registry = TypeRegistry::new();
        registry
            .register_type(tid(7), RuntimeType::named("app.Person"))
            .unwrap();
        let err = registry
            .register_type(tid(7), RuntimeType::named("app.Car"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConsistencyViolation);
        let message = err.to_string();
        assert!(message.contains("app.Person") && message.contains("app.Car"), "{message}");
    }

    #[test]
    fn type_conflict_names_both_ids() {
        let registry = TypeRegistry::new();
        let person = RuntimeType::named("app.Person");
        registry.register_type(tid(7), person.clone()).unwrap();
        let err = registry.register_type(tid(8), person).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("0000000000000000007"), "{message}");
        assert!(message.contains("0000000000000000008"), "{message}");
    }

    #[test]
    fn root_and_null_are_rejected() {
        let registry = TypeRegistry::new();
        assert!(registry.register_type(tid(1), RuntimeType::root()).is_err());
        assert!(registry
            .register_type(TypeId::NULL, RuntimeType::named("app.A"))
            .is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn bulk_registration_is_all_or_nothing() {
        let registry = TypeRegistry::new();
        registry.register_type(tid(1), RuntimeType::named("app.A")).unwrap();
        let err = registry.register_types(vec![
            (tid(2), RuntimeType::named("app.B")),
            (tid(3), RuntimeType::named("app.A")),
        ]);
        assert!(err.is_err());
        assert_eq!(registry.size(), 1);

        let added = registry
            .register_types(vec![
                (tid(1), RuntimeType::named("app.A")),
                (tid(2), RuntimeType::named("app.B")),
            ])
            .unwrap();
        assert_eq!(added, 1);
    }

    #[test]
    fn bulk_registration_rejects_internal_conflicts() {
        let registry = TypeRegistry::new();
        let err = registry.register_types(vec![
            (tid(2), RuntimeType::named("app.B")),
            (tid(2), RuntimeType::named("app.C")),
        ]);
        assert!(err.is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn iterate_in_id_order() {
        let registry = TypeRegistry::new();
        registry.register_type(tid(9), RuntimeType::named("app.Z")).unwrap();
        registry.register_type(tid(3), RuntimeType::named("app.Y")).unwrap();
        let mut seen = Vec::new();
        registry.iterate(|id, t| seen.push((id.get(), t.name().to_string())));
        assert_eq!(seen, vec![(3, "app.Y".to_string()), (9, "app.Z".to_string())]);
    }

    // ---- Properties ----

    proptest! {
        #[test]
        fn registry_stays_biunique(ops in prop::collection::vec((1u64..8, 0usize..8), 1..40)) {
            let registry = TypeRegistry::new();
            let mut model_by_id: HashMap<u64, usize> = HashMap::new();
            let mut model_by_type: HashMap<usize, u64> = HashMap::new();
            for (id, name) in ops {
                let runtime_type = RuntimeType::named(format!("app.T{name}"));
                let expected_ok = match (model_by_id.get(&id), model_by_type.get(&name)) {
                    (None, None) => true,
                    (Some(&n), Some(&i)) => n == name && i == id,
                    _ => false,
                };
                let result = registry.register_type(tid(id), runtime_type);
                prop_assert_eq!(result.is_ok(), expected_ok);
                if expected_ok {
                    model_by_id.insert(id, name);
                    model_by_type.insert(name, id);
                }
            }
            prop_assert_eq!(registry.size(), model_by_id.len());
            registry.iterate(|id, t| {
                assert_eq!(registry_lookup(&model_by_type, t), Some(id.get()));
            });
        }
    }

    fn registry_lookup(model: &HashMap<usize, u64>, t: &RuntimeType) -> Option<u64> {
        let index: usize = t.name().trim_start_matches("app.T").parse().ok()?;
        model.get(&index).copied()
    }
}
