use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};

use keel_dictionary::{
    assemble, equal_structures, parse_dictionary, DictionaryStorage, Member, TypeDescription,
    TypeDictionary,
};
use keel_registry::TypeManager;
use keel_types::{ObjectRef, ObjectRefExt, RuntimeType, TypeId};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::context::StoreAndCommit;
use crate::custom::{reference_array_handler, string_handler};
use crate::error::{HandlerError, HandlerResult};
use crate::handler::SharedHandler;
use crate::legacy::{LegacyTypeHandlerCreator, RepersistingLegacyHandler};

#[derive(Default)]
struct Handlers {
    by_rust_type: HashMap<std::any::TypeId, SharedHandler>,
    by_name: HashMap<String, SharedHandler>,
    /// Current handlers with an initialized type id, and legacy handlers.
    by_type_id: HashMap<TypeId, SharedHandler>,
    non_persistable: HashSet<std::any::TypeId>,
    custom_legacy_by_id: HashMap<TypeId, SharedHandler>,
    custom_legacy_by_structure: Vec<(Vec<Member>, SharedHandler)>,
}

/// Owns every type handler of a persistence context.
///
/// Handlers are registered as prototypes without a type id. A handler's type
/// id is assigned the first time an instance of its type is stored, or when
/// [`initialize`](Self::initialize) reconciles the registered handlers with
/// the persisted dictionary. Every new description is appended to the
/// dictionary and, if a storage is configured, written out.
///
/// Lock order: dictionary before handlers.
pub struct TypeHandlerManager {
    type_manager: Arc<TypeManager>,
    handlers: RwLock<Handlers>,
    dictionary: Mutex<TypeDictionary>,
    storage: Option<Arc<dyn DictionaryStorage>>,
    legacy: LegacyTypeHandlerCreator,
    store_and_commit: RwLock<Option<Weak<dyn StoreAndCommit>>>,
}

impl TypeHandlerManager {
    pub fn new(
        type_manager: Arc<TypeManager>,
        storage: Option<Arc<dyn DictionaryStorage>>,
        legacy: LegacyTypeHandlerCreator,
    ) -> Self {
        Self {
            type_manager,
            handlers: RwLock::new(Handlers::default()),
            dictionary: Mutex::new(TypeDictionary::new()),
            storage,
            legacy,
            store_and_commit: RwLock::new(None),
        }
    }

    /// A manager with the built-in string and reference array handlers
    /// registered.
    pub fn with_builtins(
        type_manager: Arc<TypeManager>,
        storage: Option<Arc<dyn DictionaryStorage>>,
        legacy: LegacyTypeHandlerCreator,
    ) -> HandlerResult<Self> {
        let manager = Self::new(type_manager, storage, legacy);
        manager.register_handler(Arc::new(string_handler()))?;
        manager.register_handler(Arc::new(reference_array_handler()))?;
        Ok(manager)
    }

    pub fn type_manager(&self) -> &Arc<TypeManager> {
        &self.type_manager
    }

    pub fn legacy_creator(&self) -> &LegacyTypeHandlerCreator {
        &self.legacy
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register a handler prototype for its runtime type.
    pub fn register_handler(&self, handler: SharedHandler) -> HandlerResult<()> {
        let runtime_type = handler.runtime_type();
        let rust_type = runtime_type
            .rust_type()
            .ok_or_else(|| HandlerError::AbstractType {
                type_name: runtime_type.name().to_string(),
            })?;
        let mut handlers = self.handlers.write();
        if handlers.by_rust_type.contains_key(&rust_type)
            || handlers.by_name.contains_key(runtime_type.name())
        {
            return Err(HandlerError::DuplicateHandler {
                type_name: runtime_type.name().to_string(),
            });
        }
        debug!(type_name = runtime_type.name(), kind = ?handler.kind(), "type handler registered");
        handlers
            .by_name
            .insert(runtime_type.name().to_string(), Arc::clone(&handler));
        handlers.by_rust_type.insert(rust_type, handler);
        Ok(())
    }

    /// Exclude `T` from persistence even if a handler would be available.
    pub fn mark_non_persistable<T: 'static>(&self) {
        self.handlers
            .write()
            .non_persistable
            .insert(std::any::TypeId::of::<T>());
    }

    /// Use `handler` for records of `type_id` instead of a derived legacy
    /// handler.
    pub fn register_legacy_handler(&self, type_id: TypeId, handler: SharedHandler) {
        self.handlers
            .write()
            .custom_legacy_by_id
            .insert(type_id, handler);
    }

    /// Use `handler` for every legacy shape whose instance members are
    /// structure-equal to `members`.
    pub fn register_legacy_handler_for_structure(&self, members: Vec<Member>, handler: SharedHandler) {
        self.handlers
            .write()
            .custom_legacy_by_structure
            .push((members, handler));
    }

    /// The layer that owns the storers, for re-persisting migrated instances.
    pub fn set_store_and_commit(&self, target: Weak<dyn StoreAndCommit>) {
        *self.store_and_commit.write() = Some(target);
    }

    // -----------------------------------------------------------------------
    // Initialization
    // -----------------------------------------------------------------------

    /// Load the persisted dictionary, if any, and reconcile all handlers
    /// with it.
    pub fn initialize(&self) -> HandlerResult<()> {
        let persisted = match &self.storage {
            Some(storage) => match storage.load_type_dictionary()? {
                Some(text) => parse_dictionary(&text)?,
                None => TypeDictionary::new(),
            },
            None => TypeDictionary::new(),
        };
        self.initialize_with(persisted)
    }

    /// Reconcile all registered handlers with `persisted`.
    ///
    /// A handler whose shape is description-equal to an entry of its lineage
    /// takes over that entry's type id; otherwise it gets a new one. The type
    /// id provider is moved past every persisted id first.
    pub fn initialize_with(&self, persisted: TypeDictionary) -> HandlerResult<()> {
        let mut dictionary = self.dictionary.lock();
        let merged = dictionary.register_descriptions(
            persisted.descriptions().map(|d| TypeDescription::clone(d)),
        )?;
        if let Some(highest) = dictionary.highest_type_id() {
            self.type_manager.update_current_type_id(highest)?;
        }

        let mut prototypes: Vec<SharedHandler> =
            self.handlers.read().by_name.values().cloned().collect();
        prototypes.sort_by(|a, b| a.type_name().cmp(b.type_name()));

        let mut added = 0;
        for handler in &prototypes {
            if self.initialize_handler(&mut dictionary, handler)? {
                added += 1;
            }
        }
        info!(
            persisted = merged,
            handlers = prototypes.len(),
            added,
            "type handlers initialized"
        );
        if added > 0 {
            self.persist(&dictionary)?;
        }
        Ok(())
    }

    /// Give `handler` its type id and make its description the runtime
    /// definition of its lineage. Returns whether the dictionary grew.
    fn initialize_handler(
        &self,
        dictionary: &mut TypeDictionary,
        handler: &SharedHandler,
    ) -> HandlerResult<bool> {
        let runtime_type = handler.runtime_type();
        if let Some(type_id) = handler.type_id() {
            self.handlers
                .write()
                .by_type_id
                .insert(type_id, Arc::clone(handler));
            return Ok(false);
        }

        let persisted = dictionary
            .lineage(runtime_type.name())
            .and_then(|l| l.find_description_equal(handler.all_members()))
            .map(|d| d.type_id());
        let type_id = match persisted {
            Some(type_id) => {
                self.type_manager.register_type(type_id, runtime_type.clone())?;
                self.ensure_super_types(runtime_type)?;
                type_id
            }
            None => self.type_manager.ensure_type_id(runtime_type)?,
        };
        handler.initialize_type_id(type_id)?;
        let added = dictionary.set_runtime_definition(handler.description()?)?;
        if added {
            info!(type_id = %type_id, type_name = runtime_type.name(), "type description added");
        }
        self.handlers
            .write()
            .by_type_id
            .insert(type_id, Arc::clone(handler));
        Ok(added)
    }

    fn ensure_super_types(&self, runtime_type: &RuntimeType) -> HandlerResult<()> {
        for super_type in runtime_type.super_types() {
            self.type_manager.ensure_type_id(&super_type)?;
        }
        Ok(())
    }

    fn persist(&self, dictionary: &TypeDictionary) -> HandlerResult<()> {
        if let Some(storage) = &self.storage {
            storage.store_type_dictionary(&assemble(dictionary))?;
            debug!(types = dictionary.len(), "type dictionary stored");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// The handler for `instance`'s runtime type, with its type id assigned.
    pub fn ensure_type_handler(&self, instance: &ObjectRef) -> HandlerResult<SharedHandler> {
        let rust_type = instance.entity_type();
        let handler = {
            let handlers = self.handlers.read();
            if handlers.non_persistable.contains(&rust_type) {
                return Err(HandlerError::ExplicitlyNotPersistable {
                    type_name: instance.entity_type_name().to_string(),
                });
            }
            handlers.by_rust_type.get(&rust_type).cloned()
        };
        let handler = handler.ok_or_else(|| HandlerError::NotPersistable {
            type_name: instance.entity_type_name().to_string(),
        })?;
        if handler.type_id().is_none() {
            self.ensure_initialized(&handler)?;
        }
        Ok(handler)
    }

    /// The handler registered for a persistent type name.
    pub fn lookup_handler(&self, type_name: &str) -> Option<SharedHandler> {
        self.handlers.read().by_name.get(type_name).cloned()
    }

    fn ensure_initialized(&self, handler: &SharedHandler) -> HandlerResult<()> {
        let mut dictionary = self.dictionary.lock();
        if self.initialize_handler(&mut dictionary, handler)? {
            self.persist(&dictionary)?;
        }
        Ok(())
    }

    /// The handler for records of `type_id`: the current handler of the
    /// type, or a legacy handler created on first use.
    pub fn ensure_type_handler_for(&self, type_id: TypeId) -> HandlerResult<SharedHandler> {
        if let Some(handler) = self.handlers.read().by_type_id.get(&type_id) {
            return Ok(Arc::clone(handler));
        }
        let description = self
            .dictionary
            .lock()
            .lookup(type_id)
            .cloned()
            .ok_or(HandlerError::UnknownTypeId { type_id })?;

        if let Some(handler) = self.custom_legacy_handler(&description) {
            self.handlers
                .write()
                .by_type_id
                .insert(type_id, Arc::clone(&handler));
            return Ok(handler);
        }

        let current_name = self
            .legacy
            .mapping()
            .current_type_name(description.type_name())
            .unwrap_or(description.type_name())
            .to_string();
        let current = self
            .lookup_handler(&current_name)
            .ok_or_else(|| HandlerError::NoCurrentType {
                type_id,
                type_name: description.type_name().to_string(),
            })?;
        if current.type_id().is_none() {
            self.ensure_initialized(&current)?;
        }
        if current.type_id() == Some(type_id) {
            return Ok(current);
        }

        let mut handler = self.legacy.create(description, current)?;
        if self.legacy.config().repersist {
            if let Some(target) = self.store_and_commit.read().clone() {
                handler = Arc::new(RepersistingLegacyHandler::new(handler, target));
            }
        }
        let mut handlers = self.handlers.write();
        let handler = handlers
            .by_type_id
            .entry(type_id)
            .or_insert(handler)
            .clone();
        Ok(handler)
    }

    fn custom_legacy_handler(&self, description: &TypeDescription) -> Option<SharedHandler> {
        let handlers = self.handlers.read();
        if let Some(handler) = handlers.custom_legacy_by_id.get(&description.type_id()) {
            return Some(Arc::clone(handler));
        }
        handlers
            .custom_legacy_by_structure
            .iter()
            .find(|(members, _)| equal_structures(members, description.instance_members()))
            .map(|(_, handler)| Arc::clone(handler))
    }

    // -----------------------------------------------------------------------
    // Dictionary
    // -----------------------------------------------------------------------

    /// A snapshot of the dictionary.
    pub fn type_dictionary(&self) -> TypeDictionary {
        self.dictionary.lock().clone()
    }

    pub fn type_dictionary_text(&self) -> String {
        assemble(&self.dictionary.lock())
    }

    pub fn lookup_description(&self, type_id: TypeId) -> Option<Arc<TypeDescription>> {
        self.dictionary.lock().lookup(type_id).cloned()
    }

    /// Every registered handler prototype, by type name.
    pub fn handlers(&self) -> Vec<SharedHandler> {
        let mut handlers: Vec<SharedHandler> =
            self.handlers.read().by_name.values().cloned().collect();
        handlers.sort_by(|a, b| a.type_name().cmp(b.type_name()));
        handlers
    }
}

impl fmt::Debug for TypeHandlerManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read();
        f.debug_struct("TypeHandlerManager")
            .field("handlers", &handlers.by_name.len())
            .field("initialized", &handlers.by_type_id.len())
            .field("storage", &self.storage.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use keel_dictionary::InMemoryDictionaryStorage;
    use keel_ids::TransientIdProvider;
    use keel_registry::TypeRegistry;
    use keel_types::{ErrorKind, PrimitiveKind};

    use super::*;
    use crate::context::Link;
    use crate::enums::{EnumHandler, PersistentEnum};
    use crate::handler::HandlerKind;
    use crate::layout::EntityLayout;
    use crate::legacy::{LegacyConfig, RefactoringMapping};

    struct Dog {
        name: String,
        legs: i32,
        owner: Link,
    }

    #[derive(Clone, Copy)]
    enum Size {
        Small,
        Large,
    }

    impl PersistentEnum for Size {
        fn constants() -> Vec<Self> {
            vec![Size::Small, Size::Large]
        }

        fn ordinal(&self) -> usize {
            *self as usize
        }

        fn name(&self) -> &str {
            match self {
                Size::Small => "SMALL",
                Size::Large => "LARGE",
            }
        }
    }

    fn dog_layout() -> SharedHandler {
        EntityLayout::new("app.Dog", |f| {
            Ok(Dog {
                name: f.string("name")?,
                legs: f.get("app.Animal#legs")?,
                owner: Link::empty(),
            })
        })
        .extending(RuntimeType::named("app.Animal"))
        .primitive("app.Animal#legs", |d: &Dog| d.legs)
        .chars("name", |d: &Dog| d.name.clone())
        .link("owner", "keel.String", |d: &Dog| &d.owner)
        .shared()
    }

    fn manager_with(storage: Arc<InMemoryDictionaryStorage>, mapping: RefactoringMapping) -> TypeHandlerManager {
        let type_manager = Arc::new(TypeManager::new(
            Arc::new(TypeRegistry::new()),
            Box::new(TransientIdProvider::<TypeId>::new(1_000_000)),
        ));
        let storage: Arc<dyn DictionaryStorage> = storage;
        TypeHandlerManager::with_builtins(
            type_manager,
            Some(storage),
            LegacyTypeHandlerCreator::new(LegacyConfig::default(), mapping),
        )
        .unwrap()
    }

    fn manager(storage: Arc<InMemoryDictionaryStorage>) -> TypeHandlerManager {
        manager_with(storage, RefactoringMapping::new())
    }

    // ---- Registration ----

    #[test]
    fn duplicate_and_abstract_handlers_are_rejected() {
        let manager = manager(Arc::new(InMemoryDictionaryStorage::new()));
        let err = manager
            .register_handler(Arc::new(string_handler()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConsistencyViolation);
        assert_eq!(manager.handlers().len(), 2);
    }

    #[test]
    fn unregistered_and_excluded_types_are_not_persistable() {
        let manager = manager(Arc::new(InMemoryDictionaryStorage::new()));
        let unknown: ObjectRef = Arc::new(3.5f64);
        let err = manager.ensure_type_handler(&unknown).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeNotPersistable);

        manager.mark_non_persistable::<String>();
        let text: ObjectRef = Arc::new(String::from("x"));
        let err = manager.ensure_type_handler(&text).unwrap_err();
        assert!(matches!(err, HandlerError::ExplicitlyNotPersistable { .. }));
    }

    // ---- Lazy registration ----

    #[test]
    fn first_use_assigns_type_id_and_stores_dictionary() {
        let storage = Arc::new(InMemoryDictionaryStorage::new());
        let manager = manager(Arc::clone(&storage));
        manager.register_handler(dog_layout()).unwrap();

        let dog: ObjectRef = Arc::new(Dog {
            name: "rex".into(),
            legs: 4,
            owner: Link::empty(),
        });
        let handler = manager.ensure_type_handler(&dog).unwrap();
        let type_id = handler.type_id().unwrap();
        assert_eq!(type_id, TypeId::new(1_000_001));

        // The supertype gets an id, the root does not.
        let animal = manager
            .type_manager()
            .lookup_type_id(&RuntimeType::named("app.Animal"));
        assert!(animal.is_some());

        let text = storage.load_type_dictionary().unwrap().unwrap();
        assert!(text.contains("app.Dog"), "{text}");
        assert!(text.contains("app.Animal#legs"), "{text}");

        let again = manager.ensure_type_handler(&dog).unwrap();
        assert!(Arc::ptr_eq(&handler, &again));
        assert!(Arc::ptr_eq(&manager.ensure_type_handler_for(type_id).unwrap(), &handler));
    }

    // ---- Initialization ----

    #[test]
    fn restart_reuses_persisted_type_ids() {
        let storage = Arc::new(InMemoryDictionaryStorage::new());
        let first = manager(Arc::clone(&storage));
        first.register_handler(dog_layout()).unwrap();
        first.initialize().unwrap();
        let dictionary = first.type_dictionary();
        let dog_id = dictionary.lineage("app.Dog").unwrap().latest().unwrap().type_id();

        let second = manager(Arc::clone(&storage));
        second.register_handler(dog_layout()).unwrap();
        second.initialize().unwrap();
        let handler = second.lookup_handler("app.Dog").unwrap();
        assert_eq!(handler.type_id(), Some(dog_id));
        assert!(second.type_dictionary().equals_description(&dictionary));
    }

    #[test]
    fn changed_shape_gets_new_id_and_old_id_loads_through_legacy_handler() {
        let storage = Arc::new(InMemoryDictionaryStorage::with_text(
            "0000000000001000500 app.Dog {\n\t[char] name\n\ti16 app.Animal#legs\n\tkeel.String owner\n}\n",
        ));
        let manager = manager(Arc::clone(&storage));
        manager.register_handler(dog_layout()).unwrap();
        manager.initialize().unwrap();

        let current = manager.lookup_handler("app.Dog").unwrap();
        assert_eq!(current.type_id(), Some(TypeId::new(1_000_501)));

        let old = TypeId::new(1_000_500);
        let legacy = manager.ensure_type_handler_for(old).unwrap();
        assert_eq!(legacy.kind(), HandlerKind::Legacy);
        assert_eq!(legacy.type_id(), Some(old));
        let again = manager.ensure_type_handler_for(old).unwrap();
        assert!(Arc::ptr_eq(&legacy, &again));

        let text = storage.load_type_dictionary().unwrap().unwrap();
        assert!(text.contains("0000000000001000500") && text.contains("0000000000001000501"));
    }

    #[test]
    fn renamed_type_finds_its_current_handler() {
        let storage = Arc::new(InMemoryDictionaryStorage::with_text(
            "0000000000000000500 app.Hound {\n\t[char] name\n}\n",
        ));
        let manager = manager_with(
            storage,
            RefactoringMapping::new().rename_type("app.Hound", "app.Dog"),
        );
        manager.register_handler(dog_layout()).unwrap();
        manager.initialize().unwrap();
        let legacy = manager.ensure_type_handler_for(TypeId::new(500)).unwrap();
        assert_eq!(legacy.type_name(), "app.Hound");
        assert_eq!(legacy.runtime_type().name(), "app.Dog");
    }

    #[test]
    fn unknown_and_orphaned_type_ids_fail() {
        let storage = Arc::new(InMemoryDictionaryStorage::with_text(
            "0000000000000000500 app.Gone {\n\ti32 x\n}\n",
        ));
        let manager = manager(storage);
        manager.initialize().unwrap();
        let err = manager.ensure_type_handler_for(TypeId::new(9)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownIdentifier);
        let err = manager.ensure_type_handler_for(TypeId::new(500)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeNotPersistable);
    }

    #[test]
    fn custom_legacy_handlers_take_precedence() {
        let storage = Arc::new(InMemoryDictionaryStorage::with_text(
            "0000000000000000500 keel.String {\n\t[char] text\n}\n",
        ));
        let manager = manager(storage);
        manager.initialize().unwrap();
        let custom: SharedHandler = Arc::new(string_handler());
        manager.register_legacy_handler_for_structure(vec![Member::chars("anything")], Arc::clone(&custom));
        let handler = manager.ensure_type_handler_for(TypeId::new(500)).unwrap();
        assert!(Arc::ptr_eq(&handler, &custom));
    }

    #[test]
    fn enum_handlers_register_like_any_other() {
        let manager = manager(Arc::new(InMemoryDictionaryStorage::new()));
        manager
            .register_handler(Arc::new(EnumHandler::<Size>::new("app.Size")))
            .unwrap();
        manager.initialize().unwrap();
        let text = manager.type_dictionary_text();
        assert!(text.contains("enum SMALL"), "{text}");
        assert!(text.contains("enum LARGE"), "{text}");
        assert!(text.contains(PrimitiveKind::I32.name()), "{text}");
    }
}
