use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use keel_dictionary::DictionaryStorage;
use keel_handler::{
    HandlerError, HandlerResult, LegacyTypeHandlerCreator, SharedHandler, StoreAndCommit,
    TypeHandlerManager,
};
use keel_registry::{ObjectRegistry, TypeManager, TypeRegistry};
use keel_storer::{
    roots_handler, BatchStorer, DeactivatableStorer, Loader, ObjectManager,
    PersistenceContextDispatcher, PersistenceSource, PersistenceTarget, Roots, Storer,
    StorerConfig, StorerError, StorerMode, StorerSwitch, SwitchableWriteController,
    WriteController, ROOTS_OBJECT_ID,
};
use keel_types::{ObjectId, ObjectRef};
use tracing::{debug, info};

use crate::config::PersistenceConfig;
use crate::error::{KeelError, KeelResult};

/// One persistence context, assembled from a [`PersistenceConfig`].
///
/// Lifecycle: build with [`new`](Self::new), register every type handler,
/// then [`open`](Self::open). Opening reconciles the handlers with the
/// persisted type dictionary and loads the roots table; storing and loading
/// are refused before that.
///
/// The manager is handed out as an `Arc` because re-persisting legacy
/// handlers call back into it to write migrated instances.
pub struct PersistenceManager {
    config: PersistenceConfig,
    handlers: Arc<TypeHandlerManager>,
    objects: Arc<ObjectManager>,
    target: Arc<dyn PersistenceTarget>,
    source: Arc<dyn PersistenceSource>,
    controller: Arc<SwitchableWriteController>,
    dispatcher: Arc<dyn PersistenceContextDispatcher>,
    switch: StorerSwitch,
    roots: Arc<Roots>,
    open: AtomicBool,
}

impl PersistenceManager {
    pub fn new(
        config: PersistenceConfig,
        target: Arc<dyn PersistenceTarget>,
        source: Arc<dyn PersistenceSource>,
        dictionary: Option<Arc<dyn DictionaryStorage>>,
    ) -> KeelResult<Arc<Self>> {
        let type_manager = Arc::new(TypeManager::new(
            Arc::new(TypeRegistry::new()),
            config.ids.create_type_id_provider()?,
        ));
        let legacy = LegacyTypeHandlerCreator::new(
            config.legacy.config.clone(),
            config.refactoring_mapping()?,
        );
        let handlers = TypeHandlerManager::with_builtins(type_manager, dictionary, legacy)?;
        handlers.register_handler(Arc::new(roots_handler()))?;

        let objects = ObjectManager::new(
            Arc::new(ObjectRegistry::with_config(config.registry.clone())?),
            config.ids.create_object_id_provider()?,
        );
        let dispatcher = config.dispatch.dispatcher();

        let manager = Arc::new(Self {
            config,
            handlers: Arc::new(handlers),
            objects: Arc::new(objects),
            target,
            source,
            controller: Arc::new(SwitchableWriteController::default()),
            dispatcher,
            switch: StorerSwitch::default(),
            roots: Arc::new(Roots::new()),
            open: AtomicBool::new(false),
        });
        let weak: Weak<dyn StoreAndCommit> = Arc::downgrade(&manager) as Weak<dyn StoreAndCommit>;
        manager.handlers.set_store_and_commit(weak);
        debug!(ids = %manager.config.ids, "persistence manager created");
        Ok(manager)
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    pub fn handlers(&self) -> &Arc<TypeHandlerManager> {
        &self.handlers
    }

    pub fn object_manager(&self) -> &Arc<ObjectManager> {
        &self.objects
    }

    pub fn write_controller(&self) -> &Arc<SwitchableWriteController> {
        &self.controller
    }

    /// The switch shared by every storer from
    /// [`create_deactivatable_storer`](Self::create_deactivatable_storer).
    pub fn storer_switch(&self) -> &StorerSwitch {
        &self.switch
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn register_handler(&self, handler: SharedHandler) -> KeelResult<()> {
        if self.is_open() {
            return Err(KeelError::AlreadyOpen);
        }
        Ok(self.handlers.register_handler(handler)?)
    }

    // ---- Lifecycle ----

    /// Reconcile the registered handlers with the persisted dictionary and
    /// load the roots table, if one was stored.
    pub fn open(&self) -> KeelResult<()> {
        if self.open.swap(true, Ordering::SeqCst) {
            return Err(KeelError::AlreadyOpen);
        }
        let result = self.open_inner();
        if result.is_err() {
            self.open.store(false, Ordering::SeqCst);
        }
        result
    }

    fn open_inner(&self) -> KeelResult<()> {
        self.handlers.initialize()?;
        let roots: ObjectRef = Arc::clone(&self.roots) as ObjectRef;
        self.objects.register_constant(ROOTS_OBJECT_ID, &roots)?;
        let loaded = self.load_roots()?;
        info!(
            types = self.handlers.type_dictionary().len(),
            roots = self.roots.len(),
            loaded,
            "persistence manager opened"
        );
        Ok(())
    }

    fn ensure_open(&self) -> KeelResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(KeelError::NotOpen)
        }
    }

    // ---- Storers ----

    /// A storer in the configured mode.
    pub fn create_storer(&self) -> KeelResult<BatchStorer> {
        self.create_storer_with(&self.config.storer)
    }

    pub fn create_lazy_storer(&self) -> KeelResult<BatchStorer> {
        self.create_storer_in_mode(StorerMode::Lazy)
    }

    pub fn create_eager_storer(&self) -> KeelResult<BatchStorer> {
        self.create_storer_in_mode(StorerMode::Eager)
    }

    /// A storer in the configured mode that stops accepting calls while
    /// [`storer_switch`](Self::storer_switch) is off.
    pub fn create_deactivatable_storer(&self) -> KeelResult<DeactivatableStorer<BatchStorer>> {
        Ok(DeactivatableStorer::new(
            self.create_storer()?,
            self.switch.clone(),
        ))
    }

    /// A storer for a nested context. Whether it shares this manager's
    /// registry and id counter depends on the configured dispatch mode.
    pub fn create_nested_storer(&self) -> KeelResult<BatchStorer> {
        self.ensure_open()?;
        let objects = self.dispatcher.dispatch_object_manager(&self.objects);
        Ok(self.batch_storer(&self.config.storer, objects))
    }

    fn create_storer_in_mode(&self, mode: StorerMode) -> KeelResult<BatchStorer> {
        self.create_storer_with(&StorerConfig {
            mode,
            ..self.config.storer.clone()
        })
    }

    fn create_storer_with(&self, config: &StorerConfig) -> KeelResult<BatchStorer> {
        self.ensure_open()?;
        Ok(self.batch_storer(config, Arc::clone(&self.objects)))
    }

    fn batch_storer(&self, config: &StorerConfig, objects: Arc<ObjectManager>) -> BatchStorer {
        BatchStorer::new(
            config,
            Arc::clone(&self.handlers),
            objects,
            Arc::clone(&self.target),
            Arc::clone(&self.controller) as Arc<dyn WriteController>,
        )
    }

    // ---- Storing ----

    /// Store `instance` and everything new it references, and commit.
    pub fn store(&self, instance: &ObjectRef) -> KeelResult<ObjectId> {
        let mut storer = self.create_lazy_storer()?;
        let object_id = storer.store(instance)?;
        storer.commit()?;
        Ok(object_id)
    }

    /// Store each element of `instances` in one batch, and commit.
    pub fn store_all(&self, instances: &[ObjectRef]) -> KeelResult<Vec<ObjectId>> {
        let mut storer = self.create_lazy_storer()?;
        let object_ids = storer.store_all(instances)?;
        storer.commit()?;
        Ok(object_ids)
    }

    // ---- Roots ----

    pub fn roots(&self) -> &Arc<Roots> {
        &self.roots
    }

    /// Write the roots table and every new object reachable from it.
    /// Returns the number of records written.
    pub fn store_roots(&self) -> KeelResult<usize> {
        let roots: ObjectRef = Arc::clone(&self.roots) as ObjectRef;
        let mut storer = self.create_lazy_storer()?;
        storer.store(&roots)?;
        let count = storer.commit()?;
        self.roots.mark_persisted();
        debug!(records = count, roots = self.roots.len(), "roots stored");
        Ok(count)
    }

    /// Replace the roots table with its stored state. Returns `false` if no
    /// roots table was stored yet.
    pub fn load_roots(&self) -> KeelResult<bool> {
        self.ensure_open()?;
        match self.loader().reload(ROOTS_OBJECT_ID) {
            Ok(_) => Ok(true),
            Err(StorerError::MissingRecord { object_id }) if object_id == ROOTS_OBJECT_ID => {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    // ---- Loading ----

    pub fn loader(&self) -> Loader {
        Loader::new(
            Arc::clone(&self.handlers),
            Arc::clone(&self.objects),
            Arc::clone(&self.source),
        )
    }

    /// The live object for `object_id`, loading it and its references if
    /// needed. `None` for the null id and for dropped instances.
    pub fn get_object(&self, object_id: ObjectId) -> KeelResult<Option<ObjectRef>> {
        self.ensure_open()?;
        Ok(self.loader().get_object(object_id)?)
    }

    pub fn type_dictionary_text(&self) -> String {
        self.handlers.type_dictionary_text()
    }
}

impl StoreAndCommit for PersistenceManager {
    fn store_and_commit(&self, instance: &ObjectRef) -> HandlerResult<ObjectId> {
        self.store(instance)
            .map_err(|e| match e {
                KeelError::Handler(inner) => inner,
                other => HandlerError::external(other.kind(), other),
            })
    }
}

impl fmt::Debug for PersistenceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceManager")
            .field("open", &self.is_open())
            .field("objects", &self.objects)
            .field("roots", &self.roots)
            .finish()
    }
}
