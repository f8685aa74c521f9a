use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use keel_handler::{HandlerResult, SharedHandler, StoreContext, TypeHandlerManager};
use keel_types::{EntityRecord, ObjectHandle, ObjectId, ObjectRef, ObjectRefExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{StorerError, StorerResult};
use crate::object_manager::{ObjectManager, StorerToken};
use crate::target::{Batch, PersistenceTarget, WriteController};

/// Whether already registered objects reached through references are
/// written again.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorerMode {
    /// Only objects new to the registry are written.
    #[default]
    Lazy,
    /// Every reachable object is written, once per storer.
    Eager,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorerState {
    Fresh,
    Accumulating,
    Committed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorerConfig {
    pub mode: StorerMode,
    /// Records reserved up front for a fresh batch.
    pub initial_capacity: usize,
    /// Largest batch a storer accepts; unbounded if absent.
    pub maximum_capacity: Option<usize>,
}

impl Default for StorerConfig {
    fn default() -> Self {
        Self {
            mode: StorerMode::Lazy,
            initial_capacity: 64,
            maximum_capacity: None,
        }
    }
}

/// One store operation: collects the records of an object graph and hands
/// them to the target on commit.
///
/// A storer is used from one thread at a time. Concurrent store operations
/// use separate storers over the same registries.
pub trait Storer: Send {
    /// Store `instance` and everything it reaches that has to be written.
    ///
    /// The instance itself is always written, once per storer, even if it is
    /// already registered.
    fn store(&mut self, instance: &ObjectRef) -> StorerResult<ObjectId>;

    /// Store each element. The slice itself is not an object and is never
    /// registered.
    fn store_all(&mut self, instances: &[ObjectRef]) -> StorerResult<Vec<ObjectId>> {
        instances.iter().map(|instance| self.store(instance)).collect()
    }

    /// Give `instance` an id without writing it. Returns `false` if the
    /// instance was already handled by this storer.
    fn skip(&mut self, instance: &ObjectRef) -> StorerResult<bool>;

    /// Write references to `instance` as null.
    fn skip_nulled(&mut self, instance: &ObjectRef) -> StorerResult<bool>;

    /// Write references to `instance` as `object_id` without writing it.
    fn skip_mapped(&mut self, instance: &ObjectRef, object_id: ObjectId) -> StorerResult<bool>;

    /// Write the pending batch. Returns the number of records written.
    fn commit(&mut self) -> StorerResult<usize>;

    /// Discard everything pending.
    fn reinitialize(&mut self);

    /// Records in the pending batch.
    fn size(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    fn current_capacity(&self) -> usize;

    fn maximum_capacity(&self) -> usize;

    fn ensure_capacity(&mut self, capacity: usize) -> StorerResult<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Origin {
    Skipped,
    /// Registered before this batch.
    Registry,
    /// Numbered by this storer.
    Batch,
}

struct Pending {
    instance: ObjectRef,
    object_id: ObjectId,
    handler: SharedHandler,
}

/// The standard [`Storer`], in lazy or eager mode.
///
/// Storers sharing an [`ObjectManager`] give a new object one id between
/// them: a storer reaching an object another storer numbered but has not
/// committed reuses that id and writes the object too.
pub struct BatchStorer {
    mode: StorerMode,
    initial_capacity: usize,
    maximum_capacity: Option<usize>,
    handlers: Arc<TypeHandlerManager>,
    objects: Arc<ObjectManager>,
    token: StorerToken,
    target: Arc<dyn PersistenceTarget>,
    controller: Arc<dyn WriteController>,
    state: StorerState,
    records: Vec<EntityRecord>,
    pending: VecDeque<Pending>,
    enqueued: HashSet<ObjectHandle>,
    new_entries: HashMap<ObjectHandle, (ObjectId, ObjectRef)>,
    skipped: HashMap<ObjectHandle, ObjectId>,
}

impl BatchStorer {
    pub fn new(
        config: &StorerConfig,
        handlers: Arc<TypeHandlerManager>,
        objects: Arc<ObjectManager>,
        target: Arc<dyn PersistenceTarget>,
        controller: Arc<dyn WriteController>,
    ) -> Self {
        let token = objects.register_storer();
        Self {
            mode: config.mode,
            initial_capacity: config.initial_capacity,
            maximum_capacity: config.maximum_capacity,
            handlers,
            objects,
            token,
            target,
            controller,
            state: StorerState::Fresh,
            records: Vec::with_capacity(config.initial_capacity),
            pending: VecDeque::new(),
            enqueued: HashSet::new(),
            new_entries: HashMap::new(),
            skipped: HashMap::new(),
        }
    }

    pub fn mode(&self) -> StorerMode {
        self.mode
    }

    pub fn state(&self) -> StorerState {
        self.state
    }

    /// The pending records, in the order they were produced.
    pub fn records(&self) -> &[EntityRecord] {
        &self.records
    }

    fn lookup(&self, instance: &ObjectRef) -> Option<(ObjectId, Origin)> {
        let handle = instance.handle();
        if let Some(&object_id) = self.skipped.get(&handle) {
            return Some((object_id, Origin::Skipped));
        }
        if let Some((object_id, _)) = self.new_entries.get(&handle) {
            return Some((*object_id, Origin::Batch));
        }
        self.objects
            .lookup_object_id(instance)
            .map(|object_id| (object_id, Origin::Registry))
    }

    fn ensure_object_id(&mut self, instance: &ObjectRef) -> StorerResult<(ObjectId, Origin)> {
        if let Some(found) = self.lookup(instance) {
            return Ok(found);
        }
        let (object_id, registered) = self.objects.ensure_object_id(self.token, instance)?;
        if registered {
            return Ok((object_id, Origin::Registry));
        }
        self.new_entries
            .insert(instance.handle(), (object_id, ObjectRef::clone(instance)));
        Ok((object_id, Origin::Batch))
    }

    /// Number `instance` and enqueue it if the mode says so.
    fn visit(&mut self, instance: &ObjectRef, explicit: bool) -> StorerResult<ObjectId> {
        let handle = instance.handle();
        if let Some(&object_id) = self.skipped.get(&handle) {
            return Ok(object_id);
        }
        let handler = self.handlers.ensure_type_handler(instance)?;
        let (object_id, origin) = self.ensure_object_id(instance)?;
        let wanted = explicit || origin == Origin::Batch || self.mode == StorerMode::Eager;
        if wanted && !self.enqueued.contains(&handle) {
            self.check_capacity(self.enqueued.len() + 1)?;
            self.enqueued.insert(handle);
            self.pending.push_back(Pending {
                instance: ObjectRef::clone(instance),
                object_id,
                handler,
            });
        }
        Ok(object_id)
    }

    fn drain(&mut self) -> StorerResult<()> {
        while let Some(item) = self.pending.pop_front() {
            let record = item.handler.store(&item.instance, item.object_id, self)?;
            self.records.push(record);
        }
        Ok(())
    }

    fn check_capacity(&self, requested: usize) -> StorerResult<()> {
        match self.maximum_capacity {
            Some(maximum) if requested > maximum => {
                Err(StorerError::CapacityExceeded { requested, maximum })
            }
            _ => Ok(()),
        }
    }

    fn begin(&mut self) {
        if self.state != StorerState::Accumulating {
            self.state = StorerState::Accumulating;
        }
    }

    fn handled(&self, handle: ObjectHandle) -> bool {
        self.enqueued.contains(&handle) || self.skipped.contains_key(&handle)
    }

    fn clear(&mut self) {
        self.pending.clear();
        self.enqueued.clear();
        self.new_entries.clear();
        self.skipped.clear();
        self.objects.release_storer(self.token);
    }
}

impl Drop for BatchStorer {
    fn drop(&mut self) {
        self.objects.release_storer(self.token);
    }
}

impl StoreContext for BatchStorer {
    fn apply(&mut self, instance: &ObjectRef) -> HandlerResult<ObjectId> {
        self.visit(instance, false)
            .map_err(StorerError::into_handler_error)
    }
}

impl Storer for BatchStorer {
    fn store(&mut self, instance: &ObjectRef) -> StorerResult<ObjectId> {
        self.begin();
        let object_id = self.visit(instance, true)?;
        self.drain()?;
        Ok(object_id)
    }

    fn store_all(&mut self, instances: &[ObjectRef]) -> StorerResult<Vec<ObjectId>> {
        let object_ids = instances
            .iter()
            .map(|instance| self.store(instance))
            .collect::<StorerResult<Vec<_>>>()?;
        debug!(count = object_ids.len(), pending = self.records.len(), "instances stored");
        Ok(object_ids)
    }

    fn skip(&mut self, instance: &ObjectRef) -> StorerResult<bool> {
        let handle = instance.handle();
        if self.handled(handle) {
            return Ok(false);
        }
        let (object_id, _) = self.ensure_object_id(instance)?;
        self.skipped.insert(handle, object_id);
        Ok(true)
    }

    fn skip_nulled(&mut self, instance: &ObjectRef) -> StorerResult<bool> {
        let handle = instance.handle();
        if self.handled(handle) {
            return Ok(false);
        }
        self.skipped.insert(handle, ObjectId::NULL);
        Ok(true)
    }

    fn skip_mapped(&mut self, instance: &ObjectRef, object_id: ObjectId) -> StorerResult<bool> {
        let handle = instance.handle();
        if self.handled(handle) {
            return Ok(false);
        }
        self.objects.registry().validate(object_id, instance)?;
        if self.objects.lookup_object_id(instance).is_none() {
            self.objects.claim_object_id(self.token, object_id, instance)?;
            self.new_entries
                .insert(handle, (object_id, ObjectRef::clone(instance)));
        }
        self.skipped.insert(handle, object_id);
        Ok(true)
    }

    fn commit(&mut self) -> StorerResult<usize> {
        self.controller.validate_is_storing_enabled()?;
        let batch = Batch::new(std::mem::take(&mut self.records));
        let count = batch.len();
        let target = &self.target;
        let committed = self.objects.commit_entries(
            self.token,
            self.new_entries.values().map(|(id, object)| (*id, object)),
            || {
                if batch.is_empty() {
                    Ok(())
                } else {
                    target.write(&batch)
                }
            },
        );
        if let Err(error) = committed {
            self.records = batch.records;
            return Err(error);
        }
        self.clear();
        self.records = Vec::with_capacity(self.initial_capacity);
        self.state = StorerState::Committed;
        info!(records = count, mode = ?self.mode, "batch committed");
        Ok(count)
    }

    fn reinitialize(&mut self) {
        self.clear();
        self.records = Vec::with_capacity(self.initial_capacity);
        self.state = StorerState::Fresh;
    }

    fn size(&self) -> usize {
        self.records.len()
    }

    fn current_capacity(&self) -> usize {
        self.records.capacity()
    }

    fn maximum_capacity(&self) -> usize {
        self.maximum_capacity.unwrap_or(usize::MAX)
    }

    fn ensure_capacity(&mut self, capacity: usize) -> StorerResult<()> {
        self.check_capacity(capacity)?;
        self.records
            .reserve(capacity.saturating_sub(self.records.len()));
        Ok(())
    }
}

impl fmt::Debug for BatchStorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchStorer")
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("records", &self.records.len())
            .field("new_entries", &self.new_entries.len())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use keel_dictionary::InMemoryDictionaryStorage;
    use keel_handler::{
        EntityLayout, LegacyConfig, LegacyTypeHandlerCreator, Link,
        RefactoringMapping, ReferenceArray, TypeHandlerManager,
    };
    use keel_ids::TransientIdProvider;
    use keel_registry::{ObjectRegistry, TypeManager, TypeRegistry};
    use keel_types::{ErrorKind, TypeId, Value};

    use super::*;
    use crate::target::{InMemoryStorage, SwitchableWriteController};

    pub(crate) struct Node {
        pub label: String,
        pub next: Link,
    }

    pub(crate) fn node(label: &str, next: Option<&ObjectRef>) -> ObjectRef {
        Arc::new(Node {
            label: label.to_string(),
            next: Link::new(next.cloned()),
        })
    }

    pub(crate) struct Fixture {
        pub handlers: Arc<TypeHandlerManager>,
        pub objects: Arc<ObjectManager>,
        pub storage: Arc<InMemoryStorage>,
        pub controller: Arc<SwitchableWriteController>,
    }

    impl Fixture {
        pub fn new() -> Self {
            let type_manager = Arc::new(TypeManager::new(
                Arc::new(TypeRegistry::new()),
                Box::new(TransientIdProvider::<TypeId>::new(1_000_000)),
            ));
            let storage: Arc<dyn keel_dictionary::DictionaryStorage> =
                Arc::new(InMemoryDictionaryStorage::new());
            let handlers = TypeHandlerManager::with_builtins(
                type_manager,
                Some(storage),
                LegacyTypeHandlerCreator::new(LegacyConfig::default(), RefactoringMapping::new()),
            )
            .unwrap();
            handlers
                .register_handler(
                    EntityLayout::new("test.Node", |f| {
                        Ok(Node {
                            label: f.string("label")?,
                            next: Link::empty(),
                        })
                    })
                    .chars("label", |n: &Node| n.label.clone())
                    .link("next", "test.Node", |n: &Node| &n.next)
                    .shared(),
                )
                .unwrap();
            Self {
                handlers: Arc::new(handlers),
                objects: Arc::new(ObjectManager::new(
                    Arc::new(ObjectRegistry::new()),
                    Box::new(TransientIdProvider::<ObjectId>::with_default_start()),
                )),
                storage: Arc::new(InMemoryStorage::new()),
                controller: Arc::new(SwitchableWriteController::default()),
            }
        }

        pub fn storer(&self, mode: StorerMode) -> BatchStorer {
            self.storer_with(&StorerConfig {
                mode,
                ..StorerConfig::default()
            })
        }

        pub fn storer_with(&self, config: &StorerConfig) -> BatchStorer {
            BatchStorer::new(
                config,
                Arc::clone(&self.handlers),
                Arc::clone(&self.objects),
                Arc::clone(&self.storage) as Arc<dyn PersistenceTarget>,
                Arc::clone(&self.controller) as Arc<dyn WriteController>,
            )
        }
    }

    // ---- Lazy mode ----

    #[test]
    fn storing_twice_writes_once() {
        let fx = Fixture::new();
        let mut storer = fx.storer(StorerMode::Lazy);
        let a = node("a", None);
        let first = storer.store(&a).unwrap();
        let second = storer.store(&a).unwrap();
        assert_eq!(first, second);
        assert_eq!(storer.size(), 1);
        assert_eq!(storer.state(), StorerState::Accumulating);
        assert_eq!(storer.commit().unwrap(), 1);
        assert_eq!(fx.objects.lookup_object_id(&a), Some(first));
    }

    #[test]
    fn lazy_skips_registered_references_but_rewrites_explicit_roots() {
        let fx = Fixture::new();
        let tail = node("tail", None);
        let head = node("head", Some(&tail));
        let mut storer = fx.storer(StorerMode::Lazy);
        storer.store(&head).unwrap();
        assert_eq!(storer.commit().unwrap(), 2);

        let mut storer = fx.storer(StorerMode::Lazy);
        storer.store(&head).unwrap();
        assert_eq!(storer.size(), 1);
        assert_eq!(storer.records()[0].object_id, fx.objects.lookup_object_id(&head).unwrap());
    }

    #[test]
    fn eager_rewrites_every_reachable_object() {
        let fx = Fixture::new();
        let tail = node("tail", None);
        let head = node("head", Some(&tail));
        let mut storer = fx.storer(StorerMode::Lazy);
        storer.store(&head).unwrap();
        storer.commit().unwrap();

        let mut eager = fx.storer(StorerMode::Eager);
        eager.store(&head).unwrap();
        assert_eq!(eager.size(), 2);
    }

    #[test]
    fn cycles_terminate_through_dedup() {
        let fx = Fixture::new();
        let a = node("a", None);
        let b = node("b", Some(&a));
        a.downcast_ref::<Node>().unwrap().next.set(Some(Arc::clone(&b)));
        let mut storer = fx.storer(StorerMode::Eager);
        let ia = storer.store(&a).unwrap();
        assert_eq!(storer.size(), 2);
        let ib = storer.records()[1].object_id;
        assert_eq!(storer.records()[0].values[1], Value::Reference(ib));
        assert_eq!(storer.records()[1].values[1], Value::Reference(ia));
    }

    // ---- Arrays ----

    #[test]
    fn store_all_stores_elements_not_the_container() {
        let fx = Fixture::new();
        let elements: Vec<ObjectRef> = (0..3).map(|i| node(&i.to_string(), None)).collect();
        let array: ObjectRef = Arc::new(ReferenceArray::of(&elements));

        let mut storer = fx.storer(StorerMode::Lazy);
        let ids = storer.store_all(&elements).unwrap();
        assert_eq!(ids.len(), 3);
        storer.commit().unwrap();
        assert!(fx.objects.lookup_object_id(&array).is_none());

        let mut storer = fx.storer(StorerMode::Lazy);
        let array_id = storer.store(&array).unwrap();
        assert_eq!(storer.size(), 1);
        storer.commit().unwrap();
        assert_eq!(fx.objects.lookup_object_id(&array), Some(array_id));
    }

    // ---- Skipping ----

    #[test]
    fn skipped_instances_are_referenced_but_not_written() {
        let fx = Fixture::new();
        let tail = node("tail", None);
        let head = node("head", Some(&tail));
        let mut storer = fx.storer(StorerMode::Lazy);
        assert!(storer.skip(&tail).unwrap());
        assert!(!storer.skip(&tail).unwrap());
        storer.store(&head).unwrap();
        assert_eq!(storer.size(), 1);
        let tail_ref = storer.records()[0].values[1].as_reference().unwrap();
        assert!(!tail_ref.is_null());
        storer.commit().unwrap();
        assert_eq!(fx.objects.lookup_object_id(&tail), Some(tail_ref));
    }

    #[test]
    fn skip_nulled_and_skip_mapped_rewrite_references() {
        let fx = Fixture::new();
        let tail = node("tail", None);
        let head = node("head", Some(&tail));
        let mut storer = fx.storer(StorerMode::Lazy);
        storer.skip_nulled(&tail).unwrap();
        storer.store(&head).unwrap();
        assert_eq!(storer.records()[0].values[1], Value::Reference(ObjectId::NULL));

        let mapped = ObjectId::new(1_000_000_000_000_000_500);
        let mut storer = fx.storer(StorerMode::Lazy);
        storer.skip_mapped(&tail, mapped).unwrap();
        storer.store(&head).unwrap();
        assert_eq!(storer.records()[0].values[1], Value::Reference(mapped));
        storer.commit().unwrap();
        assert_eq!(fx.objects.lookup_object_id(&tail), Some(mapped));
    }

    // ---- Commit ----

    #[test]
    fn disabled_writes_keep_the_batch() {
        let fx = Fixture::new();
        let mut storer = fx.storer(StorerMode::Lazy);
        let a = node("a", None);
        storer.store(&a).unwrap();
        fx.controller.disable();
        let err = storer.commit().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WriteDisabled);
        assert_eq!(storer.size(), 1);
        assert!(fx.objects.lookup_object_id(&a).is_none());

        fx.controller.enable();
        assert_eq!(storer.commit().unwrap(), 1);
        assert_eq!(fx.storage.len(), 1);
        assert_eq!(storer.state(), StorerState::Committed);
    }

    #[test]
    fn conflicting_batch_is_not_written() {
        let fx = Fixture::new();
        let mut storer = fx.storer(StorerMode::Lazy);
        let a = node("a", None);
        let assigned = storer.store(&a).unwrap();
        let other = ObjectId::new(assigned.get() + 100);
        fx.objects.registry().register_object(other, &a).unwrap();

        let err = storer.commit().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConsistencyViolation);
        assert!(fx.storage.is_empty());
        assert_eq!(storer.size(), 1);
        assert_ne!(storer.state(), StorerState::Committed);
        assert_eq!(fx.objects.lookup_object_id(&a), Some(other));
    }

    // ---- Concurrent storers ----

    #[test]
    fn two_storers_give_a_new_object_one_id() {
        let fx = Fixture::new();
        let shared = node("shared", None);
        let mut first = fx.storer(StorerMode::Lazy);
        let mut second = fx.storer(StorerMode::Lazy);

        let id1 = first.store(&shared).unwrap();
        let id2 = second.store(&shared).unwrap();
        assert_eq!(id1, id2);

        assert_eq!(first.commit().unwrap(), 1);
        assert_eq!(second.commit().unwrap(), 1);
        assert_eq!(fx.storage.len(), 1);
        assert_eq!(fx.objects.lookup_object_id(&shared), Some(id1));
    }

    #[test]
    fn claims_survive_until_every_holder_is_done() {
        let fx = Fixture::new();
        let shared = node("shared", None);
        let mut first = fx.storer(StorerMode::Lazy);
        let mut second = fx.storer(StorerMode::Lazy);
        let id = first.store(&shared).unwrap();
        second.store(&shared).unwrap();

        first.reinitialize();
        let mut third = fx.storer(StorerMode::Lazy);
        assert_eq!(third.store(&shared).unwrap(), id);

        drop(second);
        third.reinitialize();
        let mut fourth = fx.storer(StorerMode::Lazy);
        assert_ne!(fourth.store(&shared).unwrap(), id);
    }

    #[test]
    fn mapped_ids_cannot_collide_with_claims() {
        let fx = Fixture::new();
        let a = node("a", None);
        let b = node("b", None);
        let mut first = fx.storer(StorerMode::Lazy);
        let id = first.store(&a).unwrap();

        let mut second = fx.storer(StorerMode::Lazy);
        let err = second.skip_mapped(&b, id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConsistencyViolation);
        let err = second.skip_mapped(&a, ObjectId::new(id.get() + 1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConsistencyViolation);
    }

    #[test]
    fn storers_on_threads_agree_on_ids() {
        let fx = Fixture::new();
        let shared: Vec<ObjectRef> = (0..16).map(|i| node(&i.to_string(), None)).collect();
        let results: Vec<Vec<ObjectId>> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..4)
                .map(|_| {
                    let mut storer = fx.storer(StorerMode::Lazy);
                    let shared = &shared;
                    scope.spawn(move || {
                        let ids = storer.store_all(shared).unwrap();
                        storer.commit().unwrap();
                        ids
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });
        for ids in &results[1..] {
            assert_eq!(ids, &results[0]);
        }
        assert_eq!(fx.storage.len(), shared.len());
        assert_eq!(fx.objects.registry().size(), shared.len());
    }

    #[test]
    fn capacity_is_bounded() {
        let fx = Fixture::new();
        let mut storer = fx.storer_with(&StorerConfig {
            maximum_capacity: Some(1),
            ..StorerConfig::default()
        });
        let head = node("head", Some(&node("tail", None)));
        let err = storer.store(&head).unwrap_err();
        assert!(matches!(err, StorerError::Handler(_)));
        assert_eq!(storer.maximum_capacity(), 1);
        assert!(storer.ensure_capacity(2).is_err());
        storer.ensure_capacity(1).unwrap();
        assert!(storer.current_capacity() >= 1);
    }

    #[test]
    fn unpersistable_instances_get_no_id() {
        let fx = Fixture::new();
        let before = fx.objects.current_object_id();
        let mut storer = fx.storer(StorerMode::Lazy);
        let err = storer.store(&(Arc::new(1.5f64) as ObjectRef)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeNotPersistable);
        assert_eq!(fx.objects.current_object_id(), before);
    }

    #[test]
    fn reinitialize_discards_pending_records() {
        let fx = Fixture::new();
        let mut storer = fx.storer(StorerMode::Lazy);
        let text: ObjectRef = Arc::new(String::from("x"));
        storer.store(&text).unwrap();
        storer.reinitialize();
        assert!(storer.is_empty());
        assert_eq!(storer.state(), StorerState::Fresh);
        assert_eq!(storer.commit().unwrap(), 0);
        assert!(fx.objects.lookup_object_id(&text).is_none());
    }
}
