use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use keel_handler::{is_enum_singleton, ObjectResolver, SharedHandler, TypeHandlerManager};
use keel_types::{EntityRecord, ObjectId, ObjectRef, Value};
use tracing::{debug, info};

use crate::error::{StorerError, StorerResult};
use crate::object_manager::ObjectManager;
use crate::target::PersistenceSource;

/// Turns stored records back into a live object graph.
///
/// Loading reads the requested records and everything they reference that
/// is not registered yet, then builds the graph in three passes: create
/// every instance, resolve references, complete. Instances whose handler
/// creates nothing, such as constants of a legacy enum that no longer
/// exist, are dropped and references to them load as null.
pub struct Loader {
    handlers: Arc<TypeHandlerManager>,
    objects: Arc<ObjectManager>,
    source: Arc<dyn PersistenceSource>,
}

struct Entry {
    record: EntityRecord,
    handler: SharedHandler,
}

#[derive(Default)]
struct Session {
    entries: Vec<Entry>,
    indices: HashMap<ObjectId, usize>,
}

struct SessionResolver<'a> {
    instances: &'a HashMap<ObjectId, ObjectRef>,
    objects: &'a ObjectManager,
}

impl ObjectResolver for SessionResolver<'_> {
    fn lookup_object(&self, object_id: ObjectId) -> Option<ObjectRef> {
        self.instances
            .get(&object_id)
            .cloned()
            .or_else(|| self.objects.lookup_object(object_id))
    }
}

/// What a load produced.
#[derive(Default)]
struct Built {
    instances: HashMap<ObjectId, ObjectRef>,
    dropped: HashSet<ObjectId>,
}

impl Loader {
    pub fn new(
        handlers: Arc<TypeHandlerManager>,
        objects: Arc<ObjectManager>,
        source: Arc<dyn PersistenceSource>,
    ) -> Self {
        Self {
            handlers,
            objects,
            source,
        }
    }

    /// The object registered under `object_id`, loading it if needed.
    pub fn get_object(&self, object_id: ObjectId) -> StorerResult<Option<ObjectRef>> {
        Ok(self.load(&[object_id])?.into_iter().next().flatten())
    }

    /// One result per id: the live object, or `None` for null and dropped
    /// ids.
    pub fn load(&self, object_ids: &[ObjectId]) -> StorerResult<Vec<Option<ObjectRef>>> {
        let built = self.build(object_ids, &HashSet::new())?;
        Ok(self.results(object_ids, &built))
    }

    /// Re-read the stored state of `object_id` into its registered
    /// instance, or load it if it is not registered.
    pub fn reload(&self, object_id: ObjectId) -> StorerResult<Option<ObjectRef>> {
        let refresh = HashSet::from([object_id]);
        let built = self.build(&[object_id], &refresh)?;
        Ok(self.results(&[object_id], &built).into_iter().next().flatten())
    }

    /// Load every stored object that is not registered yet. Returns the
    /// created instances; the registry only holds them weakly.
    pub fn load_all(&self) -> StorerResult<Vec<ObjectRef>> {
        let ids: Vec<ObjectId> = self
            .source
            .read_all()?
            .iter()
            .map(|r| r.object_id)
            .collect();
        let built = self.build(&ids, &HashSet::new())?;
        Ok(built.instances.into_values().collect())
    }

    fn results(&self, object_ids: &[ObjectId], built: &Built) -> Vec<Option<ObjectRef>> {
        object_ids
            .iter()
            .map(|id| match built.instances.get(id) {
                Some(instance) => Some(ObjectRef::clone(instance)),
                None if id.is_null() || built.dropped.contains(id) => None,
                None => self.objects.lookup_object(*id),
            })
            .collect()
    }

    fn needs_record(&self, object_id: ObjectId, refresh: &HashSet<ObjectId>) -> bool {
        !object_id.is_null()
            && (refresh.contains(&object_id) || self.objects.lookup_object(object_id).is_none())
    }

    /// Read the requested records and the closure of their unregistered
    /// references.
    fn collect(&self, object_ids: &[ObjectId], refresh: &HashSet<ObjectId>) -> StorerResult<Session> {
        let mut session = Session::default();
        let no_refresh = HashSet::new();
        let mut wanted: HashSet<ObjectId> = object_ids
            .iter()
            .copied()
            .filter(|id| self.needs_record(*id, refresh))
            .collect();
        while !wanted.is_empty() {
            let records = self.source.read_by_object_ids(&[wanted.clone()])?;
            let mut next = HashSet::new();
            for record in records {
                let object_id = record.object_id;
                if !wanted.remove(&object_id) || session.indices.contains_key(&object_id) {
                    continue;
                }
                let handler = self.handlers.ensure_type_handler_for(record.type_id)?;
                let mut references = Vec::new();
                handler.iterate_persisted_references(&record, &mut |id| references.push(id));
                next.extend(
                    references
                        .into_iter()
                        .filter(|id| self.needs_record(*id, &no_refresh)),
                );
                session.indices.insert(object_id, session.entries.len());
                session.entries.push(Entry { record, handler });
            }
            if let Some(&object_id) = wanted.iter().next() {
                return Err(StorerError::MissingRecord { object_id });
            }
            wanted = next
                .into_iter()
                .filter(|id| !session.indices.contains_key(id))
                .collect();
        }
        Ok(session)
    }

    fn build(&self, object_ids: &[ObjectId], refresh: &HashSet<ObjectId>) -> StorerResult<Built> {
        let session = self.collect(object_ids, refresh)?;
        let mut built = Built::default();
        if session.entries.is_empty() {
            return Ok(built);
        }
        let registry = self.objects.registry();

        for entry in &session.entries {
            let object_id = entry.record.object_id;
            if refresh.contains(&object_id) {
                if let Some(existing) = self.objects.lookup_object(object_id) {
                    built.instances.insert(object_id, existing);
                    continue;
                }
            }
            match entry.handler.create(&entry.record, &**registry)? {
                Some(instance) => {
                    built.instances.insert(object_id, instance);
                }
                None => {
                    debug!(
                        object_id = %object_id,
                        type_id = %entry.record.type_id,
                        "instance dropped on load"
                    );
                    built.dropped.insert(object_id);
                }
            }
        }

        for entry in &session.entries {
            let object_id = entry.record.object_id;
            let Some(instance) = built.instances.get(&object_id) else {
                continue;
            };
            if let Err(error) = registry.register_object(object_id, instance) {
                if !is_enum_singleton(entry.handler.as_ref(), instance) {
                    return Err(error.into());
                }
                debug!(object_id = %object_id, "enum constant already registered");
            }
        }

        let resolver = SessionResolver {
            instances: &built.instances,
            objects: &self.objects,
        };
        let mut live = Vec::with_capacity(session.entries.len());
        for entry in &session.entries {
            let Some(instance) = built.instances.get(&entry.record.object_id) else {
                continue;
            };
            let record = without_dropped(&entry.record, &built.dropped);
            entry.handler.update(instance, &record, &resolver)?;
            live.push((entry, instance, record));
        }
        for (entry, instance, record) in &live {
            entry.handler.complete(instance, record)?;
        }

        if let Some(highest) = session
            .entries
            .iter()
            .map(|e| e.record.object_id)
            .filter(|id| !id.is_constant())
            .max()
        {
            self.objects.update_current_object_id(highest)?;
        }
        info!(
            loaded = built.instances.len(),
            dropped = built.dropped.len(),
            "object graph loaded"
        );
        Ok(built)
    }
}

/// `record` with every reference to a dropped instance replaced by null.
fn without_dropped(record: &EntityRecord, dropped: &HashSet<ObjectId>) -> EntityRecord {
    let mut record = record.clone();
    if !dropped.is_empty() {
        null_references(&mut record.values, dropped);
    }
    record
}

fn null_references(values: &mut [Value], dropped: &HashSet<ObjectId>) {
    for value in values {
        match value {
            Value::Reference(object_id) if dropped.contains(object_id) => {
                *object_id = ObjectId::NULL;
            }
            Value::List(rows) => {
                for row in rows {
                    null_references(row, dropped);
                }
            }
            _ => {}
        }
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("objects", &self.objects)
            .finish()
    }
}
