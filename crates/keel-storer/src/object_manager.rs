use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use keel_ids::ObjectIdProvider;
use keel_registry::{ObjectRegistry, RegistryError};
use keel_types::{ObjectHandle, ObjectId, ObjectRef, ObjectRefExt};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::StorerResult;

/// Identifies one storer in the [`ObjectManager`]'s table of uncommitted ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StorerToken(u64);

/// An id handed out to a storer but not yet committed.
struct Claim {
    object_id: ObjectId,
    object: ObjectRef,
    holders: HashSet<StorerToken>,
}

/// Uncommitted ids of every live storer, keyed both ways.
#[derive(Default)]
struct InFlight {
    next_token: u64,
    by_handle: HashMap<ObjectHandle, Claim>,
    by_id: HashMap<ObjectId, ObjectHandle>,
}

impl InFlight {
    fn check(&self, object_id: ObjectId, object: &ObjectRef) -> StorerResult<()> {
        if let Some(claim) = self.by_handle.get(&object.handle()) {
            if claim.object_id != object_id {
                return Err(RegistryError::ObjectConflict {
                    type_name: object.entity_type_name(),
                    registered: claim.object_id,
                    new: object_id,
                }
                .into());
            }
            return Ok(());
        }
        if let Some(claim) = self.by_id.get(&object_id).and_then(|h| self.by_handle.get(h)) {
            return Err(RegistryError::ObjectIdConflict {
                object_id,
                registered_type: claim.object.entity_type_name(),
                new_type: object.entity_type_name(),
            }
            .into());
        }
        Ok(())
    }

    fn claim(&mut self, storer: StorerToken, object_id: ObjectId, object: &ObjectRef) {
        let handle = object.handle();
        self.by_handle
            .entry(handle)
            .or_insert_with(|| Claim {
                object_id,
                object: ObjectRef::clone(object),
                holders: HashSet::new(),
            })
            .holders
            .insert(storer);
        self.by_id.insert(object_id, handle);
    }

    fn release(&mut self, storer: StorerToken) {
        let by_id = &mut self.by_id;
        self.by_handle.retain(|_, claim| {
            claim.holders.remove(&storer);
            if claim.holders.is_empty() {
                by_id.remove(&claim.object_id);
                false
            } else {
                true
            }
        });
    }
}

/// The object registry together with the provider that numbers new objects.
///
/// Storers allocate ids here but keep new entries to themselves until they
/// commit, so that ids of an uncommitted batch never leak into the shared
/// registry. Until then the ids are claims in a table shared by every
/// storer of this manager: a second storer reaching the same new object
/// gets the same id, and a batch is checked against the registry before
/// it is written.
pub struct ObjectManager {
    registry: Arc<ObjectRegistry>,
    provider: Box<ObjectIdProvider>,
    in_flight: Mutex<InFlight>,
}

impl ObjectManager {
    pub fn new(registry: Arc<ObjectRegistry>, provider: Box<ObjectIdProvider>) -> Self {
        Self {
            registry,
            provider,
            in_flight: Mutex::new(InFlight::default()),
        }
    }

    pub fn registry(&self) -> &Arc<ObjectRegistry> {
        &self.registry
    }

    pub fn lookup_object_id(&self, object: &ObjectRef) -> Option<ObjectId> {
        self.registry.lookup_object_id(object)
    }

    pub fn lookup_object(&self, object_id: ObjectId) -> Option<ObjectRef> {
        self.registry.lookup_object(object_id)
    }

    pub fn allocate_object_id(&self) -> StorerResult<ObjectId> {
        Ok(self.provider.provide_next_id()?)
    }

    pub fn current_object_id(&self) -> ObjectId {
        self.provider.current_id()
    }

    /// Fast-forward the provider, e.g. past the ids of loaded records.
    pub fn update_current_object_id(&self, object_id: ObjectId) -> StorerResult<()> {
        Ok(self.provider.update_current_id(object_id)?)
    }

    pub fn register_constant(&self, object_id: ObjectId, object: &ObjectRef) -> StorerResult<bool> {
        Ok(self.registry.register_constant(object_id, object)?)
    }

    // ---- Uncommitted ids ----

    pub fn register_storer(&self) -> StorerToken {
        let mut in_flight = self.in_flight.lock();
        in_flight.next_token += 1;
        StorerToken(in_flight.next_token)
    }

    /// The id of `object` for `storer`, and whether it comes from the
    /// registry. An object not yet registered keeps the id another storer
    /// already claimed for it; otherwise a new id is allocated and claimed.
    pub fn ensure_object_id(
        &self,
        storer: StorerToken,
        object: &ObjectRef,
    ) -> StorerResult<(ObjectId, bool)> {
        let mut in_flight = self.in_flight.lock();
        if let Some(object_id) = self.registry.lookup_object_id(object) {
            return Ok((object_id, true));
        }
        let object_id = match in_flight.by_handle.get(&object.handle()) {
            Some(claim) => claim.object_id,
            None => self.provider.provide_next_id()?,
        };
        in_flight.claim(storer, object_id, object);
        Ok((object_id, false))
    }

    /// Claim a caller-chosen `object_id` for `object`. Fails if the registry
    /// or another storer's claim binds either side differently.
    pub fn claim_object_id(
        &self,
        storer: StorerToken,
        object_id: ObjectId,
        object: &ObjectRef,
    ) -> StorerResult<()> {
        let mut in_flight = self.in_flight.lock();
        self.registry.validate(object_id, object)?;
        in_flight.check(object_id, object)?;
        in_flight.claim(storer, object_id, object);
        Ok(())
    }

    /// Drop every claim `storer` holds alone.
    pub fn release_storer(&self, storer: StorerToken) {
        self.in_flight.lock().release(storer);
    }

    /// Commit one storer's batch: check `entries` against the registry, run
    /// `write`, then register the entries and release the storer's claims.
    ///
    /// Nothing is written if an entry conflicts with the registry. Other
    /// storers cannot claim ids while a commit is in progress.
    pub fn commit_entries<'a, I, W>(
        &self,
        storer: StorerToken,
        entries: I,
        write: W,
    ) -> StorerResult<usize>
    where
        I: IntoIterator<Item = (ObjectId, &'a ObjectRef)>,
        W: FnOnce() -> StorerResult<()>,
    {
        let mut in_flight = self.in_flight.lock();
        let entries: Vec<_> = entries.into_iter().collect();
        self.validate_entries(&entries)?;
        write()?;
        let merged = self.merge_validated(&entries)?;
        in_flight.release(storer);
        Ok(merged)
    }

    /// Register the new entries of a committed batch and move the provider
    /// past every merged id. No entry is registered if any conflicts.
    pub fn merge_entries<'a, I>(&self, entries: I) -> StorerResult<usize>
    where
        I: IntoIterator<Item = (ObjectId, &'a ObjectRef)>,
    {
        let _in_flight = self.in_flight.lock();
        let entries: Vec<_> = entries.into_iter().collect();
        self.validate_entries(&entries)?;
        self.merge_validated(&entries)
    }

    fn validate_entries(&self, entries: &[(ObjectId, &ObjectRef)]) -> StorerResult<()> {
        for &(object_id, object) in entries {
            self.registry.validate(object_id, object)?;
        }
        Ok(())
    }

    fn merge_validated(&self, entries: &[(ObjectId, &ObjectRef)]) -> StorerResult<usize> {
        let mut merged = 0;
        for &(object_id, object) in entries {
            if self.registry.register_object(object_id, object)? {
                merged += 1;
            }
            if !object_id.is_constant() {
                self.provider.update_current_id(object_id)?;
            }
        }
        debug!(merged, "object ids merged into registry");
        Ok(merged)
    }

    /// An empty registry with the same configuration, and a private id
    /// counter seeded from this one.
    pub fn fresh_clone(&self) -> Self {
        Self::new(
            Arc::new(self.registry.fresh_clone()),
            self.provider.clone_provider(),
        )
    }
}

impl fmt::Debug for ObjectManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectManager")
            .field("registry_size", &self.registry.size())
            .field("provider", &self.provider.strategy_name())
            .field("current_object_id", &self.provider.current_id())
            .field("in_flight", &self.in_flight.lock().by_handle.len())
            .finish()
    }
}
