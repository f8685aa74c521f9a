//! The object registry: a biunique `object id ⇄ object identity` table.
//!
//! Objects are keyed by [`ObjectHandle`], the address of their shared
//! allocation, so two objects with equal values are still two entries.
//! Entries hold a weak reference; an entry whose object has been dropped is
//! dead and is reclaimed by [`ObjectRegistry::consolidate`] or by the sweep
//! that precedes every growth step. Constants are held strongly and survive
//! [`ObjectRegistry::clear`] and [`ObjectRegistry::truncate`].
//!
//! Internally the table is a slab of entries threaded through two chained
//! bucket arrays, one hashed by object id and one by handle. Every operation
//! takes the registry-wide lock; the bulk operations only wait for it up to
//! the configured lock timeout.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use keel_types::{IdKind, ObjectHandle, ObjectId, ObjectRef, ObjectRefExt, WeakObjectRef};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RegistryError, RegistryResult};

/// Default ratio of entries to buckets.
pub const DEFAULT_HASH_DENSITY: f32 = 1.0;

/// Default number of entries the table is sized for.
pub const DEFAULT_MINIMUM_CAPACITY: usize = 1024;

/// Default wait for the bulk operations.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 50;

const MAX_BUCKET_BITS: u32 = 30;

/// Sizing and locking parameters of an [`ObjectRegistry`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Entries per bucket before the table grows.
    pub hash_density: f32,
    /// The table never shrinks below this many entries of capacity.
    pub minimum_capacity: usize,
    /// How long bulk operations wait for the lock before giving up.
    pub lock_timeout_ms: u64,
}

impl RegistryConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn validate(&self) -> RegistryResult<()> {
        if !(self.hash_density.is_finite() && self.hash_density > 0.0) {
            return Err(RegistryError::InvalidHashDensity {
                density: self.hash_density,
            });
        }
        if self.minimum_capacity == 0 {
            return Err(RegistryError::InvalidCapacity { capacity: 0 });
        }
        Ok(())
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            hash_density: DEFAULT_HASH_DENSITY,
            minimum_capacity: DEFAULT_MINIMUM_CAPACITY,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }
}

/// Bucket distribution of one of the two hash tables.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HashStatistics {
    /// `"object_ids"` or `"objects"`.
    pub table: &'static str,
    pub buckets: usize,
    pub entries: usize,
    pub empty_buckets: usize,
    pub longest_chain: usize,
    /// Chain length to number of buckets with that length.
    pub chain_lengths: BTreeMap<usize, usize>,
}

/// Callback for [`ObjectRegistry::process_live_object_ids`].
///
/// The processor receives a liveness predicate that is only valid while the
/// registry lock is held, i.e. for the duration of the call.
pub trait ObjectIdsProcessor {
    fn process_object_ids_by_filter(&mut self, is_live: &dyn Fn(ObjectId) -> bool);
}

impl<F> ObjectIdsProcessor for F
where
    F: FnMut(&dyn Fn(ObjectId) -> bool),
{
    fn process_object_ids_by_filter(&mut self, is_live: &dyn Fn(ObjectId) -> bool) {
        self(is_live)
    }
}

enum Holder {
    Weak(WeakObjectRef),
    Strong(ObjectRef),
}

impl Holder {
    fn get(&self) -> Option<ObjectRef> {
        match self {
            Self::Weak(weak) => weak.upgrade(),
            Self::Strong(strong) => Some(Arc::clone(strong)),
        }
    }

    fn is_live(&self) -> bool {
        match self {
            Self::Weak(weak) => weak.strong_count() > 0,
            Self::Strong(_) => true,
        }
    }
}

struct Slot {
    object_id: ObjectId,
    handle: ObjectHandle,
    holder: Holder,
    next_by_id: Option<usize>,
    next_by_handle: Option<usize>,
}

struct Table {
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    id_buckets: Vec<Option<usize>>,
    handle_buckets: Vec<Option<usize>>,
    bits: u32,
    size: usize,
    capacity: usize,
    constants: Vec<(ObjectId, ObjectRef)>,
    config: RegistryConfig,
}

fn spread(raw: u64, bits: u32) -> usize {
    (raw.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> (64 - bits)) as usize
}

/// Bucket bits needed to hold `entries` at `density`.
fn bits_for(entries: usize, density: f32) -> u32 {
    let buckets = ((entries.max(1) as f64) / f64::from(density)).ceil() as usize;
    let bits = buckets.max(2).next_power_of_two().trailing_zeros();
    bits.min(MAX_BUCKET_BITS)
}

fn capacity_for(bits: u32, density: f32) -> usize {
    (((1usize << bits) as f64) * f64::from(density)).max(1.0) as usize
}

impl Table {
    fn new(config: RegistryConfig) -> Self {
        let bits = bits_for(config.minimum_capacity, config.hash_density);
        let mut table = Self {
            slots: Vec::new(),
            free: Vec::new(),
            id_buckets: Vec::new(),
            handle_buckets: Vec::new(),
            bits,
            size: 0,
            capacity: 0,
            constants: Vec::new(),
            config,
        };
        table.reset(bits);
        table
    }

    fn reset(&mut self, bits: u32) {
        self.slots.clear();
        self.free.clear();
        self.bits = bits;
        self.id_buckets = vec![None; 1 << bits];
        self.handle_buckets = vec![None; 1 << bits];
        self.capacity = capacity_for(bits, self.config.hash_density);
        self.size = 0;
    }

    fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    fn find_by_id(&self, object_id: ObjectId) -> Option<usize> {
        let mut cursor = self.id_buckets[spread(object_id.get(), self.bits)];
        while let Some(index) = cursor {
            let slot = self.slot(index)?;
            if slot.object_id == object_id {
                return Some(index);
            }
            cursor = slot.next_by_id;
        }
        None
    }

    fn find_by_handle(&self, handle: ObjectHandle) -> Option<usize> {
        let mut cursor = self.handle_buckets[spread(handle.get() as u64, self.bits)];
        while let Some(index) = cursor {
            let slot = self.slot(index)?;
            if slot.handle == handle {
                return Some(index);
            }
            cursor = slot.next_by_handle;
        }
        None
    }

    fn live_object(&self, index: usize) -> Option<ObjectRef> {
        self.slot(index).and_then(|s| s.holder.get())
    }

    fn insert(&mut self, object_id: ObjectId, handle: ObjectHandle, holder: Holder) {
        let id_bucket = spread(object_id.get(), self.bits);
        let handle_bucket = spread(handle.get() as u64, self.bits);
        let slot = Slot {
            object_id,
            handle,
            holder,
            next_by_id: self.id_buckets[id_bucket],
            next_by_handle: self.handle_buckets[handle_bucket],
        };
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(slot);
                index
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        };
        self.id_buckets[id_bucket] = Some(index);
        self.handle_buckets[handle_bucket] = Some(index);
        self.size += 1;
    }

    fn unlink(&mut self, index: usize) {
        let Some(removed) = self.slots.get_mut(index).and_then(Option::take) else {
            return;
        };

        let id_bucket = spread(removed.object_id.get(), self.bits);
        if self.id_buckets[id_bucket] == Some(index) {
            self.id_buckets[id_bucket] = removed.next_by_id;
        } else {
            let mut cursor = self.id_buckets[id_bucket];
            while let Some(i) = cursor {
                let Some(slot) = self.slots[i].as_mut() else {
                    break;
                };
                if slot.next_by_id == Some(index) {
                    slot.next_by_id = removed.next_by_id;
                    break;
                }
                cursor = slot.next_by_id;
            }
        }

        let handle_bucket = spread(removed.handle.get() as u64, self.bits);
        if self.handle_buckets[handle_bucket] == Some(index) {
            self.handle_buckets[handle_bucket] = removed.next_by_handle;
        } else {
            let mut cursor = self.handle_buckets[handle_bucket];
            while let Some(i) = cursor {
                let Some(slot) = self.slots[i].as_mut() else {
                    break;
                };
                if slot.next_by_handle == Some(index) {
                    slot.next_by_handle = removed.next_by_handle;
                    break;
                }
                cursor = slot.next_by_handle;
            }
        }

        self.free.push(index);
        self.size -= 1;
    }

    /// Relink every entry into `1 << bits` buckets, compacting the slab.
    fn rebuild(&mut self, bits: u32) {
        let entries: Vec<Slot> = self.slots.drain(..).flatten().collect();
        let before = 1usize << self.bits;
        self.reset(bits);
        for slot in entries {
            self.insert(slot.object_id, slot.handle, slot.holder);
        }
        debug!(
            buckets_before = before,
            buckets_after = 1usize << bits,
            size = self.size,
            "object registry rehashed"
        );
    }

    /// Remove dead entries. Returns how many were removed.
    fn sweep(&mut self) -> usize {
        let dead: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| match s {
                Some(slot) if !slot.holder.is_live() => Some(i),
                _ => None,
            })
            .collect();
        for &index in &dead {
            self.unlink(index);
        }
        dead.len()
    }

    fn grow_if_needed(&mut self) {
        if self.size <= self.capacity {
            return;
        }
        let swept = self.sweep();
        if swept > 0 {
            debug!(count = swept, "object registry swept dead entries");
        }
        if self.size > self.capacity / 2 && self.bits < MAX_BUCKET_BITS {
            self.rebuild(self.bits + 1);
        }
    }

    fn add(&mut self, object_id: ObjectId, object: &ObjectRef, constant: bool) -> RegistryResult<bool> {
        if matches!(IdKind::of(object_id.get()), IdKind::Null | IdKind::Undefined) {
            return Err(RegistryError::ImproperObjectId { object_id });
        }
        let handle = object.handle();

        if let Some(index) = self.find_by_id(object_id) {
            match self.live_object(index) {
                Some(registered) if registered.handle() == handle => {
                    if constant {
                        self.pin(index, object_id, object);
                    }
                    return Ok(false);
                }
                Some(registered) => {
                    return Err(RegistryError::ObjectIdConflict {
                        object_id,
                        registered_type: registered.entity_type_name(),
                        new_type: object.entity_type_name(),
                    });
                }
                None => self.unlink(index),
            }
        }

        if let Some(index) = self.find_by_handle(handle) {
            if let Some(slot) = self.slot(index) {
                return Err(RegistryError::ObjectConflict {
                    type_name: object.entity_type_name(),
                    registered: slot.object_id,
                    new: object_id,
                });
            }
        }

        let holder = if constant {
            self.constants.push((object_id, Arc::clone(object)));
            Holder::Strong(Arc::clone(object))
        } else {
            Holder::Weak(Arc::downgrade(object))
        };
        self.insert(object_id, handle, holder);
        self.grow_if_needed();
        Ok(true)
    }

    /// Turn an existing weak entry into a constant.
    fn pin(&mut self, index: usize, object_id: ObjectId, object: &ObjectRef) {
        if let Some(slot) = self.slots.get_mut(index).and_then(Option::as_mut) {
            if matches!(slot.holder, Holder::Weak(_)) {
                slot.holder = Holder::Strong(Arc::clone(object));
                self.constants.push((object_id, Arc::clone(object)));
            }
        }
    }

    fn reregister_constants(&mut self) {
        let constants = std::mem::take(&mut self.constants);
        for (object_id, object) in &constants {
            self.insert(*object_id, object.handle(), Holder::Strong(Arc::clone(object)));
        }
        self.constants = constants;
        self.grow_if_needed();
    }

    fn validate(&self, object_id: ObjectId, object: &ObjectRef) -> RegistryResult<()> {
        match self.find_by_handle(object.handle()).and_then(|i| self.slot(i)) {
            Some(slot) if slot.object_id == object_id => Ok(()),
            Some(slot) => Err(RegistryError::ObjectConflict {
                type_name: object.entity_type_name(),
                registered: slot.object_id,
                new: object_id,
            }),
            None => match self.find_by_id(object_id).and_then(|i| self.live_object(i)) {
                None => Ok(()),
                Some(registered) => Err(RegistryError::ObjectIdConflict {
                    object_id,
                    registered_type: registered.entity_type_name(),
                    new_type: object.entity_type_name(),
                }),
            },
        }
    }

    fn contains_live(&self, object_id: ObjectId) -> bool {
        self.find_by_id(object_id)
            .and_then(|i| self.slot(i))
            .is_some_and(|s| s.holder.is_live())
    }

    fn statistics(&self, table: &'static str, by_id: bool) -> HashStatistics {
        let buckets = if by_id {
            &self.id_buckets
        } else {
            &self.handle_buckets
        };
        let mut chain_lengths = BTreeMap::new();
        let mut entries = 0;
        let mut longest_chain = 0;
        for head in buckets {
            let mut length = 0;
            let mut cursor = *head;
            while let Some(index) = cursor {
                let Some(slot) = self.slot(index) else {
                    break;
                };
                length += 1;
                cursor = if by_id {
                    slot.next_by_id
                } else {
                    slot.next_by_handle
                };
            }
            entries += length;
            longest_chain = longest_chain.max(length);
            *chain_lengths.entry(length).or_insert(0) += 1;
        }
        HashStatistics {
            table,
            buckets: buckets.len(),
            entries,
            empty_buckets: chain_lengths.get(&0).copied().unwrap_or(0),
            longest_chain,
            chain_lengths,
        }
    }
}

/// Concurrent biunique `object id ⇄ object identity` table.
pub struct ObjectRegistry {
    table: Mutex<Table>,
    lock_timeout_ms: AtomicU64,
}

impl ObjectRegistry {
    /// A registry with the default configuration.
    pub fn new() -> Self {
        Self::from_valid_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> RegistryResult<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: RegistryConfig) -> Self {
        Self {
            lock_timeout_ms: AtomicU64::new(config.lock_timeout_ms),
            table: Mutex::new(Table::new(config)),
        }
    }

    /// An empty registry with this registry's configuration.
    pub fn fresh_clone(&self) -> Self {
        Self::from_valid_config(self.config())
    }

    /// The id `object` is registered with.
    pub fn lookup_object_id(&self, object: &ObjectRef) -> Option<ObjectId> {
        let table = self.table.lock();
        table
            .find_by_handle(object.handle())
            .and_then(|i| table.slot(i))
            .map(|s| s.object_id)
    }

    /// The live object registered under `object_id`.
    pub fn lookup_object(&self, object_id: ObjectId) -> Option<ObjectRef> {
        let table = self.table.lock();
        table
            .find_by_id(object_id)
            .and_then(|i| table.live_object(i))
    }

    pub fn contains_object_id(&self, object_id: ObjectId) -> bool {
        self.table.lock().contains_live(object_id)
    }

    /// Whether registering `(object_id, object)` would be consistent.
    pub fn is_valid(&self, object_id: ObjectId, object: &ObjectRef) -> bool {
        self.table.lock().validate(object_id, object).is_ok()
    }

    /// Fail if registering `(object_id, object)` would violate biuniqueness.
    pub fn validate(&self, object_id: ObjectId, object: &ObjectRef) -> RegistryResult<()> {
        self.table.lock().validate(object_id, object)
    }

    /// Register `object` under `object_id`.
    ///
    /// Returns `false` if exactly this pair is already registered. Fails if
    /// the id belongs to another live object, if the object already has
    /// another id, or if the id is null or outside every id range.
    pub fn register_object(&self, object_id: ObjectId, object: &ObjectRef) -> RegistryResult<bool> {
        self.table.lock().add(object_id, object, false)
    }

    /// Register `object` unless `object_id` is already taken.
    ///
    /// Returns the object registered under `object_id` afterwards: the
    /// previously registered one if there was one, `object` otherwise.
    pub fn optional_register_object(
        &self,
        object_id: ObjectId,
        object: &ObjectRef,
    ) -> RegistryResult<ObjectRef> {
        let mut table = self.table.lock();
        if let Some(registered) = table.find_by_id(object_id).and_then(|i| table.live_object(i)) {
            return Ok(registered);
        }
        table.add(object_id, object, false)?;
        Ok(Arc::clone(object))
    }

    /// Register an object that stays registered, and alive, for the lifetime
    /// of the registry.
    pub fn register_constant(&self, object_id: ObjectId, object: &ObjectRef) -> RegistryResult<bool> {
        self.table.lock().add(object_id, object, true)
    }

    /// Visit every live entry.
    pub fn iterate_entries(&self, mut acceptor: impl FnMut(ObjectId, &ObjectRef)) {
        let table = self.table.lock();
        for slot in table.slots.iter().flatten() {
            if let Some(object) = slot.holder.get() {
                acceptor(slot.object_id, &object);
            }
        }
    }

    /// Number of entries, including dead ones not yet swept.
    pub fn size(&self) -> usize {
        self.table.lock().size
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Number of entries the current table holds before it grows.
    pub fn capacity(&self) -> usize {
        self.table.lock().capacity
    }

    pub fn hash_density(&self) -> f32 {
        self.table.lock().config.hash_density
    }

    pub fn minimum_capacity(&self) -> usize {
        self.table.lock().config.minimum_capacity
    }

    pub fn config(&self) -> RegistryConfig {
        self.table.lock().config.clone()
    }

    /// Grow the table so that `capacity` entries fit without rehashing.
    ///
    /// Returns whether the table was rebuilt.
    pub fn ensure_capacity(&self, capacity: usize) -> RegistryResult<bool> {
        if capacity == 0 {
            return Err(RegistryError::InvalidCapacity { capacity });
        }
        let mut table = self.table.lock();
        if capacity <= table.capacity {
            return Ok(false);
        }
        let bits = bits_for(capacity, table.config.hash_density);
        table.rebuild(bits);
        Ok(true)
    }

    /// Change the hash density, rehashing if the bucket count changes.
    pub fn set_hash_density(&self, density: f32) -> RegistryResult<bool> {
        let mut table = self.table.lock();
        let config = RegistryConfig {
            hash_density: density,
            ..table.config.clone()
        };
        Self::apply_config(&mut table, config)
    }

    pub fn set_minimum_capacity(&self, minimum_capacity: usize) -> RegistryResult<bool> {
        let mut table = self.table.lock();
        let config = RegistryConfig {
            minimum_capacity,
            ..table.config.clone()
        };
        Self::apply_config(&mut table, config)
    }

    pub fn set_configuration(&self, config: RegistryConfig) -> RegistryResult<bool> {
        let mut table = self.table.lock();
        let lock_timeout_ms = config.lock_timeout_ms;
        let rebuilt = Self::apply_config(&mut table, config)?;
        self.lock_timeout_ms.store(lock_timeout_ms, Ordering::Relaxed);
        Ok(rebuilt)
    }

    fn apply_config(table: &mut Table, config: RegistryConfig) -> RegistryResult<bool> {
        config.validate()?;
        table.config = config;
        let bits = bits_for(
            table.size.max(table.config.minimum_capacity),
            table.config.hash_density,
        );
        if bits == table.bits {
            table.capacity = capacity_for(bits, table.config.hash_density);
            return Ok(false);
        }
        table.rebuild(bits);
        Ok(true)
    }

    /// Remove dead entries and shrink the table if it is oversized.
    ///
    /// Returns whether anything changed.
    pub fn consolidate(&self) -> bool {
        let mut table = self.table.lock();
        let swept = table.sweep();
        let bits = bits_for(
            table.size.max(table.config.minimum_capacity),
            table.config.hash_density,
        );
        let shrink = bits < table.bits;
        if shrink {
            table.rebuild(bits);
        }
        if swept > 0 || shrink {
            info!(swept, size = table.size, capacity = table.capacity, "object registry consolidated");
        }
        swept > 0 || shrink
    }

    /// Run `processor` with a liveness predicate under the registry lock.
    ///
    /// Returns `false` without running it if the lock could not be acquired
    /// within the configured lock timeout.
    pub fn process_live_object_ids(&self, processor: &mut dyn ObjectIdsProcessor) -> bool {
        let timeout = self.lock_timeout();
        let Some(table) = self.table.try_lock_for(timeout) else {
            debug!(?timeout, "process_live_object_ids rejected");
            return false;
        };
        processor.process_object_ids_by_filter(&|object_id| table.contains_live(object_id));
        true
    }

    /// The subset of `candidates` that are registered to live objects.
    ///
    /// Returns `None` if the lock could not be acquired within the configured
    /// lock timeout.
    pub fn select_live_object_ids(&self, candidates: &HashSet<ObjectId>) -> Option<HashSet<ObjectId>> {
        let timeout = self.lock_timeout();
        let Some(table) = self.table.try_lock_for(timeout) else {
            debug!(?timeout, "select_live_object_ids rejected");
            return None;
        };
        Some(
            candidates
                .iter()
                .copied()
                .filter(|&id| table.contains_live(id))
                .collect(),
        )
    }

    fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms.load(Ordering::Relaxed))
    }

    /// Bucket distribution of the id table and the identity table.
    pub fn hash_statistics(&self) -> Vec<HashStatistics> {
        let table = self.table.lock();
        vec![
            table.statistics("object_ids", true),
            table.statistics("objects", false),
        ]
    }

    /// Remove every entry except the constants, keeping the capacity.
    ///
    /// Meant for test harnesses. Objects loaded or stored before the call
    /// lose their ids; any state elsewhere that still refers to those ids
    /// is inconsistent with the registry afterwards.
    pub fn clear(&self) {
        let mut table = self.table.lock();
        let bits = table.bits;
        table.reset(bits);
        table.reregister_constants();
    }

    /// Remove every entry including the constants, keeping the capacity.
    ///
    /// Same caveats as [`clear`](Self::clear).
    pub fn clear_all(&self) {
        let mut table = self.table.lock();
        let bits = table.bits;
        table.reset(bits);
        table.constants.clear();
    }

    /// Remove every entry except the constants and shrink to the minimum
    /// capacity.
    ///
    /// Same caveats as [`clear`](Self::clear).
    pub fn truncate(&self) {
        let mut table = self.table.lock();
        let bits = bits_for(
            table.constants.len().max(table.config.minimum_capacity),
            table.config.hash_density,
        );
        table.reset(bits);
        table.reregister_constants();
    }

    /// Remove every entry including the constants and shrink to the minimum
    /// capacity.
    ///
    /// Same caveats as [`clear`](Self::clear).
    pub fn truncate_all(&self) {
        let mut table = self.table.lock();
        let bits = bits_for(table.config.minimum_capacity, table.config.hash_density);
        table.reset(bits);
        table.constants.clear();
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.lock();
        f.debug_struct("ObjectRegistry")
            .field("size", &table.size)
            .field("capacity", &table.capacity)
            .field("constants", &table.constants.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::thread;

    use keel_types::ErrorKind;
    use proptest::prelude::*;

    use super::*;

    #[derive(Debug, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    fn point(x: i32) -> ObjectRef {
        Arc::new(Point { x, y: 0 })
    }

    fn oid(raw: u64) -> ObjectId {
        ObjectId::new(raw)
    }

    fn small() -> ObjectRegistry {
        ObjectRegistry::with_config(RegistryConfig {
            minimum_capacity: 4,
            ..RegistryConfig::default()
        })
        .unwrap()
    }

    // ---- Registration ----

    #[test]
    fn register_and_lookup_both_ways() {
        let registry = ObjectRegistry::new();
        let a = point(1);
        assert!(registry.register_object(oid(5), &a).unwrap());
        assert_eq!(registry.lookup_object_id(&a), Some(oid(5)));
        assert!(registry.lookup_object(oid(5)).unwrap().same_object(&a));
        assert!(registry.contains_object_id(oid(5)));
        assert_eq!(registry.size(), 1);
    }

    #[test]
    fn registering_same_pair_twice_is_a_no_op() {
        let registry = ObjectRegistry::new();
        let a = point(1);
        assert!(registry.register_object(oid(5), &a).unwrap());
        assert!(!registry.register_object(oid(5), &a).unwrap());
        assert_eq!(registry.size(), 1);
    }

    #[test]
    fn id_claimed_by_another_object_is_a_consistency_violation() {
        let registry = ObjectRegistry::new();
        let a = point(1);
        let b = point(2);
        registry.register_object(oid(5), &a).unwrap();
        let err = registry.register_object(oid(5), &b).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConsistencyViolation);
        assert!(err.to_string().contains('5'));
        assert!(!registry.is_valid(oid(5), &b));
    }

    #[test]
    fn object_with_another_id_is_a_consistency_violation() {
        let registry = ObjectRegistry::new();
        let a = point(1);
        registry.register_object(oid(5), &a).unwrap();
        let err = registry.register_object(oid(6), &a).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::ObjectConflict { registered, new, .. }
                if registered == oid(5) && new == oid(6)
        ));
        assert!(registry.validate(oid(6), &a).is_err());
        assert!(registry.validate(oid(5), &a).is_ok());
        assert!(registry.validate(oid(7), &point(3)).is_ok());
    }

    #[test]
    fn equal_values_get_distinct_entries() {
        let registry = ObjectRegistry::new();
        let a: ObjectRef = Arc::new(Point { x: 1, y: 1 });
        let b: ObjectRef = Arc::new(Point { x: 1, y: 1 });
        registry.register_object(oid(10), &a).unwrap();
        registry.register_object(oid(11), &b).unwrap();
        assert_ne!(registry.lookup_object_id(&a), registry.lookup_object_id(&b));
    }

    #[test]
    fn null_and_undefined_ids_are_rejected() {
        let registry = ObjectRegistry::new();
        let a = point(1);
        let err = registry.register_object(ObjectId::NULL, &a).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(registry.register_object(oid(u64::MAX), &a).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn optional_register_returns_registered_object() {
        let registry = ObjectRegistry::new();
        let a = point(1);
        let b = point(2);
        let first = registry.optional_register_object(oid(5), &a).unwrap();
        assert!(first.same_object(&a));
        let second = registry.optional_register_object(oid(5), &b).unwrap();
        assert!(second.same_object(&a));
        assert_eq!(registry.lookup_object_id(&b), None);
    }

    // ---- Dead entries ----

    #[test]
    fn dropped_objects_become_dead_and_are_swept() {
        let registry = small();
        let keep = point(1);
        registry.register_object(oid(1), &keep).unwrap();
        {
            let gone = point(2);
            registry.register_object(oid(2), &gone).unwrap();
        }
        assert!(!registry.contains_object_id(oid(2)));
        assert!(registry.lookup_object(oid(2)).is_none());
        assert_eq!(registry.size(), 2);
        assert!(registry.consolidate());
        assert_eq!(registry.size(), 1);
        assert!(registry.contains_object_id(oid(1)));
    }

    #[test]
    fn dead_id_can_be_reused() {
        let registry = ObjectRegistry::new();
        {
            let gone = point(2);
            registry.register_object(oid(2), &gone).unwrap();
        }
        let fresh = point(3);
        assert!(registry.register_object(oid(2), &fresh).unwrap());
        assert!(registry.lookup_object(oid(2)).unwrap().same_object(&fresh));
        assert_eq!(registry.size(), 1);
    }

    // ---- Constants ----

    #[test]
    fn constants_are_kept_alive_and_survive_clear() {
        let registry = ObjectRegistry::new();
        let constant_id = oid(9_000_000_000_000_000_001);
        {
            let constant = point(7);
            assert!(registry.register_constant(constant_id, &constant).unwrap());
        }
        let plain = point(1);
        registry.register_object(oid(1), &plain).unwrap();

        registry.clear();
        assert!(registry.contains_object_id(constant_id));
        assert!(!registry.contains_object_id(oid(1)));
        let constant = registry.lookup_object(constant_id).unwrap();
        assert_eq!(constant.downcast_ref::<Point>(), Some(&Point { x: 7, y: 0 }));

        registry.truncate();
        assert!(registry.contains_object_id(constant_id));

        registry.clear_all();
        assert!(registry.is_empty());
        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn truncate_all_forgets_constants_and_shrinks() {
        let registry = small();
        let objects: Vec<ObjectRef> = (0..100).map(point).collect();
        for (i, o) in objects.iter().enumerate() {
            registry.register_constant(oid(i as u64 + 1), o).unwrap();
        }
        let grown = registry.capacity();
        registry.truncate_all();
        assert!(registry.is_empty());
        assert!(registry.capacity() < grown);
    }

    // ---- Sizing ----

    #[test]
    fn table_grows_and_lookups_survive_rehash() {
        let registry = small();
        let objects: Vec<ObjectRef> = (0..2000).map(point).collect();
        for (i, o) in objects.iter().enumerate() {
            registry.register_object(oid(i as u64 + 1), o).unwrap();
        }
        assert_eq!(registry.size(), 2000);
        assert!(registry.capacity() >= 2000);
        for (i, o) in objects.iter().enumerate() {
            assert_eq!(registry.lookup_object_id(o), Some(oid(i as u64 + 1)));
        }
    }

    #[test]
    fn ensure_capacity_presizes() {
        let registry = small();
        assert!(registry.ensure_capacity(10_000).unwrap());
        assert!(registry.capacity() >= 10_000);
        assert!(!registry.ensure_capacity(100).unwrap());
        assert!(registry.ensure_capacity(0).is_err());
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let registry = ObjectRegistry::new();
        assert!(registry.set_hash_density(0.0).is_err());
        assert!(registry.set_hash_density(f32::NAN).is_err());
        assert!(registry.set_minimum_capacity(0).is_err());
        assert_eq!(registry.hash_density(), DEFAULT_HASH_DENSITY);
    }

    #[test]
    fn density_change_rehashes_without_losing_entries() {
        let registry = small();
        let a = point(1);
        registry.register_object(oid(3), &a).unwrap();
        assert!(registry.set_hash_density(0.25).unwrap());
        assert_eq!(registry.hash_density(), 0.25);
        assert_eq!(registry.lookup_object_id(&a), Some(oid(3)));
    }

    #[test]
    fn fresh_clone_keeps_configuration_only() {
        let registry = small();
        let a = point(1);
        registry.register_object(oid(1), &a).unwrap();
        let clone = registry.fresh_clone();
        assert!(clone.is_empty());
        assert_eq!(clone.config(), registry.config());
    }

    #[test]
    fn statistics_count_every_entry_once_per_table() {
        let registry = small();
        let objects: Vec<ObjectRef> = (0..50).map(point).collect();
        for (i, o) in objects.iter().enumerate() {
            registry.register_object(oid(i as u64 + 1), o).unwrap();
        }
        let stats = registry.hash_statistics();
        assert_eq!(stats.len(), 2);
        for s in &stats {
            assert_eq!(s.entries, 50);
            assert_eq!(s.chain_lengths.values().sum::<usize>(), s.buckets);
            assert!(s.longest_chain >= 1);
        }
    }

    #[test]
    fn iterate_entries_visits_live_entries() {
        let registry = ObjectRegistry::new();
        let a = point(1);
        let b = point(2);
        registry.register_object(oid(1), &a).unwrap();
        registry.register_object(oid(2), &b).unwrap();
        let mut seen = Vec::new();
        registry.iterate_entries(|id, _| seen.push(id.get()));
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2]);
    }

    // ---- Bulk operations ----

    #[test]
    fn select_live_object_ids_filters_candidates() {
        let registry = ObjectRegistry::new();
        let a = point(1);
        registry.register_object(oid(1), &a).unwrap();
        let candidates: HashSet<ObjectId> = [oid(1), oid(2)].into_iter().collect();
        let live = registry.select_live_object_ids(&candidates).unwrap();
        assert_eq!(live, [oid(1)].into_iter().collect());
    }

    #[test]
    fn process_live_object_ids_runs_processor() {
        let registry = ObjectRegistry::new();
        let a = point(1);
        registry.register_object(oid(1), &a).unwrap();
        let mut live = Vec::new();
        let mut processor = |is_live: &dyn Fn(ObjectId) -> bool| {
            for id in [oid(1), oid(2)] {
                if is_live(id) {
                    live.push(id);
                }
            }
        };
        assert!(registry.process_live_object_ids(&mut processor));
        assert_eq!(live, vec![oid(1)]);
    }

    #[test]
    fn bulk_operations_are_rejected_under_contention() {
        let registry = Arc::new(ObjectRegistry::with_config(RegistryConfig {
            lock_timeout_ms: 5,
            ..RegistryConfig::default()
        })
        .unwrap());
        let guard = registry.table.lock();
        let contender = Arc::clone(&registry);
        let result = thread::spawn(move || {
            let mut processor = |_: &dyn Fn(ObjectId) -> bool| {};
            (
                contender.select_live_object_ids(&HashSet::new()),
                contender.process_live_object_ids(&mut processor),
            )
        })
        .join()
        .unwrap();
        drop(guard);
        assert!(result.0.is_none());
        assert!(!result.1);
    }

    #[test]
    fn concurrent_registration_keeps_biuniqueness() {
        let registry = Arc::new(ObjectRegistry::with_config(RegistryConfig {
            minimum_capacity: 8,
            ..RegistryConfig::default()
        })
        .unwrap());
        let objects: Arc<Vec<ObjectRef>> = Arc::new((0..400).map(point).collect());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let registry = Arc::clone(&registry);
                let objects = Arc::clone(&objects);
                thread::spawn(move || {
                    for i in (t..400).step_by(4) {
                        registry.register_object(oid(i as u64 + 1), &objects[i]).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(registry.size(), 400);
        for (i, o) in objects.iter().enumerate() {
            assert_eq!(registry.lookup_object_id(o), Some(oid(i as u64 + 1)));
        }
    }

    // ---- Properties ----

    proptest! {
        #[test]
        fn registrations_stay_biunique(
            ops in prop::collection::vec((1u64..12, 0usize..8), 1..60),
            dropped in prop::collection::hash_set(0usize..8, 0..4),
        ) {
            let registry = small();
            let mut objects: Vec<Option<ObjectRef>> = (0..8).map(|i| Some(point(i))).collect();
            let mut by_id: HashMap<u64, usize> = HashMap::new();
            let mut by_object: HashMap<usize, u64> = HashMap::new();

            for (id, index) in ops {
                let object = objects[index].clone().unwrap();
                let result = registry.register_object(oid(id), &object);
                match (by_id.get(&id), by_object.get(&index)) {
                    (None, None) => {
                        prop_assert!(result.unwrap());
                        by_id.insert(id, index);
                        by_object.insert(index, id);
                    }
                    (Some(&i), Some(&registered)) if i == index && registered == id => {
                        prop_assert!(!result.unwrap());
                    }
                    _ => {
                        let err = result.unwrap_err();
                        prop_assert_eq!(err.kind(), ErrorKind::ConsistencyViolation);
                    }
                }
                prop_assert_eq!(registry.size(), by_id.len());
            }

            for (&id, &index) in &by_id {
                let object = objects[index].as_ref().unwrap();
                prop_assert_eq!(registry.lookup_object_id(object), Some(oid(id)));
                prop_assert!(registry.lookup_object(oid(id)).unwrap().same_object(object));
            }

            for &index in &dropped {
                objects[index] = None;
            }
            registry.consolidate();
            let live = by_id.values().filter(|i| objects[**i].is_some()).count();
            prop_assert_eq!(registry.size(), live);
            for (&id, &index) in &by_id {
                prop_assert_eq!(registry.contains_object_id(oid(id)), objects[index].is_some());
            }
        }
    }
}
