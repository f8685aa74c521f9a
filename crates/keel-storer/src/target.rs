use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use keel_types::{EntityRecord, ObjectId};
use parking_lot::RwLock;

use crate::error::{StorerError, StorerResult};

/// The records of one commit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Batch {
    pub records: Vec<EntityRecord>,
}

impl Batch {
    pub fn new(records: Vec<EntityRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn object_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.records.iter().map(|r| r.object_id)
    }
}

/// Where committed batches go.
///
/// Implementations encode and write the batch as one unit. Failures are
/// reported as [`StorerError::Transfer`] and are never retried here.
pub trait PersistenceTarget: Send + Sync {
    fn write(&self, batch: &Batch) -> StorerResult<()>;
}

/// Where records are read back from.
pub trait PersistenceSource: Send + Sync {
    /// Every stored record, latest version per object id.
    fn read_all(&self) -> StorerResult<Vec<EntityRecord>>;

    /// The records of the given ids. Ids without a record are left out.
    fn read_by_object_ids(&self, id_sets: &[HashSet<ObjectId>]) -> StorerResult<Vec<EntityRecord>>;
}

/// Administrative switch over all writes.
pub trait WriteController: Send + Sync {
    fn is_storing_enabled(&self) -> bool;

    fn validate_is_storing_enabled(&self) -> StorerResult<()> {
        if self.is_storing_enabled() {
            Ok(())
        } else {
            Err(StorerError::StoringDisabled {
                reason: "writes are suspended".to_string(),
            })
        }
    }
}

/// A [`WriteController`] toggled at runtime.
#[derive(Debug)]
pub struct SwitchableWriteController {
    enabled: AtomicBool,
}

impl SwitchableWriteController {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }
}

impl Default for SwitchableWriteController {
    fn default() -> Self {
        Self::new(true)
    }
}

impl WriteController for SwitchableWriteController {
    fn is_storing_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

/// Record store held in memory.
///
/// Intended for tests and embedding. Implements both sides of the transfer;
/// a later write of an object id replaces the earlier record.
pub struct InMemoryStorage {
    records: RwLock<BTreeMap<ObjectId, EntityRecord>>,
    batches: AtomicUsize,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            batches: AtomicUsize::new(0),
        }
    }

    pub fn get(&self, object_id: ObjectId) -> Option<EntityRecord> {
        self.records.read().get(&object_id).cloned()
    }

    /// Number of distinct objects stored.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Number of batches written so far.
    pub fn batch_count(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.records.write().clear();
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistenceTarget for InMemoryStorage {
    fn write(&self, batch: &Batch) -> StorerResult<()> {
        let mut records = self.records.write();
        for record in &batch.records {
            records.insert(record.object_id, record.clone());
        }
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl PersistenceSource for InMemoryStorage {
    fn read_all(&self) -> StorerResult<Vec<EntityRecord>> {
        Ok(self.records.read().values().cloned().collect())
    }

    fn read_by_object_ids(&self, id_sets: &[HashSet<ObjectId>]) -> StorerResult<Vec<EntityRecord>> {
        let records = self.records.read();
        let mut ids: Vec<ObjectId> = id_sets.iter().flatten().copied().collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids.iter().filter_map(|id| records.get(id).cloned()).collect())
    }
}

impl fmt::Debug for InMemoryStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryStorage")
            .field("record_count", &self.len())
            .field("batch_count", &self.batch_count())
            .finish()
    }
}
