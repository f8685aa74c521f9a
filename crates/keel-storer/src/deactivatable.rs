use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use keel_types::{ObjectId, ObjectRef};
use tracing::debug;

use crate::error::{StorerError, StorerResult};
use crate::storer::Storer;

/// Shared on/off switch for any number of [`DeactivatableStorer`]s.
#[derive(Clone, Debug)]
pub struct StorerSwitch(Arc<AtomicBool>);

impl StorerSwitch {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn enable(&self) {
        self.set(true);
    }

    pub fn disable(&self) {
        self.set(false);
    }

    pub fn set(&self, enabled: bool) {
        let previous = self.0.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            debug!(enabled, "storer switch toggled");
        }
    }
}

impl Default for StorerSwitch {
    fn default() -> Self {
        Self::new(true)
    }
}

/// A storer that refuses every mutating call.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledStorer;

impl Storer for DisabledStorer {
    fn store(&mut self, _instance: &ObjectRef) -> StorerResult<ObjectId> {
        Err(StorerError::Deactivated)
    }

    fn store_all(&mut self, _instances: &[ObjectRef]) -> StorerResult<Vec<ObjectId>> {
        Err(StorerError::Deactivated)
    }

    fn skip(&mut self, _instance: &ObjectRef) -> StorerResult<bool> {
        Err(StorerError::Deactivated)
    }

    fn skip_nulled(&mut self, _instance: &ObjectRef) -> StorerResult<bool> {
        Err(StorerError::Deactivated)
    }

    fn skip_mapped(&mut self, _instance: &ObjectRef, _object_id: ObjectId) -> StorerResult<bool> {
        Err(StorerError::Deactivated)
    }

    fn commit(&mut self) -> StorerResult<usize> {
        Err(StorerError::Deactivated)
    }

    fn reinitialize(&mut self) {}

    fn size(&self) -> usize {
        0
    }

    fn current_capacity(&self) -> usize {
        0
    }

    fn maximum_capacity(&self) -> usize {
        0
    }

    fn ensure_capacity(&mut self, _capacity: usize) -> StorerResult<()> {
        Err(StorerError::Deactivated)
    }
}

/// Delegates to a real storer while its switch is on and to a
/// [`DisabledStorer`] while it is off.
///
/// Introspection always reports the real storer, so a batch accumulated
/// before switching off is still visible and is committed once the switch
/// is back on.
#[derive(Debug)]
pub struct DeactivatableStorer<S> {
    inner: S,
    switch: StorerSwitch,
    disabled: DisabledStorer,
}

impl<S: Storer> DeactivatableStorer<S> {
    pub fn new(inner: S, switch: StorerSwitch) -> Self {
        Self {
            inner,
            switch,
            disabled: DisabledStorer,
        }
    }

    pub fn switch(&self) -> &StorerSwitch {
        &self.switch
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn active(&mut self) -> &mut dyn Storer {
        if self.switch.is_enabled() {
            &mut self.inner
        } else {
            &mut self.disabled
        }
    }
}

impl<S: Storer> Storer for DeactivatableStorer<S> {
    fn store(&mut self, instance: &ObjectRef) -> StorerResult<ObjectId> {
        self.active().store(instance)
    }

    fn store_all(&mut self, instances: &[ObjectRef]) -> StorerResult<Vec<ObjectId>> {
        self.active().store_all(instances)
    }

    fn skip(&mut self, instance: &ObjectRef) -> StorerResult<bool> {
        self.active().skip(instance)
    }

    fn skip_nulled(&mut self, instance: &ObjectRef) -> StorerResult<bool> {
        self.active().skip_nulled(instance)
    }

    fn skip_mapped(&mut self, instance: &ObjectRef, object_id: ObjectId) -> StorerResult<bool> {
        self.active().skip_mapped(instance, object_id)
    }

    fn commit(&mut self) -> StorerResult<usize> {
        self.active().commit()
    }

    fn reinitialize(&mut self) {
        self.active().reinitialize();
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn current_capacity(&self) -> usize {
        self.inner.current_capacity()
    }

    fn maximum_capacity(&self) -> usize {
        self.inner.maximum_capacity()
    }

    fn ensure_capacity(&mut self, capacity: usize) -> StorerResult<()> {
        self.active().ensure_capacity(capacity)
    }
}
