use std::fmt;
use std::marker::PhantomData;

use keel_types::PersistentId;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{IdError, IdResult};

/// Source of monotonically increasing persistent ids.
///
/// Implementations serialize internally: `provide_next_id` may be called from
/// any thread and never hands out the same id twice.
pub trait IdProvider<I: PersistentId>: Send + Sync + fmt::Debug {
    /// First-touch setup. Returns the current id afterwards.
    fn initialize_id(&self) -> IdResult<I>;

    /// The most recently handed out (or fast-forwarded to) id.
    fn current_id(&self) -> I;

    /// Allocate the next id.
    fn provide_next_id(&self) -> IdResult<I>;

    /// Fast-forward the counter to `id`. Values at or below the current id
    /// are ignored.
    fn update_current_id(&self, id: I) -> IdResult<()>;

    /// A private in-memory counter seeded from this provider's current id,
    /// for dispatched contexts that must not touch the parent's counter.
    fn clone_provider(&self) -> Box<dyn IdProvider<I>> {
        Box::new(TransientIdProvider::<I>::new(self.current_id().raw()))
    }

    /// Name of the strategy this provider implements.
    fn strategy_name(&self) -> &'static str;
}

/// In-memory counter starting at a configurable seed.
///
/// The seed is the "current" id; the first allocated id is `seed + 1`.
pub struct TransientIdProvider<I> {
    current: Mutex<u64>,
    _kind: PhantomData<fn() -> I>,
}

impl<I: PersistentId> TransientIdProvider<I> {
    pub fn new(seed: u64) -> Self {
        Self {
            current: Mutex::new(seed),
            _kind: PhantomData,
        }
    }

    /// A counter seeded at the default start of the id kind.
    pub fn with_default_start() -> Self {
        Self::new(I::DEFAULT_START)
    }
}

impl<I: PersistentId> Default for TransientIdProvider<I> {
    fn default() -> Self {
        Self::with_default_start()
    }
}

impl<I: PersistentId> fmt::Debug for TransientIdProvider<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransientIdProvider")
            .field("kind", &I::LABEL)
            .field("current", &*self.current.lock())
            .finish()
    }
}

impl<I: PersistentId> IdProvider<I> for TransientIdProvider<I> {
    fn initialize_id(&self) -> IdResult<I> {
        Ok(self.current_id())
    }

    fn current_id(&self) -> I {
        I::from_raw(*self.current.lock())
    }

    fn provide_next_id(&self) -> IdResult<I> {
        let mut current = self.current.lock();
        let next = current.checked_add(1).ok_or(IdError::Exhausted {
            kind: I::LABEL,
            current: *current,
        })?;
        *current = next;
        Ok(I::from_raw(next))
    }

    fn update_current_id(&self, id: I) -> IdResult<()> {
        let mut current = self.current.lock();
        if id.raw() > *current {
            debug!(kind = I::LABEL, from = *current, to = id.raw(), "fast-forward id counter");
            *current = id.raw();
        }
        Ok(())
    }

    fn strategy_name(&self) -> &'static str {
        "Transient"
    }
}

/// Provider for contexts that must never create new ids.
///
/// Every allocation fails; the current id can still be tracked so that
/// a cloned provider starts at the right place.
pub struct FailingIdProvider<I> {
    current: Mutex<u64>,
    _kind: PhantomData<fn() -> I>,
}

impl<I: PersistentId> FailingIdProvider<I> {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(0),
            _kind: PhantomData,
        }
    }
}

impl<I: PersistentId> Default for FailingIdProvider<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: PersistentId> fmt::Debug for FailingIdProvider<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailingIdProvider")
            .field("kind", &I::LABEL)
            .finish()
    }
}

impl<I: PersistentId> IdProvider<I> for FailingIdProvider<I> {
    fn initialize_id(&self) -> IdResult<I> {
        Ok(self.current_id())
    }

    fn current_id(&self) -> I {
        I::from_raw(*self.current.lock())
    }

    fn provide_next_id(&self) -> IdResult<I> {
        Err(IdError::AllocationForbidden { kind: I::LABEL })
    }

    fn update_current_id(&self, id: I) -> IdResult<()> {
        let mut current = self.current.lock();
        *current = (*current).max(id.raw());
        Ok(())
    }

    fn clone_provider(&self) -> Box<dyn IdProvider<I>> {
        let clone = FailingIdProvider::<I>::new();
        *clone.current.lock() = *self.current.lock();
        Box::new(clone)
    }

    fn strategy_name(&self) -> &'static str {
        "None"
    }
}
