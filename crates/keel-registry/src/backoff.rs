//! Retrying lock-rejected bulk operations.

use std::collections::HashSet;
use std::thread;
use std::time::{Duration, Instant};

use keel_types::ObjectId;
use tracing::debug;

use crate::error::{RegistryError, RegistryResult};
use crate::object_registry::{ObjectIdsProcessor, ObjectRegistry};

/// Exponential backoff bounded by a total time budget.
///
/// The operation is attempted, and after each rejection the caller sleeps
/// for the current delay, which then doubles up to `max_delay`. Once the
/// time spent exceeds `budget` the last rejection is returned as
/// [`RegistryError::LockRejected`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockRetry {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub budget: Duration,
}

impl Default for LockRetry {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(100),
            budget: Duration::from_secs(5),
        }
    }
}

impl LockRetry {
    pub fn new(initial_delay: Duration, max_delay: Duration, budget: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            budget,
        }
    }

    /// Run `attempt` until it returns `Some` or the budget is spent.
    pub fn run<T>(
        &self,
        operation: &'static str,
        mut attempt: impl FnMut() -> Option<T>,
    ) -> RegistryResult<T> {
        let started = Instant::now();
        let mut delay = self.initial_delay;
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            if let Some(value) = attempt() {
                return Ok(value);
            }
            let elapsed = started.elapsed();
            if elapsed >= self.budget {
                debug!(operation, attempts, ?elapsed, "lock retry budget spent");
                return Err(RegistryError::LockRejected {
                    operation,
                    timeout: elapsed,
                });
            }
            let remaining = self.budget - elapsed;
            thread::sleep(delay.min(remaining));
            delay = (delay * 2).min(self.max_delay);
        }
    }

    /// [`ObjectRegistry::select_live_object_ids`] with retries.
    pub fn select_live_object_ids(
        &self,
        registry: &ObjectRegistry,
        candidates: &HashSet<ObjectId>,
    ) -> RegistryResult<HashSet<ObjectId>> {
        self.run("select_live_object_ids", || {
            registry.select_live_object_ids(candidates)
        })
    }

    /// [`ObjectRegistry::process_live_object_ids`] with retries.
    pub fn process_live_object_ids(
        &self,
        registry: &ObjectRegistry,
        processor: &mut dyn ObjectIdsProcessor,
    ) -> RegistryResult<()> {
        self.run("process_live_object_ids", || {
            registry.process_live_object_ids(&mut *processor).then_some(())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::sync::Arc;

    use keel_types::{ErrorKind, ObjectRef};

    use super::*;

    fn fast() -> LockRetry {
        LockRetry::new(
            Duration::from_millis(1),
            Duration::from_millis(4),
            Duration::from_millis(40),
        )
    }

    #[test]
    fn succeeds_after_transient_rejections() {
        let calls = Cell::new(0);
        let value = fast()
            .run("test", || {
                calls.set(calls.get() + 1);
                (calls.get() >= 3).then_some(42)
            })
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn gives_up_after_the_budget_not_a_count() {
        let calls = Cell::new(0u32);
        let started = Instant::now();
        let err = fast()
            .run("test", || {
                calls.set(calls.get() + 1);
                None::<()>
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LockRejected);
        assert!(started.elapsed() >= Duration::from_millis(40));
        assert!(calls.get() > 1);
    }

    #[test]
    fn registry_helpers_pass_through() {
        let registry = ObjectRegistry::new();
        let a: ObjectRef = Arc::new(1u8);
        registry.register_object(ObjectId::new(9), &a).unwrap();
        let candidates: HashSet<ObjectId> = [ObjectId::new(9), ObjectId::new(10)].into_iter().collect();
        let live = fast().select_live_object_ids(&registry, &candidates).unwrap();
        assert_eq!(live.len(), 1);

        let mut count = 0;
        let mut processor = |is_live: &dyn Fn(ObjectId) -> bool| {
            count += usize::from(is_live(ObjectId::new(9)));
        };
        fast().process_live_object_ids(&registry, &mut processor).unwrap();
        assert_eq!(count, 1);
    }
}
