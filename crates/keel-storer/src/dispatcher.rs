use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::object_manager::ObjectManager;

/// Decides what a nested persistence context shares with its parent.
pub trait PersistenceContextDispatcher: Send + Sync + fmt::Debug {
    fn dispatch_object_manager(&self, parent: &Arc<ObjectManager>) -> Arc<ObjectManager>;
}

/// Nested contexts use the parent's registry and id counter.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassThroughDispatcher;

impl PersistenceContextDispatcher for PassThroughDispatcher {
    fn dispatch_object_manager(&self, parent: &Arc<ObjectManager>) -> Arc<ObjectManager> {
        Arc::clone(parent)
    }
}

/// Nested contexts get an empty registry and a private id counter seeded
/// from the parent's, so nothing they do reaches the parent.
#[derive(Clone, Copy, Debug, Default)]
pub struct IsolatingDispatcher;

impl PersistenceContextDispatcher for IsolatingDispatcher {
    fn dispatch_object_manager(&self, parent: &Arc<ObjectManager>) -> Arc<ObjectManager> {
        debug!(current_object_id = %parent.current_object_id(), "isolated object manager dispatched");
        Arc::new(parent.fresh_clone())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    #[default]
    PassThrough,
    Isolating,
}

impl DispatchMode {
    pub fn dispatcher(self) -> Arc<dyn PersistenceContextDispatcher> {
        match self {
            Self::PassThrough => Arc::new(PassThroughDispatcher),
            Self::Isolating => Arc::new(IsolatingDispatcher),
        }
    }
}

#[cfg(test)]
mod tests {
    use keel_ids::TransientIdProvider;
    use keel_registry::ObjectRegistry;
    use keel_types::{ObjectId, ObjectRef};

    use super::*;

    fn parent() -> Arc<ObjectManager> {
        Arc::new(ObjectManager::new(
            Arc::new(ObjectRegistry::new()),
            Box::new(TransientIdProvider::<ObjectId>::with_default_start()),
        ))
    }

    #[test]
    fn pass_through_shares_everything() {
        let parent = parent();
        let inner = DispatchMode::PassThrough.dispatcher().dispatch_object_manager(&parent);
        assert!(Arc::ptr_eq(&parent, &inner));
    }

    #[test]
    fn isolating_keeps_the_parent_untouched() {
        let parent = parent();
        let inner = DispatchMode::Isolating.dispatcher().dispatch_object_manager(&parent);
        let object: ObjectRef = Arc::new(7u8);
        let id = inner.allocate_object_id().unwrap();
        inner.merge_entries([(id, &object)]).unwrap();

        assert!(parent.lookup_object_id(&object).is_none());
        assert!(parent.current_object_id() < id);
        assert_eq!(inner.lookup_object_id(&object), Some(id));
    }

    #[test]
    fn mode_reads_from_snake_case() {
        let mode: DispatchMode = serde_json::from_str("\"isolating\"").unwrap();
        assert_eq!(mode, DispatchMode::Isolating);
    }
}
