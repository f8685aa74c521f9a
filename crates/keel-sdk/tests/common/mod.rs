//! Application model and wiring shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use keel_sdk::{
    DictionaryStorage, EntityLayout, InMemoryDictionaryStorage, InMemoryStorage, Link, ObjectRef,
    ObjectRefExt, PersistenceConfig, PersistenceManager, PersistenceSource, PersistenceTarget,
    SharedHandler,
};

pub struct Person {
    pub name: String,
    pub age: i32,
    pub friend: Link,
}

pub fn person(name: &str, age: i32, friend: Option<&ObjectRef>) -> ObjectRef {
    Arc::new(Person {
        name: name.to_string(),
        age,
        friend: Link::new(friend.cloned()),
    })
}

pub fn person_handler() -> SharedHandler {
    EntityLayout::new("app.Person", |f| {
        Ok(Person {
            name: f.string("name")?,
            age: f.get("age")?,
            friend: Link::empty(),
        })
    })
    .chars("name", |p: &Person| p.name.clone())
    .primitive("age", |p: &Person| p.age)
    .link("friend", "app.Person", |p: &Person| &p.friend)
    .shared()
}

pub fn name_of(object: &ObjectRef) -> String {
    object
        .downcast_ref::<Person>()
        .map(|p| p.name.clone())
        .unwrap_or_default()
}

pub fn friend_of(object: &ObjectRef) -> Option<ObjectRef> {
    object.downcast_ref::<Person>().and_then(|p| p.friend.get())
}

/// Record storage and dictionary storage that outlive any one manager, so a
/// test can simulate a restart by opening a second manager on them.
pub struct Env {
    pub storage: Arc<InMemoryStorage>,
    pub dictionary: Arc<InMemoryDictionaryStorage>,
}

impl Env {
    pub fn new() -> Self {
        Self {
            storage: Arc::new(InMemoryStorage::new()),
            dictionary: Arc::new(InMemoryDictionaryStorage::new()),
        }
    }

    /// A manager that is not opened yet.
    pub fn unopened(&self, config: PersistenceConfig) -> Arc<PersistenceManager> {
        let dictionary: Arc<dyn DictionaryStorage> = Arc::clone(&self.dictionary) as Arc<dyn DictionaryStorage>;
        PersistenceManager::new(
            config,
            Arc::clone(&self.storage) as Arc<dyn PersistenceTarget>,
            Arc::clone(&self.storage) as Arc<dyn PersistenceSource>,
            Some(dictionary),
        )
        .unwrap()
    }

    pub fn open_with(
        &self,
        config: PersistenceConfig,
        handlers: Vec<SharedHandler>,
    ) -> Arc<PersistenceManager> {
        let manager = self.unopened(config);
        for handler in handlers {
            manager.register_handler(handler).unwrap();
        }
        manager.open().unwrap();
        manager
    }

    pub fn open(&self) -> Arc<PersistenceManager> {
        self.open_with(PersistenceConfig::default(), vec![person_handler()])
    }
}
