//! Storing and loading object graphs through a persistence manager.

mod common;

use std::sync::Arc;

use common::{friend_of, name_of, person, person_handler, Env, Person};
use keel_sdk::{
    DispatchMode, EntityLayout, ErrorKind, KeelError, ObjectId, ObjectRef, ObjectRefExt,
    PersistenceConfig, ReferenceArray, RootsView, RuntimeType, Storer, DEFAULT_ROOT,
};

// ---- Lazy and eager storing ----

#[test]
fn storing_an_instance_twice_writes_one_record() {
    let env = Env::new();
    let manager = env.open();
    let alice = person("alice", 30, None);

    let mut storer = manager.create_lazy_storer().unwrap();
    let first = storer.store(&alice).unwrap();
    let second = storer.store(&alice).unwrap();
    assert_eq!(first, second);
    assert_eq!(storer.size(), 1);
    assert_eq!(storer.commit().unwrap(), 1);
    assert_eq!(env.storage.len(), 1);
    assert_eq!(manager.object_manager().lookup_object_id(&alice), Some(first));
}

#[test]
fn lazy_skips_known_references_and_eager_rewrites_them() {
    let env = Env::new();
    let manager = env.open();
    let bob = person("bob", 40, None);
    manager.store(&bob).unwrap();
    let alice = person("alice", 30, Some(&bob));

    let mut lazy = manager.create_lazy_storer().unwrap();
    lazy.store(&alice).unwrap();
    assert_eq!(lazy.size(), 1);
    lazy.reinitialize();

    let mut eager = manager.create_eager_storer().unwrap();
    eager.store(&alice).unwrap();
    assert_eq!(eager.size(), 2);
    assert_eq!(eager.commit().unwrap(), 2);
}

#[test]
fn explicitly_stored_known_instance_is_written_again() {
    let env = Env::new();
    let manager = env.open();
    let alice = person("alice", 30, None);
    let first = manager.store(&alice).unwrap();
    let second = manager.store(&alice).unwrap();
    assert_eq!(first, second);
    assert_eq!(env.storage.batch_count(), 2);
    assert_eq!(env.storage.len(), 1);
}

#[test]
fn identity_not_value_decides_object_ids() {
    let env = Env::new();
    let manager = env.open();
    let one = person("twin", 5, None);
    let other = person("twin", 5, None);
    let alias = ObjectRef::clone(&one);

    let ids = manager.store_all(&[one, other, alias]).unwrap();
    assert_ne!(ids[0], ids[1]);
    assert_eq!(ids[0], ids[2]);
    assert_eq!(env.storage.len(), 2);
}

#[test]
fn store_all_stores_elements_and_store_stores_the_container() {
    let env = Env::new();
    let manager = env.open();
    let a = person("a", 1, None);
    let b = person("b", 2, None);

    let ids = manager.store_all(&[ObjectRef::clone(&a), ObjectRef::clone(&b)]).unwrap();
    assert_eq!(ids.len(), 2);
    assert_eq!(env.storage.len(), 2);

    let array: ObjectRef = Arc::new(ReferenceArray::of(&[a, b]));
    let array_id = manager.store(&array).unwrap();
    assert_eq!(env.storage.len(), 3);
    let record = env.storage.get(array_id).unwrap();
    let handler = manager.handlers().ensure_type_handler(&array).unwrap();
    assert_eq!(Some(record.type_id), handler.type_id());
    assert_eq!(record.references(), ids);
}

#[test]
fn concurrent_storers_share_uncommitted_ids() {
    let env = Env::new();
    let manager = env.open();
    let shared = person("shared", 7, None);
    let mut first = manager.create_lazy_storer().unwrap();
    let mut second = manager.create_lazy_storer().unwrap();

    let id = first.store(&shared).unwrap();
    assert_eq!(second.store(&shared).unwrap(), id);
    assert_eq!(first.commit().unwrap(), 1);
    assert_eq!(second.commit().unwrap(), 1);
    assert_eq!(env.storage.len(), 1);
    assert_eq!(manager.object_manager().lookup_object_id(&shared), Some(id));
}

// ---- Loading ----

#[test]
fn a_second_manager_loads_the_stored_graph() {
    let env = Env::new();
    let first = env.open();
    let bob = person("bob", 40, None);
    let alice = person("alice", 30, Some(&bob));
    let alice_id = first.store(&alice).unwrap();

    let second = env.open();
    let loaded = second.get_object(alice_id).unwrap().unwrap();
    assert!(!loaded.same_object(&alice));
    assert_eq!(name_of(&loaded), "alice");
    assert_eq!(loaded.downcast_ref::<Person>().map(|p| p.age), Some(30));
    let friend = friend_of(&loaded).unwrap();
    assert_eq!(name_of(&friend), "bob");

    let again = second.get_object(alice_id).unwrap().unwrap();
    assert!(again.same_object(&loaded));
    assert!(second.get_object(ObjectId::NULL).unwrap().is_none());
}

#[test]
fn loading_an_unknown_object_id_fails() {
    let env = Env::new();
    let manager = env.open();
    let err = manager
        .get_object(ObjectId::new(1_000_000_000_000_000_999))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownIdentifier);
}

#[test]
fn new_ids_continue_after_loaded_ones() {
    let env = Env::new();
    let first = env.open();
    let stored = first.store(&person("a", 1, None)).unwrap();

    let second = env.open();
    let _loaded = second.get_object(stored).unwrap().unwrap();
    let next = second.store(&person("b", 2, None)).unwrap();
    assert!(next > stored);
}

// ---- Roots ----

#[test]
fn roots_survive_a_restart() {
    let env = Env::new();
    let first = env.open();
    let bob = person("bob", 40, None);
    let alice = person("alice", 30, Some(&bob));
    first.roots().register_instance(DEFAULT_ROOT, &alice);
    assert!(first.roots().has_changed());
    assert_eq!(first.store_roots().unwrap(), 3);
    assert!(!first.roots().has_changed());

    let second = env.open();
    let root = second.roots().root_reference().unwrap();
    assert_eq!(name_of(&root), "alice");
    assert_eq!(friend_of(&root).map(|f| name_of(&f)).as_deref(), Some("bob"));
    assert!(!second.roots().has_changed());
}

#[test]
fn removed_roots_stay_removed() {
    let env = Env::new();
    let first = env.open();
    let alice = person("alice", 30, None);
    first.roots().register_instance("people", &alice);
    first.store_roots().unwrap();

    let second = env.open();
    assert!(second.roots().remove("people"));
    assert!(second.roots().has_changed());
    second.store_roots().unwrap();

    let third = env.open();
    assert_eq!(third.roots().len(), 1);
    assert!(third.roots().get("people").is_none());
    assert!(third.roots().entries()[0].is_removed());
}

// ---- Switches ----

#[test]
fn deactivated_storers_refuse_until_switched_back_on() {
    let env = Env::new();
    let manager = env.open();
    let mut storer = manager.create_deactivatable_storer().unwrap();
    let alice = person("alice", 30, None);
    storer.store(&alice).unwrap();

    manager.storer_switch().disable();
    let err = storer.store(&person("bob", 40, None)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorerDeactivated);
    assert_eq!(storer.size(), 1);

    manager.storer_switch().enable();
    assert_eq!(storer.commit().unwrap(), 1);
}

#[test]
fn disabled_writes_leave_the_registry_untouched() {
    let env = Env::new();
    let manager = env.open();
    manager.write_controller().disable();
    let alice = person("alice", 30, None);
    let err = manager.store(&alice).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WriteDisabled);
    assert!(manager.object_manager().lookup_object_id(&alice).is_none());
    assert!(env.storage.is_empty());

    manager.write_controller().enable();
    manager.store(&alice).unwrap();
    assert!(manager.object_manager().lookup_object_id(&alice).is_some());
}

// ---- Lifecycle ----

#[test]
fn managers_must_be_opened_exactly_once() {
    let env = Env::new();
    let manager = env.unopened(PersistenceConfig::default());
    manager.register_handler(person_handler()).unwrap();
    let err = manager.store(&person("a", 1, None)).unwrap_err();
    assert!(matches!(err, KeelError::NotOpen));

    manager.open().unwrap();
    assert!(matches!(manager.open(), Err(KeelError::AlreadyOpen)));
    assert!(matches!(
        manager.register_handler(person_handler()),
        Err(KeelError::AlreadyOpen)
    ));
}

// ---- Registry ----

#[test]
fn registry_rejects_a_second_object_for_a_used_id() {
    let env = Env::new();
    let manager = env.open();
    let alice = person("alice", 30, None);
    let id = manager.store(&alice).unwrap();
    let registry = manager.object_manager().registry();

    assert!(!registry.register_object(id, &alice).unwrap());
    let impostor = person("alice", 30, None);
    let err = registry.register_object(id, &impostor).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConsistencyViolation);
}

#[test]
fn supertypes_get_ids_but_the_root_does_not() {
    struct Manager {
        name: String,
    }

    let env = Env::new();
    let handler = EntityLayout::new("app.Manager", |f| {
        Ok(Manager {
            name: f.string("app.Party#name")?,
        })
    })
    .extending(RuntimeType::named("app.Employee").extending(RuntimeType::named("app.Party")))
    .chars("app.Party#name", |m: &Manager| m.name.clone())
    .shared();
    let manager = env.open_with(PersistenceConfig::default(), vec![handler]);

    let types = manager.handlers().type_manager();
    let own = types.lookup_type_id(&RuntimeType::named("app.Manager")).unwrap();
    let employee = types.lookup_type_id(&RuntimeType::named("app.Employee")).unwrap();
    let party = types.lookup_type_id(&RuntimeType::named("app.Party")).unwrap();
    assert!(own != employee && employee != party && own != party);
    assert!(types.lookup_type_id(&RuntimeType::root()).is_none());
}

// ---- Dispatch ----

#[test]
fn isolating_dispatch_keeps_nested_stores_out_of_the_registry() {
    let env = Env::new();
    let config = PersistenceConfig {
        dispatch: DispatchMode::Isolating,
        ..PersistenceConfig::default()
    };
    let manager = env.open_with(config, vec![person_handler()]);
    let alice = person("alice", 30, None);

    let mut nested = manager.create_nested_storer().unwrap();
    nested.store(&alice).unwrap();
    nested.commit().unwrap();
    assert_eq!(env.storage.len(), 1);
    assert!(manager.object_manager().lookup_object_id(&alice).is_none());
}

#[test]
fn pass_through_dispatch_shares_the_registry() {
    let env = Env::new();
    let manager = env.open();
    let alice = person("alice", 30, None);

    let mut nested = manager.create_nested_storer().unwrap();
    let id = nested.store(&alice).unwrap();
    nested.commit().unwrap();
    assert_eq!(manager.object_manager().lookup_object_id(&alice), Some(id));
}
