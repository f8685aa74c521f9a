//! Named entry points into the persistent graph.
//!
//! [`Roots`] is itself a persistent object. It lives under the fixed
//! constant id [`ROOTS_OBJECT_ID`] and is written through [`RootsHandler`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use keel_dictionary::Member;
use keel_handler::{
    resolve_reference, CustomBinding, CustomHandler, FieldValues, HandlerResult, ObjectResolver,
    StoreContext,
};
use keel_types::id::CONSTANT_ID_BASE;
use keel_types::{ObjectHandle, ObjectId, ObjectRef, ObjectRefExt, RuntimeType, Value, ROOT_TYPE_NAME};
use parking_lot::RwLock;

/// Identifier of the default root.
pub const DEFAULT_ROOT: &str = "root";

/// Persisted type name of [`Roots`].
pub const ROOTS_TYPE_NAME: &str = "keel.Roots";

/// The object id the roots table is stored under.
pub const ROOTS_OBJECT_ID: ObjectId = ObjectId::new(CONSTANT_ID_BASE + 1);

type Supplier = Arc<dyn Fn() -> Option<ObjectRef> + Send + Sync>;

/// One named root. An entry without a supplier records a removed root.
#[derive(Clone)]
pub struct RootEntry {
    identifier: String,
    supplier: Option<Supplier>,
}

impl RootEntry {
    pub fn new(
        identifier: impl Into<String>,
        supplier: impl Fn() -> Option<ObjectRef> + Send + Sync + 'static,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            supplier: Some(Arc::new(supplier)),
        }
    }

    pub fn of_instance(identifier: impl Into<String>, instance: ObjectRef) -> Self {
        Self::new(identifier, move || Some(ObjectRef::clone(&instance)))
    }

    pub fn removed(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            supplier: None,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn is_removed(&self) -> bool {
        self.supplier.is_none()
    }

    /// The current root object.
    pub fn instance(&self) -> Option<ObjectRef> {
        self.supplier.as_ref().and_then(|supplier| supplier())
    }
}

impl fmt::Debug for RootEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootEntry")
            .field("identifier", &self.identifier)
            .field("removed", &self.is_removed())
            .finish()
    }
}

/// Read-only access to the roots.
pub trait RootsView {
    /// The object of the [`DEFAULT_ROOT`] entry.
    fn root_reference(&self) -> Option<ObjectRef>;

    /// Visit every entry in identifier order. Removed entries are visited
    /// with `None`.
    fn iterate_entries(&self, visitor: &mut dyn FnMut(&str, Option<&ObjectRef>));
}

/// The table of named roots.
#[derive(Default)]
pub struct Roots {
    entries: RwLock<BTreeMap<String, RootEntry>>,
    persisted: RwLock<Option<BTreeMap<String, Option<ObjectHandle>>>>,
}

impl Roots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a root. Returns the entry it replaced.
    pub fn register(&self, entry: RootEntry) -> Option<RootEntry> {
        self.entries
            .write()
            .insert(entry.identifier.clone(), entry)
    }

    pub fn register_instance(&self, identifier: impl Into<String>, instance: &ObjectRef) -> Option<RootEntry> {
        self.register(RootEntry::of_instance(identifier, ObjectRef::clone(instance)))
    }

    /// Mark a root as removed. The removal is persisted with the next store
    /// of the table. Returns `false` if there was no live entry.
    pub fn remove(&self, identifier: &str) -> bool {
        let mut entries = self.entries.write();
        match entries.get(identifier) {
            Some(entry) if !entry.is_removed() => {
                entries.insert(identifier.to_string(), RootEntry::removed(identifier));
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, identifier: &str) -> Option<ObjectRef> {
        self.entries.read().get(identifier).and_then(RootEntry::instance)
    }

    /// Every entry with its current object, in identifier order.
    pub fn resolve(&self) -> Vec<(String, Option<ObjectRef>)> {
        self.entries
            .read()
            .values()
            .map(|entry| (entry.identifier.clone(), entry.instance()))
            .collect()
    }

    pub fn entries(&self) -> Vec<RootEntry> {
        self.entries.read().values().cloned().collect()
    }

    /// Replace all entries, e.g. with the ones just loaded.
    pub fn replace_entries(&self, entries: Vec<RootEntry>) {
        let mut table = self.entries.write();
        table.clear();
        table.extend(entries.into_iter().map(|e| (e.identifier.clone(), e)));
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Whether the resolved entries differ from the last persisted ones.
    pub fn has_changed(&self) -> bool {
        match &*self.persisted.read() {
            Some(persisted) => *persisted != self.snapshot(),
            None => true,
        }
    }

    /// Remember the current resolved entries as persisted.
    pub fn mark_persisted(&self) {
        let snapshot = self.snapshot();
        *self.persisted.write() = Some(snapshot);
    }

    fn snapshot(&self) -> BTreeMap<String, Option<ObjectHandle>> {
        self.resolve()
            .into_iter()
            .map(|(identifier, instance)| (identifier, instance.map(|i| i.handle())))
            .collect()
    }
}

impl RootsView for Roots {
    fn root_reference(&self) -> Option<ObjectRef> {
        self.get(DEFAULT_ROOT)
    }

    fn iterate_entries(&self, visitor: &mut dyn FnMut(&str, Option<&ObjectRef>)) {
        for (identifier, instance) in self.resolve() {
            visitor(&identifier, instance.as_ref());
        }
    }
}

impl fmt::Debug for Roots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Roots")
            .field("entries", &self.len())
            .finish()
    }
}

/// Binds [`Roots`] as `[list] entries [ [char] identifier, keel.Object instance ]`.
///
/// Removed and empty roots are written as null references and load as
/// removed entries.
#[derive(Debug, Default)]
pub struct RootsBinding;

impl CustomBinding<Roots> for RootsBinding {
    fn members(&self) -> Vec<Member> {
        vec![Member::complex(
            "entries",
            vec![
                Member::chars("identifier"),
                Member::reference(ROOT_TYPE_NAME, "instance"),
            ],
        )]
    }

    fn store(&self, instance: &Roots, ctx: &mut dyn StoreContext) -> HandlerResult<Vec<Value>> {
        let mut rows = Vec::with_capacity(instance.len());
        for (identifier, root) in instance.resolve() {
            let object_id = match root {
                Some(root) => ctx.apply(&root)?,
                None => ObjectId::NULL,
            };
            rows.push(vec![Value::Chars(identifier), Value::Reference(object_id)]);
        }
        Ok(vec![Value::List(rows)])
    }

    fn iterate_references(&self, instance: &Roots, visitor: &mut dyn FnMut(&ObjectRef)) {
        for (_, root) in instance.resolve() {
            if let Some(root) = root {
                visitor(&root);
            }
        }
    }

    fn create(&self, _fields: &FieldValues<'_>) -> HandlerResult<Roots> {
        Ok(Roots::new())
    }

    fn update(
        &self,
        instance: &Roots,
        fields: &FieldValues<'_>,
        resolver: &dyn ObjectResolver,
    ) -> HandlerResult<()> {
        let mut entries = Vec::new();
        for row in fields.list("entries")? {
            let identifier = row
                .first()
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let object_id = row
                .get(1)
                .and_then(Value::as_reference)
                .unwrap_or(ObjectId::NULL);
            entries.push(match resolve_reference(fields.type_name(), object_id, resolver)? {
                Some(root) => RootEntry::of_instance(identifier, root),
                None => RootEntry::removed(identifier),
            });
        }
        instance.replace_entries(entries);
        instance.mark_persisted();
        Ok(())
    }
}

pub type RootsHandler = CustomHandler<Roots, RootsBinding>;

pub fn roots_handler() -> RootsHandler {
    CustomHandler::new(RuntimeType::of::<Roots>(ROOTS_TYPE_NAME), RootsBinding)
}

#[cfg(test)]
mod tests {
    use keel_ids::TransientIdProvider;
    use keel_registry::ObjectRegistry;

    use super::*;
    use crate::loader::Loader;
    use crate::object_manager::ObjectManager;
    use crate::storer::tests::{node, Fixture, Node};
    use crate::storer::{Storer, StorerMode};
    use crate::target::PersistenceSource;

    fn label(instance: &ObjectRef) -> String {
        instance.downcast_ref::<Node>().unwrap().label.clone()
    }

    // ---- Table ----

    #[test]
    fn register_resolve_and_remove() {
        let roots = Roots::new();
        let a = node("a", None);
        assert!(roots.register_instance(DEFAULT_ROOT, &a).is_none());
        roots.register(RootEntry::new("lazy", || None));
        assert!(roots.root_reference().unwrap().same_object(&a));
        assert!(roots.get("lazy").is_none());

        assert!(roots.remove(DEFAULT_ROOT));
        assert!(!roots.remove(DEFAULT_ROOT));
        assert!(!roots.remove("missing"));
        assert!(roots.root_reference().is_none());
        assert_eq!(roots.len(), 2);

        let mut seen = Vec::new();
        roots.iterate_entries(&mut |id, instance| seen.push((id.to_string(), instance.is_some())));
        assert_eq!(seen, vec![("lazy".to_string(), false), ("root".to_string(), false)]);
    }

    #[test]
    fn change_tracking_follows_resolved_identity() {
        let roots = Roots::new();
        assert!(roots.has_changed());
        let a = node("a", None);
        roots.register_instance(DEFAULT_ROOT, &a);
        roots.mark_persisted();
        assert!(!roots.has_changed());

        roots.register_instance(DEFAULT_ROOT, &a);
        assert!(!roots.has_changed());
        roots.register_instance(DEFAULT_ROOT, &node("a", None));
        assert!(roots.has_changed());
    }

    // ---- Persistence ----

    #[test]
    fn roots_round_trip_through_handler() {
        let fx = Fixture::new();
        fx.handlers.register_handler(Arc::new(roots_handler())).unwrap();
        let roots = Arc::new(Roots::new());
        let roots_ref: ObjectRef = Arc::clone(&roots) as ObjectRef;
        fx.objects.register_constant(ROOTS_OBJECT_ID, &roots_ref).unwrap();

        let tree = node("top", Some(&node("leaf", None)));
        roots.register_instance(DEFAULT_ROOT, &tree);
        roots.register_instance("gone", &node("x", None));
        roots.remove("gone");

        let mut storer = fx.storer(StorerMode::Lazy);
        assert_eq!(storer.store(&roots_ref).unwrap(), ROOTS_OBJECT_ID);
        assert_eq!(storer.commit().unwrap(), 3);

        let objects = Arc::new(ObjectManager::new(
            Arc::new(ObjectRegistry::new()),
            Box::new(TransientIdProvider::<ObjectId>::with_default_start()),
        ));
        let loaded = Arc::new(Roots::new());
        let loaded_ref: ObjectRef = Arc::clone(&loaded) as ObjectRef;
        objects.register_constant(ROOTS_OBJECT_ID, &loaded_ref).unwrap();
        let loader = Loader::new(
            Arc::clone(&fx.handlers),
            Arc::clone(&objects),
            Arc::clone(&fx.storage) as Arc<dyn PersistenceSource>,
        );
        let reloaded = loader.reload(ROOTS_OBJECT_ID).unwrap().unwrap();
        assert!(reloaded.same_object(&loaded_ref));

        let top = loaded.root_reference().unwrap();
        assert_eq!(label(&top), "top");
        assert!(loaded.entries().iter().any(|e| e.identifier() == "gone" && e.is_removed()));
        assert!(!loaded.has_changed());
    }
}
