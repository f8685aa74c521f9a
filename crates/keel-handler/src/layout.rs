//! Reflective handlers built from an explicit per-type field layout.
//!
//! An [`EntityLayout`] lists a type's persisted fields in record order, each
//! with a typed getter. Value fields are handed to an instantiator when an
//! instance is created; reference fields also carry a setter and are resolved
//! in the update phase, once every instance of a load exists.
//!
//! ```ignore
//! struct Person { name: String, age: i32, friend: Link }
//!
//! let layout = EntityLayout::new("app.Person", |f| {
//!     Ok(Person { name: f.string("name")?, age: f.get("age")?, friend: Link::empty() })
//! })
//! .chars("name", |p: &Person| p.name.clone())
//! .primitive("age", |p: &Person| p.age)
//! .link("friend", "app.Person", |p: &Person| &p.friend);
//! ```

use std::fmt;
use std::sync::Arc;

use keel_dictionary::Member;
use keel_types::{EntityRecord, ObjectId, ObjectRef, Primitive, RuntimeType, TypeId, Value};

use crate::context::{Link, ObjectResolver, StoreContext};
use crate::error::{HandlerError, HandlerResult};
use crate::handler::{
    check_arity, downcast, resolve_reference, FieldValues, HandlerKind, TypeHandler, TypeIdCell,
};

type Instantiate<T> = Box<dyn Fn(&FieldValues<'_>) -> HandlerResult<T> + Send + Sync>;
type ValueGetter<T> = Box<dyn Fn(&T) -> Value + Send + Sync>;
type ReferenceGetter<T> = Box<dyn Fn(&T) -> Option<ObjectRef> + Send + Sync>;
type ReferenceSetter<T> = Box<dyn Fn(&T, Option<ObjectRef>) + Send + Sync>;

enum Field<T> {
    Value(ValueGetter<T>),
    Reference {
        get: ReferenceGetter<T>,
        set: ReferenceSetter<T>,
    },
}

/// Reflective type handler for `T`.
///
/// Member names of the form `qualifier#name` declare fields inherited from a
/// supertype.
pub struct EntityLayout<T> {
    runtime_type: RuntimeType,
    type_id: TypeIdCell,
    members: Vec<Member>,
    fields: Vec<Field<T>>,
    instantiate: Instantiate<T>,
}

impl<T: Send + Sync + 'static> EntityLayout<T> {
    pub fn new(
        type_name: impl Into<String>,
        instantiate: impl Fn(&FieldValues<'_>) -> HandlerResult<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            runtime_type: RuntimeType::of::<T>(type_name),
            type_id: TypeIdCell::new(),
            members: Vec::new(),
            fields: Vec::new(),
            instantiate: Box::new(instantiate),
        }
    }

    pub fn extending(mut self, super_type: RuntimeType) -> Self {
        self.runtime_type = self.runtime_type.extending(super_type);
        self
    }

    pub fn primitive<P: Primitive>(
        self,
        name: &str,
        get: impl Fn(&T) -> P + Send + Sync + 'static,
    ) -> Self {
        let member = qualify(Member::primitive(P::KIND, simple_name(name)), name);
        self.value_field(member, Box::new(move |t| get(t).into_value()))
    }

    pub fn chars(self, name: &str, get: impl Fn(&T) -> String + Send + Sync + 'static) -> Self {
        let member = qualify(Member::chars(simple_name(name)), name);
        self.value_field(member, Box::new(move |t| Value::Chars(get(t))))
    }

    pub fn bytes(self, name: &str, get: impl Fn(&T) -> Vec<u8> + Send + Sync + 'static) -> Self {
        let member = qualify(Member::bytes(simple_name(name)), name);
        self.value_field(member, Box::new(move |t| Value::Bytes(get(t))))
    }

    pub fn reference(
        mut self,
        name: &str,
        type_name: &str,
        get: impl Fn(&T) -> Option<ObjectRef> + Send + Sync + 'static,
        set: impl Fn(&T, Option<ObjectRef>) + Send + Sync + 'static,
    ) -> Self {
        self.members
            .push(qualify(Member::reference(type_name, simple_name(name)), name));
        self.fields.push(Field::Reference {
            get: Box::new(get),
            set: Box::new(set),
        });
        self
    }

    /// A reference field stored in a [`Link`].
    pub fn link(self, name: &str, type_name: &str, field: fn(&T) -> &Link) -> Self {
        self.reference(
            name,
            type_name,
            move |t| field(t).get(),
            move |t, target| field(t).set(target),
        )
    }

    /// Wrap the layout for registration.
    pub fn shared(self) -> Arc<dyn TypeHandler> {
        Arc::new(self)
    }

    fn value_field(mut self, member: Member, get: ValueGetter<T>) -> Self {
        self.members.push(member);
        self.fields.push(Field::Value(get));
        self
    }

    fn reference_at(&self, record: &EntityRecord, index: usize) -> HandlerResult<ObjectId> {
        record.values[index]
            .as_reference()
            .ok_or_else(|| HandlerError::ValueMismatch {
                type_name: self.runtime_type.name().to_string(),
                member: self.members[index].identifier(),
                expected: "reference".to_string(),
                actual: record.values[index].variant_name(),
            })
    }
}

fn simple_name(name: &str) -> &str {
    name.rsplit_once('#').map_or(name, |(_, n)| n)
}

fn qualify(member: Member, name: &str) -> Member {
    match name.rsplit_once('#') {
        Some((qualifier, _)) => member.qualified(qualifier),
        None => member,
    }
}

impl<T: Send + Sync + 'static> TypeHandler for EntityLayout<T> {
    fn runtime_type(&self) -> &RuntimeType {
        &self.runtime_type
    }

    fn type_id(&self) -> Option<TypeId> {
        self.type_id.get()
    }

    fn initialize_type_id(&self, type_id: TypeId) -> HandlerResult<()> {
        self.type_id.initialize(self.runtime_type.name(), type_id)
    }

    fn all_members(&self) -> &[Member] {
        &self.members
    }

    fn instance_members(&self) -> &[Member] {
        &self.members
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Reflective
    }

    fn store(
        &self,
        instance: &ObjectRef,
        object_id: ObjectId,
        ctx: &mut dyn StoreContext,
    ) -> HandlerResult<EntityRecord> {
        let type_id = self.type_id.require(self.runtime_type.name())?;
        let typed = downcast::<T>(&self.runtime_type, instance)?;
        let mut values = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            values.push(match field {
                Field::Value(get) => get(typed),
                Field::Reference { get, .. } => match get(typed) {
                    Some(target) => Value::Reference(ctx.apply(&target)?),
                    None => Value::Reference(ObjectId::NULL),
                },
            });
        }
        Ok(EntityRecord::new(object_id, type_id, values))
    }

    fn iterate_instance_references(
        &self,
        instance: &ObjectRef,
        visitor: &mut dyn FnMut(&ObjectRef),
    ) -> HandlerResult<()> {
        let typed = downcast::<T>(&self.runtime_type, instance)?;
        for field in &self.fields {
            if let Field::Reference { get, .. } = field {
                if let Some(target) = get(typed) {
                    visitor(&target);
                }
            }
        }
        Ok(())
    }

    fn create(
        &self,
        record: &EntityRecord,
        _resolver: &dyn ObjectResolver,
    ) -> HandlerResult<Option<ObjectRef>> {
        check_arity(self.runtime_type.name(), &self.members, record)?;
        let fields = FieldValues::new(self.runtime_type.name(), &self.members, &record.values);
        let instance: ObjectRef = Arc::new((self.instantiate)(&fields)?);
        Ok(Some(instance))
    }

    fn update(
        &self,
        instance: &ObjectRef,
        record: &EntityRecord,
        resolver: &dyn ObjectResolver,
    ) -> HandlerResult<()> {
        check_arity(self.runtime_type.name(), &self.members, record)?;
        let typed = downcast::<T>(&self.runtime_type, instance)?;
        for (index, field) in self.fields.iter().enumerate() {
            if let Field::Reference { set, .. } = field {
                let object_id = self.reference_at(record, index)?;
                set(typed, resolve_reference(self.runtime_type.name(), object_id, resolver)?);
            }
        }
        Ok(())
    }
}

impl<T> fmt::Debug for EntityLayout<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityLayout")
            .field("type_name", &self.runtime_type.name())
            .field("type_id", &self.type_id.get())
            .field("members", &self.members.len())
            .finish()
    }
}
