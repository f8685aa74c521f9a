use std::fmt;
use std::sync::{Arc, OnceLock};

use keel_dictionary::{Member, TypeDescription};
use keel_types::{EntityRecord, ObjectId, ObjectRef, ObjectRefExt, Primitive, RuntimeType, TypeId, Value};
use serde::Serialize;

use crate::context::{ObjectResolver, StoreContext};
use crate::error::{HandlerError, HandlerResult};

/// How a handler came to be.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum HandlerKind {
    /// Built from an explicit per-field layout.
    Reflective,
    /// Hand-written binding.
    Custom,
    /// One singleton instance per constant.
    Enum,
    /// Load-only adapter for an older persisted shape.
    Legacy,
}

/// Per-type strategy for turning instances into records and back.
///
/// One handler exists per type and persistence context, shared by every
/// storer and loader of that context. Apart from the type id, which is set
/// once when the type is first registered, handlers are immutable.
///
/// Loading is two-phase: [`create`](Self::create) builds instances from
/// their own values, [`update`](Self::update) then resolves references once
/// every instance of the load exists, and [`complete`](Self::complete) runs
/// last.
pub trait TypeHandler: Send + Sync + fmt::Debug {
    fn runtime_type(&self) -> &RuntimeType;

    /// The persisted type name. Legacy handlers report the legacy name.
    fn type_name(&self) -> &str {
        self.runtime_type().name()
    }

    /// The type id, once initialized.
    fn type_id(&self) -> Option<TypeId>;

    /// Set the type id. Setting the same id again is a no-op; a different id
    /// is a consistency error.
    fn initialize_type_id(&self, type_id: TypeId) -> HandlerResult<()>;

    /// Every member, enum constants included.
    fn all_members(&self) -> &[Member];

    /// The members that make up a record, in record order.
    fn instance_members(&self) -> &[Member];

    fn kind(&self) -> HandlerKind;

    /// The description under the initialized type id.
    fn description(&self) -> HandlerResult<TypeDescription> {
        let type_id = self
            .type_id()
            .ok_or_else(|| HandlerError::TypeIdNotInitialized {
                type_name: self.type_name().to_string(),
            })?;
        Ok(TypeDescription::new(
            type_id,
            self.type_name(),
            self.all_members().to_vec(),
        )?)
    }

    /// The record form of `instance`. Every reference is passed through
    /// `ctx.apply`.
    fn store(
        &self,
        instance: &ObjectRef,
        object_id: ObjectId,
        ctx: &mut dyn StoreContext,
    ) -> HandlerResult<EntityRecord>;

    /// Visit every object `instance` references.
    fn iterate_instance_references(
        &self,
        instance: &ObjectRef,
        visitor: &mut dyn FnMut(&ObjectRef),
    ) -> HandlerResult<()>;

    /// Visit every non-null object id a record references.
    fn iterate_persisted_references(&self, record: &EntityRecord, visitor: &mut dyn FnMut(ObjectId)) {
        record.for_each_reference(visitor);
    }

    /// Build an instance from a record. `None` means the instance is dropped.
    fn create(
        &self,
        record: &EntityRecord,
        resolver: &dyn ObjectResolver,
    ) -> HandlerResult<Option<ObjectRef>>;

    /// Resolve the references of an instance built by [`create`](Self::create).
    fn update(
        &self,
        instance: &ObjectRef,
        record: &EntityRecord,
        resolver: &dyn ObjectResolver,
    ) -> HandlerResult<()>;

    /// Final step of loading an instance, after all updates.
    fn complete(&self, _instance: &ObjectRef, _record: &EntityRecord) -> HandlerResult<()> {
        Ok(())
    }

    /// Singleton instances of an enum type, in ordinal order.
    fn enum_constants(&self) -> &[ObjectRef] {
        &[]
    }
}

/// A shared handler.
pub type SharedHandler = Arc<dyn TypeHandler>;

/// A handler's lazily initialized type id.
#[derive(Debug, Default)]
pub struct TypeIdCell(OnceLock<TypeId>);

impl TypeIdCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<TypeId> {
        self.0.get().copied()
    }

    pub fn initialize(&self, type_name: &str, type_id: TypeId) -> HandlerResult<()> {
        let initialized = *self.0.get_or_init(|| type_id);
        if initialized != type_id {
            return Err(HandlerError::TypeIdMismatch {
                type_name: type_name.to_string(),
                initialized,
                new: type_id,
            });
        }
        Ok(())
    }

    pub(crate) fn require(&self, type_name: &str) -> HandlerResult<TypeId> {
        self.get().ok_or_else(|| HandlerError::TypeIdNotInitialized {
            type_name: type_name.to_string(),
        })
    }
}

/// Check that a record has one value per instance member.
pub fn check_arity(type_name: &str, members: &[Member], record: &EntityRecord) -> HandlerResult<()> {
    if members.len() != record.values.len() {
        return Err(HandlerError::RecordMismatch {
            type_name: type_name.to_string(),
            expected: members.len(),
            actual: record.values.len(),
        });
    }
    Ok(())
}

/// Downcast an instance to the type a handler is bound to.
pub fn downcast<'a, T: 'static>(handler_type: &RuntimeType, instance: &'a ObjectRef) -> HandlerResult<&'a T> {
    instance
        .downcast_ref::<T>()
        .ok_or_else(|| HandlerError::WrongInstanceType {
            expected: handler_type.name().to_string(),
            actual: instance.entity_type_name(),
        })
}

/// Named access to the values of a record.
///
/// Members are found by identifier (`qualifier#name`) first, then by simple
/// name.
#[derive(Clone, Copy)]
pub struct FieldValues<'a> {
    type_name: &'a str,
    members: &'a [Member],
    values: &'a [Value],
}

impl<'a> FieldValues<'a> {
    pub fn new(type_name: &'a str, members: &'a [Member], values: &'a [Value]) -> Self {
        Self {
            type_name,
            members,
            values,
        }
    }

    pub fn type_name(&self) -> &'a str {
        self.type_name
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.members
            .iter()
            .position(|m| m.identifier() == name)
            .or_else(|| self.members.iter().position(|m| m.name() == name))
    }

    pub fn value(&self, name: &str) -> HandlerResult<&'a Value> {
        self.index_of(name)
            .and_then(|i| self.values.get(i))
            .ok_or_else(|| HandlerError::MissingMember {
                type_name: self.type_name.to_string(),
                member: name.to_string(),
            })
    }

    pub fn get<P: Primitive>(&self, name: &str) -> HandlerResult<P> {
        let value = self.value(name)?;
        P::from_value(value).ok_or_else(|| self.mismatch(name, P::KIND.name(), value))
    }

    pub fn string(&self, name: &str) -> HandlerResult<String> {
        let value = self.value(name)?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.mismatch(name, "[char]", value))
    }

    pub fn bytes(&self, name: &str) -> HandlerResult<Vec<u8>> {
        let value = self.value(name)?;
        value
            .as_bytes()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| self.mismatch(name, "[byte]", value))
    }

    pub fn reference(&self, name: &str) -> HandlerResult<ObjectId> {
        let value = self.value(name)?;
        value
            .as_reference()
            .ok_or_else(|| self.mismatch(name, "reference", value))
    }

    pub fn list(&self, name: &str) -> HandlerResult<&'a [Vec<Value>]> {
        let value = self.value(name)?;
        value
            .as_list()
            .ok_or_else(|| self.mismatch(name, "[list]", value))
    }

    fn mismatch(&self, name: &str, expected: &str, value: &Value) -> HandlerError {
        HandlerError::ValueMismatch {
            type_name: self.type_name.to_string(),
            member: name.to_string(),
            expected: expected.to_string(),
            actual: value.variant_name(),
        }
    }
}

/// Resolve a persisted reference. Null resolves to `None`.
pub fn resolve_reference(
    type_name: &str,
    object_id: ObjectId,
    resolver: &dyn ObjectResolver,
) -> HandlerResult<Option<ObjectRef>> {
    if object_id.is_null() {
        return Ok(None);
    }
    resolver
        .lookup_object(object_id)
        .map(Some)
        .ok_or_else(|| HandlerError::UnknownObjectId {
            type_name: type_name.to_string(),
            object_id,
        })
}
