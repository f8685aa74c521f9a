//! Enum handlers.
//!
//! Every constant of a persistent enum is a singleton: loading a record
//! yields the one shared instance for its ordinal, never a copy.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use keel_dictionary::Member;
use keel_types::{
    EntityRecord, ObjectId, ObjectRef, ObjectRefExt, PrimitiveKind, RuntimeType, TypeId, Value,
};

use crate::context::{ObjectResolver, StoreContext};
use crate::error::{HandlerError, HandlerResult};
use crate::handler::{check_arity, downcast, FieldValues, HandlerKind, TypeHandler, TypeIdCell};

pub const ORDINAL_MEMBER: &str = "ordinal";
pub const NAME_MEMBER: &str = "name";

/// A Rust enum persisted as singleton constants.
pub trait PersistentEnum: Sized + Send + Sync + 'static {
    /// Every constant, in ordinal order.
    fn constants() -> Vec<Self>;

    fn ordinal(&self) -> usize;

    fn name(&self) -> &str;
}

/// Handler for a [`PersistentEnum`].
///
/// Members are the enum constants followed by `i32 ordinal` and
/// `[char] name`.
pub struct EnumHandler<E> {
    runtime_type: RuntimeType,
    type_id: TypeIdCell,
    all_members: Vec<Member>,
    instance_members: Vec<Member>,
    constants: Vec<ObjectRef>,
    _enum: PhantomData<fn() -> E>,
}

impl<E: PersistentEnum> EnumHandler<E> {
    pub fn new(type_name: impl Into<String>) -> Self {
        let values = E::constants();
        let instance_members = vec![
            Member::primitive(PrimitiveKind::I32, ORDINAL_MEMBER),
            Member::chars(NAME_MEMBER),
        ];
        let mut all_members: Vec<Member> = values
            .iter()
            .map(|c| Member::enum_constant(c.name()))
            .collect();
        all_members.extend(instance_members.iter().cloned());
        let constants = values
            .into_iter()
            .map(|c| -> ObjectRef { Arc::new(c) })
            .collect();
        Self {
            runtime_type: RuntimeType::of::<E>(type_name),
            type_id: TypeIdCell::new(),
            all_members,
            instance_members,
            constants,
            _enum: PhantomData,
        }
    }

    /// The singleton for `ordinal`.
    pub fn constant(&self, ordinal: usize) -> Option<&ObjectRef> {
        self.constants.get(ordinal)
    }

    /// The singleton equal in ordinal to `value`.
    pub fn constant_of(&self, value: &E) -> Option<&ObjectRef> {
        self.constant(value.ordinal())
    }

    fn invalid_ordinal(&self, ordinal: i64) -> HandlerError {
        HandlerError::InvalidOrdinal {
            type_name: self.runtime_type.name().to_string(),
            ordinal,
        }
    }
}

impl<E: PersistentEnum> TypeHandler for EnumHandler<E> {
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
        &self.all_members
    }

    fn instance_members(&self) -> &[Member] {
        &self.instance_members
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Enum
    }

    fn store(
        &self,
        instance: &ObjectRef,
        object_id: ObjectId,
        _ctx: &mut dyn StoreContext,
    ) -> HandlerResult<EntityRecord> {
        let type_id = self.type_id.require(self.runtime_type.name())?;
        let typed = downcast::<E>(&self.runtime_type, instance)?;
        let ordinal = i32::try_from(typed.ordinal())
            .map_err(|_| self.invalid_ordinal(typed.ordinal() as i64))?;
        Ok(EntityRecord::new(
            object_id,
            type_id,
            vec![Value::I32(ordinal), Value::Chars(typed.name().to_string())],
        ))
    }

    fn iterate_instance_references(
        &self,
        instance: &ObjectRef,
        _visitor: &mut dyn FnMut(&ObjectRef),
    ) -> HandlerResult<()> {
        downcast::<E>(&self.runtime_type, instance)?;
        Ok(())
    }

    fn create(
        &self,
        record: &EntityRecord,
        _resolver: &dyn ObjectResolver,
    ) -> HandlerResult<Option<ObjectRef>> {
        check_arity(self.runtime_type.name(), &self.instance_members, record)?;
        let fields = FieldValues::new(
            self.runtime_type.name(),
            &self.instance_members,
            &record.values,
        );
        let ordinal = fields.get::<i32>(ORDINAL_MEMBER)?;
        let constant = usize::try_from(ordinal)
            .ok()
            .and_then(|o| self.constant(o))
            .ok_or_else(|| self.invalid_ordinal(i64::from(ordinal)))?;
        Ok(Some(Arc::clone(constant)))
    }

    fn update(
        &self,
        _instance: &ObjectRef,
        _record: &EntityRecord,
        _resolver: &dyn ObjectResolver,
    ) -> HandlerResult<()> {
        Ok(())
    }

    fn enum_constants(&self) -> &[ObjectRef] {
        &self.constants
    }
}

impl<E> fmt::Debug for EnumHandler<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnumHandler")
            .field("type_name", &self.runtime_type.name())
            .field("type_id", &self.type_id.get())
            .field("constants", &self.constants.len())
            .finish()
    }
}

/// Whether `instance` is one of `handler`'s singletons.
pub fn is_enum_singleton(handler: &dyn TypeHandler, instance: &ObjectRef) -> bool {
    handler
        .enum_constants()
        .iter()
        .any(|c| c.same_object(instance))
}
