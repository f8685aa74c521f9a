//! Hand-written handlers.
//!
//! A [`CustomBinding`] maps one Rust type onto its members by hand, for types
//! whose persisted shape is not a plain list of fields. [`CustomHandler`]
//! turns a binding into a [`TypeHandler`].

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use keel_dictionary::Member;
use keel_types::{EntityRecord, ObjectId, ObjectRef, RuntimeType, TypeId, Value, ROOT_TYPE_NAME};
use parking_lot::RwLock;

use crate::context::{ObjectResolver, StoreContext};
use crate::error::HandlerResult;
use crate::handler::{
    check_arity, downcast, resolve_reference, FieldValues, HandlerKind, TypeHandler, TypeIdCell,
};

/// Persisted type name of string value objects.
pub const STRING_TYPE_NAME: &str = "keel.String";

/// Persisted type name of [`ReferenceArray`].
pub const REFERENCE_ARRAY_TYPE_NAME: &str = "keel.ReferenceArray";

/// Per-type store and load logic for a [`CustomHandler`].
pub trait CustomBinding<T>: Send + Sync + 'static {
    /// The members, in record order.
    fn members(&self) -> Vec<Member>;

    /// One value per member. Every reference goes through `ctx.apply`.
    fn store(&self, instance: &T, ctx: &mut dyn StoreContext) -> HandlerResult<Vec<Value>>;

    fn iterate_references(&self, _instance: &T, _visitor: &mut dyn FnMut(&ObjectRef)) {}

    /// Build an instance from its own values. References are left unresolved.
    fn create(&self, fields: &FieldValues<'_>) -> HandlerResult<T>;

    /// Resolve references.
    fn update(
        &self,
        _instance: &T,
        _fields: &FieldValues<'_>,
        _resolver: &dyn ObjectResolver,
    ) -> HandlerResult<()> {
        Ok(())
    }

    fn complete(&self, _instance: &T) -> HandlerResult<()> {
        Ok(())
    }
}

/// A [`TypeHandler`] driven by a [`CustomBinding`].
pub struct CustomHandler<T, B> {
    runtime_type: RuntimeType,
    type_id: TypeIdCell,
    members: Vec<Member>,
    binding: B,
    _instance: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static, B: CustomBinding<T>> CustomHandler<T, B> {
    pub fn new(runtime_type: RuntimeType, binding: B) -> Self {
        Self {
            runtime_type,
            type_id: TypeIdCell::new(),
            members: binding.members(),
            binding,
            _instance: PhantomData,
        }
    }

    pub fn binding(&self) -> &B {
        &self.binding
    }

    fn fields<'a>(&'a self, record: &'a EntityRecord) -> HandlerResult<FieldValues<'a>> {
        check_arity(self.runtime_type.name(), &self.members, record)?;
        Ok(FieldValues::new(self.runtime_type.name(), &self.members, &record.values))
    }
}

impl<T: Send + Sync + 'static, B: CustomBinding<T>> TypeHandler for CustomHandler<T, B> {
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
        HandlerKind::Custom
    }

    fn store(
        &self,
        instance: &ObjectRef,
        object_id: ObjectId,
        ctx: &mut dyn StoreContext,
    ) -> HandlerResult<EntityRecord> {
        let type_id = self.type_id.require(self.runtime_type.name())?;
        let typed = downcast::<T>(&self.runtime_type, instance)?;
        let values = self.binding.store(typed, ctx)?;
        let record = EntityRecord::new(object_id, type_id, values);
        check_arity(self.runtime_type.name(), &self.members, &record)?;
        Ok(record)
    }

    fn iterate_instance_references(
        &self,
        instance: &ObjectRef,
        visitor: &mut dyn FnMut(&ObjectRef),
    ) -> HandlerResult<()> {
        let typed = downcast::<T>(&self.runtime_type, instance)?;
        self.binding.iterate_references(typed, visitor);
        Ok(())
    }

    fn create(
        &self,
        record: &EntityRecord,
        _resolver: &dyn ObjectResolver,
    ) -> HandlerResult<Option<ObjectRef>> {
        let fields = self.fields(record)?;
        let instance: ObjectRef = Arc::new(self.binding.create(&fields)?);
        Ok(Some(instance))
    }

    fn update(
        &self,
        instance: &ObjectRef,
        record: &EntityRecord,
        resolver: &dyn ObjectResolver,
    ) -> HandlerResult<()> {
        let typed = downcast::<T>(&self.runtime_type, instance)?;
        let fields = self.fields(record)?;
        self.binding.update(typed, &fields, resolver)
    }

    fn complete(&self, instance: &ObjectRef, _record: &EntityRecord) -> HandlerResult<()> {
        let typed = downcast::<T>(&self.runtime_type, instance)?;
        self.binding.complete(typed)
    }
}

impl<T, B> fmt::Debug for CustomHandler<T, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomHandler")
            .field("type_name", &self.runtime_type.name())
            .field("type_id", &self.type_id.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Strings
// ---------------------------------------------------------------------------

/// Binds `String` value objects as `[char] value`.
#[derive(Debug, Default)]
pub struct StringBinding;

impl CustomBinding<String> for StringBinding {
    fn members(&self) -> Vec<Member> {
        vec![Member::chars("value")]
    }

    fn store(&self, instance: &String, _ctx: &mut dyn StoreContext) -> HandlerResult<Vec<Value>> {
        Ok(vec![Value::Chars(instance.clone())])
    }

    fn create(&self, fields: &FieldValues<'_>) -> HandlerResult<String> {
        fields.string("value")
    }
}

pub type StringHandler = CustomHandler<String, StringBinding>;

pub fn string_handler() -> StringHandler {
    CustomHandler::new(RuntimeType::of::<String>(STRING_TYPE_NAME), StringBinding)
}

// ---------------------------------------------------------------------------
// Reference arrays
// ---------------------------------------------------------------------------

/// A fixed-length array of references that can be filled in after creation.
#[derive(Default)]
pub struct ReferenceArray(RwLock<Vec<Option<ObjectRef>>>);

impl ReferenceArray {
    pub fn new(elements: Vec<Option<ObjectRef>>) -> Self {
        Self(RwLock::new(elements))
    }

    /// An array of `len` empty slots.
    pub fn with_len(len: usize) -> Self {
        Self::new(vec![None; len])
    }

    pub fn of(elements: &[ObjectRef]) -> Self {
        Self::new(elements.iter().cloned().map(Some).collect())
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<ObjectRef> {
        self.0.read().get(index).cloned().flatten()
    }

    /// Set slot `index`. Returns `false` if it is out of bounds.
    pub fn set(&self, index: usize, element: Option<ObjectRef>) -> bool {
        match self.0.write().get_mut(index) {
            Some(slot) => {
                *slot = element;
                true
            }
            None => false,
        }
    }

    pub fn to_vec(&self) -> Vec<Option<ObjectRef>> {
        self.0.read().clone()
    }
}

impl fmt::Debug for ReferenceArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elements = self.0.read();
        f.debug_struct("ReferenceArray")
            .field("len", &elements.len())
            .field("set", &elements.iter().filter(|e| e.is_some()).count())
            .finish()
    }
}

/// Binds [`ReferenceArray`] as `[list] elements [ keel.Object element ]`.
#[derive(Debug, Default)]
pub struct ReferenceArrayBinding;

impl CustomBinding<ReferenceArray> for ReferenceArrayBinding {
    fn members(&self) -> Vec<Member> {
        vec![Member::complex(
            "elements",
            vec![Member::reference(ROOT_TYPE_NAME, "element")],
        )]
    }

    fn store(
        &self,
        instance: &ReferenceArray,
        ctx: &mut dyn StoreContext,
    ) -> HandlerResult<Vec<Value>> {
        let mut rows = Vec::with_capacity(instance.len());
        for element in instance.to_vec() {
            let object_id = match element {
                Some(target) => ctx.apply(&target)?,
                None => ObjectId::NULL,
            };
            rows.push(vec![Value::Reference(object_id)]);
        }
        Ok(vec![Value::List(rows)])
    }

    fn iterate_references(&self, instance: &ReferenceArray, visitor: &mut dyn FnMut(&ObjectRef)) {
        for element in instance.to_vec().into_iter().flatten() {
            visitor(&element);
        }
    }

    fn create(&self, fields: &FieldValues<'_>) -> HandlerResult<ReferenceArray> {
        Ok(ReferenceArray::with_len(fields.list("elements")?.len()))
    }

    fn update(
        &self,
        instance: &ReferenceArray,
        fields: &FieldValues<'_>,
        resolver: &dyn ObjectResolver,
    ) -> HandlerResult<()> {
        let rows = fields.list("elements")?;
        for (index, row) in rows.iter().enumerate() {
            let object_id = row
                .first()
                .and_then(Value::as_reference)
                .unwrap_or(ObjectId::NULL);
            instance.set(index, resolve_reference(fields.type_name(), object_id, resolver)?);
        }
        Ok(())
    }
}

pub type ReferenceArrayHandler = CustomHandler<ReferenceArray, ReferenceArrayBinding>;

pub fn reference_array_handler() -> ReferenceArrayHandler {
    CustomHandler::new(
        RuntimeType::of::<ReferenceArray>(REFERENCE_ARRAY_TYPE_NAME),
        ReferenceArrayBinding,
    )
}
