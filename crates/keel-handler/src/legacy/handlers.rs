use std::fmt;
use std::sync::{Arc, Weak};

use keel_dictionary::{Member, TypeDescription};
use keel_types::{EntityRecord, ObjectId, ObjectRef, PrimitiveKind, RuntimeType, TypeId, Value};
use tracing::{debug, warn};

use crate::context::{ObjectResolver, StoreAndCommit, StoreContext};
use crate::enums::{NAME_MEMBER, ORDINAL_MEMBER};
use crate::error::{HandlerError, HandlerResult};
use crate::handler::{check_arity, HandlerKind, SharedHandler, TypeHandler};

/// How one current value is obtained from a legacy record.
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    /// Take the legacy value at this index as is.
    Copy(usize),
    /// Translate the legacy primitive at this index into the given kind.
    Convert(usize, PrimitiveKind),
    /// No legacy source; use this value.
    Default(Value),
}

/// How legacy records become current records.
#[derive(Clone, Debug, PartialEq)]
pub enum Translation {
    /// The legacy layout is the current one.
    Identity,
    /// One step per current instance member.
    Plan(Vec<Step>),
    /// Enum ordinals; `None` drops the instance.
    Ordinals(Vec<Option<usize>>),
}

/// Load-only handler for an older persisted shape of a type.
///
/// Records are translated into the current layout and then handed to the
/// current handler, so loaded instances are always of the current type.
pub struct LegacyTypeHandler {
    legacy: Arc<TypeDescription>,
    current: SharedHandler,
    translation: Translation,
}

impl LegacyTypeHandler {
    pub fn new(legacy: Arc<TypeDescription>, current: SharedHandler, translation: Translation) -> Self {
        Self {
            legacy,
            current,
            translation,
        }
    }

    pub fn legacy_definition(&self) -> &Arc<TypeDescription> {
        &self.legacy
    }

    pub fn current_handler(&self) -> &SharedHandler {
        &self.current
    }

    pub fn translation(&self) -> &Translation {
        &self.translation
    }

    /// The record in current layout, or `None` if the instance is dropped.
    pub fn translate(&self, record: &EntityRecord) -> HandlerResult<Option<EntityRecord>> {
        check_arity(self.legacy.type_name(), self.legacy.instance_members(), record)?;
        let type_id = self.current.type_id().unwrap_or(record.type_id);
        let values = match &self.translation {
            Translation::Identity => record.values.clone(),
            Translation::Plan(steps) => {
                let mut values = Vec::with_capacity(steps.len());
                for step in steps {
                    values.push(match step {
                        Step::Copy(from) => record.values[*from].clone(),
                        Step::Convert(from, kind) => kind.convert(&record.values[*from])?,
                        Step::Default(value) => value.clone(),
                    });
                }
                values
            }
            Translation::Ordinals(map) => match self.translate_ordinal(record, map)? {
                Some(values) => values,
                None => return Ok(None),
            },
        };
        Ok(Some(EntityRecord::new(record.object_id, type_id, values)))
    }

    fn translate_ordinal(
        &self,
        record: &EntityRecord,
        map: &[Option<usize>],
    ) -> HandlerResult<Option<Vec<Value>>> {
        let legacy_ordinal = self
            .legacy
            .instance_member_index(ORDINAL_MEMBER)
            .and_then(|i| record.values[i].as_i64())
            .ok_or_else(|| HandlerError::MissingMember {
                type_name: self.legacy.type_name().to_string(),
                member: ORDINAL_MEMBER.to_string(),
            })?;
        let current_ordinal = usize::try_from(legacy_ordinal)
            .ok()
            .and_then(|o| map.get(o))
            .ok_or_else(|| HandlerError::InvalidOrdinal {
                type_name: self.legacy.type_name().to_string(),
                ordinal: legacy_ordinal,
            })?;
        let Some(current_ordinal) = *current_ordinal else {
            debug!(
                type_name = self.legacy.type_name(),
                object_id = %record.object_id,
                ordinal = legacy_ordinal,
                "legacy enum constant dropped"
            );
            return Ok(None);
        };
        let name = self
            .current
            .all_members()
            .iter()
            .filter(|m| m.is_enum_constant())
            .nth(current_ordinal)
            .map(|m| m.name().to_string())
            .unwrap_or_default();
        let values = self
            .current
            .instance_members()
            .iter()
            .map(|m| match (m.name(), m) {
                (ORDINAL_MEMBER, _) => Value::I32(current_ordinal as i32),
                (NAME_MEMBER, _) => Value::Chars(name.clone()),
                (_, other) => default_value(other),
            })
            .collect();
        Ok(Some(values))
    }
}

/// The value an unmapped current member starts out with.
pub fn default_value(member: &Member) -> Value {
    match member {
        Member::Field(f) => match f.primitive_kind() {
            Some(kind) => kind.default_value(),
            None => Value::Reference(ObjectId::NULL),
        },
        Member::VariableLength(v) => match v.kind {
            keel_dictionary::VariableLengthKind::Bytes => Value::Bytes(Vec::new()),
            keel_dictionary::VariableLengthKind::Chars => Value::Chars(String::new()),
        },
        Member::Complex(_) => Value::List(Vec::new()),
        Member::Primitive(p) => PrimitiveKind::from_definition(&p.definition)
            .map_or(Value::Bytes(Vec::new()), PrimitiveKind::default_value),
        Member::EnumConstant(_) => Value::Reference(ObjectId::NULL),
    }
}

impl TypeHandler for LegacyTypeHandler {
    fn runtime_type(&self) -> &RuntimeType {
        self.current.runtime_type()
    }

    fn type_name(&self) -> &str {
        self.legacy.type_name()
    }

    fn type_id(&self) -> Option<TypeId> {
        Some(self.legacy.type_id())
    }

    fn initialize_type_id(&self, type_id: TypeId) -> HandlerResult<()> {
        if type_id != self.legacy.type_id() {
            return Err(HandlerError::TypeIdMismatch {
                type_name: self.legacy.type_name().to_string(),
                initialized: self.legacy.type_id(),
                new: type_id,
            });
        }
        Ok(())
    }

    fn all_members(&self) -> &[Member] {
        self.legacy.all_members()
    }

    fn instance_members(&self) -> &[Member] {
        self.legacy.instance_members()
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Legacy
    }

    fn description(&self) -> HandlerResult<TypeDescription> {
        Ok(TypeDescription::clone(&self.legacy))
    }

    fn store(
        &self,
        _instance: &ObjectRef,
        _object_id: ObjectId,
        _ctx: &mut dyn StoreContext,
    ) -> HandlerResult<EntityRecord> {
        Err(HandlerError::LegacyStore {
            type_id: self.legacy.type_id(),
            type_name: self.legacy.type_name().to_string(),
        })
    }

    fn iterate_instance_references(
        &self,
        instance: &ObjectRef,
        visitor: &mut dyn FnMut(&ObjectRef),
    ) -> HandlerResult<()> {
        self.current.iterate_instance_references(instance, visitor)
    }

    fn create(
        &self,
        record: &EntityRecord,
        resolver: &dyn ObjectResolver,
    ) -> HandlerResult<Option<ObjectRef>> {
        match self.translate(record)? {
            Some(current) => self.current.create(&current, resolver),
            None => Ok(None),
        }
    }

    fn update(
        &self,
        instance: &ObjectRef,
        record: &EntityRecord,
        resolver: &dyn ObjectResolver,
    ) -> HandlerResult<()> {
        match self.translate(record)? {
            Some(current) => self.current.update(instance, &current, resolver),
            None => Ok(()),
        }
    }

    fn complete(&self, instance: &ObjectRef, record: &EntityRecord) -> HandlerResult<()> {
        match self.translate(record)? {
            Some(current) => self.current.complete(instance, &current),
            None => Ok(()),
        }
    }

    fn enum_constants(&self) -> &[ObjectRef] {
        self.current.enum_constants()
    }
}

impl fmt::Debug for LegacyTypeHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LegacyTypeHandler")
            .field("type_id", &self.legacy.type_id().get())
            .field("type_name", &self.legacy.type_name())
            .field("current", &self.current)
            .finish()
    }
}

/// Writes migrated instances back in their current shape once loaded.
pub struct RepersistingLegacyHandler {
    inner: SharedHandler,
    target: Weak<dyn StoreAndCommit>,
}

impl RepersistingLegacyHandler {
    pub fn new(inner: SharedHandler, target: Weak<dyn StoreAndCommit>) -> Self {
        Self { inner, target }
    }

    pub fn inner(&self) -> &SharedHandler {
        &self.inner
    }
}

impl TypeHandler for RepersistingLegacyHandler {
    fn runtime_type(&self) -> &RuntimeType {
        self.inner.runtime_type()
    }

    fn type_name(&self) -> &str {
        self.inner.type_name()
    }

    fn type_id(&self) -> Option<TypeId> {
        self.inner.type_id()
    }

    fn initialize_type_id(&self, type_id: TypeId) -> HandlerResult<()> {
        self.inner.initialize_type_id(type_id)
    }

    fn all_members(&self) -> &[Member] {
        self.inner.all_members()
    }

    fn instance_members(&self) -> &[Member] {
        self.inner.instance_members()
    }

    fn kind(&self) -> HandlerKind {
        self.inner.kind()
    }

    fn description(&self) -> HandlerResult<TypeDescription> {
        self.inner.description()
    }

    fn store(
        &self,
        instance: &ObjectRef,
        object_id: ObjectId,
        ctx: &mut dyn StoreContext,
    ) -> HandlerResult<EntityRecord> {
        self.inner.store(instance, object_id, ctx)
    }

    fn iterate_instance_references(
        &self,
        instance: &ObjectRef,
        visitor: &mut dyn FnMut(&ObjectRef),
    ) -> HandlerResult<()> {
        self.inner.iterate_instance_references(instance, visitor)
    }

    fn iterate_persisted_references(&self, record: &EntityRecord, visitor: &mut dyn FnMut(ObjectId)) {
        self.inner.iterate_persisted_references(record, visitor);
    }

    fn create(
        &self,
        record: &EntityRecord,
        resolver: &dyn ObjectResolver,
    ) -> HandlerResult<Option<ObjectRef>> {
        self.inner.create(record, resolver)
    }

    fn update(
        &self,
        instance: &ObjectRef,
        record: &EntityRecord,
        resolver: &dyn ObjectResolver,
    ) -> HandlerResult<()> {
        self.inner.update(instance, record, resolver)
    }

    fn complete(&self, instance: &ObjectRef, record: &EntityRecord) -> HandlerResult<()> {
        self.inner.complete(instance, record)?;
        match self.target.upgrade() {
            Some(target) => {
                let object_id = target.store_and_commit(instance)?;
                debug!(
                    type_name = self.inner.type_name(),
                    object_id = %object_id,
                    "migrated instance re-persisted"
                );
            }
            None => warn!(
                type_name = self.inner.type_name(),
                object_id = %record.object_id,
                "no store available, migrated instance not re-persisted"
            ),
        }
        Ok(())
    }

    fn enum_constants(&self) -> &[ObjectRef] {
        self.inner.enum_constants()
    }
}

impl fmt::Debug for RepersistingLegacyHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepersistingLegacyHandler")
            .field("inner", &self.inner)
            .finish()
    }
}
