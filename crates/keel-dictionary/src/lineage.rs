use std::collections::BTreeMap;
use std::sync::Arc;

use keel_types::TypeId;

use crate::description::TypeDescription;
use crate::error::{DictionaryError, DictionaryResult};
use crate::member::{equal_descriptions, Member};

/// Every persisted shape a type has had, plus its current runtime shape.
///
/// Entries are only ever appended.
#[derive(Clone, Debug)]
pub struct TypeLineage {
    type_name: String,
    entries: BTreeMap<TypeId, Arc<TypeDescription>>,
    runtime_definition: Option<Arc<TypeDescription>>,
}

impl TypeLineage {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            entries: BTreeMap::new(),
            runtime_definition: None,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Add a historical shape.
    ///
    /// Returns `false` if the same type id is already present with a
    /// description-equal shape.
    pub fn register(&mut self, description: Arc<TypeDescription>) -> DictionaryResult<bool> {
        if description.type_name() != self.type_name {
            return Err(DictionaryError::LineageMismatch {
                lineage: self.type_name.clone(),
                type_name: description.type_name().to_string(),
            });
        }
        if let Some(existing) = self.entries.get(&description.type_id()) {
            if existing.equals_description(&description) {
                return Ok(false);
            }
            return Err(DictionaryError::DescriptionConflict {
                type_id: description.type_id(),
                type_name: self.type_name.clone(),
            });
        }
        self.entries.insert(description.type_id(), description);
        Ok(true)
    }

    /// Set the current runtime shape, registering it as an entry as well.
    pub fn set_runtime_definition(
        &mut self,
        description: Arc<TypeDescription>,
    ) -> DictionaryResult<()> {
        self.register(Arc::clone(&description))?;
        self.runtime_definition = Some(description);
        Ok(())
    }

    pub fn runtime_definition(&self) -> Option<&Arc<TypeDescription>> {
        self.runtime_definition.as_ref()
    }

    /// The entry with the highest type id.
    pub fn latest(&self) -> Option<&Arc<TypeDescription>> {
        self.entries.values().next_back()
    }

    pub fn lookup(&self, type_id: TypeId) -> Option<&Arc<TypeDescription>> {
        self.entries.get(&type_id)
    }

    /// The most recent entry whose members are description-equal to `members`.
    pub fn find_description_equal(&self, members: &[Member]) -> Option<&Arc<TypeDescription>> {
        self.entries
            .values()
            .rev()
            .find(|d| equal_descriptions(d.all_members(), members))
    }

    /// Whether `type_id` is the current runtime shape.
    pub fn is_runtime(&self, type_id: TypeId) -> bool {
        self.runtime_definition
            .as_ref()
            .is_some_and(|d| d.type_id() == type_id)
    }

    /// Entries in ascending type id order.
    pub fn entries(&self) -> impl Iterator<Item = &Arc<TypeDescription>> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use keel_types::PrimitiveKind;

    use super::*;

    fn shape(id: u64, members: Vec<Member>) -> Arc<TypeDescription> {
        Arc::new(TypeDescription::new(TypeId::new(id), "app.Item", members).unwrap())
    }

    #[test]
    fn latest_is_highest_type_id() {
        let mut lineage = TypeLineage::new("app.Item");
        lineage
            .register(shape(20, vec![Member::chars("label")]))
            .unwrap();
        lineage
            .register(shape(10, vec![Member::primitive(PrimitiveKind::I32, "n")]))
            .unwrap();
        assert_eq!(lineage.latest().unwrap().type_id(), TypeId::new(20));
        assert_eq!(lineage.len(), 2);
    }

    #[test]
    fn re_registering_equal_entry_is_no_op() {
        let mut lineage = TypeLineage::new("app.Item");
        assert!(lineage.register(shape(1, vec![Member::chars("a")])).unwrap());
        assert!(!lineage.register(shape(1, vec![Member::chars("a")])).unwrap());
        let err = lineage
            .register(shape(1, vec![Member::chars("b")]))
            .unwrap_err();
        assert!(matches!(err, DictionaryError::DescriptionConflict { .. }));
    }

    #[test]
    fn foreign_type_name_is_rejected() {
        let mut lineage = TypeLineage::new("app.Other");
        let err = lineage.register(shape(1, vec![])).unwrap_err();
        assert!(matches!(err, DictionaryError::LineageMismatch { .. }));
    }

    #[test]
    fn runtime_definition_and_lookup_by_members() {
        let mut lineage = TypeLineage::new("app.Item");
        lineage.register(shape(1, vec![Member::chars("a")])).unwrap();
        lineage
            .set_runtime_definition(shape(2, vec![Member::chars("a"), Member::chars("b")]))
            .unwrap();
        assert!(lineage.is_runtime(TypeId::new(2)));
        assert!(!lineage.is_runtime(TypeId::new(1)));
        let found = lineage
            .find_description_equal(&[Member::chars("a")])
            .unwrap();
        assert_eq!(found.type_id(), TypeId::new(1));
        assert!(lineage.find_description_equal(&[]).is_none());
    }
}
