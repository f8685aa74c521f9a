use std::collections::BTreeMap;
use std::sync::Arc;

use keel_types::TypeId;
use tracing::debug;

use crate::description::TypeDescription;
use crate::error::{DictionaryError, DictionaryResult};
use crate::lineage::TypeLineage;

/// All type lineages of one persistence domain.
///
/// The dictionary is the only place that maps type ids to descriptions. It is
/// a plain value; shared access goes through whatever lock its owner holds.
#[derive(Clone, Debug, Default)]
pub struct TypeDictionary {
    lineages: BTreeMap<String, TypeLineage>,
    by_id: BTreeMap<TypeId, Arc<TypeDescription>>,
}

impl TypeDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_descriptions<I>(descriptions: I) -> DictionaryResult<Self>
    where
        I: IntoIterator<Item = TypeDescription>,
    {
        let mut dictionary = Self::new();
        dictionary.register_descriptions(descriptions)?;
        Ok(dictionary)
    }

    /// Add a description to its lineage.
    ///
    /// Returns `false` if it was already present. Fails if its type id is
    /// bound to another type name or to a different shape.
    pub fn register_description(
        &mut self,
        description: impl Into<Arc<TypeDescription>>,
    ) -> DictionaryResult<bool> {
        let description = description.into();
        let type_id = description.type_id();
        if let Some(existing) = self.by_id.get(&type_id) {
            if existing.type_name() != description.type_name() {
                return Err(DictionaryError::TypeIdConflict {
                    type_id,
                    existing: existing.type_name().to_string(),
                    new: description.type_name().to_string(),
                });
            }
        }
        let added = self
            .ensure_lineage(description.type_name())
            .register(Arc::clone(&description))?;
        if added {
            debug!(type_id = %type_id, type_name = description.type_name(), "dictionary entry added");
            self.by_id.insert(type_id, description);
        }
        Ok(added)
    }

    pub fn register_descriptions<I>(&mut self, descriptions: I) -> DictionaryResult<usize>
    where
        I: IntoIterator<Item = TypeDescription>,
    {
        let mut added = 0;
        for description in descriptions {
            if self.register_description(description)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Register `description` and mark it as the current shape of its type.
    pub fn set_runtime_definition(
        &mut self,
        description: impl Into<Arc<TypeDescription>>,
    ) -> DictionaryResult<bool> {
        let description = description.into();
        let added = self.register_description(Arc::clone(&description))?;
        let stored = self
            .by_id
            .get(&description.type_id())
            .cloned()
            .unwrap_or(description);
        self.ensure_lineage(stored.type_name())
            .set_runtime_definition(stored)?;
        Ok(added)
    }

    pub fn lookup(&self, type_id: TypeId) -> Option<&Arc<TypeDescription>> {
        self.by_id.get(&type_id)
    }

    pub fn lineage(&self, type_name: &str) -> Option<&TypeLineage> {
        self.lineages.get(type_name)
    }

    pub fn ensure_lineage(&mut self, type_name: &str) -> &mut TypeLineage {
        self.lineages
            .entry(type_name.to_string())
            .or_insert_with(|| TypeLineage::new(type_name))
    }

    /// Lineages in type name order.
    pub fn lineages(&self) -> impl Iterator<Item = &TypeLineage> {
        self.lineages.values()
    }

    /// All descriptions in ascending type id order.
    pub fn descriptions(&self) -> impl Iterator<Item = &Arc<TypeDescription>> {
        self.by_id.values()
    }

    pub fn highest_type_id(&self) -> Option<TypeId> {
        self.by_id.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Same type ids bound to description-equal shapes.
    pub fn equals_description(&self, other: &TypeDictionary) -> bool {
        self.by_id.len() == other.by_id.len()
            && self.by_id.iter().all(|(id, d)| {
                other
                    .by_id
                    .get(id)
                    .is_some_and(|o| o.equals_description(d))
            })
    }
}
