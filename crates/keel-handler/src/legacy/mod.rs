//! Schema evolution.
//!
//! When a persisted type id names a shape that is no longer the current
//! shape of its type, records of that id are loaded through a legacy handler.
//! The [`LegacyTypeHandlerCreator`] relates the legacy members to the current
//! ones ([`MemberMatcher`], guided by a [`RefactoringMapping`]) and builds a
//! load-only handler that translates each record into the current layout.

pub mod creator;
pub mod handlers;
pub mod mapping;
pub mod matcher;
pub mod result;

use serde::{Deserialize, Serialize};

pub use creator::{
    build_plan, CustomDeriver, LegacyHandlerDeriver, LegacyTypeHandlerCreator, ReflectiveDeriver,
};
pub use handlers::{LegacyTypeHandler, RepersistingLegacyHandler, Step, Translation};
pub use mapping::RefactoringMapping;
pub use matcher::{MatcherConfig, MemberMatcher, MemberMatches, Similarity};
pub use result::{LegacyTypeMappingResult, MemberMatch};

/// What happens to a current field no legacy member maps to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmappedFieldPolicy {
    /// Start the field out with its type's default value.
    #[default]
    FillDefault,
    /// Refuse to create the legacy handler.
    Reject,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyConfig {
    pub unmapped_field_policy: UnmappedFieldPolicy,
    pub matcher: MatcherConfig,
    /// Write migrated instances back in their current shape after loading.
    pub repersist: bool,
}
