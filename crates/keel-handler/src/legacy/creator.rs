use std::fmt;
use std::sync::Arc;

use keel_dictionary::{Member, TypeDescription};
use tracing::info;

use crate::error::{HandlerError, HandlerResult};
use crate::handler::{HandlerKind, SharedHandler};
use crate::legacy::handlers::{default_value, LegacyTypeHandler, Step, Translation};
use crate::legacy::mapping::RefactoringMapping;
use crate::legacy::matcher::{compatible, MemberMatcher};
use crate::legacy::result::LegacyTypeMappingResult;
use crate::legacy::{LegacyConfig, UnmappedFieldPolicy};

/// Builds a legacy handler for a mapping the creator could not wrap directly.
pub trait LegacyHandlerDeriver: Send + Sync + fmt::Debug {
    fn derive(
        &self,
        mapping: &LegacyTypeMappingResult,
        config: &LegacyConfig,
    ) -> HandlerResult<SharedHandler>;
}

/// Per-field copy plan with primitive value translation.
#[derive(Debug, Default)]
pub struct ReflectiveDeriver;

impl LegacyHandlerDeriver for ReflectiveDeriver {
    fn derive(
        &self,
        mapping: &LegacyTypeMappingResult,
        config: &LegacyConfig,
    ) -> HandlerResult<SharedHandler> {
        let plan = build_plan(mapping, config.unmapped_field_policy)?;
        Ok(Arc::new(LegacyTypeHandler::new(
            Arc::clone(&mapping.legacy_definition),
            Arc::clone(&mapping.current_handler),
            Translation::Plan(plan),
        )))
    }
}

/// Migration for custom bindings. Both layouts must be fixed-length, since
/// a custom binding's variable-length values cannot be split apart safely.
#[derive(Debug, Default)]
pub struct CustomDeriver;

impl LegacyHandlerDeriver for CustomDeriver {
    fn derive(
        &self,
        mapping: &LegacyTypeMappingResult,
        config: &LegacyConfig,
    ) -> HandlerResult<SharedHandler> {
        let current_fixed = mapping
            .current_handler
            .instance_members()
            .iter()
            .all(Member::is_fixed_length);
        if !mapping.legacy_definition.is_fixed_length() || !current_fixed {
            return Err(HandlerError::VariableLengthLegacyLayout {
                type_name: mapping.legacy_definition.type_name().to_string(),
            });
        }
        ReflectiveDeriver.derive(mapping, config)
    }
}

/// One step per current instance member.
pub fn build_plan(
    mapping: &LegacyTypeMappingResult,
    policy: UnmappedFieldPolicy,
) -> HandlerResult<Vec<Step>> {
    let type_name = mapping.legacy_definition.type_name();
    let legacy = mapping.legacy_definition.instance_members();
    let current = mapping.current_handler.instance_members();
    let mut steps = Vec::with_capacity(current.len());
    for (ci, c) in current.iter().enumerate() {
        let source = mapping
            .instance_positions
            .iter()
            .position(|p| *p == Some(ci));
        let step = match source {
            Some(li) => step_for(type_name, li, &legacy[li], c)?,
            None => match policy {
                UnmappedFieldPolicy::FillDefault => Step::Default(default_value(c)),
                UnmappedFieldPolicy::Reject => {
                    return Err(HandlerError::UnmappedField {
                        type_name: type_name.to_string(),
                        member: c.identifier(),
                    });
                }
            },
        };
        steps.push(step);
    }
    Ok(steps)
}

fn step_for(type_name: &str, li: usize, legacy: &Member, current: &Member) -> HandlerResult<Step> {
    let incompatible = || HandlerError::IncompatibleMember {
        type_name: type_name.to_string(),
        legacy: legacy.identifier(),
        current: current.identifier(),
    };
    match (legacy, current) {
        (Member::Field(l), Member::Field(c)) => match (l.primitive_kind(), c.primitive_kind()) {
            (Some(from), Some(to)) if from == to => Ok(Step::Copy(li)),
            (Some(from), Some(to)) if to.accepts(from) => Ok(Step::Convert(li, to)),
            (None, None) if l.is_reference && c.is_reference => Ok(Step::Copy(li)),
            _ => Err(incompatible()),
        },
        _ if compatible(legacy, current) => Ok(Step::Copy(li)),
        _ => Err(incompatible()),
    }
}

/// Creates load-only handlers for persisted shapes that differ from the
/// current shape of their type.
pub struct LegacyTypeHandlerCreator {
    matcher: MemberMatcher,
    mapping: RefactoringMapping,
    config: LegacyConfig,
    reflective: Box<dyn LegacyHandlerDeriver>,
    custom: Box<dyn LegacyHandlerDeriver>,
}

impl LegacyTypeHandlerCreator {
    pub fn new(config: LegacyConfig, mapping: RefactoringMapping) -> Self {
        Self {
            matcher: MemberMatcher::new(config.matcher.clone()),
            mapping,
            config,
            reflective: Box::new(ReflectiveDeriver),
            custom: Box::new(CustomDeriver),
        }
    }

    /// Replace the derivers used for reflective and custom handlers.
    pub fn with_derivers(
        mut self,
        reflective: Box<dyn LegacyHandlerDeriver>,
        custom: Box<dyn LegacyHandlerDeriver>,
    ) -> Self {
        self.reflective = reflective;
        self.custom = custom;
        self
    }

    pub fn mapping(&self) -> &RefactoringMapping {
        &self.mapping
    }

    pub fn config(&self) -> &LegacyConfig {
        &self.config
    }

    /// Relate `legacy` to the current handler of its type.
    pub fn map_type(
        &self,
        legacy: Arc<TypeDescription>,
        current: SharedHandler,
    ) -> HandlerResult<LegacyTypeMappingResult> {
        LegacyTypeMappingResult::new(legacy, current, &self.matcher, &self.mapping)
    }

    /// A load-only handler for `legacy`.
    pub fn create(
        &self,
        legacy: Arc<TypeDescription>,
        current: SharedHandler,
    ) -> HandlerResult<SharedHandler> {
        let mapping = self.map_type(legacy, current)?;
        let handler: SharedHandler = match self.direct_translation(&mapping)? {
            Some(translation) => Arc::new(LegacyTypeHandler::new(
                Arc::clone(&mapping.legacy_definition),
                Arc::clone(&mapping.current_handler),
                translation,
            )),
            None => match mapping.current_handler.kind() {
                HandlerKind::Custom => self.custom.derive(&mapping, &self.config)?,
                _ => self.reflective.derive(&mapping, &self.config)?,
            },
        };
        info!(
            type_id = %mapping.legacy_definition.type_id(),
            type_name = mapping.legacy_definition.type_name(),
            unmatched = mapping.unmatched_legacy_members.len(),
            new_members = mapping.new_current_members.len(),
            "legacy type handler created"
        );
        Ok(handler)
    }

    /// The translation for mappings that need no deriver: enums, and layouts
    /// identical to the current one. `None` if a deriver has to build it.
    pub fn direct_translation(
        &self,
        mapping: &LegacyTypeMappingResult,
    ) -> HandlerResult<Option<Translation>> {
        if mapping.is_enum() {
            return self.enum_translation(mapping).map(Some);
        }
        if mapping.is_positional_identity() {
            return Ok(Some(Translation::Identity));
        }
        Ok(None)
    }

    fn enum_translation(&self, mapping: &LegacyTypeMappingResult) -> HandlerResult<Translation> {
        if let Some(constant) = mapping
            .unmatched_legacy_members
            .iter()
            .find(|m| m.is_enum_constant())
        {
            return Err(HandlerError::UnmappedEnumConstant {
                type_name: mapping.legacy_definition.type_name().to_string(),
                constant: constant.name().to_string(),
            });
        }
        if mapping.is_constant_identity() {
            return Ok(Translation::Identity);
        }
        Ok(Translation::Ordinals(mapping.constant_positions.clone()))
    }
}

impl fmt::Debug for LegacyTypeHandlerCreator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LegacyTypeHandlerCreator")
            .field("config", &self.config)
            .field("reflective", &self.reflective)
            .field("custom", &self.custom)
            .finish()
    }
}
