use std::collections::HashMap;
use std::sync::Arc;

use keel_dictionary::{Member, TypeDescription};

use crate::error::HandlerResult;
use crate::handler::SharedHandler;
use crate::legacy::mapping::RefactoringMapping;
use crate::legacy::matcher::{MemberMatcher, Similarity};

/// The current member a legacy member maps to.
#[derive(Clone, Debug, PartialEq)]
pub struct MemberMatch {
    pub current: Member,
    pub similarity: Similarity,
}

/// How a persisted legacy shape relates to the current handler of its type.
///
/// Instance members and enum constants are matched separately, so positions
/// are tracked per kind: `legacy_instance[i] -> current_instance[j]` and
/// `legacy_constant[i] -> current_constant[j]`.
#[derive(Clone, Debug)]
pub struct LegacyTypeMappingResult {
    pub legacy_definition: Arc<TypeDescription>,
    pub current_handler: SharedHandler,
    pub legacy_to_current_members: HashMap<Member, MemberMatch>,
    pub discarded_legacy_members: Vec<Member>,
    pub unmatched_legacy_members: Vec<Member>,
    pub new_current_members: Vec<Member>,
    /// Per legacy instance member, the index of its current instance member.
    pub instance_positions: Vec<Option<usize>>,
    /// Per legacy enum constant, the ordinal of its current constant.
    pub constant_positions: Vec<Option<usize>>,
}

impl LegacyTypeMappingResult {
    pub fn new(
        legacy_definition: Arc<TypeDescription>,
        current_handler: SharedHandler,
        matcher: &MemberMatcher,
        mapping: &RefactoringMapping,
    ) -> HandlerResult<Self> {
        let legacy_type = legacy_definition.type_name().to_string();
        let legacy_instance = legacy_definition.instance_members();
        let current_instance = current_handler.instance_members();
        let instance =
            matcher.match_members(&legacy_type, legacy_instance, current_instance, mapping)?;

        let legacy_constants: Vec<Member> = legacy_definition.enum_constants().cloned().collect();
        let current_constants = current_constants(&current_handler);
        let constants =
            matcher.match_members(&legacy_type, &legacy_constants, &current_constants, mapping)?;

        let mut result = Self {
            instance_positions: vec![None; legacy_instance.len()],
            constant_positions: vec![None; legacy_constants.len()],
            legacy_to_current_members: HashMap::new(),
            discarded_legacy_members: Vec::new(),
            unmatched_legacy_members: Vec::new(),
            new_current_members: Vec::new(),
            legacy_definition: Arc::clone(&legacy_definition),
            current_handler: Arc::clone(&current_handler),
        };
        for (matches, legacy, current, positions) in [
            (
                &instance,
                legacy_instance,
                current_instance,
                &mut result.instance_positions,
            ),
            (
                &constants,
                legacy_constants.as_slice(),
                current_constants.as_slice(),
                &mut result.constant_positions,
            ),
        ] {
            for &(li, ci, similarity) in &matches.matched {
                positions[li] = Some(ci);
                result.legacy_to_current_members.insert(
                    legacy[li].clone(),
                    MemberMatch {
                        current: current[ci].clone(),
                        similarity,
                    },
                );
            }
            result
                .discarded_legacy_members
                .extend(matches.discarded.iter().map(|&i| legacy[i].clone()));
            result
                .unmatched_legacy_members
                .extend(matches.unmatched.iter().map(|&i| legacy[i].clone()));
            result
                .new_current_members
                .extend(matches.new_current.iter().map(|&i| current[i].clone()));
        }
        Ok(result)
    }

    /// Whether the legacy instance layout is the current one, member by member.
    pub fn is_positional_identity(&self) -> bool {
        let current = self.current_handler.instance_members();
        self.instance_positions.len() == current.len()
            && self
                .instance_positions
                .iter()
                .enumerate()
                .all(|(i, p)| *p == Some(i))
            && self
                .legacy_definition
                .instance_members()
                .iter()
                .zip(current)
                .all(|(l, c)| l.equals_structure(c))
    }

    /// Whether every legacy constant keeps its ordinal.
    pub fn is_constant_identity(&self) -> bool {
        self.constant_positions
            .iter()
            .enumerate()
            .all(|(i, p)| *p == Some(i))
    }

    pub fn is_enum(&self) -> bool {
        self.legacy_definition.is_enum() || !self.current_handler.enum_constants().is_empty()
    }
}

fn current_constants(handler: &SharedHandler) -> Vec<Member> {
    handler
        .all_members()
        .iter()
        .filter(|m| m.is_enum_constant())
        .cloned()
        .collect()
}
