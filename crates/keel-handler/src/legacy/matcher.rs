//! Matching legacy members onto current members.
//!
//! Three passes, each only over members the previous passes left open:
//!
//! 1. explicit mappings from the [`RefactoringMapping`] (similarity 2.0)
//! 2. identical identifiers with compatible kinds (similarity 1.0)
//! 3. scored candidates: normalized Levenshtein similarity of the names,
//!    weighted by type similarity, kept if above the configured threshold
//!
//! In the third pass the best-scoring pairs are taken first. Two pairs with
//! the same best score competing for one member are an error.

use std::cmp::Ordering;
use std::fmt;

use keel_dictionary::Member;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HandlerError, HandlerResult};
use crate::legacy::mapping::RefactoringMapping;

/// Default minimum score for a scored match.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.6;

/// Weight of a candidate whose type name differs but whose kind is compatible.
const DIFFERENT_TYPE_WEIGHT: f64 = 0.8;

/// How well a legacy member matches a current member.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize)]
pub struct Similarity(f64);

impl Similarity {
    pub const EXPLICIT: Similarity = Similarity(2.0);
    pub const EXACT: Similarity = Similarity(1.0);

    pub fn new(value: f64) -> Self {
        Self(value)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn is_explicit(self) -> bool {
        self.0 >= Self::EXPLICIT.0
    }
}

impl fmt::Display for Similarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub similarity_threshold: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

/// The outcome of matching one type's members.
#[derive(Clone, Debug, Default)]
pub struct MemberMatches {
    /// `(legacy index, current index, similarity)`, in legacy order.
    pub matched: Vec<(usize, usize, Similarity)>,
    /// Legacy indices explicitly discarded.
    pub discarded: Vec<usize>,
    /// Legacy indices with no counterpart and no discard.
    pub unmatched: Vec<usize>,
    /// Current indices no legacy member maps to.
    pub new_current: Vec<usize>,
}

/// Matches the members of a legacy description onto current members.
#[derive(Clone, Debug, Default)]
pub struct MemberMatcher {
    config: MatcherConfig,
}

impl MemberMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Match `legacy` onto `current`.
    ///
    /// Enum constants are only matched with enum constants and instance
    /// members only with instance members. Mapping keys use `legacy_type`.
    pub fn match_members(
        &self,
        legacy_type: &str,
        legacy: &[Member],
        current: &[Member],
        mapping: &RefactoringMapping,
    ) -> HandlerResult<MemberMatches> {
        let mut legacy_to_current: Vec<Option<(usize, Similarity)>> = vec![None; legacy.len()];
        let mut current_taken = vec![false; current.len()];
        let mut discarded = vec![false; legacy.len()];

        let current_type = mapping.current_type_name(legacy_type).unwrap_or(legacy_type);
        for (ci, member) in current.iter().enumerate() {
            if mapping.is_new_member(current_type, &member.identifier()) {
                current_taken[ci] = true;
            }
        }

        // Explicit mappings.
        for (li, member) in legacy.iter().enumerate() {
            let explicit = mapping
                .member_target(legacy_type, &member.identifier())
                .or_else(|| mapping.member_target(legacy_type, member.name()));
            match explicit {
                Some(None) => discarded[li] = true,
                Some(Some(target)) => {
                    let ci = find_current(current, target, member.is_enum_constant()).ok_or_else(
                        || HandlerError::UnknownMappingTarget {
                            type_name: legacy_type.to_string(),
                            member: member.identifier(),
                            target: target.to_string(),
                        },
                    )?;
                    legacy_to_current[li] = Some((ci, Similarity::EXPLICIT));
                    current_taken[ci] = true;
                }
                None => {}
            }
        }

        // Identical identifiers.
        for (li, member) in legacy.iter().enumerate() {
            if discarded[li] || legacy_to_current[li].is_some() {
                continue;
            }
            let identifier = member.identifier();
            let exact = current.iter().enumerate().find(|(ci, c)| {
                !current_taken[*ci] && c.identifier() == identifier && compatible(member, c)
            });
            if let Some((ci, _)) = exact {
                legacy_to_current[li] = Some((ci, Similarity::EXACT));
                current_taken[ci] = true;
            }
        }

        // Scored candidates.
        let mut candidates = Vec::new();
        for (li, l) in legacy.iter().enumerate() {
            if discarded[li] || legacy_to_current[li].is_some() {
                continue;
            }
            for (ci, c) in current.iter().enumerate() {
                if current_taken[ci] || !compatible(l, c) {
                    continue;
                }
                let score = score(l, c);
                if score >= self.config.similarity_threshold {
                    candidates.push((li, ci, score));
                }
            }
        }
        candidates.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(Ordering::Equal));

        for &(li, ci, score) in &candidates {
            if legacy_to_current[li].is_some() || current_taken[ci] {
                continue;
            }
            let rivals: Vec<String> = candidates
                .iter()
                .filter(|&&(l2, c2, s2)| {
                    s2 == score
                        && (l2, c2) != (li, ci)
                        && ((l2 == li && !current_taken[c2])
                            || (c2 == ci && legacy_to_current[l2].is_none()))
                })
                .map(|&(l2, c2, _)| {
                    if l2 == li {
                        current[c2].identifier()
                    } else {
                        legacy[l2].identifier()
                    }
                })
                .collect();
            if !rivals.is_empty() {
                let mut names = vec![current[ci].identifier()];
                names.extend(rivals);
                return Err(HandlerError::AmbiguousMatch {
                    type_name: legacy_type.to_string(),
                    member: legacy[li].identifier(),
                    candidates: names,
                });
            }
            debug!(
                type_name = legacy_type,
                legacy = %legacy[li],
                current = %current[ci],
                score,
                "legacy member matched by similarity"
            );
            legacy_to_current[li] = Some((ci, Similarity::new(score)));
            current_taken[ci] = true;
        }

        let mut matches = MemberMatches::default();
        let mut targeted = vec![false; current.len()];
        for (li, target) in legacy_to_current.iter().enumerate() {
            match target {
                Some((ci, similarity)) => {
                    targeted[*ci] = true;
                    matches.matched.push((li, *ci, *similarity));
                }
                None if discarded[li] => matches.discarded.push(li),
                None => matches.unmatched.push(li),
            }
        }
        matches.new_current = (0..current.len()).filter(|&ci| !targeted[ci]).collect();
        Ok(matches)
    }
}

fn find_current(current: &[Member], target: &str, enum_constant: bool) -> Option<usize> {
    let eligible = |m: &Member| m.is_enum_constant() == enum_constant;
    current
        .iter()
        .position(|m| eligible(m) && m.identifier() == target)
        .or_else(|| current.iter().position(|m| eligible(m) && m.name() == target))
}

/// Whether a value of `legacy` can be carried into `current` at all.
pub fn compatible(legacy: &Member, current: &Member) -> bool {
    match (legacy, current) {
        (Member::EnumConstant(_), Member::EnumConstant(_)) => true,
        (Member::Field(l), Member::Field(c)) => match (l.primitive_kind(), c.primitive_kind()) {
            (Some(from), Some(to)) => to.accepts(from),
            (None, None) => l.is_reference && c.is_reference,
            _ => false,
        },
        (Member::VariableLength(l), Member::VariableLength(c)) => l.kind == c.kind,
        (Member::Complex(l), Member::Complex(c)) => {
            keel_dictionary::member::equal_structures(&l.nested, &c.nested)
        }
        _ => false,
    }
}

fn score(legacy: &Member, current: &Member) -> f64 {
    let name = strsim::normalized_levenshtein(legacy.name(), current.name());
    if legacy.is_enum_constant() || legacy.type_name() == current.type_name() {
        name
    } else {
        name * DIFFERENT_TYPE_WEIGHT
    }
}
