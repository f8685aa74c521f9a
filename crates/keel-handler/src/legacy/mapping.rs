use std::collections::{HashMap, HashSet};

use keel_dictionary::member::QUALIFIER_SEPARATOR;

use crate::error::{HandlerError, HandlerResult};

const ARROW: &str = "->";
const NEW_MEMBER_PREFIX: char = '+';
const COMMENT: &str = "//";

/// Explicit refactoring knowledge that overrides member matching.
///
/// The text form has one entry per line:
///
/// ```text
/// // type rename
/// app.Customer -> app.Client
/// // member rename, member discard
/// app.Client#surname -> lastName
/// app.Client#fax ->
/// // member that must not be matched to any legacy member
/// + app.Client#email
/// ```
///
/// Member keys always use the legacy type name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefactoringMapping {
    type_renames: HashMap<String, String>,
    members: HashMap<(String, String), Option<String>>,
    new_members: HashSet<(String, String)>,
}

impl RefactoringMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rename_type(mut self, legacy: impl Into<String>, current: impl Into<String>) -> Self {
        self.type_renames.insert(legacy.into(), current.into());
        self
    }

    pub fn map_member(
        mut self,
        type_name: impl Into<String>,
        member: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.members
            .insert((type_name.into(), member.into()), Some(target.into()));
        self
    }

    pub fn discard_member(mut self, type_name: impl Into<String>, member: impl Into<String>) -> Self {
        self.members.insert((type_name.into(), member.into()), None);
        self
    }

    pub fn add_new_member(mut self, type_name: impl Into<String>, member: impl Into<String>) -> Self {
        self.new_members.insert((type_name.into(), member.into()));
        self
    }

    /// The current name of a renamed legacy type.
    pub fn current_type_name(&self, legacy: &str) -> Option<&str> {
        self.type_renames.get(legacy).map(String::as_str)
    }

    /// The explicit mapping of a legacy member.
    ///
    /// `None` if there is none, `Some(None)` if the member is discarded,
    /// `Some(Some(target))` if it maps to a current member.
    pub fn member_target(&self, type_name: &str, member: &str) -> Option<Option<&str>> {
        self.members
            .get(&(type_name.to_string(), member.to_string()))
            .map(Option::as_deref)
    }

    pub fn is_new_member(&self, type_name: &str, member: &str) -> bool {
        self.new_members
            .contains(&(type_name.to_string(), member.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.type_renames.is_empty() && self.members.is_empty() && self.new_members.is_empty()
    }

    /// Parse the text form.
    pub fn parse(input: &str) -> HandlerResult<Self> {
        let mut mapping = Self::new();
        for (index, raw) in input.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.split(COMMENT).next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let error = |reason: &str| HandlerError::MappingParse {
                line: line_no,
                reason: reason.to_string(),
            };

            if let Some(rest) = line.strip_prefix(NEW_MEMBER_PREFIX) {
                let (type_name, member) = split_member(rest.trim())
                    .ok_or_else(|| error("expected 'type#member' after '+'"))?;
                mapping = mapping.add_new_member(type_name, member);
                continue;
            }

            let (source, target) = line
                .split_once(ARROW)
                .ok_or_else(|| error("expected 'source -> target'"))?;
            let (source, target) = (source.trim(), target.trim());
            if source.is_empty() || source.contains(char::is_whitespace) {
                return Err(error("source must be a single token"));
            }
            if target.contains(char::is_whitespace) {
                return Err(error("target must be a single token"));
            }
            match split_member(source) {
                Some((type_name, member)) if target.is_empty() => {
                    mapping = mapping.discard_member(type_name, member);
                }
                Some((type_name, member)) => {
                    mapping = mapping.map_member(type_name, member, target);
                }
                None if target.is_empty() => return Err(error("type rename needs a target")),
                None if target.contains(QUALIFIER_SEPARATOR) => {
                    return Err(error("type rename target must be a type name"));
                }
                None => mapping = mapping.rename_type(source, target),
            }
        }
        Ok(mapping)
    }
}

/// `type#member` split at the first separator; the member part may itself be
/// qualified.
fn split_member(token: &str) -> Option<(&str, &str)> {
    let (type_name, member) = token.split_once(QUALIFIER_SEPARATOR)?;
    if type_name.is_empty() || member.is_empty() {
        return None;
    }
    Some((type_name, member))
}
