use std::collections::HashSet;
use std::fmt;

use keel_types::TypeId;
use serde::Serialize;

use crate::error::{DictionaryError, DictionaryResult};
use crate::member::{
    equal_descriptions, equal_structures, Member, KEYWORD_ENUM, KEYWORD_PRIMITIVE,
    QUALIFIER_SEPARATOR,
};

/// The persistent shape of one version of a type.
///
/// Immutable once constructed; [`TypeDescription::new`] validates member
/// identifiers and lengths.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct TypeDescription {
    type_id: TypeId,
    type_name: String,
    all_members: Vec<Member>,
    instance_members: Vec<Member>,
}

impl TypeDescription {
    pub fn new(
        type_id: TypeId,
        type_name: impl Into<String>,
        members: Vec<Member>,
    ) -> DictionaryResult<Self> {
        let type_name = type_name.into();
        if !is_valid_type_name(&type_name) {
            return Err(DictionaryError::InvalidTypeName { name: type_name });
        }
        validate_scope(&type_name, &members)?;
        let instance_members = members
            .iter()
            .filter(|m| m.is_instance_member())
            .cloned()
            .collect();
        Ok(Self {
            type_id,
            type_name,
            all_members: members,
            instance_members,
        })
    }

    /// The same shape under another type id.
    pub fn with_type_id(&self, type_id: TypeId) -> Self {
        Self {
            type_id,
            ..self.clone()
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn all_members(&self) -> &[Member] {
        &self.all_members
    }

    pub fn instance_members(&self) -> &[Member] {
        &self.instance_members
    }

    /// Enum constants in declaration order.
    pub fn enum_constants(&self) -> impl Iterator<Item = &Member> {
        self.all_members.iter().filter(|m| m.is_enum_constant())
    }

    pub fn is_enum(&self) -> bool {
        self.all_members.iter().any(Member::is_enum_constant)
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self.instance_members.as_slice(), [Member::Primitive(_)])
    }

    pub fn has_references(&self) -> bool {
        self.instance_members.iter().any(Member::has_references)
    }

    pub fn persisted_length_min(&self) -> u64 {
        self.instance_members
            .iter()
            .map(Member::persisted_length_min)
            .fold(0u64, u64::saturating_add)
    }

    pub fn persisted_length_max(&self) -> u64 {
        self.instance_members
            .iter()
            .map(Member::persisted_length_max)
            .fold(0u64, u64::saturating_add)
    }

    pub fn is_fixed_length(&self) -> bool {
        self.instance_members.iter().all(Member::is_fixed_length)
    }

    /// Index of the instance member with the given identifier.
    pub fn instance_member_index(&self, identifier: &str) -> Option<usize> {
        self.instance_members
            .iter()
            .position(|m| m.identifier() == identifier)
    }

    /// Same type name, same member names, same structure. Type ids are not compared.
    pub fn equals_description(&self, other: &TypeDescription) -> bool {
        self.type_name == other.type_name
            && equal_descriptions(&self.all_members, &other.all_members)
    }

    /// Same member shapes regardless of member names and qualifiers.
    pub fn equals_structure(&self, other: &TypeDescription) -> bool {
        equal_structures(&self.all_members, &other.all_members)
    }

    /// Structure equality restricted to instance members.
    pub fn equals_instance_structure(&self, other: &TypeDescription) -> bool {
        equal_structures(&self.instance_members, &other.instance_members)
    }
}

impl fmt::Debug for TypeDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescription")
            .field("type_id", &self.type_id.get())
            .field("type_name", &self.type_name)
            .field("members", &self.all_members.len())
            .finish()
    }
}

impl fmt::Display for TypeDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.type_id, self.type_name)
    }
}

/// Type names are single tokens that do not collide with line syntax.
pub fn is_valid_type_name(name: &str) -> bool {
    is_valid_token(name) && !name.contains(QUALIFIER_SEPARATOR)
}

fn is_valid_token(token: &str) -> bool {
    !token.is_empty()
        && !token.chars().any(|c| c.is_whitespace() || matches!(c, '{' | '}'))
        && !matches!(token, KEYWORD_PRIMITIVE | KEYWORD_ENUM | "[" | "]")
}

fn is_valid_member_name(name: &str) -> bool {
    is_valid_token(name)
        && !name.contains(QUALIFIER_SEPARATOR)
        && !name.contains('[')
        && !name.contains(']')
}

fn validate_scope(type_name: &str, members: &[Member]) -> DictionaryResult<()> {
    let mut instance_ids = HashSet::new();
    let mut constant_ids = HashSet::new();
    for member in members {
        validate_member(type_name, member)?;
        let seen = if member.is_enum_constant() {
            &mut constant_ids
        } else {
            &mut instance_ids
        };
        if !seen.insert(member.identifier()) {
            return Err(DictionaryError::DuplicateMember {
                type_name: type_name.to_string(),
                identifier: member.identifier(),
            });
        }
    }
    Ok(())
}

fn validate_member(type_name: &str, member: &Member) -> DictionaryResult<()> {
    let invalid_name = |name: &str| DictionaryError::InvalidMemberName {
        type_name: type_name.to_string(),
        name: name.to_string(),
    };
    match member {
        Member::Primitive(p) => {
            if p.definition.trim().is_empty() || p.definition.trim() != p.definition {
                return Err(invalid_name(&p.definition));
            }
        }
        other => {
            if !is_valid_member_name(other.name()) {
                return Err(invalid_name(other.name()));
            }
            if let Some(q) = other.qualifier() {
                if !is_valid_member_name(q) {
                    return Err(invalid_name(&other.identifier()));
                }
            }
        }
    }
    match member {
        Member::Field(f) => {
            if f.min_len > f.max_len {
                return Err(DictionaryError::InvalidLength {
                    type_name: type_name.to_string(),
                    member: member.identifier(),
                    min: f.min_len,
                    max: f.max_len,
                });
            }
            if !is_valid_type_name(&f.type_name) || f.type_name.starts_with('[') {
                return Err(DictionaryError::InvalidTypeName {
                    name: f.type_name.clone(),
                });
            }
        }
        Member::Complex(c) => {
            let scope = format!("{type_name}{QUALIFIER_SEPARATOR}{}", member.identifier());
            if c.nested.iter().any(|m| !m.is_field_like()) {
                return Err(invalid_name(&scope));
            }
            validate_scope(&scope, &c.nested)?;
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use keel_types::PrimitiveKind;

    use super::*;

    fn person(id: u64) -> TypeDescription {
        TypeDescription::new(
            TypeId::new(id),
            "app.Person",
            vec![
                Member::chars("name"),
                Member::primitive(PrimitiveKind::I32, "age"),
                Member::reference("app.Person", "friend"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn instance_members_exclude_enum_constants() {
        let color = TypeDescription::new(
            TypeId::new(5),
            "app.Color",
            vec![
                Member::enum_constant("RED"),
                Member::enum_constant("GREEN"),
                Member::primitive(PrimitiveKind::I32, "ordinal"),
            ],
        )
        .unwrap();
        assert!(color.is_enum());
        assert_eq!(color.instance_members().len(), 1);
        assert_eq!(color.enum_constants().count(), 2);
    }

    #[test]
    fn duplicate_identifiers_are_rejected() {
        let err = TypeDescription::new(
            TypeId::new(1),
            "app.X",
            vec![
                Member::primitive(PrimitiveKind::I32, "a"),
                Member::primitive(PrimitiveKind::I64, "a"),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, DictionaryError::DuplicateMember { .. }));
    }

    #[test]
    fn qualifier_disambiguates_duplicate_names() {
        let desc = TypeDescription::new(
            TypeId::new(1),
            "app.Sub",
            vec![
                Member::primitive(PrimitiveKind::I32, "a").qualified("app.Base"),
                Member::primitive(PrimitiveKind::I32, "a"),
            ],
        );
        assert!(desc.is_ok());
    }

    #[test]
    fn enum_constant_may_share_a_field_name() {
        let desc = TypeDescription::new(
            TypeId::new(1),
            "app.E",
            vec![Member::enum_constant("name"), Member::chars("name")],
        );
        assert!(desc.is_ok());
    }

    #[test]
    fn invalid_length_is_rejected() {
        let mut field = crate::member::FieldMember::primitive(PrimitiveKind::I32, "x");
        field.min_len = 9;
        let err = TypeDescription::new(TypeId::new(1), "app.X", vec![Member::Field(field)])
            .unwrap_err();
        assert!(matches!(err, DictionaryError::InvalidLength { min: 9, max: 4, .. }));
    }

    #[test]
    fn invalid_names_are_rejected() {
        assert!(TypeDescription::new(TypeId::new(1), "bad name", vec![]).is_err());
        assert!(TypeDescription::new(TypeId::new(1), "enum", vec![]).is_err());
        assert!(TypeDescription::new(
            TypeId::new(1),
            "app.X",
            vec![Member::primitive(PrimitiveKind::I32, "a#b")]
        )
        .is_err());
        assert!(TypeDescription::new(
            TypeId::new(1),
            "app.X",
            vec![Member::complex("rows", vec![Member::enum_constant("A")])]
        )
        .is_err());
    }

    #[test]
    fn description_vs_structure_equality() {
        let a = person(10);
        let b = person(11);
        assert!(a.equals_description(&b));
        assert_ne!(a, b);

        let renamed = TypeDescription::new(
            TypeId::new(12),
            "app.Person",
            vec![
                Member::chars("fullName"),
                Member::primitive(PrimitiveKind::I32, "years"),
                Member::reference("app.Person", "buddy"),
            ],
        )
        .unwrap();
        assert!(a.equals_structure(&renamed));
        assert!(!a.equals_description(&renamed));
    }

    #[test]
    fn lengths_and_references() {
        let p = person(1);
        assert!(p.has_references());
        assert!(!p.is_fixed_length());
        assert_eq!(p.persisted_length_min(), 8 + 4 + 8);
        assert_eq!(p.persisted_length_max(), u64::MAX);
        assert_eq!(p.instance_member_index("friend"), Some(2));
    }
}
