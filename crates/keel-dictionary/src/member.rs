//! The members a type description is made of.
//!
//! Two equality notions matter for schema evolution:
//!
//! - **description-equal**: same kinds, type names, qualifiers and names
//!   (plain `==`)
//! - **structure-equal**: same shape, ignoring member names and qualifiers

use std::fmt;

use keel_types::PrimitiveKind;
use serde::{Deserialize, Serialize};

/// Persisted length of a reference field.
pub const REFERENCE_LENGTH: u64 = 8;

/// Minimum persisted length of a variable-length field (its length header).
pub const VARIABLE_LENGTH_MIN: u64 = 8;

/// Minimum persisted length of a complex field (length header + element count).
pub const COMPLEX_LENGTH_MIN: u64 = 16;

/// Type name of complex members.
pub const COMPLEX_TYPE_NAME: &str = "[list]";

/// Keyword introducing a primitive-only definition line.
pub const KEYWORD_PRIMITIVE: &str = "primitive";

/// Keyword introducing an enum constant line.
pub const KEYWORD_ENUM: &str = "enum";

/// Separator between a member's qualifier and its name.
pub const QUALIFIER_SEPARATOR: char = '#';

/// One member of a type description.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Member {
    /// A fixed-length field: a primitive or a reference.
    Field(FieldMember),
    /// A variable-length byte or character field.
    VariableLength(VariableLengthMember),
    /// A list of nested member rows.
    Complex(ComplexMember),
    /// The layout of a primitive-only type.
    Primitive(PrimitiveDefinition),
    /// An enum constant. Not an instance member.
    EnumConstant(EnumConstant),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldMember {
    pub type_name: String,
    pub qualifier: Option<String>,
    pub name: String,
    pub is_reference: bool,
    pub is_primitive: bool,
    pub min_len: u64,
    pub max_len: u64,
}

impl FieldMember {
    /// A primitive field of the given kind.
    pub fn primitive(kind: PrimitiveKind, name: impl Into<String>) -> Self {
        Self {
            type_name: kind.name().to_string(),
            qualifier: None,
            name: name.into(),
            is_reference: false,
            is_primitive: true,
            min_len: kind.byte_len(),
            max_len: kind.byte_len(),
        }
    }

    /// A reference field declared with the given type name.
    pub fn reference(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            qualifier: None,
            name: name.into(),
            is_reference: true,
            is_primitive: false,
            min_len: REFERENCE_LENGTH,
            max_len: REFERENCE_LENGTH,
        }
    }

    /// A field whose kind follows from its type name: primitive names give
    /// primitive fields, everything else is a reference.
    pub fn from_type_name(type_name: &str, name: impl Into<String>) -> Self {
        match PrimitiveKind::from_name(type_name) {
            Some(kind) => Self::primitive(kind, name),
            None => Self::reference(type_name, name),
        }
    }

    pub fn qualified(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        if self.is_primitive {
            PrimitiveKind::from_name(&self.type_name)
        } else {
            None
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableLengthKind {
    Bytes,
    Chars,
}

impl VariableLengthKind {
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Bytes => "[byte]",
            Self::Chars => "[char]",
        }
    }

    pub fn from_type_name(type_name: &str) -> Option<Self> {
        match type_name {
            "[byte]" => Some(Self::Bytes),
            "[char]" => Some(Self::Chars),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableLengthMember {
    pub kind: VariableLengthKind,
    pub qualifier: Option<String>,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComplexMember {
    pub qualifier: Option<String>,
    pub name: String,
    pub nested: Vec<Member>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrimitiveDefinition {
    pub definition: String,
    pub fixed_len: u64,
}

impl PrimitiveDefinition {
    pub fn of(kind: PrimitiveKind) -> Self {
        Self {
            definition: kind.definition(),
            fixed_len: kind.byte_len(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnumConstant {
    pub name: String,
}

impl Member {
    pub fn primitive(kind: PrimitiveKind, name: impl Into<String>) -> Self {
        Self::Field(FieldMember::primitive(kind, name))
    }

    pub fn reference(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Field(FieldMember::reference(type_name, name))
    }

    pub fn bytes(name: impl Into<String>) -> Self {
        Self::VariableLength(VariableLengthMember {
            kind: VariableLengthKind::Bytes,
            qualifier: None,
            name: name.into(),
        })
    }

    pub fn chars(name: impl Into<String>) -> Self {
        Self::VariableLength(VariableLengthMember {
            kind: VariableLengthKind::Chars,
            qualifier: None,
            name: name.into(),
        })
    }

    pub fn complex(name: impl Into<String>, nested: Vec<Member>) -> Self {
        Self::Complex(ComplexMember {
            qualifier: None,
            name: name.into(),
            nested,
        })
    }

    pub fn primitive_definition(kind: PrimitiveKind) -> Self {
        Self::Primitive(PrimitiveDefinition::of(kind))
    }

    pub fn enum_constant(name: impl Into<String>) -> Self {
        Self::EnumConstant(EnumConstant { name: name.into() })
    }

    /// This member with `qualifier` set. Primitive definitions and enum
    /// constants have no qualifier and are returned unchanged.
    pub fn qualified(self, qualifier: impl Into<String>) -> Self {
        let qualifier = Some(qualifier.into());
        match self {
            Self::Field(f) => Self::Field(FieldMember { qualifier, ..f }),
            Self::VariableLength(v) => Self::VariableLength(VariableLengthMember { qualifier, ..v }),
            Self::Complex(c) => Self::Complex(ComplexMember { qualifier, ..c }),
            other => other,
        }
    }

    /// The member's simple name. Primitive definitions are named by their definition.
    pub fn name(&self) -> &str {
        match self {
            Self::Field(f) => &f.name,
            Self::VariableLength(v) => &v.name,
            Self::Complex(c) => &c.name,
            Self::Primitive(p) => &p.definition,
            Self::EnumConstant(e) => &e.name,
        }
    }

    pub fn qualifier(&self) -> Option<&str> {
        match self {
            Self::Field(f) => f.qualifier.as_deref(),
            Self::VariableLength(v) => v.qualifier.as_deref(),
            Self::Complex(c) => c.qualifier.as_deref(),
            Self::Primitive(_) | Self::EnumConstant(_) => None,
        }
    }

    /// `qualifier#name`, or just the name when there is no qualifier.
    pub fn identifier(&self) -> String {
        match self.qualifier() {
            Some(q) => format!("{q}{QUALIFIER_SEPARATOR}{}", self.name()),
            None => self.name().to_string(),
        }
    }

    /// The type-name column of the member line.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Field(f) => &f.type_name,
            Self::VariableLength(v) => v.kind.type_name(),
            Self::Complex(_) => COMPLEX_TYPE_NAME,
            Self::Primitive(_) => KEYWORD_PRIMITIVE,
            Self::EnumConstant(_) => KEYWORD_ENUM,
        }
    }

    /// Whether the member is itself a reference field.
    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Field(f) if f.is_reference)
    }

    /// Whether the member holds references, directly or nested.
    pub fn has_references(&self) -> bool {
        match self {
            Self::Field(f) => f.is_reference,
            Self::Complex(c) => c.nested.iter().any(Member::has_references),
            _ => false,
        }
    }

    pub fn is_primitive(&self) -> bool {
        match self {
            Self::Field(f) => f.is_primitive,
            Self::Primitive(_) => true,
            _ => false,
        }
    }

    pub fn is_enum_constant(&self) -> bool {
        matches!(self, Self::EnumConstant(_))
    }

    /// Whether the member contributes to an instance's persisted state.
    pub fn is_instance_member(&self) -> bool {
        !self.is_enum_constant()
    }

    /// Whether the member line uses the field columns (type, qualifier, name).
    pub fn is_field_like(&self) -> bool {
        matches!(
            self,
            Self::Field(_) | Self::VariableLength(_) | Self::Complex(_)
        )
    }

    pub fn persisted_length_min(&self) -> u64 {
        match self {
            Self::Field(f) => f.min_len,
            Self::VariableLength(_) => VARIABLE_LENGTH_MIN,
            Self::Complex(_) => COMPLEX_LENGTH_MIN,
            Self::Primitive(p) => p.fixed_len,
            Self::EnumConstant(_) => 0,
        }
    }

    pub fn persisted_length_max(&self) -> u64 {
        match self {
            Self::Field(f) => f.max_len,
            Self::VariableLength(_) | Self::Complex(_) => u64::MAX,
            Self::Primitive(p) => p.fixed_len,
            Self::EnumConstant(_) => 0,
        }
    }

    pub fn is_fixed_length(&self) -> bool {
        self.persisted_length_min() == self.persisted_length_max()
    }

    /// Same kinds, type names, qualifiers and names.
    pub fn equals_description(&self, other: &Member) -> bool {
        self == other
    }

    /// Same shape, ignoring member names and qualifiers.
    pub fn equals_structure(&self, other: &Member) -> bool {
        match (self, other) {
            (Self::Field(a), Self::Field(b)) => {
                a.type_name == b.type_name
                    && a.is_reference == b.is_reference
                    && a.is_primitive == b.is_primitive
                    && a.min_len == b.min_len
                    && a.max_len == b.max_len
            }
            (Self::VariableLength(a), Self::VariableLength(b)) => a.kind == b.kind,
            (Self::Complex(a), Self::Complex(b)) => equal_structures(&a.nested, &b.nested),
            (Self::Primitive(a), Self::Primitive(b)) => a == b,
            (Self::EnumConstant(_), Self::EnumConstant(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.type_name(), self.identifier())
    }
}

/// Pairwise structure equality of two member sequences.
pub fn equal_structures(a: &[Member], b: &[Member]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals_structure(y))
}

/// Pairwise description equality of two member sequences.
pub fn equal_descriptions(a: &[Member], b: &[Member]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals_description(y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_includes_qualifier() {
        let m = Member::primitive(PrimitiveKind::I32, "count").qualified("app.Base");
        assert_eq!(m.identifier(), "app.Base#count");
        assert_eq!(Member::chars("name").identifier(), "name");
    }

    #[test]
    fn complex_has_references_is_or_over_nested() {
        let plain = Member::complex("rows", vec![Member::primitive(PrimitiveKind::I64, "v")]);
        assert!(!plain.has_references());
        let with_ref = Member::complex(
            "rows",
            vec![
                Member::primitive(PrimitiveKind::I64, "v"),
                Member::reference("app.Node", "node"),
            ],
        );
        assert!(with_ref.has_references());
        assert!(!with_ref.is_reference());
    }

    #[test]
    fn structure_ignores_names_description_does_not() {
        let a = Member::primitive(PrimitiveKind::I32, "count");
        let b = Member::primitive(PrimitiveKind::I32, "total").qualified("x.Y");
        assert!(a.equals_structure(&b));
        assert!(!a.equals_description(&b));

        let c = Member::primitive(PrimitiveKind::I64, "count");
        assert!(!a.equals_structure(&c));
        assert!(!a.equals_structure(&Member::reference("i32", "count")));
    }

    #[test]
    fn lengths_per_kind() {
        assert_eq!(Member::primitive(PrimitiveKind::I16, "s").persisted_length_max(), 2);
        assert_eq!(Member::reference("a.B", "r").persisted_length_min(), REFERENCE_LENGTH);
        assert!(!Member::bytes("b").is_fixed_length());
        assert!(Member::primitive_definition(PrimitiveKind::F64).is_fixed_length());
        assert!(!Member::enum_constant("RED").is_instance_member());
    }

    #[test]
    fn field_kind_follows_type_name() {
        assert!(FieldMember::from_type_name("u8", "x").is_primitive);
        assert!(FieldMember::from_type_name("app.Thing", "x").is_reference);
    }
}
