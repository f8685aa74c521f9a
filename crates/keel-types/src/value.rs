use serde::{Deserialize, Serialize};

use crate::id::{ObjectId, TypeId};
use crate::primitive::PrimitiveKind;

/// A single persisted member value.
///
/// This is the handler-level form of instance state. How values are laid out
/// as bytes is the concern of an external codec.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Char(char),
    /// A reference field, `ObjectId::NULL` for "no object".
    Reference(ObjectId),
    /// A variable-length byte field.
    Bytes(Vec<u8>),
    /// A variable-length character field.
    Chars(String),
    /// A complex member: one row of nested values per element.
    List(Vec<Vec<Value>>),
}

impl Value {
    /// The primitive kind of this value, if it is a primitive.
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        Some(match self {
            Self::Bool(_) => PrimitiveKind::Bool,
            Self::I8(_) => PrimitiveKind::I8,
            Self::I16(_) => PrimitiveKind::I16,
            Self::I32(_) => PrimitiveKind::I32,
            Self::I64(_) => PrimitiveKind::I64,
            Self::U8(_) => PrimitiveKind::U8,
            Self::U16(_) => PrimitiveKind::U16,
            Self::U32(_) => PrimitiveKind::U32,
            Self::U64(_) => PrimitiveKind::U64,
            Self::F32(_) => PrimitiveKind::F32,
            Self::F64(_) => PrimitiveKind::F64,
            Self::Char(_) => PrimitiveKind::Char,
            _ => return None,
        })
    }

    /// Integer view of integral, boolean and character values.
    pub fn as_i128(&self) -> Option<i128> {
        Some(match self {
            Self::Bool(v) => i128::from(*v),
            Self::I8(v) => i128::from(*v),
            Self::I16(v) => i128::from(*v),
            Self::I32(v) => i128::from(*v),
            Self::I64(v) => i128::from(*v),
            Self::U8(v) => i128::from(*v),
            Self::U16(v) => i128::from(*v),
            Self::U32(v) => i128::from(*v),
            Self::U64(v) => i128::from(*v),
            Self::Char(v) => i128::from(u32::from(*v)),
            _ => return None,
        })
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_i128().and_then(|v| i64::try_from(v).ok())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::F32(v) => Some(f64::from(*v)),
            Self::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            Self::Reference(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Chars(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Vec<Value>]> {
        match self {
            Self::List(rows) => Some(rows),
            _ => None,
        }
    }

    /// Short name of the variant, used in mismatch messages.
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::Reference(_) => "reference",
            Self::Bytes(_) => "[byte]",
            Self::Chars(_) => "[char]",
            Self::List(_) => "[list]",
            other => other.primitive_kind().map_or("?", PrimitiveKind::name),
        }
    }

    /// Visit every object id referenced by this value, nested lists included.
    pub fn for_each_reference(&self, visitor: &mut dyn FnMut(ObjectId)) {
        match self {
            Self::Reference(id) => visitor(*id),
            Self::List(rows) => {
                for value in rows.iter().flatten() {
                    value.for_each_reference(visitor);
                }
            }
            _ => {}
        }
    }
}

/// The record form of one instance: its ids and ordered instance-member values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub object_id: ObjectId,
    pub type_id: TypeId,
    pub values: Vec<Value>,
}

impl EntityRecord {
    pub fn new(object_id: ObjectId, type_id: TypeId, values: Vec<Value>) -> Self {
        Self {
            object_id,
            type_id,
            values,
        }
    }

    /// Visit every non-null object id referenced by this record.
    pub fn for_each_reference(&self, visitor: &mut dyn FnMut(ObjectId)) {
        for value in &self.values {
            value.for_each_reference(&mut |id| {
                if !id.is_null() {
                    visitor(id);
                }
            });
        }
    }

    /// Collect the non-null references in member order.
    pub fn references(&self) -> Vec<ObjectId> {
        let mut out = Vec::new();
        self.for_each_reference(&mut |id| out.push(id));
        out
    }
}

/// Rust types that map onto exactly one [`PrimitiveKind`].
pub trait Primitive: Copy + Send + Sync + 'static {
    const KIND: PrimitiveKind;

    fn into_value(self) -> Value;

    /// The value if it is of this exact kind.
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! primitive {
    ($($ty:ty => $variant:ident, $kind:ident;)*) => {
        $(
            impl Primitive for $ty {
                const KIND: PrimitiveKind = PrimitiveKind::$kind;

                fn into_value(self) -> Value {
                    Value::$variant(self)
                }

                fn from_value(value: &Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(*v),
                        _ => None,
                    }
                }
            }

            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

primitive! {
    bool => Bool, Bool;
    i8 => I8, I8;
    i16 => I16, I16;
    i32 => I32, I32;
    i64 => I64, I64;
    u8 => U8, U8;
    u16 => U16, U16;
    u32 => U32, U32;
    u64 => U64, U64;
    f32 => F32, F32;
    f64 => F64, F64;
    char => Char, Char;
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Chars(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Chars(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<ObjectId> for Value {
    fn from(v: ObjectId) -> Self {
        Value::Reference(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_include_nested_lists_and_skip_null() {
        let record = EntityRecord::new(
            ObjectId::new(10),
            TypeId::new(1),
            vec![
                Value::I32(4),
                Value::Reference(ObjectId::new(11)),
                Value::Reference(ObjectId::NULL),
                Value::List(vec![
                    vec![Value::Chars("a".into()), Value::Reference(ObjectId::new(12))],
                    vec![Value::Chars("b".into()), Value::Reference(ObjectId::new(13))],
                ]),
            ],
        );
        assert_eq!(
            record.references(),
            vec![ObjectId::new(11), ObjectId::new(12), ObjectId::new(13)]
        );
    }

    #[test]
    fn accessors() {
        assert_eq!(Value::U8(200).as_i64(), Some(200));
        assert_eq!(Value::Char('a').as_i128(), Some(97));
        assert_eq!(Value::Chars("x".into()).as_str(), Some("x"));
        assert_eq!(Value::F32(1.5).as_f64(), Some(1.5));
        assert_eq!(Value::Bytes(vec![1]).variant_name(), "[byte]");
        assert_eq!(Value::I16(1).variant_name(), "i16");
    }

    #[test]
    fn primitive_trait_matches_kind_exactly() {
        assert_eq!(<i32 as Primitive>::KIND, PrimitiveKind::I32);
        assert_eq!(7i32.into_value(), Value::I32(7));
        assert_eq!(i32::from_value(&Value::I32(7)), Some(7));
        assert_eq!(i32::from_value(&Value::I64(7)), None);
        assert_eq!(Value::from("hi"), Value::Chars("hi".into()));
    }
}
