use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypesError;
use crate::value::Value;

/// The fixed-length primitive kinds a field can have.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Char,
}

impl PrimitiveKind {
    /// All kinds, in declaration order.
    pub const ALL: [PrimitiveKind; 12] = [
        Self::Bool,
        Self::I8,
        Self::I16,
        Self::I32,
        Self::I64,
        Self::U8,
        Self::U16,
        Self::U32,
        Self::U64,
        Self::F32,
        Self::F64,
        Self::Char,
    ];

    /// The type name used in dictionary member lines.
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Char => "char",
        }
    }

    /// Look up a kind by its type name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Persisted length in bytes.
    pub fn byte_len(self) -> u64 {
        match self {
            Self::Bool | Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 | Self::Char => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    /// The primitive-only definition text, e.g. `64 bit integer signed`.
    pub fn definition(self) -> String {
        let bits = self.byte_len() * 8;
        match self {
            Self::Bool => format!("{bits} bit boolean"),
            Self::Char => format!("{bits} bit character"),
            Self::F32 | Self::F64 => format!("{bits} bit float"),
            Self::I8 | Self::I16 | Self::I32 | Self::I64 => format!("{bits} bit integer signed"),
            Self::U8 | Self::U16 | Self::U32 | Self::U64 => {
                format!("{bits} bit integer unsigned")
            }
        }
    }

    /// Parse a primitive-only definition text.
    pub fn from_definition(definition: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.definition() == definition)
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, Self::Bool | Self::F32 | Self::F64 | Self::Char)
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// The zero value of this kind.
    pub fn default_value(self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::I8 => Value::I8(0),
            Self::I16 => Value::I16(0),
            Self::I32 => Value::I32(0),
            Self::I64 => Value::I64(0),
            Self::U8 => Value::U8(0),
            Self::U16 => Value::U16(0),
            Self::U32 => Value::U32(0),
            Self::U64 => Value::U64(0),
            Self::F32 => Value::F32(0.0),
            Self::F64 => Value::F64(0.0),
            Self::Char => Value::Char('\0'),
        }
    }

    /// Whether a value of kind `from` can be translated into this kind at all.
    ///
    /// Lossy cases (narrowing, float to integer) are still checked per value
    /// by [`convert`](Self::convert).
    pub fn accepts(self, from: PrimitiveKind) -> bool {
        if self == from {
            return true;
        }
        let numeric = |k: PrimitiveKind| k.is_integer() || k.is_float();
        if numeric(self) && numeric(from) {
            return true;
        }
        match (from, self) {
            (Self::Bool | Self::Char, to) => to.is_integer(),
            (from, Self::Bool | Self::Char) => from.is_integer(),
            _ => false,
        }
    }

    /// Translate `value` into this kind.
    pub fn convert(self, value: &Value) -> Result<Value, TypesError> {
        let fail = || TypesError::ValueConversion {
            value: format!("{value:?}"),
            target: self.name(),
        };
        if value.primitive_kind() == Some(self) {
            return Ok(value.clone());
        }
        if self.is_float() {
            let f = match value {
                Value::F32(v) => f64::from(*v),
                Value::F64(v) => *v,
                other => other.as_i128().ok_or_else(fail)? as f64,
            };
            return Ok(match self {
                Self::F32 => Value::F32(f as f32),
                _ => Value::F64(f),
            });
        }
        let wide: i128 = match value {
            Value::F32(v) if v.fract() == 0.0 => *v as i128,
            Value::F64(v) if v.fract() == 0.0 => *v as i128,
            other => other.as_i128().ok_or_else(fail)?,
        };
        let out = match self {
            Self::Bool => match wide {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                _ => return Err(fail()),
            },
            Self::I8 => Value::I8(i8::try_from(wide).map_err(|_| fail())?),
            Self::I16 => Value::I16(i16::try_from(wide).map_err(|_| fail())?),
            Self::I32 => Value::I32(i32::try_from(wide).map_err(|_| fail())?),
            Self::I64 => Value::I64(i64::try_from(wide).map_err(|_| fail())?),
            Self::U8 => Value::U8(u8::try_from(wide).map_err(|_| fail())?),
            Self::U16 => Value::U16(u16::try_from(wide).map_err(|_| fail())?),
            Self::U32 => Value::U32(u32::try_from(wide).map_err(|_| fail())?),
            Self::U64 => Value::U64(u64::try_from(wide).map_err(|_| fail())?),
            Self::Char => {
                let code = u32::try_from(wide).map_err(|_| fail())?;
                Value::Char(char::from_u32(code).ok_or_else(fail)?)
            }
            Self::F32 | Self::F64 => return Err(fail()),
        };
        Ok(out)
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_definitions_are_unique() {
        for kind in PrimitiveKind::ALL {
            assert_eq!(PrimitiveKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(
            PrimitiveKind::from_definition("64 bit integer signed"),
            Some(PrimitiveKind::I64)
        );
        assert_eq!(
            PrimitiveKind::from_definition("32 bit integer unsigned"),
            Some(PrimitiveKind::U32)
        );
        assert_eq!(PrimitiveKind::from_name("String"), None);
    }

    #[test]
    fn widening_conversion() {
        let v = PrimitiveKind::I64.convert(&Value::I32(-7)).unwrap();
        assert_eq!(v, Value::I64(-7));
        let f = PrimitiveKind::F64.convert(&Value::I16(3)).unwrap();
        assert_eq!(f, Value::F64(3.0));
    }

    #[test]
    fn narrowing_out_of_range_fails() {
        assert!(PrimitiveKind::I8.convert(&Value::I32(300)).is_err());
        assert!(PrimitiveKind::U16.convert(&Value::I32(-1)).is_err());
        assert!(PrimitiveKind::I32.convert(&Value::F64(1.5)).is_err());
        assert_eq!(
            PrimitiveKind::I32.convert(&Value::F64(2.0)).unwrap(),
            Value::I32(2)
        );
    }

    #[test]
    fn bool_and_char_conversions() {
        assert_eq!(
            PrimitiveKind::Bool.convert(&Value::U8(1)).unwrap(),
            Value::Bool(true)
        );
        assert!(PrimitiveKind::Bool.convert(&Value::U8(2)).is_err());
        assert_eq!(
            PrimitiveKind::U32.convert(&Value::Char('A')).unwrap(),
            Value::U32(65)
        );
        assert!(PrimitiveKind::I64.accepts(PrimitiveKind::Bool));
        assert!(!PrimitiveKind::Char.accepts(PrimitiveKind::Bool));
    }
}
