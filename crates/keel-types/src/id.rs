use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypesError;

/// Base of the type id range. Type ids are in `(TYPE_ID_BASE, OBJECT_ID_BASE]`.
pub const TYPE_ID_BASE: u64 = 0;

/// Highest type id reserved for built-in types. New types are numbered above it.
pub const TYPE_ID_RESERVED_BOUND: u64 = 1_000_000;

/// Base of the object id range. Object ids are in `(OBJECT_ID_BASE, CONSTANT_ID_BASE]`.
pub const OBJECT_ID_BASE: u64 = 1_000_000_000_000_000_000;

/// Base of the constant id range.
pub const CONSTANT_ID_BASE: u64 = 9_000_000_000_000_000_000;

/// Exclusive upper bound of the constant id range.
pub const CONSTANT_ID_BOUND: u64 = 9_100_000_000_000_000_000;

/// Which range a raw id value belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdKind {
    /// The null id `0`.
    Null,
    /// A type id.
    Type,
    /// An object id.
    Object,
    /// A constant id.
    Constant,
    /// Above every defined range.
    Undefined,
}

impl IdKind {
    /// Classify a raw id value.
    pub fn of(value: u64) -> Self {
        match value {
            0 => Self::Null,
            v if v <= OBJECT_ID_BASE => Self::Type,
            v if v <= CONSTANT_ID_BASE => Self::Object,
            v if v < CONSTANT_ID_BOUND => Self::Constant,
            _ => Self::Undefined,
        }
    }
}

/// Common surface of the numeric persistent id newtypes.
///
/// Id providers are generic over this trait so that one counter
/// implementation serves both type ids and object ids.
pub trait PersistentId:
    Copy + Eq + Ord + std::hash::Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Human-readable name of the id kind, used in error messages.
    const LABEL: &'static str;

    /// The first id handed out by a fresh transient provider.
    const DEFAULT_START: u64;

    /// Wrap a raw value without range checks.
    fn from_raw(raw: u64) -> Self;

    /// The raw value.
    fn raw(self) -> u64;
}

/// Numeric identifier of a persisted object instance.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(u64);

impl ObjectId {
    /// The null object id. Persisted references to "nothing" use it.
    pub const NULL: Self = Self(0);

    /// Wrap a raw value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Wrap a raw value, rejecting anything outside the object and constant ranges.
    pub fn checked(raw: u64) -> Result<Self, TypesError> {
        match IdKind::of(raw) {
            IdKind::Object | IdKind::Constant => Ok(Self(raw)),
            _ => Err(TypesError::IdOutOfRange {
                value: raw,
                expected: Self::LABEL,
            }),
        }
    }

    /// The raw value.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns `true` for the null id.
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if the id is in the constant range.
    pub fn is_constant(self) -> bool {
        IdKind::of(self.0) == IdKind::Constant
    }
}

impl PersistentId for ObjectId {
    const LABEL: &'static str = "object";
    const DEFAULT_START: u64 = OBJECT_ID_BASE;

    fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ObjectId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Numeric identifier of a persisted type shape.
///
/// `Display` renders the 19-digit zero-padded form used by the dictionary text.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeId(u64);

impl TypeId {
    /// Width of the padded textual form.
    pub const PADDED_WIDTH: usize = 19;

    /// The null type id.
    pub const NULL: Self = Self(0);

    /// Wrap a raw value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Wrap a raw value, rejecting anything outside the type range.
    pub fn checked(raw: u64) -> Result<Self, TypesError> {
        match IdKind::of(raw) {
            IdKind::Type => Ok(Self(raw)),
            _ => Err(TypesError::IdOutOfRange {
                value: raw,
                expected: Self::LABEL,
            }),
        }
    }

    /// The raw value.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns `true` for the null id.
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl PersistentId for TypeId {
    const LABEL: &'static str = "type";
    const DEFAULT_START: u64 = TYPE_ID_RESERVED_BOUND;

    fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$}", self.0, width = Self::PADDED_WIDTH)
    }
}

impl From<u64> for TypeId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_ranges() {
        assert_eq!(IdKind::of(0), IdKind::Null);
        assert_eq!(IdKind::of(1), IdKind::Type);
        assert_eq!(IdKind::of(1_000_001), IdKind::Type);
        assert_eq!(IdKind::of(OBJECT_ID_BASE + 1), IdKind::Object);
        assert_eq!(IdKind::of(CONSTANT_ID_BASE + 1), IdKind::Constant);
        assert_eq!(IdKind::of(CONSTANT_ID_BOUND), IdKind::Undefined);
    }

    #[test]
    fn checked_constructors_respect_ranges() {
        assert!(TypeId::checked(1_000_001).is_ok());
        assert!(TypeId::checked(OBJECT_ID_BASE + 5).is_err());
        assert!(ObjectId::checked(OBJECT_ID_BASE + 5).is_ok());
        assert!(ObjectId::checked(CONSTANT_ID_BASE + 5).unwrap().is_constant());
        assert!(ObjectId::checked(0).is_err());
    }

    #[test]
    fn type_id_displays_padded() {
        assert_eq!(TypeId::new(1_000_001).to_string(), "0000000000001000001");
        assert_eq!(ObjectId::new(42).to_string(), "42");
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&ObjectId::new(7)).unwrap();
        assert_eq!(json, "7");
    }
}
