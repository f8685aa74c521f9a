//! Type descriptions and the type dictionary.
//!
//! A [`TypeDescription`] is the persistent shape of one type version: its
//! type id, its name, and its ordered [`Member`]s. Every shape a type has had
//! is kept in its [`TypeLineage`]; all lineages together form the
//! [`TypeDictionary`], the catalog that maps type ids to shapes.
//!
//! The dictionary is persisted as text:
//!
//! ```text
//! 0000000000001000001 app.Person {
//! 	[char]   name
//! 	i32      age
//! 	app.Node next
//! }
//! ```
//!
//! # Modules
//!
//! - [`member`] — The [`Member`] union and its equality notions
//! - [`description`] — [`TypeDescription`]
//! - [`lineage`] — [`TypeLineage`]
//! - [`dictionary`] — [`TypeDictionary`]
//! - [`assembler`] / [`parser`] — The text codec
//! - [`storage`] — [`DictionaryStorage`] for loading and storing the text

pub mod assembler;
pub mod description;
pub mod dictionary;
pub mod error;
pub mod lineage;
pub mod member;
pub mod parser;
pub mod storage;

pub use assembler::{assemble, assemble_description};
pub use description::TypeDescription;
pub use dictionary::TypeDictionary;
pub use error::{DictionaryError, DictionaryResult, ParseError, ParseErrorKind};
pub use lineage::TypeLineage;
pub use member::{
    equal_structures, ComplexMember, EnumConstant, FieldMember, Member, PrimitiveDefinition,
    VariableLengthKind, VariableLengthMember,
};
pub use parser::{parse, parse_dictionary};
pub use storage::{DictionaryStorage, FileDictionaryStorage, InMemoryDictionaryStorage};
