use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use keel_types::{ObjectId, PersistentId, TypeId};
use serde::{Deserialize, Serialize};

use crate::error::{IdError, IdResult};
use crate::file::FileIdProvider;
use crate::provider::{FailingIdProvider, IdProvider, TransientIdProvider};

/// How a persistence context allocates ids.
///
/// Text form: `<Name>(<args>)` or a bare `<Name>`. An argument is either
/// bare, with surrounding whitespace ignored, or `"`-quoted with `\`
/// escaping the next character. `File` paths that would not read back
/// unchanged from the bare form are written quoted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IdStrategy {
    /// In-memory counter. Without a seed the id kind's default start is used.
    Transient { seed: Option<u64> },
    /// No allocation allowed.
    None,
    /// Durable counter file.
    File { path: PathBuf },
}

impl IdStrategy {
    pub const TRANSIENT: &'static str = "Transient";
    pub const NONE: &'static str = "None";
    pub const FILE: &'static str = "File";

    pub fn transient(seed: u64) -> Self {
        Self::Transient { seed: Some(seed) }
    }

    /// Build a provider for ids of kind `I`.
    pub fn create_provider<I: PersistentId>(&self) -> IdResult<Box<dyn IdProvider<I>>> {
        Ok(match self {
            Self::Transient { seed } => Box::new(TransientIdProvider::<I>::new(
                seed.unwrap_or(I::DEFAULT_START),
            )),
            Self::None => Box::new(FailingIdProvider::<I>::new()),
            Self::File { path } => Box::new(FileIdProvider::<I>::open(path, I::DEFAULT_START)?),
        })
    }

    /// Parse the text form.
    pub fn parse(input: &str) -> IdResult<Self> {
        let chars: Vec<char> = input.chars().collect();
        let mut cursor = Cursor::new(&chars, 0);
        let strategy = cursor.strategy()?;
        cursor.skip_ws();
        cursor.expect_end()?;
        Ok(strategy)
    }
}

impl Default for IdStrategy {
    fn default() -> Self {
        Self::Transient { seed: None }
    }
}

impl fmt::Display for IdStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient { seed: Some(seed) } => write!(f, "{}({seed})", Self::TRANSIENT),
            Self::Transient { seed: None } => f.write_str(Self::TRANSIENT),
            Self::None => f.write_str(Self::NONE),
            Self::File { path } => {
                let text = path.to_string_lossy();
                if needs_quotes(&text) {
                    write!(f, "{}({})", Self::FILE, quote(&text))
                } else {
                    write!(f, "{}({text})", Self::FILE)
                }
            }
        }
    }
}

impl FromStr for IdStrategy {
    type Err = IdError;

    fn from_str(s: &str) -> IdResult<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for IdStrategy {
    type Error = IdError;

    fn try_from(value: String) -> IdResult<Self> {
        Self::parse(&value)
    }
}

impl From<IdStrategy> for String {
    fn from(value: IdStrategy) -> Self {
        value.to_string()
    }
}

/// The type id and object id strategies of one persistence context.
///
/// Text form: `Type:'<strategy>', Object:'<strategy>'`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdStrategyPair {
    pub type_strategy: IdStrategy,
    pub object_strategy: IdStrategy,
}

impl IdStrategyPair {
    const TYPE_KEY: &'static str = "Type";
    const OBJECT_KEY: &'static str = "Object";

    pub fn new(type_strategy: IdStrategy, object_strategy: IdStrategy) -> Self {
        Self {
            type_strategy,
            object_strategy,
        }
    }

    pub fn create_type_id_provider(&self) -> IdResult<Box<dyn IdProvider<TypeId>>> {
        self.type_strategy.create_provider::<TypeId>()
    }

    pub fn create_object_id_provider(&self) -> IdResult<Box<dyn IdProvider<ObjectId>>> {
        self.object_strategy.create_provider::<ObjectId>()
    }

    /// Parse the text form. Both keys are required, in either order.
    pub fn parse(input: &str) -> IdResult<Self> {
        let chars: Vec<char> = input.chars().collect();
        let mut cursor = Cursor::new(&chars, 0);
        let mut type_strategy = None;
        let mut object_strategy = None;

        for index in 0..2 {
            cursor.skip_ws();
            if index == 1 {
                cursor.expect_char(',')?;
                cursor.skip_ws();
            }
            let key_offset = cursor.pos;
            let key = cursor.name()?;
            cursor.skip_ws();
            cursor.expect_char(':')?;
            cursor.skip_ws();
            cursor.expect_char('\'')?;
            let strategy = cursor.strategy()?;
            cursor.skip_ws();
            cursor.expect_char('\'')?;

            let slot = match key.as_str() {
                Self::TYPE_KEY => &mut type_strategy,
                Self::OBJECT_KEY => &mut object_strategy,
                _ => {
                    return Err(IdError::Parse {
                        offset: key_offset,
                        reason: format!("unknown key '{key}', expected Type or Object"),
                    })
                }
            };
            if slot.replace(strategy).is_some() {
                return Err(IdError::Parse {
                    offset: key_offset,
                    reason: format!("duplicate key '{key}'"),
                });
            }
        }
        cursor.skip_ws();
        cursor.expect_end()?;

        match (type_strategy, object_strategy) {
            (Some(type_strategy), Some(object_strategy)) => {
                Ok(Self::new(type_strategy, object_strategy))
            }
            _ => Err(IdError::Parse {
                offset: cursor.pos,
                reason: "both Type and Object strategies are required".to_string(),
            }),
        }
    }
}

impl fmt::Display for IdStrategyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:'{}', {}:'{}'",
            Self::TYPE_KEY,
            self.type_strategy,
            Self::OBJECT_KEY,
            self.object_strategy
        )
    }
}

impl FromStr for IdStrategyPair {
    type Err = IdError;

    fn from_str(s: &str) -> IdResult<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for IdStrategyPair {
    type Error = IdError;

    fn try_from(value: String) -> IdResult<Self> {
        Self::parse(&value)
    }
}

impl From<IdStrategyPair> for String {
    fn from(value: IdStrategyPair) -> Self {
        value.to_string()
    }
}

const QUOTE: char = '"';
const ESCAPE: char = '\\';

fn needs_quotes(text: &str) -> bool {
    text.is_empty()
        || text.trim() != text
        || text.chars().any(|c| matches!(c, '(' | ')' | '\'' | QUOTE))
}

fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(QUOTE);
    for c in text.chars() {
        if c == QUOTE || c == ESCAPE {
            out.push(ESCAPE);
        }
        out.push(c);
    }
    out.push(QUOTE);
    out
}

/// Character cursor; offsets in errors are character offsets into the input.
struct Cursor<'a> {
    chars: &'a [char],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(chars: &'a [char], pos: usize) -> Self {
        Self { chars, pos }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn error(&self, reason: impl Into<String>) -> IdError {
        IdError::Parse {
            offset: self.pos,
            reason: reason.into(),
        }
    }

    fn expect_char(&mut self, expected: char) -> IdResult<()> {
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected '{expected}', found '{c}'"))),
            None => Err(self.error(format!("expected '{expected}', found end of input"))),
        }
    }

    fn expect_end(&self) -> IdResult<()> {
        match self.peek() {
            None => Ok(()),
            Some(c) => Err(self.error(format!("unexpected trailing content '{c}'"))),
        }
    }

    fn name(&mut self) -> IdResult<String> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("expected a name"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    /// The argument between `(` and `)` with its offset, or `None` when
    /// there is no `(`.
    fn arguments(&mut self) -> IdResult<Option<(usize, String)>> {
        self.skip_ws();
        if self.peek() != Some('(') {
            return Ok(None);
        }
        self.pos += 1;
        self.skip_ws();
        let start = self.pos;
        if self.peek() == Some(QUOTE) {
            let text = self.quoted()?;
            self.skip_ws();
            self.expect_char(')')?;
            return Ok(Some((start, text)));
        }
        while let Some(c) = self.peek() {
            match c {
                ')' => {
                    let args: String = self.chars[start..self.pos].iter().collect();
                    self.pos += 1;
                    return Ok(Some((start, args.trim_end().to_string())));
                }
                '(' | '\'' | QUOTE => {
                    return Err(self.error(format!(
                        "unexpected '{c}' in arguments, quote the argument with \""
                    )))
                }
                _ => self.pos += 1,
            }
        }
        Err(self.error("missing closing ')'"))
    }

    fn quoted(&mut self) -> IdResult<String> {
        let start = self.pos;
        self.expect_char(QUOTE)?;
        let mut text = String::new();
        loop {
            match self.peek() {
                Some(QUOTE) => {
                    self.pos += 1;
                    return Ok(text);
                }
                Some(ESCAPE) => {
                    self.pos += 1;
                    match self.peek() {
                        Some(c) => {
                            text.push(c);
                            self.pos += 1;
                        }
                        None => break,
                    }
                }
                Some(c) => {
                    text.push(c);
                    self.pos += 1;
                }
                None => break,
            }
        }
        Err(IdError::Parse {
            offset: start,
            reason: "unterminated quoted argument".to_string(),
        })
    }

    fn strategy(&mut self) -> IdResult<IdStrategy> {
        self.skip_ws();
        let name_offset = self.pos;
        let name = self.name()?;
        let args = self.arguments()?;

        match name.as_str() {
            IdStrategy::TRANSIENT => match args {
                None => Ok(IdStrategy::Transient { seed: None }),
                Some((_, text)) if text.is_empty() => Ok(IdStrategy::Transient { seed: None }),
                Some((offset, text)) => {
                    let seed = text.parse::<u64>().map_err(|_| IdError::Parse {
                        offset,
                        reason: format!("invalid seed '{text}'"),
                    })?;
                    Ok(IdStrategy::Transient { seed: Some(seed) })
                }
            },
            IdStrategy::NONE => match args {
                Some((offset, text)) if !text.is_empty() => Err(IdError::Parse {
                    offset,
                    reason: format!("None takes no arguments, found '{text}'"),
                }),
                _ => Ok(IdStrategy::None),
            },
            IdStrategy::FILE => match args {
                Some((_, text)) if !text.is_empty() => Ok(IdStrategy::File {
                    path: PathBuf::from(text),
                }),
                _ => Err(IdError::Parse {
                    offset: self.pos,
                    reason: "File requires a path argument".to_string(),
                }),
            },
            _ => Err(IdError::UnknownStrategy {
                name,
                offset: name_offset,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn parse_transient_with_seed() {
        assert_eq!(
            IdStrategy::parse("Transient(1000)").unwrap(),
            IdStrategy::transient(1000)
        );
        assert_eq!(
            IdStrategy::parse("  Transient ( 42 ) ").unwrap(),
            IdStrategy::transient(42)
        );
        assert_eq!(
            IdStrategy::parse("Transient").unwrap(),
            IdStrategy::Transient { seed: None }
        );
    }

    #[test]
    fn parse_none_and_file() {
        assert_eq!(IdStrategy::parse("None").unwrap(), IdStrategy::None);
        assert_eq!(IdStrategy::parse("None()").unwrap(), IdStrategy::None);
        assert_eq!(
            IdStrategy::parse("File(data/oids)").unwrap(),
            IdStrategy::File {
                path: PathBuf::from("data/oids")
            }
        );
        assert!(IdStrategy::parse("File()").is_err());
    }

    #[test]
    fn assemble_is_symmetric() {
        for text in ["Transient(1000)", "Transient", "None", "File(x/y)"] {
            let parsed = IdStrategy::parse(text).unwrap();
            assert_eq!(parsed.to_string(), text);
        }
    }

    #[test]
    fn file_paths_with_special_characters_round_trip() {
        for path in [
            "ids (old)/counter",
            "it's/ids",
            " lead",
            "trail ",
            "say \"hi\"",
            "C:\\data\\ids",
            "\"starts-quoted",
        ] {
            let strategy = IdStrategy::File { path: PathBuf::from(path) };
            let text = strategy.to_string();
            assert_eq!(IdStrategy::parse(&text).unwrap(), strategy, "{text}");

            let pair = IdStrategyPair::new(strategy.clone(), IdStrategy::None);
            assert_eq!(IdStrategyPair::parse(&pair.to_string()).unwrap(), pair);
        }
    }

    #[test]
    fn quoted_and_bare_arguments() {
        assert_eq!(IdStrategy::parse("File(plain/ids)").unwrap().to_string(), "File(plain/ids)");
        assert_eq!(
            IdStrategy::parse(r#"File( "a (b)" )"#).unwrap(),
            IdStrategy::File { path: PathBuf::from("a (b)") }
        );
        assert_eq!(IdStrategy::parse(r#"Transient("12")"#).unwrap(), IdStrategy::transient(12));

        match IdStrategy::parse("File(it's)").unwrap_err() {
            IdError::Parse { offset, reason } => {
                assert_eq!(offset, 7);
                assert!(reason.contains("quote"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        match IdStrategy::parse(r#"File("open)"#).unwrap_err() {
            IdError::Parse { offset, reason } => {
                assert_eq!(offset, 5);
                assert!(reason.contains("unterminated"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn quoted_paths_survive_serde() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Holder {
            ids: IdStrategyPair,
        }
        let holder = Holder {
            ids: IdStrategyPair::new(
                IdStrategy::File { path: PathBuf::from("ids (v2)/type's") },
                IdStrategy::transient(9),
            ),
        };
        let json = serde_json::to_string(&holder).unwrap();
        assert_eq!(serde_json::from_str::<Holder>(&json).unwrap(), holder);
    }

    #[test]
    fn unknown_name_reports_offset() {
        let err = IdStrategy::parse("  Sequential(5)").unwrap_err();
        match err {
            IdError::UnknownStrategy { name, offset } => {
                assert_eq!(name, "Sequential");
                assert_eq!(offset, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let err = IdStrategy::parse("Transient(1000)x").unwrap_err();
        match err {
            IdError::Parse { offset, .. } => assert_eq!(offset, 15),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(IdStrategy::parse("Transient(10").is_err());
        assert!(IdStrategy::parse("Transient(abc)").is_err());
        assert!(IdStrategy::parse("None(1)").is_err());
        assert!(IdStrategy::parse("").is_err());
    }

    #[test]
    fn create_providers_from_strategy() {
        let provider = IdStrategy::transient(10)
            .create_provider::<TypeId>()
            .unwrap();
        assert_eq!(provider.provide_next_id().unwrap(), TypeId::new(11));
        let failing = IdStrategy::None.create_provider::<ObjectId>().unwrap();
        assert!(failing.provide_next_id().is_err());
    }

    // ---- Combined form ----

    #[test]
    fn pair_round_trip() {
        let text = "Type:'Transient(1000000)', Object:'None'";
        let pair = IdStrategyPair::parse(text).unwrap();
        assert_eq!(pair.type_strategy, IdStrategy::transient(1_000_000));
        assert_eq!(pair.object_strategy, IdStrategy::None);
        assert_eq!(pair.to_string(), text);
    }

    #[test]
    fn pair_accepts_either_order() {
        let pair = IdStrategyPair::parse("Object:'Transient(5)' , Type:'None'").unwrap();
        assert_eq!(pair.type_strategy, IdStrategy::None);
        assert_eq!(pair.object_strategy, IdStrategy::transient(5));
    }

    #[test]
    fn pair_rejects_missing_or_duplicate_keys() {
        assert!(IdStrategyPair::parse("Type:'None'").is_err());
        assert!(IdStrategyPair::parse("Type:'None', Type:'None'").is_err());
        assert!(IdStrategyPair::parse("Kind:'None', Object:'None'").is_err());
        assert!(IdStrategyPair::parse("Type:'None', Object:'None' extra").is_err());
    }

    #[test]
    fn strategy_serializes_as_text() {
        #[derive(Serialize, Deserialize)]
        struct Holder {
            ids: IdStrategy,
        }
        let holder = Holder {
            ids: IdStrategy::transient(7),
        };
        let json = serde_json::to_string(&holder).unwrap();
        assert_eq!(json, r#"{"ids":"Transient(7)"}"#);
        let back: Holder = serde_json::from_str(r#"{"ids":"None"}"#).unwrap();
        assert_eq!(back.ids, IdStrategy::None);
    }

    proptest! {
        #[test]
        fn any_file_path_reads_back(path in "\\PC{1,24}") {
            let strategy = IdStrategy::File { path: PathBuf::from(&path) };
            prop_assert_eq!(IdStrategy::parse(&strategy.to_string()).unwrap(), strategy);
        }
    }
}
