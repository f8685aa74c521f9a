//! Dictionary text parsing.
//!
//! The parser is line oriented but tolerant of layout: runs of whitespace
//! collapse, spaces around `#` are ignored, and the `{` opening a type body
//! may sit alone on the following line. Anything after a closing `}` or `]`
//! on the same line is rejected. Error offsets count characters, not bytes.

use keel_types::{PrimitiveKind, TypeId};

use crate::description::TypeDescription;
use crate::dictionary::TypeDictionary;
use crate::error::{DictionaryResult, ParseError, ParseErrorKind};
use crate::member::{
    ComplexMember, FieldMember, Member, PrimitiveDefinition, VariableLengthKind,
    VariableLengthMember, COMPLEX_TYPE_NAME, KEYWORD_ENUM, KEYWORD_PRIMITIVE,
    QUALIFIER_SEPARATOR,
};

/// Parse dictionary text into its type descriptions, in text order.
pub fn parse(input: &str) -> DictionaryResult<Vec<TypeDescription>> {
    Ok(Parser::new(input).parse_all()?)
}

/// Parse dictionary text into a [`TypeDictionary`].
pub fn parse_dictionary(input: &str) -> DictionaryResult<TypeDictionary> {
    TypeDictionary::from_descriptions(parse(input)?)
}

#[derive(Clone, Copy)]
struct Line<'a> {
    /// Byte offset of the line start.
    offset: usize,
    text: &'a str,
}

impl Line<'_> {
    fn end(&self) -> usize {
        self.offset + self.text.len()
    }
}

#[derive(Clone, Copy, Debug)]
struct Token<'a> {
    /// Byte offset of the token start.
    offset: usize,
    text: &'a str,
}

impl Token<'_> {
    fn end(&self) -> usize {
        self.offset + self.text.len()
    }
}

struct Parser<'a> {
    input: &'a str,
    lines: Vec<Line<'a>>,
    next: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        let mut lines = Vec::new();
        let mut offset = 0;
        for raw in input.split('\n') {
            let text = raw.strip_suffix('\r').unwrap_or(raw);
            lines.push(Line { offset, text });
            offset += raw.len() + 1;
        }
        Self {
            input,
            lines,
            next: 0,
        }
    }

    fn error(&self, byte_offset: usize, kind: ParseErrorKind) -> ParseError {
        let end = byte_offset.min(self.input.len());
        ParseError {
            offset: self.input[..end].chars().count(),
            kind,
        }
    }

    fn unexpected(&self, token: &Token<'_>) -> ParseError {
        self.error(
            token.offset,
            ParseErrorKind::UnexpectedToken(token.text.to_string()),
        )
    }

    fn next_content_line(&mut self) -> Option<Line<'a>> {
        while let Some(line) = self.lines.get(self.next).copied() {
            self.next += 1;
            if !line.text.trim().is_empty() {
                return Some(line);
            }
        }
        None
    }

    fn parse_all(mut self) -> Result<Vec<TypeDescription>, ParseError> {
        let mut descriptions = Vec::new();
        while let Some(header) = self.next_content_line() {
            descriptions.push(self.entry(header)?);
        }
        Ok(descriptions)
    }

    fn entry(&mut self, header: Line<'a>) -> Result<TypeDescription, ParseError> {
        let tokens = split_glued_brace(tokenize(header));
        let id_token = tokens[0];
        if !id_token.text.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(self.error(id_token.offset, ParseErrorKind::MissingTypeId));
        }
        let raw_id = id_token
            .text
            .bytes()
            .all(|b| b.is_ascii_digit())
            .then(|| id_token.text.parse::<u64>().ok())
            .flatten()
            .ok_or_else(|| {
                self.error(
                    id_token.offset,
                    ParseErrorKind::InvalidTypeId(id_token.text.to_string()),
                )
            })?;

        let name = match tokens.get(1) {
            Some(t) if t.text != "{" => *t,
            Some(t) => return Err(self.error(t.offset, ParseErrorKind::MissingTypeName)),
            None => return Err(self.error(header.end(), ParseErrorKind::MissingTypeName)),
        };
        match tokens.get(2) {
            Some(t) if t.text == "{" => {}
            Some(t) => return Err(self.unexpected(t)),
            None => self.detached_body_open()?,
        }
        if let Some(t) = tokens.get(3) {
            return Err(self.unexpected(t));
        }

        let members = self.scope('}')?;
        TypeDescription::new(TypeId::new(raw_id), name.text, members).map_err(|e| {
            self.error(
                id_token.offset,
                ParseErrorKind::InvalidDescription(e.to_string()),
            )
        })
    }

    /// `{` alone on the line after the header.
    fn detached_body_open(&mut self) -> Result<(), ParseError> {
        let Some(line) = self.next_content_line() else {
            return Err(self.error(self.input.len(), ParseErrorKind::IncompleteInput));
        };
        let tokens = tokenize(line);
        match tokens.as_slice() {
            [only] if only.text == "{" => Ok(()),
            [first, second, ..] if first.text == "{" => Err(self.unexpected(second)),
            [first, ..] => Err(self.error(first.offset, ParseErrorKind::MissingBodyOpen)),
            [] => Err(self.error(line.offset, ParseErrorKind::MissingBodyOpen)),
        }
    }

    /// Member lines up to and including the line starting with `close`.
    fn scope(&mut self, close: char) -> Result<Vec<Member>, ParseError> {
        let mut members = Vec::new();
        loop {
            let Some(line) = self.next_content_line() else {
                return Err(self.error(self.input.len(), ParseErrorKind::IncompleteInput));
            };
            let tokens = merge_qualifiers(line, tokenize(line));
            let first = tokens[0];
            if first.text.starts_with(close) {
                let after = first.offset + close.len_utf8();
                let rest = &self.input[after..line.end()];
                if let Some(pos) = rest.find(|c: char| !c.is_whitespace()) {
                    let trailing = rest[pos..].trim_end().to_string();
                    return Err(self.error(after + pos, ParseErrorKind::TrailingContent(trailing)));
                }
                return Ok(members);
            }
            let member = self.member(line, &tokens)?;
            members.push(member);
        }
    }

    fn member(&mut self, line: Line<'a>, tokens: &[Token<'a>]) -> Result<Member, ParseError> {
        let first = tokens[0];
        match first.text {
            KEYWORD_PRIMITIVE => return self.primitive(line, tokens),
            KEYWORD_ENUM => {
                return match tokens {
                    [_] => Err(self.error(line.end(), ParseErrorKind::MissingEnumName)),
                    [_, name] => Ok(Member::enum_constant(name.text)),
                    [_, _, extra, ..] => Err(self.unexpected(extra)),
                    [] => Err(self.error(line.offset, ParseErrorKind::MissingEnumName)),
                };
            }
            "{" | "}" | "[" | "]" => return Err(self.unexpected(&first)),
            _ => {}
        }

        let is_complex = tokens.last().is_some_and(|t| t.text == "[");
        if is_complex {
            let name = match tokens {
                [_, open] if open.text == "[" => {
                    return Err(self.error(open.offset, ParseErrorKind::MissingMemberName))
                }
                [_, name, _] => *name,
                [_, _, extra, ..] => return Err(self.unexpected(extra)),
                _ => return Err(self.unexpected(&first)),
            };
            if first.text != COMPLEX_TYPE_NAME {
                return Err(self.unexpected(&first));
            }
            let (qualifier, name) = self.identifier(&name)?;
            let nested = self.scope(']')?;
            return Ok(Member::Complex(ComplexMember {
                qualifier,
                name,
                nested,
            }));
        }

        let name = match tokens {
            [_] => return Err(self.error(line.end(), ParseErrorKind::MissingMemberName)),
            [_, name] => *name,
            [_, _, extra, ..] => return Err(self.unexpected(extra)),
            [] => return Err(self.error(line.offset, ParseErrorKind::MissingMemberName)),
        };
        let (qualifier, name) = self.identifier(&name)?;
        if let Some(kind) = VariableLengthKind::from_type_name(first.text) {
            return Ok(Member::VariableLength(VariableLengthMember {
                kind,
                qualifier,
                name,
            }));
        }
        if first.text == COMPLEX_TYPE_NAME {
            return Err(self.unexpected(&first));
        }
        let mut field = FieldMember::from_type_name(first.text, name);
        field.qualifier = qualifier;
        Ok(Member::Field(field))
    }

    fn primitive(&self, line: Line<'a>, tokens: &[Token<'a>]) -> Result<Member, ParseError> {
        let Some(start) = tokens.get(1) else {
            return Err(self.error(line.end(), ParseErrorKind::MissingPrimitiveDefinition));
        };
        let definition = tokens[1..]
            .iter()
            .map(|t| t.text)
            .collect::<Vec<_>>()
            .join(" ");
        match PrimitiveKind::from_definition(&definition) {
            Some(kind) => Ok(Member::Primitive(PrimitiveDefinition::of(kind))),
            None => Err(self.error(
                start.offset,
                ParseErrorKind::UnknownPrimitiveDefinition(definition),
            )),
        }
    }

    /// Split `qualifier#name` (possibly padded around `#`).
    fn identifier(&self, token: &Token<'a>) -> Result<(Option<String>, String), ParseError> {
        match token.text.split_once(QUALIFIER_SEPARATOR) {
            None => Ok((None, token.text.to_string())),
            Some((qualifier, name)) => {
                let qualifier = qualifier.trim();
                let name = name.trim();
                if name.is_empty() {
                    return Err(self.error(token.end(), ParseErrorKind::MissingMemberName));
                }
                if qualifier.is_empty() {
                    return Err(self.unexpected(token));
                }
                Ok((Some(qualifier.to_string()), name.to_string()))
            }
        }
    }
}

/// Whitespace-separated tokens of a line.
fn tokenize(line: Line<'_>) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (i, c) in line.text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                tokens.push(Token {
                    offset: line.offset + s,
                    text: &line.text[s..i],
                });
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        tokens.push(Token {
            offset: line.offset + s,
            text: &line.text[s..],
        });
    }
    tokens
}

/// Join tokens separated by padding around `#` into one qualified-name token.
/// The merged token spans the original line text, padding included.
fn merge_qualifiers<'a>(line: Line<'a>, tokens: Vec<Token<'a>>) -> Vec<Token<'a>> {
    let mut merged: Vec<Token<'a>> = Vec::with_capacity(tokens.len());
    for token in tokens {
        if let Some(last) = merged.last_mut() {
            if token.text.starts_with(QUALIFIER_SEPARATOR)
                || last.text.ends_with(QUALIFIER_SEPARATOR)
            {
                last.text = &line.text[last.offset - line.offset..token.end() - line.offset];
                continue;
            }
        }
        merged.push(token);
    }
    merged
}

/// A `{` glued to the type name on a header line becomes its own token.
fn split_glued_brace(mut tokens: Vec<Token<'_>>) -> Vec<Token<'_>> {
    if let Some(last) = tokens.last().copied() {
        if last.text.len() > 1 && last.text.ends_with('{') {
            let cut = last.text.len() - 1;
            tokens.pop();
            tokens.push(Token {
                offset: last.offset,
                text: &last.text[..cut],
            });
            tokens.push(Token {
                offset: last.offset + cut,
                text: "{",
            });
        }
    }
    tokens
}
