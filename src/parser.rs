//! Tolerant parsing of truncated JSON text
//!
//! A streamed response body is re-parsed after every chunk. At any point
//! the text seen so far is a prefix of a valid document, so the parser
//! reads as much structure as it can and closes whatever is still open:
//!
//! - an unterminated string keeps the characters read so far (a cut-off
//!   escape sequence is dropped),
//! - an unterminated array or object keeps its fully started elements,
//! - a dangling comma, a cut-off key, or a key with no value yet is
//!   dropped,
//! - a cut-off `true`/`false`/`null` completes to the literal and a
//!   cut-off number keeps its longest valid numeric prefix.
//!
//! Text that cannot be a prefix of any JSON document is rejected with a
//! [`SyntaxError`]. Every call runs in a single forward pass over the
//! input.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// Maximum nesting of arrays and objects
pub const MAX_DEPTH: usize = 128;

/// Text that is not a prefix of any JSON document
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{kind} at byte {offset}")]
pub struct SyntaxError {
    /// Byte offset of the offending input
    pub offset: usize,
    /// What went wrong
    pub kind: SyntaxErrorKind,
}

/// Kinds of [`SyntaxError`]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxErrorKind {
    /// A character that cannot start or continue a value here
    #[error("unexpected character")]
    UnexpectedCharacter,
    /// Raw control character inside a string
    #[error("control character in string")]
    ControlCharacter,
    /// Unknown escape or malformed `\u` escape
    #[error("invalid escape")]
    InvalidEscape,
    /// `\u` escape encoding half of a surrogate pair
    #[error("lone surrogate in escape")]
    LoneSurrogate,
    /// Malformed or out-of-range number
    #[error("invalid number")]
    InvalidNumber,
    /// Characters after a complete top-level value
    #[error("trailing characters")]
    TrailingCharacters,
    /// Nesting deeper than [`MAX_DEPTH`]
    #[error("nesting too deep")]
    DepthLimit,
}

/// Parse a possibly truncated JSON document.
///
/// Returns `Ok(None)` while nothing meaningful has arrived: empty or
/// whitespace-only text, or a top-level array/object that is still open
/// and has no elements.
pub fn parse_partial(text: &str) -> Result<Option<Value>, SyntaxError> {
    let mut parser = Parser::new(text);
    parser.skip_whitespace();
    if parser.peek().is_none() {
        return Ok(None);
    }

    match parser.value()? {
        Parsed::Complete(value) => {
            parser.skip_whitespace();
            if parser.peek().is_some() {
                return Err(parser.error(SyntaxErrorKind::TrailingCharacters));
            }
            Ok(Some(value))
        }
        Parsed::Truncated(Some(Value::Array(items))) if items.is_empty() => Ok(None),
        Parsed::Truncated(Some(Value::Object(map))) if map.is_empty() => Ok(None),
        Parsed::Truncated(value) => Ok(value),
    }
}

/// Stateful wrapper around [`parse_partial`] that retains the last good
/// value.
///
/// A rejected prefix is not fatal: the previous value stays current, so
/// repeated failures are idempotent for the caller.
#[derive(Debug, Default)]
pub struct PartialParser {
    last: Option<Value>,
    rejected: usize,
}

impl PartialParser {
    /// Create a parser with no retained value
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `text` and return the most recent good value
    pub fn parse(&mut self, text: &str) -> Option<&Value> {
        match parse_partial(text) {
            Ok(Some(value)) => self.last = Some(value),
            Ok(None) => {}
            Err(e) => {
                self.rejected += 1;
                debug!(
                    offset = e.offset,
                    rejected = self.rejected,
                    "Keeping previous partial value: {}",
                    e
                );
            }
        }
        self.last.as_ref()
    }

    /// The most recent good value
    pub fn last(&self) -> Option<&Value> {
        self.last.as_ref()
    }

    /// Number of inputs rejected so far
    pub fn rejected(&self) -> usize {
        self.rejected
    }
}

/// Result of parsing one value
enum Parsed<T> {
    /// The value ended before the input did
    Complete(T),
    /// Input ran out inside the value; `None` when nothing usable was read
    Truncated(Option<T>),
}

impl<T> Parsed<T> {
    fn map<U>(self, f: impl FnOnce(T) -> U) -> Parsed<U> {
        match self {
            Parsed::Complete(v) => Parsed::Complete(f(v)),
            Parsed::Truncated(v) => Parsed::Truncated(v.map(f)),
        }
    }
}

struct Parser<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn error(&self, kind: SyntaxErrorKind) -> SyntaxError {
        SyntaxError {
            offset: self.pos,
            kind,
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(b' ' | b'\t' | b'\n' | b'\r') = self.peek() {
            self.pos += 1;
        }
    }

    fn value(&mut self) -> Result<Parsed<Value>, SyntaxError> {
        match self.peek() {
            None => Ok(Parsed::Truncated(None)),
            Some(b'{') => self.nested(Self::object),
            Some(b'[') => self.nested(Self::array),
            Some(b'"') => Ok(self.string()?.map(Value::String)),
            Some(b't') => self.literal("true", Value::Bool(true)),
            Some(b'f') => self.literal("false", Value::Bool(false)),
            Some(b'n') => self.literal("null", Value::Null),
            Some(b'-' | b'0'..=b'9') => self.number(),
            Some(_) => Err(self.error(SyntaxErrorKind::UnexpectedCharacter)),
        }
    }

    fn nested(
        &mut self,
        parse: fn(&mut Self) -> Result<Parsed<Value>, SyntaxError>,
    ) -> Result<Parsed<Value>, SyntaxError> {
        if self.depth == MAX_DEPTH {
            return Err(self.error(SyntaxErrorKind::DepthLimit));
        }
        self.depth += 1;
        let parsed = parse(self);
        self.depth -= 1;
        parsed
    }

    fn array(&mut self) -> Result<Parsed<Value>, SyntaxError> {
        self.pos += 1;
        let mut items = Vec::new();

        self.skip_whitespace();
        match self.peek() {
            None => return Ok(Parsed::Truncated(Some(Value::Array(items)))),
            Some(b']') => {
                self.pos += 1;
                return Ok(Parsed::Complete(Value::Array(items)));
            }
            Some(_) => {}
        }

        loop {
            match self.value()? {
                Parsed::Complete(item) => items.push(item),
                Parsed::Truncated(item) => {
                    items.extend(item);
                    return Ok(Parsed::Truncated(Some(Value::Array(items))));
                }
            }

            self.skip_whitespace();
            match self.peek() {
                None => return Ok(Parsed::Truncated(Some(Value::Array(items)))),
                Some(b',') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    match self.peek() {
                        None => return Ok(Parsed::Truncated(Some(Value::Array(items)))),
                        Some(b']') => {
                            return Err(self.error(SyntaxErrorKind::UnexpectedCharacter))
                        }
                        Some(_) => {}
                    }
                }
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Parsed::Complete(Value::Array(items)));
                }
                Some(_) => return Err(self.error(SyntaxErrorKind::UnexpectedCharacter)),
            }
        }
    }

    fn object(&mut self) -> Result<Parsed<Value>, SyntaxError> {
        self.pos += 1;
        let mut map = Map::new();

        self.skip_whitespace();
        match self.peek() {
            None => return Ok(Parsed::Truncated(Some(Value::Object(map)))),
            Some(b'}') => {
                self.pos += 1;
                return Ok(Parsed::Complete(Value::Object(map)));
            }
            Some(b'"') => {}
            Some(_) => return Err(self.error(SyntaxErrorKind::UnexpectedCharacter)),
        }

        loop {
            // A key only counts once its closing quote has arrived.
            let key = match self.string()? {
                Parsed::Complete(key) => key,
                Parsed::Truncated(_) => return Ok(Parsed::Truncated(Some(Value::Object(map)))),
            };

            self.skip_whitespace();
            match self.peek() {
                None => return Ok(Parsed::Truncated(Some(Value::Object(map)))),
                Some(b':') => self.pos += 1,
                Some(_) => return Err(self.error(SyntaxErrorKind::UnexpectedCharacter)),
            }

            self.skip_whitespace();
            match self.value()? {
                Parsed::Complete(value) => {
                    map.insert(key, value);
                }
                Parsed::Truncated(value) => {
                    if let Some(value) = value {
                        map.insert(key, value);
                    }
                    return Ok(Parsed::Truncated(Some(Value::Object(map))));
                }
            }

            self.skip_whitespace();
            match self.peek() {
                None => return Ok(Parsed::Truncated(Some(Value::Object(map)))),
                Some(b',') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    match self.peek() {
                        None => return Ok(Parsed::Truncated(Some(Value::Object(map)))),
                        Some(b'"') => {}
                        Some(_) => {
                            return Err(self.error(SyntaxErrorKind::UnexpectedCharacter))
                        }
                    }
                }
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(Parsed::Complete(Value::Object(map)));
                }
                Some(_) => return Err(self.error(SyntaxErrorKind::UnexpectedCharacter)),
            }
        }
    }

    fn string(&mut self) -> Result<Parsed<String>, SyntaxError> {
        self.pos += 1;
        let mut out = String::new();

        loop {
            let start = self.pos;
            while let Some(b) = self.peek() {
                if b == b'"' || b == b'\\' || b < 0x20 {
                    break;
                }
                self.pos += 1;
            }
            // Stops only on ASCII bytes, so the slice is on char boundaries.
            out.push_str(&self.text[start..self.pos]);

            match self.peek() {
                None => return Ok(Parsed::Truncated(Some(out))),
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(Parsed::Complete(out));
                }
                Some(b'\\') => match self.escape()? {
                    Some(c) => out.push(c),
                    None => return Ok(Parsed::Truncated(Some(out))),
                },
                Some(_) => return Err(self.error(SyntaxErrorKind::ControlCharacter)),
            }
        }
    }

    /// Decode one escape sequence; `None` when the input ends inside it
    fn escape(&mut self) -> Result<Option<char>, SyntaxError> {
        let c = match self.peek_at(1) {
            None => return Ok(None),
            Some(b'"') => '"',
            Some(b'\\') => '\\',
            Some(b'/') => '/',
            Some(b'b') => '\u{8}',
            Some(b'f') => '\u{c}',
            Some(b'n') => '\n',
            Some(b'r') => '\r',
            Some(b't') => '\t',
            Some(b'u') => return self.unicode_escape(),
            Some(_) => return Err(self.error(SyntaxErrorKind::InvalidEscape)),
        };
        self.pos += 2;
        Ok(Some(c))
    }

    fn unicode_escape(&mut self) -> Result<Option<char>, SyntaxError> {
        let Some(high) = self.hex4(2)? else {
            return Ok(None);
        };

        let code = match high {
            0xD800..=0xDBFF => {
                match (self.peek_at(6), self.peek_at(7)) {
                    (None, _) | (Some(b'\\'), None) => return Ok(None),
                    (Some(b'\\'), Some(b'u')) => {}
                    _ => return Err(self.error(SyntaxErrorKind::LoneSurrogate)),
                }
                let Some(low) = self.hex4(8)? else {
                    return Ok(None);
                };
                if !(0xDC00..=0xDFFF).contains(&low) {
                    return Err(self.error(SyntaxErrorKind::LoneSurrogate));
                }
                self.pos += 12;
                0x10000 + ((u32::from(high) - 0xD800) << 10) + (u32::from(low) - 0xDC00)
            }
            0xDC00..=0xDFFF => return Err(self.error(SyntaxErrorKind::LoneSurrogate)),
            _ => {
                self.pos += 6;
                u32::from(high)
            }
        };

        char::from_u32(code)
            .map(Some)
            .ok_or_else(|| self.error(SyntaxErrorKind::InvalidEscape))
    }

    /// Read four hex digits starting `offset` bytes past the cursor
    fn hex4(&self, offset: usize) -> Result<Option<u16>, SyntaxError> {
        let mut code = 0u16;
        for i in 0..4 {
            let Some(b) = self.peek_at(offset + i) else {
                return Ok(None);
            };
            let digit = (b as char)
                .to_digit(16)
                .ok_or_else(|| self.error(SyntaxErrorKind::InvalidEscape))?;
            code = (code << 4) | digit as u16;
        }
        Ok(Some(code))
    }

    fn literal(&mut self, word: &str, value: Value) -> Result<Parsed<Value>, SyntaxError> {
        let rest = &self.bytes[self.pos..];
        let n = rest.len().min(word.len());
        if rest[..n] != word.as_bytes()[..n] {
            return Err(self.error(SyntaxErrorKind::UnexpectedCharacter));
        }

        self.pos += n;
        if n < word.len() {
            Ok(Parsed::Truncated(Some(value)))
        } else {
            Ok(Parsed::Complete(value))
        }
    }

    fn number(&mut self) -> Result<Parsed<Value>, SyntaxError> {
        let start = self.pos;

        if self.peek() == Some(b'-') {
            self.pos += 1;
        }

        match self.peek() {
            None => return Ok(Parsed::Truncated(None)),
            Some(b'0') => self.pos += 1,
            Some(b'1'..=b'9') => self.skip_digits(),
            Some(_) => return Err(self.error(SyntaxErrorKind::InvalidNumber)),
        }
        // End of the longest prefix that is itself a valid number
        let mut valid_end = self.pos;

        if self.peek() == Some(b'.') {
            self.pos += 1;
            match self.peek() {
                None => return self.truncated_number(start, valid_end),
                Some(b'0'..=b'9') => self.skip_digits(),
                Some(_) => return Err(self.error(SyntaxErrorKind::InvalidNumber)),
            }
            valid_end = self.pos;
        }

        if let Some(b'e' | b'E') = self.peek() {
            self.pos += 1;
            if let Some(b'+' | b'-') = self.peek() {
                self.pos += 1;
            }
            match self.peek() {
                None => return self.truncated_number(start, valid_end),
                Some(b'0'..=b'9') => self.skip_digits(),
                Some(_) => return Err(self.error(SyntaxErrorKind::InvalidNumber)),
            }
            valid_end = self.pos;
        }

        if self.peek().is_none() {
            // More digits may still arrive.
            return self.truncated_number(start, valid_end);
        }

        Ok(Parsed::Complete(self.number_value(start, valid_end)?))
    }

    fn skip_digits(&mut self) {
        while let Some(b'0'..=b'9') = self.peek() {
            self.pos += 1;
        }
    }

    fn truncated_number(&self, start: usize, end: usize) -> Result<Parsed<Value>, SyntaxError> {
        Ok(Parsed::Truncated(Some(self.number_value(start, end)?)))
    }

    fn number_value(&self, start: usize, end: usize) -> Result<Value, SyntaxError> {
        serde_json::from_str::<Value>(&self.text[start..end]).map_err(|_| SyntaxError {
            offset: start,
            kind: SyntaxErrorKind::InvalidNumber,
        })
    }
}
