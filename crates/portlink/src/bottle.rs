// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bottle: ordered list of typed values.
//!
//! Used as the payload for name-service commands and replies. The text form
//! is whitespace separated, with nested lists in parentheses:
//!
//! ```text
//! register /foo tcp 127.0.0.1 10002
//! (port (name /foo) (ip 127.0.0.1) (port_number 10002) (carrier tcp))
//! ```

use std::fmt;

/// A single bottle element.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    List(Bottle),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Bottle> {
        match self {
            Self::List(b) => Some(b),
            _ => None,
        }
    }

    /// Text rendering of any value; strings come back unquoted.
    pub fn to_plain_string(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => {
                if v.is_finite() && v.fract() == 0.0 {
                    write!(f, "{:.1}", v)
                } else {
                    write!(f, "{}", v)
                }
            }
            Self::Str(s) => {
                if needs_quotes(s) {
                    write_quoted(f, s)
                } else {
                    f.write_str(s)
                }
            }
            Self::List(b) => write!(f, "({})", b),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Bottle> for Value {
    fn from(v: Bottle) -> Self {
        Self::List(v)
    }
}

/// Parse failure for the bottle text form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BottleParseError(pub String);

impl fmt::Display for BottleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bottle parse error: {}", self.0)
    }
}

impl std::error::Error for BottleParseError {}

/// Ordered list of [`Value`]s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bottle {
    items: Vec<Value>,
}

impl Bottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the text form.
    pub fn from_text(text: &str) -> Result<Self, BottleParseError> {
        let mut parser = Parser {
            chars: text.chars().collect(),
            pos: 0,
        };
        let bottle = parser.list(0)?;
        Ok(bottle)
    }

    /// Parse a UTF-8 payload in text form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BottleParseError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| BottleParseError(format!("invalid utf-8: {}", e)))?;
        Self::from_text(text.trim_end_matches(['\r', '\n', '\0']))
    }

    pub fn to_text(&self) -> String {
        self.to_string()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    pub fn push(&mut self, value: impl Into<Value>) -> &mut Self {
        self.items.push(value.into());
        self
    }

    /// Builder form of [`Bottle::push`].
    pub fn with(mut self, value: impl Into<Value>) -> Self {
        self.items.push(value.into());
        self
    }

    /// Append a `(key value)` sublist.
    pub fn push_pair(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        let pair = Bottle::new().with(key).with(value);
        self.items.push(Value::List(pair));
        self
    }

    /// String at `index`, if that element is a string.
    pub fn get_str(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(Value::as_str)
    }

    /// Integer at `index`, if that element is numeric.
    pub fn get_int(&self, index: usize) -> Option<i64> {
        self.get(index).and_then(Value::as_int)
    }

    /// Look up `key`, either as `key value` at this level or as a
    /// `(key value ...)` sublist.
    pub fn find(&self, key: &str) -> Option<&Value> {
        for (i, item) in self.items.iter().enumerate() {
            match item {
                Value::Str(s) if s == key => {
                    if let Some(next) = self.items.get(i + 1) {
                        return Some(next);
                    }
                }
                Value::List(sub) if sub.get_str(0) == Some(key) => {
                    if let Some(v) = sub.get(1) {
                        return Some(v);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// The whole `(key ...)` sublist for `key`.
    pub fn find_group(&self, key: &str) -> Option<&Bottle> {
        self.items.iter().find_map(|item| match item {
            Value::List(sub) if sub.get_str(0) == Some(key) => Some(sub),
            _ => None,
        })
    }

    pub fn check(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    /// Sub-bottle starting at `start`.
    pub fn tail(&self, start: usize) -> Bottle {
        Bottle {
            items: self.items.iter().skip(start).cloned().collect(),
        }
    }
}

impl fmt::Display for Bottle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", item)?;
        }
        Ok(())
    }
}

impl FromIterator<Value> for Bottle {
    fn from_iter<T: IntoIterator<Item = Value>>(iter: T) -> Self {
        Bottle {
            items: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Bottle {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

// ============================================================================
// Text form helpers
// ============================================================================

fn parse_number(token: &str) -> Option<Value> {
    if !token.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    if let Ok(v) = token.parse::<i64>() {
        return Some(Value::Int(v));
    }
    token.parse::<f64>().ok().map(Value::Float)
}

fn needs_quotes(s: &str) -> bool {
    s.is_empty()
        || s.chars()
            .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | '"' | '\\'))
        || parse_number(s).is_some()
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c => write!(f, "{}", c)?,
        }
    }
    f.write_str("\"")
}

/// Deepest `(` nesting accepted by the parser. Payloads come off the wire,
/// and each level costs one stack frame.
const MAX_NESTING: usize = 256;

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    /// `depth` is 0 for the top level, which has no closing `)`.
    fn list(&mut self, depth: usize) -> Result<Bottle, BottleParseError> {
        if depth > MAX_NESTING {
            return Err(BottleParseError("nesting too deep".into()));
        }
        let nested = depth > 0;
        let mut bottle = Bottle::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None if nested => return Err(BottleParseError("unclosed '('".into())),
                None => return Ok(bottle),
                Some(')') if nested => {
                    self.pos += 1;
                    return Ok(bottle);
                }
                Some(')') => return Err(BottleParseError("unexpected ')'".into())),
                Some('(') => {
                    self.pos += 1;
                    let sub = self.list(depth + 1)?;
                    bottle.items.push(Value::List(sub));
                }
                Some('"') => {
                    self.pos += 1;
                    let s = self.quoted()?;
                    bottle.items.push(Value::Str(s));
                }
                Some(_) => {
                    let token = self.bare();
                    let value = parse_number(&token).unwrap_or(Value::Str(token));
                    bottle.items.push(value);
                }
            }
        }
    }

    fn quoted(&mut self) -> Result<String, BottleParseError> {
        let mut out = String::new();
        loop {
            let c = self
                .peek()
                .ok_or_else(|| BottleParseError("unterminated string".into()))?;
            self.pos += 1;
            match c {
                '"' => return Ok(out),
                '\\' => {
                    let esc = self
                        .peek()
                        .ok_or_else(|| BottleParseError("dangling escape".into()))?;
                    self.pos += 1;
                    out.push(match esc {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        other => other,
                    });
                }
                c => out.push(c),
            }
        }
    }

    fn bare(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == '(' || c == ')' {
                break;
            }
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }
}
