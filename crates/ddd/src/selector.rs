//! Metadata selectors.
//!
//! A selector is a list of bracketed filters over node metadata, with `;`
//! separating alternatives:
//!
//! ```text
//! [osm:building][!ddd:ignore];[ddd:area:type=park]
//! ```
//!
//! | Filter | Matches when |
//! |---|---|
//! | `[a]` | `a` is defined |
//! | `[!a]` | `a` is undefined |
//! | `[a=v]` | `a` is defined and equal to `v` |
//! | `[a!=v]` | `a` is undefined or different from `v` |
//! | `[a~re]` | `a` is defined and its text matches `re` from the start |
//!
//! Values are quoted strings, numbers, `true`, `false`, `null`, lists
//! (`[1, 2]`), maps (`{"k": 1}`) or bare words, which are read as strings.
//! Selectors are compiled once; syntax and regex errors surface at parse time.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use thiserror::Error;

use crate::meta::{MetaValue, Metadata};
use crate::node::Node;

/// Errors raised while compiling a selector.
#[derive(Error, Debug, Clone)]
pub enum SelectorError {
    /// Malformed selector text.
    #[error("selector syntax error at {position} in '{selector}': {message}")]
    Syntax {
        /// Full selector text.
        selector: String,
        /// Character offset of the error.
        position: usize,
        /// What was expected.
        message: String,
    },
    /// A `~` filter carries an invalid regular expression.
    #[error("invalid selector regex: {0}")]
    Regex(#[from] regex::Error),
}

/// A single bracketed filter.
#[derive(Debug, Clone)]
pub enum Filter {
    /// `[key]`
    Defined(String),
    /// `[!key]`
    Undefined(String),
    /// `[key=value]`
    Eq(String, MetaValue),
    /// `[key!=value]`
    Ne(String, MetaValue),
    /// `[key~regex]`, anchored at the start.
    Match(String, Regex),
}

impl Filter {
    fn matches(&self, meta: &Metadata) -> bool {
        match self {
            Filter::Defined(k) => meta.contains_key(k),
            Filter::Undefined(k) => !meta.contains_key(k),
            Filter::Eq(k, v) => meta.get(k).is_some_and(|m| m == v),
            Filter::Ne(k, v) => meta.get(k).is_none_or(|m| m != v),
            Filter::Match(k, re) => meta.get(k).is_some_and(|m| re.is_match(&m.to_text())),
        }
    }
}

/// A compiled selector.
#[derive(Debug, Clone)]
pub struct Selector {
    source: String,
    alternatives: Vec<Vec<Filter>>,
}

impl Selector {
    /// Compiles `text`.
    pub fn parse(text: &str) -> Result<Self, SelectorError> {
        Parser::new(text).selectors()
    }

    /// Source text.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Alternatives, each a conjunction of filters.
    pub fn alternatives(&self) -> &[Vec<Filter>] {
        &self.alternatives
    }

    /// True when any alternative accepts `meta`.
    pub fn matches_metadata(&self, meta: &Metadata) -> bool {
        self.alternatives
            .iter()
            .any(|filters| filters.iter().all(|f| f.matches(meta)))
    }

    /// True when any alternative accepts the metadata of `node`.
    pub fn evaluate(&self, node: &Node) -> bool {
        self.matches_metadata(&node.metadata())
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Selector::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn is_key_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | ':' | '.' | '-' | '/' | '@')
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> SelectorError {
        SelectorError::Syntax {
            selector: self.source.to_string(),
            position: self.pos,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, c: char) -> Result<(), SelectorError> {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected '{c}'")))
        }
    }

    fn selectors(mut self) -> Result<Selector, SelectorError> {
        let mut alternatives = Vec::new();
        let mut current = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some('[') => current.push(self.filter()?),
                Some(';') => {
                    self.pos += 1;
                    alternatives.push(std::mem::take(&mut current));
                }
                None => break,
                Some(c) => return Err(self.error(format!("unexpected '{c}', expected '[' or ';'"))),
            }
        }
        alternatives.push(current);
        Ok(Selector {
            source: self.source.to_string(),
            alternatives,
        })
    }

    fn filter(&mut self) -> Result<Filter, SelectorError> {
        self.expect('[')?;
        self.skip_ws();
        if self.peek() == Some('!') {
            self.pos += 1;
            let key = self.key()?;
            self.expect(']')?;
            return Ok(Filter::Undefined(key));
        }
        let key = self.key()?;
        self.skip_ws();
        let filter = match (self.peek(), self.peek_at(1)) {
            (Some(']'), _) => Filter::Defined(key),
            (Some('='), _) => {
                self.pos += 1;
                Filter::Eq(key, self.value()?)
            }
            (Some('!'), Some('=')) => {
                self.pos += 2;
                Filter::Ne(key, self.value()?)
            }
            (Some('~'), _) => {
                self.pos += 1;
                let pattern = self.pattern()?;
                Filter::Match(key, Regex::new(&format!("^(?:{pattern})"))?)
            }
            _ => return Err(self.error("expected ']', '=', '!=' or '~'")),
        };
        self.expect(']')?;
        Ok(filter)
    }

    fn key(&mut self) -> Result<String, SelectorError> {
        self.skip_ws();
        if matches!(self.peek(), Some('"' | '\'')) {
            return self.string();
        }
        let start = self.pos;
        while self.peek().is_some_and(is_key_char) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("expected a key"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn string(&mut self) -> Result<String, SelectorError> {
        let Some(quote) = self.peek() else {
            return Err(self.error("expected a string"));
        };
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string")),
                Some('\\') => {
                    let Some(next) = self.peek_at(1) else {
                        return Err(self.error("unterminated string"));
                    };
                    out.push(next);
                    self.pos += 2;
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    /// Regex text: a quoted string, or raw text up to the closing bracket
    /// (nested brackets and escapes are kept).
    fn pattern(&mut self) -> Result<String, SelectorError> {
        self.skip_ws();
        if matches!(self.peek(), Some('"' | '\'')) {
            return self.string();
        }
        let start = self.pos;
        let mut depth = 0usize;
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated regex")),
                Some('\\') => self.pos += 2,
                Some('[') => {
                    depth += 1;
                    self.pos += 1;
                }
                Some(']') if depth == 0 => break,
                Some(']') => {
                    depth -= 1;
                    self.pos += 1;
                }
                Some(_) => self.pos += 1,
            }
        }
        let end = self.pos.min(self.chars.len());
        Ok(self.chars[start..end].iter().collect::<String>().trim().to_string())
    }

    fn value(&mut self) -> Result<MetaValue, SelectorError> {
        self.skip_ws();
        match self.peek() {
            Some('"' | '\'') => Ok(MetaValue::String(self.string()?)),
            Some('[') => {
                self.pos += 1;
                let mut items = Vec::new();
                self.skip_ws();
                if self.peek() == Some(']') {
                    self.pos += 1;
                    return Ok(MetaValue::List(items));
                }
                loop {
                    items.push(self.value()?);
                    self.skip_ws();
                    match self.peek() {
                        Some(',') => self.pos += 1,
                        Some(']') => {
                            self.pos += 1;
                            return Ok(MetaValue::List(items));
                        }
                        _ => return Err(self.error("expected ',' or ']' in list")),
                    }
                }
            }
            Some('{') => {
                self.pos += 1;
                let mut map = BTreeMap::new();
                self.skip_ws();
                if self.peek() == Some('}') {
                    self.pos += 1;
                    return Ok(MetaValue::Map(map));
                }
                loop {
                    let key = self.key()?;
                    self.expect(':')?;
                    map.insert(key, self.value()?);
                    self.skip_ws();
                    match self.peek() {
                        Some(',') => self.pos += 1,
                        Some('}') => {
                            self.pos += 1;
                            return Ok(MetaValue::Map(map));
                        }
                        _ => return Err(self.error("expected ',' or '}' in map")),
                    }
                }
            }
            _ => self.bare(),
        }
    }

    fn bare(&mut self) -> Result<MetaValue, SelectorError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| !matches!(c, ']' | ',' | '}')) {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        let word = word.trim();
        if word.is_empty() {
            return Err(self.error("expected a value"));
        }
        Ok(match word {
            "true" => MetaValue::Bool(true),
            "false" => MetaValue::Bool(false),
            "null" => MetaValue::Null,
            _ => match word.parse::<f64>() {
                Ok(n) => MetaValue::Number(n),
                Err(_) => MetaValue::String(word.to_string()),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, MetaValue)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_defined_and_undefined() {
        let s = Selector::parse("[osm:building][!ddd:ignore]").unwrap();
        assert!(s.matches_metadata(&meta(&[("osm:building", "yes".into())])));
        assert!(!s.matches_metadata(&meta(&[
            ("osm:building", "yes".into()),
            ("ddd:ignore", true.into()),
        ])));
        assert!(!s.matches_metadata(&Metadata::new()));
    }

    #[test]
    fn test_equality_filters() {
        let s = Selector::parse("[ddd:height=12][osm:name='Main St']").unwrap();
        assert!(s.matches_metadata(&meta(&[
            ("ddd:height", 12.0.into()),
            ("osm:name", "Main St".into()),
        ])));
        let ne = Selector::parse("[osm:highway!=primary]").unwrap();
        assert!(ne.matches_metadata(&Metadata::new()));
        assert!(ne.matches_metadata(&meta(&[("osm:highway", "service".into())])));
        assert!(!ne.matches_metadata(&meta(&[("osm:highway", "primary".into())])));
    }

    #[test]
    fn test_bare_words_and_literals() {
        let s = Selector::parse("[a=yes][b=true][c=null][d=[1, 'x']]").unwrap();
        let m = meta(&[
            ("a", "yes".into()),
            ("b", true.into()),
            ("c", MetaValue::Null),
            ("d", vec![1.0.into(), "x".into()].into()),
        ]);
        assert!(s.matches_metadata(&m));
    }

    #[test]
    fn test_regex_anchored_at_start() {
        let s = Selector::parse("[osm:highway~prim|second]").unwrap();
        assert!(s.matches_metadata(&meta(&[("osm:highway", "primary".into())])));
        assert!(s.matches_metadata(&meta(&[("osm:highway", "secondary_link".into())])));
        assert!(!s.matches_metadata(&meta(&[("osm:highway", "unprimary".into())])));
        let classes = Selector::parse("[ref~[A-Z][0-9]+]").unwrap();
        assert!(classes.matches_metadata(&meta(&[("ref", "A12".into())])));
    }

    #[test]
    fn test_alternatives() {
        let s = Selector::parse("[osm:building];[ddd:area:type=park]").unwrap();
        assert_eq!(s.alternatives().len(), 2);
        assert!(s.matches_metadata(&meta(&[("ddd:area:type", "park".into())])));
        assert!(Selector::parse("").unwrap().matches_metadata(&Metadata::new()));
    }

    #[test]
    fn test_syntax_errors_at_parse() {
        assert!(matches!(
            Selector::parse("[osm:building"),
            Err(SelectorError::Syntax { .. })
        ));
        assert!(matches!(
            Selector::parse("osm:building"),
            Err(SelectorError::Syntax { .. })
        ));
        assert!(matches!(Selector::parse("[a=]"), Err(SelectorError::Syntax { .. })));
        assert!(matches!(Selector::parse("[a~(]"), Err(SelectorError::Regex(_))));
    }
}
