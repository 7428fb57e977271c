//! Path expression parser
//!
//! Grammar:
//!
//! ```text
//! path      := segment ('.' segment)*
//! segment   := ident suffix* | function
//! suffix    := '[]' | '[' digits ']' | '[x]'
//! function  := 'first()' | 'last()' | 'exists()' | 'empty()' | 'count()'
//!            | 'where(' path ('=' | '!=') literal ')'
//! literal   := '\'' chars '\'' | number | 'true' | 'false'
//! ```

use serde_json::{Number, Value};
use std::fmt;
use thiserror::Error;

/// A parse failure with the character offset it occurred at
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid path expression '{source_text}' at position {position}: {message}")]
pub struct PathParseError {
    /// The expression text
    pub source_text: String,
    /// Zero-based character offset
    pub position: usize,
    /// What was wrong
    pub message: String,
}

/// Comparison operator inside `where(...)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
}

/// Filter predicate of a `where(...)` step
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Path evaluated relative to each candidate item
    pub path: Vec<Step>,
    /// Comparison operator
    pub op: CompareOp,
    /// Literal to compare against
    pub value: Value,
}

/// One navigation or function step
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Object key lookup; lists are flattened implicitly
    Field(String),
    /// Polymorphic `name[x]` lookup over the FHIR type suffixes
    Choice(String),
    /// `[n]` positional index into the current collection
    Index(usize),
    /// `[]` explicit flatten of nested lists
    Flatten,
    /// `first()`
    First,
    /// `last()`
    Last,
    /// `exists()`
    Exists,
    /// `empty()`
    Empty,
    /// `count()`
    Count,
    /// `where(path op literal)`
    Where(Predicate),
}

/// A parsed path expression
#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    source: String,
    steps: Vec<Step>,
}

impl PathExpr {
    /// Parse an expression
    ///
    /// # Examples
    ///
    /// ```
    /// use strata::core::path::PathExpr;
    ///
    /// let expr = PathExpr::parse("code.coding.where(system='http://loinc.org').first().code").unwrap();
    /// assert_eq!(expr.steps().len(), 5);
    /// assert!(PathExpr::parse("code..coding").is_err());
    /// ```
    pub fn parse(source: &str) -> Result<Self, PathParseError> {
        let mut parser = Parser::new(source);
        let steps = parser.parse_path()?;
        parser.skip_ws();
        if !parser.at_end() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(Self {
            source: source.to_string(),
            steps,
        })
    }

    /// The original expression text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parsed steps
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for PathExpr {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
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

    fn error(&self, message: impl Into<String>) -> PathParseError {
        PathParseError {
            source_text: self.source.to_string(),
            position: self.pos,
            message: message.into(),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), PathParseError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected '{expected}', found '{c}'"))),
            None => Err(self.error(format!("expected '{expected}', found end of input"))),
        }
    }

    fn parse_path(&mut self) -> Result<Vec<Step>, PathParseError> {
        self.skip_ws();
        if self.at_end() {
            return Err(self.error("empty path"));
        }

        let mut steps = Vec::new();
        loop {
            self.parse_segment(&mut steps)?;
            if self.peek() == Some('.') {
                self.pos += 1;
                continue;
            }
            break;
        }
        Ok(steps)
    }

    fn parse_segment(&mut self, steps: &mut Vec<Step>) -> Result<(), PathParseError> {
        let start = self.pos;
        let ident = self.parse_ident()?;

        if self.peek() == Some('(') {
            self.pos += 1;
            let step = match ident.as_str() {
                "first" => Step::First,
                "last" => Step::Last,
                "exists" => Step::Exists,
                "empty" => Step::Empty,
                "count" => Step::Count,
                "where" => Step::Where(self.parse_predicate()?),
                other => {
                    self.pos = start;
                    return Err(self.error(format!("unknown function '{other}'")));
                }
            };
            self.skip_ws();
            self.expect(')')?;
            steps.push(step);
            return Ok(());
        }

        let mut field = Some(Step::Field(ident.clone()));
        while self.peek() == Some('[') {
            self.pos += 1;
            match self.peek() {
                Some(']') => {
                    self.pos += 1;
                    if let Some(f) = field.take() {
                        steps.push(f);
                    }
                    steps.push(Step::Flatten);
                }
                Some('x') if self.peek_at(1) == Some(']') => {
                    if field.is_none() {
                        return Err(self.error("'[x]' must directly follow a field name"));
                    }
                    self.pos += 2;
                    field = None;
                    steps.push(Step::Choice(ident.clone()));
                }
                Some(c) if c.is_ascii_digit() => {
                    let index = self.parse_index()?;
                    self.expect(']')?;
                    if let Some(f) = field.take() {
                        steps.push(f);
                    }
                    steps.push(Step::Index(index));
                }
                _ => return Err(self.error("expected ']', an index or 'x' inside brackets")),
            }
        }
        if let Some(f) = field {
            steps.push(f);
        }
        Ok(())
    }

    fn parse_ident(&mut self) -> Result<String, PathParseError> {
        let start = self.pos;
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => self.pos += 1,
            Some(c) => return Err(self.error(format!("expected identifier, found '{c}'"))),
            None => return Err(self.error("expected identifier, found end of input")),
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn parse_index(&mut self) -> Result<usize, PathParseError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        let digits: String = self.chars[start..self.pos].iter().collect();
        digits.parse::<usize>().map_err(|_| {
            self.pos = start;
            self.error("index out of range")
        })
    }

    fn parse_predicate(&mut self) -> Result<Predicate, PathParseError> {
        let path = self.parse_path()?;
        self.skip_ws();
        let op = match (self.peek(), self.peek_at(1)) {
            (Some('!'), Some('=')) => {
                self.pos += 2;
                CompareOp::Ne
            }
            (Some('='), _) => {
                self.pos += 1;
                CompareOp::Eq
            }
            _ => return Err(self.error("expected '=' or '!=' in where()")),
        };
        self.skip_ws();
        let value = self.parse_literal()?;
        Ok(Predicate { path, op, value })
    }

    fn parse_literal(&mut self) -> Result<Value, PathParseError> {
        match self.peek() {
            Some('\'') => {
                self.pos += 1;
                let mut text = String::new();
                loop {
                    match self.peek() {
                        None => return Err(self.error("unterminated string literal")),
                        Some('\\') => {
                            self.pos += 1;
                            match self.peek() {
                                Some(c) => {
                                    text.push(c);
                                    self.pos += 1;
                                }
                                None => return Err(self.error("unterminated string literal")),
                            }
                        }
                        Some('\'') => {
                            self.pos += 1;
                            return Ok(Value::String(text));
                        }
                        Some(c) => {
                            text.push(c);
                            self.pos += 1;
                        }
                    }
                }
            }
            Some(c) if c.is_ascii_digit() || c == '-' => {
                let start = self.pos;
                self.pos += 1;
                while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
                    self.pos += 1;
                }
                let text: String = self.chars[start..self.pos].iter().collect();
                if let Ok(i) = text.parse::<i64>() {
                    return Ok(Value::from(i));
                }
                text.parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| {
                        self.pos = start;
                        self.error(format!("invalid number literal '{text}'"))
                    })
            }
            Some(c) if c.is_ascii_alphabetic() => {
                let start = self.pos;
                let word = self.parse_ident()?;
                match word.as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    _ => {
                        self.pos = start;
                        Err(self.error(format!(
                            "expected literal, found '{word}' (strings need single quotes)"
                        )))
                    }
                }
            }
            _ => Err(self.error("expected literal")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test]
    fn test_parse_dotted() {
        let expr = PathExpr::parse("a.b.c").unwrap();
        assert_eq!(
            expr.steps(),
            &[
                Step::Field("a".to_string()),
                Step::Field("b".to_string()),
                Step::Field("c".to_string())
            ]
        );
        assert_eq!(expr.source(), "a.b.c");
    }

    #[test]
    fn test_parse_suffixes() {
        let expr = PathExpr::parse("items[].field[2].value[x]").unwrap();
        assert_eq!(
            expr.steps(),
            &[
                Step::Field("items".to_string()),
                Step::Flatten,
                Step::Field("field".to_string()),
                Step::Index(2),
                Step::Choice("value".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_where() {
        let expr = PathExpr::parse("telecom.where(system = 'phone').value").unwrap();
        match &expr.steps()[1] {
            Step::Where(p) => {
                assert_eq!(p.path, vec![Step::Field("system".to_string())]);
                assert_eq!(p.op, CompareOp::Eq);
                assert_eq!(p.value, json!("phone"));
            }
            other => panic!("expected where step, got {other:?}"),
        }
    }

    #[test_case("x.where(a!=3)", json!(3), CompareOp::Ne ; "integer not equal")]
    #[test_case("x.where(a=2.5)", json!(2.5), CompareOp::Eq ; "decimal")]
    #[test_case("x.where(a=true)", json!(true), CompareOp::Eq ; "boolean")]
    #[test_case("x.where(a='it\\'s')", json!("it's"), CompareOp::Eq ; "escaped quote")]
    fn test_parse_literals(source: &str, expected: Value, op: CompareOp) {
        let expr = PathExpr::parse(source).unwrap();
        match &expr.steps()[1] {
            Step::Where(p) => {
                assert_eq!(p.value, expected);
                assert_eq!(p.op, op);
            }
            other => panic!("expected where step, got {other:?}"),
        }
    }

    #[test_case("" ; "empty")]
    #[test_case("a..b" ; "double dot")]
    #[test_case("a." ; "trailing dot")]
    #[test_case("a.b(" ; "unknown function")]
    #[test_case("a.first(" ; "unclosed call")]
    #[test_case("a[" ; "unclosed bracket")]
    #[test_case("a[y]" ; "bad bracket")]
    #[test_case("a.where(b='x" ; "unterminated string")]
    #[test_case("a.where(b=x)" ; "bare word literal")]
    #[test_case("a.where(b)" ; "missing operator")]
    #[test_case("a b" ; "trailing input")]
    #[test_case("1a" ; "leading digit")]
    fn test_parse_errors(source: &str) {
        assert!(PathExpr::parse(source).is_err());
    }

    #[test]
    fn test_error_position() {
        let err = PathExpr::parse("code..coding").unwrap_err();
        assert_eq!(err.position, 5);
        assert!(err.to_string().contains("position 5"));
    }
}
