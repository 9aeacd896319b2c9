//! Targeting expressions.
//!
//! Records may carry a `filter_expression` selecting which clients they apply
//! to, for example `env.country == 'DE' && env.version >= '128'`. The Local
//! Store keeps the full signed record set; filtering happens whenever records
//! are handed to consumers, so a region change takes effect on the very next
//! read.

use crate::config::AppContext;
use crate::types::Record;
use std::cmp::Ordering;
use thiserror::Error;

/// Targeting expression errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// The expression is not well formed
    #[error("parse error at {position}: {message}")]
    Parse {
        /// Byte offset of the failure
        position: usize,
        /// Description
        message: String,
    },

    /// The expression refers to a field the context does not provide
    #[error("unknown identifier: {0}")]
    UnknownIdentifier(String),
}

/// Keep the records whose expression matches `context`.
///
/// Records without an expression always match; records whose expression
/// cannot be evaluated are dropped.
#[must_use]
pub fn filter_records(records: &[Record], context: &AppContext) -> Vec<Record> {
    records
        .iter()
        .filter(|record| match record.filter_expression() {
            None => true,
            Some(expr) => match evaluate(expr, context) {
                Ok(matched) => matched,
                Err(e) => {
                    tracing::debug!(id = %record.id, error = %e, "Dropping record with invalid filter expression");
                    false
                }
            },
        })
        .cloned()
        .collect()
}

/// Evaluate `expression` against `context`.
pub fn evaluate(expression: &str, context: &AppContext) -> Result<bool, FilterError> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if let Some((position, token)) = parser.peek_with_pos() {
        return Err(FilterError::Parse {
            position,
            message: format!("unexpected trailing {token:?}"),
        });
    }
    Ok(expr.eval(context)?.truthy())
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Cmp(CmpOp),
    In,
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, FilterError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    let err = |position: usize, message: &str| FilterError::Parse {
        position,
        message: message.to_string(),
    };

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;
        match c {
            b' ' | b'\t' | b'\n' | b'\r' => {
                i += 1;
            }
            b'(' => {
                tokens.push((start, Token::LParen));
                i += 1;
            }
            b')' => {
                tokens.push((start, Token::RParen));
                i += 1;
            }
            b'[' => {
                tokens.push((start, Token::LBracket));
                i += 1;
            }
            b']' => {
                tokens.push((start, Token::RBracket));
                i += 1;
            }
            b',' => {
                tokens.push((start, Token::Comma));
                i += 1;
            }
            b'&' | b'|' => {
                if bytes.get(i + 1) != Some(&c) {
                    return Err(err(start, "expected '&&' or '||'"));
                }
                tokens.push((start, if c == b'&' { Token::And } else { Token::Or }));
                i += 2;
            }
            b'=' => {
                if bytes.get(i + 1) != Some(&b'=') {
                    return Err(err(start, "expected '=='"));
                }
                tokens.push((start, Token::Cmp(CmpOp::Eq)));
                i += 2;
            }
            b'!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push((start, Token::Cmp(CmpOp::Ne)));
                    i += 2;
                } else {
                    tokens.push((start, Token::Not));
                    i += 1;
                }
            }
            b'<' | b'>' => {
                let with_eq = bytes.get(i + 1) == Some(&b'=');
                let op = match (c, with_eq) {
                    (b'<', false) => CmpOp::Lt,
                    (b'<', true) => CmpOp::Le,
                    (_, false) => CmpOp::Gt,
                    (_, true) => CmpOp::Ge,
                };
                tokens.push((start, Token::Cmp(op)));
                i += if with_eq { 2 } else { 1 };
            }
            b'\'' | b'"' => {
                let quote = c;
                i += 1;
                let mut value = String::new();
                loop {
                    match bytes.get(i) {
                        None => return Err(err(start, "unterminated string")),
                        Some(&b) if b == quote => {
                            i += 1;
                            break;
                        }
                        Some(b'\\') => {
                            let escaped = input[i + 1..]
                                .chars()
                                .next()
                                .ok_or_else(|| err(i, "dangling escape"))?;
                            value.push(escaped);
                            i += 1 + escaped.len_utf8();
                        }
                        Some(_) => {
                            let ch = input[i..]
                                .chars()
                                .next()
                                .ok_or_else(|| err(i, "invalid character"))?;
                            value.push(ch);
                            i += ch.len_utf8();
                        }
                    }
                }
                tokens.push((start, Token::Str(value)));
            }
            b'0'..=b'9' | b'-' => {
                i += 1;
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                let raw = &input[start..i];
                let value: f64 = raw
                    .parse()
                    .map_err(|_| err(start, &format!("invalid number '{raw}'")))?;
                tokens.push((start, Token::Num(value)));
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'.')
                {
                    i += 1;
                }
                let word = &input[start..i];
                let token = match word {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    "null" => Token::Null,
                    "in" => Token::In,
                    _ => Token::Ident(word.to_string()),
                };
                tokens.push((start, token));
            }
            _ => return Err(err(start, &format!("unexpected character '{}'", c as char))),
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Str(String),
    Num(f64),
    Bool(bool),
    List(Vec<Value>),
    Null,
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Str(s) => !s.is_empty(),
            Value::Num(n) => *n != 0.0,
            Value::Bool(b) => *b,
            Value::List(items) => !items.is_empty(),
            Value::Null => false,
        }
    }
}

#[derive(Debug)]
enum Expr {
    Literal(Value),
    Env(String),
    List(Vec<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    In(Box<Expr>, Box<Expr>),
}

impl Expr {
    fn eval(&self, ctx: &AppContext) -> Result<Value, FilterError> {
        Ok(match self {
            Expr::Literal(v) => v.clone(),
            Expr::Env(name) => lookup(name, ctx)?,
            Expr::List(items) => Value::List(
                items
                    .iter()
                    .map(|item| item.eval(ctx))
                    .collect::<Result<_, _>>()?,
            ),
            Expr::Not(inner) => Value::Bool(!inner.eval(ctx)?.truthy()),
            Expr::And(lhs, rhs) => {
                Value::Bool(lhs.eval(ctx)?.truthy() && rhs.eval(ctx)?.truthy())
            }
            Expr::Or(lhs, rhs) => Value::Bool(lhs.eval(ctx)?.truthy() || rhs.eval(ctx)?.truthy()),
            Expr::Cmp(op, lhs, rhs) => Value::Bool(compare(*op, &lhs.eval(ctx)?, &rhs.eval(ctx)?)),
            Expr::In(needle, haystack) => {
                let needle = needle.eval(ctx)?;
                Value::Bool(match haystack.eval(ctx)? {
                    Value::List(items) => items.contains(&needle),
                    Value::Str(s) => matches!(&needle, Value::Str(n) if s.contains(n.as_str())),
                    _ => false,
                })
            }
        })
    }
}

fn lookup(name: &str, ctx: &AppContext) -> Result<Value, FilterError> {
    let opt = |v: &Option<String>| v.clone().map_or(Value::Null, Value::Str);
    Ok(match name {
        "env.locale" => Value::Str(ctx.locale.clone()),
        "env.channel" => Value::Str(ctx.channel.clone()),
        "env.version" => Value::Str(ctx.version.clone()),
        "env.country" => opt(&ctx.country),
        "env.appId" | "env.appinfo.ID" => Value::Str(ctx.app_id.clone()),
        "env.os" | "env.appinfo.OS" => Value::Str(ctx.os.clone()),
        "env.osVersion" => opt(&ctx.os_version),
        _ => return Err(FilterError::UnknownIdentifier(name.to_string())),
    })
}

fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> bool {
    match op {
        CmpOp::Eq => lhs == rhs,
        CmpOp::Ne => lhs != rhs,
        _ => {
            let ordering = match (lhs, rhs) {
                (Value::Num(a), Value::Num(b)) => a.partial_cmp(b),
                (Value::Str(a), Value::Str(b)) => Some(compare_versions(a, b)),
                (Value::Str(a), Value::Num(b)) => Some(compare_versions(a, &b.to_string())),
                (Value::Num(a), Value::Str(b)) => Some(compare_versions(&a.to_string(), b)),
                _ => None,
            };
            match ordering {
                None => false,
                Some(ord) => match op {
                    CmpOp::Lt => ord == Ordering::Less,
                    CmpOp::Le => ord != Ordering::Greater,
                    CmpOp::Gt => ord == Ordering::Greater,
                    CmpOp::Ge => ord != Ordering::Less,
                    CmpOp::Eq | CmpOp::Ne => unreachable!("handled above"),
                },
            }
        }
    }
}

/// Compare dotted versions component by component, numerically where both
/// components are numbers. Missing components count as zero.
fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (l, r) => {
                let l = l.unwrap_or("0");
                let r = r.unwrap_or("0");
                let ord = match (leading_number(l), leading_number(r)) {
                    (Some(x), Some(y)) => x.cmp(&y).then_with(|| l.cmp(r)),
                    _ => l.cmp(r),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn leading_number(component: &str) -> Option<u64> {
    let digits: String = component.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn peek_with_pos(&self) -> Option<(usize, &Token)> {
        self.tokens.get(self.pos).map(|(p, t)| (*p, t))
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map_or_else(
            || self.tokens.last().map_or(0, |(p, _)| p + 1),
            |(p, _)| *p,
        )
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn error(&self, message: impl Into<String>) -> FilterError {
        FilterError::Parse {
            position: self.position(),
            message: message.into(),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, FilterError> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, FilterError> {
        let mut lhs = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, FilterError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, FilterError> {
        let lhs = self.parse_primary()?;
        match self.peek() {
            Some(Token::Cmp(op)) => {
                let op = *op;
                self.pos += 1;
                let rhs = self.parse_primary()?;
                Ok(Expr::Cmp(op, Box::new(lhs), Box::new(rhs)))
            }
            Some(Token::In) => {
                self.pos += 1;
                let rhs = self.parse_primary()?;
                Ok(Expr::In(Box::new(lhs), Box::new(rhs)))
            }
            _ => Ok(lhs),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, FilterError> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(self.error("expected ')'")),
                }
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if self.peek() == Some(&Token::RBracket) {
                    self.pos += 1;
                    return Ok(Expr::List(items));
                }
                loop {
                    items.push(self.parse_primary()?);
                    match self.next() {
                        Some(Token::Comma) => continue,
                        Some(Token::RBracket) => break,
                        _ => return Err(self.error("expected ',' or ']'")),
                    }
                }
                Ok(Expr::List(items))
            }
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::Str(s))),
            Some(Token::Num(n)) => Ok(Expr::Literal(Value::Num(n))),
            Some(Token::Bool(b)) => Ok(Expr::Literal(Value::Bool(b))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::Ident(name)) => Ok(Expr::Env(name)),
            Some(token) => Err(self.error(format!("unexpected {token:?}"))),
            None => Err(self.error("unexpected end of expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> AppContext {
        AppContext {
            app_id: "{ec8030f7-c20a-464f-9b0e-13a3a9e97384}".to_string(),
            channel: "beta".to_string(),
            version: "128.0.1".to_string(),
            locale: "de".to_string(),
            os: "Linux".to_string(),
            os_version: Some("6.8".to_string()),
            country: Some("DE".to_string()),
        }
    }

    #[test]
    fn test_equality_and_logic() {
        let c = ctx();
        assert!(evaluate("env.country == 'DE'", &c).unwrap());
        assert!(!evaluate("env.country != 'DE'", &c).unwrap());
        assert!(evaluate("env.locale == 'de' && env.channel == \"beta\"", &c).unwrap());
        assert!(evaluate("env.locale == 'fr' || env.os == 'Linux'", &c).unwrap());
        assert!(evaluate("!(env.locale == 'fr')", &c).unwrap());
        assert!(evaluate("env.appinfo.OS == env.os", &c).unwrap());
    }

    #[test]
    fn test_in_operator() {
        let c = ctx();
        assert!(evaluate("env.country in ['AT', 'CH', 'DE']", &c).unwrap());
        assert!(!evaluate("env.country in []", &c).unwrap());
        assert!(evaluate("'Lin' in env.os", &c).unwrap());
    }

    #[test]
    fn test_version_comparison_is_numeric() {
        let c = ctx();
        assert!(evaluate("env.version >= '128'", &c).unwrap());
        assert!(evaluate("env.version > '99.0'", &c).unwrap());
        assert!(evaluate("env.version < '128.0.10'", &c).unwrap());
        assert!(!evaluate("env.version <= '128.0.0'", &c).unwrap());
        assert!(evaluate("env.version >= 100", &c).unwrap());
    }

    #[test]
    fn test_missing_country_is_null() {
        let mut c = ctx();
        c.country = None;
        assert!(evaluate("env.country == null", &c).unwrap());
        assert!(!evaluate("env.country", &c).unwrap());
    }

    #[test]
    fn test_errors() {
        let c = ctx();
        assert!(matches!(
            evaluate("env.nope == 1", &c),
            Err(FilterError::UnknownIdentifier(_))
        ));
        assert!(matches!(evaluate("env.locale ==", &c), Err(FilterError::Parse { .. })));
        assert!(matches!(evaluate("env.locale = 'x'", &c), Err(FilterError::Parse { .. })));
        assert!(matches!(evaluate("('a'", &c), Err(FilterError::Parse { .. })));
        assert!(matches!(evaluate("'unterminated", &c), Err(FilterError::Parse { .. })));
        assert!(matches!(evaluate("true true", &c), Err(FilterError::Parse { .. })));
    }

    #[test]
    fn test_filter_records() {
        let records = vec![
            Record::new("always", 1, json!({})),
            Record::new("de", 2, json!({"filter_expression": "env.country == 'DE'"})),
            Record::new("us", 3, json!({"filter_expression": "env.country == 'US'"})),
            Record::new("broken", 4, json!({"filter_expression": "env.country =="})),
        ];
        let ids: Vec<_> = filter_records(&records, &ctx())
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["always", "de"]);
    }
}
