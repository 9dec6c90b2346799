//! Textual TQL
//!
//! ```text
//! FROM <kind>
//!   [WHERE <cond> (AND <cond>)*]
//!   [ORDER BY <field> [ASC|DESC]]
//!   [GROUP BY <field>]
//!   [SHOW <field> (, <field>)*]
//!   [LIMIT <n>]
//!
//! <cond> := <field> == <value>
//!         | <field> != <value>
//!         | <field> IN (<value>, ...)
//!         | <field> BETWEEN <value> AND <value>
//!         | <field> [NOT] EXISTS
//!         | <field> CONTAINS <value>
//! ```
//!
//! Keywords are case-insensitive. Trailing clauses may come in any order but
//! at most once each. `OR` is refused; derived fields are refused here, before
//! the safety pass.

use serde_json::{Number, Value};

use super::ast::{Condition, OrderBy, Operator, SortDirection, TqlQuery};
use super::errors::UnsafeQueryError;
use super::safety::is_derived_field;
use crate::threads::ThreadKind;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Str(String),
    Num(Value),
    EqEq,
    NotEq,
    Comma,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, UnsafeQueryError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '(' | '[' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' | ']' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '=' | '!' => {
                chars.next();
                match chars.next() {
                    Some((_, '=')) if c == '=' => tokens.push(Token::EqEq),
                    Some((_, '=')) => tokens.push(Token::NotEq),
                    _ => {
                        return Err(UnsafeQueryError::malformed(format!(
                            "expected '==' or '!=' at {}",
                            pos
                        )))
                    }
                }
            }
            '"' | '\'' => {
                chars.next();
                let mut s = String::new();
                let mut closed = false;
                for (_, ch) in chars.by_ref() {
                    if ch == c {
                        closed = true;
                        break;
                    }
                    s.push(ch);
                }
                if !closed {
                    return Err(UnsafeQueryError::malformed(format!(
                        "unterminated string at {}",
                        pos
                    )));
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut s = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if ch.is_ascii_digit() || ch == '.' || ch == '-' {
                        s.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Num(parse_number(&s)?));
            }
            c if c.is_alphanumeric() || c == '_' || c == '*' => {
                let mut s = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' || ch == '.' || ch == '*' {
                        s.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Word(s));
            }
            other => {
                return Err(UnsafeQueryError::malformed(format!(
                    "unexpected '{}' at {}",
                    other, pos
                )))
            }
        }
    }
    Ok(tokens)
}

fn parse_number(s: &str) -> Result<Value, UnsafeQueryError> {
    if let Ok(i) = s.parse::<i64>() {
        return Ok(Value::from(i));
    }
    s.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| UnsafeQueryError::malformed(format!("bad number '{}'", s)))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), UnsafeQueryError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(UnsafeQueryError::malformed(format!(
                "expected {}",
                keyword
            )))
        }
    }

    fn field(&mut self) -> Result<String, UnsafeQueryError> {
        match self.next() {
            Some(Token::Word(w)) if !is_keyword(&w) => {
                if is_derived_field(&w) {
                    return Err(UnsafeQueryError::derived_field(w));
                }
                Ok(w)
            }
            other => Err(UnsafeQueryError::malformed(format!(
                "expected a field name, found {:?}",
                other
            ))),
        }
    }

    fn value(&mut self) -> Result<Value, UnsafeQueryError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Num(n)) => Ok(n),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("null") => Ok(Value::Null),
            other => Err(UnsafeQueryError::malformed(format!(
                "expected a value, found {:?}",
                other
            ))),
        }
    }

    fn list(&mut self) -> Result<Value, UnsafeQueryError> {
        if self.next() != Some(Token::LParen) {
            return Err(UnsafeQueryError::malformed("expected '(' after IN"));
        }
        let mut items = Vec::new();
        loop {
            if self.peek() == Some(&Token::RParen) {
                self.pos += 1;
                break;
            }
            items.push(self.value()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                _ => return Err(UnsafeQueryError::malformed("unterminated IN list")),
            }
        }
        Ok(Value::Array(items))
    }

    fn condition(&mut self) -> Result<Condition, UnsafeQueryError> {
        let field = self.field()?;
        let condition = match self.next() {
            Some(Token::EqEq) => Condition::new(field, Operator::Eq, self.value()?),
            Some(Token::NotEq) => Condition::new(field, Operator::Ne, self.value()?),
            Some(Token::Word(w)) => match w.to_ascii_uppercase().as_str() {
                "IN" => Condition::new(field, Operator::In, self.list()?),
                "BETWEEN" => {
                    let low = self.value()?;
                    self.expect_keyword("AND")?;
                    let high = self.value()?;
                    Condition::new(field, Operator::Between, Value::Array(vec![low, high]))
                }
                "EXISTS" => Condition::exists(field, true),
                "NOT" => {
                    self.expect_keyword("EXISTS")?;
                    Condition::exists(field, false)
                }
                "CONTAINS" => Condition::new(field, Operator::Contains, self.value()?),
                other => {
                    return Err(UnsafeQueryError::malformed(format!(
                        "unknown operator '{}'",
                        other
                    )))
                }
            },
            other => {
                return Err(UnsafeQueryError::malformed(format!(
                    "expected an operator after '{}', found {:?}",
                    field, other
                )))
            }
        };
        Ok(condition)
    }

    fn query(&mut self) -> Result<TqlQuery, UnsafeQueryError> {
        self.expect_keyword("FROM")?;
        let kind = match self.next() {
            Some(Token::Word(w)) => w
                .parse::<ThreadKind>()
                .map_err(UnsafeQueryError::malformed)?,
            _ => return Err(UnsafeQueryError::malformed("expected a thread kind after FROM")),
        };
        let mut query = TqlQuery::new(kind);

        if self.eat_keyword("WHERE") {
            loop {
                query.conditions.push(self.condition()?);
                if self.peek_keyword("OR") {
                    return Err(UnsafeQueryError::malformed(
                        "OR is not supported; conditions are ANDed",
                    ));
                }
                if !self.eat_keyword("AND") {
                    break;
                }
            }
        }

        let mut seen_show = false;
        let mut seen_limit = false;
        while let Some(token) = self.next() {
            let w = match token {
                Token::Word(w) => w,
                other => {
                    return Err(UnsafeQueryError::malformed(format!(
                        "unexpected {:?}",
                        other
                    )))
                }
            };
            match w.to_ascii_uppercase().as_str() {
                "ORDER" if query.order_by.is_none() => {
                    self.expect_keyword("BY")?;
                    let field = self.field()?;
                    let direction = if self.eat_keyword("DESC") {
                        SortDirection::Desc
                    } else {
                        self.eat_keyword("ASC");
                        SortDirection::Asc
                    };
                    query.order_by = Some(OrderBy { field, direction });
                }
                "GROUP" if query.group_by.is_none() => {
                    self.expect_keyword("BY")?;
                    query.group_by = Some(self.field()?);
                }
                "SHOW" if !seen_show => {
                    seen_show = true;
                    if self.peek() == Some(&Token::Word("*".into())) {
                        self.pos += 1;
                        continue;
                    }
                    loop {
                        query.show.push(self.field()?);
                        if self.peek() != Some(&Token::Comma) {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                "LIMIT" if !seen_limit => {
                    seen_limit = true;
                    match self.next() {
                        Some(Token::Num(n)) => {
                            let limit = n.as_u64().ok_or_else(|| {
                                UnsafeQueryError::malformed("limit must be a whole number")
                            })?;
                            query.limit = Some(usize::try_from(limit).map_err(|_| {
                                UnsafeQueryError::malformed("limit out of range")
                            })?);
                        }
                        _ => return Err(UnsafeQueryError::malformed("expected a number after LIMIT")),
                    }
                }
                "OR" => {
                    return Err(UnsafeQueryError::malformed(
                        "OR is not supported; conditions are ANDed",
                    ))
                }
                _ => {
                    return Err(UnsafeQueryError::malformed(format!(
                        "unexpected or repeated '{}'",
                        w
                    )))
                }
            }
        }
        Ok(query)
    }
}

const KEYWORDS: &[&str] = &[
    "FROM", "WHERE", "AND", "OR", "ORDER", "BY", "GROUP", "SHOW", "LIMIT", "ASC", "DESC", "IN",
    "BETWEEN", "EXISTS", "NOT", "CONTAINS",
];

fn is_keyword(word: &str) -> bool {
    KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

/// Parses TQL text; the result still has to pass the safety validator
pub fn parse(input: &str) -> Result<TqlQuery, UnsafeQueryError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(UnsafeQueryError::malformed("empty query"));
    }
    Parser { tokens, pos: 0 }.query()
}
