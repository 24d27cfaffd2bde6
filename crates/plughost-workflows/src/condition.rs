//! Condition expressions for branch steps
//!
//! A small expression language evaluated against the single variable
//! `result`. Nothing here executes code; expressions are parsed into an AST
//! and interpreted over JSON values.
//!
//! Supported: number/string/`true`/`false`/`null`/`undefined` literals,
//! `result` with `.field` and `[index]` access, `.length` on arrays and
//! strings, parentheses, unary `!` and `-`, `&&`, `||`, `===`, `!==`, `==`,
//! `!=`, `<`, `<=`, `>`, `>=`.

use plughost_core::{Error, Result};
use serde_json::Value;
use std::cmp::Ordering;

const MAX_DEPTH: usize = 64;
/// Upper bound on tokens; it also bounds the size and depth of the parsed tree
const MAX_TOKENS: usize = 256;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Not,
    Minus,
    And,
    Or,
    StrictEq,
    StrictNe,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    StrictEq,
    StrictNe,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Result,
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

/// A parsed condition expression
#[derive(Debug, Clone)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    /// Parse an expression, failing with [`Error::InvalidCondition`]
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source).map_err(|e| invalid(source, &e))?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.parse_or().map_err(|e| invalid(source, &e))?;
        if parser.pos < parser.tokens.len() {
            return Err(invalid(source, "unexpected trailing input"));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// Expression text as written
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate to a JSON value with `result` bound
    pub fn evaluate_value(&self, result: &Value) -> Value {
        eval(&self.expr, result)
    }

    /// Evaluate and convert to a boolean by truthiness
    pub fn evaluate(&self, result: &Value) -> bool {
        truthy(&self.evaluate_value(result))
    }
}

fn invalid(source: &str, reason: &str) -> Error {
    let shown: String = source.chars().take(80).collect();
    let ellipsis = if shown.len() < source.len() { "..." } else { "" };
    Error::InvalidCondition(format!("{} in '{}{}'", reason, shown, ellipsis))
}

fn tokenize(source: &str) -> std::result::Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        if tokens.len() >= MAX_TOKENS {
            return Err(format!("expression longer than {} tokens", MAX_TOKENS));
        }
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '.' if !chars.get(i + 1).map_or(false, char::is_ascii_digit) => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| format!("bad number '{}'", text))?;
                tokens.push(Token::Number(number));
            }
            '\'' | '"' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err("unterminated string".to_string()),
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            let escaped = chars.get(i + 1).ok_or("unterminated string")?;
                            text.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                other => *other,
                            });
                            i += 2;
                        }
                        Some(&ch) => {
                            text.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            _ => {
                let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
                let (token, width) = if rest.starts_with("===") {
                    (Token::StrictEq, 3)
                } else if rest.starts_with("!==") {
                    (Token::StrictNe, 3)
                } else if rest.starts_with("==") {
                    (Token::Eq, 2)
                } else if rest.starts_with("!=") {
                    (Token::Ne, 2)
                } else if rest.starts_with("<=") {
                    (Token::Le, 2)
                } else if rest.starts_with(">=") {
                    (Token::Ge, 2)
                } else if rest.starts_with("&&") {
                    (Token::And, 2)
                } else if rest.starts_with("||") {
                    (Token::Or, 2)
                } else {
                    let single = match c {
                        '<' => Token::Lt,
                        '>' => Token::Gt,
                        '!' => Token::Not,
                        '-' => Token::Minus,
                        '(' => Token::LParen,
                        ')' => Token::RParen,
                        '[' => Token::LBracket,
                        ']' => Token::RBracket,
                        other => return Err(format!("unexpected character '{}'", other)),
                    };
                    (single, 1)
                };
                tokens.push(token);
                i += width;
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

type ParseResult = std::result::Result<Expr, String>;

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> std::result::Result<(), String> {
        match self.advance() {
            Some(ref token) if *token == expected => Ok(()),
            Some(token) => Err(format!("expected {:?}, found {:?}", expected, token)),
            None => Err(format!("expected {:?}, found end of input", expected)),
        }
    }

    fn enter(&mut self) -> std::result::Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err("expression nested too deeply".to_string());
        }
        Ok(())
    }

    fn parse_or(&mut self) -> ParseResult {
        self.enter()?;
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.depth -= 1;
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult {
        let mut left = self.parse_equality()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> ParseResult {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Some(Token::StrictEq) => BinaryOp::StrictEq,
                Some(Token::StrictNe) => BinaryOp::StrictNe,
                Some(Token::Eq) => BinaryOp::Eq,
                Some(Token::Ne) => BinaryOp::Ne,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_relational()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_relational(&mut self) -> ParseResult {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> ParseResult {
        match self.peek() {
            Some(Token::Not) => {
                self.advance();
                self.enter()?;
                let operand = self.parse_unary()?;
                self.depth -= 1;
                Ok(Expr::Not(Box::new(operand)))
            }
            Some(Token::Minus) => {
                self.advance();
                self.enter()?;
                let operand = self.parse_unary()?;
                self.depth -= 1;
                Ok(Expr::Neg(Box::new(operand)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> ParseResult {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    match self.advance() {
                        Some(Token::Ident(name)) => expr = Expr::Member(Box::new(expr), name),
                        _ => return Err("expected property name after '.'".to_string()),
                    }
                }
                Some(Token::LBracket) => {
                    self.advance();
                    let index = self.parse_or()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> ParseResult {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Literal(number(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Ident(name)) => match name.as_str() {
                "result" => Ok(Expr::Result),
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" | "undefined" => Ok(Expr::Literal(Value::Null)),
                other => Err(format!("unknown identifier '{}'", other)),
            },
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(token) => Err(format!("unexpected token {:?}", token)),
            None => Err("unexpected end of input".to_string()),
        }
    }
}

fn number(n: f64) -> Value {
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn eval(expr: &Expr, result: &Value) -> Value {
    match expr {
        Expr::Literal(value) => value.clone(),
        Expr::Result => result.clone(),
        Expr::Member(target, name) => member(&eval(target, result), name),
        Expr::Index(target, index) => {
            let target = eval(target, result);
            match eval(index, result) {
                Value::String(key) => member(&target, &key),
                Value::Number(n) => match (&target, n.as_f64()) {
                    (Value::Array(items), Some(i)) if i >= 0.0 && i.fract() == 0.0 => {
                        items.get(i as usize).cloned().unwrap_or(Value::Null)
                    }
                    _ => member(&target, &n.to_string()),
                },
                _ => Value::Null,
            }
        }
        Expr::Not(operand) => Value::Bool(!truthy(&eval(operand, result))),
        Expr::Neg(operand) => match eval(operand, result).as_f64() {
            Some(n) => number(-n),
            None => Value::Null,
        },
        Expr::And(left, right) => {
            let left = eval(left, result);
            if truthy(&left) {
                eval(right, result)
            } else {
                left
            }
        }
        Expr::Or(left, right) => {
            let left = eval(left, result);
            if truthy(&left) {
                left
            } else {
                eval(right, result)
            }
        }
        Expr::Binary(op, left, right) => {
            let left = eval(left, result);
            let right = eval(right, result);
            Value::Bool(match op {
                BinaryOp::StrictEq => strict_eq(&left, &right),
                BinaryOp::StrictNe => !strict_eq(&left, &right),
                BinaryOp::Eq => loose_eq(&left, &right),
                BinaryOp::Ne => !loose_eq(&left, &right),
                BinaryOp::Lt => compare(&left, &right) == Some(Ordering::Less),
                BinaryOp::Le => matches!(
                    compare(&left, &right),
                    Some(Ordering::Less | Ordering::Equal)
                ),
                BinaryOp::Gt => compare(&left, &right) == Some(Ordering::Greater),
                BinaryOp::Ge => matches!(
                    compare(&left, &right),
                    Some(Ordering::Greater | Ordering::Equal)
                ),
            })
        }
    }
}

fn member(target: &Value, name: &str) -> Value {
    match (target, name) {
        (Value::Array(items), "length") => Value::from(items.len()),
        (Value::String(s), "length") => Value::from(s.chars().count()),
        (Value::Object(map), _) => map.get(name).cloned().unwrap_or(Value::Null),
        (Value::Array(items), _) => name
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i).cloned())
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// JavaScript-style truthiness
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn strict_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            match (as_number(left), as_number(right)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        (Value::Bool(_), _) | (_, Value::Bool(_)) if !left.is_null() && !right.is_null() => {
            match (as_number(left), as_number(right)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        _ => strict_eq(left, right),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
