//! Guard expressions for conditional styles
//!
//! A small expression language over the data context: literals, property
//! paths, `! && ||`, comparisons and arithmetic, with parentheses.
//!
//! ```text
//! qty > 10 && status != 'closed'
//! index % 2 == 0
//! !(prev.group == group)
//! ```

use crate::error::{StencilError, StencilResult};
use serde_json::{Number, Value};
use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Text(String),
    Path(String),
    Operator(&'static str),
    OpenParen,
    CloseParen,
}

struct Tokenizer<'a> {
    chars: Peekable<Chars<'a>>,
    source: &'a str,
}

impl<'a> Tokenizer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            source,
        }
    }

    fn error(&self, message: impl Into<String>) -> StencilError {
        StencilError::Expression(format!("'{}': {}", self.source, message.into()))
    }

    fn tokenize(mut self) -> StencilResult<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
                continue;
            }
            let token = match c {
                '(' => {
                    self.chars.next();
                    Token::OpenParen
                }
                ')' => {
                    self.chars.next();
                    Token::CloseParen
                }
                '"' | '\'' => self.read_string(c)?,
                '0'..='9' => self.read_number()?,
                '+' | '-' | '*' | '/' | '%' => {
                    self.chars.next();
                    Token::Operator(match c {
                        '+' => "+",
                        '-' => "-",
                        '*' => "*",
                        '/' => "/",
                        _ => "%",
                    })
                }
                '=' | '!' | '<' | '>' | '&' | '|' => self.read_operator(c)?,
                c if c.is_alphabetic() || c == '_' || c == '$' => self.read_path(),
                other => return Err(self.error(format!("unexpected character '{}'", other))),
            };
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn read_string(&mut self, quote: char) -> StencilResult<Token> {
        self.chars.next();
        let mut text = String::new();
        loop {
            match self.chars.next() {
                Some('\\') => {
                    if let Some(escaped) = self.chars.next() {
                        text.push(escaped);
                    }
                }
                Some(c) if c == quote => return Ok(Token::Text(text)),
                Some(c) => text.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn read_number(&mut self) -> StencilResult<Token> {
        let mut text = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() || c == '.' {
                text.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| self.error(format!("invalid number '{}'", text)))
    }

    fn read_operator(&mut self, first: char) -> StencilResult<Token> {
        self.chars.next();
        let next = self.chars.peek().copied();
        let op = match (first, next) {
            ('=', Some('=')) => "==",
            ('!', Some('=')) => "!=",
            ('<', Some('=')) => "<=",
            ('>', Some('=')) => ">=",
            ('&', Some('&')) => "&&",
            ('|', Some('|')) => "||",
            ('!', _) => return Ok(Token::Operator("!")),
            ('<', _) => return Ok(Token::Operator("<")),
            ('>', _) => return Ok(Token::Operator(">")),
            _ => return Err(self.error(format!("incomplete operator '{}'", first))),
        };
        self.chars.next();
        Ok(Token::Operator(op))
    }

    /// A property path; `[..]` and `(..)` directly attached belong to it.
    fn read_path(&mut self) -> Token {
        let mut path = String::new();
        while let Some(&c) = self.chars.peek() {
            match c {
                c if c.is_alphanumeric() || c == '_' || c == '$' || c == '.' => {
                    path.push(c);
                    self.chars.next();
                }
                '[' | '(' => {
                    let close = if c == '[' { ']' } else { ')' };
                    for inner in self.chars.by_ref() {
                        path.push(inner);
                        if inner == close {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
        Token::Path(path)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Path(String),
    Not(Box<Expr>),
    Negate(Box<Expr>),
    Binary(&'static str, Box<Expr>, Box<Expr>),
}

/// A parsed guard expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    root: Expr,
}

/// Parse an expression.
pub fn parse(source: &str) -> StencilResult<Expression> {
    let tokens = Tokenizer::new(source).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        source,
    };
    let root = parser.parse_or()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(Expression { root })
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> StencilError {
        StencilError::Expression(format!("'{}': {}", self.source, message))
    }

    fn peek_operator(&self, candidates: &[&'static str]) -> Option<&'static str> {
        match self.tokens.get(self.pos) {
            Some(Token::Operator(op)) if candidates.contains(op) => Some(*op),
            _ => None,
        }
    }

    fn binary_level(
        &mut self,
        operators: &[&'static str],
        next: fn(&mut Self) -> StencilResult<Expr>,
    ) -> StencilResult<Expr> {
        let mut left = next(self)?;
        while let Some(op) = self.peek_operator(operators) {
            self.pos += 1;
            let right = next(self)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> StencilResult<Expr> {
        self.binary_level(&["||"], Self::parse_and)
    }

    fn parse_and(&mut self) -> StencilResult<Expr> {
        self.binary_level(&["&&"], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> StencilResult<Expr> {
        self.binary_level(&["==", "!="], Self::parse_comparison)
    }

    fn parse_comparison(&mut self) -> StencilResult<Expr> {
        self.binary_level(&["<", "<=", ">", ">="], Self::parse_additive)
    }

    fn parse_additive(&mut self) -> StencilResult<Expr> {
        self.binary_level(&["+", "-"], Self::parse_multiplicative)
    }

    fn parse_multiplicative(&mut self) -> StencilResult<Expr> {
        self.binary_level(&["*", "/", "%"], Self::parse_unary)
    }

    fn parse_unary(&mut self) -> StencilResult<Expr> {
        if let Some(op) = self.peek_operator(&["!", "-"]) {
            self.pos += 1;
            let operand = self.parse_unary()?;
            return Ok(if op == "!" {
                Expr::Not(Box::new(operand))
            } else {
                Expr::Negate(Box::new(operand))
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> StencilResult<Expr> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| self.error("unexpected end of expression"))?;
        self.pos += 1;
        match token {
            Token::Number(n) => Ok(Expr::Literal(number(n))),
            Token::Text(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Path(p) => Ok(match p.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" => Expr::Literal(Value::Null),
                _ => Expr::Path(p),
            }),
            Token::OpenParen => {
                let inner = self.parse_or()?;
                match self.tokens.get(self.pos) {
                    Some(Token::CloseParen) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err(self.error("missing ')'")),
                }
            }
            Token::CloseParen => Err(self.error("unexpected ')'")),
            Token::Operator(op) => Err(self.error(&format!("unexpected operator '{}'", op))),
        }
    }
}

fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

impl Expression {
    /// Evaluate, resolving property paths through `resolve`.
    pub fn eval(&self, resolve: &dyn Fn(&str) -> StencilResult<Value>) -> StencilResult<Value> {
        eval(&self.root, resolve)
    }
}

fn eval(expr: &Expr, resolve: &dyn Fn(&str) -> StencilResult<Value>) -> StencilResult<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Path(p) => resolve(p),
        Expr::Not(inner) => Ok(Value::Bool(!truthy(&eval(inner, resolve)?))),
        Expr::Negate(inner) => {
            let v = eval(inner, resolve)?;
            let n = v.as_f64().ok_or_else(|| {
                StencilError::Expression(format!("cannot negate non-number {}", v))
            })?;
            Ok(number(-n))
        }
        Expr::Binary("&&", left, right) => {
            let l = eval(left, resolve)?;
            if !truthy(&l) {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(truthy(&eval(right, resolve)?)))
        }
        Expr::Binary("||", left, right) => {
            let l = eval(left, resolve)?;
            if truthy(&l) {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(truthy(&eval(right, resolve)?)))
        }
        Expr::Binary(op, left, right) => {
            let l = eval(left, resolve)?;
            let r = eval(right, resolve)?;
            binary(op, &l, &r)
        }
    }
}

fn binary(op: &str, l: &Value, r: &Value) -> StencilResult<Value> {
    match op {
        "==" => return Ok(Value::Bool(values_equal(l, r))),
        "!=" => return Ok(Value::Bool(!values_equal(l, r))),
        "<" | "<=" | ">" | ">=" => {
            let ordering = compare(l, r);
            let result = match (op, ordering) {
                (_, None) => false,
                ("<", Some(o)) => o == Ordering::Less,
                ("<=", Some(o)) => o != Ordering::Greater,
                (">", Some(o)) => o == Ordering::Greater,
                (_, Some(o)) => o != Ordering::Less,
            };
            return Ok(Value::Bool(result));
        }
        "+" => {
            if let (Value::String(a), b) | (b, Value::String(a)) = (l, r) {
                let b_text = match b {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                return Ok(Value::String(if l.is_string() {
                    format!("{}{}", a, b_text)
                } else {
                    format!("{}{}", b_text, a)
                }));
            }
        }
        _ => {}
    }

    let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
        return Err(StencilError::Expression(format!(
            "operator '{}' needs numbers, got {} and {}",
            op, l, r
        )));
    };
    let result = match op {
        "+" => a + b,
        "-" => a - b,
        "*" => a * b,
        "/" | "%" if b == 0.0 => {
            return Err(StencilError::Expression("division by zero".to_string()));
        }
        "/" => a / b,
        "%" => a % b,
        other => {
            return Err(StencilError::Expression(format!(
                "unknown operator '{}'",
                other
            )))
        }
    };
    Ok(number(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval_with(source: &str, data: Value) -> StencilResult<Value> {
        let resolve = |path: &str| -> StencilResult<Value> {
            Ok(path
                .split('.')
                .try_fold(&data, |v, k| v.get(k))
                .cloned()
                .unwrap_or(Value::Null))
        };
        parse(source)?.eval(&resolve)
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval_with("1 + 2 * 3", json!({})).unwrap(), json!(7));
        assert_eq!(eval_with("(1 + 2) * 3", json!({})).unwrap(), json!(9));
        assert_eq!(eval_with("-2 + 5", json!({})).unwrap(), json!(3));
        assert_eq!(eval_with("7 % 4 == 3", json!({})).unwrap(), json!(true));
    }

    #[test]
    fn test_paths_and_comparisons() {
        let data = json!({"qty": 12, "order": {"status": "open"}});
        assert_eq!(eval_with("qty >= 12", data.clone()).unwrap(), json!(true));
        assert_eq!(
            eval_with("order.status == 'open' && qty < 100", data.clone()).unwrap(),
            json!(true)
        );
        assert_eq!(eval_with("!(qty > 1) || missing", data.clone()).unwrap(), json!(false));
        assert_eq!(eval_with("missing == null", data).unwrap(), json!(true));
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(
            eval_with("'n=' + n", json!({"n": 2})).unwrap(),
            json!("n=2")
        );
    }

    #[test]
    fn test_attached_path_suffixes() {
        let resolve = |path: &str| -> StencilResult<Value> {
            assert_eq!(path, "attrs(color)");
            Ok(json!("red"))
        };
        let expr = parse("attrs(color) == \"red\"").unwrap();
        assert_eq!(expr.eval(&resolve).unwrap(), json!(true));
    }

    #[test]
    fn test_errors() {
        assert!(parse("1 +").is_err());
        assert!(parse("(1").is_err());
        assert!(parse("a = b").is_err());
        assert!(parse("'open").is_err());
        assert!(parse("1 2").is_err());
        assert!(eval_with("1 / 0", json!({})).is_err());
        assert!(eval_with("true * 2", json!({})).is_err());
    }
}
