//! Per-feature attribute expressions.
//!
//! Grammar:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := '-' unary | primary
//! primary := number | string | ident | '[' name ']' | '$' measure | '(' expr ')'
//! ```
//!
//! Bare identifiers are property references except `null`, `true` and
//! `false`. Evaluation never fails: type mismatches, missing properties and
//! division by zero produce `Null`.

use std::iter::Peekable;
use std::str::CharIndices;

use layers::feature::{Feature, Geometry, Scalar};

use crate::adapter::GeometryAdapter;

/// Deepest expression tree the parser builds. Counts `(`, unary `-` and
/// operators chained at one level.
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Measure {
    Area,
    Length,
    X,
    Y,
}

impl Measure {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "area" => Some(Measure::Area),
            "length" => Some(Measure::Length),
            "x" => Some(Measure::X),
            "y" => Some(Measure::Y),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Scalar),
    Property(String),
    Measure(Measure),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    /// Byte offset into the source.
    pub position: usize,
    pub message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at offset {}", self.message, self.position)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Text(String),
    Ident(String),
    Bracketed(String),
    Measure(Measure),
    Op(char),
    Open,
    Close,
}

fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, ParseError> {
    let err = |position: usize, message: String| ParseError { position, message };
    let mut out = Vec::new();
    let mut chars: Peekable<CharIndices<'_>> = src.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' | '-' | '*' | '/' => {
                chars.next();
                out.push((pos, Token::Op(c)));
            }
            '(' => {
                chars.next();
                out.push((pos, Token::Open));
            }
            ')' => {
                chars.next();
                out.push((pos, Token::Close));
            }
            '\'' | '"' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                for (_, ch) in chars.by_ref() {
                    if ch == c {
                        closed = true;
                        break;
                    }
                    text.push(ch);
                }
                if !closed {
                    return Err(err(pos, "unterminated string".into()));
                }
                out.push((pos, Token::Text(text)));
            }
            '[' => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for (_, ch) in chars.by_ref() {
                    if ch == ']' {
                        closed = true;
                        break;
                    }
                    name.push(ch);
                }
                if !closed || name.is_empty() {
                    return Err(err(pos, "expected `[name]`".into()));
                }
                out.push((pos, Token::Bracketed(name)));
            }
            '$' => {
                chars.next();
                let name = take_while(&mut chars, |ch| ch.is_ascii_alphanumeric() || ch == '_');
                let measure = Measure::parse(&name)
                    .ok_or_else(|| err(pos, format!("unknown measure `${name}`")))?;
                out.push((pos, Token::Measure(measure)));
            }
            c if c.is_ascii_digit() || c == '.' => {
                let digits = take_while(&mut chars, |ch| ch.is_ascii_digit() || ch == '.');
                let value = digits
                    .parse::<f64>()
                    .map_err(|_| err(pos, format!("invalid number `{digits}`")))?;
                out.push((pos, Token::Number(value)));
            }
            c if c.is_alphabetic() || c == '_' => {
                let name = take_while(&mut chars, |ch| ch.is_alphanumeric() || ch == '_');
                out.push((pos, Token::Ident(name)));
            }
            other => return Err(err(pos, format!("unexpected character `{other}`"))),
        }
    }
    Ok(out)
}

fn take_while(chars: &mut Peekable<CharIndices<'_>>, pred: impl Fn(char) -> bool) -> String {
    let mut s = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if !pred(c) {
            break;
        }
        s.push(c);
        chars.next();
    }
    s
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    cursor: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor).map(|(_, t)| t)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.cursor).map_or(self.end, |(p, _)| *p)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.cursor).map(|(_, t)| t.clone());
        self.cursor += 1;
        t
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            position: self.position(),
            message: message.into(),
        }
    }

    fn descend(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error(format!("expression nested deeper than {MAX_DEPTH} levels")));
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut lhs = self.term()?;
        while let Some(Token::Op(c @ ('+' | '-'))) = self.peek() {
            let op = if *c == '+' { BinOp::Add } else { BinOp::Sub };
            self.descend()?;
            self.next();
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        self.depth = base;
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut lhs = self.unary()?;
        while let Some(Token::Op(c @ ('*' | '/'))) = self.peek() {
            let op = if *c == '*' { BinOp::Mul } else { BinOp::Div };
            self.descend()?;
            self.next();
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        self.depth = base;
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if let Some(Token::Op('-')) = self.peek() {
            self.descend()?;
            self.next();
            let inner = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let at = self.position();
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Literal(Scalar::Number(n))),
            Some(Token::Text(s)) => Ok(Expr::Literal(Scalar::Text(s))),
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "null" => Expr::Literal(Scalar::Null),
                "true" => Expr::Literal(Scalar::Bool(true)),
                "false" => Expr::Literal(Scalar::Bool(false)),
                _ => Expr::Property(name),
            }),
            Some(Token::Bracketed(name)) => Ok(Expr::Property(name)),
            Some(Token::Measure(m)) => Ok(Expr::Measure(m)),
            Some(Token::Open) => {
                self.descend()?;
                let inner = self.expr()?;
                self.depth -= 1;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(ParseError {
                        position: at,
                        message: "unbalanced `(`".into(),
                    }),
                }
            }
            Some(other) => Err(ParseError {
                position: at,
                message: format!("unexpected {other:?}"),
            }),
            None => Err(self.error("unexpected end of expression")),
        }
    }
}

impl Expr {
    pub fn parse(src: &str) -> Result<Expr, ParseError> {
        let tokens = tokenize(src)?;
        let mut parser = Parser {
            tokens,
            cursor: 0,
            end: src.len(),
            depth: 0,
        };
        if parser.peek().is_none() {
            return Err(parser.error("empty expression"));
        }
        let expr = parser.expr()?;
        if parser.peek().is_some() {
            return Err(parser.error("trailing input"));
        }
        Ok(expr)
    }

    pub fn evaluate(&self, feature: &Feature, adapter: &dyn GeometryAdapter) -> Scalar {
        match self {
            Expr::Literal(v) => v.clone(),
            Expr::Property(name) => feature.properties.get(name).cloned().unwrap_or(Scalar::Null),
            Expr::Measure(m) => measure(*m, &feature.geometry, adapter),
            Expr::Neg(inner) => match inner.evaluate(feature, adapter) {
                Scalar::Number(n) => Scalar::Number(-n),
                _ => Scalar::Null,
            },
            Expr::Binary(op, lhs, rhs) => {
                binary(*op, lhs.evaluate(feature, adapter), rhs.evaluate(feature, adapter))
            }
        }
    }
}

fn measure(m: Measure, geometry: &Geometry, adapter: &dyn GeometryAdapter) -> Scalar {
    match m {
        Measure::Area => Scalar::Number(adapter.area(geometry)),
        Measure::Length => Scalar::Number(adapter.length(geometry)),
        // Points report their own position, everything else the bounds center.
        Measure::X | Measure::Y => {
            let center = match geometry {
                Geometry::Point(c) => Some([c.lon, c.lat]),
                other => other.bounds().map(|b| b.center()),
            };
            match center {
                Some([x, _]) if m == Measure::X => Scalar::Number(x),
                Some([_, y]) => Scalar::Number(y),
                None => Scalar::Null,
            }
        }
    }
}

fn binary(op: BinOp, lhs: Scalar, rhs: Scalar) -> Scalar {
    match (op, lhs, rhs) {
        (BinOp::Add, Scalar::Text(a), Scalar::Text(b)) => Scalar::Text(a + &b),
        (op, Scalar::Number(a), Scalar::Number(b)) => {
            let v = match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div if b == 0.0 => return Scalar::Null,
                BinOp::Div => a / b,
            };
            if v.is_finite() { Scalar::Number(v) } else { Scalar::Null }
        }
        _ => Scalar::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::{BinOp, Expr, MAX_DEPTH, Measure};
    use crate::planar::PlanarAdapter;
    use layers::feature::{Feature, Scalar};
    use pretty_assertions::assert_eq;

    fn eval(src: &str, feature: &Feature) -> Scalar {
        Expr::parse(src).unwrap().evaluate(feature, &PlanarAdapter::new())
    }

    #[test]
    fn precedence_and_unary_minus() {
        let f = Feature::point(0.0, 0.0);
        assert_eq!(eval("1 + 2 * 3", &f), Scalar::Number(7.0));
        assert_eq!(eval("(1 + 2) * 3", &f), Scalar::Number(9.0));
        assert_eq!(eval("-2 - -3", &f), Scalar::Number(1.0));
        assert_eq!(eval("10 / 4", &f), Scalar::Number(2.5));
    }

    #[test]
    fn parses_property_forms() {
        assert_eq!(
            Expr::parse("pop * [area km]").unwrap(),
            Expr::Binary(
                BinOp::Mul,
                Box::new(Expr::Property("pop".into())),
                Box::new(Expr::Property("area km".into())),
            )
        );
        assert_eq!(Expr::parse("$length").unwrap(), Expr::Measure(Measure::Length));
    }

    #[test]
    fn properties_and_strings() {
        let f = Feature::point(3.0, 4.0)
            .with_property("pop", 1200.0)
            .with_property("name", "Oslo");
        assert_eq!(eval("pop / 100", &f), Scalar::Number(12.0));
        assert_eq!(eval("name + ' city'", &f), Scalar::Text("Oslo city".into()));
        assert_eq!(eval("$x + $y", &f), Scalar::Number(7.0));
    }

    #[test]
    fn bad_values_become_null() {
        let f = Feature::point(0.0, 0.0).with_property("name", "x");
        assert_eq!(eval("missing + 1", &f), Scalar::Null);
        assert_eq!(eval("name * 2", &f), Scalar::Null);
        assert_eq!(eval("1 / 0", &f), Scalar::Null);
        assert_eq!(eval("-name", &f), Scalar::Null);
        assert_eq!(eval("null", &f), Scalar::Null);
    }

    #[test]
    fn parse_errors() {
        for src in ["", "1 +", "(1 + 2", "1 2", "$volume", "'open", "[]", "1 # 2"] {
            assert!(Expr::parse(src).is_err(), "{src:?} should not parse");
        }
        let err = Expr::parse("1 + $nope").unwrap_err();
        assert_eq!(err.position, 4);
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let negations = format!("{}1", "-".repeat(200_000));
        assert!(Expr::parse(&negations).unwrap_err().message.contains("nested"));

        let parens = format!("{}1{}", "(".repeat(200_000), ")".repeat(200_000));
        assert!(Expr::parse(&parens).unwrap_err().message.contains("nested"));

        let at_limit = format!("{}1{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        let f = Feature::point(0.0, 0.0);
        assert_eq!(eval(&at_limit, &f), Scalar::Number(1.0));
        assert!(Expr::parse(&format!("-{at_limit}")).is_err());

        let long_sum = vec!["1"; 100_000].join(" + ");
        assert!(Expr::parse(&long_sum).is_err());
        let short_sum = vec!["1"; 100].join(" + ");
        assert_eq!(eval(&short_sum, &f), Scalar::Number(100.0));
    }
}
