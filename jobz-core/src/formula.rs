//! Arithmetic expressions for level-curve equations.
//!
//! Grammar (precedence low → high, `^` is right-associative):
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '%') unary)*
//! unary   := '-' unary | power
//! power   := atom ('^' unary)?
//! atom    := number | ident | ident '(' expr (',' expr)* ')' | '(' expr ')'
//! ```
//!
//! The only variable is `level` (alias `x`). Functions: `sqrt`, `ln`, `log10`,
//! `exp`, `abs`, `floor`, `ceil`, `round`, `min`, `max`, `pow`.

use std::fmt;

use crate::error::{JobzError, Result};

/// Longest accepted expression, in tokens. Bounds the depth of the tree.
const MAX_TOKENS: usize = 1024;

/// Deepest accepted nesting of parentheses, calls and unary operators.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
    Comma,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Num(f64),
    Level,
    Neg(Box<Expr>),
    Bin(char, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Sqrt,
    Ln,
    Log10,
    Exp,
    Abs,
    Floor,
    Ceil,
    Round,
    Min,
    Max,
    Pow,
}

impl Func {
    fn lookup(name: &str) -> Option<(Self, usize)> {
        Some(match name {
            "sqrt" => (Self::Sqrt, 1),
            "ln" => (Self::Ln, 1),
            "log10" | "log" => (Self::Log10, 1),
            "exp" => (Self::Exp, 1),
            "abs" => (Self::Abs, 1),
            "floor" => (Self::Floor, 1),
            "ceil" => (Self::Ceil, 1),
            "round" => (Self::Round, 1),
            "min" => (Self::Min, 2),
            "max" => (Self::Max, 2),
            "pow" => (Self::Pow, 2),
            _ => return None,
        })
    }

    fn apply(self, args: &[f64]) -> f64 {
        match (self, args) {
            (Self::Sqrt, [a]) => a.sqrt(),
            (Self::Ln, [a]) => a.ln(),
            (Self::Log10, [a]) => a.log10(),
            (Self::Exp, [a]) => a.exp(),
            (Self::Abs, [a]) => a.abs(),
            (Self::Floor, [a]) => a.floor(),
            (Self::Ceil, [a]) => a.ceil(),
            (Self::Round, [a]) => a.round(),
            (Self::Min, [a, b]) => a.min(*b),
            (Self::Max, [a, b]) => a.max(*b),
            (Self::Pow, [a, b]) => a.powf(*b),
            _ => f64::NAN,
        }
    }
}

/// A parsed curve equation in terms of `level`.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    root: Expr,
}

impl Formula {
    /// Parse an expression.
    ///
    /// # Errors
    /// Returns [`JobzError::Formula`] on any lexical or syntax error,
    /// unknown identifier, or wrong function arity.
    pub fn parse(source: &str) -> Result<Self> {
        let err = |reason: String| JobzError::Formula {
            expression: source.to_string(),
            reason,
        };
        let tokens = tokenize(source).map_err(err)?;
        if tokens.is_empty() {
            return Err(err("expression is empty".to_string()));
        }
        if tokens.len() > MAX_TOKENS {
            return Err(err(format!("expression is longer than {MAX_TOKENS} tokens")));
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let root = parser.expr().map_err(err)?;
        if let Some(extra) = parser.peek() {
            return Err(err(format!("unexpected trailing {extra:?}")));
        }
        Ok(Self {
            source: source.trim().to_string(),
            root,
        })
    }

    /// Evaluate at a level. May return NaN/inf; callers validate.
    #[must_use]
    pub fn eval(&self, level: f64) -> f64 {
        eval(&self.root, level)
    }

    /// The expression as written.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn eval(expr: &Expr, level: f64) -> f64 {
    match expr {
        Expr::Num(n) => *n,
        Expr::Level => level,
        Expr::Neg(inner) => -eval(inner, level),
        Expr::Bin(op, lhs, rhs) => {
            let (a, b) = (eval(lhs, level), eval(rhs, level));
            match op {
                '+' => a + b,
                '-' => a - b,
                '*' => a * b,
                '/' => a / b,
                '%' => a % b,
                '^' => a.powf(b),
                _ => f64::NAN,
            }
        }
        Expr::Call(func, args) => {
            let values: Vec<f64> = args.iter().map(|a| eval(a, level)).collect();
            func.apply(&values)
        }
    }
}

fn tokenize(src: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Exponent part: 1e3, 2.5E-2
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| format!("bad number `{text}`"))?;
                tokens.push(Token::Num(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                tokens.push(Token::Ident(ident.to_ascii_lowercase()));
            }
            '+' | '-' | '*' | '/' | '%' | '^' => {
                tokens.push(Token::Op(c));
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            other => return Err(format!("unexpected character `{other}`")),
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

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn eat_op(&mut self, ops: &[char]) -> Option<char> {
        match self.peek() {
            Some(Token::Op(c)) if ops.contains(c) => {
                let c = *c;
                self.pos += 1;
                Some(c)
            }
            _ => None,
        }
    }

    fn expr(&mut self) -> ParseResult {
        let mut lhs = self.term()?;
        while let Some(op) = self.eat_op(&['+', '-']) {
            let rhs = self.term()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> ParseResult {
        let mut lhs = self.unary()?;
        while let Some(op) = self.eat_op(&['*', '/', '%']) {
            let rhs = self.unary()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    // Every recursive path (parentheses, call arguments, exponents, signs)
    // re-enters through here.
    fn unary(&mut self) -> ParseResult {
        if self.depth >= MAX_DEPTH {
            return Err(format!("expression nested deeper than {MAX_DEPTH} levels"));
        }
        self.depth += 1;
        let parsed = self.signed();
        self.depth -= 1;
        parsed
    }

    fn signed(&mut self) -> ParseResult {
        if self.eat_op(&['-']).is_some() {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        if self.eat_op(&['+']).is_some() {
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> ParseResult {
        let base = self.atom()?;
        if self.eat_op(&['^']).is_some() {
            let exp = self.unary()?;
            return Ok(Expr::Bin('^', Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn atom(&mut self) -> ParseResult {
        match self.next() {
            Some(Token::Num(n)) => Ok(Expr::Num(n)),
            Some(Token::Ident(name)) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.pos += 1;
                    let (func, arity) =
                        Func::lookup(&name).ok_or_else(|| format!("unknown function `{name}`"))?;
                    let mut args = vec![self.expr()?];
                    while matches!(self.peek(), Some(Token::Comma)) {
                        self.pos += 1;
                        args.push(self.expr()?);
                    }
                    if self.next() != Some(Token::RParen) {
                        return Err(format!("missing `)` after arguments to `{name}`"));
                    }
                    if args.len() != arity {
                        return Err(format!(
                            "`{name}` takes {arity} argument(s), got {}",
                            args.len()
                        ));
                    }
                    Ok(Expr::Call(func, args))
                } else {
                    match name.as_str() {
                        "level" | "x" | "lvl" => Ok(Expr::Level),
                        "pi" => Ok(Expr::Num(std::f64::consts::PI)),
                        "e" => Ok(Expr::Num(std::f64::consts::E)),
                        _ => Err(format!("unknown variable `{name}`")),
                    }
                }
            }
            Some(Token::LParen) => {
                let inner = self.expr()?;
                if self.next() != Some(Token::RParen) {
                    return Err("missing `)`".to_string());
                }
                Ok(inner)
            }
            Some(other) => Err(format!("unexpected {other:?}")),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(src: &str, level: f64) -> f64 {
        Formula::parse(src).expect("parses").eval(level)
    }

    #[test]
    fn precedence_and_associativity() {
        assert!((at("1 + 2 * 3", 0.0) - 7.0).abs() < 1e-9);
        assert!((at("(1 + 2) * 3", 0.0) - 9.0).abs() < 1e-9);
        assert!((at("2 ^ 3 ^ 2", 0.0) - 512.0).abs() < 1e-9);
        assert!((at("-2 ^ 2", 0.0) + 4.0).abs() < 1e-9);
        assert!((at("10 - 4 - 3", 0.0) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn level_variable_and_functions() {
        assert!((at("100 * level ^ 1.5", 4.0) - 800.0).abs() < 1e-9);
        assert!((at("max(0, (x - 1) * 50)", 1.0)).abs() < 1e-9);
        assert!((at("floor(sqrt(level))", 10.0) - 3.0).abs() < 1e-9);
        assert!((at("pow(2, lvl)", 5.0) - 32.0).abs() < 1e-9);
        assert!((at("1.5e2 + level", 1.0) - 151.0).abs() < 1e-9);
    }

    #[test]
    fn division_by_zero_is_not_a_parse_error() {
        assert!(at("level / 0", 1.0).is_infinite());
        assert!(at("ln(level - level)", 3.0).is_infinite());
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        for bad in ["", "1 +", "level +* 2", "foo(1)", "hp * 2", "min(1)", "(1 + 2", "3 $ 4", "1 2"] {
            assert!(Formula::parse(bad).is_err(), "`{bad}` should not parse");
        }
    }

    #[test]
    fn deep_nesting_is_rejected_not_overflowed() {
        let deep = format!("{}level{}", "(".repeat(200_000), ")".repeat(200_000));
        assert!(matches!(Formula::parse(&deep), Err(JobzError::Formula { .. })));

        let signs = format!("{}level", "-".repeat(10_000));
        assert!(Formula::parse(&signs).is_err());

        let long_chain = vec!["level"; 5_000].join(" + ");
        assert!(Formula::parse(&long_chain).is_err());

        let ok = format!("{}level{}", "(".repeat(20), ")".repeat(20));
        assert!((at(&ok, 3.0) - 3.0).abs() < 1e-9);
    }
}
