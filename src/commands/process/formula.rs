//! Formula parsing for the restricted grammar the statement pages emit.
//!
//! ```text
//! formula        --> "=" expression
//! expression     --> additive
//! additive       --> multiplicative ( ("+" | "-") multiplicative )*
//! multiplicative --> power ( ("*" | "/") power )*
//! power          --> unary ( "^" unary )*
//! unary          --> ("-" | "+") unary | percent
//! percent        --> primary "%"*
//! primary        --> NUMBER | STRING | reference | call | "(" expression ")"
//! reference      --> [sheet "!"] cell ( ":" cell )?
//! call           --> IDENT "(" ( expression ( "," expression )* )? ")"
//! ```
//!
//! Negation and `%` bind tighter than `^`, and `^` is left-associative, so
//! `-2^2` is 4 and `2^3^2` is 64.
//!
//! Cells are written A1-style (`B12`, `$B$12`) or R1C1-style (`R3C5`). The
//! sheet prefix is accepted and ignored since every grid is a single sheet.

use std::fmt;
use std::sync::LazyLock;

use super::*;

static A1_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z]{1,3})([0-9]+)$").expect("valid A1 regex"));
static R1C1_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[Rr]([0-9]+)[Cc]([0-9]+)$").expect("valid R1C1 regex"));

#[derive(Debug, Clone, PartialEq, Error)]
pub(super) enum FormulaError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("circular reference through {0}")]
    CircularReference(String),

    #[error("unresolved reference {0}")]
    UnresolvedReference(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("unsupported function {0}")]
    UnsupportedFunction(String),
}

/// 1-based grid coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(super) struct CellRef {
    pub(super) row: u32,
    pub(super) col: u32,
}

impl CellRef {
    pub(super) fn parse(text: &str) -> Option<CellRef> {
        let text = text.trim().replace('$', "");
        if let Some(caps) = R1C1_RE.captures(&text) {
            let row = caps[1].parse::<u32>().ok()?;
            let col = caps[2].parse::<u32>().ok()?;
            return (row > 0 && col > 0).then_some(CellRef { row, col });
        }

        let caps = A1_RE.captures(&text)?;
        let mut col = 0u32;
        for byte in caps[1].to_ascii_uppercase().bytes() {
            col = col.checked_mul(26)?.checked_add(u32::from(byte - b'A') + 1)?;
        }
        let row = caps[2].parse::<u32>().ok()?;
        (row > 0).then_some(CellRef { row, col })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut letters = Vec::new();
        let mut n = self.col;
        while n > 0 {
            n -= 1;
            letters.push((b'A' + (n % 26) as u8) as char);
            n /= 26;
        }
        letters.reverse();
        write!(f, "{}{}", letters.into_iter().collect::<String>(), self.row)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Expr {
    Number(f64),
    Text(String),
    Ref(CellRef),
    Range(CellRef, CellRef),
    Negate(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub(super) fn collect_refs(&self, out: &mut Vec<Expr>) {
        match self {
            Expr::Ref(_) | Expr::Range(_, _) => out.push(self.clone()),
            Expr::Negate(operand) => operand.collect_refs(out),
            Expr::Binary { left, right, .. } => {
                left.collect_refs(out);
                right.collect_refs(out);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_refs(out);
                }
            }
            Expr::Number(_) | Expr::Text(_) => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Str(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Percent,
    Colon,
    Comma,
    Bang,
    LParen,
    RParen,
    Eof,
}

fn tokenize(input: &str) -> Result<Vec<Token>, FormulaError> {
    let chars = input.chars().collect::<Vec<_>>();
    let mut tokens = Vec::new();
    let mut index = 0;

    while index < chars.len() {
        let ch = chars[index];
        match ch {
            c if c.is_whitespace() => index += 1,
            '+' => push_advance(&mut tokens, Token::Plus, &mut index),
            '-' => push_advance(&mut tokens, Token::Minus, &mut index),
            '*' => push_advance(&mut tokens, Token::Star, &mut index),
            '/' => push_advance(&mut tokens, Token::Slash, &mut index),
            '^' => push_advance(&mut tokens, Token::Caret, &mut index),
            '%' => push_advance(&mut tokens, Token::Percent, &mut index),
            ':' => push_advance(&mut tokens, Token::Colon, &mut index),
            ',' | ';' => push_advance(&mut tokens, Token::Comma, &mut index),
            '!' => push_advance(&mut tokens, Token::Bang, &mut index),
            '(' => push_advance(&mut tokens, Token::LParen, &mut index),
            ')' => push_advance(&mut tokens, Token::RParen, &mut index),
            '"' | '\'' => {
                let quote = ch;
                let start = index + 1;
                let end = chars[start..]
                    .iter()
                    .position(|c| *c == quote)
                    .map(|offset| start + offset)
                    .ok_or_else(|| FormulaError::Syntax("unterminated string".to_string()))?;
                tokens.push(Token::Str(chars[start..end].iter().collect()));
                index = end + 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = index;
                while index < chars.len() && (chars[index].is_ascii_digit() || chars[index] == '.')
                {
                    index += 1;
                }
                if index < chars.len() && matches!(chars[index], 'e' | 'E') {
                    let mut lookahead = index + 1;
                    if lookahead < chars.len() && matches!(chars[lookahead], '+' | '-') {
                        lookahead += 1;
                    }
                    if lookahead < chars.len() && chars[lookahead].is_ascii_digit() {
                        index = lookahead;
                        while index < chars.len() && chars[index].is_ascii_digit() {
                            index += 1;
                        }
                    }
                }
                let text = chars[start..index].iter().collect::<String>();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| FormulaError::Syntax(format!("invalid number {text}")))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '$' || c == '_' => {
                let start = index;
                while index < chars.len()
                    && (chars[index].is_alphanumeric() || matches!(chars[index], '$' | '_' | '.'))
                {
                    index += 1;
                }
                tokens.push(Token::Ident(chars[start..index].iter().collect()));
            }
            other => {
                return Err(FormulaError::Syntax(format!("unexpected character {other:?}")));
            }
        }
    }

    tokens.push(Token::Eof);
    Ok(tokens)
}

fn push_advance(tokens: &mut Vec<Token>, token: Token, index: &mut usize) {
    tokens.push(token);
    *index += 1;
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

/// Parses a formula with or without its leading `=`.
pub(super) fn parse_formula(formula: &str) -> Result<Expr, FormulaError> {
    let body = formula.trim().trim_start_matches('=');
    let mut parser = Parser {
        tokens: tokenize(body)?,
        position: 0,
    };

    if parser.peek() == &Token::Eof {
        return Err(FormulaError::Syntax("empty formula".to_string()));
    }

    let expr = parser.expression()?;
    if parser.peek() != &Token::Eof {
        return Err(FormulaError::Syntax(format!(
            "unexpected trailing token {:?}",
            parser.peek()
        )));
    }
    Ok(expr)
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&Token::Eof)
    }

    fn peek_next(&self) -> &Token {
        self.tokens.get(self.position + 1).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.position < self.tokens.len() {
            self.position += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), FormulaError> {
        let found = self.advance();
        if found == expected {
            Ok(())
        } else {
            Err(FormulaError::Syntax(format!(
                "expected {expected:?}, found {found:?}"
            )))
        }
    }

    fn expression(&mut self) -> Result<Expr, FormulaError> {
        self.additive()
    }

    fn additive(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Subtract,
                _ => break,
            };
            self.advance();
            let right = self.multiplicative()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.power()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Multiply,
                Token::Slash => BinaryOp::Divide,
                _ => break,
            };
            self.advance();
            let right = self.power()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn power(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.unary()?;
        while self.peek() == &Token::Caret {
            self.advance();
            let exponent = self.unary()?;
            left = binary(BinaryOp::Power, left, exponent);
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        match self.peek() {
            Token::Minus => {
                self.advance();
                Ok(Expr::Negate(Box::new(self.unary()?)))
            }
            Token::Plus => {
                self.advance();
                self.unary()
            }
            _ => self.percent(),
        }
    }

    fn percent(&mut self) -> Result<Expr, FormulaError> {
        let mut expr = self.primary()?;
        while self.peek() == &Token::Percent {
            self.advance();
            expr = binary(BinaryOp::Divide, expr, Expr::Number(100.0));
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, FormulaError> {
        match self.advance() {
            Token::Number(number) => Ok(Expr::Number(number)),
            Token::LParen => {
                let inner = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Str(text) => {
                if self.peek() == &Token::Bang {
                    self.advance();
                    self.reference()
                } else {
                    Ok(Expr::Text(text))
                }
            }
            Token::Ident(name) => match self.peek() {
                Token::LParen => {
                    self.advance();
                    self.call(name)
                }
                Token::Bang => {
                    self.advance();
                    self.reference()
                }
                _ => self.reference_from(&name),
            },
            other => Err(FormulaError::Syntax(format!("unexpected token {other:?}"))),
        }
    }

    fn reference(&mut self) -> Result<Expr, FormulaError> {
        match self.advance() {
            Token::Ident(name) => self.reference_from(&name),
            other => Err(FormulaError::Syntax(format!(
                "expected cell reference, found {other:?}"
            ))),
        }
    }

    fn reference_from(&mut self, name: &str) -> Result<Expr, FormulaError> {
        let start = CellRef::parse(name)
            .ok_or_else(|| FormulaError::Syntax(format!("invalid cell reference {name}")))?;

        if self.peek() == &Token::Colon && matches!(self.peek_next(), Token::Ident(_)) {
            self.advance();
            let Token::Ident(end_name) = self.advance() else {
                return Err(FormulaError::Syntax("expected range end".to_string()));
            };
            let end = CellRef::parse(&end_name).ok_or_else(|| {
                FormulaError::Syntax(format!("invalid cell reference {end_name}"))
            })?;
            return Ok(Expr::Range(start, end));
        }

        Ok(Expr::Ref(start))
    }

    fn call(&mut self, name: String) -> Result<Expr, FormulaError> {
        let name = name.to_ascii_uppercase();
        let mut args = Vec::new();
        if self.peek() == &Token::RParen {
            self.advance();
            return Ok(Expr::Call { name, args });
        }

        loop {
            args.push(self.expression()?);
            match self.advance() {
                Token::Comma => continue,
                Token::RParen => break,
                other => {
                    return Err(FormulaError::Syntax(format!(
                        "expected ',' or ')', found {other:?}"
                    )));
                }
            }
        }

        Ok(Expr::Call { name, args })
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}
