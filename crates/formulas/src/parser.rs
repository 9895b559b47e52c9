//! Arithmetic expression parser.
//!
//! Evaluates the residue left after cell references have been substituted
//! with numbers: digits, decimal points, `+ - * /` and parentheses. The
//! expression is evaluated directly while parsing, so there is no dynamic
//! code execution anywhere in formula handling.

use crate::error::{FormulaError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
enum TokenKind {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Eof,
}

struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    input: &'a str,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            input,
        }
    }

    fn tokenize(mut self) -> Result<Vec<TokenKind>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn next_token(&mut self) -> Result<TokenKind> {
        while matches!(self.peek(), Some(ch) if ch.is_whitespace()) {
            self.pos += 1;
        }
        let ch = match self.peek() {
            Some(ch) => ch,
            None => return Ok(TokenKind::Eof),
        };

        let token = match ch {
            '+' => self.simple(TokenKind::Plus),
            '-' => self.simple(TokenKind::Minus),
            '*' => self.simple(TokenKind::Star),
            '/' => self.simple(TokenKind::Slash),
            '(' => self.simple(TokenKind::LParen),
            ')' => self.simple(TokenKind::RParen),
            '.' | '0'..='9' => self.number_token()?,
            _ => {
                return Err(FormulaError::Parse(format!(
                    "Unexpected character '{ch}' in expression '{}'",
                    self.input
                )))
            }
        };
        Ok(token)
    }

    fn simple(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 1;
        kind
    }

    fn number_token(&mut self) -> Result<TokenKind> {
        let start = self.pos;
        while matches!(self.peek(), Some(ch) if ch.is_ascii_digit() || ch == '.') {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let value = text
            .parse::<f64>()
            .map_err(|_| FormulaError::Parse(format!("Invalid number literal '{text}'")))?;
        Ok(TokenKind::Number(value))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }
}

struct Parser {
    tokens: Vec<TokenKind>,
    idx: usize,
}

impl Parser {
    fn new(tokens: Vec<TokenKind>) -> Self {
        Self { tokens, idx: 0 }
    }

    fn parse_expression(&mut self) -> Result<f64> {
        self.parse_add_sub()
    }

    fn parse_add_sub(&mut self) -> Result<f64> {
        let mut value = self.parse_mul_div()?;
        loop {
            match self.peek() {
                TokenKind::Plus => {
                    self.advance();
                    value += self.parse_mul_div()?;
                }
                TokenKind::Minus => {
                    self.advance();
                    value -= self.parse_mul_div()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_mul_div(&mut self) -> Result<f64> {
        let mut value = self.parse_unary()?;
        loop {
            match self.peek() {
                TokenKind::Star => {
                    self.advance();
                    value *= self.parse_unary()?;
                }
                TokenKind::Slash => {
                    self.advance();
                    value /= self.parse_unary()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_unary(&mut self) -> Result<f64> {
        match self.peek() {
            TokenKind::Plus => {
                self.advance();
                self.parse_unary()
            }
            TokenKind::Minus => {
                self.advance();
                Ok(-self.parse_unary()?)
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<f64> {
        match self.advance() {
            TokenKind::Number(value) => Ok(value),
            TokenKind::LParen => {
                let value = self.parse_expression()?;
                match self.advance() {
                    TokenKind::RParen => Ok(value),
                    _ => Err(FormulaError::Parse("Expected ')'".to_string())),
                }
            }
            TokenKind::Eof => Err(FormulaError::Parse("Unexpected end of input".to_string())),
            other => Err(FormulaError::Parse(format!("Unexpected token {other:?}"))),
        }
    }

    fn peek(&self) -> TokenKind {
        self.tokens.get(self.idx).copied().unwrap_or(TokenKind::Eof)
    }

    fn advance(&mut self) -> TokenKind {
        let token = self.peek();
        self.idx += 1;
        token
    }
}

/// Evaluate a pure arithmetic expression over numbers, `+ - * /` and
/// parentheses.
pub fn eval_arithmetic(input: &str) -> Result<f64> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser::new(tokens);
    let value = parser.parse_expression()?;
    match parser.advance() {
        TokenKind::Eof => Ok(value),
        other => Err(FormulaError::Parse(format!(
            "Trailing token {other:?} after expression"
        ))),
    }
}
