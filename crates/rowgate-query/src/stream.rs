//! Token stream with lookahead for the recursive-descent parser.

use crate::error::ParseError;
use crate::lexer::{Token, TokenKind};

#[derive(Debug)]
pub(crate) struct TokenStream<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    eof: Token,
}

impl<'a> TokenStream<'a> {
    pub fn new(source: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            eof: Token {
                kind: TokenKind::Eof,
                offset: source.len(),
            },
            source,
            tokens,
            pos: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Restore a position for backtracking.
    pub fn restore(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn peek(&self) -> &Token {
        self.peek_n(0)
    }

    /// Peek at the nth token ahead (0 = current).
    pub fn peek_n(&self, n: usize) -> &Token {
        self.tokens.get(self.pos + n).unwrap_or(&self.eof)
    }

    pub fn is_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    /// Consume the current token and return it.
    pub fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    pub fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    pub fn check_keyword(&self, keyword: &str) -> bool {
        self.peek().is_keyword(keyword)
    }

    /// Consume the current token if it is `kind`.
    pub fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Consume the current token if it is the keyword.
    pub fn match_keyword(&mut self, keyword: &str) -> bool {
        if self.check_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn expect(&mut self, kind: &TokenKind) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&kind.describe()))
        }
    }

    pub fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        if self.match_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(keyword))
        }
    }

    /// Consume an identifier and return its text.
    pub fn expect_ident(&mut self, what: &str) -> Result<String, ParseError> {
        match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    /// Error at the current token.
    pub fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::at(self.source, self.peek().offset, message)
    }

    /// "expected X, found Y" at the current token.
    pub fn unexpected(&self, expected: &str) -> ParseError {
        self.error(format!(
            "expected {}, found {}",
            expected,
            self.peek().kind.describe()
        ))
    }
}
