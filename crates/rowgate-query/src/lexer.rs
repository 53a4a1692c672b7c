//! Tokenizer.
//!
//! Words are always lexed as identifiers; whether an identifier acts as a
//! keyword is decided by the parser, so property names such as `c.order` or
//! `c.value` need no quoting.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{is_not, tag, take_while},
    character::complete::{char, digit1, multispace0, one_of, satisfy},
    combinator::{map, map_res, opt, recognize, value},
    multi::many0,
    sequence::{delimited, pair, preceded},
};

use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Ident(String),
    /// String literal, unescaped.
    Str(String),
    /// Numeric literal, as written.
    Number(String),
    /// `:name`
    NamedParam(String),
    /// `?1`
    PositionalParam(u32),
    Comma,
    Dot,
    LParen,
    RParen,
    Eq,
    /// `<>`
    Ne,
    /// `!=`
    BangEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Eof,
}

impl TokenKind {
    /// Short description for error messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("'{name}'"),
            TokenKind::Str(s) => format!("string '{s}'"),
            TokenKind::Number(n) => format!("number {n}"),
            TokenKind::NamedParam(name) => format!("parameter :{name}"),
            TokenKind::PositionalParam(n) => format!("parameter ?{n}"),
            TokenKind::Comma => "','".into(),
            TokenKind::Dot => "'.'".into(),
            TokenKind::LParen => "'('".into(),
            TokenKind::RParen => "')'".into(),
            TokenKind::Eq => "'='".into(),
            TokenKind::Ne => "'<>'".into(),
            TokenKind::BangEq => "'!='".into(),
            TokenKind::Lt => "'<'".into(),
            TokenKind::Le => "'<='".into(),
            TokenKind::Gt => "'>'".into(),
            TokenKind::Ge => "'>='".into(),
            TokenKind::Plus => "'+'".into(),
            TokenKind::Minus => "'-'".into(),
            TokenKind::Star => "'*'".into(),
            TokenKind::Slash => "'/'".into(),
            TokenKind::Eof => "end of input".into(),
        }
    }
}

/// A token and its byte offset in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

impl Token {
    /// Whether this token is the identifier `keyword`, ignoring case.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.kind, TokenKind::Ident(name) if name.eq_ignore_ascii_case(keyword))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(satisfy(is_ident_start), take_while(is_ident_char))).parse(input)
}

fn string_literal(input: &str) -> IResult<&str, String> {
    delimited(
        char('\''),
        map(
            many0(alt((
                map(is_not("'"), String::from),
                value("'".to_string(), tag("''")),
            ))),
            |parts| parts.concat(),
        ),
        char('\''),
    )
    .parse(input)
}

fn exponent(input: &str) -> IResult<&str, &str> {
    recognize((one_of("eE"), opt(one_of("+-")), digit1)).parse(input)
}

// 12, 12.5, .5, 1e3, 10L, 2.5D
fn number_literal(input: &str) -> IResult<&str, &str> {
    recognize((
        alt((
            recognize((digit1, opt(pair(char('.'), digit1)))),
            recognize(pair(char('.'), digit1)),
        )),
        opt(exponent),
        opt(one_of("lLdDfF")),
    ))
    .parse(input)
}

fn operator(input: &str) -> IResult<&str, TokenKind> {
    alt((
        value(TokenKind::Ne, tag("<>")),
        value(TokenKind::Le, tag("<=")),
        value(TokenKind::Ge, tag(">=")),
        value(TokenKind::BangEq, tag("!=")),
        value(TokenKind::Lt, char('<')),
        value(TokenKind::Gt, char('>')),
        value(TokenKind::Eq, char('=')),
        value(TokenKind::Comma, char(',')),
        value(TokenKind::Dot, char('.')),
        value(TokenKind::LParen, char('(')),
        value(TokenKind::RParen, char(')')),
        value(TokenKind::Plus, char('+')),
        value(TokenKind::Minus, char('-')),
        value(TokenKind::Star, char('*')),
        value(TokenKind::Slash, char('/')),
    ))
    .parse(input)
}

fn token(input: &str) -> IResult<&str, TokenKind> {
    alt((
        map(string_literal, TokenKind::Str),
        map(number_literal, |n: &str| TokenKind::Number(n.to_string())),
        map(preceded(char(':'), identifier), |name: &str| {
            TokenKind::NamedParam(name.to_string())
        }),
        map(
            preceded(char('?'), map_res(digit1, |n: &str| n.parse::<u32>())),
            TokenKind::PositionalParam,
        ),
        map(identifier, |name: &str| TokenKind::Ident(name.to_string())),
        operator,
    ))
    .parse(input)
}

/// Split `source` into tokens, terminated by [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut rest = source;
    loop {
        let (after_ws, _) = multispace0::<&str, nom::error::Error<&str>>(rest)
            .map_err(|_| ParseError::at(source, source.len() - rest.len(), "invalid input"))?;
        rest = after_ws;
        let offset = source.len() - rest.len();
        if rest.is_empty() {
            tokens.push(Token {
                kind: TokenKind::Eof,
                offset,
            });
            return Ok(tokens);
        }
        match token(rest) {
            Ok((remaining, kind)) => {
                tokens.push(Token { kind, offset });
                rest = remaining;
            }
            Err(_) => {
                let message = if rest.starts_with('\'') {
                    "unterminated string literal".to_string()
                } else {
                    let c = rest.chars().next().unwrap_or(' ');
                    format!("unexpected character '{c}'")
                };
                return Err(ParseError::at(source, offset, message));
            }
        }
    }
}
