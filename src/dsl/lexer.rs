//! Lexer/tokenizer for the filter DSL.

use std::fmt;

use winnow::ascii::{digit1, multispace0};
use winnow::combinator::{alt, not, opt};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::{one_of, take_while};

use super::error::SyntaxError;

/// A token with the byte offset where it starts in the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: usize,
}

/// Token types for the DSL.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Identifiers and literals
    Ident(String),  // tag key, bare value, element type, `with`
    Str(String),    // quoted string, escapes resolved
    Number(String), // numeric literal, verbatim
    Date(String),   // YYYY-MM-DD

    // Operators
    Eq,       // =
    Ne,       // !=
    Match,    // ~
    NotMatch, // !~
    Lt,       // <
    Le,       // <=
    Gt,       // >
    Ge,       // >=
    Not,      // !
    Minus,    // -

    // Punctuation
    LParen, // (
    RParen, // )
    Comma,  // ,

    Keyword(Keyword),

    // End of input
    Eof,
}

/// Reserved words. Only recognized when they make up a whole identifier run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    And,
    Or,
    Not,
    Older,
    Newer,
    Today,
    Now,
    Years,
    Months,
    Weeks,
    Days,
}

impl Keyword {
    pub fn from_word(word: &str) -> Option<Self> {
        let keyword = match word {
            "and" => Keyword::And,
            "or" => Keyword::Or,
            "not" => Keyword::Not,
            "older" => Keyword::Older,
            "newer" => Keyword::Newer,
            "today" => Keyword::Today,
            "now" => Keyword::Now,
            "years" => Keyword::Years,
            "months" => Keyword::Months,
            "weeks" => Keyword::Weeks,
            "days" => Keyword::Days,
            _ => return None,
        };
        Some(keyword)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::And => "and",
            Keyword::Or => "or",
            Keyword::Not => "not",
            Keyword::Older => "older",
            Keyword::Newer => "newer",
            Keyword::Today => "today",
            Keyword::Now => "now",
            Keyword::Years => "years",
            Keyword::Months => "months",
            Keyword::Weeks => "weeks",
            Keyword::Days => "days",
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(s) => write!(f, "identifier '{s}'"),
            TokenKind::Str(s) => write!(f, "string {s:?}"),
            TokenKind::Number(n) => write!(f, "number {n}"),
            TokenKind::Date(d) => write!(f, "date {d}"),
            TokenKind::Eq => write!(f, "'='"),
            TokenKind::Ne => write!(f, "'!='"),
            TokenKind::Match => write!(f, "'~'"),
            TokenKind::NotMatch => write!(f, "'!~'"),
            TokenKind::Lt => write!(f, "'<'"),
            TokenKind::Le => write!(f, "'<='"),
            TokenKind::Gt => write!(f, "'>'"),
            TokenKind::Ge => write!(f, "'>='"),
            TokenKind::Not => write!(f, "'!'"),
            TokenKind::Minus => write!(f, "'-'"),
            TokenKind::LParen => write!(f, "'('"),
            TokenKind::RParen => write!(f, "')'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::Keyword(k) => write!(f, "keyword '{k}'"),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

// Manually define PResult for resilience against winnow version changes
type PResult<T> = Result<T, ErrMode<ContextError>>;

pub(crate) fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | ':' | '.' | '-')
}

/// Lex an identifier or keyword.
/// Allowed: letters, digits, underscore, colon, dot and hyphen; must start with a letter or underscore.
fn lex_word(input: &mut &str) -> PResult<TokenKind> {
    let word = (one_of(is_ident_start), take_while(0.., is_ident_char))
        .take()
        .parse_next(input)?;

    Ok(match Keyword::from_word(word) {
        Some(keyword) => TokenKind::Keyword(keyword),
        None => TokenKind::Ident(word.to_string()),
    })
}

/// Lex a `YYYY-MM-DD` date literal.
fn lex_date(input: &mut &str) -> PResult<TokenKind> {
    let text = (
        take_while(4, |c: char| c.is_ascii_digit()),
        '-',
        take_while(2, |c: char| c.is_ascii_digit()),
        '-',
        take_while(2, |c: char| c.is_ascii_digit()),
    )
        .take()
        .parse_next(input)?;
    not(one_of(is_ident_char)).parse_next(input)?;
    Ok(TokenKind::Date(text.to_string()))
}

/// Lex a number (integer or decimal). Must not run into identifier characters.
fn lex_number(input: &mut &str) -> PResult<TokenKind> {
    let text = (digit1, opt(('.', digit1))).take().parse_next(input)?;
    not(one_of(is_ident_char)).parse_next(input)?;
    Ok(TokenKind::Number(text.to_string()))
}

/// Lex a single- or double-quoted string.
fn lex_string(input: &mut &str) -> PResult<TokenKind> {
    let quote = one_of(['"', '\'']).parse_next(input)?;
    let rest: &str = *input;
    let mut value = String::new();
    let mut chars = rest.char_indices();

    while let Some((idx, c)) = chars.next() {
        if c == quote {
            *input = &rest[idx + c.len_utf8()..];
            return Ok(TokenKind::Str(value));
        }
        if c == '\\' {
            match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, escaped)) => value.push(escaped),
                None => break,
            }
        } else {
            value.push(c);
        }
    }

    Err(ErrMode::Cut(ContextError::new()))
}

fn lex_operator(input: &mut &str) -> PResult<TokenKind> {
    alt((
        // Multi-char operators first
        "!=".value(TokenKind::Ne),
        "!~".value(TokenKind::NotMatch),
        "<=".value(TokenKind::Le),
        ">=".value(TokenKind::Ge),
        // Single-char operators
        "=".value(TokenKind::Eq),
        "~".value(TokenKind::Match),
        "<".value(TokenKind::Lt),
        ">".value(TokenKind::Gt),
        "!".value(TokenKind::Not),
        "-".value(TokenKind::Minus),
    ))
    .parse_next(input)
}

fn lex_punctuation(input: &mut &str) -> PResult<TokenKind> {
    alt((
        "(".value(TokenKind::LParen),
        ")".value(TokenKind::RParen),
        ",".value(TokenKind::Comma),
    ))
    .parse_next(input)
}

/// Lex a single token. Leading whitespace has already been consumed.
fn lex_token(input: &mut &str) -> PResult<TokenKind> {
    alt((
        lex_operator,
        lex_punctuation,
        lex_string,
        // Dates before numbers, both start with digits
        lex_date,
        lex_number,
        lex_word,
    ))
    .parse_next(input)
}

fn describe_failure(rest: &str) -> String {
    match rest.chars().next() {
        Some('"' | '\'') => "unterminated string literal".to_string(),
        Some(c) if c.is_ascii_digit() => {
            let literal: String = rest
                .chars()
                .take_while(|&c| is_ident_char(c))
                .collect();
            format!("invalid numeric literal '{literal}'")
        }
        Some(c) => format!("unrecognized character '{c}'"),
        None => "unexpected end of input".to_string(),
    }
}

/// Tokenize the entire input.
pub fn tokenize(input: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut remaining = input;
    let mut tokens = Vec::new();

    loop {
        // multispace0 cannot fail on &str
        let _ = multispace0::<_, ContextError>.parse_next(&mut remaining);
        let pos = input.len() - remaining.len();
        if remaining.is_empty() {
            tokens.push(Token {
                kind: TokenKind::Eof,
                pos,
            });
            return Ok(tokens);
        }

        let start = remaining;
        match lex_token(&mut remaining) {
            Ok(kind) => tokens.push(Token { kind, pos }),
            Err(_) => {
                return Err(SyntaxError {
                    position: pos,
                    message: describe_failure(start),
                });
            }
        }
    }
}
