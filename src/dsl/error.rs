//! Compile-time errors for the filter DSL.
//!
//! Evaluation has no error type: malformed tag values simply fail to match.

/// Lexical error: unterminated literal, bad number, stray character.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("syntax error at offset {position}: {message}")]
pub struct SyntaxError {
    pub position: usize,
    pub message: String,
}

/// Structural error in an otherwise well-formed token stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("parse error at offset {position}: expected {expected}, found {found}")]
pub struct ParseError {
    pub position: usize,
    pub expected: String,
    pub found: String,
}

/// Any error raised while compiling a filter string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl CompileError {
    /// Byte offset into the filter source.
    pub fn position(&self) -> usize {
        match self {
            CompileError::Syntax(e) => e.position,
            CompileError::Parse(e) => e.position,
        }
    }

    /// 1-based line and column of the error in `source`.
    pub fn line_col(&self, source: &str) -> (usize, usize) {
        let prefix = source.get(..self.position()).unwrap_or(source);
        let line = prefix.matches('\n').count() + 1;
        let column = match prefix.rfind('\n') {
            Some(idx) => prefix[idx + 1..].chars().count() + 1,
            None => prefix.chars().count() + 1,
        };
        (line, column)
    }
}
