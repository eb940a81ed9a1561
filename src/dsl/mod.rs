//! Tag filter DSL for selecting OSM elements.
//!
//! Syntax:
//!   nodes, ways with <expr>     - element types, then the tag expression
//!   tag                         - tag exists
//!   !tag                        - tag doesn't exist
//!   tag = value                 - exact match (absent tag never matches)
//!   tag != value                - anything else, including an absent tag
//!   tag = val1, val2, val3      - match any value
//!   tag != val1, val2           - match none of the values
//!   tag ~ regex, tag !~ regex   - whole-value regex match
//!   ~regex, !~regex             - some key matches
//!   tag >= n, tag < n, ...      - numeric comparison
//!   tag older today -4 years    - tag (or its check date) is older
//!   tag newer 2020-01-01        - tag (or its check date) is newer
//!   older today -2 years        - element was last edited before
//!   expr1 and expr2             - AND
//!   expr1 or expr2              - OR (lower precedence than and)
//!   not expr, !(expr)           - NOT
//!   (expr)                      - grouping

mod ast;
mod date;
mod error;
mod eval;
mod lexer;
mod parser;

pub use ast::*;
pub use date::{DEFAULT_PARTIAL_DATE_POLICY, PartialDatePolicy, TagDate, date_before, parse_iso_date};
pub use error::{CompileError, ParseError, SyntaxError};
pub use eval::{EvalContext, evaluate_filter};
pub use lexer::{Keyword, Token, TokenKind, tokenize};
pub use parser::parse;

use std::fmt;
use std::str::FromStr;
use time::Date;

use crate::record::ElementRecord;

/// A filter compiled once and evaluated against any number of records.
///
/// Immutable after construction, so a single instance can be shared across
/// threads by reference.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    source: String,
    query: Query,
    partial_date_policy: PartialDatePolicy,
}

/// Compile a filter string.
pub fn compile(source: &str) -> Result<CompiledQuery, CompileError> {
    let tokens = tokenize(source)?;
    let query = parse(tokens)?;
    Ok(CompiledQuery {
        source: source.to_string(),
        query,
        partial_date_policy: DEFAULT_PARTIAL_DATE_POLICY,
    })
}

/// Evaluate a compiled query against a record for the given "today".
pub fn evaluate(query: &CompiledQuery, record: &ElementRecord, reference_date: Date) -> bool {
    query.matches(record, reference_date)
}

impl CompiledQuery {
    /// Element kind first; the tag expression is only evaluated for allowed kinds.
    pub fn matches(&self, record: &ElementRecord, reference_date: Date) -> bool {
        if !self.query.element_types.contains(record.kind) {
            return false;
        }
        let ctx = EvalContext {
            reference_date,
            partial_date_policy: self.partial_date_policy,
        };
        evaluate_filter(&self.query.filter, record, &ctx)
    }

    pub fn with_partial_date_policy(mut self, policy: PartialDatePolicy) -> Self {
        self.partial_date_policy = policy;
        self
    }

    pub fn partial_date_policy(&self) -> PartialDatePolicy {
        self.partial_date_policy
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn element_types(&self) -> ElementTypes {
        self.query.element_types
    }

    pub fn filter(&self) -> &FilterAst {
        &self.query.filter
    }

    pub fn query(&self) -> &Query {
        &self.query
    }
}

impl FromStr for CompiledQuery {
    type Err = CompileError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        compile(source)
    }
}

impl fmt::Display for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.query)
    }
}
