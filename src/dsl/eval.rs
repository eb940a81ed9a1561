//! Evaluator for the filter DSL AST.
//!
//! Evaluation is total: absent keys and malformed values make a condition
//! false (or true for its negated form), never an error.

use super::ast::{CompareOp, DateDirection, DateTarget, FilterAst};
use super::date::{PartialDatePolicy, TagDate};
use crate::record::ElementRecord;
use time::Date;

/// Per-evaluation inputs besides the record itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalContext {
    /// "today" for relative date comparisons; never read from a clock here.
    pub reference_date: Date,
    pub partial_date_policy: PartialDatePolicy,
}

impl EvalContext {
    pub fn new(reference_date: Date) -> Self {
        Self {
            reference_date,
            partial_date_policy: PartialDatePolicy::default(),
        }
    }
}

/// Evaluate a filter AST against one element record.
pub fn evaluate_filter(ast: &FilterAst, record: &ElementRecord, ctx: &EvalContext) -> bool {
    let tags = &record.tags;
    match ast {
        FilterAst::True => true,

        FilterAst::TagExists { key, negated } => tags.contains_key(key) != *negated,

        FilterAst::KeyMatches { pattern, negated } => {
            tags.keys().any(|key| pattern.is_match(key)) != *negated
        }

        FilterAst::TagCompare { key, op, value } => match (tags.get(key), op) {
            (Some(actual), CompareOp::Ne) => actual != value,
            (Some(actual), _) => actual == value,
            // An absent tag differs from every value
            (None, op) => *op == CompareOp::Ne,
        },

        FilterAst::TagMatchesPattern {
            key,
            pattern,
            negated,
        } => match tags.get(key) {
            None => *negated,
            Some(actual) => pattern.is_match(actual) != *negated,
        },

        FilterAst::TagIn {
            key,
            values,
            negated,
        } => match tags.get(key) {
            None => *negated,
            Some(actual) => values.iter().any(|v| v == actual) != *negated,
        },

        FilterAst::NumericCompare { key, op, value } => {
            match tags.get(key).and_then(parse_numeric) {
                None => false,
                Some(actual) => compare(*op, actual, *value),
            }
        }

        FilterAst::DateCompare {
            target,
            direction,
            anchor,
        } => {
            let Some(date) = effective_date(target, *direction, record, ctx) else {
                return false;
            };
            let threshold = anchor.resolve(ctx.reference_date);
            match direction {
                DateDirection::Older => date < threshold,
                DateDirection::Newer => date > threshold,
            }
        }

        FilterAst::And(exprs) => exprs.iter().all(|e| evaluate_filter(e, record, ctx)),

        FilterAst::Or(exprs) => exprs.iter().any(|e| evaluate_filter(e, record, ctx)),

        FilterAst::Not(inner) => !evaluate_filter(inner, record, ctx),
    }
}

/// The most recent date known for a date comparison target.
///
/// For a tag: its own value (when it is a date), any of its check-date
/// companions, and the element's edit date when the tag or a companion is
/// present at all. For the element: its edit date.
fn effective_date(
    target: &DateTarget,
    direction: DateDirection,
    record: &ElementRecord,
    ctx: &EvalContext,
) -> Option<Date> {
    match target {
        DateTarget::Element => record.edited,
        DateTarget::Tag(keys) => {
            let mut present = keys
                .candidates()
                .filter_map(|key| record.tags.get(key))
                .peekable();
            present.peek()?;

            present
                .filter_map(TagDate::parse)
                .map(|date| ctx.partial_date_policy.resolve(date, direction))
                .chain(record.edited)
                .max()
        }
    }
}

/// Parse a numeric value from a string.
/// Handles common OSM patterns like "50 mph", "30", "5.5".
fn parse_numeric(s: &str) -> Option<f64> {
    // Try direct parse first
    if let Ok(n) = s.trim().parse::<f64>() {
        return n.is_finite().then_some(n);
    }

    // Try to extract leading number (e.g., "50 mph" -> 50)
    let numeric_part: String = s
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    numeric_part.parse::<f64>().ok()
}

/// Apply a comparison operator.
fn compare(op: CompareOp, left: f64, right: f64) -> bool {
    match op {
        CompareOp::Eq => (left - right).abs() < f64::EPSILON,
        CompareOp::Ne => (left - right).abs() >= f64::EPSILON,
        CompareOp::Lt => left < right,
        CompareOp::Le => left <= right,
        CompareOp::Gt => left > right,
        CompareOp::Ge => left >= right,
    }
}
