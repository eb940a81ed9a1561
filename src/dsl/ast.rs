//! AST types for the filter DSL.

use regex::Regex;
use std::fmt;
use time::Date;

use super::lexer::{Keyword, is_ident_char, is_ident_start};
use crate::record::ElementKind;

/// A parsed filter: element-type qualifier plus tag expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub element_types: ElementTypes,
    pub filter: FilterAst,
}

/// Set of element kinds a query applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElementTypes {
    pub nodes: bool,
    pub ways: bool,
    pub relations: bool,
}

impl ElementTypes {
    pub fn insert(&mut self, kind: ElementKind) {
        match kind {
            ElementKind::Node => self.nodes = true,
            ElementKind::Way => self.ways = true,
            ElementKind::Relation => self.relations = true,
        }
    }

    pub fn contains(&self, kind: ElementKind) -> bool {
        match kind {
            ElementKind::Node => self.nodes,
            ElementKind::Way => self.ways,
            ElementKind::Relation => self.relations,
        }
    }

    /// Map a plural element-type word (`nodes`, `ways`, `relations`).
    pub fn kind_from_word(word: &str) -> Option<ElementKind> {
        match word {
            "nodes" => Some(ElementKind::Node),
            "ways" => Some(ElementKind::Way),
            "relations" => Some(ElementKind::Relation),
            _ => None,
        }
    }
}

impl fmt::Display for ElementTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words: Vec<&str> = [
            (self.nodes, "nodes"),
            (self.ways, "ways"),
            (self.relations, "relations"),
        ]
        .into_iter()
        .filter_map(|(enabled, word)| enabled.then_some(word))
        .collect();
        f.write_str(&words.join(", "))
    }
}

/// Root filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterAst {
    /// Tag existence check: `name` or `!name`
    TagExists { key: String, negated: bool },

    /// Some key matches a regex: `~"name:.*"` or `!~"name:.*"`
    KeyMatches { pattern: ValuePattern, negated: bool },

    /// Single value comparison: `highway = bus_stop`, `bus != yes`
    TagCompare {
        key: String,
        op: CompareOp,
        value: String,
    },

    /// Value regex: `name ~ "Bus.*"`, `name !~ "Bus.*"`
    TagMatchesPattern {
        key: String,
        pattern: ValuePattern,
        negated: bool,
    },

    /// Membership: `bus = yes, designated` or `access != no, private`
    TagIn {
        key: String,
        values: Vec<String>,
        negated: bool,
    },

    /// Numeric comparison: `lanes >= 2`, `maxspeed < 50`
    NumericCompare {
        key: String,
        op: CompareOp,
        value: f64,
    },

    /// Date comparison: `survey:date older today -2 years`, `newer 2020-01-01`
    DateCompare {
        target: DateTarget,
        direction: DateDirection,
        anchor: DateAnchor,
    },

    /// Boolean AND: `expr1 and expr2`
    And(Vec<FilterAst>),

    /// Boolean OR: `expr1 or expr2`
    Or(Vec<FilterAst>),

    /// Boolean NOT: `not expr`, `!(expr)`
    Not(Box<FilterAst>),

    /// Always true (no `with` clause)
    True,
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq, // =
    Ne, // !=
    Lt, // <
    Le, // <=
    Gt, // >
    Ge, // >=
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "="),
            CompareOp::Ne => write!(f, "!="),
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Le => write!(f, "<="),
            CompareOp::Gt => write!(f, ">"),
            CompareOp::Ge => write!(f, ">="),
        }
    }
}

/// A regular expression that must match a whole key or value.
#[derive(Debug, Clone)]
pub struct ValuePattern {
    source: String,
    regex: Regex,
}

impl ValuePattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{source})$"))?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl PartialEq for ValuePattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// What a date comparison reads its date from.
#[derive(Debug, Clone, PartialEq)]
pub enum DateTarget {
    /// The element's own edit date.
    Element,
    /// A tag and its check-date companions.
    Tag(TagDateKeys),
}

/// Keys consulted for `key older|newer ...`, resolved once at compile time.
#[derive(Debug, Clone, PartialEq)]
pub struct TagDateKeys {
    pub key: String,
    pub check_date_keys: Vec<String>,
}

impl TagDateKeys {
    pub fn new(key: &str) -> Self {
        let check_date_keys = vec![
            format!("check_date:{key}"),
            format!("{key}:check_date"),
            format!("{key}:lastcheck"),
            format!("lastcheck:{key}"),
            format!("{key}:last_checked"),
            format!("last_checked:{key}"),
        ];
        Self {
            key: key.to_string(),
            check_date_keys,
        }
    }

    /// The key itself followed by its check-date keys.
    pub fn candidates(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.key.as_str()).chain(self.check_date_keys.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateDirection {
    Older,
    Newer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateUnit {
    Years,
    Months,
    Weeks,
    Days,
}

impl DateUnit {
    pub fn from_keyword(keyword: Keyword) -> Option<Self> {
        match keyword {
            Keyword::Years => Some(DateUnit::Years),
            Keyword::Months => Some(DateUnit::Months),
            Keyword::Weeks => Some(DateUnit::Weeks),
            Keyword::Days => Some(DateUnit::Days),
            _ => None,
        }
    }

    fn keyword(self) -> Keyword {
        match self {
            DateUnit::Years => Keyword::Years,
            DateUnit::Months => Keyword::Months,
            DateUnit::Weeks => Keyword::Weeks,
            DateUnit::Days => Keyword::Days,
        }
    }
}

/// The date a tag date is compared against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DateAnchor {
    /// `today -magnitude unit`; resolved against the reference date at evaluation.
    Relative { magnitude: f64, unit: DateUnit },
    /// A literal `YYYY-MM-DD`.
    Fixed(Date),
}

impl DateAnchor {
    pub fn resolve(&self, reference: Date) -> Date {
        match self {
            DateAnchor::Relative { magnitude, unit } => {
                super::date::date_before(reference, *magnitude, *unit)
            }
            DateAnchor::Fixed(date) => *date,
        }
    }
}

impl FilterAst {
    /// Simplify the AST by flattening nested And/Or.
    pub fn simplify(self) -> Self {
        match self {
            FilterAst::And(exprs) => {
                let mut flat = Vec::new();
                for expr in exprs {
                    match expr.simplify() {
                        FilterAst::And(inner) => flat.extend(inner),
                        FilterAst::True => {} // skip
                        other => flat.push(other),
                    }
                }
                collapse(flat, FilterAst::And)
            }
            FilterAst::Or(exprs) => {
                let mut flat = Vec::new();
                for expr in exprs {
                    match expr.simplify() {
                        FilterAst::Or(inner) => flat.extend(inner),
                        FilterAst::True => return FilterAst::True,
                        other => flat.push(other),
                    }
                }
                collapse(flat, FilterAst::Or)
            }
            FilterAst::Not(inner) => FilterAst::Not(Box::new(inner.simplify())),
            other => other,
        }
    }
}

fn collapse(mut flat: Vec<FilterAst>, wrap: fn(Vec<FilterAst>) -> FilterAst) -> FilterAst {
    match flat.len() {
        0 => FilterAst::True,
        1 => flat.pop().unwrap_or(FilterAst::True),
        _ => wrap(flat),
    }
}

/// Write a key or value bare if it would lex back as a single identifier,
/// number or date, quoted otherwise.
fn write_literal(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    if is_bare_literal(text) {
        f.write_str(text)
    } else {
        write!(f, "\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

fn is_bare_literal(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if is_ident_start(c) => {
            chars.all(is_ident_char)
                && Keyword::from_word(text).is_none()
                && ElementTypes::kind_from_word(text).is_none()
                && text != "with"
        }
        Some(c) if c.is_ascii_digit() => {
            let (int, frac) = text.split_once('.').unwrap_or((text, "0"));
            !int.is_empty()
                && !frac.is_empty()
                && int.bytes().all(|b| b.is_ascii_digit())
                && frac.bytes().all(|b| b.is_ascii_digit())
        }
        _ => false,
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, expr: &FilterAst) -> fmt::Result {
    match expr {
        FilterAst::And(_) | FilterAst::Or(_) => write!(f, "({expr})"),
        other => write!(f, "{other}"),
    }
}

impl fmt::Display for DateAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateAnchor::Relative {
                magnitude,
                unit: DateUnit::Days,
            } if *magnitude == 0.0 => write!(f, "today"),
            DateAnchor::Relative { magnitude, unit } => {
                write!(f, "today -{magnitude} {}", unit.keyword())
            }
            DateAnchor::Fixed(date) => write!(f, "{date}"),
        }
    }
}

impl fmt::Display for FilterAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterAst::TagExists { key, negated } => {
                if *negated {
                    f.write_str("!")?;
                }
                write_literal(f, key)
            }
            FilterAst::KeyMatches { pattern, negated } => {
                f.write_str(if *negated { "!~" } else { "~" })?;
                write_literal(f, pattern.as_str())
            }
            FilterAst::TagCompare { key, op, value } => {
                write_literal(f, key)?;
                write!(f, " {op} ")?;
                write_literal(f, value)
            }
            FilterAst::TagMatchesPattern {
                key,
                pattern,
                negated,
            } => {
                write_literal(f, key)?;
                f.write_str(if *negated { " !~ " } else { " ~ " })?;
                write_literal(f, pattern.as_str())
            }
            FilterAst::TagIn {
                key,
                values,
                negated,
            } => {
                write_literal(f, key)?;
                f.write_str(if *negated { " != " } else { " = " })?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_literal(f, value)?;
                }
                Ok(())
            }
            FilterAst::NumericCompare { key, op, value } => {
                write_literal(f, key)?;
                if *value < 0.0 {
                    write!(f, " {op} -{}", value.abs())
                } else {
                    write!(f, " {op} {value}")
                }
            }
            FilterAst::DateCompare {
                target,
                direction,
                anchor,
            } => {
                if let DateTarget::Tag(keys) = target {
                    write_literal(f, &keys.key)?;
                    f.write_str(" ")?;
                }
                let word = match direction {
                    DateDirection::Older => Keyword::Older,
                    DateDirection::Newer => Keyword::Newer,
                };
                write!(f, "{word} {anchor}")
            }
            FilterAst::And(exprs) => {
                for (i, expr) in exprs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" and ")?;
                    }
                    write_operand(f, expr)?;
                }
                Ok(())
            }
            FilterAst::Or(exprs) => {
                for (i, expr) in exprs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" or ")?;
                    }
                    write_operand(f, expr)?;
                }
                Ok(())
            }
            FilterAst::Not(inner) => {
                f.write_str("not ")?;
                match inner.as_ref() {
                    FilterAst::And(_) | FilterAst::Or(_) | FilterAst::True => {
                        write!(f, "({inner})")
                    }
                    other => write!(f, "{other}"),
                }
            }
            FilterAst::True => Ok(()),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.element_types)?;
        if self.filter != FilterAst::True {
            write!(f, " with {}", self.filter)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exists(key: &str) -> FilterAst {
        FilterAst::TagExists {
            key: key.into(),
            negated: false,
        }
    }

    #[test]
    fn test_simplify_flattens_nested() {
        let ast = FilterAst::And(vec![
            FilterAst::And(vec![exists("a"), exists("b")]),
            FilterAst::True,
            exists("c"),
        ]);
        assert_eq!(
            ast.simplify(),
            FilterAst::And(vec![exists("a"), exists("b"), exists("c")])
        );
    }

    #[test]
    fn test_simplify_or_with_true() {
        let ast = FilterAst::Or(vec![exists("a"), FilterAst::True]);
        assert_eq!(ast.simplify(), FilterAst::True);
        assert_eq!(FilterAst::And(vec![exists("a")]).simplify(), exists("a"));
    }

    #[test]
    fn test_display_quotes_when_needed() {
        let ast = FilterAst::TagIn {
            key: "name".into(),
            values: vec!["Main St".into(), "and".into(), "12".into(), "x\"y".into()],
            negated: false,
        };
        assert_eq!(ast.to_string(), r#"name = "Main St", "and", 12, "x\"y""#);
    }

    #[test]
    fn test_display_nested_groups() {
        let ast = FilterAst::And(vec![
            FilterAst::Or(vec![exists("a"), exists("b")]),
            FilterAst::Not(Box::new(FilterAst::And(vec![exists("c"), exists("d")]))),
        ]);
        assert_eq!(ast.to_string(), "(a or b) and not (c and d)");
    }

    #[test]
    fn test_display_date_compare() {
        let ast = FilterAst::DateCompare {
            target: DateTarget::Tag(TagDateKeys::new("tactile_paving")),
            direction: DateDirection::Older,
            anchor: DateAnchor::Relative {
                magnitude: 4.0,
                unit: DateUnit::Years,
            },
        };
        assert_eq!(ast.to_string(), "tactile_paving older today -4 years");

        let today = DateAnchor::Relative {
            magnitude: 0.0,
            unit: DateUnit::Days,
        };
        assert_eq!(today.to_string(), "today");
        let zero_years = DateAnchor::Relative {
            magnitude: 0.0,
            unit: DateUnit::Years,
        };
        assert_eq!(zero_years.to_string(), "today -0 years");
    }

    #[test]
    fn test_element_types() {
        let mut types = ElementTypes::default();
        types.insert(ElementKind::Way);
        types.insert(ElementKind::Node);
        assert!(types.contains(ElementKind::Node));
        assert!(!types.contains(ElementKind::Relation));
        assert_eq!(types.to_string(), "nodes, ways");
    }

    #[test]
    fn test_check_date_keys() {
        let keys = TagDateKeys::new("surface");
        let candidates: Vec<&str> = keys.candidates().collect();
        assert_eq!(candidates[0], "surface");
        assert!(candidates.contains(&"check_date:surface"));
        assert!(candidates.contains(&"surface:check_date"));
    }
}
