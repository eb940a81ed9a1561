//! Parser for the filter DSL.
//!
//! Grammar (in rough EBNF):
//!
//! query         = element_types ("with" or_expr)?
//! element_types = KIND ("," KIND)*            KIND = nodes | ways | relations
//! or_expr       = and_expr ("or" and_expr)*
//! and_expr      = unary_expr ("and" unary_expr)*
//! unary_expr    = ("not" | "!") unary_expr | primary
//! primary       = "(" or_expr ")"
//!               | "!" key
//!               | ("~" | "!~") value
//!               | date_op date_anchor
//!               | tag_expr
//! tag_expr      = key
//!               | key ("=" | "!=") value ("," value)*
//!               | key ("~" | "!~") value
//!               | key ("<" | "<=" | ">" | ">=") "-"? NUMBER
//!               | key date_op date_anchor
//! date_op       = "older" | "newer"
//! date_anchor   = ("today" | "now") ("-" NUMBER unit)? | DATE
//! unit          = "years" | "months" | "weeks" | "days"
//! key           = IDENT | STRING
//! value         = IDENT | STRING | NUMBER | DATE
//!
//! `!` only starts a unary expression when followed by `(`, `!` or `not`;
//! otherwise `!key` is a negated existence test. There is no implicit `and`.

use super::ast::{
    CompareOp, DateAnchor, DateDirection, DateTarget, DateUnit, ElementTypes, FilterAst, Query,
    TagDateKeys, ValuePattern,
};
use super::date::parse_iso_date;
use super::error::ParseError;
use super::lexer::{Keyword, Token, TokenKind};

/// Parser state.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(mut tokens: Vec<Token>) -> Self {
        if !matches!(tokens.last().map(|t| &t.kind), Some(TokenKind::Eof)) {
            let pos = tokens.last().map_or(0, |t| t.pos);
            tokens.push(Token {
                kind: TokenKind::Eof,
                pos,
            });
        }
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_kind_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, expected: &str) -> ParseError {
        let tok = self.peek();
        ParseError {
            position: tok.pos,
            expected: expected.to_string(),
            found: tok.kind.to_string(),
        }
    }

    fn expect(&mut self, expected: TokenKind, label: &str) -> Result<(), ParseError> {
        if *self.peek_kind() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(label))
        }
    }

    fn at_keyword(&self, keyword: Keyword) -> bool {
        matches!(self.peek_kind(), TokenKind::Keyword(k) if *k == keyword)
    }

    /// Parse the whole query and require that all tokens are consumed.
    fn parse_query(&mut self) -> Result<Query, ParseError> {
        let element_types = self.parse_element_types()?;

        let filter = if matches!(self.peek_kind(), TokenKind::Ident(word) if word == "with") {
            self.advance(); // consume with
            self.parse_or_expr()?
        } else {
            if !matches!(self.peek_kind(), TokenKind::Eof) {
                return Err(self.error("',' or 'with'"));
            }
            FilterAst::True
        };

        if !matches!(self.peek_kind(), TokenKind::Eof) {
            return Err(self.error("'and', 'or' or end of input"));
        }

        Ok(Query {
            element_types,
            filter,
        })
    }

    /// Parse element types: KIND ("," KIND)*
    fn parse_element_types(&mut self) -> Result<ElementTypes, ParseError> {
        let mut types = ElementTypes::default();
        loop {
            let kind = match self.peek_kind() {
                TokenKind::Ident(word) => ElementTypes::kind_from_word(word),
                _ => None,
            };
            let Some(kind) = kind else {
                return Err(self.error("element type (nodes, ways or relations)"));
            };
            self.advance();
            types.insert(kind);

            if matches!(self.peek_kind(), TokenKind::Comma) {
                self.advance(); // consume ,
            } else {
                return Ok(types);
            }
        }
    }

    /// Parse OR expression: and_expr ("or" and_expr)*
    fn parse_or_expr(&mut self) -> Result<FilterAst, ParseError> {
        let mut operands = vec![self.parse_and_expr()?];

        while self.at_keyword(Keyword::Or) {
            self.advance(); // consume or
            operands.push(self.parse_and_expr()?);
        }

        Ok(FilterAst::Or(operands).simplify())
    }

    /// Parse AND expression: unary_expr ("and" unary_expr)*
    fn parse_and_expr(&mut self) -> Result<FilterAst, ParseError> {
        let mut operands = vec![self.parse_unary_expr()?];

        while self.at_keyword(Keyword::And) {
            self.advance(); // consume and
            operands.push(self.parse_unary_expr()?);
        }

        Ok(FilterAst::And(operands).simplify())
    }

    /// Parse unary expression: ("not" | "!") unary_expr | primary
    fn parse_unary_expr(&mut self) -> Result<FilterAst, ParseError> {
        let negates_expr = match self.peek_kind() {
            TokenKind::Keyword(Keyword::Not) => true,
            // `!tag` is an existence test, handled in parse_primary
            TokenKind::Not => matches!(
                self.peek_kind_at(1),
                TokenKind::LParen | TokenKind::Not | TokenKind::Keyword(Keyword::Not)
            ),
            _ => false,
        };

        if negates_expr {
            self.advance(); // consume not / !
            let inner = self.parse_unary_expr()?;
            Ok(FilterAst::Not(Box::new(inner)))
        } else {
            self.parse_primary()
        }
    }

    /// Parse primary expression.
    fn parse_primary(&mut self) -> Result<FilterAst, ParseError> {
        match self.peek_kind() {
            TokenKind::LParen => {
                self.advance(); // consume (
                let inner = self.parse_or_expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Not => {
                self.advance(); // consume !
                let key = self.parse_key("tag key or '(' after '!'")?;
                Ok(FilterAst::TagExists { key, negated: true })
            }
            TokenKind::Match | TokenKind::NotMatch => {
                let negated = matches!(self.advance().kind, TokenKind::NotMatch);
                let pattern = self.parse_pattern()?;
                Ok(FilterAst::KeyMatches { pattern, negated })
            }
            TokenKind::Keyword(Keyword::Older | Keyword::Newer) => {
                let direction = self.parse_date_direction();
                let anchor = self.parse_date_anchor()?;
                Ok(FilterAst::DateCompare {
                    target: DateTarget::Element,
                    direction,
                    anchor,
                })
            }
            TokenKind::Ident(_) | TokenKind::Str(_) => self.parse_tag_expr(),
            _ => Err(self.error("tag expression or '('")),
        }
    }

    /// Parse key: IDENT | STRING
    fn parse_key(&mut self, expected: &str) -> Result<String, ParseError> {
        let key = match self.peek_kind() {
            TokenKind::Ident(key) | TokenKind::Str(key) => key.clone(),
            _ => return Err(self.error(expected)),
        };
        self.advance();
        Ok(key)
    }

    /// Parse tag expression: key, optionally followed by an operator clause.
    fn parse_tag_expr(&mut self) -> Result<FilterAst, ParseError> {
        let key = self.parse_key("tag key")?;

        match self.peek_kind() {
            TokenKind::Eq | TokenKind::Ne => {
                let negated = matches!(self.advance().kind, TokenKind::Ne);
                let mut values = vec![self.parse_value()?];
                while matches!(self.peek_kind(), TokenKind::Comma) {
                    self.advance(); // consume ,
                    values.push(self.parse_value()?);
                }

                if values.len() == 1 {
                    let value = values.pop().unwrap_or_default();
                    let op = if negated { CompareOp::Ne } else { CompareOp::Eq };
                    Ok(FilterAst::TagCompare { key, op, value })
                } else {
                    Ok(FilterAst::TagIn {
                        key,
                        values,
                        negated,
                    })
                }
            }
            TokenKind::Match | TokenKind::NotMatch => {
                let negated = matches!(self.advance().kind, TokenKind::NotMatch);
                let pattern = self.parse_pattern()?;
                Ok(FilterAst::TagMatchesPattern {
                    key,
                    pattern,
                    negated,
                })
            }
            TokenKind::Lt | TokenKind::Le | TokenKind::Gt | TokenKind::Ge => {
                let op = match self.advance().kind {
                    TokenKind::Lt => CompareOp::Lt,
                    TokenKind::Le => CompareOp::Le,
                    TokenKind::Gt => CompareOp::Gt,
                    _ => CompareOp::Ge,
                };
                let negative = matches!(self.peek_kind(), TokenKind::Minus);
                if negative {
                    self.advance(); // consume -
                }
                let value = self.parse_number()?;
                Ok(FilterAst::NumericCompare {
                    key,
                    op,
                    value: if negative { -value } else { value },
                })
            }
            TokenKind::Keyword(Keyword::Older | Keyword::Newer) => {
                let direction = self.parse_date_direction();
                let anchor = self.parse_date_anchor()?;
                Ok(FilterAst::DateCompare {
                    target: DateTarget::Tag(TagDateKeys::new(&key)),
                    direction,
                    anchor,
                })
            }
            // Simple existence check
            _ => Ok(FilterAst::TagExists {
                key,
                negated: false,
            }),
        }
    }

    /// Parse a single value: IDENT | STRING | "-"? NUMBER | DATE
    fn parse_value(&mut self) -> Result<String, ParseError> {
        let negative = match (self.peek_kind(), self.peek_kind_at(1)) {
            (TokenKind::Minus, TokenKind::Number(digits)) => Some(format!("-{digits}")),
            _ => None,
        };
        if let Some(value) = negative {
            self.advance(); // consume -
            self.advance();
            return Ok(value);
        }
        let value = match self.peek_kind() {
            TokenKind::Ident(value)
            | TokenKind::Str(value)
            | TokenKind::Number(value)
            | TokenKind::Date(value) => value.clone(),
            _ => return Err(self.error("value")),
        };
        self.advance();
        Ok(value)
    }

    /// Parse a value and compile it as a whole-match regular expression.
    fn parse_pattern(&mut self) -> Result<ValuePattern, ParseError> {
        let position = self.peek().pos;
        let source = self.parse_value()?;
        ValuePattern::new(&source).map_err(|err| ParseError {
            position,
            expected: "valid regular expression".to_string(),
            found: format!("{source:?} ({err})"),
        })
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        let parsed = match self.peek_kind() {
            TokenKind::Number(text) => text.parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        };
        match parsed {
            Some(n) => {
                self.advance();
                Ok(n)
            }
            None => Err(self.error("number")),
        }
    }

    fn parse_date_direction(&mut self) -> DateDirection {
        match self.advance().kind {
            TokenKind::Keyword(Keyword::Newer) => DateDirection::Newer,
            _ => DateDirection::Older,
        }
    }

    /// Parse date anchor: ("today" | "now") ("-" NUMBER unit)? | DATE
    fn parse_date_anchor(&mut self) -> Result<DateAnchor, ParseError> {
        match self.peek_kind() {
            TokenKind::Keyword(Keyword::Today | Keyword::Now) => {
                self.advance(); // consume today / now
                if !matches!(self.peek_kind(), TokenKind::Minus) {
                    return Ok(DateAnchor::Relative {
                        magnitude: 0.0,
                        unit: DateUnit::Days,
                    });
                }
                self.advance(); // consume -
                let magnitude = self.parse_number()?;
                let unit = match self.peek_kind() {
                    TokenKind::Keyword(k) => DateUnit::from_keyword(*k),
                    _ => None,
                };
                let Some(unit) = unit else {
                    return Err(self.error("date unit (years, months, weeks or days)"));
                };
                self.advance(); // consume unit
                Ok(DateAnchor::Relative { magnitude, unit })
            }
            TokenKind::Date(text) => match parse_iso_date(text) {
                Some(date) => {
                    self.advance();
                    Ok(DateAnchor::Fixed(date))
                }
                None => Err(self.error("valid calendar date")),
            },
            _ => Err(self.error("'today', 'now' or a date (YYYY-MM-DD)")),
        }
    }
}

/// Parse a token stream into a query.
pub fn parse(tokens: Vec<Token>) -> Result<Query, ParseError> {
    let mut parser = Parser::new(tokens);
    parser.parse_query()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::tokenize;
    use time::macros::date;

    fn parse_str(input: &str) -> Result<Query, ParseError> {
        parse(tokenize(input).unwrap())
    }

    fn filter(input: &str) -> FilterAst {
        parse_str(input).unwrap().filter
    }

    fn exists(key: &str) -> FilterAst {
        FilterAst::TagExists {
            key: key.into(),
            negated: false,
        }
    }

    fn compare(key: &str, op: CompareOp, value: &str) -> FilterAst {
        FilterAst::TagCompare {
            key: key.into(),
            op,
            value: value.into(),
        }
    }

    #[test]
    fn test_element_types_only() {
        let query = parse_str("nodes, ways").unwrap();
        assert!(query.element_types.nodes);
        assert!(query.element_types.ways);
        assert!(!query.element_types.relations);
        assert_eq!(query.filter, FilterAst::True);
    }

    #[test]
    fn test_simple_existence() {
        assert_eq!(filter("nodes with name"), exists("name"));
    }

    #[test]
    fn test_negated_existence() {
        assert_eq!(
            filter("nodes with !tactile_paving"),
            FilterAst::TagExists {
                key: "tactile_paving".into(),
                negated: true
            }
        );
    }

    #[test]
    fn test_exact_match() {
        assert_eq!(
            filter("nodes with highway = bus_stop"),
            compare("highway", CompareOp::Eq, "bus_stop")
        );
        assert_eq!(
            filter("nodes with \"name\" != 'Main St'"),
            compare("name", CompareOp::Ne, "Main St")
        );
    }

    #[test]
    fn test_membership() {
        assert_eq!(
            filter("ways with highway = primary, secondary, 3"),
            FilterAst::TagIn {
                key: "highway".into(),
                values: vec!["primary".into(), "secondary".into(), "3".into()],
                negated: false,
            }
        );
        assert!(matches!(
            filter("ways with access != no, private"),
            FilterAst::TagIn { negated: true, .. }
        ));
    }

    #[test]
    fn test_hyphenated_and_negative_values() {
        assert_eq!(
            filter("nodes with shop = e-cigarette"),
            compare("shop", CompareOp::Eq, "e-cigarette")
        );
        assert_eq!(
            filter("ways with layer = -1"),
            compare("layer", CompareOp::Eq, "-1")
        );
        assert_eq!(
            filter("ways with layer != -1, 0"),
            FilterAst::TagIn {
                key: "layer".into(),
                values: vec!["-1".into(), "0".into()],
                negated: true,
            }
        );
    }

    #[test]
    fn test_regex_operators() {
        match filter("nodes with name ~ \"Bus.*\"") {
            FilterAst::TagMatchesPattern {
                key,
                pattern,
                negated,
            } => {
                assert_eq!(key, "name");
                assert_eq!(pattern.as_str(), "Bus.*");
                assert!(!negated);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            filter("nodes with !~\"name:.*\""),
            FilterAst::KeyMatches { negated: true, .. }
        ));
    }

    #[test]
    fn test_numeric_comparison() {
        assert_eq!(
            filter("ways with lanes >= 2"),
            FilterAst::NumericCompare {
                key: "lanes".into(),
                op: CompareOp::Ge,
                value: 2.0,
            }
        );
        assert_eq!(
            filter("ways with layer < -1"),
            FilterAst::NumericCompare {
                key: "layer".into(),
                op: CompareOp::Lt,
                value: -1.0,
            }
        );
    }

    #[test]
    fn test_relative_date() {
        assert_eq!(
            filter("nodes with tactile_paving older today -4 years"),
            FilterAst::DateCompare {
                target: DateTarget::Tag(TagDateKeys::new("tactile_paving")),
                direction: DateDirection::Older,
                anchor: DateAnchor::Relative {
                    magnitude: 4.0,
                    unit: DateUnit::Years,
                },
            }
        );
        assert_eq!(
            filter("nodes with newer now -0.5 months"),
            FilterAst::DateCompare {
                target: DateTarget::Element,
                direction: DateDirection::Newer,
                anchor: DateAnchor::Relative {
                    magnitude: 0.5,
                    unit: DateUnit::Months,
                },
            }
        );
    }

    #[test]
    fn test_fixed_date() {
        assert_eq!(
            filter("nodes with check_date older 2020-02-29"),
            FilterAst::DateCompare {
                target: DateTarget::Tag(TagDateKeys::new("check_date")),
                direction: DateDirection::Older,
                anchor: DateAnchor::Fixed(date!(2020 - 02 - 29)),
            }
        );
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        assert_eq!(
            filter("nodes with a or b and c"),
            FilterAst::Or(vec![
                exists("a"),
                FilterAst::And(vec![exists("b"), exists("c")]),
            ])
        );
        assert_eq!(
            filter("nodes with a and b or c"),
            FilterAst::Or(vec![
                FilterAst::And(vec![exists("a"), exists("b")]),
                exists("c"),
            ])
        );
    }

    #[test]
    fn test_grouping() {
        assert_eq!(
            filter("nodes with (a or b) and c"),
            FilterAst::And(vec![
                FilterAst::Or(vec![exists("a"), exists("b")]),
                exists("c"),
            ])
        );
    }

    #[test]
    fn test_not_forms() {
        let expected = FilterAst::Not(Box::new(compare("bus", CompareOp::Eq, "yes")));
        assert_eq!(filter("nodes with not bus = yes"), expected);
        assert_eq!(filter("nodes with !(bus = yes)"), expected);
        assert_eq!(
            filter("nodes with not not a"),
            FilterAst::Not(Box::new(FilterAst::Not(Box::new(exists("a")))))
        );
    }

    #[test]
    fn test_unbalanced_paren() {
        let err = parse_str("nodes with (highway = bus_stop").unwrap_err();
        assert_eq!(err.position, 30);
        assert_eq!(err.expected, "')'");
        assert_eq!(err.found, "end of input");
    }

    #[test]
    fn test_no_implicit_and() {
        let err = parse_str("nodes with highway = bus_stop\n  shelter = yes").unwrap_err();
        assert_eq!(err.position, 32);
        assert_eq!(err.found, "identifier 'shelter'");
    }

    #[test]
    fn test_missing_operands() {
        for input in [
            "nodes with",
            "nodes with a and",
            "nodes with a or ()",
            "nodes with highway =",
            "nodes with lanes > many",
            "nodes with a older",
            "nodes with a older today -4",
            "nodes with a older today -years",
        ] {
            assert!(parse_str(input).is_err(), "{input}");
        }
    }

    #[test]
    fn test_bad_element_types() {
        let err = parse_str("areas with a").unwrap_err();
        assert_eq!(err.position, 0);
        assert!(err.expected.starts_with("element type"));

        let err = parse_str("nodes ways with a").unwrap_err();
        assert_eq!(err.position, 6);
        assert_eq!(err.expected, "',' or 'with'");

        assert!(parse_str("with a").is_err());
    }

    #[test]
    fn test_invalid_regex() {
        let err = parse_str("nodes with name ~ \"(unclosed\"").unwrap_err();
        assert_eq!(err.position, 18);
        assert_eq!(err.expected, "valid regular expression");
    }

    #[test]
    fn test_invalid_fixed_date() {
        let err = parse_str("nodes with a older 2021-02-30").unwrap_err();
        assert_eq!(err.expected, "valid calendar date");
    }

    #[test]
    fn test_unknown_operator() {
        let err = parse_str("nodes with highway == bus_stop").unwrap_err();
        assert_eq!(err.expected, "value");
        assert_eq!(err.found, "'='");
    }
}
