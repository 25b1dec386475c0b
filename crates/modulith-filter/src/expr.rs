//! LDAP-style filter expressions.
//!
//! A filter is a boolean predicate over a [`Properties`] map, written in the
//! classic LDAP prefix syntax:
//!
//! ```text
//! filter  ::= '(' item ')'
//! item    ::= '&' filter+  |  '|' filter+  |  '!' filter  |  simple
//! simple  ::= attr op value        op ∈ { '=', '<=', '>=', '~=' }
//! ```
//!
//! Values under `=` may contain `*` wildcards for substring matching;
//! `\` escapes a literal `(`, `)`, `*`, or `\`.  Whitespace between tokens
//! is insignificant.
//!
//! Parsed filters are immutable operator trees behind an [`Arc`]: cloning is
//! cheap and a single parsed tree is freely shared between listener entries.
//!
//! Besides evaluation, a filter can classify itself as *simple* via
//! [`Filter::is_simple`]: provably reducible to a set of literal equality
//! tests on indexed keys.  The listener registry uses this to route events
//! through a value-keyed cache instead of scanning every listener.
//!
//! # Example
//!
//! ```rust
//! use modulith_filter::{Filter, Properties};
//!
//! let filter = Filter::parse("(&(objectclass=Foo)(service.ranking>=5))").unwrap();
//!
//! let props: Properties = [("objectclass", "Foo"), ("service.ranking", "7")]
//!     .into_iter()
//!     .collect();
//! assert!(filter.evaluate(&props, false));
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{FilterError, Result};
use crate::properties::Properties;
use crate::value::{CompareOp, Value};

/// Per-keyword literal values collected by [`Filter::is_simple`].
///
/// `cache[i]` holds every literal tested against `keywords[i]`.  The
/// contents are meaningful only when `is_simple` returned `true`.
pub type SimpleCache = Vec<Vec<String>>;

/// An immutable, shareable, parsed filter expression.
#[derive(Debug, Clone)]
pub struct Filter {
    node: Arc<Node>,
}

#[derive(Debug)]
enum Node {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Filter),
    Compare {
        attr: String,
        op: CompareOp,
        operand: Operand,
    },
}

#[derive(Debug, Clone)]
enum Operand {
    /// A wildcard-free value.
    Literal(String),
    /// A substring pattern: literal chunks separated by wildcards.
    /// Only ever produced under the `=` operator.
    Pattern(Vec<Segment>),
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    /// `*` -- matches any run of characters, including none.
    Any,
    /// A literal chunk that must appear verbatim.
    Literal(String),
}

impl Filter {
    /// Parse a filter string.
    pub fn parse(input: &str) -> Result<Self> {
        if input.trim().is_empty() {
            return Err(FilterError::Empty);
        }

        let mut parser = Parser::new(input);
        let filter = parser.parse_filter()?;

        if parser.pos < parser.chars.len() {
            return Err(FilterError::TrailingCharacters {
                remainder: parser.remainder(),
            });
        }

        tracing::trace!(filter = %filter, "filter parsed");
        Ok(filter)
    }

    /// Evaluate this filter against a property map.
    ///
    /// With `match_case = false` (the usual mode) attribute lookup is
    /// case-insensitive and string values compare case-insensitively; with
    /// `match_case = true` both are exact.
    pub fn evaluate(&self, props: &Properties, match_case: bool) -> bool {
        match &*self.node {
            Node::And(children) => children.iter().all(|c| c.evaluate(props, match_case)),
            Node::Or(children) => children.iter().any(|c| c.evaluate(props, match_case)),
            Node::Not(child) => !child.evaluate(props, match_case),
            Node::Compare { attr, op, operand } => {
                let value = if match_case {
                    props.get_case_sensitive(attr)
                } else {
                    props.get(attr)
                };
                let Some(value) = value else {
                    return false;
                };
                match operand {
                    Operand::Literal(lit) => value.compare(*op, lit, !match_case),
                    Operand::Pattern(segments) => {
                        value_matches_pattern(value, segments, !match_case)
                    }
                }
            }
        }
    }

    /// Classify this filter as *simple* over the given keywords.
    ///
    /// Returns `true` exactly when the filter is a single wildcard-free
    /// `(attr=value)` test on one of `keywords`, or an `|` of only such
    /// tests.  On success, `cache[i]` is populated with every literal value
    /// tested against `keywords[i]`.  On failure the cache contents are
    /// unspecified.
    ///
    /// This criterion is what permits cache-indexed listener matching; a
    /// looser classification would cause missed event delivery, so it must
    /// not be relaxed.
    pub fn is_simple(&self, keywords: &[&str], cache: &mut SimpleCache, match_case: bool) -> bool {
        cache.clear();
        cache.resize(keywords.len(), Vec::new());
        self.is_simple_inner(keywords, cache, match_case)
    }

    fn is_simple_inner(
        &self,
        keywords: &[&str],
        cache: &mut SimpleCache,
        match_case: bool,
    ) -> bool {
        match &*self.node {
            Node::Compare {
                attr,
                op: CompareOp::Eq,
                operand: Operand::Literal(lit),
            } => {
                let index = keywords.iter().position(|k| {
                    if match_case {
                        *k == attr
                    } else {
                        k.eq_ignore_ascii_case(attr)
                    }
                });
                match index {
                    Some(i) => {
                        cache[i].push(lit.clone());
                        true
                    }
                    None => false,
                }
            }
            Node::Or(children) => children
                .iter()
                .all(|c| c.is_simple_inner(keywords, cache, match_case)),
            _ => false,
        }
    }

    fn new(node: Node) -> Self {
        Self {
            node: Arc::new(node),
        }
    }
}

fn value_matches_pattern(value: &Value, segments: &[Segment], fold_case: bool) -> bool {
    match value {
        Value::Str(s) => pattern_match(segments, s, fold_case),
        Value::List(items) => items
            .iter()
            .any(|v| value_matches_pattern(v, segments, fold_case)),
        // Wildcard patterns never match non-string values.
        _ => false,
    }
}

/// Match a wildcard-segmented pattern against a string.
fn pattern_match(segments: &[Segment], s: &str, fold_case: bool) -> bool {
    let folded;
    let target: &str = if fold_case {
        folded = s.to_ascii_lowercase();
        &folded
    } else {
        s
    };
    let fold = |lit: &str| {
        if fold_case {
            lit.to_ascii_lowercase()
        } else {
            lit.to_owned()
        }
    };

    let count = segments.len();
    let mut pos = 0usize;

    for (i, segment) in segments.iter().enumerate() {
        match segment {
            Segment::Any => {
                if i == count - 1 {
                    return true;
                }
            }
            Segment::Literal(l) => {
                let lit = fold(l);
                if i == 0 {
                    // Leading literal must be a prefix.
                    if !target[pos..].starts_with(&lit) {
                        return false;
                    }
                    pos += lit.len();
                } else if i == count - 1 {
                    // Trailing literal must be a suffix lying beyond `pos`.
                    return target.len() >= pos + lit.len() && target.ends_with(&lit);
                } else {
                    // Interior literal: first occurrence after `pos`.
                    match target[pos..].find(&lit) {
                        Some(idx) => pos += idx + lit.len(),
                        None => return false,
                    }
                }
            }
        }
    }

    pos == target.len()
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Result<char> {
        self.chars
            .get(self.pos)
            .copied()
            .ok_or(FilterError::UnexpectedEnd)
    }

    fn remainder(&self) -> String {
        self.chars[self.pos..].iter().collect()
    }

    fn skip_whitespace(&mut self) {
        while self
            .chars
            .get(self.pos)
            .is_some_and(|c| c.is_whitespace())
        {
            self.pos += 1;
        }
    }

    fn syntax(&self, reason: impl Into<String>) -> FilterError {
        FilterError::Syntax {
            pos: self.pos,
            reason: reason.into(),
        }
    }

    fn parse_filter(&mut self) -> Result<Filter> {
        self.skip_whitespace();
        if self.peek()? != '(' {
            return Err(self.syntax("missing `(`"));
        }
        self.pos += 1;

        let filter = self.parse_filter_comp()?;

        self.skip_whitespace();
        if self.peek()? != ')' {
            return Err(self.syntax("missing `)`"));
        }
        self.pos += 1;
        self.skip_whitespace();

        Ok(filter)
    }

    fn parse_filter_comp(&mut self) -> Result<Filter> {
        self.skip_whitespace();
        match self.peek()? {
            '&' => {
                self.pos += 1;
                let operands = self.parse_filter_list()?;
                Ok(Filter::new(Node::And(operands)))
            }
            '|' => {
                self.pos += 1;
                let operands = self.parse_filter_list()?;
                Ok(Filter::new(Node::Or(operands)))
            }
            '!' => {
                self.pos += 1;
                self.skip_whitespace();
                if self.peek()? != '(' {
                    return Err(self.syntax("missing `(`"));
                }
                let child = self.parse_filter()?;
                Ok(Filter::new(Node::Not(child)))
            }
            _ => self.parse_item(),
        }
    }

    /// One or more parenthesized sub-filters, for `&` and `|`.
    fn parse_filter_list(&mut self) -> Result<Vec<Filter>> {
        self.skip_whitespace();
        if self.peek()? != '(' {
            return Err(self.syntax("missing `(`"));
        }

        let mut operands = Vec::new();
        while self.peek()? == '(' {
            operands.push(self.parse_filter()?);
        }
        Ok(operands)
    }

    fn parse_item(&mut self) -> Result<Filter> {
        let attr = self.parse_attr()?;
        self.skip_whitespace();

        match self.peek()? {
            '~' => {
                self.expect_equals()?;
                let operand = Operand::Literal(self.parse_value()?);
                Ok(Filter::new(Node::Compare {
                    attr,
                    op: CompareOp::Approx,
                    operand,
                }))
            }
            '>' => {
                self.expect_equals()?;
                let operand = Operand::Literal(self.parse_value()?);
                Ok(Filter::new(Node::Compare {
                    attr,
                    op: CompareOp::Ge,
                    operand,
                }))
            }
            '<' => {
                self.expect_equals()?;
                let operand = Operand::Literal(self.parse_value()?);
                Ok(Filter::new(Node::Compare {
                    attr,
                    op: CompareOp::Le,
                    operand,
                }))
            }
            '=' => {
                self.pos += 1;
                let operand = self.parse_substring()?;
                Ok(Filter::new(Node::Compare {
                    attr,
                    op: CompareOp::Eq,
                    operand,
                }))
            }
            _ => Err(self.syntax("invalid operator")),
        }
    }

    /// Consume the two-character operators `~=`, `>=`, `<=`.
    fn expect_equals(&mut self) -> Result<()> {
        self.pos += 1;
        if self.peek()? != '=' {
            return Err(self.syntax("invalid operator"));
        }
        self.pos += 1;
        Ok(())
    }

    fn parse_attr(&mut self) -> Result<String> {
        self.skip_whitespace();

        let begin = self.pos;
        let mut end = self.pos;

        let mut c = self.peek()?;
        while !matches!(c, '~' | '<' | '>' | '=' | '(' | ')') {
            self.pos += 1;
            if !c.is_whitespace() {
                end = self.pos;
            }
            c = self.peek()?;
        }

        if end == begin {
            return Err(self.syntax("missing attribute"));
        }
        Ok(self.chars[begin..end].iter().collect())
    }

    /// Value for `~=`, `>=`, `<=`: no wildcard handling, `*` is literal.
    fn parse_value(&mut self) -> Result<String> {
        let mut out = String::new();
        loop {
            match self.peek()? {
                ')' => break,
                '(' => return Err(self.syntax("invalid value")),
                '\\' => {
                    self.pos += 1;
                    out.push(self.peek()?);
                    self.pos += 1;
                }
                c => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
        if out.is_empty() {
            return Err(self.syntax("missing value"));
        }
        Ok(out)
    }

    /// Value for `=`: unescaped `*` splits the value into a substring
    /// pattern.  Consecutive wildcards collapse into one.
    fn parse_substring(&mut self) -> Result<Operand> {
        let mut chunk = String::new();
        let mut segments: Vec<Segment> = Vec::new();

        loop {
            match self.peek()? {
                ')' => {
                    if !chunk.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut chunk)));
                    }
                    break;
                }
                '(' => return Err(self.syntax("invalid value")),
                '*' => {
                    if !chunk.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut chunk)));
                    }
                    if segments.last() != Some(&Segment::Any) {
                        segments.push(Segment::Any);
                    }
                    self.pos += 1;
                }
                '\\' => {
                    self.pos += 1;
                    chunk.push(self.peek()?);
                    self.pos += 1;
                }
                c => {
                    chunk.push(c);
                    self.pos += 1;
                }
            }
        }

        match segments.as_slice() {
            [] => Err(self.syntax("missing value")),
            [Segment::Literal(lit)] => Ok(Operand::Literal(lit.clone())),
            _ => Ok(Operand::Pattern(segments)),
        }
    }
}

// ---------------------------------------------------------------------------
// Normalized form
// ---------------------------------------------------------------------------

/// Escape `\`, `(`, `)`, and `*` so the literal re-parses verbatim.
fn escape_literal(out: &mut String, literal: &str) {
    for c in literal.chars() {
        if matches!(c, '\\' | '(' | ')' | '*') {
            out.push('\\');
        }
        out.push(c);
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.write_normalized(&mut out);
        f.write_str(&out)
    }
}

impl Filter {
    fn write_normalized(&self, out: &mut String) {
        out.push('(');
        match &*self.node {
            Node::And(children) => {
                out.push('&');
                for child in children {
                    child.write_normalized(out);
                }
            }
            Node::Or(children) => {
                out.push('|');
                for child in children {
                    child.write_normalized(out);
                }
            }
            Node::Not(child) => {
                out.push('!');
                child.write_normalized(out);
            }
            Node::Compare { attr, op, operand } => {
                out.push_str(attr);
                out.push_str(match op {
                    CompareOp::Eq => "=",
                    CompareOp::Le => "<=",
                    CompareOp::Ge => ">=",
                    CompareOp::Approx => "~=",
                });
                match operand {
                    Operand::Literal(lit) => escape_literal(out, lit),
                    Operand::Pattern(segments) => {
                        for segment in segments {
                            match segment {
                                Segment::Any => out.push('*'),
                                Segment::Literal(lit) => escape_literal(out, lit),
                            }
                        }
                    }
                }
            }
        }
        out.push(')');
    }
}

impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node) || self.to_string() == other.to_string()
    }
}

impl Eq for Filter {}

impl Hash for Filter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_string().hash(state);
    }
}

impl FromStr for Filter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self> {
        Filter::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> Properties {
        pairs.iter().map(|&(k, v)| (k, v)).collect()
    }

    #[test]
    fn parse_simple_equality() {
        let f = Filter::parse("(objectclass=Foo)").expect("valid filter");
        assert!(f.evaluate(&props(&[("objectclass", "Foo")]), false));
        assert!(!f.evaluate(&props(&[("objectclass", "Bar")]), false));
        assert!(!f.evaluate(&Properties::new(), false));
    }

    #[test]
    fn parse_rejects_empty() {
        assert_eq!(Filter::parse(""), Err(FilterError::Empty));
        assert_eq!(Filter::parse("   "), Err(FilterError::Empty));
    }

    #[test]
    fn parse_rejects_trailing_garbage() {
        let err = Filter::parse("(a=1)garbage").unwrap_err();
        assert!(matches!(err, FilterError::TrailingCharacters { remainder } if remainder == "garbage"));
    }

    #[test]
    fn parse_rejects_abrupt_end() {
        assert_eq!(Filter::parse("(a=1"), Err(FilterError::UnexpectedEnd));
        assert_eq!(Filter::parse("(&(a=1)"), Err(FilterError::UnexpectedEnd));
    }

    #[test]
    fn parse_rejects_bad_operator_and_missing_pieces() {
        assert!(matches!(
            Filter::parse("(a!1)"),
            Err(FilterError::Syntax { .. })
        ));
        assert!(matches!(
            Filter::parse("(=1)"),
            Err(FilterError::Syntax { .. })
        ));
        assert!(matches!(
            Filter::parse("(a=)"),
            Err(FilterError::Syntax { .. })
        ));
        assert!(matches!(
            Filter::parse("(a>1)"),
            Err(FilterError::Syntax { .. })
        ));
    }

    #[test]
    fn and_short_circuits_and_or_matches_any() {
        let f = Filter::parse("(&(a=1)(b=2))").expect("valid");
        assert!(f.evaluate(&props(&[("a", "1"), ("b", "2")]), false));
        assert!(!f.evaluate(&props(&[("a", "1"), ("b", "3")]), false));

        let f = Filter::parse("(|(a=1)(a=2))").expect("valid");
        assert!(f.evaluate(&props(&[("a", "2")]), false));
        assert!(!f.evaluate(&props(&[("a", "3")]), false));
    }

    #[test]
    fn not_inverts() {
        let f = Filter::parse("(!(a=1))").expect("valid");
        assert!(!f.evaluate(&props(&[("a", "1")]), false));
        assert!(f.evaluate(&props(&[("a", "2")]), false));
        // An absent attribute fails the inner test, so the negation holds.
        assert!(f.evaluate(&Properties::new(), false));
    }

    #[test]
    fn wildcard_substring_matching() {
        let f = Filter::parse("(name=Fo*)").expect("valid");
        assert!(f.evaluate(&props(&[("name", "Foo")]), false));
        assert!(f.evaluate(&props(&[("name", "Fo")]), false));
        assert!(!f.evaluate(&props(&[("name", "Bar")]), false));

        let f = Filter::parse("(name=*Service)").expect("valid");
        assert!(f.evaluate(&props(&[("name", "RenderService")]), false));
        assert!(!f.evaluate(&props(&[("name", "ServiceRender")]), false));

        let f = Filter::parse("(name=a*b*c)").expect("valid");
        assert!(f.evaluate(&props(&[("name", "abc")]), false));
        assert!(f.evaluate(&props(&[("name", "a-x-b-y-c")]), false));
        assert!(!f.evaluate(&props(&[("name", "acb")]), false));

        // Star must not reuse characters consumed by the prefix.
        let f = Filter::parse("(name=a*a)").expect("valid");
        assert!(!f.evaluate(&props(&[("name", "a")]), false));
        assert!(f.evaluate(&props(&[("name", "aa")]), false));
    }

    #[test]
    fn lone_wildcard_matches_any_string_value() {
        let f = Filter::parse("(name=*)").expect("valid");
        assert!(f.evaluate(&props(&[("name", "anything")]), false));
        assert!(!f.evaluate(&Properties::new(), false));
    }

    #[test]
    fn escaped_characters_are_literal() {
        let f = Filter::parse(r"(name=a\*b)").expect("valid");
        assert!(f.evaluate(&props(&[("name", "a*b")]), false));
        assert!(!f.evaluate(&props(&[("name", "aXb")]), false));

        let f = Filter::parse(r"(path=C:\\dir)").expect("valid");
        assert!(f.evaluate(&props(&[("path", r"C:\dir")]), false));
    }

    #[test]
    fn relational_operators_use_numeric_compare_for_numbers() {
        let mut p = Properties::new();
        p.insert("service.ranking", 10);

        let f = Filter::parse("(service.ranking>=9)").expect("valid");
        assert!(f.evaluate(&p, false));
        let f = Filter::parse("(service.ranking<=9)").expect("valid");
        assert!(!f.evaluate(&p, false));
    }

    #[test]
    fn approx_operator() {
        let f = Filter::parse("(vendor~=Acme Corp)").expect("valid");
        assert!(f.evaluate(&props(&[("vendor", "acmecorp")]), false));
        assert!(f.evaluate(&props(&[("vendor", "ACME CORP")]), false));
        assert!(!f.evaluate(&props(&[("vendor", "acme inc")]), false));
    }

    #[test]
    fn case_sensitivity_flag_controls_keys_and_values() {
        let p = props(&[("Name", "Foo")]);

        let f = Filter::parse("(name=foo)").expect("valid");
        assert!(f.evaluate(&p, false));
        // match_case: exact key and exact value required.
        assert!(!f.evaluate(&p, true));

        let f = Filter::parse("(Name=Foo)").expect("valid");
        assert!(f.evaluate(&p, true));
    }

    #[test]
    fn whitespace_between_tokens_is_insignificant() {
        let f = Filter::parse("  ( &  (a =1) ( b=2) )  ").expect("valid");
        assert!(f.evaluate(&props(&[("a", "1"), ("b", "2")]), false));
    }

    #[test]
    fn display_round_trips_to_equal_tree() {
        for input in [
            "(objectclass=Foo)",
            "(&(objectclass=Foo)(service.id=3))",
            "(|(a=1)(b=2)(c=3))",
            "(!(x~=y))",
            "(name=Fo*)",
            "(name=*mid*)",
            r"(name=a\*b\\c)",
            "( & (a =1) (b= 2) )",
        ] {
            let parsed = Filter::parse(input).expect("valid input");
            let printed = parsed.to_string();
            let reparsed = Filter::parse(&printed).expect("normalized form re-parses");
            assert_eq!(parsed, reparsed, "round trip failed for {input}");
        }
    }

    #[test]
    fn simple_single_equality_on_keyword() {
        let f = Filter::parse("(objectclass=Foo)").expect("valid");
        let mut cache = SimpleCache::new();
        assert!(f.is_simple(&["objectclass", "service.id"], &mut cache, false));
        assert_eq!(cache[0], vec!["Foo".to_owned()]);
        assert!(cache[1].is_empty());
    }

    #[test]
    fn simple_or_of_keyword_tests() {
        let f = Filter::parse("(|(objectclass=Foo)(service.id=3))").expect("valid");
        let mut cache = SimpleCache::new();
        assert!(f.is_simple(&["objectclass", "service.id"], &mut cache, false));
        assert_eq!(cache[0], vec!["Foo".to_owned()]);
        assert_eq!(cache[1], vec!["3".to_owned()]);
    }

    #[test]
    fn and_is_never_simple() {
        let f = Filter::parse("(&(objectclass=Foo)(service.id=3))").expect("valid");
        let mut cache = SimpleCache::new();
        assert!(!f.is_simple(&["objectclass", "service.id"], &mut cache, false));
    }

    #[test]
    fn wildcard_breaks_simplicity() {
        let f = Filter::parse("(objectclass=Fo*)").expect("valid");
        let mut cache = SimpleCache::new();
        assert!(!f.is_simple(&["objectclass"], &mut cache, false));
    }

    #[test]
    fn non_keyword_attribute_is_not_simple() {
        let f = Filter::parse("(vendor=Acme)").expect("valid");
        let mut cache = SimpleCache::new();
        assert!(!f.is_simple(&["objectclass", "service.id"], &mut cache, false));

        let f = Filter::parse("(|(objectclass=Foo)(vendor=Acme))").expect("valid");
        assert!(!f.is_simple(&["objectclass", "service.id"], &mut cache, false));
    }

    #[test]
    fn list_valued_property_matches_any_element() {
        let mut p = Properties::new();
        p.insert("objectclass", vec!["Foo", "Bar"]);

        let f = Filter::parse("(objectclass=Bar)").expect("valid");
        assert!(f.evaluate(&p, false));
        let f = Filter::parse("(objectclass=B*)").expect("valid");
        assert!(f.evaluate(&p, false));
        let f = Filter::parse("(objectclass=Baz)").expect("valid");
        assert!(!f.evaluate(&p, false));
    }
}
