//! Regular expressions over sequences of annotated elements.
//!
//! `seqex` compiles a textual pattern into an immutable expression tree and
//! searches ordered sequences of *elements* (typically tokens carrying
//! annotations such as part-of-speech tags) for matching subsequences. The
//! alphabet is not characters: every atom of a pattern is a predicate over one
//! element, and the engine backtracks over those predicates the way a classic
//! regex engine backtracks over characters.
//!
//! # Example
//!
//! ```
//! use seqex::{compile, tokens_from_str};
//!
//! let tokens = tokens_from_str("the/DT quick/JJ brown/JJ fox/NN");
//! let pattern = compile(r#"(?$adj [tag:JJ]+) [tag:NN]"#).unwrap();
//!
//! let mut matcher = pattern.matcher(&tokens);
//! let m = matcher.find().unwrap().unwrap();
//! assert_eq!((m.start(), m.end()), (1, 4));
//! assert_eq!(m.var_group("adj").as_deref(), Some("quick brown"));
//! ```
//!
//! The concrete element type is the caller's: anything implementing
//! [`Element`] can be searched. [`Token`] is a small reference element used by
//! the CLI, the docs and the tests.

#[macro_use]
mod macros;
mod api;
mod engine;

pub use api::{FindType, MatchOptions, compile, compile_all, compile_with, tokens_from_str};
pub use engine::{
    Action, ActionFn, Anchor, AttrTest, Comparator, ComparatorChain, CompileError, CompiledPattern, Environment,
    Existence, FindIter, GroupId, MatchError, MatchResult, Matcher, MultiMetrics, MultiPatternMatcher, MultiRun,
    NodeFunction, NodePattern, NumOp, PatternBinding, PatternExpr, PredicateError, Ranked, SearchMetrics,
    StringMatchFlags, Stringifier, VarGroupBindings, Verdict, by_length, by_offset, by_order, by_score, default_order,
    join_text, select_non_overlapping,
};

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

// --- Elements ---------------------------------------------------------------

/// One item of a searched sequence.
///
/// The engine only needs two capabilities: a default textual rendering (used
/// by free-standing literals, backreferences and multi-element spans) and an
/// attribute lookup keyed by the caller's attribute names.
pub trait Element {
    /// Default textual rendering of the element.
    fn text(&self) -> Cow<'_, str>;

    /// Look up an attribute. `None` means the attribute does not exist;
    /// `Some(Value::Nil)` means it exists but holds no value.
    fn attribute(&self, key: &str) -> Option<Value<'_>>;
}

impl<T: Element + ?Sized> Element for &T {
    fn text(&self) -> Cow<'_, str> {
        (**self).text()
    }

    fn attribute(&self, key: &str) -> Option<Value<'_>> {
        (**self).attribute(key)
    }
}

/// An attribute value as seen by node predicates.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'a> {
    Nil,
    Bool(bool),
    Number(f64),
    Text(Cow<'a, str>),
}

impl Value<'_> {
    /// Textual form used by string equality and regex tests.
    ///
    /// Whole numbers print without a decimal point; `Nil` has no text.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::Nil => None,
            Value::Bool(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
            Value::Number(n) => Some(Cow::Owned(format_number(*n))),
            Value::Text(s) => Some(Cow::Borrowed(s.as_ref())),
        }
    }

    /// Numeric form used by relational tests. Text is parsed leniently
    /// (surrounding whitespace ignored).
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
            Value::Nil | Value::Bool(_) => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Detach the value from the element it was read from.
    pub fn into_owned(self) -> Value<'static> {
        match self {
            Value::Nil => Value::Nil,
            Value::Bool(b) => Value::Bool(b),
            Value::Number(n) => Value::Number(n),
            Value::Text(s) => Value::Text(Cow::Owned(s.into_owned())),
        }
    }
}

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(s) => f.write_str(&s),
            None => f.write_str("nil"),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 { format!("{}", n as i64) } else { format!("{}", n) }
}

/// Which attribute of an element a node test reads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttrKey {
    /// The element's own textual rendering ([`Element::text`]).
    Text,
    /// A caller-defined attribute key.
    Named(String),
}

impl AttrKey {
    pub fn named(key: impl Into<String>) -> Self {
        AttrKey::Named(key.into())
    }

    pub fn lookup<'e>(&self, element: &'e dyn Element) -> Option<Value<'e>> {
        match self {
            AttrKey::Text => Some(Value::Text(element.text())),
            AttrKey::Named(key) => element.attribute(key),
        }
    }
}

impl fmt::Display for AttrKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrKey::Text => f.write_str("<text>"),
            AttrKey::Named(key) => f.write_str(key),
        }
    }
}

/// Half-open element span `[start, end)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    /// Start element index (inclusive).
    pub start: usize,
    /// End element index (exclusive).
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True when `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// True when the two spans share at least one element.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

// --- Reference element ------------------------------------------------------

/// A plain token: its text plus string-valued attributes.
///
/// The attribute `word` falls back to the token text when it was not set
/// explicitly, so patterns may use either `"fox"` or `[word:fox]`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Token {
    text: String,
    attributes: BTreeMap<String, String>,
}

impl Token {
    pub fn new(text: impl Into<String>) -> Self {
        Token { text: text.into(), attributes: BTreeMap::new() }
    }

    /// Builder-style attribute setter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Element for Token {
    fn text(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.text)
    }

    fn attribute(&self, key: &str) -> Option<Value<'_>> {
        match self.attributes.get(key) {
            Some(v) => Some(Value::Text(Cow::Borrowed(v))),
            None if key == "word" => Some(Value::Text(Cow::Borrowed(&self.text))),
            None => None,
        }
    }
}
