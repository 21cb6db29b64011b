//! Node patterns: predicates over a single element.
//!
//! A [`NodePattern`] is the alphabet of the engine. It is immutable once
//! built and side-effect free, so the matcher can evaluate it any number of
//! times while exploring alternatives.
//!
//! ```text
//! [tag:/NN.*/ & !word:"dog"]
//!   └─ Conjunction
//!        ├─ Attribute(tag, Matches(^(?:NN.*)$))
//!        └─ Negate(Attribute(word, Equals("dog")))
//! ```

use super::error::PredicateError;
use crate::{AttrKey, Element, Value};
use regex::{Regex, RegexBuilder};
use std::fmt;
use std::sync::Arc;

bitflags::bitflags! {
    /// Flags applied to string equality and regex tests at compile time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StringMatchFlags: u8 {
        const CASE_INSENSITIVE = 1 << 0;
    }
}

/// Outcome of testing one element.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Reject,
    Accept,
    /// Accepted, with an auxiliary value computed by a custom function. The
    /// value is kept in the [`MatchResult`](crate::MatchResult) when the
    /// element ends up on the accepted path.
    AcceptWith(Value<'static>),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        !matches!(self, Verdict::Reject)
    }

    fn from_bool(accepted: bool) -> Self {
        if accepted { Verdict::Accept } else { Verdict::Reject }
    }
}

/// Numeric relation of an attribute test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl NumOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "<" => Some(NumOp::Lt),
            "<=" => Some(NumOp::Le),
            ">" => Some(NumOp::Gt),
            ">=" => Some(NumOp::Ge),
            "==" => Some(NumOp::Eq),
            "!=" => Some(NumOp::Ne),
            _ => None,
        }
    }

    pub fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            NumOp::Lt => lhs < rhs,
            NumOp::Le => lhs <= rhs,
            NumOp::Gt => lhs > rhs,
            NumOp::Ge => lhs >= rhs,
            NumOp::Eq => lhs == rhs,
            NumOp::Ne => lhs != rhs,
        }
    }
}

/// The relation an attribute value must satisfy.
#[derive(Debug, Clone)]
pub enum AttrTest {
    /// String equality. When `case_insensitive` is set, `value` is stored
    /// lowercased.
    Equals { value: String, case_insensitive: bool },
    /// Whole-string regex match on the attribute's textual form.
    Matches(Regex),
    /// Numeric comparison `attribute <op> rhs`.
    Compare(NumOp, f64),
}

impl AttrTest {
    pub fn equals(value: impl Into<String>, flags: StringMatchFlags) -> Self {
        let value = value.into();
        if flags.contains(StringMatchFlags::CASE_INSENSITIVE) {
            AttrTest::Equals { value: value.to_lowercase(), case_insensitive: true }
        } else {
            AttrTest::Equals { value, case_insensitive: false }
        }
    }

    pub fn matches(source: &str, flags: StringMatchFlags) -> Result<Self, regex::Error> {
        Ok(AttrTest::Matches(anchored_regex(source, flags)?))
    }

    fn check(&self, value: Option<&Value<'_>>) -> bool {
        match self {
            AttrTest::Equals { value: expected, case_insensitive } => {
                match value.and_then(|v| v.as_text()) {
                    Some(text) if *case_insensitive => text.to_lowercase() == *expected,
                    Some(text) => text == expected.as_str(),
                    None => false,
                }
            }
            AttrTest::Matches(re) => value.and_then(|v| v.as_text()).is_some_and(|text| re.is_match(&text)),
            AttrTest::Compare(op, rhs) => value.and_then(|v| v.as_number()).is_some_and(|n| op.apply(n, *rhs)),
        }
    }
}

/// Compile `source` so that it must match a whole string.
pub(crate) fn anchored_regex(source: &str, flags: StringMatchFlags) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&format!("^(?:{source})$"))
        .case_insensitive(flags.contains(StringMatchFlags::CASE_INSENSITIVE))
        .build()
}

/// Presence checks (`key::EXISTS` and friends).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Existence {
    Exists,
    NotExists,
    /// Absent, or present with a `Nil` value.
    IsNil,
    /// Present with a non-`Nil` value.
    NotNil,
}

impl Existence {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "EXISTS" => Some(Existence::Exists),
            "NOT_EXISTS" => Some(Existence::NotExists),
            "IS_NIL" => Some(Existence::IsNil),
            "NOT_NIL" => Some(Existence::NotNil),
            _ => None,
        }
    }

    fn check(self, value: Option<&Value<'_>>) -> bool {
        match self {
            Existence::Exists => value.is_some(),
            Existence::NotExists => value.is_none(),
            Existence::IsNil => value.is_none_or(|v| v.is_nil()),
            Existence::NotNil => value.is_some_and(|v| !v.is_nil()),
        }
    }
}

type NodeFn = dyn Fn(&dyn Element) -> Result<Verdict, PredicateError> + Send + Sync;

/// A named, caller-supplied element predicate (bound as `#NAME`).
///
/// Functions must not mutate the element or shared state: they run during
/// speculative backtracking and may be called many times for one element.
#[derive(Clone)]
pub struct NodeFunction {
    name: String,
    func: Arc<NodeFn>,
}

impl NodeFunction {
    /// A function that may attach an auxiliary value or fail hard.
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&dyn Element) -> Result<Verdict, PredicateError> + Send + Sync + 'static,
    ) -> Self {
        NodeFunction { name: name.into(), func: Arc::new(func) }
    }

    /// A plain boolean predicate.
    pub fn predicate(name: impl Into<String>, func: impl Fn(&dyn Element) -> bool + Send + Sync + 'static) -> Self {
        Self::new(name, move |el| Ok(Verdict::from_bool(func(el))))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, element: &dyn Element) -> Result<Verdict, PredicateError> {
        (self.func)(element)
    }
}

impl fmt::Debug for NodeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeFunction").field("name", &self.name).field("func", &"<function>").finish()
    }
}

/// A predicate over one element.
#[derive(Debug, Clone)]
pub enum NodePattern {
    Any,
    Negate(Box<NodePattern>),
    /// All must match; stops at the first rejection.
    Conjunction(Vec<NodePattern>),
    /// Any may match; stops at the first acceptance.
    Disjunction(Vec<NodePattern>),
    Attribute {
        key: AttrKey,
        test: AttrTest,
    },
    Existence {
        key: AttrKey,
        check: Existence,
    },
    Custom(NodeFunction),
}

impl NodePattern {
    /// Text equality on the element's own rendering.
    pub fn text(value: impl Into<String>) -> Self {
        NodePattern::Attribute { key: AttrKey::Text, test: AttrTest::equals(value, StringMatchFlags::empty()) }
    }

    pub fn attr_eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        NodePattern::Attribute { key: AttrKey::named(key), test: AttrTest::equals(value, StringMatchFlags::empty()) }
    }

    pub fn attr_regex(key: impl Into<String>, source: &str) -> Result<Self, regex::Error> {
        let test = AttrTest::matches(source, StringMatchFlags::empty())?;
        Ok(NodePattern::Attribute { key: AttrKey::named(key), test })
    }

    pub fn attr_cmp(key: impl Into<String>, op: NumOp, rhs: f64) -> Self {
        NodePattern::Attribute { key: AttrKey::named(key), test: AttrTest::Compare(op, rhs) }
    }

    pub fn existence(key: impl Into<String>, check: Existence) -> Self {
        NodePattern::Existence { key: AttrKey::named(key), check }
    }

    pub fn custom(func: NodeFunction) -> Self {
        NodePattern::Custom(func)
    }

    pub fn negate(self) -> Self {
        NodePattern::Negate(Box::new(self))
    }

    pub fn test(&self, element: &dyn Element) -> Result<bool, PredicateError> {
        Ok(self.test_with_result(element)?.is_accept())
    }

    /// Like [`test`](Self::test), but keeps the auxiliary value a custom
    /// function attached. Conjunctions keep the first payload of their
    /// children; disjunctions return the verdict of the first accepting child.
    pub fn test_with_result(&self, element: &dyn Element) -> Result<Verdict, PredicateError> {
        match self {
            NodePattern::Any => Ok(Verdict::Accept),
            NodePattern::Negate(inner) => Ok(Verdict::from_bool(!inner.test(element)?)),
            NodePattern::Conjunction(parts) => {
                let mut payload = None;
                for part in parts {
                    match part.test_with_result(element)? {
                        Verdict::Reject => return Ok(Verdict::Reject),
                        Verdict::Accept => {}
                        Verdict::AcceptWith(value) => {
                            payload.get_or_insert(value);
                        }
                    }
                }
                Ok(payload.map_or(Verdict::Accept, Verdict::AcceptWith))
            }
            NodePattern::Disjunction(parts) => {
                for part in parts {
                    let verdict = part.test_with_result(element)?;
                    if verdict.is_accept() {
                        return Ok(verdict);
                    }
                }
                Ok(Verdict::Reject)
            }
            NodePattern::Attribute { key, test } => Ok(Verdict::from_bool(test.check(key.lookup(element).as_ref()))),
            NodePattern::Existence { key, check } => Ok(Verdict::from_bool(check.check(key.lookup(element).as_ref()))),
            NodePattern::Custom(func) => func.call(element),
        }
    }

    /// Literal element texts of which at least one must be present for this
    /// node to accept anything, if that set can be determined statically.
    pub(crate) fn literal_trigger(&self) -> Option<Vec<String>> {
        match self {
            NodePattern::Attribute {
                key: AttrKey::Text,
                test: AttrTest::Equals { value, case_insensitive: false },
            } => Some(vec![value.clone()]),
            NodePattern::Disjunction(parts) if !parts.is_empty() => {
                let mut words = Vec::new();
                for part in parts {
                    words.extend(part.literal_trigger()?);
                }
                Some(words)
            }
            NodePattern::Conjunction(parts) => parts.iter().find_map(|p| p.literal_trigger()),
            _ => None,
        }
    }
}
