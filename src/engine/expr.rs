//! Pattern expression tree and compiled patterns.
//!
//! The compiler (`compiler.rs`) produces a [`PatternExpr`] tree; the tree is
//! then lowered once into a flat instruction list (`program.rs`) that the
//! matcher executes. Both live inside an immutable [`CompiledPattern`] that can
//! be shared and reused for any number of searches.
//!
//! ## Group invariants
//!
//! - Capturing group ids are dense, `1..group_count`, assigned in pre-order
//!   (the order their opening parentheses appear).
//! - Group 0 is implicit: it is the whole match and has no tree node.
//! - [`VarGroupBindings`] maps names to ids; one name may alias several ids
//!   (in different alternatives).

use super::env::Action;
use super::error::CompileError;
use super::matcher::Matcher;
use super::node::NodePattern;
use super::program::Program;
use crate::Element;
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// Zero-width position assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// `^`: the start of the sequence.
    Start,
    /// `$`: the end of the sequence.
    End,
}

/// A node of the expression tree.
#[derive(Debug, Clone)]
pub enum PatternExpr {
    /// Exactly one element satisfying the predicate.
    Node(NodePattern),
    Sequence(Vec<PatternExpr>),
    /// Ordered alternation: earlier alternatives are preferred.
    Or(Vec<PatternExpr>),
    /// `max: None` is unbounded. `greedy: false` is the reluctant form.
    Repeat { child: Box<PatternExpr>, min: usize, max: Option<usize>, greedy: bool },
    /// `id: None` is a non-capturing group.
    Group { child: Box<PatternExpr>, id: Option<usize>, name: Option<String> },
    /// Elements equal (by text) to what group `id` captured.
    Backref(usize),
    /// `min..=max` elements whose rendered text matches `text` as a whole.
    MultiNode { min: usize, max: Option<usize>, text: Regex, greedy: bool },
    /// Run `action` on `group` once the whole pattern is accepted, if this
    /// sub-pattern is on the accepted path.
    Action { child: Box<PatternExpr>, action: Action, group: usize },
    Anchor(Anchor),
}

impl PatternExpr {
    pub fn node(pattern: NodePattern) -> Self {
        PatternExpr::Node(pattern)
    }

    pub fn repeat(child: PatternExpr, min: usize, max: Option<usize>, greedy: bool) -> Self {
        PatternExpr::Repeat { child: Box::new(child), min, max, greedy }
    }

    pub fn capture(child: PatternExpr, id: usize, name: Option<String>) -> Self {
        PatternExpr::Group { child: Box::new(child), id: Some(id), name }
    }

    pub fn non_capturing(child: PatternExpr) -> Self {
        PatternExpr::Group { child: Box::new(child), id: None, name: None }
    }

    pub fn with_action(child: PatternExpr, action: Action, group: usize) -> Self {
        PatternExpr::Action { child: Box::new(child), action, group }
    }

    /// True when the expression can succeed without consuming an element.
    pub fn can_be_empty(&self) -> bool {
        match self {
            PatternExpr::Node(_) => false,
            PatternExpr::Sequence(children) => children.iter().all(PatternExpr::can_be_empty),
            PatternExpr::Or(children) => children.iter().any(PatternExpr::can_be_empty),
            PatternExpr::Repeat { child, min, .. } => *min == 0 || child.can_be_empty(),
            PatternExpr::Group { child, .. } | PatternExpr::Action { child, .. } => child.can_be_empty(),
            PatternExpr::MultiNode { min, .. } => *min == 0,
            PatternExpr::Backref(_) | PatternExpr::Anchor(_) => true,
        }
    }

    /// Renumber capturing groups (and references to them) by `offset`.
    /// Group 0 is the enclosing match and is left alone.
    pub(crate) fn shift_groups(&mut self, offset: usize) {
        if offset == 0 {
            return;
        }
        match self {
            PatternExpr::Sequence(children) | PatternExpr::Or(children) => {
                children.iter_mut().for_each(|c| c.shift_groups(offset));
            }
            PatternExpr::Repeat { child, .. } => child.shift_groups(offset),
            PatternExpr::Group { child, id, .. } => {
                if let Some(id) = id {
                    *id += offset;
                }
                child.shift_groups(offset);
            }
            PatternExpr::Backref(id) => *id += offset,
            PatternExpr::Action { child, group, .. } => {
                if *group > 0 {
                    *group += offset;
                }
                child.shift_groups(offset);
            }
            PatternExpr::Node(_) | PatternExpr::MultiNode { .. } | PatternExpr::Anchor(_) => {}
        }
    }

    /// Literal element texts of which at least one must occur in a sequence
    /// for this expression to match, when that can be read off the tree.
    pub(crate) fn literal_trigger(&self) -> Option<Vec<String>> {
        match self {
            PatternExpr::Node(node) => node.literal_trigger(),
            PatternExpr::Sequence(children) => children
                .iter()
                .filter(|c| !c.can_be_empty())
                .find_map(PatternExpr::literal_trigger),
            PatternExpr::Or(children) if !children.is_empty() => {
                let mut words = Vec::new();
                for child in children {
                    words.extend(child.literal_trigger()?);
                }
                Some(words)
            }
            PatternExpr::Repeat { child, min, .. } if *min > 0 => child.literal_trigger(),
            PatternExpr::Group { child, .. } | PatternExpr::Action { child, .. } => child.literal_trigger(),
            _ => None,
        }
    }

    fn visit_groups(&self, f: &mut impl FnMut(usize, Option<&str>)) {
        match self {
            PatternExpr::Sequence(children) | PatternExpr::Or(children) => {
                children.iter().for_each(|c| c.visit_groups(f));
            }
            PatternExpr::Group { child, id, name } => {
                if let Some(id) = id {
                    f(*id, name.as_deref());
                }
                child.visit_groups(f);
            }
            PatternExpr::Repeat { child, .. } | PatternExpr::Action { child, .. } => child.visit_groups(f),
            PatternExpr::Node(_)
            | PatternExpr::Backref(_)
            | PatternExpr::MultiNode { .. }
            | PatternExpr::Anchor(_) => {}
        }
    }

    fn visit_backrefs(&self, f: &mut impl FnMut(usize)) {
        match self {
            PatternExpr::Sequence(children) | PatternExpr::Or(children) => {
                children.iter().for_each(|c| c.visit_backrefs(f));
            }
            PatternExpr::Group { child, .. }
            | PatternExpr::Repeat { child, .. }
            | PatternExpr::Action { child, .. } => child.visit_backrefs(f),
            PatternExpr::Backref(id) => f(*id),
            PatternExpr::Node(_) | PatternExpr::MultiNode { .. } | PatternExpr::Anchor(_) => {}
        }
    }
}

/// Names bound to capture group ids, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VarGroupBindings {
    entries: Vec<(String, usize)>,
}

impl VarGroupBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bind(&mut self, name: impl Into<String>, id: usize) {
        self.entries.push((name.into(), id));
    }

    /// All group ids bound to `name`, in declaration order.
    pub fn ids<'s>(&'s self, name: &'s str) -> impl Iterator<Item = usize> + 's {
        self.entries.iter().filter(move |(n, _)| n == name).map(|(_, id)| *id)
    }

    /// First name bound to group `id`.
    pub fn name_of(&self, id: usize) -> Option<&str> {
        self.entries.iter().find(|(_, i)| *i == id).map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.entries.iter().map(|(n, id)| (n.as_str(), *id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct Inner {
    source: String,
    root: PatternExpr,
    program: Program,
    var_groups: Arc<VarGroupBindings>,
    group_count: usize,
}

/// An immutable, shareable compiled pattern.
///
/// Cloning is cheap. Each search gets its own [`Matcher`].
#[derive(Clone)]
pub struct CompiledPattern {
    inner: Arc<Inner>,
    score: f64,
}

impl CompiledPattern {
    pub(crate) fn build(
        source: String,
        root: PatternExpr,
        var_groups: VarGroupBindings,
        group_count: usize,
    ) -> Self {
        let program = Program::lower(&root);
        tracing::debug!(pattern = %source, groups = group_count, insts = program.len(), "compiled pattern");
        CompiledPattern {
            inner: Arc::new(Inner { source, root, program, var_groups: Arc::new(var_groups), group_count }),
            score: 0.0,
        }
    }

    /// Wrap a hand-built tree. Group ids must already be assigned; names are
    /// collected from the tree and backreferences are validated.
    pub fn from_expr(source: impl Into<String>, root: PatternExpr) -> Result<Self, CompileError> {
        let mut var_groups = VarGroupBindings::new();
        let mut max_id = 0;
        root.visit_groups(&mut |id, name| {
            max_id = max_id.max(id);
            if let Some(name) = name {
                var_groups.bind(name, id);
            }
        });
        let group_count = max_id + 1;
        let mut invalid = None;
        root.visit_backrefs(&mut |id| {
            if id == 0 || id >= group_count {
                invalid.get_or_insert(id);
            }
        });
        if let Some(group) = invalid {
            return Err(CompileError::InvalidBackreference { group, offset: 0 });
        }
        Ok(Self::build(source.into(), root, var_groups, group_count))
    }

    /// Set the relevance score copied into every match of this pattern.
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn source(&self) -> &str {
        &self.inner.source
    }

    pub fn root(&self) -> &PatternExpr {
        &self.inner.root
    }

    /// The tree without the trailing `=> action` wrapper, if any.
    pub fn body(&self) -> &PatternExpr {
        match &self.inner.root {
            PatternExpr::Action { child, .. } => child.as_ref(),
            root => root,
        }
    }

    /// The trailing action and its target group.
    pub fn action(&self) -> Option<(&Action, usize)> {
        match &self.inner.root {
            PatternExpr::Action { action, group, .. } => Some((action, *group)),
            _ => None,
        }
    }

    /// Number of groups including group 0.
    pub fn group_count(&self) -> usize {
        self.inner.group_count
    }

    pub fn var_groups(&self) -> &VarGroupBindings {
        &self.inner.var_groups
    }

    pub(crate) fn shared_var_groups(&self) -> Arc<VarGroupBindings> {
        Arc::clone(&self.inner.var_groups)
    }

    pub(crate) fn program(&self) -> &Program {
        &self.inner.program
    }

    /// Address of the shared compiled tree plus the score bits. Clones with an
    /// equal score compare equal; separately compiled patterns never do.
    pub(crate) fn identity(&self) -> (usize, u64) {
        (Arc::as_ptr(&self.inner) as usize, self.score.to_bits())
    }

    /// Bind this pattern to an input sequence.
    pub fn matcher<'a, E: Element>(&self, elements: &'a [E]) -> Matcher<'a> {
        Matcher::new(self.clone(), elements)
    }
}

impl fmt::Debug for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledPattern")
            .field("source", &self.inner.source)
            .field("group_count", &self.inner.group_count)
            .field("var_groups", &self.inner.var_groups)
            .field("score", &self.score)
            .field("root", &self.inner.root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn word(w: &str) -> PatternExpr {
        PatternExpr::node(NodePattern::text(w))
    }

    #[test]
    fn emptiness() {
        assert!(!word("a").can_be_empty());
        assert!(PatternExpr::repeat(word("a"), 0, None, true).can_be_empty());
        assert!(!PatternExpr::repeat(word("a"), 1, None, true).can_be_empty());
        assert!(PatternExpr::Or(vec![word("a"), PatternExpr::Sequence(vec![])]).can_be_empty());
        assert!(PatternExpr::Anchor(Anchor::End).can_be_empty());
    }

    #[test]
    fn shifting_renumbers_groups_and_backrefs() {
        let mut expr = PatternExpr::Sequence(vec![
            PatternExpr::capture(word("a"), 1, Some("x".into())),
            PatternExpr::Backref(1),
        ]);
        expr.shift_groups(2);
        let compiled = CompiledPattern::from_expr("shifted", expr).unwrap();
        assert_eq!(compiled.group_count(), 4);
        assert_eq!(compiled.var_groups().ids("x").collect::<Vec<_>>(), vec![3]);
        assert!(matches!(
            compiled.root(),
            PatternExpr::Sequence(children) if matches!(children[1], PatternExpr::Backref(3))
        ));
    }

    #[test]
    fn from_expr_rejects_unknown_backref() {
        let expr = PatternExpr::Sequence(vec![PatternExpr::capture(word("a"), 1, None), PatternExpr::Backref(2)]);
        assert_eq!(
            CompiledPattern::from_expr("bad", expr).unwrap_err(),
            CompileError::InvalidBackreference { group: 2, offset: 0 }
        );
    }

    #[test]
    fn triggers_come_from_first_required_element() {
        let expr = PatternExpr::Sequence(vec![
            PatternExpr::repeat(word("very"), 0, None, true),
            PatternExpr::Or(vec![word("red"), word("brown")]),
            word("fox"),
        ]);
        assert_eq!(expr.literal_trigger(), Some(vec!["red".to_string(), "brown".to_string()]));

        let untriggered = PatternExpr::Sequence(vec![PatternExpr::node(NodePattern::Any), word("fox")]);
        assert_eq!(untriggered.literal_trigger(), Some(vec!["fox".to_string()]));
        assert_eq!(PatternExpr::node(NodePattern::Any).literal_trigger(), None);
    }

    #[test]
    fn names_may_alias() {
        let mut bindings = VarGroupBindings::new();
        bindings.bind("x", 1);
        bindings.bind("y", 2);
        bindings.bind("x", 3);
        assert_eq!(bindings.ids("x").collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(bindings.name_of(2), Some("y"));
        assert_eq!(bindings.len(), 3);
    }
}
