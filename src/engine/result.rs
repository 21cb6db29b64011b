//! Accepted matches.
//!
//! A [`MatchResult`] is a snapshot: its spans never change after the matcher
//! produced it, even when the matcher keeps searching. It keeps the element
//! sequence alive through a shared handle so group text can be rendered
//! lazily.

use super::error::MatchError;
use super::expr::VarGroupBindings;
use super::ranking::Ranked;
use crate::{Element, Span, Value};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Renders a run of elements as one string (group text, multi-element spans).
pub type Stringifier = fn(&[&dyn Element]) -> String;

/// The default [`Stringifier`]: element texts joined by single spaces.
pub fn join_text(elements: &[&dyn Element]) -> String {
    elements.iter().map(|el| el.text()).collect::<Vec<_>>().join(" ")
}

/// Addresses a group of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupId {
    /// Group 0 is the whole match; `1..group_count` are capturing groups.
    Index(usize),
    /// Everything before the match: `[0, start)`.
    BeforeMatch,
    /// Everything after the match: `[end, len)`.
    AfterMatch,
}

impl From<usize> for GroupId {
    fn from(index: usize) -> Self {
        GroupId::Index(index)
    }
}

#[derive(Clone)]
pub struct MatchResult<'a> {
    elements: Rc<[&'a dyn Element]>,
    spans: Vec<Option<Span>>,
    var_groups: Arc<VarGroupBindings>,
    node_results: Vec<(usize, Value<'static>)>,
    stringifier: Stringifier,
    score: f64,
    order: usize,
    pattern: usize,
}

impl<'a> MatchResult<'a> {
    pub(crate) fn new(
        elements: Rc<[&'a dyn Element]>,
        spans: Vec<Option<Span>>,
        var_groups: Arc<VarGroupBindings>,
        node_results: Vec<(usize, Value<'static>)>,
        stringifier: Stringifier,
    ) -> Self {
        MatchResult { elements, spans, var_groups, node_results, stringifier, score: 0.0, order: 0, pattern: 0 }
    }

    pub(crate) fn set_score(&mut self, score: f64) {
        self.score = score;
    }

    pub(crate) fn set_order(&mut self, order: usize) {
        self.order = order;
    }

    pub(crate) fn set_pattern(&mut self, pattern: usize) {
        self.pattern = pattern;
    }

    /// Span of group 0.
    pub fn span(&self) -> Span {
        self.spans.first().copied().flatten().unwrap_or_default()
    }

    pub fn start(&self) -> usize {
        self.span().start
    }

    pub fn end(&self) -> usize {
        self.span().end
    }

    /// Number of elements matched.
    pub fn len(&self) -> usize {
        self.span().len()
    }

    pub fn is_empty(&self) -> bool {
        self.span().is_empty()
    }

    /// Number of groups, group 0 included.
    pub fn group_count(&self) -> usize {
        self.spans.len()
    }

    /// Span of a group. `Ok(None)` means the group did not participate in the
    /// match; an index past the last group is an error.
    pub fn group_span(&self, group: impl Into<GroupId>) -> Result<Option<Span>, MatchError> {
        match group.into() {
            GroupId::Index(index) => match self.spans.get(index) {
                Some(span) => Ok(*span),
                None => Err(MatchError::GroupOutOfRange { group: index, count: self.spans.len() }),
            },
            GroupId::BeforeMatch => Ok(Some(Span::new(0, self.start()))),
            GroupId::AfterMatch => Ok(Some(Span::new(self.end(), self.elements.len()))),
        }
    }

    pub fn start_of(&self, group: impl Into<GroupId>) -> Result<Option<usize>, MatchError> {
        Ok(self.group_span(group)?.map(|s| s.start))
    }

    pub fn end_of(&self, group: impl Into<GroupId>) -> Result<Option<usize>, MatchError> {
        Ok(self.group_span(group)?.map(|s| s.end))
    }

    /// Elements covered by a group.
    pub fn group_elements(&self, group: impl Into<GroupId>) -> Result<Option<&[&'a dyn Element]>, MatchError> {
        Ok(self.group_span(group)?.map(|s| &self.elements[s.start..s.end]))
    }

    /// Rendered text of a group.
    pub fn group(&self, group: impl Into<GroupId>) -> Result<Option<String>, MatchError> {
        Ok(self.group_elements(group)?.map(self.stringifier))
    }

    /// Rendered text of the whole match.
    pub fn text(&self) -> String {
        let span = self.span();
        (self.stringifier)(&self.elements[span.start..span.end])
    }

    /// Span of a named group. With aliased names the first participating
    /// group wins; unknown names and non-participating groups give `None`.
    pub fn var_span(&self, name: &str) -> Option<Span> {
        self.var_groups.ids(name).find_map(|id| self.spans.get(id).copied().flatten())
    }

    pub fn var_start(&self, name: &str) -> Option<usize> {
        self.var_span(name).map(|s| s.start)
    }

    pub fn var_end(&self, name: &str) -> Option<usize> {
        self.var_span(name).map(|s| s.end)
    }

    pub fn var_group(&self, name: &str) -> Option<String> {
        self.var_span(name).map(|s| (self.stringifier)(&self.elements[s.start..s.end]))
    }

    pub fn var_groups(&self) -> &VarGroupBindings {
        &self.var_groups
    }

    /// Auxiliary value a custom node function attached to the element at
    /// `index`, if that element is part of the accepted path.
    pub fn node_result(&self, index: usize) -> Option<&Value<'static>> {
        self.node_results.iter().find(|(i, _)| *i == index).map(|(_, v)| v)
    }

    pub fn node_results(&self) -> impl Iterator<Item = (usize, &Value<'static>)> {
        self.node_results.iter().map(|(i, v)| (*i, v))
    }

    /// Relevance score inherited from the pattern.
    pub fn score(&self) -> f64 {
        self.score
    }

    /// Production order: 0 for the first match a matcher (or multi-pattern
    /// run) produced, then increasing.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Index of the producing pattern in a multi-pattern run; 0 otherwise.
    pub fn pattern_index(&self) -> usize {
        self.pattern
    }

    /// The whole searched sequence.
    pub fn elements(&self) -> &[&'a dyn Element] {
        &self.elements
    }
}

impl Ranked for MatchResult<'_> {
    fn score(&self) -> f64 {
        self.score
    }

    fn span(&self) -> Span {
        MatchResult::span(self)
    }

    fn order(&self) -> usize {
        self.order
    }
}

impl fmt::Debug for MatchResult<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchResult")
            .field("spans", &self.spans)
            .field("text", &self.text())
            .field("score", &self.score)
            .field("order", &self.order)
            .field("pattern", &self.pattern)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Token;

    fn result<'a>(tokens: &'a [Token], spans: Vec<Option<Span>>, names: &[(&str, usize)]) -> MatchResult<'a> {
        let elements: Rc<[&'a dyn Element]> = tokens.iter().map(|t| t as &dyn Element).collect();
        let mut bindings = VarGroupBindings::new();
        for (name, id) in names {
            bindings.bind(*name, *id);
        }
        MatchResult::new(elements, spans, Arc::new(bindings), Vec::new(), join_text)
    }

    fn tokens() -> Vec<Token> {
        ["the", "quick", "brown", "fox", "jumps"].into_iter().map(Token::new).collect()
    }

    #[test]
    fn group_accessors() {
        let tokens = tokens();
        let m = result(&tokens, vec![Some(Span::new(1, 4)), Some(Span::new(2, 3)), None], &[]);
        assert_eq!(m.text(), "quick brown fox");
        assert_eq!(m.group(1).unwrap().as_deref(), Some("brown"));
        assert_eq!(m.group(2).unwrap(), None);
        assert_eq!(m.start_of(1).unwrap(), Some(2));
        assert_eq!(m.group(3).unwrap_err(), MatchError::GroupOutOfRange { group: 3, count: 3 });
    }

    #[test]
    fn pseudo_groups_cover_the_context() {
        let tokens = tokens();
        let m = result(&tokens, vec![Some(Span::new(1, 3))], &[]);
        assert_eq!(m.group(GroupId::BeforeMatch).unwrap().as_deref(), Some("the"));
        assert_eq!(m.group(GroupId::AfterMatch).unwrap().as_deref(), Some("fox jumps"));
    }

    #[test]
    fn aliased_names_resolve_to_the_participating_group() {
        let tokens = tokens();
        let m = result(&tokens, vec![Some(Span::new(0, 2)), None, Some(Span::new(1, 2))], &[("adj", 1), ("adj", 2)]);
        assert_eq!(m.var_group("adj").as_deref(), Some("quick"));
        assert_eq!(m.var_span("adj"), Some(Span::new(1, 2)));
        assert_eq!(m.var_group("noun"), None);
    }

    #[test]
    fn empty_group_renders_as_empty_string() {
        let tokens = tokens();
        let m = result(&tokens, vec![Some(Span::new(2, 2))], &[]);
        assert!(m.is_empty());
        assert_eq!(m.text(), "");
    }
}
