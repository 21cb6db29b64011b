//! Compilation environment (symbol table).
//!
//! An [`Environment`] is an explicit value handed to every compile call that
//! should share its bindings:
//!
//! - attribute names → caller attribute keys (`tag:` → `pos`),
//! - `$VAR` → sub-patterns (source text or an already compiled pattern),
//! - `#NAME` → node predicates,
//! - action names → callbacks for the trailing `=> action(..)` clause.
//!
//! Bindings are configure-then-freeze: bind everything first, then compile.
//! Compiled patterns copy what they resolved, so re-binding afterwards does
//! not affect them, but it is not a supported way to change behavior.

use super::expr::CompiledPattern;
use super::node::{NodeFunction, NodePattern, StringMatchFlags};
use super::result::MatchResult;
use crate::{AttrKey, Element};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A `$VAR` binding.
#[derive(Debug, Clone)]
pub enum PatternBinding {
    /// Pattern source, compiled in place against the referencing environment.
    Source(String),
    /// An already compiled pattern; its expression tree is copied in.
    Compiled(CompiledPattern),
}

impl From<&str> for PatternBinding {
    fn from(source: &str) -> Self {
        PatternBinding::Source(source.to_string())
    }
}

impl From<String> for PatternBinding {
    fn from(source: String) -> Self {
        PatternBinding::Source(source)
    }
}

impl From<CompiledPattern> for PatternBinding {
    fn from(pattern: CompiledPattern) -> Self {
        PatternBinding::Compiled(pattern)
    }
}

/// Signature of an action callback: the accepted match and the target group.
pub type ActionFn = dyn Fn(&MatchResult<'_>, usize) + Send + Sync;

/// A side-effecting callback run once per accepted match.
#[derive(Clone)]
pub struct Action {
    name: String,
    func: Arc<ActionFn>,
}

impl Action {
    pub fn new(name: impl Into<String>, func: impl Fn(&MatchResult<'_>, usize) + Send + Sync + 'static) -> Self {
        Action { name: name.into(), func: Arc::new(func) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, result: &MatchResult<'_>, group: usize) {
        (self.func)(result, group)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action").field("name", &self.name).field("func", &"<function>").finish()
    }
}

#[derive(Debug, Clone)]
pub struct Environment {
    attributes: HashMap<String, AttrKey>,
    patterns: HashMap<String, PatternBinding>,
    functions: HashMap<String, NodePattern>,
    actions: HashMap<String, Action>,
    default_key: AttrKey,
    string_flags: StringMatchFlags,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// An empty environment. Free-standing literals test the element text and
    /// string tests are case-sensitive.
    pub fn new() -> Self {
        Environment {
            attributes: HashMap::new(),
            patterns: HashMap::new(),
            functions: HashMap::new(),
            actions: HashMap::new(),
            default_key: AttrKey::Text,
            string_flags: StringMatchFlags::empty(),
        }
    }

    /// Map the pattern-syntax attribute `name` to the caller's key.
    pub fn bind_attribute(&mut self, name: impl Into<String>, key: AttrKey) -> &mut Self {
        self.attributes.insert(name.into(), key);
        self
    }

    /// Bind `$name` to a sub-pattern.
    pub fn bind_pattern(&mut self, name: impl Into<String>, pattern: impl Into<PatternBinding>) -> &mut Self {
        self.patterns.insert(name.into(), pattern.into());
        self
    }

    /// Bind `#name` to a node predicate.
    pub fn bind_function(&mut self, name: impl Into<String>, pattern: NodePattern) -> &mut Self {
        self.functions.insert(name.into(), pattern);
        self
    }

    /// Bind `#name` to a boolean predicate over elements.
    pub fn bind_predicate(
        &mut self,
        name: impl Into<String>,
        func: impl Fn(&dyn Element) -> bool + Send + Sync + 'static,
    ) -> &mut Self {
        let name = name.into();
        let pattern = NodePattern::custom(NodeFunction::predicate(name.clone(), func));
        self.bind_function(name, pattern)
    }

    pub fn bind_action(&mut self, action: Action) -> &mut Self {
        self.actions.insert(action.name().to_string(), action);
        self
    }

    /// Attribute read by free-standing `"string"` and `/regex/` atoms.
    pub fn set_default_key(&mut self, key: AttrKey) -> &mut Self {
        self.default_key = key;
        self
    }

    pub fn set_string_flags(&mut self, flags: StringMatchFlags) -> &mut Self {
        self.string_flags = flags;
        self
    }

    // --- Compiler-side accessors ---

    /// Resolve an attribute name. Unbound names are the caller's own keys.
    pub(crate) fn attribute_key(&self, name: &str) -> AttrKey {
        self.attributes.get(name).cloned().unwrap_or_else(|| AttrKey::named(name))
    }

    pub(crate) fn pattern(&self, name: &str) -> Option<&PatternBinding> {
        self.patterns.get(name)
    }

    pub(crate) fn function(&self, name: &str) -> Option<&NodePattern> {
        self.functions.get(name)
    }

    pub(crate) fn action(&self, name: &str) -> Option<&Action> {
        self.actions.get(name)
    }

    pub(crate) fn default_key(&self) -> &AttrKey {
        &self.default_key
    }

    pub(crate) fn string_flags(&self) -> StringMatchFlags {
        self.string_flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Token;

    #[test]
    fn attribute_names_resolve_through_bindings() {
        let mut env = Environment::new();
        env.bind_attribute("tag", AttrKey::named("pos")).bind_attribute("word", AttrKey::Text);
        assert_eq!(env.attribute_key("tag"), AttrKey::named("pos"));
        assert_eq!(env.attribute_key("word"), AttrKey::Text);
        assert_eq!(env.attribute_key("lemma"), AttrKey::named("lemma"));
    }

    #[test]
    fn predicates_are_bound_as_custom_nodes() {
        let mut env = Environment::new();
        env.bind_predicate("CAPS", |el| el.text().chars().next().is_some_and(char::is_uppercase));
        let pat = env.function("CAPS").unwrap();
        assert!(pat.test(&Token::new("Paris")).unwrap());
        assert!(!pat.test(&Token::new("paris")).unwrap());
        assert!(env.function("LOWER").is_none());
    }

    #[test]
    fn pattern_bindings_accept_source_text() {
        let mut env = Environment::new();
        env.bind_pattern("NP", "[tag:DT]? [tag:NN]");
        assert!(matches!(env.pattern("NP"), Some(PatternBinding::Source(s)) if s == "[tag:DT]? [tag:NN]"));
    }

    #[test]
    fn actions_are_keyed_by_name() {
        let mut env = Environment::new();
        env.bind_action(Action::new("noop", |_, _| {}));
        assert_eq!(env.action("noop").map(Action::name), Some("noop"));
    }
}
