use crate::Token;
use crate::engine::{self, CompileError, CompiledPattern, Environment};
use once_cell::sync::Lazy;

static DEFAULT_ENV: Lazy<Environment> = Lazy::new(Environment::new);

/// How a [`Matcher`](crate::Matcher) advances after each match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FindType {
    /// Resume at the end of the previous match (one past it for an empty
    /// match). Matches never overlap.
    #[default]
    NonOverlapping,
    /// Resume one element after the previous match's start, so every start
    /// position that matches is reported once.
    All,
}

/// Options that affect searching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchOptions {
    pub find_type: FindType,
    /// Abort a search with [`MatchError::StepLimit`](crate::MatchError::StepLimit)
    /// after this many machine steps. `None` is unlimited.
    pub max_steps: Option<usize>,
}

/// Compile `pattern` against an empty [`Environment`].
///
/// # Example
/// ```
/// use seqex::{compile, tokens_from_str};
///
/// let tokens = tokens_from_str("the quick brown fox");
/// let pattern = compile(r#""quick" "brown""#).unwrap();
/// let m = pattern.matcher(&tokens).find().unwrap().unwrap();
/// assert_eq!((m.start(), m.end()), (1, 3));
/// assert_eq!(m.text(), "quick brown");
/// ```
pub fn compile(pattern: &str) -> Result<CompiledPattern, CompileError> {
    compile_with(&DEFAULT_ENV, pattern)
}

/// Compile `pattern`, resolving `$VAR`, `#NAME`, attribute names and actions
/// through `env`.
pub fn compile_with(env: &Environment, pattern: &str) -> Result<CompiledPattern, CompileError> {
    engine::compile_sources(env, &[pattern])
}

/// Compile several strings as one pattern that matches them in sequence.
/// Group numbering continues across strings; only the last one may carry an
/// `=> action` clause.
pub fn compile_all(env: &Environment, patterns: &[&str]) -> Result<CompiledPattern, CompileError> {
    engine::compile_sources(env, patterns)
}

/// Build [`Token`]s from whitespace-separated `word/TAG` items.
///
/// The part after the last `/` becomes the `tag` attribute; items without a
/// tag (or with an empty side) become plain tokens.
///
/// ```
/// use seqex::{Element, tokens_from_str};
///
/// let tokens = tokens_from_str("the/DT and/or/CC fox");
/// assert_eq!(tokens[1].as_str(), "and/or");
/// assert_eq!(tokens[1].attribute("tag").map(|v| v.to_string()).as_deref(), Some("CC"));
/// assert!(tokens[2].attribute("tag").is_none());
/// ```
pub fn tokens_from_str(text: &str) -> Vec<Token> {
    text.split_whitespace()
        .map(|item| match item.rsplit_once('/') {
            Some((word, tag)) if !word.is_empty() && !tag.is_empty() => Token::new(word).with("tag", tag),
            _ => Token::new(item),
        })
        .collect()
}
