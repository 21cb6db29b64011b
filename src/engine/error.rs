//! Error taxonomy.
//!
//! - [`CompileError`]: anything wrong with a pattern string or its bindings.
//!   Compilation never partially succeeds.
//! - [`MatchError`]: misuse of a matcher or result, an exhausted step budget,
//!   or a hard failure raised by a custom node function.
//! - [`PredicateError`]: the hard-failure signal a custom node function returns.
//!
//! A search that finds nothing is not an error: it is `Ok(None)`.

use thiserror::Error;

/// Errors raised while compiling a pattern.
///
/// Offsets are byte offsets into the pattern string; `near` holds a short
/// excerpt of the pattern starting at the offset.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("syntax error at offset {offset} near `{near}`: {message}")]
    Syntax { offset: usize, near: String, message: String },

    #[error("unknown relation operator `{op}` at offset {offset}")]
    UnknownRelation { op: String, offset: usize },

    #[error("unbound variable `${name}` at offset {offset}")]
    UnboundVariable { name: String, offset: usize },

    #[error("unbound function `#{name}` at offset {offset}")]
    UnboundFunction { name: String, offset: usize },

    #[error("unbound action `{name}` at offset {offset}")]
    UnboundAction { name: String, offset: usize },

    #[error("variable `${name}` at offset {offset} refers to itself")]
    RecursiveVariable { name: String, offset: usize },

    #[error("invalid quantifier {{{min},{max}}} at offset {offset}: min exceeds max")]
    InvalidQuantifier { min: usize, max: usize, offset: usize },

    #[error("invalid regex `{pattern}` at offset {offset}: {message}")]
    InvalidRegex { pattern: String, offset: usize, message: String },

    #[error("invalid group name `{name}` at offset {offset}")]
    InvalidGroupName { name: String, offset: usize },

    #[error("group name `{name}` at offset {offset} is already declared on the same path")]
    DuplicateGroupName { name: String, offset: usize },

    #[error("backreference \\{group} at offset {offset} names a group the pattern does not declare")]
    InvalidBackreference { group: usize, offset: usize },
}

impl CompileError {
    pub(crate) fn syntax(source: &str, offset: usize, message: impl Into<String>) -> Self {
        CompileError::Syntax { offset, near: excerpt(source, offset), message: message.into() }
    }

    /// Byte offset the error points at.
    pub fn offset(&self) -> usize {
        match self {
            CompileError::Syntax { offset, .. }
            | CompileError::UnknownRelation { offset, .. }
            | CompileError::UnboundVariable { offset, .. }
            | CompileError::UnboundFunction { offset, .. }
            | CompileError::UnboundAction { offset, .. }
            | CompileError::InvalidQuantifier { offset, .. }
            | CompileError::InvalidRegex { offset, .. }
            | CompileError::InvalidGroupName { offset, .. }
            | CompileError::RecursiveVariable { offset, .. }
            | CompileError::DuplicateGroupName { offset, .. }
            | CompileError::InvalidBackreference { offset, .. } => *offset,
        }
    }
}

fn excerpt(source: &str, offset: usize) -> String {
    let rest = source.get(offset..).unwrap_or("");
    if rest.is_empty() {
        return "<end of pattern>".to_string();
    }
    rest.chars().take(16).collect()
}

/// A hard failure signalled by a custom node function.
///
/// Soft failures ("this element does not match") are expressed by returning
/// [`Verdict::Reject`](crate::Verdict::Reject) instead.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("node function `{function}` failed: {message}")]
pub struct PredicateError {
    pub function: String,
    pub message: String,
}

impl PredicateError {
    pub fn new(function: impl Into<String>, message: impl Into<String>) -> Self {
        PredicateError { function: function.into(), message: message.into() }
    }
}

/// Errors raised by matchers and match results.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatchError {
    #[error("group {group} is out of range (pattern has {count} groups)")]
    GroupOutOfRange { group: usize, count: usize },

    #[error("matcher is exhausted; call reset() before searching again")]
    Exhausted,

    #[error("start position {pos} is past the end of a {len}-element sequence")]
    PositionOutOfRange { pos: usize, len: usize },

    #[error("search exceeded the step budget of {limit}")]
    StepLimit { limit: usize },

    #[error(transparent)]
    Predicate(#[from] PredicateError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_error_carries_excerpt() {
        let err = CompileError::syntax("[tag:NN] )oops", 9, "unbalanced `)`");
        assert_eq!(err.offset(), 9);
        assert_eq!(err.to_string(), "syntax error at offset 9 near `)oops`: unbalanced `)`");
    }

    #[test]
    fn syntax_error_at_end() {
        let err = CompileError::syntax("(", 1, "unclosed group");
        assert!(err.to_string().contains("<end of pattern>"));
    }

    #[test]
    fn predicate_error_converts_to_match_error() {
        let err: MatchError = PredicateError::new("IS_NUM", "lookup failed").into();
        assert_eq!(err.to_string(), "node function `IS_NUM` failed: lookup failed");
    }
}
