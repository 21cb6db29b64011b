//! Deduplication keys for multi-pattern candidates.
//!
//! Two candidates are the same when they cover the same span and were
//! produced by the same pattern: one compiled artifact registered with the
//! same score. Registering one pattern twice therefore yields each match once.
//! Patterns compiled separately are distinct even when their source text is
//! equal, since their scores or environments may differ; ranking chooses
//! between them.

use super::expr::CompiledPattern;
use super::result::MatchResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CandidateKey {
    pub(crate) start: usize,
    pub(crate) end: usize,
    pub(crate) pattern: (usize, u64),
}

impl CandidateKey {
    pub(crate) fn new(result: &MatchResult<'_>, pattern: &CompiledPattern) -> Self {
        CandidateKey { start: result.start(), end: result.end(), pattern: pattern.identity() }
    }
}
