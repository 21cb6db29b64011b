//! Trigger scanning for multi-pattern runs.
//!
//! Before a [`MultiPatternMatcher`](crate::MultiPatternMatcher) searches, it
//! inspects the input once and decides which patterns can possibly match:
//!
//! - At build time every pattern is indexed by its *trigger words*: literal
//!   element texts of which at least one must occur for the pattern to match
//!   (read off the expression tree, see `PatternExpr::literal_trigger`).
//!   Patterns without such a set are always on.
//! - At run time [`InputWords::scan`] collects the texts present in the input
//!   and [`TriggerIndex::active`] unions the matching postings.
//!
//! False positives are fine (the pattern still has to match); false
//! negatives are not, so trigger extraction only looks at case-sensitive
//! text equality.

use super::expr::CompiledPattern;
use crate::Element;
use std::collections::{HashMap, HashSet};

/// Pattern identifier (index into the matcher's pattern list).
pub(crate) type PatternId = usize;

/// Distinct element texts of one input sequence.
#[derive(Debug, Clone, Default)]
pub(crate) struct InputWords {
    words: HashSet<String>,
}

impl InputWords {
    pub(crate) fn scan(elements: &[&dyn Element]) -> Self {
        InputWords { words: elements.iter().map(|el| el.text().into_owned()).collect() }
    }

    pub(crate) fn contains(&self, word: &str) -> bool {
        self.words.contains(word)
    }
}

#[derive(Debug, Default, Clone)]
pub(crate) struct TriggerIndex {
    pub(crate) always_on: Vec<PatternId>,
    pub(crate) by_word: HashMap<String, Vec<PatternId>>,
}

impl TriggerIndex {
    pub(crate) fn new(patterns: &[CompiledPattern]) -> Self {
        let mut index = TriggerIndex::default();
        for (id, pattern) in patterns.iter().enumerate() {
            match pattern.root().literal_trigger() {
                Some(words) if !words.is_empty() => {
                    for word in words {
                        let postings = index.by_word.entry(word).or_default();
                        if postings.last() != Some(&id) {
                            postings.push(id);
                        }
                    }
                }
                _ => index.always_on.push(id),
            }
        }
        index
    }

    /// Patterns worth attempting on an input, in registration order.
    pub(crate) fn active(&self, input: &InputWords) -> Vec<PatternId> {
        let mut active: Vec<PatternId> = self.always_on.clone();
        for (word, ids) in &self.by_word {
            if input.contains(word) {
                active.extend_from_slice(ids);
            }
        }
        active.sort_unstable();
        active.dedup();
        active
    }
}
