//! Running many patterns over one sequence.
//!
//! A run is a small pipeline:
//!
//! ```text
//! patterns ── TriggerIndex::new ──┐            (trigger.rs, at build time)
//!                                 │
//! input ── InputWords::scan ──────┼─ select active patterns
//!                                 v
//!             per-pattern Matcher::find_all     (matcher.rs)
//!               - global production order
//!               - dedup via CandidateKey        (dedup.rs)
//!                                 │
//!                                 v
//!             select_non_overlapping            (ranking.rs)
//! ```

use super::dedup::CandidateKey;
use super::error::MatchError;
use super::expr::CompiledPattern;
use super::matcher::Matcher;
use super::metrics::MultiMetrics;
use super::ranking::{ComparatorChain, select_non_overlapping};
use super::result::MatchResult;
use super::trigger::{InputWords, TriggerIndex};
use crate::Element;
use crate::api::MatchOptions;
use std::collections::HashSet;
use std::rc::Rc;
use std::time::Instant;

/// Output of [`MultiPatternMatcher::run`].
#[derive(Debug, Clone)]
pub struct MultiRun<'a> {
    /// Every distinct candidate, in production order.
    pub candidates: Vec<MatchResult<'a>>,
    /// The best non-overlapping subset, in offset order.
    pub selected: Vec<MatchResult<'a>>,
    pub metrics: MultiMetrics,
}

/// A fixed set of patterns searched together.
#[derive(Debug, Clone)]
pub struct MultiPatternMatcher {
    patterns: Vec<CompiledPattern>,
    index: TriggerIndex,
    options: MatchOptions,
}

impl MultiPatternMatcher {
    pub fn new(patterns: Vec<CompiledPattern>) -> Self {
        let index = TriggerIndex::new(&patterns);
        MultiPatternMatcher { patterns, index, options: MatchOptions::default() }
    }

    /// Options applied to every per-pattern search. The step budget applies
    /// to each search separately.
    pub fn with_options(mut self, options: MatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn patterns(&self) -> &[CompiledPattern] {
        &self.patterns
    }

    /// Every match of every active pattern, de-duplicated, in production
    /// order.
    pub fn find_all_candidates<'a, E: Element>(&self, elements: &'a [E]) -> Result<Vec<MatchResult<'a>>, MatchError> {
        let shared: Rc<[&'a dyn Element]> = elements.iter().map(|el| el as &dyn Element).collect();
        let mut metrics = MultiMetrics::default();
        self.collect(shared, &mut metrics)
    }

    /// The best non-overlapping matches under the default ranking.
    pub fn find_non_overlapping<'a, E: Element>(&self, elements: &'a [E]) -> Result<Vec<MatchResult<'a>>, MatchError> {
        Ok(self.run(elements, &ComparatorChain::default())?.selected)
    }

    /// The best non-overlapping matches under a caller-supplied ranking.
    pub fn find_non_overlapping_by<'a, E: Element>(
        &self,
        elements: &'a [E],
        ranking: &ComparatorChain<MatchResult<'a>>,
    ) -> Result<Vec<MatchResult<'a>>, MatchError> {
        Ok(self.run(elements, ranking)?.selected)
    }

    /// Full run: candidates, selection and metrics.
    pub fn run<'a, E: Element>(
        &self,
        elements: &'a [E],
        ranking: &ComparatorChain<MatchResult<'a>>,
    ) -> Result<MultiRun<'a>, MatchError> {
        let start = Instant::now();
        let shared: Rc<[&'a dyn Element]> = elements.iter().map(|el| el as &dyn Element).collect();
        let mut metrics = MultiMetrics::default();
        let candidates = self.collect(shared, &mut metrics)?;
        let selected = select_non_overlapping(candidates.clone(), |a, b| ranking.compare(a, b));
        metrics.elapsed = start.elapsed();
        tracing::debug!(
            patterns = metrics.patterns_total,
            active = metrics.patterns_active,
            candidates = metrics.candidates,
            selected = selected.len(),
            elapsed = ?metrics.elapsed,
            "multi-pattern run"
        );
        Ok(MultiRun { candidates, selected, metrics })
    }

    fn collect<'a>(
        &self,
        elements: Rc<[&'a dyn Element]>,
        metrics: &mut MultiMetrics,
    ) -> Result<Vec<MatchResult<'a>>, MatchError> {
        let active = self.index.active(&InputWords::scan(&elements));
        metrics.patterns_total = self.patterns.len();
        metrics.patterns_active = active.len();
        tracing::debug!(active = ?active, total = self.patterns.len(), "trigger selection");

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for id in active {
            let pattern = &self.patterns[id];
            let mut matcher =
                Matcher::from_shared(pattern.clone(), Rc::clone(&elements)).with_options(self.options.clone());
            for found in matcher.find_all() {
                let mut found = found?;
                if !seen.insert(CandidateKey::new(&found, pattern)) {
                    metrics.duplicates += 1;
                    continue;
                }
                found.set_order(candidates.len());
                found.set_pattern(id);
                candidates.push(found);
            }
            metrics.search += matcher.metrics();
        }
        metrics.candidates = candidates.len();
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Environment, Span, compile, compile_with, tokens_from_str};
    use pretty_assertions::assert_eq;

    #[test]
    fn higher_score_wins_overlaps() {
        let tokens = tokens_from_str("New/NNP York/NNP City/NNP is/VBZ big/JJ");
        let multi = MultiPatternMatcher::new(vec![
            compile("[tag:NNP]{2}").unwrap().with_score(0.5),
            compile("[tag:NNP]+").unwrap().with_score(0.9),
            compile("[tag:JJ]").unwrap().with_score(0.1),
        ]);
        let selected = multi.find_non_overlapping(&tokens).unwrap();
        let spans: Vec<(Span, usize)> = selected.iter().map(|m| (m.span(), m.pattern_index())).collect();
        assert_eq!(spans, vec![(Span::new(0, 3), 1), (Span::new(4, 5), 2)]);
    }

    #[test]
    fn duplicate_patterns_collapse() {
        let tokens = tokens_from_str("a b a");
        let pattern = compile(r#""a""#).unwrap();
        let multi = MultiPatternMatcher::new(vec![pattern.clone(), pattern]);
        let run = multi.run(&tokens, &ComparatorChain::default()).unwrap();
        assert_eq!(run.candidates.len(), 2);
        assert_eq!(run.metrics.duplicates, 2);
        assert_eq!(run.candidates.iter().map(|m| m.order()).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn equal_sources_with_different_scores_stay_distinct() {
        let tokens = tokens_from_str("dog/NN");
        let multi = MultiPatternMatcher::new(vec![
            compile("[tag:NN]").unwrap().with_score(0.1),
            compile("[tag:NN]").unwrap().with_score(0.9),
        ]);
        let run = multi.run(&tokens, &ComparatorChain::default()).unwrap();
        assert_eq!(run.candidates.len(), 2);
        assert_eq!(run.metrics.duplicates, 0);
        let best: Vec<(usize, f64)> = run.selected.iter().map(|m| (m.pattern_index(), m.score())).collect();
        assert_eq!(best, vec![(1, 0.9)]);
    }

    #[test]
    fn equal_sources_under_different_environments_stay_distinct() {
        let tokens = tokens_from_str("dog/NN");
        let mut loose = Environment::new();
        loose.bind_pattern("X", "[tag:NN]");
        let mut strict = Environment::new();
        strict.bind_pattern("X", r#""dog""#);
        let multi = MultiPatternMatcher::new(vec![
            compile_with(&loose, "$X").unwrap().with_score(0.1),
            compile_with(&strict, "$X").unwrap().with_score(0.9),
        ]);
        let run = multi.run(&tokens, &ComparatorChain::default()).unwrap();
        assert_eq!(run.candidates.len(), 2);
        assert_eq!(run.selected.first().map(|m| m.score()), Some(0.9));
    }

    #[test]
    fn re_scored_clones_stay_distinct() {
        let tokens = tokens_from_str("dog/NN");
        let pattern = compile("[tag:NN]").unwrap();
        let multi = MultiPatternMatcher::new(vec![pattern.clone().with_score(0.2), pattern.with_score(0.7)]);
        let run = multi.run(&tokens, &ComparatorChain::default()).unwrap();
        assert_eq!(run.metrics.duplicates, 0);
        assert_eq!(run.selected.first().map(|m| m.pattern_index()), Some(1));
    }

    #[test]
    fn inactive_patterns_are_not_searched() {
        let tokens = tokens_from_str("the/DT dog/NN");
        let multi = MultiPatternMatcher::new(vec![compile(r#""cat""#).unwrap(), compile("[tag:NN]").unwrap()]);
        let run = multi.run(&tokens, &ComparatorChain::default()).unwrap();
        assert_eq!(run.metrics.patterns_total, 2);
        assert_eq!(run.metrics.patterns_active, 1);
        assert_eq!(run.selected.len(), 1);
    }
}
