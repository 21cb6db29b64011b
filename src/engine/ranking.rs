//! Ranking and selection of candidate matches.
//!
//! Comparators are plain `fn` pointers ordering *better first*, so a sorted
//! candidate list reads from most to least preferred. They compose through
//! [`ComparatorChain`]: the first comparator that tells two candidates apart
//! decides.
//!
//! The default chain is
//!
//! ```text
//! score (high first) → length (long first) → order (early first) → offset
//! ```

use crate::Span;
use std::cmp::Ordering;

/// Anything that can be ranked: matches, or caller types wrapping them.
pub trait Ranked {
    fn score(&self) -> f64;
    fn span(&self) -> Span;
    /// Production order among the candidates being ranked.
    fn order(&self) -> usize;
}

pub type Comparator<T> = fn(&T, &T) -> Ordering;

/// Higher score first. NaN sorts like any other value under `total_cmp`.
pub fn by_score<T: Ranked>(a: &T, b: &T) -> Ordering {
    b.score().total_cmp(&a.score())
}

/// Longer span first.
pub fn by_length<T: Ranked>(a: &T, b: &T) -> Ordering {
    b.span().len().cmp(&a.span().len())
}

/// Earlier production first.
pub fn by_order<T: Ranked>(a: &T, b: &T) -> Ordering {
    a.order().cmp(&b.order())
}

/// Leftmost first, then shortest.
pub fn by_offset<T: Ranked>(a: &T, b: &T) -> Ordering {
    let (a, b) = (a.span(), b.span());
    a.start.cmp(&b.start).then(a.end.cmp(&b.end))
}

pub fn default_order<T: Ranked>(a: &T, b: &T) -> Ordering {
    by_score(a, b).then_with(|| by_length(a, b)).then_with(|| by_order(a, b)).then_with(|| by_offset(a, b))
}

/// Lexicographic composition of comparators.
pub struct ComparatorChain<T> {
    comparators: Vec<Comparator<T>>,
}

impl<T> ComparatorChain<T> {
    /// An empty chain considers everything equal.
    pub fn new() -> Self {
        ComparatorChain { comparators: Vec::new() }
    }

    pub fn then(mut self, comparator: Comparator<T>) -> Self {
        self.comparators.push(comparator);
        self
    }

    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        self.comparators.iter().map(|cmp| cmp(a, b)).find(|o| o.is_ne()).unwrap_or(Ordering::Equal)
    }
}

impl<T: Ranked> Default for ComparatorChain<T> {
    fn default() -> Self {
        ComparatorChain::new().then(by_score).then(by_length).then(by_order).then(by_offset)
    }
}

impl<T> Clone for ComparatorChain<T> {
    fn clone(&self) -> Self {
        ComparatorChain { comparators: self.comparators.clone() }
    }
}

/// Greedy selection: take candidates best-first, skipping any that overlaps
/// one already taken. The survivors come back in offset order.
pub fn select_non_overlapping<T: Ranked>(mut candidates: Vec<T>, compare: impl Fn(&T, &T) -> Ordering) -> Vec<T> {
    candidates.sort_by(|a, b| compare(a, b));
    let mut kept: Vec<T> = Vec::new();
    for candidate in candidates {
        let span = candidate.span();
        if kept.iter().all(|k| !k.span().overlaps(&span)) {
            kept.push(candidate);
        }
    }
    kept.sort_by(by_offset);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, PartialEq)]
    struct Cand {
        score: f64,
        span: Span,
        order: usize,
    }

    impl Ranked for Cand {
        fn score(&self) -> f64 {
            self.score
        }
        fn span(&self) -> Span {
            self.span
        }
        fn order(&self) -> usize {
            self.order
        }
    }

    fn cand(score: f64, start: usize, end: usize, order: usize) -> Cand {
        Cand { score, span: Span::new(start, end), order }
    }

    #[test]
    fn score_then_length() {
        let short = cand(0.9, 0, 3, 0);
        let long = cand(0.9, 0, 5, 1);
        let low = cand(0.5, 0, 8, 2);
        let mut all = vec![low.clone(), short.clone(), long.clone()];
        all.sort_by(default_order);
        assert_eq!(all, vec![long, short, low]);
    }

    #[test]
    fn order_breaks_ties_before_offset() {
        let a = cand(1.0, 4, 6, 0);
        let b = cand(1.0, 0, 2, 1);
        assert_eq!(default_order(&a, &b), Ordering::Less);
        assert_eq!(by_offset(&a, &b), Ordering::Greater);
    }

    #[test]
    fn custom_chain() {
        let chain = ComparatorChain::new().then(by_offset::<Cand>);
        assert_eq!(chain.compare(&cand(0.1, 0, 2, 5), &cand(0.9, 1, 2, 0)), Ordering::Less);
        assert_eq!(ComparatorChain::<Cand>::new().compare(&cand(0.1, 0, 2, 5), &cand(0.9, 1, 2, 0)), Ordering::Equal);
    }

    #[test]
    fn selection_drops_overlaps_and_restores_offset_order() {
        let candidates = vec![
            cand(0.5, 0, 2, 0),
            cand(0.9, 1, 4, 1),
            cand(0.7, 4, 6, 2),
            cand(0.8, 5, 7, 3),
        ];
        let kept = select_non_overlapping(candidates, default_order);
        assert_eq!(kept, vec![cand(0.9, 1, 4, 1), cand(0.8, 5, 7, 3)]);
    }
}
