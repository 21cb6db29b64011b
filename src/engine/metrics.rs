//! Search metrics.
//!
//! These structs are used to observe and debug matcher behavior:
//!
//! - [`SearchMetrics`] accumulates over the lifetime of one
//!   [`Matcher`](crate::Matcher) (read it with `Matcher::metrics`).
//! - [`MultiMetrics`] describes one [`MultiPatternMatcher`](crate::MultiPatternMatcher)
//!   run, including which patterns the trigger index let through.
//!
//! Collection is always on and cheap: counters plus one `Instant` per search.

use std::ops::AddAssign;
use std::time::Duration;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct SearchMetrics {
    /// Instructions executed by the backtracking machine.
    pub steps: usize,
    /// Choice points resumed after a failure.
    pub backtracks: usize,
    /// Start positions tried.
    pub attempts: usize,
    /// Matches accepted.
    pub matches: usize,
    /// Wall time spent searching.
    pub elapsed: Duration,
}

impl AddAssign<&SearchMetrics> for SearchMetrics {
    fn add_assign(&mut self, other: &SearchMetrics) {
        self.steps += other.steps;
        self.backtracks += other.backtracks;
        self.attempts += other.attempts;
        self.matches += other.matches;
        self.elapsed += other.elapsed;
    }
}

/// Timing and activation counts for one multi-pattern run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MultiMetrics {
    /// Patterns registered with the matcher.
    pub patterns_total: usize,
    /// Patterns whose trigger words occurred in the input (or that have none).
    pub patterns_active: usize,
    /// Candidates kept after de-duplication.
    pub candidates: usize,
    /// Candidates dropped as duplicates of an earlier one.
    pub duplicates: usize,
    /// Summed metrics of every per-pattern search.
    pub search: SearchMetrics,
    /// Total elapsed time for the run, selection included.
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_metrics_accumulate() {
        let mut total = SearchMetrics::default();
        let one =
            SearchMetrics { steps: 10, backtracks: 2, attempts: 3, matches: 1, elapsed: Duration::from_millis(1) };
        total += &one;
        total += &one;
        assert_eq!(total.steps, 20);
        assert_eq!(total.backtracks, 4);
        assert_eq!(total.matches, 2);
        assert_eq!(total.elapsed, Duration::from_millis(2));
    }
}
