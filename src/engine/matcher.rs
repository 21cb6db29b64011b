//! Backtracking search over element sequences.
//!
//! A [`Matcher`] binds one [`CompiledPattern`] to one input sequence and holds
//! the search cursor. The engine itself is an iterative machine over the
//! lowered program (`program.rs`):
//!
//! - alternatives and repetition choices push *choice points*;
//! - every write to a group slot or repeat register is recorded in an undo
//!   log, so resuming a choice point rolls state back exactly;
//! - side effects (custom-function payloads, action firings) go to a trail
//!   that is truncated on backtrack and only read once a match is accepted.
//!
//! No recursion means no stack overflow on long inputs or deeply nested
//! repetitions. Worst-case time is still exponential for pathological
//! patterns; use [`MatchOptions::max_steps`] to bound it.

use super::error::MatchError;
use super::expr::{Anchor, CompiledPattern};
use super::metrics::SearchMetrics;
use super::node::Verdict;
use super::program::{Inst, Program};
use super::result::{MatchResult, Stringifier, join_text};
use crate::api::{FindType, MatchOptions};
use crate::{Element, Span, Value};
use std::rc::Rc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, Default)]
struct RepeatState {
    count: usize,
    iter_start: usize,
}

enum Undo {
    Slot { index: usize, old: Option<usize> },
    Register { reg: usize, old: RepeatState },
}

enum Resume {
    /// Continue at `pc`.
    At(usize),
    /// Enter the body of a reluctant repeat whose head is at `pc`.
    EnterBody { pc: usize, reg: usize },
    /// Retry the multi-element span at `pc` with the next length from `len`.
    SpanLength { pc: usize, len: usize },
}

struct ChoicePoint {
    resume: Resume,
    pos: usize,
    undo_len: usize,
    trail_len: usize,
}

enum TrailEntry {
    Payload { index: usize, value: Value<'static> },
    Fire { action: usize, group: usize },
}

/// Per-search step accounting.
struct Budget {
    limit: Option<usize>,
    steps: usize,
    backtracks: usize,
}

/// Where a successful run ended; captures stay in the machine.
struct Accepted {
    end: usize,
}

/// Reusable machine state. Buffers keep their capacity across runs.
#[derive(Default)]
struct Machine {
    slots: Vec<Option<usize>>,
    regs: Vec<RepeatState>,
    undo: Vec<Undo>,
    stack: Vec<ChoicePoint>,
    trail: Vec<TrailEntry>,
}

impl Machine {
    fn reset(&mut self, program: &Program, group_count: usize) {
        self.slots.clear();
        self.slots.resize(group_count * 2, None);
        self.regs.clear();
        self.regs.resize(program.registers, RepeatState::default());
        self.undo.clear();
        self.stack.clear();
        self.trail.clear();
    }

    fn set_slot(&mut self, index: usize, value: Option<usize>) {
        self.undo.push(Undo::Slot { index, old: self.slots[index] });
        self.slots[index] = value;
    }

    fn set_reg(&mut self, reg: usize, state: RepeatState) {
        self.undo.push(Undo::Register { reg, old: self.regs[reg] });
        self.regs[reg] = state;
    }

    fn push_choice(&mut self, resume: Resume, pos: usize) {
        self.stack.push(ChoicePoint { resume, pos, undo_len: self.undo.len(), trail_len: self.trail.len() });
    }

    fn rollback(&mut self, undo_len: usize, trail_len: usize) {
        while self.undo.len() > undo_len {
            match self.undo.pop() {
                Some(Undo::Slot { index, old }) => self.slots[index] = old,
                Some(Undo::Register { reg, old }) => self.regs[reg] = old,
                None => break,
            }
        }
        self.trail.truncate(trail_len);
    }

    /// Next span length to try for a multi-element node, starting at `from`
    /// and moving away from the preferred end.
    #[allow(clippy::too_many_arguments)]
    fn span_length(
        &self,
        program: &Program,
        elements: &[&dyn Element],
        stringify: Stringifier,
        text: usize,
        pos: usize,
        (min, max): (usize, Option<usize>),
        greedy: bool,
        from: Option<usize>,
    ) -> Option<usize> {
        let available = elements.len() - pos;
        let hi = max.map_or(available, |m| m.min(available));
        if min > hi {
            return None;
        }
        let accepts = |len: usize| program.texts[text].is_match(&stringify(&elements[pos..pos + len]));
        if greedy {
            let from = from.unwrap_or(hi);
            (min..=from.min(hi)).rev().find(|&len| accepts(len))
        } else {
            let from = from.unwrap_or(min);
            (from.max(min)..=hi).find(|&len| accepts(len))
        }
    }

    /// Run the program from `start`. With `end` set, only a match ending
    /// exactly there is accepted.
    fn run(
        &mut self,
        program: &Program,
        elements: &[&dyn Element],
        stringify: Stringifier,
        start: usize,
        end: Option<usize>,
        budget: &mut Budget,
    ) -> Result<Option<Accepted>, MatchError> {
        let n = elements.len();
        let mut pc = 0;
        let mut pos = start;
        loop {
            budget.steps += 1;
            if let Some(limit) = budget.limit {
                if budget.steps > limit {
                    return Err(MatchError::StepLimit { limit });
                }
            }

            let advanced = match &program.insts[pc] {
                Inst::Node(idx) => {
                    if pos < n {
                        match program.nodes[*idx].test_with_result(elements[pos])? {
                            Verdict::Reject => false,
                            Verdict::Accept => {
                                pos += 1;
                                pc += 1;
                                true
                            }
                            Verdict::AcceptWith(value) => {
                                self.trail.push(TrailEntry::Payload { index: pos, value });
                                pos += 1;
                                pc += 1;
                                true
                            }
                        }
                    } else {
                        false
                    }
                }
                Inst::Split { primary, alternate } => {
                    self.push_choice(Resume::At(*alternate), pos);
                    pc = *primary;
                    true
                }
                Inst::Jump(target) => {
                    pc = *target;
                    true
                }
                Inst::GroupOpen(g) => {
                    self.set_slot(2 * g, Some(pos));
                    self.set_slot(2 * g + 1, None);
                    pc += 1;
                    true
                }
                Inst::GroupClose(g) => {
                    self.set_slot(2 * g + 1, Some(pos));
                    pc += 1;
                    true
                }
                Inst::Backref(g) => match (self.slots[2 * g], self.slots[2 * g + 1]) {
                    (Some(b), Some(e)) if e >= b => {
                        let len = e - b;
                        if pos + len <= n && (0..len).all(|i| elements[b + i].text() == elements[pos + i].text()) {
                            pos += len;
                            pc += 1;
                            true
                        } else {
                            false
                        }
                    }
                    _ => false,
                },
                Inst::RepeatInit(reg) => {
                    self.set_reg(*reg, RepeatState { count: 0, iter_start: pos });
                    pc += 1;
                    true
                }
                Inst::RepeatLoop { reg, min, max, greedy, exit } => {
                    let count = self.regs[*reg].count;
                    if count < *min {
                        self.set_reg(*reg, RepeatState { count, iter_start: pos });
                        pc += 1;
                    } else if *max == Some(count) {
                        pc = *exit;
                    } else if *greedy {
                        self.push_choice(Resume::At(*exit), pos);
                        self.set_reg(*reg, RepeatState { count, iter_start: pos });
                        pc += 1;
                    } else {
                        self.push_choice(Resume::EnterBody { pc, reg: *reg }, pos);
                        pc = *exit;
                    }
                    true
                }
                Inst::RepeatNext { reg, min, head } => {
                    let state = self.regs[*reg];
                    // An iteration past the minimum that consumed nothing
                    // would loop forever.
                    if pos == state.iter_start && state.count >= *min {
                        false
                    } else {
                        self.set_reg(*reg, RepeatState { count: state.count + 1, iter_start: state.iter_start });
                        pc = *head;
                        true
                    }
                }
                Inst::MultiNode { text, min, max, greedy } => {
                    match self.span_length(program, elements, stringify, *text, pos, (*min, *max), *greedy, None) {
                        Some(len) => {
                            self.push_span_retry(pc, pos, len, *min, *greedy);
                            pos += len;
                            pc += 1;
                            true
                        }
                        None => false,
                    }
                }
                Inst::ActionMark { action, group } => {
                    self.trail.push(TrailEntry::Fire { action: *action, group: *group });
                    pc += 1;
                    true
                }
                Inst::Assert(Anchor::Start) => {
                    pc += 1;
                    pos == 0
                }
                Inst::Assert(Anchor::End) => {
                    pc += 1;
                    pos == n
                }
                Inst::Match => {
                    if end.is_none_or(|e| e == pos) {
                        return Ok(Some(Accepted { end: pos }));
                    }
                    false
                }
            };

            if advanced {
                continue;
            }

            // Backtrack to the most recent choice point that can still move.
            loop {
                let Some(choice) = self.stack.pop() else {
                    return Ok(None);
                };
                budget.backtracks += 1;
                self.rollback(choice.undo_len, choice.trail_len);
                pos = choice.pos;
                match choice.resume {
                    Resume::At(target) => {
                        pc = target;
                        break;
                    }
                    Resume::EnterBody { pc: head, reg } => {
                        let count = self.regs[reg].count;
                        self.set_reg(reg, RepeatState { count, iter_start: pos });
                        pc = head + 1;
                        break;
                    }
                    Resume::SpanLength { pc: at, len } => {
                        let Inst::MultiNode { text, min, max, greedy } = &program.insts[at] else {
                            continue;
                        };
                        let bounds = (*min, *max);
                        let retry =
                            self.span_length(program, elements, stringify, *text, pos, bounds, *greedy, Some(len));
                        if let Some(len) = retry {
                            self.push_span_retry(at, pos, len, *min, *greedy);
                            pos += len;
                            pc = at + 1;
                            break;
                        }
                    }
                }
            }
        }
    }

    fn push_span_retry(&mut self, pc: usize, pos: usize, len: usize, min: usize, greedy: bool) {
        if greedy {
            if len > min {
                self.push_choice(Resume::SpanLength { pc, len: len - 1 }, pos);
            }
        } else {
            self.push_choice(Resume::SpanLength { pc, len: len + 1 }, pos);
        }
    }

    fn spans(&self, start: usize, end: usize, group_count: usize) -> Vec<Option<Span>> {
        let mut spans = Vec::with_capacity(group_count);
        spans.push(Some(Span::new(start, end)));
        for g in 1..group_count {
            spans.push(match (self.slots[2 * g], self.slots[2 * g + 1]) {
                (Some(b), Some(e)) if e >= b => Some(Span::new(b, e)),
                _ => None,
            });
        }
        spans
    }
}

/// A search over one sequence with one pattern.
///
/// Not thread-safe; create one matcher per thread. The compiled pattern
/// itself can be shared freely.
pub struct Matcher<'a> {
    pattern: CompiledPattern,
    elements: Rc<[&'a dyn Element]>,
    options: MatchOptions,
    stringifier: Stringifier,
    cursor: usize,
    exhausted: bool,
    produced: usize,
    machine: Machine,
    metrics: SearchMetrics,
}

impl<'a> Matcher<'a> {
    pub fn new<E: Element>(pattern: CompiledPattern, elements: &'a [E]) -> Self {
        let elements: Rc<[&'a dyn Element]> = elements.iter().map(|el| el as &dyn Element).collect();
        Self::from_shared(pattern, elements)
    }

    pub(crate) fn from_shared(pattern: CompiledPattern, elements: Rc<[&'a dyn Element]>) -> Self {
        Matcher {
            pattern,
            elements,
            options: MatchOptions::default(),
            stringifier: join_text,
            cursor: 0,
            exhausted: false,
            produced: 0,
            machine: Machine::default(),
            metrics: SearchMetrics::default(),
        }
    }

    pub fn with_options(mut self, options: MatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Override how runs of elements are rendered for multi-element spans
    /// and group text.
    pub fn with_stringifier(mut self, stringifier: Stringifier) -> Self {
        self.stringifier = stringifier;
        self
    }

    pub fn pattern(&self) -> &CompiledPattern {
        &self.pattern
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn metrics(&self) -> &SearchMetrics {
        &self.metrics
    }

    /// Next match at or after the cursor. `Ok(None)` once there are no more;
    /// searching again after that is an error until [`reset`](Self::reset).
    pub fn find(&mut self) -> Result<Option<MatchResult<'a>>, MatchError> {
        if self.exhausted {
            return Err(MatchError::Exhausted);
        }
        match self.search(self.cursor)? {
            Some(found) => {
                self.cursor = match self.options.find_type {
                    FindType::NonOverlapping if found.is_empty() => found.end() + 1,
                    FindType::NonOverlapping => found.end(),
                    FindType::All => found.start() + 1,
                };
                Ok(Some(found))
            }
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    /// Move the cursor to `pos` and search from there.
    pub fn find_from(&mut self, pos: usize) -> Result<Option<MatchResult<'a>>, MatchError> {
        self.check_position(pos)?;
        self.cursor = pos;
        self.exhausted = false;
        self.find()
    }

    /// Whether the whole sequence matches.
    pub fn matches(&mut self) -> Result<Option<MatchResult<'a>>, MatchError> {
        let n = self.elements.len();
        self.attempt_range(0..1, Some(n))
    }

    /// Whether a match starts exactly at `pos` (it may end anywhere).
    pub fn matches_at(&mut self, pos: usize) -> Result<Option<MatchResult<'a>>, MatchError> {
        self.check_position(pos)?;
        self.attempt_range(pos..pos + 1, None)
    }

    /// All remaining matches, from the start of the sequence.
    pub fn find_all(&mut self) -> FindIter<'_, 'a> {
        self.reset();
        FindIter { matcher: self, done: false }
    }

    /// Rewind the cursor to the start and clear exhaustion. Metrics keep
    /// accumulating.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.exhausted = false;
    }

    fn check_position(&self, pos: usize) -> Result<(), MatchError> {
        let len = self.elements.len();
        if pos > len {
            return Err(MatchError::PositionOutOfRange { pos, len });
        }
        Ok(())
    }

    fn search(&mut self, from: usize) -> Result<Option<MatchResult<'a>>, MatchError> {
        let n = self.elements.len();
        if from > n {
            return Ok(None);
        }
        self.attempt_range(from..n + 1, None)
    }

    fn attempt_range(
        &mut self,
        starts: std::ops::Range<usize>,
        end: Option<usize>,
    ) -> Result<Option<MatchResult<'a>>, MatchError> {
        let timer = Instant::now();
        let mut budget = Budget { limit: self.options.max_steps, steps: 0, backtracks: 0 };
        let program = self.pattern.program();
        let group_count = self.pattern.group_count();
        let mut outcome = Ok(None);
        for start in starts {
            self.metrics.attempts += 1;
            tracing::trace!(start, steps = budget.steps, "attempt");
            self.machine.reset(program, group_count);
            match self.machine.run(program, &self.elements, self.stringifier, start, end, &mut budget) {
                Ok(Some(accepted)) => {
                    outcome = Ok(Some((start, accepted)));
                    break;
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::debug!(pattern = %self.pattern.source(), start, error = %err, "search aborted");
                    outcome = Err(err);
                    break;
                }
            }
        }
        self.metrics.steps += budget.steps;
        self.metrics.backtracks += budget.backtracks;
        self.metrics.elapsed += timer.elapsed();
        match outcome? {
            Some((start, accepted)) => Ok(Some(self.accept(start, accepted.end))),
            None => Ok(None),
        }
    }

    /// Build the result for an accepted run, then fire the actions on its
    /// path in the order they were reached.
    fn accept(&mut self, start: usize, end: usize) -> MatchResult<'a> {
        let program = self.pattern.program();
        let spans = self.machine.spans(start, end, self.pattern.group_count());
        let payloads = self
            .machine
            .trail
            .iter()
            .filter_map(|entry| match entry {
                TrailEntry::Payload { index, value } => Some((*index, value.clone())),
                TrailEntry::Fire { .. } => None,
            })
            .collect();
        let mut result = MatchResult::new(
            Rc::clone(&self.elements),
            spans,
            self.pattern.shared_var_groups(),
            payloads,
            self.stringifier,
        );
        result.set_score(self.pattern.score());
        result.set_order(self.produced);
        self.produced += 1;
        self.metrics.matches += 1;
        tracing::debug!(pattern = %self.pattern.source(), start, end, "match accepted");

        for entry in &self.machine.trail {
            if let TrailEntry::Fire { action, group } = entry {
                program.actions[*action].apply(&result, *group);
            }
        }
        result
    }
}

/// Iterator over successive matches; see [`Matcher::find_all`].
///
/// Yields each error once and then stops.
pub struct FindIter<'m, 'a> {
    matcher: &'m mut Matcher<'a>,
    done: bool,
}

impl<'a> Iterator for FindIter<'_, 'a> {
    type Item = Result<MatchResult<'a>, MatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.matcher.find() {
            Ok(Some(found)) => Some(Ok(found)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NodePattern, PatternExpr, Token};
    use pretty_assertions::assert_eq;

    fn words(text: &str) -> Vec<Token> {
        text.split_whitespace().map(Token::new).collect()
    }

    fn word(w: &str) -> PatternExpr {
        PatternExpr::node(NodePattern::text(w))
    }

    fn pattern(root: PatternExpr) -> CompiledPattern {
        CompiledPattern::from_expr("test", root).unwrap()
    }

    #[test]
    fn sequence_is_found_after_skipping() {
        let tokens = words("the quick brown fox");
        let p = pattern(PatternExpr::Sequence(vec![word("quick"), word("brown")]));
        let mut m = p.matcher(&tokens);
        let found = m.find().unwrap().unwrap();
        assert_eq!(found.span(), Span::new(1, 3));
        assert_eq!(m.find().unwrap().map(|r| r.span()), None);
        assert_eq!(m.find().unwrap_err(), MatchError::Exhausted);
        m.reset();
        assert!(m.find().unwrap().is_some());
    }

    #[test]
    fn greedy_and_reluctant_repetition() {
        let tokens = words("a a a b");
        let greedy = pattern(PatternExpr::repeat(word("a"), 1, None, true));
        assert_eq!(greedy.matcher(&tokens).find().unwrap().unwrap().span(), Span::new(0, 3));
        let lazy = pattern(PatternExpr::repeat(word("a"), 1, None, false));
        assert_eq!(lazy.matcher(&tokens).find().unwrap().unwrap().span(), Span::new(0, 1));
    }

    #[test]
    fn bounded_repetition_backtracks_into_the_loop() {
        let tokens = words("a a a a");
        let p = pattern(PatternExpr::Sequence(vec![PatternExpr::repeat(word("a"), 2, Some(3), true), word("a")]));
        assert_eq!(p.matcher(&tokens).find().unwrap().unwrap().span(), Span::new(0, 4));
    }

    #[test]
    fn nested_empty_repetition_terminates() {
        let tokens = words("b b");
        let inner = PatternExpr::repeat(word("a"), 0, None, true);
        let p = pattern(PatternExpr::Sequence(vec![PatternExpr::repeat(inner, 0, None, true), word("b")]));
        assert_eq!(p.matcher(&tokens).find().unwrap().unwrap().span(), Span::new(0, 1));
    }

    #[test]
    fn whole_sequence_and_anchored_start() {
        let tokens = words("a b");
        let p = pattern(PatternExpr::repeat(PatternExpr::node(NodePattern::Any), 0, None, false));
        assert_eq!(p.matcher(&tokens).matches().unwrap().unwrap().span(), Span::new(0, 2));
        let b = pattern(word("b"));
        assert!(b.matcher(&tokens).matches_at(0).unwrap().is_none());
        assert_eq!(b.matcher(&tokens).matches_at(1).unwrap().unwrap().span(), Span::new(1, 2));
        assert_eq!(b.matcher(&tokens).matches_at(3).unwrap_err(), MatchError::PositionOutOfRange { pos: 3, len: 2 });
    }

    #[test]
    fn empty_matches_advance_the_cursor() {
        let tokens = words("x y");
        let p = pattern(PatternExpr::repeat(word("a"), 0, None, true));
        let mut m = p.matcher(&tokens);
        let spans: Vec<Span> = m.find_all().map(|r| r.unwrap().span()).collect();
        assert_eq!(spans, vec![Span::new(0, 0), Span::new(1, 1), Span::new(2, 2)]);
    }

    #[test]
    fn find_type_all_restarts_after_each_start() {
        let tokens = words("a a a");
        let p = pattern(PatternExpr::repeat(word("a"), 2, None, true));
        let mut m = p.matcher(&tokens).with_options(MatchOptions { find_type: FindType::All, max_steps: None });
        let spans: Vec<Span> = m.find_all().map(|r| r.unwrap().span()).collect();
        assert_eq!(spans, vec![Span::new(0, 3), Span::new(1, 3)]);
    }

    #[test]
    fn step_limit_aborts() {
        let tokens = words("a a a a a a a a a a a a a a a a b");
        let inner = PatternExpr::repeat(word("a"), 1, None, true);
        let p = pattern(PatternExpr::Sequence(vec![PatternExpr::repeat(inner, 1, None, true), word("c")]));
        let mut m = p.matcher(&tokens).with_options(MatchOptions { max_steps: Some(500), ..MatchOptions::default() });
        assert_eq!(m.find().unwrap_err(), MatchError::StepLimit { limit: 500 });
    }

    #[test]
    fn metrics_accumulate() {
        let tokens = words("x a");
        let p = pattern(word("a"));
        let mut m = p.matcher(&tokens);
        m.find().unwrap();
        assert_eq!(m.metrics().attempts, 2);
        assert_eq!(m.metrics().matches, 1);
        assert!(m.metrics().steps >= 2);
    }
}
