//! Compilation and matching engine.
//!
//! This module is the *public entry point* for the engine. It is split into
//! focused submodules under `src/engine/` while keeping public paths flat
//! (for example `crate::engine::Matcher` and `crate::engine::CompiledPattern`).
//!
//! ## How the parts work together
//!
//! ```text
//! pattern text ── tokenize (lexer.rs)
//!                     │
//!                     v
//!          Parser + Compiler (compiler.rs) ── Environment (env.rs)
//!            - group numbering, $VAR / #NAME resolution
//!            - post-parse validation
//!                     │
//!                     v
//!          PatternExpr tree (expr.rs) of NodePatterns (node.rs)
//!                     │  Program::lower (program.rs)
//!                     v
//!          CompiledPattern ── matcher(&elements) ──> Matcher (matcher.rs)
//!                                                      - choice points, undo log
//!                                                      - step budget
//!                                                      v
//!                                                 MatchResult (result.rs)
//!                                                      │
//!                  MultiPatternMatcher (multi.rs) ─────┤ trigger.rs, dedup.rs
//!                                                      v
//!                                   ranking + selection (ranking.rs)
//! ```
//!
//! ## Responsibilities by module
//!
//! - `lexer.rs` / `compiler.rs`: pattern syntax, resolution against the
//!   environment, error reporting with offsets.
//! - `node.rs`: single-element predicates, evaluated with short-circuiting.
//! - `expr.rs`: the immutable tree, group bookkeeping, `CompiledPattern`.
//! - `program.rs`: lowering to a flat instruction list.
//! - `matcher.rs`: the backtracking machine and the search cursor.
//! - `result.rs`: accepted matches and group accessors.
//! - `ranking.rs`: comparators and non-overlapping selection.
//! - `multi.rs`, `trigger.rs`, `dedup.rs`: many patterns over one input.
//! - `metrics.rs`: counters and timings for searches and runs.
//!
//! ## Debugging
//!
//! The engine emits `tracing` events: `debug` for compiled patterns, accepted
//! matches, aborted searches, trigger selection and multi-pattern runs;
//! `trace` for every start position attempted. The CLI installs a subscriber
//! when `RUST_LOG` is set.

#[path = "engine/compiler.rs"]
mod compiler;
#[path = "engine/dedup.rs"]
mod dedup;
#[path = "engine/env.rs"]
mod env;
#[path = "engine/error.rs"]
mod error;
#[path = "engine/expr.rs"]
mod expr;
#[path = "engine/lexer.rs"]
mod lexer;
#[path = "engine/matcher.rs"]
mod matcher;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/multi.rs"]
mod multi;
#[path = "engine/node.rs"]
mod node;
#[path = "engine/program.rs"]
mod program;
#[path = "engine/ranking.rs"]
mod ranking;
#[path = "engine/result.rs"]
mod result;
#[path = "engine/trigger.rs"]
mod trigger;

#[cfg(test)]
#[path = "engine/tests.rs"]
mod tests;

pub(crate) use compiler::compile_sources;
pub use env::{Action, ActionFn, Environment, PatternBinding};
pub use error::{CompileError, MatchError, PredicateError};
pub use expr::{Anchor, CompiledPattern, PatternExpr, VarGroupBindings};
pub use matcher::{FindIter, Matcher};
pub use metrics::{MultiMetrics, SearchMetrics};
pub use multi::{MultiPatternMatcher, MultiRun};
pub use node::{AttrTest, Existence, NodeFunction, NodePattern, NumOp, StringMatchFlags, Verdict};
pub use ranking::{
    Comparator, ComparatorChain, Ranked, by_length, by_offset, by_order, by_score, default_order,
    select_non_overlapping,
};
pub use result::{GroupId, MatchResult, Stringifier, join_text};
