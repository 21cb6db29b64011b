//! Lowering of a [`PatternExpr`] tree into a flat instruction list.
//!
//! The matcher never recurses over the tree. Instead every construct that
//! can be retried becomes an explicit choice point at run time:
//!
//! ```text
//! A | B            Split(L1, L2)
//!                  L1: <A>  Jump(end)
//!                  L2: <B>
//!                  end:
//!
//! X{min,max}       RepeatInit(r)
//!                  head: RepeatLoop(r, min, max, greedy, exit)
//!                        <X>
//!                        RepeatNext(r, min, head)
//!                  exit:
//! ```
//!
//! Repeat counters live in registers (one per repeat node) so nested and
//! bounded repetitions need no unrolling.

use super::env::Action;
use super::expr::{Anchor, PatternExpr};
use super::node::NodePattern;
use regex::Regex;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Inst {
    /// Consume one element satisfying `nodes[idx]`.
    Node(usize),
    /// Continue at `primary`; on backtrack resume at `alternate`.
    Split { primary: usize, alternate: usize },
    Jump(usize),
    GroupOpen(usize),
    GroupClose(usize),
    Backref(usize),
    RepeatInit(usize),
    RepeatLoop { reg: usize, min: usize, max: Option<usize>, greedy: bool, exit: usize },
    RepeatNext { reg: usize, min: usize, head: usize },
    /// Consume `min..=max` elements whose rendering matches `texts[text]`.
    MultiNode { text: usize, min: usize, max: Option<usize>, greedy: bool },
    /// Record `actions[action]` for `group`, fired only on acceptance.
    ActionMark { action: usize, group: usize },
    Assert(Anchor),
    Match,
}

#[derive(Debug, Clone)]
pub(crate) struct Program {
    pub insts: Vec<Inst>,
    pub nodes: Vec<NodePattern>,
    pub texts: Vec<Regex>,
    pub actions: Vec<Action>,
    pub registers: usize,
}

impl Program {
    pub fn lower(root: &PatternExpr) -> Self {
        let mut program =
            Program { insts: Vec::new(), nodes: Vec::new(), texts: Vec::new(), actions: Vec::new(), registers: 0 };
        program.emit_expr(root, true);
        program.emit(Inst::Match);
        program
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    fn emit(&mut self, inst: Inst) -> usize {
        self.insts.push(inst);
        self.insts.len() - 1
    }

    /// `greedy` is the preference inherited from enclosing repetitions; a
    /// multi-element span inside a reluctant repeat prefers short spans.
    fn emit_expr(&mut self, expr: &PatternExpr, greedy: bool) {
        match expr {
            PatternExpr::Node(node) => {
                self.nodes.push(node.clone());
                self.emit(Inst::Node(self.nodes.len() - 1));
            }
            PatternExpr::Sequence(children) => {
                for child in children {
                    self.emit_expr(child, greedy);
                }
            }
            PatternExpr::Or(children) => self.emit_alternation(children, greedy),
            PatternExpr::Repeat { child, min, max, greedy: own } => {
                match (*min, *max) {
                    (_, Some(0)) => {}
                    (1, Some(1)) => self.emit_expr(child, greedy),
                    _ => self.emit_repeat(child, *min, *max, *own, greedy),
                }
            }
            PatternExpr::Group { child, id, .. } => match id {
                Some(id) => {
                    self.emit(Inst::GroupOpen(*id));
                    self.emit_expr(child, greedy);
                    self.emit(Inst::GroupClose(*id));
                }
                None => self.emit_expr(child, greedy),
            },
            PatternExpr::Backref(id) => {
                self.emit(Inst::Backref(*id));
            }
            PatternExpr::MultiNode { min, max, text, greedy: own } => {
                self.texts.push(text.clone());
                self.emit(Inst::MultiNode { text: self.texts.len() - 1, min: *min, max: *max, greedy: *own && greedy });
            }
            PatternExpr::Action { child, action, group } => {
                self.emit_expr(child, greedy);
                self.actions.push(action.clone());
                self.emit(Inst::ActionMark { action: self.actions.len() - 1, group: *group });
            }
            PatternExpr::Anchor(anchor) => {
                self.emit(Inst::Assert(*anchor));
            }
        }
    }

    fn emit_alternation(&mut self, children: &[PatternExpr], greedy: bool) {
        let Some((last, rest)) = children.split_last() else {
            return;
        };
        let mut exits = Vec::with_capacity(rest.len());
        for child in rest {
            let split = self.emit(Inst::Split { primary: 0, alternate: 0 });
            let primary = self.insts.len();
            self.emit_expr(child, greedy);
            exits.push(self.emit(Inst::Jump(0)));
            let alternate = self.insts.len();
            self.insts[split] = Inst::Split { primary, alternate };
        }
        self.emit_expr(last, greedy);
        let end = self.insts.len();
        for exit in exits {
            self.insts[exit] = Inst::Jump(end);
        }
    }

    fn emit_repeat(&mut self, child: &PatternExpr, min: usize, max: Option<usize>, own: bool, greedy: bool) {
        let reg = self.registers;
        self.registers += 1;
        self.emit(Inst::RepeatInit(reg));
        let head = self.emit(Inst::RepeatLoop { reg, min, max, greedy: own, exit: 0 });
        self.emit_expr(child, own && greedy);
        self.emit(Inst::RepeatNext { reg, min, head });
        let exit = self.insts.len();
        self.insts[head] = Inst::RepeatLoop { reg, min, max, greedy: own, exit };
    }
}
