//! Pattern compiler: source text → [`PatternExpr`] tree.
//!
//! A recursive-descent parser over the lexemes produced by `lexer.rs`. One
//! [`Compiler`] carries the state shared by every string compiled together
//! (and by `$VAR` sources expanded in place):
//!
//! - the next capture group id (ids are handed out when a group *opens*, so
//!   numbering is pre-order and dense);
//! - the name → id bindings;
//! - the chain of variables being expanded, to reject self-reference;
//! - where each group was declared, for errors found after parsing. Groups
//!   that come from an expanded `$VAR` are located at the outermost reference.
//!
//! Validation that needs the whole tree (duplicate names on one path,
//! backreferences to undeclared groups) runs after parsing, so a compile
//! either returns a complete pattern or an error.

use super::env::{Action, Environment, PatternBinding};
use super::error::CompileError;
use super::expr::{Anchor, CompiledPattern, PatternExpr, VarGroupBindings};
use super::lexer::{Lexeme, Tok, tokenize};
use super::node::{AttrTest, Existence, NodePattern, NumOp, anchored_regex};
use std::collections::HashMap;

/// Compile one or more pattern strings into a single pattern. Several strings
/// are matched one after the other and share group numbering; only the last
/// may carry an `=> action` clause.
pub(crate) fn compile_sources(env: &Environment, sources: &[&str]) -> Result<CompiledPattern, CompileError> {
    let mut compiler = Compiler::new(env);
    let mut parts = Vec::with_capacity(sources.len());
    let mut trailing = None;
    for (i, source) in sources.iter().enumerate() {
        let last = i + 1 == sources.len();
        let mut parser = Parser::new(&mut compiler, source)?;
        let expr = parser.parse_alternation()?;
        if parser.peek() == &Tok::Arrow {
            if !last {
                return Err(parser.error("an action clause is only allowed on the last pattern"));
            }
            trailing = Some(parser.parse_action_clause()?);
        }
        parser.expect_end()?;
        parts.push(expr);
    }

    let body = match parts.len() {
        1 => parts.pop().unwrap_or_else(|| PatternExpr::Sequence(Vec::new())),
        _ => PatternExpr::Sequence(parts),
    };
    compiler.validate(&body)?;
    let group_count = compiler.next_group;

    let root = match trailing {
        Some(clause) => {
            let group = compiler.resolve_action_group(&clause)?;
            PatternExpr::with_action(body, clause.action, group)
        }
        None => body,
    };
    Ok(CompiledPattern::build(sources.join(" "), root, compiler.var_groups, group_count))
}

/// The `=> NAME(target)` clause, resolved once the group count is known.
struct ActionClause {
    action: Action,
    target: ActionTarget,
    offset: usize,
}

enum ActionTarget {
    Index(usize),
    Name(String),
}

struct Compiler<'e> {
    env: &'e Environment,
    next_group: usize,
    var_groups: VarGroupBindings,
    expanding: Vec<(String, usize)>,
    backrefs: Vec<(usize, usize)>,
    group_sites: HashMap<usize, usize>,
}

impl<'e> Compiler<'e> {
    fn new(env: &'e Environment) -> Self {
        Compiler {
            env,
            next_group: 1,
            var_groups: VarGroupBindings::new(),
            expanding: Vec::new(),
            backrefs: Vec::new(),
            group_sites: HashMap::new(),
        }
    }

    fn open_group(&mut self, offset: usize) -> usize {
        let id = self.next_group;
        self.next_group += 1;
        self.group_sites.insert(id, self.site(offset));
        id
    }

    /// Offset in the pattern being compiled: inside an expansion, the offset of
    /// the outermost `$VAR` reference.
    fn site(&self, offset: usize) -> usize {
        self.expanding.first().map_or(offset, |(_, at)| *at)
    }

    fn validate(&self, root: &PatternExpr) -> Result<(), CompileError> {
        for &(group, offset) in &self.backrefs {
            if group == 0 || group >= self.next_group {
                return Err(CompileError::InvalidBackreference { group, offset });
            }
        }
        path_names(root, &self.group_sites)?;
        Ok(())
    }

    fn resolve_action_group(&self, clause: &ActionClause) -> Result<usize, CompileError> {
        let group = match &clause.target {
            ActionTarget::Index(group) => *group,
            ActionTarget::Name(name) => match self.var_groups.ids(name).next() {
                Some(group) => group,
                None => return Err(CompileError::UnboundVariable { name: name.clone(), offset: clause.offset }),
            },
        };
        if group >= self.next_group {
            return Err(CompileError::InvalidBackreference { group, offset: clause.offset });
        }
        Ok(group)
    }
}

/// Names declared on the paths through `expr`, each with the id of its last
/// declaration. A name may repeat across the alternatives of an `Or`, but not
/// along one sequential path.
fn path_names(expr: &PatternExpr, sites: &HashMap<usize, usize>) -> Result<HashMap<String, usize>, CompileError> {
    let duplicate = |name: String, id: usize| {
        let offset = sites.get(&id).copied().unwrap_or(0);
        CompileError::DuplicateGroupName { name, offset }
    };
    match expr {
        PatternExpr::Sequence(children) => {
            let mut names = HashMap::new();
            for child in children {
                for (name, id) in path_names(child, sites)? {
                    if names.contains_key(&name) {
                        return Err(duplicate(name, id));
                    }
                    names.insert(name, id);
                }
            }
            Ok(names)
        }
        PatternExpr::Or(children) => {
            let mut names = HashMap::new();
            for child in children {
                names.extend(path_names(child, sites)?);
            }
            Ok(names)
        }
        PatternExpr::Group { child, id, name } => {
            let mut names = path_names(child, sites)?;
            if let Some(name) = name {
                // The nested declaration comes later in the text.
                if let Some(&inner) = names.get(name) {
                    return Err(duplicate(name.clone(), inner));
                }
                names.insert(name.clone(), id.unwrap_or(0));
            }
            Ok(names)
        }
        PatternExpr::Repeat { child, .. } | PatternExpr::Action { child, .. } => path_names(child, sites),
        PatternExpr::Node(_) | PatternExpr::Backref(_) | PatternExpr::MultiNode { .. } | PatternExpr::Anchor(_) => {
            Ok(HashMap::new())
        }
    }
}

struct Parser<'c, 'e, 's> {
    compiler: &'c mut Compiler<'e>,
    src: &'s str,
    toks: Vec<Lexeme>,
    pos: usize,
}

impl<'c, 'e, 's> Parser<'c, 'e, 's> {
    fn new(compiler: &'c mut Compiler<'e>, src: &'s str) -> Result<Self, CompileError> {
        Ok(Parser { compiler, src, toks: tokenize(src)?, pos: 0 })
    }

    // --- Token helpers ---

    fn peek(&self) -> &Tok {
        self.toks.get(self.pos).map_or(&Tok::Eof, |l| &l.tok)
    }

    fn peek_at(&self, ahead: usize) -> &Tok {
        self.toks.get(self.pos + ahead).map_or(&Tok::Eof, |l| &l.tok)
    }

    fn offset(&self) -> usize {
        self.toks.get(self.pos).map_or(self.src.len(), |l| l.offset)
    }

    fn bump(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.toks.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == tok {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> Result<(), CompileError> {
        if self.eat(&tok) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}, found {}", self.peek().describe())))
        }
    }

    fn expect_end(&self) -> Result<(), CompileError> {
        match self.peek() {
            Tok::Eof => Ok(()),
            Tok::RParen => Err(self.error("unbalanced `)`")),
            other => Err(self.error(format!("unexpected {}", other.describe()))),
        }
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::syntax(self.src, self.offset(), message)
    }

    fn regex(&self, source: &str, offset: usize) -> Result<regex::Regex, CompileError> {
        anchored_regex(source, self.compiler.env.string_flags()).map_err(|err| CompileError::InvalidRegex {
            pattern: source.to_string(),
            offset,
            message: err.to_string(),
        })
    }

    // --- Sequence level ---

    fn parse_alternation(&mut self) -> Result<PatternExpr, CompileError> {
        let mut branches = vec![self.parse_sequence()?];
        while self.eat(&Tok::Pipe) {
            branches.push(self.parse_sequence()?);
        }
        Ok(if branches.len() == 1 { branches.remove(0) } else { PatternExpr::Or(branches) })
    }

    fn parse_sequence(&mut self) -> Result<PatternExpr, CompileError> {
        let mut items = Vec::new();
        while !matches!(self.peek(), Tok::Pipe | Tok::RParen | Tok::Arrow | Tok::Eof) {
            let atom = self.parse_atom()?;
            items.push(self.parse_quantifier(atom)?);
        }
        Ok(if items.len() == 1 { items.remove(0) } else { PatternExpr::Sequence(items) })
    }

    fn parse_quantifier(&mut self, atom: PatternExpr) -> Result<PatternExpr, CompileError> {
        let (min, max) = match self.peek() {
            Tok::Star => {
                self.pos += 1;
                (0, None)
            }
            Tok::Plus => {
                self.pos += 1;
                (1, None)
            }
            Tok::Question => {
                self.pos += 1;
                (0, Some(1))
            }
            Tok::LBrace if matches!(self.peek_at(1), Tok::Number(_)) => self.parse_bounds()?,
            _ => return Ok(atom),
        };
        let greedy = !self.eat(&Tok::Question);
        Ok(PatternExpr::repeat(atom, min, max, greedy))
    }

    /// `{n}`, `{n,}` or `{n,m}`.
    fn parse_bounds(&mut self) -> Result<(usize, Option<usize>), CompileError> {
        let offset = self.offset();
        self.expect(Tok::LBrace, "`{`")?;
        let min = self.parse_count()?;
        let max = if self.eat(&Tok::Comma) {
            if matches!(self.peek(), Tok::Number(_)) { Some(self.parse_count()?) } else { None }
        } else {
            Some(min)
        };
        self.expect(Tok::RBrace, "`}`")?;
        if let Some(max) = max {
            if min > max {
                return Err(CompileError::InvalidQuantifier { min, max, offset });
            }
        }
        Ok((min, max))
    }

    fn parse_count(&mut self) -> Result<usize, CompileError> {
        match self.peek().clone() {
            Tok::Number(n) => match n.parse::<usize>() {
                Ok(count) => {
                    self.pos += 1;
                    Ok(count)
                }
                Err(_) => Err(self.error("repetition counts must be non-negative integers")),
            },
            other => Err(self.error(format!("expected a repetition count, found {}", other.describe()))),
        }
    }

    fn parse_atom(&mut self) -> Result<PatternExpr, CompileError> {
        let offset = self.offset();
        match self.peek().clone() {
            Tok::LBracket | Tok::LBrace | Tok::Bang | Tok::Str(_) | Tok::Regex(_) | Tok::Func(_) => {
                Ok(PatternExpr::node(self.parse_element_test()?))
            }
            Tok::LParen => {
                self.pos += 1;
                let id = self.compiler.open_group(offset);
                let child = self.parse_alternation()?;
                self.expect(Tok::RParen, "`)` to close the group")?;
                Ok(PatternExpr::capture(child, id, None))
            }
            Tok::NonCapture => {
                self.pos += 1;
                let child = self.parse_alternation()?;
                self.expect(Tok::RParen, "`)` to close the group")?;
                Ok(PatternExpr::non_capturing(child))
            }
            Tok::NamedGroup(name) => {
                self.pos += 1;
                let id = self.compiler.open_group(offset);
                self.compiler.var_groups.bind(name.clone(), id);
                let child = self.parse_alternation()?;
                self.expect(Tok::RParen, "`)` to close the group")?;
                Ok(PatternExpr::capture(child, id, Some(name)))
            }
            Tok::MultiNode => {
                self.pos += 1;
                self.parse_multi_node()
            }
            Tok::Backref(group) => {
                self.pos += 1;
                self.compiler.backrefs.push((group, offset));
                Ok(PatternExpr::Backref(group))
            }
            Tok::Var(name) => {
                self.pos += 1;
                self.expand_variable(&name, offset)
            }
            Tok::Caret => {
                self.pos += 1;
                Ok(PatternExpr::Anchor(Anchor::Start))
            }
            Tok::Dollar => {
                self.pos += 1;
                Ok(PatternExpr::Anchor(Anchor::End))
            }
            other => Err(self.error(format!("expected an element test, group or literal, found {}", other.describe()))),
        }
    }

    /// `(?m)` already consumed: optional bounds, optional `?`, then the text.
    fn parse_multi_node(&mut self) -> Result<PatternExpr, CompileError> {
        let (min, max) = if self.peek() == &Tok::LBrace { self.parse_bounds()? } else { (1, None) };
        let greedy = !self.eat(&Tok::Question);
        let offset = self.offset();
        let source = match self.bump() {
            Tok::Regex(source) => source,
            Tok::Str(text) => regex::escape(&text),
            other => {
                return Err(CompileError::syntax(
                    self.src,
                    offset,
                    format!("expected a regex or string after `(?m)`, found {}", other.describe()),
                ));
            }
        };
        let text = self.regex(&source, offset)?;
        Ok(PatternExpr::MultiNode { min, max, text, greedy })
    }

    fn expand_variable(&mut self, name: &str, offset: usize) -> Result<PatternExpr, CompileError> {
        if self.compiler.expanding.iter().any(|(n, _)| n == name) {
            return Err(CompileError::RecursiveVariable { name: name.to_string(), offset: self.compiler.site(offset) });
        }
        let binding = match self.compiler.env.pattern(name) {
            Some(binding) => binding.clone(),
            None => return Err(CompileError::UnboundVariable { name: name.to_string(), offset }),
        };
        match binding {
            PatternBinding::Source(source) => {
                self.compiler.expanding.push((name.to_string(), offset));
                let mut inner = Parser::new(&mut *self.compiler, &source)?;
                let expr = inner.parse_alternation()?;
                inner.expect_end()?;
                self.compiler.expanding.pop();
                Ok(expr)
            }
            PatternBinding::Compiled(pattern) => {
                // The inlined pattern's groups 1.. become next_group.. here.
                let shift = self.compiler.next_group - 1;
                let mut expr = pattern.body().clone();
                expr.shift_groups(shift);
                for (var, id) in pattern.var_groups().iter() {
                    self.compiler.var_groups.bind(var, id + shift);
                }
                for _ in 1..pattern.group_count() {
                    self.compiler.open_group(offset);
                }
                Ok(expr)
            }
        }
    }

    // --- Element level ---

    /// One element test: a bracketed expression, a negation, a literal or a
    /// function reference.
    fn parse_element_test(&mut self) -> Result<NodePattern, CompileError> {
        let offset = self.offset();
        match self.bump() {
            Tok::LBracket => self.parse_bracketed(Tok::RBracket, "`]`"),
            Tok::LBrace => self.parse_bracketed(Tok::RBrace, "`}`"),
            Tok::Bang => Ok(self.parse_element_test()?.negate()),
            Tok::Str(text) => Ok(self.default_equals(text)),
            Tok::Regex(source) => self.default_regex(&source, offset),
            Tok::Func(name) => self.function(&name, offset),
            other => Err(CompileError::syntax(
                self.src,
                offset,
                format!("expected an element test, found {}", other.describe()),
            )),
        }
    }

    fn parse_bracketed(&mut self, close: Tok, what: &str) -> Result<NodePattern, CompileError> {
        if self.eat(&close) {
            return Ok(NodePattern::Any);
        }
        let node = self.parse_node_or()?;
        self.expect(close, what)?;
        Ok(node)
    }

    fn parse_node_or(&mut self) -> Result<NodePattern, CompileError> {
        let mut parts = vec![self.parse_node_and()?];
        while self.eat(&Tok::Pipe) {
            parts.push(self.parse_node_and()?);
        }
        Ok(if parts.len() == 1 { parts.remove(0) } else { NodePattern::Disjunction(parts) })
    }

    fn parse_node_and(&mut self) -> Result<NodePattern, CompileError> {
        let mut parts = vec![self.parse_node_unary()?];
        while self.eat(&Tok::Amp) {
            parts.push(self.parse_node_unary()?);
        }
        Ok(if parts.len() == 1 { parts.remove(0) } else { NodePattern::Conjunction(parts) })
    }

    fn parse_node_unary(&mut self) -> Result<NodePattern, CompileError> {
        if self.eat(&Tok::Bang) {
            return Ok(self.parse_node_unary()?.negate());
        }
        if self.eat(&Tok::LParen) {
            let inner = self.parse_node_or()?;
            self.expect(Tok::RParen, "`)`")?;
            return Ok(inner);
        }
        self.parse_term()
    }

    fn parse_term(&mut self) -> Result<NodePattern, CompileError> {
        let offset = self.offset();
        match self.bump() {
            Tok::Ident(name) => {
                let key = self.compiler.env.attribute_key(&name);
                let flags = self.compiler.env.string_flags();
                let value_offset = self.offset();
                match self.bump() {
                    Tok::Colon => match self.bump() {
                        Tok::Str(value) | Tok::Ident(value) | Tok::Number(value) => {
                            Ok(NodePattern::Attribute { key, test: AttrTest::equals(value, flags) })
                        }
                        Tok::Regex(source) => {
                            let offset = self.toks[self.pos - 1].offset;
                            Ok(NodePattern::Attribute { key, test: AttrTest::Matches(self.regex(&source, offset)?) })
                        }
                        other => Err(CompileError::syntax(
                            self.src,
                            value_offset + 1,
                            format!("expected a value after `{name}:`, found {}", other.describe()),
                        )),
                    },
                    Tok::DoubleColon => match self.bump() {
                        Tok::Ident(keyword) => match Existence::from_keyword(&keyword) {
                            Some(check) => Ok(NodePattern::Existence { key, check }),
                            None => Err(CompileError::syntax(
                                self.src,
                                value_offset,
                                format!("unknown existence check `{keyword}`"),
                            )),
                        },
                        other => Err(CompileError::syntax(
                            self.src,
                            value_offset,
                            format!("expected EXISTS, NOT_EXISTS, IS_NIL or NOT_NIL, found {}", other.describe()),
                        )),
                    },
                    Tok::Rel(op) => {
                        let Some(op) = NumOp::from_symbol(&op) else {
                            return Err(CompileError::UnknownRelation { op, offset: value_offset });
                        };
                        match self.bump() {
                            Tok::Number(n) => match n.parse::<f64>() {
                                Ok(rhs) => Ok(NodePattern::Attribute { key, test: AttrTest::Compare(op, rhs) }),
                                Err(_) => Err(CompileError::syntax(self.src, value_offset, "invalid number")),
                            },
                            other => Err(CompileError::syntax(
                                self.src,
                                value_offset,
                                format!("expected a number after the relation, found {}", other.describe()),
                            )),
                        }
                    }
                    other => Err(CompileError::syntax(
                        self.src,
                        value_offset,
                        format!("expected `:`, `::` or a relation after `{name}`, found {}", other.describe()),
                    )),
                }
            }
            Tok::Str(text) => Ok(self.default_equals(text)),
            Tok::Regex(source) => self.default_regex(&source, offset),
            Tok::Func(name) => self.function(&name, offset),
            other => Err(CompileError::syntax(
                self.src,
                offset,
                format!("expected an attribute test, found {}", other.describe()),
            )),
        }
    }

    fn default_equals(&self, text: String) -> NodePattern {
        let env = self.compiler.env;
        NodePattern::Attribute { key: env.default_key().clone(), test: AttrTest::equals(text, env.string_flags()) }
    }

    fn default_regex(&self, source: &str, offset: usize) -> Result<NodePattern, CompileError> {
        Ok(NodePattern::Attribute {
            key: self.compiler.env.default_key().clone(),
            test: AttrTest::Matches(self.regex(source, offset)?),
        })
    }

    fn function(&self, name: &str, offset: usize) -> Result<NodePattern, CompileError> {
        match self.compiler.env.function(name) {
            Some(pattern) => Ok(pattern.clone()),
            None => Err(CompileError::UnboundFunction { name: name.to_string(), offset }),
        }
    }

    // --- Action clause ---

    fn parse_action_clause(&mut self) -> Result<ActionClause, CompileError> {
        self.expect(Tok::Arrow, "`=>`")?;
        let offset = self.offset();
        let name = match self.bump() {
            Tok::Ident(name) => name,
            other => {
                return Err(CompileError::syntax(
                    self.src,
                    offset,
                    format!("expected an action name, found {}", other.describe()),
                ));
            }
        };
        let Some(action) = self.compiler.env.action(&name).cloned() else {
            return Err(CompileError::UnboundAction { name, offset });
        };
        let mut target = ActionTarget::Index(0);
        if self.eat(&Tok::LParen) {
            let target_offset = self.offset();
            match self.bump() {
                Tok::Number(n) => match n.parse::<usize>() {
                    Ok(group) => target = ActionTarget::Index(group),
                    Err(_) => return Err(CompileError::syntax(self.src, target_offset, "invalid group number")),
                },
                Tok::Var(var) => target = ActionTarget::Name(var),
                Tok::RParen => return Ok(ActionClause { action, target, offset }),
                other => {
                    return Err(CompileError::syntax(
                        self.src,
                        target_offset,
                        format!("expected a group number or `$name`, found {}", other.describe()),
                    ));
                }
            }
            self.expect(Tok::RParen, "`)`")?;
        }
        Ok(ActionClause { action, target, offset })
    }
}
