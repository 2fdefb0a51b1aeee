//! Grammar-directed incremental matcher.
//!
//! The engine advances every candidate production rule one token at a
//! time. A rule position is a *terminal node*: a set of acceptable token
//! kinds. Two synthetic kinds get special treatment:
//!
//! - `Any` absorbs tokens until the next fixed node matches (lookahead
//!   decides), with brace-depth tracking so task bodies may contain
//!   nested braces.
//! - `OptNewline` optionally consumes a single newline and otherwise
//!   re-processes the token at the following node.
//!
//! Candidates are visited in rule-registration order and the first rule
//! reaching acceptance wins the statement.

use crate::lexer::{Token, TokenKind};

/// One rule position: the set of token kinds accepted there.
pub type Terminal = Vec<TokenKind>;

/// Identifier of a production rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleId {
    VariableAssign,
    VariableJoin,
    EmptyLine,
    Attribute,
    TaskDecl,
    Import,
    Using,
    Mapping,
    AssertMsg,
    AssertBare,
}

impl RuleId {
    /// Human-readable rule name used in syntax diagnostics.
    #[must_use]
    pub fn repr(self) -> &'static str {
        match self {
            Self::VariableAssign => "Assignment",
            Self::VariableJoin => "Join Assignment",
            Self::EmptyLine => "Empty Line",
            Self::Attribute => "Attribute",
            Self::TaskDecl => "Task Declaration",
            Self::Import => "Import",
            Self::Using => "Using",
            Self::Mapping => "Mapping",
            Self::AssertMsg => "Assert",
            Self::AssertBare => "Assert",
        }
    }
}

/// Fluent rule constructor: `RuleBuilder::start(kind).then(..).or(..)`.
///
/// `then` appends a new terminal node, `or` adds an alternative kind to
/// the last node appended.
struct RuleBuilder {
    nodes: Vec<Terminal>,
}

impl RuleBuilder {
    fn start(kind: TokenKind) -> Self {
        Self {
            nodes: vec![vec![kind]],
        }
    }

    fn then(mut self, kind: TokenKind) -> Self {
        self.nodes.push(vec![kind]);
        self
    }

    fn or(mut self, kind: TokenKind) -> Self {
        self.nodes
            .last_mut()
            .expect("or() requires at least one node")
            .push(kind);
        self
    }
}

/// Matched span for one rule position.
///
/// `start`/`end` are byte columns into the physical line of `token`;
/// for an `Any` region they cover everything the wildcard absorbed.
#[derive(Debug, Clone, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub token: Option<Token>,
    in_any: bool,
}

impl Span {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A completed statement match.
#[derive(Debug, Clone)]
pub struct Match {
    pub rule: RuleId,
    pub spans: Vec<Span>,
}

/// Grammar failure: no candidate rule can accept the current token.
#[derive(Debug, Clone)]
pub struct GrammarHalt {
    /// The offending token.
    pub token: Token,
    /// Union of the terminal nodes tried against the token.
    pub expected: Vec<Terminal>,
    /// Rules still alive when the token arrived.
    pub rules: Vec<RuleId>,
}

/// Outcome of feeding a single token.
#[derive(Debug)]
pub enum Step {
    /// Statement still in progress.
    Continue,
    /// A rule completed; the engine has reset for the next statement.
    Matched(Match),
    /// All candidates died on this token.
    Error(GrammarHalt),
}

struct Candidate {
    id: RuleId,
    nodes: Vec<Terminal>,
    cursor: usize,
    alive: bool,
    spans: Vec<Span>,
}

/// Stateful incremental matcher over the fixed arcfile rule set.
pub struct Engine {
    rules: Vec<Candidate>,
    brace_depth: i32,
    started: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Builds the engine with the full arcfile production set.
    #[must_use]
    pub fn new() -> Self {
        use TokenKind::{
            AngleR, Any, Assert, Assign, At, CurlyL, CurlyR, DQuote, Eof, Eq, Identifier, Import,
            In, Map, Minus, Ne, Newline, OptNewline, Plus, RoundL, RoundR, Semicolon, Task, Using,
        };

        let terminator = |b: RuleBuilder| b.then(Newline).or(Semicolon).or(Eof);

        let variable_assign = terminator(
            RuleBuilder::start(Identifier).then(Assign).then(Any),
        );
        let variable_join = terminator(
            RuleBuilder::start(Identifier).then(Plus).then(Assign).then(Any),
        );
        let empty_line = RuleBuilder::start(Newline).or(Eof);
        let attribute = RuleBuilder::start(At)
            .then(Identifier)
            .then(Any)
            .then(Newline)
            .or(Semicolon);
        let task_decl = terminator(
            RuleBuilder::start(Task)
                .then(Identifier)
                .then(RoundL)
                .then(Any)
                .then(RoundR)
                .then(OptNewline)
                .then(CurlyL)
                .then(Any)
                .then(CurlyR),
        );
        let import = terminator(RuleBuilder::start(Import).then(Any));
        let using = terminator(RuleBuilder::start(Using).then(Identifier).then(Any));
        let mapping = terminator(
            RuleBuilder::start(Map)
                .then(Identifier)
                .then(Minus)
                .then(AngleR)
                .then(Identifier),
        );
        let assert_head = || {
            RuleBuilder::start(Assert)
                .then(DQuote)
                .then(Any)
                .then(DQuote)
                .then(Eq)
                .or(Ne)
                .or(In)
                .then(DQuote)
                .then(Any)
                .then(DQuote)
                .then(Minus)
                .then(AngleR)
        };
        let assert_msg = terminator(assert_head().then(DQuote).then(Any).then(DQuote));
        let assert_bare = terminator(assert_head().then(Any));

        let register = |id: RuleId, b: RuleBuilder| Candidate {
            id,
            spans: vec![Span::default(); b.nodes.len()],
            nodes: b.nodes,
            cursor: 0,
            alive: true,
        };

        // Registration order is the candidate visiting order; the first
        // rule reaching acceptance wins a statement.
        let rules = vec![
            register(RuleId::VariableAssign, variable_assign),
            register(RuleId::VariableJoin, variable_join),
            register(RuleId::EmptyLine, empty_line),
            register(RuleId::Attribute, attribute),
            register(RuleId::TaskDecl, task_decl),
            register(RuleId::Import, import),
            register(RuleId::Using, using),
            register(RuleId::Mapping, mapping),
            register(RuleId::AssertMsg, assert_msg),
            register(RuleId::AssertBare, assert_bare),
        ];

        Self {
            rules,
            brace_depth: 0,
            started: false,
        }
    }

    fn reset(&mut self) {
        for rule in &mut self.rules {
            rule.cursor = 0;
            rule.alive = true;
            for span in &mut rule.spans {
                span.reset();
            }
        }
        self.brace_depth = 0;
        self.started = false;
    }

    /// Feeds one token through every candidate rule.
    pub fn feed(&mut self, token: &Token) -> Step {
        if !self.started {
            self.reset();
            self.started = true;
        }

        let kind = token.kind;
        let mut expected: Vec<Terminal> = Vec::new();
        let mut visited: Vec<RuleId> = Vec::new();
        let mut matched: Option<usize> = None;
        // Rules that consumed the token as a fixed terminal this round;
        // when any did, wildcard absorbers are pruned from the race.
        let mut concrete: Vec<usize> = Vec::new();

        for idx in 0..self.rules.len() {
            if matched.is_some() {
                break;
            }
            if !self.rules[idx].alive {
                continue;
            }

            let done = self.feed_rule(idx, token, kind, &mut expected, &mut visited, &mut concrete);
            if done {
                matched = Some(idx);
            }
        }

        if let Some(idx) = matched {
            let m = Match {
                rule: self.rules[idx].id,
                spans: self.rules[idx].spans.clone(),
            };
            self.reset();
            return Step::Matched(m);
        }

        if !concrete.is_empty() {
            for (idx, rule) in self.rules.iter_mut().enumerate() {
                if rule.alive && !concrete.contains(&idx) {
                    rule.alive = false;
                }
            }
        }

        if self.rules.iter().all(|r| !r.alive) {
            self.reset();
            expected.dedup();
            return Step::Error(GrammarHalt {
                token: token.clone(),
                expected,
                rules: visited,
            });
        }

        Step::Continue
    }

    fn bump_braces(&mut self, is_task_decl: bool, kind: TokenKind) {
        if is_task_decl {
            match kind {
                TokenKind::CurlyL => self.brace_depth += 1,
                TokenKind::CurlyR => self.brace_depth -= 1,
                _ => {}
            }
        }
    }

    /// Advances one candidate. Returns true when the rule completed.
    fn feed_rule(
        &mut self,
        idx: usize,
        token: &Token,
        kind: TokenKind,
        expected: &mut Vec<Terminal>,
        visited: &mut Vec<RuleId>,
        concrete: &mut Vec<usize>,
    ) -> bool {
        let is_task_decl = self.rules[idx].id == RuleId::TaskDecl;

        loop {
            let pos = self.rules[idx].cursor;
            let len = self.rules[idx].nodes.len();
            if pos >= len {
                self.rules[idx].alive = false;
                return false;
            }

            let node = self.rules[idx].nodes[pos].clone();
            if !visited.contains(&self.rules[idx].id) {
                expected.push(node.clone());
                visited.push(self.rules[idx].id);
            }

            if node.contains(&kind) {
                self.bump_braces(is_task_decl, kind);

                let rule = &mut self.rules[idx];
                record(&mut rule.spans[pos], token, false);
                rule.cursor = pos + 1;

                concrete.push(idx);
                return pos + 1 == len;
            }

            if node.contains(&TokenKind::Any) {
                self.bump_braces(is_task_decl, kind);

                let lookahead_hit = self.rules[idx]
                    .nodes
                    .get(pos + 1)
                    .is_some_and(|next| next.contains(&kind));

                // Inside an unbalanced task body the wildcard keeps
                // absorbing even when the lookahead node would accept.
                let absorb = !lookahead_hit || (is_task_decl && self.brace_depth != 0);

                let rule = &mut self.rules[idx];
                if absorb {
                    record(&mut rule.spans[pos], token, true);
                } else {
                    record(&mut rule.spans[pos + 1], token, false);
                    rule.cursor = pos + 2;
                }

                return rule.cursor == len;
            }

            if node.contains(&TokenKind::OptNewline) {
                self.rules[idx].cursor = pos + 1;
                if kind == TokenKind::Newline {
                    return false;
                }
                // Re-process the same token against the next node.
                continue;
            }

            self.rules[idx].alive = false;
            return false;
        }
    }
}

fn record(span: &mut Span, token: &Token, as_any: bool) {
    span.token = Some(token.clone());
    span.end = token.start + token.lexeme.len();

    if as_any {
        if !span.in_any {
            span.start = token.start;
            span.in_any = true;
        }
    } else if span.in_any {
        span.in_any = false;
    } else {
        span.start = token.start;
    }
}
