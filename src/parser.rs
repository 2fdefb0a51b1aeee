//! Statement parser.
//!
//! Drives the lexer and the grammar engine token by token, and on each
//! completed match slices the raw source line back out through the
//! match spans before handing the pieces to the collector. `import`
//! statements pause the current parse, run a fresh lexer/engine over
//! the imported file and merge the resulting environment.

use crate::error::{ArcanaError, Result, SemanticError, SyntaxError};
use crate::grammar::{Engine, GrammarHalt, Match, RuleId, Span, Step};
use crate::lexer::{Lexer, TokenKind};
use crate::semantic::{CollectError, Collector, Environment};
use std::path::Path;

/// Guards against import cycles.
const MAX_IMPORT_DEPTH: usize = 16;

// Span positions inside each rule, by node index.
mod pos {
    pub mod assign {
        pub const NAME: usize = 0;
        pub const VALUE: usize = 2;
    }
    pub mod join {
        pub const NAME: usize = 0;
        pub const VALUE: usize = 3;
    }
    pub mod attribute {
        pub const NAME: usize = 1;
        pub const OPTIONS: usize = 2;
    }
    pub mod task {
        pub const NAME: usize = 1;
        pub const PARAMS: usize = 3;
        pub const OPEN: usize = 6;
        pub const CLOSE: usize = 8;
    }
    pub mod import {
        pub const SCRIPT: usize = 1;
    }
    pub mod using {
        pub const WHAT: usize = 1;
        pub const OPT: usize = 2;
    }
    pub mod mapping {
        pub const SRC: usize = 1;
        pub const DST: usize = 4;
    }
    pub mod assert {
        pub const KEYWORD: usize = 0;
        pub const LHS: usize = 2;
        pub const OP: usize = 4;
        pub const RHS: usize = 6;
        pub const MSG_REASON: usize = 11;
        pub const MSG_END: usize = 12;
        pub const BARE_REASON: usize = 10;
    }
}

/// Parses one arcfile (and its imports) into an [`Environment`].
///
/// # Errors
///
/// Returns `ArcanaError::Syntax` on grammar failures,
/// `ArcanaError::Semantic` on collection failures and `ArcanaError::Io`
/// when an import target cannot be read.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Environment> {
    let lexer = Lexer::from_file(path)?;
    parse_lexer(lexer, 0)
}

/// Parses in-memory content under a display name.
///
/// # Errors
///
/// See [`parse_file`].
pub fn parse_source(name: &str, content: &str) -> Result<Environment> {
    parse_lexer(Lexer::new(name, content), 0)
}

fn parse_lexer(lexer: Lexer, depth: usize) -> Result<Environment> {
    let mut parser = Parser {
        lexer,
        engine: Engine::new(),
        collector: Collector::new(),
        depth,
    };

    parser.run()?;
    Ok(parser.collector.into_env())
}

struct Parser {
    lexer: Lexer,
    engine: Engine,
    collector: Collector,
    depth: usize,
}

impl Parser {
    fn run(&mut self) -> Result<()> {
        loop {
            let token = self.lexer.next_token();
            let at_eof = token.kind == TokenKind::Eof;

            match self.engine.feed(&token) {
                Step::Matched(m) => self.dispatch(&m)?,
                Step::Error(halt) => return Err(self.syntax_error(&halt)),
                Step::Continue => {}
            }

            if at_eof {
                return Ok(());
            }
        }
    }

    fn dispatch(&mut self, m: &Match) -> Result<()> {
        match m.rule {
            RuleId::VariableAssign => self.on_assign(m, false),
            RuleId::VariableJoin => self.on_assign(m, true),
            RuleId::Attribute => self.on_attribute(m),
            RuleId::TaskDecl => self.on_task(m),
            RuleId::Import => self.on_import(m),
            RuleId::Using => self.on_using(m),
            RuleId::Mapping => self.on_mapping(m),
            RuleId::AssertMsg => self.on_assert(m, true),
            RuleId::AssertBare => self.on_assert(m, false),
            RuleId::EmptyLine => Ok(()),
        }
    }

    /// Slices the raw text a span covers out of its source line.
    fn slice(&self, span: &Span) -> String {
        let Some(token) = &span.token else {
            return String::new();
        };

        let line = self.lexer.line_text(token.line);
        let start = span.start.min(line.len());
        let end = span.end.min(line.len());
        line[start..end].to_string()
    }

    fn statement_line(&self, m: &Match) -> usize {
        m.spans
            .iter()
            .find_map(|s| s.token.as_ref())
            .map_or(0, |t| t.line)
    }

    fn on_assign(&mut self, m: &Match, join: bool) -> Result<()> {
        let (name_pos, value_pos) = if join {
            (pos::join::NAME, pos::join::VALUE)
        } else {
            (pos::assign::NAME, pos::assign::VALUE)
        };

        let name = self.slice(&m.spans[name_pos]);
        let value = self.slice(&m.spans[value_pos]);

        let out = self.collector.collect_assignment(&name, &value, join);
        self.check(out, m)
    }

    fn on_attribute(&mut self, m: &Match) -> Result<()> {
        let name = self.slice(&m.spans[pos::attribute::NAME]);
        let options = self.slice(&m.spans[pos::attribute::OPTIONS]);

        let out = self.collector.collect_attribute(&name, &options);
        self.check(out, m)
    }

    fn on_task(&mut self, m: &Match) -> Result<()> {
        let name = self.slice(&m.spans[pos::task::NAME]);
        let params = self.slice(&m.spans[pos::task::PARAMS]);
        let body = self.task_body(m);

        let out = self.collector.collect_task(&name, &params, body);
        self.check(out, m)
    }

    /// Extracts the instruction lines between the body braces.
    ///
    /// A single-line body yields one instruction; a multiline body
    /// yields one instruction per physical line, whitespace-only lines
    /// dropped.
    fn task_body(&self, m: &Match) -> Vec<String> {
        let mut body = Vec::new();

        let (Some(open), Some(close)) = (
            m.spans[pos::task::OPEN].token.as_ref(),
            m.spans[pos::task::CLOSE].token.as_ref(),
        ) else {
            return body;
        };

        if open.line == close.line {
            let line = self.lexer.line_text(open.line);
            let start = open.end.min(line.len());
            let end = close.start.min(line.len()).max(start);

            let instr = &line[start..end];
            if !instr.trim().is_empty() {
                body.push(instr.to_string());
            }
            return body;
        }

        // First line: everything after the opening brace.
        let first = self.lexer.line_text(open.line);
        if open.end < first.len() {
            let instr = &first[open.end..];
            if !instr.trim().is_empty() {
                body.push(instr.to_string());
            }
        }

        // Middle lines, taken whole.
        for line_no in open.line + 1..close.line {
            let instr = self.lexer.line_text(line_no);
            if !instr.trim().is_empty() {
                body.push(instr.to_string());
            }
        }

        // Last line: everything before the closing brace.
        let last = self.lexer.line_text(close.line);
        let end = close.start.min(last.len());
        if end > 0 {
            let instr = &last[..end];
            if !instr.trim().is_empty() {
                body.push(instr.to_string());
            }
        }

        body
    }

    fn on_import(&mut self, m: &Match) -> Result<()> {
        let script = self.slice(&m.spans[pos::import::SCRIPT]);
        let script = script.trim();

        if self.depth >= MAX_IMPORT_DEPTH {
            return Err(self.semantic_error(
                m,
                CollectError {
                    message: format!("Import of '{script}' exceeds the nesting limit"),
                    hint: None,
                },
            ));
        }

        if script.is_empty() || !Path::new(script).is_file() {
            return Err(self.semantic_error(
                m,
                CollectError {
                    message: format!("Invalid import file '{script}'"),
                    hint: None,
                },
            ));
        }

        tracing::debug!(file = script, "parsing import");

        let lexer = Lexer::from_file(script)?;
        let imported = parse_lexer(lexer, self.depth + 1)?;
        self.collector.env_mut().merge(imported);

        Ok(())
    }

    fn on_using(&mut self, m: &Match) -> Result<()> {
        let what = self.slice(&m.spans[pos::using::WHAT]);
        let opt = self.slice(&m.spans[pos::using::OPT]);

        let out = self.collector.collect_using(&what, &opt);
        self.check(out, m)
    }

    fn on_mapping(&mut self, m: &Match) -> Result<()> {
        let src = self.slice(&m.spans[pos::mapping::SRC]);
        let dst = self.slice(&m.spans[pos::mapping::DST]);

        let out = self.collector.collect_mapping(&src, &dst);
        self.check(out, m)
    }

    fn on_assert(&mut self, m: &Match, quoted_reason: bool) -> Result<()> {
        let (reason_pos, end_pos) = if quoted_reason {
            (pos::assert::MSG_REASON, pos::assert::MSG_END)
        } else {
            (pos::assert::BARE_REASON, pos::assert::BARE_REASON)
        };

        let lhs = self.slice(&m.spans[pos::assert::LHS]);
        let op = self.slice(&m.spans[pos::assert::OP]);
        let rhs = self.slice(&m.spans[pos::assert::RHS]);
        let reason = self.slice(&m.spans[reason_pos]);
        let line = self.statement_line(m);

        // Whole-statement text for diagnostics.
        let text = {
            let start = m.spans[pos::assert::KEYWORD].start;
            let end = m.spans[end_pos].end;
            let source = self.lexer.line_text(line);
            source[start.min(source.len())..end.min(source.len())].to_string()
        };

        let out = self
            .collector
            .collect_assert(line, &text, &lhs, &op, &rhs, reason.trim());
        self.check(out, m)
    }

    fn check(&self, out: std::result::Result<(), CollectError>, m: &Match) -> Result<()> {
        match out {
            Ok(()) => Ok(()),
            Err(err) => Err(self.semantic_error(m, err)),
        }
    }

    fn semantic_error(&self, m: &Match, err: CollectError) -> ArcanaError {
        let line = self.statement_line(m);

        ArcanaError::Semantic(SemanticError {
            file: self.lexer.source().to_string(),
            line,
            source_line: self.lexer.line_text(line).to_string(),
            message: err.message,
            hint: err.hint,
        })
    }

    fn syntax_error(&self, halt: &GrammarHalt) -> ArcanaError {
        let message = if halt.token.kind == TokenKind::Unknown {
            format!("Found undefined symbol: {}", halt.token.lexeme)
        } else {
            format!(
                "Unexpected {} at line {}",
                halt.token.kind.repr(),
                halt.token.line
            )
        };

        ArcanaError::Syntax(SyntaxError {
            file: self.lexer.source().to_string(),
            source_line: self.lexer.line_text(halt.token.line).to_string(),
            token: halt.token.clone(),
            expected: halt.expected.clone(),
            rules: halt.rules.clone(),
            message,
        })
    }
}
