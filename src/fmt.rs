//! Human-friendly diagnostic formatters.
//!
//! Each `fmt_*` function renders one error family for terminal
//! display. When `color` is true, ANSI escape codes are emitted via
//! `owo_colors`. Every diagnostic names the source file and line and
//! reproduces the offending source line.

use crate::error::{PostProcessError, SemanticError, SyntaxError};
use crate::grammar::Terminal;
use crate::jobs::JobList;
use crate::lexer::TokenKind;
use owo_colors::OwoColorize;
use std::io::{self, Write};

fn terminal_repr(node: &Terminal, color: bool) -> String {
    node.iter()
        .map(|kind| {
            if color {
                kind.repr().green().to_string()
            } else {
                kind.repr().to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" or ")
}

fn expected_repr(expected: &[Terminal], color: bool) -> String {
    expected
        .iter()
        .map(|node| terminal_repr(node, color))
        .collect::<Vec<_>>()
        .join(" or ")
}

/// Renders a syntax error with the offending line and a caret run
/// under the offending token.
pub fn fmt_syntax_error(w: &mut impl Write, err: &SyntaxError, color: bool) -> io::Result<()> {
    let label = if color {
        "SYNTAX ERROR".bright_red().to_string()
    } else {
        "SYNTAX ERROR".to_string()
    };

    writeln!(
        w,
        "[{label}] In file {}, line {}: {}",
        err.file, err.token.line, err.source_line
    )?;

    let pad = " ".repeat(err.token.start);
    let carets = "^".repeat((err.token.end - err.token.start).max(1));
    writeln!(w, "{}{pad}{carets}", " ".repeat(2))?;

    let found = if err.token.lexeme == "\n" {
        "<New Line>".to_string()
    } else {
        err.token.lexeme.clone()
    };

    if err.token.kind == TokenKind::Unknown {
        writeln!(w, "Found undefined symbol: {found}")?;
        return Ok(());
    }

    if color {
        writeln!(w, "Found:    {} ({})", found.bright_red(), err.token.kind.repr())?;
    } else {
        writeln!(w, "Found:    {found} ({})", err.token.kind.repr())?;
    }

    let rules = err
        .rules
        .iter()
        .map(|r| {
            if color {
                r.repr().cyan().to_string()
            } else {
                r.repr().to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(", ");

    writeln!(
        w,
        "Expected: {} for statement(s): {rules}",
        expected_repr(&err.expected, color)
    )?;

    Ok(())
}

/// Renders a semantic error with its source line and optional
/// closest-match hint.
pub fn fmt_semantic_error(w: &mut impl Write, err: &SemanticError, color: bool) -> io::Result<()> {
    let label = if color {
        "SEMANTIC ERROR".bright_red().to_string()
    } else {
        "SEMANTIC ERROR".to_string()
    };

    writeln!(
        w,
        "[{label}] In file {}, line {}: {}",
        err.file, err.line, err.source_line
    )?;
    writeln!(w, "{}", err.message)?;

    if let Some(hint) = &err.hint {
        fmt_hint(w, hint, color)?;
    }

    Ok(())
}

/// Renders a post-processing error.
pub fn fmt_postprocess_error(
    w: &mut impl Write,
    err: &PostProcessError,
    color: bool,
) -> io::Result<()> {
    let label = if color {
        "SEMANTIC ERROR".bright_red().to_string()
    } else {
        "SEMANTIC ERROR".to_string()
    };

    writeln!(w, "[{label}] In file: {}", err.file)?;
    writeln!(w, "{}", err.message)?;

    if let Some(hint) = &err.hint {
        fmt_hint(w, hint, color)?;
    }

    Ok(())
}

fn fmt_hint(w: &mut impl Write, hint: &str, color: bool) -> io::Result<()> {
    if color {
        writeln!(
            w,
            "[{}] Did you mean {}?",
            "HINT".green(),
            hint.cyan()
        )
    } else {
        writeln!(w, "[HINT] Did you mean {hint}?")
    }
}

/// Debug dump of the planned job list, bordered for readability.
pub fn fmt_debug_jobs(w: &mut impl Write, jobs: &JobList) -> io::Result<()> {
    const WIDTH: usize = 72;
    let border = format!("+{}+", "-".repeat(WIDTH - 2));

    let line = |w: &mut dyn Write, text: &str| -> io::Result<()> {
        let mut t = text.to_string();
        if t.len() > WIDTH - 4 {
            t.truncate(WIDTH - 4);
        }
        writeln!(w, "| {t}{} |", " ".repeat(WIDTH - 4 - t.len()))
    };

    writeln!(w, "{border}")?;
    line(w, &format!("PLAN: {} job(s), root '{}'", jobs.len(), jobs.main_job))?;
    writeln!(w, "{border}")?;

    for job in jobs.all() {
        line(w, &format!("NAME       : {}", job.name))?;
        line(w, &format!("INTERPRETER: {}", job.interpreter))?;
        line(
            w,
            &format!(
                "MULTITHREAD: {}",
                if job.parallelizable { "Yes" } else { "No" }
            ),
        )?;
        if !job.track_inputs.is_empty() {
            line(w, &format!("TRACKED    : {}", job.track_inputs.join(" ")))?;
        }
        line(w, "INSTRUCTION:")?;
        for instr in &job.instructions {
            line(w, instr)?;
        }
        writeln!(w, "{border}")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ArcanaError;
    use crate::parser::parse_source;

    fn render_syntax(source: &str) -> String {
        let ArcanaError::Syntax(err) = parse_source("arcfile", source).unwrap_err() else {
            panic!("expected a syntax error");
        };

        let mut out = Vec::new();
        fmt_syntax_error(&mut out, &err, false).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_syntax_error_names_file_and_line() {
        let text = render_syntax("task task\n");
        assert!(text.contains("In file arcfile, line 1"));
        assert!(text.contains("task task"));
        assert!(text.contains("Expected:"));
        assert!(text.contains("Task Declaration"));
    }

    #[test]
    fn test_unknown_symbol_message() {
        let text = render_syntax("$\n");
        assert!(text.contains("undefined symbol"));
    }

    #[test]
    fn test_semantic_error_hint_rendered() {
        let ArcanaError::Semantic(err) =
            parse_source("arcfile", "@profle Debug\nX = 1\n").unwrap_err()
        else {
            panic!("expected a semantic error");
        };

        let mut out = Vec::new();
        fmt_semantic_error(&mut out, &err, false).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("SEMANTIC ERROR"));
        assert!(text.contains("Did you mean profile?"));
    }

    #[test]
    fn test_debug_jobs_box() {
        let env = parse_source("arcfile", "task Build() { echo hi }\n").unwrap();
        let list = crate::jobs::plan(&env, "Build").unwrap();

        let mut out = Vec::new();
        fmt_debug_jobs(&mut out, &list).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("NAME       : Build"));
        assert!(text.lines().all(|l| l.starts_with('+') || l.starts_with('|')));
    }
}
