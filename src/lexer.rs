//! Arcfile lexer: byte stream to token stream.
//!
//! Single-pass scanner with line/column tracking. Comments (`#` to end
//! of line) are skipped, `\` immediately followed by a newline is a
//! line continuation. The lexer also retains the physical source lines
//! so later stages can slice raw text back out of a statement by
//! `(line, start_col, end_col)` — that is the only way wildcard regions
//! recover their exact spelling, whitespace included.

use std::fs;
use std::io;
use std::path::Path;

/// Token classification.
///
/// `Any` and `OptNewline` never come out of the lexer; they exist only
/// inside grammar rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Identifier,
    Number,

    // Keywords (recognised case-insensitively)
    Task,
    Import,
    Using,
    Map,
    Assert,
    Eq,
    Ne,
    In,

    // Punctuation
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    RoundL,
    RoundR,
    SquareL,
    SquareR,
    CurlyL,
    CurlyR,
    AngleL,
    AngleR,
    At,
    Semicolon,
    DQuote,

    Newline,
    Eof,
    Unknown,

    // Matcher-only kinds
    Any,
    OptNewline,
}

impl TokenKind {
    /// Human-readable name used in diagnostics.
    #[must_use]
    pub fn repr(self) -> &'static str {
        match self {
            Self::Identifier => "identifier",
            Self::Number => "number",
            Self::Task => "task",
            Self::Import => "import",
            Self::Using => "using",
            Self::Map => "map",
            Self::Assert => "assert",
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::In => "in",
            Self::Assign => "assignment",
            Self::Plus => "plus",
            Self::Minus => "minus",
            Self::Star => "star",
            Self::Slash => "slash",
            Self::RoundL => "left parenthesis",
            Self::RoundR => "right parenthesis",
            Self::SquareL => "left bracket",
            Self::SquareR => "right bracket",
            Self::CurlyL => "left brace",
            Self::CurlyR => "right brace",
            Self::AngleL => "left angular parenthesis",
            Self::AngleR => "right angular parenthesis",
            Self::At => "at sign",
            Self::Semicolon => "semicolon",
            Self::DQuote => "double quote",
            Self::Newline => "<new line>",
            Self::Eof => "EOF",
            Self::Unknown => "UNKNOWN",
            Self::Any => "any",
            Self::OptNewline => "<new line>",
        }
    }
}

/// One lexed token.
///
/// `line` is 1-based; `start`/`end` are byte columns into the physical
/// source line (`end` exclusive).
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub start: usize,
    pub end: usize,
}

fn keyword(lower: &str) -> Option<TokenKind> {
    match lower {
        "task" => Some(TokenKind::Task),
        "import" => Some(TokenKind::Import),
        "using" => Some(TokenKind::Using),
        "map" => Some(TokenKind::Map),
        "assert" => Some(TokenKind::Assert),
        "eq" => Some(TokenKind::Eq),
        "ne" => Some(TokenKind::Ne),
        "in" => Some(TokenKind::In),
        _ => None,
    }
}

/// Single-pass arcfile scanner.
pub struct Lexer {
    source: String,
    bytes: Vec<u8>,
    pos: usize,
    line: usize,
    col: usize,
    lines: Vec<String>,
}

impl Lexer {
    /// Creates a lexer over in-memory content. `source` is the display
    /// name used in diagnostics.
    #[must_use]
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let lines = content.split('\n').map(|l| l.trim_end_matches('\r').to_string()).collect();

        Self {
            source: source.into(),
            bytes: content.into_bytes(),
            pos: 0,
            line: 1,
            col: 0,
            lines,
        }
    }

    /// Creates a lexer by reading a file from disk.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the file cannot be read.
    pub fn from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        Ok(Self::new(path.display().to_string(), content))
    }

    /// Display name of the lexed input (usually the arcfile path).
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Physical source line by 1-based index, empty if out of range.
    #[must_use]
    pub fn line_text(&self, line: usize) -> &str {
        if line == 0 {
            return "";
        }
        self.lines.get(line - 1).map_or("", String::as_str)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<u8> {
        self.bytes.get(self.pos + 1).copied()
    }

    fn bump(&mut self) {
        self.pos += 1;
        self.col += 1;
    }

    /// Produces the next token. Returns `Eof` repeatedly once the input
    /// is exhausted.
    pub fn next_token(&mut self) -> Token {
        loop {
            let Some(c) = self.peek() else {
                return Token {
                    kind: TokenKind::Eof,
                    lexeme: String::new(),
                    line: self.line,
                    start: self.col,
                    end: self.col,
                };
            };

            match c {
                b' ' | b'\t' | b'\r' => {
                    self.bump();
                }
                // Line continuation: backslash directly before a newline.
                b'\\' if self.peek2() == Some(b'\n') => {
                    self.pos += 2;
                    self.line += 1;
                    self.col = 0;
                }
                b'#' => {
                    while self.peek().is_some_and(|c| c != b'\n') {
                        self.bump();
                    }
                }
                b'\n' => {
                    let tok = Token {
                        kind: TokenKind::Newline,
                        lexeme: "\n".to_string(),
                        line: self.line,
                        start: self.col,
                        end: self.col + 1,
                    };
                    self.pos += 1;
                    self.line += 1;
                    self.col = 0;
                    return tok;
                }
                c if c.is_ascii_alphabetic() || c == b'_' => return self.identifier(),
                c if c.is_ascii_digit() => return self.number(),
                _ => return self.punct(c),
            }
        }
    }

    fn identifier(&mut self) -> Token {
        let line = self.line;
        let start = self.col;
        let begin = self.pos;

        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_') {
            self.bump();
        }

        let lexeme = String::from_utf8_lossy(&self.bytes[begin..self.pos]).into_owned();
        let kind = keyword(&lexeme.to_ascii_lowercase()).unwrap_or(TokenKind::Identifier);

        Token {
            kind,
            line,
            start,
            end: start + lexeme.len(),
            lexeme,
        }
    }

    fn number(&mut self) -> Token {
        let line = self.line;
        let start = self.col;
        let begin = self.pos;

        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }

        let lexeme = String::from_utf8_lossy(&self.bytes[begin..self.pos]).into_owned();

        Token {
            kind: TokenKind::Number,
            line,
            start,
            end: start + lexeme.len(),
            lexeme,
        }
    }

    fn punct(&mut self, c: u8) -> Token {
        let kind = match c {
            b'=' => TokenKind::Assign,
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'(' => TokenKind::RoundL,
            b')' => TokenKind::RoundR,
            b'[' => TokenKind::SquareL,
            b']' => TokenKind::SquareR,
            b'{' => TokenKind::CurlyL,
            b'}' => TokenKind::CurlyR,
            b'<' => TokenKind::AngleL,
            b'>' => TokenKind::AngleR,
            b'@' => TokenKind::At,
            b';' => TokenKind::Semicolon,
            b'"' => TokenKind::DQuote,
            _ => TokenKind::Unknown,
        };

        let tok = Token {
            kind,
            lexeme: (c as char).to_string(),
            line: self.line,
            start: self.col,
            end: self.col + 1,
        };
        self.bump();
        tok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new("test", input);
        let mut out = Vec::new();
        loop {
            let tok = lexer.next_token();
            let kind = tok.kind;
            out.push(kind);
            if kind == TokenKind::Eof {
                break;
            }
        }
        out
    }

    #[test]
    fn test_assignment_tokens() {
        assert_eq!(
            kinds("X = hello\n"),
            vec![
                TokenKind::Identifier,
                TokenKind::Assign,
                TokenKind::Identifier,
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_case_insensitive() {
        assert_eq!(kinds("TASK")[0], TokenKind::Task);
        assert_eq!(kinds("Import")[0], TokenKind::Import);
        assert_eq!(kinds("USING")[0], TokenKind::Using);
        assert_eq!(kinds("map")[0], TokenKind::Map);
        assert_eq!(kinds("Assert")[0], TokenKind::Assert);
        assert_eq!(kinds("EQ")[0], TokenKind::Eq);
        assert_eq!(kinds("taskX")[0], TokenKind::Identifier);
    }

    #[test]
    fn test_comment_skipped_until_newline() {
        assert_eq!(
            kinds("A # this is ignored\nB"),
            vec![
                TokenKind::Identifier,
                TokenKind::Newline,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_line_continuation() {
        let mut lexer = Lexer::new("test", "A \\\nB\n");
        let a = lexer.next_token();
        let b = lexer.next_token();
        assert_eq!(a.kind, TokenKind::Identifier);
        assert_eq!(b.kind, TokenKind::Identifier);
        // The continuation advanced the physical line counter.
        assert_eq!(a.line, 1);
        assert_eq!(b.line, 2);
    }

    #[test]
    fn test_columns_track_source_slices() {
        let mut lexer = Lexer::new("test", "FLAGS = -O2\n");
        let name = lexer.next_token();
        assert_eq!(name.start, 0);
        assert_eq!(name.end, 5);
        assert_eq!(&lexer.line_text(name.line)[name.start..name.end], "FLAGS");
    }

    #[test]
    fn test_unknown_byte() {
        assert_eq!(kinds("$")[0], TokenKind::Unknown);
    }

    #[test]
    fn test_eof_is_sticky() {
        let mut lexer = Lexer::new("test", "");
        assert_eq!(lexer.next_token().kind, TokenKind::Eof);
        assert_eq!(lexer.next_token().kind, TokenKind::Eof);
    }

    #[test]
    fn test_punctuation() {
        assert_eq!(
            kinds("@ ; \" < > ( ) [ ] { }")
                .into_iter()
                .take(11)
                .collect::<Vec<_>>(),
            vec![
                TokenKind::At,
                TokenKind::Semicolon,
                TokenKind::DQuote,
                TokenKind::AngleL,
                TokenKind::AngleR,
                TokenKind::RoundL,
                TokenKind::RoundR,
                TokenKind::SquareL,
                TokenKind::SquareR,
                TokenKind::CurlyL,
                TokenKind::CurlyR,
            ]
        );
    }
}
