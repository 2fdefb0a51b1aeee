//! Error types for arcana.
//!
//! Uses thiserror for ergonomic error handling with proper
//! error chain propagation. Each pipeline stage owns a small enum;
//! `ArcanaError` is the top-level type the binary maps to exit codes.

use crate::grammar::{RuleId, Terminal};
use crate::lexer::Token;
use thiserror::Error;

/// Top-level error.
#[derive(Error, Debug)]
pub enum ArcanaError {
    #[error("Argument error: {0}")]
    Args(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{}", .0.message)]
    Syntax(SyntaxError),

    #[error("{}", .0.message)]
    Semantic(SemanticError),

    #[error("{}", .0.message)]
    PostProcess(PostProcessError),

    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Task failed: {task} (exit code {exit_code})")]
    Job { task: String, exit_code: i32 },
}

/// Grammar failure enriched with source context.
#[derive(Debug, Clone)]
pub struct SyntaxError {
    /// Display name of the file being parsed.
    pub file: String,
    /// Physical source line of the offending token.
    pub source_line: String,
    /// The offending token.
    pub token: Token,
    /// Union of terminal nodes the matcher would have accepted.
    pub expected: Vec<Terminal>,
    /// Rules alive when the token arrived.
    pub rules: Vec<RuleId>,
    /// Preformatted one-line summary.
    pub message: String,
}

/// Collection-stage failure enriched with source context.
#[derive(Debug, Clone)]
pub struct SemanticError {
    pub file: String,
    pub line: usize,
    pub source_line: String,
    pub message: String,
    /// Closest-match suggestion, when an identifier was expected.
    pub hint: Option<String>,
}

/// Post-processing failure (glob expansion, mapping, asserts,
/// substitution).
#[derive(Debug, Clone)]
pub struct PostProcessError {
    pub file: String,
    pub message: String,
    pub hint: Option<String>,
}

/// Glob pattern parse errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobParseError {
    #[error("empty pattern")]
    EmptyPattern,

    #[error("invalid escape at offset {0}")]
    InvalidEscape(usize),

    #[error("unclosed character class at offset {0}")]
    UnclosedCharClass(usize),

    #[error("empty character class at offset {0}")]
    EmptyCharClass(usize),

    #[error("invalid range in character class at offset {0}")]
    InvalidRange(usize),

    #[error("'**' must span a whole segment (offset {0})")]
    InvalidDoubleStar(usize),
}

/// Filesystem expansion errors.
#[derive(Error, Debug)]
pub enum GlobExpandError {
    #[error("expansion start directory does not exist: {}", .0.display())]
    MissingStart(std::path::PathBuf),
}

/// Glob-to-glob mapping errors.
#[derive(Error, Debug)]
pub enum MapGlobError {
    #[error("source glob: {0}")]
    From(GlobParseError),

    #[error("destination glob: {0}")]
    To(GlobParseError),

    #[error("no source glob captures '{source_name}'")]
    Capture { source_name: String },

    #[error("destination pattern incompatible with captures from '{source_name}'")]
    Instantiate { source_name: String },
}

/// Planner errors.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Unknown task '{name}'")]
    UnknownTask { name: String, hint: Option<String> },

    #[error("No task given and no task carries the 'main' attribute")]
    NoMainTask,
}

/// Cache persistence errors.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache IO error at {}: {source}", path.display())]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache not loaded")]
    NotLoaded,
}

impl ArcanaError {
    /// Returns a machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Args(_) => "ARG_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Syntax(_) => "SYNTAX_ERROR",
            Self::Semantic(_) => "SEMANTIC_ERROR",
            Self::PostProcess(_) => "POSTPROC_ERROR",
            Self::Plan(_) => "PLAN_ERROR",
            Self::Cache(_) => "CACHE_ERROR",
            Self::Job { .. } => "JOB_ERROR",
        }
    }
}

/// Result type alias for top-level operations.
pub type Result<T> = std::result::Result<T, ArcanaError>;
