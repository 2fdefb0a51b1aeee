//! Glob pattern engine.
//!
//! This module implements the pattern machinery the build pipeline
//! relies on:
//! - parsing patterns into a segment/atom representation,
//! - deterministic filesystem expansion,
//! - matching with wildcard captures, and
//! - glob-to-glob mapping (instantiate a destination pattern from the
//!   captures of a source pattern).
//!
//! Segments are separated by `/`. `*` and `?` are segment-local; `**`
//! is a whole-segment wildcard matching zero or more path segments.
//! Expansion output is always sorted and deduplicated so repeated runs
//! over an unchanged tree produce byte-identical lists.

mod capture;
mod expand;
mod parse;

pub use capture::{instantiate, map_glob_to_glob, match_capture};
pub use expand::{base_prefix, expand, match_segment};
pub use parse::parse;

use crate::error::GlobParseError;

/// Inclusive character range inside a class (e.g. `a-z`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharRange {
    pub first: char,
    pub last: char,
}

/// Parsed character class (`[...]`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharClass {
    pub negated: bool,
    pub singles: Vec<char>,
    pub ranges: Vec<CharRange>,
}

impl CharClass {
    /// Tests one character against the class, honouring negation.
    #[must_use]
    pub fn matches(&self, ch: char) -> bool {
        let hit = self.singles.contains(&ch)
            || self
                .ranges
                .iter()
                .any(|r| (r.first..=r.last).contains(&ch));

        hit != self.negated
    }
}

/// Smallest matching unit inside a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Atom {
    Literal(String),
    Star,
    QMark,
    CharClass(CharClass),
    /// Only legal as a whole segment.
    DoubleStar,
}

/// One path segment of a pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segment {
    pub atoms: Vec<Atom>,
}

impl Segment {
    /// True when the segment is exactly `**`.
    #[must_use]
    pub fn is_double_star_only(&self) -> bool {
        matches!(self.atoms.as_slice(), [Atom::DoubleStar])
    }
}

/// Parsed glob pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pattern {
    /// True if the pattern starts with the separator.
    pub absolute: bool,
    pub segments: Vec<Segment>,
    /// Normalized input, kept for diagnostics.
    pub normalized: String,
}

/// Pattern parsing options.
#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub separator: char,
    pub backslash_escape: bool,
    /// Restrict `**` to whole segments.
    pub doublestar_segment_only: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            separator: '/',
            backslash_escape: true,
            doublestar_segment_only: true,
        }
    }
}

/// Filesystem expansion options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpandOptions {
    pub follow_symlinks: bool,
    pub include_dotfiles: bool,
}

/// Value captured by a wildcard during matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capture {
    /// `**`: zero or more path segments joined by `/`.
    Path(String),
    /// `*`: a substring within one segment.
    Segment(String),
    /// `?` or a character class: exactly one character.
    Char(String),
}

impl Capture {
    /// The captured text regardless of kind.
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Path(s) | Self::Segment(s) | Self::Char(s) => s,
        }
    }
}

/// Convenience: parse with default options.
///
/// # Errors
///
/// Returns a [`GlobParseError`] describing the first malformed
/// construct in the pattern.
pub fn parse_default(input: &str) -> Result<Pattern, GlobParseError> {
    parse(input, &Options::default())
}
