//! Glob pattern parsing: raw string to [`Pattern`].

use super::{Atom, CharClass, CharRange, Options, Pattern, Segment};
use crate::error::GlobParseError;

fn is_meta(c: char) -> bool {
    matches!(c, '*' | '?' | '[' | ']' | '\\')
}

/// Rewrites path separators: with the `/` separator, backslashes that
/// do not form an escape are treated as separators from foreign input.
fn normalize(input: &str, opt: &Options) -> String {
    if opt.separator != '/' || opt.backslash_escape {
        return input.to_string();
    }

    input
        .chars()
        .map(|c| if c == '\\' { '/' } else { c })
        .collect()
}

/// Parses a glob string into a [`Pattern`].
///
/// A leading separator marks the pattern absolute. Each segment is
/// parsed atom by atom; `**` is only accepted as a whole segment when
/// `doublestar_segment_only` is set.
///
/// # Errors
///
/// Returns the first [`GlobParseError`] encountered, with the byte
/// offset of the offending construct in the normalized pattern.
pub fn parse(input: &str, opt: &Options) -> Result<Pattern, GlobParseError> {
    if input.is_empty() {
        return Err(GlobParseError::EmptyPattern);
    }

    let normalized = normalize(input, opt);
    let mut pattern = Pattern {
        absolute: false,
        segments: Vec::new(),
        normalized: normalized.clone(),
    };

    let chars: Vec<char> = normalized.chars().collect();
    let mut i = 0;

    if chars.first() == Some(&opt.separator) {
        pattern.absolute = true;
        i = 1;
    }

    let mut seg_start = i;
    while i <= chars.len() {
        if i == chars.len() || chars[i] == opt.separator {
            let segment = parse_segment(&chars[seg_start..i], seg_start, opt)?;
            pattern.segments.push(segment);
            seg_start = i + 1;
        }
        i += 1;
    }

    Ok(pattern)
}

fn parse_segment(seg: &[char], base: usize, opt: &Options) -> Result<Segment, GlobParseError> {
    let mut out = Segment::default();

    if seg.is_empty() {
        return Ok(out);
    }

    if opt.doublestar_segment_only && matches!(seg, ['*', '*']) {
        out.atoms.push(Atom::DoubleStar);
        return Ok(out);
    }

    let mut literal = String::new();
    let mut i = 0;

    while i < seg.len() {
        let c = seg[i];

        if opt.backslash_escape && c == '\\' {
            let Some(&next) = seg.get(i + 1) else {
                return Err(GlobParseError::InvalidEscape(base + i));
            };
            if !is_meta(next) {
                return Err(GlobParseError::InvalidEscape(base + i));
            }
            literal.push(next);
            i += 2;
            continue;
        }

        match c {
            '*' => {
                flush_literal(&mut literal, &mut out);
                out.atoms.push(Atom::Star);
                i += 1;
            }
            '?' => {
                flush_literal(&mut literal, &mut out);
                out.atoms.push(Atom::QMark);
                i += 1;
            }
            '[' => {
                flush_literal(&mut literal, &mut out);
                let class = parse_char_class(seg, &mut i, base, opt)?;
                out.atoms.push(Atom::CharClass(class));
            }
            _ => {
                literal.push(c);
                i += 1;
            }
        }
    }

    flush_literal(&mut literal, &mut out);

    if opt.doublestar_segment_only {
        for atom in &out.atoms {
            if let Atom::Literal(lit) = atom {
                if lit.contains("**") {
                    return Err(GlobParseError::InvalidDoubleStar(base));
                }
            }
        }
    }

    Ok(out)
}

fn flush_literal(literal: &mut String, out: &mut Segment) {
    if !literal.is_empty() {
        out.atoms.push(Atom::Literal(std::mem::take(literal)));
    }
}

/// Parses a character class starting at `[`. On success `i` is left
/// just past the closing `]`.
fn parse_char_class(
    seg: &[char],
    i: &mut usize,
    base: usize,
    opt: &Options,
) -> Result<CharClass, GlobParseError> {
    let start = *i;
    let mut out = CharClass::default();

    // Consume '['.
    *i += 1;
    if *i >= seg.len() {
        return Err(GlobParseError::UnclosedCharClass(base + start));
    }

    if seg[*i] == '^' {
        out.negated = true;
        *i += 1;
    }

    if *i >= seg.len() {
        return Err(GlobParseError::UnclosedCharClass(base + start));
    }

    let mut any = false;

    // Reads one logical character, handling optional backslash escapes.
    let read_char = |i: &mut usize| -> Option<char> {
        let c = *seg.get(*i)?;
        if opt.backslash_escape && c == '\\' {
            let n = *seg.get(*i + 1)?;
            *i += 2;
            return Some(n);
        }
        *i += 1;
        Some(c)
    };

    while *i < seg.len() {
        if seg[*i] == ']' {
            if !any {
                return Err(GlobParseError::EmptyCharClass(base + start));
            }
            *i += 1;
            return Ok(out);
        }

        let Some(first) = read_char(i) else {
            return Err(GlobParseError::UnclosedCharClass(base + start));
        };

        // Range detection, guarding against trailing forms like "a-]".
        if seg.get(*i) == Some(&'-') && seg.get(*i + 1).is_some_and(|c| *c != ']') {
            *i += 1;
            let Some(last) = read_char(i) else {
                return Err(GlobParseError::InvalidRange(base + *i));
            };

            if first > last {
                return Err(GlobParseError::InvalidRange(base + *i - 1));
            }

            out.ranges.push(CharRange { first, last });
            any = true;
            continue;
        }

        out.singles.push(first);
        any = true;
    }

    Err(GlobParseError::UnclosedCharClass(base + start))
}
