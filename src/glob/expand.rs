//! Filesystem expansion of parsed glob patterns.
//!
//! Expansion walks pattern segments while descending directories:
//! - a `**` segment first tries the zero-directory case, then recurses
//!   into every subdirectory reusing the same segment index;
//! - a literal-only segment resolves by direct existence check instead
//!   of directory enumeration;
//! - any other segment enumerates the directory (sorted by filename)
//!   and matches entries atom by atom.
//!
//! Dotfiles are excluded unless requested or the segment itself starts
//! with a literal dot. Symlinks are not followed by default. Output is
//! sorted and deduplicated.

use super::{Atom, ExpandOptions, Pattern, Segment};
use crate::error::GlobExpandError;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Matches a segment against a single path-segment name.
///
/// Fast paths cover the common shapes (`lit`, `*`, `lit*`, `*lit`,
/// `lit*lit`, pure `?` runs); everything else falls back to a rolling
/// DP over atoms and characters.
#[must_use]
pub fn match_segment(seg: &Segment, name: &str) -> bool {
    let atoms = &seg.atoms;

    if atoms.is_empty() {
        return name.is_empty();
    }

    if atoms.len() == 1 {
        match &atoms[0] {
            Atom::Literal(lit) => return name == lit,
            Atom::Star => return true,
            Atom::QMark => return name.chars().count() == 1,
            Atom::CharClass(class) => {
                let mut chars = name.chars();
                return matches!((chars.next(), chars.next()), (Some(c), None) if class.matches(c));
            }
            Atom::DoubleStar => return false,
        }
    }

    if atoms.iter().all(|a| matches!(a, Atom::QMark)) {
        return name.chars().count() == atoms.len();
    }

    let has_class = atoms.iter().any(|a| matches!(a, Atom::CharClass(_)));
    if !has_class {
        match atoms.as_slice() {
            [Atom::Star, Atom::Literal(suf)] => return name.ends_with(suf.as_str()),
            [Atom::Literal(pre), Atom::Star] => return name.starts_with(pre.as_str()),
            [Atom::Literal(pre), Atom::Star, Atom::Literal(suf)] => {
                return name.len() >= pre.len() + suf.len()
                    && name.starts_with(pre.as_str())
                    && name.ends_with(suf.as_str());
            }
            _ => {}
        }
    }

    match_segment_dp(atoms, name)
}

/// DP over `dp[atom][byte] = reachable`, rolling two rows.
fn match_segment_dp(atoms: &[Atom], name: &str) -> bool {
    let bytes = name.as_bytes();
    let n = bytes.len();

    let mut cur = vec![false; n + 1];
    let mut nxt = vec![false; n + 1];
    cur[0] = true;

    for atom in atoms {
        nxt.iter_mut().for_each(|v| *v = false);

        match atom {
            Atom::Literal(lit) => {
                let lit = lit.as_bytes();
                for j in 0..=n {
                    if cur[j] && j + lit.len() <= n && &bytes[j..j + lit.len()] == lit {
                        nxt[j + lit.len()] = true;
                    }
                }
            }
            Atom::QMark => {
                for j in 0..n {
                    if cur[j] {
                        nxt[j + 1] = true;
                    }
                }
            }
            Atom::CharClass(class) => {
                for j in 0..n {
                    if cur[j] && class.matches(bytes[j] as char) {
                        nxt[j + 1] = true;
                    }
                }
            }
            Atom::Star => {
                // Once any cur[j] is reachable, every nxt[k >= j] is.
                let mut seen = false;
                for j in 0..=n {
                    seen |= cur[j];
                    nxt[j] = seen;
                }
            }
            Atom::DoubleStar => return false,
        }

        std::mem::swap(&mut cur, &mut nxt);
    }

    cur[n]
}

fn starts_with_dot(name: &str) -> bool {
    name.starts_with('.')
}

/// A segment may match dotfiles implicitly only when it begins with a
/// literal dot.
fn segment_allows_dotfiles(seg: &Segment) -> bool {
    match seg.atoms.first() {
        None => true,
        Some(Atom::Literal(lit)) => lit.starts_with('.'),
        Some(_) => false,
    }
}

fn literal_only(seg: &Segment) -> Option<&str> {
    match seg.atoms.as_slice() {
        [Atom::Literal(lit)] => Some(lit),
        _ => None,
    }
}

/// Lists directory entry names with deterministic ordering (sorted by
/// filename). Unreadable directories yield an empty list.
fn list_dir(dir: &Path) -> Vec<(String, PathBuf, bool)> {
    let Ok(reader) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut entries: Vec<(String, PathBuf, bool)> = reader
        .filter_map(std::result::Result::ok)
        .map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_symlink = entry
                .file_type()
                .map(|ft| ft.is_symlink())
                .unwrap_or(false);
            (name, entry.path(), is_symlink)
        })
        .collect();

    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

fn is_dir(path: &Path, is_symlink: bool, follow_symlinks: bool) -> bool {
    if !follow_symlinks && is_symlink {
        return false;
    }
    path.is_dir()
}

/// Renders a path with `/` separators, dropping `.` components.
fn generic_string(path: &Path) -> String {
    let mut out = String::new();

    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::RootDir => out.push('/'),
            Component::Prefix(p) => out.push_str(&p.as_os_str().to_string_lossy()),
            Component::ParentDir => {
                if !out.is_empty() && !out.ends_with('/') {
                    out.push('/');
                }
                out.push_str("..");
            }
            Component::Normal(s) => {
                if !out.is_empty() && !out.ends_with('/') {
                    out.push('/');
                }
                out.push_str(&s.to_string_lossy());
            }
        }
    }

    out
}

/// The path prefix expansion output carries for a base directory,
/// ready to strip when a relative view is needed.
#[must_use]
pub fn base_prefix(base: &Path) -> String {
    let generic = generic_string(base);
    if generic.is_empty() {
        generic
    } else {
        format!("{generic}/")
    }
}

/// Expands a parsed pattern against the filesystem.
///
/// Relative patterns expand under `base_dir`; absolute patterns under
/// the filesystem root. The result is sorted and deduplicated, so two
/// runs over an unchanged tree are byte-identical.
///
/// # Errors
///
/// Returns [`GlobExpandError::MissingStart`] when the start directory
/// does not exist.
pub fn expand(
    pattern: &Pattern,
    base_dir: &Path,
    opt: &ExpandOptions,
) -> Result<Vec<String>, GlobExpandError> {
    let start: PathBuf = if pattern.absolute {
        PathBuf::from("/")
    } else {
        base_dir.to_path_buf()
    };

    if !start.exists() {
        return Err(GlobExpandError::MissingStart(start));
    }

    let mut out = Vec::new();
    expand_rec(pattern, opt, &start, 0, &mut out);

    out.sort();
    out.dedup();
    Ok(out)
}

fn expand_rec(
    pattern: &Pattern,
    opt: &ExpandOptions,
    cur_dir: &Path,
    seg_index: usize,
    out: &mut Vec<String>,
) {
    if seg_index >= pattern.segments.len() {
        out.push(generic_string(cur_dir));
        return;
    }

    let seg = &pattern.segments[seg_index];

    if seg.is_double_star_only() {
        // Zero-directory case: advance the pattern without descending.
        expand_rec(pattern, opt, cur_dir, seg_index + 1, out);

        for (name, path, is_symlink) in list_dir(cur_dir) {
            if !opt.include_dotfiles && starts_with_dot(&name) {
                continue;
            }
            if !is_dir(&path, is_symlink, opt.follow_symlinks) {
                continue;
            }
            expand_rec(pattern, opt, &path, seg_index, out);
        }

        return;
    }

    // Literal-only segments resolve by existence check; a leading dot
    // written out literally counts as explicit.
    if let Some(lit) = literal_only(seg) {
        let next = cur_dir.join(lit);
        if !next.exists() {
            return;
        }
        if seg_index + 1 < pattern.segments.len() && !next.is_dir() {
            return;
        }
        expand_rec(pattern, opt, &next, seg_index + 1, out);
        return;
    }

    let allow_dot = opt.include_dotfiles || segment_allows_dotfiles(seg);

    for (name, path, is_symlink) in list_dir(cur_dir) {
        if !allow_dot && starts_with_dot(&name) {
            continue;
        }
        if !match_segment(seg, &name) {
            continue;
        }
        if seg_index + 1 < pattern.segments.len()
            && !is_dir(&path, is_symlink, opt.follow_symlinks)
        {
            continue;
        }
        expand_rec(pattern, opt, &path, seg_index + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glob::parse_default;
    use std::fs;
    use tempfile::TempDir;

    fn seg(pattern: &str) -> Segment {
        let mut parsed = parse_default(pattern).unwrap();
        parsed.segments.remove(0)
    }

    fn scratch_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src/sub")).unwrap();
        fs::write(dir.path().join("src/a.c"), "a").unwrap();
        fs::write(dir.path().join("src/b.c"), "b").unwrap();
        fs::write(dir.path().join("src/notes.txt"), "n").unwrap();
        fs::write(dir.path().join("src/sub/c.c"), "c").unwrap();
        fs::write(dir.path().join("src/.hidden.c"), "h").unwrap();
        dir
    }

    fn expand_str(pattern: &str, base: &Path) -> Vec<String> {
        let pat = parse_default(pattern).unwrap();
        let abs = expand(&pat, base, &ExpandOptions::default()).unwrap();
        let prefix = format!("{}/", generic_string(base));
        abs.into_iter()
            .map(|p| p.strip_prefix(&prefix).map(str::to_string).unwrap_or(p))
            .collect()
    }

    #[test]
    fn test_match_segment_shapes() {
        assert!(match_segment(&seg("main.c"), "main.c"));
        assert!(match_segment(&seg("*"), "anything"));
        assert!(match_segment(&seg("*.c"), "a.c"));
        assert!(!match_segment(&seg("*.c"), "a.h"));
        assert!(match_segment(&seg("lib*"), "libfoo"));
        assert!(match_segment(&seg("a*z"), "abcz"));
        assert!(!match_segment(&seg("a*z"), "az_not"));
        assert!(match_segment(&seg("???"), "abc"));
        assert!(!match_segment(&seg("???"), "ab"));
    }

    #[test]
    fn test_match_segment_dp_with_classes() {
        assert!(match_segment(&seg("[a-c]x*[0-9]"), "bxyz9"));
        assert!(!match_segment(&seg("[a-c]x*[0-9]"), "dxyz9"));
    }

    #[test]
    fn test_single_level_star_excludes_subdirs() {
        let dir = scratch_tree();
        assert_eq!(expand_str("src/*.c", dir.path()), vec!["src/a.c", "src/b.c"]);
    }

    #[test]
    fn test_doublestar_matches_all_depths() {
        let dir = scratch_tree();
        assert_eq!(
            expand_str("src/**/*.c", dir.path()),
            vec!["src/a.c", "src/b.c", "src/sub/c.c"]
        );
    }

    #[test]
    fn test_dotfiles_excluded_by_default() {
        let dir = scratch_tree();
        assert!(!expand_str("src/*.c", dir.path()).contains(&"src/.hidden.c".to_string()));
    }

    #[test]
    fn test_dotfiles_matched_by_explicit_dot() {
        let dir = scratch_tree();
        assert_eq!(expand_str("src/.hidden.c", dir.path()), vec!["src/.hidden.c"]);
        assert_eq!(expand_str("src/.*.c", dir.path()), vec!["src/.hidden.c"]);
    }

    #[test]
    fn test_expansion_deterministic() {
        let dir = scratch_tree();
        let a = expand_str("src/**/*.c", dir.path());
        let b = expand_str("src/**/*.c", dir.path());
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_base_is_error() {
        let pat = parse_default("*.c").unwrap();
        let err = expand(&pat, Path::new("/definitely/not/here"), &ExpandOptions::default());
        assert!(matches!(err, Err(GlobExpandError::MissingStart(_))));
    }

    #[test]
    fn test_expanded_paths_match_their_pattern() {
        let dir = scratch_tree();
        let pat = parse_default("src/**/*.c").unwrap();
        let hits = expand(&pat, dir.path(), &ExpandOptions::default()).unwrap();
        let prefix = format!("{}/", generic_string(dir.path()));

        assert!(!hits.is_empty());
        for hit in hits {
            let rel = hit.strip_prefix(&prefix).unwrap();
            assert!(
                crate::glob::match_capture(&pat, rel).is_some(),
                "expanded path {rel} does not re-match its pattern"
            );
        }
    }

    #[test]
    fn test_literal_fast_path_descends() {
        let dir = scratch_tree();
        assert_eq!(expand_str("src/sub/c.c", dir.path()), vec!["src/sub/c.c"]);
        assert!(expand_str("src/missing/c.c", dir.path()).is_empty());
    }
}
