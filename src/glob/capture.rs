//! Glob matching with wildcard captures, and pattern instantiation.
//!
//! The segment matcher runs the same DP as capture-less matching but
//! keeps a predecessor per cell; the first predecessor to reach a cell
//! wins, which makes the traced captures deterministic. Across
//! segments a `**` captures zero or more whole path segments, tried
//! shortest first. Failed `(pattern index, source index)` states are
//! memoised.

use super::{Atom, Capture, Options, Pattern, Segment};
use crate::error::MapGlobError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CapKind {
    Segment,
    Char,
}

#[derive(Debug, Clone, Copy, Default)]
struct PrevCell {
    has_prev: bool,
    pi: usize,
    pj: usize,
    capture: Option<(CapKind, usize, usize)>,
}

/// Matches one segment against one name, producing per-wildcard
/// captures in forward order. `*` captures its spanned substring, `?`
/// and character classes capture one character, literals capture
/// nothing.
fn match_segment_capture(seg: &Segment, name: &str, out: &mut Vec<Capture>) -> bool {
    let bytes = name.as_bytes();
    let a = seg.atoms.len();
    let n = bytes.len();

    let mut dp = vec![vec![false; n + 1]; a + 1];
    let mut prev = vec![vec![PrevCell::default(); n + 1]; a + 1];

    dp[0][0] = true;
    prev[0][0].has_prev = true;

    for (i, atom) in seg.atoms.iter().enumerate() {
        match atom {
            Atom::DoubleStar => return false,

            Atom::Literal(lit) => {
                let lit = lit.as_bytes();
                for j in 0..=n {
                    if !dp[i][j] {
                        continue;
                    }
                    let k = j + lit.len();
                    if k <= n && &bytes[j..k] == lit && !dp[i + 1][k] {
                        dp[i + 1][k] = true;
                        prev[i + 1][k] = PrevCell {
                            has_prev: true,
                            pi: i,
                            pj: j,
                            capture: None,
                        };
                    }
                }
            }

            Atom::QMark => {
                for j in 0..n {
                    if dp[i][j] && !dp[i + 1][j + 1] {
                        dp[i + 1][j + 1] = true;
                        prev[i + 1][j + 1] = PrevCell {
                            has_prev: true,
                            pi: i,
                            pj: j,
                            capture: Some((CapKind::Char, j, j + 1)),
                        };
                    }
                }
            }

            Atom::CharClass(class) => {
                for j in 0..n {
                    if dp[i][j] && class.matches(bytes[j] as char) && !dp[i + 1][j + 1] {
                        dp[i + 1][j + 1] = true;
                        prev[i + 1][j + 1] = PrevCell {
                            has_prev: true,
                            pi: i,
                            pj: j,
                            capture: Some((CapKind::Char, j, j + 1)),
                        };
                    }
                }
            }

            Atom::Star => {
                // First time a state is reached wins: shortest span.
                for j in 0..=n {
                    if !dp[i][j] {
                        continue;
                    }
                    for k in j..=n {
                        if !dp[i + 1][k] {
                            dp[i + 1][k] = true;
                            prev[i + 1][k] = PrevCell {
                                has_prev: true,
                                pi: i,
                                pj: j,
                                capture: Some((CapKind::Segment, j, k)),
                            };
                        }
                    }
                }
            }
        }
    }

    if !dp[a][n] {
        return false;
    }

    // Trace back, then reverse into forward order.
    let mut rev: Vec<Capture> = Vec::new();
    let (mut ci, mut cj) = (a, n);

    while !(ci == 0 && cj == 0) {
        let cell = prev[ci][cj];
        if !cell.has_prev {
            return false;
        }

        if let Some((kind, cs, ce)) = cell.capture {
            let text = name[cs..ce].to_string();
            rev.push(match kind {
                CapKind::Segment => Capture::Segment(text),
                CapKind::Char => Capture::Char(text),
            });
        }

        ci = cell.pi;
        cj = cell.pj;
    }

    rev.reverse();
    out.extend(rev);
    true
}

fn split_path_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn match_capture_rec(
    pattern: &Pattern,
    src: &[&str],
    pi: usize,
    si: usize,
    caps: &mut Vec<Capture>,
    failed: &mut [Vec<bool>],
) -> bool {
    if pi == pattern.segments.len() {
        return si == src.len();
    }
    if si > src.len() {
        return false;
    }
    if failed[pi][si] {
        return false;
    }

    let seg = &pattern.segments[pi];

    if seg.is_double_star_only() {
        // Shortest path capture first, for determinism.
        for t in si..=src.len() {
            caps.push(Capture::Path(src[si..t].join("/")));

            if match_capture_rec(pattern, src, pi + 1, t, caps, failed) {
                return true;
            }

            caps.pop();
        }

        failed[pi][si] = true;
        return false;
    }

    if si >= src.len() {
        failed[pi][si] = true;
        return false;
    }

    let before = caps.len();
    if !match_segment_capture(seg, src[si], caps) {
        failed[pi][si] = true;
        return false;
    }

    if match_capture_rec(pattern, src, pi + 1, si + 1, caps, failed) {
        return true;
    }

    caps.truncate(before);
    failed[pi][si] = true;
    false
}

/// Matches a pattern against a generic (`/`-separated) path and
/// collects wildcard captures in forward order.
#[must_use]
pub fn match_capture(pattern: &Pattern, src: &str) -> Option<Vec<Capture>> {
    let segs = split_path_segments(src);
    let mut caps = Vec::new();
    let mut failed = vec![vec![false; segs.len() + 1]; pattern.segments.len() + 1];

    if match_capture_rec(pattern, &segs, 0, 0, &mut caps, &mut failed) {
        Some(caps)
    } else {
        None
    }
}

/// Instantiates a destination pattern by consuming captures in order.
///
/// `**` consumes a path capture, `*` a segment capture, `?` and
/// character classes a single-character capture; literals emit
/// themselves. The capture list must be consumed exactly.
#[must_use]
pub fn instantiate(pattern: &Pattern, caps: &[Capture]) -> Option<String> {
    let mut cap_i = 0;
    let mut out_segs: Vec<String> = Vec::new();

    for seg in &pattern.segments {
        if seg.is_double_star_only() {
            let Some(Capture::Path(path)) = caps.get(cap_i) else {
                return None;
            };

            out_segs.extend(split_path_segments(path).into_iter().map(str::to_string));
            cap_i += 1;
            continue;
        }

        let mut built = String::new();

        for atom in &seg.atoms {
            match atom {
                Atom::Literal(lit) => built.push_str(lit),
                Atom::Star => {
                    let Some(Capture::Segment(text)) = caps.get(cap_i) else {
                        return None;
                    };
                    built.push_str(text);
                    cap_i += 1;
                }
                Atom::QMark | Atom::CharClass(_) => {
                    let Some(Capture::Char(text)) = caps.get(cap_i) else {
                        return None;
                    };
                    if text.chars().count() != 1 {
                        return None;
                    }
                    built.push_str(text);
                    cap_i += 1;
                }
                Atom::DoubleStar => return None,
            }
        }

        out_segs.push(built);
    }

    if cap_i != caps.len() {
        return None;
    }

    Some(out_segs.join("/"))
}

/// Maps a pool of source paths through one or more source globs onto a
/// destination glob.
///
/// The source list is taken by value and consumed: every path captured
/// by a source glob is removed from the pool and its instantiation
/// appended to the output. A path no source glob captures is an error
/// only once the last source glob has had its chance.
///
/// # Errors
///
/// Returns parse errors for either glob, a capture error for a leftover
/// source, or an instantiation error when the destination pattern is
/// incompatible with the produced captures.
pub fn map_glob_to_glob(
    from_globs: &[String],
    to_glob: &str,
    mut src_list: Vec<String>,
) -> Result<Vec<String>, MapGlobError> {
    let opt = Options::default();

    // The destination is constant across mappings; parse it once.
    let to_pat = super::parse(to_glob, &opt).map_err(MapGlobError::To)?;

    let mut out = Vec::new();

    for (i, from) in from_globs.iter().enumerate() {
        let from_pat = super::parse(from, &opt).map_err(MapGlobError::From)?;
        let last = i == from_globs.len() - 1;

        let mut remaining = Vec::with_capacity(src_list.len());

        for src in src_list {
            let Some(caps) = match_capture(&from_pat, &src) else {
                if last {
                    return Err(MapGlobError::Capture { source_name: src });
                }
                remaining.push(src);
                continue;
            };

            let Some(dest) = instantiate(&to_pat, &caps) else {
                return Err(MapGlobError::Instantiate { source_name: src });
            };

            out.push(dest);
        }

        src_list = remaining;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glob::parse_default;

    fn caps_of(pattern: &str, src: &str) -> Option<Vec<Capture>> {
        match_capture(&parse_default(pattern).unwrap(), src)
    }

    #[test]
    fn test_star_captures_stem() {
        let caps = caps_of("src/*.c", "src/main.c").unwrap();
        assert_eq!(caps, vec![Capture::Segment("main".into())]);
    }

    #[test]
    fn test_qmark_and_class_capture_one_char() {
        let caps = caps_of("v?[0-9]", "v1x").is_some();
        assert!(!caps, "class must match the digit position");

        let caps = caps_of("v?[0-9]", "vx1").unwrap();
        assert_eq!(
            caps,
            vec![Capture::Char("x".into()), Capture::Char("1".into())]
        );
    }

    #[test]
    fn test_doublestar_captures_path() {
        let caps = caps_of("src/**/*.c", "src/deep/er/main.c").unwrap();
        assert_eq!(
            caps,
            vec![
                Capture::Path("deep/er".into()),
                Capture::Segment("main".into())
            ]
        );
    }

    #[test]
    fn test_doublestar_zero_segments() {
        let caps = caps_of("src/**/*.c", "src/main.c").unwrap();
        assert_eq!(
            caps,
            vec![Capture::Path(String::new()), Capture::Segment("main".into())]
        );
    }

    #[test]
    fn test_no_match_returns_none() {
        assert!(caps_of("src/*.c", "src/main.h").is_none());
        assert!(caps_of("src/*.c", "other/main.c").is_none());
    }

    #[test]
    fn test_instantiate_consumes_all_captures() {
        let to = parse_default("obj/*.o").unwrap();
        assert_eq!(
            instantiate(&to, &[Capture::Segment("main".into())]).as_deref(),
            Some("obj/main.o")
        );

        // Leftover capture is an error.
        assert!(instantiate(
            &to,
            &[
                Capture::Segment("main".into()),
                Capture::Segment("extra".into())
            ]
        )
        .is_none());

        // Exhausted captures are an error.
        assert!(instantiate(&to, &[]).is_none());
    }

    #[test]
    fn test_instantiate_doublestar_reinjects_segments() {
        let to = parse_default("out/**/*.o").unwrap();
        let caps = vec![Capture::Path("a/b".into()), Capture::Segment("x".into())];
        assert_eq!(instantiate(&to, &caps).as_deref(), Some("out/a/b/x.o"));

        let caps = vec![Capture::Path(String::new()), Capture::Segment("x".into())];
        assert_eq!(instantiate(&to, &caps).as_deref(), Some("out/x.o"));
    }

    #[test]
    fn test_map_round_trip() {
        // Instantiating and re-matching yields the same captures.
        let from = parse_default("src/**/*.c").unwrap();
        let to = parse_default("obj/**/*.o").unwrap();

        let caps = match_capture(&from, "src/sub/dir/main.c").unwrap();
        let mapped = instantiate(&to, &caps).unwrap();
        assert_eq!(mapped, "obj/sub/dir/main.o");

        let again = match_capture(&to, &mapped).unwrap();
        assert_eq!(again, caps);
    }

    #[test]
    fn test_map_glob_to_glob_basic() {
        let out = map_glob_to_glob(
            &["src/*.c".to_string()],
            "obj/*.o",
            vec!["src/a.c".to_string(), "src/b.c".to_string()],
        )
        .unwrap();

        assert_eq!(out, vec!["obj/a.o", "obj/b.o"]);
    }

    #[test]
    fn test_map_glob_leftover_waits_for_later_globs() {
        let out = map_glob_to_glob(
            &["src/*.c".to_string(), "gen/*.c".to_string()],
            "obj/*.o",
            vec!["gen/x.c".to_string(), "src/a.c".to_string()],
        )
        .unwrap();

        assert_eq!(out, vec!["obj/a.o", "obj/x.o"]);
    }

    #[test]
    fn test_map_glob_capture_failure_on_last_glob() {
        let err = map_glob_to_glob(
            &["src/*.c".to_string()],
            "obj/*.o",
            vec!["docs/readme.md".to_string()],
        )
        .unwrap_err();

        assert!(matches!(err, MapGlobError::Capture { .. }));
    }

    #[test]
    fn test_map_glob_instantiate_failure() {
        // Destination has two wildcards, source produces one capture.
        let err = map_glob_to_glob(
            &["src/*.c".to_string()],
            "obj/*/*.o",
            vec!["src/a.c".to_string()],
        )
        .unwrap_err();

        assert!(matches!(err, MapGlobError::Instantiate { .. }));
    }

    #[test]
    fn test_memoised_failure_terminates() {
        // Multiple ** segments against a path that cannot match; the
        // memo table keeps this from exploding.
        assert!(caps_of("**/a/**/b/**/c.z", "x/y/z/q/r/s/t.c").is_none());
    }
}
