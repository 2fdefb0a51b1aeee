//! Profile-mangled table helpers.
//!
//! Declarations written under `@profile P` live in their tables under
//! the key `base@@P`. [`align_on_profile`] collapses a table onto one
//! profile: foreign-profile entries are dropped and `base@@P` is
//! renamed to `base`, overwriting any unmangled entry.
//!
//! Also home to the Levenshtein closest-match suggestion used for
//! "did you mean" hints.

use std::collections::BTreeMap;

const MANGLE_SEP: &str = "@@";

/// Builds the mangled key for a declaration under a profile.
#[must_use]
pub fn mangle(base: &str, profile: &str) -> String {
    format!("{base}{MANGLE_SEP}{profile}")
}

/// Strips the profile suffix from a (possibly mangled) key.
#[must_use]
pub fn base_name(key: &str) -> &str {
    key.split(MANGLE_SEP).next().unwrap_or(key)
}

/// Aligns a table onto the active profile.
///
/// Every mangled key `base@@Q` with `Q != profile` is removed; every
/// `base@@profile` is renamed to `base`, overwriting a plain `base`
/// entry if present. Afterwards no key contains `@@`.
pub fn align_on_profile<V>(table: &mut BTreeMap<String, V>, profile: &str) {
    let mangled: Vec<String> = table
        .keys()
        .filter(|k| k.contains(MANGLE_SEP))
        .cloned()
        .collect();

    for key in mangled {
        let Some((base, prof)) = key.split_once(MANGLE_SEP) else {
            continue;
        };

        if prof != profile {
            table.remove(&key);
            continue;
        }

        let base = base.to_string();
        if let Some(value) = table.remove(&key) {
            table.insert(base, value);
        }
    }
}

/// Looks a key up directly, then under its mangled form for the given
/// profile.
pub fn get_value<'a, V>(
    table: &'a BTreeMap<String, V>,
    key: &str,
    profile: &str,
) -> Option<&'a V> {
    table
        .get(key)
        .or_else(|| table.get(&mangle(key, profile)))
}

/// Classic two-row Levenshtein distance.
#[must_use]
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;

        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }

        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Finds the candidate closest to `target`, strictly under
/// `max_distance`. Mangled candidates are compared by their base name
/// and exact matches are skipped (the caller already knows the key is
/// missing).
pub fn find_closest<'a>(
    candidates: impl IntoIterator<Item = &'a str>,
    target: &str,
    max_distance: usize,
) -> Option<String> {
    let mut best: Option<String> = None;
    let mut best_dist = max_distance;

    for candidate in candidates {
        let candidate = base_name(candidate);

        if candidate == target {
            continue;
        }

        let d = levenshtein(candidate, target);
        if d < best_dist {
            best_dist = d;
            best = Some(candidate.to_string());
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_of(keys: &[&str]) -> BTreeMap<String, String> {
        keys.iter().map(|k| (k.to_string(), format!("v:{k}"))).collect()
    }

    #[test]
    fn test_align_renames_active_profile() {
        let mut t = table_of(&["FLAGS@@Debug", "FLAGS@@Release", "CC"]);
        align_on_profile(&mut t, "Release");

        assert_eq!(t.get("FLAGS").map(String::as_str), Some("v:FLAGS@@Release"));
        assert!(t.contains_key("CC"));
        assert!(t.keys().all(|k| !k.contains("@@")));
    }

    #[test]
    fn test_align_overwrites_plain_entry() {
        let mut t = table_of(&["FLAGS", "FLAGS@@Debug"]);
        align_on_profile(&mut t, "Debug");

        assert_eq!(t.len(), 1);
        assert_eq!(t.get("FLAGS").map(String::as_str), Some("v:FLAGS@@Debug"));
    }

    #[test]
    fn test_align_drops_foreign_profiles() {
        let mut t = table_of(&["X@@Debug"]);
        align_on_profile(&mut t, "Release");
        assert!(t.is_empty());
    }

    #[test]
    fn test_get_value_falls_back_to_mangled() {
        let t = table_of(&["FLAGS@@Debug"]);
        assert!(get_value(&t, "FLAGS", "Debug").is_some());
        assert!(get_value(&t, "FLAGS", "Release").is_none());
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn test_find_closest_strips_mangling() {
        let hint = find_closest(["SOURCES@@Debug", "TARGET"], "SORCES", 3);
        assert_eq!(hint.as_deref(), Some("SOURCES"));
    }

    #[test]
    fn test_find_closest_respects_threshold() {
        assert!(find_closest(["alpha"], "omega", 2).is_none());
    }
}
