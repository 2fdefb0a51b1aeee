//! Environment post-processing.
//!
//! Runs after parsing, in fixed order:
//!
//! 1. align every table onto the active profile,
//! 2. resolve the root task and publish `__main__`,
//! 3. substitute scalar references inside variable values,
//! 4. expand `@glob` variables against the filesystem,
//! 5. resolve `map` variables through the glob engine,
//! 6. evaluate asserts,
//! 7. substitute references inside task instructions and attribute
//!    properties.
//!
//! Substitution syntax: `{arc:NAME}` for scalars and built-ins,
//! `{arc:list:NAME}` and `{arc:inline:NAME}` for the space-joined glob
//! expansion of a variable.

use crate::builtins::{Builtins, SYM_MAIN};
use crate::error::{ArcanaError, PlanError, PostProcessError};
use crate::glob::{self, ExpandOptions};
use crate::semantic::{AssertOp, AttrKind, Attributed, Environment};
use crate::table::{self, find_closest};

const SUBST_OPEN: &str = "{arc:";
const MAX_VALUE_PASSES: usize = 8;

#[derive(Clone, Copy, PartialEq, Eq)]
enum SubstMode {
    /// Only `{arc:NAME}` scalars; list forms pass through untouched.
    ScalarsOnly,
    /// All forms, including `list:` and `inline:`.
    Full,
}

/// Post-processes a parsed environment.
///
/// `requested` is the task named on the command line, if any; the
/// resolved root task name is returned and published as `__main__`.
///
/// # Errors
///
/// Returns `ArcanaError::Plan` when the root task cannot be resolved
/// and `ArcanaError::PostProcess` for glob, mapping, assert and
/// substitution failures.
pub fn post_process(
    env: &mut Environment,
    builtins: &mut Builtins,
    requested: Option<&str>,
    source: &str,
) -> Result<String, ArcanaError> {
    // 1. Profile alignment.
    let profile = env.active_profile.clone();
    table::align_on_profile(&mut env.vtable, &profile);
    table::align_on_profile(&mut env.ftable, &profile);

    // 2. Root task resolution.
    let root_task = resolve_root(env, requested)?;
    builtins.set(SYM_MAIN, root_task.clone());

    // 3. Variable values: scalar references may chain, so iterate to a
    // fixpoint with a small pass cap.
    substitute_values(env, builtins, source)?;

    // 4. Glob expansion.
    expand_glob_variables(env, source)?;

    // 5. Map resolution.
    resolve_maps(env, source)?;

    // 6. Asserts.
    evaluate_asserts(env, builtins, source)?;

    // 7. Instructions and attribute properties.
    substitute_tasks(env, builtins, source)?;

    Ok(root_task)
}

fn resolve_root(env: &Environment, requested: Option<&str>) -> Result<String, ArcanaError> {
    if let Some(name) = requested {
        if env.ftable.contains_key(name) {
            return Ok(name.to_string());
        }
        return Err(PlanError::UnknownTask {
            name: name.to_string(),
            hint: find_closest(env.ftable.keys().map(String::as_str), name, 3),
        }
        .into());
    }

    env.ftable
        .values()
        .find(|t| t.has_attr(AttrKind::Main))
        .map(|t| t.name.clone())
        .ok_or_else(|| PlanError::NoMainTask.into())
}

fn post_err(source: &str, message: String, hint: Option<String>) -> ArcanaError {
    ArcanaError::PostProcess(PostProcessError {
        file: source.to_string(),
        message,
        hint,
    })
}

fn substitute_values(
    env: &mut Environment,
    builtins: &Builtins,
    source: &str,
) -> Result<(), ArcanaError> {
    for _ in 0..MAX_VALUE_PASSES {
        let keys: Vec<String> = env.vtable.keys().cloned().collect();
        let mut changed = false;

        for key in keys {
            let value = env.vtable[&key].value.clone();
            if !value.contains(SUBST_OPEN) {
                continue;
            }

            let substituted = substitute(&value, env, builtins, SubstMode::ScalarsOnly)
                .map_err(|(msg, hint)| {
                    post_err(source, format!("In variable '{key}': {msg}"), hint)
                })?;

            if substituted != value {
                env.vtable.get_mut(&key).expect("key collected above").value = substituted;
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }

    Ok(())
}

fn expand_glob_variables(env: &mut Environment, source: &str) -> Result<(), ArcanaError> {
    let keys: Vec<String> = env
        .vtable
        .iter()
        .filter(|(_, v)| v.has_attr(AttrKind::Glob) && !v.has_attr(AttrKind::Map))
        .map(|(k, _)| k.clone())
        .collect();

    for key in keys {
        let value = env.vtable[&key].value.clone();

        let pattern = glob::parse_default(&value).map_err(|e| {
            post_err(source, format!("Glob parse failed for variable '{key}': {e}"), None)
        })?;

        let hits = glob::expand(&pattern, &env.root, &ExpandOptions::default()).map_err(|e| {
            post_err(source, format!("Glob expansion failed for variable '{key}': {e}"), None)
        })?;

        env.vtable.get_mut(&key).expect("key collected above").glob_expansion = Some(hits);
    }

    Ok(())
}

fn resolve_maps(env: &mut Environment, source: &str) -> Result<(), ArcanaError> {
    struct Pending {
        dst_key: String,
        src_name: String,
        from_glob: String,
        to_glob: String,
        sources: Vec<String>,
    }

    let mut pending = Vec::new();

    for (key, stmt) in &env.vtable {
        let Some(props) = stmt.props_of(AttrKind::Map) else {
            continue;
        };
        let src_name = props[0].clone();

        let Some(src) = env.vtable.get(&src_name) else {
            return Err(post_err(
                source,
                format!("Map source '{src_name}' for '{key}' does not exist"),
                find_closest(env.vtable.keys().map(String::as_str), &src_name, 3),
            ));
        };

        let Some(expansion) = src.glob_expansion.as_ref().filter(|e| !e.is_empty()) else {
            return Err(post_err(
                source,
                format!("Cannot use non glob variable '{src_name}' to map '{key}'"),
                None,
            ));
        };

        pending.push(Pending {
            dst_key: key.clone(),
            src_name,
            from_glob: src.value.clone(),
            to_glob: stmt.value.clone(),
            sources: expansion.clone(),
        });
    }

    for p in pending {
        // Expansion output may be rooted under the project directory
        // while the pattern is written relative to it.
        let root = glob::base_prefix(&env.root);
        let sources: Vec<String> = p
            .sources
            .iter()
            .map(|s| s.strip_prefix(&root).map_or_else(|| s.clone(), str::to_string))
            .collect();

        let mapped = glob::map_glob_to_glob(&[p.from_glob], &p.to_glob, sources).map_err(|e| {
            post_err(
                source,
                format!("Mapping '{}' onto '{}' failed: {e}", p.src_name, p.dst_key),
                None,
            )
        })?;

        env.vtable
            .get_mut(&p.dst_key)
            .expect("pending key exists")
            .glob_expansion = Some(mapped);
    }

    Ok(())
}

fn evaluate_asserts(
    env: &Environment,
    builtins: &Builtins,
    source: &str,
) -> Result<(), ArcanaError> {
    for assert in &env.asserts {
        let subst = |text: &str| {
            substitute(text, env, builtins, SubstMode::Full).map_err(|(msg, hint)| {
                post_err(source, format!("In assert at line {}: {msg}", assert.line), hint)
            })
        };

        let lhs = subst(&assert.lhs)?;
        let rhs = subst(&assert.rhs)?;

        let holds = match assert.op {
            AssertOp::Eq => lhs == rhs,
            AssertOp::Ne => lhs != rhs,
            AssertOp::In => rhs.split_whitespace().any(|tok| tok == lhs),
        };

        if !holds {
            let reason = subst(&assert.reason)?;
            return Err(post_err(
                source,
                format!("Assert at line {} failed: {reason}", assert.line),
                None,
            ));
        }
    }

    Ok(())
}

fn substitute_tasks(
    env: &mut Environment,
    builtins: &Builtins,
    source: &str,
) -> Result<(), ArcanaError> {
    let snapshot = env.clone();
    let keys: Vec<String> = env.ftable.keys().cloned().collect();

    for key in keys {
        let task = env.ftable.get_mut(&key).expect("key collected above");

        for instr in &mut task.instructions {
            if instr.contains(SUBST_OPEN) {
                *instr = substitute(instr, &snapshot, builtins, SubstMode::Full).map_err(
                    |(msg, hint)| post_err(source, format!("In task '{key}': {msg}"), hint),
                )?;
            }
        }

        for attr in &mut task.attributes {
            for prop in &mut attr.props {
                if prop.contains(SUBST_OPEN) {
                    *prop = substitute(prop, &snapshot, builtins, SubstMode::Full).map_err(
                        |(msg, hint)| post_err(source, format!("In task '{key}': {msg}"), hint),
                    )?;
                }
            }
        }
    }

    Ok(())
}

/// Expands `{arc:...}` references inside `input`.
///
/// Returns `(message, hint)` on failure.
fn substitute(
    input: &str,
    env: &Environment,
    builtins: &Builtins,
    mode: SubstMode,
) -> Result<String, (String, Option<String>)> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find(SUBST_OPEN) {
        out.push_str(&rest[..open]);
        let after = &rest[open + SUBST_OPEN.len()..];

        let Some(close) = after.find('}') else {
            return Err(("Unterminated '{arc:' reference".to_string(), None));
        };

        let inner = &after[..close];
        let (list_form, name) = match inner.split_once(':') {
            Some(("list" | "inline", name)) => (true, name),
            Some(_) | None => (false, inner),
        };

        if list_form && mode == SubstMode::ScalarsOnly {
            // List forms resolve only after glob expansion; leave the
            // reference in place for the later pass.
            out.push_str(&rest[open..open + SUBST_OPEN.len() + close + 1]);
            rest = &after[close + 1..];
            continue;
        }

        if list_form {
            let Some(var) = env.vtable.get(name) else {
                return Err(unknown_symbol(env, builtins, name));
            };
            let Some(expansion) = var.glob_expansion.as_ref() else {
                return Err((
                    format!("Variable '{name}' has no glob expansion to inline"),
                    None,
                ));
            };
            out.push_str(&expansion.join(" "));
        } else if let Some(value) = builtins.get(name) {
            out.push_str(value);
        } else if let Some(var) = env.vtable.get(name) {
            out.push_str(&var.value);
        } else {
            return Err(unknown_symbol(env, builtins, name));
        }

        rest = &after[close + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

fn unknown_symbol(
    env: &Environment,
    builtins: &Builtins,
    name: &str,
) -> (String, Option<String>) {
    let candidates = env
        .vtable
        .keys()
        .map(String::as_str)
        .chain(builtins.iter().map(|(k, _)| k));

    (
        format!("Unknown symbol '{name}'"),
        find_closest(candidates, name, 3),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::SYM_OS;
    use crate::semantic::Collector;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn builtins() -> Builtins {
        Builtins::new(Path::new("."))
    }

    fn env_with(build: impl FnOnce(&mut Collector)) -> Environment {
        let mut c = Collector::new();
        build(&mut c);
        c.into_env()
    }

    #[test]
    fn test_alignment_invariant() {
        let mut env = env_with(|c| {
            c.collect_using("profiles", "Debug Release").unwrap();
            c.collect_attribute("profile", "Debug").unwrap();
            c.collect_assignment("FLAGS", "-g", false).unwrap();
            c.collect_attribute("profile", "Release").unwrap();
            c.collect_assignment("FLAGS", "-O2", false).unwrap();
            c.collect_attribute("main", "").unwrap();
            c.collect_task("Build", "", vec![]).unwrap();
        });
        env.active_profile = "Release".to_string();

        let mut b = builtins();
        post_process(&mut env, &mut b, None, "arcfile").unwrap();

        assert_eq!(env.vtable["FLAGS"].value, "-O2");
        assert!(!env.vtable.contains_key("FLAGS@@Debug"));
        assert!(env.vtable.keys().all(|k| !k.contains("@@")));
        assert!(env.ftable.keys().all(|k| !k.contains("@@")));
    }

    #[test]
    fn test_root_task_resolution() {
        let mut env = env_with(|c| {
            c.collect_attribute("main", "").unwrap();
            c.collect_task("Build", "", vec![]).unwrap();
            c.collect_task("Clean", "", vec![]).unwrap();
        });

        let mut b = builtins();
        let root = post_process(&mut env, &mut b, None, "arcfile").unwrap();
        assert_eq!(root, "Build");
        assert_eq!(b.get(SYM_MAIN), Some("Build"));
    }

    #[test]
    fn test_unknown_requested_task_hints() {
        let mut env = env_with(|c| {
            c.collect_task("Build", "", vec![]).unwrap();
        });

        let mut b = builtins();
        let err = post_process(&mut env, &mut b, Some("Biuld"), "arcfile").unwrap_err();
        match err {
            ArcanaError::Plan(PlanError::UnknownTask { hint, .. }) => {
                assert_eq!(hint.as_deref(), Some("Build"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_value_substitution_chains() {
        let mut env = env_with(|c| {
            c.collect_assignment("A", "one", false).unwrap();
            c.collect_assignment("B", "{arc:A} two", false).unwrap();
            c.collect_assignment("C", "{arc:B} three", false).unwrap();
            c.collect_task("T", "", vec![]).unwrap();
        });

        let mut b = builtins();
        post_process(&mut env, &mut b, Some("T"), "arcfile").unwrap();
        assert_eq!(env.vtable["C"].value, "one two three");
    }

    #[test]
    fn test_glob_variable_expansion() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/a.c"), "").unwrap();
        fs::write(dir.path().join("src/b.c"), "").unwrap();

        let mut env = env_with(|c| {
            c.collect_attribute("glob", "").unwrap();
            c.collect_assignment("SOURCES", "src/*.c", false).unwrap();
            c.collect_task("T", "", vec![]).unwrap();
        });
        env.root = dir.path().to_path_buf();

        let mut b = builtins();
        post_process(&mut env, &mut b, Some("T"), "arcfile").unwrap();

        let expansion = env.vtable["SOURCES"].glob_expansion.as_ref().unwrap();
        assert_eq!(expansion.len(), 2);
        assert!(expansion[0].ends_with("src/a.c"));
        assert!(expansion[1].ends_with("src/b.c"));
    }

    #[test]
    fn test_map_resolution() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/a.c"), "").unwrap();
        fs::write(dir.path().join("src/b.c"), "").unwrap();

        let mut env = env_with(|c| {
            c.collect_attribute("glob", "").unwrap();
            c.collect_assignment("SOURCES", "src/*.c", false).unwrap();
            c.collect_assignment("OBJECTS", "obj/*.o", false).unwrap();
            c.collect_mapping("SOURCES", "OBJECTS").unwrap();
            c.collect_task("T", "", vec![]).unwrap();
        });
        env.root = dir.path().to_path_buf();

        let mut b = builtins();
        post_process(&mut env, &mut b, Some("T"), "arcfile").unwrap();

        assert_eq!(
            env.vtable["OBJECTS"].glob_expansion.as_ref().unwrap(),
            &vec!["obj/a.o".to_string(), "obj/b.o".to_string()]
        );
    }

    #[test]
    fn test_map_from_non_glob_variable_fails() {
        let mut env = env_with(|c| {
            c.collect_assignment("SOURCES", "plain value", false).unwrap();
            c.collect_assignment("OBJECTS", "obj/*.o", false).unwrap();
            c.collect_mapping("SOURCES", "OBJECTS").unwrap();
            c.collect_task("T", "", vec![]).unwrap();
        });

        let mut b = builtins();
        let err = post_process(&mut env, &mut b, Some("T"), "arcfile").unwrap_err();
        assert!(matches!(err, ArcanaError::PostProcess(_)));
    }

    #[test]
    fn test_assert_eq_pass_and_fail() {
        let mut env = env_with(|c| {
            c.collect_assignment("X", "yes", false).unwrap();
            c.collect_assert(1, "assert", "{arc:X}", "eq", "yes", "should not fire")
                .unwrap();
            c.collect_task("T", "", vec![]).unwrap();
        });

        let mut b = builtins();
        post_process(&mut env, &mut b, Some("T"), "arcfile").unwrap();

        let mut env = env_with(|c| {
            c.collect_assignment("X", "no", false).unwrap();
            c.collect_assert(3, "assert", "{arc:X}", "eq", "yes", "X must be yes, got {arc:X}")
                .unwrap();
            c.collect_task("T", "", vec![]).unwrap();
        });

        let err = post_process(&mut env, &mut b, Some("T"), "arcfile").unwrap_err();
        let ArcanaError::PostProcess(p) = err else {
            panic!("expected a post-process error");
        };
        assert!(p.message.contains("X must be yes, got no"));
        assert!(p.message.contains("line 3"));
    }

    #[test]
    fn test_assert_in_membership() {
        let mut env = env_with(|c| {
            c.collect_assert(1, "assert", "{arc:__os__}", "in", "linux macos freeBSD", "os")
                .unwrap();
            c.collect_task("T", "", vec![]).unwrap();
        });
        let mut b = builtins();
        b.set(SYM_OS, "macos");

        post_process(&mut env, &mut b, Some("T"), "arcfile").unwrap();
    }

    #[test]
    fn test_instruction_substitution() {
        let mut env = env_with(|c| {
            c.collect_assignment("X", "hello", false).unwrap();
            c.collect_task("Main", "", vec!["echo {arc:X}".to_string()])
                .unwrap();
        });

        let mut b = builtins();
        post_process(&mut env, &mut b, Some("Main"), "arcfile").unwrap();
        assert_eq!(env.ftable["Main"].instructions[0], "echo hello");
    }

    #[test]
    fn test_list_substitution_in_attribute_props() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/a.c"), "").unwrap();

        let mut env = env_with(|c| {
            c.collect_attribute("glob", "").unwrap();
            c.collect_assignment("SOURCES", "src/*.c", false).unwrap();
            c.collect_attribute("cache", "track {arc:list:SOURCES}").unwrap();
            c.collect_task("T", "", vec![]).unwrap();
        });
        env.root = dir.path().to_path_buf();

        let mut b = builtins();
        post_process(&mut env, &mut b, Some("T"), "arcfile").unwrap();

        let props = env.ftable["T"].props_of(AttrKind::Cache).unwrap();
        assert!(props[1].ends_with("src/a.c"));
    }

    #[test]
    fn test_unknown_symbol_hint() {
        let mut env = env_with(|c| {
            c.collect_assignment("TARGET", "app", false).unwrap();
            c.collect_task("T", "", vec!["echo {arc:TARGT}".to_string()])
                .unwrap();
        });

        let mut b = builtins();
        let err = post_process(&mut env, &mut b, Some("T"), "arcfile").unwrap_err();
        let ArcanaError::PostProcess(p) = err else {
            panic!("expected a post-process error");
        };
        assert_eq!(p.hint.as_deref(), Some("TARGET"));
    }
}
