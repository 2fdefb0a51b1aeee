//! Job execution.
//!
//! Jobs run strictly in plan order. Inside a job, instructions run
//! sequentially unless the job is parallelizable, in which case a
//! bounded rayon pool executes them with indexed result collection
//! (`results[i]` always belongs to instruction `i`). Each instruction
//! is materialised as a script in the cache and handed to the job's
//! interpreter.
//!
//! Tracked-input jobs are skipped when none of their inputs changed
//! since the previous run; `store` inputs are recorded after a
//! successful job and `untrack` inputs tombstoned before it runs.

use crate::builtins::max_threads;
use crate::cache::CacheManager;
use crate::jobs::{Job, JobList};
use std::process::Command;

/// Exit code used when the interpreter itself cannot be spawned.
const EXIT_NOT_FOUND: i32 = 127;

/// Outcome of one instruction.
#[derive(Debug, Clone)]
pub struct InstructionResult {
    pub command: String,
    pub exit_code: i32,
}

/// Outcome of one job.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub name: String,
    pub ok: bool,
    /// Exit code of the lowest-indexed failing instruction, 0 if none.
    pub first_error: i32,
    pub results: Vec<InstructionResult>,
    /// True when unchanged tracked inputs let the job skip execution.
    pub skipped: bool,
}

impl JobResult {
    fn passed(name: &str, skipped: bool) -> Self {
        Self {
            name: name.to_string(),
            ok: true,
            first_error: 0,
            results: Vec::new(),
            skipped,
        }
    }
}

/// Executor options.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub silent: bool,
    pub stop_on_error: bool,
    pub max_parallelism: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            silent: false,
            stop_on_error: true,
            max_parallelism: max_threads(),
        }
    }
}

fn script_ext() -> &'static str {
    if cfg!(windows) {
        ".bat"
    } else {
        ".sh"
    }
}

fn run_instruction(
    cache: &CacheManager,
    jobname: &str,
    idx: usize,
    interpreter: &str,
    command: &str,
    echo: bool,
) -> InstructionResult {
    if echo {
        println!("{command}");
    }

    let script = match cache.write_script(jobname, idx, command, script_ext()) {
        Ok(path) => path,
        Err(e) => {
            tracing::error!(job = jobname, idx, error = %e, "script write failed");
            return InstructionResult {
                command: command.to_string(),
                exit_code: EXIT_NOT_FOUND,
            };
        }
    };

    // The interpreter value may carry arguments (e.g. "cmd /C").
    let mut parts = interpreter.split_whitespace();
    let program = parts.next().unwrap_or(interpreter);

    let status = Command::new(program)
        .args(parts)
        .arg(&script)
        .status();

    let exit_code = match status {
        // A signal-terminated child reports no code; fold it into the
        // generic failure value.
        Ok(status) => status.code().unwrap_or(EXIT_NOT_FOUND),
        Err(e) => {
            tracing::error!(job = jobname, interpreter, error = %e, "spawn failed");
            EXIT_NOT_FOUND
        }
    };

    InstructionResult {
        command: command.to_string(),
        exit_code,
    }
}

fn run_job(job: &Job, cache: &CacheManager, opt: &RunOptions) -> JobResult {
    let mut result = JobResult {
        name: job.name.clone(),
        ok: true,
        first_error: 0,
        results: Vec::new(),
        skipped: false,
    };

    if job.parallelizable {
        let width = job
            .requested_threads
            .unwrap_or(usize::MAX)
            .min(opt.max_parallelism)
            .min(max_threads())
            .max(1);

        result.results = run_parallel(job, cache, width);

        // Lowest-indexed failure wins.
        for r in &result.results {
            if r.exit_code != 0 {
                result.ok = false;
                result.first_error = r.exit_code;
                break;
            }
        }

        return result;
    }

    for (idx, command) in job.instructions.iter().enumerate() {
        let r = run_instruction(cache, &job.name, idx, &job.interpreter, command, job.echo);
        let failed = r.exit_code != 0;
        let code = r.exit_code;
        result.results.push(r);

        if failed {
            result.ok = false;
            result.first_error = code;

            if opt.stop_on_error {
                break;
            }
        }
    }

    result
}

/// Runs a job's instructions on a bounded worker pool. Collection is
/// indexed, so the result order matches the instruction order
/// regardless of completion order.
fn run_parallel(job: &Job, cache: &CacheManager, width: usize) -> Vec<InstructionResult> {
    let pool = rayon::ThreadPoolBuilder::new().num_threads(width).build();

    let Ok(pool) = pool else {
        tracing::warn!(job = %job.name, "worker pool unavailable, running sequentially");
        return job
            .instructions
            .iter()
            .enumerate()
            .map(|(idx, cmd)| {
                run_instruction(cache, &job.name, idx, &job.interpreter, cmd, job.echo)
            })
            .collect();
    };

    pool.install(|| {
        use rayon::prelude::*;

        job.instructions
            .par_iter()
            .enumerate()
            .map(|(idx, cmd)| {
                run_instruction(cache, &job.name, idx, &job.interpreter, cmd, job.echo)
            })
            .collect()
    })
}

/// Runs the planned jobs in order, consulting the cache for skip
/// decisions. Returns per-job results; with `stop_on_error` the list
/// ends at the first failing job.
pub fn run_jobs(jobs: &JobList, cache: &mut CacheManager, opt: &RunOptions) -> Vec<JobResult> {
    let mut results = Vec::with_capacity(jobs.len());
    let mut all_ok = true;

    for job in jobs.all() {
        if !opt.silent {
            tracing::info!("Running task: {}", job.name);
        }

        if !job.untrack_inputs.is_empty() {
            cache.clear(&job.untrack_inputs);
        }

        if !job.track_inputs.is_empty() {
            // Every input must be probed: the probe records new hashes.
            let mut changed = false;
            for input in &job.track_inputs {
                changed |= cache.has_file_changed(input);
            }

            if !changed {
                tracing::debug!(job = %job.name, "tracked inputs unchanged, skipping");
                results.push(JobResult::passed(&job.name, true));
                continue;
            }
        }

        let result = run_job(job, cache, opt);

        if result.ok {
            for input in &job.store_inputs {
                cache.has_file_changed(input);
            }
        }

        let failed = !result.ok;
        results.push(result);

        if failed {
            all_ok = false;
            tracing::error!("Task failed: {}", job.name);

            if opt.stop_on_error {
                break;
            }
        }
    }

    if all_ok && !opt.silent {
        tracing::info!("Action '{}' done!", jobs.main_job);
    }

    results
}

/// First non-zero exit code across all job results, 0 when clean.
#[must_use]
pub fn first_error(results: &[JobResult]) -> i32 {
    results
        .iter()
        .find(|r| !r.ok)
        .map_or(0, |r| r.first_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cache(dir: &TempDir) -> CacheManager {
        let mut cache = CacheManager::new(dir.path().join(".arcana"));
        cache.load("default").unwrap();
        cache
    }

    fn job(name: &str, instructions: &[&str]) -> Job {
        Job {
            name: name.to_string(),
            instructions: instructions.iter().map(|s| (*s).to_string()).collect(),
            interpreter: "/bin/sh".to_string(),
            parallelizable: false,
            requested_threads: None,
            echo: false,
            track_inputs: Vec::new(),
            store_inputs: Vec::new(),
            untrack_inputs: Vec::new(),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_sequential_success() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let j = job("Ok", &["exit 0", "exit 0"]);

        let r = run_job(&j, &cache, &RunOptions::default());
        assert!(r.ok);
        assert_eq!(r.results.len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_sequential_stops_on_error() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let j = job("Fail", &["exit 3", "exit 0"]);

        let r = run_job(&j, &cache, &RunOptions::default());
        assert!(!r.ok);
        assert_eq!(r.first_error, 3);
        assert_eq!(r.results.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_sequential_continues_without_stop_on_error() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let j = job("Fail", &["exit 3", "exit 0"]);

        let opt = RunOptions {
            stop_on_error: false,
            ..RunOptions::default()
        };
        let r = run_job(&j, &cache, &opt);
        assert!(!r.ok);
        assert_eq!(r.results.len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_parallel_first_error_is_lowest_index() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);

        let mut j = job("Par", &["exit 0", "exit 2", "exit 5"]);
        j.parallelizable = true;

        let opt = RunOptions {
            max_parallelism: 3,
            ..RunOptions::default()
        };
        let r = run_job(&j, &cache, &opt);

        assert!(!r.ok);
        assert_eq!(r.first_error, 2);
        // Indexed collection: result i belongs to instruction i.
        assert_eq!(r.results[0].exit_code, 0);
        assert_eq!(r.results[1].exit_code, 2);
        assert_eq!(r.results[2].exit_code, 5);
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_interpreter_is_127() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);

        let mut j = job("NoShell", &["exit 0"]);
        j.interpreter = "/definitely/not/a/shell".to_string();

        let r = run_job(&j, &cache, &RunOptions::default());
        assert_eq!(r.first_error, 127);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_jobs_skips_unchanged_tracked_job() {
        let dir = TempDir::new().unwrap();
        let mut cache = cache(&dir);

        let input = dir.path().join("tracked.txt");
        std::fs::write(&input, "v1").unwrap();

        let mut env = crate::semantic::Environment::default();
        env.ftable.insert(
            "Cached".to_string(),
            crate::semantic::TaskDef {
                name: "Cached".to_string(),
                params: vec![],
                instructions: vec!["exit 0".to_string()],
                attributes: vec![],
            },
        );

        let mut list = crate::jobs::plan(&env, "Cached").unwrap();
        list.all_mut()[0].track_inputs = vec![input.to_string_lossy().to_string()];

        let opt = RunOptions {
            silent: true,
            ..RunOptions::default()
        };

        let first = run_jobs(&list, &mut cache, &opt);
        assert!(!first[0].skipped);

        let second = run_jobs(&list, &mut cache, &opt);
        assert!(second[0].skipped);
        assert!(second[0].ok);

        // Touching the input re-runs the job.
        std::fs::write(&input, "v2").unwrap();
        let third = run_jobs(&list, &mut cache, &opt);
        assert!(!third[0].skipped);
    }

    #[test]
    fn test_first_error_helper() {
        let results = vec![
            JobResult::passed("a", false),
            JobResult {
                name: "b".into(),
                ok: false,
                first_error: 9,
                results: vec![],
                skipped: false,
            },
        ];
        assert_eq!(first_error(&results), 9);
    }
}
