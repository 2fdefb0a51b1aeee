//! arcana: declarative build automation.
//!
//! Usage:
//!   arcana <task>                # run a task from ./arcfile
//!   arcana -s build.arc <task>   # pick the script file
//!   arcana -p Release <task>     # select a profile
//!   arcana --generate [path]     # emit a starter arcfile

use arcana::builtins::{self, Builtins, SYM_PROFILE, SYM_THREADS};
use arcana::cache::CacheManager;
use arcana::error::ArcanaError;
use arcana::exec::{self, RunOptions};
use arcana::table::find_closest;
use arcana::{fmt, generator, jobs, parser, postproc};
use clap::error::ErrorKind;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const EXIT_OK: u8 = 0;
/// Help, version and template generation exit early but successfully.
const EXIT_DONE: u8 = 1;
const EXIT_FAILURE: u8 = 2;

#[derive(Parser)]
#[command(name = "arcana")]
#[command(about = "Declarative build automation")]
#[command(version)]
struct Cli {
    /// Task to run
    task: Option<String>,

    /// Arcfile to read
    #[arg(short = 's', value_name = "FILE", default_value = "arcfile")]
    script: PathBuf,

    /// Build profile
    #[arg(short = 'p', value_name = "PROFILE")]
    profile: Option<String>,

    /// Worker count for parallel jobs
    #[arg(short = 't', value_name = "N")]
    threads: Option<usize>,

    /// Emit a starter arcfile (to a path, or "stdout")
    #[arg(long, value_name = "PATH", num_args = 0..=1, default_missing_value = "arcfile")]
    generate: Option<String>,

    /// Print the planned job list before running
    #[arg(long)]
    debug: bool,

    /// Drop the on-disk cache before running
    #[arg(long)]
    flush_cache: bool,

    /// Suppress progress output
    #[arg(long)]
    silent: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::from(EXIT_DONE);
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let default_level = if cli.debug { "arcana=debug" } else { "arcana=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            report(&err);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn report(err: &ArcanaError) {
    let color = std::io::stderr().is_terminal();
    let mut stderr = std::io::stderr().lock();

    let rendered = match err {
        ArcanaError::Syntax(e) => fmt::fmt_syntax_error(&mut stderr, e, color),
        ArcanaError::Semantic(e) => fmt::fmt_semantic_error(&mut stderr, e, color),
        ArcanaError::PostProcess(e) => fmt::fmt_postprocess_error(&mut stderr, e, color),
        other => {
            eprintln!("[ERROR] {other}");
            Ok(())
        }
    };

    if rendered.is_err() {
        eprintln!("[ERROR] {err}");
    }
}

fn run(cli: Cli) -> arcana::Result<u8> {
    if let Some(target) = cli.generate.as_deref() {
        generator::generate(target)?;
        return Ok(EXIT_DONE);
    }

    if let Some(0) = cli.threads {
        return Err(ArcanaError::Args(
            "Invalid value for option -t: expected a positive integer".to_string(),
        ));
    }

    let mut cache = CacheManager::new(".arcana");
    if cli.flush_cache {
        cache.erase();
        if cli.task.is_none() {
            return Ok(EXIT_OK);
        }
    }

    if !cli.script.is_file() {
        return Err(ArcanaError::Args(format!(
            "Script {} not found",
            cli.script.display()
        )));
    }

    let mut env = parser::parse_file(&cli.script)?;

    // Profile validation against the declared set.
    if let Some(profile) = &cli.profile {
        if !env.profiles.contains(profile) {
            return Err(ArcanaError::Args(format!(
                "Unknown profile '{profile}'{}",
                find_closest(env.profiles.iter().map(String::as_str), profile, 3)
                    .map(|h| format!(" (did you mean '{h}'?)"))
                    .unwrap_or_default(),
            )));
        }
        env.active_profile = profile.clone();
    }

    // Worker pool width: -t beats 'using threads' beats the hardware.
    if let Some(threads) = cli.threads {
        env.threads = threads;
    } else if env.threads == 0 {
        env.threads = builtins::max_threads();
    }

    env.root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let mut syms = Builtins::new(&env.root);
    syms.set(
        SYM_PROFILE,
        if env.active_profile.is_empty() {
            "None".to_string()
        } else {
            env.active_profile.clone()
        },
    );
    syms.set(SYM_THREADS, env.threads.to_string());

    cache.load(&env.active_profile)?;

    let source = cli.script.display().to_string();
    let root_task = postproc::post_process(&mut env, &mut syms, cli.task.as_deref(), &source)?;

    let plan = jobs::plan(&env, &root_task)?;

    if cli.debug {
        let mut stderr = std::io::stderr().lock();
        let _ = fmt::fmt_debug_jobs(&mut stderr, &plan);
    }

    let options = RunOptions {
        silent: cli.silent,
        stop_on_error: true,
        max_parallelism: env.threads,
    };

    let results = exec::run_jobs(&plan, &mut cache, &options);
    let code = exec::first_error(&results);

    if code != 0 {
        let task = results
            .iter()
            .find(|r| !r.ok)
            .map_or_else(|| root_task.clone(), |r| r.name.clone());

        return Err(ArcanaError::Job {
            task,
            exit_code: code,
        });
    }

    Ok(EXIT_OK)
}
