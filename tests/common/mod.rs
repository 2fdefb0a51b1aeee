//! Common test utilities for arcana integration tests.
//!
//! Provides `TestEnv` for setting up isolated scratch projects: a
//! temp directory holding source files, an arcfile, and a private
//! cache directory, with the whole pipeline (parse, post-process,
//! plan, run) wired together.

#![allow(dead_code)] // Test utilities may not all be used in every test file

use arcana::builtins::{Builtins, SYM_PROFILE, SYM_THREADS};
use arcana::cache::CacheManager;
use arcana::exec::{self, JobResult, RunOptions};
use arcana::jobs::{self, JobList};
use arcana::semantic::Environment;
use arcana::{parser, postproc};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// An isolated project directory with its own cache.
pub struct TestEnv {
    pub dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Writes a file under the project directory, creating parents.
    pub fn write_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        fs::write(&path, content).expect("Failed to write test file");
    }

    /// Absolute path of a file inside the project directory.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Absolute path as a string, for use inside arcfile content.
    pub fn path_str(&self, name: &str) -> String {
        self.path(name).to_string_lossy().to_string()
    }

    /// Parses arcfile content rooted at this project directory.
    pub fn parse(&self, content: &str) -> Environment {
        let mut env = parser::parse_source("arcfile", content).expect("parse failed");
        env.root = self.dir.path().to_path_buf();
        env
    }

    /// Parses and post-processes, returning environment and root task.
    pub fn process(
        &self,
        content: &str,
        task: Option<&str>,
        profile: Option<&str>,
    ) -> (Environment, Builtins, String) {
        let mut env = self.parse(content);

        if let Some(profile) = profile {
            env.active_profile = profile.to_string();
        }
        if env.threads == 0 {
            env.threads = 2;
        }

        let mut syms = Builtins::new(self.dir.path());
        syms.set(SYM_THREADS, env.threads.to_string());
        syms.set(SYM_PROFILE, profile.unwrap_or("None"));

        let root = postproc::post_process(&mut env, &mut syms, task, "arcfile")
            .expect("post-process failed");

        (env, syms, root)
    }

    /// Full pipeline: parse, post-process, plan.
    pub fn plan(&self, content: &str, task: Option<&str>) -> JobList {
        let (env, _, root) = self.process(content, task, None);
        jobs::plan(&env, &root).expect("planning failed")
    }

    /// Opens this project's cache for the given profile.
    pub fn cache(&self, profile: &str) -> CacheManager {
        let mut cache = CacheManager::new(self.dir.path().join(".arcana"));
        cache.load(profile).expect("cache load failed");
        cache
    }

    /// Plans and executes, silently, against this project's cache.
    pub fn run(&self, content: &str, task: Option<&str>) -> Vec<JobResult> {
        let plan = self.plan(content, task);
        let mut cache = self.cache("");

        let options = RunOptions {
            silent: true,
            stop_on_error: true,
            max_parallelism: 4,
        };

        exec::run_jobs(&plan, &mut cache, &options)
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// A project with a small C-like source tree.
pub fn source_tree() -> TestEnv {
    let env = TestEnv::new();
    env.write_file("src/a.c", "int a;\n");
    env.write_file("src/b.c", "int b;\n");
    env.write_file("src/sub/c.c", "int c;\n");
    env
}
