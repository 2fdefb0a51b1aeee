//! Job planning: environment to ordered, deduplicated job list.
//!
//! The plan is rooted at the requested task (or the one carrying
//! `@main`). For every task the planner first emits its `requires`
//! tasks, then the sub-tasks listed as `@main` properties, then the
//! task itself. A name-index set guarantees each job appears at most
//! once, which also breaks dependency cycles.

use crate::error::PlanError;
use crate::semantic::{AttrKind, Attributed, Environment, TaskDef};
use crate::table::find_closest;
use std::collections::HashSet;

/// Runtime description of one planned task.
#[derive(Debug, Clone)]
pub struct Job {
    pub name: String,
    pub instructions: Vec<String>,
    pub interpreter: String,
    pub parallelizable: bool,
    /// Worker count asked for via `@multithread N`, if any.
    pub requested_threads: Option<usize>,
    pub echo: bool,
    pub track_inputs: Vec<String>,
    pub store_inputs: Vec<String>,
    pub untrack_inputs: Vec<String>,
}

/// Ordered execution plan.
#[derive(Debug, Clone, Default)]
pub struct JobList {
    /// Name of the task the plan is rooted at.
    pub main_job: String,
    jobs: Vec<Job>,
    index: HashSet<String>,
}

impl JobList {
    /// All jobs in execution order.
    #[must_use]
    pub fn all(&self) -> &[Job] {
        &self.jobs
    }

    /// Mutable view over the planned jobs.
    pub fn all_mut(&mut self) -> &mut [Job] {
        &mut self.jobs
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn insert(&mut self, job: Job) {
        if self.index.insert(job.name.clone()) {
            self.jobs.push(job);
        }
    }
}

/// Builds the execution plan rooted at `root_task`.
///
/// # Errors
///
/// Returns [`PlanError::UnknownTask`] when the root or any referenced
/// task does not exist, with a closest-match hint.
pub fn plan(env: &Environment, root_task: &str) -> Result<JobList, PlanError> {
    let mut list = JobList {
        main_job: root_task.to_string(),
        ..JobList::default()
    };

    emit(env, root_task, &mut list)?;
    Ok(list)
}

fn lookup<'e>(env: &'e Environment, name: &str) -> Result<&'e TaskDef, PlanError> {
    env.ftable.get(name).ok_or_else(|| PlanError::UnknownTask {
        name: name.to_string(),
        hint: find_closest(env.ftable.keys().map(String::as_str), name, 3),
    })
}

fn emit(env: &Environment, name: &str, list: &mut JobList) -> Result<(), PlanError> {
    if list.index.contains(name) {
        return Ok(());
    }

    let task = lookup(env, name)?;

    // Reserve the name first so requirement cycles terminate.
    list.index.insert(name.to_string());

    if let Some(required) = task.props_of(AttrKind::Requires) {
        for dep in required {
            emit(env, dep, list)?;
        }
    }

    for sub in main_subtasks(env, task) {
        emit(env, &sub, list)?;
    }

    list.jobs.push(job_from_task(env, task));
    Ok(())
}

/// Sub-tasks named by the `@main` attribute. A bare `@main` defaults
/// to the conventional `Main` task when one exists.
fn main_subtasks(env: &Environment, task: &TaskDef) -> Vec<String> {
    let Some(props) = task.props_of(AttrKind::Main) else {
        return Vec::new();
    };

    if props.is_empty() {
        if task.name != "Main" && env.ftable.contains_key("Main") {
            return vec!["Main".to_string()];
        }
        return Vec::new();
    }

    props.to_vec()
}

fn job_from_task(env: &Environment, task: &TaskDef) -> Job {
    let interpreter = task
        .props_of(AttrKind::Interpreter)
        .and_then(|p| p.first())
        .cloned()
        .unwrap_or_else(|| env.interpreter.clone());

    let requested_threads = task
        .props_of(AttrKind::Multithread)
        .and_then(|p| p.first())
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|n| *n > 0);

    let mut track_inputs = Vec::new();
    let mut store_inputs = Vec::new();
    let mut untrack_inputs = Vec::new();

    for attr in task.attributes() {
        if attr.kind != AttrKind::Cache {
            continue;
        }
        let Some((selector, inputs)) = attr.props.split_first() else {
            continue;
        };

        // Substituted properties may hold several paths in one string.
        let inputs = inputs
            .iter()
            .flat_map(|p| p.split_whitespace())
            .map(str::to_string);

        match selector.to_ascii_lowercase().as_str() {
            "track" => track_inputs.extend(inputs),
            "store" => store_inputs.extend(inputs),
            "untrack" => untrack_inputs.extend(inputs),
            _ => {}
        }
    }

    Job {
        name: task.name.clone(),
        instructions: task.instructions.clone(),
        interpreter,
        parallelizable: task.has_attr(AttrKind::Multithread),
        requested_threads,
        echo: task.has_attr(AttrKind::Echo),
        track_inputs,
        store_inputs,
        untrack_inputs,
    }
}
