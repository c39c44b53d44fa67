use std::path::PathBuf;

use anyhow::{anyhow, Result};

use crate::db::Database;
use crate::errors::Errors;
use crate::exec::{hostname, ExecutionQueue, JobCallable, JobStats};
use crate::jobs::{Completion, JobInstance, Retry};
use crate::ui::Ui;
use crate::workflow::{Workflow, WorkflowScope};

/// Dependency ordering of expanded job instances
mod graph;
use graph::{JobGraph, State};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Dependency cycle between jobs: {0}")]
    Cycle(String),
    #[error("Workflow at {0} was re-expanded more than {1} times")]
    TooManyRegenerations(String, usize),
}

/// Options for a workflow run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Most jobs handed to the queue at once.
    pub max_jobs: usize,
    /// Run every job, stale or not.
    pub rerun: bool,
    /// Delete temporary files once the whole run succeeds.
    pub cleanup: bool,
    /// Bound on re-expansions of a single workflow scope.
    pub max_regenerations: usize,
    /// Root of the job shelf, logs and temporary resources.
    pub temps_dir: PathBuf,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_jobs: 1,
            rerun: false,
            cleanup: false,
            max_regenerations: 100,
            temps_dir: PathBuf::from(crate::DEFAULT_TEMPS_DIR),
        }
    }
}

/// What came of receiving a job from the queue.
enum Outcome {
    Succeeded(Completion),
    /// A sub-workflow job built its workflow; the callable is finalized once
    /// that workflow has run.
    SubWorkflow(Workflow, JobCallable),
    Retry,
    Failed,
}

/// Drives a workflow to completion: expands jobs, dispatches the stale ones
/// to a queue, and re-expands whenever an axis changes.
pub struct WorkflowRunner {
    db: Database,
    queue: Box<dyn ExecutionQueue>,
    settings: RunSettings,
    ui: Ui,
    /// Jobs that succeeded during this run.
    completed: util::HashSet<String>,
    /// Jobs that exhausted their retries during this run.
    failed: util::HashSet<String>,
}

impl WorkflowRunner {
    pub fn new(db: Database, queue: Box<dyn ExecutionQueue>, settings: RunSettings, ui: Ui) -> Self {
        Self {
            db,
            queue,
            settings,
            ui,
            completed: Default::default(),
            failed: Default::default(),
        }
    }

    /// Open the database under `settings.temps_dir`.
    pub fn open(settings: RunSettings, queue: Box<dyn ExecutionQueue>, ui: Ui) -> Result<Self> {
        let db = Database::open(&settings.temps_dir)?;
        Ok(Self::new(db, queue, settings, ui))
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut Database {
        &mut self.db
    }

    /// Run `workflow` until every job is up to date or has failed.
    /// Job failures are collected and reported together at the end.
    pub fn run(&mut self, workflow: &Workflow) -> Result<()> {
        let mut errors = Errors::default();
        self.run_scope(workflow, &WorkflowScope::root(), &mut errors)?;
        self.ui.print_elapsed("Running workflow");
        errors.print_recap("running workflow")?;

        if self.settings.cleanup {
            let removed = self.db.resmgr.cleanup()?;
            log::info!("removed {removed} temporary files");
        }
        Ok(())
    }

    fn run_scope(&mut self, workflow: &Workflow, scope: &WorkflowScope, errors: &mut Errors) -> Result<()> {
        let mut regenerations = 0;
        while self.run_pass(workflow, scope, errors)? {
            regenerations += 1;
            if regenerations > self.settings.max_regenerations {
                let location = match scope.prefix.trim_end_matches(crate::node::NODE_DELIM) {
                    "" => "/".to_owned(),
                    prefix => scope.node.join_name(prefix),
                };
                return Err(Error::TooManyRegenerations(location, self.settings.max_regenerations).into());
            }
            log::info!("re-expanding workflow {}(pass {})", scope.prefix, regenerations + 1);
        }
        Ok(())
    }

    /// Expand and run one pass. Returns true if the workflow must be expanded again.
    fn run_pass(&mut self, workflow: &Workflow, scope: &WorkflowScope, errors: &mut Errors) -> Result<bool> {
        let mut graph = self.expand(workflow, scope)?;
        if graph.is_empty() {
            log::debug!("nothing to run at /{}", scope.node);
            return Ok(false);
        }
        log::debug!("expanded {} jobs at /{}", graph.len(), scope.node);
        self.mark_required(&mut graph);

        let mut regenerate = false;
        let mut sub_workflows: Vec<(usize, Workflow, JobCallable)> = Vec::new();

        loop {
            if !regenerate && sub_workflows.is_empty() {
                self.dispatch(&mut graph, errors)?;
            }
            if self.queue.empty() {
                break;
            }
            let Some(name) = self.queue.wait(false)? else {
                break;
            };
            let Some(i) = graph.find(&name) else {
                log::warn!("queue returned unknown job {name}");
                continue;
            };

            match self.receive(&mut graph.jobs[i], &name, errors)? {
                Outcome::Succeeded(completion) => {
                    if completion.graph_dirty {
                        log::info!("{name} changed an axis; finishing running jobs before re-expanding");
                        regenerate = true;
                    }
                    self.complete(&mut graph.jobs[i])?;
                    graph.states[i] = State::Done;
                }
                Outcome::SubWorkflow(wf, callable) => {
                    graph.states[i] = State::AwaitingWorkflow;
                    sub_workflows.push((i, wf, callable));
                }
                Outcome::Retry => graph.states[i] = State::Pending,
                Outcome::Failed => graph.states[i] = State::Failed,
            }
        }

        // the queue is drained, so sub-workflows see a settled parent.
        for (i, wf, callable) in sub_workflows {
            let job = &mut graph.jobs[i];
            let name = job.displayname().to_owned();
            let child = scope.child(&job.def.name, &job.node);
            self.ui.verbose_msg(&format!("Running sub-workflow {name}"));

            let before = errors.len();
            self.run_scope(&wf, &child, errors)?;
            if errors.len() != before {
                self.failed.insert(name);
                graph.states[i] = State::Failed;
                continue;
            }

            // outputs declared by the sub-workflow job were written by its own jobs.
            let duration = callable.duration();
            match job.finalize(callable, &mut self.db) {
                Ok(_) => {
                    self.ui.job_completed(&name, duration);
                    self.complete(job)?;
                    graph.states[i] = State::Done;
                    regenerate = true;
                }
                Err(e) => {
                    self.ui.job_failed(&name, "");
                    errors.add_context(e, format!("sub-workflow {name} failed"));
                    self.failed.insert(name);
                    graph.states[i] = State::Failed;
                }
            }
        }

        if !regenerate {
            for (job, state) in graph.jobs.iter().zip(&graph.states) {
                if *state == State::Pending {
                    log::warn!("{} was not run", job.displayname());
                }
            }
        }
        Ok(regenerate)
    }

    fn expand(&mut self, workflow: &Workflow, scope: &WorkflowScope) -> Result<JobGraph> {
        let mut jobs = Vec::with_capacity(workflow.defs().len());
        for def in workflow.defs() {
            jobs.extend(def.create_job_instances(scope, &mut self.db)?);
        }
        let mut graph = JobGraph::new(jobs)?;
        for (job, state) in graph.jobs.iter().zip(graph.states.iter_mut()) {
            if self.completed.contains(job.displayname()) {
                *state = State::Done;
            } else if self.failed.contains(job.displayname()) {
                *state = State::Failed;
            }
        }
        Ok(graph)
    }

    /// Walk the graph from the bottom up; a stale job missing an input
    /// forces the input's producer to run even if that producer looks up to date.
    fn mark_required(&self, graph: &mut JobGraph) {
        for i in (0..graph.len()).rev() {
            let job = &graph.jobs[i];
            if self.db.job_shelf.is_invalidated(job.displayname()) {
                log::debug!("{} was invalidated", job.displayname());
                graph.jobs[i].is_required_downstream = true;
            }

            let job = &graph.jobs[i];
            if graph.states[i] != State::Pending || !(self.settings.rerun || job.out_of_date(&self.db)) {
                continue;
            }
            let resmgr = self.db.resmgr.as_ref();
            let missing: Vec<_> = job
                .inputs()
                .iter()
                .filter(|input| !input.get_exists(resmgr))
                .map(|input| input.id())
                .collect();
            if missing.is_empty() {
                continue;
            }
            let producers: Vec<usize> = graph
                .deps(i)
                .iter()
                .copied()
                .filter(|&d| graph.jobs[d].outputs().iter().any(|o| missing.contains(&o.id())))
                .collect();
            for p in producers {
                log::debug!(
                    "{} required by {}",
                    graph.jobs[p].displayname(),
                    graph.jobs[i].displayname()
                );
                graph.jobs[p].is_required_downstream = true;
            }
        }
    }

    /// Hand ready jobs to the queue, skipping up-to-date ones, until the queue is full.
    fn dispatch(&mut self, graph: &mut JobGraph, errors: &mut Errors) -> Result<()> {
        let max_jobs = self.settings.max_jobs.max(1);
        for i in 0..graph.len() {
            if self.queue.length() >= max_jobs {
                break;
            }
            if graph.states[i] != State::Pending {
                continue;
            }
            if graph.upstream_failed(i) {
                log::warn!("{} not run: an upstream job failed", graph.jobs[i].displayname());
                graph.states[i] = State::Failed;
                continue;
            }
            if !graph.upstream_done(i) || self.awaits_subworkflow(graph, i) {
                continue;
            }

            let job = &graph.jobs[i];
            let name = job.displayname().to_owned();
            if !job.is_subworkflow() && !self.settings.rerun && !job.out_of_date(&self.db) {
                if !job.already_run(&self.db) {
                    log::debug!("{name} is up to date but was never recorded as complete");
                }
                self.ui.job_skip(&name);
                graph.states[i] = State::Done;
                continue;
            }
            log::debug!("{}", job.explain_out_of_date(&self.db));

            let callable = match job.create_callable(&self.db) {
                Ok(callable) => callable,
                Err(e) => {
                    self.failed.insert(name.clone());
                    errors.add_context(e, format!("while preparing job {name}"));
                    graph.states[i] = State::Failed;
                    continue;
                }
            };
            job.create_exc_dir()?;
            self.ui.job_run(&name, &callable.display_command());
            self.queue.send(&job.ctx, &name, callable, &self.settings.temps_dir)?;
            graph.states[i] = State::Running;
        }
        Ok(())
    }

    /// A job with a missing input nobody in this graph produces may be
    /// waiting on a sub-workflow that hasn't run yet.
    fn awaits_subworkflow(&self, graph: &JobGraph, i: usize) -> bool {
        if !graph.subworkflows_outstanding() {
            return false;
        }
        let resmgr = self.db.resmgr.as_ref();
        graph.jobs[i]
            .inputs()
            .iter()
            .any(|input| !graph.is_produced(&input.id()) && !input.get_exists(resmgr))
    }

    fn receive(&mut self, job: &mut JobInstance, name: &str, errors: &mut Errors) -> Result<Outcome> {
        let received = self.queue.receive(name);
        let exc_dir = job.create_exc_dir()?;

        let (mut e, text) = match received {
            Ok(mut callable) => {
                let stats = JobStats {
                    name: name.to_owned(),
                    finished: callable.finished,
                    duration: callable.duration().map(|d| d.as_secs_f64()),
                    memory: callable.memory_used(),
                    hostname: hostname(),
                };
                if let Err(e) = stats.write(&exc_dir) {
                    log::warn!("could not save stats for {name}: {e:?}");
                }
                let text = callable.log_text();
                if callable.finished && job.is_subworkflow() {
                    match callable.take_workflow() {
                        Some(wf) => return Ok(Outcome::SubWorkflow(wf, callable)),
                        None => (anyhow!("sub-workflow job {name} returned no workflow"), text),
                    }
                } else if callable.finished {
                    let duration = callable.duration();
                    match job.finalize(callable, &mut self.db) {
                        Ok(completion) => {
                            self.ui.job_completed(name, duration);
                            return Ok(Outcome::Succeeded(completion));
                        }
                        Err(e) => (e, text),
                    }
                } else {
                    (anyhow!("job {name} did not finish"), text)
                }
            }
            // the error carries whatever was logged.
            Err(e) => (e, String::new()),
        };

        let retry = match job.retry() {
            Ok(retry) => retry,
            Err(retry_err) => {
                log::warn!("cannot retry {name}: {retry_err:#}");
                e = e.context(format!("cannot retry: {retry_err:#}"));
                Retry::Exhausted
            }
        };
        match retry {
            Retry::Exhausted => {
                self.ui.job_failed(name, &text);
                self.failed.insert(name.to_owned());
                let msg = if text.is_empty() {
                    format!("job {name} failed")
                } else {
                    format!("job {name} failed\n{text}")
                };
                errors.add_context(e, msg);
                Ok(Outcome::Failed)
            }
            Retry::Unchanged => {
                log::warn!("{name} failed ({e}); retrying with the same context");
                self.ui.job_retry(name, job.retry_idx);
                Ok(Outcome::Retry)
            }
            Retry::Escalated => {
                log::info!("{name} failed ({e}); retrying with {:?}", job.ctx);
                self.ui.job_retry(name, job.retry_idx);
                Ok(Outcome::Retry)
            }
        }
    }

    fn complete(&mut self, job: &mut JobInstance) -> Result<()> {
        job.complete(&mut self.db)?;
        self.completed.insert(job.displayname().to_owned());
        Ok(())
    }
}
