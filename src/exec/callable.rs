use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use util::{IdVec, Timer};

use crate::arguments::Arg;
use crate::db::{Database, Store};
use crate::jobs::{ArgId, CallArgs, JobKind};
use crate::workflow::Workflow;

use super::{JobTimeout, MemoryTracker};

/// Output streams of one job function call.
#[derive(Debug)]
pub struct JobIo {
    pub stdout: File,
    pub stderr: File,
}

impl JobIo {
    fn create(stdout: &Path, stderr: &Path) -> Result<Self> {
        Ok(Self {
            stdout: File::create(stdout).with_context(|| format!("creating {stdout:?}"))?,
            stderr: File::create(stderr).with_context(|| format!("creating {stderr:?}"))?,
        })
    }

    fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            stdout: self.stdout.try_clone()?,
            stderr: self.stderr.try_clone()?,
        })
    }
}

/// Stores for a job's `job.out` and `job.err`.
#[derive(Debug, Clone)]
pub struct JobLogs {
    pub stdout: Arc<dyn Store>,
    pub stderr: Arc<dyn Store>,
}

impl JobLogs {
    /// Render both logs, each under a `--- stdout ---` style header.
    pub fn text(&self) -> String {
        log_text(self.stdout.filename(), self.stderr.filename())
    }
}

pub(crate) fn log_text(stdout: &Path, stderr: &Path) -> String {
    let mut text = String::with_capacity(256);
    for (label, filename) in [("stdout", stdout), ("stderr", stderr)] {
        text.push_str("--- ");
        text.push_str(label);
        text.push_str(" ---\n");
        if let Ok(contents) = std::fs::read_to_string(filename) {
            text.push_str(&contents);
            if !contents.is_empty() && !contents.ends_with('\n') {
                text.push('\n');
            }
        }
    }
    text
}

/// One execution attempt of a job: resolved arguments, the function to call,
/// and what was measured while calling it.
///
/// `run` never fails; errors are written to the job's stderr log and leave
/// `finished` false.
#[derive(Debug)]
pub struct JobCallable {
    pub name: String,
    pub finished: bool,
    kind: JobKind,
    args: CallArgs,
    arglist: IdVec<ArgId, Arg>,
    ret: Option<ArgId>,
    timeout: JobTimeout,
    logs: JobLogs,
    timer: Timer,
    memory: MemoryTracker,
    workflow: Option<Workflow>,
}

impl JobCallable {
    pub fn new(
        name: String,
        kind: JobKind,
        args: CallArgs,
        arglist: IdVec<ArgId, Arg>,
        ret: Option<ArgId>,
        timeout: JobTimeout,
        logs: JobLogs,
    ) -> Self {
        Self {
            name,
            finished: false,
            kind,
            args,
            arglist,
            ret,
            timeout,
            logs,
            timer: Timer::default(),
            memory: MemoryTracker::new(),
            workflow: None,
        }
    }

    fn is_subworkflow(&self) -> bool {
        matches!(self.kind, JobKind::SubWorkflow(_))
    }

    pub fn run(&mut self) {
        self.timer.start();
        match self.open_io() {
            Ok(mut io) => match self.invoke(&io) {
                Ok(()) => self.finished = true,
                Err(e) => {
                    log::debug!("{} failed: {e:#}", self.name);
                    if let Err(write_err) = writeln!(io.stderr, "{e:?}") {
                        log::warn!("could not write error to stderr log of {}: {write_err}", self.name);
                    }
                }
            },
            Err(e) => log::error!("could not open logs for {}: {e:#}", self.name),
        }
        self.timer.stop();
        self.memory.record();

        for store in [&self.logs.stdout, &self.logs.stderr] {
            if let Err(e) = store.push() {
                log::warn!("could not push log {:?}: {e:#}", store.filename());
            }
        }
    }

    fn open_io(&self) -> Result<JobIo> {
        self.logs.stdout.allocate()?;
        self.logs.stderr.allocate()?;
        JobIo::create(self.logs.stdout.filename(), self.logs.stderr.filename())
    }

    fn invoke(&mut self, io: &JobIo) -> Result<()> {
        let is_subworkflow = self.is_subworkflow();
        if !is_subworkflow {
            for arg in self.arglist.iter() {
                arg.allocate()?;
            }
            for arg in self.arglist.iter() {
                arg.pull()?;
            }
        }

        let args = self.args.clone();
        let (value, workflow) = match &self.kind {
            JobKind::Function(f) => {
                let f = f.clone();
                let mut io = io.try_clone()?;
                let value = self.timeout.run(move || f(&args, &mut io))?;
                (value, None)
            }
            JobKind::SetObj => (args.arg(0)?.clone(), None),
            JobKind::SubWorkflow(f) => {
                let f = f.clone();
                let workflow = self.timeout.run(move || f(&args))?;
                (Value::Null, Some(workflow))
            }
        };

        if let Some(ret) = self.ret {
            self.arglist.get_mut(ret).set_value(value)?;
        }
        self.workflow = workflow;

        if !is_subworkflow {
            for arg in self.arglist.iter() {
                arg.push()?;
            }
        }
        Ok(())
    }

    /// Captured stdout and stderr of the attempt.
    pub fn log_text(&self) -> String {
        self.logs.text()
    }

    /// Fetch the log files back from storage.
    pub fn collect_logs(&self) -> Result<()> {
        self.logs.stdout.pull()?;
        self.logs.stderr.pull()
    }

    pub fn logs(&self) -> &JobLogs {
        &self.logs
    }

    /// The call as it would be written, e.g. `align("in.fq", depth=3)`.
    pub fn display_command(&self) -> String {
        self.args.display_command(&self.name)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.timer.duration()
    }

    /// Peak memory in GB.
    pub fn memory_used(&self) -> Option<f64> {
        self.memory.peak()
    }

    /// Commit each argument's outputs. Returns true if an axis changed.
    pub fn updatedb(&mut self, db: &mut Database) -> Result<bool> {
        let mut changed = false;
        for arg in self.arglist.iter_mut() {
            changed |= arg.updatedb(db)?;
        }
        Ok(changed)
    }

    /// The workflow returned by a sub-workflow job. Its outputs are committed
    /// with `updatedb` only after that workflow has run.
    pub fn take_workflow(&mut self) -> Option<Workflow> {
        self.workflow.take()
    }
}
