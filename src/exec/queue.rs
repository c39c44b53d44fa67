use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;

use anyhow::Result;

use crate::jobs::JobCtx;

use super::callable::log_text;
use super::{JobCallable, ReceiveError};

/// Runs job callables somewhere and hands them back when they're done.
///
/// `receive` is only valid for a name `wait` has returned. Jobs may come back
/// in any order. Context keys a queue doesn't use are ignored.
pub trait ExecutionQueue {
    fn send(&mut self, ctx: &JobCtx, name: &str, callable: JobCallable, temps_dir: &Path) -> Result<()>;

    /// Name of a finished job, blocking until one finishes unless `immediate`.
    /// `None` if nothing has finished (or nothing was sent).
    fn wait(&mut self, immediate: bool) -> Result<Option<String>>;

    fn receive(&mut self, name: &str) -> Result<JobCallable>;

    /// Number of jobs sent but not yet received.
    fn length(&self) -> usize;

    fn empty(&self) -> bool {
        self.length() == 0
    }
}

/// Runs jobs one at a time on the calling thread, inside `wait`.
#[derive(Debug, Default)]
pub struct LocalJobQueue {
    pending: VecDeque<(String, JobCallable)>,
    finished: util::HashMap<String, JobCallable>,
}

impl LocalJobQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExecutionQueue for LocalJobQueue {
    fn send(&mut self, ctx: &JobCtx, name: &str, callable: JobCallable, _temps_dir: &Path) -> Result<()> {
        log::trace!("queueing {name} locally with ctx {ctx:?}");
        self.pending.push_back((name.to_owned(), callable));
        Ok(())
    }

    fn wait(&mut self, _immediate: bool) -> Result<Option<String>> {
        let Some((name, mut callable)) = self.pending.pop_front() else {
            return Ok(None);
        };
        callable.run();
        self.finished.insert(name.clone(), callable);
        Ok(Some(name))
    }

    fn receive(&mut self, name: &str) -> Result<JobCallable> {
        self.finished.remove(name).ok_or_else(|| {
            ReceiveError {
                name: name.to_owned(),
                reason: "job has not finished".to_owned(),
                text: String::new(),
            }
            .into()
        })
    }

    fn length(&self) -> usize {
        self.pending.len() + self.finished.len()
    }
}

type Finished = (String, thread::Result<JobCallable>);

/// Runs each job on its own thread. The caller bounds how many are in flight.
pub struct ThreadJobQueue {
    tx: Sender<Finished>,
    rx: Receiver<Finished>,
    /// log files of running jobs, to report on jobs lost to a panic.
    running: util::HashMap<String, (PathBuf, PathBuf)>,
    finished: util::HashMap<String, Result<JobCallable, ReceiveError>>,
}

impl Default for ThreadJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadJobQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx,
            running: Default::default(),
            finished: Default::default(),
        }
    }

    fn record(&mut self, (name, result): Finished) -> String {
        let (stdout, stderr) = self.running.remove(&name).unwrap_or_default();
        let result = result.map_err(|_| ReceiveError {
            name: name.clone(),
            reason: "worker thread panicked".to_owned(),
            text: log_text(&stdout, &stderr),
        });
        self.finished.insert(name.clone(), result);
        name
    }
}

impl ExecutionQueue for ThreadJobQueue {
    fn send(&mut self, ctx: &JobCtx, name: &str, mut callable: JobCallable, _temps_dir: &Path) -> Result<()> {
        log::trace!("starting thread for {name} with ctx {ctx:?}");
        let logs = callable.logs();
        let log_files = (logs.stdout.filename().to_owned(), logs.stderr.filename().to_owned());
        self.running.insert(name.to_owned(), log_files);

        let tx = self.tx.clone();
        let thread_name = name.to_owned();
        thread::Builder::new().name(name.to_owned()).spawn(move || {
            let result = catch_unwind(AssertUnwindSafe(move || {
                callable.run();
                callable
            }));
            // receiver only goes away with the queue itself.
            let _ = tx.send((thread_name, result));
        })?;
        Ok(())
    }

    fn wait(&mut self, immediate: bool) -> Result<Option<String>> {
        if self.running.is_empty() {
            return Ok(None);
        }
        let finished = if immediate {
            match self.rx.try_recv() {
                Ok(finished) => finished,
                Err(TryRecvError::Empty) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        } else {
            self.rx.recv()?
        };
        Ok(Some(self.record(finished)))
    }

    fn receive(&mut self, name: &str) -> Result<JobCallable> {
        match self.finished.remove(name) {
            Some(result) => Ok(result?),
            None => Err(ReceiveError {
                name: name.to_owned(),
                reason: "job has not finished".to_owned(),
                text: String::new(),
            }
            .into()),
        }
    }

    fn length(&self) -> usize {
        self.running.len() + self.finished.len()
    }
}
