use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;

use anyhow::Result;
use syntax::Interval;

use super::Error;

/// Best-effort wall-clock limit on a synchronous call.
///
/// With a limit, the call runs on its own thread and the caller stops waiting
/// once the deadline passes. The abandoned thread is not killed: a call that
/// never returns keeps running in the background until the process exits.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobTimeout {
    limit: Option<Interval>,
}

impl JobTimeout {
    pub fn new(limit: Option<Interval>) -> Self {
        Self { limit }
    }

    /// Run `f`, failing with [`Error::Timeout`] if it outlives the limit.
    /// Panics in `f` are returned as [`Error::Panicked`].
    pub fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let Some(limit) = self.limit else {
            return catch_panic(f);
        };
        let deadline = limit
            .as_duration()
            .ok_or_else(|| anyhow::anyhow!("timeout {limit} is too large"))?;

        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("job-timeout".to_owned())
            .spawn(move || {
                // receiver is gone if we already timed out.
                let _ = tx.send(catch_panic(f));
            })?;

        match rx.recv_timeout(deadline) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(Error::Timeout(limit.to_string()).into()),
            Err(RecvTimeoutError::Disconnected) => {
                Err(Error::Panicked("job thread exited without a result".to_owned()).into())
            }
        }
    }
}

fn catch_panic<T, F: FnOnce() -> Result<T>>(f: F) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_owned());
            Err(Error::Panicked(msg).into())
        }
    }
}
