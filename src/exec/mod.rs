/// The unit handed to an execution queue
mod callable;
pub use callable::{JobCallable, JobIo, JobLogs};

/// Wall-clock limits on job functions
mod timeout;
pub use timeout::JobTimeout;

/// Peak memory accounting
mod memory;
pub use memory::MemoryTracker;

/// Per-attempt execution statistics
mod stats;
pub use stats::{hostname, JobStats};

/// Queue contract and in-process implementations
mod queue;
pub use queue::{ExecutionQueue, LocalJobQueue, ThreadJobQueue};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Job exceeded its time limit of {0}")]
    Timeout(String),
    #[error("Job panicked: {0}")]
    Panicked(String),
}

/// A queue could not hand back a finished job. `text` holds whatever the
/// job logged before it was lost.
#[derive(Debug, thiserror::Error)]
#[error("Failed to receive job {name}: {reason}\n{text}")]
pub struct ReceiveError {
    pub name: String,
    pub reason: String,
    pub text: String,
}
