/// Positional/keyword arguments and the return binding of one call.
mod callset;
pub use callset::{CallArgs, CallSet};

/// Execution context options and retry escalation.
mod ctx;
pub use ctx::{JobCtx, Retry};

/// Abstract job definitions.
mod definition;
pub use definition::{JobDefinition, JobFn, JobKind, WorkflowFn};

/// Definitions bound to one node.
mod instance;
pub use instance::{ArgId, Completion, JobInstance};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error(
        "Job {job}: argument \"{arg}\" over axes {axes:?} cannot be bound to job axes {job_axes:?}"
    )]
    ArgumentResolution {
        job: String,
        arg: String,
        axes: Vec<String>,
        job_axes: Vec<String>,
    },
}
