//! Incremental workflow engine: jobs declared over named axes are expanded
//! into per-node instances, ordered by the resources they read and write,
//! and rerun only when their outputs are out of date.

/// High-level command line app
mod app;
/// Definition of command-line args
mod args;
/// Placeholders bound to a node
pub mod arguments;
/// Job shelf, resource, node and storage managers
pub mod db;
/// Nested argument structures
pub mod deep;
/// Error aggregation for a run
pub mod errors;
/// Callables, queues and per-attempt instrumentation
pub mod exec;
/// Job definitions, instances and call arguments
pub mod jobs;
/// Placeholder declarations
pub mod managed;
/// Axis/chunk coordinates
pub mod node;
/// Files and objects tracked for staleness
pub mod resources;
/// Expansion, scheduling and regeneration
pub mod runner;
/// Command-line run settings
mod settings;
/// Text UI
mod ui;
/// Workflow builder
pub mod workflow;

pub use app::App;
pub use args::Args;
pub use errors::AggregatedErrors;
pub use jobs::{CallArgs, CallSet, JobCtx, JobKind};
pub use managed::Managed;
pub use node::Node;
pub use runner::{RunSettings, WorkflowRunner};
pub use settings::Settings;
pub use ui::Ui;
pub use workflow::Workflow;

/// Used when neither `--temps-dir` nor `SWEEP_TEMPS_DIR` is given.
pub const DEFAULT_TEMPS_DIR: &str = "temps";

/// Run the command-line app.
pub fn run() -> Result<(), anyhow::Error> {
    use clap::Parser;
    let args = Args::parse();

    let settings: Settings = args.try_into()?;

    let log_level = match settings.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    simple_logging::log_to_stderr(log_level);

    let app = App::new(settings);
    app.run()?;

    Ok(())
}
