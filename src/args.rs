use clap::{Parser, Subcommand};

const CMD_NAME: &str = "sweep";

/// Stores our command-line args format.
#[derive(Parser, Debug)]
#[command(name = CMD_NAME, version, about = None, long_about = None)]
pub struct Args {
    /// Directory holding the job shelf, logs and temporary files
    #[arg(short, long, value_name = "DIR", default_value = crate::DEFAULT_TEMPS_DIR)]
    #[arg(env = "SWEEP_TEMPS_DIR")]
    pub temps_dir: String,

    /// Bypass user confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Print additional debugging info (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List jobs recorded in the job shelf
    Status,
    /// Force jobs to rerun on the next workflow run
    Invalidate {
        /// Job display names, or bare job names to match every node
        #[arg(required = true, value_name = "JOB")]
        jobs: Vec<String>,
    },
}
