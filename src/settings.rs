use std::path::PathBuf;

use crate::args::{Args, Command};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid job pattern '{0}' (should be a job name or a display name like '/axis:chunk/name')")]
    InvalidJobPattern(String),
}

/// What the command line asked for.
#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    Status,
    Invalidate(Vec<String>),
}

/// Settings are like Args, except all the logic has
/// been applied so e.g. defaults are added in.
#[derive(Debug)]
pub struct Settings {
    pub temps_dir: PathBuf,
    pub yes: bool,
    pub verbose: u8,
    pub action: Action,
}

impl TryFrom<Args> for Settings {
    type Error = anyhow::Error;
    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let action = match args.command {
            Command::Status => Action::Status,
            Command::Invalidate { jobs } => {
                for job in &jobs {
                    if job.is_empty() || job.ends_with(crate::node::NODE_DELIM) {
                        return Err(Error::InvalidJobPattern(job.clone()).into());
                    }
                }
                Action::Invalidate(jobs)
            }
        };

        Ok(Self {
            temps_dir: PathBuf::from(&args.temps_dir),
            yes: args.yes,
            verbose: args.verbose,
            action,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_invalidate_args() -> anyhow::Result<()> {
        let args = Args::try_parse_from(["sweep", "-t", "tmp", "-vv", "invalidate", "align", "/sample:s1/count"])?;
        let settings = Settings::try_from(args)?;
        assert_eq!(settings.temps_dir, PathBuf::from("tmp"));
        assert_eq!(settings.verbose, 2);
        assert_eq!(
            settings.action,
            Action::Invalidate(vec!["align".to_owned(), "/sample:s1/count".to_owned()])
        );
        Ok(())
    }

    #[test]
    fn test_bad_pattern() -> anyhow::Result<()> {
        let args = Args::try_parse_from(["sweep", "invalidate", "/sample:s1/"])?;
        let err = Settings::try_from(args).expect_err("trailing delimiter");
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::InvalidJobPattern(_))));
        Ok(())
    }
}
