use anyhow::Result;
use colored::Colorize;

use crate::db::JobShelf;
use crate::settings::{Action, Settings};
use crate::ui::Ui;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("No recorded jobs match {0}")]
    NoMatchingJobs(String),
}

/// This struct actually runs the command-line app.
pub struct App {
    /// Interpreted command line settings
    settings: Settings,
    /// User interface
    ui: Ui,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        let ui = Ui::new(settings.verbose > 0, settings.yes);
        Self { settings, ui }
    }

    pub fn run(self) -> Result<()> {
        self.ui
            .verbose_msg(&format!("Using temps directory {:?}", self.settings.temps_dir));
        let mut shelf = JobShelf::open(self.settings.temps_dir.join(crate::db::SHELF_FILE))?;
        match &self.settings.action {
            Action::Status => self.status(&shelf),
            Action::Invalidate(patterns) => self.invalidate(&mut shelf, patterns),
        }
    }

    fn status(&self, shelf: &JobShelf) -> Result<()> {
        if shelf.is_empty() {
            eprintln!("No jobs recorded in {:?}", self.settings.temps_dir);
            return Ok(());
        }
        for (name, complete) in shelf.iter() {
            if complete {
                println!("{} {name}", "COMPLETE".green());
            } else {
                println!("{} {name}", "INVALIDATED".yellow());
            }
        }
        Ok(())
    }

    fn invalidate(&self, shelf: &mut JobShelf, patterns: &[String]) -> Result<()> {
        let names: Vec<String> = shelf
            .iter()
            .filter(|(name, _)| patterns.iter().any(|p| matches_job(name, p)))
            .map(|(name, _)| name.to_owned())
            .collect();
        if names.is_empty() {
            return Err(Error::NoMatchingJobs(patterns.join(", ")).into());
        }

        eprintln!("Jobs to invalidate:");
        for name in &names {
            eprintln!("    {}", name.yellow());
        }
        if !self.ui.confirm(&format!("Invalidate {} jobs?", names.len()))? {
            return Ok(());
        }
        for name in &names {
            shelf.set(name, false)?;
        }
        eprintln!("{} {} jobs", "Invalidated".green(), names.len());
        Ok(())
    }
}

/// `pattern` is either a full display name or the last component of one.
fn matches_job(displayname: &str, pattern: &str) -> bool {
    if displayname == pattern {
        return true;
    }
    match displayname.rsplit_once(crate::node::NODE_DELIM) {
        Some((_, last)) => last == pattern,
        None => false,
    }
}
