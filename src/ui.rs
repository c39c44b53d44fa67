use std::cell::RefCell;
use std::time::Duration;

use anyhow::Result;
use colored::Colorize;

use util::Timer;

/// All interactions with the text UI should go through this struct.
pub struct Ui {
    /// -v setting, displays extra text info to user
    pub verbose: bool,
    /// -y setting, ignores all points where the user is prompted to enter 'y'
    override_confirmation: bool,
    /// keeps track of time for the whole run
    timer: Timer,
    /// buffer to hold strings internally when getting input
    strbuf: RefCell<String>,
}

impl Ui {
    pub fn new(verbose: bool, override_confirmation: bool) -> Self {
        Self {
            verbose,
            override_confirmation,
            timer: Timer::now(),
            // Refcell so we can call confirm() w/o needing a unique reference:
            strbuf: RefCell::new(String::with_capacity(16)),
        }
    }

    /// A UI that never prompts and only prints status lines.
    pub fn quiet() -> Self {
        Self::new(false, true)
    }

    pub fn confirm(&self, prompt: &str) -> Result<bool> {
        if self.override_confirmation {
            return Ok(true);
        }
        eprintln!("{} (y/N)", prompt);

        let mut strbuf = self.strbuf.borrow_mut();

        strbuf.clear();
        std::io::stdin().read_line(&mut strbuf)?;
        match strbuf.chars().next() {
            Some('y') => Ok(true),
            _ => Ok(false),
        }
    }

    pub fn print_elapsed(&self, label: &str) {
        if self.verbose {
            self.timer.print_elapsed(label)
        }
    }

    pub fn verbose_msg(&self, msg: &str) {
        if self.verbose {
            eprintln!("{}", msg);
        }
    }

    pub fn job_run(&self, name: &str, command: &str) {
        eprintln!("{} {name}", "RUN".green());
        if self.verbose {
            eprintln!("    {}", command.magenta());
        }
    }

    pub fn job_skip(&self, name: &str) {
        if self.verbose {
            eprintln!("{} {name} (up to date)", "SKIP".cyan());
        }
    }

    pub fn job_completed(&self, name: &str, duration: Option<Duration>) {
        match duration {
            Some(d) => eprintln!("{} {name} in {:.2}s", "COMPLETED".green(), d.as_secs_f64()),
            None => eprintln!("{} {name}", "COMPLETED".green()),
        }
    }

    pub fn job_retry(&self, name: &str, attempt: u64) {
        eprintln!("{} {name} (attempt {})", "RETRY".yellow(), attempt + 1);
    }

    pub fn job_failed(&self, name: &str, logs: &str) {
        eprintln!("{} {name}", "FAILED".red());
        if self.verbose {
            eprintln!("{logs}");
        }
    }
}
