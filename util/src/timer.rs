use std::time::{Duration, Instant};

/// Utility for keeping track of the time it took to perform some operation.
///
/// The timer is inert until `start` is called; `duration` is only available
/// once both `start` and `stop` have been recorded.
#[derive(Debug, Default, Clone, Copy)]
pub struct Timer {
    start_time: Option<Instant>,
    finish_time: Option<Instant>,
}

impl Timer {
    /// Create a new `Timer` that is already running.
    pub fn now() -> Self {
        Self {
            start_time: Some(Instant::now()),
            finish_time: None,
        }
    }

    /// Reset internal timer to now, discarding any previous finish time.
    pub fn start(&mut self) {
        self.start_time = Some(Instant::now());
        self.finish_time = None;
    }

    /// Record the finish time.
    pub fn stop(&mut self) {
        self.finish_time = Some(Instant::now());
    }

    /// Time between `start` and `stop`, if both happened.
    pub fn duration(&self) -> Option<Duration> {
        match (self.start_time, self.finish_time) {
            (Some(start), Some(finish)) => Some(finish.saturating_duration_since(start)),
            _ => None,
        }
    }

    /// Time since the timer was last started.
    pub fn elapsed(&self) -> Option<Duration> {
        self.start_time.map(|start| start.elapsed())
    }

    /// Print a message with the elapsed time since the timer was last started.
    pub fn print_elapsed(&self, task: &str) {
        if let Some(elapsed) = self.elapsed() {
            eprintln!("{} took {:?}", task, elapsed);
        }
    }
}
