use std::cell::Cell;
use std::io::{self, Write};
use std::time::Instant;

/// Elapsed-time prefixed status lines on stderr, numbered against a known step count.
pub struct ConsoleProgress {
    enabled: bool,
    t0: Instant,
    steps: usize,
    done: Cell<usize>,
}

impl ConsoleProgress {
    pub fn new(enabled: bool, steps: usize) -> Self {
        Self {
            enabled,
            t0: Instant::now(),
            steps: steps.max(1),
            done: Cell::new(0),
        }
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        if !self.enabled {
            return;
        }
        let ts = fmt_elapsed(self.t0.elapsed().as_secs_f64());
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "[{ts}] {}", msg.as_ref());
    }

    pub fn step(&self, msg: impl AsRef<str>) {
        let current = (self.done.get() + 1).min(self.steps);
        self.done.set(current);
        self.info(format!("[{current}/{}] {}", self.steps, msg.as_ref()));
    }
}

fn fmt_elapsed(seconds: f64) -> String {
    let seconds = seconds.max(0.0) as u64;
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}
