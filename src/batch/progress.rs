//! Batch progress accounting.

use std::time::Duration;

/// Progress of a batch run at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatchProgress {
    /// Targets in the run
    pub total: usize,
    /// Targets finished, successfully or not
    pub processed: usize,
    /// Targets that finished with an error
    pub failed: usize,
    /// Time since the run started
    pub elapsed: Duration,
}

impl BatchProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn succeeded(&self) -> usize {
        self.processed - self.failed
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.processed)
    }

    /// Completion in `[0, 100]`
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.processed as f64 * 100.0 / self.total as f64
    }

    /// Targets per second
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.processed as f64 / secs
    }

    /// Estimated time to finish, unknown until something has been processed
    pub fn eta(&self) -> Option<Duration> {
        let throughput = self.throughput();
        if throughput <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(self.remaining() as f64 / throughput))
    }
}
