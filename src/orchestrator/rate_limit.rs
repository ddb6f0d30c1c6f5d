//! Rolling-window rate limiter for outbound provider calls.

use log::debug;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Rate limiter configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum number of requests allowed in the window
    pub max_requests: u32,
    /// Length of the rolling window
    pub window: Duration,
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    /// N requests per minute
    pub fn per_minute(requests: u32) -> Self {
        Self::new(requests, Duration::from_secs(60))
    }
}

/// Rolling-window limiter; callers wait for a slot instead of being rejected
#[derive(Debug)]
pub struct RateLimiter {
    config: Option<RateLimitConfig>,
    /// Start instants of calls still inside the window, oldest first
    slots: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(config: Option<RateLimitConfig>) -> Self {
        Self {
            config,
            slots: Mutex::new(VecDeque::new()),
        }
    }

    /// Limiter that never waits
    pub fn unlimited() -> Self {
        Self::new(None)
    }

    /// Claim a slot now, or report how long until the oldest slot frees up
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let Some(config) = self.config else {
            return Ok(());
        };

        let now = Instant::now();
        let mut slots = self.slots.lock();
        while slots
            .front()
            .is_some_and(|start| now.duration_since(*start) >= config.window)
        {
            slots.pop_front();
        }

        if slots.len() < config.max_requests as usize {
            slots.push_back(now);
            return Ok(());
        }

        match slots.front() {
            Some(oldest) => Err(config.window - now.duration_since(*oldest)),
            None => Ok(()),
        }
    }

    /// Wait until a slot is free, then claim it
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire() {
                Ok(()) => return,
                Err(wait) => {
                    debug!("Rate limit reached, waiting {:?}", wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Calls currently counted against the window
    pub fn in_window(&self) -> usize {
        let Some(config) = self.config else {
            return 0;
        };
        let now = Instant::now();
        self.slots
            .lock()
            .iter()
            .filter(|start| now.duration_since(**start) < config.window)
            .count()
    }
}
