//! Re-armable single-shot timer
//!
//! Coalesces bursts of signals into one action: every `arm()` pushes the
//! deadline out to `now + delay`, and `fired()` resolves once the deadline
//! passes without another `arm()`. Intended to be polled from a
//! `tokio::select!` loop alongside the signal sources.

use std::future::pending;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Start the timer, or restart it if it is already running
    pub fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolves when the armed deadline passes and disarms the timer.
    /// Never resolves while disarmed.
    ///
    /// Cancel-safe: dropping the future before it completes leaves the
    /// deadline in place.
    pub async fn fired(&mut self) {
        match self.deadline {
            Some(deadline) => {
                sleep_until(deadline).await;
                self.deadline = None;
            }
            None => pending::<()>().await,
        }
    }
}
