//! Fixed window rate limiter implementation.
//!
//! The registry quota is "at most N submissions per time unit". The counter
//! resets lazily: the first check that finds the window elapsed starts a new
//! one at its own timestamp.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::{AdmissionDecision, RateLimitError, RateLimitState, RateLimiter};

/// Counter and window start, always read and written together.
#[derive(Debug)]
struct WindowState {
    window_start: Instant,
    count: u32,
}

impl WindowState {
    /// Start a new window if the current one has elapsed.
    fn roll(&mut self, now: Instant, window: Duration) {
        if now.saturating_duration_since(self.window_start) >= window {
            self.window_start = now;
            self.count = 0;
        }
    }

    fn reset_after(&self, now: Instant, window: Duration) -> Duration {
        window.saturating_sub(now.saturating_duration_since(self.window_start))
    }
}

/// Fixed window rate limiter.
///
/// Admits up to `limit` calls per window. Both fields live under one lock so
/// the reset, the comparison and the increment are a single step.
#[derive(Debug)]
pub struct FixedWindow {
    /// Maximum requests per window.
    limit: u32,

    /// Window duration.
    window: Duration,

    state: Mutex<WindowState>,
}

impl FixedWindow {
    /// Create a new fixed window rate limiter.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `limit` is zero or `window` is empty.
    pub fn new(limit: u32, window: Duration) -> Result<Self, RateLimitError> {
        if limit == 0 || window.is_zero() {
            return Err(RateLimitError::InvalidConfig(format!(
                "fixed window needs a positive limit and window (got {limit} per {window:?})"
            )));
        }

        Ok(Self {
            limit,
            window,
            state: Mutex::new(WindowState {
                window_start: Instant::now(),
                count: 0,
            }),
        })
    }
}

impl RateLimiter for FixedWindow {
    fn try_admit(&self) -> AdmissionDecision {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.roll(now, self.window);

        if state.count < self.limit {
            state.count += 1;
            AdmissionDecision::Admitted
        } else {
            AdmissionDecision::Wait(state.reset_after(now, self.window))
        }
    }

    fn remaining(&self) -> u32 {
        let mut state = self.state.lock();
        state.roll(Instant::now(), self.window);
        self.limit.saturating_sub(state.count)
    }

    fn wait_time(&self) -> Duration {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.roll(now, self.window);

        if state.count < self.limit {
            Duration::ZERO
        } else {
            state.reset_after(now, self.window)
        }
    }

    fn reset(&self) {
        let mut state = self.state.lock();
        state.count = 0;
        state.window_start = Instant::now();
    }

    fn state(&self) -> RateLimitState {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.roll(now, self.window);

        let remaining = self.limit.saturating_sub(state.count);

        RateLimitState {
            limit: self.limit,
            remaining,
            reset_after: state.reset_after(now, self.window),
            is_limited: remaining == 0,
        }
    }

    fn limit(&self) -> u32 {
        self.limit
    }

    fn window(&self) -> Duration {
        self.window
    }
}
