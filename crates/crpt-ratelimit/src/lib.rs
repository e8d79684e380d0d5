//! CRPT Rate Limit - in-process admission control for registry submissions
//!
//! This crate decides when a caller may send the next document to the
//! registry:
//!
//! - **Algorithms**: Fixed window (the registry's contract) and sliding window
//! - **Admission**: Waiting, cancellable and deadline-bounded acquisition
//! - **Async-First**: Waiting is a timer suspension, never a blocked thread
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use crpt_ratelimit::{acquire, RateLimitConfig, TimeUnit};
//!
//! // 10 submissions per second
//! let limiter = RateLimitConfig::per(TimeUnit::Second, 10).build()?;
//!
//! // Suspends until a slot in the current (or next) window is free
//! let waited = acquire(limiter.as_ref()).await;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod admission;
mod fixed_window;
mod sliding_window;

pub use admission::*;
pub use fixed_window::*;
pub use sliding_window::*;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// The call may proceed now; one slot was consumed.
    Admitted,

    /// The window is full; re-check after this long.
    Wait(Duration),
}

impl AdmissionDecision {
    /// Whether the call was admitted.
    #[must_use]
    pub const fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

/// Common trait for admission controllers.
///
/// Implementations keep their counters private and perform the
/// check-and-increment in `try_admit` atomically.
pub trait RateLimiter: Send + Sync {
    /// Check the window and, if there is room, consume a slot.
    ///
    /// Never blocks. A `Wait` decision does not consume anything.
    fn try_admit(&self) -> AdmissionDecision;

    /// Remaining slots in the current window.
    fn remaining(&self) -> u32;

    /// Time until the next slot frees up (zero if one is free now).
    fn wait_time(&self) -> Duration;

    /// Forget all admissions and start a fresh window.
    fn reset(&self);

    /// Current state as a snapshot.
    fn state(&self) -> RateLimitState;

    /// Maximum admissions per window.
    fn limit(&self) -> u32;

    /// Window length.
    fn window(&self) -> Duration;
}

/// Rate limiter state snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitState {
    /// Maximum requests allowed in the window.
    pub limit: u32,

    /// Remaining requests in the current window.
    pub remaining: u32,

    /// Time until the window resets.
    pub reset_after: Duration,

    /// Whether currently rate limited.
    pub is_limited: bool,
}

/// Rate limit error.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The caller gave up while waiting for a slot.
    #[error("Admission cancelled after waiting {waited:?}")]
    Cancelled {
        /// Time spent waiting before cancellation.
        waited: Duration,
    },

    /// Wait time would exceed maximum allowed.
    #[error("Wait time {wait_time:?} exceeds maximum {max_wait:?}")]
    WaitExceeded {
        /// Required wait time.
        wait_time: Duration,
        /// Maximum allowed wait.
        max_wait: Duration,
        /// Time already spent waiting when the deadline was judged missed.
        waited: Duration,
    },

    /// Invalid configuration.
    #[error("Invalid rate limit configuration: {0}")]
    InvalidConfig(String),
}

impl RateLimitError {
    /// Whether the caller's wait ended without admission.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::WaitExceeded { .. })
    }
}

/// Which window algorithm a limiter uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowStrategy {
    /// Counter reset at window boundaries.
    #[default]
    Fixed,

    /// Rolling window over individual admission timestamps.
    Sliding,
}

/// Unit of time the registry quota is expressed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    /// One second.
    #[default]
    Second,
    /// One minute.
    Minute,
    /// One hour.
    Hour,
    /// One day.
    Day,
}

impl TimeUnit {
    /// Length of one unit.
    #[must_use]
    pub const fn duration(self) -> Duration {
        match self {
            Self::Second => Duration::from_secs(1),
            Self::Minute => Duration::from_secs(60),
            Self::Hour => Duration::from_secs(3_600),
            Self::Day => Duration::from_secs(86_400),
        }
    }
}

/// Configuration for rate limiters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub requests_per_window: u32,

    /// Window duration.
    pub window: Duration,

    /// Window algorithm.
    #[serde(default)]
    pub strategy: WindowStrategy,
}

impl RateLimitConfig {
    /// Create a new rate limit configuration.
    #[must_use]
    pub const fn new(requests_per_window: u32, window: Duration) -> Self {
        Self {
            requests_per_window,
            window,
            strategy: WindowStrategy::Fixed,
        }
    }

    /// `limit` requests per one `unit`.
    #[must_use]
    pub const fn per(unit: TimeUnit, limit: u32) -> Self {
        Self::new(limit, unit.duration())
    }

    /// Select the window algorithm.
    #[must_use]
    pub const fn with_strategy(mut self, strategy: WindowStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Common preset: 1 request per second.
    #[must_use]
    pub const fn one_per_second() -> Self {
        Self::new(1, Duration::from_secs(1))
    }

    /// Common preset: 10 requests per second.
    #[must_use]
    pub const fn ten_per_second() -> Self {
        Self::new(10, Duration::from_secs(1))
    }

    /// Common preset: 60 requests per minute.
    #[must_use]
    pub const fn sixty_per_minute() -> Self {
        Self::new(60, Duration::from_secs(60))
    }

    /// Reject configurations that could never admit anything.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a zero limit or a zero-length window.
    pub fn validate(&self) -> Result<(), RateLimitError> {
        if self.requests_per_window == 0 {
            return Err(RateLimitError::InvalidConfig(
                "requests_per_window must be at least 1".into(),
            ));
        }
        if self.window.is_zero() {
            return Err(RateLimitError::InvalidConfig(
                "window must be longer than zero".into(),
            ));
        }
        Ok(())
    }

    /// Build the configured limiter.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if [`validate`](Self::validate) fails.
    pub fn build(&self) -> Result<Arc<dyn RateLimiter>, RateLimitError> {
        self.validate()?;
        let limiter: Arc<dyn RateLimiter> = match self.strategy {
            WindowStrategy::Fixed => {
                Arc::new(FixedWindow::new(self.requests_per_window, self.window)?)
            }
            WindowStrategy::Sliding => {
                Arc::new(SlidingWindow::new(self.requests_per_window, self.window)?)
            }
        };
        Ok(limiter)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::ten_per_second()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_unit_durations() {
        assert_eq!(TimeUnit::Second.duration(), Duration::from_secs(1));
        assert_eq!(TimeUnit::Minute.duration(), Duration::from_secs(60));
        assert_eq!(TimeUnit::Day.duration(), Duration::from_secs(86_400));
    }

    #[test]
    fn zero_limit_is_rejected() {
        let err = RateLimitConfig::new(0, Duration::from_secs(1))
            .validate()
            .unwrap_err();
        assert!(matches!(err, RateLimitError::InvalidConfig(_)));
    }

    #[test]
    fn zero_window_is_rejected() {
        assert!(RateLimitConfig::new(5, Duration::ZERO).build().is_err());
    }

    #[tokio::test]
    async fn build_respects_strategy() {
        let fixed = RateLimitConfig::per(TimeUnit::Minute, 3).build().unwrap();
        assert_eq!(fixed.limit(), 3);
        assert_eq!(fixed.window(), Duration::from_secs(60));

        let sliding = RateLimitConfig::per(TimeUnit::Second, 2)
            .with_strategy(WindowStrategy::Sliding)
            .build()
            .unwrap();
        assert!(sliding.try_admit().is_admitted());
        assert!(sliding.try_admit().is_admitted());
        assert!(!sliding.try_admit().is_admitted());
    }

    #[test]
    fn strategy_parses_lowercase() {
        let strategy: WindowStrategy = serde_json::from_str("\"sliding\"").unwrap();
        assert_eq!(strategy, WindowStrategy::Sliding);
    }
}
