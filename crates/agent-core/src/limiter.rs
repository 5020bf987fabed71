//! LLM Call Rate Limiter
//!
//! Sliding-window limiter shared by every agent that talks to the same
//! provider: at most `max_calls` calls may *start* within any trailing
//! `window`. Waiting happens in [`RateLimiter::acquire`], the only suspension
//! point of a reasoning step.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};

/// Rate limiter configuration
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    /// Calls allowed to start per window
    pub max_calls: usize,

    /// Length of the trailing window
    pub window: Duration,

    /// Give up waiting for a permit after this long
    pub acquire_timeout: Option<Duration>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: 10,
            window: Duration::from_secs(60),
            acquire_timeout: None,
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_calls = std::env::var("LLM_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_calls);
        let window = std::env::var("LLM_RATE_WINDOW_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map_or(defaults.window, Duration::from_secs);
        let acquire_timeout = std::env::var("LLM_ACQUIRE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs);

        Self {
            max_calls,
            window,
            acquire_timeout,
        }
    }

    pub fn per_minute(max_calls: usize) -> Self {
        Self {
            max_calls,
            ..Default::default()
        }
    }
}

/// Held for the duration of one LLM call; released on drop
#[derive(Debug)]
pub struct RatePermit {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for RatePermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Sliding-window limiter over call start times
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    starts: Mutex<VecDeque<Instant>>,
    in_flight: Arc<AtomicUsize>,
    closed: CancellationToken,
}

impl RateLimiter {
    pub fn new(mut config: RateLimitConfig) -> Self {
        config.max_calls = config.max_calls.max(1);
        Self {
            config,
            starts: Mutex::new(VecDeque::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            closed: CancellationToken::new(),
        }
    }

    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Wait for a permit
    pub async fn acquire(&self) -> Result<RatePermit> {
        self.acquire_with(&CancellationToken::new()).await
    }

    /// Wait for a permit, giving up when `cancel` fires
    pub async fn acquire_with(&self, cancel: &CancellationToken) -> Result<RatePermit> {
        let deadline = self.config.acquire_timeout.map(|t| Instant::now() + t);

        loop {
            if self.closed.is_cancelled() {
                return Err(AgentError::LimiterClosed);
            }
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            let wake = match self.try_start() {
                Ok(permit) => return Ok(permit),
                Err(wake) => wake,
            };

            let timed_out = deadline.is_some_and(|d| wake > d);
            let until = match deadline {
                Some(d) if timed_out => d,
                _ => wake,
            };

            tracing::warn!(
                wait_ms = until.saturating_duration_since(Instant::now()).as_millis(),
                limit = self.config.max_calls,
                "LLM rate limit reached, waiting"
            );

            tokio::select! {
                () = cancel.cancelled() => return Err(AgentError::Cancelled),
                () = self.closed.cancelled() => return Err(AgentError::LimiterClosed),
                () = sleep_until(until) => {}
            }

            if timed_out {
                let waited = self.config.acquire_timeout.unwrap_or_default();
                return Err(AgentError::RateLimitTimeout(waited));
            }
        }
    }

    /// Start a call now if the window has room, else report when it will
    fn try_start(&self) -> std::result::Result<RatePermit, Instant> {
        let now = Instant::now();
        let mut starts = self.starts.lock().unwrap_or_else(PoisonError::into_inner);

        while starts.front().is_some_and(|t| *t + self.config.window <= now) {
            starts.pop_front();
        }

        if starts.len() < self.config.max_calls {
            starts.push_back(now);
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            return Ok(RatePermit {
                in_flight: Arc::clone(&self.in_flight),
            });
        }

        // full, so there is a front entry
        Err(starts.front().map_or(now, |t| *t + self.config.window))
    }

    /// Calls that could start right now
    pub fn available(&self) -> usize {
        let now = Instant::now();
        let starts = self.starts.lock().unwrap_or_else(PoisonError::into_inner);
        let recent = starts
            .iter()
            .filter(|t| **t + self.config.window > now)
            .count();
        self.config.max_calls.saturating_sub(recent)
    }

    /// Permits currently held
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Refuse all future acquisitions and wake current waiters
    pub fn shutdown(&self) {
        self.closed.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.closed.is_cancelled()
    }
}
