//! Sliding-window admission control for remote calls
//!
//! This is a local heuristic: it counts the calls this process issued during
//! the trailing window and refuses new ones once the ceiling is reached. It
//! does not coordinate with other processes and does not guarantee the
//! remote service will accept a call it admits.

use instant::Instant;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Time source for the limiter
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for deterministic tests and simulations
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        if let Ok(mut offset) = self.offset.lock() {
            *offset += by;
        }
    }

    /// Jump to an absolute offset from the clock's origin
    pub fn set(&self, since_origin: Duration) {
        if let Ok(mut offset) = self.offset.lock() {
            *offset = since_origin;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self.offset.lock().map(|o| *o).unwrap_or_default();
        self.origin + offset
    }
}

/// Sliding-window rate limiter
///
/// Shared through `Arc` and never reset between batches: the window is
/// calendar time, not per run.
pub struct RateLimiter {
    window: Duration,
    max_calls: usize,
    calls: Mutex<VecDeque<Instant>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Limiter backed by the system clock
    #[must_use]
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self::with_clock(max_calls, window, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(max_calls: usize, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            max_calls,
            calls: Mutex::new(VecDeque::with_capacity(max_calls)),
            clock,
        }
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    #[must_use]
    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    /// Prune expired calls, then report whether a new call must be refused
    pub fn should_throttle(&self) -> bool {
        let now = self.clock.now();
        let mut calls = self.lock_calls();
        self.prune(&mut calls, now);
        calls.len() >= self.max_calls
    }

    /// Record a call at the current instant
    ///
    /// Call this when the request is issued, not when it returns, so slow
    /// responses do not appear to free capacity.
    pub fn record_call(&self) {
        let now = self.clock.now();
        self.lock_calls().push_back(now);
    }

    /// Calls currently counted against the window
    pub fn calls_in_window(&self) -> usize {
        let now = self.clock.now();
        let mut calls = self.lock_calls();
        self.prune(&mut calls, now);
        calls.len()
    }

    /// Whole seconds until the oldest counted call leaves the window
    ///
    /// Zero when nothing is counted. This is a hint for the user, the
    /// limiter never waits on its own.
    pub fn estimated_wait_secs(&self) -> u64 {
        let now = self.clock.now();
        let mut calls = self.lock_calls();
        self.prune(&mut calls, now);
        calls.front().map_or(0, |oldest| {
            let remaining = self.window.saturating_sub(now.saturating_duration_since(*oldest));
            let millis = remaining.as_millis() as u64;
            millis.div_ceil(1000)
        })
    }

    fn prune(&self, calls: &mut VecDeque<Instant>, now: Instant) {
        while calls
            .front()
            .is_some_and(|ts| now.saturating_duration_since(*ts) >= self.window)
        {
            calls.pop_front();
        }
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, VecDeque<Instant>> {
        // A poisoned window only means a panic elsewhere; the timestamps are still usable
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("window", &self.window)
            .field("max_calls", &self.max_calls)
            .field("calls", &self.lock_calls().len())
            .finish_non_exhaustive()
    }
}
