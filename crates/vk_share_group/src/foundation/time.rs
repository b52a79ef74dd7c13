//! Time management utilities
//!
//! Both the buffer pool prune heuristic and the pipeline job rate limiter are
//! driven by a [`Clock`] so hosts can feed them a frame clock and tests can
//! step time by hand.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin
    fn now(&self) -> Duration;
}

/// Wall-clock time measured from clock creation
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a new system clock starting at zero
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Manually advanced clock
///
/// Clones share the same underlying time value.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a new manual clock at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward
    pub fn advance(&self, delta: Duration) {
        self.nanos.fetch_add(duration_to_nanos(delta), Ordering::SeqCst);
    }

    /// Set the clock to an absolute time
    pub fn set(&self, now: Duration) {
        self.nanos.store(duration_to_nanos(now), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

fn duration_to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Simple stopwatch measuring time since the last reset against a [`Clock`]
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started_at: Duration,
}

impl Stopwatch {
    /// Start a stopwatch at the clock's current time
    pub fn start(clock: &dyn Clock) -> Self {
        Self { started_at: clock.now() }
    }

    /// Restart the stopwatch at the clock's current time
    pub fn reset(&mut self, clock: &dyn Clock) {
        self.started_at = clock.now();
    }

    /// Time elapsed since the last start or reset
    pub fn elapsed(&self, clock: &dyn Clock) -> Duration {
        clock.now().saturating_sub(self.started_at)
    }
}
