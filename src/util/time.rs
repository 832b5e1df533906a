//! Time utilities for match simulation

use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(test)]
use parking_lot::Mutex;

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Default tick rate for match clocks
pub const DEFAULT_TICK_RATE: u32 = 60;

/// Highest tick rate with a whole-microsecond period
pub const MAX_TICK_RATE: u32 = 1_000_000;

/// Interval between two ticks at the given rate, never shorter than 1µs
pub fn tick_interval(ticks_per_second: u32) -> Duration {
    let rate = ticks_per_second.clamp(1, MAX_TICK_RATE);
    Duration::from_micros(1_000_000 / u64::from(rate))
}

/// Monotonic time source read by rooms when advancing their match.
///
/// Matches never read the wall clock themselves; the room passes `now()` in,
/// so start and score delays can be driven by hand in tests.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// Shared handle to the process time source
pub type SharedTime = Arc<dyn TimeSource>;

/// Real monotonic clock backed by [`Instant::now`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicTime;

impl TimeSource for MonotonicTime {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Time source that only moves when told to
#[cfg(test)]
#[derive(Debug)]
pub struct ManualTime {
    base: Instant,
    offset: Mutex<Duration>,
}

#[cfg(test)]
impl ManualTime {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

#[cfg(test)]
impl Default for ManualTime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl TimeSource for ManualTime {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_time_moves_only_when_advanced() {
        let time = ManualTime::new();
        let start = time.now();
        assert_eq!(time.now(), start);

        time.advance(Duration::from_millis(1500));
        assert_eq!(time.now() - start, Duration::from_millis(1500));
    }

    #[test]
    fn tick_interval_matches_rate() {
        assert_eq!(tick_interval(50), Duration::from_millis(20));
        assert_eq!(tick_interval(0), Duration::from_secs(1));
        assert_eq!(tick_interval(MAX_TICK_RATE), Duration::from_micros(1));
        assert_eq!(tick_interval(u32::MAX), Duration::from_micros(1));
    }
}
