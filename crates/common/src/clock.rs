//! Wall-clock helpers for progress reporting.
//!
//! Renders and runs report progress far more often than anyone polls it.
//! This module provides:
//! - A throttle that admits at most one tick per interval
//! - Conversion from the encoder's microsecond clock to seconds

use std::time::{Duration, Instant};

/// Admits at most one tick per interval of wall-clock time.
///
/// The first call always fires, so a caller gets an immediate first
/// sample instead of waiting a full interval.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last_tick: Option<Instant>,
}

impl Throttle {
    /// Create a throttle with the given minimum spacing.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_tick: None,
        }
    }

    /// Create a throttle from a millisecond spacing.
    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// Check whether enough time has passed for the next tick at `now`.
    /// Returns true and records the tick if ready.
    pub fn should_tick_at(&mut self, now: Instant) -> bool {
        match self.last_tick {
            None => {
                self.last_tick = Some(now);
                true
            }
            Some(last) if now.saturating_duration_since(last) >= self.interval => {
                self.last_tick = Some(now);
                true
            }
            _ => false,
        }
    }

    /// [`Throttle::should_tick_at`] using the current instant.
    pub fn should_tick(&mut self) -> bool {
        self.should_tick_at(Instant::now())
    }
}

/// Convert encoder microseconds to seconds.
pub fn us_to_secs(us: i64) -> f64 {
    us as f64 / 1_000_000.0
}
