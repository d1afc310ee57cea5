//! Simulated time
//!
//! The world owns one [`SimClock`] and advances it a fixed step per tick.
//! Everything else reads time through the [`Clock`] trait or receives
//! `now` as an argument.

/// Source of simulated time in seconds
pub trait Clock {
    /// Current simulated time
    fn now(&self) -> f64;
}

/// Discrete simulation clock
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimClock {
    time: f64,
}

impl SimClock {
    /// Create a clock at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock by `dt` seconds and return the new time
    pub fn advance(&mut self, dt: f64) -> f64 {
        self.time += dt;
        self.time
    }

    /// Jump to an absolute time (never backwards)
    pub fn set(&mut self, time: f64) {
        if time > self.time {
            self.time = time;
        }
    }

    /// Reset to time zero
    pub fn reset(&mut self) {
        self.time = 0.0;
    }
}

impl Clock for SimClock {
    fn now(&self) -> f64 {
        self.time
    }
}
