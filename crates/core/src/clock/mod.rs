//! Clock sources. Every timestamp the engine handles is an absolute reading,
//! in seconds, from a single [`ClockSource`].

use std::{cell::Cell, rc::Rc, time::Instant};

/// Monotonic, high-resolution time authority.
///
/// Readings keep advancing while the game is paused; the engine compensates
/// by shifting its schedule on resume instead of stopping the clock.
pub trait ClockSource {
    /// Current reading in seconds.
    fn now(&self) -> f64;
}

/// Wall clock backed by [`Instant`], reading zero at construction.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Hand-driven clock. Clones share the same reading, so a test can keep one
/// handle while the session owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(seconds: f64) -> Self {
        let clock = Self::new();
        clock.set(seconds);
        clock
    }

    pub fn set(&self, seconds: f64) {
        self.now.set(seconds);
    }

    /// Moves the clock forward. Negative deltas are ignored so the clock stays
    /// monotonic.
    pub fn advance(&self, delta: f64) {
        if delta > 0.0 {
            self.now.set(self.now.get() + delta);
        }
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> f64 {
        self.now.get()
    }
}
