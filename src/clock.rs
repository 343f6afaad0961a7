//! Time sources feeding the scheduler.
//!
//! [`TimeSource`] is the read-only clock capability the loop consumes. The
//! production source is [`WallClock`]; [`VirtualClock`] is shared, manually
//! advanced time for deterministic tests, driven by the lab reactor during
//! waits.

use crate::tick::Tick;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Read-only source of the current tick.
pub trait TimeSource {
    /// Returns the current tick.
    fn now(&self) -> Tick;
}

/// Monotonic wall-clock source: milliseconds since construction, wrapping.
#[derive(Debug)]
pub struct WallClock {
    origin: Instant,
}

impl WallClock {
    /// Creates a clock whose tick counter starts at zero now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for WallClock {
    fn now(&self) -> Tick {
        // Truncating the elapsed millisecond count to u32 is the wrap.
        Tick::from_millis(self.origin.elapsed().as_millis() as u32)
    }
}

/// Manually driven virtual time.
///
/// Handles are cheap clones over shared state, so a test, the loop, and the
/// lab reactor can all observe and advance the same counter.
#[derive(Debug, Clone, Default)]
pub struct VirtualClock(Rc<Cell<u32>>);

impl VirtualClock {
    /// Creates a virtual clock at tick zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a virtual clock at an arbitrary tick, e.g. near the wrap
    /// point.
    #[must_use]
    pub fn starting_at(tick: Tick) -> Self {
        Self(Rc::new(Cell::new(tick.as_millis())))
    }

    /// Moves the clock to `tick`.
    pub fn set(&self, tick: Tick) {
        self.0.set(tick.as_millis());
    }

    /// Advances the clock by `ms` milliseconds, wrapping.
    pub fn advance(&self, ms: u32) {
        self.0.set(self.0.get().wrapping_add(ms));
    }
}

impl TimeSource for VirtualClock {
    fn now(&self) -> Tick {
        Tick::from_millis(self.0.get())
    }
}
