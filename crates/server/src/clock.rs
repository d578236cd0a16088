//! Time sources for delta time stamps and state resend timers.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

/// Real-time tics per second.
pub const TICRATE: u32 = 35;

/// Monotonic millisecond clock plus the tic counter derived from it.
pub trait Clock: Send + Sync + Debug {
    /// Milliseconds since an arbitrary epoch.
    fn now_ms(&self) -> u32;

    /// Real-time tics since the same epoch.
    fn tic(&self) -> u32 {
        (u64::from(self.now_ms()) * u64::from(TICRATE) / 1000) as u32
    }
}

/// Wall clock based on [`Instant`].
#[derive(Debug)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }
}

/// Clock advanced explicitly. Used by tests and the simulation.
#[derive(Debug, Default)]
pub struct ManualClock {
    ms: AtomicU32,
}

impl ManualClock {
    pub fn new(ms: u32) -> Self {
        Self { ms: AtomicU32::new(ms) }
    }

    pub fn set(&self, ms: u32) {
        self.ms.store(ms, Ordering::Relaxed);
    }

    pub fn advance(&self, ms: u32) {
        self.ms.fetch_add(ms, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.ms.load(Ordering::Relaxed)
    }
}
