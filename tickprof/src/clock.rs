use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic, high-resolution, per-process tick counter. Any monotonic
/// source works; the engine tolerates (clamps) occasional backward steps.
pub trait ClockSource: Send + Sync {
    fn now_ticks(&self) -> u64;

    /// Fixed conversion factor from ticks to seconds.
    fn ticks_per_second(&self) -> u64;
}

/// Default clock: `CLOCK_MONOTONIC`, nanosecond ticks.
pub struct MonotonicClock;

impl ClockSource for MonotonicClock {
    fn now_ticks(&self) -> u64 {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        unsafe {
            libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
        }
        ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64
    }

    fn ticks_per_second(&self) -> u64 {
        1_000_000_000
    }
}

impl<C: ClockSource + ?Sized> ClockSource for std::sync::Arc<C> {
    fn now_ticks(&self) -> u64 {
        (**self).now_ticks()
    }

    fn ticks_per_second(&self) -> u64 {
        (**self).ticks_per_second()
    }
}

/// Manually-advanced clock for tests and deterministic replay.
#[derive(Default)]
pub struct ManualClock {
    ticks: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ticks: u64) {
        self.ticks.store(ticks, Ordering::Relaxed);
    }

    pub fn advance(&self, ticks: u64) {
        self.ticks.fetch_add(ticks, Ordering::Relaxed);
    }
}

impl ClockSource for ManualClock {
    fn now_ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    fn ticks_per_second(&self) -> u64 {
        1_000_000_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_advances() {
        let clock = MonotonicClock;
        let a = clock.now_ticks();
        let b = clock.now_ticks();
        assert!(b >= a);
        assert_eq!(clock.ticks_per_second(), 1_000_000_000);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new();
        assert_eq!(clock.now_ticks(), 0);
        clock.set(100);
        assert_eq!(clock.now_ticks(), 100);
        clock.advance(50);
        assert_eq!(clock.now_ticks(), 150);
    }
}
