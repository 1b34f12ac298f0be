//! Wall-clock time sources for token bucket refill.
//!
//! Bucket records store their last update as Unix milliseconds, so every reader
//! and writer of a record has to agree on a clock that survives process restarts.
//! That rules out `Instant`: everything here reads [`SystemTime`].
//!
//! The wall clock can move backwards (NTP step, manual adjustment, a different
//! host). Nothing in this crate hides that; callers compare readings against
//! stored timestamps and decide what a regression means for them.
//!
//! # Providers
//!
//! - [`SystemTimeProvider`]: production clock.
//! - [`SimulatedTimeProvider`]: manually driven clock (requires the `simulation` feature).

#[cfg(feature = "simulation")]
use std::sync::Arc;
#[cfg(feature = "simulation")]
use std::sync::atomic::AtomicU64;
#[cfg(feature = "simulation")]
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1000;

/// Current Unix timestamp in milliseconds.
///
/// Falls back to 0 if the system clock reports a time before the epoch instead
/// of panicking.
#[inline]
pub fn current_time_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// Injectable source of Unix millisecond timestamps.
///
/// ```
/// use tokenbucket_time::{SystemTimeProvider, TimeProvider};
///
/// fn stamp<T: TimeProvider>(clock: &T) -> u64 {
///     clock.now_unix_ms()
/// }
///
/// assert!(stamp(&SystemTimeProvider) > 0);
/// ```
pub trait TimeProvider: Send + Sync {
    /// Current Unix timestamp in milliseconds.
    fn now_unix_ms(&self) -> u64;
}

impl<T: TimeProvider + ?Sized> TimeProvider for &T {
    #[inline]
    fn now_unix_ms(&self) -> u64 {
        (**self).now_unix_ms()
    }
}

impl<T: TimeProvider + ?Sized> TimeProvider for std::sync::Arc<T> {
    #[inline]
    fn now_unix_ms(&self) -> u64 {
        (**self).now_unix_ms()
    }
}

/// Production provider backed by [`current_time_ms`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    #[inline]
    fn now_unix_ms(&self) -> u64 {
        current_time_ms()
    }
}

/// Manually driven clock.
///
/// Clones share the same underlying reading, so a test can hand one clone to
/// the code under test and keep another to move time around.
///
/// ```ignore
/// use tokenbucket_time::{SimulatedTimeProvider, TimeProvider};
///
/// let clock = SimulatedTimeProvider::new(10_000);
/// clock.advance_secs(3);
/// assert_eq!(clock.now_unix_ms(), 13_000);
///
/// clock.rewind_ms(500);
/// assert_eq!(clock.now_unix_ms(), 12_500);
/// ```
#[cfg(feature = "simulation")]
#[derive(Debug, Clone)]
pub struct SimulatedTimeProvider {
    now_ms: Arc<AtomicU64>,
}

#[cfg(feature = "simulation")]
impl SimulatedTimeProvider {
    /// Start the clock at `initial_ms`.
    pub fn new(initial_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(initial_ms)),
        }
    }

    /// Move forward by `delta_ms`, saturating at `u64::MAX`.
    pub fn advance_ms(&self, delta_ms: u64) {
        let _ = self
            .now_ms
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| Some(now.saturating_add(delta_ms)));
    }

    /// Move forward by whole seconds.
    pub fn advance_secs(&self, delta_secs: u64) {
        self.advance_ms(delta_secs.saturating_mul(MILLIS_PER_SEC));
    }

    /// Move backward by `delta_ms`, saturating at 0.
    ///
    /// Models a wall-clock step backwards.
    pub fn rewind_ms(&self, delta_ms: u64) {
        let _ = self
            .now_ms
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| Some(now.saturating_sub(delta_ms)));
    }

    /// Jump to an absolute reading.
    pub fn set_ms(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

#[cfg(feature = "simulation")]
impl TimeProvider for SimulatedTimeProvider {
    #[inline]
    fn now_unix_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}


#[cfg(all(test, feature = "simulation"))]
mod simulation_tests {
    use super::*;

    #[test]
    fn test_advance_and_rewind() {
        let clock = SimulatedTimeProvider::new(10_000);
        clock.advance_secs(3);
        assert_eq!(clock.now_unix_ms(), 13_000);

        clock.rewind_ms(500);
        assert_eq!(clock.now_unix_ms(), 12_500);
    }

    #[test]
    fn test_rewind_saturates_at_zero() {
        let clock = SimulatedTimeProvider::new(100);
        clock.rewind_ms(1_000);
        assert_eq!(clock.now_unix_ms(), 0);
    }

    #[test]
    fn test_advance_saturates_at_max() {
        let clock = SimulatedTimeProvider::new(u64::MAX - 10);
        clock.advance_ms(100);
        assert_eq!(clock.now_unix_ms(), u64::MAX);
    }

    #[test]
    fn test_clones_share_the_reading() {
        let clock = SimulatedTimeProvider::new(1_000);
        let handle = clock.clone();
        handle.set_ms(5_000);
        assert_eq!(clock.now_unix_ms(), 5_000);
    }
}
