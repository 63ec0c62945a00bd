//! The clock/RNG seam every stateful component is built against.
//!
//! No component in this crate (or in `lwm2m-client`) may call
//! `std::time::Instant::now()`, `tokio::time::sleep`, or an RNG directly —
//! all such access goes through [`Environment`], so the exact same engine
//! code runs against real time/randomness in production and against a
//! virtual clock/seeded RNG in tests.

use std::{
    future::Future,
    ops::{Add, Sub},
    time::Duration,
};

/// Abstracts time and randomness for deterministic testing.
///
/// `Instant` is generic so a simulation can use a virtual clock type while
/// production code uses [`std::time::Instant`].
pub trait Environment: Send + Sync + 'static {
    /// A point in time; only ordering and subtraction (yielding a
    /// [`Duration`]) are required.
    type Instant: Copy + Ord + Send + Sync + Sub<Output = Duration> + Add<Duration, Output = Self::Instant>;

    /// The current time.
    fn now(&self) -> Self::Instant;

    /// Suspend for `duration`. Real environments sleep; simulated
    /// environments typically resolve immediately and let the caller
    /// advance the virtual clock explicitly.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;

    /// Fill `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// A random `u16`, built from [`Environment::random_bytes`].
    fn random_u16(&self) -> u16 {
        let mut buf = [0u8; 2];
        self.random_bytes(&mut buf);
        u16::from_be_bytes(buf)
    }

    /// A random `u32`, built from [`Environment::random_bytes`].
    fn random_u32(&self) -> u32 {
        let mut buf = [0u8; 4];
        self.random_bytes(&mut buf);
        u32::from_be_bytes(buf)
    }

    /// A random jitter duration in `[0, max)`, used to de-synchronize
    /// retransmit timers across devices.
    fn random_jitter(&self, max: Duration) -> Duration {
        if max.is_zero() {
            return Duration::ZERO;
        }
        let fraction = f64::from(self.random_u32()) / f64::from(u32::MAX);
        max.mul_f64(fraction)
    }
}

/// Deterministic [`Environment`] for tests: a manually-advanced virtual
/// clock and a seeded xorshift RNG, so retry/backoff and lifetime-timer
/// behavior is exactly reproducible across runs.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use std::{
        sync::atomic::{AtomicU64, Ordering},
        time::Duration,
    };

    use super::Environment;

    /// A virtual instant: nanoseconds since the `MockEnv` was created.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    pub struct MockInstant(u64);

    impl std::ops::Sub for MockInstant {
        type Output = Duration;

        fn sub(self, rhs: Self) -> Duration {
            Duration::from_nanos(self.0.saturating_sub(rhs.0))
        }
    }

    impl std::ops::Add<Duration> for MockInstant {
        type Output = Self;

        fn add(self, rhs: Duration) -> Self {
            Self(self.0.saturating_add(rhs.as_nanos() as u64))
        }
    }

    /// Deterministic environment with a manually-advanced clock and a
    /// seeded xorshift64 generator standing in for true randomness.
    pub struct MockEnv {
        now_nanos: AtomicU64,
        rng_state: AtomicU64,
    }

    impl MockEnv {
        /// A fresh environment starting at t=0 with a fixed default seed.
        pub fn new() -> Self {
            Self::with_seed(0x5EED_0000_DEAD_BEEF)
        }

        /// A fresh environment starting at t=0 with an explicit RNG seed.
        pub fn with_seed(seed: u64) -> Self {
            Self { now_nanos: AtomicU64::new(0), rng_state: AtomicU64::new(seed.max(1)) }
        }

        /// Advance the virtual clock by `duration`.
        pub fn advance(&self, duration: Duration) {
            self.now_nanos.fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
        }

        fn next_u64(&self) -> u64 {
            // xorshift64: deterministic, seed-dependent, good enough to
            // exercise "random-ish" code paths without pulling in an RNG
            // crate dependency just for test doubles. `&self` (not `&mut
            // self`) keeps this usable from a shared `Environment`, so the
            // state lives in an atomic rather than a `Cell`.
            let mut x = self.rng_state.load(Ordering::SeqCst);
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            self.rng_state.store(x, Ordering::SeqCst);
            x
        }
    }

    impl Default for MockEnv {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Environment for MockEnv {
        type Instant = MockInstant;

        fn now(&self) -> Self::Instant {
            MockInstant(self.now_nanos.load(Ordering::SeqCst))
        }

        async fn sleep(&self, duration: Duration) {
            self.advance(duration);
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            for chunk in buffer.chunks_mut(8) {
                let bytes = self.next_u64().to_be_bytes();
                chunk.copy_from_slice(&bytes[..chunk.len()]);
            }
        }
    }

}
