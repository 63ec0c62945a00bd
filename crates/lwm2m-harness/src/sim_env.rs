//! Shared virtual clock for simulation tests.
//!
//! [`SimEnv`] wraps [`lwm2m_core`]'s own `MockEnv` test double in an `Arc`
//! so a [`crate::SimDriver`] and the [`lwm2m_app::Runtime`] it drives can
//! share one virtual clock and one seeded RNG, instead of each owning an
//! independent (and therefore divergent) copy.

use std::{future::Future, sync::Arc, time::Duration};

use lwm2m_core::{
    env::test_utils::{MockEnv, MockInstant},
    Environment,
};

/// A cloneable handle to one virtual clock/RNG, implementing
/// [`Environment`] by forwarding to the shared [`MockEnv`].
#[derive(Clone)]
pub struct SimEnv {
    inner: Arc<MockEnv>,
    origin: MockInstant,
}

impl SimEnv {
    /// A fresh clock at t=0, seeded for reproducible "randomness". Unix
    /// time starts at `unix_origin` and advances in lockstep with the
    /// virtual clock.
    pub fn with_seed(seed: u64) -> Self {
        let inner = Arc::new(MockEnv::with_seed(seed));
        let origin = inner.now();
        Self { inner, origin }
    }

    /// Advance the virtual clock by `duration`. Every holder of this
    /// handle observes the new time immediately.
    pub fn advance(&self, duration: Duration) {
        self.inner.advance(duration);
    }

    /// Seconds since this environment was created, derived from the
    /// virtual clock rather than wall-clock time, so Device-object
    /// timestamps stay deterministic across runs.
    pub fn now_unix(&self) -> i64 {
        (self.inner.now() - self.origin).as_secs() as i64
    }
}

impl Environment for SimEnv {
    type Instant = MockInstant;

    fn now(&self) -> Self::Instant {
        self.inner.now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        self.inner.sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.inner.random_bytes(buffer);
    }
}
