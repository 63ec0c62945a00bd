//! Production [`Environment`]: the real wall clock and a thread-local
//! `rand` generator, standing in for the [`lwm2m_core::env::test_utils`]
//! virtual clock/seeded RNG used everywhere else in the workspace.

use std::time::{Duration, Instant};

use lwm2m_core::Environment;
use rand::RngCore;

/// Real time and true randomness, for a device actually talking to a
/// server over a socket.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealEnv;

impl Environment for RealEnv {
    type Instant = Instant;

    fn now(&self) -> Self::Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        rand::thread_rng().fill_bytes(buffer);
    }
}
