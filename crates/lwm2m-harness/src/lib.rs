//! Deterministic simulation harness for device-management client testing.
//!
//! A [`SimDriver`]/[`SimEnv`] pair implements [`lwm2m_app::Driver`] and
//! [`lwm2m_core::Environment`] over in-memory datagram queues and a
//! virtual clock, so the exact `Runtime` orchestration code that drives a
//! real socket in production can be exercised here with full control over
//! timing, randomness, and packet loss — used by this crate's integration
//! tests and by `proptest` property tests of the testable properties the
//! protocol and lifecycle engines are expected to uphold.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod sim_driver;
mod sim_env;

pub use sim_driver::SimDriver;
pub use sim_env::SimEnv;
