//! Application layer for the device management client.
//!
//! Wires the sans-IO protocol engine and lifecycle state machine from
//! `lwm2m-core`/`lwm2m-client` to a concrete environment, enabling the
//! same orchestration code to run against a real socket/modem or a
//! deterministic simulation harness.
//!
//! # Components
//!
//! - [`Driver`]: trait for platform-specific datagram/modem/persistence I/O
//! - [`Runtime`]: orchestration loop driving one or more server sessions
//! - [`ServerSession`]/[`ServerRole`]: per-server engine and lifecycle state
//! - [`ClientConfig`]: static configuration assembled by the CLI

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod config;
mod driver;
mod error;
mod runtime;
mod session;

pub use config::{ClientConfig, LogLevel, OperationalServer};
pub use driver::Driver;
pub use error::DriverError;
pub use runtime::Runtime;
pub use session::{ServerRole, ServerSession};
