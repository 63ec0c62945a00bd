//! Object model handlers and per-server lifecycle state machine.
//!
//! This crate sits directly on top of [`lwm2m_core`]: the registry crate
//! owns dispatch primitives (path parsing, ACL storage, the message
//! engine), and this crate supplies the domain the primitives serve —
//! the Security/Server/Access-Control/Device/Connectivity/Firmware
//! object model ([`client::Lwm2mClient`]) and the bootstrap →
//! register → update → deregister state machine that drives one server
//! context through its lifetime ([`lifecycle::LifecycleContext`]).
//!
//! # Components
//!
//! - [`Lwm2mClient`]: the device's object model, dispatching authorized
//!   requests to the right object.
//! - [`LifecycleContext`]: one server context's registration lifecycle.
//! - [`LifecycleEvent`]/[`LifecycleAction`]: what crosses the lifecycle
//!   state machine's boundary.
//! - [`objects`]: the six object handlers themselves.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod error;
mod event;
mod lifecycle;
pub mod objects;

pub use client::{DispatchOutcome, ExecuteEffect, Lwm2mClient};
pub use error::ClientError;
pub use event::{LifecycleAction, LifecycleEvent, PendingRequest};
pub use lifecycle::{LifecycleConfig, LifecycleContext, LifecycleState};
pub use lwm2m_core::Environment;
