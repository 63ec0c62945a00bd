//! Protocol + state engine: message engine, retransmission queue,
//! resource registry, ACL engine, attribute engine, and observer store.
//!
//! This crate is deliberately sans-IO: every type here mutates in-memory
//! state and returns data describing what I/O should happen next
//! ([`engine::EngineAction`]) rather than performing it. The orchestration
//! crate drives a socket, a clock, and a KV store against these types.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod acl;
pub mod attribute;
pub mod engine;
pub mod env;
pub mod error;
pub mod observer;
pub mod queue;
pub mod registry;

pub use acl::{Acl, Permission};
pub use attribute::{AttributeSet, AttributeState, NotifyDecision};
pub use engine::{Engine, EngineAction, ExchangeOutcome};
pub use env::Environment;
pub use error::CoreError;
pub use observer::{Observer, ObserverHandle, ObserverStore};
pub use queue::{Queue, QueueHandle, QueueItem};
pub use registry::{Capabilities, ObjectHandler, Operation, Path, Registry};
