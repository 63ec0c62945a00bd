//! Object model: the concrete Security, Server, Access-Control, Device,
//! Connectivity, and Firmware handlers that back the resource registry.
//!
//! The registry (`lwm2m_core::registry`) owns path parsing and ACL
//! storage; it only needs each object to describe its capabilities and
//! instance table, which every object here provides by implementing
//! `ObjectHandler`. Actual resource values live behind the inherent
//! `read`/`write`/`execute` methods each object exposes, invoked by
//! [`crate::client::Lwm2mClient::dispatch`] once a request is authorized.

/// Access Control object (`/2`).
pub mod access_control;
/// Connectivity Monitoring object (`/4`).
pub mod connectivity;
/// Device object (`/3`).
pub mod device;
/// Firmware Update object (`/5`).
pub mod firmware;
/// Security object (`/0`).
pub mod security;
/// Server object (`/1`).
pub mod server;

pub use access_control::{AccessControlInstance, AccessControlObject};
pub use connectivity::ConnectivityObject;
pub use device::DeviceObject;
pub use firmware::{FirmwareObject, FirmwareState, UpdateResult};
pub use security::{SecurityInstance, SecurityObject};
pub use server::{ServerInstance, ServerObject};

/// A resource's decoded value, independent of wire representation.
/// Object handlers trade in these; TLV/CBOR encoding is `lwm2m-proto`'s
/// job, applied once a value crosses back out to the registry's caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceValue {
    /// UTF-8 text.
    String(String),
    /// A signed integer resource.
    Integer(i64),
    /// A floating-point resource.
    Float(f64),
    /// A boolean resource.
    Boolean(bool),
    /// An opaque byte string.
    Opaque(Vec<u8>),
    /// A Unix timestamp, seconds since the epoch.
    Time(i64),
    /// A whole object instance, or a multi-instance resource, carried as
    /// id/value pairs. Bootstrap's instance-level writes (`PUT /0/1`) and
    /// the Access Control object's per-server ACL resource both need more
    /// than one scalar in a single payload; everything else in the object
    /// model only ever trades in the scalar variants above.
    Instance(Vec<(u16, ResourceValue)>),
}
