//! Driver trait for abstracting I/O, modem, and persistence operations.
//!
//! The [`Driver`] trait decouples the tick/datagram orchestration loop
//! from any specific socket, modem, or storage implementation. Production
//! code wires this to a UDP socket, PDN/IMSI modem oracle, and a
//! flash-backed KV store; the test harness wires the identical trait to
//! an in-memory channel pair and a virtual clock, so the same
//! [`crate::Runtime`] drives both.
//!
//! # Implementations
//!
//! - **Production**: UDP socket, AT-command modem oracle, flash KV store.
//! - **Simulation**: in-memory channel pair, scripted modem responses,
//!   an in-memory map standing in for flash.

use std::{future::Future, net::SocketAddr, ops::Add, ops::Sub, time::Duration};

/// Abstracts everything outside the protocol and lifecycle engines'
/// control: datagram I/O, the modem oracle (endpoint identity, DNS/PDN
/// activation, IP-family capability), and the KV persistence oracle.
pub trait Driver: Send {
    /// Platform-specific I/O error type.
    type Error: std::error::Error + Send + 'static;

    /// Time instant type. Enables virtual time in simulation.
    type Instant: Copy + Ord + Send + Sync + Sub<Output = Duration> + Add<Duration, Output = Self::Instant>;

    /// Receive the next datagram, if one is ready. Returns `Ok(None)`
    /// rather than blocking when nothing has arrived.
    fn poll_datagram(
        &mut self,
    ) -> impl Future<Output = Result<Option<(Vec<u8>, SocketAddr)>, Self::Error>> + Send;

    /// Send a datagram to `peer`.
    fn send_datagram(
        &mut self,
        bytes: &[u8],
        peer: SocketAddr,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Resolve `server_uri` to a socket address, activating the PDN
    /// context first if it is not already up.
    fn resolve_peer(&mut self, server_uri: &str) -> impl Future<Output = Result<SocketAddr, Self::Error>> + Send;

    /// The endpoint identity the modem oracle assigns this device.
    fn endpoint_name(&self) -> &str;

    /// Swap the active access point name, e.g. after a handshake failure
    /// suggests the current APN is misconfigured.
    fn swap_apn(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Toggle between IPv4 and IPv6 bearer, e.g. after repeated connect
    /// failures on the current family.
    fn toggle_ip_family(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Load a previously persisted record, if any.
    fn kv_get(&mut self, key: u16) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send;

    /// Persist a record.
    fn kv_put(&mut self, key: u16, bytes: Vec<u8>) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// The current time instant.
    fn now(&self) -> Self::Instant;

    /// Wall-clock Unix timestamp, seconds since the epoch — distinct from
    /// [`Driver::now`]'s monotonic instant, used by the Device object's
    /// current-time resource.
    fn now_unix(&self) -> i64;
}
