//! Orchestration-layer error type.
//!
//! Everything the protocol and lifecycle engines raise is a [`CoreError`]
//! or [`ClientError`]; this crate adds only the failures that originate
//! below those engines, in the [`crate::Driver`] implementation itself.

use thiserror::Error;

/// Errors raised by a [`crate::Driver`] implementation or by the runtime
/// loop driving it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The datagram socket returned an I/O error.
    #[error("socket error: {0}")]
    Socket(String),

    /// DNS resolution or PDN activation failed.
    #[error("network down: {0}")]
    NetworkDown(String),

    /// The transport handshake failed or alerted.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The KV persistence oracle rejected a read or write.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The modem oracle could not supply an endpoint identity or bearer.
    #[error("modem oracle error: {0}")]
    Modem(String),
}

impl DriverError {
    /// True for conditions a retry/backoff policy should treat as
    /// transient rather than fatal.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkDown(_) | Self::Socket(_) | Self::HandshakeFailed(_))
    }
}
