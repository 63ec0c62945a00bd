//! Error taxonomy for the protocol + state engine.
//!
//! [`CoreError`] is the single error type every engine-layer operation
//! returns. Decoder-level failures never abort a dispatch loop; callers
//! map each variant to a response code via [`CoreError::response_code`]
//! and keep going.

use thiserror::Error;

use lwm2m_proto::ProtoError;

/// Errors raised by the registry, ACL engine, attribute engine, queue, and
/// message engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Caller passed a null, oversized, or otherwise malformed argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Malformed TLV, option, or header on the wire.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    /// The destination buffer is smaller than the encoded representation.
    #[error("buffer too small: need {needed}, have {available}")]
    BufferTooSmall {
        /// Bytes required to complete the encode.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },

    /// The requested object/instance/resource path, or observation handle,
    /// does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The ACL engine denied the requesting server access.
    #[error("unauthorized: server {server_id} denied {operation} on {path}")]
    Unauthorized {
        /// The server short ID that was denied.
        server_id: u16,
        /// The operation that was attempted.
        operation: &'static str,
        /// The resource path.
        path: String,
    },

    /// The operation is not permitted on this resource (e.g. `Write` on a
    /// read-only resource, `Execute` on a non-executable one).
    #[error("method not allowed: {operation} on {path}")]
    MethodNotAllowed {
        /// The operation that was attempted.
        operation: &'static str,
        /// The resource path.
        path: String,
    },

    /// The request's Content-Format is not one this resource accepts.
    #[error("unsupported content-format: {0}")]
    UnsupportedContent(u16),

    /// A fixed-capacity table (queue, observer store, instance table) is
    /// full.
    #[error("out of memory: {0} is full")]
    OutOfMemory(&'static str),

    /// The retransmit window for a confirmable exchange was exhausted
    /// without an acknowledgement.
    #[error("timeout waiting for response")]
    Timeout,

    /// The PDN or socket is down.
    #[error("network down")]
    NetworkDown,

    /// The transport handshake (DTLS) failed or alerted.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The bootstrap procedure failed in a way that cannot be retried; the
    /// state machine halts.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl CoreError {
    /// Returns true if the caller may reasonably retry after this error.
    ///
    /// Timeouts and network-down conditions are transient. Encoding, ACL,
    /// and argument errors are not — retrying without changing the request
    /// would just fail the same way again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::NetworkDown | Self::HandshakeFailed(_))
    }

    /// The response code this error should surface as, for errors raised
    /// while servicing an incoming request. Returns `None` for errors that
    /// have no wire representation (they're local-only, e.g. a full queue
    /// rejecting an outgoing send).
    pub fn response_code(&self) -> Option<lwm2m_proto::Code> {
        match self {
            Self::InvalidEncoding(_) => Some(lwm2m_proto::Code::BAD_REQUEST),
            Self::NotFound(_) => Some(lwm2m_proto::Code::NOT_FOUND),
            Self::Unauthorized { .. } => Some(lwm2m_proto::Code::UNAUTHORIZED),
            Self::MethodNotAllowed { .. } => Some(lwm2m_proto::Code::METHOD_NOT_ALLOWED),
            Self::UnsupportedContent(_) => Some(lwm2m_proto::Code::UNSUPPORTED_CONTENT_FORMAT),
            _ => None,
        }
    }
}

impl From<ProtoError> for CoreError {
    fn from(err: ProtoError) -> Self {
        match err {
            ProtoError::BufferTooSmall { needed, available } => {
                Self::BufferTooSmall { needed, available }
            },
            ProtoError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            ProtoError::InvalidEncoding(msg) => Self::InvalidEncoding(msg.to_string()),
        }
    }
}
